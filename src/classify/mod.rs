//! Song language classification.

pub mod aggregate;
pub mod resolver;
pub mod script;
pub mod soundtrack;

pub use resolver::{ResolveOutcome, Resolver};
