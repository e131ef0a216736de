use thiserror::Error;

/// Invalid reference data or thresholds. Fatal before any classification
/// starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("`{name}` must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("reference list `{0}` is empty")]
    EmptyReferenceList(&'static str),

    #[error("reference list `{list}` contains a blank entry at index {index}")]
    BlankReferenceEntry { list: &'static str, index: usize },

    #[error("`{name}` is not an http(s) url: {value:?}")]
    InvalidUrl { name: &'static str, value: String },
}

/// A song that could not be resolved, split by whether its record was
/// already rewritten.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Nothing was written for the song.
    #[error("{0:#}")]
    Unwritten(anyhow::Error),

    /// The song was stored; bringing its artists up to date failed.
    #[error("song {song} stored, artist refresh failed: {cause:#}")]
    ArtistRefresh { song: String, cause: anyhow::Error },
}
