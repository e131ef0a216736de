//! Bounded-concurrency batch run of the resolver.

use crate::classify::{ResolveOutcome, Resolver};
use crate::error::ResolveError;
use crate::limiter::RunBudget;
use crate::storage::Repository;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub resolved: usize,
    pub unresolved: usize,
    pub skipped: usize,
    /// Songs that hit an unexpected error and were stored as unresolved.
    pub failed: usize,
    /// Songs left for a later run because the budget ran out.
    pub deferred: usize,
    /// Songs stored with their label whose artists could not be brought up
    /// to date. `validate --repair` fixes those aggregates.
    pub stale_artists: usize,
}

enum Settled {
    Resolved,
    Unresolved,
    Skipped,
    Failed,
    StaleArtists,
}

impl RunSummary {
    fn absorb(&mut self, joined: Result<Settled, JoinError>) {
        match joined {
            Ok(Settled::Resolved) => self.resolved += 1,
            Ok(Settled::Unresolved) => self.unresolved += 1,
            Ok(Settled::Skipped) => self.skipped += 1,
            Ok(Settled::Failed) => self.failed += 1,
            Ok(Settled::StaleArtists) => self.stale_artists += 1,
            Err(e) => {
                error!("classification task aborted: {e}");
                self.failed += 1;
            }
        }
    }
}

/// Resolve every pending song (all songs when `force`) with at most
/// `workers` in flight. Dispatch stops once `budget` is exhausted; songs
/// already in flight are allowed to finish.
pub async fn run(
    resolver: Arc<Resolver>,
    repo: Arc<dyn Repository>,
    workers: usize,
    budget: RunBudget,
    force: bool,
) -> anyhow::Result<RunSummary> {
    let listing = if force {
        repo.list_songs()?
    } else {
        repo.list_unclassified_songs()?
    };
    for bad in &listing.malformed {
        warn!(song = %bad.id, "stored record does not decode: {}", bad.reason);
    }
    // Undecodable rows are still dispatched; the resolver fails on them and
    // they are stored as unresolved.
    let song_ids: Vec<String> = listing
        .records
        .into_iter()
        .map(|song| song.id)
        .chain(listing.malformed.into_iter().map(|bad| bad.id))
        .collect();
    info!(songs = song_ids.len(), workers, force, "starting classification run");

    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = RunSummary::default();
    let mut queue = song_ids.into_iter();

    while let Some(song_id) = queue.next() {
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;
        while let Some(joined) = tasks.try_join_next() {
            summary.absorb(joined);
        }

        if budget.exhausted() {
            summary.deferred = 1 + queue.len();
            warn!(deferred = summary.deferred, "run budget exhausted, stopping dispatch");
            break;
        }

        let resolver = resolver.clone();
        tasks.spawn(async move {
            let _permit = permit;
            match resolver.resolve_song(&song_id, force).await {
                Ok(ResolveOutcome::Skipped) => Settled::Skipped,
                Ok(ResolveOutcome::Resolved(r)) if r.source.is_some() => Settled::Resolved,
                Ok(ResolveOutcome::Resolved(_)) => Settled::Unresolved,
                Err(ResolveError::Unwritten(e)) => {
                    warn!(song = %song_id, "classification failed: {e:#}");
                    if let Err(e) = resolver.record_failure(&song_id, &e) {
                        error!(song = %song_id, "could not record failure: {e:#}");
                    }
                    Settled::Failed
                }
                Err(e @ ResolveError::ArtistRefresh { .. }) => {
                    error!(song = %song_id, "{e}");
                    Settled::StaleArtists
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        summary.absorb(joined);
    }

    info!(
        resolved = summary.resolved,
        unresolved = summary.unresolved,
        skipped = summary.skipped,
        failed = summary.failed,
        deferred = summary.deferred,
        stale_artists = summary.stale_artists,
        "classification run finished"
    );
    Ok(summary)
}
