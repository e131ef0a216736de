mod classify;
mod config;
mod detect;
mod error;
mod limiter;
mod lyrics;
mod model;
mod pipeline;
mod storage;
#[cfg(test)]
mod testing;
mod validate;

use anyhow::Context;
use clap::{Parser, Subcommand};
use classify::Resolver;
use limiter::{RateLimiter, RunBudget, ThrottledDetector, ThrottledFetcher};
use model::{Artist, Song, StreamingHistoryEntry};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use storage::{Repository, SqliteRepository};
use validate::Validator;

#[derive(Debug, Parser)]
#[command(name = "songlang", version, about = "Song language classification")]
struct Cli {
    /// Override config file path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify every song that has no label yet.
    Classify {
        /// Reclassify songs that already have a label.
        #[arg(long)]
        force: bool,
        /// Songs resolved concurrently (overrides config).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Check stored records for inconsistencies.
    Validate {
        /// Rewrite drifted artist aggregates.
        #[arg(long)]
        repair: bool,
    },
    /// Print one song and its artists as JSON.
    Show { song_id: String },
    /// Import songs, artists and history from a JSON file.
    Load { path: PathBuf },
}

/// Shape accepted by `load`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Corpus {
    artists: Vec<Artist>,
    songs: Vec<Song>,
    history: Vec<StreamingHistoryEntry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut cfg = config::load(cli.config.as_deref()).context("load config")?;
    cfg.validate().context("invalid config")?;

    let repo = Arc::new(SqliteRepository::open(&cfg.paths.database)?);

    match cli.command {
        Command::Classify { force, workers } => {
            if let Some(workers) = workers {
                cfg.limits.workers = workers;
                cfg.validate().context("invalid --workers")?;
            }

            let limiter = Arc::new(RateLimiter::from_config(&cfg.limits));
            let lyrics = Arc::new(ThrottledFetcher::new(
                Arc::new(lyrics::LrclibClient::new(&cfg.lyrics)?),
                limiter.clone(),
            ));
            let detector = Arc::new(ThrottledDetector::new(
                Arc::new(detect::LibreTranslateClient::new(&cfg.detector)?),
                limiter.clone(),
            ));
            let resolver = Resolver::new(&cfg, repo.clone(), lyrics, detector)
                .context("build resolver")?;
            let budget = RunBudget::from_config(limiter.clone(), &cfg.limits);

            let summary =
                pipeline::run(Arc::new(resolver), repo, cfg.limits.workers, budget, force).await?;
            println!(
                "resolved={} unresolved={} skipped={} failed={} deferred={} stale_artists={} calls={}",
                summary.resolved,
                summary.unresolved,
                summary.skipped,
                summary.failed,
                summary.deferred,
                summary.stale_artists,
                limiter.calls()
            );
        }
        Command::Validate { repair } => {
            let validator = Validator::from_config(&cfg, repair.then_some(true))
                .context("build validator")?;
            let report = validator.run(repo.as_ref())?;
            for v in &report.violations {
                println!("{} {} {}: {}", v.entity_type, v.entity_id, v.kind, v.details);
            }
            println!(
                "clean={} violations={} repairs={} repair_enabled={}",
                report.is_clean(),
                report.summary.violations, report.summary.repairs, report.summary.repair_enabled
            );
            let unrepaired = report
                .violations
                .iter()
                .any(|v| !(report.summary.repair_enabled && v.kind.is_repairable()));
            if unrepaired {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Show { song_id } => {
            let song = repo
                .get_song(&song_id)?
                .with_context(|| format!("song {song_id} not found"))?;
            let mut artists = Vec::new();
            for id in &song.artist_ids {
                if let Some(artist) = repo.get_artist(id)? {
                    artists.push(artist);
                }
            }
            let language_name = song.effective_label().display_name().to_string();
            let v = serde_json::json!({
                "song": song,
                "language_name": language_name,
                "artists": artists,
            });
            println!("{}", serde_json::to_string_pretty(&v)?);
        }
        Command::Load { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?;
            let corpus: Corpus = serde_json::from_str(&raw)
                .with_context(|| format!("parse {}", path.display()))?;

            for artist in &corpus.artists {
                repo.put_artist(artist)?;
            }
            for song in &corpus.songs {
                repo.put_song(song)?;
            }
            for entry in &corpus.history {
                repo.append_streaming_history_entry(entry)
                    .with_context(|| format!("history entry {}", entry.id))?;
            }
            println!(
                "loaded artists={} songs={} history={}",
                corpus.artists.len(),
                corpus.songs.len(),
                corpus.history.len()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
