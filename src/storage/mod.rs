//! Persistence boundary over the three record collections.

mod sqlite;

pub use sqlite::SqliteRepository;

use crate::model::{Artist, Song, StreamingHistoryEntry};

/// A stored row that could not be decoded into its record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub id: String,
    pub reason: String,
}

/// Result of a listing: the rows that decoded, and the ones that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub malformed: Vec<MalformedRecord>,
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            malformed: Vec::new(),
        }
    }
}

/// Get/put access to songs, artists and the append-only play history.
///
/// Implementations must be safe to share between resolver workers. Writes
/// are per record; no operation spans several songs. A listing never fails
/// because of one bad row.
pub trait Repository: Send + Sync {
    fn get_song(&self, id: &str) -> anyhow::Result<Option<Song>>;
    fn put_song(&self, song: &Song) -> anyhow::Result<()>;
    fn get_artist(&self, id: &str) -> anyhow::Result<Option<Artist>>;
    fn put_artist(&self, artist: &Artist) -> anyhow::Result<()>;

    /// Songs no resolver tier has labelled yet, including earlier
    /// unresolved ones.
    fn list_unclassified_songs(&self) -> anyhow::Result<Listing<Song>>;

    /// Fails if an entry with the same id already exists.
    fn append_streaming_history_entry(&self, entry: &StreamingHistoryEntry)
    -> anyhow::Result<()>;

    fn list_songs(&self) -> anyhow::Result<Listing<Song>>;
    fn list_artists(&self) -> anyhow::Result<Listing<Artist>>;
    fn list_streaming_history(&self) -> anyhow::Result<Listing<StreamingHistoryEntry>>;
    fn list_songs_by_artist(&self, artist_id: &str) -> anyhow::Result<Listing<Song>>;

    /// Reset a song's classification to unresolved with `note`, without
    /// decoding the stored record. Returns the song's artist ids.
    fn mark_song_unresolved(&self, id: &str, note: &str, at: i64) -> anyhow::Result<Vec<String>>;
}
