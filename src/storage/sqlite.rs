use super::{Listing, MalformedRecord, Repository};
use crate::model::{Artist, LanguageDistribution, Song, StreamingHistoryEntry, now_unix_ms};
use anyhow::Context;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

const SONG_COLUMNS: &str = "s.id, s.title, s.album_id, s.album_name, s.release_year, \
     s.duration_ms, s.language, s.is_soundtrack, s.classification_source, s.has_lyrics, \
     s.classified_at, s.classification_note";

impl SqliteRepository {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }

        let conn = Connection::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        let s = Self {
            conn: Mutex::new(conn),
        };
        s.init_schema()?;
        Ok(s)
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn()?
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS songs (
  id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  album_id TEXT,
  album_name TEXT,
  release_year INTEGER,
  duration_ms INTEGER,
  language TEXT NOT NULL DEFAULT 'unknown',
  is_soundtrack INTEGER NOT NULL DEFAULT 0,
  classification_source TEXT,
  has_lyrics INTEGER,
  classified_at INTEGER,
  classification_note TEXT,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS song_artists (
  song_id TEXT NOT NULL,
  artist_id TEXT NOT NULL,
  position INTEGER NOT NULL,
  PRIMARY KEY (song_id, position)
);

CREATE INDEX IF NOT EXISTS idx_song_artists_artist ON song_artists(artist_id);
CREATE INDEX IF NOT EXISTS idx_songs_unclassified ON songs(classification_source)
  WHERE classification_source IS NULL;

CREATE TABLE IF NOT EXISTS artists (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  genres_json TEXT NOT NULL,
  distribution_json TEXT NOT NULL,
  aggregated_language TEXT NOT NULL DEFAULT 'unknown',
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS streaming_history (
  id TEXT PRIMARY KEY,
  song_id TEXT NOT NULL,
  played_at INTEGER NOT NULL,
  ms_played INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_song ON streaming_history(song_id);
CREATE INDEX IF NOT EXISTS idx_history_played_at ON streaming_history(played_at DESC);
"#,
            )
            .context("init schema")?;
        Ok(())
    }

    /// Run raw SQL against the database, bypassing record encoding.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> anyhow::Result<usize> {
        Ok(self.conn()?.execute(sql, [])?)
    }

    fn query_songs(
        conn: &Connection,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> anyhow::Result<Listing<Song>> {
        let sql = format!("SELECT {SONG_COLUMNS} FROM songs s {filter} ORDER BY s.id");
        let mut stmt = conn.prepare(&sql).context("prepare song query")?;
        let rows = stmt
            .query_map(args, |row| keyed(row, song_from_row))
            .context("query songs")?;
        let mut listing = collect_listing(rows, "song")?;

        let mut links = Self::song_artist_links(conn)?;
        for song in &mut listing.records {
            song.artist_ids = links.remove(&song.id).unwrap_or_default();
        }
        Ok(listing)
    }

    fn artist_ids(conn: &Connection, song_id: &str) -> anyhow::Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT artist_id FROM song_artists WHERE song_id=?1 ORDER BY position")
            .context("prepare song artists")?;
        let ids = stmt
            .query_map(params![song_id], |row| row.get(0))
            .context("query song artists")?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("read song artist row")?;
        Ok(ids)
    }

    fn song_artist_links(conn: &Connection) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let mut stmt = conn
            .prepare("SELECT song_id, artist_id FROM song_artists ORDER BY song_id, position")
            .context("prepare song artists")?;
        let mut links: HashMap<String, Vec<String>> = HashMap::new();
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("query song artists")?;
        for row in rows {
            let (song_id, artist_id) = row.context("read song artist row")?;
            links.entry(song_id).or_default().push(artist_id);
        }
        Ok(links)
    }
}

impl Repository for SqliteRepository {
    fn get_song(&self, id: &str) -> anyhow::Result<Option<Song>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SONG_COLUMNS} FROM songs s WHERE s.id=?1");
        let song = conn
            .query_row(&sql, params![id], song_from_row)
            .optional()
            .with_context(|| format!("read song {id}"))?;
        let Some(mut song) = song else {
            return Ok(None);
        };
        song.artist_ids = Self::artist_ids(&conn, id)?;
        Ok(Some(song))
    }

    fn put_song(&self, song: &Song) -> anyhow::Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("begin song write")?;
        tx.execute(
            r#"
INSERT INTO songs(id, title, album_id, album_name, release_year, duration_ms, language,
                  is_soundtrack, classification_source, has_lyrics, classified_at,
                  classification_note, updated_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
ON CONFLICT(id) DO UPDATE SET
  title=excluded.title,
  album_id=excluded.album_id,
  album_name=excluded.album_name,
  release_year=excluded.release_year,
  duration_ms=excluded.duration_ms,
  language=excluded.language,
  is_soundtrack=excluded.is_soundtrack,
  classification_source=excluded.classification_source,
  has_lyrics=excluded.has_lyrics,
  classified_at=excluded.classified_at,
  classification_note=excluded.classification_note,
  updated_at=excluded.updated_at
"#,
            params![
                song.id,
                song.title,
                song.album_id,
                song.album_name,
                song.release_year,
                song.duration_ms,
                song.language.as_str(),
                song.is_soundtrack,
                song.classification_source.map(|s| s.as_str()),
                song.has_lyrics,
                song.classified_at,
                song.classification_note,
                now_unix_ms(),
            ],
        )
        .with_context(|| format!("write song {}", song.id))?;

        tx.execute("DELETE FROM song_artists WHERE song_id=?1", params![song.id])
            .context("clear song artists")?;
        for (position, artist_id) in song.artist_ids.iter().enumerate() {
            tx.execute(
                "INSERT INTO song_artists(song_id, artist_id, position) VALUES(?1, ?2, ?3)",
                params![song.id, artist_id, position as i64],
            )
            .context("link song artist")?;
        }
        tx.commit().context("commit song write")?;
        Ok(())
    }

    fn get_artist(&self, id: &str) -> anyhow::Result<Option<Artist>> {
        self.conn()?
            .query_row(
                "SELECT id, name, genres_json, distribution_json, aggregated_language \
                 FROM artists WHERE id=?1",
                params![id],
                artist_from_row,
            )
            .optional()
            .with_context(|| format!("read artist {id}"))
    }

    fn put_artist(&self, artist: &Artist) -> anyhow::Result<()> {
        let genres_json = serde_json::to_string(&artist.genres).context("encode genres")?;
        let distribution_json =
            serde_json::to_string(&artist.language_distribution).context("encode distribution")?;
        self.conn()?
            .execute(
                r#"
INSERT INTO artists(id, name, genres_json, distribution_json, aggregated_language, updated_at)
VALUES(?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(id) DO UPDATE SET
  name=excluded.name,
  genres_json=excluded.genres_json,
  distribution_json=excluded.distribution_json,
  aggregated_language=excluded.aggregated_language,
  updated_at=excluded.updated_at
"#,
                params![
                    artist.id,
                    artist.name,
                    genres_json,
                    distribution_json,
                    artist.aggregated_language.as_str(),
                    now_unix_ms(),
                ],
            )
            .with_context(|| format!("write artist {}", artist.id))?;
        Ok(())
    }

    fn list_unclassified_songs(&self) -> anyhow::Result<Listing<Song>> {
        let conn = self.conn()?;
        Self::query_songs(&conn, "WHERE s.classification_source IS NULL", &[])
    }

    fn append_streaming_history_entry(
        &self,
        entry: &StreamingHistoryEntry,
    ) -> anyhow::Result<()> {
        let played_at_ms = (entry.played_at.unix_timestamp_nanos() / 1_000_000) as i64;
        self.conn()?
            .execute(
                r#"
INSERT INTO streaming_history(id, song_id, played_at, ms_played)
VALUES(?1, ?2, ?3, ?4)
"#,
                params![entry.id, entry.song_id, played_at_ms, entry.ms_played],
            )
            .with_context(|| format!("append history entry {}", entry.id))?;
        Ok(())
    }

    fn list_songs(&self) -> anyhow::Result<Listing<Song>> {
        let conn = self.conn()?;
        Self::query_songs(&conn, "", &[])
    }

    fn list_artists(&self) -> anyhow::Result<Listing<Artist>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, genres_json, distribution_json, aggregated_language \
                 FROM artists ORDER BY id",
            )
            .context("prepare artist list")?;
        let rows = stmt
            .query_map([], |row| keyed(row, artist_from_row))
            .context("query artists")?;
        collect_listing(rows, "artist")
    }

    fn list_streaming_history(&self) -> anyhow::Result<Listing<StreamingHistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, song_id, played_at, ms_played FROM streaming_history \
                 ORDER BY played_at, id",
            )
            .context("prepare history list")?;
        let rows = stmt
            .query_map([], |row| keyed(row, history_from_row))
            .context("query history")?;
        collect_listing(rows, "history")
    }

    fn list_songs_by_artist(&self, artist_id: &str) -> anyhow::Result<Listing<Song>> {
        let conn = self.conn()?;
        Self::query_songs(
            &conn,
            "WHERE s.id IN (SELECT song_id FROM song_artists WHERE artist_id=?1)",
            &[&artist_id],
        )
    }

    fn mark_song_unresolved(&self, id: &str, note: &str, at: i64) -> anyhow::Result<Vec<String>> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                r#"
UPDATE songs SET
  language='unknown',
  is_soundtrack=0,
  classification_source=NULL,
  classified_at=?2,
  classification_note=?3,
  updated_at=?4
WHERE id=?1
"#,
                params![id, at, note, now_unix_ms()],
            )
            .with_context(|| format!("mark song {id} unresolved"))?;
        if changed == 0 {
            anyhow::bail!("song {id} not found");
        }
        Self::artist_ids(&conn, id)
    }
}

/// Pair a decoded record with its id so a bad row can still be named.
fn keyed<T>(
    row: &Row<'_>,
    decode: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<(String, rusqlite::Result<T>)> {
    Ok((row.get(0)?, decode(row)))
}

fn collect_listing<T, I>(rows: I, what: &str) -> anyhow::Result<Listing<T>>
where
    I: Iterator<Item = rusqlite::Result<(String, rusqlite::Result<T>)>>,
{
    let mut listing = Listing::default();
    for row in rows {
        let (id, decoded) = row.with_context(|| format!("read {what} row"))?;
        match decoded {
            Ok(record) => listing.records.push(record),
            Err(e) => listing.malformed.push(MalformedRecord {
                id,
                reason: e.to_string(),
            }),
        }
    }
    Ok(listing)
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<StreamingHistoryEntry> {
    let played_at_ms: i64 = row.get(2)?;
    let played_at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(played_at_ms) * 1_000_000)
        .map_err(|e| conversion_error(2, Type::Integer, e))?;
    Ok(StreamingHistoryEntry {
        id: row.get(0)?,
        song_id: row.get(1)?,
        played_at,
        ms_played: row.get(3)?,
    })
}

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    let language: String = row.get(6)?;
    let source: Option<String> = row.get(8)?;
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        artist_ids: Vec::new(),
        album_id: row.get(2)?,
        album_name: row.get(3)?,
        release_year: row.get(4)?,
        duration_ms: row.get(5)?,
        language: parse_column(6, &language)?,
        is_soundtrack: row.get(7)?,
        classification_source: source.map(|s| parse_column(8, &s)).transpose()?,
        has_lyrics: row.get(9)?,
        classified_at: row.get(10)?,
        classification_note: row.get(11)?,
    })
}

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<Artist> {
    let genres_json: String = row.get(2)?;
    let distribution_json: String = row.get(3)?;
    let aggregated: String = row.get(4)?;

    let genres: BTreeSet<String> =
        serde_json::from_str(&genres_json).map_err(|e| conversion_error(2, Type::Text, e))?;
    let language_distribution: LanguageDistribution = serde_json::from_str(&distribution_json)
        .map_err(|e| conversion_error(3, Type::Text, e))?;

    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        genres,
        language_distribution,
        aggregated_language: parse_column(4, &aggregated)?,
    })
}

fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    raw.parse()
        .map_err(|e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn conversion_error<E>(idx: usize, ty: Type, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}
