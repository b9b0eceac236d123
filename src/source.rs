use log::{debug, info};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqliteRow};
use sqlx::{ConnectOptions, Connection, Decode, Row, Type};
use std::path::{Path, PathBuf};

use crate::episode::RawEpisodeRow;

/// Every playback event, joined to its podcast and to both the episode and the
/// podcast artwork. Artwork precedence is resolved when the row is normalized.
const LISTENING_HISTORY_QUERY: &str = "
    SELECT
        e.name,
        p.name,
        e.url,
        e.playbackDate,
        e.duration_ms,
        b1.url AS episode_artwork_url,
        b2.url AS podcast_artwork_url
    FROM episodes e
    INNER JOIN podcasts p ON e.podcast_id = p._id
    LEFT JOIN bitmaps b1 ON e.thumbnail_id = b1._id
    LEFT JOIN bitmaps b2 ON p.thumbnail_id = b2._id
    WHERE e.playbackDate > 0
    ORDER BY e.playbackDate";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Database file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Reads the complete listening history from the database at `db_path`.
///
/// The connection is opened read-only and closed before returning, on the
/// error path as well.
pub async fn fetch_history_rows(db_path: &Path) -> Result<Vec<RawEpisodeRow>, SourceError> {
    if !db_path.is_file() {
        return Err(SourceError::NotFound(db_path.to_path_buf()));
    }

    let mut conn = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .connect()
        .await?;
    debug!("Opened {} read-only", db_path.display());

    let fetched = sqlx::query(LISTENING_HISTORY_QUERY)
        .fetch_all(&mut conn)
        .await;
    let closed = conn.close().await;

    let rows = fetched?;
    closed?;

    let history: Vec<RawEpisodeRow> = rows.iter().map(history_row).collect();

    info!(
        "Loaded {} playback events from {}",
        history.len(),
        db_path.display()
    );
    Ok(history)
}

/// Maps one result row. A value of the wrong type is read as absent and the
/// column is recorded, so the record is rejected on its own instead of failing
/// the whole query.
fn history_row(row: &SqliteRow) -> RawEpisodeRow {
    let mut invalid_column = None;

    RawEpisodeRow {
        episode_name: column(row, 0, "episode name", &mut invalid_column),
        podcast_name: column(row, 1, "podcast name", &mut invalid_column),
        url: column(row, 2, "url", &mut invalid_column),
        playback_date_ms: column(row, 3, "playback date", &mut invalid_column),
        duration_ms: column(row, 4, "duration", &mut invalid_column),
        episode_artwork_url: column(row, 5, "episode artwork", &mut invalid_column),
        podcast_artwork_url: column(row, 6, "podcast artwork", &mut invalid_column),
        invalid_column,
    }
}

fn column<'r, T>(
    row: &'r SqliteRow,
    idx: usize,
    name: &'static str,
    invalid_column: &mut Option<&'static str>,
) -> Option<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unreadable {} column: {}", name, e);
            invalid_column.get_or_insert(name);
            None
        }
    }
}
