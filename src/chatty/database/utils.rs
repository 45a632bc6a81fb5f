use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::Row;

/// Parses a timestamp column stored as INTEGER milliseconds since the Unix
/// epoch.
///
/// Every writer in this crate stores timestamps as milliseconds, so unlike a
/// general-purpose decoder this rejects TEXT datetime columns outright - a
/// non-integer value means the row was written by something else and should
/// surface as a decode error rather than be guessed at.
pub(crate) fn parse_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<DateTime<Utc>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    let timestamp_ms = row.try_get::<i64, _>(column_name)?;
    DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| create_column_decode_error(column_name, "Invalid timestamp value"))
}

/// Helper function to create consistent ColumnDecode errors.
pub(crate) fn create_column_decode_error(column_name: &str, message: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message,
        )),
    }
}

/// Decodes a JSON array column of message IDs into a set.
pub(crate) fn decode_id_set(json: &str, column_name: &str) -> Result<HashSet<i64>, sqlx::Error> {
    let ids: Vec<i64> =
        serde_json::from_str(json).map_err(|e| sqlx::Error::ColumnDecode {
            index: column_name.to_string(),
            source: Box::new(e),
        })?;
    Ok(ids.into_iter().collect())
}

/// Encodes a set of message IDs as a sorted JSON array so that identical
/// sets always serialize identically.
pub(crate) fn encode_id_set(ids: &HashSet<i64>) -> String {
    let mut sorted: Vec<i64> = ids.iter().copied().collect();
    sorted.sort_unstable();
    serde_json::to_string(&sorted).expect("Vec<i64> serialization cannot fail")
}
