//! # Database models
//!
//! Row types that map to the collection schema via **Diesel**.
//!
//! - [`RecordRow`]: a full stored record, embedding included. Used for upserts
//!   and for the nearest-neighbour scan.
//! - [`RecordView`]: the same row without the embedding blob, for point lookups,
//!   full scans and collection statistics.
//!
//! ## Column notes
//! - `embedding` holds the vector encoded with `bincode` (standard config).
//! - `extra` holds the caller's metadata as a JSON object string.
//! - `hit_count` is a SQLite `INTEGER` (`i64`) and never negative.
use diesel::prelude::*;

/// One stored record, as written by an upsert.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordRow {
    /// Caller-supplied unique id (typically a file path).
    pub id: String,
    /// Source text the embedding was computed from.
    pub document: String,
    /// `bincode`-encoded `Vec<f32>`.
    pub embedding: Vec<u8>,
    /// Caller metadata as a JSON object.
    pub extra: String,
    pub created_at: String,
    pub updated_at: String,
    pub hit_count: i64,
    /// Empty until the first hit.
    pub last_hit_time: String,
}

/// A stored record without its embedding.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecordView {
    pub id: String,
    pub document: String,
    pub extra: String,
    pub created_at: String,
    pub updated_at: String,
    pub hit_count: i64,
    pub last_hit_time: String,
}
