//! # VectorStore
//!
//! Persistent record storage for one collection.
//!
//! Each collection identity gets its own SQLite database
//! (`<data_dir>/<identity>.sqlite3`) accessed through **Diesel**. A record row
//! carries the document, its embedding (a `bincode` blob), the caller's metadata
//! (JSON) and the managed bookkeeping columns.
//!
//! ## Responsibilities
//! - **Upsert / delete / point get / count / full scan** keyed by record id.
//!   Upserts go through [`VectorStore::upsert_with`] so the replacement row can
//!   be built from the stored one.
//! - **Nearest neighbours**: an exact scan over every stored embedding, scored
//!   with squared Euclidean distance in parallel (`rayon`), ascending, ties broken
//!   by id.
//! - **Hit counters**: a metadata-only increment that never touches the document
//!   or embedding.
//!
//! Every call takes the store's connection lock, so each call is atomic with
//! respect to the others on the same collection. Callers that need a
//! read-then-write should use [`VectorStore::upsert_with`], which runs both
//! halves in one transaction under that lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{RecordRow, RecordView};
use crate::schema::records;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
CREATE TABLE IF NOT EXISTS records (
    id            TEXT PRIMARY KEY NOT NULL,
    document      TEXT NOT NULL,
    embedding     BLOB NOT NULL,
    extra         TEXT NOT NULL DEFAULT '{}',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    hit_count     INTEGER NOT NULL DEFAULT 0,
    last_hit_time TEXT NOT NULL DEFAULT ''
);
"#;

/// One result of a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub record: RecordView,
    /// Squared Euclidean distance to the query vector.
    pub distance: f32,
}

/// Location of the database file for `identity` under `data_dir`.
pub fn database_path(data_dir: &Path, identity: &str) -> PathBuf {
    data_dir.join(format!("{identity}.sqlite3"))
}

pub struct VectorStore {
    identity: String,
    conn: Mutex<SqliteConnection>,
}

impl VectorStore {
    /// Open (creating if absent) the database for `identity` under `data_dir`.
    ///
    /// # Errors
    /// Directory creation, connection or schema setup failures.
    pub fn open(data_dir: &Path, identity: &str) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = database_path(data_dir, identity);

        let mut conn = SqliteConnection::establish(&path.to_string_lossy())?;
        conn.batch_execute(SCHEMA)?;
        debug!("Opened collection store {} at {}", identity, path.display());

        Ok(Self {
            identity: identity.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Read the current row for `id` (if any), build the replacement with `build`
    /// and write it, all in one transaction.
    pub fn upsert_with<F>(&self, id: &str, build: F) -> Result<()>
    where
        F: FnOnce(Option<RecordView>) -> Result<RecordRow>,
    {
        let mut conn = self.conn.lock()?;
        conn.transaction(|conn| {
            let existing = records::table
                .find(id)
                .select(RecordView::as_select())
                .first(conn)
                .optional()?;
            let row = build(existing)?;
            diesel::replace_into(records::table).values(&row).execute(conn)?;
            Ok(())
        })
    }

    /// Remove `id`. Returns whether a row existed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock()?;
        let n = diesel::delete(records::table.find(id)).execute(&mut *conn)?;
        Ok(n > 0)
    }

    pub fn get(&self, id: &str) -> Result<Option<RecordView>> {
        let mut conn = self.conn.lock()?;
        let row = records::table
            .find(id)
            .select(RecordView::as_select())
            .first(&mut *conn)
            .optional()?;
        Ok(row)
    }

    /// Every record, in id order.
    pub fn get_all(&self) -> Result<Vec<RecordView>> {
        let mut conn = self.conn.lock()?;
        let rows = records::table
            .select(RecordView::as_select())
            .order(records::id.asc())
            .load(&mut *conn)?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize> {
        let mut conn = self.conn.lock()?;
        let n: i64 = records::table.count().get_result(&mut *conn)?;
        Ok(n as usize)
    }

    /// Increment `hit_count` and set `last_hit_time` for `id` in a single
    /// statement. Returns `false` when no such record exists.
    pub fn record_hit(&self, id: &str, when: &str) -> Result<bool> {
        let mut conn = self.conn.lock()?;
        let n = diesel::update(records::table.find(id))
            .set((
                records::hit_count.eq(records::hit_count + 1),
                records::last_hit_time.eq(when),
            ))
            .execute(&mut *conn)?;
        Ok(n > 0)
    }

    /// The `k` stored records closest to `query`, closest first.
    ///
    /// Records whose embedding dimension differs from the query (e.g. written by a
    /// different model) are skipped.
    pub fn query_nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<RecordRow> = {
            let mut conn = self.conn.lock()?;
            records::table
                .select(RecordRow::as_select())
                .load(&mut *conn)?
        };

        let scored: Vec<Result<Option<Neighbor>>> = rows
            .into_par_iter()
            .map(|row| {
                let embedding = decode_embedding(&row.embedding)?;
                if embedding.len() != query.len() {
                    warn!(
                        "Skipping record {} in {}: dimension {} != {}",
                        row.id,
                        self.identity,
                        embedding.len(),
                        query.len()
                    );
                    return Ok(None);
                }
                let distance = squared_euclidean(query, &embedding);
                Ok(Some(Neighbor {
                    record: RecordView {
                        id: row.id,
                        document: row.document,
                        extra: row.extra,
                        created_at: row.created_at,
                        updated_at: row.updated_at,
                        hit_count: row.hit_count,
                        last_hit_time: row.last_hit_time,
                    },
                    distance,
                }))
            })
            .collect();

        let mut neighbors = scored
            .into_iter()
            .filter_map(|r| r.transpose())
            .collect::<Result<Vec<_>>>()?;

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }
}

/// Serialize an embedding for the `embedding` column.
pub fn encode_embedding(v: &[f32]) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(v, bincode::config::standard())?)
}

/// Inverse of [`encode_embedding`].
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    let (v, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(v)
}

/// `Σ (a[i] - b[i])²` over equal-length vectors.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
