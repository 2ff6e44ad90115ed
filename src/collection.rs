//! # Collections
//!
//! A [`VectorCollection`] is one logical set of records sharing an embedding
//! space: the two global collections (`knowledge`, `memory`) and one per team
//! scope. It glues the shared embedding model to the collection's
//! [`VectorStore`] and owns the record lifecycle rules:
//!
//! - `add` upserts with managed bookkeeping (`created_at`, `updated_at`,
//!   `hit_count`, `last_hit_time`). Callers cannot write the managed fields;
//!   re-adding an id keeps its creation time and usage counters.
//! - `search` converts store distances into a `[0, 1]` similarity
//!   (see [`similarity_from_distance`]) and never records hits on its own.
//! - `record_hit` bumps the usage counters of a single record atomically.
//! - `stats` lists usage counters, most-hit first.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::embedding::SharedEmbedder;
use crate::error::Result;
use crate::models::{RecordRow, RecordView};
use crate::vector_store::{VectorStore, database_path, encode_embedding};

/// Format of every managed timestamp (local time, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Metadata keys owned by the collection. Caller-supplied values under these
/// names are discarded.
pub const MANAGED_FIELDS: [&str; 4] = ["created_at", "updated_at", "hit_count", "last_hit_time"];

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Map a raw squared-L2 distance between unit vectors (range `[0, 4]`) to a
/// similarity in `[0, 1]`: `clamp(1 - d / 2, 0, 1)`, rounded to 4 decimals.
pub fn similarity_from_distance(distance: f32) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    let s = (1.0 - f64::from(distance) / 2.0).clamp(0.0, 1.0);
    (s * 10_000.0).round() / 10_000.0
}

/// Metadata of a stored record: the managed fields plus whatever the caller
/// attached. Serialized as one flat JSON object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RecordMetadata {
    pub created_at: String,
    pub updated_at: String,
    pub hit_count: u64,
    pub last_hit_time: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TryFrom<&RecordView> for RecordMetadata {
    type Error = crate::error::VectorError;

    fn try_from(row: &RecordView) -> Result<Self> {
        let mut extra: Map<String, Value> = serde_json::from_str(&row.extra)?;
        strip_managed(&mut extra);
        Ok(Self {
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
            hit_count: row.hit_count.max(0) as u64,
            last_hit_time: row.last_hit_time.clone(),
            extra,
        })
    }
}

fn strip_managed(extra: &mut Map<String, Value>) {
    for key in MANAGED_FIELDS {
        extra.remove(key);
    }
}

/// A record as returned by a point lookup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub document: String,
    pub metadata: RecordMetadata,
}

/// One search result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub similarity: f64,
    pub metadata: RecordMetadata,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HitStat {
    pub id: String,
    pub hit_count: u64,
    pub last_hit_time: String,
}

impl From<RecordView> for HitStat {
    fn from(row: RecordView) -> Self {
        Self {
            id: row.id,
            hit_count: row.hit_count.max(0) as u64,
            last_hit_time: row.last_hit_time,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CollectionStats {
    pub total: usize,
    pub records: Vec<HitStat>,
}

pub struct VectorCollection {
    store: VectorStore,
    embedder: Arc<SharedEmbedder>,
}

impl VectorCollection {
    /// Open the collection named `identity` under `data_dir`, bound to the shared
    /// embedding model. The model itself is not touched until the first write or
    /// query.
    pub fn open(data_dir: &Path, identity: &str, embedder: Arc<SharedEmbedder>) -> Result<Self> {
        Ok(Self {
            store: VectorStore::open(data_dir, identity)?,
            embedder,
        })
    }

    /// Like [`open`](Self::open), but only if the collection's database already
    /// exists. Nothing is created on disk when it doesn't.
    pub fn open_existing(
        data_dir: &Path,
        identity: &str,
        embedder: Arc<SharedEmbedder>,
    ) -> Result<Option<Self>> {
        if !database_path(data_dir, identity).exists() {
            debug!("No database for collection {}", identity);
            return Ok(None);
        }
        Self::open(data_dir, identity, embedder).map(Some)
    }

    pub fn identity(&self) -> &str {
        self.store.identity()
    }

    /// Upsert `id` with `text` and optional caller metadata.
    ///
    /// The document, embedding and caller metadata are replaced wholesale.
    /// `created_at`, `hit_count` and `last_hit_time` carry over from an existing
    /// record (or start at now / 0 / empty); `updated_at` is always now.
    pub fn add(&self, id: &str, text: &str, metadata: Option<Map<String, Value>>) -> Result<()> {
        let embedding = self.embedder.get()?.encode_one(text)?;
        let embedding = encode_embedding(&embedding)?;

        let mut extra = metadata.unwrap_or_default();
        strip_managed(&mut extra);
        let extra = serde_json::to_string(&extra)?;
        let now = now_timestamp();

        self.store.upsert_with(id, |existing| {
            let (created_at, hit_count, last_hit_time) = match existing {
                Some(prev) => (prev.created_at, prev.hit_count, prev.last_hit_time),
                None => (now.clone(), 0, String::new()),
            };
            Ok(RecordRow {
                id: id.to_string(),
                document: text.to_string(),
                embedding,
                extra,
                created_at,
                updated_at: now,
                hit_count,
                last_hit_time,
            })
        })?;

        debug!("Upserted {} into {}", id, self.identity());
        Ok(())
    }

    /// The `top_k` records most similar to `query`, most similar first.
    ///
    /// Returns an empty list for an empty collection (without loading the model)
    /// and never asks the store for more neighbours than it holds.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let total = self.store.count()?;
        if total == 0 || top_k == 0 {
            return Ok(Vec::new());
        }
        let k = top_k.min(total);

        let query_vec = self.embedder.get()?.encode_one(query)?;
        self.store
            .query_nearest(&query_vec, k)?
            .into_iter()
            .map(|n| {
                Ok(SearchHit {
                    metadata: RecordMetadata::try_from(&n.record)?,
                    similarity: similarity_from_distance(n.distance),
                    id: n.record.id,
                    document: n.record.document,
                })
            })
            .collect()
    }

    /// Search, then record one hit for every returned record.
    ///
    /// The returned results reflect the counters as they were before this search.
    pub fn search_and_record(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let results = self.search(query, top_k)?;
        for hit in &results {
            self.record_hit(&hit.id)?;
        }
        Ok(results)
    }

    /// Count one hit on `id`. A missing record is ignored.
    ///
    /// The increment is a single store statement, so concurrent hits on the same
    /// id are never lost.
    pub fn record_hit(&self, id: &str) -> Result<()> {
        if !self.store.record_hit(id, &now_timestamp())? {
            debug!("Hit on missing record {} in {}", id, self.identity());
        }
        Ok(())
    }

    /// Remove `id`; removing a missing id is a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.store.delete(id)? {
            debug!("Deleted {} from {}", id, self.identity());
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        self.store
            .get(id)?
            .map(|row| {
                Ok(StoredRecord {
                    metadata: RecordMetadata::try_from(&row)?,
                    id: row.id,
                    document: row.document,
                })
            })
            .transpose()
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }

    /// Record count plus per-record usage, highest `hit_count` first.
    pub fn stats(&self) -> Result<CollectionStats> {
        let total = self.store.count()?;
        if total == 0 {
            return Ok(CollectionStats::default());
        }
        // Rows come back in id order; the stable sort keeps it among equal counts.
        let mut records: Vec<HitStat> = self.store.get_all()?.into_iter().map(HitStat::from).collect();
        records.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        Ok(CollectionStats { total, records })
    }
}
