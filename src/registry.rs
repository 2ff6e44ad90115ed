//! # Collection registry
//!
//! The registry is the process-wide context: it owns the shared embedding model
//! and one [`VectorCollection`] per scope.
//!
//! - `knowledge` and `memory` are opened eagerly when the registry is built.
//! - Team scopes are opened on first use and cached under the scope string the
//!   caller used, for the rest of the process. Entries are never evicted.
//!
//! The get-or-create path runs under one mutex, so two concurrent first requests
//! for the same new scope end up with the same collection.
//!
//! ```no_run
//! use std::sync::Arc;
//! use memvault::embedding::{ModelSpec, Pooling, SharedEmbedder};
//! use memvault::registry::CollectionRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = Arc::new(SharedEmbedder::from_spec(ModelSpec {
//!     model_id: "BAAI/bge-small-zh-v1.5".into(),
//!     revision: "main".into(),
//!     cache_dir: "/tmp/memvault/models".into(),
//!     pooling: Pooling::Cls,
//! }));
//! let registry = CollectionRegistry::open("/tmp/memvault/data", embedder)?;
//! let team = registry.get("platform team/knowledge")?;
//! team.add("README.md", "How we deploy", None)?;
//! # Ok(()) }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collection::VectorCollection;
use crate::embedding::SharedEmbedder;
use crate::error::Result;
use crate::scope::{self, CollectionKind, ResolvedScope};

/// Record counts of the two global collections.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCounts {
    pub knowledge_count: usize,
    pub memory_count: usize,
}

pub struct CollectionRegistry {
    data_dir: PathBuf,
    embedder: Arc<SharedEmbedder>,
    knowledge: Arc<VectorCollection>,
    memory: Arc<VectorCollection>,
    teams: Mutex<HashMap<String, Arc<VectorCollection>>>,
}

impl CollectionRegistry {
    /// Open the global collections under `data_dir`, bound to `embedder`.
    pub fn open(data_dir: impl AsRef<Path>, embedder: Arc<SharedEmbedder>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let knowledge = VectorCollection::open(&data_dir, CollectionKind::Knowledge.as_str(), embedder.clone())?;
        let memory = VectorCollection::open(&data_dir, CollectionKind::Memory.as_str(), embedder.clone())?;
        info!("Collection registry ready at {}", data_dir.display());

        Ok(Self {
            data_dir,
            embedder,
            knowledge: Arc::new(knowledge),
            memory: Arc::new(memory),
            teams: Mutex::new(HashMap::new()),
        })
    }

    /// The collection for `scope`, opening it on first use.
    ///
    /// # Errors
    /// [`VectorError::InvalidScope`](crate::error::VectorError::InvalidScope) for a
    /// malformed scope (nothing is created), or a store error if the collection
    /// database cannot be opened.
    pub fn get(&self, scope: &str) -> Result<Arc<VectorCollection>> {
        if let Some(existing) = self.teams.lock()?.get(scope) {
            return Ok(existing.clone());
        }
        self.get_resolved(&scope::resolve(scope)?)
    }

    /// Like [`get`](Self::get) for an already validated scope.
    pub fn get_resolved(&self, resolved: &ResolvedScope) -> Result<Arc<VectorCollection>> {
        let (scope, identity) = match resolved {
            ResolvedScope::Fixed(CollectionKind::Knowledge) => return Ok(self.knowledge.clone()),
            ResolvedScope::Fixed(CollectionKind::Memory) => return Ok(self.memory.clone()),
            ResolvedScope::Namespaced { scope, identity, .. } => (scope, identity),
        };

        let mut teams = self.teams.lock()?;
        if let Some(existing) = teams.get(scope) {
            return Ok(existing.clone());
        }
        let collection = Arc::new(VectorCollection::open(&self.data_dir, identity, self.embedder.clone())?);
        info!("Opened team collection {} for scope {:?}", identity, scope);
        teams.insert(scope.clone(), collection.clone());
        Ok(collection)
    }

    pub fn counts(&self) -> Result<FixedCounts> {
        Ok(FixedCounts {
            knowledge_count: self.knowledge.count()?,
            memory_count: self.memory.count()?,
        })
    }

    /// Team scopes opened so far, sorted.
    pub fn cached_scopes(&self) -> Result<Vec<String>> {
        let mut scopes: Vec<_> = self.teams.lock()?.keys().cloned().collect();
        scopes.sort();
        Ok(scopes)
    }

    pub fn embedder(&self) -> &Arc<SharedEmbedder> {
        &self.embedder
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing;
    use tempfile::TempDir;

    fn registry() -> (TempDir, CollectionRegistry) {
        let dir = TempDir::new().unwrap();
        let reg = CollectionRegistry::open(dir.path(), testing::shared()).unwrap();
        (dir, reg)
    }

    #[test]
    fn fixed_collections_exist_from_the_start() {
        let (dir, reg) = registry();
        assert!(dir.path().join("knowledge.sqlite3").exists());
        assert!(dir.path().join("memory.sqlite3").exists());
        assert_eq!(
            reg.counts().unwrap(),
            FixedCounts { knowledge_count: 0, memory_count: 0 }
        );
        assert!(reg.cached_scopes().unwrap().is_empty());
    }

    #[test]
    fn get_is_idempotent() {
        let (_dir, reg) = registry();
        let a = reg.get("team x/memory").unwrap();
        let b = reg.get("team x/memory").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&reg.get("knowledge").unwrap(), &reg.get("knowledge").unwrap()));
        assert_eq!(reg.cached_scopes().unwrap(), ["team x/memory"]);
    }

    #[test]
    fn team_collections_are_isolated() {
        let (_dir, reg) = registry();
        reg.get("a/knowledge").unwrap().add("doc", "alpha", None).unwrap();

        assert_eq!(reg.get("a/knowledge").unwrap().count().unwrap(), 1);
        assert_eq!(reg.get("b/knowledge").unwrap().count().unwrap(), 0);
        assert_eq!(reg.get("a/memory").unwrap().count().unwrap(), 0);
        assert_eq!(reg.counts().unwrap().knowledge_count, 0);
    }

    #[test]
    fn team_collection_file_uses_derived_identity() {
        let (dir, reg) = registry();
        let c = reg.get("ops/knowledge").unwrap();
        let expected = scope::resolve("ops/knowledge").unwrap();
        assert_eq!(c.identity(), expected.identity());
        assert!(dir.path().join(format!("{}.sqlite3", c.identity())).exists());
    }

    #[test]
    fn invalid_scope_creates_nothing() {
        let (dir, reg) = registry();
        for bad in ["", "x/other", "../knowledge", " /memory"] {
            assert!(reg.get(bad).err().is_some_and(|e| e.is_client_error()));
        }
        assert!(reg.cached_scopes().unwrap().is_empty());
        let files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "sqlite3")
            })
            .count();
        assert_eq!(files, 2);
    }

    #[test]
    fn concurrent_first_access_yields_one_collection() {
        let (_dir, reg) = registry();
        let reg = Arc::new(reg);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || reg.get("racers/knowledge").unwrap())
            })
            .collect();
        let got: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(got.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(reg.cached_scopes().unwrap().len(), 1);
    }

    #[test]
    fn get_resolved_matches_get() {
        let (_dir, reg) = registry();
        let resolved = scope::resolve("t/memory").unwrap();
        assert!(Arc::ptr_eq(
            &reg.get_resolved(&resolved).unwrap(),
            &reg.get("t/memory").unwrap()
        ));
        let fixed = scope::resolve("memory").unwrap();
        assert!(Arc::ptr_eq(&reg.get_resolved(&fixed).unwrap(), &reg.get("memory").unwrap()));
    }

    #[test]
    fn fixed_scopes_never_enter_the_team_cache() {
        let (_dir, reg) = registry();
        for name in [CollectionKind::Knowledge.as_str(), CollectionKind::Memory.as_str()] {
            reg.get(name).unwrap();
        }
        assert!(Arc::ptr_eq(&reg.get("knowledge").unwrap(), &reg.knowledge));
        assert!(Arc::ptr_eq(&reg.get("memory").unwrap(), &reg.memory));
        assert!(reg.cached_scopes().unwrap().is_empty());
    }
}
