//! # Scope resolution
//!
//! A *scope* names the collection a record or query belongs to. Three shapes are
//! accepted:
//!
//! - `"knowledge"` and `"memory"`: the two global collections.
//! - `"<owner>/knowledge"` and `"<owner>/memory"`: per-team collections.
//!
//! Everything else is rejected with [`VectorError::InvalidScope`] before any
//! storage is touched.
//!
//! Team scopes are mapped to an ASCII identity of the form
//! `team_<kind>_<hash12>`, where `hash12` is the first 12 hex characters of the
//! SHA-256 digest of the full scope string. Owner names can be arbitrary UTF-8
//! (spaces, CJK, punctuation), so the hash keeps the on-disk name short and safe
//! while keeping distinct owners apart.
//!
//! ```rust
//! use memvault::scope::{resolve, CollectionKind};
//!
//! let fixed = resolve("memory").unwrap();
//! assert_eq!(fixed.identity(), "memory");
//!
//! let team = resolve("Core Team/knowledge").unwrap();
//! assert_eq!(team.kind(), CollectionKind::Knowledge);
//! assert!(team.identity().starts_with("team_knowledge_"));
//!
//! assert!(resolve("Core Team/notes").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VectorError};

/// Number of hex characters of the scope digest kept in a team identity.
const HASH_LEN: usize = 12;

/// Which of the two collection families a scope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Knowledge,
    Memory,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Knowledge => "knowledge",
            CollectionKind::Memory => "memory",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "knowledge" => Some(CollectionKind::Knowledge),
            "memory" => Some(CollectionKind::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedScope {
    /// One of the two global collections.
    Fixed(CollectionKind),
    /// A team collection. `identity` is derived once at resolution time.
    Namespaced {
        scope: String,
        owner: String,
        kind: CollectionKind,
        identity: String,
    },
}

impl ResolvedScope {
    pub fn kind(&self) -> CollectionKind {
        match self {
            ResolvedScope::Fixed(kind) => *kind,
            ResolvedScope::Namespaced { kind, .. } => *kind,
        }
    }

    /// The storage-safe collection name.
    pub fn identity(&self) -> &str {
        match self {
            ResolvedScope::Fixed(kind) => kind.as_str(),
            ResolvedScope::Namespaced { identity, .. } => identity,
        }
    }

    /// The scope string exactly as the caller supplied it.
    pub fn as_str(&self) -> &str {
        match self {
            ResolvedScope::Fixed(kind) => kind.as_str(),
            ResolvedScope::Namespaced { scope, .. } => scope,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            ResolvedScope::Fixed(_) => None,
            ResolvedScope::Namespaced { owner, .. } => Some(owner),
        }
    }
}

/// Validate and classify a scope string.
///
/// # Errors
/// [`VectorError::InvalidScope`] when the string is not one of the accepted shapes:
/// no `/` separator, a suffix other than `knowledge`/`memory`, an owner that is
/// empty or whitespace only, or an owner containing `..` or a NUL byte.
pub fn resolve(scope: &str) -> Result<ResolvedScope> {
    if let Some(kind) = CollectionKind::parse(scope) {
        return Ok(ResolvedScope::Fixed(kind));
    }

    let invalid = || VectorError::InvalidScope(scope.to_string());

    let (owner, suffix) = scope.rsplit_once('/').ok_or_else(invalid)?;
    let kind = CollectionKind::parse(suffix).ok_or_else(invalid)?;

    if owner.trim().is_empty() || owner.contains("..") || owner.contains('\0') {
        return Err(invalid());
    }

    Ok(ResolvedScope::Namespaced {
        scope: scope.to_string(),
        owner: owner.to_string(),
        kind,
        identity: team_identity(scope, kind),
    })
}

/// Derive `team_<kind>_<hash12>` from a full scope string.
fn team_identity(scope: &str, kind: CollectionKind) -> String {
    let digest = sha256::digest(scope);
    format!("team_{}_{}", kind, &digest[..HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_scopes_map_to_themselves() {
        for name in ["knowledge", "memory"] {
            let resolved = resolve(name).unwrap();
            assert_eq!(resolved.identity(), name);
            assert_eq!(resolved.as_str(), name);
            assert!(matches!(resolved, ResolvedScope::Fixed(_)));
        }
    }

    #[test]
    fn namespaced_identity_is_deterministic() {
        let a = resolve("AI Hub 维护团队/knowledge").unwrap();
        let b = resolve("AI Hub 维护团队/knowledge").unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.owner(), Some("AI Hub 维护团队"));
    }

    #[test]
    fn namespaced_identity_shape() {
        let r = resolve("team-a/memory").unwrap();
        let id = r.identity();
        assert!(id.starts_with("team_memory_"));
        let hash = id.trim_start_matches("team_memory_");
        assert_eq!(hash.len(), HASH_LEN);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(id.is_ascii());
    }

    #[test]
    fn identity_hash_matches_sha256_prefix() {
        let r = resolve("team-a/knowledge").unwrap();
        let expected = &sha256::digest("team-a/knowledge")[..HASH_LEN];
        assert_eq!(r.identity(), format!("team_knowledge_{expected}"));
    }

    #[test]
    fn distinct_owners_get_distinct_identities() {
        let a = resolve("team a/knowledge").unwrap();
        let b = resolve("team_a/knowledge").unwrap();
        let c = resolve("team a/memory").unwrap();
        assert_ne!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn splits_on_last_separator() {
        let r = resolve("org/team/knowledge").unwrap();
        assert_eq!(r.owner(), Some("org/team"));
        assert_eq!(r.kind(), CollectionKind::Knowledge);
    }

    #[test]
    fn rejects_invalid_shapes() {
        for bad in [
            "",
            "files",
            "Knowledge",
            "team/",
            "team/notes",
            "/knowledge",
            "   /memory",
            "../knowledge",
            "a/../b/memory",
            "team\0/knowledge",
            "team/knowledge/",
        ] {
            let err = resolve(bad).unwrap_err();
            assert!(err.is_client_error(), "{bad:?} should be rejected");
        }
    }
}
