//! # memvault (library root)
//!
//! A scoped semantic-memory service. Text documents are embedded with a local
//! sentence-embedding model, stored per *scope*, and queried by similarity:
//!
//! - Scope validation and collection naming (`scope`).
//! - The shared embedding model (`embedding`).
//! - Per-collection persistent storage (`vector_store`, `models`, `schema`).
//! - Record lifecycle, search ranking and hit statistics (`collection`).
//! - The process-wide collection cache (`registry`).
//! - The HTTP service, CLI and configuration (`server`, `commands`, `config`).
//!
//! ## On-disk layout
//! Defaults live under the per-platform data directory, e.g.:
//!
//! - macOS: `~/Library/Application Support/com.memvault.memvault`
//! - Linux (XDG): `~/.local/share/memvault`
//! - Windows: `C:\Users\<you>\AppData\Roaming\memvault\memvault\data`
//!
//! ```text
//! <data_dir>/data/knowledge.sqlite3
//! <data_dir>/data/memory.sqlite3
//! <data_dir>/data/team_knowledge_<hash12>.sqlite3
//! <data_dir>/models/...            (Hugging Face cache)
//! ```
//!
//! The configuration file defaults to `config_dir()/config.yaml`.
//!
//! ## Modules
//! - [`collection`], [`commands`], [`config`], [`embedding`], [`error`], [`models`],
//!   [`registry`], [`schema`], [`scope`], [`server`], [`vector_store`]

use directories::ProjectDirs;
use std::error::Error;
use std::path::PathBuf;

pub mod collection;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod models;
pub mod registry;
pub mod schema;
pub mod scope;
pub mod server;
pub mod vector_store;

pub use error::{Result, VectorError};

fn project_dirs() -> std::result::Result<ProjectDirs, Box<dyn Error>> {
    Ok(ProjectDirs::from("com", "memvault", "memvault").ok_or("Unable to determine home directory")?)
}

/// Return the per-platform configuration directory used by memvault.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform directories cannot be determined
/// (which is rare but possible in heavily sandboxed environments).
pub fn config_dir() -> std::result::Result<PathBuf, Box<dyn Error>> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Return the per-platform data directory that holds collections and the
/// model cache by default. Not created by this function.
pub fn data_dir() -> std::result::Result<PathBuf, Box<dyn Error>> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
