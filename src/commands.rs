//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options. Flags that override configuration values can also be supplied through
//! the environment variables named below.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use memvault::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Serve { .. } => { /* start the HTTP service */ }
//!     Commands::Prefetch { .. } => { /* download the embedding model */ }
//!     Commands::Stats { .. } => { /* print collection statistics */ }
//!     Commands::Init => { /* write a default config */ }
//! }
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::MemvaultConfig;
use crate::embedding::Pooling;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Path of the YAML configuration file.
    #[arg(long, short = 'c', global = true, env = "MEMVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Model location overrides shared by several subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Embedding model cache directory.
    #[arg(long, env = "EMBEDDING_MODEL_PATH")]
    pub model_dir: Option<PathBuf>,

    /// Hugging Face repository of the embedding model.
    #[arg(long, env = "EMBEDDING_MODEL_NAME")]
    pub model: Option<String>,

    /// Pooling strategy (`cls` or `mean`).
    #[arg(long)]
    pub pooling: Option<Pooling>,
}

impl ModelArgs {
    pub fn apply(&self, config: &mut MemvaultConfig) {
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(pooling) = self.pooling {
            config.pooling = pooling;
        }
    }
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service.
    ///
    /// The embedding model is loaded before the listener is bound; if it cannot be
    /// loaded the process exits.
    #[clap(name = "serve", alias = "s")]
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long, short = 'p', env = "VECTOR_ENGINE_PORT")]
        port: Option<u16>,

        /// Root directory of the collection databases.
        #[arg(long, env = "VECTOR_DB_PATH")]
        data_dir: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Download the embedding model into the cache and check that it loads.
    Prefetch {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Print the statistics of one scope as JSON.
    Stats {
        #[arg(long, short = 's', default_value = "knowledge")]
        scope: String,

        #[arg(long, env = "VECTOR_DB_PATH")]
        data_dir: Option<PathBuf>,
    },

    /// Write a default configuration file.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from([
            "memvault", "serve", "--port", "9001", "--data-dir", "/tmp/d", "--pooling", "mean",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve {
                port,
                data_dir,
                model,
                host,
            } => {
                assert_eq!(port, Some(9001));
                assert_eq!(data_dir, Some(PathBuf::from("/tmp/d")));
                assert_eq!(model.pooling, Some(Pooling::Mean));
                assert!(host.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn stats_defaults_to_knowledge() {
        let cli = Cli::try_parse_from(["memvault", "stats"]).unwrap();
        assert!(matches!(cli.command, Commands::Stats { ref scope, .. } if scope == "knowledge"));
    }

    #[test]
    fn model_args_override_config() {
        let mut config = MemvaultConfig::default();
        ModelArgs {
            model_dir: Some(PathBuf::from("/models")),
            model: Some("sentence-transformers/all-MiniLM-L6-v2".into()),
            pooling: Some(Pooling::Mean),
        }
        .apply(&mut config);
        assert_eq!(config.model_dir, PathBuf::from("/models"));
        assert_eq!(config.model, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(config.pooling, Pooling::Mean);
    }
}
