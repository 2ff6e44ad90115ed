//! # Embeddings
//!
//! Sentence embeddings for memvault, computed with Candle (pure Rust ML framework)
//! from a BERT-family model fetched from the Hugging Face Hub.
//!
//! ## Responsibilities
//! - **Loading**: downloads `config.json`, `tokenizer.json` and `model.safetensors`
//!   into the model cache directory and builds a [`BertModel`].
//! - **Encoding**: tokenizes (truncating at 512 tokens), runs inference, pools
//!   (`[CLS]` or attention-masked mean) and L2-normalises.
//! - **Sharing**: [`SharedEmbedder`] builds the model at most once per process and
//!   hands the same instance to every collection.
//!
//! The [`TextEncoder`] trait is the seam between collections and the model, so
//! anything that maps text to vectors can stand in for the network weights.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::ApiBuilder};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{Result, VectorError};

/// Longest input (in tokens) fed to the model.
const MAX_TOKENS: usize = 512;

/// Anything that turns text into fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input order.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single text.
    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text.to_string()])?
            .pop()
            .ok_or_else(|| VectorError::Embedding("encoder returned no vector".into()))
    }
}

/// How token embeddings are reduced to a sentence embedding.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// First token (`[CLS]`), as the BGE family expects.
    #[default]
    Cls,
    /// Attention-masked mean, as sentence-transformers MiniLM models expect.
    Mean,
}

impl std::str::FromStr for Pooling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cls" => Ok(Pooling::Cls),
            "mean" => Ok(Pooling::Mean),
            other => Err(format!("unknown pooling '{other}', expected 'cls' or 'mean'")),
        }
    }
}

/// Where to get a model and how to pool it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Hugging Face repository id, e.g. `BAAI/bge-small-zh-v1.5`.
    pub model_id: String,
    pub revision: String,
    /// Download cache for model artifacts.
    pub cache_dir: PathBuf,
    pub pooling: Pooling,
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pooling: Pooling,
}

impl SentenceEmbeddingsModel {
    /// Load the model from the Hugging Face Hub, using `spec.cache_dir` as cache.
    pub fn load(spec: &ModelSpec) -> std::result::Result<Self, Box<dyn Error>> {
        let device = Device::Cpu;
        std::fs::create_dir_all(&spec.cache_dir)?;

        info!(
            "Loading embedding model {} ({}) from cache {}",
            spec.model_id,
            spec.revision,
            spec.cache_dir.display()
        );

        let repo = Repo::with_revision(spec.model_id.clone(), RepoType::Model, spec.revision.clone());
        let api = ApiBuilder::new()
            .with_cache_dir(spec.cache_dir.clone())
            .with_progress(false)
            .build()?;
        let api_repo = api.repo(repo);

        let config_filename = api_repo.get("config.json")?;
        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| format!("Failed to load tokenizer: {e}"))?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| format!("Failed to configure tokenizer: {e}"))?;

        // SAFETY: the weights file lives in the model cache and is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            pooling: spec.pooling,
        })
    }

    /// Encode one text into a normalised embedding.
    pub fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, Box<dyn Error>> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("Tokenization error: {e}"))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        // [1, seq_len, hidden]
        let output = self.model.forward(&token_ids, &token_type_ids, None)?;

        let pooled = match self.pooling {
            Pooling::Cls => output.i((0, 0))?,
            Pooling::Mean => self.mean_pooling(&output, tokens.get_attention_mask())?,
        };

        Ok(normalize(&pooled)?.to_vec1::<f32>()?)
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(
        &self,
        embeddings: &Tensor,
        attention_mask: &[u32],
    ) -> std::result::Result<Tensor, Box<dyn Error>> {
        // mask: [1, seq_len, 1] so it broadcasts over the hidden dimension
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }

    /// Dimensionality of the produced vectors.
    pub fn dimension(&self) -> std::result::Result<usize, Box<dyn Error>> {
        Ok(self.embed("dimension probe")?.len())
    }
}

/// L2 normalize the embedding vector
fn normalize(tensor: &Tensor) -> candle_core::Result<Tensor> {
    let norm = tensor.sqr()?.sum_all()?.sqrt()?;
    tensor.broadcast_div(&norm)
}

impl TextEncoder for SentenceEmbeddingsModel {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| self.embed(t).map_err(|e| VectorError::Embedding(e.to_string())))
            .collect()
    }
}

type Loader = Box<dyn Fn() -> Result<Box<dyn TextEncoder>> + Send + Sync>;

/// The process-wide embedding model, built lazily and exactly once.
///
/// Concurrent first calls to [`SharedEmbedder::get`] block on the same
/// initialization; every later call sees the same instance. A failed
/// initialization is not cached, so the next caller tries again.
pub struct SharedEmbedder {
    cell: OnceCell<Box<dyn TextEncoder>>,
    loader: Loader,
}

impl SharedEmbedder {
    /// Lazily load the Candle model described by `spec`.
    pub fn from_spec(spec: ModelSpec) -> Self {
        Self::with_loader(move || {
            let model = SentenceEmbeddingsModel::load(&spec)
                .map_err(|e| VectorError::Initialization(e.to_string()))?;
            Ok(Box::new(model) as Box<dyn TextEncoder>)
        })
    }

    /// Lazily build an encoder with an arbitrary constructor.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextEncoder>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Wrap an encoder that is already built.
    pub fn ready(encoder: Box<dyn TextEncoder>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(encoder);
        Self {
            cell,
            loader: Box::new(|| -> Result<Box<dyn TextEncoder>> {
                Err(VectorError::Initialization("encoder already set".into()))
            }),
        }
    }

    /// The shared encoder, initializing it on first use.
    pub fn get(&self) -> Result<&dyn TextEncoder> {
        let encoder = self.cell.get_or_try_init(|| {
            debug!("Initializing shared embedding model");
            (self.loader)()
        })?;
        Ok(encoder.as_ref())
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl fmt::Debug for SharedEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEmbedder")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Download (if needed) and load the model once, returning its dimension.
pub fn prefetch(spec: &ModelSpec) -> std::result::Result<usize, Box<dyn Error>> {
    let model = SentenceEmbeddingsModel::load(spec)?;
    model.dimension()
}


#[cfg(test)]
mod tests {
    use super::testing::HashingEncoder;
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn encode_preserves_length_and_order() {
        let enc = HashingEncoder;
        let texts = vec!["alpha".to_string(), "beta gamma".to_string(), "alpha".to_string()];
        let out = enc.encode(&texts).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], out[2]);
        assert_ne!(out[0], out[1]);
    }

    #[test]
    fn shared_embedder_initializes_once_under_contention() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let shared = Arc::new(SharedEmbedder::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Box::new(HashingEncoder) as Box<dyn TextEncoder>)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.get().map(|e| e.encode_one("x").unwrap()))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(shared.is_initialized());
    }

    #[test]
    fn failed_initialization_surfaces_and_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let shared = SharedEmbedder::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VectorError::Initialization("model artifact missing".into()))
        });

        assert!(matches!(shared.get(), Err(VectorError::Initialization(_))));
        assert!(shared.get().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!shared.is_initialized());
    }

    #[test]
    fn pooling_parses_case_insensitively() {
        assert_eq!("CLS".parse::<Pooling>().unwrap(), Pooling::Cls);
        assert_eq!("mean".parse::<Pooling>().unwrap(), Pooling::Mean);
        assert!("max".parse::<Pooling>().is_err());
    }
}
