//! # Embeddings
//!
//! Text → fixed-length vector, behind the [`Embedder`] capability trait.
//!
//! Two implementations ship with the crate:
//!
//! - [`SentenceEmbeddingsModel`]: a BERT sentence-transformer (all-MiniLM-L6-v2 by
//!   default, 384 dimensions) run on CPU with Candle. Weights, tokenizer and
//!   config are fetched from the Hugging Face Hub on first use and cached there.
//! - [`HashEmbedder`]: deterministic feature hashing of lowercase word tokens.
//!   No model, no network. Useful for offline runs and tests.
//!
//! Both produce L2-normalized vectors, so cosine similarity reduces to a dot product.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use once_cell::sync::Lazy;
use regex::Regex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::error::{RagError, Result};

/// Model id that selects [`HashEmbedder`] instead of a Hugging Face model.
pub const HASH_EMBEDDER_ID: &str = "hash";

/// Text in, vector out.
///
/// Implementations must be deterministic for a given model and always return
/// vectors of length [`Embedder::dimension`].
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        (**self).encode(text)
    }
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl SentenceEmbeddingsModel {
    /// Load `model_id` (e.g. `sentence-transformers/all-MiniLM-L6-v2`) from the Hugging Face Hub.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;
        info!("Loading embedding model {model_id}");

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api = Api::new().map_err(|e| RagError::Embedding(e.to_string()))?;
        let api_repo = api.repo(repo);

        let fetch = |file: &str| {
            api_repo
                .get(file)
                .map_err(|e| RagError::Embedding(format!("{model_id}/{file}: {e}")))
        };
        let config_filename = fetch("config.json")?;
        let tokenizer_filename = fetch("tokenizer.json")?;
        let weights_filename = fetch("model.safetensors")?;

        let config = std::fs::read_to_string(&config_filename)
            .map_err(|e| RagError::io(&config_filename, e))?;
        let config: Config = serde_json::from_str(&config)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_filename)
            .map_err(|e| RagError::Embedding(format!("failed to load tokenizer: {e}")))?;

        // SAFETY: the safetensors file is owned by the hub cache and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;
        debug!("Embedding model ready, hidden size {}", config.hidden_size);

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension: config.hidden_size,
        })
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> Result<Tensor> {
        // embeddings: [1, seq_len, hidden]; mask must broadcast as [1, seq_len, 1]
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;

        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }

    fn normalize(&self, tensor: &Tensor) -> Result<Tensor> {
        let norm = tensor.sqr()?.sum_all()?.sqrt()?;
        Ok(tensor.broadcast_div(&norm)?)
    }
}

impl Embedder for SentenceEmbeddingsModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RagError::Embedding(format!("tokenization error: {e}")))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let pooled = self.mean_pooling(&output, tokens.get_attention_mask())?;

        Ok(self.normalize(&pooled)?.to_vec1::<f32>()?)
    }
}

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

/// Feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed with SHA-256; the leading bytes
/// pick a bucket and the next byte a sign. Token counts accumulate into the
/// buckets and the result is L2-normalized. Texts sharing words land close
/// together, which is enough for tests and offline demos.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(&self, token: &str) -> Result<(usize, f32)> {
        let digest = sha256::digest(token);
        let slot = u64::from_str_radix(&digest[..12], 16)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let sign_byte = u8::from_str_radix(&digest[12..14], 16)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let sign = if sign_byte & 1 == 0 { 1.0 } else { -1.0 };
        Ok(((slot % self.dimension as u64) as usize, sign))
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimension == 0 {
            return Err(RagError::Embedding("embedding dimension must be non-zero".into()));
        }
        let mut vector = vec![0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in TOKEN_PATTERN.find_iter(&lowered) {
            let (slot, sign) = self.bucket(token.as_str())?;
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

/// Build the embedder named by `model_id`: [`HASH_EMBEDDER_ID`] gives a
/// [`HashEmbedder`] of `dimension`, anything else is loaded from the hub.
pub fn load_embedder(model_id: &str, dimension: usize) -> Result<Box<dyn Embedder>> {
    if model_id == HASH_EMBEDDER_ID {
        debug!("Using hash embedder with {dimension} dimensions");
        return Ok(Box::new(HashEmbedder::new(dimension)));
    }
    Ok(Box::new(SentenceEmbeddingsModel::load(model_id)?))
}
