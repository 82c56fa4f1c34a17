//! docqa-embed
//!
//! Embedding collaborators: a BGE-M3 (XLM-RoBERTa) model run with candle, and
//! a hashing `FakeEmbedder` for tests and offline development. Both return
//! L2-normalized vectors.
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use docqa_core::config::{expand_path, EmbeddingSettings};
use docqa_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
}

impl BgeM3Embedder {
    /// Load `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn new(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = select_device();
        info!("Loading BGE-M3 model from {}", model_dir.display());
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e)
        })?;
        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?["hidden_size"]
            .as_u64()
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!("BGE-M3 model loaded (dim={}, max_len={})", dim, max_len);
        Ok(Self { model, tokenizer, device, max_len, dim })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = Tensor::zeros((1, self.max_len), DType::I64, &self.device)?;
        let hidden_states =
            self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden_states, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if emb.len() != self.dim {
            return Err(anyhow!("model produced {} dims, expected {}", emb.len(), self.dim));
        }
        if start.elapsed().as_millis() > 100 {
            warn!("Slow embedding: {} ms", start.elapsed().as_millis());
        }
        Ok(emb)
    }
}

impl Embedder for BgeM3Embedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

/// Deterministic bag-of-tokens hashing embedder.
///
/// Texts sharing words land close together, which is enough to exercise
/// retrieval without a model on disk.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Pick the embedder for these settings. `APP_USE_FAKE_EMBEDDINGS=1` forces the fake one.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if settings.use_fake || env_fake {
        info!("Using FakeEmbedder (dim={})", settings.fake_dim);
        return Ok(Box::new(FakeEmbedder::new(settings.fake_dim)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Box::new(BgeM3Embedder::new(&model_dir, settings.max_len)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() {
            return Ok(p);
        }
        warn!("Configured model dir {} does not exist", p.display());
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                info!("Using {}: {}", var, p.display());
                return Ok(p);
            }
        }
    }
    for candidate in ["models/bge-m3", "../models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() {
            info!("Using model dir: {}", p.display());
            return Ok(p.to_path_buf());
        }
    }
    Err(anyhow!(
        "Could not locate BGE-M3 model directory; set embedding.model_dir or APP_MODEL_DIR"
    ))
}
