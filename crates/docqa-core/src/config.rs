//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_DATA__PDF_DIR`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load `path`, then its `<stem>.<env>.toml` sibling selected by `RUST_ENV`, then `APP_*`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let overlay = |suffix: &str| {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("config");
            path.with_file_name(format!("{stem}.{suffix}.toml"))
        };

        let mut figment =
            Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(path));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(overlay("dev"))),
            "prod" | "production" => figment = figment.merge(Toml::file(overlay("prod"))),
            "test" | "testing" => figment = figment.merge(Toml::file(overlay("test"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("Failed to read settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.retrieval.k == 0 {
            return Err(Error::InvalidConfig("retrieval.k must be at least 1".to_string()));
        }
        if self.retrieval.max_context_chars == 0 {
            return Err(Error::InvalidConfig(
                "retrieval.max_context_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub pdf_dir: String,
    pub index_dir: String,
    pub max_files: Option<usize>,
    pub force_rebuild: bool,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            pdf_dir: "pdfs".to_string(),
            index_dir: "index/docqa".to_string(),
            max_files: None,
            force_rebuild: false,
        }
    }
}

impl DataSettings {
    pub fn pdf_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.pdf_dir)
    }

    pub fn index_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { k: 5, max_context_chars: 8000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub use_fake: bool,
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, max_len: 256, use_fake: false, fake_dim: 1024 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            temperature: 0.3,
            top_p: 0.95,
            max_tokens: 512,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
