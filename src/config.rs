//! TOML configuration for generation and storage.
//!
//! ```toml
//! [generation]
//! provider = "openai"          # or "dryrun"
//! model = "gpt-4.1"
//! api_key_env = "OPENAI_API_KEY"
//! size = "1024x1024"
//!
//! [storage]
//! dir = "illustrations"
//! public_base_url = "https://cdn.example.com/illustrations"
//! ```
//!
//! Every key is optional; a missing file or section means defaults.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::prompt::DEFAULT_ART_STYLE;

pub const PROVIDERS: [&str; 2] = ["openai", "dryrun"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: String,
    pub model: String,
    pub api_base: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub size: String,
    pub timeout_secs: u64,
    pub art_style: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            provider: "openai".to_string(),
            model: "gpt-4.1".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            size: "1024x1024".to_string(),
            timeout_secs: 180,
            art_style: DEFAULT_ART_STYLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: String,
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            dir: "illustrations".to_string(),
            public_base_url: "/illustrations".to_string(),
        }
    }
}

/// Parse configuration from a TOML string.
pub fn parse_toml(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("invalid configuration TOML")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from `path`, or defaults when no path is given.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            parse_toml(&content)
        }
        None => Ok(Config::default()),
    }
}

fn validate_config(config: &Config) -> Result<()> {
    let generation = &config.generation;
    if !PROVIDERS.contains(&generation.provider.as_str()) {
        bail!(
            "Unknown provider '{}'. Valid providers: {}",
            generation.provider,
            PROVIDERS.join(", ")
        );
    }
    if generation.model.trim().is_empty() {
        bail!("generation.model is required");
    }
    if generation.art_style.trim().is_empty() {
        bail!("generation.art_style must not be empty");
    }
    if generation.timeout_secs == 0 {
        bail!("generation.timeout_secs must be positive");
    }
    if config.storage.dir.trim().is_empty() {
        bail!("storage.dir is required");
    }
    Ok(())
}
