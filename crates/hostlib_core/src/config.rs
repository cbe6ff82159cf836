use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ENTRY: &str = "main";
pub const DEFAULT_TRUE_TOKEN: &str = "да";
pub const DEFAULT_FALSE_TOKEN: &str = "нет";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime knobs. Every field is optional in the JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Token written by `output_bool` for true.
    pub true_token: String,
    pub false_token: String,
    /// Makes destroying an unknown or already freed array block fatal.
    pub strict_free: bool,
    /// Upper bound on linear memory pages the array arena may grow to.
    pub max_memory_pages: Option<u64>,
    pub entry: String,
    /// Fixed seed for the random builtins; unset draws from OS entropy.
    pub rand_seed: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            true_token: DEFAULT_TRUE_TOKEN.to_string(),
            false_token: DEFAULT_FALSE_TOKEN.to_string(),
            strict_free: false,
            max_memory_pages: None,
            entry: DEFAULT_ENTRY.to_string(),
            rand_seed: None,
        }
    }
}

impl HostConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn bool_token(&self, value: bool) -> &str {
        if value {
            &self.true_token
        } else {
            &self.false_token
        }
    }
}
