//! Syntax configuration
//!
//! Loaded from YAML, e.g.
//!
//! ```yaml
//! tab_length: 2
//! max_injection_depth: 3
//! recognized_scopes: [keyword, string, comment]
//! background_parsing: false
//! ```
//!
//! Missing fields take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::syntax::{Scope, ScopeTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxConfig {
    /// Columns per indent level when measuring leading whitespace
    #[serde(default = "default_tab_length")]
    pub tab_length: usize,

    /// Deepest allowed nesting of injected layers (root is depth 0)
    #[serde(default = "default_max_injection_depth")]
    pub max_injection_depth: usize,

    /// Scope names the active theme styles. Capture names fall back to
    /// the longest recognized dot-prefix.
    #[serde(default = "default_recognized_scopes")]
    pub recognized_scopes: Vec<String>,

    /// Reparse on a worker thread. When off, every edit reparses inline.
    #[serde(default = "default_background_parsing")]
    pub background_parsing: bool,
}

fn default_tab_length() -> usize {
    4
}

fn default_max_injection_depth() -> usize {
    4
}

fn default_recognized_scopes() -> Vec<String> {
    Scope::ALL.iter().map(|s| s.name().to_string()).collect()
}

fn default_background_parsing() -> bool {
    true
}

impl Default for SyntaxConfig {
    fn default() -> Self {
        Self {
            tab_length: default_tab_length(),
            max_injection_depth: default_max_injection_depth(),
            recognized_scopes: default_recognized_scopes(),
            background_parsing: default_background_parsing(),
        }
    }
}

impl SyntaxConfig {
    /// Parse YAML, failing on malformed input
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load config from `path`, or return defaults if it is missing or invalid
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_yaml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded syntax config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Saved syntax config to {}", path.display());
        Ok(())
    }

    /// Scope table built from `recognized_scopes`
    pub fn scope_table(&self) -> ScopeTable {
        ScopeTable::from_names(self.recognized_scopes.iter().map(String::as_str))
    }
}
