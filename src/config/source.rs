// src/config/source.rs

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapter::cwire::CwireConfig;
use crate::identity::merkle::MerkleConfig;

/// Everything the harness configures per vendor: the cwire bid adapter and,
/// optionally, the merkle identity submodule.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AdapterSettings {
    #[serde(default)]
    pub cwire: CwireConfig,
    #[serde(default)]
    pub merkle: Option<MerkleConfig>,
}

pub trait ConfigSource: Send + Sync {
    fn load(&self) -> AdapterSettings;
}

/// Settings from a JSON file; a missing or unparseable file falls back to
/// defaults so the harness always starts.
pub struct FileConfigSource {
    path: String,
}

impl FileConfigSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> AdapterSettings {
        let content = fs::read_to_string(&self.path).unwrap_or_else(|_| "{}".to_string());
        serde_json::from_str(&content).unwrap_or_else(|err| {
            warn!(path = %self.path, %err, "settings file unreadable, using defaults");
            AdapterSettings::default()
        })
    }
}
