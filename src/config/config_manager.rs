// src/config/config_manager.rs

use crate::adapter::cwire::CwireConfig;
use crate::config::source::{AdapterSettings, ConfigSource};
use crate::identity::merkle::MerkleConfig;

#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings: AdapterSettings,
}

impl ConfigManager {
    pub fn new(settings: AdapterSettings) -> Self {
        Self { settings }
    }

    pub fn from_source(source: &dyn ConfigSource) -> Self {
        Self::new(source.load())
    }

    pub fn cwire(&self) -> &CwireConfig {
        &self.settings.cwire
    }

    pub fn merkle(&self) -> Option<&MerkleConfig> {
        self.settings.merkle.as_ref()
    }
}
