//! Assistant configuration.
//!
//! Operator-tunable switches and limits of the crafting assistant.
//! Configuration can be loaded from and saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::history::MAX_HISTORY_CAPACITY;
use crate::item_stack::DEFAULT_MAX_STACK;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid TOML for this configuration
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be written as TOML
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Crafting assistant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    // === Assistance ===
    /// Master switch; when off every intent is a no-op and history is cleared
    pub assist_enabled: bool,
    /// Number of history entries kept (0..=32)
    pub history_capacity: usize,
    /// Clicking the empty output slot recalls a placement
    pub output_slot_recall: bool,

    // === Scaling ===
    /// Enable scale up/down of grid stacks
    pub scroll_scaling: bool,
    /// Stack size limit of the grid slots (1..=64)
    pub grid_stack_limit: u32,
    /// Largest number of units one scale-down step moves
    pub max_scale_step: u32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            assist_enabled: true,
            history_capacity: MAX_HISTORY_CAPACITY,
            output_slot_recall: true,

            scroll_scaling: true,
            grid_stack_limit: DEFAULT_MAX_STACK,
            max_scale_step: 8,
        }
    }
}

impl AssistConfig {
    /// Load configuration from a file.
    /// Returns default config if the file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            }
        }
    }

    /// Load configuration from a file, reporting every failure.
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.history_capacity = self.history_capacity.min(MAX_HISTORY_CAPACITY);
        self.grid_stack_limit = self.grid_stack_limit.clamp(1, DEFAULT_MAX_STACK);
        self.max_scale_step = self.max_scale_step.max(1);
    }

    /// Clamp a requested scale-down step.
    #[must_use]
    pub fn scale_down_step(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_scale_step.max(1))
    }
}
