use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config YAML file must contain at least one model and one prompt")]
    Empty,
}

/// The benchmark matrix: every prompt is sent to every model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Missing keys deserialize as empty and are rejected by `validate`
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() || self.prompts.is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(())
    }

    /// Number of generate requests a run with `repeat` iterations will issue.
    pub fn combinations(&self, repeat: u32) -> usize {
        repeat as usize * self.models.len() * self.prompts.len()
    }
}
