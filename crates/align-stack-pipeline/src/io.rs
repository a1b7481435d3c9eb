//! JSON helpers for configuration and reports.

use std::fs;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::{AlignParams, AlignmentReport, EngineConfig};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

impl EngineConfig {
    /// Load a JSON config; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write(self, path.as_ref())
    }
}

impl AlignParams {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }
}

impl AlignmentReport {
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write(self, path.as_ref())
    }
}
