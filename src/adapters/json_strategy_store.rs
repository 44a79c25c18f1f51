//! Saved strategies in a single JSON file.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous file intact.

use crate::domain::error::NextbarError;
use crate::ports::strategy_store_port::StrategyStorePort;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_SOURCE_BYTES: usize = 1_000_000;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    strategies: BTreeMap<String, StoredStrategy>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredStrategy {
    source: String,
}

pub struct JsonStrategyStore {
    path: PathBuf,
}

fn store_err(reason: String) -> NextbarError {
    NextbarError::Store { reason }
}

/// Name and source bounds enforced on every save.
pub fn check_entry(name: &str, source: &str) -> Result<(), NextbarError> {
    let chars = name.chars().count();
    if name.trim().is_empty() || chars > MAX_NAME_CHARS {
        return Err(store_err(format!(
            "strategy name must be 1 to {} characters, got {}",
            MAX_NAME_CHARS, chars
        )));
    }
    if source.len() > MAX_SOURCE_BYTES {
        return Err(store_err(format!(
            "strategy source must be at most {} bytes, got {}",
            MAX_SOURCE_BYTES,
            source.len()
        )));
    }
    Ok(())
}

impl JsonStrategyStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoreFile, NextbarError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                store_err(format!("corrupt store {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(store_err(format!("failed to read {}: {}", self.path.display(), e))),
        }
    }

    fn write(&self, file: &StoreFile) -> Result<(), NextbarError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| store_err(format!("failed to serialize store: {}", e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StrategyStorePort for JsonStrategyStore {
    fn save(&self, name: &str, source: &str) -> Result<(), NextbarError> {
        check_entry(name, source)?;
        let mut file = self.read()?;
        file.strategies.insert(
            name.to_string(),
            StoredStrategy {
                source: source.to_string(),
            },
        );
        self.write(&file)?;
        info!("saved strategy '{}' to {}", name, self.path.display());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<String>, NextbarError> {
        Ok(self.read()?.strategies.remove(name).map(|s| s.source))
    }

    fn list(&self) -> Result<Vec<String>, NextbarError> {
        Ok(self.read()?.strategies.into_keys().collect())
    }

    fn delete(&self, name: &str) -> Result<bool, NextbarError> {
        let mut file = self.read()?;
        if file.strategies.remove(name).is_none() {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }
}
