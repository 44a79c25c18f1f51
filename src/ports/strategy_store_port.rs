//! Saved strategy store port.

use crate::domain::error::NextbarError;

pub trait StrategyStorePort {
    fn save(&self, name: &str, source: &str) -> Result<(), NextbarError>;
    fn load(&self, name: &str) -> Result<Option<String>, NextbarError>;
    fn list(&self) -> Result<Vec<String>, NextbarError>;
    fn delete(&self, name: &str) -> Result<bool, NextbarError>;
}
