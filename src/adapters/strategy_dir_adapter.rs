//! Strategy script directory adapter: `<dir>/<module>.strat`.

use crate::domain::error::LoadError;
use crate::ports::strategy_source_port::StrategySourcePort;
use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub const EXTENSION: &str = "strat";

pub struct StrategyDirAdapter {
    base_path: PathBuf,
}

impl StrategyDirAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn module_path(&self, module: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", module, EXTENSION))
    }

    /// Module names of every script in the directory, sorted.
    pub fn list_modules(&self) -> std::io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut modules = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    modules.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        modules.sort();
        Ok(modules)
    }
}

impl StrategySourcePort for StrategyDirAdapter {
    fn read_module(&self, module: &str) -> Result<Option<String>, LoadError> {
        // Module names come from snake_case conversion; anything that could
        // step outside the directory is simply not a module.
        if module.is_empty() || !module.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Ok(None);
        }
        let path = self.module_path(module);
        debug!("looking for strategy module at {}", path.display());
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LoadError::ModuleRead {
                module: module.to_string(),
                reason: format!("{}: {}", path.display(), e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StrategyDirAdapter) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("trend_follow.strat"),
            "strategy TrendFollow extends Strategy { signal = 0; }",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a module").unwrap();
        let adapter = StrategyDirAdapter::new(dir.path().to_path_buf());
        (dir, adapter)
    }

    #[test]
    fn reads_existing_module() {
        let (_dir, adapter) = setup();
        let text = adapter.read_module("trend_follow").unwrap().unwrap();
        assert!(text.contains("TrendFollow"));
    }

    #[test]
    fn missing_module_is_none() {
        let (_dir, adapter) = setup();
        assert_eq!(adapter.read_module("absent").unwrap(), None);
    }

    #[test]
    fn path_like_names_are_not_modules() {
        let (_dir, adapter) = setup();
        assert_eq!(adapter.read_module("../trend_follow").unwrap(), None);
        assert_eq!(adapter.read_module("").unwrap(), None);
    }

    #[test]
    fn lists_only_scripts() {
        let (_dir, adapter) = setup();
        assert_eq!(adapter.list_modules().unwrap(), vec!["trend_follow".to_string()]);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let adapter = StrategyDirAdapter::new(PathBuf::from("/nonexistent/strategies"));
        assert!(adapter.list_modules().unwrap().is_empty());
        assert_eq!(adapter.read_module("anything").unwrap(), None);
    }
}
