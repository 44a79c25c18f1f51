//! Strategy module source port.

use crate::domain::error::LoadError;

/// Locates strategy script modules by snake_case module name.
pub trait StrategySourcePort {
    /// The source text of `module`, or `None` when no such module exists.
    fn read_module(&self, module: &str) -> Result<Option<String>, LoadError>;
}
