//! The strategy contract and its construction descriptors.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::domain::error::{InstantiationError, LoadError, StrategyError};
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::SignalTable;

/// Anything that turns a price table into a signal table.
///
/// Implementations hold only their frozen parameters, so one instance can
/// serve concurrent backtests.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn params(&self) -> &StrategyParams;
    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Number(_) => "number",
            ParamValue::Flag(_) => "flag",
            ParamValue::Text(_) => "text",
        }
    }

    /// Interprets a command-line or config literal: `true`/`false` are
    /// flags, anything that parses as `f64` is a number, the rest is text.
    pub fn parse_literal(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "true" => return ParamValue::Flag(true),
            "false" => return ParamValue::Flag(false),
            _ => {}
        }
        match raw.parse::<f64>() {
            Ok(n) => ParamValue::Number(n),
            Err(_) => ParamValue::Text(raw.trim_matches('"').to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Flag(b) => write!(f, "{}", b),
            ParamValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// Option name -> value, owned by a strategy once constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyParams(BTreeMap<String, ParamValue>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: ParamValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The subset of entries whose names appear in `fields`.
    pub fn filtered<S: AsRef<str>>(&self, fields: &[S]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| fields.iter().any(|f| f.as_ref() == k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn number_or(&self, name: &str, default: f64) -> Result<f64, InstantiationError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Number(n)) if n.is_finite() => Ok(*n),
            Some(ParamValue::Number(n)) => Err(InstantiationError::InvalidParam {
                name: name.into(),
                reason: format!("must be finite, got {}", n),
            }),
            Some(other) => Err(type_error(name, "number", other)),
        }
    }

    /// A window or period: a positive whole number.
    pub fn period_or(&self, name: &str, default: usize) -> Result<usize, InstantiationError> {
        let n = self.number_or(name, default as f64)?;
        if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
            Ok(n as usize)
        } else {
            Err(InstantiationError::InvalidParam {
                name: name.into(),
                reason: format!("must be a positive integer, got {}", n),
            })
        }
    }

    pub fn flag_or(&self, name: &str, default: bool) -> Result<bool, InstantiationError> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Flag(b)) => Ok(*b),
            Some(other) => Err(type_error(name, "flag", other)),
        }
    }
}

fn type_error(name: &str, expected: &'static str, found: &ParamValue) -> InstantiationError {
    InstantiationError::ParamType {
        name: name.into(),
        expected,
        found: found.type_name(),
    }
}

impl FromIterator<(String, ParamValue)> for StrategyParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, ParamValue>> for StrategyParams {
    fn from(map: BTreeMap<String, ParamValue>) -> Self {
        Self(map)
    }
}

pub type BuildFn = fn(&StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError>;

/// How a strategy type accepts parameters.
pub enum Construction {
    /// The constructor receives the whole option map.
    Options(BuildFn),
    /// The constructor declares named fields and receives only those.
    LegacyFields {
        fields: &'static [&'static str],
        build: BuildFn,
    },
}

impl Construction {
    pub fn build(&self, params: &StrategyParams) -> Result<Box<dyn Strategy>, InstantiationError> {
        match self {
            Construction::Options(build) => build(params),
            Construction::LegacyFields { fields, build } => build(&params.filtered(fields)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Construction::Options(_) => "options",
            Construction::LegacyFields { .. } => "fields",
        }
    }
}

/// Registration record for a built-in strategy type.
pub struct StrategyDescriptor {
    pub name: &'static str,
    /// Module the type is defined in; `None` for presets.
    pub module: Option<&'static str>,
    pub summary: &'static str,
    pub construction: Construction,
}

impl StrategyDescriptor {
    pub fn instantiate(&self, params: &StrategyParams) -> Result<Box<dyn Strategy>, LoadError> {
        self.construction
            .build(params)
            .map_err(|source| LoadError::Instantiation {
                name: self.name.to_string(),
                source,
            })
    }
}

impl fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("construction", &self.construction.label())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_parsing() {
        assert_eq!(ParamValue::parse_literal("20"), ParamValue::Number(20.0));
        assert_eq!(ParamValue::parse_literal(" TRUE "), ParamValue::Flag(true));
        assert_eq!(
            ParamValue::parse_literal("\"mean\""),
            ParamValue::Text("mean".into())
        );
    }

    #[test]
    fn period_must_be_positive_integer() {
        let params = StrategyParams::new().with("window", ParamValue::Number(2.5));
        assert!(matches!(
            params.period_or("window", 20),
            Err(InstantiationError::InvalidParam { .. })
        ));
        let params = StrategyParams::new().with("window", ParamValue::Number(0.0));
        assert!(params.period_or("window", 20).is_err());
        assert_eq!(StrategyParams::new().period_or("window", 20), Ok(20));
    }

    #[test]
    fn wrong_type_reports_both_types() {
        let params = StrategyParams::new().with("window", ParamValue::Flag(true));
        assert_eq!(
            params.number_or("window", 1.0),
            Err(InstantiationError::ParamType {
                name: "window".into(),
                expected: "number",
                found: "flag",
            })
        );
    }

    #[test]
    fn filtered_keeps_declared_fields_only() {
        let params = StrategyParams::new()
            .with("window", ParamValue::Number(5.0))
            .with("unrelated", ParamValue::Text("x".into()));
        let filtered = params.filtered(&["window", "std_dev"]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains("window"));
    }
}
