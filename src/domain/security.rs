//! Look-ahead gate for strategy source text.
//!
//! The gate runs on the raw text before anything parses it. Every pattern
//! describes a way of reaching a future bar: a negative lag, forward index
//! arithmetic or a slice anchored past the current row. The first match
//! rejects the text.
//!
//! The gate is textual. Indirection the patterns do not cover, such as a
//! lag computed into a variable first, passes here and is caught later (if
//! at all) by the script evaluator refusing negative shifts.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::error::LoadError;

struct Rule {
    pattern: &'static str,
    description: &'static str,
    regex: LazyLock<Regex>,
}

macro_rules! rule {
    ($pattern:literal, $description:literal) => {
        Rule {
            pattern: $pattern,
            description: $description,
            regex: LazyLock::new(|| Regex::new($pattern).unwrap()),
        }
    };
}

/// Forbidden patterns, checked in order.
static FORBIDDEN: [Rule; 6] = [
    rule!(r"\.shift\s*\(\s*-", "negative lag via method call"),
    rule!(r"shift\s*\(\s*-", "negative lag via free call"),
    rule!(r"\.iloc\s*\[\s*i\s*\+\s*\d+", "forward index arithmetic"),
    rule!(r"\.iloc\s*\[\s*:\s*-?\d+", "slicing to a fixed end"),
    rule!(r"\.iloc\s*\[\s*\d+\s*:", "forward slice to end of series"),
    rule!(
        r"\[\s*(i|idx|index|t)\s*\+\s*\d+\s*\]",
        "manual forward index arithmetic"
    ),
];

/// Patterns the gate rejects, as `(pattern, description)` pairs.
pub fn forbidden_patterns() -> impl Iterator<Item = (&'static str, &'static str)> {
    FORBIDDEN.iter().map(|r| (r.pattern, r.description))
}

/// Rejects `text` at the first forbidden pattern it contains.
pub fn scan(text: &str) -> Result<(), LoadError> {
    for rule in &FORBIDDEN {
        if let Some(found) = rule.regex.find(text) {
            return Err(LoadError::SecurityViolation {
                pattern: rule.pattern,
                description: rule.description,
                offset: found.start(),
            });
        }
    }
    Ok(())
}

/// A non-fatal finding about strategy source text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub offset: usize,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.offset)
    }
}

static RELATIVE_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(from\s+\.|use\s+super::|use\s+self::)").unwrap()
});
static VISUALIZATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(matplotlib|seaborn|plotly|bokeh|plotters)\b").unwrap());

/// Idioms that will not resolve once the text is loaded standalone.
pub fn diagnostics(text: &str) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    if let Some(m) = RELATIVE_IMPORT.find(text) {
        found.push(Diagnostic {
            message: format!(
                "relative import `{}` cannot be resolved from a standalone strategy",
                m.as_str().trim()
            ),
            offset: m.start(),
        });
    }
    for m in VISUALIZATION.find_iter(text) {
        found.push(Diagnostic {
            message: format!("visualization library `{}` is not available to strategies", m.as_str()),
            offset: m.start(),
        });
    }
    found
}
