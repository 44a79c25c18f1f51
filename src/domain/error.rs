//! Domain error types.
//!
//! Every fatal condition surfaces with a stable classification and a
//! human-readable cause chain. Nothing here is transient, so nothing is
//! retried.

/// A parse error with position information for strategy-script parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    ///
    /// Only the offending line is echoed so multi-line scripts stay readable.
    pub fn display_with_context(&self, input: &str) -> String {
        let pos = self.position.min(input.len());
        let line_start = input[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = input[pos..]
            .find('\n')
            .map(|i| pos + i)
            .unwrap_or(input.len());
        let line_no = input[..line_start].matches('\n').count() + 1;
        let column = input[line_start..pos].chars().count();
        let caret = " ".repeat(column) + "^";
        format!(
            "line {line_no}: {line}\n{pad}{caret}\n{err}",
            line_no = line_no,
            line = &input[line_start..line_end],
            pad = " ".repeat(format!("line {}: ", line_no).len()),
            caret = caret,
            err = self
        )
    }

    /// True when the message says the input stopped before the construct
    /// being parsed was complete.
    pub fn is_truncation(&self) -> bool {
        self.message.contains("unexpected end of input")
            || self.message.contains("unterminated string literal")
    }
}

/// Stable classification of strategy load failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    SecurityViolation,
    Syntax,
    TruncatedInput,
    NotFound,
    Instantiation,
}

/// Why a strategy constructor refused its parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstantiationError {
    #[error("parameter '{name}' expects {expected}, got {found}")]
    ParamType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("strategy '{name}' declares both an options block and a fields block")]
    AmbiguousConstruction { name: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error(
        "security violation: detected look-ahead pattern '{pattern}' ({description}) at offset {offset}; future data access is forbidden"
    )]
    SecurityViolation {
        pattern: &'static str,
        description: &'static str,
        offset: usize,
    },

    #[error("syntax error in strategy source: {0}")]
    Syntax(ParseError),

    #[error("strategy source appears truncated ({0}); resubmit the complete source")]
    TruncatedInput(ParseError),

    #[error("strategy '{name}' not found in presets, built-in modules or the strategy directory")]
    NotFound { name: String },

    #[error("no strategy extending 'Strategy' found in {origin}")]
    NoStrategy { origin: String },

    #[error("expected exactly one strategy extending 'Strategy', found: {}", names.join(", "))]
    MultipleStrategies { names: Vec<String> },

    #[error("strategy '{name}' must assign 'signal' or 'entries'")]
    MissingOutputs { name: String },

    #[error("strategy '{name}' assigns both 'signal' and 'entries'/'exits'")]
    ConflictingOutputs { name: String },

    #[error("error instantiating strategy '{name}'")]
    Instantiation {
        name: String,
        #[source]
        source: InstantiationError,
    },

    #[error("failed to read strategy module '{module}': {reason}")]
    ModuleRead { module: String, reason: String },
}

impl LoadError {
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::SecurityViolation { .. } => LoadErrorKind::SecurityViolation,
            LoadError::Syntax(_)
            | LoadError::MissingOutputs { .. }
            | LoadError::ConflictingOutputs { .. } => LoadErrorKind::Syntax,
            LoadError::TruncatedInput(_) => LoadErrorKind::TruncatedInput,
            LoadError::NotFound { .. }
            | LoadError::NoStrategy { .. }
            | LoadError::MultipleStrategies { .. }
            | LoadError::ModuleRead { .. } => LoadErrorKind::NotFound,
            LoadError::Instantiation { .. } => LoadErrorKind::Instantiation,
        }
    }

    /// Classify a script parse failure: truncation is reported separately
    /// from generic syntax errors.
    pub fn from_parse(err: ParseError) -> Self {
        if err.is_truncation() {
            LoadError::TruncatedInput(err)
        } else {
            LoadError::Syntax(err)
        }
    }
}

/// Failures raised while a strategy computes its signals.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    #[error("data must contain a '{column}' column")]
    MissingColumn { column: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("signal value {value} at index {index} is not one of -1, 0, 1")]
    InvalidSignal { index: usize, value: f64 },

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

/// Malformed engine input, rejected before the first simulated bar.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("price table is empty")]
    Empty,

    #[error("price table is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("price table has {prices} rows but signal table has {signals}")]
    LengthMismatch { prices: usize, signals: usize },

    #[error("signal date {signal} does not match price date {price} at index {index}")]
    DateMismatch {
        index: usize,
        price: chrono::NaiveDate,
        signal: chrono::NaiveDate,
    },

    #[error("dates are not strictly increasing at index {index}")]
    NonMonotonicDates { index: usize },

    #[error("{column} at index {index} must be finite and positive, got {value}")]
    NonPositivePrice {
        index: usize,
        column: String,
        value: f64,
    },

    #[error("signal at index {index} must be -1, 0 or 1, got {value}")]
    InvalidSignal { index: usize, value: i8 },

    #[error("target_size at index {index} must be within [0, {max}], got {value}")]
    TargetSizeOutOfRange { index: usize, value: f64, max: f64 },

    #[error("invalid engine setting '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },
}

/// Top-level error type for nextbar.
#[derive(Debug, thiserror::Error)]
pub enum NextbarError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("strategy store error: {reason}")]
    Store { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NextbarError {
    /// Process exit status for this class of error.
    pub fn exit_status(&self) -> u8 {
        match self {
            NextbarError::Io(_) => 1,
            NextbarError::ConfigParse { .. }
            | NextbarError::ConfigMissing { .. }
            | NextbarError::ConfigInvalid { .. } => 2,
            NextbarError::Data { .. } | NextbarError::Store { .. } => 3,
            NextbarError::Load(e) => match e.kind() {
                LoadErrorKind::SecurityViolation => 10,
                LoadErrorKind::Syntax | LoadErrorKind::TruncatedInput => 4,
                LoadErrorKind::NotFound => 5,
                LoadErrorKind::Instantiation => 6,
            },
            NextbarError::Strategy(_) => 7,
            NextbarError::Validation(_) => 8,
        }
    }
}

impl From<&NextbarError> for std::process::ExitCode {
    fn from(err: &NextbarError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
