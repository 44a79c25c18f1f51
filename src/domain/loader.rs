//! Strategy loading from source text or by registered name.
//!
//! Source text always passes the look-ahead gate before it is parsed, and
//! parsing into the script AST is the only way text becomes a strategy.

use std::sync::{Arc, LazyLock};

use log::{info, warn};
use regex::Regex;

use crate::domain::error::LoadError;
use crate::domain::script::{self, Module, Output, ScriptStrategy, StrategyDef};
use crate::domain::security::{self, Diagnostic};
use crate::domain::strategies;
use crate::domain::strategy::{Strategy, StrategyDescriptor, StrategyParams};
use crate::ports::strategy_source_port::StrategySourcePort;

static WORD_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").unwrap());
static CASE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

/// `MACDStrategy` -> `macd_strategy`, `SentimentRSIStrategy` ->
/// `sentiment_rsi_strategy`.
pub fn camel_to_snake(name: &str) -> String {
    let split = WORD_BOUNDARY.replace_all(name, "${1}_${2}");
    CASE_BOUNDARY
        .replace_all(&split, "${1}_${2}")
        .to_lowercase()
}

#[derive(Debug, Clone)]
pub enum StrategyKind {
    Builtin(&'static StrategyDescriptor),
    Script(Arc<StrategyDef>),
}

/// A resolved strategy that has not been bound to parameters yet.
#[derive(Debug, Clone)]
pub struct StrategyHandle {
    pub name: String,
    /// Module the strategy was found in, for module and script strategies.
    pub module: Option<String>,
    pub kind: StrategyKind,
}

impl StrategyHandle {
    fn builtin(descriptor: &'static StrategyDescriptor) -> Self {
        Self {
            name: descriptor.name.to_string(),
            module: descriptor.module.map(str::to_string),
            kind: StrategyKind::Builtin(descriptor),
        }
    }

    fn script(def: StrategyDef, module: Option<String>) -> Self {
        Self {
            name: def.name.clone(),
            module,
            kind: StrategyKind::Script(Arc::new(def)),
        }
    }

    pub fn origin(&self) -> &'static str {
        match &self.kind {
            StrategyKind::Builtin(d) if d.module.is_none() => "preset",
            StrategyKind::Builtin(_) => "module",
            StrategyKind::Script(_) => "script",
        }
    }

    /// Builds a strategy through its declared construction path.
    pub fn instantiate(&self, params: &StrategyParams) -> Result<Box<dyn Strategy>, LoadError> {
        match &self.kind {
            StrategyKind::Builtin(descriptor) => descriptor.instantiate(params),
            StrategyKind::Script(def) => ScriptStrategy::instantiate(Arc::clone(def), params)
                .map(|s| Box::new(s) as Box<dyn Strategy>)
                .map_err(|source| LoadError::Instantiation {
                    name: self.name.clone(),
                    source,
                }),
        }
    }
}

/// An instantiated strategy with what was learned while loading it.
pub struct LoadedStrategy {
    pub strategy: Box<dyn Strategy>,
    pub handle: StrategyHandle,
    pub diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Debug for LoadedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedStrategy")
            .field("strategy", &self.strategy.name())
            .field("handle", &self.handle)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

/// Gate, then parse. Diagnostics are logged and returned.
fn vet(text: &str, origin: &str) -> Result<(Module, Vec<Diagnostic>), LoadError> {
    security::scan(text)?;
    let diagnostics = security::diagnostics(text);
    for d in &diagnostics {
        warn!("{origin}: {d}");
    }
    let module = script::parse(text).map_err(LoadError::from_parse)?;
    Ok((module, diagnostics))
}

fn check_outputs(def: &StrategyDef) -> Result<(), LoadError> {
    let signal = def.assigns(Output::Signal);
    let entries = def.assigns(Output::Entries);
    if signal && (entries || def.assigns(Output::Exits)) {
        return Err(LoadError::ConflictingOutputs {
            name: def.name.clone(),
        });
    }
    if !signal && !entries {
        return Err(LoadError::MissingOutputs {
            name: def.name.clone(),
        });
    }
    Ok(())
}

/// Loads the single strategy defined in `text` with default parameters.
pub fn load_from_source(text: &str) -> Result<LoadedStrategy, LoadError> {
    let (module, diagnostics) = vet(text, "strategy source")?;
    let candidates = module.candidates();
    let def = match candidates.as_slice() {
        [] => {
            return Err(LoadError::NoStrategy {
                origin: "the provided source".to_string(),
            });
        }
        [def] => module.flatten(def),
        many => {
            return Err(LoadError::MultipleStrategies {
                names: many.iter().map(|d| d.name.clone()).collect(),
            });
        }
    };
    check_outputs(&def)?;

    let handle = StrategyHandle::script(def, None);
    let strategy = handle.instantiate(&StrategyParams::new())?;
    info!("loaded strategy '{}' from source", handle.name);
    Ok(LoadedStrategy {
        strategy,
        handle,
        diagnostics,
    })
}

/// Resolves a registered name without instantiating it.
///
/// Lookup order: presets by exact name, then the built-in module named
/// after the snake_case form of `name`, then the script module of that
/// name from `sources`. The first strategy defined in a module wins.
pub fn resolve(
    name: &str,
    sources: &dyn StrategySourcePort,
) -> Result<(StrategyHandle, Vec<Diagnostic>), LoadError> {
    if let Some(descriptor) = strategies::preset(name) {
        return Ok((StrategyHandle::builtin(descriptor), Vec::new()));
    }

    let snake = camel_to_snake(name);
    if let Some(descriptor) = strategies::first_in_module(&snake) {
        return Ok((StrategyHandle::builtin(descriptor), Vec::new()));
    }

    if let Some(text) = sources.read_module(&snake)? {
        let (module, diagnostics) = vet(&text, &snake)?;
        if let Some(first) = module.candidates().first() {
            let def = module.flatten(first);
            check_outputs(&def)?;
            return Ok((StrategyHandle::script(def, Some(snake)), diagnostics));
        }
        warn!("module '{snake}' defines no strategy extending '{}'", script::BASE);
    }

    Err(LoadError::NotFound {
        name: name.to_string(),
    })
}

/// Resolves `name` and instantiates it with `params`.
pub fn load_from_name(
    name: &str,
    sources: &dyn StrategySourcePort,
    params: &StrategyParams,
) -> Result<LoadedStrategy, LoadError> {
    let (handle, diagnostics) = resolve(name, sources)?;
    let strategy = handle.instantiate(params)?;
    info!(
        "loaded {} strategy '{}' as '{}'",
        handle.origin(),
        handle.name,
        name
    );
    Ok(LoadedStrategy {
        strategy,
        handle,
        diagnostics,
    })
}
