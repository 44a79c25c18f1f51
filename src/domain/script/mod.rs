//! Strategy scripts: the text form of a strategy.
//!
//! A script module declares strategies over the indicator layer:
//!
//! ```text
//! use nextbar::Strategy;
//!
//! strategy MeanReversion extends Strategy {
//!     options { period = 20, mult = 2.0 }
//!     let ma = safe_rolling(close, period, "mean");
//!     let sd = safe_rolling(close, period, "std");
//!     entries = close <= ma - mult * sd;
//!     exits = close >= ma + mult * sd;
//! }
//! ```
//!
//! Parsing is the only way text becomes executable. Evaluation is
//! vectorized, loop-free and sees nothing but the price table and the
//! strategy's own parameters.

pub mod ast;
pub mod eval;
pub mod parser;

use std::sync::Arc;

use crate::domain::error::{InstantiationError, StrategyError};
use crate::domain::ohlcv::PriceTable;
use crate::domain::signal::SignalTable;
use crate::domain::strategy::{Strategy, StrategyParams};

pub use ast::{Module, Output, ParamDecl, StrategyDef};
pub use parser::parse;

/// The base every loadable script strategy must extend.
pub const BASE: &str = "Strategy";

impl Module {
    fn find_before(&self, name: &str, position: usize) -> Option<&StrategyDef> {
        self.strategies
            .iter()
            .find(|s| s.name == name && s.position < position)
    }

    /// The chain from `def` up to its root, leaf first, if `def` extends
    /// the base directly or through strategies defined earlier in this
    /// module.
    fn lineage<'a>(&'a self, def: &'a StrategyDef) -> Option<Vec<&'a StrategyDef>> {
        let mut chain = vec![def];
        let mut current = def;
        loop {
            match current.extends.as_deref() {
                Some(BASE) => return Some(chain),
                Some(parent) => {
                    current = self.find_before(parent, current.position)?;
                    chain.push(current);
                }
                None => return None,
            }
        }
    }

    /// Strategies defined in this module that satisfy the strategy
    /// contract, in definition order. The base itself never qualifies.
    pub fn candidates(&self) -> Vec<&StrategyDef> {
        self.strategies
            .iter()
            .filter(|s| s.name != BASE && self.lineage(s).is_some())
            .collect()
    }

    /// Merges a candidate with its ancestors. Parameters declared by a
    /// child override the parent's defaults; the child's statements run
    /// after the parent's, so its bindings and outputs win.
    pub fn flatten(&self, def: &StrategyDef) -> StrategyDef {
        let Some(chain) = self.lineage(def) else {
            return def.clone();
        };
        let mut flat = StrategyDef {
            name: def.name.clone(),
            extends: def.extends.clone(),
            options: None,
            fields: None,
            body: Vec::new(),
            position: def.position,
        };
        for ancestor in chain.into_iter().rev() {
            merge_params(&mut flat.options, &ancestor.options);
            merge_params(&mut flat.fields, &ancestor.fields);
            flat.body.extend(ancestor.body.iter().cloned());
        }
        flat
    }
}

fn merge_params(into: &mut Option<Vec<ParamDecl>>, from: &Option<Vec<ParamDecl>>) {
    let Some(from) = from else {
        return;
    };
    let target = into.get_or_insert_with(Vec::new);
    for decl in from {
        match target.iter_mut().find(|d| d.name == decl.name) {
            Some(existing) => existing.default = decl.default.clone(),
            None => target.push(decl.clone()),
        }
    }
}

/// A parsed script strategy bound to its parameters.
#[derive(Debug, Clone)]
pub struct ScriptStrategy {
    def: Arc<StrategyDef>,
    params: StrategyParams,
}

impl ScriptStrategy {
    /// Binds supplied parameters to a flattened definition.
    ///
    /// An `options` block accepts the whole map; a `fields` block accepts
    /// only the declared names. Supplied values must have the same type as
    /// the declared default.
    pub fn instantiate(
        def: Arc<StrategyDef>,
        supplied: &StrategyParams,
    ) -> Result<Self, InstantiationError> {
        let (declared, supplied): (&[ParamDecl], StrategyParams) = match (&def.options, &def.fields) {
            (Some(_), Some(_)) => {
                return Err(InstantiationError::AmbiguousConstruction {
                    name: def.name.clone(),
                });
            }
            (Some(options), None) => (options.as_slice(), supplied.clone()),
            (None, Some(fields)) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                (fields.as_slice(), supplied.filtered(&names))
            }
            (None, None) => (&[][..], supplied.clone()),
        };

        let mut params = StrategyParams::new();
        for decl in declared {
            params.insert(&decl.name, decl.default.clone());
        }
        for (name, value) in supplied.iter() {
            if let Some(decl) = declared.iter().find(|d| d.name == name) {
                if decl.default.type_name() != value.type_name() {
                    return Err(InstantiationError::ParamType {
                        name: name.to_string(),
                        expected: decl.default.type_name(),
                        found: value.type_name(),
                    });
                }
            }
            params.insert(name, value.clone());
        }
        Ok(Self { def, params })
    }

    pub fn definition(&self) -> &StrategyDef {
        &self.def
    }
}

impl Strategy for ScriptStrategy {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn generate_signals(&self, table: &PriceTable) -> Result<SignalTable, StrategyError> {
        eval::run(&self.def, &self.params, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::ParamValue;

    #[test]
    fn candidates_exclude_base_and_unrelated() {
        let module = parse(
            "strategy Strategy extends Strategy { signal = 0; }
             strategy Helper { signal = 0; }
             strategy Other extends Helper { signal = 0; }
             strategy Real extends Strategy { signal = 0; }",
        )
        .unwrap();
        let names: Vec<&str> = module.candidates().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Real"]);
    }

    #[test]
    fn inherited_candidates_count() {
        let module = parse(
            "strategy Base extends Strategy { options { window = 5 } let ma = safe_rolling(close, window); signal = close > ma; }
             strategy Child extends Base { options { window = 3 } }",
        )
        .unwrap();
        assert_eq!(module.candidates().len(), 2);
        let flat = module.flatten(&module.strategies[1]);
        assert_eq!(
            flat.options.as_ref().unwrap()[0].default,
            ParamValue::Number(3.0)
        );
        assert!(flat.assigns(Output::Signal));
    }

    #[test]
    fn parent_must_be_defined_earlier() {
        let module = parse(
            "strategy Child extends Base { signal = 0; }
             strategy Base extends Strategy { signal = 0; }",
        )
        .unwrap();
        let names: Vec<&str> = module.candidates().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Base"]);
    }

    #[test]
    fn fields_filter_undeclared_params() {
        let module = parse("strategy A extends Strategy { fields { window = 20 } signal = 0; }").unwrap();
        let def = Arc::new(module.flatten(&module.strategies[0]));
        let supplied = StrategyParams::new()
            .with("window", ParamValue::Number(5.0))
            .with("extra", ParamValue::Flag(true));
        let strategy = ScriptStrategy::instantiate(def, &supplied).unwrap();
        assert_eq!(strategy.params().get("window"), Some(&ParamValue::Number(5.0)));
        assert!(!strategy.params().contains("extra"));
    }

    #[test]
    fn options_keep_everything() {
        let module = parse("strategy A extends Strategy { options { window = 20 } signal = 0; }").unwrap();
        let def = Arc::new(module.flatten(&module.strategies[0]));
        let supplied = StrategyParams::new().with("extra", ParamValue::Flag(true));
        let strategy = ScriptStrategy::instantiate(def, &supplied).unwrap();
        assert!(strategy.params().contains("extra"));
        assert_eq!(strategy.params().get("window"), Some(&ParamValue::Number(20.0)));
    }

    #[test]
    fn mismatched_param_type() {
        let module = parse("strategy A extends Strategy { options { window = 20 } signal = 0; }").unwrap();
        let def = Arc::new(module.flatten(&module.strategies[0]));
        let supplied = StrategyParams::new().with("window", ParamValue::Text("big".into()));
        assert_eq!(
            ScriptStrategy::instantiate(def, &supplied).unwrap_err(),
            InstantiationError::ParamType {
                name: "window".into(),
                expected: "number",
                found: "text",
            }
        );
    }

    #[test]
    fn both_blocks_are_ambiguous() {
        let module = parse("strategy A extends Strategy { options { a = 1 } fields { b = 2 } signal = 0; }").unwrap();
        let def = Arc::new(module.flatten(&module.strategies[0]));
        assert!(matches!(
            ScriptStrategy::instantiate(def, &StrategyParams::new()),
            Err(InstantiationError::AmbiguousConstruction { .. })
        ));
    }
}
