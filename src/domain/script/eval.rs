//! Strategy script evaluation.
//!
//! Expressions are evaluated over the whole table at once. Values are
//! scalars, text, flags, numeric series or boolean masks.
//!
//! # Evaluation Semantics
//!
//! - Names resolve as `let` binding, then parameter, then price column
//! - A missing `sentiment` column reads as neutral (0.0)
//! - Arithmetic on a missing value, or division by zero, yields missing
//! - Comparisons involving a missing value are false
//! - Masks and flags used as numbers read as 1.0 / 0.0
//! - All `let` bindings are evaluated before any output, so an output
//!   always sees the final binding of a name

use std::collections::HashMap;

use crate::domain::error::StrategyError;
use crate::domain::indicator::{
    Aggregate, Series, ema, fillna, rolling, rsi, safe_ema, safe_pct_change, shift, to_series,
};
use crate::domain::ohlcv::PriceTable;
use crate::domain::script::ast::{BinaryOp, Expr, Output, Statement, StrategyDef, UnaryOp};
use crate::domain::signal::{
    SignalTable, convert_to_signal, cross_above, cross_below, latch, signal_from_series,
};
use crate::domain::sizing::{PositionSizer, SentimentSizer};
use crate::domain::strategy::{ParamValue, StrategyParams};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Text(String),
    Flag(bool),
    Series(Series),
    Mask(Vec<bool>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "number",
            Value::Text(_) => "text",
            Value::Flag(_) => "flag",
            Value::Series(_) => "series",
            Value::Mask(_) => "mask",
        }
    }
}

impl From<&ParamValue> for Value {
    fn from(value: &ParamValue) -> Self {
        match value {
            ParamValue::Number(n) => Value::Scalar(*n),
            ParamValue::Flag(b) => Value::Flag(*b),
            ParamValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

fn eval_error(message: String) -> StrategyError {
    StrategyError::Evaluation(message)
}

fn invalid(name: &str, reason: String) -> StrategyError {
    StrategyError::InvalidParameter {
        name: name.to_string(),
        reason,
    }
}

/// Raw observations with missing values as NaN, for indicators that take
/// plain slices.
fn raw(series: &[Option<f64>]) -> Vec<f64> {
    series.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

pub struct Env<'a> {
    table: &'a PriceTable,
    params: &'a StrategyParams,
    bindings: HashMap<String, Value>,
    order: Vec<String>,
}

impl<'a> Env<'a> {
    pub fn new(table: &'a PriceTable, params: &'a StrategyParams) -> Self {
        Self {
            table,
            params,
            bindings: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        if self.bindings.insert(name.to_string(), value).is_none() {
            self.order.push(name.to_string());
        }
    }

    /// Series-valued bindings in first-binding order.
    pub fn series_bindings(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.order.iter().filter_map(|name| match self.bindings.get(name) {
            Some(Value::Series(s)) => Some((name.as_str(), s)),
            _ => None,
        })
    }

    fn resolve(&self, name: &str, position: usize) -> Result<Value, StrategyError> {
        if let Some(value) = self.bindings.get(name) {
            return Ok(value.clone());
        }
        if let Some(param) = self.params.get(name) {
            return Ok(Value::from(param));
        }
        if let Some(column) = self.table.column(name) {
            return Ok(Value::Series(to_series(column)));
        }
        if name.eq_ignore_ascii_case("sentiment") {
            return Ok(Value::Series(to_series(&self.table.sentiment())));
        }
        Err(eval_error(format!(
            "unknown name '{}' at position {}: not a binding, parameter or column",
            name, position
        )))
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, StrategyError> {
        match expr {
            Expr::Number(n) => Ok(Value::Scalar(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Bool(b) => Ok(Value::Flag(*b)),
            Expr::Name { name, position } => self.resolve(name, *position),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                self.unary(*op, value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
            Expr::Call {
                function,
                args,
                position,
            } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(function, args, *position)
            }
            Expr::Method {
                receiver,
                method,
                args,
                position,
            } => {
                let receiver = self.eval(receiver)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.method(receiver, method, args, *position)
            }
        }
    }

    // ── conversions ─────────────────────────────────────────────────

    fn as_series(&self, value: Value, context: &str) -> Result<Series, StrategyError> {
        let len = self.len();
        match value {
            Value::Series(s) => Ok(s),
            Value::Scalar(x) => Ok(vec![x.is_finite().then_some(x); len]),
            Value::Mask(m) => Ok(m.into_iter().map(|b| Some(if b { 1.0 } else { 0.0 })).collect()),
            Value::Flag(b) => Ok(vec![Some(if b { 1.0 } else { 0.0 }); len]),
            Value::Text(_) => Err(eval_error(format!("{} expects a number or series, got text", context))),
        }
    }

    fn as_mask(&self, value: Value, context: &str) -> Result<Vec<bool>, StrategyError> {
        match value {
            Value::Mask(m) => Ok(m),
            Value::Flag(b) => Ok(vec![b; self.len()]),
            other => Err(eval_error(format!(
                "{} expects a boolean mask, got {}",
                context,
                other.type_name()
            ))),
        }
    }

    fn as_scalar(value: &Value, context: &str) -> Result<f64, StrategyError> {
        match value {
            Value::Scalar(x) => Ok(*x),
            other => Err(eval_error(format!(
                "{} expects a number, got {}",
                context,
                other.type_name()
            ))),
        }
    }

    fn as_count(value: &Value, name: &str, minimum: usize) -> Result<usize, StrategyError> {
        let x = Self::as_scalar(value, name)?;
        if x.fract() == 0.0 && x >= minimum as f64 && x <= u32::MAX as f64 {
            Ok(x as usize)
        } else {
            Err(invalid(
                name,
                format!("must be an integer >= {}, got {}", minimum, x),
            ))
        }
    }

    fn as_flag(value: &Value, context: &str) -> Result<bool, StrategyError> {
        match value {
            Value::Flag(b) => Ok(*b),
            other => Err(eval_error(format!(
                "{} expects true or false, got {}",
                context,
                other.type_name()
            ))),
        }
    }

    // ── operators ───────────────────────────────────────────────────

    fn unary(&self, op: UnaryOp, value: Value) -> Result<Value, StrategyError> {
        match (op, value) {
            (UnaryOp::Neg, Value::Scalar(x)) => Ok(Value::Scalar(-x)),
            (UnaryOp::Neg, other) => {
                let s = self.as_series(other, "'-'")?;
                Ok(Value::Series(s.into_iter().map(|v| v.map(|x| -x)).collect()))
            }
            (UnaryOp::Not, Value::Flag(b)) => Ok(Value::Flag(!b)),
            (UnaryOp::Not, other) => {
                let m = self.as_mask(other, "'not'")?;
                Ok(Value::Mask(m.into_iter().map(|b| !b).collect()))
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value, StrategyError> {
        match op {
            BinaryOp::And | BinaryOp::Or => self.logical(op, left, right),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                self.arithmetic(op, left, right)
            }
            _ => self.comparison(op, left, right),
        }
    }

    fn logical(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value, StrategyError> {
        let combine = |a: bool, b: bool| if op == BinaryOp::And { a && b } else { a || b };
        if let (Value::Flag(a), Value::Flag(b)) = (&left, &right) {
            return Ok(Value::Flag(combine(*a, *b)));
        }
        let context = format!("'{}'", op.symbol());
        let a = self.as_mask(left, &context)?;
        let b = self.as_mask(right, &context)?;
        Ok(Value::Mask(a.into_iter().zip(b).map(|(x, y)| combine(x, y)).collect()))
    }

    fn arithmetic(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value, StrategyError> {
        let apply = |a: f64, b: f64| -> Option<f64> {
            let out = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => {
                    if b == 0.0 {
                        return None;
                    }
                    a / b
                }
            };
            out.is_finite().then_some(out)
        };
        if let (Value::Scalar(a), Value::Scalar(b)) = (&left, &right) {
            return Ok(Value::Scalar(apply(*a, *b).unwrap_or(f64::NAN)));
        }
        let context = format!("'{}'", op.symbol());
        let a = self.as_series(left, &context)?;
        let b = self.as_series(right, &context)?;
        Ok(Value::Series(
            a.into_iter()
                .zip(b)
                .map(|(x, y)| apply(x?, y?))
                .collect(),
        ))
    }

    fn comparison(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value, StrategyError> {
        let test = |a: f64, b: f64| match op {
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Eq => a == b,
            _ => a != b,
        };
        match (&left, &right) {
            (Value::Scalar(a), Value::Scalar(b)) => return Ok(Value::Flag(test(*a, *b))),
            (Value::Text(a), Value::Text(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                return Ok(Value::Flag((a == b) == (op == BinaryOp::Eq)));
            }
            (Value::Flag(a), Value::Flag(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => {
                return Ok(Value::Flag((a == b) == (op == BinaryOp::Eq)));
            }
            _ => {}
        }
        let context = format!("'{}'", op.symbol());
        let a = self.as_series(left, &context)?;
        let b = self.as_series(right, &context)?;
        Ok(Value::Mask(
            a.into_iter()
                .zip(b)
                .map(|(x, y)| matches!((x, y), (Some(x), Some(y)) if test(x, y)))
                .collect(),
        ))
    }

    // ── functions and methods ───────────────────────────────────────

    fn call(&self, function: &str, mut args: Vec<Value>, position: usize) -> Result<Value, StrategyError> {
        let context = format!("{}() at position {}", function, position);
        let first = args.remove(0);
        match function {
            "safe_rolling" => {
                let series = self.as_series(first, &context)?;
                let window = Self::as_count(&args[0], "window", 1)?;
                let agg = match args.get(1) {
                    None => Aggregate::Mean,
                    Some(Value::Text(name)) => name.parse().map_err(|e| invalid("func", e))?,
                    Some(other) => {
                        return Err(eval_error(format!(
                            "{} expects an aggregate name, got {}",
                            context,
                            other.type_name()
                        )));
                    }
                };
                Ok(Value::Series(rolling(&shift(&series, 1), window, agg)))
            }
            "safe_pct_change" => {
                let series = self.as_series(first, &context)?;
                let periods = match args.first() {
                    Some(v) => Self::as_count(v, "periods", 1)?,
                    None => 1,
                };
                Ok(Value::Series(safe_pct_change(&raw(&series), periods)))
            }
            "rsi" => {
                let series = self.as_series(first, &context)?;
                let period = match args.first() {
                    Some(v) => Self::as_count(v, "period", 1)?,
                    None => 14,
                };
                Ok(Value::Series(rsi(&raw(&series), period)))
            }
            "ema" => {
                let series = self.as_series(first, &context)?;
                let span = Self::as_count(&args[0], "span", 1)?;
                Ok(Value::Series(ema(&series, span)))
            }
            "safe_ema" => {
                let series = self.as_series(first, &context)?;
                let span = Self::as_count(&args[0], "span", 1)?;
                Ok(Value::Series(safe_ema(&raw(&series), span)))
            }
            "cross_above" | "cross_below" => {
                let a = self.as_series(first, &context)?;
                let b = self.as_series(args.remove(0), &context)?;
                let mask = if function == "cross_above" {
                    cross_above(&a, &b)
                } else {
                    cross_below(&a, &b)
                };
                Ok(Value::Mask(mask))
            }
            "latch" => {
                let entries = self.as_mask(first, &context)?;
                let exits = self.as_mask(args.remove(0), &context)?;
                Ok(Value::Mask(latch(&entries, &exits)))
            }
            "size_by_score" => {
                let scores = self.as_series(first, &context)?;
                let threshold = match args.first() {
                    Some(v) => Self::as_scalar(v, &context)?,
                    None => 0.2,
                };
                let base = match args.get(1) {
                    Some(v) => Self::as_scalar(v, &context)?,
                    None => 1.0,
                };
                let scale = match args.get(2) {
                    Some(v) => Self::as_scalar(v, &context)?,
                    None => 1.0,
                };
                let leverage = match args.get(3) {
                    Some(v) => Self::as_flag(v, &context)?,
                    None => false,
                };
                let sizer = SentimentSizer::new(base, threshold, scale, leverage)?;
                let weights = sizer.get_target_weights(&raw(&scores));
                Ok(Value::Series(weights.into_iter().map(Some).collect()))
            }
            "abs" => match first {
                Value::Scalar(x) => Ok(Value::Scalar(x.abs())),
                other => {
                    let s = self.as_series(other, &context)?;
                    Ok(Value::Series(s.into_iter().map(|v| v.map(f64::abs)).collect()))
                }
            },
            other => Err(eval_error(format!("unknown function '{}'", other))),
        }
    }

    fn method(
        &self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        position: usize,
    ) -> Result<Value, StrategyError> {
        let context = format!(".{}() at position {}", method, position);
        match method {
            "shift" => {
                let n = Self::as_count(&args[0], "shift", 0)?;
                match receiver {
                    Value::Mask(m) => {
                        let len = m.len();
                        let mut out = vec![false; len];
                        if n < len {
                            out[n..].copy_from_slice(&m[..len - n]);
                        }
                        Ok(Value::Mask(out))
                    }
                    other => {
                        let s = self.as_series(other, &context)?;
                        Ok(Value::Series(shift(&s, n)))
                    }
                }
            }
            "fillna" => {
                let fill = Self::as_scalar(&args[0], &context)?;
                match receiver {
                    Value::Mask(m) => Ok(Value::Mask(m)),
                    Value::Scalar(x) => Ok(Value::Scalar(if x.is_finite() { x } else { fill })),
                    other => {
                        let s = self.as_series(other, &context)?;
                        Ok(Value::Series(fillna(&s, fill).into_iter().map(Some).collect()))
                    }
                }
            }
            other => Err(eval_error(format!("unknown method '{}'", other))),
        }
    }
}

/// Evaluates a strategy definition against a table.
pub fn run(
    def: &StrategyDef,
    params: &StrategyParams,
    table: &PriceTable,
) -> Result<SignalTable, StrategyError> {
    table.close()?;
    let mut env = Env::new(table, params);
    for statement in &def.body {
        if let Statement::Let { name, expr } = statement {
            let value = env.eval(expr)?;
            env.bind(name, value);
        }
    }

    let signal = if let Some(expr) = def.output(Output::Signal) {
        let value = env.eval(expr)?;
        signal_from_series(&env.as_series(value, "signal")?)?
    } else if let Some(expr) = def.output(Output::Entries) {
        let entries = env.as_mask(env.eval(expr)?, "entries")?;
        let exits = match def.output(Output::Exits) {
            Some(expr) => env.as_mask(env.eval(expr)?, "exits")?,
            None => vec![false; table.len()],
        };
        convert_to_signal(&entries, &exits)
    } else {
        return Err(eval_error(format!(
            "strategy '{}' assigns neither 'signal' nor 'entries'",
            def.name
        )));
    };

    let mut out = SignalTable::new(table.dates().to_vec(), signal);
    if let Some(expr) = def.output(Output::TargetSize) {
        let sizes = env.as_series(env.eval(expr)?, "target_size")?;
        out = out.with_target_size(sizes.into_iter().map(|v| v.unwrap_or(0.0)).collect());
    }
    for (name, series) in env.series_bindings() {
        out = out.with_indicator(name, series.clone());
    }
    Ok(out)
}
