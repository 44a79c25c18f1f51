//! Strategy script AST.
//!
//! - `Module`: the `use` declarations and strategy definitions of one source
//! - `StrategyDef`: one `strategy` block with its parameters and body
//! - `Expr`: vectorized expressions evaluated over a whole price table

use crate::domain::strategy::ParamValue;

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub imports: Vec<UseDecl>,
    pub strategies: Vec<StrategyDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseDecl {
    pub path: Vec<String>,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub default: ParamValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Entries,
    Exits,
    Signal,
    TargetSize,
}

impl Output {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "entries" => Some(Output::Entries),
            "exits" => Some(Output::Exits),
            "signal" => Some(Output::Signal),
            "target_size" => Some(Output::TargetSize),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Output::Entries => "entries",
            Output::Exits => "exits",
            Output::Signal => "signal",
            Output::TargetSize => "target_size",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let { name: String, expr: Expr },
    Assign { output: Output, expr: Expr },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDef {
    pub name: String,
    pub extends: Option<String>,
    pub options: Option<Vec<ParamDecl>>,
    pub fields: Option<Vec<ParamDecl>>,
    pub body: Vec<Statement>,
    pub position: usize,
}

impl StrategyDef {
    pub fn output(&self, output: Output) -> Option<&Expr> {
        self.body.iter().rev().find_map(|s| match s {
            Statement::Assign { output: o, expr } if *o == output => Some(expr),
            _ => None,
        })
    }

    pub fn assigns(&self, output: Output) -> bool {
        self.output(output).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Name {
        name: String,
        position: usize,
    },
    Call {
        function: String,
        args: Vec<Expr>,
        position: usize,
    },
    Method {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        position: usize,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Functions a script may call, with their accepted argument counts.
pub const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("safe_rolling", 2, 3),
    ("safe_pct_change", 1, 2),
    ("rsi", 1, 2),
    ("ema", 2, 2),
    ("safe_ema", 2, 2),
    ("cross_above", 2, 2),
    ("cross_below", 2, 2),
    ("latch", 2, 2),
    ("size_by_score", 1, 5),
    ("abs", 1, 1),
];

/// Methods a script may call on a series.
pub const METHODS: &[(&str, usize, usize)] = &[("shift", 1, 1), ("fillna", 1, 1)];

pub fn arity(table: &[(&str, usize, usize)], name: &str) -> Option<(usize, usize)> {
    table
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, min, max)| (*min, *max))
}
