//! Strategy script parser.
//!
//! Recursive descent parser for the script grammar. Converts text to AST with
//! meaningful error messages including character offset, expected/found tokens.
//! Calls are checked against the function allow-list here, so a parsed
//! module can only ever reach the indicator layer and signal helpers.
//!
//! Input that ends inside a construct reports "unexpected end of input";
//! an open string reports "unterminated string literal".
//!
//! Expression nesting is capped at [`MAX_DEPTH`]. Parentheses, calls,
//! prefix operators and every link of an operator or method chain count
//! one level, which also bounds the height of the resulting tree.

use crate::domain::error::ParseError;
use crate::domain::script::ast::{
    BinaryOp, Expr, FUNCTIONS, METHODS, Module, Output, ParamDecl, Statement, StrategyDef,
    UnaryOp, UseDecl, arity,
};
use crate::domain::strategy::ParamValue;

const RESERVED: &[&str] = &[
    "use", "strategy", "extends", "options", "fields", "let", "and", "or", "not", "true", "false",
];

pub const MAX_DEPTH: usize = 64;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Skips whitespace and `#` / `//` line comments.
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('#') => self.skip_line(),
                Some('/') if self.peek_second() == Some('/') => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.advance() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn eof_error(&self, expected: &str) -> ParseError {
        ParseError {
            message: format!("unexpected end of input, expected {}", expected),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(_) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, self.peek_word()),
                position: self.pos,
            }),
            None => Err(self.eof_error(&format!("'{}'", expected))),
        }
    }

    fn consume_char(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && !remaining[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else if self.at_end() {
            Err(self.eof_error(&format!("'{}'", keyword)))
        } else {
            Err(ParseError {
                message: format!("expected '{}', found '{}'", keyword, self.peek_word()),
                position: self.pos,
            })
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_ident(&mut self, what: &str) -> Result<String, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.eof_error(what)),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word = self.peek_word();
                self.pos += word.len();
                Ok(word)
            }
            Some(_) => Err(ParseError {
                message: format!("expected {}, found '{}'", what, self.peek_word()),
                position: self.pos,
            }),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if matches!(self.peek(), Some('e' | 'E')) && digits > 0 {
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let quote = match self.advance() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(ParseError {
                    message: "expected string literal".to_string(),
                    position: start,
                });
            }
        };
        let mut out = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(ParseError {
                        message: "unterminated string literal".to_string(),
                        position: start,
                    });
                }
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(ch) => out.push(ch),
                    None => {
                        return Err(ParseError {
                            message: "unterminated string literal".to_string(),
                            position: start,
                        });
                    }
                },
                Some(ch) if ch == quote => return Ok(out),
                Some(ch) => out.push(ch),
            }
        }
    }

    fn parse_literal(&mut self) -> Result<ParamValue, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.eof_error("literal")),
            Some('"' | '\'') => Ok(ParamValue::Text(self.parse_string()?)),
            Some('-') => {
                self.advance();
                Ok(ParamValue::Number(-self.parse_number()?))
            }
            Some(ch) if ch.is_ascii_digit() || ch == '.' => Ok(ParamValue::Number(self.parse_number()?)),
            Some(_) => {
                if self.consume_keyword("true") {
                    Ok(ParamValue::Flag(true))
                } else if self.consume_keyword("false") {
                    Ok(ParamValue::Flag(false))
                } else {
                    Err(ParseError {
                        message: format!(
                            "expected literal (number, string, true, false), found '{}'",
                            self.peek_word()
                        ),
                        position: self.pos,
                    })
                }
            }
        }
    }

    // ── module level ────────────────────────────────────────────────

    fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut module = Module {
            imports: Vec::new(),
            strategies: Vec::new(),
        };
        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }
            if self.peek_keyword("use") {
                module.imports.push(self.parse_use()?);
            } else if self.peek_keyword("strategy") {
                module.strategies.push(self.parse_strategy()?);
            } else {
                return Err(ParseError {
                    message: format!("expected 'use' or 'strategy', found '{}'", self.peek_word()),
                    position: self.pos,
                });
            }
        }
        Ok(module)
    }

    fn parse_use(&mut self) -> Result<UseDecl, ParseError> {
        let position = self.pos;
        self.expect_keyword("use")?;
        let mut path = vec![self.parse_ident("module path")?];
        loop {
            self.skip_whitespace();
            if !self.remaining().starts_with("::") {
                break;
            }
            self.pos += 2;
            self.skip_whitespace();
            if self.peek() == Some('*') {
                self.advance();
                path.push("*".to_string());
                break;
            }
            path.push(self.parse_ident("path segment")?);
        }
        self.expect_char(';')?;
        Ok(UseDecl { path, position })
    }

    fn parse_strategy(&mut self) -> Result<StrategyDef, ParseError> {
        self.skip_whitespace();
        let position = self.pos;
        self.expect_keyword("strategy")?;
        let name = self.parse_ident("strategy name")?;
        let extends = if self.consume_keyword("extends") {
            Some(self.parse_ident("base strategy name")?)
        } else {
            None
        };
        self.expect_char('{')?;

        let mut def = StrategyDef {
            name,
            extends,
            options: None,
            fields: None,
            body: Vec::new(),
            position,
        };

        loop {
            self.skip_whitespace();
            let member_pos = self.pos;
            if self.at_end() {
                return Err(self.eof_error("'}'"));
            }
            if self.consume_char('}') {
                break;
            }
            if self.consume_keyword("options") {
                if def.options.is_some() {
                    return Err(ParseError {
                        message: "duplicate options block".to_string(),
                        position: member_pos,
                    });
                }
                def.options = Some(self.parse_param_block()?);
            } else if self.consume_keyword("fields") {
                if def.fields.is_some() {
                    return Err(ParseError {
                        message: "duplicate fields block".to_string(),
                        position: member_pos,
                    });
                }
                def.fields = Some(self.parse_param_block()?);
            } else if self.consume_keyword("let") {
                let name = self.parse_binding_name()?;
                self.expect_char('=')?;
                let expr = self.parse_expr()?;
                self.expect_char(';')?;
                def.body.push(Statement::Let { name, expr });
            } else if let Some(output) = Output::from_keyword(&self.peek_word()) {
                self.pos += output.keyword().len();
                if def.assigns(output) {
                    return Err(ParseError {
                        message: format!("'{}' assigned more than once", output.keyword()),
                        position: member_pos,
                    });
                }
                self.expect_char('=')?;
                let expr = self.parse_expr()?;
                self.expect_char(';')?;
                def.body.push(Statement::Assign { output, expr });
            } else {
                return Err(ParseError {
                    message: format!(
                        "expected 'options', 'fields', 'let', an output or '}}', found '{}'",
                        self.peek_word()
                    ),
                    position: member_pos,
                });
            }
        }
        Ok(def)
    }

    fn parse_binding_name(&mut self) -> Result<String, ParseError> {
        let position = {
            self.skip_whitespace();
            self.pos
        };
        let name = self.parse_ident("binding name")?;
        if RESERVED.contains(&name.as_str()) || Output::from_keyword(&name).is_some() {
            return Err(ParseError {
                message: format!("'{}' is reserved and cannot be bound", name),
                position,
            });
        }
        Ok(name)
    }

    fn parse_param_block(&mut self) -> Result<Vec<ParamDecl>, ParseError> {
        self.expect_char('{')?;
        let mut params: Vec<ParamDecl> = Vec::new();
        loop {
            if self.consume_char('}') {
                break;
            }
            let position = self.pos;
            let name = self.parse_binding_name()?;
            if params.iter().any(|p| p.name == name) {
                return Err(ParseError {
                    message: format!("parameter '{}' declared twice", name),
                    position,
                });
            }
            self.expect_char('=')?;
            let default = self.parse_literal()?;
            params.push(ParamDecl { name, default });
            if !self.consume_char(',') {
                self.expect_char('}')?;
                break;
            }
        }
        Ok(params)
    }

    // ── expressions ─────────────────────────────────────────────────

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError {
                message: format!("expression nested too deeply (limit {})", MAX_DEPTH),
                position: self.pos,
            });
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        self.descend()?;
        let expr = self.parse_or()?;
        self.depth = base;
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while self.consume_keyword("or") {
            self.descend()?;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while self.consume_keyword("and") {
            self.descend()?;
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword("not") {
            let base = self.depth;
            self.descend()?;
            let operand = self.parse_not()?;
            self.depth = base;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_sum()?;
        self.skip_whitespace();
        let op = [
            (">=", BinaryOp::Ge),
            ("<=", BinaryOp::Le),
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            (">", BinaryOp::Gt),
            ("<", BinaryOp::Lt),
        ]
        .into_iter()
        .find(|(sym, _)| self.remaining().starts_with(sym));
        match op {
            Some((sym, op)) => {
                self.pos += sym.len();
                let right = self.parse_sum()?;
                Ok(binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.parse_product()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_product()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume_char('-') {
            let base = self.depth;
            self.descend()?;
            let operand = self.parse_unary()?;
            self.depth = base;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_whitespace();
            if !(self.peek() == Some('.') && self.peek_second().is_some_and(char::is_alphabetic)) {
                break;
            }
            self.advance();
            self.descend()?;
            let position = self.pos;
            let method = self.parse_ident("method name")?;
            let Some(bounds) = arity(METHODS, &method) else {
                return Err(ParseError {
                    message: format!("unknown method '{}', expected shift or fillna", method),
                    position,
                });
            };
            let args = self.parse_args(&method, bounds, position)?;
            expr = Expr::Method {
                receiver: Box::new(expr),
                method,
                args,
                position,
            };
        }
        self.depth = base;
        Ok(expr)
    }

    fn parse_args(
        &mut self,
        name: &str,
        (min, max): (usize, usize),
        position: usize,
    ) -> Result<Vec<Expr>, ParseError> {
        self.expect_char('(')?;
        let mut args = Vec::new();
        if !self.consume_char(')') {
            loop {
                args.push(self.parse_expr()?);
                if self.consume_char(')') {
                    break;
                }
                self.expect_char(',')?;
            }
        }
        if args.len() < min || args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(ParseError {
                message: format!(
                    "'{}' takes {} arguments, got {}",
                    name,
                    expected,
                    args.len()
                ),
                position,
            });
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        let position = self.pos;
        match self.peek() {
            None => Err(self.eof_error("expression")),
            Some(ch) if ch.is_ascii_digit() || ch == '.' => Ok(Expr::Number(self.parse_number()?)),
            Some('"' | '\'') => Ok(Expr::Text(self.parse_string()?)),
            Some('(') => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_char(')')?;
                Ok(expr)
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word = self.parse_ident("expression")?;
                match word.as_str() {
                    "true" => return Ok(Expr::Bool(true)),
                    "false" => return Ok(Expr::Bool(false)),
                    w if RESERVED.contains(&w) => {
                        return Err(ParseError {
                            message: format!("unexpected keyword '{}' in expression", w),
                            position,
                        });
                    }
                    _ => {}
                }
                self.skip_whitespace();
                if self.peek() != Some('(') {
                    return Ok(Expr::Name {
                        name: word,
                        position,
                    });
                }
                let Some(bounds) = arity(FUNCTIONS, &word) else {
                    return Err(ParseError {
                        message: format!("unknown function '{}'", word),
                        position,
                    });
                };
                let args = self.parse_args(&word, bounds, position)?;
                Ok(Expr::Call {
                    function: word,
                    args,
                    position,
                })
            }
            Some(_) => Err(ParseError {
                message: format!("expected expression, found '{}'", self.peek_word()),
                position,
            }),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn parse(input: &str) -> Result<Module, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_module()
}
