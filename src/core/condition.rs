//! Minimal condition language used for route `condition` fields.
//!
//! Supported forms, optionally wrapped in `${ ... }`:
//! * literals: numbers, `'single'` or `"double"` quoted strings, `true`,
//!   `false`, `null`
//! * dotted binding paths: `request.path`, `attributes.v`
//! * comparisons: `==`, `!=`, `<`, `<=`, `>`, `>=`
//! * regex match: `request.path =~ '^/api/'`
//! * logic: `&&`/`and`, `||`/`or`, `!`/`not`, parentheses
//!
//! Numbers compare numerically, also against numeric strings. A missing
//! binding behaves like `null`.
use std::sync::Arc;

use regex::Regex;
use serde_json::{Number, Value};

use crate::ports::expression::{Bindings, Expression, ExpressionCompiler, ExpressionError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Path(Vec<String>),
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug)]
enum Node {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
    Matches(Box<Node>, Regex),
}

/// Compiler for the condition language.
#[derive(Debug, Default, Clone)]
pub struct ConditionCompiler;

impl ConditionCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionCompiler for ConditionCompiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn Expression>, ExpressionError> {
        let (body, start) = strip_template(source);
        let (tokens, offsets) = tokenize(source, body, start)?;
        let mut parser = Parser {
            source,
            tokens,
            offsets,
            end: start + body.len(),
            position: 0,
        };
        let root = parser.parse_or()?;
        if parser.position < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Arc::new(Condition {
            source: source.to_string(),
            root,
        }))
    }
}

/// Expression body and its byte offset within `source`.
fn strip_template(source: &str) -> (&str, usize) {
    let trimmed = source.trim_start();
    let lead = source.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    match trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        Some(body) => (body, lead + 2),
        None => (trimmed, lead),
    }
}

fn syntax_error(source: &str, offset: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        expression: source.to_string(),
        offset,
        message: message.into(),
    }
}

/// Tokens of `body` together with each token's byte offset in `source`.
fn tokenize(
    source: &str,
    body: &str,
    start: usize,
) -> Result<(Vec<Token>, Vec<usize>), ExpressionError> {
    let chars: Vec<(usize, char)> = body.char_indices().collect();
    let mut tokens = Vec::new();
    let mut offsets = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, c) = chars[i];
        let offset = start + offset;
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let pushed = tokens.len();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&(_, '\\')) => {
                            if let Some(&(_, escaped)) = chars.get(i + 1) {
                                text.push(escaped);
                            }
                            i += 2;
                        }
                        Some(&(_, c)) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some(&(_, c)) => {
                            text.push(c);
                            i += 1;
                        }
                        None => return Err(syntax_error(source, offset, "unterminated string")),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            c if c.is_ascii_digit()
                || (c == '-'
                    && next.is_some_and(|n| n.is_ascii_digit())
                    && !matches!(tokens.last(), Some(Token::Literal(_) | Token::Path(_) | Token::RParen))) =>
            {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|&(_, c)| c.is_ascii_digit() || c == '.')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
                tokens.push(Token::Literal(parse_number(&text).ok_or_else(|| {
                    syntax_error(source, offset, format!("invalid number '{text}'"))
                })?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|&(_, c)| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().map(|&(_, c)| c).collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    "and" => Token::Op("&&"),
                    "or" => Token::Op("||"),
                    "not" => Token::Op("!"),
                    _ => Token::Path(word.split('.').map(str::to_string).collect()),
                });
            }
            _ => {
                let two: String = chars[i..chars.len().min(i + 2)]
                    .iter()
                    .map(|&(_, c)| c)
                    .collect();
                let op = ["==", "!=", "<=", ">=", "&&", "||", "=~"]
                    .into_iter()
                    .find(|op| two == *op)
                    .or_else(|| ["<", ">", "!"].into_iter().find(|op| op.starts_with(c)));
                match op {
                    Some(op) => {
                        i += op.len();
                        tokens.push(Token::Op(op));
                    }
                    None => {
                        return Err(syntax_error(
                            source,
                            offset,
                            format!("unexpected character '{c}'"),
                        ));
                    }
                }
            }
        }
        if tokens.len() > pushed {
            offsets.push(offset);
        }
    }
    Ok((tokens, offsets))
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    offsets: Vec<usize>,
    // Offset reported for errors at the end of input.
    end: usize,
    position: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> ExpressionError {
        let offset = self
            .offsets
            .get(self.position)
            .copied()
            .unwrap_or(self.end);
        syntax_error(self.source, offset, message)
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.position) {
            Some(Token::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn parse_or(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek_op() == Some("||") {
            self.position += 1;
            let right = self.parse_and()?;
            left = Node::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while self.peek_op() == Some("&&") {
            self.position += 1;
            let right = self.parse_comparison()?;
            left = Node::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Node, ExpressionError> {
        let left = self.parse_unary()?;
        let op = match self.peek_op() {
            Some("==") => CompareOp::Eq,
            Some("!=") => CompareOp::Ne,
            Some("<") => CompareOp::Lt,
            Some("<=") => CompareOp::Le,
            Some(">") => CompareOp::Gt,
            Some(">=") => CompareOp::Ge,
            Some("=~") => {
                self.position += 1;
                return match self.tokens.get(self.position) {
                    Some(Token::Literal(Value::String(pattern))) => {
                        let pattern = pattern.clone();
                        let regex = Regex::new(&pattern).map_err(|e| {
                            ExpressionError::InvalidPattern {
                                pattern: pattern.clone(),
                                message: e.to_string(),
                            }
                        })?;
                        self.position += 1;
                        Ok(Node::Matches(Box::new(left), regex))
                    }
                    _ => Err(self.error("'=~' expects a quoted pattern")),
                };
            }
            _ => return Ok(left),
        };
        self.position += 1;
        let right = self.parse_unary()?;
        Ok(Node::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Node, ExpressionError> {
        if self.peek_op() == Some("!") {
            self.position += 1;
            return Ok(Node::Not(Box::new(self.parse_unary()?)));
        }
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.position += 1;
        match token {
            Token::Literal(value) => Ok(Node::Literal(value)),
            Token::Path(path) => Ok(Node::Path(path)),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.tokens.get(self.position) {
                    Some(Token::RParen) => {
                        self.position += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("missing ')'")),
                }
            }
            Token::RParen | Token::Op(_) => {
                self.position -= 1;
                Err(self.error("expected a value"))
            }
        }
    }
}

#[derive(Debug)]
struct Condition {
    source: String,
    root: Node,
}

impl Expression for Condition {
    fn eval(&self, bindings: &Bindings) -> Option<Value> {
        eval(&self.root, bindings)
    }

    fn source(&self) -> &str {
        &self.source
    }
}

fn truthy(value: Option<Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Option<bool> {
    let numeric = match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => as_number(left).zip(as_number(right)),
        _ => None,
    };
    let ordering = match (numeric, left, right) {
        (Some((l, r)), _, _) => l.partial_cmp(&r),
        (None, Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    };
    match op {
        CompareOp::Eq => Some(ordering.map_or_else(|| left == right, |o| o.is_eq())),
        CompareOp::Ne => Some(ordering.map_or_else(|| left != right, |o| o.is_ne())),
        CompareOp::Lt => ordering.map(|o| o.is_lt()),
        CompareOp::Le => ordering.map(|o| o.is_le()),
        CompareOp::Gt => ordering.map(|o| o.is_gt()),
        CompareOp::Ge => ordering.map(|o| o.is_ge()),
    }
}

fn eval(node: &Node, bindings: &Bindings) -> Option<Value> {
    match node {
        Node::Literal(value) => Some(value.clone()),
        Node::Path(path) => bindings.lookup(path.iter().map(String::as_str)).cloned(),
        Node::Not(inner) => Some(Value::Bool(!truthy(eval(inner, bindings)))),
        Node::And(l, r) => Some(Value::Bool(
            truthy(eval(l, bindings)) && truthy(eval(r, bindings)),
        )),
        Node::Or(l, r) => Some(Value::Bool(
            truthy(eval(l, bindings)) || truthy(eval(r, bindings)),
        )),
        Node::Compare(op, l, r) => {
            let left = eval(l, bindings).unwrap_or(Value::Null);
            let right = eval(r, bindings).unwrap_or(Value::Null);
            compare(*op, &left, &right).map(Value::Bool)
        }
        Node::Matches(inner, regex) => match eval(inner, bindings)? {
            Value::String(text) => Some(Value::Bool(regex.is_match(&text))),
            _ => Some(Value::Bool(false)),
        },
    }
}
