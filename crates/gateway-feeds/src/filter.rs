//! Predicate language over transaction fields.
//!
//! Two input dialects reach the parser: a braced one where fields are
//! written `{gas}`, and a bare C-style one (`gas > 1000 and to = abc`).
//! A single tokenizer serves both — bare words resolve to fields in field
//! position and to `0x`-prefixed hex strings in operand position. Parsing
//! is independent of evaluation so entitlement checks can dry-run an
//! expression against the zero-valued reference map.

use primitive_types::U256;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Fields a filter expression may reference.
pub const AVAILABLE_FIELDS: [&str; 10] = [
    "gas",
    "gas_price",
    "value",
    "to",
    "from",
    "method_id",
    "type",
    "chain_id",
    "max_fee_per_gas",
    "max_priority_fee_per_gas",
];

/// Errors from parsing, validating, or evaluating a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("error parsing filter: {0}")]
    Parse(String),

    /// A field reference with no comparison, e.g. `(from)`.
    #[error("filter is empty")]
    EmptyFilter,

    #[error("unknown filter field {0}")]
    UnknownField(String),

    #[error("type mismatch evaluating field {0}")]
    TypeMismatch(String),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Ge => ">=",
            FilterOp::Le => "<=",
            FilterOp::In => "in",
        };
        f.write_str(s)
    }
}

/// A literal operand inside a filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Num(U256),
    Str(String),
    List(Vec<FilterValue>),
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Cmp {
        field: String,
        op: FilterOp,
        value: FilterValue,
    },
    /// A bare field reference; parse-legal but rejected by validation.
    Field(String),
}

impl FilterExpr {
    /// Every field name the expression mentions.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            FilterExpr::And(a, b) | FilterExpr::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            FilterExpr::Cmp { field, .. } | FilterExpr::Field(field) => {
                if !out.contains(field) {
                    out.push(field.clone());
                }
            }
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::And(a, b) => write!(f, "({a} and {b})"),
            FilterExpr::Or(a, b) => write!(f, "({a} or {b})"),
            FilterExpr::Cmp { field, op, value } => write!(f, "{{{field}}} {op} {value:?}"),
            FilterExpr::Field(field) => write!(f, "({field})"),
        }
    }
}

/// A runtime field value a notification exposes to its filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Num(U256),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Op(FilterOp),
    And,
    Or,
    Str(String),
    Num(U256),
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    // Single-quote strings and mixed case are normalized up front.
    let input = input.replace('\'', "\"").to_lowercase();
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '>' | '<' | '!' | '=' => {
                let followed_by_eq = bytes.get(i + 1) == Some(&b'=');
                if followed_by_eq {
                    let op = match c {
                        '>' => FilterOp::Ge,
                        '<' => FilterOp::Le,
                        '!' => FilterOp::Ne,
                        _ => FilterOp::Eq,
                    };
                    tokens.push(Token::Op(op));
                    i += 2;
                } else {
                    match c {
                        '>' => tokens.push(Token::Op(FilterOp::Gt)),
                        '<' => tokens.push(Token::Op(FilterOp::Lt)),
                        '=' => tokens.push(Token::Op(FilterOp::Eq)),
                        _ => {
                            return Err(FilterError::Parse(format!(
                                "unexpected character {c:?}"
                            )))
                        }
                    }
                    i += 1;
                }
            }
            '"' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] as char != '"' {
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(FilterError::Parse("unterminated string".to_string()));
                }
                tokens.push(Token::Str(hexify(&input[start..end])));
                i = end + 1;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                let mut end = i;
                while end < bytes.len() {
                    let w = bytes[end] as char;
                    if w.is_ascii_alphanumeric() || w == '_' {
                        end += 1;
                    } else {
                        break;
                    }
                }
                let word = &input[start..end];
                i = end;
                match word {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::Op(FilterOp::In)),
                    _ => {
                        if word.bytes().all(|b| b.is_ascii_digit()) {
                            let num = U256::from_dec_str(word)
                                .map_err(|e| FilterError::Parse(e.to_string()))?;
                            tokens.push(Token::Num(num));
                        } else {
                            tokens.push(Token::Word(word.to_string()));
                        }
                    }
                }
            }
            other => {
                return Err(FilterError::Parse(format!(
                    "unexpected character {other:?}"
                )))
            }
        }
    }

    Ok(tokens)
}

/// Quote a bare literal as a hex string, prepending `0x` when missing.
fn hexify(word: &str) -> String {
    if word.starts_with("0x") {
        word.to_string()
    } else {
        format!("0x{word}")
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), FilterError> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(FilterError::Parse(format!(
                "expected {expected:?}, got {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<FilterExpr, FilterError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let right = self.parse_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr, FilterError> {
        let mut left = self.parse_primary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let right = self.parse_primary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<FilterExpr, FilterError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.next();
            let inner = self.parse_or()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FilterExpr, FilterError> {
        let field = self.parse_field_ref()?;
        match self.peek() {
            Some(Token::Op(_)) => {
                let Some(Token::Op(op)) = self.next() else {
                    unreachable!()
                };
                let value = self.parse_value(op)?;
                Ok(FilterExpr::Cmp { field, op, value })
            }
            // A lone field reference parses; validation rejects it.
            _ => Ok(FilterExpr::Field(field)),
        }
    }

    fn parse_field_ref(&mut self) -> Result<String, FilterError> {
        match self.next() {
            Some(Token::LBrace) => {
                let name = match self.next() {
                    Some(Token::Word(word)) => word,
                    other => {
                        return Err(FilterError::Parse(format!(
                            "expected field name, got {other:?}"
                        )))
                    }
                };
                self.expect(&Token::RBrace)?;
                Ok(name)
            }
            Some(Token::Word(word)) if AVAILABLE_FIELDS.contains(&word.as_str()) => Ok(word),
            other => Err(FilterError::Parse(format!(
                "expected field reference, got {other:?}"
            ))),
        }
    }

    fn parse_value(&mut self, op: FilterOp) -> Result<FilterValue, FilterError> {
        if op == FilterOp::In {
            self.expect(&Token::LBracket)?;
            let mut items = Vec::new();
            loop {
                items.push(self.parse_scalar()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RBracket) => break,
                    other => {
                        return Err(FilterError::Parse(format!(
                            "expected ',' or ']', got {other:?}"
                        )))
                    }
                }
            }
            return Ok(FilterValue::List(items));
        }
        self.parse_scalar()
    }

    fn parse_scalar(&mut self) -> Result<FilterValue, FilterError> {
        match self.next() {
            Some(Token::Num(num)) => Ok(FilterValue::Num(num)),
            Some(Token::Str(s)) => Ok(FilterValue::Str(s)),
            Some(Token::Word(word)) => Ok(FilterValue::Str(hexify(&word))),
            other => Err(FilterError::Parse(format!(
                "expected literal, got {other:?}"
            ))),
        }
    }
}

/// Parse either dialect into an expression tree.
pub fn parse(input: &str) -> Result<FilterExpr, FilterError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FilterError::Parse("empty filter".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(FilterError::Parse(format!(
            "trailing input at token {}",
            parser.pos
        )));
    }
    Ok(expr)
}

/// Validate an expression at subscribe time: reject bare field references
/// and dry-run against the reference map to surface unknown fields and
/// type errors before the first notification arrives.
pub fn validate(expr: &FilterExpr) -> Result<(), FilterError> {
    reject_bare_fields(expr)?;
    eval(expr, &reference_map())?;
    Ok(())
}

fn reject_bare_fields(expr: &FilterExpr) -> Result<(), FilterError> {
    match expr {
        FilterExpr::And(a, b) | FilterExpr::Or(a, b) => {
            reject_bare_fields(a)?;
            reject_bare_fields(b)
        }
        FilterExpr::Field(_) => Err(FilterError::EmptyFilter),
        FilterExpr::Cmp { .. } => Ok(()),
    }
}

/// The zero-valued transaction field map used for validation.
#[must_use]
pub fn reference_map() -> HashMap<String, FieldValue> {
    let mut map = HashMap::new();
    for field in ["gas", "gas_price", "value", "type", "chain_id", "max_fee_per_gas", "max_priority_fee_per_gas"] {
        map.insert(field.to_string(), FieldValue::Num(U256::zero()));
    }
    for field in ["to", "from", "method_id"] {
        map.insert(field.to_string(), FieldValue::Str("0x0".to_string()));
    }
    map
}

/// Evaluate an expression against a populated field map.
pub fn eval(
    expr: &FilterExpr,
    fields: &HashMap<String, FieldValue>,
) -> Result<bool, FilterError> {
    match expr {
        FilterExpr::And(a, b) => Ok(eval(a, fields)? && eval(b, fields)?),
        FilterExpr::Or(a, b) => Ok(eval(a, fields)? || eval(b, fields)?),
        FilterExpr::Field(_) => Err(FilterError::EmptyFilter),
        FilterExpr::Cmp { field, op, value } => {
            let actual = fields
                .get(field)
                .ok_or_else(|| FilterError::UnknownField(field.clone()))?;
            compare(field, actual, *op, value)
        }
    }
}

fn compare(
    field: &str,
    actual: &FieldValue,
    op: FilterOp,
    value: &FilterValue,
) -> Result<bool, FilterError> {
    if op == FilterOp::In {
        let FilterValue::List(items) = value else {
            return Err(FilterError::TypeMismatch(field.to_string()));
        };
        for item in items {
            if compare(field, actual, FilterOp::Eq, item)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    match (actual, value) {
        (FieldValue::Num(a), FilterValue::Num(b)) => Ok(numeric_compare(*a, op, *b)),
        (FieldValue::Num(a), FilterValue::Str(s)) => {
            let b = parse_numeric(s).ok_or_else(|| FilterError::TypeMismatch(field.to_string()))?;
            Ok(numeric_compare(*a, op, b))
        }
        (FieldValue::Str(a), FilterValue::Str(b)) => match op {
            FilterOp::Eq => Ok(a == b),
            FilterOp::Ne => Ok(a != b),
            _ => Err(FilterError::TypeMismatch(field.to_string())),
        },
        _ => Err(FilterError::TypeMismatch(field.to_string())),
    }
}

fn numeric_compare(a: U256, op: FilterOp, b: U256) -> bool {
    match op {
        FilterOp::Eq => a == b,
        FilterOp::Ne => a != b,
        FilterOp::Gt => a > b,
        FilterOp::Lt => a < b,
        FilterOp::Ge => a >= b,
        FilterOp::Le => a <= b,
        FilterOp::In => false,
    }
}

fn parse_numeric(s: &str) -> Option<U256> {
    if let Some(hex) = s.strip_prefix("0x") {
        U256::from_str_radix(hex, 16).ok()
    } else {
        U256::from_dec_str(s).ok()
    }
}
