//! Textual filter grammar
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | "(" expr ")" | cmp
//! cmp     := field op value
//!          | field ("regex" | "matches") string
//!          | field "contains" value
//!          | field "in" "[" value ("," value)* "]"
//!          | field "between" number "and" number
//! op      := "==" | "=" | "!=" | ">" | ">=" | "<" | "<="
//!          | "is" ["not"] | "equals" | "equal to" | "greater than" ["or equal to"]
//!          | "less than" ["or equal to"] | "at least" | "at most" | "above" | "below"
//! value   := string | number | "true" | "false" | word
//! ```
//!
//! [`FilterParser::parse`] requires the whole input to be an expression.
//! [`FilterParser::extract`] scans free text for the first clause that
//! references a known field, ignoring the surrounding words.

use regex::escape;
use serde_json::Value;

use crate::errors::{RagError, Result};
use crate::filter::predicate::{CompareOp, FilterPredicate};
use crate::filter::schema::{MetadataSchema, TEXT_FIELD};

const RESERVED: &[&str] = &["and", "or", "not", "in", "regex", "matches", "contains", "between", "true", "false"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Number(Value),
    Op(CompareOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Other(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("'{}'", w),
            Token::Str(s) => format!("string {:?}", s),
            Token::Number(n) => format!("number {}", n),
            Token::Op(op) => format!("'{}'", op),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Other(c) => format!("'{}'", c),
        }
    }

    fn is_word(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

fn syntax_error(message: impl Into<String>) -> RagError {
    RagError::InvalidFilter(message.into())
}

/// Split input into tokens. In lenient mode unknown characters and
/// unterminated strings become [`Token::Other`] instead of errors.
fn tokenize(input: &str, lenient: bool) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            ',' => tokens.push(Token::Comma),
            '=' => {
                if next == Some('=') {
                    i += 1;
                }
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '!' if next == Some('=') => {
                i += 1;
                tokens.push(Token::Op(CompareOp::Ne));
            }
            '>' | '<' => {
                let or_equal = next == Some('=');
                if or_equal {
                    i += 1;
                }
                tokens.push(Token::Op(match (c, or_equal) {
                    ('>', false) => CompareOp::Gt,
                    ('>', true) => CompareOp::Gte,
                    ('<', false) => CompareOp::Lt,
                    _ => CompareOp::Lte,
                }));
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' if j + 1 < chars.len() => {
                            value.push(chars[j + 1]);
                            j += 2;
                        }
                        ch if ch == quote => {
                            closed = true;
                            break;
                        }
                        ch => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                if closed {
                    tokens.push(Token::Str(value));
                    i = j;
                } else if lenient {
                    tokens.push(Token::Other(quote));
                } else {
                    return Err(syntax_error("unterminated string literal"));
                }
            }
            c if c.is_ascii_digit() || (c == '-' && next.map_or(false, |n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut fractional = false;
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    fractional = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                match number_value(&literal, fractional) {
                    Ok(value) => tokens.push(Token::Number(value)),
                    Err(_) if lenient => tokens.push(Token::Other(chars[start])),
                    Err(e) => return Err(e),
                }
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                while i > start + 1 && chars[i - 1] == '.' {
                    i -= 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
                continue;
            }
            other if lenient => tokens.push(Token::Other(other)),
            other => return Err(syntax_error(format!("unexpected character '{}'", other))),
        }
        i += 1;
    }

    Ok(tokens)
}

fn number_value(literal: &str, fractional: bool) -> Result<Value> {
    if !fractional {
        if let Ok(n) = literal.parse::<i64>() {
            return Ok(Value::from(n));
        }
    }
    literal
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| syntax_error(format!("invalid number '{}'", literal)))
}

fn is_field_path(word: &str) -> bool {
    !RESERVED.contains(&word.to_lowercase().as_str())
        && word.split('.').all(|s| !s.is_empty())
        && word.chars().next().map_or(false, |c| c.is_alphabetic() || c == '_')
}

/// Which fields may start a comparison and whether phrase operators apply
enum FieldPolicy<'a> {
    /// Explicit expression: any field, all operators
    Any,
    /// Free-text scan: fields must be known to the schema
    Schema(&'a MetadataSchema),
}

impl FieldPolicy<'_> {
    /// `None` rejects the field; `Some(phrases)` accepts it
    fn admit(&self, field: &str) -> Option<bool> {
        match self {
            FieldPolicy::Any => Some(true),
            FieldPolicy::Schema(schema) if schema.is_empty() => Some(false),
            FieldPolicy::Schema(_) if field == TEXT_FIELD => Some(false),
            FieldPolicy::Schema(schema) => schema.field(field).map(|_| true),
        }
    }

    /// Whether an unquoted word may stand as the compared value. Without a
    /// schema a plain single-segment field needs a literal, so prose like
    /// "e = mc2" is not read as a filter.
    fn bare_values(&self, field: &str) -> bool {
        match self {
            FieldPolicy::Schema(schema) if schema.is_empty() => field.contains('.'),
            _ => true,
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    policy: FieldPolicy<'a>,
    lenient: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_is_word(&self, offset: usize, keyword: &str) -> bool {
        self.tokens.get(self.pos + offset).map_or(false, |t| t.is_word(keyword))
    }

    fn eat_word(&mut self, keyword: &str) -> bool {
        if self.peek_is_word(0, keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_words(&mut self, keywords: &[&str]) -> bool {
        if keywords.iter().enumerate().all(|(i, k)| self.peek_is_word(i, k)) {
            self.pos += keywords.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.peek() {
            Some(t) if *t == token => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(syntax_error(format!("expected {}, found {}", token.describe(), t.describe()))),
            None => Err(syntax_error(format!("expected {}, found end of input", token.describe()))),
        }
    }

    fn parse_or(&mut self) -> Result<FilterPredicate> {
        let mut items = vec![self.parse_and()?];
        loop {
            let save = self.pos;
            if !self.eat_word("or") {
                break;
            }
            match self.parse_and() {
                Ok(p) => items.push(p),
                Err(_) if self.lenient => {
                    self.pos = save;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(if items.len() == 1 { items.remove(0) } else { FilterPredicate::or(items) })
    }

    fn parse_and(&mut self) -> Result<FilterPredicate> {
        let mut items = vec![self.parse_unary()?];
        loop {
            let save = self.pos;
            if !self.eat_word("and") {
                break;
            }
            match self.parse_unary() {
                Ok(p) => items.push(p),
                Err(_) if self.lenient => {
                    self.pos = save;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(if items.len() == 1 { items.remove(0) } else { FilterPredicate::and(items) })
    }

    fn parse_unary(&mut self) -> Result<FilterPredicate> {
        if self.eat_word("not") {
            return Ok(FilterPredicate::negate(self.parse_unary()?));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FilterPredicate> {
        let field = match self.peek() {
            Some(Token::Word(w)) if is_field_path(w) => w.clone(),
            Some(t) => return Err(syntax_error(format!("expected field name, found {}", t.describe()))),
            None => return Err(syntax_error("expected field name, found end of input")),
        };
        let phrases = self
            .policy
            .admit(&field)
            .ok_or_else(|| syntax_error(format!("unknown field '{}'", field)))?;
        let bare = self.policy.bare_values(&field);
        self.pos += 1;

        match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                let value = self.parse_value(bare)?;
                return Ok(FilterPredicate::compare(field, op, value));
            }
            Some(t) if t.is_word("regex") || t.is_word("matches") => {
                self.pos += 1;
                return match self.peek() {
                    Some(Token::Str(pattern)) => {
                        let pattern = pattern.clone();
                        self.pos += 1;
                        Ok(FilterPredicate::regex(field, pattern))
                    }
                    _ => Err(syntax_error(format!("expected quoted pattern after '{} regex'", field))),
                };
            }
            Some(t) if t.is_word("contains") => {
                self.pos += 1;
                return Ok(match self.parse_value(bare)? {
                    Value::String(s) => FilterPredicate::regex(field, escape(&s)),
                    other => FilterPredicate::eq(field, other),
                });
            }
            Some(t) if t.is_word("in") => {
                self.pos += 1;
                return self.parse_list(field, bare);
            }
            Some(t) if t.is_word("between") => {
                self.pos += 1;
                let min = self.parse_number()?;
                if !self.eat_word("and") {
                    return Err(syntax_error(format!("expected 'and' in '{} between'", field)));
                }
                let max = self.parse_number()?;
                return Ok(FilterPredicate::range(field, Some(min), Some(max)));
            }
            _ => {}
        }

        if phrases {
            if let Some(op) = self.parse_phrase_op() {
                let value = self.parse_value(bare)?;
                return Ok(FilterPredicate::compare(field, op, value));
            }
        }

        Err(match self.peek() {
            Some(t) => syntax_error(format!("expected operator after '{}', found {}", field, t.describe())),
            None => syntax_error(format!("expected operator after '{}'", field)),
        })
    }

    fn parse_phrase_op(&mut self) -> Option<CompareOp> {
        let save = self.pos;
        let is = self.eat_word("is");
        let negated = is && self.eat_word("not");

        let op = if self.eat_words(&["greater", "than", "or", "equal", "to"]) {
            Some(CompareOp::Gte)
        } else if self.eat_words(&["greater", "than"]) || self.eat_word("above") {
            Some(CompareOp::Gt)
        } else if self.eat_words(&["less", "than", "or", "equal", "to"]) {
            Some(CompareOp::Lte)
        } else if self.eat_words(&["less", "than"]) || self.eat_word("below") {
            Some(CompareOp::Lt)
        } else if self.eat_words(&["at", "least"]) {
            Some(CompareOp::Gte)
        } else if self.eat_words(&["at", "most"]) {
            Some(CompareOp::Lte)
        } else if self.eat_words(&["equal", "to"]) || self.eat_word("equals") {
            Some(CompareOp::Eq)
        } else if is {
            Some(CompareOp::Eq)
        } else {
            None
        };

        match (op, negated) {
            (Some(CompareOp::Eq), true) => Some(CompareOp::Ne),
            (Some(_), true) | (None, _) => {
                self.pos = save;
                None
            }
            (Some(op), false) => Some(op),
        }
    }

    fn parse_list(&mut self, field: String, bare: bool) -> Result<FilterPredicate> {
        self.expect(Token::LBracket)?;
        let mut values = Vec::new();
        if self.peek() != Some(&Token::RBracket) {
            loop {
                values.push(self.parse_value(bare)?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RBracket)?;
        Ok(FilterPredicate::one_of(field, values))
    }

    fn parse_number(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Number(n)) => {
                let n = n.as_f64().ok_or_else(|| syntax_error("number out of range"))?;
                self.pos += 1;
                Ok(n)
            }
            Some(t) => Err(syntax_error(format!("expected number, found {}", t.describe()))),
            None => Err(syntax_error("expected number, found end of input")),
        }
    }

    fn parse_value(&mut self, bare: bool) -> Result<Value> {
        let value = match self.peek() {
            Some(Token::Str(s)) => Value::from(s.clone()),
            Some(Token::Number(n)) => n.clone(),
            Some(t) if t.is_word("true") => Value::Bool(true),
            Some(t) if t.is_word("false") => Value::Bool(false),
            Some(Token::Word(w)) if bare && !RESERVED.contains(&w.to_lowercase().as_str()) => {
                Value::from(w.clone())
            }
            Some(t) => return Err(syntax_error(format!("expected value, found {}", t.describe()))),
            None => return Err(syntax_error("expected value, found end of input")),
        };
        self.pos += 1;
        Ok(value)
    }
}

/// Parser for the textual filter grammar
#[derive(Debug, Clone, Default)]
pub struct FilterParser {
    schema: MetadataSchema,
}

impl FilterParser {
    pub fn new(schema: MetadataSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &MetadataSchema {
        &self.schema
    }

    /// Parse a complete filter expression (syntax only, no schema check)
    pub fn parse(input: &str) -> Result<FilterPredicate> {
        let tokens = tokenize(input, false)?;
        if tokens.is_empty() {
            return Err(syntax_error("empty filter expression"));
        }

        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            policy: FieldPolicy::Any,
            lenient: false,
        };
        let predicate = parser.parse_or()?;
        match parser.peek() {
            None => Ok(predicate),
            Some(t) => Err(syntax_error(format!("unexpected trailing {}", t.describe()))),
        }
    }

    /// Find the first valid predicate clause inside a free-text query.
    ///
    /// With an empty schema only symbolic operators, `regex`, `contains`,
    /// `in` and `between` are recognized, so ordinary sentences such as
    /// "what is rust" never turn into filters.
    pub fn extract(&self, query: &str) -> Option<FilterPredicate> {
        let tokens = tokenize(query, true).ok()?;

        for start in 0..tokens.len() {
            let starts_clause = match &tokens[start] {
                Token::Word(w) => w.eq_ignore_ascii_case("not") || is_field_path(w),
                Token::LParen => true,
                _ => false,
            };
            if !starts_clause {
                continue;
            }

            let mut parser = Parser {
                tokens: &tokens,
                pos: start,
                policy: FieldPolicy::Schema(&self.schema),
                lenient: true,
            };
            if let Ok(predicate) = parser.parse_or() {
                if predicate.validate(&self.schema).is_ok() {
                    return Some(predicate);
                }
            }
        }
        None
    }
}

/// Interpret a completion model's answer to a filter-construction prompt.
///
/// Accepts a JSON predicate (optionally inside a code fence), a textual
/// expression, or `none`/`null` for no filter.
pub fn parse_llm_reply(reply: &str) -> Result<Option<FilterPredicate>> {
    let trimmed = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let lowered = trimmed.trim_end_matches('.').to_lowercase();
    if trimmed.is_empty() || matches!(lowered.as_str(), "none" | "null" | "no filter") {
        return Ok(None);
    }

    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            let predicate: FilterPredicate = serde_json::from_str(&trimmed[open..=close])
                .map_err(|e| syntax_error(format!("unreadable predicate JSON: {}", e)))?;
            return Ok(Some(predicate));
        }
    }

    FilterParser::parse(trimmed).map(Some)
}
