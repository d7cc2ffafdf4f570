//! Requirement filter expressions
//!
//! LDAP-style filters evaluated against a capability's attributes:
//!
//! ```text
//! (name=foo)                  equality
//! (name~=Foo)                 approximate (case and whitespace insensitive)
//! (version>=1.2)              ordering, typed by the attribute value
//! (name=*)                    presence
//! (name=org.*.service)        substring
//! (&(a=1)(|(b=2)(!(c=3))))    composition
//! ```
//!
//! `\` escapes the next character inside a value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::module::model::attribute::AttributeValue;
use crate::module::traits::ModuleError;

/// Comparison operator of a simple filter item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Compare {
        attribute: String,
        op: CompareOp,
        value: String,
    },
    Present(String),
    Substring {
        attribute: String,
        parts: Vec<String>,
    },
}

impl Filter {
    /// Parse a filter expression
    pub fn parse(input: &str) -> Result<Self, ModuleError> {
        let mut parser = Parser::new(input);
        parser.skip_whitespace();
        let filter = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }

    /// Evaluate against an attribute map
    ///
    /// Missing attributes evaluate to false (so `(!(a=1))` matches when `a`
    /// is absent).
    pub fn matches(&self, attributes: &BTreeMap<String, AttributeValue>) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(attributes)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(attributes)),
            Filter::Not(filter) => !filter.matches(attributes),
            Filter::Compare {
                attribute,
                op,
                value,
            } => attributes
                .get(attribute)
                .map(|attr| attr.compare(*op, value))
                .unwrap_or(false),
            Filter::Present(attribute) => attributes.contains_key(attribute),
            Filter::Substring { attribute, parts } => attributes
                .get(attribute)
                .map(|attr| attr.matches_substring(parts))
                .unwrap_or(false),
        }
    }

    /// Attribute names referenced anywhere in the expression
    pub fn attribute_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Filter::And(filters) | Filter::Or(filters) => {
                for filter in filters {
                    filter.collect_names(names);
                }
            }
            Filter::Not(filter) => filter.collect_names(names),
            Filter::Compare { attribute, .. }
            | Filter::Present(attribute)
            | Filter::Substring { attribute, .. } => {
                names.insert(attribute.as_str());
            }
        }
    }
}

impl FromStr for Filter {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Compare {
                attribute,
                op,
                value,
            } => {
                let op = match op {
                    CompareOp::Equal => "=",
                    CompareOp::Approx => "~=",
                    CompareOp::GreaterEq => ">=",
                    CompareOp::LessEq => "<=",
                };
                write!(f, "({}{}{})", attribute, op, escape(value))
            }
            Filter::Present(attribute) => write!(f, "({}=*)", attribute),
            Filter::Substring { attribute, parts } => {
                let escaped: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({}={})", attribute, escaped.join("*"))
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> ModuleError {
        ModuleError::InvalidFilter(format!("{} at {} in \"{}\"", message, self.pos, self.input))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), ModuleError> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, ModuleError> {
        self.expect('(')?;
        self.skip_whitespace();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_whitespace();
                let inner = self.parse_filter()?;
                self.skip_whitespace();
                Filter::Not(Box::new(inner))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, ModuleError> {
        let mut filters = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some('(') {
            filters.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(filters)
    }

    fn parse_item(&mut self) -> Result<Filter, ModuleError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attribute: String = self.chars[start..self.pos].iter().collect();
        let attribute = attribute.trim().to_string();
        if attribute.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                CompareOp::Equal
            }
            Some('~') => {
                self.pos += 1;
                self.expect('=')?;
                CompareOp::Approx
            }
            Some('>') => {
                self.pos += 1;
                self.expect('=')?;
                CompareOp::GreaterEq
            }
            Some('<') => {
                self.pos += 1;
                self.expect('=')?;
                CompareOp::LessEq
            }
            _ => return Err(self.error("expected comparison operator")),
        };

        let parts = self.parse_value()?;
        if parts.len() == 1 {
            let value = parts.into_iter().next().unwrap_or_default();
            return Ok(Filter::Compare {
                attribute,
                op,
                value,
            });
        }
        if op != CompareOp::Equal {
            return Err(self.error("wildcards are only allowed with '='"));
        }
        if parts.len() == 2 && parts.iter().all(|p| p.is_empty()) {
            return Ok(Filter::Present(attribute));
        }
        Ok(Filter::Substring { attribute, parts })
    }

    /// Value pieces split at unescaped `*`
    fn parse_value(&mut self) -> Result<Vec<String>, ModuleError> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    if let Some(last) = parts.last_mut() {
                        last.push(escaped);
                    }
                    self.pos += 1;
                }
                Some('*') => {
                    parts.push(String::new());
                    self.pos += 1;
                }
                Some(c) => {
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
            }
        }
        Ok(parts)
    }
}
