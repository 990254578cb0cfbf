//! Index query language: a small Lucene-like syntax.
//!
//! ```text
//! +success_event:"Data_Received" AND -fail_event:"Checksums" AND item_key:("uuid:a" OR "uuid:b")
//! ```
//!
//! Clauses are joined by `AND`. `+field:"v"` requires a value, `-field:"v"`
//! excludes it and `field:(..)` requires any of the listed values.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::TriggerQuery;

pub const SUCCESS_EVENT: &str = "success_event";
pub const FAIL_EVENT: &str = "fail_event";
pub const ITEM_TYPE: &str = "item_type";
pub const ITEM_KEY: &str = "item_key";

const FIELDS: [&str; 4] = [SUCCESS_EVENT, FAIL_EVENT, ITEM_TYPE, ITEM_KEY];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Require { field: String, value: String },
    Exclude { field: String, value: String },
    AnyOf { field: String, values: Vec<String> },
}

/// Conjunction of clauses understood by every [`super::ItemIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexQuery {
    pub clauses: Vec<Clause>,
}

impl IndexQuery {
    /// Conservative translation of a trigger query.
    ///
    /// The index records every event id that ever succeeded or failed, so
    /// each clause admits at least the items the exact check would accept.
    /// Stale-or-absent criteria cannot be expressed and add no clause.
    pub fn from_trigger(query: &TriggerQuery) -> Self {
        let mut clauses = Vec::new();

        if let Some(ref candidates) = query.candidates {
            clauses.push(Clause::AnyOf {
                field: ITEM_KEY.to_string(),
                values: candidates.iter().map(|k| k.0.clone()).collect(),
            });
        }
        if let Some(ref item_type) = query.item_type {
            clauses.push(require(ITEM_TYPE, item_type));
        }
        for id in &query.required_success {
            clauses.push(require(SUCCESS_EVENT, id));
        }
        for id in &query.required_failure {
            clauses.push(require(FAIL_EVENT, id));
        }
        for id in &query.forbidden {
            clauses.push(exclude(SUCCESS_EVENT, id));
            clauses.push(exclude(FAIL_EVENT, id));
        }

        Self { clauses }
    }
}

fn require(field: &str, value: &str) -> Clause {
    Clause::Require {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn exclude(field: &str, value: &str) -> Clause {
    Clause::Exclude {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::Require { field, value } => write!(f, "+{field}:{}", quoted(value)),
            Clause::Exclude { field, value } => write!(f, "-{field}:{}", quoted(value)),
            Clause::AnyOf { field, values } => {
                let values: Vec<String> = values.iter().map(|v| quoted(v)).collect();
                write!(f, "{field}:({})", values.join(" OR "))
            }
        }
    }
}

impl std::fmt::Display for IndexQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clauses: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&clauses.join(" AND "))
    }
}

impl FromStr for IndexQuery {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = Parser {
            chars: s.chars().collect(),
            pos: 0,
        };
        let mut clauses = Vec::new();

        parser.skip_ws();
        if parser.at_end() {
            return Ok(Self { clauses });
        }
        loop {
            clauses.push(parser.clause()?);
            parser.skip_ws();
            if parser.at_end() {
                break;
            }
            parser.keyword("AND")?;
        }
        Ok(Self { clauses })
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::InvalidQuery(format!("{what} at offset {}", self.pos))
    }

    fn expect(&mut self, c: char) -> Result<()> {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn keyword(&mut self, word: &str) -> Result<()> {
        self.skip_ws();
        let end = self.pos + word.len();
        if end <= self.chars.len() && self.chars[self.pos..end].iter().copied().eq(word.chars()) {
            self.pos = end;
            Ok(())
        } else {
            Err(self.error(&format!("expected {word}")))
        }
    }

    fn field(&mut self) -> Result<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let field: String = self.chars[start..self.pos].iter().collect();
        if FIELDS.contains(&field.as_str()) {
            Ok(field)
        } else {
            Err(Error::InvalidQuery(format!("unknown field '{field}'")))
        }
    }

    fn quoted(&mut self) -> Result<String> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    value.push(escaped);
                    self.pos += 1;
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn clause(&mut self) -> Result<Clause> {
        self.skip_ws();
        match self.peek() {
            Some('+') => {
                self.pos += 1;
                let field = self.field()?;
                self.expect(':')?;
                let value = self.quoted()?;
                Ok(Clause::Require { field, value })
            }
            Some('-') => {
                self.pos += 1;
                let field = self.field()?;
                self.expect(':')?;
                let value = self.quoted()?;
                Ok(Clause::Exclude { field, value })
            }
            Some(_) => {
                let field = self.field()?;
                self.expect(':')?;
                self.expect('(')?;
                let mut values = Vec::new();
                self.skip_ws();
                if self.peek() != Some(')') {
                    loop {
                        values.push(self.quoted()?);
                        self.skip_ws();
                        if self.peek() == Some(')') {
                            break;
                        }
                        self.keyword("OR")?;
                    }
                }
                self.expect(')')?;
                Ok(Clause::AnyOf { field, values })
            }
            None => Err(self.error("expected clause")),
        }
    }
}
