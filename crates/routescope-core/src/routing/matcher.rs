//! Label matchers

use std::fmt;

use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::models::{label_value, LabelSet};

/// Matcher operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `=~`
    RegexMatch,
    /// `!~`
    NotRegexMatch,
}

impl MatchOperator {
    /// Operator as written in matcher expressions
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::RegexMatch => "=~",
            Self::NotRegexMatch => "!~",
        }
    }

    /// `=~` or `!~`
    pub fn is_regex(self) -> bool {
        matches!(self, Self::RegexMatch | Self::NotRegexMatch)
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Why a matcher could not be built
#[derive(Error, Debug)]
pub enum MatcherError {
    /// The expression is not `<label><op><value>`
    #[error("{0}")]
    Syntax(String),

    /// The regex value does not compile
    #[error("{source}")]
    Pattern {
        /// Label the matcher tests
        label: String,
        /// Pattern as written
        pattern: String,
        /// Regex compiler error
        #[source]
        source: regex::Error,
    },
}

/// A single label constraint
#[derive(Debug, Clone)]
pub struct Matcher {
    name: String,
    operator: MatchOperator,
    value: String,
    /// Anchored pattern, present for the regex operators
    regex: Option<Regex>,
}

impl Matcher {
    /// Build a matcher, compiling the pattern for regex operators
    pub fn new(
        name: impl Into<String>,
        operator: MatchOperator,
        value: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let value = value.into();
        let regex = if operator.is_regex() {
            Some(Regex::new(&format!("^(?:{value})$"))?)
        } else {
            None
        };

        Ok(Self {
            name: name.into(),
            operator,
            value,
            regex,
        })
    }

    /// Parse a matcher expression such as `severity="critical"` or `job=~web.*`
    pub fn parse(expr: &str) -> Result<Self, MatcherError> {
        let (name, operator, value) = split_expression(expr)?;
        Self::new(name.clone(), operator, value.clone()).map_err(|source| {
            MatcherError::Pattern {
                label: name,
                pattern: value,
                source,
            }
        })
    }

    /// Label name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Comparison operator
    pub fn operator(&self) -> MatchOperator {
        self.operator
    }

    /// Value or pattern as written, without anchors
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Test the matcher against a label set; absent labels read as `""`
    pub fn matches(&self, labels: &LabelSet) -> bool {
        let actual = label_value(labels, &self.name);
        match (self.operator, &self.regex) {
            (MatchOperator::Equal, _) => actual == self.value,
            (MatchOperator::NotEqual, _) => actual != self.value,
            (MatchOperator::RegexMatch, Some(re)) => re.is_match(actual),
            (MatchOperator::NotRegexMatch, Some(re)) => !re.is_match(actual),
            // Constructors always compile a pattern for regex operators
            (MatchOperator::RegexMatch | MatchOperator::NotRegexMatch, None) => false,
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.operator == other.operator && self.value == other.value
    }
}

impl Eq for Matcher {}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.operator, self.value)
    }
}

impl Serialize for Matcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn split_expression(expr: &str) -> Result<(String, MatchOperator, String), MatcherError> {
    let expr = expr.trim();
    let name_len = expr
        .char_indices()
        .take_while(|&(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
        .count();
    if name_len == 0 {
        return Err(MatcherError::Syntax("expected a label name".to_string()));
    }
    let (name, rest) = expr.split_at(name_len);
    let rest = rest.trim_start();

    let (operator, rest) = [
        ("=~", MatchOperator::RegexMatch),
        ("!~", MatchOperator::NotRegexMatch),
        ("!=", MatchOperator::NotEqual),
        ("=", MatchOperator::Equal),
    ]
    .into_iter()
    .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|r| (op, r)))
    .ok_or_else(|| {
        MatcherError::Syntax(format!("expected one of =, !=, =~, !~ after '{name}'"))
    })?;

    let value = unquote(rest.trim())?;
    Ok((name.to_string(), operator, value))
}

fn unquote(raw: &str) -> Result<String, MatcherError> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Ok(raw.to_string());
    };

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let trailing = chars.as_str();
                if !trailing.trim().is_empty() {
                    return Err(MatcherError::Syntax(format!(
                        "unexpected {trailing:?} after closing quote"
                    )));
                }
                return Ok(value);
            }
            '\\' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(escaped @ ('"' | '\\')) => value.push(escaped),
                // Unknown escapes are kept for the regex engine, e.g. `\d`
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            _ => value.push(c),
        }
    }

    Err(MatcherError::Syntax("unterminated quoted value".to_string()))
}
