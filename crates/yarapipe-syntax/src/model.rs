//! Plain result types produced by the output parsers.
//!
//! None of these hold on to the process or the parser that produced them;
//! they can be moved across threads, cloned, compared and serialized.

use serde::Serialize;
use std::fmt;

/// A rule that matched (or, with negation, did not match) a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub identifier: String,
    pub tags: Vec<String>,
    pub metadata: Vec<Meta>,
    pub strings: Vec<StringMatch>,
}

impl Rule {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            tags: Vec::new(),
            metadata: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn meta(&self, identifier: &str) -> Option<&Meta> {
        self.metadata.iter().find(|m| m.identifier == identifier)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Appends a match, opening a new [`StringMatch`] unless the last one
    /// has the same identifier.
    pub fn push_match(&mut self, identifier: &str, m: Match) {
        match self.strings.last_mut() {
            Some(last) if last.identifier == identifier => last.matches.push(m),
            _ => {
                let mut string = StringMatch::new(identifier);
                string.matches.push(m);
                self.strings.push(string);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetaKind {
    String,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::String(s) => write!(f, "\"{}\"", s),
            MetaValue::Integer(n) => write!(f, "{}", n),
            MetaValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub identifier: String,
    pub value: MetaValue,
}

impl Meta {
    pub fn new(identifier: impl Into<String>, value: MetaValue) -> Self {
        Self { identifier: identifier.into(), value }
    }

    pub fn kind(&self) -> MetaKind {
        match self.value {
            MetaValue::String(_) => MetaKind::String,
            MetaValue::Integer(_) => MetaKind::Integer,
            MetaValue::Boolean(_) => MetaKind::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value; booleans read as `0` / `1`.
    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            MetaValue::Integer(n) => Some(n),
            MetaValue::Boolean(b) => Some(i64::from(b)),
            MetaValue::String(_) => None,
        }
    }
}

/// One contiguous group of matches for a string identifier such as `$a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringMatch {
    pub identifier: String,
    pub matches: Vec<Match>,
}

impl StringMatch {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self { identifier: identifier.into(), matches: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub offset: u64,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
    /// The line did not follow the `FILE(LINE): LEVEL: MESSAGE` shape.
    Unknown,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Unknown => write!(f, "unknown"),
        }
    }
}

/// One line of compiler output on stderr.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileDiagnostic {
    pub file_name: Option<String>,
    pub line: Option<u32>,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file_name, self.line) {
            (Some(file), Some(line)) => write!(f, "{}({}): ", file, line)?,
            (Some(file), None) => write!(f, "{}: ", file)?,
            _ => {}
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}
