use std::fmt;

/// Location of a token inside the output stream.
///
/// `line` is the 1-based line of the stream the parser was fed, `col` the
/// 1-based character column, `start`/`end` byte offsets within that line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(line: usize, col: usize, start: usize, end: usize) -> Self {
        Self { line, col, start, end }
    }

    pub fn single(line: usize, col: usize, offset: usize) -> Self {
        Self { line, col, start: offset, end: offset + 1 }
    }

    pub fn merge(&self, other: &Span) -> Self {
        Self {
            line: self.line.min(other.line),
            col: if self.line == other.line { self.col.min(other.col) } else { self.col },
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    UnterminatedString { span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnterminatedString { span } => *span,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedString { .. } => {
                write!(f, "unterminated string literal")
            }
        }
    }
}

impl std::error::Error for LexError {}

/// A protocol violation in the output of an external tool.
///
/// Every variant is fatal for the invocation that produced it: once a
/// parser returns one of these it refuses further input
/// (see [`ParseError::Aborted`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnexpectedToken { expected: String, found: String, span: Span },
    UnexpectedEnd { expected: String, span: Span },
    /// A string-match line arrived before any rule header.
    OrphanMatch { line: usize },
    NumericDecode { text: String, span: Span },
    InvalidBoolean { text: String, span: Span },
    Lex(LexError),
    /// The parser already failed earlier in this invocation.
    Aborted,
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::UnexpectedToken { span, .. } => Some(*span),
            ParseError::UnexpectedEnd { span, .. } => Some(*span),
            ParseError::OrphanMatch { .. } => None,
            ParseError::NumericDecode { span, .. } => Some(*span),
            ParseError::InvalidBoolean { span, .. } => Some(*span),
            ParseError::Lex(e) => Some(e.span()),
            ParseError::Aborted => None,
        }
    }

    /// 1-based line of the stream the violation was found on.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::OrphanMatch { line } => Some(*line),
            _ => self.span().map(|span| span.line),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { expected, found, span } => {
                write!(
                    f,
                    "expected {}, found {} at line {}, column {}",
                    expected, found, span.line, span.col
                )
            }
            ParseError::UnexpectedEnd { expected, span } => {
                write!(f, "unexpected end of line {}, expected {}", span.line, expected)
            }
            ParseError::OrphanMatch { line } => {
                write!(f, "string match on line {} does not belong to any rule", line)
            }
            ParseError::NumericDecode { text, span } => {
                write!(f, "cannot decode number '{}' at line {}, column {}", text, span.line, span.col)
            }
            ParseError::InvalidBoolean { text, span } => {
                write!(
                    f,
                    "expected 'true' or 'false', found '{}' at line {}, column {}",
                    text, span.line, span.col
                )
            }
            ParseError::Lex(e) => {
                let span = e.span();
                write!(f, "{} at line {}, column {}", e, span.line, span.col)
            }
            ParseError::Aborted => {
                write!(f, "parsing was aborted by an earlier protocol violation")
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Lex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::Lex(err)
    }
}

/// Which list of a rule header a skipped entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryList {
    Tags,
    Metadata,
}

impl fmt::Display for EntryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryList::Tags => write!(f, "tag"),
            EntryList::Metadata => write!(f, "metadata"),
        }
    }
}

/// A tag or metadata entry that could not be read and was dropped.
///
/// Not an error: the remaining entries of the list are still parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub list: EntryList,
    pub found: String,
    pub span: Span,
}

impl fmt::Display for SkippedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "skipped malformed {} entry starting with {} at line {}, column {}",
            self.list, self.found, self.span.line, self.span.col
        )
    }
}
