use std::fmt;
use std::time::Duration;
use yarapipe_syntax::ParseError;

/// Scanner output that broke the line protocol.
///
/// Carries the offending line so callers can point at the failing column.
#[derive(Debug, Clone)]
pub struct OutputError {
    pub line_number: usize,
    pub line: String,
    pub error: ParseError,
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid scanner output on line {}: {}", self.line_number, self.error)
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The external process did not finish within its time limit and was killed.
#[derive(Debug, Clone)]
pub struct TimedOut {
    pub program: String,
    pub timeout: Duration,
}

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} did not finish within {:?}", self.program, self.timeout)
    }
}

impl std::error::Error for TimedOut {}
