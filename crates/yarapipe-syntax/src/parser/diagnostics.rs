use crate::model::{CompileDiagnostic, Severity};
use tracing::debug;

/// Receives one diagnostic per stderr line of the compiler.
pub trait CompilationCallback {
    fn on_diagnostic(&mut self, diagnostic: CompileDiagnostic);
}

impl<F: FnMut(CompileDiagnostic)> CompilationCallback for F {
    fn on_diagnostic(&mut self, diagnostic: CompileDiagnostic) {
        self(diagnostic)
    }
}

/// Position of the scanner within `FILENAME(LINE): SEVERITY: MESSAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticState {
    FileName,
    LineNumber,
    Severity,
    Message,
}

/// Character-at-a-time scanner for one compiler diagnostic line.
///
/// The state and the accumulation buffer are plain fields, so a partially
/// fed scanner can be inspected at any point.
#[derive(Debug, Clone)]
pub struct DiagnosticScanner {
    state: DiagnosticState,
    buffer: String,
    file_name: Option<String>,
    line: Option<u32>,
    severity: Option<Severity>,
}

impl Default for DiagnosticScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticScanner {
    pub fn new() -> Self {
        Self {
            state: DiagnosticState::FileName,
            buffer: String::new(),
            file_name: None,
            line: None,
            severity: None,
        }
    }

    pub fn state(&self) -> DiagnosticState {
        self.state
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn feed(&mut self, ch: char) {
        match self.state {
            DiagnosticState::FileName => {
                if ch == '(' {
                    self.file_name = Some(self.take_buffer());
                    self.state = DiagnosticState::LineNumber;
                } else {
                    self.buffer.push(ch);
                }
            }
            DiagnosticState::LineNumber => match ch {
                ')' => {}
                ':' => {
                    let text = self.take_buffer();
                    self.line = text.parse().ok();
                    if self.line.is_none() {
                        debug!("diagnostic line number '{}' is not numeric", text);
                    }
                    self.state = DiagnosticState::Severity;
                }
                _ => self.buffer.push(ch),
            },
            DiagnosticState::Severity => {
                if ch == ':' {
                    let level = self.take_buffer().to_ascii_lowercase();
                    self.severity = Some(if level.starts_with("err") {
                        Severity::Error
                    } else {
                        Severity::Warning
                    });
                    self.state = DiagnosticState::Message;
                } else {
                    self.buffer.push(ch);
                }
            }
            DiagnosticState::Message => self.buffer.push(ch),
        }
    }

    /// Trimmed contents of the buffer; the buffer is left empty.
    fn take_buffer(&mut self) -> String {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        text
    }

    /// Builds the diagnostic.
    ///
    /// A scanner that never reached [`DiagnosticState::Message`] yields a
    /// best-effort record with [`Severity::Unknown`] and the whole original
    /// line as the message.
    pub fn finish(mut self, line: &str) -> CompileDiagnostic {
        match (self.state, self.severity) {
            (DiagnosticState::Message, Some(severity)) => {
                let message = self.take_buffer();
                CompileDiagnostic {
                    file_name: self.file_name,
                    line: self.line,
                    severity,
                    message,
                }
            }
            _ => CompileDiagnostic {
                file_name: self.file_name,
                line: self.line,
                severity: Severity::Unknown,
                message: line.trim().to_string(),
            },
        }
    }
}

/// Decodes one `FILENAME(LINE): SEVERITY: MESSAGE` line.
pub fn parse_diagnostic(line: &str) -> CompileDiagnostic {
    let mut scanner = DiagnosticScanner::new();
    for ch in line.chars() {
        scanner.feed(ch);
    }
    scanner.finish(line)
}

/// Feeds compiler stderr lines to a [`CompilationCallback`].
pub struct DiagnosticParser<C: CompilationCallback> {
    callback: C,
    errors: usize,
    warnings: usize,
}

impl<C: CompilationCallback> DiagnosticParser<C> {
    pub fn new(callback: C) -> Self {
        Self { callback, errors: 0, warnings: 0 }
    }

    /// Delivers one diagnostic for `line`; blank lines produce none.
    pub fn on_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        let diagnostic = parse_diagnostic(line);
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Unknown => {}
        }
        self.callback.on_diagnostic(diagnostic);
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn finish(self) -> C {
        self.callback
    }
}
