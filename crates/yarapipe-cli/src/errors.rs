use colored::*;
use std::fmt;
use yarapipe_exec::{OutputError, TimedOut};
use yarapipe_syntax::{ParseError, Span};

/// Error report with location, source excerpt and hints.
pub struct EnhancedError {
    pub message: String,
    pub span: Option<Span>,
    pub file: Option<String>,
    pub source: Option<String>,
    /// Line number of the first line in `source`.
    pub first_line: usize,
    pub suggestion: Option<String>,
    pub help: Option<String>,
}

impl EnhancedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            file: None,
            source: None,
            first_line: 1,
            suggestion: None,
            help: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self.first_line = 1;
        self
    }

    /// A single line of output that sits at `line_number` in its stream.
    pub fn with_source_line(mut self, line_number: usize, line: impl Into<String>) -> Self {
        self.source = Some(line.into());
        self.first_line = line_number.max(1);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.message.bold());

        if let (Some(file), Some(span)) = (&self.file, &self.span) {
            eprintln!("  {} {}:{}:{}", "-->".blue().bold(), file, span.line, span.col);
        } else if let Some(file) = &self.file {
            eprintln!("  {} {}", "-->".blue().bold(), file);
        }

        if let (Some(source), Some(span)) = (&self.source, &self.span) {
            eprintln!();
            self.display_source_with_span(source, span);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!();
            eprintln!("{} {}", "suggestion:".green().bold(), suggestion);
        }

        if let Some(help) = &self.help {
            eprintln!();
            eprintln!("{} {}", "help:".cyan().bold(), help);
        }
    }

    fn display_source_with_span(&self, source: &str, span: &Span) {
        let lines: Vec<&str> = source.lines().collect();

        let Some(line_idx) = span.line.checked_sub(self.first_line) else {
            return;
        };
        let Some(line) = lines.get(line_idx) else {
            return;
        };

        // one line of context on each side
        let start = line_idx.saturating_sub(1);
        let end = (line_idx + 2).min(lines.len());
        let width = (self.first_line + end).to_string().len();

        for (i, text) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = self.first_line + i;
            if i != line_idx {
                eprintln!(
                    "{:>width$} {} {}",
                    line_num.to_string().dimmed(),
                    "|".blue().bold(),
                    text,
                    width = width
                );
                continue;
            }

            eprintln!(
                "{:>width$} {} {}",
                line_num.to_string().blue().bold(),
                "|".blue().bold(),
                line,
                width = width
            );
            let spaces = " ".repeat(span.col.saturating_sub(1));
            let carets = "^".repeat(caret_width(line, span));
            eprintln!(
                "{:>width$} {} {}{}",
                "",
                "|".blue().bold(),
                spaces,
                carets.red().bold(),
                width = width
            );
        }
    }
}

/// Characters covered by the span, at least one.
fn caret_width(line: &str, span: &Span) -> usize {
    line.get(span.start..span.end.min(line.len()))
        .map(|s| s.chars().count())
        .unwrap_or(0)
        .max(1)
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnhancedError: {}", self.message)
    }
}

impl std::error::Error for EnhancedError {}

/// Report for a violation found while parsing `source` read from `file`.
pub fn parse_error_report(error: &ParseError, file: &str, source: &str) -> EnhancedError {
    let mut enhanced = EnhancedError::new(format!("Invalid scanner output: {}", error))
        .with_file(file)
        .with_source(source)
        .with_help(parse_error_help(error));

    if let Some(span) = error.span() {
        enhanced = enhanced.with_span(span);
    }
    enhanced
}

fn parse_error_help(error: &ParseError) -> &'static str {
    match error {
        ParseError::OrphanMatch { .. } => {
            "String match lines must follow a rule header line"
        }
        ParseError::InvalidBoolean { .. } => "Bare metadata values must be true or false",
        ParseError::NumericDecode { .. } => "Offsets and integers must fit in 64 bits",
        _ => "Expected `RULE [tags] [meta] TARGET` or `0xOFFSET:$id: data` (yara -g -m -s)",
    }
}

/// Converts an error from the exec layer into a report with hints.
pub fn enhance_error(err: anyhow::Error, file: Option<String>) -> EnhancedError {
    if let Some(output) = err.downcast_ref::<OutputError>() {
        let mut enhanced = EnhancedError::new(format!("Invalid scanner output: {}", output.error))
            .with_source_line(output.line_number, output.line.clone())
            .with_help(parse_error_help(&output.error));
        if let Some(file) = file {
            enhanced = enhanced.with_file(file);
        }
        if let Some(span) = output.error.span() {
            enhanced = enhanced.with_span(span);
        }
        return enhanced;
    }

    let message = format!("{:#}", err);
    let mut enhanced = EnhancedError::new(message.clone());

    if let Some(file) = file {
        enhanced = enhanced.with_file(file);
    }

    if err.downcast_ref::<TimedOut>().is_some() {
        enhanced = enhanced
            .with_suggestion("Raise the limit with --timeout")
            .with_help("The default can be set with `timeout = <seconds>` in .yarapiperc");
    } else if message.contains("Failed to start") {
        enhanced = enhanced
            .with_suggestion("Verify yara is installed and in your PATH")
            .with_help("Point YARA_BINARY_PATH / YARAC_BINARY_PATH or yara_path in .yarapiperc at the executables");
    } else if message.contains("No rules") {
        enhanced = enhanced.with_suggestion("Pass rule files with --rules or --compiled");
    } else if message.contains("Compilation failed") {
        enhanced = enhanced.with_help("The diagnostics above point at the offending rules");
    }

    enhanced
}
