use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;
use yarapipe_syntax::{CompileDiagnostic, Rule, Severity};

/// What one scanned target produced, as printed by `scan --json`.
#[derive(Debug, Serialize)]
pub struct TargetReport<'a> {
    pub target: &'a Path,
    pub rules: Vec<Rule>,
    pub skipped_entries: usize,
    pub warnings: Vec<String>,
}

pub fn render_rule(rule: &Rule, target: Option<&Path>) -> String {
    let mut out = String::new();

    let _ = write!(out, "{}", rule.identifier.green().bold());
    if !rule.tags.is_empty() {
        let _ = write!(out, " [{}]", rule.tags.join(",").cyan());
    }
    if let Some(target) = target {
        let _ = write!(out, " {}", target.display().to_string().dimmed());
    }
    out.push('\n');

    for meta in &rule.metadata {
        let _ = writeln!(out, "  {} = {}", meta.identifier, meta.value);
    }

    for string in &rule.strings {
        let _ = writeln!(out, "  {}", string.identifier.yellow());
        for m in &string.matches {
            let _ = writeln!(out, "    {}: {}", format!("0x{:x}", m.offset).dimmed(), m.value);
        }
    }

    out
}

pub fn render_diagnostic(diagnostic: &CompileDiagnostic) -> String {
    let severity = match diagnostic.severity {
        Severity::Error => "error:".red().bold(),
        Severity::Warning => "warning:".yellow().bold(),
        Severity::Unknown => "note:".dimmed(),
    };

    let location = match (&diagnostic.file_name, diagnostic.line) {
        (Some(file), Some(line)) => format!("{}:{}: ", file, line),
        (Some(file), None) => format!("{}: ", file),
        _ => String::new(),
    };

    format!("{}{} {}", location, severity, diagnostic.message)
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize results")
}
