use crate::error::OutputError;
use crate::process::Executable;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use yarapipe_syntax::{Rule, ScanCallback, ScanOutputParser};

/// File extension of rules produced by the compiler.
pub const COMPILED_RULES_EXTENSION: &str = "yaracc";

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// What a finished scan left behind besides the rules it delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Rules handed to the callback.
    pub rules: usize,
    /// Malformed tag or meta entries that were dropped.
    pub skipped_entries: usize,
    /// Lines the scanner printed on stderr.
    pub warnings: Vec<String>,
}

/// Drives the `yara` scanner.
///
/// The scanner is always asked for tags, metadata and string matches
/// (`-g -m -s`), which is the output shape [`ScanOutputParser`] expects.
#[derive(Debug, Clone)]
pub struct YaraExecutable {
    executable: Executable,
    rules: Vec<PathBuf>,
    compiled: bool,
    negate: bool,
    max_rules: Option<u32>,
    timeout: Duration,
}

impl YaraExecutable {
    pub fn new(executable: Executable) -> Self {
        Self {
            executable,
            rules: Vec::new(),
            compiled: false,
            negate: false,
            max_rules: None,
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Adds a rule source file. Adding the same file twice is a no-op.
    pub fn add_rule(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = absolute_existing(path.as_ref())?;
        if !self.rules.contains(&path) {
            self.rules.push(path);
        }
        Ok(self)
    }

    /// Uses rules produced by the compiler instead of source files.
    ///
    /// The scanner loads exactly one compiled file, so this replaces any
    /// rules added before.
    pub fn with_compiled_rules(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = absolute_existing(path.as_ref())?;
        self.rules = vec![path];
        self.compiled = true;
        Ok(self)
    }

    /// Report the rules that did not match instead of those that did.
    pub fn with_negate(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn with_max_rules(mut self, max_rules: Option<u32>) -> Self {
        self.max_rules = max_rules;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_compiled(&self) -> bool {
        self.compiled
            || matches!(self.rules.as_slice(), [only]
                if only.extension().is_some_and(|ext| ext == COMPILED_RULES_EXTENSION))
    }

    /// Arguments for scanning `target`, without the program itself.
    pub fn command_line(
        &self,
        target: &Path,
        module_args: &BTreeMap<String, String>,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-g", "-m", "-s"].iter().map(OsString::from).collect();

        if self.negate {
            args.push("-n".into());
        }
        if let Some(max) = self.max_rules {
            args.push("-l".into());
            args.push(max.to_string().into());
        }
        for (module, value) in module_args {
            args.push("-x".into());
            args.push(format!("{}={}", module, value).into());
        }
        if self.is_compiled() {
            args.push("-C".into());
        }

        args.extend(self.rules.iter().map(|p| p.as_os_str().to_os_string()));
        args.push(target.as_os_str().to_os_string());
        args
    }

    /// Scans one file, delivering every reported rule to `callback` as soon
    /// as it is complete.
    pub fn scan_file<C: ScanCallback>(
        &self,
        target: &Path,
        module_args: &BTreeMap<String, String>,
        mut callback: C,
    ) -> Result<ScanSummary> {
        if self.rules.is_empty() {
            bail!("No rules were added to the scanner");
        }
        let target = absolute_existing(target).context("Cannot open scan target")?;

        let args = self.command_line(&target, module_args);

        let mut rules = 0;
        let mut parser = ScanOutputParser::new(|rule: Rule| {
            rules += 1;
            callback.on_match(rule);
        });
        let mut stderr = Vec::new();

        let status = self.executable.run_streaming(
            &args,
            Some(self.timeout),
            |line| {
                parser.on_line(line).map_err(|error| {
                    OutputError {
                        line_number: parser.line_number(),
                        line: line.to_string(),
                        error,
                    }
                    .into()
                })
            },
            |line| stderr.push(line.to_string()),
        )?;

        if !status.success() {
            bail!(
                "Scanner exited with {}: {}",
                status,
                stderr.join("\n").trim()
            );
        }

        let skipped_entries = parser.skipped_entries();
        parser.finish()?;

        for line in &stderr {
            warn!("yara: {}", line);
        }
        debug!("{} rule(s) reported for {}", rules, target.display());

        Ok(ScanSummary { rules, skipped_entries, warnings: stderr })
    }

    /// Scans an in-memory buffer through a temporary file that is removed
    /// afterwards.
    pub fn scan_bytes<C: ScanCallback>(
        &self,
        data: &[u8],
        module_args: &BTreeMap<String, String>,
        callback: C,
    ) -> Result<ScanSummary> {
        let mut file = tempfile::Builder::new()
            .prefix("yarapipe-")
            .suffix(".dat")
            .tempfile()
            .context("Failed to create temporary scan target")?;
        file.write_all(data)?;
        file.flush()?;

        self.scan_file(file.path(), module_args, callback)
    }
}

fn absolute_existing(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    Ok(std::path::absolute(path)?)
}
