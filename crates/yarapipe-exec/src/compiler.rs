use crate::process::Executable;
use crate::scanner::COMPILED_RULES_EXTENSION;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info};
use yarapipe_syntax::{CompilationCallback, CompileDiagnostic, DiagnosticParser};

/// Namespace used when rules are added without one.
pub const DEFAULT_NAMESPACE: &str = "";

pub const DEFAULT_COMPILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Compiled rules in a temporary file.
///
/// The file is deleted when this value is dropped unless it was persisted.
#[derive(Debug)]
pub struct CompiledRules {
    path: TempPath,
    warnings: usize,
}

impl CompiledRules {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of warnings the compiler reported.
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Moves the compiled rules to `destination` and keeps them there.
    pub fn persist(self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let destination = destination.as_ref().to_path_buf();

        match self.path.persist(&destination) {
            Ok(()) => Ok(destination),
            Err(e) => {
                // rename fails across filesystems
                debug!("rename failed ({}), copying instead", e.error);
                std::fs::copy(&e.path, &destination).with_context(|| {
                    format!("Failed to write compiled rules to {}", destination.display())
                })?;
                Ok(destination)
            }
        }
    }
}

/// Drives the `yarac` compiler.
#[derive(Debug)]
pub struct YaracExecutable {
    executable: Executable,
    rules: BTreeMap<String, Vec<PathBuf>>,
    sources: Vec<NamedTempFile>,
    timeout: Duration,
}

impl YaracExecutable {
    pub fn new(executable: Executable) -> Self {
        Self {
            executable,
            rules: BTreeMap::new(),
            sources: Vec::new(),
            timeout: DEFAULT_COMPILE_TIMEOUT,
        }
    }

    /// Adds a rule file under `namespace`; pass [`DEFAULT_NAMESPACE`] for
    /// none.
    pub fn add_rule(mut self, namespace: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("Rule file not found: {}", path.display());
        }

        let path = std::path::absolute(path)?;
        let files = self.rules.entry(namespace.to_string()).or_default();
        if !files.contains(&path) {
            files.push(path);
        }
        Ok(self)
    }

    /// Adds rule source text; it is written to a temporary file that lives as
    /// long as this compiler.
    pub fn add_rules_content(mut self, namespace: &str, content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            bail!("Rule content is empty");
        }

        let mut file = tempfile::Builder::new()
            .prefix("yarapipe-")
            .suffix(".yar")
            .tempfile()
            .context("Failed to create temporary rule file")?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        let path = file.path().to_path_buf();
        self.sources.push(file);
        self.add_rule(namespace, path)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for compiling into `output`, without the program itself.
    pub fn command_line(&self, output: &Path) -> Vec<OsString> {
        let mut args = Vec::new();

        for (namespace, files) in &self.rules {
            for file in files {
                if namespace.is_empty() {
                    args.push(file.as_os_str().to_os_string());
                } else {
                    let mut arg = OsString::from(format!("{}:", namespace));
                    arg.push(file.as_os_str());
                    args.push(arg);
                }
            }
        }

        args.push(output.as_os_str().to_os_string());
        args
    }

    /// Compiles every added rule into one temporary file.
    ///
    /// Each stderr line of the compiler reaches `callback` as a
    /// [`CompileDiagnostic`]. A non-zero exit is an error that reports the
    /// number of compiler errors seen.
    pub fn compile<C: CompilationCallback>(&self, mut callback: C) -> Result<CompiledRules> {
        if self.rules.is_empty() {
            bail!("No rules were added to the compiler");
        }

        let output = tempfile::Builder::new()
            .prefix("yarapipe-")
            .suffix(&format!(".{}", COMPILED_RULES_EXTENSION))
            .tempfile()
            .context("Failed to create compiled rules file")?
            .into_temp_path();

        let args = self.command_line(&output);
        let mut parser =
            DiagnosticParser::new(|diagnostic: CompileDiagnostic| callback.on_diagnostic(diagnostic));

        let status = self.executable.run_streaming(
            &args,
            Some(self.timeout),
            |line| {
                debug!("yarac: {}", line);
                Ok(())
            },
            |line| parser.on_line(line),
        )?;

        let errors = parser.errors();
        let warnings = parser.warnings();

        if !status.success() {
            bail!("Compilation failed with {} error(s) ({})", errors, status);
        }

        info!("Compiled rules with {} warning(s)", warnings);
        Ok(CompiledRules { path: output, warnings })
    }
}
