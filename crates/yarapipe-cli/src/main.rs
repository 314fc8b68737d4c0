//! # yarapipe
//!
//! Command-line front end for the `yara` scanner and the `yarac` compiler.
//!
//! `scan` and `compile` run the executables and print what they report while
//! they run. `parse-output` and `parse-diagnostics` read saved output instead.

mod config;
mod errors;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{Level, debug};
use yarapipe_exec::{DEFAULT_NAMESPACE, Executable, ScanSummary, YaraExecutable, YaracExecutable};
use yarapipe_syntax::{CompileDiagnostic, DiagnosticParser, Rule, ScanOutputParser};

use config::Config;
use errors::{enhance_error, parse_error_report};
use output::{TargetReport, render_diagnostic, render_rule, to_json};

#[derive(Parser)]
#[command(name = "yarapipe")]
#[command(about = "Run yara and yarac and read what they report", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log parser and process activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan files with yara
    Scan(ScanArgs),
    /// Compile rule files with yarac
    Compile(CompileArgs),
    /// Parse saved `yara -g -m -s` output (stdin when FILE is omitted)
    ParseOutput {
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Parse saved yarac stderr (stdin when FILE is omitted)
    ParseDiagnostics {
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Files to scan
    #[arg(required = true)]
    targets: Vec<PathBuf>,

    /// Rule source file (repeatable)
    #[arg(short, long = "rules", value_name = "FILE")]
    rules: Vec<PathBuf>,

    /// Rules compiled with `yarapipe compile`
    #[arg(short = 'C', long, value_name = "FILE", conflicts_with = "rules")]
    compiled: Option<PathBuf>,

    /// Data handed to a module (repeatable)
    #[arg(short = 'x', long = "module-data", value_name = "MODULE=VALUE", value_parser = parse_module_arg)]
    module_data: Vec<(String, String)>,

    /// Report rules that did not match
    #[arg(short, long)]
    negate: bool,

    /// Stop after this many matching rules
    #[arg(short = 'l', long, value_name = "N")]
    max_rules: Option<u32>,

    /// Seconds before a scan is killed
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[arg(long)]
    json: bool,

    /// Path to the yara executable
    #[arg(long, value_name = "PATH")]
    yara: Option<PathBuf>,
}

#[derive(Args)]
struct CompileArgs {
    /// Rule files, optionally prefixed with a namespace
    #[arg(required = true, value_name = "[NAMESPACE:]FILE")]
    rules: Vec<String>,

    /// Where to write the compiled rules
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Seconds before compilation is killed
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[arg(long)]
    json: bool,

    /// Path to the yarac executable
    #[arg(long, value_name = "PATH")]
    yarac: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(".").unwrap_or_else(|e| {
        eprintln!("{} Failed to load config: {:#}", "⚠".yellow().bold(), e);
        Config::default()
    });
    config.merge_cli_args(None, false, cli.no_color);
    if !config.colored {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Scan(args) => scan(args, config),
        Commands::Compile(args) => compile(args, config),
        Commands::ParseOutput { file, json } => parse_output(file.as_deref(), json || config.json),
        Commands::ParseDiagnostics { file, json } => {
            parse_diagnostics(file.as_deref(), json || config.json)
        }
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            enhance_error(e, None).display();
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_module_arg(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((module, value)) if !module.is_empty() && !value.is_empty() => {
            Ok((module.to_string(), value.to_string()))
        }
        _ => Err(format!("expected MODULE=VALUE, got '{}'", arg)),
    }
}

/// `ns:rules.yar` → (`ns`, `rules.yar`). A one-letter prefix is a drive
/// letter, not a namespace.
fn split_namespace(spec: &str) -> (&str, &str) {
    match spec.split_once(':') {
        Some((ns, path))
            if ns.len() > 1 && ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            (ns, path)
        }
        _ => (DEFAULT_NAMESPACE, spec),
    }
}

fn with_thread_pool<T: Send>(threads: usize, f: impl FnOnce() -> T + Send) -> Result<T> {
    if threads == 0 {
        return Ok(f());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to create thread pool")?;
    Ok(pool.install(f))
}

fn scan(args: ScanArgs, mut config: Config) -> Result<bool> {
    config.merge_cli_args(args.timeout, args.json, false);

    let yara = Executable::yara(args.yara.as_deref().or(config.yara_path.as_deref()))?;
    let mut scanner = YaraExecutable::new(yara)
        .with_negate(args.negate)
        .with_max_rules(args.max_rules)
        .with_timeout(config.timeout);

    if let Some(compiled) = &args.compiled {
        scanner = scanner.with_compiled_rules(compiled)?;
    }
    for rule in &args.rules {
        scanner = scanner.add_rule(rule)?;
    }

    let module_args: BTreeMap<String, String> = args.module_data.into_iter().collect();

    let results: Vec<Result<(Vec<Rule>, ScanSummary)>> = with_thread_pool(config.threads, || {
        args.targets
            .par_iter()
            .map(|target| scan_target(&scanner, target, &module_args))
            .collect()
    })?;

    let mut ok = true;
    let mut reports = Vec::new();

    for (target, result) in args.targets.iter().zip(results) {
        match result {
            Ok((rules, summary)) => {
                if !config.json {
                    for rule in &rules {
                        print!("{}", render_rule(rule, Some(target)));
                    }
                    if summary.skipped_entries > 0 {
                        eprintln!(
                            "{} {}: skipped {} malformed entries",
                            "⚠".yellow().bold(),
                            target.display(),
                            summary.skipped_entries
                        );
                    }
                }
                reports.push(TargetReport {
                    target,
                    rules,
                    skipped_entries: summary.skipped_entries,
                    warnings: summary.warnings,
                });
            }
            Err(e) => {
                ok = false;
                enhance_error(e, Some(target.display().to_string())).display();
            }
        }
    }

    if config.json {
        println!("{}", to_json(&reports)?);
    }

    Ok(ok)
}

fn scan_target(
    scanner: &YaraExecutable,
    target: &Path,
    module_args: &BTreeMap<String, String>,
) -> Result<(Vec<Rule>, ScanSummary)> {
    debug!("scanning {}", target.display());

    let mut rules = Vec::new();
    let summary = scanner.scan_file(target, module_args, |rule: Rule| rules.push(rule))?;
    Ok((rules, summary))
}

fn compile(args: CompileArgs, mut config: Config) -> Result<bool> {
    config.merge_cli_args(args.timeout, args.json, false);
    let json = config.json;

    let yarac = Executable::yarac(args.yarac.as_deref().or(config.yarac_path.as_deref()))?;
    let mut compiler = YaracExecutable::new(yarac).with_timeout(config.timeout);
    for spec in &args.rules {
        let (namespace, path) = split_namespace(spec);
        compiler = compiler.add_rule(namespace, path)?;
    }

    let mut diagnostics = Vec::new();
    let result = compiler.compile(|diagnostic: CompileDiagnostic| {
        if !json {
            eprintln!("{}", render_diagnostic(&diagnostic));
        }
        diagnostics.push(diagnostic);
    });

    if json {
        println!("{}", to_json(&diagnostics)?);
    }

    let compiled = result?;
    let path = compiled.persist(&args.output)?;
    if !json {
        println!(
            "{} Compiled rules written to {}",
            "✓".green().bold(),
            path.display()
        );
    }

    Ok(true)
}

/// Reads a saved capture; match data is arbitrary bytes, so invalid UTF-8
/// is replaced rather than rejected.
fn read_input(file: Option<&Path>) -> Result<(String, String)> {
    match file {
        Some(path) if path != Path::new("-") => {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            Ok((path.display().to_string(), String::from_utf8_lossy(&bytes).into_owned()))
        }
        _ => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("Failed to read stdin")?;
            Ok(("<stdin>".to_string(), String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

fn parse_output(file: Option<&Path>, json: bool) -> Result<bool> {
    let (name, text) = read_input(file)?;

    let mut rules = Vec::new();
    let mut parser = ScanOutputParser::new(|rule: Rule| rules.push(rule));

    for line in text.lines() {
        if let Err(e) = parser.on_line(line) {
            parse_error_report(&e, &name, &text).display();
            return Ok(false);
        }
    }

    let skipped = parser.skipped_entries();
    parser.finish()?;

    if json {
        println!("{}", to_json(&rules)?);
    } else {
        for rule in &rules {
            print!("{}", render_rule(rule, None));
        }
        if skipped > 0 {
            eprintln!("{} skipped {} malformed entries", "⚠".yellow().bold(), skipped);
        }
    }

    Ok(true)
}

fn parse_diagnostics(file: Option<&Path>, json: bool) -> Result<bool> {
    let (_, text) = read_input(file)?;

    let mut diagnostics = Vec::new();
    let mut parser = DiagnosticParser::new(|d: CompileDiagnostic| diagnostics.push(d));
    for line in text.lines() {
        parser.on_line(line);
    }
    let errors = parser.errors();
    let warnings = parser.warnings();
    parser.finish();

    if json {
        println!("{}", to_json(&diagnostics)?);
    } else {
        for diagnostic in &diagnostics {
            println!("{}", render_diagnostic(diagnostic));
        }
        println!();
        println!("{} error(s), {} warning(s)", errors, warnings);
    }

    Ok(errors == 0)
}
