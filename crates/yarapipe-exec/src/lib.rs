//! Runs the `yara` scanner and the `yarac` compiler as child processes and
//! streams their output through the parsers in `yarapipe-syntax`.
//!
//! Results reach the caller through callbacks while the process is still
//! running; nothing is buffered until exit.

pub mod compiler;
pub mod error;
pub mod process;
pub mod scanner;

pub use compiler::{CompiledRules, DEFAULT_COMPILE_TIMEOUT, DEFAULT_NAMESPACE, YaracExecutable};
pub use error::{OutputError, TimedOut};
pub use process::{Executable, YARA_BINARY_ENV, YARAC_BINARY_ENV};
pub use scanner::{COMPILED_RULES_EXTENSION, DEFAULT_SCAN_TIMEOUT, ScanSummary, YaraExecutable};
