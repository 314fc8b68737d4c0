//! Read the output of the YARA command-line tools as typed values.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::path::Path;
//! use yarapipe::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let scanner = YaraExecutable::new(Executable::yara(None)?).add_rule("rules/malware.yar")?;
//!
//! scanner.scan_file(Path::new("sample.bin"), &BTreeMap::new(), |rule: Rule| {
//!     println!("{} matched {} string(s)", rule.identifier, rule.strings.len());
//! })?;
//! # Ok(())
//! # }
//! ```

pub use yarapipe_exec as exec;
pub use yarapipe_syntax as syntax;

pub use yarapipe_exec::{
    CompiledRules, Executable, OutputError, ScanSummary, TimedOut, YaraExecutable,
    YaracExecutable,
};
pub use yarapipe_syntax::{
    CompilationCallback, CompileDiagnostic, Match, Meta, MetaValue, ParseError, Rule,
    ScanCallback, Severity, StringMatch, parse_diagnostic, parse_scan_output,
};

pub mod prelude {
    pub use crate::{Executable, YaraExecutable, YaracExecutable};
    pub use crate::{CompileDiagnostic, Rule, Severity};
    pub use crate::{parse_diagnostic, parse_scan_output};
}
