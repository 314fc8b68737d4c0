//! Line-oriented parsers for the two output formats.
//!
//! - [`ScanOutputParser`] consumes scanner stdout and assembles [`Rule`](crate::Rule)s.
//! - [`DiagnosticParser`] consumes compiler stderr and emits
//!   [`CompileDiagnostic`](crate::CompileDiagnostic)s.
//!
//! Each invocation of an external tool gets its own parser instance; the
//! parsers own all of their state and never share it.

mod diagnostics;
mod scan_output;

pub use diagnostics::{
    CompilationCallback, DiagnosticParser, DiagnosticScanner, DiagnosticState, parse_diagnostic,
};
pub use scan_output::{MATCH_LINE_PREFIX, ScanCallback, ScanOutputParser, parse_scan_output};
