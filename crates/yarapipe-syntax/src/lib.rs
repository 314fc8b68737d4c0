//! # yarapipe Syntax
//!
//! Tokenizer, parsers and result types for the text printed by the `yara`
//! scanner and the `yarac` compiler.
//!
//! ## Overview
//!
//! - **Lexer**: splits one output line into typed tokens, honoring quotes
//! - **Cursor**: `next` / `next_until` / `next_sequence` / `rest` on top of the lexer
//! - **Scan output parser**: two-state machine turning stdout lines into [`Rule`]s
//! - **Diagnostic parser**: four-state scanner turning stderr lines into [`CompileDiagnostic`]s
//! - **Model**: plain `Rule` / `Meta` / `StringMatch` / `Match` values
//!
//! ## Architecture
//!
//! ```text
//! scanner stdout line            compiler stderr line
//!     ↓                               ↓
//! Lexer → TokenCursor            DiagnosticScanner
//!     ↓                               ↓
//! ScanOutputParser               DiagnosticParser
//!     ↓                               ↓
//! ScanCallback(Rule)             CompilationCallback(CompileDiagnostic)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use yarapipe_syntax::{MetaValue, parse_scan_output};
//!
//! let output = "\
//! HelloWorld [malware] [score=10,name=\"demo\"] sample.bin
//! 0xf:$a: Hello World
//! 0x59:$a: Hello World";
//!
//! let rules = parse_scan_output(output).expect("well-formed output");
//!
//! assert_eq!(rules.len(), 1);
//! assert_eq!(rules[0].tags, vec!["malware"]);
//! assert_eq!(rules[0].metadata[0].value, MetaValue::Integer(10));
//! assert_eq!(rules[0].strings[0].matches[1].offset, 0x59);
//! ```
//!
//! ## Error Handling
//!
//! Any grammar mismatch is a [`ParseError`]. It is fatal for the invocation:
//! the parser discards the rule in progress and rejects further lines.
//!
//! ```rust
//! use yarapipe_syntax::{ParseError, parse_scan_output};
//!
//! let err = parse_scan_output("0x0:$a: orphan").unwrap_err();
//! assert!(matches!(err, ParseError::OrphanMatch { line: 1 }));
//! ```

pub mod cursor;
pub mod error;
pub mod lexer;
pub mod model;
pub mod parser;

pub use cursor::{TokenCursor, TokenGroup};
pub use error::{EntryList, LexError, ParseError, SkippedEntry, Span};
pub use lexer::{Lexer, SpannedToken, Token, TokenKind, tokenize, unescape};
pub use model::*;
pub use parser::{
    CompilationCallback, DiagnosticParser, DiagnosticScanner, DiagnosticState, MATCH_LINE_PREFIX,
    ScanCallback, ScanOutputParser, parse_diagnostic, parse_scan_output,
};
