use crate::cursor::{TokenCursor, TokenGroup};
use crate::error::{EntryList, ParseError, SkippedEntry, Span};
use crate::lexer::{SpannedToken, Token, TokenKind, unescape};
use crate::model::{Match, Meta, MetaValue, Rule};
use tracing::{debug, warn};

/// Prefix that marks a string-match line (`0xOFFSET:$id:value`).
pub const MATCH_LINE_PREFIX: &str = "0x";

const LIST_STOPS: [TokenKind; 2] = [TokenKind::Comma, TokenKind::RightBracket];

const MATCH_LINE_SHAPE: [TokenKind; 4] = [
    TokenKind::Number,
    TokenKind::Colon,
    TokenKind::Identifier,
    TokenKind::Colon,
];

/// Receives every finished rule, in output order.
pub trait ScanCallback {
    fn on_match(&mut self, rule: Rule);
}

impl<F: FnMut(Rule)> ScanCallback for F {
    fn on_match(&mut self, rule: Rule) {
        self(rule)
    }
}

#[derive(Debug)]
enum ScanState {
    Idle,
    InRule(Rule),
    Failed,
}

/// Line-by-line parser for the stdout of `yara -g -m -s`.
///
/// ```text
/// HelloWorld [tag1,tag2] [author="someone",score=10,internal=true] sample.bin
/// 0xf:$a: Hello World
/// 0x59:$a: Hello World
/// ```
///
/// A rule is handed to the callback once the next header line or
/// [`finish`](Self::finish) closes it. The first protocol violation puts
/// the parser in a failed state: the rule in progress is discarded and every
/// later call returns [`ParseError::Aborted`].
pub struct ScanOutputParser<C: ScanCallback> {
    callback: C,
    state: ScanState,
    line_number: usize,
    skipped_entries: usize,
}

impl<C: ScanCallback> ScanOutputParser<C> {
    pub fn new(callback: C) -> Self {
        Self {
            callback,
            state: ScanState::Idle,
            line_number: 0,
            skipped_entries: 0,
        }
    }

    /// Number of lines fed so far, blank ones included.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Number of malformed tag/metadata entries dropped so far.
    pub fn skipped_entries(&self) -> usize {
        self.skipped_entries
    }

    pub fn in_rule(&self) -> bool {
        matches!(self.state, ScanState::InRule(_))
    }

    pub fn on_line(&mut self, line: &str) -> Result<(), ParseError> {
        if matches!(self.state, ScanState::Failed) {
            return Err(ParseError::Aborted);
        }

        self.line_number += 1;

        if line.trim().is_empty() {
            return Ok(());
        }

        let result = if line.starts_with(MATCH_LINE_PREFIX) {
            self.on_string_match(line)
        } else {
            self.on_rule_header(line)
        };

        if result.is_err() {
            self.state = ScanState::Failed;
        }
        result
    }

    /// Flushes the rule in progress and returns the callback.
    pub fn finish(mut self) -> Result<C, ParseError> {
        match std::mem::replace(&mut self.state, ScanState::Idle) {
            ScanState::Failed => Err(ParseError::Aborted),
            ScanState::InRule(rule) => {
                self.callback.on_match(rule);
                Ok(self.callback)
            }
            ScanState::Idle => Ok(self.callback),
        }
    }

    fn complete_rule(&mut self) {
        if let ScanState::InRule(rule) = std::mem::replace(&mut self.state, ScanState::Idle) {
            self.callback.on_match(rule);
        }
    }

    fn skip(&mut self, list: EntryList, token: &SpannedToken) {
        let entry = SkippedEntry {
            list,
            found: token.token.display_name(),
            span: token.span,
        };
        warn!("{}", entry);
        self.skipped_entries += 1;
    }

    fn on_rule_header(&mut self, line: &str) -> Result<(), ParseError> {
        self.complete_rule();

        let mut cursor = TokenCursor::new(line, self.line_number);

        let identifier = cursor.next(TokenKind::Identifier)?.token.into_text();
        let mut rule = Rule::new(identifier);

        cursor.next(TokenKind::LeftBracket)?;
        loop {
            let group = cursor.next_until(&LIST_STOPS)?;
            let closed = ends_list(&group)?;
            let first = &group[0];

            if first.kind() == TokenKind::RightBracket {
                break;
            }

            match first.kind() {
                TokenKind::Identifier | TokenKind::Number | TokenKind::String => {
                    rule.tags.push(first.token.text().to_string());
                }
                _ => self.skip(EntryList::Tags, first),
            }

            if closed {
                break;
            }
        }

        cursor.next(TokenKind::LeftBracket)?;
        loop {
            let group = cursor.next_until(&LIST_STOPS)?;
            let closed = ends_list(&group)?;
            let first = &group[0];

            if first.kind() == TokenKind::RightBracket {
                break;
            }

            if first.kind() != TokenKind::Identifier {
                self.skip(EntryList::Metadata, first);
            } else {
                rule.metadata.push(parse_meta(&group)?);
            }

            if closed {
                break;
            }
        }

        debug!(
            "rule '{}' with {} tags and {} metadata entries",
            rule.identifier,
            rule.tags.len(),
            rule.metadata.len()
        );
        self.state = ScanState::InRule(rule);
        Ok(())
    }

    fn on_string_match(&mut self, line: &str) -> Result<(), ParseError> {
        let line_number = self.line_number;
        let ScanState::InRule(rule) = &mut self.state else {
            return Err(ParseError::OrphanMatch { line: line_number });
        };

        let mut cursor = TokenCursor::new(line, line_number);
        let group = cursor.next_sequence(&MATCH_LINE_SHAPE)?;

        let offset = decode_offset(&group[0])?;
        let identifier = group[2].token.text();
        let value = cursor.rest().token.into_text();

        rule.push_match(identifier, Match { offset, value });
        Ok(())
    }
}

/// Whether a list group ends on `]`; a group that ran off the end of the
/// line is a violation.
fn ends_list(group: &TokenGroup) -> Result<bool, ParseError> {
    match group.last() {
        Some(last) if last.kind() == TokenKind::RightBracket => Ok(true),
        Some(last) if last.kind() == TokenKind::Comma => Ok(false),
        other => Err(ParseError::UnexpectedEnd {
            expected: "',' or ']'".to_string(),
            span: other.map(|t| t.span).unwrap_or_default(),
        }),
    }
}

/// `IDENTIFIER EQUALS VALUE [ignored...] TERMINATOR`
fn parse_meta(group: &TokenGroup) -> Result<Meta, ParseError> {
    let identifier = group[0].token.text().to_string();

    let equals = &group[1];
    if equals.kind() != TokenKind::Equals {
        return Err(unexpected(TokenKind::Equals.display_name(), equals));
    }

    let value = &group[2];
    let meta_value = match &value.token {
        Token::String(raw) => MetaValue::String(unescape(raw)),
        Token::Number(text) => MetaValue::Integer(decode_integer(text, value.span)?),
        Token::Identifier(text) if text.eq_ignore_ascii_case("true") => MetaValue::Boolean(true),
        Token::Identifier(text) if text.eq_ignore_ascii_case("false") => MetaValue::Boolean(false),
        Token::Identifier(text) => {
            return Err(ParseError::InvalidBoolean {
                text: text.clone(),
                span: value.span,
            });
        }
        _ => return Err(unexpected("metadata value", value)),
    };

    if group.len() > 4 {
        let ignored = group[3].span.merge(&group[group.len() - 2].span);
        debug!(
            "ignoring trailing tokens after metadata '{}' at line {}, column {}",
            identifier, ignored.line, ignored.col
        );
    }

    Ok(Meta::new(identifier, meta_value))
}

fn unexpected(expected: &str, found: &SpannedToken) -> ParseError {
    match found.token {
        Token::Empty | Token::Comma | Token::RightBracket => ParseError::UnexpectedEnd {
            expected: expected.to_string(),
            span: found.span,
        },
        _ => ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: found.token.display_name(),
            span: found.span,
        },
    }
}

fn decode_offset(token: &SpannedToken) -> Result<u64, ParseError> {
    let text = token.token.text();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };

    parsed.map_err(|_| ParseError::NumericDecode {
        text: text.to_string(),
        span: token.span,
    })
}

/// Decimal or `0x` hex, with an optional leading minus.
fn decode_integer(text: &str, span: Span) -> Result<i64, ParseError> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16),
        None => digits.parse::<i128>(),
    };

    magnitude
        .ok()
        .map(|m| if negative { -m } else { m })
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| ParseError::NumericDecode {
            text: text.to_string(),
            span,
        })
}

/// Parses a complete capture of scanner output.
pub fn parse_scan_output(output: &str) -> Result<Vec<Rule>, ParseError> {
    let mut rules: Vec<Rule> = Vec::new();
    let mut parser = ScanOutputParser::new(|rule: Rule| rules.push(rule));

    for line in output.lines() {
        parser.on_line(line)?;
    }
    parser.finish()?;

    Ok(rules)
}
