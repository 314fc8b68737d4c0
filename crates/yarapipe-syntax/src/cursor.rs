use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token, TokenKind};
use smallvec::SmallVec;

/// The handful of tokens that make up one list entry or one fixed shape.
pub type TokenGroup = SmallVec<[SpannedToken; 4]>;

/// Sequencing primitives over a [`Lexer`].
///
/// Every method consumes input; there is no look-ahead or rewind.
pub struct TokenCursor<'a> {
    lexer: Lexer<'a>,
}

impl<'a> TokenCursor<'a> {
    pub fn new(line: &'a str, line_number: usize) -> Self {
        Self { lexer: Lexer::with_line(line, line_number) }
    }

    /// Reads one token and requires it to be of `expected` kind.
    pub fn next(&mut self, expected: TokenKind) -> Result<SpannedToken, ParseError> {
        let st = self.lexer.next_token()?;

        if st.kind() == expected {
            return Ok(st);
        }

        match st.token {
            Token::Empty => Err(ParseError::UnexpectedEnd {
                expected: expected.display_name().to_string(),
                span: st.span,
            }),
            found => Err(ParseError::UnexpectedToken {
                expected: expected.display_name().to_string(),
                found: found.display_name(),
                span: st.span,
            }),
        }
    }

    /// Reads tokens up to and including the first one whose kind is in
    /// `stops`.
    ///
    /// Running out of input also ends the group; the returned group then
    /// ends with an `Empty` token.
    pub fn next_until(&mut self, stops: &[TokenKind]) -> Result<TokenGroup, ParseError> {
        let mut group = TokenGroup::new();

        loop {
            let st = self.lexer.next_token()?;
            let kind = st.kind();
            group.push(st);

            if kind == TokenKind::Empty || stops.contains(&kind) {
                return Ok(group);
            }
        }
    }

    /// Reads exactly `kinds.len()` tokens, failing on the first mismatch.
    pub fn next_sequence(&mut self, kinds: &[TokenKind]) -> Result<TokenGroup, ParseError> {
        kinds.iter().map(|&kind| self.next(kind)).collect()
    }

    /// Everything left on the line as one verbatim token.
    pub fn rest(&mut self) -> SpannedToken {
        self.lexer.rest()
    }
}
