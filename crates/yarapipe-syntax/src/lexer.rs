use crate::error::{LexError, Span};
use serde::Serialize;
use std::fmt;

/// The fixed set of token classes the output formats are built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Equals,
    Comma,
    Colon,
    LeftBracket,
    RightBracket,
    Empty,
}

impl TokenKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Equals => "'='",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::Empty => "end of line",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A token with its raw text.
///
/// `String` holds the characters between the quotes exactly as they were
/// printed; escape sequences are resolved later with [`unescape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Identifier(String),
    Number(String),
    String(String),
    Equals,
    Comma,
    Colon,
    LeftBracket,
    RightBracket,
    Empty,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Identifier(_) => TokenKind::Identifier,
            Token::Number(_) => TokenKind::Number,
            Token::String(_) => TokenKind::String,
            Token::Equals => TokenKind::Equals,
            Token::Comma => TokenKind::Comma,
            Token::Colon => TokenKind::Colon,
            Token::LeftBracket => TokenKind::LeftBracket,
            Token::RightBracket => TokenKind::RightBracket,
            Token::Empty => TokenKind::Empty,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Token::Identifier(s) | Token::Number(s) | Token::String(s) => s,
            Token::Equals => "=",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::LeftBracket => "[",
            Token::RightBracket => "]",
            Token::Empty => "",
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Token::Identifier(s) | Token::Number(s) | Token::String(s) => s,
            other => other.text().to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Token::Identifier(s) => format!("'{}'", s),
            Token::Number(n) => format!("number {}", n),
            Token::String(s) => format!("string \"{}\"", s),
            Token::Empty => "end of line".to_string(),
            other => format!("'{}'", other.text()),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::String(s) => write!(f, "\"{}\"", s),
            other => write!(f, "{}", other.text()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

impl SpannedToken {
    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }
}

fn is_bareword_char(ch: char) -> bool {
    !ch.is_whitespace() && !matches!(ch, '[' | ']' | ',' | ':' | '=' | '"')
}

/// Decimal with an optional minus sign, or `0x`/`0X` followed by hex digits.
fn is_number_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Pull-based tokenizer over a single line of output.
///
/// Tokens are produced on demand so that a caller can stop at any point and
/// take the untouched remainder of the line with [`Lexer::rest`].
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_line(input, 1)
    }

    /// Creates a lexer whose spans report `line` as their line number.
    pub fn with_line(input: &'a str, line: usize) -> Self {
        Self { input, pos: 0, line, col: 1 }
    }

    /// The part of the line that has not been consumed yet.
    pub fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        self.col += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.bump();
        }
    }

    fn span_from(&self, start: usize, start_col: usize) -> Span {
        Span::new(self.line, start_col, start, self.pos)
    }

    pub fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        self.skip_whitespace();

        let start = self.pos;
        let start_col = self.col;

        let Some(ch) = self.peek() else {
            return Ok(SpannedToken {
                token: Token::Empty,
                span: self.span_from(start, start_col),
            });
        };

        let token = match ch {
            '[' => {
                self.bump();
                Token::LeftBracket
            }
            ']' => {
                self.bump();
                Token::RightBracket
            }
            ',' => {
                self.bump();
                Token::Comma
            }
            ':' => {
                self.bump();
                Token::Colon
            }
            '=' => {
                self.bump();
                Token::Equals
            }
            '"' => self.lex_string(start, start_col)?,
            _ => {
                while matches!(self.peek(), Some(ch) if is_bareword_char(ch)) {
                    self.bump();
                }

                let text = &self.input[start..self.pos];
                if is_number_literal(text) {
                    Token::Number(text.to_string())
                } else {
                    Token::Identifier(text.to_string())
                }
            }
        };

        Ok(SpannedToken {
            token,
            span: self.span_from(start, start_col),
        })
    }

    fn lex_string(&mut self, start: usize, start_col: usize) -> Result<Token, LexError> {
        self.bump();
        let content_start = self.pos;
        let mut escaped = false;

        loop {
            let content_end = self.pos;
            match self.bump() {
                None => {
                    return Err(LexError::UnterminatedString {
                        span: self.span_from(start, start_col),
                    });
                }
                Some(_) if escaped => escaped = false,
                Some('\\') => escaped = true,
                Some('"') => {
                    return Ok(Token::String(self.input[content_start..content_end].to_string()));
                }
                Some(_) => {}
            }
        }
    }

    /// Consumes the rest of the line as one verbatim token.
    ///
    /// A single separating space is skipped; everything after it (further
    /// whitespace and delimiters included) becomes the text of a single
    /// `String` token.
    pub fn rest(&mut self) -> SpannedToken {
        if self.peek() == Some(' ') {
            self.bump();
        }

        let start = self.pos;
        let start_col = self.col;
        let text = self.remaining().to_string();
        while self.bump().is_some() {}

        SpannedToken {
            token: Token::String(text),
            span: self.span_from(start, start_col),
        }
    }
}

/// Tokenizes a whole line, stopping before the terminating `Empty` token.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::with_capacity(input.len() / 4);

    loop {
        let token = lexer.next_token()?;
        if token.kind() == TokenKind::Empty {
            break;
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Resolves `\"`, `\'`, `\\`, `\n` and `\t`.
///
/// Any other backslash is kept as-is, including a trailing one.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        let replacement = match chars.peek() {
            Some('"') => '"',
            Some('\'') => '\'',
            Some('\\') => '\\',
            Some('n') => '\n',
            Some('t') => '\t',
            _ => {
                out.push('\\');
                continue;
            }
        };
        chars.next();
        out.push(replacement);
    }

    out
}
