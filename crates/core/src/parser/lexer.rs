//! PDF tokenizer.
//!
//! Splits raw bytes into syntax tokens. Only the keywords that matter for
//! object syntax and index structure get dedicated variants; everything
//! else is carried as `Keyword::Unknown`.

use crate::error::{PdfError, Result};

/// Keywords recognised by the object parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    ArrayStart, // [
    ArrayEnd,   // ]
    DictStart,  // <<
    DictEnd,    // >>
    Null,
    Obj,
    EndObj,
    R,
    Stream,
    EndStream,
    Xref,
    Trailer,
    StartXref,
    Unknown(Vec<u8>),
}

impl Keyword {
    pub fn from_bytes(b: &[u8]) -> Self {
        match b {
            b"[" => Self::ArrayStart,
            b"]" => Self::ArrayEnd,
            b"<<" => Self::DictStart,
            b">>" => Self::DictEnd,
            b"null" => Self::Null,
            b"obj" => Self::Obj,
            b"endobj" => Self::EndObj,
            b"R" => Self::R,
            b"stream" => Self::Stream,
            b"endstream" => Self::EndStream,
            b"xref" => Self::Xref,
            b"trailer" => Self::Trailer,
            b"startxref" => Self::StartXref,
            other => Self::Unknown(other.to_vec()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::ArrayStart => b"[",
            Self::ArrayEnd => b"]",
            Self::DictStart => b"<<",
            Self::DictEnd => b">>",
            Self::Null => b"null",
            Self::Obj => b"obj",
            Self::EndObj => b"endobj",
            Self::R => b"R",
            Self::Stream => b"stream",
            Self::EndStream => b"endstream",
            Self::Xref => b"xref",
            Self::Trailer => b"trailer",
            Self::StartXref => b"startxref",
            Self::Unknown(bytes) => bytes.as_slice(),
        }
    }
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer value
    Int(i64),
    /// Floating point value
    Real(f64),
    /// Boolean value
    Bool(bool),
    /// Literal name (e.g., /Name)
    Literal(String),
    /// Keyword (e.g., obj, R, stream)
    Keyword(Keyword),
    /// String (literal or hex)
    String(Vec<u8>),
}

/// Check if byte is PDF whitespace
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x00' | b'\x0c')
}

/// Check if byte is a PDF delimiter
pub const fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn find_line_end(data: &[u8]) -> Option<usize> {
    data.iter().position(|&b| b == b'\n' || b == b'\r')
}

/// Decode name bytes; falls back to Latin-1 for non UTF-8 names.
fn name_from_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}

/// Byte-level tokenizer over a borrowed buffer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    /// Current token position
    token_pos: usize,
}

impl<'a> Lexer<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            token_pos: 0,
        }
    }

    /// Lexer positioned at `pos`.
    pub const fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            token_pos: pos,
        }
    }

    /// Current position in the buffer
    pub const fn tell(&self) -> usize {
        self.pos
    }

    /// Set current position.
    pub const fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
        self.token_pos = pos;
    }

    /// Underlying buffer.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Get remaining unparsed data
    pub fn remaining(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) {
        while self.pos < self.data.len() {
            let b = self.data[self.pos];
            if b == b'%' {
                self.pos += 1;
                match find_line_end(&self.data[self.pos..]) {
                    Some(offset) => self.pos += offset + 1,
                    None => self.pos = self.data.len(),
                }
                continue;
            }
            if !is_whitespace(b) {
                return;
            }
            self.pos += 1;
        }
    }

    /// Parse a literal name (/Name)
    fn parse_literal(&mut self) -> Token {
        self.advance(); // '/'
        let mut name = Vec::new();

        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
            if b == b'#' {
                let hex = (self.peek(), self.peek_at(1));
                if let (Some(c1), Some(c2)) = hex
                    && c1.is_ascii_hexdigit()
                    && c2.is_ascii_hexdigit()
                {
                    self.pos += 2;
                    name.push((hex_nibble(c1) << 4) | hex_nibble(c2));
                }
                // A stray '#' is dropped, the following characters kept.
                continue;
            }
            name.push(b);
        }

        Token::Literal(name_from_bytes(name))
    }

    /// Parse a number (integer or real)
    fn parse_number(&mut self) -> Result<Token> {
        let start = self.pos;
        let mut has_dot = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.advance();
        }

        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else if b == b'.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.data[start..self.pos];
        let s = std::str::from_utf8(text).map_err(|_| PdfError::TokenError {
            pos: start,
            msg: "invalid number".into(),
        })?;

        if !has_dot && let Ok(val) = s.parse::<i64>() {
            return Ok(Token::Int(val));
        }
        // Overlong integers degrade to reals rather than failing the object.
        let trimmed = match s {
            "+" | "-" | "." | "+." | "-." => "0",
            other => other,
        };
        trimmed
            .parse::<f64>()
            .map(Token::Real)
            .map_err(|_| PdfError::TokenError {
                pos: start,
                msg: format!("invalid number: {s}"),
            })
    }

    /// Parse a literal string (...)
    fn parse_string(&mut self) -> Result<Token> {
        self.advance(); // '('
        let mut result = Vec::new();
        let mut depth = 1;

        while depth > 0 {
            match self.advance() {
                Some(b'(') => {
                    depth += 1;
                    result.push(b'(');
                }
                Some(b')') => {
                    depth -= 1;
                    if depth > 0 {
                        result.push(b')');
                    }
                }
                Some(b'\\') => match self.advance() {
                    Some(b'n') => result.push(b'\n'),
                    Some(b'r') => result.push(b'\r'),
                    Some(b't') => result.push(b'\t'),
                    Some(b'b') => result.push(0x08),
                    Some(b'f') => result.push(0x0c),
                    Some(b'\r') => {
                        if self.peek() == Some(b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'\n') => {}
                    Some(c) if (b'0'..b'8').contains(&c) => {
                        let mut octal = u32::from(c - b'0');
                        for _ in 0..2 {
                            match self.peek() {
                                Some(d) if (b'0'..b'8').contains(&d) => {
                                    self.advance();
                                    octal = octal * 8 + u32::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        result.push((octal & 0xFF) as u8);
                    }
                    Some(c) => result.push(c),
                    None => return Err(PdfError::UnexpectedEof),
                },
                Some(c) => result.push(c),
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        Ok(Token::String(result))
    }

    /// Parse a hex string <...>
    fn parse_hex_string(&mut self) -> Result<Token> {
        self.advance(); // '<'
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c.is_ascii_hexdigit() => {
                    self.pos += 1;
                    let nibble = hex_nibble(c);
                    match pending.take() {
                        Some(high) => result.push((high << 4) | nibble),
                        None => pending = Some(nibble),
                    }
                }
                Some(c) if is_whitespace(c) => self.pos += 1,
                // Invalid character, stop here
                Some(_) => break,
                None => return Err(PdfError::UnexpectedEof),
            }
        }

        if let Some(nibble) = pending {
            result.push(nibble << 4);
        }

        Ok(Token::String(result))
    }

    fn parse_keyword(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            // Lone delimiter such as ')' or '{'.
            self.pos += 1;
        }

        let bytes = &self.data[start..self.pos];
        match bytes {
            b"true" => Token::Bool(true),
            b"false" => Token::Bool(false),
            _ => Token::Keyword(Keyword::from_bytes(bytes)),
        }
    }

    /// Position of the token most recently returned.
    pub const fn token_pos(&self) -> usize {
        self.token_pos
    }

    /// Get next token
    pub fn next_token(&mut self) -> Option<Result<(usize, Token)>> {
        self.skip_whitespace();

        if self.at_end() {
            return None;
        }

        self.token_pos = self.pos;
        let b = self.peek()?;

        let result = match b {
            b'/' => Ok(self.parse_literal()),
            b'(' => self.parse_string(),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(Token::Keyword(Keyword::DictStart))
                } else {
                    self.parse_hex_string()
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(Token::Keyword(Keyword::DictEnd))
                } else {
                    self.pos += 1;
                    Ok(Token::Keyword(Keyword::Unknown(b">".to_vec())))
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::ArrayStart))
            }
            b']' => {
                self.pos += 1;
                Ok(Token::Keyword(Keyword::ArrayEnd))
            }
            b'+' | b'-' | b'.' => {
                if matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == b'.') {
                    self.parse_number()
                } else {
                    Ok(self.parse_keyword())
                }
            }
            c if c.is_ascii_digit() => self.parse_number(),
            _ => Ok(self.parse_keyword()),
        };

        Some(result.map(|token| (self.token_pos, token)))
    }
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0,
    }
}
