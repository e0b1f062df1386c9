//! PDF object parser - converts tokens to PDF objects.
//!
//! This is the tokenizer-facing half of the object store: it knows how to
//! read one value, and how to read an `n g obj ... endobj` wrapper with an
//! optional `stream` keyword. It never follows references.

use super::lexer::{Keyword, Lexer, Token, is_whitespace};
use crate::error::{PdfError, Result};
use crate::model::objects::{Dict, PDFObjRef, PDFObject};

/// Arrays and dictionaries nested deeper than this are rejected.
pub const MAX_NESTING: usize = 256;

/// PDF Parser - parses PDF object syntax
///
/// Uses [`Lexer`] for tokenization and builds PDF objects,
/// handling indirect references (num num R) appropriately.
pub struct PDFParser<'a> {
    lexer: Lexer<'a>,
    /// Lookahead buffer for tokens, with their start positions
    lookahead: Vec<(usize, Token)>,
}

impl<'a> PDFParser<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Parser positioned at `pos`.
    pub const fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            lookahead: Vec::new(),
        }
    }

    /// Position of the first unconsumed byte.
    pub fn tell(&self) -> usize {
        self.lookahead
            .last()
            .map_or_else(|| self.lexer.tell(), |(pos, _)| *pos)
    }

    /// Get remaining unparsed data.
    pub fn remaining(&self) -> &'a [u8] {
        self.lexer.data().get(self.tell()..).unwrap_or_default()
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>> {
        if let Some(tok) = self.lookahead.pop() {
            return Ok(Some(tok));
        }
        self.lexer.next_token().transpose()
    }

    fn push_back(&mut self, tok: (usize, Token)) {
        self.lookahead.push(tok);
    }

    /// Read the next token, failing at end of input.
    pub fn expect_token(&mut self) -> Result<Token> {
        Ok(self.next_token()?.ok_or(PdfError::UnexpectedEof)?.1)
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Option<&Token>> {
        if self.lookahead.is_empty() {
            match self.lexer.next_token().transpose()? {
                Some(tok) => self.lookahead.push(tok),
                None => return Ok(None),
            }
        }
        Ok(self.lookahead.last().map(|(_, tok)| tok))
    }

    /// Parse next PDF object
    pub fn parse_object(&mut self) -> Result<PDFObject> {
        let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
        self.token_to_object(pos, token, 0)
    }

    fn token_to_object(&mut self, pos: usize, token: Token, depth: usize) -> Result<PDFObject> {
        match token {
            Token::Int(n) => Ok(self.int_or_reference(n)?),
            Token::Real(n) => Ok(PDFObject::Real(n)),
            Token::Bool(b) => Ok(PDFObject::Bool(b)),
            Token::Literal(s) => Ok(PDFObject::Name(s)),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::Keyword(Keyword::Null) => Ok(PDFObject::Null),
            Token::Keyword(Keyword::ArrayStart) => self.parse_array(depth + 1),
            Token::Keyword(Keyword::DictStart) => self.parse_dict(depth + 1),
            Token::Keyword(kw) => Err(PdfError::TokenError {
                pos,
                msg: format!(
                    "unexpected keyword: {}",
                    String::from_utf8_lossy(kw.as_bytes())
                ),
            }),
        }
    }

    /// `n` may start an indirect reference: objid genno R
    fn int_or_reference(&mut self, n: i64) -> Result<PDFObject> {
        let Some(second) = self.next_token()? else {
            return Ok(PDFObject::Int(n));
        };
        let Token::Int(m) = second.1 else {
            self.push_back(second);
            return Ok(PDFObject::Int(n));
        };
        match self.next_token()? {
            Some((_, Token::Keyword(Keyword::R))) => {
                let objid = u32::try_from(n).ok();
                let genno = u16::try_from(m).ok();
                match (objid, genno) {
                    (Some(objid), Some(genno)) => {
                        Ok(PDFObject::Ref(PDFObjRef::new(objid, genno)))
                    }
                    // Out of range references point nowhere.
                    _ => Ok(PDFObject::Null),
                }
            }
            Some(third) => {
                self.push_back(third);
                self.push_back(second);
                Ok(PDFObject::Int(n))
            }
            None => {
                self.push_back(second);
                Ok(PDFObject::Int(n))
            }
        }
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > MAX_NESTING {
            return Err(PdfError::SyntaxError(format!(
                "nesting deeper than {MAX_NESTING} at offset {}",
                self.tell()
            )));
        }
        Ok(())
    }

    /// Parse array contents until ]
    fn parse_array(&mut self, depth: usize) -> Result<PDFObject> {
        self.check_depth(depth)?;
        let mut arr = Vec::new();

        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if token == Token::Keyword(Keyword::ArrayEnd) {
                break;
            }
            arr.push(self.token_to_object(pos, token, depth)?);
        }

        Ok(PDFObject::Array(arr))
    }

    /// Parse dict contents until >>
    fn parse_dict(&mut self, depth: usize) -> Result<PDFObject> {
        self.check_depth(depth)?;
        let mut dict = Dict::new();

        loop {
            let (pos, token) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;

            let key = match token {
                Token::Keyword(Keyword::DictEnd) => break,
                Token::Literal(name) => name,
                _ => {
                    return Err(PdfError::TokenError {
                        pos,
                        msg: "expected name as dict key".into(),
                    });
                }
            };

            let (vpos, vtoken) = self.next_token()?.ok_or(PdfError::UnexpectedEof)?;
            if vtoken == Token::Keyword(Keyword::DictEnd) {
                // `/Key >>` - missing value, treat as null and close.
                dict.insert(key, PDFObject::Null);
                break;
            }
            let value = self.token_to_object(vpos, vtoken, depth)?;
            dict.insert(key, value);
        }

        Ok(PDFObject::Dict(dict))
    }
}

/// Parse one value starting at `offset`.
///
/// Returns the value and the number of bytes consumed from `offset`.
pub fn parse_value_at(data: &[u8], offset: usize) -> Result<(PDFObject, usize)> {
    if offset > data.len() {
        return Err(PdfError::UnexpectedEof);
    }
    let mut parser = PDFParser::at(data, offset);
    let value = parser.parse_object()?;
    Ok((value, parser.tell() - offset))
}

/// An `n g obj ... endobj` definition read from a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub objid: u32,
    pub genno: u16,
    pub value: PDFObject,
    /// Offset of the first stream byte, when the value is followed by `stream`.
    pub stm_ofs: Option<usize>,
    /// Offset just past `endobj`, or past the value when `endobj` is missing.
    /// For streams this is the stream start.
    pub end: usize,
    /// Whether `endobj` or `stream` was actually seen.
    pub terminated: bool,
}

fn header_int(parser: &mut PDFParser<'_>, offset: usize) -> Result<i64> {
    match parser.expect_token()? {
        Token::Int(n) => Ok(n),
        other => Err(PdfError::SyntaxError(format!(
            "expected object header at offset {offset}, got {other:?}"
        ))),
    }
}

/// Parse an indirect object definition at `offset`.
pub fn parse_indirect_at(data: &[u8], offset: usize) -> Result<IndirectObject> {
    if offset >= data.len() {
        return Err(PdfError::UnexpectedEof);
    }
    let mut parser = PDFParser::at(data, offset);

    let objid = header_int(&mut parser, offset)?;
    let genno = header_int(&mut parser, offset)?;
    let (Ok(objid), Ok(genno)) = (u32::try_from(objid), u16::try_from(genno)) else {
        return Err(PdfError::SyntaxError(format!(
            "object header out of range at offset {offset}"
        )));
    };
    match parser.expect_token()? {
        Token::Keyword(Keyword::Obj) => {}
        other => {
            return Err(PdfError::SyntaxError(format!(
                "expected 'obj' at offset {offset}, got {other:?}"
            )));
        }
    }

    // `n g obj endobj` is a null object.
    let value = match parser.peek_token()? {
        Some(Token::Keyword(Keyword::EndObj)) => PDFObject::Null,
        Some(_) => parser.parse_object()?,
        None => return Err(PdfError::UnexpectedEof),
    };

    let before_trailer = parser.tell();
    match parser.next_token()? {
        Some((_, Token::Keyword(Keyword::Stream))) => {
            let stm_ofs = skip_stream_eol(data, parser.tell());
            Ok(IndirectObject {
                objid,
                genno,
                value,
                stm_ofs: Some(stm_ofs),
                end: stm_ofs,
                terminated: true,
            })
        }
        Some((_, Token::Keyword(Keyword::EndObj))) => Ok(IndirectObject {
            objid,
            genno,
            value,
            stm_ofs: None,
            end: parser.tell(),
            terminated: true,
        }),
        _ => Ok(IndirectObject {
            objid,
            genno,
            value,
            stm_ofs: None,
            end: before_trailer,
            terminated: false,
        }),
    }
}

/// Step over the end-of-line marker that follows the `stream` keyword.
///
/// Accepts CRLF, LF, and (leniently) a lone CR or spaces before the EOL.
pub fn skip_stream_eol(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos) == Some(&b' ') {
        pos += 1;
    }
    match (data.get(pos), data.get(pos + 1)) {
        (Some(b'\r'), Some(b'\n')) => pos + 2,
        (Some(b'\n' | b'\r'), _) => pos + 1,
        _ => pos,
    }
}

/// Find the start of `endstream` at or after `from`, trimmed of the EOL
/// that precedes it. Returns (data_end, keyword_end).
pub fn find_endstream(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let needle = b"endstream";
    let hay = data.get(from..)?;
    let rel = hay.windows(needle.len()).position(|w| w == needle)?;
    let kw = from + rel;
    let mut end = kw;
    while end > from && matches!(data[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    Some((end, kw + needle.len()))
}

/// Position just past an `endobj` following `pos` (whitespace allowed), if any.
pub fn skip_endobj(data: &[u8], mut pos: usize) -> Option<usize> {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    data.get(pos..)?
        .starts_with(b"endobj")
        .then_some(pos + b"endobj".len())
}

/// Byte range of stream data starting at `stm_ofs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamExtent {
    pub start: usize,
    pub end: usize,
    /// The declared length could not be honoured: the data runs out, or
    /// `endstream` shows up before the declared end.
    pub truncated: bool,
}

/// Work out where stream data ends.
///
/// A declared length is trusted when `endstream` follows it. Otherwise the
/// data is measured up to the next `endstream`; if that comes before the
/// declared end, or the source ends first, the extent is flagged truncated.
pub fn stream_extent(data: &[u8], stm_ofs: usize, length: Option<usize>) -> StreamExtent {
    let start = stm_ofs.min(data.len());
    let Some(length) = length else {
        return match find_endstream(data, start) {
            Some((end, _)) => StreamExtent {
                start,
                end,
                truncated: false,
            },
            None => StreamExtent {
                start,
                end: data.len(),
                truncated: true,
            },
        };
    };

    let declared_end = start.saturating_add(length);
    if declared_end <= data.len() && endstream_follows(data, declared_end) {
        return StreamExtent {
            start,
            end: declared_end,
            truncated: false,
        };
    }
    match find_endstream(data, start) {
        Some((end, _)) if end < declared_end => StreamExtent {
            start,
            end,
            truncated: true,
        },
        // /Length is short: measure up to the keyword instead.
        Some((end, _)) => StreamExtent {
            start,
            end,
            truncated: false,
        },
        None if declared_end > data.len() => StreamExtent {
            start,
            end: data.len(),
            truncated: true,
        },
        None => StreamExtent {
            start,
            end: declared_end,
            truncated: false,
        },
    }
}

fn endstream_follows(data: &[u8], mut pos: usize) -> bool {
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    data.get(pos..).is_some_and(|rest| rest.starts_with(b"endstream"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_references_and_plain_integers() {
        let (obj, used) = parse_value_at(b"[1 0 R 2 3 4 R 5]", 0).unwrap();
        assert_eq!(
            obj,
            PDFObject::Array(vec![
                PDFObject::reference(1, 0),
                PDFObject::Int(2),
                PDFObject::reference(3, 4),
                PDFObject::Int(5),
            ])
        );
        assert_eq!(used, 17);
    }

    #[test]
    fn consumed_length_stops_before_lookahead() {
        let data = b"  12 13 endobj";
        let (obj, used) = parse_value_at(data, 0).unwrap();
        assert_eq!(obj, PDFObject::Int(12));
        assert_eq!(&data[used..], b"13 endobj");
    }

    #[test]
    fn reads_indirect_object_with_stream() {
        let data = b"7 0 obj\n<< /Length 3 >>\nstream\r\nabc\nendstream\nendobj\n";
        let ind = parse_indirect_at(data, 0).unwrap();
        assert_eq!(ind.objid, 7);
        assert_eq!(ind.genno, 0);
        assert!(ind.terminated);
        let stm = ind.stm_ofs.unwrap();
        assert_eq!(&data[stm..stm + 3], b"abc");
        let (end, after) = find_endstream(data, stm).unwrap();
        assert_eq!(end, stm + 3);
        assert_eq!(skip_endobj(data, after), Some(data.len() - 1));
    }

    #[test]
    fn empty_object_is_null() {
        let ind = parse_indirect_at(b"3 0 obj endobj", 0).unwrap();
        assert_eq!(ind.value, PDFObject::Null);
        assert!(ind.terminated);
    }

    #[test]
    fn missing_endobj_is_reported() {
        let ind = parse_indirect_at(b"3 0 obj 42", 0).unwrap();
        assert_eq!(ind.value, PDFObject::Int(42));
        assert!(!ind.terminated);
    }

    #[test]
    fn missing_dict_value_becomes_null() {
        let (obj, _) = parse_value_at(b"<< /A 1 /B >>", 0).unwrap();
        assert_eq!(obj.get("B"), Some(&PDFObject::Null));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let data = vec![b'['; MAX_NESTING + 5];
        assert!(parse_value_at(&data, 0).is_err());
    }

    #[test]
    fn stream_extent_cases() {
        let data = b"abcdef\nendstream\nendobj";
        // Declared length matches.
        assert_eq!(
            stream_extent(data, 0, Some(6)),
            StreamExtent { start: 0, end: 6, truncated: false }
        );
        // Declared length runs past endstream.
        assert_eq!(
            stream_extent(data, 0, Some(40)),
            StreamExtent { start: 0, end: 6, truncated: true }
        );
        // Short length is measured up to the keyword.
        assert!(!stream_extent(data, 0, Some(3)).truncated);
        assert_eq!(stream_extent(data, 0, Some(3)).end, 6);
        // Missing length and missing keyword.
        assert_eq!(
            stream_extent(b"abc", 0, None),
            StreamExtent { start: 0, end: 3, truncated: true }
        );
        assert_eq!(
            stream_extent(b"abc", 0, Some(10)),
            StreamExtent { start: 0, end: 3, truncated: true }
        );
    }
}
