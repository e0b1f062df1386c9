//! PDF syntax parsing.
//!
//! - `lexer`: byte-level tokenizer
//! - `pdf_parser`: object parser and indirect object reader

pub mod lexer;
pub mod pdf_parser;

pub use lexer::{Keyword, Lexer, Token};
pub use pdf_parser::{
    IndirectObject, PDFParser, StreamExtent, find_endstream, parse_indirect_at, parse_value_at,
    skip_endobj, stream_extent,
};
