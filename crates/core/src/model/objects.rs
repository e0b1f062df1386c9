//! PDF object value model.
//!
//! Values are plain data: an indirect reference is never resolved in place.
//! Resolution always goes through [`PDFDocument::resolve`], which is where
//! cycles and dangling references are detected and turned into `Null`.
//!
//! [`PDFDocument::resolve`]: crate::document::PDFDocument::resolve

use crate::error::{PdfError, Result};
use indexmap::IndexMap;
use std::fmt;

/// Dictionary type. Keeps insertion order so dumps follow the file.
pub type Dict = IndexMap<String, PDFObject>;

/// PDF Object types - the fundamental value type in PDF.
///
/// Stream objects are represented by their dictionary; the stream bytes
/// live in the cross-reference entry and are read through the stream
/// accessors on the document.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PDFObject {
    /// Null object
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font)
    Name(String),
    /// String (byte array)
    String(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dict),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    /// Build a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Build a reference object.
    pub const fn reference(objid: u32, genno: u16) -> Self {
        Self::Ref(PDFObjRef::new(objid, genno))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this is an indirect reference
    pub const fn is_indirect(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(self.type_error("bool")),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(self.type_error("int")),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(self.type_error("number")),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(self.type_error("name")),
        }
    }

    /// Get as byte string
    pub fn as_string(&self) -> Result<&[u8]> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(self.type_error("array")),
        }
    }

    /// Get as dictionary
    pub const fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(self.type_error("dict")),
        }
    }

    /// Get as mutable dictionary
    pub const fn as_dict_mut(&mut self) -> Result<&mut Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(self.type_error("dict")),
        }
    }

    /// Get as object reference
    pub const fn as_objref(&self) -> Result<PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(self.type_error("ref")),
        }
    }

    /// Look up a key when this is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Dict(d) => d.get(key),
            _ => None,
        }
    }

    /// True when this is a dictionary whose `/Type` is `ty`.
    pub fn is_type(&self, ty: &str) -> bool {
        matches!(self.get("Type"), Some(Self::Name(name)) if name == ty)
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Ref(_) => "ref",
        }
    }

    const fn type_error(&self, expected: &'static str) -> PdfError {
        PdfError::TypeError {
            expected,
            got: self.type_name(),
        }
    }
}

impl From<bool> for PDFObject {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PDFObject {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PDFObject {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<PDFObjRef> for PDFObject {
    fn from(value: PDFObjRef) -> Self {
        Self::Ref(value)
    }
}

impl From<Dict> for PDFObject {
    fn from(value: Dict) -> Self {
        Self::Dict(value)
    }
}

impl From<Vec<Self>> for PDFObject {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(value)
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PDFObjRef {
    /// Object number
    pub objid: u32,
    /// Generation number
    pub genno: u16,
}

impl PDFObjRef {
    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u16) -> Self {
        Self { objid, genno }
    }
}

impl fmt::Display for PDFObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.objid, self.genno)
    }
}

/// Serializes the value in PDF syntax.
impl fmt::Display for PDFObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Real(n) => write_real(f, *n),
            Self::Name(name) => write_name(f, name),
            Self::String(s) => write_string(f, s),
            Self::Array(arr) => {
                f.write_str("[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Dict(dict) => {
                f.write_str("<<")?;
                for (key, value) in dict {
                    f.write_str(" ")?;
                    write_name(f, key)?;
                    write!(f, " {value}")?;
                }
                f.write_str(" >>")
            }
            Self::Ref(r) => write!(f, "{r}"),
        }
    }
}

fn write_real(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return write!(f, "{}", n as i64);
    }
    let s = format!("{n:.6}");
    f.write_str(s.trim_end_matches('0').trim_end_matches('.'))
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    f.write_str("/")?;
    for &b in name.as_bytes() {
        let regular = b > b' '
            && b < 0x7f
            && b != b'#'
            && !matches!(
                b,
                b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
            );
        if regular {
            write!(f, "{}", b as char)?;
        } else {
            write!(f, "#{b:02X}")?;
        }
    }
    Ok(())
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &[u8]) -> fmt::Result {
    let printable = s
        .iter()
        .all(|&b| (b' '..0x7f).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'));
    if !printable {
        f.write_str("<")?;
        for b in s {
            write!(f, "{b:02X}")?;
        }
        return f.write_str(">");
    }
    f.write_str("(")?;
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => write!(f, "\\{}", b as char)?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            _ => write!(f, "{}", b as char)?,
        }
    }
    f.write_str(")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_pdf_syntax() {
        let mut dict = Dict::new();
        dict.insert("Type".into(), PDFObject::name("Catalog"));
        dict.insert("Pages".into(), PDFObject::reference(2, 0));
        dict.insert("Title".into(), PDFObject::String(b"a (b)".to_vec()));
        dict.insert("Odd Name".into(), PDFObject::Real(0.5));
        let text = PDFObject::Dict(dict).to_string();
        assert_eq!(
            text,
            "<< /Type /Catalog /Pages 2 0 R /Title (a \\(b\\)) /Odd#20Name 0.5 >>"
        );
    }

    #[test]
    fn binary_strings_are_written_as_hex() {
        let obj = PDFObject::String(vec![0x00, 0xff]);
        assert_eq!(obj.to_string(), "<00FF>");
    }

    #[test]
    fn accessors_report_type_mismatch() {
        let obj = PDFObject::Int(3);
        match obj.as_dict() {
            Err(PdfError::TypeError { expected, got }) => {
                assert_eq!(expected, "dict");
                assert_eq!(got, "int");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(obj.as_num().unwrap(), 3.0);
    }

    #[test]
    fn dict_equality_ignores_key_order() {
        let mut a = Dict::new();
        a.insert("A".into(), PDFObject::Int(1));
        a.insert("B".into(), PDFObject::Int(2));
        let mut b = Dict::new();
        b.insert("B".into(), PDFObject::Int(2));
        b.insert("A".into(), PDFObject::Int(1));
        assert_eq!(PDFObject::Dict(a), PDFObject::Dict(b));
    }
}
