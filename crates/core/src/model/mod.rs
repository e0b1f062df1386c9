//! PDF model types.
//!
//! - `objects` - PDF value graph (PDFObject, PDFObjRef, Dict)

pub mod objects;

// Re-export main types for convenience
pub use objects::{Dict, PDFObjRef, PDFObject};
