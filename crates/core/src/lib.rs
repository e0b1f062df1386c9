//! pdfxref - cross-reference and object store engine for PDF documents.
//!
//! Maps object numbers to their place in the file or in memory, resolves
//! indirect references, rebuilds broken indexes by scanning, and tracks
//! edits as incremental revisions layered over the stored index.

pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;
pub mod source;
pub mod xref;

pub use codec::{CryptMethod, Decryptor, FilterPipeline, StandardDecryptor, StandardFilters};
pub use document::{CompressedStream, DocumentOptions, PDFDocument, Progress};
pub use error::{PdfError, Result};
pub use model::{Dict, PDFObjRef, PDFObject};
pub use source::{ByteSource, MemorySource, ProgressiveSource};
pub use xref::{Entry, EntryKind, Revision, RevisionOrigin, Signer, UnsavedSignature, XrefTable};
