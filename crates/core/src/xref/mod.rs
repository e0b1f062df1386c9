//! The cross-reference index: entries, layered revisions, and the reader
//! for `xref` sections stored in a file.

pub mod entry;
pub mod loader;
pub mod table;

pub use entry::{Entry, EntryKind};
pub use table::{
    MAX_OBJECT_NUMBER, Revision, RevisionOrigin, Signer, Subsection, UnsavedSignature, XrefTable,
};
