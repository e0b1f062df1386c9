mod common;

use common::{FixtureBuilder, deflate, open, simple_pdf};
use pdfxref_core::{
    Dict, EntryKind, PDFObjRef, PDFObject, PdfError, RevisionOrigin, Signer,
};
use std::sync::Arc;

#[derive(Debug)]
struct FixedSigner(usize);

impl Signer for FixedSigner {
    fn max_digest_size(&self) -> usize {
        self.0
    }
}

fn with_object_stream() -> Vec<u8> {
    let mut b = FixtureBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object_stream(10, &[(3, "<< /Packed 3 >>"), (4, "<< /Packed 4 >>")], true);
    b.xref_stream(11, "/Root 1 0 R");
    b.build()
}

#[test]
fn create_update_and_delete() {
    let mut doc = open(simple_pdf());
    assert_eq!(doc.capacity(), 5);

    let objid = doc.create_object().unwrap();
    assert_eq!(objid, 5);
    assert_eq!(doc.capacity(), 6);
    assert_eq!(*doc.load_object(objid), PDFObject::Null);
    assert!(doc.entry(objid).is_edit());

    doc.update_object(objid, PDFObject::Int(1)).unwrap();
    assert_eq!(*doc.load_object(objid), PDFObject::Int(1));
    assert_eq!(doc.revisions().len(), 2);
    assert_eq!(doc.revisions()[1].origin, RevisionOrigin::Incremental);
    assert!(doc.is_incremental(objid));
    assert!(!doc.is_incremental(1));

    doc.delete_object(3).unwrap();
    assert_eq!(doc.entry(3).kind, EntryKind::Free { genno: 1 });
    assert_eq!(*doc.load_object(3), PDFObject::Null);
    // The stored revision is untouched.
    assert!(matches!(
        doc.revisions()[0].entry(3).unwrap().kind,
        EntryKind::InUse { offset: Some(_), .. }
    ));

    // Reusing a freed number keeps the bumped generation.
    doc.update_object(3, PDFObject::name("Again")).unwrap();
    assert_eq!(doc.reference(3), PDFObjRef::new(3, 1));
    assert_eq!(*doc.load_object(3), PDFObject::name("Again"));
}

#[test]
fn numbers_outside_the_table_are_rejected() {
    let mut doc = open(simple_pdf());
    for objid in [0, 5, 1000] {
        let err = doc.update_object(objid, PDFObject::Null).unwrap_err();
        assert!(matches!(err, PdfError::InvalidObjectNumber(n) if n == objid));
    }
    assert!(matches!(
        doc.delete_object(0),
        Err(PdfError::InvalidObjectNumber(0))
    ));
    assert!(doc.populating_entry_mut(9_000_000).is_err());
    // Nothing was pushed for the failed edits.
    assert_eq!(doc.revisions().len(), 1);
}

#[test]
fn updating_a_member_solidifies_it() {
    let mut doc = open(with_object_stream());
    doc.update_object(3, PDFObject::Int(33)).unwrap();

    assert!(matches!(
        doc.entry(3).kind,
        EntryKind::InUse { offset: None, .. }
    ));
    assert_eq!(*doc.load_object(3), PDFObject::Int(33));
    // Its sibling stays in the container.
    assert_eq!(doc.entry(4).kind, EntryKind::Compressed { container: 10, index: 1 });

    let before = doc.load_object(4);
    doc.ensure_solid_object(4).unwrap();
    assert!(!doc.entry(4).is_compressed());
    assert_eq!(*doc.load_object(4), *before);

    // Standalone objects are left alone.
    doc.ensure_solid_object(1).unwrap();
    assert_eq!(doc.entry(1).offset(), doc.revisions()[0].entry(1).unwrap().offset());
}

#[test]
fn broken_container_is_unsolidifiable() {
    let mut b = FixtureBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(10, "(not a container)")
        .compressed(3, 10, 0);
    b.xref_stream(11, "/Root 1 0 R");
    let mut doc = open(b.build());

    let err = doc.update_object(3, PDFObject::Int(1)).unwrap_err();
    assert!(matches!(err, PdfError::Unsolidifiable { objid: 3 }));
    assert!(doc.entry(3).is_compressed());
}

#[test]
fn editing_a_stream_dictionary_keeps_its_data() {
    let mut doc = open(simple_pdf());
    let mut dict = Dict::new();
    dict.insert("Marked".into(), PDFObject::Bool(true));
    doc.update_object(4, PDFObject::Dict(dict)).unwrap();

    assert_eq!(doc.load_object(4).get("Marked"), Some(&PDFObject::Bool(true)));
    assert_eq!(
        doc.load_stream_number(4).unwrap(),
        b"BT /F1 12 Tf (Hello) Tj ET"
    );
}

#[test]
fn added_streams_are_readable() {
    let mut doc = open(simple_pdf());
    let plain = doc.add_stream(b"abc".to_vec(), None, false).unwrap();
    let plain = PDFObject::Ref(plain);
    assert_eq!(doc.load_stream(&plain).unwrap(), b"abc");
    assert_eq!(
        doc.resolve_chain(&plain).get("Length"),
        Some(&PDFObject::Int(3))
    );

    let mut dict = Dict::new();
    dict.insert("Filter".into(), PDFObject::name("FlateDecode"));
    let packed = doc
        .add_stream(deflate(b"packed text"), Some(dict), true)
        .unwrap();
    assert_eq!(packed.objid, 6);
    assert_eq!(
        doc.load_stream(&PDFObject::Ref(packed)).unwrap(),
        b"packed text"
    );
}

#[test]
fn clear_to_mark_rolls_back() {
    let mut doc = open(simple_pdf());
    doc.update_object(3, PDFObject::Int(1)).unwrap();
    let _ = doc.load_object(1);
    doc.mark();

    doc.update_object(3, PDFObject::Int(2)).unwrap();
    let created = doc.create_object().unwrap();
    let _ = doc.load_object(2);
    assert_eq!(doc.revisions().len(), 3);
    assert_eq!(*doc.load_object(3), PDFObject::Int(2));

    doc.clear_to_mark();
    assert_eq!(doc.revisions().len(), 2);
    assert_eq!(*doc.load_object(3), PDFObject::Int(1));
    assert!(doc.capacity() <= created);
    // Values cached before the mark stay; later ones are dropped.
    assert!(doc.entry(1).obj.is_some());
    assert!(doc.entry(2).obj.is_none());

    // Without a checkpoint nothing happens.
    doc.clear_to_mark();
    assert_eq!(doc.revisions().len(), 2);
    assert_eq!(*doc.load_object(3), PDFObject::Int(1));
}

#[test]
fn nested_marks_unwind_in_order() {
    let mut doc = open(simple_pdf());
    doc.mark();
    doc.update_object(3, PDFObject::Int(1)).unwrap();
    doc.mark();
    doc.update_object(3, PDFObject::Int(2)).unwrap();

    doc.clear_to_mark();
    assert_eq!(*doc.load_object(3), PDFObject::Int(1));
    doc.clear_to_mark();
    assert!(doc.load_object(3).is_type("Page"));
    assert_eq!(doc.revisions().len(), 1);
}

#[test]
fn outer_rollback_evicts_values_cached_between_marks() {
    let mut doc = open(simple_pdf());
    doc.clear();
    let _ = doc.load_object(1);
    doc.mark();
    let _ = doc.load_object(2);
    doc.mark();
    let _ = doc.load_object(3);

    doc.clear_to_mark();
    assert!(doc.entry(2).obj.is_some());
    assert!(doc.entry(3).obj.is_none());

    doc.clear_to_mark();
    assert!(doc.entry(1).obj.is_some());
    assert!(doc.entry(2).obj.is_none());

    // Stamps do not outlive their checkpoint.
    let _ = doc.load_object(2);
    doc.mark();
    doc.clear_to_mark();
    assert!(doc.entry(2).obj.is_some());
    doc.mark();
    doc.clear();
    let _ = doc.load_object(3);
    doc.clear_to_mark();
    assert!(doc.entry(3).obj.is_none());
}

#[test]
fn clear_keeps_edits() {
    let mut doc = open(simple_pdf());
    doc.update_object(3, PDFObject::Int(5)).unwrap();
    let _ = doc.load_object(2);
    doc.clear();

    assert!(doc.entry(2).obj.is_none());
    assert_eq!(*doc.load_object(3), PDFObject::Int(5));
    assert!(doc.load_object(2).is_type("Pages"));
}

#[test]
fn trailer_edits_go_to_the_new_revision() {
    let mut doc = open(simple_pdf());
    doc.trailer_mut()
        .insert("Info".into(), PDFObject::reference(3, 0));

    assert_eq!(
        doc.trailer().unwrap().get("Info"),
        Some(&PDFObject::reference(3, 0))
    );
    assert!(doc.trailer().unwrap().contains_key("Root"));
    let stored = doc.revisions()[0].trailer.as_ref().unwrap();
    assert!(!stored.contains_key("Info"));
}

#[test]
fn populating_a_revision() {
    let mut doc = open(simple_pdf());
    let entry = doc.populating_entry_mut(7).unwrap();
    entry.kind = EntryKind::Free { genno: 3 };
    assert_eq!(doc.capacity(), 8);

    let mut trailer = Dict::new();
    trailer.insert("Root".into(), PDFObject::reference(1, 0));
    trailer.insert("Marker".into(), PDFObject::Bool(true));
    doc.set_populating_trailer(trailer);
    assert!(doc.trailer().unwrap().contains_key("Marker"));
}

#[test]
fn unsaved_signatures_are_tracked() {
    let mut doc = open(simple_pdf());
    let field = PDFObjRef::new(3, 0);
    assert!(!doc.is_unsaved_signature(field));

    doc.store_unsaved_signature(field, Arc::new(FixedSigner(8192)));
    assert!(doc.is_unsaved_signature(field));
    assert!(!doc.is_unsaved_signature(PDFObjRef::new(4, 0)));
    assert_eq!(doc.unsaved_signatures().count(), 1);

    let taken = doc.take_unsaved_signatures();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].field, field);
    assert_eq!(taken[0].signer.max_digest_size(), 8192);
    assert!(!doc.is_unsaved_signature(field));
}
