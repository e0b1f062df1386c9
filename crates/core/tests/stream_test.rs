mod common;

use common::{FixtureBuilder, deflate, open};
use pdfxref_core::codec::FilterSpec;
use pdfxref_core::{Dict, PDFObject, PdfError};
use std::io::Cursor;

fn with_catalog() -> FixtureBuilder {
    let mut b = FixtureBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    b
}

#[test]
fn raw_and_decoded_flate_stream() {
    let text = b"q 1 0 0 1 72 720 cm BT (flate) Tj ET Q";
    let mut b = with_catalog();
    b.flate_stream(4, "", text);
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    let raw = doc.load_raw_stream_number(4).unwrap();
    assert_eq!(raw, deflate(text));
    assert_eq!(doc.load_stream_number(4).unwrap(), text);
    assert_eq!(doc.load_stream(&PDFObject::reference(4, 0)).unwrap(), text);
    assert_eq!(doc.load_raw_stream(&PDFObject::reference(4, 0)).unwrap(), raw);
}

#[test]
fn overlong_length_reports_truncation() {
    let mut b = with_catalog();
    b.stream_with_length(4, "", b"short", "100");
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    let (data, truncated) = doc.load_stream_truncated(4).unwrap();
    assert_eq!(data, b"short");
    assert!(truncated);

    let mut doc = open(common::simple_pdf());
    let (_, truncated) = doc.load_stream_truncated(4).unwrap();
    assert!(!truncated);
}

#[test]
fn stream_cut_off_at_end_of_file_is_truncated() {
    let mut b = with_catalog();
    b.raw(b"4 0 obj\n<< /Length 500 >>\nstream\nhello world");
    let mut doc = open(b.build());
    assert!(doc.is_repaired());

    let (data, truncated) = doc.load_stream_truncated(4).unwrap();
    assert!(truncated);
    assert!(data.len() <= 11);
    assert!(b"hello world".starts_with(&data));
}

#[test]
fn huge_predictor_columns_fail_to_decode() {
    let mut b = with_catalog();
    b.flate_stream(
        4,
        "/DecodeParms << /Predictor 12 /Columns 4611686018427387904 >>",
        &[2, 0, 0, 0],
    );
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    let err = doc.load_stream_number(4).unwrap_err();
    assert!(matches!(err, PdfError::DecodeError(_)));
    assert!(doc.load_raw_stream_number(4).is_ok());
}

#[test]
fn indirect_length_is_resolved() {
    let mut b = with_catalog();
    b.stream_with_length(4, "", b"indirect length data", "5 0 R")
        .object(5, "20");
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());
    assert_eq!(doc.load_stream_number(4).unwrap(), b"indirect length data");
}

#[test]
fn indirect_filter_name_is_resolved() {
    let mut b = with_catalog();
    let packed = deflate(b"indirect filter");
    b.stream(4, "/Filter 5 0 R", &packed).object(5, "/FlateDecode");
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());
    assert_eq!(doc.load_stream_number(4).unwrap(), b"indirect filter");
}

#[test]
fn image_codec_is_left_undecoded() {
    let jpeg = b"\xFF\xD8\xFF\xE0fake jpeg";
    let mut b = with_catalog();
    b.stream(4, "/Filter [/FlateDecode /DCTDecode]", &deflate(jpeg));
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    let compressed = doc.load_compressed_stream(4).unwrap();
    assert_eq!(compressed.data, jpeg);
    assert_eq!(
        compressed.filters,
        vec![FilterSpec {
            name: "DCTDecode".into(),
            params: None,
        }]
    );
    assert!(!compressed.truncated);

    let err = doc.load_stream_number(4).unwrap_err();
    assert!(matches!(err, PdfError::UnsupportedFilter(_)));
}

#[test]
fn inline_stream_with_abbreviated_filter() {
    let mut doc = open(common::simple_pdf());
    let mut dict = Dict::new();
    dict.insert("F".into(), PDFObject::name("AHx"));

    let mut cursor = Cursor::new(&b"48656C6C6F> EI"[..]);
    let data = doc.load_inline_stream(&dict, 11, &mut cursor).unwrap();
    assert_eq!(data, b"Hello");
    // Only `length` bytes are consumed.
    assert_eq!(cursor.position(), 11);

    dict.insert(
        "F".into(),
        PDFObject::Array(vec![PDFObject::name("AHx"), PDFObject::name("DCT")]),
    );
    let mut cursor = Cursor::new(&b"FFD8>"[..]);
    let image = doc
        .load_compressed_inline_stream(&dict, 40, &mut cursor)
        .unwrap();
    assert_eq!(image.data, vec![0xFF, 0xD8]);
    assert_eq!(image.filters[0].name, "DCTDecode");
    assert!(image.truncated);
}

#[test]
fn contents_array_is_joined_with_newlines() {
    let mut b = with_catalog();
    b.stream(4, "", b"part one")
        .flate_stream(5, "", b"part two")
        .object(6, "[4 0 R 5 0 R]")
        .object(7, "[4 0 R 99 0 R 5 0 R]");
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    let direct = PDFObject::Array(vec![PDFObject::reference(4, 0), PDFObject::reference(5, 0)]);
    assert_eq!(doc.open_contents_stream(&direct).unwrap(), b"part one\npart two");
    assert_eq!(
        doc.open_contents_stream(&PDFObject::reference(6, 0)).unwrap(),
        b"part one\npart two"
    );
    assert_eq!(
        doc.open_contents_stream(&PDFObject::reference(4, 0)).unwrap(),
        b"part one"
    );
    // A part that does not load is skipped.
    assert_eq!(
        doc.open_contents_stream(&PDFObject::reference(7, 0)).unwrap(),
        b"part one\npart two"
    );
    assert!(doc.open_contents_stream(&PDFObject::Null).unwrap().is_empty());
}

#[test]
fn non_stream_objects_are_type_errors() {
    let mut b = with_catalog();
    b.object(3, "(not a stream)");
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    for objid in [1, 3, 40] {
        let err = doc.load_stream_number(objid).unwrap_err();
        assert!(matches!(err, PdfError::TypeError { expected: "stream", .. }), "{objid}: {err:?}");
    }
    let err = doc.load_stream(&PDFObject::Int(3)).unwrap_err();
    assert!(matches!(err, PdfError::TypeError { expected: "ref", .. }));
    let err = doc.open_contents_stream(&PDFObject::Int(3)).unwrap_err();
    assert!(matches!(err, PdfError::TypeError { .. }));
}

#[test]
fn replaced_stream_data() {
    let mut b = with_catalog();
    b.flate_stream(4, "/Custom 1", b"original");
    b.xref_table("/Root 1 0 R");
    let mut doc = open(b.build());

    doc.update_stream(4, b"plain replacement".to_vec(), false).unwrap();
    let dict = doc.load_object(4);
    assert!(dict.get("Filter").is_none());
    assert_eq!(dict.get("Custom"), Some(&PDFObject::Int(1)));
    assert_eq!(dict.get("Length"), Some(&PDFObject::Int(17)));
    assert_eq!(doc.load_stream_number(4).unwrap(), b"plain replacement");
    assert_eq!(doc.load_raw_stream_number(4).unwrap(), b"plain replacement");

    let packed = deflate(b"packed replacement");
    doc.update_object(
        4,
        PDFObject::Dict(Dict::from_iter([(
            "Filter".to_string(),
            PDFObject::name("FlateDecode"),
        )])),
    )
    .unwrap();
    doc.update_stream(4, packed.clone(), true).unwrap();
    assert_eq!(doc.load_raw_stream_number(4).unwrap(), packed);
    assert_eq!(doc.load_stream_number(4).unwrap(), b"packed replacement");
}
