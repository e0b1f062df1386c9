//! Benchmarks for index loading, object resolution and repair.
//!
//! Documents are generated in memory so the numbers do not depend on
//! fixture files:
//! - `open`: stored index parse plus `/Root` check
//! - `resolve`: every object through a cold and a warm cache
//! - `repair`: full scan of a file whose index is missing

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use pdfxref_core::{MemorySource, PDFDocument, PDFObject};

/// A document with a catalog, a page tree and `count` small dictionaries,
/// each pointing at the next. With `indexed` unset no xref table is written.
fn synthetic_pdf(count: u32, indexed: bool) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::with_capacity(count as usize + 3);
    let mut push = |out: &mut Vec<u8>, objid: u32, body: String| {
        offsets.push(out.len());
        out.extend_from_slice(format!("{objid} 0 obj\n{body}\nendobj\n").as_bytes());
    };
    push(&mut out, 1, "<< /Type /Catalog /Pages 2 0 R >>".into());
    push(&mut out, 2, "<< /Type /Pages /Kids [] /Count 0 >>".into());
    for objid in 3..count + 3 {
        let next = if objid + 1 < count + 3 { objid + 1 } else { 3 };
        push(
            &mut out,
            objid,
            format!("<< /Index {objid} /Next {next} 0 R /Name (item {objid}) /Box [0 0 612 792] >>"),
        );
    }
    if indexed {
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", count + 3).as_bytes());
        for ofs in &offsets {
            out.extend_from_slice(format!("{ofs:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
                count + 3
            )
            .as_bytes(),
        );
    }
    out
}

fn open(data: &[u8]) -> PDFDocument {
    PDFDocument::open(MemorySource::new(data.to_vec())).expect("synthetic document opens")
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");
    for count in [100u32, 10_000] {
        let data = synthetic_pdf(count, true);
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| open(black_box(data)))
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let data = synthetic_pdf(2_000, true);

    group.bench_function("cold_all_objects", |b| {
        b.iter_batched(
            || open(&data),
            |mut doc| {
                for objid in 1..doc.capacity() {
                    black_box(doc.load_object(objid));
                }
            },
            criterion::BatchSize::LargeInput,
        )
    });

    let mut doc = open(&data);
    group.bench_function("warm_chain", |b| {
        b.iter(|| {
            let mut next = PDFObject::reference(3, 0);
            for _ in 0..100 {
                let value = doc.resolve_chain(black_box(&next));
                next = value.get("Next").cloned().unwrap_or(PDFObject::Null);
            }
            next
        })
    });
    group.finish();
}

fn bench_repair(c: &mut Criterion) {
    let mut group = c.benchmark_group("repair");
    for count in [100u32, 5_000] {
        let data = synthetic_pdf(count, false);
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| {
                let doc = open(black_box(data));
                assert!(doc.is_repaired());
                doc
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_open, bench_resolve, bench_repair);
criterion_main!(benches);
