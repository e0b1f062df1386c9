//! xrefdump - inspect the cross-reference index of a PDF file
//!
//! Prints the layered revision list, the trailer, single objects or
//! stream bytes. Useful for looking at what repair made of a broken file.

use anyhow::{Context, bail};
use clap::{ArgAction, ArgGroup, Parser};
use pdfxref_core::{
    DocumentOptions, EntryKind, MemorySource, PDFDocument, PDFObject, Revision,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xrefdump")]
#[command(author, version, about = "Dump the cross-reference index of a PDF file", long_about = None)]
#[command(group(
    ArgGroup::new("stream_mode")
        .args(["raw", "decoded"])
))]
struct Args {
    /// Path to the PDF file
    file: PathBuf,

    /// Rebuild the index by scanning, even when the stored one is fine
    #[arg(long, action = ArgAction::SetTrue)]
    repair: bool,

    /// Do not fall back to repair when the stored index is broken
    #[arg(long = "no-repair", action = ArgAction::SetTrue, conflicts_with = "repair")]
    no_repair: bool,

    /// Print one resolved object
    #[arg(short = 'o', long = "object")]
    object: Option<u32>,

    /// Write the bytes of one stream object to stdout
    #[arg(short = 's', long = "stream")]
    stream: Option<u32>,

    /// Stream bytes as stored (encryption removed, filters kept)
    #[arg(long, action = ArgAction::SetTrue, requires = "stream")]
    raw: bool,

    /// Stream bytes with filters applied (the default)
    #[arg(long, action = ArgAction::SetTrue, requires = "stream")]
    decoded: bool,

    /// Print JSON instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// More logging (repeat for trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct EntryRow {
    objid: u32,
    kind: char,
    #[serde(skip_serializing_if = "Option::is_none")]
    genno: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
    edited: bool,
}

#[derive(Serialize)]
struct RevisionDump {
    revision: usize,
    origin: String,
    objects: u32,
    entries: Vec<EntryRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trailer: Option<Value>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// JSON rendering of a value. Strings become UTF-8 text when they are
/// valid UTF-8 and a hex string otherwise.
fn to_json(obj: &PDFObject) -> Value {
    match obj {
        PDFObject::Null => Value::Null,
        PDFObject::Bool(b) => json!(b),
        PDFObject::Int(n) => json!(n),
        PDFObject::Real(n) => json!(n),
        PDFObject::Name(name) => json!(format!("/{name}")),
        PDFObject::String(s) => match std::str::from_utf8(s) {
            Ok(text) => json!(text),
            Err(_) => json!({ "hex": hex::encode(s) }),
        },
        PDFObject::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        PDFObject::Dict(dict) => Value::Object(
            dict.iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
        PDFObject::Ref(r) => json!({ "ref": [r.objid, r.genno] }),
    }
}

fn dump_revision(index: usize, rev: &Revision) -> RevisionDump {
    let entries = rev
        .iter()
        .map(|(objid, entry)| {
            let mut row = EntryRow {
                objid,
                kind: entry.type_char(),
                genno: None,
                offset: None,
                container: None,
                index: None,
                edited: entry.is_edit(),
            };
            match entry.kind {
                EntryKind::Free { genno } => row.genno = Some(genno),
                EntryKind::InUse { offset, genno, .. } => {
                    row.genno = Some(genno);
                    row.offset = offset;
                }
                EntryKind::Compressed { container, index } => {
                    row.container = Some(container);
                    row.index = Some(index);
                }
                EntryKind::Unset => {}
            }
            row
        })
        .collect();
    RevisionDump {
        revision: index,
        origin: format!("{:?}", rev.origin),
        objects: rev.num_objects,
        entries,
        trailer: rev
            .trailer
            .as_ref()
            .map(|t| to_json(&PDFObject::Dict(t.clone()))),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let source = MemorySource::open(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let options = DocumentOptions::new().allow_repair(!args.no_repair);
    let mut doc = PDFDocument::open_with_options(source, options)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    if args.repair && !doc.is_repaired() {
        doc.repair().context("repair failed")?;
    }
    tracing::debug!(?doc, "opened document");

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Some(objid) = args.stream {
        if !matches!(&*doc.cache_object(objid), PDFObject::Dict(_)) {
            bail!("object {objid} is not a stream");
        }
        let data = if args.raw && !args.decoded {
            doc.load_raw_stream_number(objid)?
        } else {
            let (data, truncated) = doc.load_stream_truncated(objid)?;
            if truncated {
                tracing::warn!(objid, "stream is truncated");
            }
            data
        };
        out.write_all(&data)?;
    } else if let Some(objid) = args.object {
        let value = doc.cache_object(objid);
        if args.json {
            serde_json::to_writer_pretty(&mut out, &to_json(&value))?;
            writeln!(out)?;
        } else {
            let r = doc.reference(objid);
            writeln!(out, "{} {} obj\n{value}\nendobj", r.objid, r.genno)?;
        }
    } else if args.json {
        let revisions: Vec<RevisionDump> = doc
            .revisions()
            .iter()
            .enumerate()
            .map(|(i, rev)| dump_revision(i, rev))
            .collect();
        let report = json!({
            "repaired": doc.is_repaired(),
            "encrypted": doc.is_encrypted(),
            "capacity": doc.capacity(),
            "revisions": revisions,
        });
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        write!(out, "{}", doc.print_xref())?;
        if doc.is_repaired() {
            writeln!(out, "(index rebuilt by scanning)")?;
        }
    }

    out.flush()?;
    Ok(())
}
