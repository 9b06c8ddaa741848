//! CSV rows as documents.

use std::io::{self, Read, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use ragpipe_shared::{Document, Meta, RagPipeError, Result};

/// Column every expenses row must carry.
pub const DATE_COLUMN: &str = "Date";

/// Load a CSV file, one document per row.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_csv_documents(path: &Path) -> Result<Vec<Document>> {
    let file = std::fs::File::open(path).map_err(|e| RagPipeError::io(path, e))?;
    let docs = csv_documents(file)?;
    debug!(rows = docs.len(), "loaded CSV rows");
    Ok(docs)
}

/// JSON with `", "` between items and `": "` after keys, the layout
/// Python's `json.dumps` produces by default.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn spaced_json(row: &Map<String, Value>) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    row.serialize(&mut serializer)?;
    // serde_json only ever writes UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read CSV from any reader.
///
/// A row's content is its JSON object (columns in header order, spaced
/// like `{"Date": "2023-04-02", "Amount": "1200"}`); its metadata holds
/// `date` from the `Date` column and a fresh UUID `id`.
pub fn csv_documents<R: Read>(reader: R) -> Result<Vec<Document>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| RagPipeError::parse(format!("failed to read CSV header: {e}")))?
        .clone();
    let date_idx = headers
        .iter()
        .position(|h| h == DATE_COLUMN)
        .ok_or_else(|| {
            RagPipeError::validation(format!("CSV header has no '{DATE_COLUMN}' column"))
        })?;

    let mut documents = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| RagPipeError::parse(format!("CSV row {}: {e}", line + 1)))?;

        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        let content = spaced_json(&row)
            .map_err(|e| RagPipeError::parse(format!("CSV row {}: {e}", line + 1)))?;

        let mut meta = Meta::new();
        let date = record.get(date_idx).unwrap_or_default();
        meta.insert("date".into(), Value::String(date.to_string()));
        meta.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        documents.push(Document::with_meta(content, meta));
    }
    Ok(documents)
}
