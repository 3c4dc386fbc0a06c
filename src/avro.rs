use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use apache_avro::types::Value;
use apache_avro::{Codec, Schema, Writer};
use log::debug;
use serde_json::json;

use crate::types::{Cell, Column, Kind};
use crate::{Error, Result, RowSink};

type Convert = fn(&Cell) -> std::result::Result<Value, String>;

/// Builds the one record schema used for an entire result set.
pub fn build_schema(columns: &[Column]) -> Result<Schema> {
    Ok(Schema::parse(&schema_document(columns))?)
}

fn schema_document(columns: &[Column]) -> serde_json::Value {
    let mut first_decimal = None;
    let fields: Vec<_> = columns
        .iter()
        .map(|c| field_document(c, &mut first_decimal))
        .collect();
    json!({
        "namespace": "bqdump",
        "type": "record",
        "name": "tbl",
        "fields": fields,
    })
}

fn field_document(
    column: &Column,
    first_decimal: &mut Option<(u16, u16)>,
) -> serde_json::Value {
    let name = &column.name;
    match column.kind {
        Kind::Date => json!({"name": name, "type": ["int", "null"], "logicalType": "date"}),
        Kind::Timestamp => {
            json!({"name": name, "type": ["long", "null"], "logicalType": "timestamp-millis"})
        }
        Kind::Decimal { precision, scale } => {
            // The first decimal column pins precision and scale for every
            // decimal field in the schema; later decimal columns are written
            // under it unchanged, so schema-aware readers will misread ones
            // that declared something else.
            let (p, s) = *first_decimal.get_or_insert((precision, scale));
            json!({
                "name": name,
                "type": ["bytes", "null"],
                "logicalType": "decimal",
                "scale": s,
                "precision": p,
            })
        }
        Kind::Float => json!({"name": name, "type": ["double", "null"]}),
        Kind::Integer => json!({"name": name, "type": ["long", "null"]}),
        Kind::Binary => json!({"name": name, "type": ["bytes", "null"]}),
        Kind::Text => json!({"name": name, "type": ["string", "null"]}),
    }
}

/// Object-container encoder. Rows go either into a single snappy-compressed
/// container on the given writer, or into a sequence of `part-NNNNNN.avro`
/// files that roll over after a fixed number of rows.
pub struct AvroSink<'a, W: Write> {
    names: Vec<String>,
    converters: Vec<Convert>,
    out: Out<'a, W>,
}

enum Out<'a, W: Write> {
    Stream(Option<Writer<'a, W>>),
    Parts {
        schema: &'a Schema,
        dir: PathBuf,
        limit: u64,
        index: u64,
        rows_in_file: u64,
        writer: Option<Writer<'a, File>>,
    },
}

impl<'a, W: Write> AvroSink<'a, W> {
    pub fn stream(schema: &'a Schema, columns: &[Column], out: W) -> Self {
        AvroSink {
            names: columns.iter().map(|c| c.name.clone()).collect(),
            converters: columns.iter().map(|c| select(c.kind)).collect(),
            out: Out::Stream(Some(Writer::with_codec(schema, out, Codec::Snappy))),
        }
    }
}

impl<'a> AvroSink<'a, File> {
    pub fn parts(
        schema: &'a Schema,
        columns: &[Column],
        dir: impl AsRef<Path>,
        limit: u64,
    ) -> Result<Self> {
        // The first part is opened up front, so even an empty result set
        // leaves one container carrying the schema.
        let dir = dir.as_ref().to_owned();
        let writer = open_part(schema, &dir, 0)?;
        Ok(AvroSink {
            names: columns.iter().map(|c| c.name.clone()).collect(),
            converters: columns.iter().map(|c| select(c.kind)).collect(),
            out: Out::Parts {
                schema,
                dir,
                limit,
                index: 1,
                rows_in_file: 0,
                writer: Some(writer),
            },
        })
    }
}

fn open_part<'a>(schema: &'a Schema, dir: &Path, index: u64) -> Result<Writer<'a, File>> {
    let path = dir.join(format!("part-{:06}.avro", index));
    debug!("opening {}", path.display());
    let file = File::create(path)?;
    Ok(Writer::with_codec(schema, file, Codec::Snappy))
}

impl<W: Write> RowSink for AvroSink<'_, W> {
    fn write_row(&mut self, row: &[Cell]) -> Result<()> {
        let mut fields = Vec::with_capacity(row.len());
        for ((name, convert), cell) in self.names.iter().zip(&self.converters).zip(row) {
            let value = match cell {
                Cell::Null => Value::Union(1, Box::new(Value::Null)),
                cell => {
                    let value = convert(cell).map_err(|detail| Error::Scan {
                        column: name.clone(),
                        detail,
                    })?;
                    Value::Union(0, Box::new(value))
                }
            };
            fields.push((name.clone(), value));
        }
        let record = Value::Record(fields);
        match &mut self.out {
            Out::Stream(writer) => {
                writer
                    .as_mut()
                    .expect("row written after finish")
                    .append(record)?;
            }
            Out::Parts {
                schema,
                dir,
                limit,
                index,
                rows_in_file,
                writer,
            } => {
                if *rows_in_file >= *limit {
                    if let Some(full) = writer.take() {
                        full.into_inner()?;
                    }
                    *writer = Some(open_part(*schema, dir, *index)?);
                    *index += 1;
                    *rows_in_file = 0;
                }
                writer
                    .as_mut()
                    .expect("row written after finish")
                    .append(record)?;
                *rows_in_file += 1;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match &mut self.out {
            Out::Stream(writer) => {
                if let Some(writer) = writer.take() {
                    let mut inner = writer.into_inner()?;
                    inner.flush()?;
                }
            }
            Out::Parts { writer, .. } => {
                if let Some(writer) = writer.take() {
                    writer.into_inner()?;
                }
            }
        }
        Ok(())
    }
}

fn select(kind: Kind) -> Convert {
    match kind {
        Kind::Integer => long,
        Kind::Float => double,
        Kind::Decimal { .. } => decimal,
        Kind::Date => date,
        Kind::Timestamp => timestamp,
        Kind::Binary => bytes,
        Kind::Text => string,
    }
}

fn long(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Integer(n) => Ok(Value::Long(*n)),
        Cell::Bool(b) => Ok(Value::Long(i64::from(*b))),
        other => Err(mismatch(other)),
    }
}

fn double(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Float(x) => Ok(Value::Double(*x)),
        Cell::Integer(n) => Ok(Value::Double(*n as f64)),
        other => Err(mismatch(other)),
    }
}

// The container value is the raw textual representation; the schema-level
// decimal annotation is advisory for readers.
fn decimal(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Decimal(s) => Ok(Value::Bytes(s.clone().into_bytes())),
        other => Err(mismatch(other)),
    }
}

fn date(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Instant(dt) => Ok(Value::Int(
            dt.and_utc().timestamp().div_euclid(86_400) as i32
        )),
        other => Err(mismatch(other)),
    }
}

fn timestamp(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Instant(dt) => Ok(Value::Long(dt.and_utc().timestamp_millis())),
        other => Err(mismatch(other)),
    }
}

fn bytes(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Bytes(b) => Ok(Value::Bytes(b.clone())),
        other => Err(mismatch(other)),
    }
}

fn string(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Text(s) => Ok(Value::String(s.clone())),
        other => Err(mismatch(other)),
    }
}

fn mismatch(cell: &Cell) -> String {
    format!("cannot encode {:?} here", cell)
}
