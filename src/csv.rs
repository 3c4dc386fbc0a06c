use std::io::Write;

use chrono::SecondsFormat;

use crate::types::{Cell, Column, Kind};
use crate::{Config, Error, Result, RowSink};

type Field = fn(&Cell, &Config) -> std::result::Result<Vec<u8>, String>;

/// Delimited-text encoder: a header record of column names, then one record
/// per row. Fields are emitted verbatim, with no quoting or escaping, so a
/// separator embedded in the data ends up in the output as-is.
pub struct CsvSink<W> {
    out: W,
    config: Config,
    names: Vec<String>,
    fields: Vec<Field>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(config: &Config, columns: &[Column], out: W) -> Result<Self> {
        let mut sink = CsvSink {
            out,
            config: config.clone(),
            names: columns.iter().map(|c| c.name.clone()).collect(),
            fields: columns.iter().map(|c| select(c.kind, config)).collect(),
        };
        sink.write_header()?;
        Ok(sink)
    }

    fn write_header(&mut self) -> Result<()> {
        for (i, name) in self.names.iter().enumerate() {
            if i != 0 {
                self.out.write_all(self.config.field_sep.as_bytes())?;
            }
            self.out.write_all(name.as_bytes())?;
        }
        self.out.write_all(self.config.row_sep.as_bytes())?;
        Ok(())
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn write_row(&mut self, row: &[Cell]) -> Result<()> {
        for (i, (field, cell)) in self.fields.iter().zip(row).enumerate() {
            if i != 0 {
                self.out.write_all(self.config.field_sep.as_bytes())?;
            }
            match cell {
                Cell::Null => self.out.write_all(self.config.null_string.as_bytes())?,
                cell => {
                    let bytes = field(cell, &self.config).map_err(|detail| Error::Scan {
                        column: self.names[i].clone(),
                        detail,
                    })?;
                    self.out.write_all(&bytes)?;
                }
            }
        }
        self.out.write_all(self.config.row_sep.as_bytes())?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn select(kind: Kind, config: &Config) -> Field {
    match kind {
        Kind::Integer | Kind::Float => number,
        Kind::Decimal { .. } => decimal,
        Kind::Binary => bytes,
        Kind::Text => text,
        Kind::Date | Kind::Timestamp => {
            if config.date_epoch {
                instant_epoch
            } else {
                instant_rfc3339
            }
        }
    }
}

fn number(cell: &Cell, _: &Config) -> std::result::Result<Vec<u8>, String> {
    match cell {
        Cell::Integer(n) => Ok(n.to_string().into_bytes()),
        Cell::Float(x) => Ok(x.to_string().into_bytes()),
        Cell::Bool(true) => Ok(b"1".to_vec()),
        Cell::Bool(false) => Ok(b"0".to_vec()),
        other => Err(mismatch(other)),
    }
}

fn decimal(cell: &Cell, _: &Config) -> std::result::Result<Vec<u8>, String> {
    match cell {
        Cell::Decimal(s) => Ok(s.clone().into_bytes()),
        other => Err(mismatch(other)),
    }
}

fn bytes(cell: &Cell, _: &Config) -> std::result::Result<Vec<u8>, String> {
    match cell {
        Cell::Bytes(b) => Ok(b.clone()),
        other => Err(mismatch(other)),
    }
}

fn text(cell: &Cell, _: &Config) -> std::result::Result<Vec<u8>, String> {
    match cell {
        Cell::Text(s) => Ok(s.clone().into_bytes()),
        other => Err(mismatch(other)),
    }
}

fn instant_epoch(cell: &Cell, _: &Config) -> std::result::Result<Vec<u8>, String> {
    match cell {
        Cell::Instant(dt) => Ok(dt.and_utc().timestamp().to_string().into_bytes()),
        other => Err(mismatch(other)),
    }
}

fn instant_rfc3339(cell: &Cell, _: &Config) -> std::result::Result<Vec<u8>, String> {
    match cell {
        Cell::Instant(dt) => Ok(dt
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .into_bytes()),
        other => Err(mismatch(other)),
    }
}

fn mismatch(cell: &Cell) -> String {
    format!("cannot encode {:?} here", cell)
}
