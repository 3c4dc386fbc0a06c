use std::str::FromStr;

use thiserror::Error;

pub mod avro;
pub mod csv;
pub mod json;
pub mod sqlite;
pub mod types;

pub use sqlite::Db;
pub use types::{Cell, Column, Kind};

#[derive(Error, Debug)]
pub enum Error {
    /// A declared column type no classification rule recognizes.
    #[error("unknown column type: {0}")]
    UnknownType(String),

    /// Extracting or converting a single cell failed. Fatal for the run;
    /// rows already written stay in place.
    #[error("column {column}: {detail}")]
    Scan { column: String, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Avro error: {0}")]
    Avro(#[from] Box<apache_avro::Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<apache_avro::Error> for Error {
    fn from(e: apache_avro::Error) -> Self {
        Error::Avro(Box::new(e))
    }
}

/// Resolved output options, shared by all encoders. The separator and
/// null-token settings only affect the CSV encoder; `date_epoch` selects
/// between epoch seconds and RFC 3339 in the JSON and CSV encoders (Avro
/// always uses the logical-type integer encodings).
#[derive(Debug, Clone)]
pub struct Config {
    pub field_sep: String,
    pub row_sep: String,
    pub null_string: String,
    pub date_epoch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            field_sep: "\t".into(),
            row_sep: "\n".into(),
            null_string: "\\N".into(),
            date_epoch: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
    Avro,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            "avro" => Ok(Format::Avro),
            _ => Err(Error::Config(format!(
                "unknown format '{}', expected 'json', 'csv' or 'avro'",
                s
            ))),
        }
    }
}

/// One encoder instance serves exactly one result set: it is constructed
/// from that result set's column descriptors, consumes rows one at a time,
/// and flushes on `finish`.
pub trait RowSink {
    fn write_row(&mut self, row: &[Cell]) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}
