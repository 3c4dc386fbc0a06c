use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::types::{Cell, Column, Kind};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Db { conn })
    }

    pub fn query(&self, sql: &str) -> Result<Query<'_>> {
        let stmt = self.conn.prepare(sql)?;
        Query::new(stmt)
    }
}

/// A prepared query plus its classified column descriptors. Columns are
/// resolved once, before the first row is fetched, so an unknown declared
/// type aborts with nothing written.
pub struct Query<'conn> {
    stmt: rusqlite::Statement<'conn>,
    columns: Vec<Column>,
}

impl<'conn> Query<'conn> {
    fn new(stmt: rusqlite::Statement<'conn>) -> Result<Self> {
        let columns = stmt
            .columns()
            .iter()
            .map(|c| {
                let decl = c.decl_type().ok_or_else(|| {
                    Error::UnknownType(format!("(untyped column {})", c.name()))
                })?;
                Column::new(c.name(), decl)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Query { stmt, columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&mut self) -> Result<RowStream<'_>> {
        Ok(RowStream {
            rows: self.stmt.query([])?,
            columns: &self.columns,
        })
    }
}

/// Pull-model cursor: yields one fully scanned row at a time.
pub struct RowStream<'stmt> {
    rows: rusqlite::Rows<'stmt>,
    columns: &'stmt [Column],
}

impl RowStream<'_> {
    pub fn next(&mut self) -> Result<Option<Vec<Cell>>> {
        let row = match self.rows.next()? {
            Some(row) => row,
            None => return Ok(None),
        };
        let mut cells = Vec::with_capacity(self.columns.len());
        for (i, column) in self.columns.iter().enumerate() {
            cells.push(scan_cell(column, row.get_ref(i)?)?);
        }
        Ok(Some(cells))
    }
}

fn scan_cell(column: &Column, value: ValueRef<'_>) -> Result<Cell> {
    let cell = match (column.kind, value) {
        (_, ValueRef::Null) => Cell::Null,
        (Kind::Integer, ValueRef::Integer(n)) => Cell::Integer(n),
        (Kind::Float, ValueRef::Real(x)) => Cell::Float(x),
        (Kind::Float, ValueRef::Integer(n)) => Cell::Float(n as f64),
        (Kind::Decimal { .. }, ValueRef::Text(bytes)) => Cell::Decimal(text(column, bytes)?),
        (Kind::Decimal { .. }, ValueRef::Integer(n)) => Cell::Decimal(n.to_string()),
        (Kind::Decimal { .. }, ValueRef::Real(x)) => Cell::Decimal(x.to_string()),
        (Kind::Date, ValueRef::Text(bytes)) => {
            let s = text(column, bytes)?;
            let date = NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| scan_error(column, format!("bad date '{}': {}", s, e)))?;
            Cell::Instant(date.and_time(NaiveTime::MIN))
        }
        (Kind::Timestamp, ValueRef::Text(bytes)) => {
            let s = text(column, bytes)?;
            Cell::Instant(parse_datetime(&s).ok_or_else(|| {
                scan_error(column, format!("bad datetime '{}'", s))
            })?)
        }
        (Kind::Binary, ValueRef::Blob(bytes)) => Cell::Bytes(bytes.to_vec()),
        (Kind::Binary, ValueRef::Text(bytes)) => Cell::Bytes(bytes.to_vec()),
        (Kind::Text, ValueRef::Text(bytes)) => Cell::Text(text(column, bytes)?),
        (Kind::Text, ValueRef::Blob(bytes)) => Cell::Text(text(column, bytes)?),
        (Kind::Text, ValueRef::Integer(n)) => Cell::Text(n.to_string()),
        (Kind::Text, ValueRef::Real(x)) => Cell::Text(x.to_string()),
        (kind, other) => {
            return Err(scan_error(
                column,
                format!("{} value in a {:?} column", other.data_type(), kind),
            ))
        }
    };
    Ok(cell)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    // Some dumps store midnight datetimes as a bare date.
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn text(column: &Column, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| scan_error(column, format!("invalid UTF-8: {}", e)))
}

fn scan_error(column: &Column, detail: String) -> Error {
    Error::Scan {
        column: column.name.clone(),
        detail,
    }
}
