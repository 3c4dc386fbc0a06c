use std::io::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::types::{Cell, Column, Kind};
use crate::{Config, Error, Result, RowSink};

type Convert = fn(&Cell) -> std::result::Result<Value, String>;

/// Line-delimited JSON encoder: one self-describing object per row, keyed
/// by column name, newline-terminated.
pub struct JsonSink<W> {
    out: W,
    names: Vec<String>,
    converters: Vec<Convert>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(config: &Config, columns: &[Column], out: W) -> Self {
        JsonSink {
            out,
            names: columns.iter().map(|c| c.name.clone()).collect(),
            converters: columns.iter().map(|c| select(c, config)).collect(),
        }
    }
}

impl<W: Write> RowSink for JsonSink<W> {
    fn write_row(&mut self, row: &[Cell]) -> Result<()> {
        let mut object = Map::new();
        for ((name, convert), cell) in self.names.iter().zip(&self.converters).zip(row) {
            let value = match cell {
                Cell::Null => Value::Null,
                cell => convert(cell).map_err(|detail| Error::Scan {
                    column: name.clone(),
                    detail,
                })?,
            };
            object.insert(name.clone(), value);
        }
        serde_json::to_writer(&mut self.out, &Value::Object(object))?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn select(column: &Column, config: &Config) -> Convert {
    match column.kind {
        Kind::Integer | Kind::Float => number,
        Kind::Decimal { .. } => decimal,
        // Only a declared `binary` type gets base64; blob columns are
        // emitted as text.
        Kind::Binary if column.decl.contains("binary") => bytes_base64,
        Kind::Binary => bytes_text,
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

fn number(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Integer(n) => Ok(Value::from(*n)),
        Cell::Float(x) => Ok(Value::from(*x)),
        Cell::Bool(b) => Ok(Value::Bool(*b)),
        other => Err(mismatch(other)),
    }
}

fn decimal(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Decimal(s) => Ok(Value::String(s.clone())),
        other => Err(mismatch(other)),
    }
}

fn bytes_base64(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Bytes(b) => Ok(Value::String(BASE64.encode(b))),
        other => Err(mismatch(other)),
    }
}

fn bytes_text(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Bytes(b) => String::from_utf8(b.clone())
            .map(Value::String)
            .map_err(|e| format!("invalid UTF-8: {}", e)),
        other => Err(mismatch(other)),
    }
}

fn text(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Text(s) => Ok(Value::String(s.clone())),
        other => Err(mismatch(other)),
    }
}

fn instant_epoch(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Instant(dt) => Ok(Value::from(dt.and_utc().timestamp())),
        other => Err(mismatch(other)),
    }
}

fn instant_rfc3339(cell: &Cell) -> std::result::Result<Value, String> {
    match cell {
        Cell::Instant(dt) => Ok(Value::String(
            dt.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true),
        )),
        other => Err(mismatch(other)),
    }
}

fn mismatch(cell: &Cell) -> String {
    format!("cannot encode {:?} here", cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn column(name: &str, decl: &str) -> Column {
        Column::new(name, decl).unwrap()
    }

    fn encode(config: &Config, columns: &[Column], rows: &[Vec<Cell>]) -> Vec<Value> {
        let mut out = Vec::new();
        let mut sink = JsonSink::new(config, columns, &mut out);
        for row in rows {
            sink.write_row(row).unwrap();
        }
        sink.finish().unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn instant(s: &str) -> Cell {
        Cell::Instant(
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap(),
        )
    }

    #[test]
    fn one_object_per_row_keyed_by_column_name() {
        let columns = [column("id", "bigint"), column("name", "varchar(10)")];
        let rows = vec![
            vec![Cell::Integer(1), Cell::Text("one".into())],
            vec![Cell::Integer(2), Cell::Text("two".into())],
        ];
        let lines = encode(&Config::default(), &columns, &rows);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["name"], "one");
        assert_eq!(lines[1]["id"], 2);
    }

    #[test]
    fn null_cells_become_json_null() {
        let columns = [
            column("id", "bigint"),
            column("price", "decimal(10,2)"),
            column("seen", "datetime"),
            column("payload", "blob"),
        ];
        let rows = vec![vec![Cell::Null, Cell::Null, Cell::Null, Cell::Null]];
        let lines = encode(&Config::default(), &columns, &rows);
        for key in ["id", "price", "seen", "payload"] {
            assert!(lines[0][key].is_null(), "{}", key);
        }
    }

    #[test]
    fn binary_declarations_get_base64_blobs_stay_text() {
        let columns = [column("raw", "varbinary(16)"), column("note", "blob")];
        let rows = vec![vec![
            Cell::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
            Cell::Bytes(b"plain".to_vec()),
        ]];
        let lines = encode(&Config::default(), &columns, &rows);
        assert_eq!(lines[0]["raw"], "3q2+7w==");
        assert_eq!(lines[0]["note"], "plain");
    }

    #[test]
    fn epoch_flag_switches_datetime_rendering() {
        let columns = [column("seen", "datetime")];
        let rows = vec![vec![instant("2021-03-04 05:06:07")]];

        let epoch = encode(&Config::default(), &columns, &rows);
        assert_eq!(epoch[0]["seen"], 1614834367);

        let calendar = Config {
            date_epoch: false,
            ..Config::default()
        };
        let rfc = encode(&calendar, &columns, &rows);
        assert_eq!(rfc[0]["seen"], "2021-03-04T05:06:07Z");
    }

    #[test]
    fn date_columns_follow_the_same_flag() {
        let columns = [column("born", "date")];
        let day = NaiveDate::from_ymd_opt(1970, 1, 2)
            .unwrap()
            .and_time(chrono::NaiveTime::MIN);
        let rows = vec![vec![Cell::Instant(day)]];
        let lines = encode(&Config::default(), &columns, &rows);
        assert_eq!(lines[0]["born"], 86400);
    }

    #[test]
    fn decimals_keep_their_textual_form() {
        let columns = [column("price", "decimal(20,10)")];
        let rows = vec![vec![Cell::Decimal("12345678901.0123456789".into())]];
        let lines = encode(&Config::default(), &columns, &rows);
        assert_eq!(lines[0]["price"], "12345678901.0123456789");
    }

    #[test]
    fn booleans_pass_through() {
        let columns = [column("flag", "tinyint")];
        let rows = vec![vec![Cell::Bool(true)]];
        let lines = encode(&Config::default(), &columns, &rows);
        assert_eq!(lines[0]["flag"], true);
    }

    #[test]
    fn mismatched_cell_is_fatal() {
        let columns = [column("id", "bigint")];
        let mut out = Vec::new();
        let mut sink = JsonSink::new(&Config::default(), &columns, &mut out);
        let err = sink.write_row(&[Cell::Text("seven".into())]).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
    }
}
