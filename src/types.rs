use chrono::NaiveDateTime;

use crate::{Error, Result};

/// Semantic classification of a declared column type. Selects the converter
/// and, for Avro, the schema fragment used for every cell in that column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Integer,
    Float,
    Decimal { precision: u16, scale: u16 },
    Date,
    Timestamp,
    Binary,
    Text,
}

/// A single scanned value, positionally aligned with the column list.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Exact textual representation, never routed through binary floats.
    Decimal(String),
    Bytes(Vec<u8>),
    Text(String),
    Instant(NaiveDateTime),
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Lowercased declared type, as written in the table definition. The
    /// JSON encoder consults this to tell binary columns from blob columns.
    pub decl: String,
    pub kind: Kind,
}

impl Column {
    pub fn new(name: impl Into<String>, decl: &str) -> Result<Self> {
        Ok(Column {
            name: name.into(),
            decl: decl.trim().to_ascii_lowercase(),
            kind: classify(decl)?,
        })
    }
}

enum Pattern {
    Exact(&'static [&'static str]),
    Suffix(&'static str),
    Contains(&'static [&'static str]),
}

impl Pattern {
    fn matches(&self, base: &str) -> bool {
        match self {
            Pattern::Exact(names) => names.contains(&base),
            Pattern::Suffix(suffix) => base.ends_with(suffix),
            Pattern::Contains(parts) => parts.iter().any(|p| base.contains(p)),
        }
    }
}

#[derive(Clone, Copy)]
enum Target {
    Date,
    Timestamp,
    Decimal,
    Float,
    Integer,
    Binary,
    Text,
}

// Evaluated top to bottom; the suffix and substring rules are reachable only
// for names no exact rule claimed.
const RULES: &[(Pattern, Target)] = &[
    (Pattern::Exact(&["date"]), Target::Date),
    (Pattern::Exact(&["datetime", "timestamp"]), Target::Timestamp),
    (Pattern::Exact(&["decimal"]), Target::Decimal),
    (Pattern::Exact(&["double", "float"]), Target::Float),
    (Pattern::Suffix("int"), Target::Integer),
    (Pattern::Contains(&["binary", "blob"]), Target::Binary),
    (Pattern::Contains(&["text", "char"]), Target::Text),
    (Pattern::Exact(&["json", "enum"]), Target::Text),
];

/// Maps a declared type name to its `Kind`. Matching is case-insensitive; a
/// parenthesized argument list such as `(10,2)` is split off first and, for
/// decimal, supplies precision and scale. Unrecognized names are fatal.
pub fn classify(decl: &str) -> Result<Kind> {
    let lower = decl.trim().to_ascii_lowercase();
    let (base, args) = match lower.split_once('(') {
        Some((base, rest)) => (base.trim_end(), Some(rest.trim_end_matches(')'))),
        None => (lower.as_str(), None),
    };
    for (pattern, target) in RULES {
        if pattern.matches(base) {
            return resolve(*target, args, decl);
        }
    }
    Err(Error::UnknownType(decl.to_string()))
}

fn resolve(target: Target, args: Option<&str>, decl: &str) -> Result<Kind> {
    let kind = match target {
        Target::Date => Kind::Date,
        Target::Timestamp => Kind::Timestamp,
        Target::Decimal => {
            let (precision, scale) = decimal_args(args)
                .ok_or_else(|| Error::UnknownType(decl.to_string()))?;
            Kind::Decimal { precision, scale }
        }
        Target::Float => Kind::Float,
        Target::Integer => Kind::Integer,
        Target::Binary => Kind::Binary,
        Target::Text => Kind::Text,
    };
    Ok(kind)
}

// A bare `decimal` defaults to (10,0), matching the MySQL default for the
// type. A declaration with only a precision gets scale 0.
fn decimal_args(args: Option<&str>) -> Option<(u16, u16)> {
    let args = match args {
        Some(args) => args,
        None => return Some((10, 0)),
    };
    let mut parts = args.split(',').map(str::trim);
    let precision = parts.next()?.parse().ok()?;
    let scale = match parts.next() {
        Some(scale) => scale.parse().ok()?,
        None => 0,
    };
    match parts.next() {
        Some(_) => None,
        None => Some((precision, scale)),
    }
}
