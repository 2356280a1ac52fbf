//! Line-level record parser for function trace files.
//!
//! Every line of a trace is one record. Tab-separated lines are call events,
//! selected by field 2:
//!
//! ```text
//! level  seq  0  time  mem  function  user_defined  include_file  file  line  args...
//! level  seq  1  time  mem
//! level  seq  R              return_value
//!                time  mem
//! ```
//!
//! Lines without tabs are header/footer meta lines or blank.

use crate::utils::config::{
    FILE_FORMAT_PREFIX, TRACE_END_PREFIX, TRACE_START_PREFIX, VERSION_PREFIX,
};
use crate::utils::error::ParseError;
use std::str::FromStr;

/// Kind of a meta (non-event) line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    Version,
    FileFormat,
    TraceStart,
    TraceEnd,
    BlankLine,
}

/// Function entry event
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    pub level: u32,
    pub function_seq: u64,
    pub time_index: f64,
    pub memory_usage: i64,
    pub function_name: String,
    pub user_defined: bool,
    pub include_file: String,
    pub source_file: String,
    pub source_line: u32,
    pub arguments: Vec<String>,
}

/// Function exit event
#[derive(Debug, Clone, PartialEq)]
pub struct ExitRecord {
    pub level: u32,
    pub function_seq: u64,
    pub time_index: f64,
    pub memory_usage: i64,
}

/// One parsed trace line
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Meta { kind: MetaKind, value: Option<String> },
    Entry(EntryRecord),
    Exit(ExitRecord),
    Return { level: u32, function_seq: u64, value: String },
    End { time_index: f64, memory_usage: i64 },
}

impl Record {
    /// Short name used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Meta { .. } => "meta",
            Record::Entry(_) => "entry",
            Record::Exit(_) => "exit",
            Record::Return { .. } => "return",
            Record::End { .. } => "end",
        }
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Record::Meta { .. })
    }
}

/// Parse a single trace line into a record
///
/// **Public** - main entry point for line parsing
///
/// The parser is stateless: it never looks at neighbouring lines.
///
/// # Errors
/// * `ParseError::MalformedRecord` - unknown record type, missing field or bad number
pub fn parse_record_line(line: &str) -> Result<Record, ParseError> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if !line.contains('\t') {
        return parse_meta_line(line);
    }

    let fields: Vec<&str> = line.split('\t').collect();
    let malformed = || ParseError::MalformedRecord(line.to_string());

    let record = match field(&fields, 2, line)? {
        "0" => Record::Entry(EntryRecord {
            level: number(&fields, 0, line)?,
            function_seq: number(&fields, 1, line)?,
            time_index: number(&fields, 3, line)?,
            memory_usage: number(&fields, 4, line)?,
            function_name: field(&fields, 5, line)?.to_string(),
            user_defined: field(&fields, 6, line)? == "1",
            include_file: field(&fields, 7, line)?.to_string(),
            source_file: field(&fields, 8, line)?.to_string(),
            source_line: number(&fields, 9, line)?,
            arguments: fields.get(10..).unwrap_or_default().iter().map(|a| a.to_string()).collect(),
        }),
        "1" => Record::Exit(ExitRecord {
            level: number(&fields, 0, line)?,
            function_seq: number(&fields, 1, line)?,
            time_index: number(&fields, 3, line)?,
            memory_usage: number(&fields, 4, line)?,
        }),
        "R" => Record::Return {
            level: number(&fields, 0, line)?,
            function_seq: number(&fields, 1, line)?,
            value: field(&fields, 5, line)?.to_string(),
        },
        "" => Record::End {
            time_index: number(&fields, 3, line)?,
            memory_usage: number(&fields, 4, line)?,
        },
        _ => return Err(malformed()),
    };

    Ok(record)
}

/// Parse a line without tabs: header, footer or blank
///
/// **Private** - internal helper for parse_record_line
fn parse_meta_line(line: &str) -> Result<Record, ParseError> {
    let meta = |kind, value: &str| Record::Meta {
        kind,
        value: Some(value.trim().to_string()),
    };

    if let Some(value) = line.strip_prefix(VERSION_PREFIX) {
        Ok(meta(MetaKind::Version, value))
    } else if let Some(value) = line.strip_prefix(FILE_FORMAT_PREFIX) {
        Ok(meta(MetaKind::FileFormat, value))
    } else if let Some(value) = bracketed(line, TRACE_START_PREFIX) {
        Ok(meta(MetaKind::TraceStart, value))
    } else if let Some(value) = bracketed(line, TRACE_END_PREFIX) {
        Ok(meta(MetaKind::TraceEnd, value))
    } else if line.trim().is_empty() {
        Ok(Record::Meta {
            kind: MetaKind::BlankLine,
            value: None,
        })
    } else {
        Err(ParseError::MalformedRecord(line.to_string()))
    }
}

/// Extract the text between `prefix` (which ends in `[`) and a closing `]`
fn bracketed<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)
        .map(|rest| rest.strip_suffix(']').unwrap_or(rest))
}

fn field<'a>(fields: &[&'a str], index: usize, line: &str) -> Result<&'a str, ParseError> {
    fields
        .get(index)
        .copied()
        .ok_or_else(|| ParseError::MalformedRecord(line.to_string()))
}

fn number<T: FromStr>(fields: &[&str], index: usize, line: &str) -> Result<T, ParseError> {
    field(fields, index, line)?
        .trim()
        .parse::<T>()
        .map_err(|_| ParseError::MalformedRecord(line.to_string()))
}
