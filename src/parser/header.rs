//! Trace header/footer metadata.
//!
//! A trace starts with `Version: ...` and `File format: ...` lines, followed by
//! `TRACE START [...]`, and ends with a blank line and `TRACE END   [...]`.

use super::record::{parse_record_line, MetaKind, Record};
use crate::utils::config::{SUPPORTED_FILE_FORMAT, TRACE_TIMESTAMP_FORMAT};
use crate::utils::error::ParseError;
use chrono::NaiveDateTime;
use log::debug;

/// Metadata captured from the meta lines of a trace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceMetadata {
    pub version: String,
    pub file_format: String,
    pub trace_start: Option<String>,
    pub trace_end: Option<String>,
}

impl TraceMetadata {
    /// Validate the two mandatory header lines and build the metadata
    ///
    /// # Errors
    /// * `ParseError::UnsupportedFormat` - header missing or file format is not `4`
    /// * `ParseError::MalformedRecord` - a header line cannot be parsed at all
    pub fn from_header_lines(version_line: &str, format_line: &str) -> Result<Self, ParseError> {
        let version = match parse_record_line(version_line)? {
            Record::Meta {
                kind: MetaKind::Version,
                value: Some(version),
            } => version,
            _ => {
                return Err(ParseError::UnsupportedFormat(format!(
                    "expected version header, found \"{}\"",
                    version_line
                )))
            }
        };

        let file_format = match parse_record_line(format_line)? {
            Record::Meta {
                kind: MetaKind::FileFormat,
                value: Some(format),
            } => format,
            _ => {
                return Err(ParseError::UnsupportedFormat(format!(
                    "expected file format header, found \"{}\"",
                    format_line
                )))
            }
        };

        if file_format != SUPPORTED_FILE_FORMAT {
            return Err(ParseError::UnsupportedFormat(format!(
                "file format {} (only {} is supported)",
                file_format, SUPPORTED_FILE_FORMAT
            )));
        }

        debug!("Trace header: version {}, file format {}", version, file_format);

        Ok(Self {
            version,
            file_format,
            trace_start: None,
            trace_end: None,
        })
    }

    /// Record a meta line seen after the header; other records are ignored
    pub fn observe(&mut self, record: &Record) {
        match record {
            Record::Meta {
                kind: MetaKind::TraceStart,
                value,
            } => self.trace_start = value.clone(),
            Record::Meta {
                kind: MetaKind::TraceEnd,
                value,
            } => self.trace_end = value.clone(),
            _ => {}
        }
    }

    pub fn trace_start_time(&self) -> Option<NaiveDateTime> {
        self.trace_start.as_deref().and_then(parse_trace_timestamp)
    }

    pub fn trace_end_time(&self) -> Option<NaiveDateTime> {
        self.trace_end.as_deref().and_then(parse_trace_timestamp)
    }

    /// Wall-clock span between `TRACE START` and `TRACE END`, when both are known
    pub fn wall_time(&self) -> Option<chrono::Duration> {
        Some(self.trace_end_time()? - self.trace_start_time()?)
    }
}

fn parse_trace_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TRACE_TIMESTAMP_FORMAT).ok()
}
