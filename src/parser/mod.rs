//! Trace line parsing and header metadata.
//!
//! This module handles:
//! - Parsing raw trace lines into typed records
//! - Validating the trace header (version, file format)
//! - Capturing trace start/end stamps

pub mod header;
pub mod record;

// Re-export main types
pub use header::TraceMetadata;
pub use record::{parse_record_line, EntryRecord, ExitRecord, MetaKind, Record};
