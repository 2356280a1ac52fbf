//! Trace input: byte-range sources and the streaming record reader.

pub mod record_reader;
pub mod source;

// Re-export main types
pub use record_reader::{TraceFooter, TraceRecordReader};
pub use source::{open_source, FileSource, HttpSource, MemorySource, RangeRead, TraceSource};
