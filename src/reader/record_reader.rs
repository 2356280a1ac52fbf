//! Streaming record reader.
//!
//! Pulls byte spans from a [`TraceSource`], reassembles lines across span
//! boundaries, validates the header and hands out parsed records one at a time.

use super::source::TraceSource;
use crate::parser::{parse_record_line, Record, TraceMetadata};
use crate::utils::config::{DEFAULT_READ_CHUNK_SIZE, TRACE_END_PREFIX, YIELD_INTERVAL};
use crate::utils::error::{BuildError, ParseError};
use log::{debug, trace};
use std::collections::VecDeque;
use std::time::Instant;

/// Bytes inspected at the end of a trace when probing its footer
const FOOTER_PROBE_SIZE: u64 = 4096;

type RecordProcessor = Box<dyn FnMut(&Record)>;

/// Footer information read from the tail of a trace without streaming it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceFooter {
    /// Value of `TRACE END   [...]`, if the trace was closed properly
    pub trace_end: Option<String>,

    /// Time index of the final end-of-trace record
    pub duration: Option<f64>,
}

/// Reads records from a trace source in order
pub struct TraceRecordReader<S: TraceSource> {
    source: S,
    read_chunk_size: u64,
    offset: u64,
    total_size: Option<u64>,
    partial_line: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
    metadata: Option<TraceMetadata>,
    processors: Vec<RecordProcessor>,
    records_read: u64,
    last_yield: Instant,
}

impl<S: TraceSource> TraceRecordReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_chunk_size(source, DEFAULT_READ_CHUNK_SIZE)
    }

    pub fn with_chunk_size(source: S, read_chunk_size: u64) -> Self {
        Self {
            source,
            read_chunk_size: read_chunk_size.max(1),
            offset: 0,
            total_size: None,
            partial_line: Vec::new(),
            lines: VecDeque::new(),
            metadata: None,
            processors: Vec::new(),
            records_read: 0,
            last_yield: Instant::now(),
        }
    }

    /// Rewind to the start of the trace
    ///
    /// Registered record processors are kept.
    pub fn reset(&mut self) {
        debug!("Rewinding reader for {}", self.source.describe());
        self.offset = 0;
        self.total_size = None;
        self.partial_line.clear();
        self.lines.clear();
        self.metadata = None;
        self.records_read = 0;
        self.last_yield = Instant::now();
    }

    /// Register an observer called for every record parsed after the header
    pub fn add_record_processor(&mut self, processor: impl FnMut(&Record) + 'static) {
        self.processors.push(Box::new(processor));
    }

    pub fn read_started(&self) -> bool {
        self.offset != 0
    }

    /// Whether anything past the header has been consumed
    ///
    /// Reading only the header leaves the reader positioned for a full build.
    pub fn past_header(&self) -> bool {
        self.records_read > 0
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.offset
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Total size of the trace in bytes, fetching the first span if needed
    pub fn file_size(&mut self) -> Result<u64, BuildError> {
        if self.total_size.is_none() {
            self.fill()?;
        }
        Ok(self.total_size.unwrap_or(0))
    }

    /// Header metadata, reading and validating the header on first use
    ///
    /// # Errors
    /// * `ParseError::UnsupportedFormat` - missing header or unsupported file format
    pub fn metadata(&mut self) -> Result<&TraceMetadata, BuildError> {
        if self.metadata.is_none() {
            let version_line = self.next_line()?;
            let format_line = self.next_line()?;
            let (Some(version_line), Some(format_line)) = (version_line, format_line) else {
                return Err(ParseError::UnsupportedFormat("trace is missing its header".to_string()).into());
            };
            self.metadata = Some(TraceMetadata::from_header_lines(&version_line, &format_line)?);
        }

        match &self.metadata {
            Some(metadata) => Ok(metadata),
            None => Err(ParseError::UnsupportedFormat("trace is missing its header".to_string()).into()),
        }
    }

    /// Next non-meta record, or `None` at end of input
    ///
    /// Meta records are consumed here: they update [`TraceMetadata`] and are
    /// shown to record processors, but never returned.
    pub fn next_record(&mut self) -> Result<Option<Record>, BuildError> {
        self.metadata()?;

        loop {
            let Some(line) = self.next_line()? else {
                return Ok(None);
            };

            let record = parse_record_line(&line)?;
            self.records_read += 1;

            if let Some(metadata) = self.metadata.as_mut() {
                metadata.observe(&record);
            }
            for processor in &mut self.processors {
                processor(&record);
            }

            self.maybe_yield();

            if !record.is_meta() {
                return Ok(Some(record));
            }
        }
    }

    /// Read the last few kilobytes of the trace for its end stamp and duration
    ///
    /// Does not disturb the streaming position.
    pub fn probe_footer(&mut self) -> Result<TraceFooter, BuildError> {
        let total_size = self.file_size()?;
        let offset = total_size.saturating_sub(FOOTER_PROBE_SIZE);
        let tail = self.source.read_range(offset, FOOTER_PROBE_SIZE)?;
        let text = String::from_utf8_lossy(&tail.bytes);

        let mut footer = TraceFooter::default();
        let mut lines: Vec<&str> = text.lines().collect();
        // The first line is most likely cut in half
        if offset > 0 && !lines.is_empty() {
            lines.remove(0);
        }

        for line in lines {
            if line.starts_with(TRACE_END_PREFIX) {
                if let Ok(record) = parse_record_line(line) {
                    let mut metadata = TraceMetadata::default();
                    metadata.observe(&record);
                    footer.trace_end = metadata.trace_end;
                }
            } else if let Ok(Record::End { time_index, .. }) = parse_record_line(line) {
                footer.duration = Some(time_index);
            }
        }

        Ok(footer)
    }

    /// Next raw line, decoded as UTF-8
    ///
    /// **Private** - pulls more spans from the source as needed
    fn next_line(&mut self) -> Result<Option<String>, BuildError> {
        while self.lines.is_empty() {
            if self.is_end_of_input() {
                if self.partial_line.is_empty() {
                    return Ok(None);
                }
                let last = std::mem::take(&mut self.partial_line);
                self.lines.push_back(last);
                break;
            }
            self.fill()?;
        }

        match self.lines.pop_front() {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| ParseError::MalformedRecord(String::from_utf8_lossy(e.as_bytes()).into_owned()).into()),
            None => Ok(None),
        }
    }

    fn is_end_of_input(&self) -> bool {
        matches!(self.total_size, Some(total) if self.offset >= total)
    }

    /// Fetch the next span and split it into complete lines
    fn fill(&mut self) -> Result<(), BuildError> {
        let read = self.source.read_range(self.offset, self.read_chunk_size)?;
        trace!(
            "Read {} bytes at offset {} (total {})",
            read.bytes.len(),
            self.offset,
            read.total_size
        );

        self.total_size = Some(read.total_size);
        if read.bytes.is_empty() {
            // Source ended early; never spin on an empty read
            self.total_size = Some(self.offset);
            return Ok(());
        }
        self.offset += read.bytes.len() as u64;
        self.partial_line.extend_from_slice(&read.bytes);

        if let Some(last_newline) = self.partial_line.iter().rposition(|&b| b == b'\n') {
            let rest = self.partial_line.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.partial_line, rest);
            self.lines.extend(
                complete[..last_newline]
                    .split(|&b| b == b'\n')
                    .map(|line| line.to_vec()),
            );
        }

        Ok(())
    }

    /// Give other threads a chance to run during long builds
    fn maybe_yield(&mut self) {
        if self.last_yield.elapsed() >= YIELD_INTERVAL {
            std::thread::yield_now();
            self.last_yield = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::source::MemorySource;
    use std::cell::Cell;
    use std::rc::Rc;

    const TRACE: &str = "Version: 2.9.6\n\
File format: 4\n\
TRACE START [2020-07-03 17:16:40.553473]\n\
1\t0\t0\t0.000100\t390000\t{main}\t1\t\t/app/index.php\t0\n\
2\t1\t0\t0.000200\t390100\tstr_repeat\t0\t\t/app/index.php\t3\t'ab'\t2\n\
2\t1\t1\t0.000300\t390200\n\
2\t1\tR\t\t\t'abab'\n\
1\t0\t1\t0.000400\t390300\n\
\t\t\t0.000500\t8192\n\
\n\
TRACE END   [2020-07-03 17:16:40.554000]\n";

    fn read_all(reader: &mut TraceRecordReader<MemorySource>) -> Vec<Record> {
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn test_reads_records_and_metadata() {
        let mut reader = TraceRecordReader::new(MemorySource::new(TRACE));
        let records = read_all(&mut reader);

        let kinds: Vec<&str> = records.iter().map(Record::kind).collect();
        assert_eq!(kinds, vec!["entry", "entry", "exit", "return", "exit", "end"]);

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.version, "2.9.6");
        assert_eq!(metadata.trace_start.as_deref(), Some("2020-07-03 17:16:40.553473"));
        assert_eq!(metadata.trace_end.as_deref(), Some("2020-07-03 17:16:40.554000"));
    }

    #[test]
    fn test_tiny_spans_reassemble_lines() {
        let mut whole = TraceRecordReader::new(MemorySource::new(TRACE));
        let mut tiny = TraceRecordReader::with_chunk_size(MemorySource::new(TRACE), 7);

        assert_eq!(read_all(&mut whole), read_all(&mut tiny));
    }

    #[test]
    fn test_multibyte_character_split_across_spans() {
        let trace = "Version: 3.0.0\nFile format: 4\n1\t0\t0\t0.1\t100\tgrüße\t1\t\t/a.php\t1\n";
        for chunk_size in 1..8 {
            let mut reader = TraceRecordReader::with_chunk_size(MemorySource::new(trace), chunk_size);
            let Some(Record::Entry(entry)) = reader.next_record().unwrap() else {
                panic!("expected entry");
            };
            assert_eq!(entry.function_name, "grüße");
        }
    }

    #[test]
    fn test_final_line_without_newline() {
        let trace = "Version: 3.0.0\nFile format: 4\n1\t0\t1\t0.5\t100";
        let mut reader = TraceRecordReader::new(MemorySource::new(trace));
        assert!(matches!(reader.next_record().unwrap(), Some(Record::Exit(_))));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_line_is_malformed() {
        let trace = b"Version: 3\nFile format: 4\n1\t0\t0\t0.1\t1\t\xff\t1\t\t/a\t1\n".to_vec();
        let mut reader = TraceRecordReader::new(MemorySource::new(trace));
        assert!(matches!(
            reader.next_record().unwrap_err(),
            BuildError::Parse(ParseError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_header_alone_is_not_past_header() {
        let mut reader = TraceRecordReader::new(MemorySource::new(TRACE));
        reader.metadata().unwrap();
        assert!(reader.read_started());
        assert!(!reader.past_header());

        reader.next_record().unwrap();
        assert!(reader.past_header());
    }

    #[test]
    fn test_unsupported_format_fails_before_records() {
        let trace = "Version: 2.0.0\nFile format: 2\n1\t0\t0\t0.1\t100\tf\t1\t\t/a.php\t1\n";
        let mut reader = TraceRecordReader::new(MemorySource::new(trace));
        let err = reader.next_record().unwrap_err();
        assert!(matches!(err, BuildError::Parse(ParseError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_empty_trace_is_missing_header() {
        let mut reader = TraceRecordReader::new(MemorySource::new(""));
        assert!(matches!(
            reader.next_record().unwrap_err(),
            BuildError::Parse(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_malformed_line_fails() {
        let trace = "Version: 3.0.0\nFile format: 4\nnot\ttab\tstructured\n";
        let mut reader = TraceRecordReader::new(MemorySource::new(trace));
        assert!(matches!(
            reader.next_record().unwrap_err(),
            BuildError::Parse(ParseError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_processors_see_meta_records() {
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);

        let mut reader = TraceRecordReader::new(MemorySource::new(TRACE));
        reader.add_record_processor(move |_| counter.set(counter.get() + 1));
        read_all(&mut reader);

        // TRACE START, six events, blank line, TRACE END
        assert_eq!(seen.get(), 9);
        assert_eq!(reader.records_read(), 9);
    }

    #[test]
    fn test_reset_rewinds() {
        let mut reader = TraceRecordReader::with_chunk_size(MemorySource::new(TRACE), 16);
        let first = read_all(&mut reader);
        assert!(reader.read_started());

        reader.reset();
        assert!(!reader.read_started());
        assert_eq!(read_all(&mut reader), first);
    }

    #[test]
    fn test_probe_footer() {
        let mut reader = TraceRecordReader::new(MemorySource::new(TRACE));
        let footer = reader.probe_footer().unwrap();

        assert_eq!(footer.trace_end.as_deref(), Some("2020-07-03 17:16:40.554000"));
        assert_eq!(footer.duration, Some(0.0005));
    }
}
