//! End-to-end tree writer: records in, root document and chunks out.

use super::chunk::{ChunkConfig, ChunkWriter};
use super::json::{root_path_for_prefix, write_tree};
use crate::reader::{TraceRecordReader, TraceSource};
use crate::tree::TreeBuilder;
use crate::utils::error::BuildError;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// What a completed write produced
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub root_path: PathBuf,
    pub root_bytes: u64,
    pub records_read: u64,
    pub nodes_in_root: usize,
    pub nodes_split: u64,
    pub chunks_written: u64,
    pub chunk_bytes: u64,

    /// Calls still open when the input ended
    pub open_calls: usize,
}

/// Streams a trace into a chunked JSON call tree
#[derive(Debug)]
pub struct TraceTreeWriter {
    root_path: PathBuf,
    chunker: ChunkWriter,
}

impl TraceTreeWriter {
    /// Writer for `<prefix>.json` with chunks under `<prefix>/`
    pub fn new(output_prefix: impl AsRef<Path>, max_chunk_size: usize) -> Self {
        let output_prefix = output_prefix.as_ref();
        Self::with_config(
            root_path_for_prefix(output_prefix),
            ChunkConfig::for_output_prefix(output_prefix, max_chunk_size),
        )
    }

    pub fn with_config(root_path: impl Into<PathBuf>, config: ChunkConfig) -> Self {
        Self {
            root_path: root_path.into(),
            chunker: ChunkWriter::new(config),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        self.chunker.config()
    }

    /// Build the tree with `builder`, splitting nodes as they close, then
    /// write the root document
    ///
    /// Chunks written before a failure or interruption stay on disk; the root
    /// document is only written when the whole input was consumed.
    pub fn write<S: TraceSource>(
        &mut self,
        builder: &mut TreeBuilder,
        reader: &mut TraceRecordReader<S>,
    ) -> Result<WriteSummary, BuildError> {
        let chunker = &mut self.chunker;
        builder.build_with(reader, |node| {
            chunker.on_node_closed(node)?;
            Ok(())
        })?;

        let open_calls = builder.depth();
        if open_calls > 0 {
            warn!("Trace ended with {} calls still open", open_calls);
        }

        let root = builder
            .root()
            .ok_or_else(|| BuildError::UnexpectedFirstRecord("end of input".to_string()))?;
        let root_bytes = write_tree(root, &self.root_path)?;

        let summary = WriteSummary {
            root_path: self.root_path.clone(),
            root_bytes,
            records_read: reader.records_read(),
            nodes_in_root: root.node_count(),
            nodes_split: self.chunker.nodes_split(),
            chunks_written: self.chunker.chunks_written(),
            chunk_bytes: self.chunker.bytes_written(),
            open_calls,
        };

        info!(
            "Wrote {} ({} bytes) and {} chunks ({} bytes) from {} records",
            summary.root_path.display(),
            summary.root_bytes,
            summary.chunks_written,
            summary.chunk_bytes,
            summary.records_read
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::json::{read_full_tree, read_tree, ChunkResolver};
    use crate::reader::MemorySource;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn trace_with_loop(iterations: usize) -> String {
        let mut trace = String::from(
            "Version: 3.1.0\nFile format: 4\nTRACE START [2021-02-11 09:00:00.000001]\n\
             1\t0\t0\t0.0001\t400000\t{main}\t1\t\t/srv/app.php\t0\n",
        );
        let mut time = 0.001;
        for i in 0..iterations {
            let seq = i + 1;
            trace.push_str(&format!(
                "2\t{}\t0\t{:.4}\t401000\tApp\\Worker->handle\t1\t\t/srv/Worker.php\t{}\t'job-{}'\n",
                seq,
                time,
                10 + i,
                i
            ));
            time += 0.0005;
            trace.push_str(&format!("2\t{}\t1\t{:.4}\t401100\n", seq, time));
            time += 0.0005;
        }
        trace.push_str(&format!("1\t0\t1\t{:.4}\t402000\n\t\t\t{:.4}\t402000\n", time, time));
        trace.push_str("TRACE END   [2021-02-11 09:00:01.000001]\n");
        trace
    }

    #[test]
    fn test_small_trace_stays_inline() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("run");
        let mut reader = TraceRecordReader::new(MemorySource::new(trace_with_loop(3)));
        let mut builder = TreeBuilder::new();
        let mut writer = TraceTreeWriter::new(&prefix, 1_000_000);

        let summary = writer.write(&mut builder, &mut reader).unwrap();
        assert_eq!(summary.chunks_written, 0);
        assert_eq!(summary.open_calls, 0);
        assert_eq!(summary.nodes_in_root, 4);
        assert_eq!(summary.root_path, dir.path().join("run.json"));
        assert!(!prefix.exists());

        let root = read_tree(&summary.root_path).unwrap();
        assert_eq!(root.children.len(), 3);
        assert!(!root.chunked_children);
    }

    #[test]
    fn test_chunked_output_reassembles_to_unchunked_tree() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("run");
        let trace = trace_with_loop(60);

        let mut reader = TraceRecordReader::new(MemorySource::new(trace.clone()));
        let mut builder = TreeBuilder::new();
        let mut writer = TraceTreeWriter::new(&prefix, 2_048);
        let summary = writer.write(&mut builder, &mut reader).unwrap();

        assert!(summary.chunks_written > 1);
        assert_eq!(summary.nodes_split, 1);
        assert_eq!(summary.nodes_in_root, 1);

        let root_doc = std::fs::read_to_string(&summary.root_path).unwrap();
        assert!(root_doc.contains("\"run/1.json\""));
        assert_eq!(root_doc.len() as u64, summary.root_bytes);

        let resolver = ChunkResolver::for_root_document(&summary.root_path);
        let reassembled = read_full_tree(&summary.root_path, &resolver).unwrap();

        let mut plain_reader = TraceRecordReader::new(MemorySource::new(trace));
        let mut plain_builder = TreeBuilder::new();
        let expected = plain_builder.build(&mut plain_reader).unwrap();
        assert_eq!(reassembled, *expected);
    }

    #[test]
    fn test_truncated_trace_reports_open_calls() {
        let dir = tempdir().unwrap();
        let trace = "Version: 3.1.0\nFile format: 4\n\
                     1\t0\t0\t0.5\t100\t{main}\t1\t\t/srv/app.php\t0\n\
                     2\t1\t0\t0.75\t100\tsleep\t0\t\t/srv/app.php\t3\t1\n";
        let mut reader = TraceRecordReader::new(MemorySource::new(trace));
        let mut builder = TreeBuilder::new();
        let mut writer = TraceTreeWriter::new(dir.path().join("partial"), 1_000);

        let summary = writer.write(&mut builder, &mut reader).unwrap();
        assert_eq!(summary.open_calls, 2);

        let root = read_tree(&summary.root_path).unwrap();
        assert_eq!(root.end_time_index, None);
        assert_eq!(root.duration, 0.25);
    }

    #[test]
    fn test_interrupted_write_skips_root_document() {
        let dir = tempdir().unwrap();
        let mut reader = TraceRecordReader::new(MemorySource::new(trace_with_loop(5)));
        let mut builder = TreeBuilder::new();
        builder.subscribe(|root, handle| {
            if root.children.len() == 2 {
                handle.interrupt();
            }
        });
        let mut writer = TraceTreeWriter::new(dir.path().join("stopped"), 1_000_000);

        let err = writer.write(&mut builder, &mut reader).unwrap_err();
        assert!(err.is_interrupted());
        assert!(!writer.root_path().exists());
    }
}
