//! Splitting oversized nodes into external chunk artifacts.
//!
//! When a closed node serializes larger than the configured ceiling, its
//! children are greedily grouped into runs that fit the ceiling. Each run is
//! written as a JSON array to `<chunk_dir>/<n>.json` and replaced in the
//! parent by the string `<reference_prefix><n>.json`.
//!
//! The ceiling is soft: a single child larger than the ceiling is still
//! written on its own, so splitting always makes progress.

use super::size::SizeEstimator;
use crate::tree::{Child, Node};
use crate::utils::config::DEFAULT_CHUNK_MAX_SIZE;
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where and how chunks are written
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkConfig {
    /// Soft ceiling for one artifact, in bytes
    pub max_size: usize,

    /// Directory receiving `<n>.json` chunk files
    pub chunk_dir: PathBuf,

    /// Text placed before `<n>.json` in chunk references
    pub reference_prefix: String,
}

impl ChunkConfig {
    /// Layout for an output prefix: chunks go to `<prefix>/` and are referenced
    /// relative to the root document as `<basename>/<n>.json`
    pub fn for_output_prefix(prefix: impl AsRef<Path>, max_size: usize) -> Self {
        let prefix = prefix.as_ref();
        let basename = prefix
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            max_size,
            chunk_dir: prefix.to_path_buf(),
            reference_prefix: format!("{}/", basename),
        }
    }

    /// Reference chunks through another base, e.g. a URL the consumer can fetch
    pub fn with_reference_prefix(mut self, reference_prefix: impl Into<String>) -> Self {
        self.reference_prefix = reference_prefix.into();
        self
    }

    pub fn reference_for(&self, chunk_id: u64) -> String {
        format!("{}{}.json", self.reference_prefix, chunk_id)
    }

    pub fn path_for(&self, chunk_id: u64) -> PathBuf {
        self.chunk_dir.join(format!("{}.json", chunk_id))
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::for_output_prefix("trace", DEFAULT_CHUNK_MAX_SIZE)
    }
}

/// Externalizes children of oversized nodes as they close
#[derive(Debug)]
pub struct ChunkWriter {
    config: ChunkConfig,
    estimator: SizeEstimator,
    next_chunk_id: u64,
    chunks_written: u64,
    bytes_written: u64,
    nodes_split: u64,
}

impl ChunkWriter {
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            estimator: SizeEstimator::new(),
            next_chunk_id: 1,
            chunks_written: 0,
            bytes_written: 0,
            nodes_split: 0,
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn nodes_split(&self) -> u64 {
        self.nodes_split
    }

    pub fn estimator(&mut self) -> &mut SizeEstimator {
        &mut self.estimator
    }

    /// Check a just-closed node and split its children if it is too large
    ///
    /// Returns whether the node was split.
    ///
    /// # Errors
    /// * `OutputError::WriteFailed` - chunk file or directory could not be written
    /// * `OutputError::SerializationFailed` - JSON serialization error
    pub fn on_node_closed(&mut self, node: &mut Node) -> Result<bool, OutputError> {
        let size = self.estimator.size_of(node);
        if size <= self.config.max_size {
            return Ok(false);
        }

        debug!(
            "Node {} is {} bytes (ceiling {}), splitting {} children",
            node.function_name,
            size,
            self.config.max_size,
            node.children.len()
        );
        self.split_children(node)?;
        let new_size = self.estimator.recompute(node);
        debug!("Node {} is {} bytes after splitting", node.function_name, new_size);

        Ok(true)
    }

    /// Replace every maximal run of inline children with a chunk reference
    fn split_children(&mut self, node: &mut Node) -> Result<(), OutputError> {
        let children = std::mem::take(&mut node.children);
        let mut replaced = Vec::new();
        let mut run = Run::default();

        for child in children {
            match child {
                // Already external; keep its place in the order
                Child::Chunk(reference) => {
                    self.flush(&mut run, &mut replaced)?;
                    replaced.push(Child::Chunk(reference));
                }
                Child::Node(child_node) => {
                    let child_size = self.estimator.size_of(&child_node);
                    if !run.fits(child_size, self.config.max_size) {
                        self.flush(&mut run, &mut replaced)?;
                    }
                    run.push(Child::Node(child_node), child_size);
                }
            }
        }
        self.flush(&mut run, &mut replaced)?;

        node.children = replaced;
        node.chunked_children = true;
        node.size_memo.clear();
        self.nodes_split += 1;

        Ok(())
    }

    fn flush(&mut self, run: &mut Run, replaced: &mut Vec<Child>) -> Result<(), OutputError> {
        if run.children.is_empty() {
            return Ok(());
        }

        let reference = self.write_chunk(&run.children, run.size)?;
        replaced.push(Child::Chunk(reference));
        *run = Run::default();
        Ok(())
    }

    /// Write one run to the next numbered artifact; returns its reference
    fn write_chunk(&mut self, children: &[Child], expected_size: usize) -> Result<String, OutputError> {
        if !self.config.chunk_dir.exists() {
            debug!("Creating chunk directory: {}", self.config.chunk_dir.display());
        }
        std::fs::create_dir_all(&self.config.chunk_dir)?;

        let chunk_id = self.next_chunk_id;
        let path = self.config.path_for(chunk_id);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, children)?;
        writer.flush()?;

        self.next_chunk_id += 1;
        self.chunks_written += 1;
        self.bytes_written += expected_size as u64;

        info!(
            "Wrote chunk {} ({} children, {} bytes)",
            path.display(),
            children.len(),
            expected_size
        );

        Ok(self.config.reference_for(chunk_id))
    }
}

/// Children accumulated for the next chunk, with their array size so far
#[derive(Debug)]
struct Run {
    children: Vec<Child>,
    size: usize,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            size: "[]".len(),
        }
    }
}

impl Run {
    /// Whether a child of `child_size` can join without passing `max_size`;
    /// an empty run accepts anything
    fn fits(&self, child_size: usize, max_size: usize) -> bool {
        self.children.is_empty() || self.size + 1 + child_size <= max_size
    }

    fn push(&mut self, child: Child, child_size: usize) {
        if !self.children.is_empty() {
            self.size += 1;
        }
        self.size += child_size;
        self.children.push(child);
    }
}
