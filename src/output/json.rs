//! JSON call tree output.
//!
//! Writes the root document, reads documents and chunks back, and resolves
//! chunk references to reconstruct the complete tree.

use super::chunk::ChunkConfig;
use crate::tree::{Child, Node};
use crate::utils::error::OutputError;
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Path of the root document for an output prefix (`<prefix>.json`)
pub fn root_path_for_prefix(prefix: impl AsRef<Path>) -> PathBuf {
    let mut path = OsString::from(prefix.as_ref().as_os_str());
    path.push(".json");
    PathBuf::from(path)
}

/// Write a call tree as a compact JSON document
///
/// **Public** - main entry point for root document output
///
/// # Returns
/// Number of bytes written
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
pub fn write_tree(root: &Node, output_path: impl AsRef<Path>) -> Result<u64, OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing call tree to: {}", output_path.display());

    validate_path(output_path)?;

    // Create parent directories if needed
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::InvalidPath(format!("Cannot create directory {}: {}", parent.display(), e))
            })?;
        }
    }

    let file = File::create(output_path).map_err(OutputError::WriteFailed)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, root).map_err(OutputError::SerializationFailed)?;
    writer.flush()?;

    let size = calculate_file_size(output_path);
    info!("Call tree written successfully ({} bytes)", size);

    Ok(size)
}

/// Validate that output path is writable
pub fn validate_path(path: &Path) -> Result<(), OutputError> {
    if path.as_os_str().is_empty() {
        return Err(OutputError::InvalidPath("Path is empty".to_string()));
    }

    // Check if we're trying to overwrite a directory
    if path.is_dir() {
        return Err(OutputError::InvalidPath(format!(
            "Path is a directory: {}",
            path.display()
        )));
    }

    Ok(())
}

fn calculate_file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a root document (children may include chunk references)
pub fn read_tree(input_path: impl AsRef<Path>) -> Result<Node, OutputError> {
    let input_path = input_path.as_ref();
    debug!("Reading call tree from: {}", input_path.display());
    read_json(input_path)
}

/// Read one chunk artifact
pub fn read_chunk(chunk_path: impl AsRef<Path>) -> Result<Vec<Node>, OutputError> {
    read_json(chunk_path.as_ref())
}

/// Call stacks nest deeply, so the default recursion limit is lifted
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, OutputError> {
    let file = File::open(path).map_err(OutputError::WriteFailed)?;
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
    deserializer.disable_recursion_limit();
    let value: T = serde::Deserialize::deserialize(&mut deserializer).map_err(OutputError::SerializationFailed)?;
    deserializer.end().map_err(OutputError::SerializationFailed)?;
    Ok(value)
}

/// Maps chunk references back to artifact files
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResolver {
    reference_prefix: String,
    chunk_dir: PathBuf,
}

impl ChunkResolver {
    pub fn new(reference_prefix: impl Into<String>, chunk_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference_prefix: reference_prefix.into(),
            chunk_dir: chunk_dir.into(),
        }
    }

    /// Resolver matching the default layout of a root document at `<prefix>.json`
    pub fn for_root_document(root_path: impl AsRef<Path>) -> Self {
        let prefix = root_path.as_ref().with_extension("");
        Self::from(&ChunkConfig::for_output_prefix(prefix, 0))
    }

    /// Same chunk directory, different reference base
    pub fn with_reference_prefix(mut self, reference_prefix: impl Into<String>) -> Self {
        self.reference_prefix = reference_prefix.into();
        self
    }

    /// File path of a chunk reference
    ///
    /// Only `<prefix><n>.json` references are accepted.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, OutputError> {
        let unresolved = || OutputError::UnresolvedChunk(reference.to_string());

        let name = reference.strip_prefix(&self.reference_prefix).ok_or_else(unresolved)?;
        let id = name.strip_suffix(".json").ok_or_else(unresolved)?;
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unresolved());
        }

        Ok(self.chunk_dir.join(name))
    }

    pub fn load(&self, reference: &str) -> Result<Vec<Node>, OutputError> {
        let path = self.resolve(reference)?;
        debug!("Resolving chunk {} -> {}", reference, path.display());
        read_chunk(path)
    }
}

impl From<&ChunkConfig> for ChunkResolver {
    fn from(config: &ChunkConfig) -> Self {
        Self::new(config.reference_prefix.clone(), config.chunk_dir.clone())
    }
}

/// Read a root document and splice every chunk back in, depth-first
pub fn read_full_tree(root_path: impl AsRef<Path>, resolver: &ChunkResolver) -> Result<Node, OutputError> {
    let mut root = read_tree(root_path)?;
    expand_chunks(&mut root, resolver)?;
    Ok(root)
}

/// Replace chunk references under `node` with the children they hold
pub fn expand_chunks(node: &mut Node, resolver: &ChunkResolver) -> Result<(), OutputError> {
    if node.chunked_children {
        let mut expanded = Vec::with_capacity(node.children.len());
        for child in std::mem::take(&mut node.children) {
            match child {
                Child::Chunk(reference) => {
                    expanded.extend(resolver.load(&reference)?.into_iter().map(|n| Child::Node(Box::new(n))));
                }
                inline => expanded.push(inline),
            }
        }
        node.children = expanded;
        node.chunked_children = false;
        node.size_memo.clear();
    }

    for child in node.children.iter_mut().filter_map(Child::as_node_mut) {
        expand_chunks(child, resolver)?;
    }

    Ok(())
}
