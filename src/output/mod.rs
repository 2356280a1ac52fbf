//! Output of call trees.
//!
//! This module handles:
//! - Exact serialized size estimation with memoization
//! - Splitting oversized nodes into numbered chunk artifacts
//! - Writing and reading root documents, resolving chunk references
//! - The end-to-end trace-to-tree writer

pub mod chunk;
pub mod json;
pub mod size;
pub mod writer;

// Re-export main types and functions
pub use chunk::{ChunkConfig, ChunkWriter};
pub use json::{
    expand_chunks, read_chunk, read_full_tree, read_tree, root_path_for_prefix, validate_path,
    write_tree, ChunkResolver,
};
pub use size::SizeEstimator;
pub use writer::{TraceTreeWriter, WriteSummary};
