//! Read-only commands: trace info, tree validation, version.

use crate::output::{read_full_tree, read_tree, ChunkResolver};
use crate::parser::TraceMetadata;
use crate::reader::{open_source, TraceFooter, TraceRecordReader};
use crate::tree::Node;
use crate::utils::config::SUPPORTED_FILE_FORMAT;
use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

/// Header and footer facts about a trace, gathered without streaming it
#[derive(Debug, Clone, PartialEq)]
pub struct TraceInfo {
    pub metadata: TraceMetadata,
    pub footer: TraceFooter,
    pub file_size: u64,
}

impl TraceInfo {
    /// Wall-clock span between the start and end stamps, in seconds
    pub fn wall_time_secs(&self) -> Option<f64> {
        let mut metadata = self.metadata.clone();
        if metadata.trace_end.is_none() {
            metadata.trace_end = self.footer.trace_end.clone();
        }
        metadata
            .wall_time()
            .and_then(|span| span.num_microseconds())
            .map(|micros| micros as f64 / 1_000_000.0)
    }
}

/// Read the header, the start stamp and the footer of a trace
pub fn inspect_trace(input: &str) -> Result<TraceInfo> {
    let source = open_source(input).context(format!("Failed to open trace {}", input))?;
    let mut reader = TraceRecordReader::new(source);

    let file_size = reader.file_size().context("Failed to read trace")?;
    // The first call record comes after TRACE START, so this fills in the start stamp
    reader.next_record().context("Failed to read first record")?;
    let metadata = reader.metadata().context("Failed to read trace header")?.clone();
    let footer = reader.probe_footer().context("Failed to read trace footer")?;

    debug!("Inspected {}: {:?} {:?}", input, metadata, footer);

    Ok(TraceInfo {
        metadata,
        footer,
        file_size,
    })
}

/// Print trace header and footer information
///
/// **Public** - called from main.rs
pub fn display_trace_info(input: &str) -> Result<()> {
    let info = inspect_trace(input)?;

    println!("Trace: {}", input);
    println!("  Size:        {} bytes", info.file_size);
    println!("  Version:     {}", info.metadata.version);
    println!(
        "  File format: {} (supported: {})",
        info.metadata.file_format, SUPPORTED_FILE_FORMAT
    );
    println!(
        "  Started:     {}",
        info.metadata.trace_start.as_deref().unwrap_or("unknown")
    );

    match &info.footer.trace_end {
        Some(end) => println!("  Ended:       {}", end),
        None => println!("  Ended:       (no end stamp, trace may be truncated)"),
    }
    if let Some(duration) = info.footer.duration {
        println!("  Duration:    {:.6}s", duration);
    }
    if let Some(wall) = info.wall_time_secs() {
        println!("  Wall time:   {:.6}s", wall);
    }

    Ok(())
}

/// Counts gathered while validating a written tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStats {
    pub nodes: usize,
    pub chunk_references: usize,
    pub max_depth: usize,
}

/// Load a root document, resolve every chunk and count the result
pub fn check_tree_file(root_path: &Path, reference_prefix: Option<&str>) -> Result<(Node, TreeStats)> {
    let mut resolver = ChunkResolver::for_root_document(root_path);
    if let Some(prefix) = reference_prefix {
        resolver = resolver.with_reference_prefix(prefix);
    }

    let root_doc = read_tree(root_path).context(format!("Failed to read {}", root_path.display()))?;
    let mut stats = TreeStats::default();
    count_references(&root_doc, &mut stats);

    let full = read_full_tree(root_path, &resolver).context("Failed to resolve chunk references")?;
    stats.nodes = full.node_count();
    stats.max_depth = depth_of(&full);

    Ok((full, stats))
}

/// Validate a root document and the chunks it references
///
/// **Public** - called from main.rs
pub fn validate_tree_file(root_path: &Path, reference_prefix: Option<&str>) -> Result<()> {
    println!("Validating call tree: {}", root_path.display());

    let (root, stats) = check_tree_file(root_path, reference_prefix)?;

    println!("✓ Valid call tree");
    println!("  Root:             {}", root.function_name);
    println!("  Duration:         {:.6}s", root.duration);
    println!("  Nodes:            {}", stats.nodes);
    println!("  Max depth:        {}", stats.max_depth);
    println!("  Chunk references: {}", stats.chunk_references);

    Ok(())
}

/// Display version information
///
/// **Public** - called from main.rs
pub fn display_version() {
    println!("xtrace-tree v{}", env!("CARGO_PKG_VERSION"));
    println!("Trace file format: {}", SUPPORTED_FILE_FORMAT);
    println!();
    println!("Builds chunked, lazily-loadable call trees from function traces.");
}

fn count_references(node: &Node, stats: &mut TreeStats) {
    stats.chunk_references += node.chunk_references().count();
    for child in node.child_nodes() {
        count_references(child, stats);
    }
}

fn depth_of(node: &Node) -> usize {
    1 + node.child_nodes().map(depth_of).max().unwrap_or(0)
}
