//! Build command implementation.
//!
//! The build command:
//! 1. Opens the trace (local file or HTTP URL)
//! 2. Validates the header
//! 3. Streams records into the call tree builder
//! 4. Splits oversized nodes into chunk files as they close
//! 5. Writes the root document

use crate::output::{root_path_for_prefix, ChunkConfig, TraceTreeWriter, WriteSummary};
use crate::reader::{open_source, TraceRecordReader};
use crate::tree::{NamespaceIndex, TreeBuilder};
use crate::utils::config::{DEFAULT_CHUNK_MAX_SIZE, DEFAULT_READ_CHUNK_SIZE};
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;

/// Records between progress log lines
const PROGRESS_INTERVAL: u64 = 250_000;

/// Namespaces listed in the printed summary
const SUMMARY_NAMESPACES: usize = 10;

/// Arguments for the build command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct BuildArgs {
    /// Trace file path or http(s) URL
    pub input: String,

    /// Output prefix: root at `<prefix>.json`, chunks under `<prefix>/`
    pub output_prefix: PathBuf,

    /// Soft ceiling for one serialized artifact, in bytes
    pub max_chunk_size: usize,

    /// Base for chunk references (defaults to `<basename>/`)
    pub reference_prefix: Option<String>,

    /// Bytes requested from the source per read
    pub read_chunk_size: u64,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for BuildArgs {
    fn default() -> Self {
        Self {
            input: String::new(),
            output_prefix: PathBuf::from("trace"),
            max_chunk_size: DEFAULT_CHUNK_MAX_SIZE,
            reference_prefix: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            print_summary: false,
        }
    }
}

/// Execute the build command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Trace cannot be opened or fetched
/// * Unsupported header or malformed records
/// * Chunk or root document write errors
pub fn execute_build(args: BuildArgs) -> Result<WriteSummary> {
    let start_time = Instant::now();

    info!("Building call tree from: {}", args.input);

    // Step 1: Open source
    let source = open_source(&args.input).context(format!("Failed to open trace {}", args.input))?;
    let mut reader = TraceRecordReader::with_chunk_size(source, args.read_chunk_size);

    // Step 2: Validate header
    let metadata = reader.metadata().context("Failed to read trace header")?;
    info!(
        "Trace version {}, file format {}",
        metadata.version, metadata.file_format
    );

    let mut seen: u64 = 0;
    reader.add_record_processor(move |_| {
        seen += 1;
        if seen % PROGRESS_INTERVAL == 0 {
            debug!("{} records processed", seen);
        }
    });

    // Step 3: Wire up builder and chunker
    let mut builder = TreeBuilder::new();
    let (namespaces, visitor) = NamespaceIndex::shared();
    builder.add_node_visitor(visitor);

    let mut config = ChunkConfig::for_output_prefix(&args.output_prefix, args.max_chunk_size);
    if let Some(reference_prefix) = &args.reference_prefix {
        config = config.with_reference_prefix(reference_prefix.clone());
    }
    let mut writer = TraceTreeWriter::with_config(root_path_for_prefix(&args.output_prefix), config);

    // Steps 4-5: Stream, split, write
    let summary = writer
        .write(&mut builder, &mut reader)
        .context("Failed to build call tree")?;

    info!("✓ Call tree written to: {}", summary.root_path.display());

    if args.print_summary {
        let namespaces = namespaces.borrow();
        println!("\n{}", "=".repeat(80));
        println!("CALL TREE SUMMARY");
        println!("{}", "=".repeat(80));
        println!("Input:          {}", args.input);
        println!("Records:        {}", summary.records_read);
        println!("Root document:  {} ({} bytes)", summary.root_path.display(), summary.root_bytes);
        println!("Chunks:         {} ({} bytes)", summary.chunks_written, summary.chunk_bytes);
        println!("Nodes split:    {}", summary.nodes_split);
        if summary.open_calls > 0 {
            println!("Open calls:     {}", summary.open_calls);
        }
        println!("\nTop namespaces by inclusive time:");
        for (class, stats) in namespaces.top_by_duration(SUMMARY_NAMESPACES) {
            println!("  {:<48} {:>10} calls {:>12.6}s", class, stats.calls, stats.total_duration);
        }
        println!("{}", "=".repeat(80));
    }

    let elapsed = start_time.elapsed();
    info!("Build completed in {:.2}s", elapsed.as_secs_f64());

    Ok(summary)
}

/// Validate build arguments
///
/// **Public** - can be called before execute_build for early validation
pub fn validate_args(args: &BuildArgs) -> Result<()> {
    if args.input.is_empty() {
        anyhow::bail!("Input trace cannot be empty");
    }

    if args.output_prefix.file_name().is_none() {
        anyhow::bail!(
            "Output prefix must name a file: {}",
            args.output_prefix.display()
        );
    }

    if args.max_chunk_size == 0 {
        anyhow::bail!("max_chunk_size must be greater than 0");
    }

    if args.read_chunk_size == 0 {
        anyhow::bail!("read_chunk_size must be greater than 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TRACE: &str = "Version: 3.1.0\n\
File format: 4\n\
TRACE START [2021-02-11 09:00:00.000001]\n\
1\t0\t0\t0.0001\t400000\t{main}\t1\t\t/srv/app.php\t0\n\
2\t1\t0\t0.0002\t400100\tApp\\Kernel->handle\t1\t\t/srv/app.php\t3\n\
2\t1\t1\t0.0010\t400200\n\
1\t0\t1\t0.0011\t400300\n\
\t\t\t0.0011\t400300\n\
\n\
TRACE END   [2021-02-11 09:00:00.001101]\n";

    #[test]
    fn test_validate_args_valid() {
        let args = BuildArgs {
            input: "trace.xt".to_string(),
            ..Default::default()
        };

        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_empty_input() {
        assert!(validate_args(&BuildArgs::default()).is_err());
    }

    #[test]
    fn test_validate_args_zero_chunk_size() {
        let args = BuildArgs {
            input: "trace.xt".to_string(),
            max_chunk_size: 0,
            ..Default::default()
        };

        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_zero_read_size() {
        let args = BuildArgs {
            input: "trace.xt".to_string(),
            read_chunk_size: 0,
            ..Default::default()
        };

        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_prefix_without_name() {
        let args = BuildArgs {
            input: "trace.xt".to_string(),
            output_prefix: PathBuf::from("/"),
            ..Default::default()
        };

        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_execute_build_from_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("trace.xt");
        std::fs::write(&input, TRACE).unwrap();

        let args = BuildArgs {
            input: input.to_string_lossy().into_owned(),
            output_prefix: dir.path().join("out/trace"),
            read_chunk_size: 64,
            ..Default::default()
        };
        let summary = execute_build(args).unwrap();

        assert_eq!(summary.root_path, dir.path().join("out/trace.json"));
        assert_eq!(summary.records_read, 8);
        assert_eq!(summary.nodes_in_root, 2);
        assert_eq!(summary.chunks_written, 0);
        assert!(summary.root_path.exists());
    }

    #[test]
    fn test_execute_build_missing_file() {
        let dir = tempdir().unwrap();
        let args = BuildArgs {
            input: dir.path().join("missing.xt").to_string_lossy().into_owned(),
            output_prefix: dir.path().join("out"),
            ..Default::default()
        };

        assert!(execute_build(args).is_err());
    }
}
