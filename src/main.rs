//! XTrace Tree CLI
//!
//! Builds chunked call trees from function traces and inspects the results.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use xtrace_tree::commands::{
    display_trace_info, display_version, execute_build, validate_args, validate_tree_file, BuildArgs,
};
use xtrace_tree::utils::config::{DEFAULT_CHUNK_MAX_SIZE, DEFAULT_READ_CHUNK_SIZE};

/// XTrace Tree - call trees from function traces
#[derive(Parser, Debug)]
#[command(name = "xtrace-tree")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a chunked call tree from a trace
    Build {
        /// Trace file path or http(s) URL
        #[arg(short, long)]
        input: String,

        /// Output prefix: writes <prefix>.json and <prefix>/<n>.json
        #[arg(short, long, default_value = "trace")]
        output: PathBuf,

        /// Soft ceiling for one JSON artifact, in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_MAX_SIZE, env = "XTRACE_TREE_MAX_CHUNK_SIZE")]
        max_chunk_size: usize,

        /// Base for chunk references (defaults to "<prefix basename>/")
        #[arg(long)]
        reference_prefix: Option<String>,

        /// Bytes fetched from the trace per read
        #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE, env = "XTRACE_TREE_READ_CHUNK_SIZE")]
        read_chunk_size: u64,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Show header and footer information of a trace
    Info {
        /// Trace file path or http(s) URL
        #[arg(short, long)]
        input: String,
    },

    /// Validate a written call tree and its chunks
    Validate {
        /// Path to the root JSON document
        #[arg(short, long)]
        file: PathBuf,

        /// Reference prefix used when the tree was built
        #[arg(long)]
        reference_prefix: Option<String>,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Build {
            input,
            output,
            max_chunk_size,
            reference_prefix,
            read_chunk_size,
            summary,
        } => {
            let args = BuildArgs {
                input,
                output_prefix: output,
                max_chunk_size,
                reference_prefix,
                read_chunk_size,
                print_summary: summary,
            };

            // Validate args first
            validate_args(&args)?;

            execute_build(args)?;
        }

        Commands::Info { input } => {
            display_trace_info(&input)?;
        }

        Commands::Validate {
            file,
            reference_prefix,
        } => {
            validate_tree_file(&file, reference_prefix.as_deref())?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
