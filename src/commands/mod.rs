//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod build;
pub mod inspect;

// Re-export main command functions
pub use build::{execute_build, validate_args, BuildArgs};
pub use inspect::{
    check_tree_file, display_trace_info, display_version, inspect_trace, validate_tree_file, TraceInfo,
    TreeStats,
};
