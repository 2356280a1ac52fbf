//! Configuration and constants for the CLI.

use std::time::Duration;

/// Default soft ceiling for a single output artifact (10 MiB)
pub const DEFAULT_CHUNK_MAX_SIZE: usize = 10 * 1024 * 1024;

/// Default size of one byte-range read from the trace source (50 MiB)
pub const DEFAULT_READ_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// The only trace file format the parser understands
pub const SUPPORTED_FILE_FORMAT: &str = "4";

/// How long the reader may run before yielding to the scheduler
pub const YIELD_INTERVAL: Duration = Duration::from_millis(10);

/// Default timeout for HTTP range requests
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// Header and footer prefixes of a trace file
pub const VERSION_PREFIX: &str = "Version:";
pub const FILE_FORMAT_PREFIX: &str = "File format:";
pub const TRACE_START_PREFIX: &str = "TRACE START [";
pub const TRACE_END_PREFIX: &str = "TRACE END   [";

/// Timestamp layout used inside `TRACE START [...]` / `TRACE END   [...]`
pub const TRACE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
