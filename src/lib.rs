//! XTrace Tree
//!
//! Turns function-call traces (file format 4) into nested call trees that
//! are written as size-bounded JSON documents. Oversized nodes have their
//! children moved into numbered chunk files, which a viewer loads on demand.
//!
//! The pipeline:
//! - [`reader`] pulls byte ranges from a file or HTTP source and yields records
//! - [`parser`] turns trace lines into typed records
//! - [`tree`] reconstructs the call tree incrementally
//! - [`output`] measures, splits and writes the tree
//!
//! ## Getting Started
//!
//! ```bash
//! xtrace-tree build --input trace.xt --output out/trace
//! xtrace-tree validate --file out/trace.json
//! ```

pub mod commands;
pub mod output;
pub mod parser;
pub mod reader;
pub mod tree;
pub mod utils;
