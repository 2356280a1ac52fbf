//! Call tree reconstruction.
//!
//! This module turns the ordered record stream into a nested call tree:
//! - Node shape shared with the output writers
//! - Incremental builder with subscribers and node visitors
//! - Cooperative interruption
//! - Derived indices fed by visitors

pub mod builder;
pub mod interrupt;
pub mod namespace;
pub mod node;

// Re-export main types
pub use builder::TreeBuilder;
pub use interrupt::{InterruptHandle, InterruptOutcome, PendingInterrupt};
pub use namespace::{classify, NamespaceIndex, NamespaceStats};
pub use node::{Child, Node, Transition};
