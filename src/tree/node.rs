//! Call tree node shape shared by the builder and the output writers.
//!
//! A serialized node looks like:
//!
//! ```text
//! {"startTimeIndex":0.1,"endTimeIndex":0.4,"duration":0.30000000000000004,
//!  "startMemoryUsage":390000,"endMemoryUsage":390300,"deltaMemoryUsage":300,
//!  "functionName":"{main}","arguments":[],"children":[...],"index":null,"level":1}
//! ```
//!
//! Chunked nodes additionally carry `"chunkedChildren":true` and some of their
//! children are plain strings referencing chunk artifacts.

use crate::parser::{EntryRecord, ExitRecord};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Entry in a node's children list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    /// Inline child call
    Node(Box<Node>),

    /// Reference to an external chunk artifact holding a run of children
    Chunk(String),
}

impl Child {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Node(node) => Some(node),
            Child::Chunk(_) => None,
        }
    }

    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match self {
            Child::Node(node) => Some(node),
            Child::Chunk(_) => None,
        }
    }
}

/// Enter/exit transition reported to node visitors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Exit,
}

/// Memoized serialized size; never part of equality or output
#[derive(Debug, Clone, Default)]
pub struct SizeMemo(Cell<Option<usize>>);

impl SizeMemo {
    pub fn get(&self) -> Option<usize> {
        self.0.get()
    }

    pub fn set(&self, size: usize) {
        self.0.set(Some(size));
    }

    pub fn clear(&self) {
        self.0.set(None);
    }
}

impl PartialEq for SizeMemo {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// One function call in the call tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub start_time_index: f64,
    pub end_time_index: Option<f64>,

    /// Elapsed time; running while open, frozen on close
    pub duration: f64,

    pub start_memory_usage: i64,
    pub end_memory_usage: Option<i64>,
    pub delta_memory_usage: Option<i64>,

    pub function_name: String,
    pub arguments: Vec<String>,
    pub children: Vec<Child>,

    /// Position within the parent's children; `None` for the root
    pub index: Option<usize>,

    /// Call stack depth reported by the trace
    pub level: u32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub chunked_children: bool,

    #[serde(skip)]
    pub size_memo: SizeMemo,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Node {
    /// Create an open node from an entry record
    pub fn from_entry(entry: &EntryRecord) -> Self {
        Self {
            start_time_index: entry.time_index,
            end_time_index: None,
            duration: 0.0,
            start_memory_usage: entry.memory_usage,
            end_memory_usage: None,
            delta_memory_usage: None,
            function_name: entry.function_name.clone(),
            arguments: entry.arguments.clone(),
            children: Vec::new(),
            index: None,
            level: entry.level,
            chunked_children: false,
            size_memo: SizeMemo::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time_index.is_none()
    }

    /// Advance the running duration of an open node to `time_index`
    pub fn touch(&mut self, time_index: f64) {
        self.duration = time_index - self.start_time_index;
        self.size_memo.clear();
    }

    /// Close the node with an exit record, freezing duration and memory delta
    pub fn close(&mut self, exit: &ExitRecord) {
        self.end_time_index = Some(exit.time_index);
        self.duration = exit.time_index - self.start_time_index;
        self.end_memory_usage = Some(exit.memory_usage);
        self.delta_memory_usage = Some(exit.memory_usage - self.start_memory_usage);
        self.size_memo.clear();
    }

    /// Append a child, assigning its stable index; returns that index
    pub fn push_child(&mut self, mut child: Node) -> usize {
        let index = self.children.len();
        child.index = Some(index);
        self.children.push(Child::Node(Box::new(child)));
        self.size_memo.clear();
        index
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index).and_then(Child::as_node)
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.children.get_mut(index).and_then(Child::as_node_mut)
    }

    /// Inline child nodes, skipping chunk references
    pub fn child_nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(Child::as_node)
    }

    /// Chunk references directly held by this node
    pub fn chunk_references(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|child| match child {
            Child::Chunk(reference) => Some(reference.as_str()),
            Child::Node(_) => None,
        })
    }

    /// Number of inline nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.child_nodes().map(Node::node_count).sum::<usize>()
    }
}
