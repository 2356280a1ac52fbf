//! Exact serialized size of call tree nodes.
//!
//! Sizes are computed field by field against the compact JSON form written by
//! `serde_json` (no whitespace, shortest round-trip floats), so the result is
//! the byte length of `serde_json::to_string(node)`, not an approximation.
//! Each node memoizes its own size; the builder clears the memo whenever it
//! mutates a node, so only closed subtrees ever hold a cached value.

use crate::tree::{Child, Node};
use log::trace;

const NULL_LEN: usize = "null".len();
const TRUE_LEN: usize = "true".len();

/// Keys of a serialized node, in output order (chunkedChildren is optional)
const NODE_KEYS: [&str; 11] = [
    "startTimeIndex",
    "endTimeIndex",
    "duration",
    "startMemoryUsage",
    "endMemoryUsage",
    "deltaMemoryUsage",
    "functionName",
    "arguments",
    "children",
    "index",
    "level",
];
const CHUNKED_CHILDREN_KEY: &str = "chunkedChildren";

/// Memoizing size calculator
#[derive(Debug, Default)]
pub struct SizeEstimator {
    cache_hits: u64,
    cache_misses: u64,
}

impl SizeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized size of `node`, reusing memoized subtree sizes
    pub fn size_of(&mut self, node: &Node) -> usize {
        if let Some(size) = node.size_memo.get() {
            self.cache_hits += 1;
            return size;
        }
        self.cache_misses += 1;

        let size = self.compute(node);
        node.size_memo.set(size);
        size
    }

    /// Recompute `node` itself, still reusing its children's memoized sizes
    pub fn recompute(&mut self, node: &Node) -> usize {
        node.size_memo.clear();
        self.size_of(node)
    }

    /// Serialized size of a children list (`[...]`)
    pub fn children_size(&mut self, children: &[Child]) -> usize {
        let items: usize = children.iter().map(|child| self.child_size(child)).sum();
        array_len(children.len(), items)
    }

    pub fn child_size(&mut self, child: &Child) -> usize {
        match child {
            Child::Node(node) => self.size_of(node),
            Child::Chunk(reference) => string_len(reference),
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    fn compute(&mut self, node: &Node) -> usize {
        let values = [
            float_len(node.start_time_index),
            node.end_time_index.map_or(NULL_LEN, float_len),
            float_len(node.duration),
            signed_len(node.start_memory_usage),
            node.end_memory_usage.map_or(NULL_LEN, signed_len),
            node.delta_memory_usage.map_or(NULL_LEN, signed_len),
            string_len(&node.function_name),
            array_len(
                node.arguments.len(),
                node.arguments.iter().map(|a| string_len(a)).sum(),
            ),
            self.children_size(&node.children),
            node.index.map_or(NULL_LEN, |index| unsigned_len(index as u64)),
            unsigned_len(u64::from(node.level)),
        ];

        let mut fields = NODE_KEYS.len();
        let mut size: usize = NODE_KEYS
            .iter()
            .zip(values)
            .map(|(key, value)| member_len(key, value))
            .sum();
        if node.chunked_children {
            fields += 1;
            size += member_len(CHUNKED_CHILDREN_KEY, TRUE_LEN);
        }

        // braces plus separators between members
        let size = 2 + size + (fields - 1);
        trace!("Computed size {} for {}", size, node.function_name);
        size
    }
}

/// `"key":value`
fn member_len(key: &str, value_len: usize) -> usize {
    key.len() + r#""":"#.len() + value_len
}

/// `[a,b,c]` given the item count and the summed item sizes
fn array_len(count: usize, items: usize) -> usize {
    2 + items + count.saturating_sub(1)
}

/// Length of a JSON string literal with serde_json's escaping
pub fn string_len(value: &str) -> usize {
    2 + value
        .bytes()
        .map(|byte| match byte {
            b'"' | b'\\' => 2,
            0x08 | 0x09 | 0x0A | 0x0C | 0x0D => 2,
            0x00..=0x1F => 6,
            _ => 1,
        })
        .sum::<usize>()
}

/// Length of a float in shortest round-trip form; non-finite values become `null`
pub fn float_len(value: f64) -> usize {
    serde_json::Number::from_f64(value).map_or(NULL_LEN, |number| number.to_string().len())
}

pub fn signed_len(value: i64) -> usize {
    let sign = usize::from(value < 0);
    sign + unsigned_len(value.unsigned_abs())
}

pub fn unsigned_len(mut value: u64) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}
