//! Incremental call tree builder.
//!
//! Consumes records in order and maintains one growing tree plus the path of
//! child indices from the root to the deepest open call. Every entry/exit
//! walks that path, advancing the running duration of each open ancestor.

use super::interrupt::{InterruptHandle, PendingInterrupt};
use super::node::{Node, Transition};
use crate::parser::{EntryRecord, ExitRecord, Record};
use crate::reader::{TraceRecordReader, TraceSource};
use crate::utils::error::BuildError;
use log::{debug, info};

type Subscriber = Box<dyn FnMut(&Node, &InterruptHandle)>;
type NodeVisitor = Box<dyn FnMut(&Node, Transition)>;

/// Builds a call tree from trace records
pub struct TreeBuilder {
    root: Option<Node>,
    path: Vec<usize>,
    subscribers: Vec<Subscriber>,
    visitors: Vec<NodeVisitor>,
    interrupt: InterruptHandle,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            root: None,
            path: Vec::new(),
            subscribers: Vec::new(),
            visitors: Vec::new(),
            interrupt: InterruptHandle::new(),
        }
    }

    /// Observe the root after every applied record
    ///
    /// The handle lets a subscriber stop the build, e.g. once enough of the
    /// tree is known.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&Node, &InterruptHandle) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Observe every node as it is entered and exited
    pub fn add_node_visitor(&mut self, visitor: impl FnMut(&Node, Transition) + 'static) {
        self.visitors.push(Box::new(visitor));
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Request cancellation; see [`InterruptHandle::interrupt`]
    pub fn interrupt(&self) -> PendingInterrupt {
        self.interrupt.interrupt()
    }

    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    pub fn into_root(self) -> Option<Node> {
        self.root
    }

    /// Current call-stack cursor (child indices from the root)
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Number of open calls
    pub fn depth(&self) -> usize {
        match &self.root {
            Some(root) if root.is_open() => self.path.len() + 1,
            _ => 0,
        }
    }

    /// Forget the current tree
    pub fn reset(&mut self) {
        self.root = None;
        self.path.clear();
    }

    /// Apply one record to the tree
    ///
    /// Returns the node closed by an exit record so the caller may post-process
    /// it (e.g. externalize its children) before the next record.
    ///
    /// # Errors
    /// * `BuildError::UnexpectedFirstRecord` - first non-meta record is not an entry
    /// * `BuildError::UnbalancedRecord` - exit with nothing open, or entry after the root closed
    pub fn apply(&mut self, record: &Record) -> Result<Option<&mut Node>, BuildError> {
        let closed = match record {
            Record::Meta { .. } => return Ok(None),
            Record::Entry(entry) => {
                self.enter(entry)?;
                None
            }
            Record::Exit(exit) => Some(self.exit(exit)?),
            Record::Return { .. } | Record::End { .. } => {
                if self.root.is_none() {
                    return Err(BuildError::UnexpectedFirstRecord(record.kind().to_string()));
                }
                None
            }
        };

        self.notify_subscribers();

        match closed {
            Some(closed_index) => Ok(self.closed_node_mut(closed_index)),
            None => Ok(None),
        }
    }

    /// Build the whole tree from a reader
    ///
    /// A reader that has already handed out records is rewound first; one that
    /// has only read its header continues where it is.
    pub fn build<S: TraceSource>(
        &mut self,
        reader: &mut TraceRecordReader<S>,
    ) -> Result<&Node, BuildError> {
        self.build_with(reader, |_| Ok(()))
    }

    /// Build the whole tree, handing each just-closed node to `on_closed`
    ///
    /// # Errors
    /// * `BuildError::Interrupted` - [`interrupt`](Self::interrupt) was called
    /// * any parse, source or structural error; the partial tree is kept
    pub fn build_with<S, F>(
        &mut self,
        reader: &mut TraceRecordReader<S>,
        mut on_closed: F,
    ) -> Result<&Node, BuildError>
    where
        S: TraceSource,
        F: FnMut(&mut Node) -> Result<(), BuildError>,
    {
        if reader.past_header() {
            reader.reset();
        }
        self.reset();
        self.interrupt.begin();

        let result = self.drive(reader, &mut on_closed);
        match &result {
            Err(BuildError::Interrupted) => self.interrupt.acknowledge(),
            _ => self.interrupt.finish(),
        }
        result?;

        info!(
            "Built call tree: {} records, {} nodes in memory",
            reader.records_read(),
            self.root.as_ref().map(Node::node_count).unwrap_or(0)
        );

        self.root
            .as_ref()
            .ok_or_else(|| BuildError::UnexpectedFirstRecord("end of input".to_string()))
    }

    fn drive<S, F>(&mut self, reader: &mut TraceRecordReader<S>, on_closed: &mut F) -> Result<(), BuildError>
    where
        S: TraceSource,
        F: FnMut(&mut Node) -> Result<(), BuildError>,
    {
        loop {
            if self.interrupt.is_requested() {
                debug!("Interrupt observed after {} records", reader.records_read());
                return Err(BuildError::Interrupted);
            }

            let Some(record) = reader.next_record()? else {
                return Ok(());
            };

            if let Some(closed) = self.apply(&record)? {
                on_closed(closed)?;
            }
        }
    }

    fn enter(&mut self, entry: &EntryRecord) -> Result<(), BuildError> {
        if self.root.is_none() {
            let root = Node::from_entry(entry);
            visit(&mut self.visitors, &root, Transition::Enter);
            self.root = Some(root);
            return Ok(());
        }

        let root = open_root(&mut self.root, "entry", entry.time_index)?;
        let parent = walk_open_path(root, &self.path, entry.time_index)?;
        let index = parent.push_child(Node::from_entry(entry));
        if let Some(entered) = parent.child(index) {
            visit(&mut self.visitors, entered, Transition::Enter);
        }
        self.path.push(index);

        Ok(())
    }

    /// Close the deepest open node; returns its index in its parent (`None` for the root)
    fn exit(&mut self, exit: &ExitRecord) -> Result<Option<usize>, BuildError> {
        if self.root.is_none() {
            return Err(BuildError::UnexpectedFirstRecord("exit".to_string()));
        }

        let root = open_root(&mut self.root, "exit", exit.time_index)?;
        let node = walk_open_path(root, &self.path, exit.time_index)?;
        node.close(exit);
        visit(&mut self.visitors, node, Transition::Exit);

        Ok(self.path.pop())
    }

    /// Locate a node just closed by [`exit`](Self::exit), under the current path
    fn closed_node_mut(&mut self, closed_index: Option<usize>) -> Option<&mut Node> {
        let mut node = self.root.as_mut()?;
        for &index in &self.path {
            node = node.child_mut(index)?;
        }
        match closed_index {
            Some(index) => node.child_mut(index),
            None => Some(node),
        }
    }

    fn notify_subscribers(&mut self) {
        if let Some(root) = self.root.as_ref() {
            for subscriber in &mut self.subscribers {
                subscriber(root, &self.interrupt);
            }
        }
    }
}

/// The root, provided it is still open
fn open_root<'a>(root: &'a mut Option<Node>, kind: &str, time_index: f64) -> Result<&'a mut Node, BuildError> {
    match root {
        Some(root) if root.is_open() => Ok(root),
        _ => Err(BuildError::UnbalancedRecord {
            kind: kind.to_string(),
            time_index,
        }),
    }
}

/// Walk `path` from `root`, advancing every open node's duration to `time_index`
///
/// Returns the deepest node on the path.
fn walk_open_path<'a>(root: &'a mut Node, path: &[usize], time_index: f64) -> Result<&'a mut Node, BuildError> {
    let mut node = root;
    node.touch(time_index);
    for &index in path {
        node = node.child_mut(index).ok_or(BuildError::UnbalancedRecord {
            kind: "path".to_string(),
            time_index,
        })?;
        node.touch(time_index);
    }
    Ok(node)
}

fn visit(visitors: &mut [NodeVisitor], node: &Node, transition: Transition) {
    for visitor in visitors.iter_mut() {
        visitor(node, transition);
    }
}
