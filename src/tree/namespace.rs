//! Namespace classification of calls, fed by builder node visitors.

use super::node::{Node, Transition};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const SCRIPT_CLASS: &str = "(script)";
pub const GLOBAL_CLASS: &str = "(global)";
pub const CLOSURE_CLASS: &str = "(closure)";

const SCRIPT_PSEUDO_CALLS: &[&str] = &["{main}", "include", "include_once", "require", "require_once"];

/// Aggregates for one namespace/class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceStats {
    pub calls: u64,

    /// Sum of inclusive durations of closed calls
    pub total_duration: f64,
}

/// Calls grouped by the qualifier of their function name
#[derive(Debug, Clone, Default)]
pub struct NamespaceIndex {
    classes: BTreeMap<String, NamespaceStats>,
}

impl NamespaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared index plus a visitor that feeds it, for [`TreeBuilder::add_node_visitor`]
    ///
    /// [`TreeBuilder::add_node_visitor`]: super::TreeBuilder::add_node_visitor
    pub fn shared() -> (Rc<RefCell<Self>>, impl FnMut(&Node, Transition)) {
        let index = Rc::new(RefCell::new(Self::new()));
        let feed = Rc::clone(&index);
        (index, move |node: &Node, transition: Transition| feed.borrow_mut().observe(node, transition))
    }

    pub fn observe(&mut self, node: &Node, transition: Transition) {
        let stats = self
            .classes
            .entry(classify(&node.function_name).to_string())
            .or_default();
        match transition {
            Transition::Enter => stats.calls += 1,
            Transition::Exit => stats.total_duration += node.duration,
        }
    }

    pub fn get(&self, class: &str) -> Option<&NamespaceStats> {
        self.classes.get(class)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes ordered by total duration, largest first
    pub fn top_by_duration(&self, limit: usize) -> Vec<(&str, &NamespaceStats)> {
        let mut ranked: Vec<(&str, &NamespaceStats)> = self
            .classes
            .iter()
            .map(|(class, stats)| (class.as_str(), stats))
            .collect();
        ranked.sort_by(|a, b| b.1.total_duration.total_cmp(&a.1.total_duration));
        ranked.truncate(limit);
        ranked
    }
}

/// Qualifier of a traced function name
///
/// `App\Kernel->handle` and `App\Kernel::boot` belong to `App\Kernel`,
/// `App\helper` to `App`, plain functions to `(global)`.
pub fn classify(function_name: &str) -> &str {
    if SCRIPT_PSEUDO_CALLS.contains(&function_name) {
        return SCRIPT_CLASS;
    }
    if function_name.starts_with('{') {
        return CLOSURE_CLASS;
    }

    let method_separator = function_name
        .find("->")
        .into_iter()
        .chain(function_name.find("::"))
        .min();
    if let Some(position) = method_separator {
        return &function_name[..position];
    }

    match function_name.rfind('\\') {
        Some(position) if position > 0 => &function_name[..position],
        _ => GLOBAL_CLASS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{EntryRecord, ExitRecord};

    fn node(name: &str) -> Node {
        Node::from_entry(&EntryRecord {
            level: 1,
            function_seq: 0,
            time_index: 1.0,
            memory_usage: 0,
            function_name: name.to_string(),
            user_defined: true,
            include_file: String::new(),
            source_file: String::new(),
            source_line: 0,
            arguments: Vec::new(),
        })
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("{main}"), SCRIPT_CLASS);
        assert_eq!(classify("require_once"), SCRIPT_CLASS);
        assert_eq!(classify("{closure:/app/a.php:3-5}"), CLOSURE_CLASS);
        assert_eq!(classify("App\\Http\\Kernel->handle"), "App\\Http\\Kernel");
        assert_eq!(classify("App\\Model::find"), "App\\Model");
        assert_eq!(classify("App\\Support\\helper"), "App\\Support");
        assert_eq!(classify("strlen"), GLOBAL_CLASS);
    }

    #[test]
    fn test_index_counts_calls_and_durations() {
        let (index, mut visitor) = NamespaceIndex::shared();

        let mut call = node("App\\Model::find");
        visitor(&call, Transition::Enter);
        call.close(&ExitRecord {
            level: 1,
            function_seq: 0,
            time_index: 3.5,
            memory_usage: 0,
        });
        visitor(&call, Transition::Exit);
        visitor(&node("strlen"), Transition::Enter);

        let index = index.borrow();
        assert_eq!(index.len(), 2);
        let model = index.get("App\\Model").unwrap();
        assert_eq!(model.calls, 1);
        assert_eq!(model.total_duration, 2.5);
        assert_eq!(index.top_by_duration(1)[0].0, "App\\Model");
    }
}
