use std::cell::RefCell;
use std::rc::Rc;

use xtrace_tree::parser::parse_record_line;
use xtrace_tree::reader::{MemorySource, TraceRecordReader};
use xtrace_tree::tree::{InterruptOutcome, Node, TreeBuilder};
use xtrace_tree::utils::error::BuildError;

fn feed(builder: &mut TreeBuilder, lines: &[&str]) -> Result<(), BuildError> {
    for line in lines {
        builder.apply(&parse_record_line(line)?)?;
    }
    Ok(())
}

#[test]
fn test_single_call() {
    let mut builder = TreeBuilder::new();
    feed(
        &mut builder,
        &["1\t0\t0\t0\t100\tf1\t1\t\t/app.php\t1", "1\t0\t1\t5\t120"],
    )
    .unwrap();

    let root = builder.root().unwrap();
    assert_eq!(root.duration, 5.0);
    assert_eq!(root.delta_memory_usage, Some(20));
    assert!(root.children.is_empty());
    assert_eq!(root.index, None);
    assert_eq!(builder.depth(), 0);
}

#[test]
fn test_nested_call() {
    let mut builder = TreeBuilder::new();
    feed(
        &mut builder,
        &[
            "1\t0\t0\t0\t100\tf1\t1\t\t/app.php\t1",
            "2\t1\t0\t1\t100\tf2\t1\t\t/app.php\t2",
            "2\t1\t1\t3\t100",
            "1\t0\t1\t4\t100",
        ],
    )
    .unwrap();

    let root = builder.root().unwrap();
    assert_eq!(root.duration, 4.0);
    let child = root.child(0).unwrap();
    assert_eq!(child.duration, 2.0);
    assert_eq!(child.index, Some(0));
    assert_eq!(child.function_name, "f2");
}

#[test]
fn test_exit_first_is_rejected() {
    let mut builder = TreeBuilder::new();
    let err = feed(&mut builder, &["1\t0\t1\t5\t120"]).unwrap_err();
    assert!(matches!(err, BuildError::UnexpectedFirstRecord(_)));
    assert!(builder.root().is_none());
}

#[test]
fn test_open_ancestors_track_latest_event() {
    let mut builder = TreeBuilder::new();
    feed(
        &mut builder,
        &[
            "1\t0\t0\t0\t100\tf1\t1\t\t/app.php\t1",
            "2\t1\t0\t1\t100\tf2\t1\t\t/app.php\t2",
            "3\t2\t0\t2.5\t100\tf3\t1\t\t/app.php\t3",
        ],
    )
    .unwrap();

    assert_eq!(builder.path(), &[0, 0]);
    let root = builder.root().unwrap();
    assert_eq!(root.duration, 2.5);
    assert_eq!(root.child(0).unwrap().duration, 1.5);
    assert!(root.is_open());

    feed(&mut builder, &["3\t2\t1\t4\t100"]).unwrap();
    let root = builder.root().unwrap();
    assert_eq!(root.duration, 4.0);
    assert_eq!(root.child(0).unwrap().duration, 3.0);
    assert_eq!(builder.path(), &[0]);
}

#[test]
fn test_siblings_get_sequential_indices() {
    let mut builder = TreeBuilder::new();
    let mut lines = vec!["1\t0\t0\t0\t100\tmain\t1\t\t/app.php\t1".to_string()];
    for i in 0..5 {
        lines.push(format!("2\t{}\t0\t{}\t100\tstep\t1\t\t/app.php\t2", i + 1, i));
        lines.push(format!("2\t{}\t1\t{}.5\t100", i + 1, i));
    }
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    feed(&mut builder, &lines).unwrap();

    let indices: Vec<Option<usize>> = builder.root().unwrap().child_nodes().map(|n| n.index).collect();
    assert_eq!(indices, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn test_returns_and_meta_do_not_change_shape() {
    let mut builder = TreeBuilder::new();
    feed(
        &mut builder,
        &[
            "1\t0\t0\t0\t100\tf1\t1\t\t/app.php\t1",
            "2\t1\t0\t1\t100\tf2\t1\t\t/app.php\t2",
            "2\t1\tR\t\t\t42",
            "2\t1\t1\t3\t100",
        ],
    )
    .unwrap();

    let root = builder.root().unwrap();
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.duration, 3.0);
}

#[test]
fn test_interrupt_from_another_thread_resolves() {
    let mut trace = String::from("Version: 3.1.0\nFile format: 4\n1\t0\t0\t0\t100\tmain\t1\t\t/app.php\t1\n");
    for i in 0..200 {
        trace.push_str(&format!("2\t{}\t0\t{}\t100\tf\t1\t\t/app.php\t2\n2\t{}\t1\t{}.5\t100\n", i + 1, i, i + 1, i));
    }
    trace.push_str("1\t0\t1\t500\t100\n");

    let mut reader = TraceRecordReader::with_chunk_size(MemorySource::new(trace), 128);
    let mut builder = TreeBuilder::new();

    let pending = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&pending);
    builder.subscribe(move |root: &Node, handle| {
        if root.children.len() == 50 && slot.borrow().is_none() {
            let handle = handle.clone();
            let waiter = std::thread::spawn(move || handle.interrupt().wait());
            *slot.borrow_mut() = Some(waiter);
            // Give the other thread time to raise the flag
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
    });

    let err = builder.build(&mut reader).unwrap_err();
    assert!(err.is_interrupted());

    let waiter = pending.borrow_mut().take().unwrap();
    assert_eq!(waiter.join().unwrap(), InterruptOutcome::Interrupted);

    // A second build starts clean
    let root = builder.build(&mut reader).unwrap();
    assert_eq!(root.children.len(), 200);
}
