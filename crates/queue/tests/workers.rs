//! Multi-worker dispatch over real threads.
//!
//! Workers block on `get_item(wait = true)`, rebuild by bumping the shared
//! file table, and report back; the queue must release dependents only
//! after every prerequisite is done and must drain every waiter on both
//! the success and the abort path.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use ilmari_core::{MISSING, OracleMap, Timestamp};
use ilmari_graph::Graph;
use ilmari_queue::{QueueError, WorkQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    File,
}

type Files = Arc<Mutex<HashMap<&'static str, Timestamp>>>;

fn file_oracles(files: &Files) -> OracleMap<Kind, &'static str> {
    let reader = Arc::clone(files);
    let mut oracles = OracleMap::new();
    oracles.insert(Kind::File, move |name: &&'static str| {
        reader.lock().unwrap().get(name).copied().unwrap_or(MISSING)
    });
    oracles
}

/// binary <- four objects, each object <- its source + a shared header.
fn project() -> Graph<&'static str, Kind> {
    let mut g = Graph::new();
    for key in [
        "binary", "src1.o", "src2.o", "src3.o", "src4.o", "src1.c", "src2.c", "src3.c", "src4.c",
        "common.h",
    ] {
        g.add_vertex(key, Kind::File).unwrap();
    }
    g.add_edges(&"binary", &["src1.o", "src2.o", "src3.o", "src4.o"])
        .unwrap();
    g.add_edges(&"src1.o", &["src1.c", "common.h"]).unwrap();
    g.add_edges(&"src2.o", &["src2.c", "common.h"]).unwrap();
    g.add_edges(&"src3.o", &["src3.c", "common.h"]).unwrap();
    g.add_edges(&"src4.o", &["src4.c", "common.h"]).unwrap();
    g
}

#[test]
fn four_workers_drain_a_cold_build() {
    let files: Files = Arc::new(Mutex::new(
        [
            ("src1.c", 1),
            ("src2.c", 2),
            ("src3.c", 3),
            ("src4.c", 4),
            ("common.h", 5),
        ]
        .into_iter()
        .collect(),
    ));

    let g = project();
    assert!(!g.is_cyclic());

    let queue = WorkQueue::new(&g, &"binary", file_oracles(&files)).unwrap();
    assert_eq!(queue.ready_count(), 4);

    let clock = AtomicUsize::new(100);
    let dispatched = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let order: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                loop {
                    match queue.get_item(true) {
                        Ok(Some(item)) => {
                            dispatched.fetch_add(1, Ordering::SeqCst);

                            // "Rebuild": give the artifact a fresh age.
                            let ts = clock.fetch_add(1, Ordering::SeqCst) as Timestamp;
                            files.lock().unwrap().insert(item, ts);
                            order.lock().unwrap().push(item);

                            if queue.mark_done(&item).is_err() {
                                queue.mark_error();
                                break;
                            }
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
            });
        }
    });

    assert!(queue.done());
    assert_eq!(queue.get_item(false).unwrap(), None);

    // Every dispatch was matched by a completion: 4 objects + the binary.
    assert_eq!(dispatched.load(Ordering::SeqCst), 5);
    assert_eq!(completed.load(Ordering::SeqCst), 5);

    let order = order.lock().unwrap();
    let pos = |name: &str| order.iter().position(|built| *built == name).unwrap();
    for object in ["src1.o", "src2.o", "src3.o", "src4.o"] {
        assert!(
            pos(object) < pos("binary"),
            "{object} must precede the binary"
        );
    }

    // Sources were current and must not have been rebuilt.
    let files = files.lock().unwrap();
    assert_eq!(files.get("src1.c"), Some(&1));
    assert_eq!(files.get("common.h"), Some(&5));
}

#[test]
fn worker_abort_unblocks_every_waiter() {
    let files: Files = Arc::new(Mutex::new([("bad.c", 1)].into_iter().collect()));

    let mut g: Graph<&'static str, Kind> = Graph::new();
    for key in ["top", "bad.o", "bad.c"] {
        g.add_vertex(key, Kind::File).unwrap();
    }
    g.add_edge(&"top", &"bad.o").unwrap();
    g.add_edge(&"bad.o", &"bad.c").unwrap();

    let queue = WorkQueue::new(&g, &"top", file_oracles(&files)).unwrap();
    assert_eq!(queue.ready_count(), 1);

    thread::scope(|scope| {
        for _ in 0..3 {
            scope.spawn(|| {
                loop {
                    match queue.get_item(true) {
                        Ok(Some(_item)) => {
                            // The build of bad.o fails; abort without
                            // touching the file table.
                            queue.mark_error();
                            break;
                        }
                        Ok(None) => break,
                        Err(QueueError::Aborted) => break,
                        Err(_) => break,
                    }
                }
            });
        }
    });

    assert!(queue.done());
    assert_eq!(queue.get_item(false), Err(QueueError::Aborted));
    assert_eq!(queue.mark_done(&"bad.o"), Err(QueueError::Aborted));

    // top was never dispatched.
    assert_eq!(files.lock().unwrap().get("top"), None);
}
