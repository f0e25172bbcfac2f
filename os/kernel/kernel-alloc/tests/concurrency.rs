mod common;

use common::Machine;
use kernel_alloc::{AllocatorConfig, UnderflowPolicy};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

#[test]
fn concurrent_allocations_never_hand_out_a_frame_twice() {
    let m = Machine::booted(256);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let frames = m.frames.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                std::iter::from_fn(|| frames.allocate_page()).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for pa in handle.join().unwrap() {
            assert!(seen.insert(pa), "{pa} allocated twice");
        }
    }
    assert_eq!(seen.len(), 256);
    assert_eq!(m.frames.stats().free, 0);
}

#[test]
fn allocate_free_churn_preserves_the_frame_count() {
    let m = Machine::booted(64);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let frames = m.frames.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut held = Vec::new();
                for round in 0..500 {
                    if (round + t) % 3 == 2 {
                        if let Some(pa) = held.pop() {
                            frames.free_page(pa);
                        }
                    } else if let Some(pa) = frames.allocate_page() {
                        held.push(pa);
                    }
                }
                for pa in held {
                    frames.free_page(pa);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = m.frames.stats();
    assert_eq!(stats.free, 64);
    let all: HashSet<_> = m.drain().into_iter().collect();
    assert_eq!(all.len(), 64);
}

#[test]
fn concurrent_reference_updates_are_not_lost() {
    let m = Machine::booted_with(4, AllocatorConfig::new().with_underflow(UnderflowPolicy::Fatal));
    let pa = m.frames.allocate_page().unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let frames = m.frames.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    frames.increment_ref(pa);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(m.frames.read_ref(pa), 80);

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let frames = m.frames.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..10).map(|_| frames.release_mapping(pa)).filter(|&c| c == 0).count()
            })
        })
        .collect();
    let zero_observed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Exactly one sharer saw the count reach zero and freed the frame.
    assert_eq!(zero_observed, 1);
    assert_eq!(m.frames.read_ref(pa), 0);
    assert_eq!(m.frames.stats().free, 4);
}
