#![cfg(not(loom))]

use std::collections::HashMap;

use counted_stack::Stack;
use crossbeam_utils::thread::scope;
use rand::Rng;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = if cfg!(miri) { 100 } else { 20_000 };

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Tagged {
    tag: usize,
    seq: usize,
    // Heap payload so a double free or a torn read shows up as corruption.
    payload: Box<String>,
}

impl Tagged {
    fn new(tag: usize, seq: usize) -> Self {
        Self {
            tag,
            seq,
            payload: Box::new(format!("{}:{}", tag, seq)),
        }
    }
}

#[test]
fn interleaved_push_pop_keeps_every_value() {
    let stack = Stack::new();

    let mut seen = scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|tag| {
                let stack = &stack;
                scope.spawn(move |_| {
                    let mut rng = rand::thread_rng();
                    let mut popped = Vec::new();
                    for seq in 0..OPS_PER_THREAD {
                        stack.push(Tagged::new(tag, seq));
                        if rng.gen_bool(0.5) {
                            if let Some(value) = stack.pop() {
                                popped.push(value);
                            }
                        }
                    }
                    popped
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();

    while let Some(value) = stack.pop() {
        seen.push(value);
    }

    let mut per_tag = HashMap::new();
    for value in &seen {
        assert_eq!(*value.payload, format!("{}:{}", value.tag, value.seq));
        *per_tag.entry(value.tag).or_insert(0) += 1;
    }
    for tag in 0..THREADS {
        assert_eq!(per_tag.get(&tag), Some(&OPS_PER_THREAD), "tag {}", tag);
    }

    seen.sort();
    let expected: Vec<_> = (0..THREADS)
        .flat_map(|tag| (0..OPS_PER_THREAD).map(move |seq| Tagged::new(tag, seq)))
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn each_thread_sees_its_own_lifo_order() {
    let stack = Stack::new();

    scope(|scope| {
        for tag in 0..THREADS {
            let stack = &stack;
            scope.spawn(move |_| {
                for seq in 0..OPS_PER_THREAD {
                    stack.push((tag, seq));
                }
            });
        }
    })
    .unwrap();

    // With pushes finished, each thread's values come back newest first.
    let mut last_seq = vec![usize::MAX; THREADS];
    let mut count = 0;
    while let Some((tag, seq)) = stack.pop() {
        assert!(seq < last_seq[tag], "tag {} popped {} after {}", tag, seq, last_seq[tag]);
        last_seq[tag] = seq;
        count += 1;
    }
    assert_eq!(count, THREADS * OPS_PER_THREAD);
}

#[test]
fn empty_after_balanced_traffic() {
    let stack = Stack::new();

    scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|_| {
                for i in 0..OPS_PER_THREAD {
                    stack.push(i);
                    assert!(stack.pop().is_some());
                }
            });
        }
    })
    .unwrap();

    assert_eq!(stack.pop(), None);
    assert_eq!(stack.pop(), None);
}
