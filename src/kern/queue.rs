//! Lock-free index-linked stack
//!
//! The cross-core handoff primitive. Nodes are small integers (an event
//! slot, a thread slot); the `next` links live in a [`LinkArena`] owned by
//! whoever owns the node storage, so a node is "embedded" in its owner and
//! never separately allocated.
//!
//! ## Usage Pattern
//!
//! ```ignore
//! let arena = LinkArena::new(8);
//! let stack = AtomicStack::new();
//! stack.push(&arena, 3);          // any context, never blocks
//! for node in stack.drain(&arena) {
//!     // oldest push first
//! }
//! ```
//!
//! Producers may push concurrently with each other and with a drain. Only
//! one consumer drains a given stack. A node must not be pushed again until
//! the consumer has taken it off a drained batch; owners enforce this with
//! a per-node "queued" flag cleared after the node is yielded.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::types::NIL;

// ============================================================================
// Link Arena
// ============================================================================

/// Storage for the `next` link of every node that can be queued
#[derive(Debug)]
pub struct LinkArena {
    links: Box<[AtomicU32]>,
}

impl LinkArena {
    /// Create links for nodes `0..len`
    pub fn new(len: usize) -> Self {
        let links: Vec<AtomicU32> = (0..len).map(|_| AtomicU32::new(NIL)).collect();
        Self {
            links: links.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[inline]
    fn next(&self, node: u32) -> u32 {
        self.links[node as usize].load(Ordering::Relaxed)
    }

    #[inline]
    fn set_next(&self, node: u32, next: u32) {
        self.links[node as usize].store(next, Ordering::Relaxed);
    }
}

// ============================================================================
// Atomic Stack
// ============================================================================

/// Multi-producer, single-consumer LIFO of node indices
#[derive(Debug)]
pub struct AtomicStack {
    head: AtomicU32,
}

impl AtomicStack {
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(NIL),
        }
    }

    /// Push `node`; retries while concurrent pushes move the head
    pub fn push(&self, arena: &LinkArena, node: u32) {
        sched_assert!(
            (node as usize) < arena.len(),
            "queue node {} outside arena of {}",
            node,
            arena.len()
        );
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            arena.set_next(node, head);
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => head = observed,
            }
        }
    }

    /// Whether anything is queued right now
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == NIL
    }

    /// Take everything pushed so far, oldest first
    pub fn drain<'a>(&self, arena: &'a LinkArena) -> Drain<'a> {
        let mut node = self.head.swap(NIL, Ordering::Acquire);

        // Reverse the LIFO chain into push order
        let mut fifo = NIL;
        while node != NIL {
            let next = arena.next(node);
            arena.set_next(node, fifo);
            fifo = node;
            node = next;
        }

        Drain { arena, node: fifo }
    }
}

/// Iterator over a drained batch
///
/// Each node's link is read before the node is yielded, so the consumer may
/// release the node for re-pushing as soon as it sees it.
pub struct Drain<'a> {
    arena: &'a LinkArena,
    node: u32,
}

impl Iterator for Drain<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.node == NIL {
            return None;
        }
        let node = self.node;
        self.node = self.arena.next(node);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_is_push_order() {
        let arena = LinkArena::new(8);
        let stack = AtomicStack::new();
        assert!(stack.is_empty());

        stack.push(&arena, 3);
        stack.push(&arena, 1);
        stack.push(&arena, 6);
        assert!(!stack.is_empty());

        let got: Vec<u32> = stack.drain(&arena).collect();
        assert_eq!(got, vec![3, 1, 6]);
        assert!(stack.is_empty());
        assert_eq!(stack.drain(&arena).count(), 0);
    }

    #[test]
    fn test_node_can_be_requeued_after_yield() {
        let arena = LinkArena::new(4);
        let stack = AtomicStack::new();
        stack.push(&arena, 0);
        stack.push(&arena, 2);

        let mut seen = Vec::new();
        for node in stack.drain(&arena) {
            seen.push(node);
            if node == 0 {
                stack.push(&arena, 0);
            }
        }
        assert_eq!(seen, vec![0, 2]);
        assert_eq!(stack.drain(&arena).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    #[should_panic]
    fn test_push_out_of_range_panics() {
        let arena = LinkArena::new(2);
        AtomicStack::new().push(&arena, 2);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: u32 = 4;
        const PER: u32 = 250;

        let arena = Arc::new(LinkArena::new((PRODUCERS * PER) as usize));
        let stack = Arc::new(AtomicStack::new());

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let arena = Arc::clone(&arena);
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    for i in 0..PER {
                        stack.push(&arena, p * PER + i);
                    }
                })
            })
            .collect();

        let mut seen = vec![false; (PRODUCERS * PER) as usize];
        let mut count = 0;
        while count < PRODUCERS * PER {
            for node in stack.drain(&arena) {
                assert!(!seen[node as usize], "node {} drained twice", node);
                seen[node as usize] = true;
                count += 1;
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(seen.iter().all(|s| *s));
        assert!(stack.is_empty());
    }
}
