//! Timer delta-chain
//!
//! Pending deadlines (thread-wait timeouts and alarms) form one list sorted
//! by deadline. Each node stores only its distance from the node before it,
//! so advancing time touches the head alone and deadlines that coincide
//! pop together.
//!
//! Nodes are embedded in their owners (a thread's macro wait, an alarm) and
//! linked by [`TimerKey`]; the owner storage is reached through
//! [`TimerStore`].

use alloc::vec::Vec;

use crate::types::{AlarmId, ThreadId};

// ============================================================================
// Timer Items
// ============================================================================

/// Names the owner of a timer item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Timeout of a thread's wait
    Wait(ThreadId),
    /// An alarm object's period
    Alarm(AlarmId),
}

/// Link node embedded in a timer owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerItem {
    pub on_queue: bool,
    pub next: Option<TimerKey>,
    /// Milliseconds after the previous node (or after "now" for the head)
    pub delta: u64,
}

impl TimerItem {
    pub const fn new() -> Self {
        Self {
            on_queue: false,
            next: None,
            delta: 0,
        }
    }
}

/// Resolves keys to the items embedded in their owners
pub trait TimerStore {
    fn item(&self, key: TimerKey) -> &TimerItem;
    fn item_mut(&mut self, key: TimerKey) -> &mut TimerItem;
}

// ============================================================================
// Timer Chain
// ============================================================================

/// Head of the delta-chain
#[derive(Debug, Default)]
pub struct TimerChain {
    head: Option<TimerKey>,
}

impl TimerChain {
    pub const fn new() -> Self {
        Self { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn head(&self) -> Option<TimerKey> {
        self.head
    }

    /// Milliseconds until the earliest deadline
    pub fn head_delta<S: TimerStore>(&self, store: &S) -> Option<u64> {
        self.head.map(|k| store.item(k).delta)
    }

    /// Insert `key` to fire `wait_ms` after `start_ms`, measured against
    /// the chain's current time `now_ms`. Returns true when the item became
    /// the new head, i.e. the deadline timer may need to fire sooner.
    ///
    /// Items with equal deadlines fire in insertion order.
    pub fn add<S: TimerStore>(
        &mut self,
        store: &mut S,
        key: TimerKey,
        now_ms: u64,
        start_ms: u64,
        wait_ms: u64,
    ) -> bool {
        sched_assert!(!store.item(key).on_queue, "{:?} is already on the timer chain", key);

        let mut remaining = start_ms.saturating_add(wait_ms).saturating_sub(now_ms);
        let mut prev: Option<TimerKey> = None;
        let mut cur = self.head;

        while let Some(k) = cur {
            let node = store.item_mut(k);
            if remaining < node.delta {
                node.delta -= remaining;
                break;
            }
            remaining -= node.delta;
            prev = Some(k);
            cur = node.next;
        }

        let item = store.item_mut(key);
        item.on_queue = true;
        item.delta = remaining;
        item.next = cur;

        match prev {
            Some(p) => {
                store.item_mut(p).next = Some(key);
                false
            }
            None => {
                self.head = Some(key);
                true
            }
        }
    }

    /// Unlink `key`, folding its delta into its successor. Returns false if
    /// it was not on the chain.
    pub fn remove<S: TimerStore>(&mut self, store: &mut S, key: TimerKey) -> bool {
        if !store.item(key).on_queue {
            return false;
        }

        let mut prev: Option<TimerKey> = None;
        let mut cur = self.head;
        while let Some(k) = cur {
            if k == key {
                break;
            }
            prev = Some(k);
            cur = store.item(k).next;
        }
        sched_assert!(cur.is_some(), "{:?} marked queued but not on the timer chain", key);

        let TimerItem { next, delta, .. } = *store.item(key);
        if let Some(n) = next {
            store.item_mut(n).delta += delta;
        }
        match prev {
            Some(p) => store.item_mut(p).next = next,
            None => self.head = next,
        }

        *store.item_mut(key) = TimerItem::new();
        true
    }

    /// Let `elapsed_ms` pass; returns every item whose deadline was reached,
    /// earliest first, with how many milliseconds ago that deadline was.
    pub fn advance<S: TimerStore>(
        &mut self,
        store: &mut S,
        elapsed_ms: u64,
    ) -> Vec<(TimerKey, u64)> {
        let mut left = elapsed_ms;
        let mut fired = Vec::new();

        while let Some(h) = self.head {
            let node = store.item_mut(h);
            if node.delta > left {
                node.delta -= left;
                break;
            }
            left -= node.delta;
            self.head = node.next;
            *node = TimerItem::new();
            fired.push((h, left));
        }

        fired
    }

    /// Milliseconds from now until `key` fires
    pub fn remaining<S: TimerStore>(&self, store: &S, key: TimerKey) -> Option<u64> {
        let mut total = 0u64;
        let mut cur = self.head;
        while let Some(k) = cur {
            let node = store.item(k);
            total += node.delta;
            if k == key {
                return Some(total);
            }
            cur = node.next;
        }
        None
    }

    /// Keys in firing order
    pub fn keys<S: TimerStore>(&self, store: &S) -> Vec<TimerKey> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while let Some(k) = cur {
            out.push(k);
            cur = store.item(k).next;
        }
        out
    }
}
