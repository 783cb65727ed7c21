//! Common types used across K2Sched
//!
//! This module defines shared identifiers to avoid circular dependencies.
//! Every kernel object the scheduler touches lives in a slab and is named
//! by its slot index; lists link those indices instead of pointers.

use core::fmt;

/// Sentinel for "no index" in packed atomic words and index links
pub const NIL: u32 = u32::MAX;

/// Thread identifier (slot in the scheduler's thread slab)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadId(pub u32);

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProcessId(pub u32);

/// Event object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EventId(pub u32);

/// Semaphore object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SemId(pub u32);

/// Alarm object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AlarmId(pub u32);

/// Mailbox object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MailboxId(pub u32);

/// Notify object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NotifyId(pub u32);

/// Kernel critical section identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CritSecId(pub u32);

/// CPU core index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CoreIndex(pub u32);

impl CoreIndex {
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CoreIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread{}", self.0)
    }
}

/// A reference to anything a thread can wait on.
///
/// Slot indices are reused once an object is cleaned up, so a reference
/// kept past cleanup names whatever occupies the slot next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjRef {
    Event(EventId),
    Semaphore(SemId),
    Thread(ThreadId),
    Process(ProcessId),
    Alarm(AlarmId),
    /// Only through a mailbox receive
    Mailbox(MailboxId),
    Notify(NotifyId),
}

// ============================================================================
// Priority
// ============================================================================

/// Thread priority. Lower value = higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// Highest priority
    pub const HIGHEST: Priority = Priority(0);
    /// Lowest priority a thread can hold
    pub const LOWEST: Priority = Priority(crate::kern::config::PRIO_LEVELS as u8 - 1);
    /// What an idle core advertises: worse than any thread
    pub const IDLE: Priority = Priority(crate::kern::config::PRIO_LEVELS as u8);

    pub const fn new(value: u8) -> Self {
        Priority(value)
    }

    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Strictly more urgent than `other`
    #[inline]
    pub const fn is_higher_than(self, other: Priority) -> bool {
        self.0 < other.0
    }

    /// Valid for a thread (not the idle marker)
    pub const fn is_valid(self) -> bool {
        (self.0 as usize) < crate::kern::config::PRIO_LEVELS
    }
}

impl Default for Priority {
    fn default() -> Self {
        crate::kern::config::DEFAULT_PRIORITY
    }
}

// ============================================================================
// Affinity
// ============================================================================

/// Set of cores a thread may run on (bit n = core n)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AffinityMask(pub u32);

impl AffinityMask {
    /// Any core
    pub const ALL: AffinityMask = AffinityMask(u32::MAX);

    /// Exactly one core
    pub const fn only(core: CoreIndex) -> Self {
        AffinityMask(1u32 << core.0)
    }

    #[inline]
    pub const fn allows(self, core: CoreIndex) -> bool {
        core.0 < 32 && (self.0 & (1u32 << core.0)) != 0
    }

    /// Restrict to the first `core_count` cores
    pub const fn within(self, core_count: u32) -> Self {
        if core_count >= 32 {
            self
        } else {
            AffinityMask(self.0 & ((1u32 << core_count) - 1))
        }
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for AffinityMask {
    fn default() -> Self {
        AffinityMask::ALL
    }
}
