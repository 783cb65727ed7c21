//! Scheduler view of a thread
//!
//! Two independent state machines describe a thread. Its life stage only
//! moves forward (`Init` through `Cleanup`); it becomes waitable-signalled
//! once it reaches `Exited`. Its run state says where the scheduler has it
//! right now, with `Transition` covering the moments the scheduler is
//! moving it (a preempted thread whose core has not yet let go, or the
//! thread whose own scheduler item is executing).

use heapless::Vec as HVec;

use crate::kern::config::{SchedConfig, MAX_OWNED_CRITSECS};
use crate::kern::status::{KernError, KernResult};
use crate::kern::wait::{MacroWait, WaitEntryPrioList};
use crate::types::{AffinityMask, CoreIndex, CritSecId, Priority, ProcessId, ThreadId};

/// Monotonic lifetime of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifeStage {
    Init,
    Instantiated,
    Run,
    Exited,
    Killed,
    Cleanup,
}

/// Where the scheduler currently holds a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    None,
    Transition,
    Ready,
    Running,
    BlockedCs,
    Waiting,
    Stopped,
}

/// Where a thread goes once it is off its core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterStop {
    ReadyHead,
    ReadyTail,
    Stopped,
    Waiting,
    BlockedCs,
    Exited,
}

/// Caller-settable scheduling attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAttr {
    pub priority: Priority,
    pub affinity: AffinityMask,
    pub quantum_ms: u32,
}

impl ThreadAttr {
    pub const fn new(priority: Priority) -> Self {
        Self {
            priority,
            affinity: AffinityMask::ALL,
            quantum_ms: crate::kern::config::DEFAULT_QUANTUM_MS,
        }
    }

    pub const fn with_affinity(mut self, affinity: AffinityMask) -> Self {
        self.affinity = affinity;
        self
    }

    pub const fn with_quantum(mut self, quantum_ms: u32) -> Self {
        self.quantum_ms = quantum_ms;
        self
    }

    /// Defaults from the boot configuration
    pub fn from_config(config: &SchedConfig) -> Self {
        Self::new(config.default_priority).with_quantum(config.default_quantum_ms)
    }

    /// Check against the configured system; affinity is clipped to the
    /// cores that exist and must leave at least one.
    pub fn validate(self, config: &SchedConfig) -> KernResult<Self> {
        if !self.priority.is_valid() || self.quantum_ms == 0 {
            return Err(KernError::BadArgument);
        }
        let affinity = self.affinity.within(config.core_count);
        if affinity.is_empty() {
            return Err(KernError::BadArgument);
        }
        Ok(Self { affinity, ..self })
    }
}

/// Per-thread scheduler state
#[derive(Debug)]
pub struct SchedThread {
    pub id: ThreadId,
    /// Creation serial, unique across slot reuse
    pub serial: u64,
    pub process: ProcessId,
    pub base_prio: Priority,
    pub active_prio: Priority,
    pub attr: ThreadAttr,
    pub quantum_left: u32,
    pub last_stop_time: u64,
    pub total_run_time: u64,
    pub run_start: u64,
    pub last_run_core: Option<CoreIndex>,
    /// Core and sequence of the live dispatch while Running
    pub dispatch: Option<(CoreIndex, u32)>,
    pub owned_critsecs: HVec<CritSecId, MAX_OWNED_CRITSECS>,
    pub blocked_on: Option<CritSecId>,
    /// Stop requested while the thread could not be stopped directly
    pub action_pending: bool,
    pub life: LifeStage,
    pub run_state: RunState,
    pub after_transition: AfterStop,
    pub wait: Option<MacroWait>,
    /// Threads waiting for this thread to exit
    pub waiters: WaitEntryPrioList,
    pub exit_code: u32,
    pub last_wait_ms: u64,
}

impl SchedThread {
    pub fn new(id: ThreadId, serial: u64, process: ProcessId, attr: ThreadAttr) -> Self {
        Self {
            id,
            serial,
            process,
            base_prio: attr.priority,
            active_prio: attr.priority,
            attr,
            quantum_left: attr.quantum_ms,
            last_stop_time: 0,
            total_run_time: 0,
            run_start: 0,
            last_run_core: None,
            dispatch: None,
            owned_critsecs: HVec::new(),
            blocked_on: None,
            action_pending: false,
            life: LifeStage::Init,
            run_state: RunState::None,
            after_transition: AfterStop::ReadyHead,
            wait: None,
            waiters: WaitEntryPrioList::new(),
            exit_code: 0,
            last_wait_ms: 0,
        }
    }

    /// Move the life stage forward
    pub fn advance_life(&mut self, next: LifeStage) {
        sched_assert!(
            next > self.life,
            "{} life stage cannot go from {:?} to {:?}",
            self.id,
            self.life,
            next
        );
        self.life = next;
    }

    pub fn has_exited(&self) -> bool {
        self.life >= LifeStage::Exited
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.run_state, RunState::Ready | RunState::Running)
    }

    pub fn refill_quantum(&mut self) {
        self.quantum_left = self.attr.quantum_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_validation() {
        let cfg = SchedConfig::new(2);
        let attr = ThreadAttr::new(Priority(3)).with_affinity(AffinityMask(0b110));
        assert_eq!(attr.validate(&cfg).unwrap().affinity, AffinityMask(0b10));
        assert_eq!(
            ThreadAttr::new(Priority(3))
                .with_affinity(AffinityMask(0b100))
                .validate(&cfg),
            Err(KernError::BadArgument)
        );
        assert_eq!(
            ThreadAttr::new(Priority::IDLE).validate(&cfg),
            Err(KernError::BadArgument)
        );
        assert_eq!(
            ThreadAttr::new(Priority(1)).with_quantum(0).validate(&cfg),
            Err(KernError::BadArgument)
        );
    }

    #[test]
    fn test_life_moves_forward() {
        let mut t = SchedThread::new(ThreadId(0), 1, ProcessId(0), ThreadAttr::new(Priority(4)));
        t.advance_life(LifeStage::Instantiated);
        t.advance_life(LifeStage::Run);
        assert!(!t.has_exited());
        t.advance_life(LifeStage::Exited);
        assert!(t.has_exited());
    }

    #[test]
    #[should_panic]
    fn test_life_cannot_go_back() {
        let mut t = SchedThread::new(ThreadId(0), 1, ProcessId(0), ThreadAttr::new(Priority(4)));
        t.advance_life(LifeStage::Run);
        t.advance_life(LifeStage::Instantiated);
    }
}
