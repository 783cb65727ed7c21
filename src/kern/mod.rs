//! Kern subsystem - scheduler core
//!
//! Contains the per-core event funnel, the single scheduling core and
//! everything it mutates: ready lists, the timer delta-chain, wait
//! composition and the waitable kernel objects.

pub mod config;
pub mod counters;
pub mod status;

pub mod queue;
pub mod slab;

pub mod core_event;
pub mod ici;
pub mod platform;
pub mod processor;

pub mod runq;
pub mod timer;

pub mod objects;
pub mod thread;
pub mod wait;

pub mod sched;
pub mod sched_item;

pub mod kernel;

pub use config::SchedConfig;
pub use core_event::CoreEvent;
pub use counters::CounterSnapshot;
pub use ici::{IciKind, TlbRequest};
pub use kernel::{CoreRun, Kernel, ThreadInfo};
pub use objects::Message;
pub use platform::Platform;
pub use sched_item::{AlarmChange, EventChange, SchedItem, WaitRequest};
pub use status::{ItemOutput, ItemResult, KernError, KernResult};
pub use thread::{LifeStage, RunState, ThreadAttr};
