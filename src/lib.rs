//! K2Sched - multi-core preemptive priority scheduler core
//!
//! This crate provides the scheduling heart of a small kernel: a single
//! "scheduling core" that serializes every thread state transition, the
//! per-core event queues that funnel interrupts and scheduler calls into it,
//! a delta-chain timer list, multi-object wait composition, and the
//! cross-core TLB invalidation rendezvous.
//!
//! Hardware is reached only through [`kern::platform::Platform`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]
// Kernel-appropriate clippy configuration
// Many kernel types have specialized initialization that doesn't fit Default
#![allow(clippy::new_without_default)]
// Scheduler items carry large wait requests inline
#![allow(clippy::large_enum_variant)]

// Standard library replacement for no_std
extern crate alloc;

/// Assert a scheduler invariant.
///
/// A broken invariant means scheduler state is corrupt; there is no
/// recovery path, so this logs and panics.
macro_rules! sched_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            ::log::error!(target: "sched", $($arg)+);
            panic!($($arg)+);
        }
    };
}

/// Report a broken scheduler invariant and panic. Usable where a value is
/// expected.
macro_rules! sched_fatal {
    ($($arg:tt)+) => {{
        ::log::error!(target: "sched", $($arg)+);
        panic!($($arg)+)
    }};
}

// Core types
pub mod types;

pub mod console;
pub mod kern;

pub use kern::kernel::{CoreRun, Kernel};
pub use kern::status::{ItemOutput, ItemResult, KernError, KernResult};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = "K2Sched";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(NAME, "K2Sched");
        assert!(!VERSION.is_empty());
    }
}
