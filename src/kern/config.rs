//! Scheduler configuration
//!
//! Compile-time limits plus the boot-time `SchedConfig` a kernel hands to
//! [`Kernel::new`](crate::kern::kernel::Kernel::new).

use crate::kern::status::{KernError, KernResult};
use crate::types::Priority;

/// Maximum number of CPU cores supported
pub const MAX_CORES: usize = 32;

/// Number of thread priority levels (0 = highest)
pub const PRIO_LEVELS: usize = 32;

/// Maximum objects in one multi-object wait
pub const MAX_WAIT_ENTRIES: usize = 64;

/// Default time quantum in milliseconds
pub const DEFAULT_QUANTUM_MS: u32 = 10;

/// Default thread priority
pub const DEFAULT_PRIORITY: Priority = Priority(16);

/// Periodic system tick in milliseconds
pub const SYS_TICK_MS: u64 = 1;

/// Page size used for TLB invalidation ranges
pub const PAGE_SIZE: usize = 4096;

/// Start of the kernel half of the address space; mappings above it are
/// shared by every process so their TLB entries live on every core.
pub const DEFAULT_KERNEL_VA_BASE: usize = 0x8000_0000;

/// Default thread slot capacity
pub const DEFAULT_MAX_THREADS: u32 = 256;

/// Critical sections a single thread may hold at once
pub const MAX_OWNED_CRITSECS: usize = 8;

/// Largest mailbox a thread may create
pub const MAX_MAILBOX_SLOTS: u32 = 64;

/// Argument words carried by a message besides its code
pub const MSG_ARGS: usize = 3;

/// Boot-time scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Number of cores that will call `add_current_core`
    pub core_count: u32,
    /// Thread slab capacity
    pub max_threads: u32,
    /// Quantum handed to threads that do not set their own
    pub default_quantum_ms: u32,
    /// Priority handed to threads that do not set their own
    pub default_priority: Priority,
    /// Base of the globally shared kernel VA region
    pub kernel_va_base: usize,
    /// Period of the system tick
    pub tick_ms: u64,
}

impl SchedConfig {
    pub const fn new(core_count: u32) -> Self {
        Self {
            core_count,
            max_threads: DEFAULT_MAX_THREADS,
            default_quantum_ms: DEFAULT_QUANTUM_MS,
            default_priority: DEFAULT_PRIORITY,
            kernel_va_base: DEFAULT_KERNEL_VA_BASE,
            tick_ms: SYS_TICK_MS,
        }
    }

    pub const fn with_max_threads(mut self, max_threads: u32) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub const fn with_quantum(mut self, quantum_ms: u32) -> Self {
        self.default_quantum_ms = quantum_ms;
        self
    }

    pub const fn with_default_priority(mut self, prio: Priority) -> Self {
        self.default_priority = prio;
        self
    }

    pub const fn with_kernel_va_base(mut self, base: usize) -> Self {
        self.kernel_va_base = base;
        self
    }

    /// Check the configuration against compile-time limits
    pub fn validate(&self) -> KernResult<()> {
        if self.core_count == 0 || self.core_count as usize > MAX_CORES {
            return Err(KernError::BadArgument);
        }
        // The last index is reserved for the scheduler's own timer item
        if self.max_threads == 0 || self.max_threads >= crate::types::NIL - 1 {
            return Err(KernError::BadArgument);
        }
        if self.default_quantum_ms == 0 || self.tick_ms == 0 {
            return Err(KernError::BadArgument);
        }
        if !self.default_priority.is_valid() {
            return Err(KernError::BadArgument);
        }
        if self.kernel_va_base % PAGE_SIZE != 0 {
            return Err(KernError::BadArgument);
        }
        Ok(())
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SchedConfig::new(4).validate(), Ok(()));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert_eq!(SchedConfig::new(0).validate(), Err(KernError::BadArgument));
        assert_eq!(
            SchedConfig::new(MAX_CORES as u32 + 1).validate(),
            Err(KernError::BadArgument)
        );
        assert_eq!(
            SchedConfig::new(2).with_quantum(0).validate(),
            Err(KernError::BadArgument)
        );
        assert_eq!(
            SchedConfig::new(2)
                .with_default_priority(Priority::IDLE)
                .validate(),
            Err(KernError::BadArgument)
        );
        assert_eq!(
            SchedConfig::new(2).with_kernel_va_base(0x1234).validate(),
            Err(KernError::BadArgument)
        );
    }
}
