//! Caller-visible status codes
//!
//! Errors that normal use can reach (a timeout elapsing, a slab filling up)
//! travel back to the calling thread through its scheduler item's result.
//! Broken scheduler invariants never become a `KernError`; they panic.

use thiserror::Error;

use crate::kern::objects::Message;
use crate::types::{CritSecId, ObjRef, ProcessId, ThreadId};

/// Kernel status codes returned through scheduler item results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernError {
    /// The wait's deadline passed before it was satisfied
    #[error("wait timed out")]
    Timeout,
    /// A bounded table is full
    #[error("out of resources")]
    OutOfResources,
    /// An argument is out of range or malformed
    #[error("bad argument")]
    BadArgument,
    /// The referenced object does not exist
    #[error("object not found")]
    NotFound,
    /// The target is not in a state that allows the operation
    #[error("invalid state for operation")]
    InvalidState,
    /// A counted object would exceed its configured maximum
    #[error("limit exceeded")]
    LimitExceeded,
}

/// Result type for kernel operations
pub type KernResult<T> = Result<T, KernError>;

/// Index of the first object in a wait; `Signalled(i)` means
/// `WAIT_SIGNALLED_0 + i`.
pub const WAIT_SIGNALLED_0: u32 = 0;

/// Successful output of a scheduler item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutput {
    /// Nothing to report
    None,
    /// A wait completed; the value is the satisfying entry's index
    Signalled(u32),
    /// A thread was created
    Thread(ThreadId),
    /// A process was created
    Process(ProcessId),
    /// A waitable object was created
    Object(ObjRef),
    /// A critical section was created
    CritSec(CritSecId),
    /// A count (e.g. a semaphore's count before release)
    Count(u32),
    /// A wait completed through a notify; `flags` are the bits it took
    Notified { index: u32, flags: u32 },
    /// A mailbox receive completed
    Message(Message),
}

/// What the originating thread reads back after re-dispatch
pub type ItemResult = KernResult<ItemOutput>;
