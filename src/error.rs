//! The error vocabulary and the coroutine state machine.
//!
//! Both enumerations are closed sets with stable textual forms. The engine
//! itself never logs or prints; errors are only ever surfaced to the
//! immediate caller as values.

use core::fmt;

/// Failure codes returned by fallible coroutine operations.
///
/// Success is represented by [`Result::Ok`] rather than by a variant, so
/// this enumeration only carries failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// Unclassified failure.
    #[error("generic error")]
    Generic,

    /// A required pointer argument was null.
    #[error("invalid pointer")]
    InvalidPointer,

    /// The operation was applied to a null or torn-down coroutine.
    #[error("invalid coroutine")]
    InvalidCoroutine,

    /// Resume requires the coroutine to be suspended.
    #[error("coroutine not suspended")]
    NotSuspended,

    /// Yield requires the coroutine to be running.
    #[error("coroutine not running")]
    NotRunning,

    /// The platform context could not be prepared.
    #[error("make context error")]
    MakeContext,

    /// The platform context switch failed.
    #[error("switch context error")]
    SwitchContext,

    /// The data channel does not have room (push) or content (pop/peek) for
    /// the requested byte count.
    #[error("not enough space")]
    NotEnoughSpace,

    /// The allocator returned nothing for the coroutine block.
    #[error("out of memory")]
    OutOfMemory,

    /// An argument failed validation before any state was touched.
    #[error("invalid arguments")]
    InvalidArguments,

    /// The operation is not legal in the coroutine's current state.
    #[error("invalid operation")]
    InvalidOperation,

    /// The magic sentinel was clobbered or the stack pointer left the
    /// coroutine stack. Advisory only: by the time this is detected the
    /// stack is already trashed, so the coroutine must be treated as dead.
    #[error("stack overflow")]
    StackOverflow,
}

/// Lifecycle state of a coroutine.
///
/// The only legal transitions are `suspended -> running` (resume),
/// `running -> suspended` (yield), `running -> normal` (resumed a child),
/// `normal -> running` (the child yielded or died) and `running -> dead`
/// (the body returned).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// The body has returned; the coroutine can no longer be resumed.
    Dead = 0,

    /// The coroutine has resumed another coroutine and is waiting for it.
    Normal = 1,

    /// The coroutine's body is executing on this thread right now.
    Running = 2,

    /// Ready to be resumed. This is the initial state.
    Suspended = 3,
}

impl State {
    /// Stable textual form of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Dead => "dead",
            State::Normal => "normal",
            State::Running => "running",
            State::Suspended => "suspended",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
