//! Stackful asymmetric coroutines with a per-coroutine byte-stack data
//! channel.
//!
//! ## Overview
//!
//! A [`Coroutine`] runs a closure on its own private call stack. The
//! closure can suspend itself from any call depth — no annotations on the
//! frames in between — and is resumed by its owner exactly where it left
//! off. Each coroutine also embeds a small LIFO byte buffer, the *data
//! channel*, used to pass values between the owner and the body in either
//! direction across suspension points.
//!
//! The whole coroutine lives in a single heap allocation: header, machine
//! contexts, channel storage and stack are packed together, so creating a
//! coroutine costs one allocation and resuming one costs a register
//! save/restore.
//!
//! ## Example
//!
//! ```
//! use stackcoro::{Coroutine, State};
//!
//! let mut coroutine = Coroutine::new(|co| {
//!     for i in 0..3u32 {
//!         co.push(i).unwrap();
//!         co.suspend().unwrap();
//!     }
//! })
//! .unwrap();
//!
//! let mut seen = Vec::new();
//! while !coroutine.done() {
//!     coroutine.resume().unwrap();
//!     if let Ok(i) = coroutine.pop::<u32>() {
//!         seen.push(i);
//!     }
//! }
//! assert_eq!(seen, [0, 1, 2]);
//! assert_eq!(coroutine.status(), State::Dead);
//! ```
//!
//! On top of the core sit two small conveniences: [`Generator`], which
//! couples one push-and-yield into a lazily iterable value producer, and
//! [`TaskRunner`], a strict round-robin scheduler over a list of owned
//! coroutines.
//!
//! ## Supported targets
//!
//! |            | ELF (Linux, BSD, etc) | Darwin (macOS, iOS, etc) | Windows |
//! |------------|-----------------------|--------------------------|---------|
//! | x86_64     | ✅                     | ✅                        | ✅       |
//! | AArch64    | ✅                     | ✅                        | ❌       |
//! | RISC-V 64  | ✅                     | —                        | —       |
//!
//! ## Scheduling model
//!
//! Strictly single-threaded and cooperative. A coroutine is pinned to the
//! thread that created it and none of the handle types are `Send`. The only
//! suspension points are an explicit suspend from inside the body and the
//! implicit final switch when the body returns; channel and status
//! operations never suspend.
//!
//! ## Panics
//!
//! A panic inside a coroutine body is caught at the root of the coroutine
//! stack, carried across the switch, and re-raised from the owner's
//! [`Coroutine::resume`] call. Panics never unwind through the context
//! switch itself.

#![warn(missing_docs)]

// Must come first because it defines the assembler helper macros used by
// the per-architecture modules.
mod arch;

mod coroutine;
mod error;
mod generator;
mod raw;
mod runner;
mod storable;
mod util;

pub use coroutine::{current, yield_now, Coroutine, CoroutineHandle, StackSize, StorageSize};
pub use error::{Error, State};
pub use generator::{yield_value, Generator, IntoIter};
pub use runner::TaskRunner;
pub use storable::{Storable, MAX_VALUE_SIZE};

/// Stack size used when none is requested: 56 KiB.
pub const DEFAULT_STACK_SIZE: usize = 56 * 1024;

/// Floor below which requested stack sizes are silently clamped: 32 KiB.
pub const MIN_STACK_SIZE: usize = 32 * 1024;

/// Data-channel capacity used when none is requested: 1 KiB.
pub const DEFAULT_STORAGE_SIZE: usize = 1024;

#[cfg(test)]
mod tests;
