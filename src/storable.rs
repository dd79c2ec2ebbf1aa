//! Constraint on the types that may travel through a coroutine's data
//! channel.

use core::marker::PhantomData;
use core::mem;

/// Largest value size, in bytes, transferable through the data channel.
pub const MAX_VALUE_SIZE: usize = 1024;

/// Marker for values that can be moved through a coroutine's byte-stack.
///
/// The channel copies raw bytes, so a storable type must be byte-copyable
/// (`Copy`) and must not borrow anything (`'static`). Values keep their
/// in-memory layout across the transfer; types with padding round-trip
/// correctly but the padding contents are unspecified.
///
/// Types larger than [`MAX_VALUE_SIZE`] are rejected when a channel
/// operation is instantiated for them:
///
/// ```compile_fail
/// let coroutine = stackcoro::Coroutine::new(|co| {
///     let _ = co.pop::<[u8; 2048]>();
/// })
/// .unwrap();
/// ```
pub trait Storable: Copy + 'static {}

impl<T: Copy + 'static> Storable for T {}

/// Monomorphization-time guard behind the size limit above.
pub(crate) struct AssertFits<T>(PhantomData<T>);

impl<T> AssertFits<T> {
    pub(crate) const OK: () = assert!(
        mem::size_of::<T>() <= MAX_VALUE_SIZE,
        "type is too big to transfer through a coroutine data channel"
    );
}
