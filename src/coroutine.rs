//! The typed public surface: the owning [`Coroutine`] handle, the non-owning
//! [`CoroutineHandle`] capability handed to coroutine bodies, and the
//! current-coroutine lookup.

use core::marker::PhantomData;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, State};
use crate::raw::{self, RawCoro};
use crate::storable::{AssertFits, Storable};
use crate::util::align_forward;
use crate::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE};

/// Stack size for a new coroutine, in bytes.
///
/// Strong-typed so that it cannot be swapped with a [`StorageSize`] by
/// accident. Sizes below [`MIN_STACK_SIZE`] are silently clamped up and the
/// result is rounded to 16 bytes; zero selects [`DEFAULT_STACK_SIZE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StackSize(
    /// Requested size in bytes.
    pub usize,
);

impl Default for StackSize {
    fn default() -> Self {
        StackSize(DEFAULT_STACK_SIZE)
    }
}

/// Capacity of a new coroutine's byte-stack data channel, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorageSize(
    /// Requested capacity in bytes.
    pub usize,
);

impl Default for StorageSize {
    fn default() -> Self {
        StorageSize(crate::DEFAULT_STORAGE_SIZE)
    }
}

/// Heap cell behind the coroutine's user pointer: the not-yet-started body
/// on the way in, a captured panic payload on the way out.
struct ClosureCell {
    func: Option<Box<dyn FnOnce(CoroutineHandle)>>,
    panic: Option<Box<dyn Any + Send>>,
}

/// Entry function recorded in every coroutine created through the typed
/// surface. Runs the boxed body and parks any panic in the cell; unwinding
/// must never reach the context switch at the root of the stack.
unsafe fn entry_thunk(co: *mut RawCoro) {
    let cell = raw::user_data(co).cast::<ClosureCell>();
    if let Some(func) = (*cell).func.take() {
        let handle = CoroutineHandle { ptr: co };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| func(handle))) {
            (*cell).panic = Some(payload);
        }
    }
}

/// An owned stackful coroutine.
///
/// A coroutine runs a closure on its own private call stack. The closure
/// may suspend itself from any call depth through the [`CoroutineHandle`]
/// it receives, and exchanges values with its owner through the embedded
/// byte-stack channel.
///
/// # Ownership
///
/// The handle is move-only: moving it transfers the coroutine, and there is
/// no way to clone it. Dropping it releases the whole allocation. Dropping
/// a coroutine that is merely suspended is legal and frees all memory, but
/// runs no cleanup inside the body; callers that need in-body cleanup
/// should signal the body (for example through a pushed flag) and resume it
/// to completion first.
///
/// # Threads
///
/// A coroutine is pinned to the thread that created it and the handle is
/// deliberately not `Send`.
///
/// # Example
///
/// ```
/// use stackcoro::Coroutine;
///
/// let mut coroutine = Coroutine::new(|co| {
///     let n: u32 = co.pop().unwrap();
///     co.push(n * 2).unwrap();
/// })
/// .unwrap();
///
/// coroutine.push(21u32).unwrap();
/// coroutine.resume().unwrap();
/// assert_eq!(coroutine.pop::<u32>().unwrap(), 42);
/// assert!(coroutine.done());
/// ```
pub struct Coroutine {
    ptr: NonNull<RawCoro>,
    cell: NonNull<ClosureCell>,

    // A coroutine must not move between threads: its caller context records
    // the stack it was resumed from.
    /// ```compile_fail
    /// fn send<T: Send>() {}
    /// send::<stackcoro::Coroutine>();
    /// ```
    marker: PhantomData<*mut ()>,
}

impl Coroutine {
    /// Creates a suspended coroutine with the default stack and storage
    /// sizes.
    ///
    /// The closure runs when the coroutine is first resumed and receives a
    /// [`CoroutineHandle`] for yielding and channel access.
    pub fn new<F>(func: F) -> Result<Self, Error>
    where
        F: FnOnce(CoroutineHandle) + 'static,
    {
        Self::with_sizes(func, StackSize::default(), StorageSize::default())
    }

    /// Creates a suspended coroutine with explicit stack and storage sizes.
    pub fn with_sizes<F>(func: F, stack: StackSize, storage: StorageSize) -> Result<Self, Error>
    where
        F: FnOnce(CoroutineHandle) + 'static,
    {
        let stack_size = if stack.0 == 0 {
            DEFAULT_STACK_SIZE
        } else {
            stack.0.max(MIN_STACK_SIZE)
        };
        let stack_size = align_forward(stack_size, raw::ALLOC_ALIGNMENT);

        let cell = Box::into_raw(Box::new(ClosureCell {
            func: Some(Box::new(func)),
            panic: None,
        }));

        let desc = raw::Desc {
            func: Some(entry_thunk),
            user_data: cell.cast::<()>(),
            stack_size,
            storage_size: storage.0,
        };
        match raw::create(&desc) {
            Ok(ptr) => Ok(Coroutine {
                ptr,
                // create() succeeded, so cell is a fresh Box pointer.
                cell: unsafe { NonNull::new_unchecked(cell) },
                marker: PhantomData,
            }),
            Err(err) => {
                drop(unsafe { Box::from_raw(cell) });
                Err(err)
            }
        }
    }

    /// Transfers control to the coroutine until it yields or finishes.
    ///
    /// Fails with [`Error::NotSuspended`] unless the coroutine is currently
    /// suspended; a failed precondition performs no context switch.
    ///
    /// # Panics
    ///
    /// If the body panicked during this resume, the panic is re-raised here
    /// once the caller's stack is back in place. The coroutine is dead
    /// afterwards.
    pub fn resume(&mut self) -> Result<(), Error> {
        unsafe {
            raw::resume(self.ptr.as_ptr())?;
        }
        let payload = unsafe { (*self.cell.as_ptr()).panic.take() };
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// [`resume`](Self::resume) without the state checks or panic
    /// propagation.
    ///
    /// # Safety
    ///
    /// The coroutine must be suspended and its body must not panic during
    /// this resume.
    pub unsafe fn resume_unchecked(&mut self) {
        raw::resume_unchecked(self.ptr.as_ptr());
    }

    /// Current lifecycle state.
    pub fn status(&self) -> State {
        unsafe { raw::status(self.ptr.as_ptr()) }
    }

    /// Whether the body has returned; a done coroutine cannot be resumed.
    pub fn done(&self) -> bool {
        self.status() == State::Dead
    }

    /// Whether the coroutine is suspended and ready to be resumed.
    pub fn suspended(&self) -> bool {
        self.status() == State::Suspended
    }

    /// Whether the coroutine's body is executing right now.
    pub fn running(&self) -> bool {
        self.status() == State::Running
    }

    /// Whether the underlying object is intact (its magic sentinel has not
    /// been clobbered by a stack overflow).
    pub fn valid(&self) -> bool {
        unsafe { raw::intact(self.ptr.as_ptr()) }
    }

    /// Pushes a value onto the coroutine's data channel.
    pub fn push<T: Storable>(&self, value: T) -> Result<(), Error> {
        self.handle().push(value)
    }

    /// Pops the most recently pushed value off the data channel.
    pub fn pop<T: Storable>(&self) -> Result<T, Error> {
        self.handle().pop()
    }

    /// Reads the most recently pushed value without removing it.
    pub fn peek<T: Storable>(&self) -> Result<T, Error> {
        self.handle().peek()
    }

    /// [`push`](Self::push) without capacity checks.
    ///
    /// # Safety
    ///
    /// The channel must have room for `size_of::<T>()` more bytes.
    pub unsafe fn push_unchecked<T: Storable>(&self, value: T) {
        self.handle().push_unchecked(value)
    }

    /// [`pop`](Self::pop) without content checks.
    ///
    /// # Safety
    ///
    /// The channel must hold at least `size_of::<T>()` bytes, and those
    /// bytes must have been pushed as a `T`.
    pub unsafe fn pop_unchecked<T: Storable>(&self) -> T {
        self.handle().pop_unchecked()
    }

    /// Bytes currently held in the data channel.
    pub fn bytes_stored(&self) -> usize {
        unsafe { raw::bytes_stored(self.ptr.as_ptr()) }
    }

    /// Capacity of the data channel.
    pub fn storage_capacity(&self) -> usize {
        unsafe { raw::storage_capacity(self.ptr.as_ptr()) }
    }

    /// Size in bytes of the coroutine's single allocation (header, machine
    /// contexts, channel storage and stack), for memory accounting. The
    /// layout inside the block is opaque.
    pub fn allocation_size(&self) -> usize {
        unsafe { raw::allocation_size(self.ptr.as_ptr()) }
    }

    /// A cheap non-owning handle to this coroutine.
    pub fn handle(&self) -> CoroutineHandle {
        CoroutineHandle {
            ptr: self.ptr.as_ptr(),
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        unsafe {
            // The owner cannot be dropped from within the coroutine, so the
            // state here is suspended or dead and destroy only refuses when
            // the object was corrupted; leaking a corrupted block is better
            // than freeing through a trampled header.
            let _ = raw::destroy(self.ptr.as_ptr());
            drop(Box::from_raw(self.cell.as_ptr()));
        }
    }
}

/// A non-owning coroutine capability.
///
/// This is the handle a coroutine body receives; it allows the body to
/// suspend itself and to use the data channel. It is freely copyable and
/// only valid while the coroutine it refers to is alive, which holds for
/// the two ways a handle is obtained: through the body's argument and
/// through [`current`].
#[derive(Clone, Copy)]
pub struct CoroutineHandle {
    ptr: *mut RawCoro,
}

impl CoroutineHandle {
    /// A handle referring to no coroutine. Operations on it fail with
    /// [`Error::InvalidCoroutine`] and its status is [`State::Dead`].
    pub const fn invalid() -> Self {
        CoroutineHandle {
            ptr: ptr::null_mut(),
        }
    }

    /// Whether the handle refers to a coroutine at all.
    pub fn valid(&self) -> bool {
        !self.ptr.is_null()
    }

    /// Suspends the coroutine, returning control to whoever resumed it.
    /// The call returns when the coroutine is next resumed.
    ///
    /// Fails with [`Error::StackOverflow`] if the overflow diagnostic
    /// trips (the coroutine must then be abandoned), and with
    /// [`Error::NotRunning`] when the coroutine is not the one executing.
    pub fn suspend(&self) -> Result<(), Error> {
        if self.ptr.is_null() {
            return Err(Error::InvalidCoroutine);
        }
        unsafe { raw::suspend(self.ptr) }
    }

    /// [`suspend`](Self::suspend) without the overflow and state checks.
    ///
    /// # Safety
    ///
    /// The handle must refer to the currently running coroutine and its
    /// stack must be intact.
    pub unsafe fn suspend_unchecked(&self) {
        raw::suspend_unchecked(self.ptr);
    }

    /// Current lifecycle state; an invalid handle reports [`State::Dead`].
    pub fn status(&self) -> State {
        unsafe { raw::status(self.ptr) }
    }

    /// Pushes a value onto the data channel.
    ///
    /// Fails with [`Error::NotEnoughSpace`] when the channel is too full,
    /// in which case nothing is written.
    pub fn push<T: Storable>(&self, value: T) -> Result<(), Error> {
        let () = AssertFits::<T>::OK;
        unsafe {
            raw::push(
                self.ptr,
                ptr::addr_of!(value).cast::<u8>(),
                mem::size_of::<T>(),
            )
        }
    }

    /// Pops the most recently pushed value off the data channel.
    ///
    /// Fails with [`Error::NotEnoughSpace`] when the channel holds fewer
    /// than `size_of::<T>()` bytes.
    pub fn pop<T: Storable>(&self) -> Result<T, Error> {
        let () = AssertFits::<T>::OK;
        let mut value = MaybeUninit::<T>::uninit();
        unsafe {
            raw::pop(self.ptr, value.as_mut_ptr().cast::<u8>(), mem::size_of::<T>())?;
            Ok(value.assume_init())
        }
    }

    /// Reads the most recently pushed value without removing it. Peeking
    /// never moves the channel cursor.
    pub fn peek<T: Storable>(&self) -> Result<T, Error> {
        let () = AssertFits::<T>::OK;
        let mut value = MaybeUninit::<T>::uninit();
        unsafe {
            raw::peek(self.ptr, value.as_mut_ptr().cast::<u8>(), mem::size_of::<T>())?;
            Ok(value.assume_init())
        }
    }

    /// [`push`](Self::push) without capacity checks.
    ///
    /// # Safety
    ///
    /// The handle must be valid and the channel must have room for
    /// `size_of::<T>()` more bytes.
    pub unsafe fn push_unchecked<T: Storable>(&self, value: T) {
        let () = AssertFits::<T>::OK;
        raw::push_unchecked(
            self.ptr,
            ptr::addr_of!(value).cast::<u8>(),
            mem::size_of::<T>(),
        );
    }

    /// [`pop`](Self::pop) without content checks.
    ///
    /// # Safety
    ///
    /// The handle must be valid, the channel must hold at least
    /// `size_of::<T>()` bytes, and those bytes must have been pushed as a
    /// `T`.
    pub unsafe fn pop_unchecked<T: Storable>(&self) -> T {
        let () = AssertFits::<T>::OK;
        let mut value = MaybeUninit::<T>::uninit();
        raw::pop_unchecked(self.ptr, value.as_mut_ptr().cast::<u8>(), mem::size_of::<T>());
        value.assume_init()
    }

    /// Pushes a raw byte range onto the data channel.
    pub fn push_bytes(&self, bytes: &[u8]) -> Result<(), Error> {
        unsafe { raw::push(self.ptr, bytes.as_ptr(), bytes.len()) }
    }

    /// Pops `dst.len()` bytes off the data channel into `dst`.
    pub fn pop_bytes(&self, dst: &mut [u8]) -> Result<(), Error> {
        unsafe { raw::pop(self.ptr, dst.as_mut_ptr(), dst.len()) }
    }

    /// Reads the top `dst.len()` bytes of the data channel into `dst`
    /// without removing them.
    pub fn peek_bytes(&self, dst: &mut [u8]) -> Result<(), Error> {
        unsafe { raw::peek(self.ptr, dst.as_mut_ptr(), dst.len()) }
    }

    /// Pops and discards the top `len` bytes of the data channel.
    pub fn discard(&self, len: usize) -> Result<(), Error> {
        unsafe { raw::pop(self.ptr, ptr::null_mut(), len) }
    }

    /// Bytes currently held in the data channel.
    pub fn bytes_stored(&self) -> usize {
        unsafe { raw::bytes_stored(self.ptr) }
    }

    /// Capacity of the data channel.
    pub fn storage_capacity(&self) -> usize {
        unsafe { raw::storage_capacity(self.ptr) }
    }
}

/// The coroutine currently executing on this thread.
///
/// Returns an invalid handle when called outside any coroutine body.
pub fn current() -> CoroutineHandle {
    CoroutineHandle {
        ptr: raw::running(),
    }
}

/// Suspends the coroutine currently executing on this thread.
///
/// Fails with [`Error::InvalidCoroutine`] when called outside any
/// coroutine body.
pub fn yield_now() -> Result<(), Error> {
    current().suspend()
}
