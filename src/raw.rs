//! The engine core: a coroutine is one zero-initialized 16-byte-aligned
//! heap block packing, in order, the [`RawCoro`] header, a pair of machine
//! contexts, the byte-stack storage region and the coroutine stack, with a
//! 16-byte tail margin.
//!
//! Everything in this module and in [`crate::arch`] is the crate's unsafe
//! core; the typed surface in [`crate::coroutine`] composes over it with
//! ordinary ownership rules.
//!
//! The one piece of runtime-wide mutable state is the thread-local pointer
//! to the coroutine currently executing on this thread. Resume saves the
//! old value into the target's `prev` link and yield restores it, which
//! keeps the pointer correct under arbitrarily nested resumes.

use core::mem;
use core::ptr::{self, NonNull};
use std::alloc::{self, Layout};
use std::cell::Cell;

use crate::arch::{self, Context};
use crate::error::{Error, State};
use crate::util::align_forward;
use crate::MIN_STACK_SIZE;

/// Sentinel stored in the header at creation and checked on every yield.
/// A downward-growing stack that escapes its region tramples the storage
/// area and then this word, so a mismatch is a cheap overflow diagnostic.
pub(crate) const MAGIC_NUMBER: usize = 0x7e3c_b1a9;

/// Alignment of the coroutine allocation and of every region inside it.
pub(crate) const ALLOC_ALIGNMENT: usize = 16;

/// Entry function recorded in the header, called on the coroutine stack
/// with the object it runs on.
pub(crate) type EntryFn = unsafe fn(*mut RawCoro);

thread_local! {
    /// The coroutine currently executing on this thread. Null exactly when
    /// no coroutine body is on the call stack.
    static CURRENT: Cell<*mut RawCoro> = const { Cell::new(ptr::null_mut()) };
}

/// The coroutine's own context and the caller context that is saved there
/// for as long as the coroutine runs.
#[repr(C)]
pub(crate) struct ContextPair {
    inner: Context,
    back: Context,
}

/// Header at the start of the coroutine allocation.
#[repr(C)]
pub(crate) struct RawCoro {
    context: *mut ContextPair,
    state: State,
    func: Option<EntryFn>,
    prev: *mut RawCoro,
    user_data: *mut (),
    total_size: usize,
    dealloc: unsafe fn(*mut u8, usize),
    stack_base: *mut u8,
    stack_size: usize,
    storage: *mut u8,
    bytes_stored: usize,
    storage_capacity: usize,
    magic: usize,
}

/// Creation descriptor for the raw factory.
pub(crate) struct Desc {
    pub func: Option<EntryFn>,
    pub user_data: *mut (),
    pub stack_size: usize,
    pub storage_size: usize,
}

struct Offsets {
    context: usize,
    storage: usize,
    stack: usize,
    total: usize,
}

/// Packed single-allocation layout. The context block is sized from the
/// actual register buffers, never hard-coded.
fn offsets(storage_size: usize, stack_size: usize) -> Offsets {
    let context = align_forward(mem::size_of::<RawCoro>(), ALLOC_ALIGNMENT);
    let storage = context + align_forward(mem::size_of::<ContextPair>(), ALLOC_ALIGNMENT);
    let stack = align_forward(storage + storage_size, ALLOC_ALIGNMENT);
    Offsets {
        context,
        storage,
        stack,
        total: stack + stack_size + ALLOC_ALIGNMENT,
    }
}

unsafe fn default_dealloc(base: *mut u8, size: usize) {
    alloc::dealloc(base, Layout::from_size_align_unchecked(size, ALLOC_ALIGNMENT));
}

/// Allocates and initializes a coroutine in the suspended state.
pub(crate) fn create(desc: &Desc) -> Result<NonNull<RawCoro>, Error> {
    let func = desc.func.ok_or(Error::InvalidArguments)?;
    if desc.stack_size < MIN_STACK_SIZE || desc.stack_size % ALLOC_ALIGNMENT != 0 {
        return Err(Error::InvalidArguments);
    }

    let off = offsets(desc.storage_size, desc.stack_size);
    let layout =
        Layout::from_size_align(off.total, ALLOC_ALIGNMENT).map_err(|_| Error::InvalidArguments)?;

    unsafe {
        let base = alloc::alloc_zeroed(layout);
        let Some(co) = NonNull::new(base.cast::<RawCoro>()) else {
            return Err(Error::OutOfMemory);
        };

        let context = base.add(off.context).cast::<ContextPair>();
        let storage = base.add(off.storage);
        let stack_base = base.add(off.stack);
        arch::init_context(
            &mut (*context).inner,
            entry,
            co.as_ptr().cast::<u8>(),
            stack_base,
            desc.stack_size,
        );

        co.as_ptr().write(RawCoro {
            context,
            state: State::Suspended,
            func: Some(func),
            prev: ptr::null_mut(),
            user_data: desc.user_data,
            total_size: off.total,
            dealloc: default_dealloc,
            stack_base,
            stack_size: desc.stack_size,
            storage,
            bytes_stored: 0,
            storage_capacity: desc.storage_size,
            magic: MAGIC_NUMBER,
        });

        Ok(co)
    }
}

/// Releases the coroutine allocation.
///
/// # Safety
///
/// `co` must be null or a pointer previously returned by [`create`] that
/// has not been destroyed yet. On success the block is gone; the pointer
/// must not be used again.
pub(crate) unsafe fn destroy(co: *mut RawCoro) -> Result<(), Error> {
    if co.is_null() {
        return Err(Error::InvalidCoroutine);
    }
    if !matches!((*co).state, State::Suspended | State::Dead) {
        return Err(Error::InvalidOperation);
    }
    (*co).state = State::Dead;
    let dealloc = (*co).dealloc;
    let size = (*co).total_size;
    dealloc(co.cast::<u8>(), size);
    Ok(())
}

/// First function executed on a fresh coroutine stack: runs the recorded
/// entry function, marks the coroutine dead and switches back to the caller
/// for the last time. The context is never re-entered after that.
unsafe extern "C" fn entry(arg: *mut u8) -> ! {
    let co = arg.cast::<RawCoro>();
    if let Some(func) = (*co).func {
        func(co);
    }
    (*co).state = State::Dead;
    prepare_jumpout(co);
    let context = (*co).context;
    arch::switch_context(&mut (*context).inner, &(*context).back);
    core::hint::unreachable_unchecked()
}

/// Bookkeeping before switching into `co`: remember the interrupted
/// coroutine in the `prev` link, demote it to normal and make `co` current.
unsafe fn prepare_jumpin(co: *mut RawCoro) {
    let prev = CURRENT.with(|current| current.replace(co));
    (*co).prev = prev;
    if !prev.is_null() {
        (*prev).state = State::Normal;
    }
}

/// Bookkeeping before switching out of `co`: clear the `prev` link, promote
/// the interrupted coroutine back to running and make it current again.
unsafe fn prepare_jumpout(co: *mut RawCoro) {
    let prev = (*co).prev;
    (*co).prev = ptr::null_mut();
    if !prev.is_null() {
        (*prev).state = State::Running;
    }
    CURRENT.with(|current| current.set(prev));
}

unsafe fn jumpin(co: *mut RawCoro) {
    let context = (*co).context;
    prepare_jumpin(co);
    arch::switch_context(&mut (*context).back, &(*context).inner);
}

unsafe fn jumpout(co: *mut RawCoro) {
    let context = (*co).context;
    prepare_jumpout(co);
    arch::switch_context(&mut (*context).inner, &(*context).back);
}

/// Transfers control to `co` until it yields or finishes.
///
/// # Safety
///
/// `co` must be null or a live pointer from [`create`], owned by the
/// calling thread.
pub(crate) unsafe fn resume(co: *mut RawCoro) -> Result<(), Error> {
    if co.is_null() {
        return Err(Error::InvalidCoroutine);
    }
    if (*co).state != State::Suspended {
        return Err(Error::NotSuspended);
    }
    (*co).state = State::Running;
    jumpin(co);
    Ok(())
}

/// [`resume`] without the state precondition checks.
///
/// # Safety
///
/// As for [`resume`], and additionally `co` must be non-null and suspended.
pub(crate) unsafe fn resume_unchecked(co: *mut RawCoro) {
    (*co).state = State::Running;
    jumpin(co);
}

/// Suspends `co`, returning control to whoever resumed it.
///
/// The stack-overflow diagnostic runs first: the magic sentinel must be
/// intact and the address of a fresh local must lie within the coroutine
/// stack. Both checks are advisory; when they fire the stack is already
/// trashed and the coroutine must be abandoned.
///
/// # Safety
///
/// `co` must be null or a live pointer from [`create`]. Must be called from
/// code executing on `co`'s own stack.
pub(crate) unsafe fn suspend(co: *mut RawCoro) -> Result<(), Error> {
    if co.is_null() {
        return Err(Error::InvalidCoroutine);
    }
    let probe: usize = 0;
    let stack_addr = ptr::addr_of!(probe) as usize;
    let stack_min = (*co).stack_base as usize;
    let stack_max = stack_min + (*co).stack_size;
    if (*co).magic != MAGIC_NUMBER || stack_addr < stack_min || stack_addr > stack_max {
        return Err(Error::StackOverflow);
    }
    if (*co).state != State::Running {
        return Err(Error::NotRunning);
    }
    (*co).state = State::Suspended;
    jumpout(co);
    Ok(())
}

/// [`suspend`] without the overflow and state checks.
///
/// # Safety
///
/// As for [`suspend`], and additionally `co` must be non-null and running.
pub(crate) unsafe fn suspend_unchecked(co: *mut RawCoro) {
    (*co).state = State::Suspended;
    jumpout(co);
}

/// Current lifecycle state; a null pointer reports dead.
pub(crate) unsafe fn status(co: *const RawCoro) -> State {
    if co.is_null() {
        State::Dead
    } else {
        (*co).state
    }
}

/// Opaque user pointer recorded at creation; null for a null coroutine.
pub(crate) unsafe fn user_data(co: *const RawCoro) -> *mut () {
    if co.is_null() {
        ptr::null_mut()
    } else {
        (*co).user_data
    }
}

/// Copies `len` bytes onto the top of the byte-stack.
///
/// Fails with `NotEnoughSpace` if the channel would exceed its capacity and
/// with `InvalidPointer` on a null source; neither failure writes anything.
/// A zero-length push always succeeds.
///
/// # Safety
///
/// `co` must be null or a live pointer from [`create`]; `src` must be
/// readable for `len` bytes when `len > 0`.
pub(crate) unsafe fn push(co: *mut RawCoro, src: *const u8, len: usize) -> Result<(), Error> {
    if co.is_null() {
        return Err(Error::InvalidCoroutine);
    }
    if len > 0 {
        let bytes_stored = (*co).bytes_stored + len;
        if bytes_stored > (*co).storage_capacity {
            return Err(Error::NotEnoughSpace);
        }
        if src.is_null() {
            return Err(Error::InvalidPointer);
        }
        ptr::copy_nonoverlapping(src, (*co).storage.add((*co).bytes_stored), len);
        (*co).bytes_stored = bytes_stored;
    }
    Ok(())
}

/// Removes the top `len` bytes of the byte-stack, copying them to `dst`.
/// A null `dst` pops and discards.
///
/// # Safety
///
/// `co` must be null or a live pointer from [`create`]; `dst` must be null
/// or writable for `len` bytes.
pub(crate) unsafe fn pop(co: *mut RawCoro, dst: *mut u8, len: usize) -> Result<(), Error> {
    if co.is_null() {
        return Err(Error::InvalidCoroutine);
    }
    if len > 0 {
        if len > (*co).bytes_stored {
            return Err(Error::NotEnoughSpace);
        }
        let bytes_stored = (*co).bytes_stored - len;
        if !dst.is_null() {
            ptr::copy_nonoverlapping((*co).storage.add(bytes_stored), dst, len);
        }
        (*co).bytes_stored = bytes_stored;
    }
    Ok(())
}

/// Copies the top `len` bytes of the byte-stack to `dst` without moving the
/// cursor.
///
/// # Safety
///
/// `co` must be null or a live pointer from [`create`]; `dst` must be
/// writable for `len` bytes when `len > 0`.
pub(crate) unsafe fn peek(co: *mut RawCoro, dst: *mut u8, len: usize) -> Result<(), Error> {
    if co.is_null() {
        return Err(Error::InvalidCoroutine);
    }
    if len > 0 {
        if len > (*co).bytes_stored {
            return Err(Error::NotEnoughSpace);
        }
        if dst.is_null() {
            return Err(Error::InvalidPointer);
        }
        ptr::copy_nonoverlapping((*co).storage.add((*co).bytes_stored - len), dst, len);
    }
    Ok(())
}

/// [`push`] without the capacity and pointer checks.
///
/// # Safety
///
/// `co` must be live and non-null, `src` readable for `len` bytes, and the
/// channel must have room for them.
pub(crate) unsafe fn push_unchecked(co: *mut RawCoro, src: *const u8, len: usize) {
    ptr::copy_nonoverlapping(src, (*co).storage.add((*co).bytes_stored), len);
    (*co).bytes_stored += len;
}

/// [`pop`] without the capacity and pointer checks.
///
/// # Safety
///
/// `co` must be live and non-null, `dst` writable for `len` bytes, and the
/// channel must hold at least that many.
pub(crate) unsafe fn pop_unchecked(co: *mut RawCoro, dst: *mut u8, len: usize) {
    (*co).bytes_stored -= len;
    ptr::copy_nonoverlapping((*co).storage.add((*co).bytes_stored), dst, len);
}

/// Bytes currently held in the byte-stack; zero for a null coroutine.
pub(crate) unsafe fn bytes_stored(co: *const RawCoro) -> usize {
    if co.is_null() {
        0
    } else {
        (*co).bytes_stored
    }
}

/// Capacity of the byte-stack; zero for a null coroutine.
pub(crate) unsafe fn storage_capacity(co: *const RawCoro) -> usize {
    if co.is_null() {
        0
    } else {
        (*co).storage_capacity
    }
}

/// Total size of the coroutine allocation, for memory accounting; zero for
/// a null coroutine.
pub(crate) unsafe fn allocation_size(co: *const RawCoro) -> usize {
    if co.is_null() {
        0
    } else {
        (*co).total_size
    }
}

/// Sentinel integrity check, used by handle validity queries.
pub(crate) unsafe fn intact(co: *const RawCoro) -> bool {
    !co.is_null() && (*co).magic == MAGIC_NUMBER
}

/// The coroutine currently executing on this thread, or null.
pub(crate) fn running() -> *mut RawCoro {
    CURRENT.with(|current| current.get())
}
