//! Low level AArch64 (AAPCS64) context switching.
//!
//! This file follows the same scheme as the x86_64 implementation; refer to
//! x86_64.rs for the detailed story. Differences that matter here:
//!
//! - The callee-saved set is X19-X28, the frame pointer X29, SP and the low
//!   64 bits of V8-V15 (the D registers).
//! - The return address lives in X30 rather than on the stack, so the saved
//!   X30 doubles as the context's resume address: restoring the register
//!   set and executing RET lands exactly where the suspended
//!   `switch_context` call would have returned. No label arithmetic is
//!   needed.
//! - SP must stay 16-byte aligned at all times, so the poison word sits
//!   inside a 16-byte reservation at the top of the stack rather than in a
//!   lone 8-byte slot.

use core::arch::global_asm;

use super::{InitialFunc, STACK_POISON};

// Apple reserves a 128-byte red zone below SP; other AArch64 ABIs define
// none, but honoring it unconditionally costs nothing.
const RED_ZONE: usize = 128;

/// Callee-saved machine state of a suspended AArch64 context.
///
/// Field offsets are hard-coded in the assembly below.
#[allow(dead_code)] // read and written by the context-switch assembly
#[repr(C)]
pub(crate) struct Context {
    pc: usize,
    sp: usize,
    x19: usize,
    x20: usize,
    x21: usize,
    x22: usize,
    x23: usize,
    x24: usize,
    x25: usize,
    x26: usize,
    x27: usize,
    x28: usize,
    x29: usize,
    d8: usize,
    d9: usize,
    d10: usize,
    d11: usize,
    d12: usize,
    d13: usize,
    d14: usize,
    d15: usize,
}

global_asm!(
    ".balign 4",
    asm_function_begin!("stackcoro_init_trampoline"),
    // The first switch into a fresh context lands here with:
    // - SP at the prepared top of the coroutine stack.
    // - X19 holding the entry function.
    // - X20 holding the coroutine object pointer.
    "mov x0, x20",
    "br x19",
    asm_function_end!("stackcoro_init_trampoline"),
);

global_asm!(
    ".balign 4",
    asm_function_begin!("stackcoro_switch_context"),
    // X0 = outgoing context, X1 = incoming context.
    //
    // X30 is saved as the resume address: the RET below takes a resumed
    // context straight back to its suspended caller.
    "mov x10, sp",
    "stp x30, x10, [x0, #0x00]",
    "stp x19, x20, [x0, #0x10]",
    "stp x21, x22, [x0, #0x20]",
    "stp x23, x24, [x0, #0x30]",
    "stp x25, x26, [x0, #0x40]",
    "stp x27, x28, [x0, #0x50]",
    "str x29, [x0, #0x60]",
    "stp d8, d9, [x0, #0x68]",
    "stp d10, d11, [x0, #0x78]",
    "stp d12, d13, [x0, #0x88]",
    "stp d14, d15, [x0, #0x98]",
    "ldp x30, x10, [x1, #0x00]",
    "ldp x19, x20, [x1, #0x10]",
    "ldp x21, x22, [x1, #0x20]",
    "ldp x23, x24, [x1, #0x30]",
    "ldp x25, x26, [x1, #0x40]",
    "ldp x27, x28, [x1, #0x50]",
    "ldr x29, [x1, #0x60]",
    "ldp d8, d9, [x1, #0x68]",
    "ldp d10, d11, [x1, #0x78]",
    "ldp d12, d13, [x1, #0x88]",
    "ldp d14, d15, [x1, #0x98]",
    "mov sp, x10",
    "ret",
    asm_function_end!("stackcoro_switch_context"),
);

extern "C" {
    fn stackcoro_init_trampoline();
    fn stackcoro_switch_context(from: *mut Context, to: *const Context);
}

/// Saves the current callee-saved register set into `from`, restores `to`
/// and continues executing at `to`'s resume address on `to`'s stack.
///
/// # Safety
///
/// `to` must have been prepared by [`init_context`] or filled in by an
/// earlier switch, and its stack must still be live. Unwinding must never
/// cross this call.
#[inline]
pub(crate) unsafe fn switch_context(from: *mut Context, to: *const Context) {
    stackcoro_switch_context(from, to);
}

/// Prepares `ctx` so that the first switch into it runs `func(arg)` on the
/// given stack.
///
/// # Safety
///
/// The stack region must be 16-byte aligned, writable and at least large
/// enough to hold the red zone plus the 16-byte poison reservation.
pub(crate) unsafe fn init_context(
    ctx: &mut Context,
    func: InitialFunc,
    arg: *mut u8,
    stack_base: *mut u8,
    stack_size: usize,
) {
    // Reserve 16 bytes so SP keeps the alignment the hardware enforces; the
    // poison word occupies the upper half of the reservation.
    let sp = stack_base.add(stack_size - RED_ZONE - 16);
    sp.add(8).cast::<usize>().write(STACK_POISON);

    ctx.pc = stackcoro_init_trampoline as usize;
    ctx.sp = sp as usize;
    ctx.x19 = func as usize;
    ctx.x20 = arg as usize;
}
