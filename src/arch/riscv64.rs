//! Low level RISC-V 64 (LP64D) context switching.
//!
//! This file follows the same scheme as the x86_64 implementation; refer to
//! x86_64.rs for the detailed story. Differences that matter here:
//!
//! - The callee-saved set is S0-S11, SP and the FS0-FS11 floating point
//!   registers; the FS saves assume the D extension (riscv64gc targets).
//! - The return address lives in RA rather than on the stack, so the saved
//!   RA doubles as the context's resume address: restoring the register set
//!   and executing RET lands exactly where the suspended `switch_context`
//!   call would have returned.
//! - There is no red zone in the RISC-V psABI, but SP must stay 16-byte
//!   aligned, so the poison word sits inside a 16-byte reservation.

use core::arch::global_asm;

use super::{InitialFunc, STACK_POISON};

/// Callee-saved machine state of a suspended RISC-V 64 context.
///
/// Field offsets are hard-coded in the assembly below.
#[allow(dead_code)] // read and written by the context-switch assembly
#[repr(C)]
pub(crate) struct Context {
    pc: usize,
    sp: usize,
    s0: usize,
    s1: usize,
    s2: usize,
    s3: usize,
    s4: usize,
    s5: usize,
    s6: usize,
    s7: usize,
    s8: usize,
    s9: usize,
    s10: usize,
    s11: usize,
    fs0: usize,
    fs1: usize,
    fs2: usize,
    fs3: usize,
    fs4: usize,
    fs5: usize,
    fs6: usize,
    fs7: usize,
    fs8: usize,
    fs9: usize,
    fs10: usize,
    fs11: usize,
}

global_asm!(
    ".balign 4",
    asm_function_begin!("stackcoro_init_trampoline"),
    // The first switch into a fresh context lands here with:
    // - SP at the prepared top of the coroutine stack.
    // - S1 holding the entry function.
    // - S2 holding the coroutine object pointer.
    "mv a0, s2",
    "jr s1",
    asm_function_end!("stackcoro_init_trampoline"),
);

global_asm!(
    ".balign 4",
    asm_function_begin!("stackcoro_switch_context"),
    // A0 = outgoing context, A1 = incoming context.
    //
    // RA is saved as the resume address: the RET below takes a resumed
    // context straight back to its suspended caller.
    "sd ra, 0x00(a0)",
    "sd sp, 0x08(a0)",
    "sd s0, 0x10(a0)",
    "sd s1, 0x18(a0)",
    "sd s2, 0x20(a0)",
    "sd s3, 0x28(a0)",
    "sd s4, 0x30(a0)",
    "sd s5, 0x38(a0)",
    "sd s6, 0x40(a0)",
    "sd s7, 0x48(a0)",
    "sd s8, 0x50(a0)",
    "sd s9, 0x58(a0)",
    "sd s10, 0x60(a0)",
    "sd s11, 0x68(a0)",
    "fsd fs0, 0x70(a0)",
    "fsd fs1, 0x78(a0)",
    "fsd fs2, 0x80(a0)",
    "fsd fs3, 0x88(a0)",
    "fsd fs4, 0x90(a0)",
    "fsd fs5, 0x98(a0)",
    "fsd fs6, 0xa0(a0)",
    "fsd fs7, 0xa8(a0)",
    "fsd fs8, 0xb0(a0)",
    "fsd fs9, 0xb8(a0)",
    "fsd fs10, 0xc0(a0)",
    "fsd fs11, 0xc8(a0)",
    "ld ra, 0x00(a1)",
    "ld sp, 0x08(a1)",
    "ld s0, 0x10(a1)",
    "ld s1, 0x18(a1)",
    "ld s2, 0x20(a1)",
    "ld s3, 0x28(a1)",
    "ld s4, 0x30(a1)",
    "ld s5, 0x38(a1)",
    "ld s6, 0x40(a1)",
    "ld s7, 0x48(a1)",
    "ld s8, 0x50(a1)",
    "ld s9, 0x58(a1)",
    "ld s10, 0x60(a1)",
    "ld s11, 0x68(a1)",
    "fld fs0, 0x70(a1)",
    "fld fs1, 0x78(a1)",
    "fld fs2, 0x80(a1)",
    "fld fs3, 0x88(a1)",
    "fld fs4, 0x90(a1)",
    "fld fs5, 0x98(a1)",
    "fld fs6, 0xa0(a1)",
    "fld fs7, 0xa8(a1)",
    "fld fs8, 0xb0(a1)",
    "fld fs9, 0xb8(a1)",
    "fld fs10, 0xc0(a1)",
    "fld fs11, 0xc8(a1)",
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
/// enough to hold the 16-byte poison reservation.
pub(crate) unsafe fn init_context(
    ctx: &mut Context,
    func: InitialFunc,
    arg: *mut u8,
    stack_base: *mut u8,
    stack_size: usize,
) {
    // Reserve 16 bytes so SP keeps the ABI-mandated alignment; the poison
    // word occupies the upper half of the reservation.
    let sp = stack_base.add(stack_size - 16);
    sp.add(8).cast::<usize>().write(STACK_POISON);

    ctx.pc = stackcoro_init_trampoline as usize;
    ctx.sp = sp as usize;
    ctx.s1 = func as usize;
    ctx.s2 = arg as usize;
}
