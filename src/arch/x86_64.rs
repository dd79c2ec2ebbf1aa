//! Low level x86_64 (SysV ABI) context switching.
//!
//! The callee-saved register set on SysV x86_64 is RBX, RBP, RSP and
//! R12-R15; there are no callee-saved vector registers. A [`Context`] holds
//! those seven registers plus RIP, the address at which the context resumes.
//!
//! `switch_context` stores its own resume address as the RIP slot of the
//! outgoing context. That address points at the trailing RET of the routine
//! itself: switching back into a saved context therefore restores the
//! callee-saved set, lands on the RET and returns to whatever Rust code
//! called `switch_context` when the context was last suspended. The caller's
//! view is an ordinary function call that happened to take a while.
//!
//! A fresh context instead has its RIP slot pointing at the init trampoline
//! below, with R12/R13 carrying the entry function and its argument. The
//! trampoline shuffles R13 into RDI (the first-argument register) and jumps
//! to R12; the entry function never returns.
//!
//! Stack preparation honors the 128-byte ABI red zone below the caller's
//! stack pointer and leaves RSP congruent to 8 modulo 16, exactly as if the
//! entry function had been reached by a CALL instruction.

use core::arch::global_asm;
use core::mem;

use super::{InitialFunc, STACK_POISON};

/// Bytes beyond the stack pointer that SysV allows leaf code to use without
/// adjusting RSP. Must stay untouched by the context machinery.
const RED_ZONE: usize = 128;

/// Callee-saved machine state of a suspended x86_64 context.
///
/// Field offsets are hard-coded in the assembly below.
#[allow(dead_code)] // read and written by the context-switch assembly
#[repr(C)]
pub(crate) struct Context {
    rip: usize,
    rsp: usize,
    rbp: usize,
    rbx: usize,
    r12: usize,
    r13: usize,
    r14: usize,
    r15: usize,
}

global_asm!(
    ".balign 16",
    asm_function_begin!("stackcoro_init_trampoline"),
    // The first switch into a fresh context lands here with:
    // - RSP pointing at the poison word at the top of the coroutine stack.
    // - R12 holding the entry function.
    // - R13 holding the coroutine object pointer.
    "mov rdi, r13",
    "jmp r12",
    asm_function_end!("stackcoro_init_trampoline"),
);

global_asm!(
    ".balign 16",
    asm_function_begin!("stackcoro_switch_context"),
    // RDI = outgoing context, RSI = incoming context.
    //
    // The saved RIP points at the RET below, so that a later switch back
    // into the outgoing context pops our caller's return address off the
    // restored stack and continues there.
    "lea rax, [rip + 1f]",
    "mov [rdi + 0x00], rax",
    "mov [rdi + 0x08], rsp",
    "mov [rdi + 0x10], rbp",
    "mov [rdi + 0x18], rbx",
    "mov [rdi + 0x20], r12",
    "mov [rdi + 0x28], r13",
    "mov [rdi + 0x30], r14",
    "mov [rdi + 0x38], r15",
    "mov r15, [rsi + 0x38]",
    "mov r14, [rsi + 0x30]",
    "mov r13, [rsi + 0x28]",
    "mov r12, [rsi + 0x20]",
    "mov rbx, [rsi + 0x18]",
    "mov rbp, [rsi + 0x10]",
    "mov rsp, [rsi + 0x08]",
    "jmp qword ptr [rsi + 0x00]",
    "1:",
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
/// enough to hold the red zone plus the poison word.
pub(crate) unsafe fn init_context(
    ctx: &mut Context,
    func: InitialFunc,
    arg: *mut u8,
    stack_base: *mut u8,
    stack_size: usize,
) {
    // The top word of the stack, below the red zone, takes the poison word
    // in the slot where a return address would normally live. This leaves
    // RSP at the post-CALL alignment the ABI promises to function bodies.
    let top = stack_base
        .add(stack_size - RED_ZONE - mem::size_of::<usize>())
        .cast::<usize>();
    top.write(STACK_POISON);

    ctx.rip = stackcoro_init_trampoline as usize;
    ctx.rsp = top as usize;
    ctx.r12 = func as usize;
    ctx.r13 = arg as usize;
}
