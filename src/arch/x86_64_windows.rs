//! Low level x86_64 Windows context switching.
//!
//! This file follows the same scheme as the SysV x86_64 implementation;
//! refer to x86_64.rs for the detailed story. Differences that matter here:
//!
//! - The Win64 callee-saved set additionally includes RDI, RSI and the
//!   vector registers XMM6-XMM15.
//! - Windows tracks stack extents per thread in the Thread Environment
//!   Block, the same fields `SwitchToFiber` maintains: StackBase,
//!   StackLimit, DeallocationStack and the fiber-local storage pointer.
//!   These must travel with the context or the kernel and the exception
//!   dispatcher will reject the foreign stack.
//! - There is no red zone, but the entry function must find the 32-byte
//!   shadow space its caller normally allocates above the return address.

use core::arch::global_asm;

use super::{InitialFunc, STACK_POISON};

/// Return-address slot plus the 32-byte shadow space the Win64 ABI lets a
/// function treat as caller-provided scratch.
const TOP_RESERVATION: usize = 40;

/// Callee-saved machine state of a suspended Win64 context, including the
/// TEB stack fields.
///
/// Field offsets are hard-coded in the assembly below; the XMM block must
/// stay 16-byte aligned for the MOVAPS saves.
#[allow(dead_code)] // read and written by the context-switch assembly
#[repr(C, align(16))]
pub(crate) struct Context {
    rip: usize,
    rsp: usize,
    rbp: usize,
    rbx: usize,
    r12: usize,
    r13: usize,
    r14: usize,
    r15: usize,
    rdi: usize,
    rsi: usize,
    xmm: [[u64; 2]; 10],
    teb_fiber_storage: usize,
    teb_deallocation_stack: usize,
    teb_stack_limit: usize,
    teb_stack_base: usize,
}

global_asm!(
    ".balign 16",
    asm_function_begin!("stackcoro_init_trampoline"),
    // The first switch into a fresh context lands here with:
    // - RSP pointing at the poison word, shadow space above it.
    // - R12 holding the entry function.
    // - R13 holding the coroutine object pointer.
    "mov rcx, r13",
    "jmp r12",
    asm_function_end!("stackcoro_init_trampoline"),
);

global_asm!(
    ".balign 16",
    asm_function_begin!("stackcoro_switch_context"),
    // RCX = outgoing context, RDX = incoming context.
    "lea rax, [rip + 1f]",
    "mov [rcx + 0x00], rax",
    "mov [rcx + 0x08], rsp",
    "mov [rcx + 0x10], rbp",
    "mov [rcx + 0x18], rbx",
    "mov [rcx + 0x20], r12",
    "mov [rcx + 0x28], r13",
    "mov [rcx + 0x30], r14",
    "mov [rcx + 0x38], r15",
    "mov [rcx + 0x40], rdi",
    "mov [rcx + 0x48], rsi",
    "movaps [rcx + 0x50], xmm6",
    "movaps [rcx + 0x60], xmm7",
    "movaps [rcx + 0x70], xmm8",
    "movaps [rcx + 0x80], xmm9",
    "movaps [rcx + 0x90], xmm10",
    "movaps [rcx + 0xa0], xmm11",
    "movaps [rcx + 0xb0], xmm12",
    "movaps [rcx + 0xc0], xmm13",
    "movaps [rcx + 0xd0], xmm14",
    "movaps [rcx + 0xe0], xmm15",
    // TEB stack fields, the set SwitchToFiber maintains. The TEB linear
    // address lives at gs:[0x30].
    "mov r10, qword ptr gs:[0x30]",
    "mov rax, [r10 + 0x20]",
    "mov [rcx + 0xf0], rax",
    "mov rax, [r10 + 0x1478]",
    "mov [rcx + 0xf8], rax",
    "mov rax, [r10 + 0x10]",
    "mov [rcx + 0x100], rax",
    "mov rax, [r10 + 0x08]",
    "mov [rcx + 0x108], rax",
    "mov rax, [rdx + 0xf0]",
    "mov [r10 + 0x20], rax",
    "mov rax, [rdx + 0xf8]",
    "mov [r10 + 0x1478], rax",
    "mov rax, [rdx + 0x100]",
    "mov [r10 + 0x10], rax",
    "mov rax, [rdx + 0x108]",
    "mov [r10 + 0x08], rax",
    "movaps xmm15, [rdx + 0xe0]",
    "movaps xmm14, [rdx + 0xd0]",
    "movaps xmm13, [rdx + 0xc0]",
    "movaps xmm12, [rdx + 0xb0]",
    "movaps xmm11, [rdx + 0xa0]",
    "movaps xmm10, [rdx + 0x90]",
    "movaps xmm9, [rdx + 0x80]",
    "movaps xmm8, [rdx + 0x70]",
    "movaps xmm7, [rdx + 0x60]",
    "movaps xmm6, [rdx + 0x50]",
    "mov rsi, [rdx + 0x48]",
    "mov rdi, [rdx + 0x40]",
    "mov r15, [rdx + 0x38]",
    "mov r14, [rdx + 0x30]",
    "mov r13, [rdx + 0x28]",
    "mov r12, [rdx + 0x20]",
    "mov rbx, [rdx + 0x18]",
    "mov rbp, [rdx + 0x10]",
    "mov rsp, [rdx + 0x08]",
    "jmp qword ptr [rdx + 0x00]",
    "1:",
    "ret",
    asm_function_end!("stackcoro_switch_context"),
);

extern "C" {
    fn stackcoro_init_trampoline();
    fn stackcoro_switch_context(from: *mut Context, to: *const Context);
}

/// Saves the current callee-saved register set and TEB stack fields into
/// `from`, restores `to` and continues executing at `to`'s resume address
/// on `to`'s stack.
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
/// enough to hold the return-address and shadow-space reservation.
pub(crate) unsafe fn init_context(
    ctx: &mut Context,
    func: InitialFunc,
    arg: *mut u8,
    stack_base: *mut u8,
    stack_size: usize,
) {
    // The entry function is reached by JMP, so carve out the frame a CALL
    // would have produced: poison in the return-address slot, shadow space
    // above it, RSP congruent to 8 modulo 16.
    let top = stack_base.add(stack_size - TOP_RESERVATION);
    top.cast::<usize>().write(STACK_POISON);

    ctx.rip = stackcoro_init_trampoline as usize;
    ctx.rsp = top as usize;
    ctx.r12 = func as usize;
    ctx.r13 = arg as usize;

    // Seed the TEB fields with this coroutine's stack extents so the
    // first switch installs sane bounds.
    ctx.teb_fiber_storage = 0;
    ctx.teb_deallocation_stack = stack_base as usize;
    ctx.teb_stack_limit = stack_base as usize;
    ctx.teb_stack_base = stack_base as usize + stack_size;
}
