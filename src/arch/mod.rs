//! Per-architecture context switching.
//!
//! Each submodule provides three things:
//! - `Context`, a `#[repr(C)]` buffer holding the platform's callee-saved
//!   register set, the stack pointer and a resume address;
//! - `switch_context`, the assembly routine that saves the current set into
//!   one buffer, restores another and continues there;
//! - `init_context`, which seeds a fresh buffer so that the first switch
//!   into it lands in the architecture trampoline, which in turn jumps into
//!   the entry function with the coroutine object as its argument.
//!
//! The context block embedded in a coroutine allocation is sized with
//! `mem::size_of`, never hard-coded, so growing a register set only ever
//! touches the file that defines it.

// Helper macros to deal with platform-specific differences in assembly code
// between ELF, Mach-O and COFF file formats.
cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        macro_rules! asm_mangle {
            ($name:literal) => { concat!("_", $name) };
        }
    } else {
        macro_rules! asm_mangle {
            ($name:literal) => { $name };
        }
    }
}
cfg_if::cfg_if! {
    if #[cfg(windows)] {
        // COFF
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".def ", asm_mangle!($name), "\n",
                    ".scl 2\n",
                    ".type 32\n",
                    ".endef ", asm_mangle!($name), "\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                ""
            };
        }
    } else if #[cfg(target_vendor = "apple")] {
        // Mach-O
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".private_extern ", asm_mangle!($name), "\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                ""
            };
        }
    } else {
        // Everything else uses ELF
        macro_rules! asm_function_begin {
            ($name:literal) => {
                concat!(
                    ".globl ", asm_mangle!($name), "\n",
                    ".type ", asm_mangle!($name), ", @function\n",
                    asm_mangle!($name), ":\n",
                )
            };
        }
        macro_rules! asm_function_end {
            ($name:literal) => {
                concat!(".size ", asm_mangle!($name), ", . - ", asm_mangle!($name), "\n")
            };
        }
    }
}

/// First function executed on a fresh coroutine stack. The trampoline jumps
/// here with the coroutine object pointer as the single argument. It must
/// finish with a context switch rather than a return; there is nothing on
/// the fresh stack to return to.
pub(crate) type InitialFunc = unsafe extern "C" fn(*mut u8) -> !;

/// Word written at the very top of a fresh stack where a return address
/// would normally live. Recognizable in a debugger; never executed.
pub(crate) const STACK_POISON: usize = 0xdead_dead_dead_dead;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", not(windows)))] {
        mod x86_64;
        pub(crate) use self::x86_64::*;
    } else if #[cfg(all(target_arch = "x86_64", windows))] {
        mod x86_64_windows;
        pub(crate) use self::x86_64_windows::*;
    } else if #[cfg(all(target_arch = "aarch64", not(windows)))] {
        mod aarch64;
        pub(crate) use self::aarch64::*;
    } else if #[cfg(all(target_arch = "riscv64", not(windows)))] {
        mod riscv64;
        pub(crate) use self::riscv64::*;
    } else {
        compile_error!("Unsupported target");
    }
}
