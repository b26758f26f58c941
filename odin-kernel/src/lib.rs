//! # odin-kernel
//!
//! The OdinOS kernel proper: boot phase sequencing, IRQ dispatch, logging,
//! memory layout, console input and the interactive shell.
//!
//! # Boot contract
//!
//! Firmware jumps to `_start` (in `main.rs`) with the physical address of
//! the FDT blob in `x0` and interrupts masked. The trampoline sets the
//! stack to the linker-provided `__stack_top`, zeroes
//! `[__bss_start, __bss_end)`, and calls [`boot::kernel_main`] with the
//! preserved FDT pointer.
//!
//! # Memory layout
//!
//! The kernel is linked at `0x4008_0000` (QEMU `virt` RAM starts at
//! `0x4000_0000`, with the DTB at the RAM base) and runs identity-mapped:
//! - `.text.boot`: the `_start` trampoline
//! - `.text` / `.vectors`: code and the exception vector table
//! - `.rodata` / `.data` / `.bss`: data, ending in the boot stack

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod boot;
pub mod input;
pub mod irq;
pub mod logging;
pub mod memory;
pub mod shell;
