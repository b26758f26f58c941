//! Exception Handling
//!
//! Implements the ARM64 exception vector table and the context save/restore
//! trampolines around it.
//!
//! The table has 16 entries of 128 bytes (4 exception types x 4 origins).
//! Only the "current EL with SP_ELx" group is expected to fire: the kernel
//! runs alone at EL1 on SP_EL1. Entries for the other origins route to a
//! diagnostic handler that reports the saved state and halts.
//!
//! Each live entry saves {x0..x30, SP_EL0, ELR_EL1, SPSR_EL1, ESR_EL1,
//! FAR_EL1} on the active stack, calls the assigned high-level handler with
//! a pointer to that frame, restores the frame, and returns with `ERET`.

use core::sync::atomic::{AtomicPtr, Ordering};

use crate::registers::{esr, spsr};

/// Exception context saved on the stack by the vector stubs.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    /// General purpose registers x0-x30
    pub gpr: [u64; 31],
    /// SP_EL0 at the time of the exception
    pub sp_el0: u64,
    /// Exception Link Register (return address)
    pub elr: u64,
    /// Saved Program Status Register
    pub spsr: u64,
    /// Exception Syndrome Register
    pub esr: u64,
    /// Fault Address Register
    pub far: u64,
}

impl ExceptionContext {
    /// Get the exception class from the saved ESR.
    #[must_use]
    pub fn exception_class(&self) -> u8 {
        esr::exception_class(self.esr)
    }

    /// Name of the exception level the exception was taken from.
    #[must_use]
    pub fn origin_el(&self) -> &'static str {
        spsr::el_name(self.spsr)
    }
}

/// Exception handler function type.
pub type ExceptionHandler = fn(&mut ExceptionContext);

/// Pluggable top-level handlers, updated atomically.
static SYNC_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_sync_handler as *mut ());
static IRQ_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_irq_handler as *mut ());
static FIQ_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_irq_handler as *mut ());
static SERROR_HANDLER: AtomicPtr<()> = AtomicPtr::new(default_serror_handler as *mut ());

/// Set the synchronous exception handler.
pub fn set_sync_handler(handler: ExceptionHandler) {
    SYNC_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Set the IRQ handler.
///
/// Takes effect on the next IRQ. The kernel installs the handler that runs
/// the acknowledge / dispatch / end-of-interrupt protocol.
pub fn set_irq_handler(handler: ExceptionHandler) {
    IRQ_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Set the FIQ handler.
pub fn set_fiq_handler(handler: ExceptionHandler) {
    FIQ_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Set the SError handler.
pub fn set_serror_handler(handler: ExceptionHandler) {
    SERROR_HANDLER.store(handler as *mut (), Ordering::Release);
}

/// Load an exception handler atomically.
///
/// # Safety
/// The pointer must have been stored by one of the `set_*_handler`
/// functions (or be a default), so it is a valid `ExceptionHandler`.
#[inline]
unsafe fn load_handler(slot: &AtomicPtr<()>) -> ExceptionHandler {
    let ptr = slot.load(Ordering::Acquire);
    // SAFETY: The pointer was stored as a valid function pointer
    unsafe { core::mem::transmute(ptr) }
}

/// Default synchronous exception handler: report and halt.
fn default_sync_handler(ctx: &mut ExceptionContext) {
    let ec = ctx.exception_class();
    panic!(
        "sync exception from {}: {} (EC={:#x}) ELR={:#x} ESR={:#x} FAR={:#x}",
        ctx.origin_el(),
        esr::ec_name(ec),
        ec,
        ctx.elr,
        ctx.esr,
        ctx.far
    );
}

/// Default IRQ/FIQ handler, replaced by the kernel during boot.
fn default_irq_handler(ctx: &mut ExceptionContext) {
    panic!("interrupt before dispatcher installed, ELR={:#x}", ctx.elr);
}

/// Default SError handler: report and halt.
fn default_serror_handler(ctx: &mut ExceptionContext) {
    panic!(
        "SError from {}: ELR={:#x} ESR={:#x}",
        ctx.origin_el(),
        ctx.elr,
        ctx.esr
    );
}

/// Exception vector stub macro - fits within a 128-byte vector entry.
///
/// Saves the full context and branches to a continuation handler.
///
/// Stack frame layout (36 * 8 = 288 bytes):
/// - x0-x30: offsets 0-240 (stp pairs + str for x30)
/// - SP_EL0: offset 248 (31 * 8)
/// - ELR_EL1: offset 256 (32 * 8)
/// - SPSR_EL1: offset 264 (33 * 8)
/// - ESR_EL1: offset 272 (34 * 8)
/// - FAR_EL1: offset 280 (35 * 8)
#[cfg(target_arch = "aarch64")]
macro_rules! exception_stub {
    ($continuation:ident) => {
        concat!(
            "sub sp, sp, #(36 * 8)\n",
            "stp x0, x1, [sp, #(0 * 16)]\n",
            "stp x2, x3, [sp, #(1 * 16)]\n",
            "stp x4, x5, [sp, #(2 * 16)]\n",
            "stp x6, x7, [sp, #(3 * 16)]\n",
            "stp x8, x9, [sp, #(4 * 16)]\n",
            "stp x10, x11, [sp, #(5 * 16)]\n",
            "stp x12, x13, [sp, #(6 * 16)]\n",
            "stp x14, x15, [sp, #(7 * 16)]\n",
            "stp x16, x17, [sp, #(8 * 16)]\n",
            "stp x18, x19, [sp, #(9 * 16)]\n",
            "stp x20, x21, [sp, #(10 * 16)]\n",
            "stp x22, x23, [sp, #(11 * 16)]\n",
            "stp x24, x25, [sp, #(12 * 16)]\n",
            "stp x26, x27, [sp, #(13 * 16)]\n",
            "stp x28, x29, [sp, #(14 * 16)]\n",
            "str x30, [sp, #(15 * 16)]\n",
            "mrs x0, sp_el0\n",
            "mrs x1, elr_el1\n",
            "mrs x2, spsr_el1\n",
            "mrs x3, esr_el1\n",
            "mrs x4, far_el1\n",
            "stp x0, x1, [sp, #(31 * 8)]\n",
            "stp x2, x3, [sp, #(33 * 8)]\n",
            "str x4, [sp, #(35 * 8)]\n",
            "b ",
            stringify!($continuation),
            "\n",
        )
    };
}

/// Exception continuation macro: call the Rust handler with the frame
/// pointer, restore the frame, and return via `eret`.
#[cfg(target_arch = "aarch64")]
macro_rules! exception_continuation {
    ($handler:ident) => {
        concat!(
            "mov x0, sp\n",
            "bl ",
            stringify!($handler),
            "\n",
            "ldp x0, x1, [sp, #(31 * 8)]\n",
            "ldr x2, [sp, #(33 * 8)]\n",
            "msr sp_el0, x0\n",
            "msr elr_el1, x1\n",
            "msr spsr_el1, x2\n",
            "ldp x0, x1, [sp, #(0 * 16)]\n",
            "ldp x2, x3, [sp, #(1 * 16)]\n",
            "ldp x4, x5, [sp, #(2 * 16)]\n",
            "ldp x6, x7, [sp, #(3 * 16)]\n",
            "ldp x8, x9, [sp, #(4 * 16)]\n",
            "ldp x10, x11, [sp, #(5 * 16)]\n",
            "ldp x12, x13, [sp, #(6 * 16)]\n",
            "ldp x14, x15, [sp, #(7 * 16)]\n",
            "ldp x16, x17, [sp, #(8 * 16)]\n",
            "ldp x18, x19, [sp, #(9 * 16)]\n",
            "ldp x20, x21, [sp, #(10 * 16)]\n",
            "ldp x22, x23, [sp, #(11 * 16)]\n",
            "ldp x24, x25, [sp, #(12 * 16)]\n",
            "ldp x26, x27, [sp, #(13 * 16)]\n",
            "ldp x28, x29, [sp, #(14 * 16)]\n",
            "ldr x30, [sp, #(15 * 16)]\n",
            "add sp, sp, #(36 * 8)\n",
            "eret\n"
        )
    };
}

// Continuation targets called from the vector stubs.

#[unsafe(no_mangle)]
extern "C" fn handle_sync(ctx: &mut ExceptionContext) {
    // SAFETY: Stored by set_sync_handler or the default
    let handler = unsafe { load_handler(&SYNC_HANDLER) };
    handler(ctx);
}

#[unsafe(no_mangle)]
extern "C" fn handle_irq(ctx: &mut ExceptionContext) {
    // SAFETY: Stored by set_irq_handler or the default
    let handler = unsafe { load_handler(&IRQ_HANDLER) };
    handler(ctx);
}

#[unsafe(no_mangle)]
extern "C" fn handle_fiq(ctx: &mut ExceptionContext) {
    // SAFETY: Stored by set_fiq_handler or the default
    let handler = unsafe { load_handler(&FIQ_HANDLER) };
    handler(ctx);
}

#[unsafe(no_mangle)]
extern "C" fn handle_serror(ctx: &mut ExceptionContext) {
    // SAFETY: Stored by set_serror_handler or the default
    let handler = unsafe { load_handler(&SERROR_HANDLER) };
    handler(ctx);
}

/// Handler for origins that must never fire (SP_EL0, lower EL).
#[unsafe(no_mangle)]
extern "C" fn handle_unexpected(ctx: &mut ExceptionContext) {
    panic!(
        "exception from unexpected origin {}: ELR={:#x} ESR={:#x} FAR={:#x}",
        ctx.origin_el(),
        ctx.elr,
        ctx.esr,
        ctx.far
    );
}

#[cfg(target_arch = "aarch64")]
mod vectors {
    use core::arch::naked_asm;

    /// Synchronous exception continuation.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    unsafe extern "C" fn __exc_sync_cont() {
        naked_asm!(exception_continuation!(handle_sync));
    }

    /// IRQ continuation.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    unsafe extern "C" fn __exc_irq_cont() {
        naked_asm!(exception_continuation!(handle_irq));
    }

    /// FIQ continuation.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    unsafe extern "C" fn __exc_fiq_cont() {
        naked_asm!(exception_continuation!(handle_fiq));
    }

    /// SError continuation.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    unsafe extern "C" fn __exc_serror_cont() {
        naked_asm!(exception_continuation!(handle_serror));
    }

    /// Unexpected-origin continuation.
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    unsafe extern "C" fn __exc_unexpected_cont() {
        naked_asm!(exception_continuation!(handle_unexpected));
    }

    /// The exception vector table.
    ///
    /// 2KiB aligned, 16 entries of 128 bytes:
    /// - Current EL with SP_EL0: entries 0-3 (unexpected)
    /// - Current EL with SP_ELx: entries 4-7 (live)
    /// - Lower EL (AArch64): entries 8-11 (unexpected)
    /// - Lower EL (AArch32): entries 12-15 (unexpected)
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    #[unsafe(link_section = ".vectors")]
    pub unsafe extern "C" fn exception_vectors() {
        naked_asm!(
            ".balign 2048",
            // Current EL with SP_EL0
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            // Current EL with SP_ELx
            ".balign 128",
            exception_stub!(__exc_sync_cont),
            ".balign 128",
            exception_stub!(__exc_irq_cont),
            ".balign 128",
            exception_stub!(__exc_fiq_cont),
            ".balign 128",
            exception_stub!(__exc_serror_cont),
            // Lower EL using AArch64
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            // Lower EL using AArch32
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
            ".balign 128",
            exception_stub!(__exc_unexpected_cont),
        );
    }
}

/// Install the vector table into VBAR_EL1.
#[cfg(target_arch = "aarch64")]
pub fn install() {
    let table = vectors::exception_vectors as *const () as u64;
    crate::registers::write_vbar_el1(table);
    crate::cpu::isb();
}

#[cfg(not(target_arch = "aarch64"))]
pub fn install() {}

/// Get the installed vector table address.
#[must_use]
pub fn vector_table_address() -> u64 {
    crate::registers::read_vbar_el1()
}
