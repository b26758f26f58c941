//! Memory Barrier Helpers
//!
//! Provides memory barrier operations for device drivers. These ensure
//! proper ordering of memory operations, which is critical for:
//!
//! - Device register accesses
//! - Publishing ring buffer entries between IRQ and task context
//! - System register updates (paired with ISB)
//!
//! # ARM64 Memory Model
//!
//! ARM64 has a weakly-ordered memory model. The barriers provided here map to:
//! - `read_barrier()`: Acquire semantics (loads before this complete first)
//! - `write_barrier()`: Release semantics (stores before this complete first)
//! - `dmb_sy()`: Data Memory Barrier (ordering only)
//! - `dsb_sy()`: Data Synchronisation Barrier (waits for completion)
//! - `isb()`: Instruction Synchronisation Barrier (pipeline flush)
//!
//! On non-aarch64 targets (host unit-test builds) the hardware barriers
//! degrade to compiler fences.

use core::sync::atomic::{Ordering, compiler_fence, fence};

/// Read barrier (acquire semantics).
///
/// Ensures all loads before this barrier complete before any loads after.
#[inline]
pub fn read_barrier() {
    fence(Ordering::Acquire);
}

/// Write barrier (release semantics).
///
/// Ensures all stores before this barrier complete before any stores after.
/// Use before publishing an index that makes data visible to a consumer.
#[inline]
pub fn write_barrier() {
    fence(Ordering::Release);
}

/// Data Memory Barrier (DMB SY).
///
/// Ensures that all memory accesses before this barrier are observed before
/// any memory accesses after. Unlike DSB, this doesn't wait for completion,
/// just ensures ordering. Issued after MMIO reads.
#[inline]
pub fn dmb_sy() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: DMB is always safe to execute
    unsafe {
        core::arch::asm!("dmb sy", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    compiler_fence(Ordering::SeqCst);
}

/// Data Synchronisation Barrier (DSB SY).
///
/// Ensures all memory accesses (including device memory) complete before
/// continuing. Issued after MMIO writes and around translation-table and
/// cache maintenance.
#[inline]
pub fn dsb_sy() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: DSB is always safe to execute
    unsafe {
        core::arch::asm!("dsb sy", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    compiler_fence(Ordering::SeqCst);
}

/// Instruction Synchronisation Barrier (ISB).
///
/// Flushes the processor pipeline, ensuring all preceding instructions
/// complete and subsequent instructions are fetched fresh. Issued after
/// system register writes (MAIR, TCR, TTBR, SCTLR, VBAR).
#[inline]
pub fn isb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: ISB is always safe to execute
    unsafe {
        core::arch::asm!("isb", options(nostack, preserves_flags));
    }
    #[cfg(not(target_arch = "aarch64"))]
    compiler_fence(Ordering::SeqCst);
}
