//! CPU Control
//!
//! Low-level CPU operations: exception-level query, event/interrupt wait,
//! interrupt masking, barriers, and instruction-cache maintenance.
//!
//! The inline-assembly paths are aarch64-only; host builds (unit tests)
//! get inert fallbacks so the pure crates still compile and run.

use aarch64_cpu::registers::*;

/// Get the current exception level (0..3).
#[must_use]
pub fn current_el() -> u8 {
    ((CurrentEL.get() >> 2) & 0x3) as u8
}

/// Halt the CPU forever.
///
/// Parks in a WFE loop; interrupts and events wake the core but control
/// never leaves this function.
#[inline]
pub fn halt() -> ! {
    loop {
        wait_for_event();
    }
}

/// Wait for event (WFE instruction).
///
/// Suspends the core until an event or interrupt arrives. Interrupt entry
/// counts as a wake-up event, which is what lets the shell's blocking read
/// sleep between received characters.
#[inline]
pub fn wait_for_event() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: WFE is always safe to call
    unsafe {
        core::arch::asm!("wfe", options(nomem, nostack));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::hint::spin_loop();
}

/// Send event (SEV instruction).
#[inline]
pub fn send_event() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: SEV is always safe to call
    unsafe {
        core::arch::asm!("sev", options(nomem, nostack));
    }
}

/// Data synchronisation barrier (DSB SY).
#[inline]
pub fn dsb_sy() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: Memory barrier is always safe
    unsafe {
        core::arch::asm!("dsb sy", options(nostack));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

/// Instruction synchronisation barrier (ISB).
#[inline]
pub fn isb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: ISB is always safe
    unsafe {
        core::arch::asm!("isb", options(nostack));
    }
    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
}

/// Disable all interrupts and return the previous DAIF state.
#[must_use]
#[inline]
pub fn disable_interrupts() -> u64 {
    #[cfg(target_arch = "aarch64")]
    {
        let daif = DAIF.get();
        // SAFETY: Modifying DAIF is safe in kernel mode
        unsafe {
            core::arch::asm!("msr daifset, #0xf", options(nomem, nostack));
        }
        daif
    }
    #[cfg(not(target_arch = "aarch64"))]
    0
}

/// Enable all interrupts.
#[inline]
pub fn enable_interrupts() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: Modifying DAIF is safe in kernel mode
    unsafe {
        core::arch::asm!("msr daifclr, #0xf", options(nomem, nostack));
    }
}

/// Restore a DAIF state previously returned by [`disable_interrupts`].
#[inline]
pub fn restore_interrupts(daif: u64) {
    #[cfg(target_arch = "aarch64")]
    DAIF.set(daif);
    #[cfg(not(target_arch = "aarch64"))]
    let _ = daif;
}

/// Check if IRQs are unmasked.
#[must_use]
pub fn interrupts_enabled() -> bool {
    #[cfg(target_arch = "aarch64")]
    {
        (DAIF.get() & 0xC0) == 0
    }
    #[cfg(not(target_arch = "aarch64"))]
    false
}

/// Invalidate the entire instruction cache (IC IALLU).
#[inline]
pub fn invalidate_icache() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: Cache maintenance is always safe
    unsafe {
        core::arch::asm!("ic iallu", "dsb sy", "isb", options(nostack));
    }
}

/// Invalidate all stage-1 EL1 TLB entries (TLBI VMALLE1).
#[inline]
pub fn invalidate_tlb() {
    #[cfg(target_arch = "aarch64")]
    // SAFETY: TLB invalidation is always safe
    unsafe {
        core::arch::asm!("tlbi vmalle1", "dsb sy", "isb", options(nostack));
    }
}
