//! Generic Timer Time Source
//!
//! Reads the ARM architectural counter for log timestamps and the shell's
//! `uptime` command. No timer interrupt is programmed; nothing in this
//! kernel preempts.

use core::sync::atomic::{AtomicU64, Ordering};

use aarch64_cpu::registers::{CNTFRQ_EL0, CNTPCT_EL0};
use tock_registers::interfaces::Readable;

/// Counter frequency, captured once at init.
static TIMER_FREQ: AtomicU64 = AtomicU64::new(0);

/// Capture the counter frequency.
pub fn init() {
    TIMER_FREQ.store(CNTFRQ_EL0.get(), Ordering::Relaxed);
}

/// Counter frequency in Hz (0 before [`init`]).
#[must_use]
pub fn frequency() -> u64 {
    TIMER_FREQ.load(Ordering::Relaxed)
}

/// Raw physical counter value.
#[must_use]
pub fn read_counter() -> u64 {
    CNTPCT_EL0.get()
}

/// Milliseconds since boot (0 before [`init`]).
#[must_use]
pub fn now_ms() -> u64 {
    let freq = TIMER_FREQ.load(Ordering::Relaxed);
    if freq == 0 {
        return 0;
    }
    let count = read_counter();
    // Split to avoid overflowing the multiplication
    (count / freq) * 1000 + (count % freq) * 1000 / freq
}
