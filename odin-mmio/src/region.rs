//! Checked MMIO Register Access
//!
//! Typed volatile reads and writes over physical addresses, composed with
//! the whitelist in [`policy`](crate::policy) and the barrier discipline in
//! [`barrier`](crate::barrier):
//!
//! - every access is validated before the bus is touched;
//! - a rejected read returns an all-ones sentinel of the requested width;
//! - a rejected write is dropped;
//! - both are logged as security violations;
//! - accepted reads are followed by DMB, accepted writes by DSB.
//!
//! The free functions are the primitives; [`MmioRegion`] layers offset-based
//! access on top for drivers that own a register window.

use core::ptr::{read_volatile, write_volatile};

use crate::barrier::{dmb_sy, dsb_sy};
use crate::policy::{self, AccessViolation};

/// Read an 8-bit register at a physical address.
///
/// Returns `0xFF` if the address is rejected by the access policy.
#[inline]
pub fn read8(addr: usize) -> u8 {
    match policy::check(addr, 1) {
        Ok(_) => {
            // SAFETY: The address lies within a whitelisted device window
            let value = unsafe { read_volatile(addr as *const u8) };
            dmb_sy();
            value
        }
        Err(violation) => {
            log_violation("read8", violation);
            u8::MAX
        }
    }
}

/// Read a 32-bit register at a physical address.
///
/// Returns `0xFFFF_FFFF` if the address is rejected by the access policy.
#[inline]
pub fn read32(addr: usize) -> u32 {
    match policy::check(addr, 4) {
        Ok(_) => {
            // SAFETY: The address lies within a whitelisted device window
            let value = unsafe { read_volatile(addr as *const u32) };
            dmb_sy();
            value
        }
        Err(violation) => {
            log_violation("read32", violation);
            u32::MAX
        }
    }
}

/// Read a 64-bit register at a physical address.
///
/// Returns `u64::MAX` if the address is rejected by the access policy.
#[inline]
pub fn read64(addr: usize) -> u64 {
    match policy::check(addr, 8) {
        Ok(_) => {
            // SAFETY: The address lies within a whitelisted device window
            let value = unsafe { read_volatile(addr as *const u64) };
            dmb_sy();
            value
        }
        Err(violation) => {
            log_violation("read64", violation);
            u64::MAX
        }
    }
}

/// Write an 8-bit register at a physical address.
///
/// The write is dropped if the address is rejected by the access policy.
#[inline]
pub fn write8(addr: usize, value: u8) {
    match policy::check(addr, 1) {
        Ok(_) => {
            // SAFETY: The address lies within a whitelisted device window
            unsafe { write_volatile(addr as *mut u8, value) };
            dsb_sy();
        }
        Err(violation) => log_violation("write8", violation),
    }
}

/// Write a 32-bit register at a physical address.
///
/// The write is dropped if the address is rejected by the access policy.
#[inline]
pub fn write32(addr: usize, value: u32) {
    match policy::check(addr, 4) {
        Ok(_) => {
            // SAFETY: The address lies within a whitelisted device window
            unsafe { write_volatile(addr as *mut u32, value) };
            dsb_sy();
        }
        Err(violation) => log_violation("write32", violation),
    }
}

/// Write a 64-bit register at a physical address.
///
/// The write is dropped if the address is rejected by the access policy.
#[inline]
pub fn write64(addr: usize, value: u64) {
    match policy::check(addr, 8) {
        Ok(_) => {
            // SAFETY: The address lies within a whitelisted device window
            unsafe { write_volatile(addr as *mut u64, value) };
            dsb_sy();
        }
        Err(violation) => log_violation("write64", violation),
    }
}

fn log_violation(op: &str, violation: AccessViolation) {
    match violation {
        AccessViolation::KernelRange { addr } => {
            log::warn!("mmio: {op} at {addr:#x} rejected: kernel range");
        }
        AccessViolation::NotWhitelisted { addr } => {
            log::warn!("mmio: {op} at {addr:#x} rejected: not whitelisted");
        }
        AccessViolation::AddressWrap { addr } => {
            log::warn!("mmio: {op} at {addr:#x} rejected: address wrap");
        }
    }
}

/// A device register window.
///
/// Provides offset-based access to device registers. Construction validates
/// the whole window against the access policy, so a hostile device tree
/// cannot point a driver at the kernel image. Individual accesses are
/// re-validated by the free functions above.
///
/// # Example
///
/// ```ignore
/// let uart = MmioRegion::new(0x0900_0000, 0x1000)?;
/// let flags = uart.read32(0x18);
/// ```
#[derive(Clone, Copy)]
pub struct MmioRegion {
    base: usize,
    size: usize,
}

impl MmioRegion {
    /// Claim a register window.
    ///
    /// Fails if `[base, base + size)` is not wholly contained in a
    /// whitelisted device window.
    pub fn new(base: usize, size: usize) -> Result<Self, AccessViolation> {
        policy::check_window(base, size)?;
        Ok(Self { base, size })
    }

    /// Get the base address of this window.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Get the size of this window.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Read an 8-bit register at the given offset.
    #[inline]
    #[must_use]
    pub fn read8(&self, offset: usize) -> u8 {
        debug_assert!(offset < self.size, "MMIO read8 offset out of bounds");
        read8(self.base + offset)
    }

    /// Read a 32-bit register at the given offset.
    #[inline]
    #[must_use]
    pub fn read32(&self, offset: usize) -> u32 {
        debug_assert!(offset + 4 <= self.size, "MMIO read32 offset out of bounds");
        read32(self.base + offset)
    }

    /// Read a 64-bit register at the given offset.
    #[inline]
    #[must_use]
    pub fn read64(&self, offset: usize) -> u64 {
        debug_assert!(offset + 8 <= self.size, "MMIO read64 offset out of bounds");
        read64(self.base + offset)
    }

    /// Write an 8-bit register at the given offset.
    #[inline]
    pub fn write8(&self, offset: usize, value: u8) {
        debug_assert!(offset < self.size, "MMIO write8 offset out of bounds");
        write8(self.base + offset, value);
    }

    /// Write a 32-bit register at the given offset.
    #[inline]
    pub fn write32(&self, offset: usize, value: u32) {
        debug_assert!(offset + 4 <= self.size, "MMIO write32 offset out of bounds");
        write32(self.base + offset, value);
    }

    /// Write a 64-bit register at the given offset.
    #[inline]
    pub fn write64(&self, offset: usize, value: u64) {
        debug_assert!(offset + 8 <= self.size, "MMIO write64 offset out of bounds");
        write64(self.base + offset, value);
    }

    /// Modify a 32-bit register using read-modify-write.
    ///
    /// Note: this is NOT atomic with respect to the device.
    #[inline]
    pub fn modify32<F>(&self, offset: usize, f: F)
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read32(offset);
        self.write32(offset, f(value));
    }
}

impl core::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MmioRegion")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_reads_return_sentinel() {
        // Kernel range: forbidden regardless of the window table
        assert_eq!(read8(0x4000_0000), u8::MAX);
        assert_eq!(read32(0x4000_0000), u32::MAX);
        assert_eq!(read64(0x4000_0000), u64::MAX);
        // Unmapped address
        assert_eq!(read32(0x1234_5678), u32::MAX);
    }

    #[test]
    fn rejected_writes_are_dropped() {
        // Must not fault: the write never reaches the bus
        write32(0x4000_0000, 0xDEAD_BEEF);
        write8(0x7FFF_FFFF, 0xAA);
    }

    #[test]
    fn region_construction_is_policy_checked() {
        assert!(MmioRegion::new(0x0900_0000, 0x1000).is_ok());
        assert!(MmioRegion::new(0x4000_0000, 0x1000).is_err());
        assert!(MmioRegion::new(0x0900_0800, 0x1000).is_err()); // straddles the window end
    }
}
