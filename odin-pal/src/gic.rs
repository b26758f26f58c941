//! GICv2 Driver
//!
//! Register-level driver for the ARM Generic Interrupt Controller v2:
//! the global distributor (GICD) and the CPU interface (GICC) of the boot
//! CPU. All register traffic goes through the checked MMIO layer.
//!
//! Interrupt IDs (INTIDs):
//! - 0-15: SGI (software generated, unused here)
//! - 16-31: PPI (per-CPU peripherals)
//! - 32-1019: SPI (shared peripherals, e.g. the UART)
//! - 1023: spurious, returned by an acknowledge with nothing pending

use odin_mmio::{AccessViolation, MmioRegion};
use spin::Mutex;

use crate::platform::{GICC_WINDOW_SIZE, GICD_WINDOW_SIZE};

/// Highest INTID the GIC architecture can deliver to software.
pub const MAX_IRQS: usize = 1020;

/// INTID reported by an acknowledge when no interrupt is pending.
pub const SPURIOUS_IRQ: u32 = 1023;

/// Distributor register offsets.
mod gicd {
    /// Distributor control
    pub const CTLR: usize = 0x000;
    /// Interrupt controller type (ITLinesNumber in bits 4:0)
    pub const TYPER: usize = 0x004;
    /// Set-enable, one bit per interrupt
    pub const ISENABLER: usize = 0x100;
    /// Clear-enable, one bit per interrupt
    pub const ICENABLER: usize = 0x180;
    /// Clear-pending, one bit per interrupt
    pub const ICPENDR: usize = 0x280;
    /// Priority, one byte per interrupt
    pub const IPRIORITYR: usize = 0x400;
    /// Target CPUs, one byte per interrupt
    pub const ITARGETSR: usize = 0x800;
    /// Trigger configuration, two bits per interrupt
    pub const ICFGR: usize = 0xC00;
}

/// CPU interface register offsets.
mod gicc {
    /// CPU interface control
    pub const CTLR: usize = 0x00;
    /// Priority mask
    pub const PMR: usize = 0x04;
    /// Binary point
    pub const BPR: usize = 0x08;
    /// Interrupt acknowledge
    pub const IAR: usize = 0x0C;
    /// End of interrupt
    pub const EOIR: usize = 0x10;
}

/// GICv2 driver state for the boot CPU.
pub struct GicV2 {
    dist: MmioRegion,
    cpu: MmioRegion,
    num_irqs: usize,
}

impl GicV2 {
    /// Claim the distributor and CPU-interface windows.
    pub fn new(gicd_base: u64, gicc_base: u64) -> Result<Self, AccessViolation> {
        let dist = MmioRegion::new(gicd_base as usize, GICD_WINDOW_SIZE)?;
        let cpu = MmioRegion::new(gicc_base as usize, GICC_WINDOW_SIZE)?;
        Ok(Self {
            dist,
            cpu,
            num_irqs: 0,
        })
    }

    /// Number of interrupt lines the distributor implements.
    #[must_use]
    pub fn num_irqs(&self) -> usize {
        self.num_irqs
    }

    /// Initialise the distributor and the CPU interface.
    ///
    /// Leaves every interrupt disabled, unpended, at the lowest priority,
    /// level-sensitive and targeted at CPU 0, with the distributor and CPU
    /// interface enabled and the priority mask fully open.
    fn init(&mut self) {
        // Quiesce the distributor while reconfiguring
        self.dist.write32(gicd::CTLR, 0);

        // ITLinesNumber: lines = 32 * (N + 1)
        let typer = self.dist.read32(gicd::TYPER);
        self.num_irqs = (32 * ((typer as usize & 0x1F) + 1)).min(MAX_IRQS);
        let words = self.num_irqs.div_ceil(32);

        // Disable and unpend everything
        for i in 0..words {
            self.dist.write32(gicd::ICENABLER + i * 4, 0xFFFF_FFFF);
        }
        for i in 0..words {
            self.dist.write32(gicd::ICPENDR + i * 4, 0xFFFF_FFFF);
        }

        // Lowest priority everywhere; drivers raise what they use
        for i in 0..self.num_irqs.div_ceil(4) {
            self.dist.write32(gicd::IPRIORITYR + i * 4, 0xFFFF_FFFF);
        }

        // Route all SPIs at CPU 0. The first 32 INTIDs are banked per-CPU
        // and their target registers are read-only.
        for i in 8..self.num_irqs.div_ceil(4) {
            self.dist.write32(gicd::ITARGETSR + i * 4, 0x0101_0101);
        }

        // All SPIs level-sensitive. Register 0 covers the SGIs and is
        // read-only.
        for i in 1..self.num_irqs.div_ceil(16) {
            self.dist.write32(gicd::ICFGR + i * 4, 0);
        }

        self.dist.write32(gicd::CTLR, 1);

        // CPU interface: accept every priority, no preemption grouping
        self.cpu.write32(gicc::PMR, 0xFF);
        self.cpu.write32(gicc::BPR, 0);
        self.cpu.write32(gicc::CTLR, 1);
    }

    /// Enable delivery of an interrupt.
    pub fn enable_irq(&self, intid: u32) {
        if !self.check_intid(intid) {
            return;
        }
        let reg = (intid / 32) as usize;
        self.dist
            .write32(gicd::ISENABLER + reg * 4, 1 << (intid % 32));
    }

    /// Disable delivery of an interrupt.
    pub fn disable_irq(&self, intid: u32) {
        if !self.check_intid(intid) {
            return;
        }
        let reg = (intid / 32) as usize;
        self.dist
            .write32(gicd::ICENABLER + reg * 4, 1 << (intid % 32));
    }

    /// Set an interrupt's priority (0 = highest, 255 = lowest).
    pub fn set_priority(&self, intid: u32, priority: u8) {
        if !self.check_intid(intid) {
            return;
        }
        let reg = (intid / 4) as usize;
        let shift = (intid % 4) * 8;
        self.dist.modify32(gicd::IPRIORITYR + reg * 4, |word| {
            (word & !(0xFF << shift)) | ((priority as u32) << shift)
        });
    }

    /// Acknowledge the highest-priority pending interrupt.
    ///
    /// Returns the raw INTID; [`SPURIOUS_IRQ`] means nothing was pending
    /// and no end-of-interrupt is owed.
    #[must_use]
    pub fn acknowledge(&self) -> u32 {
        self.cpu.read32(gicc::IAR) & 0x3FF
    }

    /// Signal completion of an acknowledged interrupt.
    ///
    /// Required for every non-spurious acknowledge, whether or not a
    /// handler ran.
    pub fn end_of_interrupt(&self, intid: u32) {
        self.cpu.write32(gicc::EOIR, intid);
    }

    fn check_intid(&self, intid: u32) -> bool {
        if intid as usize >= self.num_irqs {
            log::warn!("gic: INTID {intid} out of range");
            return false;
        }
        true
    }
}

/// Global GIC instance; `None` until [`init`] succeeds.
static GIC: Mutex<Option<GicV2>> = Mutex::new(None);

/// Initialise the GIC at the discovered windows.
///
/// Fails if either window is rejected by the MMIO policy.
pub fn init(gicd_base: u64, gicc_base: u64) -> Result<(), AccessViolation> {
    let mut gic = GicV2::new(gicd_base, gicc_base)?;
    gic.init();
    log::info!(
        "gic: v2 at GICD {gicd_base:#x} / GICC {gicc_base:#x}, {} lines",
        gic.num_irqs()
    );
    *GIC.lock() = Some(gic);
    Ok(())
}

/// Check whether the GIC has been initialised.
#[must_use]
pub fn is_initialised() -> bool {
    GIC.lock().is_some()
}

/// Enable an interrupt, if the GIC is up.
pub fn enable_irq(intid: u32) {
    match &*GIC.lock() {
        Some(gic) => gic.enable_irq(intid),
        None => log::warn!("gic: enable_irq({intid}) with no GIC"),
    }
}

/// Disable an interrupt, if the GIC is up.
pub fn disable_irq(intid: u32) {
    if let Some(gic) = &*GIC.lock() {
        gic.disable_irq(intid);
    }
}

/// Set an interrupt's priority, if the GIC is up.
pub fn set_priority(intid: u32, priority: u8) {
    if let Some(gic) = &*GIC.lock() {
        gic.set_priority(intid, priority);
    }
}

/// Acknowledge the pending interrupt (IRQ context).
///
/// Returns [`SPURIOUS_IRQ`] when no GIC is configured, which the
/// dispatcher already treats as "nothing to do".
#[must_use]
pub fn acknowledge() -> u32 {
    match &*GIC.lock() {
        Some(gic) => gic.acknowledge(),
        None => SPURIOUS_IRQ,
    }
}

/// Complete an acknowledged interrupt (IRQ context).
pub fn end_of_interrupt(intid: u32) {
    if let Some(gic) = &*GIC.lock() {
        gic.end_of_interrupt(intid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_claims_are_policy_checked() {
        assert!(GicV2::new(0x0800_0000, 0x0801_0000).is_ok());
        // Kernel range is never a GIC
        assert!(GicV2::new(0x4000_0000, 0x4001_0000).is_err());
        // Outside every whitelisted window
        assert!(GicV2::new(0x0600_0000, 0x0601_0000).is_err());
    }
}
