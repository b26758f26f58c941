//! Identity-Map Layout and MMU Bring-Up
//!
//! Maps the kernel image as normal executable memory and each discovered
//! device window as non-executable device memory, then turns the MMU on.
//! Must run after device discovery (the windows come from the platform
//! config) and before the GIC is initialised (GIC MMIO relies on the
//! device mappings).

use odin_arch::mmu::{self, MapError, MemoryType};
use odin_pal::platform::{GICC_WINDOW_SIZE, GICD_WINDOW_SIZE, PlatformConfig, UART_WINDOW_SIZE};

/// Start of the identity-mapped kernel region (QEMU `virt` RAM base; the
/// DTB sits here and the image is linked just above).
pub const KERNEL_BASE: u64 = 0x4000_0000;

/// Identity-mapped kernel region: DTB, image, data, stack and slack.
pub const KERNEL_SIZE: u64 = 128 * 1024 * 1024;

/// Map the boot address space and enable the MMU.
pub fn init(config: &PlatformConfig) -> Result<(), MapError> {
    let mut mmu = mmu::mmu();

    mmu.map_range(KERNEL_BASE, KERNEL_BASE, KERNEL_SIZE, MemoryType::Normal, true)?;
    mmu.map_range(
        config.uart_base,
        config.uart_base,
        UART_WINDOW_SIZE as u64,
        MemoryType::Device,
        false,
    )?;
    if let Some(gic) = config.gic {
        mmu.map_range(
            gic.distributor_base,
            gic.distributor_base,
            GICD_WINDOW_SIZE as u64,
            MemoryType::Device,
            false,
        )?;
        mmu.map_range(
            gic.cpu_interface_base,
            gic.cpu_interface_base,
            GICC_WINDOW_SIZE as u64,
            MemoryType::Device,
            false,
        )?;
    }

    mmu.enable();
    log::info!("mmu: enabled, kernel {KERNEL_BASE:#x}+{}MiB identity-mapped", KERNEL_SIZE >> 20);
    Ok(())
}
