//! Platform Configuration
//!
//! One platform config for the whole kernel, assembled by the boot path
//! from device-tree discovery and published exactly once. Every field has
//! a compiled-in QEMU `virt` fallback so a missing or malformed device
//! tree degrades to polled console output instead of a dead machine.

use spin::Once;

/// PL011 base on QEMU `virt`, used when discovery fails.
pub const FALLBACK_UART_BASE: u64 = 0x0900_0000;

/// Size of the PL011 register window.
pub const UART_WINDOW_SIZE: usize = 0x1000;

/// Size of the GIC distributor register window.
pub const GICD_WINDOW_SIZE: usize = 0x1_0000;

/// Size of the GIC CPU-interface register window.
pub const GICC_WINDOW_SIZE: usize = 0x1_0000;

/// GICv2 register windows discovered from the device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicConfig {
    /// Distributor (GICD) base address
    pub distributor_base: u64,
    /// CPU interface (GICC) base address
    pub cpu_interface_base: u64,
}

/// The platform as the boot path discovered it.
#[derive(Debug, Clone, Copy)]
pub struct PlatformConfig {
    /// PL011 register base
    pub uart_base: u64,
    /// UART RX INTID, when the device tree carried one
    pub uart_irq: Option<u32>,
    /// GICv2 windows, when an interrupt controller was found
    pub gic: Option<GicConfig>,
}

impl PlatformConfig {
    /// The compiled-in QEMU `virt` fallback: polled UART, no interrupts.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            uart_base: FALLBACK_UART_BASE,
            uart_irq: None,
            gic: None,
        }
    }

    /// Whether interrupt-driven console input is possible.
    #[must_use]
    pub fn has_uart_irq(&self) -> bool {
        self.gic.is_some() && self.uart_irq.is_some()
    }
}

static PLATFORM: Once<PlatformConfig> = Once::new();

/// Publish the platform configuration.
///
/// Must be called exactly once, after device discovery and before any
/// subsystem that reads the config. A second call is ignored.
pub fn init(config: PlatformConfig) -> &'static PlatformConfig {
    PLATFORM.call_once(|| config)
}

/// Get the platform configuration, if published.
pub fn get() -> Option<&'static PlatformConfig> {
    PLATFORM.get()
}

/// Get the platform configuration.
///
/// # Panics
/// Panics if called before [`init`]; the boot phase ordering makes that a
/// kernel bug.
#[must_use]
pub fn platform() -> &'static PlatformConfig {
    PLATFORM.get().expect("platform not initialised")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_has_no_interrupt_path() {
        let config = PlatformConfig::fallback();
        assert_eq!(config.uart_base, 0x0900_0000);
        assert!(!config.has_uart_irq());
    }

    #[test]
    fn irq_path_needs_both_gic_and_irq() {
        let mut config = PlatformConfig::fallback();
        config.uart_irq = Some(33);
        assert!(!config.has_uart_irq());
        config.gic = Some(GicConfig {
            distributor_base: 0x0800_0000,
            cpu_interface_base: 0x0801_0000,
        });
        assert!(config.has_uart_irq());
    }
}
