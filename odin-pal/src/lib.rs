//! Platform Abstraction Layer
//!
//! Hardware support for the QEMU `virt` machine:
//! - [`platform`]: Device configuration singleton with compiled-in fallbacks
//! - [`console`]: Early console over the PL011, re-targetable after device
//!   discovery
//! - [`uart`]: PL011 driver (polled TX, IRQ-driven RX)
//! - [`gic`]: GICv2 distributor and CPU-interface driver
//! - [`timer`]: Generic-timer time source for log timestamps and uptime

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod console;
pub mod gic;
pub mod platform;
pub mod timer;
pub mod uart;

pub use platform::{GicConfig, PlatformConfig};
pub use uart::Pl011;
