//! Console Input
//!
//! The IRQ-driven receive path: a PL011 RX interrupt drains the hardware
//! FIFO into a lock-free SPSC ring, and the shell consumes the ring from
//! the foreground. When no interrupt path was discovered the ring simply
//! stays empty and blocking reads park on WFE.

use odin_arch::cpu;
use odin_mmio::SpscRing;
use odin_pal::uart::Pl011;
use odin_pal::{gic, platform};
use spin::Once;

use crate::irq;

/// RX ring: filled from IRQ context, drained by the shell.
static RX_RING: SpscRing<256> = SpscRing::new();

/// The UART handle used by the RX interrupt handler.
static RX_UART: Once<Pl011> = Once::new();

/// Wire up interrupt-driven receive.
///
/// Claims the UART window, registers the ring-feeder with the dispatcher,
/// unmasks the RX interrupt in the UART and enables its line at the GIC.
/// Returns `false` (leaving the console output-only) if the window claim
/// fails.
pub fn init(uart_base: u64, intid: u32) -> bool {
    let Ok(uart) = Pl011::new(uart_base) else {
        log::warn!("input: UART window {uart_base:#x} rejected");
        return false;
    };
    let uart = RX_UART.call_once(|| uart);

    irq::register(intid, rx_irq_handler);
    uart.enable_rx_interrupt();
    gic::set_priority(intid, 0x80);
    gic::enable_irq(intid);
    log::info!("input: RX interrupt enabled, INTID {intid}");
    true
}

/// Whether interrupt-driven input is wired up.
#[must_use]
pub fn available() -> bool {
    RX_UART.get().is_some() && platform::platform().has_uart_irq()
}

/// RX interrupt handler: drain the FIFO into the ring.
///
/// Ring overruns drop bytes silently; the FIFO must still be drained so
/// the level-triggered line deasserts.
fn rx_irq_handler(_intid: u32) {
    if let Some(uart) = RX_UART.get() {
        uart.drain_rx(&RX_RING);
    }
}

/// Non-blocking read from the ring.
#[must_use]
pub fn try_read_byte() -> Option<u8> {
    RX_RING.pop()
}

/// Blocking read: parks the core on WFE while the ring is empty.
///
/// Every interrupt wakes the core, so a byte posted by the RX handler is
/// picked up on the next iteration.
#[must_use]
pub fn read_byte_blocking() -> u8 {
    loop {
        if let Some(byte) = RX_RING.pop() {
            return byte;
        }
        cpu::wait_for_event();
    }
}
