//! IRQ Dispatch
//!
//! Routes acknowledged interrupts to their registered handlers and keeps
//! delivery statistics.
//!
//! The handler table is populated during boot, before interrupts are
//! unmasked, and only read afterwards; the mutex guards the registration
//! window, not steady-state dispatch.

use core::sync::atomic::{AtomicU64, Ordering};

use odin_arch::exceptions::{self, ExceptionContext};
use odin_pal::gic;
use spin::Mutex;

/// Number of dispatchable INTIDs (1020-1023 are reserved IDs).
pub const MAX_HANDLERS: usize = 1020;

/// Interrupt handler function type.
pub type IrqHandler = fn(intid: u32);

/// Registered handlers, indexed by INTID.
static HANDLERS: Mutex<[Option<IrqHandler>; MAX_HANDLERS]> = Mutex::new([None; MAX_HANDLERS]);

static TOTAL: AtomicU64 = AtomicU64::new(0);
static SPURIOUS: AtomicU64 = AtomicU64::new(0);
static UNHANDLED: AtomicU64 = AtomicU64::new(0);

/// Delivery statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrqStats {
    /// Interrupts acknowledged (including spurious)
    pub total: u64,
    /// Spurious acknowledgements (INTID 1023)
    pub spurious: u64,
    /// Interrupts with no registered handler
    pub unhandled: u64,
}

/// Snapshot the delivery counters.
#[must_use]
pub fn stats() -> IrqStats {
    IrqStats {
        total: TOTAL.load(Ordering::Relaxed),
        spurious: SPURIOUS.load(Ordering::Relaxed),
        unhandled: UNHANDLED.load(Ordering::Relaxed),
    }
}

/// Register a handler for an INTID.
///
/// Returns `false` for out-of-range INTIDs. Replacing an existing handler
/// is permitted but logged.
pub fn register(intid: u32, handler: IrqHandler) -> bool {
    let Some(replaced) = HANDLERS.lock().get_mut(intid as usize).map(|slot| {
        let replaced = slot.is_some();
        *slot = Some(handler);
        replaced
    }) else {
        log::warn!("irq: cannot register INTID {intid}, out of range");
        return false;
    };
    if replaced {
        log::warn!("irq: replacing handler for INTID {intid}");
    }
    true
}

/// Dispatch an acknowledged interrupt to its handler.
///
/// Interrupts stay masked throughout; in particular nothing here may
/// re-enable them before the caller's end-of-interrupt.
pub fn dispatch(intid: u32) {
    TOTAL.fetch_add(1, Ordering::Relaxed);

    if intid == gic::SPURIOUS_IRQ {
        SPURIOUS.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let handler = HANDLERS
        .lock()
        .get(intid as usize)
        .and_then(|slot| *slot);

    match handler {
        Some(handler) => handler(intid),
        None => {
            UNHANDLED.fetch_add(1, Ordering::Relaxed);
            log::warn!("irq: no handler for INTID {intid}");
        }
    }
}

/// Top-level IRQ exception handler: acknowledge, dispatch, end-of-interrupt.
///
/// The EOI is issued for every non-spurious acknowledge, including the
/// unhandled case, so a stuck line cannot wedge delivery.
fn handle_irq_exception(_ctx: &mut ExceptionContext) {
    let intid = gic::acknowledge();
    dispatch(intid);
    if intid != gic::SPURIOUS_IRQ {
        gic::end_of_interrupt(intid);
    }
}

/// Install the IRQ/FIQ exception handlers.
///
/// Called during boot before the vector table is installed.
pub fn install() {
    exceptions::set_irq_handler(handle_irq_exception);
    exceptions::set_fiq_handler(handle_irq_exception);
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;

    static FIRED: AtomicU32 = AtomicU32::new(0);

    fn test_handler(intid: u32) {
        FIRED.fetch_add(intid, Ordering::Relaxed);
    }

    #[test]
    fn registration_bounds() {
        assert!(register(100, test_handler));
        assert!(!register(MAX_HANDLERS as u32, test_handler));
        assert!(!register(4000, test_handler));
    }

    // Counters are process-global, so the dispatch flows share one test.
    #[test]
    fn dispatch_flows() {
        let before = stats();

        // Registered handler runs
        assert!(register(42, test_handler));
        let fired = FIRED.load(Ordering::Relaxed);
        dispatch(42);
        assert_eq!(FIRED.load(Ordering::Relaxed), fired + 42);

        // Spurious short-circuits without touching handlers
        dispatch(gic::SPURIOUS_IRQ);

        // Unregistered INTID counts as unhandled
        dispatch(999);

        let after = stats();
        assert_eq!(after.total, before.total + 3);
        assert_eq!(after.spurious, before.spurious + 1);
        assert_eq!(after.unhandled, before.unhandled + 1);
    }

    #[test]
    fn replacement_is_permitted() {
        assert!(register(77, test_handler));
        assert!(register(77, test_handler));
    }
}
