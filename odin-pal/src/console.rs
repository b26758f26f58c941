//! Console
//!
//! Polled text output over the PL011, available from the first boot phase.
//!
//! The console comes up twice: once at the compiled-in fallback base so
//! diagnostics work while the device tree is still being parsed, and again
//! at the discovered base afterwards. A re-target to an address the MMIO
//! policy rejects is refused and the previous console stays active.

use core::fmt::{self, Write};

use spin::mutex::SpinMutex;

use crate::uart::Pl011;

struct Console {
    uart: Option<Pl011>,
}

impl Console {
    const fn new() -> Self {
        Self { uart: None }
    }

    fn retarget(&mut self, base: u64) -> bool {
        match Pl011::new(base) {
            Ok(uart) => {
                uart.init();
                self.uart = Some(uart);
                true
            }
            Err(_) => false,
        }
    }

    fn putc(&self, byte: u8) {
        if let Some(uart) = &self.uart {
            uart.putc(byte);
        }
    }

    fn puts(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.putc(b'\r');
            }
            self.putc(byte);
        }
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

/// Global console instance.
static CONSOLE: SpinMutex<Console> = SpinMutex::new(Console::new());

/// Bring the console up at the given PL011 base.
///
/// Runs the full UART init protocol. Returns `false` (leaving any previous
/// console active) if the base address fails the MMIO policy check.
pub fn init_with_base(base: u64) -> bool {
    let mut console = CONSOLE.lock();
    let ok = console.retarget(base);
    drop(console);
    if !ok {
        log::warn!("console: base {base:#x} rejected, keeping previous console");
    }
    ok
}

/// Re-target the console after device discovery.
///
/// Identical to a first-time init at the new base; the UART is fully
/// reprogrammed.
pub fn reinit(base: u64) -> bool {
    init_with_base(base)
}

/// Print a string to the console.
///
/// IRQs are masked while the lock is held: handlers log, and on a single
/// core an IRQ taken mid-print would deadlock against its own spinlock.
pub fn puts(s: &str) {
    let daif = odin_arch::cpu::disable_interrupts();
    {
        let console = CONSOLE.lock();
        console.puts(s);
    }
    odin_arch::cpu::restore_interrupts(daif);
}

/// Print a single byte to the console.
pub fn putc(byte: u8) {
    let daif = odin_arch::cpu::disable_interrupts();
    {
        let console = CONSOLE.lock();
        console.putc(byte);
    }
    odin_arch::cpu::restore_interrupts(daif);
}

/// Console writer for `fmt::Write`.
pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        puts(s);
        Ok(())
    }
}

/// Print formatted output to the console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::console::ConsoleWriter, $($arg)*);
    }};
}

/// Print formatted output with newline to the console.
#[macro_export]
macro_rules! println {
    () => {
        $crate::console::puts("\n")
    };
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::console::ConsoleWriter, $($arg)*);
        $crate::console::puts("\n");
    }};
}
