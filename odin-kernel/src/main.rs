//! OdinOS Kernel Binary
//!
//! The `_start` trampoline and the panic handler; everything else lives in
//! the `odin_kernel` library crate.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod bare {
    use core::panic::PanicInfo;

    use odin_kernel as _;

    /// Kernel entry from firmware.
    ///
    /// The firmware jumps here with the FDT physical address in `x0` and
    /// interrupts masked. Neither the stack nor BSS is valid yet: set the
    /// stack to the linker-provided `__stack_top`, zero
    /// `[__bss_start, __bss_end)` in 8-byte strides (the linker keeps both
    /// 8-byte aligned), and call `kernel_main` with the preserved FDT
    /// pointer.
    #[cfg(target_arch = "aarch64")]
    #[unsafe(naked)]
    #[unsafe(no_mangle)]
    #[unsafe(link_section = ".text.boot")]
    unsafe extern "C" fn _start() -> ! {
        core::arch::naked_asm!(
            "mov x19, x0",
            "ldr x1, =__stack_top",
            "mov sp, x1",
            "ldr x1, =__bss_start",
            "ldr x2, =__bss_end",
            "1:",
            "cmp x1, x2",
            "b.hs 2f",
            "str xzr, [x1], #8",
            "b 1b",
            "2:",
            "mov x0, x19",
            "bl kernel_main",
            // kernel_main never returns; park if it somehow does
            "3:",
            "wfe",
            "b 3b",
        )
    }

    /// Last-resort panic reporting.
    ///
    /// Writes directly to the UART, bypassing the console lock: the
    /// panicking context may already hold it.
    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        let _ = odin_arch::cpu::disable_interrupts();

        let base = odin_pal::platform::get()
            .map(|config| config.uart_base)
            .unwrap_or(odin_pal::platform::FALLBACK_UART_BASE);
        if let Ok(uart) = odin_pal::Pl011::new(base) {
            let mut out = PanicWriter { uart };
            use core::fmt::Write;
            let _ = write!(out, "\n*** kernel panic ***\n{info}\n");
        }
        odin_arch::halt()
    }

    struct PanicWriter {
        uart: odin_pal::Pl011,
    }

    impl core::fmt::Write for PanicWriter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            for byte in s.bytes() {
                if byte == b'\n' {
                    self.uart.putc(b'\r');
                }
                self.uart.putc(byte);
            }
            Ok(())
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
