//! Boot Phase Sequencing
//!
//! The boot path is strictly ordered; every phase runs even when an
//! earlier discovery step failed, degrading to compiled-in defaults:
//!
//! 1. Console at the fallback UART base, logging, timestamps
//! 2. FDT parse and device discovery; console re-targeted to the
//!    discovered UART
//! 3. Platform config published
//! 4. Exception vectors installed
//! 5. Identity map built, MMU enabled
//! 6. GIC initialised (when discovered)
//! 7. UART RX interrupt wired up (when both GIC and IRQ are known)
//! 8. Shell

use odin_arch::{cpu, exceptions};
use odin_fdt::{Fdt, find_gic, find_uart};
use odin_pal::platform::{self, FALLBACK_UART_BASE, GicConfig, PlatformConfig};
use odin_pal::{console, gic, timer};

use crate::{input, irq, logging, memory, shell};

/// High-level kernel entry, called from the `_start` trampoline with the
/// firmware-provided FDT physical address.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(fdt_addr: u64) -> ! {
    // Phase 1: diagnostics before anything can fail
    console::init_with_base(FALLBACK_UART_BASE);
    logging::init();
    timer::init();
    log::info!("OdinOS {} booting at EL{}", env!("CARGO_PKG_VERSION"), cpu::current_el());

    // Phases 2-3: discover devices, publish the platform config
    let config = discover_platform(fdt_addr);
    let config = *platform::init(config);

    // Phase 4: exception vectors
    irq::install();
    exceptions::install();
    log::info!(
        "vectors: installed at {:#x}",
        exceptions::vector_table_address()
    );

    // Phase 5: identity map and MMU
    if let Err(err) = memory::init(&config) {
        log::error!("mmu: setup failed ({err:?}), continuing with MMU off");
    }

    // Phase 6: interrupt controller
    if let Some(windows) = config.gic
        && let Err(violation) = gic::init(windows.distributor_base, windows.cpu_interface_base)
    {
        log::warn!("gic: init rejected ({violation:?})");
    }

    // Phase 7: interrupt-driven console input
    if gic::is_initialised() {
        match config.uart_irq {
            Some(intid) => {
                if input::init(config.uart_base, intid) {
                    cpu::enable_interrupts();
                }
            }
            None => log::warn!("no UART IRQ discovered: console input unavailable"),
        }
    } else {
        log::warn!("no GIC: UART interrupts unavailable");
    }

    // Phase 8: hand the CPU to the shell
    shell::run()
}

/// Parse the FDT and assemble the platform config, falling back field by
/// field when discovery fails.
fn discover_platform(fdt_addr: u64) -> PlatformConfig {
    let mut config = PlatformConfig::fallback();

    // SAFETY: The firmware boot contract puts the FDT physical address in
    // x0 and the blob in readable RAM; a missing blob arrives as 0, which
    // the parser rejects before any wide read.
    let fdt = match unsafe { Fdt::from_ptr(fdt_addr as usize) } {
        Ok(fdt) => fdt,
        Err(err) => {
            log::warn!("fdt: invalid blob at {fdt_addr:#x} ({err:?}), using fallback config");
            return config;
        }
    };
    log::info!(
        "fdt: {} bytes at {fdt_addr:#x}, version {}",
        fdt.totalsize(),
        fdt.header().version
    );

    match find_uart(&fdt) {
        Some(uart) => {
            log::info!(
                "fdt: uart at {:#x}, irq {:?}",
                uart.base_address,
                uart.irq
            );
            // Re-initialise the console at the discovered base. If the MMIO
            // policy rejects the address, the fallback console stays live
            // and the fallback base stays in the config.
            if console::reinit(uart.base_address) {
                config.uart_base = uart.base_address;
                config.uart_irq = uart.irq;
            }
        }
        None => log::warn!("fdt: no UART node, keeping fallback {FALLBACK_UART_BASE:#x}"),
    }

    match find_gic(&fdt) {
        Some(found) => {
            log::info!(
                "fdt: gicv2 at GICD {:#x} / GICC {:#x}",
                found.distributor_base,
                found.cpu_interface_base
            );
            config.gic = Some(GicConfig {
                distributor_base: found.distributor_base,
                cpu_interface_base: found.cpu_interface_base,
            });
        }
        None => log::warn!("fdt: no GIC node"),
    }

    config
}
