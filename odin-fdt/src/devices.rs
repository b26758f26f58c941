//! Boot-Path Device Discovery
//!
//! Single-traversal searches for the two devices the kernel needs before it
//! can take interrupts: the PL011 UART and the GICv2. Matching follows the
//! QEMU `virt` conventions; any parse error aborts the traversal and the
//! device is reported as not found.

use crate::FdtError;
use crate::blob::{Fdt, Token};

/// UART discovered from the device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartInfo {
    /// Physical base address of the register window
    pub base_address: u64,
    /// GIC INTID of the RX interrupt, if the node carried one
    pub irq: Option<u32>,
}

/// GICv2 discovered from the device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicInfo {
    /// Physical base address of the distributor (GICD)
    pub distributor_base: u64,
    /// Physical base address of the CPU interface (GICC)
    pub cpu_interface_base: u64,
}

/// Node-name substrings that identify a UART.
const UART_NAMES: &[&str] = &["uart", "serial", "pl011"];

/// Node-name substrings that identify an interrupt controller.
const GIC_NAMES: &[&str] = &["interrupt-controller", "gic@", "intc@"];

/// `compatible` strings accepted as a GICv2.
const GIC_COMPATIBLE: &[&str] = &[
    "arm,gic-400",
    "arm,cortex-a15-gic",
    "arm,cortex-a9-gic",
    "arm,gic-v2",
];

/// GIC interrupt-specifier type cell: shared peripheral interrupt.
const IRQ_TYPE_SPI: u32 = 0;
/// GIC interrupt-specifier type cell: private peripheral interrupt.
const IRQ_TYPE_PPI: u32 = 1;
/// First SPI INTID.
const SPI_BASE: u32 = 32;
/// First PPI INTID.
const PPI_BASE: u32 = 16;

/// Find the first UART node and extract its base address and RX INTID.
///
/// Returns `None` on any malformed-blob condition as well as when no node
/// matches.
#[must_use]
pub fn find_uart(fdt: &Fdt<'_>) -> Option<UartInfo> {
    find_uart_inner(fdt).ok().flatten()
}

fn find_uart_inner(fdt: &Fdt<'_>) -> Result<Option<UartInfo>, FdtError> {
    let mut walker = fdt.walker();
    let mut node_depth: Option<usize> = None;
    let mut base: Option<u64> = None;
    let mut irq: Option<u32> = None;

    loop {
        match walker.next_token()? {
            Token::BeginNode { name } => {
                if node_depth.is_none() && UART_NAMES.iter().any(|n| name.contains(n)) {
                    node_depth = Some(walker.depth());
                }
            }
            Token::EndNode => {
                if let Some(depth) = node_depth
                    && walker.depth() < depth
                {
                    // Left the matched node: report what it carried
                    return Ok(base.map(|base_address| UartInfo { base_address, irq }));
                }
            }
            Token::Prop { name_off, value } => {
                let Some(depth) = node_depth else { continue };
                // Ignore properties of nested children
                if walker.depth() != depth {
                    continue;
                }
                match walker.prop_name(name_off)? {
                    "reg" => base = parse_reg_base(value),
                    "interrupts" => irq = parse_interrupt_specifier(value),
                    _ => {}
                }
            }
            Token::End => return Ok(None),
        }
    }
}

/// Find the GICv2 node and extract the distributor and CPU-interface bases.
#[must_use]
pub fn find_gic(fdt: &Fdt<'_>) -> Option<GicInfo> {
    find_gic_inner(fdt).ok().flatten()
}

fn find_gic_inner(fdt: &Fdt<'_>) -> Result<Option<GicInfo>, FdtError> {
    let mut walker = fdt.walker();
    let mut node_depth: Option<usize> = None;
    let mut info: Option<GicInfo> = None;
    let mut compatible_ok: Option<bool> = None;

    loop {
        match walker.next_token()? {
            Token::BeginNode { name } => {
                if node_depth.is_none() && GIC_NAMES.iter().any(|n| name.contains(n)) {
                    node_depth = Some(walker.depth());
                    info = None;
                    compatible_ok = None;
                }
            }
            Token::EndNode => {
                if let Some(depth) = node_depth
                    && walker.depth() < depth
                {
                    // A compatible list that names a different controller
                    // disqualifies the node; absence of one does not.
                    if compatible_ok != Some(false)
                        && let Some(found) = info
                    {
                        return Ok(Some(found));
                    }
                    node_depth = None;
                    info = None;
                    compatible_ok = None;
                }
            }
            Token::Prop { name_off, value } => {
                let Some(depth) = node_depth else { continue };
                if walker.depth() != depth {
                    continue;
                }
                match walker.prop_name(name_off)? {
                    "reg" => info = parse_gic_reg(value),
                    "compatible" => {
                        compatible_ok = Some(compatible_matches(value, GIC_COMPATIBLE));
                    }
                    _ => {}
                }
            }
            Token::End => return Ok(None),
        }
    }
}

/// Big-endian u32 at `offset` within a property value.
fn cell(value: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(4)?;
    let bytes = value.get(start..start + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Extract the base address from a `reg` property.
///
/// Two-cell (64-bit) addresses are read as `hi:lo`; a lone cell is taken
/// as a 32-bit address.
fn parse_reg_base(value: &[u8]) -> Option<u64> {
    if value.len() >= 8 {
        let hi = cell(value, 0)? as u64;
        let lo = cell(value, 1)? as u64;
        Some(hi << 32 | lo)
    } else {
        Some(cell(value, 0)? as u64)
    }
}

/// Extract the GIC INTID from a `<type irq flags>` interrupt specifier.
///
/// The encoded number is relative to the interrupt kind: SPIs start at
/// INTID 32, PPIs at INTID 16 (Linux GIC binding). QEMU's `pl011`
/// `<0 1 4>` therefore yields INTID 33.
fn parse_interrupt_specifier(value: &[u8]) -> Option<u32> {
    let kind = cell(value, 0)?;
    let number = cell(value, 1)?;
    match kind {
        IRQ_TYPE_SPI => Some(number + SPI_BASE),
        IRQ_TYPE_PPI => Some(number + PPI_BASE),
        _ => None,
    }
}

/// Extract GICD and GICC bases from a GIC `reg` property.
///
/// Accepts `<gicd gicd_sz gicc gicc_sz>` with either one-cell (32-bit,
/// 16 bytes) or two-cell (64-bit, 32 bytes) addresses and sizes.
fn parse_gic_reg(value: &[u8]) -> Option<GicInfo> {
    if value.len() >= 32 {
        let gicd_hi = cell(value, 0)? as u64;
        let gicd_lo = cell(value, 1)? as u64;
        let gicc_hi = cell(value, 4)? as u64;
        let gicc_lo = cell(value, 5)? as u64;
        Some(GicInfo {
            distributor_base: gicd_hi << 32 | gicd_lo,
            cpu_interface_base: gicc_hi << 32 | gicc_lo,
        })
    } else if value.len() >= 16 {
        Some(GicInfo {
            distributor_base: cell(value, 0)? as u64,
            cpu_interface_base: cell(value, 2)? as u64,
        })
    } else {
        None
    }
}

/// Check a NUL-separated `compatible` list for any accepted entry.
///
/// The scan is capped at the string ceiling regardless of property size.
fn compatible_matches(value: &[u8], accepted: &[&str]) -> bool {
    let capped = &value[..value.len().min(crate::blob::MAX_STRING_LEN)];
    capped
        .split(|&b| b == 0)
        .filter_map(|entry| core::str::from_utf8(entry).ok())
        .any(|entry| accepted.contains(&entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_PROP};
    use crate::testutil::{Blob, assemble};

    // Strings block shared by the test blobs
    const STRINGS: &[u8] = b"reg\0interrupts\0compatible\0";
    const OFF_REG: u32 = 0;
    const OFF_INTERRUPTS: u32 = 4;
    const OFF_COMPATIBLE: u32 = 15;

    fn push_prop<const N: usize>(blob: &mut Blob<N>, name_off: u32, value: &[u8]) {
        blob.push_u32(FDT_PROP);
        blob.push_u32(value.len() as u32);
        blob.push_u32(name_off);
        blob.push_bytes(value);
        blob.align4();
    }

    fn cells(values: &[u32]) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, v) in values.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
        out
    }

    /// A structure block shaped like QEMU virt's: root, a GIC node with
    /// two-cell addresses, and a pl011 node.
    fn qemu_like_blob() -> Blob<1024> {
        let mut s: Blob<768> = Blob::new();
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("");

        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("intc@8000000");
        push_prop(&mut s, OFF_COMPATIBLE, b"arm,cortex-a15-gic\0");
        push_prop(
            &mut s,
            OFF_REG,
            &cells(&[0, 0x0800_0000, 0, 0x1_0000, 0, 0x0801_0000, 0, 0x1_0000]),
        );
        s.push_u32(FDT_END_NODE);

        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("pl011@9000000");
        push_prop(&mut s, OFF_REG, &cells(&[0, 0x0900_0000, 0, 0x1000])[..16]);
        push_prop(&mut s, OFF_INTERRUPTS, &cells(&[0, 1, 4])[..12]);
        s.push_u32(FDT_END_NODE);

        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END);
        assemble(s.as_slice(), STRINGS)
    }

    #[test]
    fn finds_the_qemu_uart() {
        let blob = qemu_like_blob();
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        let uart = find_uart(&fdt).unwrap();
        assert_eq!(uart.base_address, 0x0900_0000);
        // SPI 1 -> INTID 33
        assert_eq!(uart.irq, Some(33));
    }

    #[test]
    fn finds_the_qemu_gic() {
        let blob = qemu_like_blob();
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        let gic = find_gic(&fdt).unwrap();
        assert_eq!(gic.distributor_base, 0x0800_0000);
        assert_eq!(gic.cpu_interface_base, 0x0801_0000);
    }

    #[test]
    fn uart_with_single_cell_reg() {
        let mut s: Blob<256> = Blob::new();
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("");
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("serial@3f201000");
        push_prop(&mut s, OFF_REG, &0x3F20_1000u32.to_be_bytes());
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END);

        let blob: Blob<512> = assemble(s.as_slice(), STRINGS);
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        let uart = find_uart(&fdt).unwrap();
        assert_eq!(uart.base_address, 0x3F20_1000);
        assert_eq!(uart.irq, None);
    }

    #[test]
    fn ppi_interrupts_get_the_ppi_offset() {
        assert_eq!(parse_interrupt_specifier(&cells(&[1, 14, 4])[..12]), Some(30));
        // Unknown specifier kinds are rejected
        assert_eq!(parse_interrupt_specifier(&cells(&[2, 7, 4])[..12]), None);
    }

    #[test]
    fn gic_with_32bit_reg_cells() {
        let mut s: Blob<256> = Blob::new();
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("");
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("interrupt-controller@2c001000");
        push_prop(
            &mut s,
            OFF_REG,
            &cells(&[0x2C00_1000, 0x1000, 0x2C00_2000, 0x2000])[..16],
        );
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END);

        let blob: Blob<512> = assemble(s.as_slice(), STRINGS);
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        let gic = find_gic(&fdt).unwrap();
        assert_eq!(gic.distributor_base, 0x2C00_1000);
        assert_eq!(gic.cpu_interface_base, 0x2C00_2000);
    }

    #[test]
    fn incompatible_controller_is_skipped() {
        let mut s: Blob<512> = Blob::new();
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("");
        // A GICv3: matched by name, disqualified by compatible
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("intc@8000000");
        push_prop(&mut s, OFF_COMPATIBLE, b"arm,gic-v3\0");
        push_prop(
            &mut s,
            OFF_REG,
            &cells(&[0x0800_0000, 0x1_0000, 0x080A_0000, 0x1_0000])[..16],
        );
        s.push_u32(FDT_END_NODE);
        // A proper GICv2 later in the tree
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("gic@2c001000");
        push_prop(&mut s, OFF_COMPATIBLE, b"arm,gic-400\0");
        push_prop(
            &mut s,
            OFF_REG,
            &cells(&[0x2C00_1000, 0x1000, 0x2C00_2000, 0x2000])[..16],
        );
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END);

        let blob: Blob<1024> = assemble(s.as_slice(), STRINGS);
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        let gic = find_gic(&fdt).unwrap();
        assert_eq!(gic.distributor_base, 0x2C00_1000);
    }

    #[test]
    fn no_matching_node_reports_not_found() {
        let mut s: Blob<128> = Blob::new();
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("");
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("memory@40000000");
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END_NODE);
        s.push_u32(FDT_END);

        let blob: Blob<256> = assemble(s.as_slice(), STRINGS);
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        assert_eq!(find_uart(&fdt), None);
        assert_eq!(find_gic(&fdt), None);
    }

    #[test]
    fn malformed_blob_reports_not_found() {
        let mut s: Blob<128> = Blob::new();
        s.push_u32(FDT_BEGIN_NODE);
        s.push_cstr("");
        s.push_u32(0xBAAD_F00D);

        let blob: Blob<256> = assemble(s.as_slice(), STRINGS);
        let fdt = Fdt::new(blob.as_slice()).unwrap();
        assert_eq!(find_uart(&fdt), None);
        assert_eq!(find_gic(&fdt), None);
    }
}
