//! System Register Access and Syndrome Decoding
//!
//! VBAR access plus the ESR/SPSR field decoding used by the fault banner.

use aarch64_cpu::registers::VBAR_EL1;
use tock_registers::interfaces::{Readable, Writeable};

/// Read VBAR_EL1 (Vector Base Address Register).
#[must_use]
#[inline]
pub fn read_vbar_el1() -> u64 {
    VBAR_EL1.get()
}

/// Write VBAR_EL1 (Vector Base Address Register).
///
/// The caller must point this at a 2KiB-aligned vector table.
#[inline]
pub fn write_vbar_el1(value: u64) {
    VBAR_EL1.set(value);
}

/// Exception Syndrome Register (ESR) parsing
pub mod esr {
    /// Exception class (EC) field extraction
    #[inline]
    #[must_use]
    pub const fn exception_class(esr: u64) -> u8 {
        ((esr >> 26) & 0x3F) as u8
    }

    /// Instruction Specific Syndrome (ISS) field
    #[inline]
    #[must_use]
    pub const fn iss(esr: u64) -> u32 {
        (esr & 0x1FF_FFFF) as u32
    }

    /// Get a human-readable name for an exception class
    #[must_use]
    pub fn ec_name(ec: u8) -> &'static str {
        match ec {
            ec::UNKNOWN => "Unknown",
            ec::WFI_WFE => "WFI/WFE trapped",
            ec::SVE_SIMD_FP => "SVE/SIMD/FP access",
            ec::ILLEGAL_EXECUTION => "Illegal execution state",
            ec::SVC_AARCH64 => "SVC (AArch64)",
            ec::SYS_INSTRUCTION => "MSR/MRS/SYS trapped",
            ec::INSTRUCTION_ABORT_LOWER => "Instruction abort (lower EL)",
            ec::INSTRUCTION_ABORT_SAME => "Instruction abort (same EL)",
            ec::PC_ALIGNMENT => "PC alignment fault",
            ec::DATA_ABORT_LOWER => "Data abort (lower EL)",
            ec::DATA_ABORT_SAME => "Data abort (same EL)",
            ec::SP_ALIGNMENT => "SP alignment fault",
            ec::SERROR => "SError",
            ec::BRK_AARCH64 => "BRK (AArch64)",
            _ => "Reserved/Unknown",
        }
    }

    /// Exception class values
    pub mod ec {
        pub const UNKNOWN: u8 = 0b000000;
        pub const WFI_WFE: u8 = 0b000001;
        pub const SVE_SIMD_FP: u8 = 0b000111;
        pub const ILLEGAL_EXECUTION: u8 = 0b001110;
        pub const SVC_AARCH64: u8 = 0b010101;
        pub const SYS_INSTRUCTION: u8 = 0b011000;
        pub const INSTRUCTION_ABORT_LOWER: u8 = 0b100000;
        pub const INSTRUCTION_ABORT_SAME: u8 = 0b100001;
        pub const PC_ALIGNMENT: u8 = 0b100010;
        pub const DATA_ABORT_LOWER: u8 = 0b100100;
        pub const DATA_ABORT_SAME: u8 = 0b100101;
        pub const SP_ALIGNMENT: u8 = 0b100110;
        pub const SERROR: u8 = 0b101111;
        pub const BRK_AARCH64: u8 = 0b111100;
    }
}

/// Saved Program Status Register (SPSR) parsing
pub mod spsr {
    /// Exception level from M[3:2] bits
    #[inline]
    #[must_use]
    pub const fn exception_level(spsr: u64) -> u8 {
        ((spsr >> 2) & 0x3) as u8
    }

    /// Stack pointer selection from M[0] (true = SP_ELx)
    #[inline]
    #[must_use]
    pub const fn sp_sel(spsr: u64) -> bool {
        spsr & 1 != 0
    }

    /// Execution state from M[4] (true = AArch32)
    #[inline]
    #[must_use]
    pub const fn is_aarch32(spsr: u64) -> bool {
        (spsr >> 4) & 1 != 0
    }

    /// Get the exception-level name (e.g. "EL0t", "EL1h")
    #[must_use]
    pub fn el_name(spsr: u64) -> &'static str {
        if is_aarch32(spsr) {
            return "AArch32";
        }
        match (exception_level(spsr), sp_sel(spsr)) {
            (0, _) => "EL0t",
            (1, false) => "EL1t",
            (1, true) => "EL1h",
            (2, false) => "EL2t",
            (2, true) => "EL2h",
            (3, false) => "EL3t",
            (3, true) => "EL3h",
            _ => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn esr_class_extraction() {
        // Data abort, same EL, with some ISS bits
        let esr = (0b100101u64 << 26) | 0x45;
        assert_eq!(esr::exception_class(esr), esr::ec::DATA_ABORT_SAME);
        assert_eq!(esr::iss(esr), 0x45);
        assert_eq!(esr::ec_name(esr::ec::DATA_ABORT_SAME), "Data abort (same EL)");
    }

    #[test]
    fn spsr_el_names() {
        assert_eq!(spsr::el_name(0b0101), "EL1h"); // EL1, SP_ELx
        assert_eq!(spsr::el_name(0b0100), "EL1t"); // EL1, SP_EL0
        assert_eq!(spsr::el_name(0b0000), "EL0t");
        assert_eq!(spsr::el_name(0b1_0000), "AArch32");
    }
}
