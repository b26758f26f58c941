//! MMU Bring-Up
//!
//! Identity-mapped virtual memory for the boot CPU: 48-bit VA, 4KiB
//! granule, 4-level walk with 2MiB block descriptors at L2.
//!
//! All translation tables are statically allocated and owned by the global
//! [`Mmu`] instance: one L0, one L1, and a small pool of L2 tables
//! (identity-mapping both the device windows below 1GiB and the kernel
//! image above it needs 2MiB blocks under more than one L1 slot). Tables
//! are populated lazily during [`Mmu::map_range`] and are frozen once
//! [`Mmu::enable`] has run.

use aarch64_cpu::registers::{MAIR_EL1, SCTLR_EL1, TCR_EL1, TTBR0_EL1};
use spin::Mutex;
use tock_registers::interfaces::{Readable, Writeable};

use crate::cpu::{dsb_sy, invalidate_icache, invalidate_tlb, isb};

/// Number of entries per translation table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// L2 block size (2MiB).
pub const BLOCK_SIZE: u64 = 1 << 21;

/// Number of statically allocated L2 tables.
const L2_POOL_SIZE: usize = 4;

/// Output-address field of a table descriptor, bits [47:12].
pub const TABLE_ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

/// Output-address field of an L2 block descriptor, bits [47:21].
pub const BLOCK_ADDR_MASK: u64 = 0x0000_FFFF_FFE0_0000;

/// Translation table descriptor bits.
pub mod flags {
    /// Entry is valid
    pub const VALID: u64 = 1 << 0;
    /// Table descriptor (L0-L2); block descriptors leave this clear
    pub const TABLE: u64 = 1 << 1;
    /// MAIR attribute index shift (bits 4:2)
    pub const ATTR_INDEX_SHIFT: u64 = 2;
    /// Normal write-back cacheable memory (MAIR index 0)
    pub const ATTR_NORMAL: u64 = 0 << ATTR_INDEX_SHIFT;
    /// Device-nGnRnE memory (MAIR index 1)
    pub const ATTR_DEVICE: u64 = 1 << ATTR_INDEX_SHIFT;
    /// Access Permission: read-only at EL1
    pub const AP_RO: u64 = 1 << 7;
    /// Shareability: Inner Shareable
    pub const SH_INNER: u64 = 3 << 8;
    /// Access flag; accesses fault if clear
    pub const AF: u64 = 1 << 10;
    /// Privileged Execute Never
    pub const PXN: u64 = 1 << 53;
    /// Unprivileged Execute Never
    pub const UXN: u64 = 1 << 54;

    /// Table descriptor pointing at the next level
    pub const TABLE_DESC: u64 = VALID | TABLE;
}

/// Memory type for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// Normal write-back cacheable RAM
    Normal,
    /// Device registers (nGnRnE), never executable
    Device,
}

/// Why a mapping request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// `virt + size` wraps the address space
    Overflow,
    /// An entry already maps this range differently
    AlreadyMapped,
    /// The static L2 pool is exhausted
    OutOfTables,
    /// The MMU is live; tables are frozen
    TablesFrozen,
}

/// A single translation table (512 entries, 4KiB aligned).
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [u64; ENTRIES_PER_TABLE],
}

impl PageTable {
    /// Create an empty table.
    pub const fn empty() -> Self {
        Self {
            entries: [0; ENTRIES_PER_TABLE],
        }
    }

    /// Get an entry by index.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> u64 {
        self.entries[index]
    }

    /// Set an entry by index.
    #[inline]
    pub fn set(&mut self, index: usize, value: u64) {
        self.entries[index] = value;
    }

    /// Check if an entry is valid.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, index: usize) -> bool {
        self.entries[index] & flags::VALID != 0
    }

    /// Check if an entry is a table descriptor.
    #[inline]
    #[must_use]
    pub fn is_table(&self, index: usize) -> bool {
        let entry = self.entries[index];
        (entry & flags::VALID != 0) && (entry & flags::TABLE != 0)
    }

    /// Physical address of this table (identity map: VA == PA).
    fn base_address(&self) -> u64 {
        core::ptr::from_ref(self) as u64
    }
}

/// Translation-table indices extracted from a virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtAddrParts {
    /// Level 0 index, VA bits [47:39]
    pub l0: usize,
    /// Level 1 index, VA bits [38:30]
    pub l1: usize,
    /// Level 2 index, VA bits [29:21]
    pub l2: usize,
    /// Offset within the 2MiB block, VA bits [20:0]
    pub offset: usize,
}

impl VirtAddrParts {
    /// Extract table indices from a virtual address.
    #[inline]
    #[must_use]
    pub const fn from_vaddr(vaddr: u64) -> Self {
        Self {
            l0: ((vaddr >> 39) & 0x1FF) as usize,
            l1: ((vaddr >> 30) & 0x1FF) as usize,
            l2: ((vaddr >> 21) & 0x1FF) as usize,
            offset: (vaddr & 0x1F_FFFF) as usize,
        }
    }
}

/// Build an L2 block descriptor.
#[must_use]
pub fn block_descriptor(phys: u64, mem: MemoryType, executable: bool) -> u64 {
    let mut desc = (phys & BLOCK_ADDR_MASK) | flags::VALID | flags::AF;
    match mem {
        MemoryType::Normal => {
            desc |= flags::ATTR_NORMAL | flags::SH_INNER;
            if !executable {
                desc |= flags::PXN | flags::UXN;
            }
        }
        MemoryType::Device => {
            // Device memory is never executable
            desc |= flags::ATTR_DEVICE | flags::PXN | flags::UXN;
        }
    }
    desc
}

/// The MMU controller and its statically allocated tables.
pub struct Mmu {
    l0: PageTable,
    l1: PageTable,
    l2_pool: [PageTable; L2_POOL_SIZE],
    l2_used: usize,
    enabled: bool,
}

impl Mmu {
    /// Create a controller with empty tables.
    pub const fn new() -> Self {
        Self {
            l0: PageTable::empty(),
            l1: PageTable::empty(),
            l2_pool: [const { PageTable::empty() }; L2_POOL_SIZE],
            l2_used: 0,
            enabled: false,
        }
    }

    /// Check whether `enable` has run.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Identity-map `[virt, virt + size)` to `[phys, ...)` with 2MiB blocks.
    ///
    /// Operands are aligned down to 2MiB and the end is aligned up, so a
    /// 4KiB device window maps the whole surrounding block. Re-mapping an
    /// identical range is a no-op; mapping a conflicting range fails.
    pub fn map_range(
        &mut self,
        virt: u64,
        phys: u64,
        size: u64,
        mem: MemoryType,
        executable: bool,
    ) -> Result<(), MapError> {
        if self.enabled {
            return Err(MapError::TablesFrozen);
        }
        let end = virt
            .checked_add(size)
            .and_then(|e| e.checked_add(BLOCK_SIZE - 1))
            .ok_or(MapError::Overflow)?
            & !(BLOCK_SIZE - 1);
        let mut va = virt & !(BLOCK_SIZE - 1);
        let mut pa = phys & !(BLOCK_SIZE - 1);

        while va < end {
            let parts = VirtAddrParts::from_vaddr(va);
            self.ensure_l1(parts.l0)?;
            let l2_slot = self.ensure_l2(parts.l1)?;

            let desc = block_descriptor(pa, mem, executable);
            let current = self.l2_pool[l2_slot].get(parts.l2);
            if current != 0 && current != desc {
                return Err(MapError::AlreadyMapped);
            }
            self.l2_pool[l2_slot].set(parts.l2, desc);

            va += BLOCK_SIZE;
            pa += BLOCK_SIZE;
        }
        Ok(())
    }

    /// Make sure the L0 entry for this index points at the L1 table.
    fn ensure_l1(&mut self, l0_index: usize) -> Result<(), MapError> {
        if !self.l0.is_valid(l0_index) {
            let desc = (self.l1.base_address() & TABLE_ADDR_MASK) | flags::TABLE_DESC;
            self.l0.set(l0_index, desc);
            return Ok(());
        }
        if !self.l0.is_table(l0_index) {
            return Err(MapError::AlreadyMapped);
        }
        Ok(())
    }

    /// Make sure the L1 entry points at an L2 table; return its pool slot.
    fn ensure_l2(&mut self, l1_index: usize) -> Result<usize, MapError> {
        let entry = self.l1.get(l1_index);
        if entry == 0 {
            if self.l2_used == L2_POOL_SIZE {
                return Err(MapError::OutOfTables);
            }
            let slot = self.l2_used;
            self.l2_used += 1;
            let desc = (self.l2_pool[slot].base_address() & TABLE_ADDR_MASK) | flags::TABLE_DESC;
            self.l1.set(l1_index, desc);
            return Ok(slot);
        }
        if !self.l1.is_table(l1_index) {
            return Err(MapError::AlreadyMapped);
        }
        let pa = entry & TABLE_ADDR_MASK;
        self.l2_pool[..self.l2_used]
            .iter()
            .position(|t| t.base_address() == pa)
            .ok_or(MapError::AlreadyMapped)
    }

    /// Program the translation registers and turn the MMU on.
    ///
    /// Sequence: MAIR/TCR/TTBR0, I-cache and TLB invalidate, then a
    /// read-modify-write of SCTLR_EL1 setting M, C and I, each step fenced
    /// with DSB SY + ISB. After this returns, the tables are frozen.
    pub fn enable(&mut self) {
        // Attr0 = 0xFF (Normal WB R/W-allocate), Attr1 = 0x00 (Device-nGnRnE)
        MAIR_EL1.set(0x0000_0000_0000_00FF);

        // T0SZ=16 (48-bit VA), 4KiB granule (TG0=0), inner-shareable,
        // write-back cacheable walks, IPS=0 (32-bit PA), EPD1 set: no
        // TTBR1 walks are ever made.
        const T0SZ: u64 = 16;
        const SH0_INNER: u64 = 0b11 << 12;
        const ORGN0_WBRWA: u64 = 0b01 << 10;
        const IRGN0_WBRWA: u64 = 0b01 << 8;
        const EPD1: u64 = 1 << 23;
        TCR_EL1.set(T0SZ | IRGN0_WBRWA | ORGN0_WBRWA | SH0_INNER | EPD1);

        TTBR0_EL1.set(self.l0.base_address() & TABLE_ADDR_MASK);
        isb();

        invalidate_icache();
        invalidate_tlb();
        dsb_sy();
        isb();

        let sctlr = SCTLR_EL1.get();
        SCTLR_EL1.set(sctlr | (1 << 0) | (1 << 2) | (1 << 12)); // M, C, I
        dsb_sy();
        isb();

        self.enabled = true;
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

/// Global MMU instance.
static MMU: Mutex<Mmu> = Mutex::new(Mmu::new());

/// Get access to the global MMU.
pub fn mmu() -> spin::MutexGuard<'static, Mmu> {
    MMU.lock()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vaddr_index_extraction() {
        let parts = VirtAddrParts::from_vaddr(0x4000_0000);
        assert_eq!(parts.l0, 0);
        assert_eq!(parts.l1, 1);
        assert_eq!(parts.l2, 0);
        assert_eq!(parts.offset, 0);

        let parts = VirtAddrParts::from_vaddr(0x0900_1234);
        assert_eq!(parts.l0, 0);
        assert_eq!(parts.l1, 0);
        assert_eq!(parts.l2, 0x0900_0000 >> 21);
        assert_eq!(parts.offset, 0x1234);

        // Top of the 48-bit space
        let parts = VirtAddrParts::from_vaddr(0xFFFF_FFFF_FFFF);
        assert_eq!(parts.l0, 511);
        assert_eq!(parts.l1, 511);
        assert_eq!(parts.l2, 511);
    }

    #[test]
    fn normal_executable_descriptor_bits() {
        let desc = block_descriptor(0x4000_0000, MemoryType::Normal, true);
        assert_eq!(desc & flags::VALID, flags::VALID);
        assert_eq!(desc & flags::TABLE, 0, "block descriptors have bit 1 clear");
        assert_eq!(desc & flags::AF, flags::AF);
        assert_eq!(desc & flags::SH_INNER, flags::SH_INNER);
        assert_eq!(desc & (0b111 << 2), flags::ATTR_NORMAL);
        assert_eq!(desc & flags::PXN, 0);
        assert_eq!(desc & flags::UXN, 0);
        assert_eq!(desc & BLOCK_ADDR_MASK, 0x4000_0000);
    }

    #[test]
    fn device_descriptor_is_never_executable() {
        let desc = block_descriptor(0x0900_0000, MemoryType::Device, true);
        assert_eq!(desc & (0b111 << 2), flags::ATTR_DEVICE);
        assert_ne!(desc & flags::PXN, 0);
        assert_ne!(desc & flags::UXN, 0);
        assert_eq!(desc & BLOCK_ADDR_MASK, 0x0900_0000 & BLOCK_ADDR_MASK);
    }

    #[test]
    fn map_range_populates_tables_lazily() {
        let mut mmu = Mmu::new();
        // 128 MiB kernel image: 64 blocks under L1 slot 1
        mmu.map_range(0x4000_0000, 0x4000_0000, 128 << 20, MemoryType::Normal, true)
            .unwrap();
        assert!(mmu.l0.is_table(0));
        assert!(mmu.l1.is_table(1));
        assert_eq!(mmu.l2_used, 1);
        let blocks = (0..ENTRIES_PER_TABLE)
            .filter(|&i| mmu.l2_pool[0].is_valid(i))
            .count();
        assert_eq!(blocks, 64);

        // Device window below 1 GiB: new L2 table under L1 slot 0
        mmu.map_range(0x0900_0000, 0x0900_0000, 0x1000, MemoryType::Device, false)
            .unwrap();
        assert!(mmu.l1.is_table(0));
        assert_eq!(mmu.l2_used, 2);
        let uart_l2 = 0x0900_0000 >> 21;
        assert!(mmu.l2_pool[1].is_valid(uart_l2));
    }

    #[test]
    fn sub_block_sizes_round_up_to_one_block() {
        let mut mmu = Mmu::new();
        mmu.map_range(0x0800_0000, 0x0800_0000, 0x2_0000, MemoryType::Device, false)
            .unwrap();
        // 64 KiB window fits in one 2 MiB block
        let valid = (0..ENTRIES_PER_TABLE)
            .filter(|&i| mmu.l2_pool[0].is_valid(i))
            .count();
        assert_eq!(valid, 1);
        assert!(mmu.l2_pool[0].is_valid(0x0800_0000 >> 21));
    }

    #[test]
    fn remapping_the_same_range_is_idempotent() {
        let mut mmu = Mmu::new();
        mmu.map_range(0x4000_0000, 0x4000_0000, 4 << 20, MemoryType::Normal, true)
            .unwrap();
        let before = mmu.l2_pool[0].get(0);
        mmu.map_range(0x4000_0000, 0x4000_0000, 4 << 20, MemoryType::Normal, true)
            .unwrap();
        assert_eq!(mmu.l2_pool[0].get(0), before);
        assert_eq!(mmu.l2_used, 1);
    }

    #[test]
    fn conflicting_remap_is_rejected() {
        let mut mmu = Mmu::new();
        mmu.map_range(0x4000_0000, 0x4000_0000, 2 << 20, MemoryType::Normal, true)
            .unwrap();
        // Same VA, different attributes
        let err = mmu
            .map_range(0x4000_0000, 0x4000_0000, 2 << 20, MemoryType::Device, false)
            .unwrap_err();
        assert_eq!(err, MapError::AlreadyMapped);
    }

    #[test]
    fn wrapping_range_is_rejected() {
        let mut mmu = Mmu::new();
        let err = mmu
            .map_range(u64::MAX - 0x1000, 0, 0x2000, MemoryType::Normal, false)
            .unwrap_err();
        assert_eq!(err, MapError::Overflow);
    }
}
