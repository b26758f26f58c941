//! # odin-fdt
//!
//! Flattened Device Tree parsing for OdinOS.
//!
//! The FDT blob is firmware-owned memory at an address the kernel does not
//! control, so this parser treats it as hostile input: every field read is
//! bounds-checked, every string scan is length-capped, and every traversal
//! carries a hard token ceiling so a malformed or malicious blob cannot walk
//! the kernel out of bounds or into an endless loop.
//!
//! - [`header`]: Big-endian header parsing and validation
//! - [`blob`]: The [`Fdt`](blob::Fdt) view and the bounded token walker
//! - [`devices`]: UART and GIC discovery for the boot path
//!
//! The parser never writes and never panics; all failures surface as
//! [`FdtError`] and collapse to "device not found" at the call site.
//!
//! This crate has no dependencies so every other crate can use it freely.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod blob;
pub mod devices;
pub mod header;

#[cfg(test)]
mod testutil;

pub use blob::{Fdt, Token, Walker};
pub use devices::{GicInfo, UartInfo, find_gic, find_uart};
pub use header::FdtHeader;

/// Why an FDT operation failed.
///
/// Callers on the boot path treat any of these as "device not found" and
/// fall back to compiled-in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtError {
    /// The blob address was zero
    NullAddress,
    /// Header magic was not `0xd00dfeed`
    BadMagic,
    /// `totalsize` exceeds the supported maximum (16 MiB)
    TooLarge,
    /// `totalsize` is smaller than the header itself
    TooSmall,
    /// A block offset/size window wraps or exceeds `totalsize`
    BadLayout,
    /// The provided byte slice is shorter than `totalsize`
    Truncated,
    /// A read would land outside the structure or strings block
    OutOfBounds,
    /// An unknown structure token was encountered
    BadToken(u32),
    /// A string exceeded the 4096-byte scan ceiling without a NUL
    StringTooLong,
    /// A string was not valid UTF-8
    BadString,
    /// A property exceeded the 1 MiB size cap
    PropertyTooLarge,
    /// The traversal exceeded the 10 000 token ceiling
    TokenCeiling,
}
