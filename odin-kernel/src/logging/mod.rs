//! Kernel Logging
//!
//! [`logger`] implements the `log` facade: levelled, timestamped lines on
//! the console, mirrored into [`buffer`]'s lock-free ring so the shell's
//! `dmesg` command can replay recent messages.

pub mod buffer;
pub mod logger;

pub use logger::init;
