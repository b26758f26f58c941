//! Kernel Logger
//!
//! `log` facade implementation. Each record is formatted once into a stack
//! buffer, written to the console as a levelled, timestamped line, and
//! mirrored into the lock-free ring for `dmesg`. No locks are taken beyond
//! the console's own, so logging from IRQ context is safe.

use core::fmt::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};
use odin_pal::console;

use crate::logging::buffer::{self, LOG_ENTRY_CONTENT_SIZE, LogEntry};

/// Stack buffer for formatting a record without allocation.
struct MessageBuffer {
    data: [u8; LOG_ENTRY_CONTENT_SIZE],
    len: usize,
}

impl MessageBuffer {
    const fn new() -> Self {
        Self {
            data: [0; LOG_ENTRY_CONTENT_SIZE],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.data[..self.len]).unwrap_or("<invalid>")
    }
}

impl Write for MessageBuffer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let to_copy = bytes.len().min(LOG_ENTRY_CONTENT_SIZE - self.len);
        self.data[self.len..self.len + to_copy].copy_from_slice(&bytes[..to_copy]);
        self.len += to_copy;
        Ok(())
    }
}

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let time_ms = odin_pal::timer::now_ms();

        let mut msg = MessageBuffer::new();
        let _ = write!(msg, "{}", record.args());

        buffer::push(LogEntry::new(
            time_ms,
            record.level(),
            record.target(),
            msg.as_str(),
        ));

        let level_str = match record.level() {
            Level::Error => "\x1b[31mERROR\x1b[0m",
            Level::Warn => "\x1b[33m WARN\x1b[0m",
            Level::Info => "\x1b[32m INFO\x1b[0m",
            Level::Debug => "\x1b[34mDEBUG\x1b[0m",
            Level::Trace => "\x1b[35mTRACE\x1b[0m",
        };

        let mut line = MessageBuffer::new();
        let _ = writeln!(
            line,
            "[{:>5}.{:03}] {} {}: {}",
            time_ms / 1000,
            time_ms % 1000,
            level_str,
            record.target(),
            msg.as_str()
        );
        console::puts(line.as_str());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger.
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LevelFilter::Debug))
        .ok();
}
