//! Kernel Log Ring Buffer
//!
//! Recent log messages in a lock-free ring, consumed by the shell's
//! `dmesg` command. Push never blocks and is safe from IRQ context; when
//! the ring is full, new messages are dropped (the console line was
//! already emitted).

use thingbuf::StaticThingBuf;

/// Maximum size of a single entry's content (target + message).
pub const LOG_ENTRY_CONTENT_SIZE: usize = 224;

/// Number of entry slots.
pub const LOG_BUFFER_SLOTS: usize = 128;

/// One buffered log line.
#[derive(Clone)]
pub struct LogEntry {
    /// Milliseconds since boot
    pub timestamp_ms: u64,
    /// Level (0=Error .. 4=Trace)
    pub level: u8,
    /// Length of the target prefix inside `content`
    pub target_len: u8,
    /// Length of the message following the target
    pub message_len: u16,
    /// `[target bytes][message bytes]`
    pub content: [u8; LOG_ENTRY_CONTENT_SIZE],
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            timestamp_ms: 0,
            level: 0,
            target_len: 0,
            message_len: 0,
            content: [0; LOG_ENTRY_CONTENT_SIZE],
        }
    }
}

impl LogEntry {
    /// Build an entry, truncating target and message to the slot size.
    pub fn new(timestamp_ms: u64, level: log::Level, target: &str, message: &str) -> Self {
        let mut entry = Self {
            timestamp_ms,
            level: level_to_u8(level),
            ..Self::default()
        };

        let target_bytes = target.as_bytes();
        let target_len = target_bytes.len().min(u8::MAX as usize);
        entry.content[..target_len].copy_from_slice(&target_bytes[..target_len]);
        entry.target_len = target_len as u8;

        let message_bytes = message.as_bytes();
        let message_len = message_bytes.len().min(LOG_ENTRY_CONTENT_SIZE - target_len);
        entry.content[target_len..target_len + message_len]
            .copy_from_slice(&message_bytes[..message_len]);
        entry.message_len = message_len as u16;

        entry
    }

    /// The target string.
    #[must_use]
    pub fn target(&self) -> &str {
        core::str::from_utf8(&self.content[..self.target_len as usize]).unwrap_or("<invalid>")
    }

    /// The message string.
    #[must_use]
    pub fn message(&self) -> &str {
        let start = self.target_len as usize;
        let end = start + self.message_len as usize;
        core::str::from_utf8(&self.content[start..end]).unwrap_or("<invalid>")
    }

    /// A short label for the entry's level.
    #[must_use]
    pub fn level_str(&self) -> &'static str {
        match self.level {
            0 => "ERROR",
            1 => "WARN ",
            2 => "INFO ",
            3 => "DEBUG",
            _ => "TRACE",
        }
    }
}

fn level_to_u8(level: log::Level) -> u8 {
    match level {
        log::Level::Error => 0,
        log::Level::Warn => 1,
        log::Level::Info => 2,
        log::Level::Debug => 3,
        log::Level::Trace => 4,
    }
}

/// Lock-free log ring.
static LOG_BUFFER: StaticThingBuf<LogEntry, LOG_BUFFER_SLOTS> = StaticThingBuf::new();

/// Push an entry; returns `false` when the ring is full.
pub fn push(entry: LogEntry) -> bool {
    LOG_BUFFER.push(entry).is_ok()
}

/// Pop the oldest entry.
pub fn pop() -> Option<LogEntry> {
    LOG_BUFFER.pop()
}

/// Entries currently buffered.
#[must_use]
pub fn len() -> usize {
    LOG_BUFFER.len()
}

/// Total slot count.
#[must_use]
pub fn capacity() -> usize {
    LOG_BUFFER.capacity()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips_target_and_message() {
        let entry = LogEntry::new(1234, log::Level::Info, "boot", "mmu enabled");
        assert_eq!(entry.timestamp_ms, 1234);
        assert_eq!(entry.target(), "boot");
        assert_eq!(entry.message(), "mmu enabled");
        assert_eq!(entry.level_str(), "INFO ");
    }

    #[test]
    fn long_messages_are_truncated() {
        let raw = [b'x'; 512];
        let long = core::str::from_utf8(&raw).unwrap();
        let entry = LogEntry::new(0, log::Level::Warn, "t", long);
        assert_eq!(entry.message().len(), LOG_ENTRY_CONTENT_SIZE - 1);
    }
}
