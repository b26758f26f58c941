//! Interactive Shell
//!
//! A line-oriented console on top of the IRQ-driven input ring: prompt,
//! echo, backspace editing, and a static command table. The read loop
//! blocks on WFE between characters, so an idle shell costs nothing.

use odin_pal::{platform, println, print, timer};

use crate::input;
use crate::irq;
use crate::logging::buffer;

/// The prompt.
const PROMPT: &str = "OdinOS> ";

/// Line capacity, excluding the terminator the UART never sees.
const LINE_CAP: usize = 128;

// Control codes understood by the editor
const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const BS: u8 = 0x08;
const DEL: u8 = 0x7F;
const BEL: u8 = 0x07;

/// What a fed byte did to the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    /// Printable byte stored; echo it
    Stored(u8),
    /// Last byte erased; wipe it from the terminal
    Erased,
    /// Line complete
    Submitted,
    /// Line full; byte dropped
    Overflow,
    /// Byte ignored (unprintable, or erase on an empty line)
    Ignored,
}

/// Fixed-capacity line editor state.
struct LineBuffer {
    buf: [u8; LINE_CAP],
    len: usize,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            buf: [0; LINE_CAP],
            len: 0,
        }
    }

    /// Feed one byte from the console.
    fn feed(&mut self, byte: u8) -> Feed {
        match byte {
            CR | LF => Feed::Submitted,
            BS | DEL => {
                if self.len > 0 {
                    self.len -= 1;
                    Feed::Erased
                } else {
                    Feed::Ignored
                }
            }
            0x20..=0x7E => {
                if self.len < LINE_CAP {
                    self.buf[self.len] = byte;
                    self.len += 1;
                    Feed::Stored(byte)
                } else {
                    Feed::Overflow
                }
            }
            _ => Feed::Ignored,
        }
    }

    /// The line accumulated so far.
    fn as_str(&self) -> &str {
        // Only printable ASCII is ever stored
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// A shell command.
struct Command {
    name: &'static str,
    help: &'static str,
    run: fn(args: &str),
}

static COMMANDS: &[Command] = &[
    Command {
        name: "help",
        help: "list available commands",
        run: cmd_help,
    },
    Command {
        name: "clear",
        help: "clear the screen",
        run: cmd_clear,
    },
    Command {
        name: "echo",
        help: "print the arguments",
        run: cmd_echo,
    },
    Command {
        name: "uptime",
        help: "time since boot",
        run: cmd_uptime,
    },
    Command {
        name: "irqstats",
        help: "interrupt delivery counters",
        run: cmd_irqstats,
    },
    Command {
        name: "dmesg",
        help: "replay buffered kernel log",
        run: cmd_dmesg,
    },
    Command {
        name: "platform",
        help: "discovered hardware configuration",
        run: cmd_platform,
    },
    Command {
        name: "about",
        help: "kernel version",
        run: cmd_about,
    },
];

fn find_command(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// Parse and run one input line.
fn dispatch_line(line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let (name, args) = match line.split_once(' ') {
        Some((name, args)) => (name, args.trim()),
        None => (line, ""),
    };
    match find_command(name) {
        Some(command) => (command.run)(args),
        None => println!("unknown command: {name} (try 'help')"),
    }
}

/// Run the shell. Never returns.
pub fn run() -> ! {
    println!();
    println!("OdinOS shell. Type 'help' for commands.");
    if !input::available() {
        println!("(no interrupt-driven input; the console is output-only)");
    }

    let mut line = LineBuffer::new();
    loop {
        print!("{PROMPT}");
        line.clear();
        loop {
            let byte = input::read_byte_blocking();
            match line.feed(byte) {
                Feed::Stored(byte) => odin_pal::console::putc(byte),
                Feed::Erased => print!("\x08 \x08"),
                Feed::Overflow => odin_pal::console::putc(BEL),
                Feed::Submitted => {
                    println!();
                    dispatch_line(line.as_str());
                    break;
                }
                Feed::Ignored => {}
            }
        }
    }
}

// -- Commands

fn cmd_help(_args: &str) {
    for command in COMMANDS {
        println!("  {:<10} {}", command.name, command.help);
    }
}

fn cmd_clear(_args: &str) {
    // VT100: clear screen, cursor home
    print!("\x1b[2J\x1b[H");
}

fn cmd_echo(args: &str) {
    println!("{args}");
}

fn cmd_uptime(_args: &str) {
    let ms = timer::now_ms();
    println!("up {}.{:03} s", ms / 1000, ms % 1000);
}

fn cmd_irqstats(_args: &str) {
    let stats = irq::stats();
    println!("total:     {}", stats.total);
    println!("spurious:  {}", stats.spurious);
    println!("unhandled: {}", stats.unhandled);
}

fn cmd_dmesg(_args: &str) {
    let mut drained = 0;
    while let Some(entry) = buffer::pop() {
        println!(
            "[{:>5}.{:03}] {} {}: {}",
            entry.timestamp_ms / 1000,
            entry.timestamp_ms % 1000,
            entry.level_str(),
            entry.target(),
            entry.message()
        );
        drained += 1;
        if drained == buffer::capacity() {
            break;
        }
    }
    if drained == 0 {
        println!("log buffer is empty");
    }
}

fn cmd_platform(_args: &str) {
    let config = platform::platform();
    println!("uart:  {:#x}", config.uart_base);
    match config.uart_irq {
        Some(intid) => println!("irq:   INTID {intid}"),
        None => println!("irq:   none discovered"),
    }
    match config.gic {
        Some(gic) => {
            println!("gicd:  {:#x}", gic.distributor_base);
            println!("gicc:  {:#x}", gic.cpu_interface_base);
        }
        None => println!("gic:   none discovered"),
    }
}

fn cmd_about(_args: &str) {
    println!("OdinOS {} (aarch64, qemu virt)", env!("CARGO_PKG_VERSION"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_echoes_printables() {
        let mut line = LineBuffer::new();
        assert_eq!(line.feed(b'h'), Feed::Stored(b'h'));
        assert_eq!(line.feed(b'i'), Feed::Stored(b'i'));
        assert_eq!(line.as_str(), "hi");
    }

    #[test]
    fn backspace_and_delete_erase() {
        let mut line = LineBuffer::new();
        line.feed(b'h');
        line.feed(b'i');
        assert_eq!(line.feed(BS), Feed::Erased);
        assert_eq!(line.as_str(), "h");
        assert_eq!(line.feed(DEL), Feed::Erased);
        assert_eq!(line.as_str(), "");
        // Erasing an empty line is a no-op
        assert_eq!(line.feed(BS), Feed::Ignored);
    }

    #[test]
    fn cr_and_lf_both_submit() {
        let mut line = LineBuffer::new();
        line.feed(b'x');
        assert_eq!(line.feed(CR), Feed::Submitted);
        assert_eq!(line.feed(LF), Feed::Submitted);
        // Submission leaves the buffer to the caller
        assert_eq!(line.as_str(), "x");
    }

    #[test]
    fn overflow_drops_and_keeps_line() {
        let mut line = LineBuffer::new();
        for _ in 0..LINE_CAP {
            assert!(matches!(line.feed(b'a'), Feed::Stored(_)));
        }
        assert_eq!(line.feed(b'b'), Feed::Overflow);
        assert_eq!(line.as_str().len(), LINE_CAP);
        assert!(!line.as_str().contains('b'));
    }

    #[test]
    fn unprintable_bytes_are_ignored_by_the_editor() {
        let mut line = LineBuffer::new();
        assert_eq!(line.feed(0x1B), Feed::Ignored); // ESC
        assert_eq!(line.feed(0x00), Feed::Ignored);
        assert_eq!(line.as_str(), "");
    }

    #[test]
    fn command_lookup() {
        assert!(find_command("help").is_some());
        assert!(find_command("dmesg").is_some());
        assert!(find_command("reboot").is_none());
    }

    #[test]
    fn dispatch_tolerates_whitespace_and_unknowns() {
        // Host console is a no-op; these must simply not panic
        dispatch_line("");
        dispatch_line("   ");
        dispatch_line("echo hello world");
        dispatch_line("nosuchcommand");
        dispatch_line("help");
    }
}
