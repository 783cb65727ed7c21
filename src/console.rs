//! Console output for K2Sched
//!
//! Provides basic text output for kernel debugging plus the `log` backend.
//! A kernel registers a sink (UART, framebuffer, debug port) with
//! [`set_sink`]; under test the console captures into a fixed buffer.

use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Where console bytes go once a kernel has wired up its output device
pub type ConsoleSink = fn(&str);

/// Console writer interface
pub struct Console {
    sink: Option<ConsoleSink>,
    #[cfg(test)]
    buffer: heapless::String<1024>,
}

impl Console {
    /// Create a new console instance
    pub const fn new() -> Self {
        Console {
            sink: None,
            #[cfg(test)]
            buffer: heapless::String::new(),
        }
    }

    /// Write a string to the console
    pub fn write_str(&mut self, s: &str) {
        #[cfg(test)]
        {
            // Truncate rather than fail when the capture buffer fills
            for c in s.chars() {
                if self.buffer.push(c).is_err() {
                    break;
                }
            }
        }

        if let Some(sink) = self.sink {
            sink(s);
        }
    }

    /// Clear the console
    pub fn clear(&mut self) {
        #[cfg(test)]
        self.buffer.clear();
    }

    #[cfg(test)]
    fn captured(&self) -> &str {
        self.buffer.as_str()
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Console::write_str(self, s);
        Ok(())
    }
}

/// Global console instance
static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

/// Route console output to `sink`
pub fn set_sink(sink: ConsoleSink) {
    CONSOLE.lock().sink = Some(sink);
}

/// Print formatted text to console
pub fn print(args: fmt::Arguments) {
    // Console writes cannot fail
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Print macro for kernel use
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*));
    };
}

/// Print with newline macro
#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n");
    };
    ($($arg:tt)*) => {
        $crate::console::print(format_args!("{}\n", format_args!($($arg)*)))
    };
}

// ============================================================================
// Log backend
// ============================================================================

/// `log` backend writing `[LEVEL target] message` lines to the console
pub struct KernLogger;

impl Log for KernLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        write_record(&mut *CONSOLE.lock(), record);
    }

    fn flush(&self) {}
}

fn write_record<W: Write>(out: &mut W, record: &Record) {
    let _ = writeln!(
        out,
        "[{:<5} {}] {}",
        record.level(),
        record.target(),
        record.args()
    );
}

static LOGGER: KernLogger = KernLogger;

/// Install the kernel logger. Only the first call succeeds.
pub fn init_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_write() {
        let mut console = Console::new();
        console.write_str("Hello, K2Sched!");
        assert!(console.captured().contains("Hello, K2Sched!"));
    }

    #[test]
    fn test_console_formatting() {
        let mut console = Console::new();
        write!(&mut console, "Test {}", 42).unwrap();
        assert!(console.captured().contains("Test 42"));
    }

    #[test]
    fn test_console_truncates_when_full() {
        let mut console = Console::new();
        for _ in 0..200 {
            console.write_str("0123456789");
        }
        assert_eq!(console.captured().len(), 1024);
        console.clear();
        assert!(console.captured().is_empty());
    }

    #[test]
    fn test_log_record_format() {
        let mut console = Console::new();
        write_record(
            &mut console,
            &Record::builder()
                .level(log::Level::Info)
                .target("sched")
                .args(format_args!("logger online {}", 7))
                .build(),
        );
        assert_eq!(console.captured(), "[INFO  sched] logger online 7\n");
    }
}
