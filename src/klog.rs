//! Kernel console and logger
//!
//! Routes the `log` facade and the `kprint!`/`kprintln!` macros to a single
//! console sink. The board layer attaches the sink (a UART, a semihosting
//! channel, a ring buffer) with [`set_console`]; until then output is dropped.
//!
//! A spinlock serializes writers so concurrent records are not interleaved.

use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Console sink type.
pub type Console = dyn Write + Send;

/// Global console protected by spinlock.
pub static CONSOLE: Mutex<Option<&'static mut Console>> = Mutex::new(None);

/// Attach the console sink, returning the previous one.
pub fn set_console(sink: &'static mut Console) -> Option<&'static mut Console> {
    CONSOLE.lock().replace(sink)
}

/// Detach the console sink.
pub fn take_console() -> Option<&'static mut Console> {
    CONSOLE.lock().take()
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        let _ = console.write_fmt(args);
    }
}

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut console = CONSOLE.lock();
        if let Some(console) = console.as_mut() {
            let _ = writeln!(
                console,
                "[{:5} {}] {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger.
///
/// Fails if a logger has already been installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    crate::config::get().set_log_level(level);
    Ok(())
}

/// Print to the kernel console.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        $crate::klog::_print(format_args!($($arg)*));
    }};
}

/// Print a line to the kernel console.
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}
