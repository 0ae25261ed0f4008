//! BIOS console.
//!
//! One global UART behind a [`SpinLock`], installed by the platform during
//! bring-up. Output written before a console is installed is dropped.
//! Writers use `try_lock`, so output produced while the console is already
//! held (a log call from inside a console write) is dropped rather than
//! deadlocking.

use core::fmt;

use common::sync::SpinLock;

use crate::hal::serial::{NonBlockingSerial, SerialPort, SerialWriter};
use crate::peripheral::liteuart::LiteUart;

static CONSOLE: SpinLock<Option<LiteUart>> = SpinLock::new(None);

/// Make `uart` the console, returning the previous one.
pub fn install(uart: LiteUart) -> Option<LiteUart> {
    CONSOLE.lock().replace(uart)
}

/// Remove the console, for example to hand the UART to the serial loader.
pub fn take() -> Option<LiteUart> {
    CONSOLE.lock().take()
}

pub fn is_ready() -> bool {
    CONSOLE.lock().is_some()
}

/// Run `f` with exclusive access to the console UART.
///
/// Returns `None` when no console is installed or it is already in use.
pub fn with_console<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut LiteUart) -> R,
{
    let mut console = CONSOLE.try_lock()?;
    console.as_mut().map(f)
}

pub fn console_write(s: &str) {
    with_console(|uart| {
        use core::fmt::Write;
        let _ = SerialWriter(uart).write_str(s);
    });
}

/// Block until a byte arrives. `None` without a console.
pub fn console_read() -> Option<u8> {
    with_console(|uart| uart.read_byte().ok()).flatten()
}

pub fn console_read_nonblocking() -> Option<u8> {
    with_console(|uart| uart.try_read_byte().ok()).flatten()
}

/// `core::fmt::Write` sink for the console.
pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        console_write(s);
        Ok(())
    }
}

// ============================================================================
// Print Macros
// ============================================================================

/// Print to console without newline
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let _ = write!($crate::console::Console, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::hw::litex::uart::{RXEMPTY, RXTX, TXEMPTY};
    use common::mmio::BusHandle;
    use std::boxed::Box;

    #[test]
    fn prints_through_installed_uart() {
        // Plain memory standing in for the CSR window
        let regs: &'static mut [u32; 8] = Box::leak(Box::new([0; 8]));
        regs[RXEMPTY / 4] = 1;
        regs[TXEMPTY / 4] = 1;
        let base = regs.as_mut_ptr() as usize;

        let uart = unsafe { LiteUart::new(BusHandle::new(base), 115_200) };
        assert!(install(uart).is_none());
        assert!(is_ready());

        kprint!("v{}", 7);
        let last = unsafe { core::ptr::read_volatile((base + RXTX) as *const u32) };
        assert_eq!(last, b'7' as u32);

        assert_eq!(console_read_nonblocking(), None);
        assert!(take().is_some());
        assert!(!is_ready());
        kprintln!("dropped");
    }
}
