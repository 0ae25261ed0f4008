//! LiteX UART Driver
//!
//! Polling driver for the LiteX `UART` core. The core has fixed-depth TX
//! and RX FIFOs behind a single `rxtx` CSR; the baud rate is fixed when the
//! gateware is built, so there is nothing to program at run time besides
//! masking the event interrupts.
//!
//! A received byte stays at the head of the RX FIFO until the RX event is
//! acknowledged in `ev_pending`, which is what advances the FIFO.
//!
//! # Example
//!
//! ```no_run
//! use softsoc_drivers::BusHandle;
//! use softsoc_drivers::hal::serial::{SerialConfig, SerialPort};
//! use softsoc_drivers::peripheral::liteuart::LiteUart;
//!
//! let mut uart = unsafe { LiteUart::new(BusHandle::new(0xF000_3000), 115_200) };
//! uart.configure(SerialConfig::new_8n1(115_200)).unwrap();
//! uart.write(b"Hello, world!\n").unwrap();
//! ```

use common::mmio::{BusHandle, Mmio, RegisterBlock};

use crate::hal::serial::{
    DataBits, NonBlockingSerial, Parity, SerialConfig, SerialError, SerialPort, StopBits,
};
use crate::hw::litex::uart::*;

/// LiteX UART driver.
pub struct LiteUart<R: RegisterBlock = Mmio> {
    regs: R,
    baud_rate: u32,
}

impl LiteUart<Mmio> {
    /// Create a driver for the UART core at `handle`.
    ///
    /// `baud_rate` is the rate the gateware was built with.
    ///
    /// # Safety
    ///
    /// - `handle` must point to a LiteX UART CSR window
    /// - Only one instance should exist per UART hardware
    pub const unsafe fn new(handle: BusHandle, baud_rate: u32) -> Self {
        Self {
            regs: unsafe { Mmio::new(handle) },
            baud_rate,
        }
    }
}

impl<R: RegisterBlock> LiteUart<R> {
    /// Drive an arbitrary register block, for example a simulated core.
    pub const fn with_registers(regs: R, baud_rate: u32) -> Self {
        Self { regs, baud_rate }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_registers(self) -> R {
        self.regs
    }

    pub const fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn rx_empty(&self) -> bool {
        self.regs.read(RXEMPTY) & 1 != 0
    }

    fn tx_full(&self) -> bool {
        self.regs.read(TXFULL) & 1 != 0
    }

    fn tx_empty(&self) -> bool {
        self.regs.read(TXEMPTY) & 1 != 0
    }
}

// ============================================================================
// HAL Implementation
// ============================================================================

impl<R: RegisterBlock> SerialPort for LiteUart<R> {
    fn configure(&mut self, config: SerialConfig) -> Result<(), SerialError> {
        if config.baud_rate != self.baud_rate
            || config.data_bits != DataBits::Eight
            || config.parity != Parity::None
            || config.stop_bits != StopBits::One
        {
            return Err(SerialError::InvalidConfig);
        }

        // Polling mode: mask both events and clear a stale TX event.
        // Acknowledging RX would pop a received byte.
        self.regs.write(EV_ENABLE, 0);
        self.regs.write(EV_PENDING, EV_TX);

        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), SerialError> {
        while self.tx_full() {
            core::hint::spin_loop();
        }

        self.regs.write(RXTX, byte as u32);
        self.regs.write(EV_PENDING, EV_TX);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, SerialError> {
        while self.rx_empty() {
            core::hint::spin_loop();
        }

        let byte = (self.regs.read(RXTX) & 0xFF) as u8;
        self.regs.write(EV_PENDING, EV_RX);
        Ok(byte)
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        while !self.tx_empty() {
            core::hint::spin_loop();
        }
        Ok(())
    }

    fn is_busy(&self) -> bool {
        !self.tx_empty()
    }
}

impl<R: RegisterBlock> NonBlockingSerial for LiteUart<R> {
    fn can_read(&self) -> bool {
        !self.rx_empty()
    }

    fn can_write(&self) -> bool {
        !self.tx_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::uart::SimUart;

    fn uart() -> LiteUart<SimUart> {
        let mut uart = LiteUart::with_registers(SimUart::new(), 115_200);
        uart.configure(SerialConfig::new_8n1(115_200)).unwrap();
        uart
    }

    #[test]
    fn configure_rejects_what_the_gateware_cannot_do() {
        let mut uart = LiteUart::with_registers(SimUart::new(), 115_200);
        assert_eq!(
            uart.configure(SerialConfig::new_8n1(9_600)),
            Err(SerialError::InvalidConfig)
        );
        let mut seven_bit = SerialConfig::default();
        seven_bit.data_bits = DataBits::Seven;
        assert_eq!(uart.configure(seven_bit), Err(SerialError::InvalidConfig));
        assert_eq!(uart.configure(SerialConfig::default()), Ok(()));
        assert_eq!(uart.registers().event_enable(), 0);
    }

    #[test]
    fn configure_keeps_bytes_already_received() {
        let mut sim = SimUart::new();
        sim.inject(b"hi");
        let mut uart = LiteUart::with_registers(sim, 115_200);
        uart.configure(SerialConfig::new_8n1(115_200)).unwrap();

        assert_eq!(uart.registers().pending_rx(), 2);
        assert_eq!(uart.read_byte(), Ok(b'h'));
        assert_eq!(uart.read_byte(), Ok(b'i'));
    }

    #[test]
    fn write_waits_for_fifo_space() {
        let mut uart = uart();
        uart.registers_mut().stall_tx(5);
        uart.write(b"ok\n").unwrap();
        assert_eq!(uart.registers().transmitted(), b"ok\n");
        assert_eq!(uart.registers().stalls_left(), 0);
    }

    #[test]
    fn read_pops_only_after_acknowledge() {
        let mut uart = uart();
        uart.registers_mut().inject(b"ab");
        assert!(uart.can_read());
        assert_eq!(uart.read_byte(), Ok(b'a'));
        assert_eq!(uart.read_byte(), Ok(b'b'));
        assert!(!uart.can_read());
    }

    #[test]
    fn nonblocking_read_reports_would_block() {
        let mut uart = uart();
        assert_eq!(uart.try_read_byte(), Err(SerialError::WouldBlock));
        uart.registers_mut().inject(b"x");
        assert_eq!(uart.try_read_byte(), Ok(b'x'));
    }

    #[test]
    fn writer_translates_newlines() {
        use crate::hal::serial::SerialWriter;
        use core::fmt::Write;

        let mut uart = uart();
        write!(SerialWriter(&mut uart), "boot\n").unwrap();
        assert_eq!(uart.registers().transmitted(), b"boot\r\n");
    }
}
