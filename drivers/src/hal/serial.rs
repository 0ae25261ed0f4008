//! Serial Port (UART) Hardware Abstraction Layer.
//!
//! This module defines platform-independent traits for serial communication.

use core::fmt;

use super::timer::CountingTimer;

/// Serial port configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate in bits per second.
    pub baud_rate: u32,
    /// Number of data bits per frame.
    pub data_bits: DataBits,
    /// Parity checking mode.
    pub parity: Parity,
    /// Number of stop bits.
    pub stop_bits: StopBits,
}

impl SerialConfig {
    /// Create a standard 8N1 configuration at the specified baud rate.
    ///
    /// 8N1 means: 8 data bits, no parity, 1 stop bit.
    pub const fn new_8n1(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl Default for SerialConfig {
    /// Default configuration: 115200 baud, 8N1.
    fn default() -> Self {
        Self::new_8n1(115200)
    }
}

/// Number of data bits per frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

/// Parity mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Serial port errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerialError {
    /// Operation would block but non-blocking mode was requested.
    #[error("operation would block")]
    WouldBlock,
    /// A caller-imposed deadline expired.
    #[error("timed out waiting for the serial line")]
    Timeout,
    /// Configuration the hardware cannot provide.
    #[error("unsupported serial configuration")]
    InvalidConfig,
}

/// Serial port trait.
///
/// Blocking calls busy-poll the hardware status flags; a stalled line
/// blocks forever. Callers that need a bounded wait use
/// [`NonBlockingSerial`] together with a timer.
pub trait SerialPort {
    /// Configure the serial port.
    ///
    /// This must be called before using the serial port.
    fn configure(&mut self, config: SerialConfig) -> Result<(), SerialError>;

    /// Write a single byte (blocking).
    fn write_byte(&mut self, byte: u8) -> Result<(), SerialError>;

    /// Write multiple bytes (blocking).
    fn write(&mut self, bytes: &[u8]) -> Result<usize, SerialError> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(bytes.len())
    }

    /// Read a single byte (blocking).
    fn read_byte(&mut self) -> Result<u8, SerialError>;

    /// Read multiple bytes (blocking).
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SerialError> {
        for byte in buffer.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(buffer.len())
    }

    /// Wait until everything written has left the transmitter.
    fn flush(&mut self) -> Result<(), SerialError>;

    /// Check if the serial port is busy transmitting.
    fn is_busy(&self) -> bool;
}

/// Non-blocking status queries and transfers.
pub trait NonBlockingSerial: SerialPort {
    /// A received byte is waiting.
    fn can_read(&self) -> bool;

    /// The transmitter can accept a byte.
    fn can_write(&self) -> bool;

    /// Try to write a byte without blocking.
    fn try_write_byte(&mut self, byte: u8) -> Result<(), SerialError> {
        if !self.can_write() {
            return Err(SerialError::WouldBlock);
        }
        self.write_byte(byte)
    }

    /// Try to read a byte without blocking.
    fn try_read_byte(&mut self) -> Result<u8, SerialError> {
        if !self.can_read() {
            return Err(SerialError::WouldBlock);
        }
        self.read_byte()
    }

    /// Read a byte, giving up after `timeout_us` microseconds.
    fn read_byte_timeout<T: CountingTimer + ?Sized>(
        &mut self,
        timer: &T,
        timeout_us: u32,
    ) -> Result<u8, SerialError> {
        let start = timer.now_us();
        loop {
            match self.try_read_byte() {
                Err(SerialError::WouldBlock) => {}
                other => return other,
            }
            if timer.now_us().wrapping_sub(start) >= timeout_us as u64 {
                return Err(SerialError::Timeout);
            }
            core::hint::spin_loop();
        }
    }

    /// Fill `buffer`, giving each byte `timeout_us` microseconds to arrive.
    fn read_exact_timeout<T: CountingTimer + ?Sized>(
        &mut self,
        buffer: &mut [u8],
        timer: &T,
        timeout_us: u32,
    ) -> Result<(), SerialError> {
        for byte in buffer.iter_mut() {
            *byte = self.read_byte_timeout(timer, timeout_us)?;
        }
        Ok(())
    }
}

impl<T: SerialPort + ?Sized> SerialPort for &mut T {
    fn configure(&mut self, config: SerialConfig) -> Result<(), SerialError> {
        (**self).configure(config)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), SerialError> {
        (**self).write_byte(byte)
    }

    fn read_byte(&mut self) -> Result<u8, SerialError> {
        (**self).read_byte()
    }

    fn flush(&mut self) -> Result<(), SerialError> {
        (**self).flush()
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }
}

impl<T: NonBlockingSerial + ?Sized> NonBlockingSerial for &mut T {
    fn can_read(&self) -> bool {
        (**self).can_read()
    }

    fn can_write(&self) -> bool {
        (**self).can_write()
    }
}

/// Wrapper type to implement core::fmt::Write for SerialPort types.
/// This allows using write!/writeln! macros.
pub struct SerialWriter<T: SerialPort>(pub T);

impl<T: SerialPort> fmt::Write for SerialWriter<T> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            // Convert line endings
            if byte == b'\n' {
                self.0.write_byte(b'\r').map_err(|_| fmt::Error)?;
            }
            self.0.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
