//! SPI Bus Hardware Abstraction Layer.
//!
//! A minimal single-device master: chip select framing plus byte shifting.
//! Flash command sequencing lives above this trait in
//! [`crate::peripheral::spiflash`].

/// SPI master with one chip select line.
///
/// Transfers are half-duplex: a command phase written with [`SpiBus::write`]
/// is followed by an optional data phase read with [`SpiBus::read`], all
/// between one [`SpiBus::select`] / [`SpiBus::deselect`] pair. Register
/// level implementations cannot fail, so the trait is infallible.
pub trait SpiBus {
    /// Assert chip select.
    fn select(&mut self);

    /// Release chip select, ending the current command.
    fn deselect(&mut self);

    /// Shift out `bytes`, MSB first, discarding whatever comes back.
    fn write(&mut self, bytes: &[u8]);

    /// Shift in `buffer.len()` bytes.
    fn read(&mut self, buffer: &mut [u8]);

    /// One complete command: select, write `command`, read into
    /// `response`, deselect.
    fn transaction(&mut self, command: &[u8], response: &mut [u8]) {
        self.select();
        self.write(command);
        if !response.is_empty() {
            self.read(response);
        }
        self.deselect();
    }
}

impl<B: SpiBus + ?Sized> SpiBus for &mut B {
    fn select(&mut self) {
        (**self).select()
    }

    fn deselect(&mut self) {
        (**self).deselect()
    }

    fn write(&mut self, bytes: &[u8]) {
        (**self).write(bytes)
    }

    fn read(&mut self, buffer: &mut [u8]) {
        (**self).read(buffer)
    }
}
