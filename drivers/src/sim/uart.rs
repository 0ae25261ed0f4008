//! Simulated LiteX UART CSR window.

use core::cell::Cell;

use common::mmio::RegisterBlock;

use super::ByteFifo;
use crate::hw::litex::uart::*;

const RX_DEPTH: usize = 4096;
const TX_LOG: usize = 4096;

/// LiteX UART core with an instantly draining transmitter.
///
/// Bytes queued with [`SimUart::inject`] appear on the receive side;
/// everything the driver transmits is recorded in order, up to the first
/// 4 KiB.
pub struct SimUart {
    rx: ByteFifo<RX_DEPTH>,
    tx: [u8; TX_LOG],
    tx_len: usize,
    tx_stalls: Cell<u32>,
    ev_enable: u32,
    ev_pending: u32,
}

impl SimUart {
    pub const fn new() -> Self {
        Self {
            rx: ByteFifo::new(),
            tx: [0; TX_LOG],
            tx_len: 0,
            tx_stalls: Cell::new(0),
            ev_enable: 0,
            ev_pending: 0,
        }
    }

    /// Queue bytes as if they arrived on the RX pin.
    pub fn inject(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            assert!(self.rx.push(byte), "simulated RX FIFO overflow");
        }
    }

    /// Report `txfull` for the next `polls` status reads.
    pub fn stall_tx(&mut self, polls: u32) {
        self.tx_stalls.set(polls);
    }

    pub fn stalls_left(&self) -> u32 {
        self.tx_stalls.get()
    }

    /// Everything transmitted so far.
    pub fn transmitted(&self) -> &[u8] {
        &self.tx[..self.tx_len]
    }

    pub fn clear_transmitted(&mut self) {
        self.tx_len = 0;
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    pub fn event_enable(&self) -> u32 {
        self.ev_enable
    }
}

impl Default for SimUart {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBlock for SimUart {
    fn read(&self, offset: usize) -> u32 {
        match offset {
            RXTX => self.rx.peek().unwrap_or(0) as u32,
            TXFULL => {
                let stalls = self.tx_stalls.get();
                if stalls > 0 {
                    self.tx_stalls.set(stalls - 1);
                    1
                } else {
                    0
                }
            }
            RXEMPTY => self.rx.is_empty() as u32,
            EV_STATUS => {
                let mut status = EV_TX;
                if !self.rx.is_empty() {
                    status |= EV_RX;
                }
                status
            }
            EV_PENDING => self.ev_pending,
            EV_ENABLE => self.ev_enable,
            TXEMPTY => 1,
            RXFULL => self.rx.is_full() as u32,
            _ => 0,
        }
    }

    fn write(&mut self, offset: usize, value: u32) {
        match offset {
            RXTX => {
                if self.tx_len < TX_LOG {
                    self.tx[self.tx_len] = value as u8;
                    self.tx_len += 1;
                }
                self.ev_pending |= EV_TX;
            }
            EV_PENDING => {
                if value & EV_RX != 0 {
                    self.rx.pop();
                }
                self.ev_pending &= !value;
            }
            EV_ENABLE => self.ev_enable = value,
            _ => {}
        }
    }
}
