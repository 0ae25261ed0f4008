//! LiteX Timer Driver
//!
//! `timer0` is a 32-bit down-counter clocked at the system clock. The BIOS
//! runs it free: load 0, reload 0xFFFF_FFFF, enabled. Reading requires
//! latching the live count through `update_value` first.
//!
//! The hardware counter wraps every 2^32 cycles (about 43 s at 100 MHz);
//! [`LitexTimer`] extends it to 64 bits in software, which stays correct
//! as long as it is read at least once per wrap period.

use core::cell::{Cell, RefCell};

use common::mmio::{BusHandle, Mmio, RegisterBlock};

use crate::hal::timer::{CountingTimer, Delay};
use crate::hw::litex::timer0::{EN, LOAD, RELOAD, UPDATE_VALUE, VALUE};

pub struct LitexTimer<R: RegisterBlock = Mmio> {
    regs: RefCell<R>,
    ticks_per_us: u32,
    last: Cell<u32>,
    elapsed: Cell<u64>,
}

impl LitexTimer<Mmio> {
    /// # Safety
    ///
    /// `handle` must point to the LiteX `timer0` CSR window, and no other
    /// code may reprogram the timer.
    pub unsafe fn new(handle: BusHandle, sys_clk_hz: u32) -> Self {
        Self::with_registers(unsafe { Mmio::new(handle) }, sys_clk_hz)
    }
}

impl<R: RegisterBlock> LitexTimer<R> {
    /// Start the counter free-running.
    pub fn with_registers(mut regs: R, sys_clk_hz: u32) -> Self {
        regs.write(EN, 0);
        regs.write(LOAD, 0);
        regs.write(RELOAD, u32::MAX);
        regs.write(EN, 1);
        regs.write(UPDATE_VALUE, 1);
        let start = regs.read(VALUE);

        Self {
            regs: RefCell::new(regs),
            ticks_per_us: (sys_clk_hz / 1_000_000).max(1),
            last: Cell::new(start),
            elapsed: Cell::new(0),
        }
    }

    /// Cycles since construction.
    pub fn ticks(&self) -> u64 {
        let value = {
            let mut regs = self.regs.borrow_mut();
            regs.write(UPDATE_VALUE, 1);
            regs.read(VALUE)
        };
        // Down-counter: elapsed cycles are last - now, modulo 2^32
        let delta = self.last.get().wrapping_sub(value);
        self.last.set(value);
        let elapsed = self.elapsed.get() + delta as u64;
        self.elapsed.set(elapsed);
        elapsed
    }
}

impl<R: RegisterBlock> CountingTimer for LitexTimer<R> {
    fn now_us(&self) -> u64 {
        self.ticks() / self.ticks_per_us as u64
    }
}

impl<R: RegisterBlock> Delay for LitexTimer<R> {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.ticks_per_us as u64).div_ceil(1000);
        let start = self.ticks();
        while self.ticks() - start < cycles {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down by `step` cycles every time the value is latched.
    struct SimTimer {
        value: u32,
        latched: u32,
        step: u32,
        enabled: bool,
    }

    impl RegisterBlock for SimTimer {
        fn read(&self, offset: usize) -> u32 {
            match offset {
                VALUE => self.latched,
                EN => self.enabled as u32,
                _ => 0,
            }
        }

        fn write(&mut self, offset: usize, value: u32) {
            match offset {
                EN => self.enabled = value != 0,
                RELOAD if !self.enabled => self.value = value,
                UPDATE_VALUE if self.enabled => {
                    self.latched = self.value;
                    self.value = self.value.wrapping_sub(self.step);
                }
                _ => {}
            }
        }
    }

    fn sim(step: u32) -> SimTimer {
        SimTimer {
            value: 0,
            latched: 0,
            step,
            enabled: false,
        }
    }

    #[test]
    fn counts_microseconds_at_system_clock() {
        let timer = LitexTimer::with_registers(sim(100), 100_000_000);
        // each latch advances one microsecond at 100 MHz
        let t0 = timer.now_us();
        let t1 = timer.now_us();
        assert_eq!(t1 - t0, 1);
    }

    #[test]
    fn survives_counter_wrap() {
        let timer = LitexTimer::with_registers(sim(0x8000_0000), 1_000_000);
        let a = timer.ticks();
        let b = timer.ticks();
        let c = timer.ticks();
        assert_eq!(b - a, 0x8000_0000);
        assert_eq!(c - b, 0x8000_0000);
    }

    #[test]
    fn delay_spins_for_the_requested_cycles() {
        let mut timer = LitexTimer::with_registers(sim(10), 100_000_000);
        let before = timer.ticks();
        Delay::delay_us(&mut timer, 3);
        assert!(timer.ticks() - before >= 300);
    }
}
