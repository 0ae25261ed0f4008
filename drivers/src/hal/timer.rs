//! Timer Hardware Abstraction Layer.
//!
//! The BIOS has no scheduler, so time is only ever consumed by busy-waiting.
//! Drivers that need protocol timing take a [`Delay`] so tests can inject a
//! recording or no-op implementation and keep timing reproducible.

/// Busy-wait delay provider.
pub trait Delay {
    /// Spin for at least `ns` nanoseconds.
    fn delay_ns(&mut self, ns: u32);

    /// Spin for at least `us` microseconds.
    fn delay_us(&mut self, us: u32) {
        for _ in 0..us / 1000 {
            self.delay_ns(1_000_000);
        }
        self.delay_ns((us % 1000) * 1000);
    }
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_ns(&mut self, ns: u32) {
        (**self).delay_ns(ns)
    }
}

/// A free-running counter that can be read at any time.
pub trait CountingTimer {
    /// Read the current timer counter value in microseconds.
    ///
    /// This is a free-running counter that increments continuously.
    fn now_us(&self) -> u64;

    /// Busy-wait delay for the specified number of microseconds.
    ///
    /// This blocks the CPU and should only be used for short delays.
    fn delay_us(&self, us: u32) {
        let start = self.now_us();
        let duration = us as u64;

        while self.now_us().wrapping_sub(start) < duration {
            core::hint::spin_loop();
        }
    }

    /// Busy-wait delay for the specified number of milliseconds.
    fn delay_ms(&self, ms: u32) {
        self.delay_us(ms.saturating_mul(1000));
    }
}

/// Adapts a [`CountingTimer`] into a [`Delay`].
///
/// Sub-microsecond requests are rounded up to one microsecond.
pub struct TimerDelay<'a, T: CountingTimer + ?Sized> {
    timer: &'a T,
}

impl<'a, T: CountingTimer + ?Sized> TimerDelay<'a, T> {
    pub fn new(timer: &'a T) -> Self {
        Self { timer }
    }
}

impl<T: CountingTimer + ?Sized> Delay for TimerDelay<'_, T> {
    fn delay_ns(&mut self, ns: u32) {
        if ns > 0 {
            self.timer.delay_us(ns.div_ceil(1000));
        }
    }
}

/// Delay that returns immediately.
///
/// Useful for simulated buses where timing carries no meaning.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Delay that calibrates a spin loop against the CPU clock.
///
/// Used before a timer is available; accuracy depends on the loop body
/// costing roughly one cycle per iteration.
#[derive(Debug, Copy, Clone)]
pub struct CycleDelay {
    cycles_per_us: u32,
}

impl CycleDelay {
    pub const fn new(sys_clk_hz: u32) -> Self {
        let cycles_per_us = sys_clk_hz / 1_000_000;
        Self {
            cycles_per_us: if cycles_per_us == 0 { 1 } else { cycles_per_us },
        }
    }
}

impl Delay for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * self.cycles_per_us as u64).div_ceil(1000);
        for _ in 0..cycles {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Counter that advances one microsecond per read.
    struct SteppingTimer {
        now: Cell<u64>,
    }

    impl CountingTimer for SteppingTimer {
        fn now_us(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + 1);
            now
        }
    }

    #[derive(Default)]
    struct Recorder {
        total_ns: u64,
    }

    impl Delay for Recorder {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += ns as u64;
        }
    }

    #[test]
    fn counting_delay_waits_requested_span() {
        let timer = SteppingTimer { now: Cell::new(0) };
        timer.delay_us(10);
        assert!(timer.now.get() >= 10);
    }

    #[test]
    fn delay_us_accumulates_in_nanoseconds() {
        let mut delay = Recorder::default();
        delay.delay_us(2_500);
        assert_eq!(delay.total_ns, 2_500_000);
    }

    #[test]
    fn timer_delay_rounds_up_to_whole_microseconds() {
        let timer = SteppingTimer { now: Cell::new(0) };
        let mut delay = TimerDelay::new(&timer);
        delay.delay_ns(1);
        assert!(timer.now.get() >= 2);
    }
}
