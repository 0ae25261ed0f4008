//! Memory Test Engine.
//!
//! Exercises RAM with three patterns, each run as two full passes: the
//! whole region is written first, then the whole region is read back and
//! compared. Writing everything before verifying anything is what exposes
//! retention problems and address-line faults, where two addresses alias
//! the same cell and a later write silently replaces an earlier one.
//!
//! - [`Pattern::DataBus`]: `0xAAAAAAAA` then `0x55555555` everywhere
//! - [`Pattern::Address`]: each word holds its own address
//! - [`Pattern::Data`]: a 32-bit LFSR sequence (or `seed + 1` counting)
//!
//! Expected values are regenerated during verification, so every mismatch
//! names the exact failing word. The test is destructive.

use core::ptr::{read_volatile, write_volatile};

use log::{debug, warn};

use crate::error::MemtestFailure;
use crate::hal::timer::CountingTimer;

const ONE_ZERO: u32 = 0xAAAA_AAAA;
const ZERO_ONE: u32 = 0x5555_5555;

/// Taps of a maximal-length 32-bit Galois LFSR.
const LFSR32_TAPS: u32 = 0x8020_0003;

/// Word-addressable memory under test.
pub trait WordMemory {
    /// Bus address of word 0, used to report failing addresses.
    fn base_address(&self) -> usize;

    /// Number of 32-bit words in the region.
    fn len_words(&self) -> usize;

    fn write_word(&mut self, index: usize, value: u32);

    fn read_word(&self, index: usize) -> u32;

    /// Push written data out of any caches before verification.
    fn flush(&mut self) {}
}

impl WordMemory for [u32] {
    fn base_address(&self) -> usize {
        self.as_ptr() as usize
    }

    fn len_words(&self) -> usize {
        self.len()
    }

    fn write_word(&mut self, index: usize, value: u32) {
        self[index] = value;
    }

    fn read_word(&self, index: usize) -> u32 {
        self[index]
    }
}

impl<M: WordMemory + ?Sized> WordMemory for &mut M {
    fn base_address(&self) -> usize {
        (**self).base_address()
    }

    fn len_words(&self) -> usize {
        (**self).len_words()
    }

    fn write_word(&mut self, index: usize, value: u32) {
        (**self).write_word(index, value)
    }

    fn read_word(&self, index: usize) -> u32 {
        (**self).read_word(index)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// A physical RAM window accessed with volatile loads and stores.
#[derive(Debug)]
pub struct VolatileRegion {
    base: usize,
    words: usize,
}

impl VolatileRegion {
    /// Describe `size` bytes of RAM starting at `base`.
    ///
    /// A trailing partial word is ignored.
    ///
    /// # Safety
    ///
    /// - `base` must be 4-byte aligned and the whole range mapped RAM
    /// - Nothing else (including the running program's stack and data)
    ///   may live in the range, since its contents are destroyed
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self {
            base,
            words: size / 4,
        }
    }

    fn word_ptr(&self, index: usize) -> *mut u32 {
        (self.base + index * 4) as *mut u32
    }
}

impl WordMemory for VolatileRegion {
    fn base_address(&self) -> usize {
        self.base
    }

    fn len_words(&self) -> usize {
        self.words
    }

    fn write_word(&mut self, index: usize, value: u32) {
        assert!(index < self.words);
        unsafe { write_volatile(self.word_ptr(index), value) }
    }

    fn read_word(&self, index: usize) -> u32 {
        assert!(index < self.words);
        unsafe { read_volatile(self.word_ptr(index)) }
    }

    fn flush(&mut self) {
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

/// Test pattern family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pattern {
    DataBus,
    Address,
    Data,
}

/// Knobs for a memory test run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemtestConfig {
    pub data_bus: bool,
    pub address: bool,
    pub data: bool,
    /// LFSR data pattern instead of a counting sequence.
    pub random: bool,
    /// Stop at the first mismatch instead of scanning the whole region.
    pub fail_fast: bool,
}

impl Default for MemtestConfig {
    fn default() -> Self {
        Self {
            data_bus: true,
            address: true,
            data: true,
            random: true,
            fail_fast: false,
        }
    }
}

/// One word that did not hold its pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Byte offset from the start of the region.
    pub offset: usize,
    /// Bus address of the word.
    pub address: usize,
    pub expected: u32,
    pub actual: u32,
}

impl Mismatch {
    /// Index of the failing word within the region.
    pub const fn word_index(&self) -> usize {
        self.offset / 4
    }
}

/// Summary of a passing run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemtestReport {
    pub words: usize,
    pub patterns: u32,
}

/// Outcome of a single pattern.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
struct PatternOutcome {
    errors: u32,
    first: Option<Mismatch>,
}

impl PatternOutcome {
    fn merge(&mut self, other: PatternOutcome) {
        self.errors = self.errors.saturating_add(other.errors);
        if self.first.is_none() {
            self.first = other.first;
        }
    }
}

/// Advance a Galois LFSR by one step.
pub const fn lfsr32(prev: u32) -> u32 {
    let lsb = prev & 1;
    let next = prev >> 1;
    if lsb != 0 { next ^ LFSR32_TAPS } else { next }
}

fn next_data(seed: u32, random: bool) -> u32 {
    if random {
        lfsr32(seed)
    } else {
        seed.wrapping_add(1)
    }
}

/// Run the default test (all patterns, full scan) over `mem`.
pub fn test<M: WordMemory + ?Sized>(mem: &mut M) -> Result<MemtestReport, MemtestFailure> {
    run(mem, &MemtestConfig::default())
}

/// Run the patterns enabled in `config` over `mem`.
///
/// Returns the first failure (in pattern order) together with the total
/// error count of every pattern that ran.
pub fn run<M: WordMemory + ?Sized>(
    mem: &mut M,
    config: &MemtestConfig,
) -> Result<MemtestReport, MemtestFailure> {
    let words = mem.len_words();
    debug!(
        "memtest: {} words at {:#x}, {:?}",
        words,
        mem.base_address(),
        config
    );

    let plan = [
        (Pattern::DataBus, config.data_bus),
        (Pattern::Address, config.address),
        (Pattern::Data, config.data),
    ];

    let mut patterns = 0;
    let mut failure: Option<MemtestFailure> = None;

    for (pattern, enabled) in plan {
        if !enabled {
            continue;
        }
        patterns += 1;

        let outcome = match pattern {
            Pattern::DataBus => data_bus(mem, config.fail_fast),
            Pattern::Address => address(mem, config.fail_fast),
            Pattern::Data => data(mem, config.random, config.fail_fast),
        };

        if let Some(first) = outcome.first {
            warn!(
                "memtest: {:?} failed at {:#x}: expected {:#010x}, read {:#010x} ({} errors)",
                pattern, first.address, first.expected, first.actual, outcome.errors
            );
            match failure.as_mut() {
                Some(failure) => failure.errors = failure.errors.saturating_add(outcome.errors),
                None => {
                    failure = Some(MemtestFailure {
                        pattern,
                        first,
                        errors: outcome.errors,
                    })
                }
            }
            if config.fail_fast {
                break;
            }
        }
    }

    match failure {
        Some(failure) => Err(failure),
        None => Ok(MemtestReport { words, patterns }),
    }
}

/// Write `value_at(i)` to every word, then verify every word.
fn two_pass<M: WordMemory + ?Sized>(
    mem: &mut M,
    fail_fast: bool,
    mut value_at: impl FnMut(usize) -> u32,
    mut expected_at: impl FnMut(usize) -> u32,
) -> PatternOutcome {
    let words = mem.len_words();
    for index in 0..words {
        mem.write_word(index, value_at(index));
    }
    mem.flush();

    let mut outcome = PatternOutcome::default();
    for index in 0..words {
        let expected = expected_at(index);
        let actual = mem.read_word(index);
        if actual == expected {
            continue;
        }
        outcome.errors = outcome.errors.saturating_add(1);
        if outcome.first.is_none() {
            outcome.first = Some(Mismatch {
                offset: index * 4,
                address: mem.base_address() + index * 4,
                expected,
                actual,
            });
        }
        if fail_fast {
            break;
        }
    }
    outcome
}

fn data_bus<M: WordMemory + ?Sized>(mem: &mut M, fail_fast: bool) -> PatternOutcome {
    let mut outcome = PatternOutcome::default();
    for value in [ONE_ZERO, ZERO_ONE] {
        outcome.merge(two_pass(mem, fail_fast, |_| value, |_| value));
        if fail_fast && outcome.first.is_some() {
            break;
        }
    }
    outcome
}

fn address<M: WordMemory + ?Sized>(mem: &mut M, fail_fast: bool) -> PatternOutcome {
    let base = mem.base_address();
    let value = move |index: usize| (base + index * 4) as u32;
    two_pass(mem, fail_fast, value, value)
}

fn data<M: WordMemory + ?Sized>(mem: &mut M, random: bool, fail_fast: bool) -> PatternOutcome {
    let mut write_seed = 1u32;
    let mut verify_seed = 1u32;
    two_pass(
        mem,
        fail_fast,
        |_| {
            write_seed = next_data(write_seed, random);
            write_seed
        },
        |_| {
            verify_seed = next_data(verify_seed, random);
            verify_seed
        },
    )
}

/// Measured memory throughput.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemSpeed {
    pub write_bytes_per_sec: u64,
    pub read_bytes_per_sec: u64,
}

/// Time one full write sweep and one full read sweep over `mem`.
pub fn measure_speed<M, T>(mem: &mut M, timer: &T) -> MemSpeed
where
    M: WordMemory + ?Sized,
    T: CountingTimer + ?Sized,
{
    let words = mem.len_words();
    let bytes = (words * 4) as u64;

    let start = timer.now_us();
    for index in 0..words {
        mem.write_word(index, index as u32);
    }
    mem.flush();
    let write_us = timer.now_us().wrapping_sub(start).max(1);

    let start = timer.now_us();
    let mut sink = 0u32;
    for index in 0..words {
        sink ^= mem.read_word(index);
    }
    let read_us = timer.now_us().wrapping_sub(start).max(1);
    core::hint::black_box(sink);

    MemSpeed {
        write_bytes_per_sec: bytes * 1_000_000 / write_us,
        read_bytes_per_sec: bytes * 1_000_000 / read_us,
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::cell::Cell;
    use std::vec;
    use std::vec::Vec;

    /// Word `index` always reads back `value`.
    struct StuckWord {
        cells: Vec<u32>,
        index: usize,
        value: u32,
    }

    impl WordMemory for StuckWord {
        fn base_address(&self) -> usize {
            0x4000_0000
        }

        fn len_words(&self) -> usize {
            self.cells.len()
        }

        fn write_word(&mut self, index: usize, value: u32) {
            self.cells[index] = value;
        }

        fn read_word(&self, index: usize) -> u32 {
            if index == self.index {
                self.value
            } else {
                self.cells[index]
            }
        }
    }

    /// Address line `bit` is shorted low: words differing only in that bit
    /// share one cell.
    struct AliasedLine {
        cells: Vec<u32>,
        bit: usize,
    }

    impl WordMemory for AliasedLine {
        fn base_address(&self) -> usize {
            0x4000_0000
        }

        fn len_words(&self) -> usize {
            self.cells.len()
        }

        fn write_word(&mut self, index: usize, value: u32) {
            self.cells[index & !(1 << self.bit)] = value;
        }

        fn read_word(&self, index: usize) -> u32 {
            self.cells[index & !(1 << self.bit)]
        }
    }

    #[test]
    fn clean_region_passes_every_pattern() {
        let mut ram = vec![0u32; 1024];
        let report = test(ram.as_mut_slice()).unwrap();
        assert_eq!(report.words, 1024);
        assert_eq!(report.patterns, 3);
    }

    #[test]
    fn stuck_word_is_localized() {
        for k in [0, 17, 255] {
            let mut mem = StuckWord {
                cells: vec![0; 256],
                index: k,
                value: 0x0000_0000,
            };
            let failure = test(&mut mem).unwrap_err();
            assert_eq!(failure.first.word_index(), k);
            assert_eq!(failure.first.offset, k * 4);
            assert_eq!(failure.first.address, 0x4000_0000 + k * 4);
            assert_eq!(failure.first.actual, 0);
            assert_eq!(failure.pattern, Pattern::DataBus);
        }
    }

    #[test]
    fn full_scan_counts_every_pattern_hit() {
        let mut mem = StuckWord {
            cells: vec![0; 64],
            index: 9,
            value: 0xFFFF_FFFF,
        };
        let failure = test(&mut mem).unwrap_err();
        // Both bus sweeps, the address pattern and the LFSR word all miss.
        assert_eq!(failure.errors, 4);
    }

    #[test]
    fn fail_fast_stops_after_first_mismatch() {
        let mut mem = StuckWord {
            cells: vec![0; 64],
            index: 3,
            value: 0x1234_5678,
        };
        let config = MemtestConfig {
            fail_fast: true,
            ..MemtestConfig::default()
        };
        let failure = run(&mut mem, &config).unwrap_err();
        assert_eq!(failure.errors, 1);
        assert_eq!(failure.first.word_index(), 3);
    }

    #[test]
    fn aliasing_is_caught_by_address_pattern() {
        let mut mem = AliasedLine {
            cells: vec![0; 128],
            bit: 4,
        };
        let config = MemtestConfig {
            data_bus: false,
            data: false,
            ..MemtestConfig::default()
        };
        let failure = run(&mut mem, &config).unwrap_err();
        assert_eq!(failure.pattern, Pattern::Address);
        // Word 0 was overwritten by word 16 (bit 4 set).
        assert_eq!(failure.first.word_index(), 0);
        assert_eq!(failure.first.actual, 0x4000_0000 + 16 * 4);
        assert_eq!(failure.errors, 64);
    }

    #[test]
    fn counting_data_pattern_is_deterministic() {
        let mut ram = vec![0u32; 8];
        let config = MemtestConfig {
            data_bus: false,
            address: false,
            random: false,
            ..MemtestConfig::default()
        };
        run(ram.as_mut_slice(), &config).unwrap();
        assert_eq!(ram, vec![2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn lfsr_does_not_collapse_to_zero() {
        let mut state = 1;
        for _ in 0..10_000 {
            state = lfsr32(state);
            assert_ne!(state, 0);
        }
    }

    #[test]
    fn volatile_region_drives_real_memory() {
        let mut backing = vec![0u32; 64];
        let mut region =
            unsafe { VolatileRegion::new(backing.as_mut_ptr() as usize, backing.len() * 4) };
        let report = test(&mut region).unwrap();
        assert_eq!(report.words, 64);
    }

    #[test]
    fn speed_is_bytes_over_elapsed_time() {
        struct Ticks(Cell<u64>);
        impl CountingTimer for Ticks {
            fn now_us(&self) -> u64 {
                let now = self.0.get();
                self.0.set(now + 2);
                now
            }
        }

        let mut ram = vec![0u32; 256];
        let speed = measure_speed(ram.as_mut_slice(), &Ticks(Cell::new(0)));
        // Each sweep spans one timer step of 2us for 1 KiB.
        assert_eq!(speed.write_bytes_per_sec, 1024 * 1_000_000 / 2);
        assert_eq!(speed.read_bytes_per_sec, 1024 * 1_000_000 / 2);
    }
}
