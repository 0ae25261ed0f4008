//! Simulated SPI NOR flash.
//!
//! Models the parts of a 25-series device the driver depends on: the write
//! enable latch, page-wrapping page program that can only clear bits,
//! 4 KiB / 64 KiB / chip erase, a busy period reported through the status
//! register, and JEDEC identification. Commands take effect when chip
//! select is released, as on real parts.

use crate::hal::spi::SpiBus;
use crate::peripheral::spiflash::{opcode, Status};

/// Page size of the simulated device.
pub const PAGE_SIZE: usize = 256;

const CMD_CAPACITY: usize = 4 + PAGE_SIZE;

/// SPI NOR flash with `N` bytes of storage.
pub struct SimFlash<const N: usize> {
    memory: [u8; N],
    jedec_id: [u8; 3],

    selected: bool,
    cmd: [u8; CMD_CAPACITY],
    cmd_len: usize,
    read_pos: usize,

    wel: bool,
    busy_polls: u32,
    program_latency: u32,
    erase_latency: u32,
    stuck: bool,

    commands: u32,
    programs: u32,
    erases: u32,
}

impl<const N: usize> SimFlash<N> {
    /// Erased device reporting a Winbond-style JEDEC id.
    pub const fn new() -> Self {
        Self {
            memory: [0xFF; N],
            jedec_id: [0xEF, 0x40, 0x18],
            selected: false,
            cmd: [0; CMD_CAPACITY],
            cmd_len: 0,
            read_pos: 0,
            wel: false,
            busy_polls: 0,
            program_latency: 0,
            erase_latency: 0,
            stuck: false,
            commands: 0,
            programs: 0,
            erases: 0,
        }
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    pub fn set_jedec_id(&mut self, id: [u8; 3]) {
        self.jedec_id = id;
    }

    /// Number of status reads that report busy after each program / erase.
    pub fn set_latency(&mut self, program: u32, erase: u32) {
        self.program_latency = program;
        self.erase_latency = erase;
    }

    /// Report busy forever, as a dead or write-protected-by-hardware part.
    pub fn stick_busy(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Chip-select cycles observed.
    pub fn command_count(&self) -> u32 {
        self.commands
    }

    pub fn program_count(&self) -> u32 {
        self.programs
    }

    pub fn erase_count(&self) -> u32 {
        self.erases
    }

    pub fn write_enabled(&self) -> bool {
        self.wel
    }

    fn busy(&self) -> bool {
        self.stuck || self.busy_polls > 0
    }

    fn status(&self) -> Status {
        let mut status = Status::empty();
        status.set(Status::WIP, self.busy());
        status.set(Status::WEL, self.wel);
        status
    }

    fn address(&self) -> usize {
        (self.cmd[1] as usize) << 16 | (self.cmd[2] as usize) << 8 | self.cmd[3] as usize
    }

    fn next_out(&mut self) -> u8 {
        let pos = self.read_pos;
        self.read_pos += 1;
        match self.cmd[0] {
            opcode::READ_STATUS => {
                let status = self.status().bits();
                if !self.stuck && self.busy_polls > 0 {
                    self.busy_polls -= 1;
                }
                status
            }
            opcode::READ_ID => self.jedec_id[pos % 3],
            opcode::READ if self.cmd_len >= 4 => self.memory[(self.address() + pos) % N],
            _ => 0xFF,
        }
    }

    fn execute(&mut self) {
        if self.cmd_len == 0 {
            return;
        }
        let op = self.cmd[0];
        if self.busy() && op != opcode::READ_STATUS {
            return;
        }
        match op {
            opcode::WRITE_ENABLE => self.wel = true,
            opcode::WRITE_DISABLE => self.wel = false,
            opcode::PAGE_PROGRAM if self.wel && self.cmd_len > 4 => {
                let start = self.address() % N;
                let page = start - start % PAGE_SIZE;
                for (i, &byte) in self.cmd[4..self.cmd_len].iter().enumerate() {
                    let offset = (start % PAGE_SIZE + i) % PAGE_SIZE;
                    if let Some(cell) = self.memory.get_mut(page + offset) {
                        *cell &= byte;
                    }
                }
                self.wel = false;
                self.busy_polls = self.program_latency;
                self.programs += 1;
            }
            opcode::SECTOR_ERASE_4K if self.wel && self.cmd_len >= 4 => {
                self.erase_block(4 * 1024)
            }
            opcode::BLOCK_ERASE_64K if self.wel && self.cmd_len >= 4 => {
                self.erase_block(64 * 1024)
            }
            opcode::CHIP_ERASE if self.wel => {
                self.memory.fill(0xFF);
                self.finish_erase();
            }
            _ => {}
        }
    }

    fn erase_block(&mut self, size: usize) {
        let start = self.address() % N;
        let base = start - start % size;
        let end = (base + size).min(N);
        self.memory[base..end].fill(0xFF);
        self.finish_erase();
    }

    fn finish_erase(&mut self) {
        self.wel = false;
        self.busy_polls = self.erase_latency;
        self.erases += 1;
    }
}

impl<const N: usize> Default for SimFlash<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SpiBus for SimFlash<N> {
    fn select(&mut self) {
        self.selected = true;
        self.cmd_len = 0;
        self.read_pos = 0;
    }

    fn deselect(&mut self) {
        if self.selected {
            self.selected = false;
            self.commands += 1;
            self.execute();
        }
    }

    fn write(&mut self, data: &[u8]) {
        if !self.selected {
            return;
        }
        for &byte in data {
            if self.cmd_len < CMD_CAPACITY {
                self.cmd[self.cmd_len] = byte;
                self.cmd_len += 1;
            }
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = if self.selected && self.cmd_len > 0 {
                self.next_out()
            } else {
                0xFF
            };
        }
    }
}
