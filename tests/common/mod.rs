//! A simulated W25Q64 behind an octal-SPI controller.
//!
//! The chip decodes the byte stream of each transaction the way the real part
//! does, applies program and erase on chip select release, and reports busy for
//! a few status polls after each of them. The controller side tracks whether it
//! is memory mapped, and a [`MappedView`] reads the array while it is.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use embedded_hal::spi::{self, ErrorKind, Operation, SpiDevice};
use w25q64_loader::{
    mapped::{MappedRead, MemoryMapped},
    memory::Memory,
    FLASH_SIZE, PAGE_SIZE, SECTOR_SIZE,
};

pub const JEDEC_ID: [u8; 3] = [0xEF, 0x40, 0x17];
pub const BASE: u32 = 0x9000_0000;

/// Status polls answered with busy after a program or erase
pub const BUSY_POLLS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// Indirect transaction while the controller is memory mapped
    Mapped,
    /// Failure injected by the test
    Injected,
}

impl spi::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct Chip {
    pub data: Vec<u8>,
    pub jedec_id: [u8; 3],
    pub status1_protect: u8,
    pub status2: u8,
    pub status3: u8,
    pub write_enabled: bool,
    pub reset_enabled: bool,
    pub busy_polls: u32,
    /// Busy polls left on the suspended program or erase
    pub suspended_polls: Option<u32>,
    pub powered_down: bool,
    pub mapped: Option<MappedRead>,
    pub fail_transactions: bool,
    pub fail_enter_mapped: bool,

    pub resets: u32,
    pub mapped_entries: u32,
    pub programs: Vec<(u32, usize)>,
    pub sector_erases: Vec<u32>,
    pub block_erases: Vec<u32>,
    pub chip_erases: u32,
    pub ignored_while_busy: u32,
}

impl Chip {
    fn new() -> Self {
        Self {
            data: vec![0xFF; FLASH_SIZE as usize],
            jedec_id: JEDEC_ID,
            status1_protect: 0,
            status2: 0,
            status3: 0x60,
            write_enabled: false,
            reset_enabled: false,
            busy_polls: 0,
            suspended_polls: None,
            powered_down: false,
            mapped: None,
            fail_transactions: false,
            fail_enter_mapped: false,
            resets: 0,
            mapped_entries: 0,
            programs: Vec::new(),
            sector_erases: Vec::new(),
            block_erases: Vec::new(),
            chip_erases: 0,
            ignored_while_busy: 0,
        }
    }

    fn status1(&self) -> u8 {
        (self.busy_polls > 0) as u8 | ((self.write_enabled as u8) << 1) | self.status1_protect
    }

    fn status2(&self) -> u8 {
        self.status2 | ((self.suspended_polls.is_some() as u8) << 7)
    }

    /// MISO byte at `pos` of a transaction that started with `mosi[0]`
    fn respond(&mut self, mosi: &[u8], pos: usize) -> u8 {
        let Some(&cmd) = mosi.first() else {
            return 0xFF;
        };
        if pos == 0 || self.powered_down {
            return 0xFF;
        }
        let addr = || {
            (u32::from(mosi[1]) << 16 | u32::from(mosi[2]) << 8 | u32::from(mosi[3])) as usize
        };
        match cmd {
            0x05 => {
                let status = self.status1();
                self.busy_polls = self.busy_polls.saturating_sub(1);
                status
            }
            0x35 => self.status2(),
            0x15 => self.status3,
            0x9F if pos <= 3 => self.jedec_id[pos - 1],
            0x03 if pos >= 4 => self.data[(addr() + pos - 4) % self.data.len()],
            0x0B if pos >= 5 => self.data[(addr() + pos - 5) % self.data.len()],
            0x4B if pos >= 5 => 0xA0 + (pos - 5) as u8,
            0x5A if pos >= 5 => b"SFDP".get(pos - 5).copied().unwrap_or(0xFF),
            _ => 0xFF,
        }
    }

    /// Chip select released after `mosi` was clocked in
    fn release(&mut self, mosi: &[u8]) {
        let Some(&cmd) = mosi.first() else {
            return;
        };
        if self.powered_down {
            self.powered_down = cmd != 0xAB;
            return;
        }
        // Status reads and suspend are the only commands accepted while busy
        if self.busy_polls > 0 && cmd != 0x05 && cmd != 0x75 {
            self.ignored_while_busy += 1;
            return;
        }
        let reset_armed = std::mem::take(&mut self.reset_enabled);
        let addr = || {
            u32::from(mosi[1]) << 16 | u32::from(mosi[2]) << 8 | u32::from(mosi[3])
        };
        match cmd {
            0x06 => self.write_enabled = true,
            0x04 => self.write_enabled = false,
            0x66 => self.reset_enabled = true,
            0x99 if reset_armed => {
                self.write_enabled = false;
                self.resets += 1;
            }
            0x01 if self.write_enabled && mosi.len() == 2 => {
                self.status1_protect = mosi[1] & 0xFC;
                self.done(1);
            }
            0x31 if self.write_enabled && mosi.len() == 2 => {
                self.status2 = mosi[1];
                self.done(1);
            }
            0x02 if self.write_enabled && mosi.len() >= 4 => {
                let start = addr();
                let page = start & !(PAGE_SIZE - 1);
                for (i, &byte) in mosi[4..].iter().enumerate() {
                    let offset = (start - page + i as u32) % PAGE_SIZE;
                    self.data[(page + offset) as usize] &= byte;
                }
                self.programs.push((start, mosi.len() - 4));
                self.done(BUSY_POLLS);
            }
            0x20 if self.write_enabled && mosi.len() == 4 => {
                let start = addr() & !(SECTOR_SIZE - 1);
                self.fill(start, SECTOR_SIZE);
                self.sector_erases.push(start);
                self.done(BUSY_POLLS);
            }
            0x52 | 0xD8 if self.write_enabled && mosi.len() == 4 => {
                let size = if cmd == 0x52 { 0x8000 } else { 0x1_0000 };
                let start = addr() & !(size - 1);
                self.fill(start, size);
                self.block_erases.push(start);
                self.done(BUSY_POLLS);
            }
            0x75 if self.busy_polls > 0 => {
                self.suspended_polls = Some(std::mem::take(&mut self.busy_polls));
            }
            0x7A => {
                if let Some(polls) = self.suspended_polls.take() {
                    self.busy_polls = polls;
                }
            }
            0xB9 => self.powered_down = true,
            0xC7 if self.write_enabled => {
                self.data.fill(0xFF);
                self.chip_erases += 1;
                self.done(BUSY_POLLS);
            }
            _ => {}
        }
    }

    fn fill(&mut self, start: u32, len: u32) {
        self.data[start as usize..(start + len) as usize].fill(0xFF);
    }

    fn done(&mut self, busy_polls: u32) {
        self.write_enabled = false;
        self.busy_polls = busy_polls;
    }
}

/// Shared handle on the simulated chip
#[derive(Clone)]
pub struct Sim(pub Rc<RefCell<Chip>>);

impl Sim {
    pub fn new() -> Self {
        Sim(Rc::new(RefCell::new(Chip::new())))
    }

    pub fn chip(&self) -> std::cell::RefMut<'_, Chip> {
        self.0.borrow_mut()
    }

    /// Controller handle, to give to the driver
    pub fn bus(&self) -> SimBus {
        SimBus(self.0.clone())
    }

    /// Memory view of the mapped window at [`BASE`]
    pub fn view(&self) -> MappedView {
        MappedView(self.0.clone())
    }

    pub fn bytes(&self, offset: u32, len: usize) -> Vec<u8> {
        self.0.borrow().data[offset as usize..offset as usize + len].to_vec()
    }

    pub fn load(&self, offset: u32, bytes: &[u8]) {
        self.0.borrow_mut().data[offset as usize..offset as usize + bytes.len()]
            .copy_from_slice(bytes);
    }
}

pub struct SimBus(Rc<RefCell<Chip>>);

impl spi::ErrorType for SimBus {
    type Error = SimError;
}

impl SpiDevice for SimBus {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SimError> {
        let mut chip = self.0.borrow_mut();
        if chip.fail_transactions {
            return Err(SimError::Injected);
        }
        if chip.mapped.is_some() {
            return Err(SimError::Mapped);
        }

        let mut mosi: Vec<u8> = Vec::new();
        for op in operations.iter_mut() {
            match op {
                Operation::Write(words) => {
                    for &w in words.iter() {
                        mosi.push(w);
                        let pos = mosi.len() - 1;
                        chip.respond(&mosi, pos);
                    }
                }
                Operation::Read(words) => {
                    for w in words.iter_mut() {
                        mosi.push(0);
                        let pos = mosi.len() - 1;
                        *w = chip.respond(&mosi, pos);
                    }
                }
                Operation::Transfer(read, write) => {
                    for i in 0..read.len().max(write.len()) {
                        mosi.push(write.get(i).copied().unwrap_or(0));
                        let pos = mosi.len() - 1;
                        let miso = chip.respond(&mosi, pos);
                        if let Some(r) = read.get_mut(i) {
                            *r = miso;
                        }
                    }
                }
                Operation::TransferInPlace(words) => {
                    for w in words.iter_mut() {
                        mosi.push(*w);
                        let pos = mosi.len() - 1;
                        *w = chip.respond(&mosi, pos);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        chip.release(&mosi);
        Ok(())
    }
}

impl MemoryMapped for SimBus {
    fn enter_memory_mapped(&mut self, read: MappedRead) -> Result<(), SimError> {
        let mut chip = self.0.borrow_mut();
        if chip.fail_enter_mapped {
            return Err(SimError::Injected);
        }
        chip.mapped = Some(read);
        chip.mapped_entries += 1;
        Ok(())
    }

    fn exit_memory_mapped(&mut self) -> Result<(), SimError> {
        self.0.borrow_mut().mapped = None;
        Ok(())
    }
}

/// Reads of the mapped window, panics when the controller is not mapped
pub struct MappedView(Rc<RefCell<Chip>>);

impl Memory for MappedView {
    fn read_word(&self, addr: u32) -> u32 {
        let mut word = [0u8; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = self.read_byte(addr + i as u32);
        }
        u32::from_le_bytes(word)
    }

    fn read_byte(&self, addr: u32) -> u8 {
        let chip = self.0.borrow();
        assert!(chip.mapped.is_some(), "read of {addr:#x} while not memory mapped");
        chip.data[(addr - BASE) as usize]
    }
}
