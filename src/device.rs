//! Descriptor the host programming tool reads out of the loader image.
//!
//! The layout is fixed by the host: it locates the `StorageInfo` symbol in the
//! `.Dev_info` section and reads it as a C struct.

use crate::{
    address::{FLASH_SIZE, PAGE_SIZE, SECTOR_COUNT, SECTOR_SIZE},
    loader::MAPPED_BASE,
    memory::ERASED,
};

/// Length of the NUL padded device name field
pub const DEVICE_NAME_LEN: usize = 100;

/// Number of sector geometry entries, the last one is always the `(0, 0)` sentinel
pub const SECTOR_ENTRIES: usize = 10;

/// Kind of memory described by a [`StorageInfo`]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DeviceType {
    McuFlash = 1,
    NandFlash = 2,
    NorFlash = 3,
    Sram = 4,
    Psram = 5,
    PcCard = 6,
    SpiFlash = 7,
    I2cFlash = 8,
    Sdram = 9,
    I2cEeprom = 10,
}

/// A run of `count` sectors of `size` bytes each
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DeviceSectors {
    pub count: u32,
    pub size: u32,
}

impl DeviceSectors {
    pub const END: DeviceSectors = DeviceSectors { count: 0, size: 0 };

    pub const fn is_end(&self) -> bool {
        self.count == 0 && self.size == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct StorageInfo<const N: usize = SECTOR_ENTRIES> {
    pub device_name: [u8; DEVICE_NAME_LEN],
    pub device_type: u16,
    pub device_start_address: u32,
    pub device_size: u32,
    pub page_size: u32,
    pub erase_value: u8,
    pub sectors: [DeviceSectors; N],
}

impl<const N: usize> StorageInfo<N> {
    /// Descriptor with no sector runs yet, every entry is the sentinel
    pub const fn new(
        name: &str,
        device_type: DeviceType,
        start: u32,
        size: u32,
        page_size: u32,
        erase_value: u8,
    ) -> Self {
        Self {
            device_name: device_name(name),
            device_type: device_type as u16,
            device_start_address: start,
            device_size: size,
            page_size,
            erase_value,
            sectors: [DeviceSectors::END; N],
        }
    }

    /// Append a run of uniform sectors.
    ///
    /// Panics at compile time when the last entry would be overwritten, since
    /// it must stay the terminating sentinel.
    pub const fn with_sectors(mut self, count: u32, size: u32) -> Self {
        let mut i = 0;
        while i < N && !self.sectors[i].is_end() {
            i += 1;
        }
        assert!(i + 1 < N, "no room left for the sector table sentinel");
        self.sectors[i] = DeviceSectors { count, size };
        self
    }

    /// Device name without its NUL padding
    pub fn name(&self) -> &[u8] {
        let len = self
            .device_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DEVICE_NAME_LEN);
        &self.device_name[..len]
    }

    /// Sector runs up to, not including, the sentinel
    pub fn sector_runs(&self) -> impl Iterator<Item = &DeviceSectors> {
        self.sectors.iter().take_while(|s| !s.is_end())
    }

    /// Total size covered by the sector table
    pub fn sectors_size(&self) -> u32 {
        self.sector_runs().map(|s| s.count * s.size).sum()
    }
}

/// Copy `name` into a NUL padded field, truncated so a NUL always ends it
const fn device_name(name: &str) -> [u8; DEVICE_NAME_LEN] {
    let bytes = name.as_bytes();
    let mut field = [0u8; DEVICE_NAME_LEN];
    let mut i = 0;
    while i < bytes.len() && i < DEVICE_NAME_LEN - 1 {
        field[i] = bytes[i];
        i += 1;
    }
    field
}

/// Descriptor of a W25Q64 mapped at the octal-SPI window
pub const W25Q64_STORAGE_INFO: StorageInfo = StorageInfo::new(
    "w25q64",
    DeviceType::NorFlash,
    MAPPED_BASE,
    FLASH_SIZE,
    PAGE_SIZE,
    ERASED,
)
.with_sectors(SECTOR_COUNT, SECTOR_SIZE);
