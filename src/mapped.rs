//! Switching the flash controller between indirect and memory-mapped mode.
//!
//! In indirect mode every access is an explicit SPI transaction issued through
//! [`embedded_hal::spi::SpiDevice`]. In memory-mapped mode the controller
//! turns CPU reads inside its address window into read instructions on its own,
//! so the chip can be read like regular memory. The controller cannot do both
//! at the same time: while mapped, the driver refuses indirect commands.

use embedded_hal::spi::ErrorType;

use crate::command::Command;

/// Number of lines used by one phase of a memory-mapped read
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lines {
    Single,
    Dual,
    Quad,
    Octal,
}

/// Read instruction the controller issues on every memory-mapped access
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRead {
    pub instruction: u8,
    pub instruction_lines: Lines,
    pub address_lines: Lines,
    /// Address width in bytes
    pub address_bytes: u8,
    /// Alternate byte sent after the address, used for the continuous read mode bits
    pub alternate: Option<u8>,
    pub dummy_cycles: u8,
    pub data_lines: Lines,
}

impl MappedRead {
    /// Fast read quad I/O, the fastest read the W25Q64 supports without QPI mode
    pub const FAST_READ_QUAD_IO: MappedRead = MappedRead {
        instruction: Command::ReadQuadIo as u8,
        instruction_lines: Lines::Single,
        address_lines: Lines::Quad,
        address_bytes: 3,
        alternate: Some(0xFF),
        dummy_cycles: 4,
        data_lines: Lines::Quad,
    };

    /// Plain fast read, usable when the quad enable bit cannot be set
    pub const FAST_READ: MappedRead = MappedRead {
        instruction: Command::ReadF as u8,
        instruction_lines: Lines::Single,
        address_lines: Lines::Single,
        address_bytes: 3,
        alternate: None,
        dummy_cycles: 8,
        data_lines: Lines::Single,
    };
}

/// A flash controller that can map the external chip into the address space.
///
/// Implemented by the board crate on top of its octal-SPI peripheral, next to
/// its [`embedded_hal::spi::SpiDevice`] implementation for indirect mode.
pub trait MemoryMapped: ErrorType {
    /// Switch the controller to memory-mapped mode using `read` for every access
    fn enter_memory_mapped(&mut self, read: MappedRead) -> Result<(), Self::Error>;

    /// Abort memory-mapped mode and go back to indirect mode
    fn exit_memory_mapped(&mut self) -> Result<(), Self::Error>;
}
