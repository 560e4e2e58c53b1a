use crate::register::JedecId;

/// All possible errors emitted by the driver
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<SpiError> {
    /// Internal Spi error
    Spi(SpiError),

    /// Invalid value passed
    Value,

    /// Address out of bound
    OutOfBounds,

    /// Address not aligned
    NotAligned,

    /// The chip is busy with a program or erase operation
    Busy,

    /// The chip stayed busy for longer than the poll budget
    Timeout,

    /// The JEDEC id read back does not belong to a W25Q64
    UnknownDevice(JedecId),

    /// An indirect command was issued while the controller is memory mapped
    MemoryMapped,
}
