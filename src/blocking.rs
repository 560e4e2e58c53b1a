use crate::{
    address::{
        Address, Block32, Block64, Page, Sector, BLOCK64_SIZE, FLASH_SIZE, PAGE_SIZE, SECTOR_SIZE,
    },
    command::Command,
    error::Error,
    mapped::{MappedRead, MemoryMapped},
    register::*,
};
use embedded_hal::spi::{Operation, SpiDevice};

/// Status polls allowed while a page program completes
pub const PAGE_PROGRAM_POLLS: u32 = 10_000;
/// Status polls allowed while a 4kB sector erase completes
pub const SECTOR_ERASE_POLLS: u32 = 500_000;
/// Status polls allowed while a 64kB block erase completes
pub const BLOCK_ERASE_POLLS: u32 = 2_000_000;
/// Status polls allowed while a chip erase completes
pub const CHIP_ERASE_POLLS: u32 = 100_000_000;
/// Status polls allowed for a status register write or a reset
pub const STATUS_WRITE_POLLS: u32 = 50_000;

/// Blocking driver for the Winbond W25Q64 NOR flash.
///
/// Commands are issued in indirect mode through the [`SpiDevice`]. Once
/// [`W25q64::enable_memory_mapped`] has been called every indirect command
/// fails with [`Error::MemoryMapped`] until the chip is re-initialized or
/// memory-mapped mode is disabled again.
pub struct W25q64<SPI> {
    spi: SPI,
    mapped: bool,
}

impl<SPI, E> W25q64<SPI>
where
    SPI: SpiDevice<Error = E>,
{
    pub const fn capacity() -> usize {
        FLASH_SIZE as usize
    }

    pub fn new(spi: SPI) -> Self {
        Self { spi, mapped: false }
    }

    /// Give back the underlying device
    pub fn release(self) -> SPI {
        self.spi
    }

    /// The underlying device, for a controller reset by the board.
    /// Call [`Self::init`] afterwards to resync the memory-mapped state.
    pub fn spi_mut(&mut self) -> &mut SPI {
        &mut self.spi
    }

    /// Whether the controller was left in memory-mapped mode
    pub fn is_memory_mapped(&self) -> bool {
        self.mapped
    }

    pub fn verify_addr(addr: Address) -> Result<u32, Error<E>> {
        let val: u32 = addr.into();
        if val >= FLASH_SIZE {
            return Err(Error::OutOfBounds);
        }
        Ok(val)
    }

    fn ensure_indirect(&self) -> Result<(), Error<E>> {
        if self.mapped {
            return Err(Error::MemoryMapped);
        }
        Ok(())
    }

    fn command_write(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.ensure_indirect()?;
        self.spi.write(bytes).map_err(Error::Spi)
    }

    fn command_transfer(&mut self, bytes: &mut [u8]) -> Result<(), Error<E>> {
        self.ensure_indirect()?;
        self.spi.transfer_in_place(bytes).map_err(Error::Spi)
    }

    fn addr_command(&mut self, addr: Address, cmd: Command) -> Result<(), Error<E>> {
        let addr_val: u32 = Self::verify_addr(addr)?;
        let cmd: [u8; 4] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
        ];
        self.command_write(&cmd)
    }

    fn write_read_base(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Error<E>> {
        self.ensure_indirect()?;
        self.spi
            .transaction(&mut [Operation::Write(write), Operation::Read(read)])
            .map_err(Error::Spi)
    }

    fn read_base(&mut self, addr: Address, cmd: Command, buff: &mut [u8]) -> Result<(), Error<E>> {
        let addr_val: u32 = Self::verify_addr(addr)?;
        let cmd: [u8; 4] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
        ];
        self.write_read_base(&cmd, buff)
    }

    fn read_base_dummy(
        &mut self,
        addr: Address,
        cmd: Command,
        buff: &mut [u8],
    ) -> Result<(), Error<E>> {
        let addr_val: u32 = Self::verify_addr(addr)?;
        let cmd: [u8; 5] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
            Command::Dummy as u8,
        ];
        let res = self.write_read_base(&cmd, buff);
        #[cfg(feature = "defmt")]
        if res.is_ok() {
            defmt::trace!("ReadF from {=u32}, {=usize}", addr.0, buff.len());
        } else {
            defmt::error!("ERROR READ");
        }
        res
    }

    fn write_base(&mut self, addr: Address, cmd: Command, buff: &[u8]) -> Result<(), Error<E>> {
        self.ensure_indirect()?;
        let addr_val: u32 = Self::verify_addr(addr)?;
        let cmd: [u8; 4] = [
            cmd as u8,
            (addr_val >> 16) as u8,
            (addr_val >> 8) as u8,
            addr_val as u8,
        ];

        self.spi
            .transaction(&mut [Operation::Write(&cmd), Operation::Write(buff)])
            .map_err(Error::Spi)
    }

    fn prepare_write(&mut self) -> Result<(), Error<E>> {
        self.poll_busy()?;
        self.write_enable()
    }

    /// Read the busy bit, just less noisy than `read_status1().unwrap().busy`
    pub fn poll_busy(&mut self) -> Result<(), Error<E>> {
        if self.read_status1()?.busy {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Poll the busy bit until the chip is idle, at most `polls` times
    pub fn wait_ready(&mut self, polls: u32) -> Result<(), Error<E>> {
        for _ in 0..polls {
            match self.poll_busy() {
                Ok(()) => return Ok(()),
                Err(Error::Busy) => continue,
                Err(e) => return Err(e),
            }
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("Still busy after {=u32} polls", polls);
        Err(Error::Timeout)
    }

    /// Read n bytes from an address, note that you should maybe use [`Self::read_fast`] instead
    pub fn read(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        self.read_base(addr, Command::Read, buff)
    }

    /// Read n bytes quickly from an address
    pub fn read_fast(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        self.read_base_dummy(addr, Command::ReadF, buff)
    }

    /// Program up to a page starting at the start of `page`. [`Self::write_enable`] is called internally
    pub fn write_page(&mut self, sector: Sector, page: Page, buff: &[u8]) -> Result<(), Error<E>> {
        if buff.len() > PAGE_SIZE as usize {
            return Err(Error::Value);
        }
        let addr = Address::from_page(sector, page);
        self.prepare_write()?;
        self.write_base(addr, Command::ProgramPage, buff)?;
        self.wait_ready(PAGE_PROGRAM_POLLS)
    }

    /// Program any number of bytes, split on page boundaries
    pub fn write(&mut self, addr: Address, bytes: &[u8]) -> Result<(), Error<E>> {
        let Some(end) = addr.0.checked_add(bytes.len() as u32) else {
            return Err(Error::OutOfBounds);
        };
        if end > FLASH_SIZE {
            return Err(Error::OutOfBounds);
        }

        let mut cursor = addr;
        let mut bytes = bytes;

        self.wait_ready(PAGE_PROGRAM_POLLS)?;

        while !bytes.is_empty() {
            // Only the remainder of the current page can be sent in one program
            let page_remain = (PAGE_SIZE - cursor.page_offset()) as usize;
            let (now, later) = bytes.split_at(page_remain.min(bytes.len()));

            #[cfg(feature = "defmt")]
            defmt::trace!("Write to {=u32} len {=usize}", cursor.0, now.len());
            self.prepare_write()?;
            self.write_base(cursor, Command::ProgramPage, now)?;

            // Wait for the program to complete, to behave like a flush
            self.wait_ready(PAGE_PROGRAM_POLLS)?;

            cursor = Address(cursor.0 + now.len() as u32);
            bytes = later;
        }
        Ok(())
    }

    /// Erase a 4kB sector. [`Self::write_enable`] is called internally
    pub fn erase_sector(&mut self, sector: Sector) -> Result<(), Error<E>> {
        let addr = Address::from_sector(sector);
        self.prepare_write()?;
        self.addr_command(addr, Command::SectorErase)?;
        self.wait_ready(SECTOR_ERASE_POLLS)
    }

    /// Erase a 64kB block. [`Self::write_enable`] is called internally
    pub fn erase_block64(&mut self, block: Block64) -> Result<(), Error<E>> {
        let addr = Address::from_block64(block);
        self.prepare_write()?;
        self.addr_command(addr, Command::BlockErase)?;
        self.wait_ready(BLOCK_ERASE_POLLS)
    }

    /// Erase a 32kB block. [`Self::write_enable`] is called internally
    pub fn erase_block32(&mut self, block: Block32) -> Result<(), Error<E>> {
        let addr = Address::from_block32(block);
        self.prepare_write()?;
        self.addr_command(addr, Command::BlockErase32)?;
        self.wait_ready(BLOCK_ERASE_POLLS)
    }

    /// Erase the whole chip. [`Self::write_enable`] is called internally
    pub fn erase_chip(&mut self) -> Result<(), Error<E>> {
        self.prepare_write()?;
        self.command_write(&[Command::ChipErase as u8])?;
        self.wait_ready(CHIP_ERASE_POLLS)
    }

    /// Erase every sector touched by the inclusive range `start..=end`.
    ///
    /// Whole 64kB blocks inside the range are erased with a single block erase.
    pub fn erase_range(&mut self, start: Address, end: Address) -> Result<(), Error<E>> {
        if start.0 > end.0 {
            return Err(Error::Value);
        }
        Self::verify_addr(end)?;

        let mut cursor = start.0 - start.0 % SECTOR_SIZE;
        while cursor <= end.0 {
            let block_fits = cursor % BLOCK64_SIZE == 0 && end.0 - cursor >= BLOCK64_SIZE - 1;
            if block_fits {
                #[cfg(feature = "defmt")]
                defmt::debug!("Erase block {=u32}", cursor / BLOCK64_SIZE);
                self.erase_block64(Block64((cursor / BLOCK64_SIZE) as u16))?;
                cursor += BLOCK64_SIZE;
            } else {
                #[cfg(feature = "defmt")]
                defmt::debug!("Erase sector {=u32}", cursor / SECTOR_SIZE);
                self.erase_sector(Address(cursor).sector())?;
                cursor += SECTOR_SIZE;
            }
        }
        Ok(())
    }

    /// Read using the Serial Flash Discoverable Parameter instruction
    pub fn read_sfdp(&mut self, addr: Address, buff: &mut [u8]) -> Result<(), Error<E>> {
        self.read_base_dummy(addr, Command::ReadSfdp, buff)
    }

    /// Enable write operation, though you shouldn't need this function since it's already handled in the write/erase operations.
    fn write_enable(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::WriteEnable as u8])
    }

    /// Disable write
    pub fn write_disable(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::WriteDisable as u8])
    }

    /// Read the first status register
    pub fn read_status1(&mut self) -> Result<StatusRegister1, Error<E>> {
        let mut command: [u8; 2] = [Command::ReadStatus1 as u8, 0];
        self.command_transfer(&mut command)?;
        Ok(command[1].into())
    }

    /// Read the second status register
    pub fn read_status2(&mut self) -> Result<StatusRegister2, Error<E>> {
        let mut command: [u8; 2] = [Command::ReadStatus2 as u8, 0];
        self.command_transfer(&mut command)?;
        Ok(command[1].into())
    }

    /// Read the raw third status register (write protect selection and drive strength)
    pub fn read_status3(&mut self) -> Result<u8, Error<E>> {
        let mut command: [u8; 2] = [Command::ReadStatus3 as u8, 0];
        self.command_transfer(&mut command)?;
        Ok(command[1])
    }

    /// Write the first status register from its raw value. [`Self::write_enable`] is called internally
    pub fn write_status1(&mut self, value: u8) -> Result<(), Error<E>> {
        self.prepare_write()?;
        self.command_write(&[Command::WriteStatus1 as u8, value])?;
        self.wait_ready(STATUS_WRITE_POLLS)
    }

    /// Write the second status register. [`Self::write_enable`] is called internally
    pub fn write_status2(&mut self, reg: StatusRegister2) -> Result<(), Error<E>> {
        self.prepare_write()?;
        self.command_write(&[Command::WriteStatus2 as u8, reg.into()])?;
        self.wait_ready(STATUS_WRITE_POLLS)
    }

    /// Set the quad enable bit if it is not already set, required for quad I/O reads
    pub fn enable_quad(&mut self) -> Result<(), Error<E>> {
        let reg = self.read_status2()?;
        if reg.quad_enable {
            return Ok(());
        }
        self.write_status2(StatusRegister2 {
            quad_enable: true,
            ..reg
        })
    }

    /// Read the JEDEC identification of the device
    pub fn read_jedec_id(&mut self) -> Result<JedecId, Error<E>> {
        let mut command = [Command::ReadJedecId as u8, 0, 0, 0];
        self.command_transfer(&mut command)?;
        Ok([command[1], command[2], command[3]].into())
    }

    /// Read the factory programmed 64 bit unique id
    pub fn read_unique_id(&mut self) -> Result<u64, Error<E>> {
        let dummy = Command::Dummy as u8;
        let cmd = [Command::ReadUniqueId as u8, dummy, dummy, dummy, dummy];
        let mut id = [0u8; 8];
        self.write_read_base(&cmd, &mut id)?;
        Ok(u64::from_be_bytes(id))
    }

    /// Suspend the program or erase in progress
    pub fn suspend_program_erase(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::ProgramEraseSuspend as u8])
    }

    /// Resume program erase
    pub fn resume_program_erase(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::ProgramEraseResume as u8])
    }

    /// Power down the chip, only [`Self::release_power_down`] is accepted afterwards
    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::PowerDown as u8])
    }

    /// Wake the chip from power down
    pub fn release_power_down(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::ReleasePowerDown as u8])
    }

    /// Software reset of the chip, the reset enable is sent internally
    pub fn reset(&mut self) -> Result<(), Error<E>> {
        self.command_write(&[Command::ResetEnable as u8])?;
        self.command_write(&[Command::ResetMemory as u8])
    }
}

impl<SPI, E> W25q64<SPI>
where
    SPI: SpiDevice<Error = E> + MemoryMapped,
{
    /// Bring the chip into a known state.
    ///
    /// Leaves memory-mapped mode, resets the chip, checks its id and sets the
    /// quad enable bit. Safe to call before every operation.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.disable_memory_mapped()?;
        self.reset()?;
        self.wait_ready(STATUS_WRITE_POLLS)?;

        let id = self.read_jedec_id()?;
        if id != JedecId::W25Q64 {
            #[cfg(feature = "defmt")]
            defmt::error!("Unexpected JEDEC id {:?}", id);
            return Err(Error::UnknownDevice(id));
        }
        self.enable_quad()
    }

    /// Map the chip in the controller's address window using fast read quad I/O
    pub fn enable_memory_mapped(&mut self) -> Result<(), Error<E>> {
        self.enable_memory_mapped_with(MappedRead::FAST_READ_QUAD_IO)
    }

    /// Map the chip using a specific read instruction
    pub fn enable_memory_mapped_with(&mut self, read: MappedRead) -> Result<(), Error<E>> {
        if self.mapped {
            return Ok(());
        }
        self.wait_ready(STATUS_WRITE_POLLS)?;
        self.spi.enter_memory_mapped(read).map_err(Error::Spi)?;
        self.mapped = true;
        Ok(())
    }

    /// Go back to indirect mode
    pub fn disable_memory_mapped(&mut self) -> Result<(), Error<E>> {
        if !self.mapped {
            return Ok(());
        }
        self.spi.exit_memory_mapped().map_err(Error::Spi)?;
        self.mapped = false;
        Ok(())
    }
}

/// The capability consumed by the loader, every call reinitializes the chip first.
mod capability {
    use super::*;
    use crate::loader::ExternalFlash;

    impl<SPI, E> ExternalFlash for W25q64<SPI>
    where
        SPI: SpiDevice<Error = E> + MemoryMapped,
        E: core::fmt::Debug,
    {
        type Error = Error<E>;

        fn init(&mut self) -> Result<(), Self::Error> {
            W25q64::init(self)
        }

        fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error> {
            W25q64::write(self, Address(offset), data)
        }

        fn erase_sectors(&mut self, start: u32, end: u32) -> Result<(), Self::Error> {
            self.erase_range(Address(start), Address(end))
        }

        fn erase_chip(&mut self) -> Result<(), Self::Error> {
            W25q64::erase_chip(self)
        }

        fn enable_memory_mapped_mode(&mut self) -> Result<(), Self::Error> {
            self.enable_memory_mapped()
        }
    }
}

/// Implementation of the `NorFlash` traits of the `embedded_storage` crate.
mod es {
    use super::*;
    use core::fmt::Debug;
    use embedded_storage::nor_flash::{
        check_erase, check_read, check_write, ErrorType, MultiwriteNorFlash, NorFlash,
        NorFlashError, NorFlashErrorKind, ReadNorFlash,
    };

    impl<E> From<NorFlashErrorKind> for Error<E> {
        fn from(e: NorFlashErrorKind) -> Self {
            match e {
                NorFlashErrorKind::NotAligned => Error::NotAligned,
                NorFlashErrorKind::OutOfBounds => Error::OutOfBounds,
                _ => Error::Value,
            }
        }
    }

    impl<SpiError> NorFlashError for Error<SpiError>
    where
        SpiError: Debug,
    {
        fn kind(&self) -> NorFlashErrorKind {
            match self {
                Error::OutOfBounds => NorFlashErrorKind::OutOfBounds,
                Error::NotAligned => NorFlashErrorKind::NotAligned,
                _ => NorFlashErrorKind::Other,
            }
        }
    }

    impl<SPI, E> ErrorType for W25q64<SPI>
    where
        SPI: SpiDevice<Error = E>,
        E: Debug,
    {
        type Error = Error<E>;
    }

    impl<SPI, E> ReadNorFlash for W25q64<SPI>
    where
        SPI: SpiDevice<Error = E>,
        E: Debug,
    {
        const READ_SIZE: usize = 1;

        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            check_read(self, offset, bytes.len())?;
            self.read_fast(Address(offset), bytes)
        }

        fn capacity(&self) -> usize {
            Self::capacity()
        }
    }

    impl<SPI, E> NorFlash for W25q64<SPI>
    where
        SPI: SpiDevice<Error = E>,
        E: Debug,
    {
        const WRITE_SIZE: usize = 1;
        const ERASE_SIZE: usize = SECTOR_SIZE as usize;

        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            check_erase(self, from, to)?;
            if from == to {
                return Ok(());
            }
            self.erase_range(Address(from), Address(to - 1))
        }

        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            check_write(self, offset, bytes.len())?;
            W25q64::write(self, Address(offset), bytes)
        }
    }

    impl<SPI, E> MultiwriteNorFlash for W25q64<SPI>
    where
        SPI: SpiDevice<Error = E>,
        E: Debug,
    {
    }
}
