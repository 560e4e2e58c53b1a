//! Operations the host programming tool invokes on the loader.
//!
//! The [`Loader`] owns the flash handle, the interrupt mask and a view of the
//! address space. Every flash operation runs with interrupts masked and starts
//! by re-initializing the chip, so calls do not depend on what the previous one
//! left behind.

use core::fmt::Debug;

use crate::{
    checksum::{self, Misalignment, Verification},
    interrupt::{InterruptGuard, InterruptMask},
    memory::Memory,
};

/// Start of the octal-SPI memory-mapped window
pub const MAPPED_BASE: u32 = 0x9000_0000;

/// Turns a mapped address into an offset on the chip
pub const ADDRESS_MASK: u32 = 0x0FFF_FFFF;

/// The external flash as seen by the loader.
///
/// Each call is synchronous and blocks until the chip is done.
pub trait ExternalFlash {
    type Error: Debug;

    /// Reset the controller and the chip into indirect mode
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Program `data` at chip offset `offset`
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Erase every sector overlapping the inclusive range `start..=end`
    fn erase_sectors(&mut self, start: u32, end: u32) -> Result<(), Self::Error>;

    /// Erase the whole chip
    fn erase_chip(&mut self) -> Result<(), Self::Error>;

    /// Make the chip readable through the memory-mapped window
    fn enable_memory_mapped_mode(&mut self) -> Result<(), Self::Error>;
}

impl<F: ExternalFlash + ?Sized> ExternalFlash for &mut F {
    type Error = F::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        (**self).init()
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(offset, data)
    }

    fn erase_sectors(&mut self, start: u32, end: u32) -> Result<(), Self::Error> {
        (**self).erase_sectors(start, end)
    }

    fn erase_chip(&mut self) -> Result<(), Self::Error> {
        (**self).erase_chip()
    }

    fn enable_memory_mapped_mode(&mut self) -> Result<(), Self::Error> {
        (**self).enable_memory_mapped_mode()
    }
}

/// Result code handed back to the host
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Fail = 0,
    Ok = 1,
}

impl Status {
    pub fn of<T, E>(result: &Result<T, E>) -> Status {
        match result {
            Ok(_) => Status::Ok,
            Err(_) => Status::Fail,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Host encoding of a verify call. A failure to bring the flash up reads as
/// zero, the same as a zero checksum with no mismatch.
pub fn verify_code<E>(result: &Result<Verification, E>) -> u64 {
    match result {
        Ok(verification) => verification.pack(),
        Err(_) => Status::Fail.code() as u64,
    }
}

fn report<T, E: Debug>(_operation: &'static str, result: Result<T, E>) -> Result<T, E> {
    #[cfg(feature = "defmt")]
    if let Err(e) = &result {
        defmt::warn!("{=str} failed: {:?}", _operation, defmt::Debug2Format(e));
    }
    result
}

/// External loader for one flash chip
pub struct Loader<F, I, M> {
    flash: F,
    irq: I,
    memory: M,
    base: u32,
}

impl<F, I, M> Loader<F, I, M>
where
    F: ExternalFlash,
    I: InterruptMask,
    M: Memory,
{
    pub fn new(flash: F, irq: I, memory: M) -> Self {
        Self {
            flash,
            irq,
            memory,
            base: MAPPED_BASE,
        }
    }

    /// Use a different start for the memory-mapped window
    pub fn with_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn interrupts(&self) -> &I {
        &self.irq
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn release(self) -> (F, I, M) {
        (self.flash, self.irq, self.memory)
    }

    /// Bring the flash up and leave it memory mapped.
    ///
    /// Interrupts are left masked afterwards, on success as well as on failure.
    pub fn init(&mut self) -> Result<(), F::Error> {
        self.irq.mask();
        let result = self
            .flash
            .init()
            .and_then(|()| self.flash.enable_memory_mapped_mode())
            .map(|()| {
                // The controller can only abort memory-mapped mode after a first mapped access
                let _ = self.memory.read_word(self.base);
            });
        report("init", result)
    }

    /// Program `data` at the mapped `address`
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), F::Error> {
        let _guard = InterruptGuard::new(&mut self.irq);
        let result = self
            .flash
            .init()
            .and_then(|()| self.flash.write(address & ADDRESS_MASK, data));
        report("write", result)
    }

    /// Erase every sector between the mapped addresses `start` and `end`, both included
    pub fn sector_erase(&mut self, start: u32, end: u32) -> Result<(), F::Error> {
        let _guard = InterruptGuard::new(&mut self.irq);
        let result = self
            .flash
            .init()
            .and_then(|()| {
                self.flash
                    .erase_sectors(start & ADDRESS_MASK, end & ADDRESS_MASK)
            });
        report("sector erase", result)
    }

    /// Erase the whole chip
    pub fn mass_erase(&mut self) -> Result<(), F::Error> {
        let _guard = InterruptGuard::new(&mut self.irq);
        let result = self.flash.init().and_then(|()| self.flash.erase_chip());
        report("mass erase", result)
    }

    /// Checksum of `size` bytes at `start`, see [`checksum::checksum`].
    ///
    /// Reads the memory view as is: after [`Self::init`] that is the mapped flash.
    pub fn checksum(&mut self, start: u32, size: u32, seed: u32) -> u32 {
        let _guard = InterruptGuard::new(&mut self.irq);
        checksum::checksum(&self.memory, start, size, seed)
    }

    /// Compare the mapped flash at `address` with `reference`.
    ///
    /// The flash is re-initialized and memory mapped first; when that fails no
    /// comparison takes place.
    pub fn verify(
        &mut self,
        address: u32,
        reference: &[u8],
        misalignment: Misalignment,
    ) -> Result<Verification, F::Error> {
        let _guard = InterruptGuard::new(&mut self.irq);
        let result = self
            .flash
            .init()
            .and_then(|()| self.flash.enable_memory_mapped_mode())
            .map(|()| checksum::verify(&self.memory, address, reference, misalignment));

        #[cfg(feature = "defmt")]
        if let Ok(Verification {
            mismatch: Some(addr),
            ..
        }) = &result
        {
            defmt::debug!("Verify mismatch at {=u32:#x}", *addr);
        }
        report("verify", result)
    }
}
