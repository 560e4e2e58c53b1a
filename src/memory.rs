//! Read access to the address space the checksum and verify routines scan.
//!
//! Once the flash controller is memory mapped, reading the external chip is the
//! same operation as reading any other memory, so the core routines only need
//! word and byte reads at absolute addresses.

/// Value read back from erased NOR flash
pub const ERASED: u8 = 0xFF;

/// Byte addressable memory, read one aligned word or one byte at a time.
///
/// Reads never fail: the caller guarantees the addresses are readable.
pub trait Memory {
    /// Read the little-endian word at `addr`, which is 4 byte aligned
    fn read_word(&self, addr: u32) -> u32;

    /// Read the byte at `addr`
    fn read_byte(&self, addr: u32) -> u8;
}

impl<M: Memory + ?Sized> Memory for &M {
    fn read_word(&self, addr: u32) -> u32 {
        (**self).read_word(addr)
    }

    fn read_byte(&self, addr: u32) -> u8 {
        (**self).read_byte(addr)
    }
}

/// The CPU's own address space, including the memory-mapped flash window
#[derive(Debug)]
pub struct MappedMemory {
    _private: (),
}

impl MappedMemory {
    /// # Safety
    ///
    /// Every address later read through this value must be valid for reads,
    /// and the flash window must be memory mapped whenever it is read.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Memory for MappedMemory {
    fn read_word(&self, addr: u32) -> u32 {
        // SAFETY: upheld by the caller of `MappedMemory::new`
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn read_byte(&self, addr: u32) -> u8 {
        // SAFETY: upheld by the caller of `MappedMemory::new`
        unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
    }
}

/// A byte slice placed at a given base address.
///
/// Addresses outside the slice read as erased flash, which lets a region
/// padded up to whole words be scanned without the slice being padded too.
#[derive(Debug, Clone, Copy)]
pub struct RamRegion<'a> {
    base: u32,
    bytes: &'a [u8],
}

impl<'a> RamRegion<'a> {
    pub fn new(base: u32, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address one past the last byte of the region
    pub fn end(&self) -> u32 {
        self.base.wrapping_add(self.bytes.len() as u32)
    }
}

impl Memory for RamRegion<'_> {
    fn read_word(&self, addr: u32) -> u32 {
        let mut word = [ERASED; 4];
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = self.read_byte(addr.wrapping_add(i as u32));
        }
        u32::from_le_bytes(word)
    }

    fn read_byte(&self, addr: u32) -> u8 {
        let offset = addr.wrapping_sub(self.base) as usize;
        self.bytes.get(offset).copied().unwrap_or(ERASED)
    }
}
