#![cfg_attr(not(test), no_std)]
//! External flash loader for the Winbond [W25Q64](https://www.winbond.com/hq/product/code-storage-flash-memory/serial-nor-flash/?__locale=en&partNo=W25Q64JV)
//! NOR flash behind an octal-SPI controller, using [embedded-hal](https://github.com/rust-embedded/embedded-hal).
//!
//! The crate has three layers:
//! * [`blocking::W25q64`], a command driver for the chip in indirect mode, also
//!   usable on its own through the [embedded-storage](https://github.com/rust-embedded-community/embedded-storage) traits.
//! * [`loader::Loader`], the operations a programming tool runs through the
//!   loader: init, write, sector erase, mass erase, checksum and verify.
//! * [`external_loader!`], which emits the C entry points and the
//!   [`device::StorageInfo`] descriptor the tool looks up in the loader image.
//!
//! The checksum and verify routines in [`checksum`] only read memory, so they
//! run the same against the memory-mapped flash and against a [`memory::RamRegion`].

pub mod address;
pub mod blocking;
pub mod checksum;
mod command;
pub mod device;
pub mod entry;
pub mod error;
pub mod interrupt;
pub mod loader;
pub mod mapped;
pub mod memory;
pub mod register;

pub use address::{BLOCK32_SIZE, BLOCK64_SIZE, FLASH_SIZE, PAGE_SIZE, SECTOR_SIZE};
pub use blocking::W25q64;
pub use checksum::{checksum, verify, Misalignment, Verification};
pub use loader::{ExternalFlash, Loader};
