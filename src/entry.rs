//! C entry points of the loader image.
//!
//! The host programming tool loads the image in RAM, reads the `StorageInfo`
//! symbol and calls `Init`, `Write`, `SectorErase`, `MassErase`, `CheckSum`
//! and `Verify` by name. [`external_loader!`](crate::external_loader) emits all
//! of them for a [`Board`].

use crate::{interrupt::InterruptMask, loader::ExternalFlash, memory::Memory};

/// Board specific bring-up of the loader
pub trait Board {
    type Flash: ExternalFlash;
    type Interrupts: InterruptMask;
    /// View of the address space holding the memory-mapped flash window
    type Memory: Memory;

    /// Take the peripherals and hand over their handles. Called once, by the
    /// first entry point the host calls.
    fn bring_up() -> (Self::Flash, Self::Interrupts, Self::Memory);

    /// Configure clocks, GPIO and the memory protection unit, then reset the
    /// flash controller. Called by every `Init`, before the chip itself is
    /// initialized.
    fn reset(flash: &mut Self::Flash);
}

/// Emit the host entry points and the `StorageInfo` descriptor.
///
/// ```ignore
/// struct Nucleo;
///
/// impl Board for Nucleo {
///     type Flash = W25q64<Octospi>;
///     type Interrupts = CortexM;
///     type Memory = MappedMemory;
///
///     fn bring_up() -> (Self::Flash, Self::Interrupts, Self::Memory) {
///         // take the octal-SPI peripheral and its pins
///     }
///
///     fn reset(flash: &mut Self::Flash) {
///         // clocks, pins, controller reset
///     }
/// }
///
/// external_loader!(Nucleo, W25Q64_STORAGE_INFO);
/// ```
#[macro_export]
macro_rules! external_loader {
    ($board:ty, $info:expr) => {
        #[no_mangle]
        #[used]
        #[link_section = ".Dev_info"]
        #[allow(non_upper_case_globals)]
        pub static StorageInfo: $crate::device::StorageInfo = $info;

        type __Loader = $crate::loader::Loader<
            <$board as $crate::entry::Board>::Flash,
            <$board as $crate::entry::Board>::Interrupts,
            <$board as $crate::entry::Board>::Memory,
        >;

        static mut __LOADER: ::core::option::Option<__Loader> = ::core::option::Option::None;

        /// The loader, brought up by the first entry point called.
        ///
        /// # Safety
        ///
        /// The host never calls two entry points at the same time.
        unsafe fn __loader() -> &'static mut __Loader {
            (*::core::ptr::addr_of_mut!(__LOADER)).get_or_insert_with(|| {
                let (flash, irq, memory) = <$board as $crate::entry::Board>::bring_up();
                $crate::loader::Loader::new(flash, irq, memory)
                    .with_base(StorageInfo.device_start_address)
            })
        }

        /// # Safety
        ///
        /// `data` must be valid for reads of `len` bytes when `len` is not zero.
        unsafe fn __host_slice<'a>(data: *const u8, len: usize) -> &'a [u8] {
            if len == 0 || data.is_null() {
                return &[];
            }
            ::core::slice::from_raw_parts(data, len)
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn Init() -> i32 {
            let loader = __loader();
            <$board as $crate::entry::Board>::reset(loader.flash_mut());
            $crate::loader::Status::of(&loader.init()).code()
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn Write(address: u32, size: u32, buffer: *const u8) -> i32 {
            let data = __host_slice(buffer, size as usize);
            $crate::loader::Status::of(&__loader().write(address, data)).code()
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn SectorErase(start: u32, end: u32) -> i32 {
            $crate::loader::Status::of(&__loader().sector_erase(start, end)).code()
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn MassErase() -> i32 {
            $crate::loader::Status::of(&__loader().mass_erase()).code()
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn CheckSum(start: u32, size: u32, seed: u32) -> u32 {
            __loader().checksum(start, size, seed)
        }

        #[no_mangle]
        #[allow(non_snake_case)]
        pub unsafe extern "C" fn Verify(
            address: u32,
            buffer: u32,
            words: u32,
            misalignment: u32,
        ) -> u64 {
            let reference =
                __host_slice(buffer as usize as *const u8, words.wrapping_mul(4) as usize);
            let result = __loader().verify(
                address,
                reference,
                $crate::checksum::Misalignment(misalignment),
            );
            $crate::loader::verify_code(&result)
        }
    };
    ($board:ty) => {
        $crate::external_loader!($board, $crate::device::W25Q64_STORAGE_INFO);
    };
}
