//! Interrupt masking around flash operations.
//!
//! While the controller is being reconfigured an interrupt handler touching the
//! memory-mapped window would stall on the bus, so every flash operation runs
//! inside an [`InterruptGuard`].

/// Global interrupt mask of the core
pub trait InterruptMask {
    fn mask(&mut self);
    fn unmask(&mut self);
    fn is_masked(&self) -> bool;
}

impl<I: InterruptMask + ?Sized> InterruptMask for &mut I {
    fn mask(&mut self) {
        (**self).mask()
    }

    fn unmask(&mut self) {
        (**self).unmask()
    }

    fn is_masked(&self) -> bool {
        (**self).is_masked()
    }
}

/// Masks interrupts while alive, and puts the previous state back when dropped.
pub struct InterruptGuard<'a, I: InterruptMask> {
    irq: &'a mut I,
    was_masked: bool,
}

impl<'a, I: InterruptMask> InterruptGuard<'a, I> {
    pub fn new(irq: &'a mut I) -> Self {
        let was_masked = irq.is_masked();
        irq.mask();
        Self { irq, was_masked }
    }
}

impl<I: InterruptMask> Drop for InterruptGuard<'_, I> {
    fn drop(&mut self) {
        if !self.was_masked {
            self.irq.unmask();
        }
    }
}

/// Mask state kept in memory, for hosts and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SoftMask {
    masked: bool,
    transitions: u32,
}

impl SoftMask {
    pub fn new(masked: bool) -> Self {
        Self {
            masked,
            transitions: 0,
        }
    }

    /// Number of mask/unmask calls that changed the state
    pub fn transitions(&self) -> u32 {
        self.transitions
    }
}

impl InterruptMask for SoftMask {
    fn mask(&mut self) {
        if !self.masked {
            self.transitions += 1;
        }
        self.masked = true;
    }

    fn unmask(&mut self) {
        if self.masked {
            self.transitions += 1;
        }
        self.masked = false;
    }

    fn is_masked(&self) -> bool {
        self.masked
    }
}

#[cfg(feature = "cortex-m")]
mod cortex {
    use super::InterruptMask;
    use cortex_m::{interrupt, register::primask};

    /// PRIMASK of the running Cortex-M core
    #[derive(Debug)]
    pub struct CortexM {
        _private: (),
    }

    impl CortexM {
        /// # Safety
        ///
        /// Unmasking interrupts can break critical sections of the caller, only
        /// one instance should exist and it should be owned by the loader.
        pub const unsafe fn new() -> Self {
            Self { _private: () }
        }
    }

    impl InterruptMask for CortexM {
        fn mask(&mut self) {
            interrupt::disable();
        }

        fn unmask(&mut self) {
            // SAFETY: the loader is the only code running, see `CortexM::new`
            unsafe { interrupt::enable() }
        }

        fn is_masked(&self) -> bool {
            primask::read().is_inactive()
        }
    }
}

#[cfg(feature = "cortex-m")]
pub use cortex::CortexM;
