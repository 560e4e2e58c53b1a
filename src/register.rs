use bit::BitIndex;

pub const WINBOND_MANUFACTURER_ID: u8 = 0xEF;
pub const W25Q64_MEMORY_TYPE: u8 = 0x40;
pub const W25Q64_CAPACITY: u8 = 0x17;

/// Identification returned by the JEDEC id instruction
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JedecId {
    pub manufacturer: u8,
    pub memory_type: u8,
    pub capacity: u8,
}

impl JedecId {
    /// Id of the W25Q64 family
    pub const W25Q64: JedecId = JedecId {
        manufacturer: WINBOND_MANUFACTURER_ID,
        memory_type: W25Q64_MEMORY_TYPE,
        capacity: W25Q64_CAPACITY,
    };

    /// Density in bytes encoded by the capacity byte
    pub fn density(&self) -> u32 {
        1u32.checked_shl(self.capacity as u32).unwrap_or(0)
    }
}

impl From<[u8; 3]> for JedecId {
    fn from(val: [u8; 3]) -> JedecId {
        JedecId {
            manufacturer: val[0],
            memory_type: val[1],
            capacity: val[2],
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister1 {
    pub status_register_protect: bool,
    pub sector_protect: bool,
    pub top_bottom_protect: bool,
    pub block_protect: u8,
    pub write_enable_latch: bool,
    pub busy: bool,
}

impl From<u8> for StatusRegister1 {
    fn from(val: u8) -> StatusRegister1 {
        StatusRegister1 {
            status_register_protect: val.bit(7),
            sector_protect: val.bit(6),
            top_bottom_protect: val.bit(5),
            block_protect: val.bit_range(2..5),
            write_enable_latch: val.bit(1),
            busy: val.bit(0),
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRegister2 {
    pub suspended: bool,
    pub complement_protect: bool,
    pub security_lock: u8,
    pub quad_enable: bool,
    pub status_register_lock: bool,
}

impl From<u8> for StatusRegister2 {
    fn from(val: u8) -> StatusRegister2 {
        StatusRegister2 {
            suspended: val.bit(7),
            complement_protect: val.bit(6),
            security_lock: val.bit_range(3..6),
            quad_enable: val.bit(1),
            status_register_lock: val.bit(0),
        }
    }
}

impl From<StatusRegister2> for u8 {
    fn from(reg: StatusRegister2) -> u8 {
        let mut val = 0u8;
        val.set_bit(7, reg.suspended);
        val.set_bit(6, reg.complement_protect);
        val.set_bit_range(3..6, reg.security_lock);
        val.set_bit(1, reg.quad_enable);
        val.set_bit(0, reg.status_register_lock);
        val
    }
}
