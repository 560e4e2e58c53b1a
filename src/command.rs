/// W25Q64 instruction set, single SPI opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Command {
    WriteEnable = 0x06,
    WriteDisable = 0x04,
    ReadStatus1 = 0x05,
    ReadStatus2 = 0x35,
    ReadStatus3 = 0x15,
    WriteStatus1 = 0x01,
    WriteStatus2 = 0x31,

    Read = 0x03,
    ReadF = 0x0B,
    ReadQuadIo = 0xEB,

    ProgramPage = 0x02,
    SectorErase = 0x20,
    BlockErase32 = 0x52,
    BlockErase = 0xD8,
    ChipErase = 0xC7,

    ProgramEraseSuspend = 0x75,
    ProgramEraseResume = 0x7A,
    PowerDown = 0xB9,
    ReleasePowerDown = 0xAB,

    ReadJedecId = 0x9F,
    ReadUniqueId = 0x4B,
    ReadSfdp = 0x5A,

    ResetEnable = 0x66,
    ResetMemory = 0x99,

    Dummy = 0xFF,
}
