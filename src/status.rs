/// Bus status codes reported in the upper bits of the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BusStatus {
    Start = 0x08,
    RepeatedStart = 0x10,

    WriteAddressAck = 0x18,
    WriteAddressNack = 0x20,
    DataSentAck = 0x28,
    DataSentNack = 0x30,
    /// Lost arbitration in an address or data byte, or in a NOT ACK bit.
    ArbitrationLost = 0x38,

    ReadAddressAck = 0x40,
    ReadAddressNack = 0x48,
    DataReceivedAck = 0x50,
    DataReceivedNack = 0x58,

    WriteAddressed = 0x60,
    ArbitrationLostWriteAddressed = 0x68,
    GeneralCall = 0x70,
    ArbitrationLostGeneralCall = 0x78,
    SlaveDataReceivedAck = 0x80,
    SlaveDataReceivedNack = 0x88,
    GeneralCallDataAck = 0x90,
    GeneralCallDataNack = 0x98,
    /// STOP or repeated START while addressed as slave receiver.
    SlaveStop = 0xA0,

    ReadAddressed = 0xA8,
    ArbitrationLostReadAddressed = 0xB0,
    SlaveDataSentAck = 0xB8,
    SlaveDataSentNack = 0xC0,
    SlaveLastDataSent = 0xC8,

    NoInformation = 0xF8,
    BusError = 0x00,
}

impl BusStatus {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x08 => Self::Start,
            0x10 => Self::RepeatedStart,
            0x18 => Self::WriteAddressAck,
            0x20 => Self::WriteAddressNack,
            0x28 => Self::DataSentAck,
            0x30 => Self::DataSentNack,
            0x38 => Self::ArbitrationLost,
            0x40 => Self::ReadAddressAck,
            0x48 => Self::ReadAddressNack,
            0x50 => Self::DataReceivedAck,
            0x58 => Self::DataReceivedNack,
            0x60 => Self::WriteAddressed,
            0x68 => Self::ArbitrationLostWriteAddressed,
            0x70 => Self::GeneralCall,
            0x78 => Self::ArbitrationLostGeneralCall,
            0x80 => Self::SlaveDataReceivedAck,
            0x88 => Self::SlaveDataReceivedNack,
            0x90 => Self::GeneralCallDataAck,
            0x98 => Self::GeneralCallDataNack,
            0xA0 => Self::SlaveStop,
            0xA8 => Self::ReadAddressed,
            0xB0 => Self::ArbitrationLostReadAddressed,
            0xB8 => Self::SlaveDataSentAck,
            0xC0 => Self::SlaveDataSentNack,
            0xC8 => Self::SlaveLastDataSent,
            0xF8 => Self::NoInformation,
            0x00 => Self::BusError,
            _ => return None,
        })
    }

    pub const fn code(self) -> u8 {
        self as u8
    }
}
