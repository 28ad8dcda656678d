#![cfg_attr(not(test), no_std)]

mod fmt;

mod bridge;
mod buffer;
mod clock;
mod controller;
mod hal;
mod interrupts;
mod registers;
mod state_holder;
mod status;

#[cfg(test)]
mod testing;

pub use bridge::Bridge;
#[cfg(feature = "dump")]
pub use bridge::StateDump;
pub use buffer::{Direction, BUFFER_SIZE};
pub use clock::{BitRate, Prescaler, PROTOCOL_OVERHEAD};
pub use controller::{
    Config, Idle, ReceiveCallback, SlaveWriter, TransmitCallback, Twi, DEFAULT_FREQUENCY,
};
pub use interrupts::handle_twi_interrupt;
pub use registers::{Command, Mmio, Register, TwiRegisters, TWI0, TWI1};
pub use status::BusStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

/// Transaction state shared by the caller and the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    Ready,
    MasterTransmit,
    MasterReceive,
    SlaveReceive,
    SlaveTransmit,
}

/// Outcome of the last master transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmissionStatus {
    Success,
    AddressNack,
    DataNack,
    ArbitrationLost,
    BusError,
    Other,
}

impl TransmissionStatus {
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Success => Ok(()),
            Self::AddressNack => Err(Error::AddressNack),
            Self::DataNack => Err(Error::DataNack),
            Self::ArbitrationLost => Err(Error::ArbitrationLost),
            Self::BusError => Err(Error::BusError),
            Self::Other => Err(Error::Other),
        }
    }
}

/// Bus activity reported by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Addressed { transmit: bool, general_call: bool },
    Received { size: usize },
    Sent { sent: usize },
    ArbitrationLost,
    BusError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Operation not available in the configured role.
    RoleMismatch,
    AlreadyInitialized,
    NotInitialized,
    BufferFull,
    AddressNack,
    DataNack,
    ArbitrationLost,
    BusError,
    /// Requested more bytes than the buffer holds.
    OversizedRequest,
    /// Address does not fit in 7 bits.
    InvalidAddress,
    /// Bit rate not reachable from the system clock.
    InvalidFrequency,
    /// No master transmission has been started.
    NoTransaction,
    /// Another transaction owns the bus.
    Busy,
    Timeout,
    Other,
}
