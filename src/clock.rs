use fugit::HertzU32;

use crate::Error;

/// Fixed clock overhead of one SCL period.
pub const PROTOCOL_OVERHEAD: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Prescaler {
    Div1 = 0,
    Div4 = 1,
    Div16 = 2,
    Div64 = 3,
}

impl Prescaler {
    const ALL: [Prescaler; 4] = [Self::Div1, Self::Div4, Self::Div16, Self::Div64];

    pub const fn factor(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div4 => 4,
            Self::Div16 => 16,
            Self::Div64 => 64,
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Div1,
            1 => Self::Div4,
            2 => Self::Div16,
            _ => Self::Div64,
        }
    }
}

/// Bit rate register value and prescaler producing an SCL frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitRate {
    pub divisor: u8,
    pub prescaler: Prescaler,
}

impl BitRate {
    /// Picks the smallest prescaler whose divisor fits the 8-bit register.
    pub fn for_frequency(clock: HertzU32, frequency: HertzU32) -> Result<Self, Error> {
        let frequency = frequency.raw();
        if frequency == 0 {
            return Err(Error::InvalidFrequency);
        }

        let ticks = clock.raw() / frequency;
        let span = ticks
            .checked_sub(PROTOCOL_OVERHEAD)
            .ok_or(Error::InvalidFrequency)?;

        Prescaler::ALL
            .into_iter()
            .find_map(|prescaler| {
                let divisor = span / (2 * prescaler.factor());
                u8::try_from(divisor)
                    .ok()
                    .map(|divisor| Self { divisor, prescaler })
            })
            .ok_or(Error::InvalidFrequency)
    }

    pub fn scl_frequency(&self, clock: HertzU32) -> HertzU32 {
        let period = PROTOCOL_OVERHEAD + 2 * self.divisor as u32 * self.prescaler.factor();
        HertzU32::from_raw(clock.raw() / period)
    }
}
