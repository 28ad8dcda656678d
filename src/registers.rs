use core::ptr;

/// The six registers of a two-wire peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Bit rate divisor (TWBR).
    BitRate,
    /// Bus status code and prescaler bits (TWSR).
    Status,
    /// Own slave address and general call enable (TWAR).
    OwnAddress,
    /// Shift register for the byte on the wire (TWDR).
    Data,
    /// Control bits (TWCR).
    Control,
    /// Own address mask (TWAMR).
    AddressMask,
}

/// Byte-wide access to the peripheral registers.
///
/// Reads must not be cached: the hardware changes `Status`, `Data` and
/// `Control` between accesses.
pub trait TwiRegisters {
    fn read(&self, reg: Register) -> u8;

    fn write(&self, reg: Register, value: u8);

    fn modify(&self, reg: Register, f: impl FnOnce(u8) -> u8) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }
}

pub const TWINT: u8 = 1 << 7;
pub const TWEA: u8 = 1 << 6;
pub const TWSTA: u8 = 1 << 5;
pub const TWSTO: u8 = 1 << 4;
pub const TWWC: u8 = 1 << 3;
pub const TWEN: u8 = 1 << 2;
pub const TWIE: u8 = 1 << 0;

/// Upper five bits of the status register carry the bus status code.
pub const STATUS_MASK: u8 = 0xF8;
/// Lower two bits of the status register select the bit rate prescaler.
pub const PRESCALER_MASK: u8 = 0x03;
/// General call recognition bit of the own address register.
pub const TWGCE: u8 = 1 << 0;

/// Control register words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    Enable = TWEN | TWIE | TWEA,
    Ack = TWEN | TWIE | TWINT | TWEA,
    Nack = TWEN | TWIE | TWINT,
    Start = TWEN | TWIE | TWINT | TWEA | TWSTA,
    // Interrupt stays off: the next transaction picks the bus up from here.
    RepeatedStart = TWEN | TWINT | TWSTA,
    Stop = TWEN | TWIE | TWINT | TWEA | TWSTO,
    Disable = 0,
}

impl Command {
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Memory-mapped register block.
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    twbr: usize,
    twsr: usize,
    twar: usize,
    twdr: usize,
    twcr: usize,
    twamr: usize,
}

impl Mmio {
    /// # Safety
    ///
    /// Every address must be a valid, byte-wide peripheral register of a
    /// single two-wire interface that nothing else in the program accesses.
    pub const unsafe fn new(
        twbr: usize,
        twsr: usize,
        twar: usize,
        twdr: usize,
        twcr: usize,
        twamr: usize,
    ) -> Self {
        Self {
            twbr,
            twsr,
            twar,
            twdr,
            twcr,
            twamr,
        }
    }

    fn address(&self, reg: Register) -> *mut u8 {
        (match reg {
            Register::BitRate => self.twbr,
            Register::Status => self.twsr,
            Register::OwnAddress => self.twar,
            Register::Data => self.twdr,
            Register::Control => self.twcr,
            Register::AddressMask => self.twamr,
        }) as *mut u8
    }
}

impl TwiRegisters for Mmio {
    fn read(&self, reg: Register) -> u8 {
        unsafe { ptr::read_volatile(self.address(reg)) }
    }

    fn write(&self, reg: Register, value: u8) {
        unsafe { ptr::write_volatile(self.address(reg), value) }
    }
}

/// TWI0 of the ATmega328P / ATmega328PB.
pub const TWI0: Mmio = unsafe { Mmio::new(0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD) };

/// TWI1 of the ATmega328PB.
pub const TWI1: Mmio = unsafe { Mmio::new(0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD) };
