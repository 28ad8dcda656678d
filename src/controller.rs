use fugit::HertzU32;

use crate::{
    bridge::Bridge,
    buffer::{Direction, TransferBuffer, BUFFER_SIZE},
    clock::{BitRate, Prescaler},
    registers::{Command, Register, TwiRegisters, PRESCALER_MASK, TWGCE, TWSTO, TWWC},
    Error, Event, Role, State, TransmissionStatus,
};

pub const DEFAULT_FREQUENCY: HertzU32 = HertzU32::from_raw(400_000);

/// Called in interrupt context when a slave receive ends. The slice holds
/// every byte received in the transaction.
pub type ReceiveCallback = fn(&[u8]);

/// Called in interrupt context when the slave is addressed for reading,
/// before the first byte goes out.
pub type TransmitCallback = fn(&mut SlaveWriter<'_>);

/// Called once per poll while waiting for the bus.
pub trait Idle {
    fn idle(&mut self);
}

impl<F: FnMut()> Idle for F {
    fn idle(&mut self) {
        self()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// System clock feeding the bit rate generator.
    pub clock: HertzU32,
    /// Number of polls before a wait gives up with [`Error::Timeout`].
    /// `None` waits forever.
    pub wait_limit: Option<u32>,
    /// Answer the general call address in slave role.
    pub general_call: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clock: HertzU32::from_raw(16_000_000),
            wait_limit: None,
            general_call: false,
        }
    }
}

/// Fills the transmit buffer from a [`TransmitCallback`].
pub struct SlaveWriter<'a> {
    buffer: &'a mut TransferBuffer<BUFFER_SIZE>,
}

impl<'a> SlaveWriter<'a> {
    pub(crate) fn new(buffer: &'a mut TransferBuffer<BUFFER_SIZE>) -> Self {
        Self { buffer }
    }

    pub fn write(&mut self, byte: u8) -> Result<(), Error> {
        self.buffer.push(byte).map_err(|_| Error::BufferFull)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        match self.buffer.extend(bytes) {
            [] => Ok(bytes.len()),
            _ => Err(Error::BufferFull),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Handle to one two-wire bus.
///
/// Several handles may share a [`Bridge`]; transactions are serialized on
/// the bridge state.
pub struct Twi<'d, R: TwiRegisters, I: Idle, const CHSIZE: usize> {
    bridge: &'d Bridge<R, CHSIZE>,
    config: Config,
    idle: I,
    /// This handle owns the claimed master transmission.
    open: bool,
}

impl<'d, R: TwiRegisters, const CHSIZE: usize> Twi<'d, R, fn(), CHSIZE> {
    pub fn new(bridge: &'d Bridge<R, CHSIZE>, config: Config) -> Self {
        Self::with_idle(bridge, config, core::hint::spin_loop as fn())
    }
}

impl<'d, R: TwiRegisters, I: Idle, const CHSIZE: usize> Twi<'d, R, I, CHSIZE> {
    pub fn with_idle(bridge: &'d Bridge<R, CHSIZE>, config: Config, idle: I) -> Self {
        Self {
            bridge,
            config,
            idle,
            open: false,
        }
    }

    fn regs(&self) -> &R {
        self.bridge.registers()
    }

    /// Master role at [`DEFAULT_FREQUENCY`].
    pub fn begin(&mut self) -> Result<(), Error> {
        self.begin_master(DEFAULT_FREQUENCY)
    }

    pub fn begin_master(&mut self, frequency: HertzU32) -> Result<(), Error> {
        let rate = BitRate::for_frequency(self.config.clock, frequency)?;
        self.init(Role::Master, |regs| write_bit_rate(regs, rate))
    }

    pub fn begin_slave(&mut self, address: u8) -> Result<(), Error> {
        let address = check_address(address)?;
        let general_call = if self.config.general_call { TWGCE } else { 0 };
        self.init(Role::Slave, |regs| {
            regs.write(Register::OwnAddress, address << 1 | general_call)
        })
    }

    fn init(&mut self, role: Role, configure: impl FnOnce(&R)) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            if shared.began {
                return Err(Error::AlreadyInitialized);
            }

            shared.began = true;
            shared.role = role;
            shared.in_rep_start = false;
            shared.send_stop = true;
            shared.status = TransmissionStatus::Success;
            self.bridge.set_state(State::Ready);

            configure(self.regs());
            self.regs()
                .write(Register::Control, Command::Enable.bits());
            Ok(())
        })?;

        debug!("twi started as {}", role);
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            if !shared.began {
                return Err(Error::NotInitialized);
            }

            let regs = self.regs();
            regs.write(Register::Control, Command::Disable.bits());
            regs.write(Register::OwnAddress, 0);
            regs.write(Register::AddressMask, 0);
            regs.write(Register::BitRate, 0);
            regs.modify(Register::Status, |v| v & !PRESCALER_MASK);

            shared.began = false;
            shared.role = Role::Master;
            shared.in_rep_start = false;
            self.bridge.set_state(State::Ready);
            Ok(())
        })?;

        self.open = false;
        debug!("twi stopped");
        Ok(())
    }

    pub fn role(&self) -> Role {
        critical_section::with(|cs| self.bridge.shared(cs).role)
    }

    pub fn state(&self) -> State {
        self.bridge.get_state()
    }

    pub fn last_status(&self) -> TransmissionStatus {
        critical_section::with(|cs| self.bridge.shared(cs).status)
    }

    fn require(&self, role: Role) -> Result<(), Error> {
        critical_section::with(|cs| {
            let shared = self.bridge.shared(cs);
            if shared.role != role {
                Err(Error::RoleMismatch)
            } else if !shared.began {
                Err(Error::NotInitialized)
            } else {
                Ok(())
            }
        })
    }

    pub fn set_frequency(&mut self, frequency: HertzU32) -> Result<(), Error> {
        self.require(Role::Master)?;
        let rate = BitRate::for_frequency(self.config.clock, frequency)?;
        critical_section::with(|_| write_bit_rate(self.regs(), rate));
        Ok(())
    }

    /// SCL frequency the bit rate registers currently produce.
    pub fn scl_frequency(&self) -> HertzU32 {
        let regs = self.regs();
        BitRate {
            divisor: regs.read(Register::BitRate),
            prescaler: Prescaler::from_bits(regs.read(Register::Status)),
        }
        .scl_frequency(self.config.clock)
    }

    /// Lets the slave answer every address matching the unmasked bits.
    pub fn set_address_mask(&mut self, mask: u8) -> Result<(), Error> {
        self.require(Role::Slave)?;
        let mask = check_address(mask)?;
        critical_section::with(|_| self.regs().write(Register::AddressMask, mask << 1));
        Ok(())
    }

    pub fn set_receive_callback(&mut self, callback: ReceiveCallback) {
        critical_section::with(|cs| self.bridge.shared(cs).on_receive = Some(callback));
    }

    pub fn set_transmit_callback(&mut self, callback: TransmitCallback) {
        critical_section::with(|cs| self.bridge.shared(cs).on_transmit = Some(callback));
    }

    /// Waits for the bus to be free, then opens a write to `address`.
    pub fn begin_transmission(&mut self, address: u8) -> Result<(), Error> {
        let address = self.prepare_master(address)?;
        self.acquire(State::MasterTransmit)?;
        self.arm_transmission(address);
        Ok(())
    }

    /// Like [`begin_transmission`](Self::begin_transmission) but fails with
    /// [`Error::Busy`] instead of waiting.
    pub fn try_begin_transmission(&mut self, address: u8) -> Result<(), Error> {
        let address = self.prepare_master(address)?;
        self.bridge
            .claim(State::MasterTransmit)
            .map_err(|_| Error::Busy)?;
        self.arm_transmission(address);
        Ok(())
    }

    fn prepare_master(&self, address: u8) -> Result<u8, Error> {
        self.require(Role::Master)?;
        check_address(address)
    }

    fn arm_transmission(&mut self, address: u8) {
        self.open = true;
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            shared.address = address << 1;
            shared.buffer.reset(Direction::Tx);
        });
    }

    /// Drops a transmission that was opened but not sent yet.
    pub fn cancel_transmission(&mut self) -> Result<(), Error> {
        self.require_open()?;
        self.open = false;
        self.bridge.set_state(State::Ready);
        Ok(())
    }

    /// Closes a bus left held by `end_transmission_with(false)` or
    /// `request_from_with(.., false)` with a STOP. Does nothing if the bus
    /// is not held.
    pub fn release_held_bus(&mut self) -> Result<(), Error> {
        self.require(Role::Master)?;
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            if !shared.in_rep_start || self.bridge.get_state() != State::Ready {
                return;
            }
            shared.in_rep_start = false;

            let regs = self.regs();
            regs.write(Register::Control, Command::Stop.bits());
            while regs.read(Register::Control) & TWSTO != 0 {
                core::hint::spin_loop();
            }
            debug!("held bus released");
        });
        Ok(())
    }

    fn require_open(&self) -> Result<(), Error> {
        self.require(Role::Master)?;
        if !self.open || self.bridge.get_state() != State::MasterTransmit {
            return Err(Error::NoTransaction);
        }
        Ok(())
    }

    pub fn write(&mut self, byte: u8) -> Result<(), Error> {
        self.require_open()?;
        critical_section::with(|cs| self.bridge.shared(cs).buffer.push(byte))
            .map_err(|_| Error::BufferFull)
    }

    /// Queues `bytes`. On [`Error::BufferFull`] the bytes that fit stay
    /// queued.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.require_open()?;
        let rest = critical_section::with(|cs| self.bridge.shared(cs).buffer.extend(bytes).len());
        if rest == 0 {
            Ok(bytes.len())
        } else {
            Err(Error::BufferFull)
        }
    }

    /// Queues the in-memory bytes of `value`.
    pub fn write_value<T: bytemuck::NoUninit>(&mut self, value: &T) -> Result<usize, Error> {
        self.write_bytes(bytemuck::bytes_of(value))
    }

    /// Bytes queued in the open transmission.
    pub fn queued(&self) -> usize {
        critical_section::with(|cs| self.bridge.shared(cs).buffer.size())
    }

    /// Sends the queued bytes and closes with STOP.
    pub fn end_transmission(&mut self) -> Result<(), Error> {
        self.end_transmission_with(true)
    }

    /// Sends the queued bytes. With `send_stop == false` the bus is held
    /// and the next transaction starts with a repeated START.
    pub fn end_transmission_with(&mut self, send_stop: bool) -> Result<(), Error> {
        self.require_open()?;
        self.open = false;
        self.start(send_stop);
        self.complete(State::MasterTransmit)?;
        self.last_status().into_result()
    }

    /// Reads `quantity` bytes from `address` and closes with STOP.
    pub fn request_from(&mut self, address: u8, quantity: usize) -> Result<usize, Error> {
        self.request_from_with(address, quantity, true)
    }

    /// Returns the number of bytes actually received, available through
    /// [`read`](Self::read).
    pub fn request_from_with(
        &mut self,
        address: u8,
        quantity: usize,
        send_stop: bool,
    ) -> Result<usize, Error> {
        if quantity > BUFFER_SIZE {
            return Err(Error::OversizedRequest);
        }
        let address = self.prepare_master(address)?;
        if quantity == 0 {
            return Ok(0);
        }

        self.acquire(State::MasterReceive)?;
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            shared.address = address << 1 | 1;
            shared.buffer.arm_receive(quantity - 1);
        });

        self.start(send_stop);
        self.complete(State::MasterReceive)?;

        let received = critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            match self.bridge.get_state() {
                // Lost arbitration and got addressed: the buffer belongs to
                // the slave transfer now.
                State::SlaveReceive | State::SlaveTransmit => 0,
                _ => shared.buffer.freeze(quantity),
            }
        });
        debug!("received {} of {} bytes", received, quantity);
        Ok(received)
    }

    /// Unread received bytes. Zero while the buffer holds outgoing data.
    pub fn available(&self) -> usize {
        critical_section::with(|cs| {
            let shared = self.bridge.shared(cs);
            match shared.buffer.direction() {
                Direction::Rx => shared.buffer.remaining(),
                Direction::Tx => 0,
            }
        })
    }

    /// Next received byte, `None` once everything has been read.
    pub fn read(&mut self) -> Option<u8> {
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            match shared.buffer.direction() {
                Direction::Rx => shared.buffer.next(),
                Direction::Tx => None,
            }
        })
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            match shared.buffer.direction() {
                Direction::Rx => shared.buffer.read(buf),
                Direction::Tx => 0,
            }
        })
    }

    pub async fn listen(&self) -> Event {
        self.bridge.receive().await
    }

    pub fn try_listen(&self) -> Option<Event> {
        self.bridge.try_receive()
    }

    /// Kicks off the claimed transaction, reusing a held bus if the previous
    /// one ended without STOP.
    fn start(&self, send_stop: bool) {
        critical_section::with(|cs| {
            let mut shared = self.bridge.shared(cs);
            let regs = self.regs();
            shared.send_stop = send_stop;
            shared.status = TransmissionStatus::Other;

            if shared.in_rep_start {
                shared.in_rep_start = false;
                regs.write(Register::Data, shared.address);
                while regs.read(Register::Control) & TWWC != 0 {
                    regs.write(Register::Data, shared.address);
                }
                regs.write(Register::Control, Command::Ack.bits());
            } else {
                regs.write(Register::Control, Command::Start.bits());
            }
        });
    }

    fn acquire(&mut self, state: State) -> Result<(), Error> {
        let mut polls = 0;
        while self.bridge.claim(state).is_err() {
            if self.exhausted(&mut polls) {
                warn!("timed out waiting for the bus");
                return Err(Error::Timeout);
            }
            self.idle.idle();
        }
        Ok(())
    }

    fn complete(&mut self, state: State) -> Result<(), Error> {
        let mut polls = 0;
        while self.bridge.get_state() == state {
            if self.exhausted(&mut polls) {
                warn!("transaction stalled in {}, resetting bus", state);
                self.recover();
                return Err(Error::Timeout);
            }
            self.idle.idle();
        }
        Ok(())
    }

    fn exhausted(&self, polls: &mut u32) -> bool {
        match self.config.wait_limit {
            Some(limit) if *polls >= limit => true,
            Some(_) => {
                *polls += 1;
                false
            }
            None => false,
        }
    }

    /// Restarts the peripheral, keeping its bit rate and addressing.
    fn recover(&self) {
        critical_section::with(|cs| {
            let regs = self.regs();
            let bit_rate = regs.read(Register::BitRate);
            let prescaler = regs.read(Register::Status) & PRESCALER_MASK;
            let own_address = regs.read(Register::OwnAddress);
            let mask = regs.read(Register::AddressMask);

            regs.write(Register::Control, Command::Disable.bits());
            regs.write(Register::BitRate, bit_rate);
            regs.modify(Register::Status, |v| (v & !PRESCALER_MASK) | prescaler);
            regs.write(Register::OwnAddress, own_address);
            regs.write(Register::AddressMask, mask);
            regs.write(Register::Control, Command::Enable.bits());

            let mut shared = self.bridge.shared(cs);
            shared.in_rep_start = false;
            shared.status = TransmissionStatus::Other;
            self.bridge.set_state(State::Ready);
        });
    }
}

fn check_address(address: u8) -> Result<u8, Error> {
    if address > 0x7F {
        Err(Error::InvalidAddress)
    } else {
        Ok(address)
    }
}

fn write_bit_rate<R: TwiRegisters>(regs: &R, rate: BitRate) {
    regs.write(Register::BitRate, rate.divisor);
    regs.modify(Register::Status, |v| {
        (v & !PRESCALER_MASK) | rate.prescaler.bits()
    });
}
