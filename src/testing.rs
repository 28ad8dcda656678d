//! Register-level model of the two-wire peripheral for host tests.

use std::{cell::RefCell, collections::VecDeque, vec::Vec};

use crate::{
    registers::{Register, TwiRegisters, TWEA, TWEN, TWGCE, TWIE, TWINT, TWSTA, TWSTO},
    Bridge, BusStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Start,
    RepeatedStart,
    Stop,
    Address(u8),
    Data(u8),
}

#[derive(Debug, Default)]
pub struct SimPeer {
    pub address: u8,
    pub received: Vec<u8>,
    pub replies: VecDeque<u8>,
    /// ACK this many data bytes, NACK the next one.
    pub nack_after: Option<usize>,
}

impl SimPeer {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn with_replies(address: u8, replies: &[u8]) -> Self {
        Self {
            address,
            replies: replies.iter().copied().collect(),
            ..Default::default()
        }
    }
}

/// How the next arbitration is lost.
#[derive(Debug, Clone, Copy)]
enum Loss {
    Address,
    /// The winning master addresses this device.
    Addressed { read: bool },
    /// After this many data bytes of a master receive.
    AfterReads(usize),
}

#[derive(Debug)]
struct SimState {
    regs: [u8; 6],
    /// A cleared TWINT the hardware has not acted on yet.
    pending: bool,
    /// The master side of this peripheral holds the bus.
    owned: bool,
    peer: Option<usize>,
    general_call: bool,
    peers: Vec<SimPeer>,
    log: Vec<Condition>,
    loss: Option<Loss>,
    /// Data bytes clocked in by the current master receive.
    reads: usize,
    control_writes: usize,
}

pub struct SimTwi {
    inner: RefCell<SimState>,
}

fn idx(reg: Register) -> usize {
    reg as usize
}

impl SimTwi {
    pub fn new() -> Self {
        let mut regs = [0; 6];
        regs[idx(Register::Status)] = BusStatus::NoInformation.code();
        Self {
            inner: RefCell::new(SimState {
                regs,
                pending: false,
                owned: false,
                peer: None,
                general_call: false,
                peers: Vec::new(),
                log: Vec::new(),
                loss: None,
                reads: 0,
                control_writes: 0,
            }),
        }
    }

    pub fn with_peer(self, peer: SimPeer) -> Self {
        self.inner.borrow_mut().peers.push(peer);
        self
    }

    pub fn lose_next_arbitration(&self) {
        self.inner.borrow_mut().loss = Some(Loss::Address);
    }

    /// The next address phase loses to a master that addresses this device.
    pub fn lose_arbitration_addressed(&self, read: bool) {
        self.inner.borrow_mut().loss = Some(Loss::Addressed { read });
    }

    /// The next master receive loses arbitration after `bytes` data bytes.
    pub fn lose_arbitration_after_reads(&self, bytes: usize) {
        self.inner.borrow_mut().loss = Some(Loss::AfterReads(bytes));
    }

    pub fn log(&self) -> Vec<Condition> {
        self.inner.borrow().log.clone()
    }

    pub fn peer_received(&self, address: u8) -> Vec<u8> {
        let s = self.inner.borrow();
        s.peers
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.received.clone())
            .unwrap_or_default()
    }

    pub fn reg(&self, reg: Register) -> u8 {
        self.inner.borrow().regs[idx(reg)]
    }

    pub fn control_writes(&self) -> usize {
        self.inner.borrow().control_writes
    }

    /// Lets the hardware act on the last control write. Returns whether an
    /// interrupt is due.
    pub fn step(&self) -> bool {
        let mut guard = self.inner.borrow_mut();
        let s = &mut *guard;
        if !s.pending {
            return false;
        }
        s.pending = false;

        let control = s.regs[idx(Register::Control)];
        let status = s.status();

        let next = if control & TWSTA != 0 {
            s.start()
        } else {
            match BusStatus::from_code(status) {
                Some(BusStatus::Start | BusStatus::RepeatedStart) => s.address_phase(),
                Some(BusStatus::WriteAddressAck | BusStatus::DataSentAck) => {
                    let byte = s.regs[idx(Register::Data)];
                    s.log.push(Condition::Data(byte));
                    let ack = match s.peer {
                        Some(i) => {
                            let peer = &mut s.peers[i];
                            peer.received.push(byte);
                            peer.nack_after
                                .map_or(true, |n| peer.received.len() <= n)
                        }
                        None => false,
                    };
                    if ack {
                        BusStatus::DataSentAck
                    } else {
                        BusStatus::DataSentNack
                    }
                }
                Some(BusStatus::ReadAddressAck | BusStatus::DataReceivedAck) => {
                    s.read_byte(control)
                }
                // Slave side and idle bus: the remote master drives the next event.
                _ => return false,
            }
        };

        s.raise(next);
        control & TWIE != 0
    }

    /// Runs the hardware one step and services the interrupt it raised.
    pub fn pump<const CHSIZE: usize>(&self, bridge: &Bridge<&SimTwi, CHSIZE>) {
        if self.step() {
            crate::handle_twi_interrupt(bridge);
        }
    }

    /// A remote master addresses this device. Returns whether it was ACKed.
    pub fn address_slave(&self, address: u8, read: bool) -> bool {
        let mut s = self.inner.borrow_mut();
        let control = s.regs[idx(Register::Control)];
        if control & TWEN == 0 || control & TWEA == 0 {
            return false;
        }

        let own = s.regs[idx(Register::OwnAddress)];
        let mask = s.regs[idx(Register::AddressMask)] >> 1;
        let general_call = address == 0 && own & TWGCE != 0 && !read;
        let matches = (address ^ (own >> 1)) & !mask & 0x7F == 0;
        if !general_call && !matches {
            return false;
        }

        s.general_call = general_call;
        let next = match (read, general_call) {
            (true, _) => BusStatus::ReadAddressed,
            (false, true) => BusStatus::GeneralCall,
            (false, false) => BusStatus::WriteAddressed,
        };
        s.raise(next);
        true
    }

    /// The remote master writes a byte to this slave.
    pub fn master_writes(&self, byte: u8) {
        let mut s = self.inner.borrow_mut();
        s.regs[idx(Register::Data)] = byte;
        let ack = s.regs[idx(Register::Control)] & TWEA != 0;
        let next = match (s.general_call, ack) {
            (false, true) => BusStatus::SlaveDataReceivedAck,
            (false, false) => BusStatus::SlaveDataReceivedNack,
            (true, true) => BusStatus::GeneralCallDataAck,
            (true, false) => BusStatus::GeneralCallDataNack,
        };
        s.raise(next);
    }

    /// The remote master clocks out the byte this slave loaded and answers
    /// it with `ack`.
    pub fn master_reads(&self, ack: bool) -> u8 {
        let mut s = self.inner.borrow_mut();
        let byte = s.regs[idx(Register::Data)];
        let more = s.regs[idx(Register::Control)] & TWEA != 0;
        let next = match (ack, more) {
            (false, _) => BusStatus::SlaveDataSentNack,
            (true, true) => BusStatus::SlaveDataSentAck,
            (true, false) => BusStatus::SlaveLastDataSent,
        };
        s.raise(next);
        byte
    }

    pub fn master_stops(&self) {
        self.inner.borrow_mut().raise(BusStatus::SlaveStop);
    }

    pub fn bus_error(&self) {
        self.inner.borrow_mut().raise(BusStatus::BusError);
    }
}

impl SimState {
    fn status(&self) -> u8 {
        self.regs[idx(Register::Status)] & 0xF8
    }

    fn raise(&mut self, status: BusStatus) {
        let prescaler = self.regs[idx(Register::Status)] & 0x03;
        self.regs[idx(Register::Status)] = status.code() | prescaler;
        self.regs[idx(Register::Control)] |= TWINT;
    }

    fn lose(&mut self, status: BusStatus) -> BusStatus {
        self.loss = None;
        self.owned = false;
        self.peer = None;
        status
    }

    fn read_byte(&mut self, control: u8) -> BusStatus {
        if let Some(Loss::AfterReads(n)) = self.loss {
            if self.reads == n {
                return self.lose(BusStatus::ArbitrationLost);
            }
        }

        self.reads += 1;
        let byte = match self.peer {
            Some(i) => self.peers[i].replies.pop_front().unwrap_or(0xFF),
            None => 0xFF,
        };
        self.regs[idx(Register::Data)] = byte;
        if control & TWEA != 0 {
            BusStatus::DataReceivedAck
        } else {
            BusStatus::DataReceivedNack
        }
    }

    fn start(&mut self) -> BusStatus {
        self.peer = None;
        self.reads = 0;
        if self.owned {
            self.log.push(Condition::RepeatedStart);
            BusStatus::RepeatedStart
        } else {
            self.owned = true;
            self.log.push(Condition::Start);
            BusStatus::Start
        }
    }

    fn address_phase(&mut self) -> BusStatus {
        let sla = self.regs[idx(Register::Data)];
        self.log.push(Condition::Address(sla));

        match self.loss {
            Some(Loss::Address) => return self.lose(BusStatus::ArbitrationLost),
            Some(Loss::Addressed { read: true }) => {
                return self.lose(BusStatus::ArbitrationLostReadAddressed)
            }
            Some(Loss::Addressed { read: false }) => {
                return self.lose(BusStatus::ArbitrationLostWriteAddressed)
            }
            _ => {}
        }

        self.peer = self.peers.iter().position(|p| p.address == sla >> 1);
        match (self.peer.is_some(), sla & 1 != 0) {
            (true, false) => BusStatus::WriteAddressAck,
            (false, false) => BusStatus::WriteAddressNack,
            (true, true) => BusStatus::ReadAddressAck,
            (false, true) => BusStatus::ReadAddressNack,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.control_writes += 1;
        let flag = self.regs[idx(Register::Control)] & TWINT;

        if value & TWSTO != 0 {
            if self.owned {
                self.log.push(Condition::Stop);
                self.owned = false;
            }
            self.peer = None;
            self.pending = false;
            self.regs[idx(Register::Control)] = value & !(TWSTO | TWINT);
            let prescaler = self.regs[idx(Register::Status)] & 0x03;
            self.regs[idx(Register::Status)] = BusStatus::NoInformation.code() | prescaler;
            return;
        }

        if value & TWINT != 0 {
            // Writing one clears the flag.
            self.regs[idx(Register::Control)] = value & !TWINT;
            if value & TWEN == 0 {
                return;
            }
            if value & TWSTA != 0 && value & TWIE == 0 {
                // A repeated START nobody waits on completes on its own.
                let next = self.start();
                self.raise(next);
            } else {
                self.pending = true;
            }
        } else {
            self.regs[idx(Register::Control)] = value & !TWINT | flag;
            if value & TWEN == 0 {
                self.owned = false;
                self.pending = false;
            }
        }
    }
}

impl TwiRegisters for &SimTwi {
    fn read(&self, reg: Register) -> u8 {
        self.inner.borrow().regs[idx(reg)]
    }

    fn write(&self, reg: Register, value: u8) {
        let mut s = self.inner.borrow_mut();
        match reg {
            Register::Control => s.write_control(value),
            Register::Status => {
                let code = s.status();
                s.regs[idx(reg)] = code | (value & 0x03);
            }
            _ => s.regs[idx(reg)] = value,
        }
    }
}
