use core::cell::{RefCell, RefMut};

use critical_section::{CriticalSection, Mutex};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel};
#[cfg(feature = "dump")]
use heapless::{Deque, Vec};

use super::{
    buffer::{TransferBuffer, BUFFER_SIZE},
    controller::{ReceiveCallback, TransmitCallback},
    registers::TwiRegisters,
    state_holder::StateHolder,
    Event, Role, State, TransmissionStatus,
};

pub const STATES_HISTORY_SIZE: usize = 5;
#[cfg(feature = "dump")]
pub const EVENTS_HISTORY_SIZE: usize = 5;

#[cfg(feature = "dump")]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateDump {
    pub state_history: Vec<State, STATES_HISTORY_SIZE>,
    pub current_state: State,
    pub event_history: Vec<Event, EVENTS_HISTORY_SIZE>,
}

pub type EventChannel<const SZ: usize> = channel::Channel<CriticalSectionRawMutex, Event, SZ>;

/// Transaction data touched by both the caller and the interrupt handler.
pub(crate) struct Shared {
    pub began: bool,
    pub role: Role,
    pub buffer: TransferBuffer<BUFFER_SIZE>,
    /// Peer or own address, shifted, with the direction bit.
    pub address: u8,
    pub send_stop: bool,
    pub in_rep_start: bool,
    pub status: TransmissionStatus,
    pub on_receive: Option<ReceiveCallback>,
    pub on_transmit: Option<TransmitCallback>,
}

impl Shared {
    const fn new() -> Self {
        Self {
            began: false,
            role: Role::Master,
            buffer: TransferBuffer::new(),
            address: 0,
            send_stop: true,
            in_rep_start: false,
            status: TransmissionStatus::Success,
            on_receive: None,
            on_transmit: None,
        }
    }
}

/// State of one physical bus, shared between [`Twi`](crate::Twi) handles and
/// the interrupt handler. Meant to live in a `static`.
pub struct Bridge<R: TwiRegisters, const CHSIZE: usize> {
    registers: R,
    channel: EventChannel<CHSIZE>,
    state_holder: StateHolder<STATES_HISTORY_SIZE>,
    shared: Mutex<RefCell<Shared>>,
    #[cfg(feature = "dump")]
    events_history: Mutex<RefCell<Deque<Event, EVENTS_HISTORY_SIZE>>>,
}

impl<R: TwiRegisters, const CHSIZE: usize> Bridge<R, CHSIZE> {
    pub const fn new(registers: R) -> Self {
        Self {
            registers,
            channel: EventChannel::new(),
            state_holder: StateHolder::new(),
            shared: Mutex::new(RefCell::new(Shared::new())),
            #[cfg(feature = "dump")]
            events_history: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub fn registers(&self) -> &R {
        &self.registers
    }

    pub fn get_state(&self) -> State {
        self.state_holder.get_state()
    }

    pub(crate) fn set_state(&self, state: State) {
        self.state_holder.set_state(state)
    }

    pub(crate) fn claim(&self, state: State) -> Result<(), State> {
        self.state_holder.claim(state)
    }

    pub(crate) fn shared<'cs>(&'cs self, cs: CriticalSection<'cs>) -> RefMut<'cs, Shared> {
        self.shared.borrow_ref_mut(cs)
    }

    pub(crate) fn notify(&self, event: Event) {
        #[cfg(feature = "dump")]
        critical_section::with(|cs| {
            let mut h = self.events_history.borrow_ref_mut(cs);
            if h.is_full() {
                h.pop_front();
            }
            let _ = h.push_back(event);
        });

        if self.channel.try_send(event).is_err() {
            warn!("event channel full, dropping {}", event);
        }
    }

    pub async fn receive(&self) -> Event {
        self.channel.receive().await
    }

    pub fn try_receive(&self) -> Option<Event> {
        self.channel.try_receive().ok()
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> StateDump {
        critical_section::with(|cs| StateDump {
            state_history: self.state_holder.get_history(cs).iter().copied().collect(),
            current_state: self.get_state(),
            event_history: self.events_history.borrow_ref(cs).iter().copied().collect(),
        })
    }
}
