use atomic::{Atomic, Ordering};
#[cfg(feature = "dump")]
use core::cell::{Ref, RefCell};
#[cfg(feature = "dump")]
use critical_section::{CriticalSection, Mutex};
#[cfg(feature = "dump")]
use heapless::Deque;

use crate::State;

pub struct StateHolder<const HISTORY_SIZE: usize> {
    #[cfg(feature = "dump")]
    history: Mutex<RefCell<Deque<State, HISTORY_SIZE>>>,
    state: Atomic<State>,
}

impl<const HISTORY_SIZE: usize> StateHolder<HISTORY_SIZE> {
    pub const fn new() -> Self {
        Self {
            #[cfg(feature = "dump")]
            history: Mutex::new(RefCell::new(Deque::new())),
            state: Atomic::new(State::Ready),
        }
    }

    pub fn set_state(&self, state: State) {
        #[cfg(feature = "dump")]
        self.add_state_in_history(state);
        self.state.store(state, Ordering::SeqCst);
    }

    pub fn get_state(&self) -> State {
        self.state.load(Ordering::SeqCst)
    }

    /// Moves from `Ready` to `state`, or reports the state that is in the way.
    pub fn claim(&self, state: State) -> Result<(), State> {
        critical_section::with(|_| match self.get_state() {
            State::Ready => {
                self.set_state(state);
                Ok(())
            }
            current => Err(current),
        })
    }

    #[cfg(feature = "dump")]
    pub fn get_history<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Ref<'cs, Deque<State, HISTORY_SIZE>> {
        self.history.borrow_ref(cs)
    }

    #[cfg(feature = "dump")]
    fn add_state_in_history(&self, state: State) {
        critical_section::with(|cs| {
            let mut h = self.history.borrow_ref_mut(cs);
            if h.is_full() {
                h.pop_front();
            }
            let _ = h.push_back(state);
        });
    }
}
