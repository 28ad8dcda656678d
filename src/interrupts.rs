use super::{
    bridge::{Bridge, Shared},
    buffer::Direction,
    controller::SlaveWriter,
    registers::{Command, Register, TwiRegisters, STATUS_MASK, TWSTO},
    BusStatus, Event, State, TransmissionStatus,
};

/// Filler sent when a slave transmit callback leaves nothing to send.
const FILLER_BYTE: u8 = 0xFF;

/// Event handler: call from the two-wire interrupt vector of the bus
/// `bridge` is bound to.
pub fn handle_twi_interrupt<R: TwiRegisters, const CHSIZE: usize>(bridge: &Bridge<R, CHSIZE>) {
    let regs = bridge.registers();
    let code = regs.read(Register::Status) & STATUS_MASK;

    let Some(status) = BusStatus::from_code(code) else {
        warn!("unknown bus status {=u8:#x}", code);
        return;
    };
    trace!("bus status {}", status);

    critical_section::with(|cs| {
        let mut shared = bridge.shared(cs);
        let shared = &mut *shared;

        match status {
            BusStatus::Start | BusStatus::RepeatedStart => {
                regs.write(Register::Data, shared.address);
                reply(regs, true);
            }

            BusStatus::WriteAddressAck | BusStatus::DataSentAck => match shared.buffer.next() {
                Some(byte) => {
                    regs.write(Register::Data, byte);
                    reply(regs, true);
                }
                None => complete(bridge, shared),
            },
            BusStatus::WriteAddressNack => {
                shared.status = TransmissionStatus::AddressNack;
                stop(bridge);
            }
            BusStatus::DataSentNack => {
                shared.status = TransmissionStatus::DataNack;
                stop(bridge);
            }
            BusStatus::ArbitrationLost => {
                warn!("arbitration lost");
                shared.status = TransmissionStatus::ArbitrationLost;
                release_bus(bridge);
                bridge.notify(Event::ArbitrationLost);
            }

            BusStatus::DataReceivedAck => {
                let _ = shared.buffer.store(regs.read(Register::Data));
                reply(regs, shared.buffer.wants_more());
            }
            BusStatus::ReadAddressAck => {
                // The NACK has to be latched before the last byte arrives.
                reply(regs, shared.buffer.wants_more());
            }
            BusStatus::DataReceivedNack => {
                let _ = shared.buffer.store(regs.read(Register::Data));
                complete(bridge, shared);
            }
            BusStatus::ReadAddressNack => {
                shared.status = TransmissionStatus::AddressNack;
                stop(bridge);
            }

            BusStatus::WriteAddressed
            | BusStatus::ArbitrationLostWriteAddressed
            | BusStatus::GeneralCall
            | BusStatus::ArbitrationLostGeneralCall => {
                lost_to_addressing(bridge, shared, status);
                bridge.set_state(State::SlaveReceive);
                shared.buffer.reset(Direction::Rx);
                reply(regs, true);
                bridge.notify(Event::Addressed {
                    transmit: false,
                    general_call: matches!(
                        status,
                        BusStatus::GeneralCall | BusStatus::ArbitrationLostGeneralCall
                    ),
                });
            }
            BusStatus::SlaveDataReceivedAck | BusStatus::GeneralCallDataAck => {
                let stored = shared.buffer.store(regs.read(Register::Data));
                reply(regs, stored.is_ok());
            }
            BusStatus::SlaveDataReceivedNack | BusStatus::GeneralCallDataNack => {
                reply(regs, false);
            }
            BusStatus::SlaveStop => {
                stop(bridge);
                let size = shared.buffer.freeze(usize::MAX);
                debug!("slave received {} bytes", size);
                if let Some(on_receive) = shared.on_receive {
                    on_receive(shared.buffer.data());
                }
                bridge.notify(Event::Received { size });
                release_bus(bridge);
            }

            BusStatus::ReadAddressed | BusStatus::ArbitrationLostReadAddressed => {
                lost_to_addressing(bridge, shared, status);
                bridge.set_state(State::SlaveTransmit);
                shared.buffer.reset(Direction::Tx);
                if let Some(on_transmit) = shared.on_transmit {
                    on_transmit(&mut SlaveWriter::new(&mut shared.buffer));
                }
                if shared.buffer.is_empty() {
                    let _ = shared.buffer.push(FILLER_BYTE);
                }
                bridge.notify(Event::Addressed {
                    transmit: true,
                    general_call: false,
                });
                send_slave_byte(regs, shared);
            }
            BusStatus::SlaveDataSentAck => send_slave_byte(regs, shared),
            BusStatus::SlaveDataSentNack | BusStatus::SlaveLastDataSent => {
                reply(regs, true);
                bridge.set_state(State::Ready);
                bridge.notify(Event::Sent {
                    sent: shared.buffer.index(),
                });
            }

            BusStatus::NoInformation => {}
            BusStatus::BusError => {
                warn!("bus error, forcing stop");
                shared.status = TransmissionStatus::BusError;
                stop(bridge);
                bridge.notify(Event::BusError);
            }
        }
    });
}

fn reply<R: TwiRegisters>(regs: &R, ack: bool) {
    let command = if ack { Command::Ack } else { Command::Nack };
    regs.write(Register::Control, command.bits());
}

/// Last master byte is done: close with STOP or hold the bus for a
/// repeated START.
fn complete<R: TwiRegisters, const CHSIZE: usize>(bridge: &Bridge<R, CHSIZE>, shared: &mut Shared) {
    shared.status = TransmissionStatus::Success;

    if shared.send_stop {
        stop(bridge);
    } else {
        shared.in_rep_start = true;
        bridge
            .registers()
            .write(Register::Control, Command::RepeatedStart.bits());
        bridge.set_state(State::Ready);
    }
}

/// Another master won the bus and addressed us: the master transaction in
/// flight ends with `ArbitrationLost` before the slave one starts.
fn lost_to_addressing<R: TwiRegisters, const CHSIZE: usize>(
    bridge: &Bridge<R, CHSIZE>,
    shared: &mut Shared,
    status: BusStatus,
) {
    if matches!(
        status,
        BusStatus::ArbitrationLostWriteAddressed
            | BusStatus::ArbitrationLostGeneralCall
            | BusStatus::ArbitrationLostReadAddressed
    ) {
        warn!("arbitration lost, addressed as slave");
        shared.status = TransmissionStatus::ArbitrationLost;
        bridge.notify(Event::ArbitrationLost);
    }
}

fn send_slave_byte<R: TwiRegisters>(regs: &R, shared: &mut Shared) {
    let byte = shared.buffer.next().unwrap_or(FILLER_BYTE);
    regs.write(Register::Data, byte);
    reply(regs, shared.buffer.wants_more());
}

fn stop<R: TwiRegisters, const CHSIZE: usize>(bridge: &Bridge<R, CHSIZE>) {
    let regs = bridge.registers();
    regs.write(Register::Control, Command::Stop.bits());
    while regs.read(Register::Control) & TWSTO != 0 {
        core::hint::spin_loop();
    }
    bridge.set_state(State::Ready);
}

fn release_bus<R: TwiRegisters, const CHSIZE: usize>(bridge: &Bridge<R, CHSIZE>) {
    reply(bridge.registers(), true);
    bridge.set_state(State::Ready);
}
