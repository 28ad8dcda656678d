use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation, SevenBitAddress};

use crate::{controller::Idle, registers::TwiRegisters, Error, Twi, BUFFER_SIZE};

impl i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match *self {
            Self::AddressNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            Self::DataNack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            Self::ArbitrationLost => ErrorKind::ArbitrationLoss,
            Self::BusError => ErrorKind::Bus,
            Self::BufferFull | Self::OversizedRequest => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

impl<'d, R: TwiRegisters, I: Idle, const CHSIZE: usize> i2c::ErrorType for Twi<'d, R, I, CHSIZE> {
    type Error = Error;
}

/// Runs of adjacent operations of one kind go out as a single segment
/// through the transfer buffer, so each run is limited to [`BUFFER_SIZE`]
/// bytes. Segments are joined by repeated STARTs and the last one ends with
/// STOP.
impl<'d, R: TwiRegisters, I: Idle, const CHSIZE: usize> i2c::I2c<SevenBitAddress>
    for Twi<'d, R, I, CHSIZE>
{
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        check_segments(operations)?;

        let result = self.run_segments(address, operations);
        // A failed or empty segment can leave the bus held.
        let released = self.release_held_bus();
        result.and(released)
    }
}

impl<'d, R: TwiRegisters, I: Idle, const CHSIZE: usize> Twi<'d, R, I, CHSIZE> {
    fn run_segments(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Error> {
        let mut start = 0;

        while start < operations.len() {
            let end = segment_end(operations, start);
            let send_stop = end == operations.len();
            let segment = &mut operations[start..end];

            if is_read(&segment[0]) {
                let wanted: usize = segment.iter().map(operation_len).sum();
                let received = self.request_from_with(address, wanted, send_stop)?;
                if received < wanted {
                    self.last_status().into_result()?;
                    return Err(Error::Other);
                }
                for operation in segment.iter_mut() {
                    if let Operation::Read(buf) = operation {
                        self.read_bytes(buf);
                    }
                }
            } else {
                self.begin_transmission(address)?;
                for operation in segment.iter() {
                    if let Operation::Write(bytes) = operation {
                        if let Err(err) = self.write_bytes(bytes) {
                            self.cancel_transmission()?;
                            return Err(err);
                        }
                    }
                }
                self.end_transmission_with(send_stop)?;
            }

            start = end;
        }

        Ok(())
    }
}

fn is_read(operation: &Operation<'_>) -> bool {
    matches!(operation, Operation::Read(_))
}

fn operation_len(operation: &Operation<'_>) -> usize {
    match operation {
        Operation::Read(buf) => buf.len(),
        Operation::Write(bytes) => bytes.len(),
    }
}

/// One past the last operation of the segment starting at `start`.
fn segment_end(operations: &[Operation<'_>], start: usize) -> usize {
    let read = is_read(&operations[start]);
    operations[start..]
        .iter()
        .position(|op| is_read(op) != read)
        .map_or(operations.len(), |n| start + n)
}

/// Rejects a transaction with a segment too long for the buffer before
/// touching the bus.
fn check_segments(operations: &[Operation<'_>]) -> Result<(), Error> {
    let mut start = 0;

    while start < operations.len() {
        let end = segment_end(operations, start);
        let len: usize = operations[start..end].iter().map(operation_len).sum();
        if len > BUFFER_SIZE {
            return Err(if is_read(&operations[start]) {
                Error::OversizedRequest
            } else {
                Error::BufferFull
            });
        }
        start = end;
    }

    Ok(())
}
