pub const BUFFER_SIZE: usize = 32;

/// Which way the bytes in a [`TransferBuffer`] are flowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Tx,
    Rx,
}

/// Fixed-capacity buffer shared by both transfer directions.
///
/// `index` is the next byte to send or store, `size` the logical length.
/// `0 <= index <= size <= N` holds outside of a master receive, where
/// `size` is the index of the byte to NACK and `index` may pass it by one.
pub struct TransferBuffer<const N: usize> {
    buf: [u8; N],
    index: usize,
    size: usize,
    direction: Direction,
}

impl<const N: usize> TransferBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            index: 0,
            size: 0,
            direction: Direction::Rx,
        }
    }

    pub fn reset(&mut self, direction: Direction) {
        self.index = 0;
        self.size = 0;
        self.direction = direction;
    }

    /// Prepares a master receive that NACKs the byte at position `last`.
    pub fn arm_receive(&mut self, last: usize) {
        self.reset(Direction::Rx);
        self.size = last;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.index)
    }

    pub fn wants_more(&self) -> bool {
        self.index < self.size
    }

    /// Appends an outgoing byte.
    pub fn push(&mut self, byte: u8) -> Result<(), ()> {
        if self.size == N {
            Err(())
        } else {
            self.buf[self.size] = byte;
            self.size += 1;
            Ok(())
        }
    }

    /// Appends as much of `bytes` as fits and returns the rest.
    pub fn extend<'a>(&mut self, bytes: &'a [u8]) -> &'a [u8] {
        let take = core::cmp::min(bytes.len(), N - self.size);
        self.buf[self.size..self.size + take].copy_from_slice(&bytes[..take]);
        self.size += take;
        &bytes[take..]
    }

    /// Stores an incoming byte at the cursor.
    pub fn store(&mut self, byte: u8) -> Result<(), ()> {
        if self.index == N {
            Err(())
        } else {
            self.buf[self.index] = byte;
            self.index += 1;
            Ok(())
        }
    }

    /// Ends a receive: the stored bytes become readable from the start.
    pub fn freeze(&mut self, limit: usize) -> usize {
        self.size = core::cmp::min(self.index, limit);
        self.index = 0;
        self.direction = Direction::Rx;
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = core::cmp::min(buf.len(), self.remaining());
        buf[..n].copy_from_slice(&self.buf[self.index..self.index + n]);
        self.index += n;
        n
    }
}

impl<const N: usize> Iterator for TransferBuffer<N> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.wants_more() {
            self.index += 1;
            Some(self.buf[self.index - 1])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, TransferBuffer};

    #[test]
    fn push_stops_at_capacity() {
        let mut buf = TransferBuffer::<4>::new();
        buf.reset(Direction::Tx);
        for b in 0..4 {
            buf.push(b).unwrap();
        }
        assert_eq!(buf.push(9), Err(()));
        assert_eq!(buf.data(), &[0, 1, 2, 3]);
    }

    #[test]
    fn extend_writes_what_fits() {
        let mut buf = TransferBuffer::<4>::new();
        buf.reset(Direction::Tx);
        buf.push(0xAA).unwrap();
        let rest = buf.extend(&[1, 2, 3, 4, 5]);
        assert_eq!(rest, &[4, 5]);
        assert_eq!(buf.data(), &[0xAA, 1, 2, 3]);
        assert_eq!(buf.extend(&[6]), &[6]);
    }

    #[test]
    fn iterates_outgoing_bytes_once() {
        let mut buf = TransferBuffer::<8>::new();
        buf.reset(Direction::Tx);
        buf.extend(&[1, 2, 3]);
        assert_eq!(buf.by_ref().collect::<std::vec::Vec<_>>(), [1, 2, 3]);
        assert_eq!(buf.next(), None);
        assert_eq!(buf.index(), 3);
    }

    #[test]
    fn master_receive_nacks_one_early() {
        let mut buf = TransferBuffer::<8>::new();
        buf.arm_receive(2);
        assert!(buf.wants_more());
        buf.store(10).unwrap();
        assert!(buf.wants_more());
        buf.store(11).unwrap();
        assert!(!buf.wants_more());
        buf.store(12).unwrap();
        assert_eq!(buf.freeze(3), 3);
        assert_eq!(buf.data(), &[10, 11, 12]);
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.direction(), Direction::Rx);
    }

    #[test]
    fn store_refuses_overflow() {
        let mut buf = TransferBuffer::<2>::new();
        buf.reset(Direction::Rx);
        buf.store(1).unwrap();
        buf.store(2).unwrap();
        assert_eq!(buf.store(3), Err(()));
        assert_eq!(buf.freeze(usize::MAX), 2);
    }

    #[test]
    fn read_advances_cursor() {
        let mut buf = TransferBuffer::<8>::new();
        buf.reset(Direction::Rx);
        for b in [5, 6, 7] {
            buf.store(b).unwrap();
        }
        buf.freeze(8);
        let mut out = [0; 2];
        assert_eq!(buf.read(&mut out), 2);
        assert_eq!(out, [5, 6]);
        assert_eq!(buf.read(&mut out), 1);
        assert_eq!(out[0], 7);
        assert_eq!(buf.read(&mut out), 0);
    }
}
