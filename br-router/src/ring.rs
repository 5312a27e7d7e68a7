//! Hand-off of received packets from the capture side to the socket workers, and the pool of
//! free packet buffers they return to.

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::RtrPacket;

/// Creates a ring of the given capacity.
pub fn channel(capacity: usize) -> (RingWriter, RingReader) {
    let (tx, rx) = mpsc::channel(capacity);
    (RingWriter { tx }, RingReader { rx })
}

/// The capture side of a ring. Cloneable.
#[derive(Debug, Clone)]
pub struct RingWriter {
    tx: mpsc::Sender<RtrPacket>,
}

impl RingWriter {
    /// Writes a packet without waiting. If the ring is full or closed the packet is handed back.
    pub fn try_write(&self, pkt: RtrPacket) -> Result<(), RtrPacket> {
        self.tx.try_send(pkt).map_err(|e| match e {
            TrySendError::Full(pkt) | TrySendError::Closed(pkt) => pkt,
        })
    }

    /// Writes a packet, waiting for room. Hands the packet back if the ring is closed.
    pub async fn write(&self, pkt: RtrPacket) -> Result<(), RtrPacket> {
        self.tx.send(pkt).await.map_err(|e| e.0)
    }
}

/// The processing side of a ring.
#[derive(Debug)]
pub struct RingReader {
    rx: mpsc::Receiver<RtrPacket>,
}

impl RingReader {
    /// Waits for packets and appends at most `limit` of them to `batch`, in ring order.
    ///
    /// Returns `None` once every writer is gone and the ring is drained. Cancel safe.
    pub async fn read(&mut self, batch: &mut Vec<RtrPacket>, limit: usize) -> Option<usize> {
        match self.rx.recv_many(batch, limit.max(1)).await {
            0 => None,
            n => Some(n),
        }
    }
}

/// Bounded free list of packet buffers.
#[derive(Debug)]
pub struct PacketPool {
    free: Mutex<Vec<BytesMut>>,
    /// Maximum number of buffers kept for reuse.
    capacity: usize,
    /// Capacity of freshly allocated buffers.
    buf_size: usize,
}

impl PacketPool {
    pub fn new(capacity: usize, buf_size: usize) -> Self {
        Self { free: Mutex::new(Vec::with_capacity(capacity)), capacity, buf_size }
    }

    /// Takes a free buffer, allocating one if the pool is empty.
    pub fn acquire(&self) -> BytesMut {
        self.free.lock().pop().unwrap_or_else(|| BytesMut::with_capacity(self.buf_size))
    }

    /// Returns a buffer to the pool. Buffers beyond the pool capacity are dropped.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();

        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(buf);
        }
    }

    /// Number of free buffers.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use br_common::IfId;

    use super::*;
    use crate::Dir;

    fn packet(len: usize) -> RtrPacket {
        RtrPacket::new(BytesMut::zeroed(len), Dir::External, IfId(1))
    }

    #[tokio::test]
    async fn read_in_batches_until_closed() {
        let (writer, mut reader) = channel(16);
        for len in 1..=5 {
            writer.try_write(packet(len)).unwrap();
        }

        let mut batch = Vec::new();
        assert_eq!(reader.read(&mut batch, 3).await, Some(3));
        assert_eq!(batch.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![1, 2, 3]);

        batch.clear();
        drop(writer);
        assert_eq!(reader.read(&mut batch, 3).await, Some(2));
        assert_eq!(reader.read(&mut batch, 3).await, None);
    }

    #[tokio::test]
    async fn full_ring_hands_packet_back() {
        let (writer, _reader) = channel(1);
        writer.try_write(packet(1)).unwrap();

        let rejected = writer.try_write(packet(2)).unwrap_err();
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn pool_reuses_buffers() {
        let pool = PacketPool::new(1, 64);
        let mut a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.available(), 0);

        a.extend_from_slice(b"hello");
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 1);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert!(reused.capacity() >= 5);
    }
}
