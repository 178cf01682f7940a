//! Lock-free ring buffer between the capture callback and the pump
//!
//! Single producer (the device callback), single consumer (the session's
//! `read_into`). Capacity is fixed; when the consumer falls behind, new
//! chunks are dropped and counted rather than growing memory.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Interleaved PCM captured in one device callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    /// Interleaved samples
    pub samples: Vec<i16>,
    /// Capture time in microseconds since the device was opened
    pub timestamp: u64,
}

impl PcmChunk {
    /// Create a new chunk
    pub fn new(samples: Vec<i16>, timestamp: u64) -> Self {
        Self { samples, timestamp }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Bounded chunk queue
pub struct RingBuffer {
    queue: ArrayQueue<PcmChunk>,
    overflow_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// Push a chunk. Returns false (and counts an overflow) when full.
    pub fn push(&self, chunk: PcmChunk) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop the oldest chunk without blocking
    pub fn try_pop(&self) -> Option<PcmChunk> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Chunks dropped because the ring was full
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a ring that can be shared between threads
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

/// Consumer side that copies queued chunks into caller buffers of any size.
///
/// A chunk larger than the caller's buffer is split across reads; the
/// remainder is kept here, so no samples are lost between reads.
pub struct ChunkReader {
    ring: SharedRingBuffer,
    current: Vec<i16>,
    offset: usize,
}

impl ChunkReader {
    /// Read from `ring` into caller-sized buffers
    pub fn new(ring: SharedRingBuffer) -> Self {
        Self {
            ring,
            current: Vec::new(),
            offset: 0,
        }
    }

    /// Fill `buf` from queued samples without blocking
    pub fn read_into(&mut self, buf: &mut [i16]) -> usize {
        let mut written = 0;
        while written < buf.len() {
            if self.offset == self.current.len() {
                match self.ring.try_pop() {
                    Some(chunk) => {
                        self.current = chunk.samples;
                        self.offset = 0;
                        continue;
                    }
                    None => break,
                }
            }

            let n = (self.current.len() - self.offset).min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&self.current[self.offset..self.offset + n]);
            self.offset += n;
            written += n;
        }
        written
    }

    /// The ring being drained
    pub fn ring(&self) -> &SharedRingBuffer {
        &self.ring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = RingBuffer::new(4);

        assert!(buffer.push(PcmChunk::new(vec![0; 8], 0)));
        assert!(buffer.push(PcmChunk::new(vec![1; 8], 10)));
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.try_pop().unwrap().timestamp, 0);
        assert_eq!(buffer.try_pop().unwrap().timestamp, 10);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_is_counted_not_grown() {
        let buffer = RingBuffer::new(2);
        assert!(buffer.push(PcmChunk::new(vec![1], 0)));
        assert!(buffer.push(PcmChunk::new(vec![2], 1)));
        assert!(!buffer.push(PcmChunk::new(vec![3], 2)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(buffer.overflow_count(), 1);
    }

    #[test]
    fn test_chunk_reader_splits_and_joins_chunks() {
        let ring = create_shared_buffer(8);
        ring.push(PcmChunk::new(vec![1, 2, 3, 4, 5], 0));
        ring.push(PcmChunk::new(vec![6, 7], 1));

        let mut reader = ChunkReader::new(ring.clone());
        let mut buf = [0i16; 4];

        assert_eq!(reader.read_into(&mut buf), 4);
        assert_eq!(buf, [1, 2, 3, 4]);

        assert_eq!(reader.read_into(&mut buf), 3);
        assert_eq!(&buf[..3], &[5, 6, 7]);

        assert_eq!(reader.read_into(&mut buf), 0);
    }
}
