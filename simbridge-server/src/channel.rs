//! # Byte Channel
//!
//! A bounded single-producer, single-consumer byte queue connecting the transport thread
//! with the simulation thread.
//!
//! The queue is split into a [`Producer`] and a [`Consumer`] handle. Neither handle is
//! `Clone` and every operation takes `&mut self`, so each side has exactly one owner and
//! the single-producer/single-consumer contract is enforced by the type system.
//!
//! ## Memory Ordering
//!
//! - Producer: writes the slot, then publishes `head` with `Release`
//! - Consumer: loads `head` with `Acquire`, reads the slot, then publishes `tail` with `Release`
//!
//! Neither side ever blocks. A push into a full queue fails and the byte stays with the
//! caller, a pop from an empty queue returns `None`.
use std::{
    cell::UnsafeCell,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Padding keeps `head` and `tail` on separate cache lines.
#[repr(align(64))]
struct CachePadded(AtomicUsize);

struct Ring {
    buffer: Box<[UnsafeCell<u8>]>,
    /// Write position, only advanced by the producer
    head: CachePadded,
    /// Read position, only advanced by the consumer
    tail: CachePadded,
    mask: usize,
}

// SAFETY: a slot is written only by the producer while it is outside `tail..head`, and read
// only by the consumer after the producer published it through `head`.
unsafe impl Sync for Ring {}
unsafe impl Send for Ring {}

impl Ring {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

/// Creates a channel holding at least `capacity` bytes.
///
/// The capacity is rounded up to the next power of two, with a minimum of 2.
///
/// ```
/// use simbridge_server::channel;
///
/// let (mut tx, mut rx) = channel::channel(3);
/// assert_eq!(tx.capacity(), 4);
/// assert!(tx.push(b'R'));
/// assert_eq!(rx.pop(), Some(b'R'));
/// assert_eq!(rx.pop(), None);
/// ```
pub fn channel(capacity: usize) -> (Producer, Consumer) {
    let capacity = capacity.max(2).next_power_of_two();
    let buffer: Vec<UnsafeCell<u8>> = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
    let ring = Arc::new(Ring {
        buffer: buffer.into_boxed_slice(),
        head: CachePadded(AtomicUsize::new(0)),
        tail: CachePadded(AtomicUsize::new(0)),
        mask: capacity - 1,
    });
    (
        Producer {
            ring: Arc::clone(&ring),
        },
        Consumer { ring },
    )
}

/// The writing end of a byte channel.
pub struct Producer {
    ring: Arc<Ring>,
}

impl Producer {
    /// Appends `byte`. Returns `false` and drops the byte if the channel is full.
    #[must_use = "a failed push drops the byte and should be reported"]
    pub fn push(&mut self, byte: u8) -> bool {
        let ring = &*self.ring;
        let head = ring.head.0.load(Ordering::Relaxed);
        let tail = ring.tail.0.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= ring.capacity() {
            return false;
        }
        // SAFETY: the slot at `head` is not visible to the consumer until `head` is published.
        unsafe {
            *ring.buffer[head & ring.mask].get() = byte;
        }
        ring.head.0.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Appends as many bytes of `data` as fit. Returns the number of bytes taken.
    pub fn push_slice(&mut self, data: &[u8]) -> usize {
        let ring = &*self.ring;
        let head = ring.head.0.load(Ordering::Relaxed);
        let tail = ring.tail.0.load(Ordering::Acquire);
        let free = ring.capacity() - head.wrapping_sub(tail);
        let count = data.len().min(free);
        for (i, byte) in data.iter().take(count).enumerate() {
            // SAFETY: see `push`, all `count` slots are free.
            unsafe {
                *ring.buffer[head.wrapping_add(i) & ring.mask].get() = *byte;
            }
        }
        ring.head.0.store(head.wrapping_add(count), Ordering::Release);
        count
    }

    /// Number of queued bytes. This is a snapshot, the consumer may drain concurrently.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// The reading end of a byte channel.
pub struct Consumer {
    ring: Arc<Ring>,
}

impl Consumer {
    /// Removes the oldest byte, or returns `None` if the channel is empty.
    pub fn pop(&mut self) -> Option<u8> {
        let ring = &*self.ring;
        let tail = ring.tail.0.load(Ordering::Relaxed);
        let head = ring.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        // SAFETY: the producer published this slot and will not touch it until `tail` moves.
        let byte = unsafe { *ring.buffer[tail & ring.mask].get() };
        ring.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Moves up to `out.len()` bytes into `out`. Returns the number of bytes moved.
    pub fn pop_slice(&mut self, out: &mut [u8]) -> usize {
        let ring = &*self.ring;
        let tail = ring.tail.0.load(Ordering::Relaxed);
        let head = ring.head.0.load(Ordering::Acquire);
        let count = head.wrapping_sub(tail).min(out.len());
        for (i, slot) in out.iter_mut().take(count).enumerate() {
            // SAFETY: see `pop`.
            *slot = unsafe { *ring.buffer[tail.wrapping_add(i) & ring.mask].get() };
        }
        ring.tail.0.store(tail.wrapping_add(count), Ordering::Release);
        count
    }

    /// Number of queued bytes. This is a snapshot, the producer may append concurrently.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}
