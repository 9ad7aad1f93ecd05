// Implements the byte ring buffer that moves data between the sampling
// interrupt and the background write pipeline, over either on-chip RAM or
// an external bus-attached memory device.

// Key Features:
// - Single-producer/single-consumer operation without locks.
// - Overflow is detected before any byte is stored and reported as an
//   error; a write never silently truncates or corrupts buffered data.
// - Wraparound costs at most two contiguous backing-store operations.
// - Release/acquire index hand-off, so a consumer that observes a write
//   index also observes every byte written before it.

// Licensed under the Apache License, Version 2.0

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fixed-capacity byte store addressable at arbitrary offsets. Implemented
/// by plain RAM here and by the SPI RAM device in the driver crate.
///
/// An implementation backed by a shared bus must serialize each `store` /
/// `load` internally so producer and consumer transactions never
/// interleave on the wire.
pub trait BufferMemory {
    /// Total addressable bytes. One byte of ring capacity stays unused to
    /// disambiguate full from empty.
    const CAPACITY: usize;

    fn store(&mut self, offset: usize, data: &[u8]);
    fn load(&mut self, offset: usize, dest: &mut [u8]);
}

/// Backing store in local RAM.
pub struct SramMemory<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> SramMemory<N> {
    pub const fn new() -> Self {
        SramMemory { bytes: [0; N] }
    }
}

impl<const N: usize> Default for SramMemory<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BufferMemory for SramMemory<N> {
    const CAPACITY: usize = N;

    #[inline(always)]
    fn store(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    #[inline(always)]
    fn load(&mut self, offset: usize, dest: &mut [u8]) {
        dest.copy_from_slice(&self.bytes[offset..offset + dest.len()]);
    }
}

/// Raised when a write would overtake the unread region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overflow;

/// SPSC byte ring over a [`BufferMemory`].
///
/// Use [`try_split`](RingBuffer::try_split) to obtain the producer and
/// consumer halves for cross-context use; the inherent `write`/`read`
/// methods cover single-context rings (such as the formatted-output
/// buffer, which lives entirely in the background task).
pub struct RingBuffer<M: BufferMemory> {
    mem: UnsafeCell<M>,
    read: AtomicUsize,
    write: AtomicUsize,
    taken: AtomicBool,
}

unsafe impl<M: BufferMemory + Send> Sync for RingBuffer<M> {}

impl<M: BufferMemory> RingBuffer<M> {
    pub const fn new(mem: M) -> Self {
        RingBuffer {
            mem: UnsafeCell::new(mem),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            taken: AtomicBool::new(false),
        }
    }

    /// Claims the producer/consumer halves. Succeeds exactly once.
    pub fn try_split(&self) -> Option<(Producer<'_, M>, Consumer<'_, M>)> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((Producer { rb: self }, Consumer { rb: self }))
    }

    /// Buffered byte count.
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        (write + M::CAPACITY - read) % M::CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all buffered data. Exclusive access makes this safe even
    /// on a previously split ring.
    pub fn clear(&mut self) {
        self.read.store(0, Ordering::Relaxed);
        self.write.store(0, Ordering::Relaxed);
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), Overflow> {
        Producer { rb: self }.write(data)
    }

    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        Consumer { rb: self }.read(dest)
    }
}

/// Write half; owned by exactly one context.
pub struct Producer<'a, M: BufferMemory> {
    rb: &'a RingBuffer<M>,
}

impl<'a, M: BufferMemory> Producer<'a, M> {
    /// Appends `data` as one unit. The consumer observes either none or
    /// all of it, so whole sample frames stay intact.
    pub fn write(&mut self, data: &[u8]) -> Result<(), Overflow> {
        let rb = self.rb;
        let read = rb.read.load(Ordering::Acquire);
        let write = rb.write.load(Ordering::Relaxed);
        let used = (write + M::CAPACITY - read) % M::CAPACITY;
        if used + data.len() >= M::CAPACITY {
            return Err(Overflow);
        }

        let mem = unsafe { &mut *rb.mem.get() };
        let room = M::CAPACITY - write;
        if data.len() > room {
            mem.store(write, &data[..room]);
            mem.store(0, &data[room..]);
        } else {
            mem.store(write, data);
        }

        rb.write
            .store((write + data.len()) % M::CAPACITY, Ordering::Release);
        Ok(())
    }

    /// Bytes that can still be written without overflowing.
    pub fn free(&self) -> usize {
        M::CAPACITY - 1 - self.rb.len()
    }
}

/// Read half; owned by exactly one context.
pub struct Consumer<'a, M: BufferMemory> {
    rb: &'a RingBuffer<M>,
}

impl<'a, M: BufferMemory> Consumer<'a, M> {
    /// Copies up to `dest.len()` buffered bytes into `dest` and returns
    /// the count, which may be 0 when nothing is buffered.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let rb = self.rb;
        let write = rb.write.load(Ordering::Acquire);
        let read = rb.read.load(Ordering::Relaxed);
        let avail = (write + M::CAPACITY - read) % M::CAPACITY;
        let count = avail.min(dest.len());
        if count == 0 {
            return 0;
        }

        let mem = unsafe { &mut *rb.mem.get() };
        let contiguous = M::CAPACITY - read;
        if count > contiguous {
            mem.load(read, &mut dest[..contiguous]);
            mem.load(0, &mut dest[contiguous..count]);
        } else {
            mem.load(read, &mut dest[..count]);
        }

        rb.read
            .store((read + count) % M::CAPACITY, Ordering::Release);
        count
    }

    /// Buffered byte count.
    pub fn len(&self) -> usize {
        self.rb.len()
    }
}
