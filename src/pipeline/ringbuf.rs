use std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crossbeam_utils::CachePadded;

/// Creates a bounded multi-producer/single-consumer ring buffer.
///
/// `capacity` must be a power of two, at least 2. The writer handle is
/// cheaply cloneable and shared across producers; the reader handle is
/// unique and moved into the consuming task.
pub(crate) fn ringbuffer<T>(capacity: usize) -> (RingBufferWriter<T>, RingBufferReader<T>) {
    let rb = Arc::new(RingBuffer::new(capacity));
    (
        RingBufferWriter { inner: rb.clone() },
        RingBufferReader {
            inner: rb,
            local_idx_r: 0,
        },
    )
}

struct Slot<T> {
    /// Lap stamp coordinating producers and the consumer. A slot with index
    /// `i` and capacity `c` is writable for position `p` when `stamp == p`
    /// (with `p % c == i`), and readable when `stamp == p + 1`.
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Internal ringbuffer storage. This type is private to the crate.
///
/// It stores the slot array and the atomic producer index used for
/// synchronization. Indices grow monotonically (wrapping on overflow) and a
/// power-of-two mask converts them to positions inside the buffer; slot
/// stamps carry the lap information that distinguishes a full slot from an
/// empty one.
struct RingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    idx_w: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "Capacity must be a power of 2");
        assert!(capacity >= 2, "Capacity must be at least 2");

        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        RingBuffer {
            slots,
            mask: capacity - 1,
            idx_w: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

// The internal `RingBuffer` is deallocated when the last writer or reader
// handle is dropped (i.e., when the `Arc` reference count reaches zero).
impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let stamp = *slot.stamp.get_mut();
            if stamp & self.mask == (i + 1) & self.mask {
                // SAFETY: we are in Drop, so no producer or consumer handle
                // remains. The stamp marks this slot as written but never
                // consumed; we take ownership of the value so its destructor
                // runs exactly once before the backing storage is freed.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

/// Writer handle of the ringbuffer.
///
/// Cloneable; any number of producers may push concurrently through shared
/// references.
pub(crate) struct RingBufferWriter<T> {
    inner: Arc<RingBuffer<T>>,
}

impl<T> Clone for RingBufferWriter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RingBufferWriter<T> {
    pub(crate) fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Push an element into the ringbuffer.
    ///
    /// Returns `Some(T)` when the buffer is full (giving back ownership of
    /// the value), otherwise returns `None` on success. Never blocks and
    /// never spins on a full buffer.
    pub(crate) fn push(&self, t: T) -> Option<T> {
        let inner = &*self.inner;
        let mut pos = inner.idx_w.load(Ordering::Relaxed);

        loop {
            let slot = &inner.slots[pos & inner.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == pos {
                // Slot is free for this lap: race other producers to claim it.
                match inner
                    .idx_w
                    .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
                {
                    Ok(_) => {
                        // SAFETY: the claim above makes this producer the
                        // sole owner of the slot until the stamp below
                        // publishes it to the consumer.
                        unsafe { (*slot.value.get()).write(t) };
                        slot.stamp.store(pos.wrapping_add(1), Ordering::Release);
                        return None;
                    }
                    Err(p) => pos = p,
                }
            } else if (stamp as isize).wrapping_sub(pos as isize) < 0 {
                // The consumer has not yet freed this slot from the previous
                // lap: the buffer is full.
                return Some(t);
            } else {
                // Another producer claimed this position; reload and retry.
                pos = inner.idx_w.load(Ordering::Relaxed);
            }
        }
    }
}

/// Reader handle of the ringbuffer.
pub(crate) struct RingBufferReader<T> {
    inner: Arc<RingBuffer<T>>,
    local_idx_r: usize,
}

impl<T> RingBufferReader<T> {
    /// Pull an element from the ringbuffer.
    ///
    /// Returns `Some(T)` if an element is available, otherwise `None` when
    /// the buffer is empty.
    pub(crate) fn pull(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let pos = self.local_idx_r;
        let slot = &inner.slots[pos & inner.mask];

        if slot.stamp.load(Ordering::Acquire) != pos.wrapping_add(1) {
            return None;
        }

        // SAFETY: the stamp guarantees the producer fully initialized this
        // slot, and the single consumer is the only reader of it.
        let t = unsafe { (*slot.value.get()).assume_init_read() };

        // Free the slot for the producers' next lap.
        slot.stamp
            .store(pos.wrapping_add(inner.capacity()), Ordering::Release);
        self.local_idx_r = pos.wrapping_add(1);

        Some(t)
    }
}
