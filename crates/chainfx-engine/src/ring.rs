use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/* ---------- lock-free SPSC ring (power-of-two capacity) ---------- */

pub(crate) fn next_pow2(mut x: usize) -> usize {
    if x <= 1 { return 1; }
    x -= 1;
    x |= x >> 1;
    x |= x >> 2;
    x |= x >> 4;
    x |= x >> 8;
    x |= x >> 16;
    #[cfg(target_pointer_width = "64")]
    { x |= x >> 32; }
    x + 1
}

/// Bounded ring of `Copy` values, shared by exactly one [`Producer`] and one
/// [`Consumer`].
///
/// One slot is always kept free so `write == read` means empty. The producer
/// publishes `write` with `Release` after the payload is stored; the consumer
/// loads it with `Acquire`, so an observed index implies an observed payload.
struct SpscRing<T: Copy> {
    buf: Box<[UnsafeCell<T>]>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// Safety: the ring is only reachable through one `Producer` and one
// `Consumer`, neither `Clone`, and every slot access goes through a `&mut`
// method on one of them. The producer only writes slots in the free region and
// the consumer only reads slots in the filled region.
unsafe impl<T: Copy + Send> Send for SpscRing<T> {}
unsafe impl<T: Copy + Send> Sync for SpscRing<T> {}

impl<T: Copy> SpscRing<T> {
    #[inline]
    fn len_between(&self, w: usize, r: usize) -> usize {
        w.wrapping_sub(r) & self.mask
    }

    fn len(&self) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        self.len_between(w, r)
    }
}

/// Create a ring able to hold at least `capacity` items, split into its two
/// ends.
///
/// The ends are not `Clone`, so a second producer cannot be made:
///
/// ```compile_fail
/// let (tx, _rx) = chainfx_engine::ring::channel::<u32>(4);
/// let tx2 = tx.clone();
/// ```
pub fn channel<T: Copy + Default>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let slots = next_pow2(capacity.max(1) + 1);
    let buf = (0..slots).map(|_| UnsafeCell::new(T::default())).collect::<Vec<_>>();
    let ring = Arc::new(SpscRing {
        buf: buf.into_boxed_slice(),
        mask: slots - 1,
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
    });
    (Producer { ring: ring.clone() }, Consumer { ring })
}

/// Writing end. Never blocks or allocates.
pub struct Producer<T: Copy> {
    ring: Arc<SpscRing<T>>,
}

impl<T: Copy> Producer<T> {
    /// Number of items the ring can hold.
    pub fn capacity(&self) -> usize {
        self.ring.mask
    }

    /// Items currently queued. Only a snapshot while the consumer is live.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push one item; returns false if the ring is full.
    pub fn push(&mut self, value: T) -> bool {
        let ring = &*self.ring;
        let r = ring.read.load(Ordering::Acquire);
        let w = ring.write.load(Ordering::Relaxed);
        if ring.len_between(w, r) == ring.mask { return false; }

        // Safety: slot `w` is in the free region, the consumer never reads it
        // until the store of `write` below is visible.
        unsafe { *ring.buf[w & ring.mask].get() = value; }
        ring.write.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    /// Push entire slice; returns false (and pushes nothing) if not enough space.
    pub fn push_slice(&mut self, data: &[T]) -> bool {
        let ring = &*self.ring;
        let r = ring.read.load(Ordering::Acquire);
        let w = ring.write.load(Ordering::Relaxed);
        let free = ring.mask - ring.len_between(w, r);
        if free < data.len() { return false; }

        let mut wi = w;
        for &v in data {
            // Safety: bounded by the free-space check above.
            unsafe { *ring.buf[wi & ring.mask].get() = v; }
            wi = wi.wrapping_add(1);
        }
        ring.write.store(wi, Ordering::Release);
        true
    }
}

/// Reading end. Never blocks or allocates.
pub struct Consumer<T: Copy> {
    ring: Arc<SpscRing<T>>,
}

impl<T: Copy> Consumer<T> {
    pub fn capacity(&self) -> usize {
        self.ring.mask
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop one item, if any.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let w = ring.write.load(Ordering::Acquire);
        let r = ring.read.load(Ordering::Relaxed);
        if w == r { return None; }

        // Safety: slot `r` is in the filled region, the producer will not
        // overwrite it until the store of `read` below is visible.
        let value = unsafe { *ring.buf[r & ring.mask].get() };
        ring.read.store(r.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Pop exactly `out.len()` items into `out`; false (and pops nothing) if
    /// not enough data.
    pub fn pop_into(&mut self, out: &mut [T]) -> bool {
        let ring = &*self.ring;
        let w = ring.write.load(Ordering::Acquire);
        let r = ring.read.load(Ordering::Relaxed);
        if ring.len_between(w, r) < out.len() { return false; }

        let mut ri = r;
        for o in out.iter_mut() {
            // Safety: bounded by the available-data check above.
            *o = unsafe { *ring.buf[ri & ring.mask].get() };
            ri = ri.wrapping_add(1);
        }
        ring.read.store(ri, Ordering::Release);
        true
    }
}
