//! Fixed-capacity circular (ring) buffer for `f32` audio samples.
//!
//! When the buffer is full, new samples **overwrite** the oldest data so that
//! the most-recent `capacity` samples are always available.  The meter only
//! ever looks at the tail of the signal, so nothing is drained; each analysis
//! window is a copy of the newest samples.
//!
//! # Example
//!
//! ```rust
//! use decibel_meter::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]); // 5 items → capacity 4 → oldest dropped
//!
//! let mut window = [0.0_f32; 3];
//! buf.copy_latest(&mut window);
//! assert_eq!(window, [3.0, 4.0, 5.0]);
//! ```

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular buffer.
///
/// Generic over `T: Copy + Default`; the capture path uses `RingBuffer<f32>`.
///
/// ## Overflow behaviour
///
/// When [`push_slice`](Self::push_slice) would exceed `capacity`, the oldest
/// samples are silently overwritten.  The buffer never allocates beyond its
/// initial capacity.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    /// Append `data` to the buffer, overwriting the oldest samples once full.
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.buf[self.write_pos] = item;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            if self.len < self.capacity {
                self.len += 1;
            }
        }
    }

    /// Fill `out` with the newest `out.len()` samples in chronological order.
    ///
    /// When fewer samples are stored than requested, the front of `out` (the
    /// "older" end) is padded with `T::default()`, so a freshly started
    /// stream reads as silence followed by whatever has arrived so far.
    pub fn copy_latest(&self, out: &mut [T]) {
        let available = self.len.min(out.len());
        let pad = out.len() - available;

        for slot in &mut out[..pad] {
            *slot = T::default();
        }

        // Oldest of the samples we return sits `available` positions behind
        // the write cursor.
        let start = (self.write_pos + self.capacity - available) % self.capacity;
        for (i, slot) in out[pad..].iter_mut().enumerate() {
            *slot = self.buf[(start + i) % self.capacity];
        }
    }

    /// Discard all samples and reset the write position.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of samples the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
