//! Fixed-capacity byte buffers and the pool that recycles them.
//!
//! `take()` pops a recycled buffer or allocates a fresh one; `release()`
//! clears the buffer and queues it again. The queue is a lock-free
//! `SegQueue`, so concurrent take/release from many workers never blocks.
//! The pool is unbounded: after a burst every buffer that was in flight
//! stays queued. `idle()` and the `cluster_proxy_buffers_allocated` gauge
//! make that growth visible.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::observability::metrics;

/// A fixed-capacity byte buffer with a readable window `[start, end)`.
///
/// Bytes are appended through `space()` + `fill()` and drained through
/// `data()` + `consume()`.
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of readable bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when no byte can be appended even after compaction.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Readable bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Writable tail. Compacts first when the tail is exhausted.
    pub fn space(&mut self) -> &mut [u8] {
        if self.end == self.data.len() {
            self.shift();
        }
        &mut self.data[self.end..]
    }

    /// Mark `n` bytes of `space()` as written.
    pub fn fill(&mut self, n: usize) {
        self.end = (self.end + n).min(self.data.len());
    }

    /// Drop `n` readable bytes from the front.
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Move readable bytes to the front of the allocation.
    pub fn shift(&mut self) {
        if self.start > 0 {
            self.data.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Address of the backing allocation; stable across recycling.
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }
}

/// A pool of buffers sharing one fixed capacity.
#[derive(Debug)]
pub struct BufferPool {
    free: SegQueue<Buffer>,
    buffer_size: usize,
    allocated: AtomicUsize,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            free: SegQueue::new(),
            buffer_size,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Get a buffer of exactly `buffer_size()` capacity.
    pub fn take(&self) -> Buffer {
        match self.free.pop() {
            Some(buffer) => buffer,
            None => {
                let total = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_buffers_allocated(total);
                tracing::trace!(capacity = self.buffer_size, total, "Allocating buffer");
                Buffer::with_capacity(self.buffer_size)
            }
        }
    }

    /// Clear a buffer and return it to the pool.
    pub fn release(&self, mut buffer: Buffer) {
        if buffer.capacity() != self.buffer_size {
            // Not one of ours.
            return;
        }
        buffer.clear();
        self.free.push(buffer);
    }

    /// Take a buffer that returns itself to the pool when dropped.
    pub fn lease(self: &Arc<Self>) -> LeasedBuffer {
        LeasedBuffer {
            buffer: Some(self.take()),
            pool: Arc::clone(self),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffers currently queued for reuse.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Buffers allocated over the pool's lifetime.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// RAII handle over a pooled buffer.
#[derive(Debug)]
pub struct LeasedBuffer {
    buffer: Option<Buffer>,
    pool: Arc<BufferPool>,
}

impl Deref for LeasedBuffer {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        // Only `drop` takes the buffer out.
        self.buffer.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for LeasedBuffer {
    fn deref_mut(&mut self) -> &mut Buffer {
        self.buffer.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for LeasedBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}
