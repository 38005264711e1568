//! Buffer pool implementation for efficient buffer reuse
//!
//! This module provides a thread-safe pool of fixed-size byte buffers that
//! keeps the relay hot path free of per-message allocations.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::config::defaults;

/// A pool of reusable, fixed-size byte buffers
///
/// Every buffer handed out by the pool has a length of exactly
/// `buffer_size` bytes. Buffers are recycled through [`BufferPool::release`],
/// which only accepts buffers that still have that length.
///
/// The pool is cheap to clone; clones share the same free list.
#[derive(Clone)]
pub struct BufferPool {
    /// Inner implementation wrapped in Arc for thread-safety
    inner: Arc<BufferPoolInner>,
}

/// Inner implementation of the buffer pool
struct BufferPoolInner {
    /// Buffers waiting to be reused
    free: Mutex<Vec<Vec<u8>>>,
    /// Length of every buffer issued by this pool
    buffer_size: usize,
    /// Maximum number of idle buffers kept around
    max_idle: usize,
}

/// A buffer borrowed from the pool
///
/// When dropped, the buffer is automatically returned to the pool.
pub struct PooledBuffer {
    /// The actual buffer, `None` only after it has been handed back
    buffer: Option<Vec<u8>>,
    /// The pool this buffer was borrowed from
    pool: BufferPool,
}

impl BufferPool {
    /// Create a new buffer pool
    ///
    /// # Parameters
    ///
    /// * `buffer_size` - Length of each buffer
    /// * `max_idle` - Maximum number of released buffers kept for reuse
    pub fn new(buffer_size: usize, max_idle: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                free: Mutex::new(Vec::new()),
                buffer_size,
                max_idle,
            }),
        }
    }

    /// Length of the buffers issued by this pool
    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of buffers currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Take a buffer from the pool, allocating one if the pool is empty
    pub fn acquire(&self) -> PooledBuffer {
        let recycled = self.inner.free.lock().pop();
        let buffer = recycled.unwrap_or_else(|| vec![0u8; self.inner.buffer_size]);

        PooledBuffer {
            buffer: Some(buffer),
            pool: self.clone(),
        }
    }

    /// Return a buffer to the pool
    ///
    /// Buffers whose length differs from the pool's buffer size are dropped
    /// instead of being recycled, as are buffers beyond the idle limit.
    pub fn release(&self, buffer: Vec<u8>) {
        if buffer.len() != self.inner.buffer_size {
            return;
        }

        let mut free = self.inner.free.lock();
        if free.len() < self.inner.max_idle {
            free.push(buffer);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(defaults::buffer_size(), defaults::max_idle_buffers())
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.inner.buffer_size)
            .field("max_idle", &self.inner.max_idle)
            .field("idle", &self.idle())
            .finish()
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}
