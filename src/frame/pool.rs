//! Recycled pixel buffers
//!
//! The pool hands out fixed-capacity byte buffers and takes them back when
//! the owning `PooledBuffer` is dropped, so steady-state frame processing
//! does not allocate.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{PipelineError, Result};

/// Pool usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently handed out
    pub outstanding: usize,
    /// Buffers sitting on the free list
    pub free: usize,
    /// Buffers allocated over the pool lifetime
    pub allocated: u64,
    /// Acquisitions refused because the pool was exhausted
    pub exhausted: u64,
}

struct PoolInner {
    /// Free list of recycled buffers
    free: Mutex<Vec<Vec<u8>>>,
    /// Capacity of every buffer in bytes
    buffer_len: usize,
    /// Maximum buffers alive at once
    max_buffers: usize,
    outstanding: AtomicUsize,
    allocated: AtomicU64,
    exhausted: AtomicU64,
}

impl PoolInner {
    fn release(&self, mut data: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        data.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_buffers {
            free.push(data);
        }
    }
}

/// Fixed-size buffer pool shared between pipeline stages.
///
/// Cloning is cheap; clones share the same free list.
#[derive(Clone)]
pub struct FrameBufferPool {
    inner: Arc<PoolInner>,
}

impl FrameBufferPool {
    /// Create a pool of at most `max_buffers` buffers of `buffer_len` bytes.
    pub fn new(buffer_len: usize, max_buffers: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_buffers)),
                buffer_len,
                max_buffers: max_buffers.max(1),
                outstanding: AtomicUsize::new(0),
                allocated: AtomicU64::new(0),
                exhausted: AtomicU64::new(0),
            }),
        }
    }

    /// Create a pool sized for RGBA frames of the given resolution.
    pub fn for_resolution(width: u32, height: u32, max_buffers: usize) -> Self {
        Self::new(width as usize * height as usize * 4, max_buffers)
    }

    /// Capacity of each buffer in bytes
    pub fn buffer_len(&self) -> usize {
        self.inner.buffer_len
    }

    /// Maximum number of live buffers
    pub fn max_buffers(&self) -> usize {
        self.inner.max_buffers
    }

    /// Take a zeroed buffer of `len` bytes.
    ///
    /// Fails with `ResourceExhausted` when every buffer is in use or when
    /// `len` exceeds the pool's buffer size.
    pub fn acquire(&self, len: usize) -> Result<PooledBuffer> {
        let inner = &self.inner;
        if len > inner.buffer_len {
            inner.exhausted.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::ResourceExhausted(format!(
                "requested {} bytes, pool buffers hold {}",
                len, inner.buffer_len
            )));
        }

        let reserved = inner
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < inner.max_buffers).then_some(n + 1)
            });
        if reserved.is_err() {
            inner.exhausted.fetch_add(1, Ordering::Relaxed);
            return Err(PipelineError::ResourceExhausted(format!(
                "all {} frame buffers in use",
                inner.max_buffers
            )));
        }

        let recycled = inner.free.lock().pop();
        let mut data = match recycled {
            Some(data) => data,
            None => {
                inner.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(inner.buffer_len)
            }
        };
        data.resize(len, 0);

        Ok(PooledBuffer {
            data,
            pool: Arc::downgrade(&self.inner),
        })
    }

    /// Take a buffer holding a copy of `bytes`.
    pub fn acquire_copy(&self, bytes: &[u8]) -> Result<PooledBuffer> {
        let mut buffer = self.acquire(bytes.len())?;
        buffer.copy_from_slice(bytes);
        Ok(buffer)
    }

    /// Current usage counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            outstanding: self.inner.outstanding.load(Ordering::Acquire),
            free: self.inner.free.lock().len(),
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            exhausted: self.inner.exhausted.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for FrameBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBufferPool")
            .field("buffer_len", &self.inner.buffer_len)
            .field("max_buffers", &self.inner.max_buffers)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Byte buffer that returns to its pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Weak<PoolInner>,
}

impl PooledBuffer {
    /// Wrap a buffer that does not belong to any pool.
    pub fn detached(data: Vec<u8>) -> Self {
        Self {
            data,
            pool: Weak::new(),
        }
    }

    /// Whether this buffer will be recycled on drop
    pub fn is_pooled(&self) -> bool {
        self.pool.strong_count() > 0
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_recycled() {
        let pool = FrameBufferPool::new(64, 2);
        let first = pool.acquire(64).unwrap();
        drop(first);

        let _second = pool.acquire(32).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.outstanding, 1);
        assert_eq!(stats.free, 0);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let pool = FrameBufferPool::new(16, 2);
        let _a = pool.acquire(16).unwrap();
        let _b = pool.acquire(16).unwrap();

        match pool.acquire(16) {
            Err(PipelineError::ResourceExhausted(_)) => {}
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(pool.stats().exhausted, 1);

        drop(_a);
        assert!(pool.acquire(16).is_ok());
    }

    #[test]
    fn test_oversized_request_rejected() {
        let pool = FrameBufferPool::new(16, 4);
        assert!(pool.acquire(17).is_err());
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_recycled_buffer_is_zeroed() {
        let pool = FrameBufferPool::new(8, 1);
        let mut buffer = pool.acquire(8).unwrap();
        buffer.fill(0xAB);
        drop(buffer);

        let buffer = pool.acquire(8).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_detached_buffer_outlives_pool() {
        let buffer = PooledBuffer::detached(vec![1, 2, 3]);
        assert!(!buffer.is_pooled());
        assert_eq!(&buffer[..], &[1, 2, 3]);
    }

    #[test]
    fn test_buffer_dropped_after_pool() {
        let pool = FrameBufferPool::new(4, 1);
        let buffer = pool.acquire(4).unwrap();
        drop(pool);
        assert!(!buffer.is_pooled());
        drop(buffer);
    }
}
