#![forbid(unsafe_code)]

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::ClientConfig;

/// Bounded cache of fixed-size, zero-filled byte buffers.
///
/// The capacity bounds how many idle buffers are kept, not how many can be
/// outstanding: when the cache is empty a fresh buffer is allocated, and a
/// buffer released into a full cache is dropped.
pub struct BufferPool {
    buffer_size: usize,
    slots: Mutex<Slots>,
}

struct Slots {
    cache: Vec<Option<Box<[u8]>>>,
    free: usize,
}

impl BufferPool {
    /// Creates a pool keeping up to `capacity` buffers of `buffer_size` bytes.
    pub fn new(capacity: usize, buffer_size: usize) -> Self {
        Self {
            buffer_size,
            slots: Mutex::new(Slots {
                cache: (0..capacity).map(|_| None).collect(),
                free: 0,
            }),
        }
    }

    /// Creates a pool sized from `buffer_cache_size` and `max_buffer_size`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.buffer_cache_size, config.max_buffer_size)
    }

    /// Takes a cached buffer, or allocates a zeroed one if none is idle.
    pub fn get_buffer(&self) -> Box<[u8]> {
        {
            let mut slots = self.slots.lock();
            if slots.free > 0 {
                let found = slots.cache.iter_mut().find_map(Option::take);
                if let Some(buf) = found {
                    slots.free -= 1;
                    return buf;
                }
            }
        }
        vec![0u8; self.buffer_size].into_boxed_slice()
    }

    /// Zeroes `buf` and keeps it for reuse if the cache has room.
    ///
    /// `None` and buffers of a foreign size are ignored.
    pub fn release_buffer(&self, buf: Option<Box<[u8]>>) {
        let Some(mut buf) = buf else {
            return;
        };
        if buf.len() != self.buffer_size {
            trace!(
                len = buf.len(),
                expected = self.buffer_size,
                "buffer_pool.release.foreign_size"
            );
            return;
        }
        buf.fill(0);
        let mut slots = self.slots.lock();
        if slots.free >= slots.cache.len() {
            return;
        }
        if let Some(slot) = slots.cache.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(buf);
            slots.free += 1;
        }
    }

    /// Borrows a buffer that returns itself to the pool when dropped.
    pub fn lease(&self) -> PooledBuffer<'_> {
        PooledBuffer {
            pool: self,
            buf: Some(self.get_buffer()),
        }
    }

    /// Size of the buffers handed out by this pool.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Maximum number of idle buffers retained.
    pub fn capacity(&self) -> usize {
        self.slots.lock().cache.len()
    }

    /// Number of idle buffers currently cached.
    pub fn free_count(&self) -> usize {
        self.slots.lock().free
    }
}

/// Buffer on loan from a [`BufferPool`].
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Box<[u8]>>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release_buffer(self.buf.take());
    }
}
