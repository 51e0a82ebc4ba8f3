//! Recycled byte buffers for record encoding.
//!
//! Every log call needs two scratch buffers (one for fields, one for the
//! finished line). Allocating them per call dominates the cost of a small
//! record, so they are checked out of a bounded lock-free pool and handed
//! back when the [`PooledBuffer`] guard drops.
//!
//! ```
//! use logline::pool::BufferPool;
//!
//! let pool = BufferPool::new(8, 512, 4096);
//! {
//!     let mut buf = pool.acquire();
//!     buf.extend_from_slice(b"hello");
//! } // returned to the pool here
//! assert!(pool.acquire().is_empty());
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use crossbeam::queue::ArrayQueue;

/// Capacity of freshly allocated buffers, large enough for a typical record.
pub const INITIAL_CAPACITY: usize = 512;

/// Buffers that grew beyond this are dropped on release instead of pooled.
pub const MAX_POOLED_CAPACITY: usize = 4 << 10;

const GLOBAL_SLOTS: usize = 256;

static GLOBAL: LazyLock<BufferPool> =
    LazyLock::new(|| BufferPool::new(GLOBAL_SLOTS, INITIAL_CAPACITY, MAX_POOLED_CAPACITY));

/// The process wide pool used by [`crate::Logger`].
pub fn global() -> &'static BufferPool {
    &GLOBAL
}

pub struct BufferPool {
    free: ArrayQueue<Vec<u8>>,
    initial_capacity: usize,
    max_capacity: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

/// Counters describing how the pool has been used so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Buffers created because the pool was empty.
    pub allocated: u64,
    /// Checkouts served from a cached buffer.
    pub reused: u64,
    /// Releases that dropped the buffer (oversized or pool full).
    pub discarded: u64,
}

impl BufferPool {
    /// `slots` bounds how many idle buffers are kept around.
    pub fn new(slots: usize, initial_capacity: usize, max_capacity: usize) -> BufferPool {
        BufferPool {
            free: ArrayQueue::new(slots.max(1)),
            initial_capacity,
            max_capacity,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Checks out an empty buffer.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = match self.free.pop() {
            Some(mut buffer) => {
                buffer.clear();
                self.reused.fetch_add(1, Ordering::Relaxed);
                buffer
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.initial_capacity)
            }
        };
        PooledBuffer { buffer, pool: self }
    }

    fn release(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > self.max_capacity {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        buffer.clear();
        if self.free.push(buffer).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Number of idle buffers currently cached.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// A buffer checked out of a [`BufferPool`].
///
/// The holder is the sole user until the guard drops, at which point the
/// buffer goes back to the pool (unless it grew past the ceiling).
pub struct PooledBuffer<'a> {
    buffer: Vec<u8>,
    pool: &'a BufferPool,
}

impl PooledBuffer<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl std::fmt::Debug for PooledBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PooledBuffer(\"{}\")", self.buffer.escape_ascii())
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checkout_is_always_empty() {
        let pool = BufferPool::new(4, 16, 64);
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"leftover");
        }
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn release_without_writes_then_acquire() {
        let pool = BufferPool::new(4, 16, 64);
        drop(pool.acquire());
        let buf = pool.acquire();
        assert_eq!(buf.len(), 0);
        assert!(buf.capacity() >= 16);
    }

    #[test]
    fn oversized_buffers_are_not_recycled() {
        let pool = BufferPool::new(4, 16, 64);
        {
            let mut buf = pool.acquire();
            buf.resize(1000, b'x');
        }
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.stats().discarded, 1);
        for _ in 0..8 {
            let buf = pool.acquire();
            assert!(buf.capacity() <= pool.max_capacity());
        }
    }

    #[test]
    fn full_pool_drops_extra_buffers() {
        let pool = BufferPool::new(2, 16, 64);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        drop((a, b, c));
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.stats().discarded, 1);
        assert_eq!(pool.stats().allocated, 3);
    }

    #[test]
    fn concurrent_checkouts() {
        let pool = BufferPool::new(8, 32, 256);
        std::thread::scope(|scope| {
            for t in 0..8u8 {
                let pool = &pool;
                scope.spawn(move || {
                    for i in 0..1000u32 {
                        let mut buf = pool.acquire();
                        assert!(buf.is_empty());
                        buf.push(t);
                        buf.extend_from_slice(&i.to_le_bytes());
                        assert_eq!(buf[0], t);
                    }
                });
            }
        });
        assert!(pool.idle() <= 8);
    }
}
