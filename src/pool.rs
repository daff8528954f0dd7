use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;
use serde::Serialize;

/// Capacity ceilings of the small, medium and large tiers, in samples.
pub const TIERS: [usize; 3] = [1024, 4096, 16384];

/// Buffers kept per tier before extra returns are simply dropped.
pub const DEFAULT_MAX_PER_TIER: usize = 64;

/// Backing size used when a zero-length buffer is requested.
const MIN_ALLOCATION: usize = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Fresh allocations made for pooled tiers.
    pub allocated: u64,
    /// Requests served from a tier's free list.
    pub reused: u64,
    /// Buffers zeroed and put back on a free list.
    pub returned: u64,
    /// Requests too large (or too small) to pool.
    pub direct: u64,
}

/// Three free lists keyed by capacity ceiling. Buffers come back on drop
/// and are zeroed before reuse.
///
/// Construct one per owner and share it through an `Arc`; there is no global
/// instance.
#[derive(Debug)]
pub struct AudioBufferPool {
    tiers: [Mutex<Vec<Vec<f32>>>; 3],
    max_per_tier: usize,
    allocated: AtomicU64,
    reused: AtomicU64,
    returned: AtomicU64,
    direct: AtomicU64,
}

impl Default for AudioBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PER_TIER)
    }
}

impl AudioBufferPool {
    pub fn new(max_per_tier: usize) -> Self {
        Self {
            tiers: Default::default(),
            max_per_tier,
            allocated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            direct: AtomicU64::new(0),
        }
    }

    /// Smallest tier whose ceiling holds `size` samples.
    pub fn tier_for(size: usize) -> Option<usize> {
        TIERS.iter().position(|&ceiling| size <= ceiling)
    }

    /// Borrow a buffer whose logical length is exactly `size`.
    ///
    /// A free buffer with enough capacity is reused; otherwise one is
    /// allocated at exactly `size`. Requests over the largest ceiling are
    /// allocated directly and never return to the pool.
    pub fn get(self: &Arc<Self>, size: usize) -> PooledBuffer {
        if size == 0 {
            self.direct.fetch_add(1, Ordering::Relaxed);
            return PooledBuffer::detached(vec![0.0; MIN_ALLOCATION], 0);
        }

        let Some(tier) = Self::tier_for(size) else {
            self.direct.fetch_add(1, Ordering::Relaxed);
            trace!("direct allocation of {size} samples");
            return PooledBuffer::detached(vec![0.0; size], size);
        };

        let reused = {
            let mut free = self.tiers[tier].lock().unwrap_or_else(|e| e.into_inner());
            free.iter()
                .rposition(|b| b.len() >= size)
                .map(|i| free.swap_remove(i))
        };

        let data = match reused {
            Some(data) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                data
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                vec![0.0; size]
            }
        };

        PooledBuffer {
            data,
            len: size,
            home: Some((tier, Arc::clone(self))),
        }
    }

    fn put(&self, tier: usize, mut data: Vec<f32>) {
        data.fill(0.0);
        let mut free = self.tiers[tier].lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_per_tier {
            free.push(data);
            self.returned.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Buffers currently waiting in each tier.
    pub fn free_counts(&self) -> [usize; 3] {
        let count = |t: &Mutex<Vec<Vec<f32>>>| t.lock().unwrap_or_else(|e| e.into_inner()).len();
        [count(&self.tiers[0]), count(&self.tiers[1]), count(&self.tiers[2])]
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            direct: self.direct.load(Ordering::Relaxed),
        }
    }
}

/// A sample buffer on loan from an [`AudioBufferPool`].
///
/// Dereferences to exactly the requested number of samples. Dropping it
/// zeroes the backing store and hands it back to its tier.
#[derive(Debug)]
pub struct PooledBuffer {
    data: Vec<f32>,
    len: usize,
    home: Option<(usize, Arc<AudioBufferPool>)>,
}

impl PooledBuffer {
    fn detached(data: Vec<f32>, len: usize) -> Self {
        Self { data, len, home: None }
    }

    /// Size of the backing store, which may exceed the logical length.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer goes back to a pool when dropped.
    pub fn is_pooled(&self) -> bool {
        self.home.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data[..self.len]
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.data[..self.len]
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some((tier, pool)) = self.home.take() {
            pool.put(tier, std::mem::take(&mut self.data));
        }
    }
}
