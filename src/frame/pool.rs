use super::{Frame, PixelFormat, Recycler, ReturnedBuffer};
use crate::size::Size;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Fixed-size pool of preview buffers shared with the driver.
///
/// Every [`allocate`](FramePool::allocate) starts a new generation; buffers from an
/// older generation, or of the wrong length, are dropped when they come back.
/// Buffers are recognized by their heap address, so a stale buffer the driver
/// still holds never joins a newer generation.
pub struct FramePool {
    capacity: usize,
    generation: u64,
    /// Addresses of the current generation's buffers
    handed_out: HashSet<usize>,
    buffer_size: usize,
    size: Option<Size>,
    format: PixelFormat,
    stats: Arc<PoolStats>,
}

/// Counters for pool activity
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Buffers created across all generations
    pub allocated: AtomicU64,
    /// Frames handed to consumers
    pub dispatched: AtomicU64,
    /// Buffers returned and queued back to the driver
    pub recycled: AtomicU64,
    /// Buffers returned after their generation ended
    pub discarded: AtomicU64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            allocated: self.allocated.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatsSnapshot {
    pub allocated: u64,
    pub dispatched: u64,
    pub recycled: u64,
    pub discarded: u64,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        Self::with_stats(capacity, Arc::new(PoolStats::default()))
    }

    pub fn with_stats(capacity: usize, stats: Arc<PoolStats>) -> Self {
        Self {
            capacity,
            generation: 0,
            handed_out: HashSet::new(),
            buffer_size: 0,
            size: None,
            format: PixelFormat::default(),
            stats,
        }
    }

    /// Start a new generation for `size`/`format` and return its buffers
    pub fn allocate(&mut self, size: Size, format: PixelFormat) -> Vec<Vec<u8>> {
        self.generation += 1;
        self.buffer_size = format.buffer_size(size);
        self.size = Some(size);
        self.format = format;
        self.stats
            .allocated
            .fetch_add(self.capacity as u64, Ordering::Relaxed);
        debug!(
            "Allocated {} preview buffers of {} bytes for {} (generation {})",
            self.capacity, self.buffer_size, size, self.generation
        );
        let buffers: Vec<Vec<u8>> = (0..self.capacity)
            .map(|_| vec![0u8; self.buffer_size])
            .collect();
        self.handed_out = buffers.iter().map(|buffer| address(buffer)).collect();
        buffers
    }

    /// Wrap driver data into a frame tied to the current generation.
    ///
    /// Data in a buffer this generation did not hand out is discarded.
    pub fn frame(&mut self, data: Vec<u8>, rotation: u32, recycler: Option<Recycler>) -> Option<Frame> {
        let size = self.size?;
        if !self.owns(&data) {
            trace!("Discarding frame in a buffer from another generation");
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        Some(Frame::new(
            data,
            rotation,
            size,
            self.format,
            self.generation,
            recycler,
        ))
    }

    /// Accept a released buffer, returning it if it may go back to the driver
    pub fn recycle(&mut self, buffer: ReturnedBuffer) -> Option<Vec<u8>> {
        if self.is_active()
            && buffer.generation == self.generation
            && buffer.data.len() == self.buffer_size
            && self.owns(&buffer.data)
        {
            self.stats.recycled.fetch_add(1, Ordering::Relaxed);
            Some(buffer.data)
        } else {
            trace!(
                "Discarding stale buffer (generation {}, current {})",
                buffer.generation,
                self.generation
            );
            self.handed_out.remove(&address(&buffer.data));
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Invalidate every outstanding buffer
    pub fn release(&mut self) {
        if self.size.take().is_some() {
            debug!("Releasing frame pool generation {}", self.generation);
        }
        self.generation += 1;
        self.handed_out.clear();
        self.buffer_size = 0;
    }

    fn owns(&self, data: &[u8]) -> bool {
        !data.is_empty() && self.handed_out.contains(&address(data))
    }

    pub fn is_active(&self) -> bool {
        self.size.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }
}

fn address(data: &[u8]) -> usize {
    data.as_ptr() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sizes_buffers_for_format() {
        let mut pool = FramePool::new(2);
        let buffers = pool.allocate(Size::new(640, 480), PixelFormat::Nv21);

        assert_eq!(buffers.len(), 2);
        assert!(buffers.iter().all(|b| b.len() == 460_800));
        assert_eq!(pool.buffer_size(), 460_800);
        assert_eq!(pool.stats().snapshot().allocated, 2);
    }

    fn collecting_recycler() -> (Recycler, Arc<parking_lot::Mutex<Vec<ReturnedBuffer>>>) {
        let returned = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let slot = Arc::clone(&returned);
        let recycler: Recycler = Arc::new(move |buffer| slot.lock().push(buffer));
        (recycler, returned)
    }

    #[test]
    fn test_recycle_rejects_previous_generation() {
        let mut pool = FramePool::new(2);
        let mut buffers = pool.allocate(Size::new(4, 4), PixelFormat::Nv21);
        let old_generation = pool.generation();
        let stale = buffers.pop().unwrap();

        let mut fresh = pool.allocate(Size::new(4, 4), PixelFormat::Nv21);
        assert_eq!(fresh.len(), 2);

        assert!(pool
            .recycle(ReturnedBuffer {
                data: stale,
                generation: old_generation,
            })
            .is_none());

        let (recycler, returned) = collecting_recycler();
        let frame = pool.frame(fresh.remove(0), 0, Some(recycler)).unwrap();
        assert_eq!(frame.size(), Size::new(4, 4));
        frame.release();
        let buffer = returned.lock().pop().unwrap();
        assert!(pool.recycle(buffer).is_some());

        let stats = pool.stats().snapshot();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.dispatched, 1);
    }

    #[test]
    fn test_stale_buffer_of_same_size_stays_out_of_new_generation() {
        let mut pool = FramePool::new(2);
        let mut old = pool.allocate(Size::new(4, 4), PixelFormat::Nv21);
        let stale = old.pop().unwrap();
        let _fresh = pool.allocate(Size::new(4, 4), PixelFormat::Nv21);
        assert_eq!(stale.len(), pool.buffer_size());

        // Still held by the driver, then filled and delivered.
        assert!(pool.frame(stale, 0, None).is_none());

        // A foreign buffer claiming the current generation is refused too.
        let foreign = ReturnedBuffer {
            data: vec![0; pool.buffer_size()],
            generation: pool.generation(),
        };
        assert!(pool.recycle(foreign).is_none());

        let stats = pool.stats().snapshot();
        assert_eq!(stats.dispatched, 0);
        assert_eq!(stats.recycled, 0);
        assert_eq!(stats.discarded, 2);
    }

    #[test]
    fn test_recycle_rejects_wrong_length() {
        let mut pool = FramePool::new(1);
        let _buffers = pool.allocate(Size::new(4, 4), PixelFormat::Nv21);
        let returned = ReturnedBuffer {
            data: vec![0; 3],
            generation: pool.generation(),
        };
        assert!(pool.recycle(returned).is_none());
    }

    #[test]
    fn test_release_invalidates_outstanding_buffers() {
        let mut pool = FramePool::new(2);
        let buffers = pool.allocate(Size::new(4, 4), PixelFormat::Nv21);
        let generation = pool.generation();
        pool.release();

        assert!(!pool.is_active());
        assert!(pool.frame(vec![0; 24], 0, None).is_none());
        for data in buffers {
            assert!(pool.recycle(ReturnedBuffer { data, generation }).is_none());
        }
    }
}
