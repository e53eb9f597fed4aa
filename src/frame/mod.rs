mod pool;
mod rotate;

pub use pool::{FramePool, PoolStats, PoolStatsSnapshot};
pub use rotate::rotate_nv21;

use crate::size::Size;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{trace, warn};

/// Pixel layout of preview buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// YUV 4:2:0 semi-planar, interleaved VU
    #[default]
    Nv21,
    /// YUV 4:2:0 planar
    Yv12,
    /// YUV 4:2:2 packed
    Yuy2,
    Rgb565,
}

impl PixelFormat {
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Nv21 | PixelFormat::Yv12 => 12,
            PixelFormat::Yuy2 | PixelFormat::Rgb565 => 16,
        }
    }

    /// Bytes needed to hold one frame of `size`, rounded up
    pub fn buffer_size(&self, size: Size) -> usize {
        let bits = size.area() * self.bits_per_pixel() as u64;
        bits.div_ceil(8) as usize
    }
}

/// A buffer on its way back to the pool
#[derive(Debug)]
pub struct ReturnedBuffer {
    pub data: Vec<u8>,
    pub generation: u64,
}

/// Callback returning a released buffer to its pool
pub type Recycler = Arc<dyn Fn(ReturnedBuffer) + Send + Sync>;

/// A preview frame borrowed from the pool.
///
/// Call [`Frame::release`] once done; a dropped frame never returns its buffer.
pub struct Frame {
    data: Vec<u8>,
    timestamp: SystemTime,
    rotation: u32,
    size: Size,
    format: PixelFormat,
    generation: u64,
    recycler: Option<Recycler>,
}

impl Frame {
    pub(crate) fn new(
        data: Vec<u8>,
        rotation: u32,
        size: Size,
        format: PixelFormat,
        generation: u64,
        recycler: Option<Recycler>,
    ) -> Self {
        Self {
            data,
            timestamp: SystemTime::now(),
            rotation,
            size,
            format,
            generation,
            recycler,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Clockwise rotation, in degrees, from sensor to output orientation
    pub fn rotation(&self) -> u32 {
        self.rotation
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Hand the buffer back to the pool
    pub fn release(self) {
        let Frame {
            data,
            generation,
            recycler,
            ..
        } = self;
        match recycler {
            Some(recycler) => recycler(ReturnedBuffer { data, generation }),
            None => trace!("Released frame without a pool"),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("rotation", &self.rotation)
            .field("generation", &self.generation)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A still image built from a preview frame
#[derive(Debug, Clone, PartialEq)]
pub struct YuvImage {
    pub data: Vec<u8>,
    pub size: Size,
    pub format: PixelFormat,
}

/// Consumer of preview frames.
///
/// Processors run off the worker; the frame is released after the last one.
pub trait FrameProcessor: Send + Sync {
    fn process(&self, frame: &Frame);
}

impl<F> FrameProcessor for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn process(&self, frame: &Frame) {
        self(frame)
    }
}

/// Registered frame processors, safe to modify while frames are in flight
#[derive(Clone, Default)]
pub struct FrameProcessors {
    processors: Arc<RwLock<Vec<Arc<dyn FrameProcessor>>>>,
}

impl FrameProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, processor: Arc<dyn FrameProcessor>) {
        self.processors.write().push(processor);
    }

    /// Remove a processor previously added, compared by identity
    pub fn remove(&self, processor: &Arc<dyn FrameProcessor>) -> bool {
        let mut processors = self.processors.write();
        let before = processors.len();
        processors.retain(|p| !Arc::ptr_eq(p, processor));
        processors.len() != before
    }

    pub fn clear(&self) {
        self.processors.write().clear();
    }

    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.read().is_empty()
    }

    /// Deliver a frame to every processor registered right now
    pub fn dispatch(&self, frame: Frame) {
        let snapshot: Vec<Arc<dyn FrameProcessor>> = self.processors.read().clone();
        if snapshot.is_empty() {
            frame.release();
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    for processor in &snapshot {
                        processor.process(&frame);
                    }
                    frame.release();
                });
            }
            Err(_) => {
                warn!("No runtime for frame dispatch, releasing frame");
                frame.release();
            }
        }
    }
}
