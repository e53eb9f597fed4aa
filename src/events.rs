use crate::error::{CameraError, EventBusError};
use crate::frame::YuvImage;
use crate::gesture::Gesture;
use crate::options::CameraOptions;
use crate::settings::Point;
use crate::size::Size;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

/// Events published by the camera engine
#[derive(Debug, Clone)]
pub enum CameraEvent {
    /// The device was opened and its capabilities read
    Opened { options: Arc<CameraOptions> },
    /// The device was released
    Closed,
    /// The preview stream size changed (view orientation)
    PreviewSizeChanged { size: Size },
    /// The shutter fired for a picture or a snapshot
    Shutter { snapshot: bool },
    /// Encoded picture data from the device
    PictureReady {
        data: Arc<Vec<u8>>,
        matches_view: bool,
        mirror: bool,
    },
    /// A preview frame captured and rotated to output orientation
    SnapshotReady {
        image: Arc<YuvImage>,
        matches_view: bool,
        mirror: bool,
    },
    /// A recording was finalized
    VideoReady { path: PathBuf },
    FocusStarted {
        gesture: Option<Gesture>,
        point: Point,
    },
    FocusEnded {
        gesture: Option<Gesture>,
        success: bool,
        point: Point,
    },
    ZoomChanged { zoom: f32, points: Vec<Point> },
    ExposureChanged {
        value: f32,
        bounds: (f32, f32),
        points: Vec<Point>,
    },
    /// An asynchronous failure
    Error(CameraError),
}

impl CameraEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            CameraEvent::Opened { options } => {
                format!(
                    "Camera opened ({} picture sizes)",
                    options.supported_picture_sizes.len()
                )
            }
            CameraEvent::Closed => "Camera closed".to_string(),
            CameraEvent::PreviewSizeChanged { size } => format!("Preview size changed to {}", size),
            CameraEvent::Shutter { snapshot } => {
                format!("Shutter ({})", if *snapshot { "snapshot" } else { "picture" })
            }
            CameraEvent::PictureReady { data, .. } => {
                format!("Picture ready: {} bytes", data.len())
            }
            CameraEvent::SnapshotReady { image, .. } => {
                format!("Snapshot ready: {}", image.size)
            }
            CameraEvent::VideoReady { path } => format!("Video ready: {}", path.display()),
            CameraEvent::FocusStarted { point, .. } => {
                format!("Focus started at ({:.1}, {:.1})", point.x, point.y)
            }
            CameraEvent::FocusEnded { success, .. } => {
                format!("Focus ended ({})", if *success { "success" } else { "failed" })
            }
            CameraEvent::ZoomChanged { zoom, .. } => format!("Zoom changed to {:.2}", zoom),
            CameraEvent::ExposureChanged { value, .. } => {
                format!("Exposure correction changed to {:.2}", value)
            }
            CameraEvent::Error(error) => format!("Error: {}", error),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            CameraEvent::Opened { .. } => "opened",
            CameraEvent::Closed => "closed",
            CameraEvent::PreviewSizeChanged { .. } => "preview_size_changed",
            CameraEvent::Shutter { .. } => "shutter",
            CameraEvent::PictureReady { .. } => "picture_ready",
            CameraEvent::SnapshotReady { .. } => "snapshot_ready",
            CameraEvent::VideoReady { .. } => "video_ready",
            CameraEvent::FocusStarted { .. } => "focus_started",
            CameraEvent::FocusEnded { .. } => "focus_ended",
            CameraEvent::ZoomChanged { .. } => "zoom_changed",
            CameraEvent::ExposureChanged { .. } => "exposure_changed",
            CameraEvent::Error(_) => "error",
        }
    }
}

/// Event bus delivering engine events to any number of listeners
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CameraEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it.
    ///
    /// Events published with no listener attached are dropped.
    pub fn publish(&self, event: CameraEvent) -> usize {
        match &event {
            CameraEvent::Opened { .. } | CameraEvent::Closed | CameraEvent::VideoReady { .. } => {
                info!("{}", event.description());
            }
            CameraEvent::Error(camera_error) => {
                error!("Camera error: {}", camera_error);
            }
            _ => debug!("Publishing event: {}", event.description()),
        }

        match self.sender.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                trace!("No listeners for event: {}", event.event_type());
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Only errors
    Errors,
    Custom(fn(&CameraEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &CameraEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Errors => matches!(event, CameraEvent::Error(_)),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<CameraEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<CameraEvent>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<CameraEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        trace!("Receiver '{}' received {}", self.name, event.event_type());
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<CameraEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
