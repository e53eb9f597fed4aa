use super::{CameraController, EngineState, TaskHandle};
use crate::device::PreviewSurface;
use crate::error::CameraError;
use crate::events::{CameraEvent, EventBus};
use crate::frame::PoolStatsSnapshot;
use crate::gesture::Gesture;
use crate::options::{CameraOptions, ExtraProperties};
use crate::settings::{
    Audio, Facing, Flash, Hdr, Location, Point, SessionType, Settings, VideoQuality, WhiteBalance,
};
use crate::size::Size;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Placeholder for the second camera API generation.
///
/// Accepts every call, remembers desired settings and reports the device as
/// unavailable on start.
pub(crate) struct Camera2Controller {
    events: EventBus,
    settings: Mutex<Settings>,
}

impl Camera2Controller {
    pub fn new(settings: Settings, events: EventBus) -> Self {
        Self {
            events,
            settings: Mutex::new(settings),
        }
    }

    fn update(&self, name: &str, update: impl FnOnce(&mut Settings)) -> TaskHandle {
        debug!("Camera2 backend ignores {}", name);
        update(&mut self.settings.lock());
        TaskHandle::completed()
    }

    fn ignore(&self, name: &str) -> TaskHandle {
        debug!("Camera2 backend ignores {}", name);
        TaskHandle::completed()
    }
}

impl CameraController for Camera2Controller {
    fn start(&self) -> TaskHandle {
        warn!("Camera2 backend is not implemented");
        self.events.publish(CameraEvent::Error(CameraError::unavailable(
            "The Camera2 backend is not implemented",
        )));
        TaskHandle::completed()
    }

    fn stop(&self) -> TaskHandle {
        self.ignore("stop")
    }

    fn restart(&self) -> TaskHandle {
        self.start()
    }

    fn shutdown(&self) -> TaskHandle {
        self.ignore("shutdown")
    }

    fn surface_available(&self, _surface: PreviewSurface) -> TaskHandle {
        self.ignore("surface available")
    }

    fn surface_changed(&self, _size: Size) -> TaskHandle {
        self.ignore("surface changed")
    }

    fn surface_destroyed(&self) -> TaskHandle {
        self.ignore("surface destroyed")
    }

    fn set_display_offset(&self, _degrees: u32) {}

    fn set_device_orientation(&self, _degrees: u32) {}

    fn set_facing(&self, facing: Facing) -> TaskHandle {
        self.update("facing", |s| s.facing = facing)
    }

    fn set_flash(&self, flash: Flash) -> TaskHandle {
        self.update("flash", |s| s.flash = flash)
    }

    fn set_white_balance(&self, white_balance: WhiteBalance) -> TaskHandle {
        self.update("white balance", |s| s.white_balance = white_balance)
    }

    fn set_hdr(&self, hdr: Hdr) -> TaskHandle {
        self.update("hdr", |s| s.hdr = hdr)
    }

    fn set_audio(&self, audio: Audio) -> TaskHandle {
        self.update("audio", |s| s.audio = audio)
    }

    fn set_location(&self, location: Option<Location>) -> TaskHandle {
        self.update("location", |s| s.location = location)
    }

    fn set_session_type(&self, session_type: SessionType) -> TaskHandle {
        self.update("session type", |s| s.session_type = session_type)
    }

    fn set_video_quality(&self, quality: VideoQuality) -> TaskHandle {
        self.update("video quality", |s| s.video_quality = quality)
    }

    fn set_zoom(&self, zoom: f32, _points: Vec<Point>, _notify: bool) -> TaskHandle {
        self.update("zoom", |s| s.zoom = zoom)
    }

    fn set_exposure_correction(
        &self,
        value: f32,
        _bounds: (f32, f32),
        _points: Vec<Point>,
        _notify: bool,
    ) -> TaskHandle {
        self.update("exposure correction", |s| s.exposure_correction = value)
    }

    fn capture_picture(&self) -> TaskHandle {
        self.ignore("capture picture")
    }

    fn capture_snapshot(&self) -> TaskHandle {
        self.ignore("capture snapshot")
    }

    fn start_video(&self, _output: PathBuf) -> TaskHandle {
        self.ignore("start video")
    }

    fn end_video(&self) -> TaskHandle {
        self.ignore("end video")
    }

    fn start_auto_focus(&self, _gesture: Option<Gesture>, _point: Point) -> TaskHandle {
        self.ignore("auto focus")
    }

    fn state(&self) -> EngineState {
        EngineState::Stopped
    }

    fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    fn options(&self) -> Option<Arc<CameraOptions>> {
        None
    }

    fn extra_properties(&self) -> Option<ExtraProperties> {
        None
    }

    fn preview_size(&self) -> Option<Size> {
        None
    }

    fn picture_size(&self) -> Option<Size> {
        None
    }

    fn is_capturing_video(&self) -> bool {
        false
    }

    fn frame_stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot::default()
    }
}
