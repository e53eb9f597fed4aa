//! Camera controllers: the device-facing half of the engine.
//!
//! A controller owns the device on its worker and keeps the host-visible state
//! (desired settings, engine state, capability snapshot) in shared memory so
//! getters never wait on the queue.

mod legacy;
mod stub;
mod worker;

pub(crate) use legacy::LegacyController;
pub(crate) use stub::Camera2Controller;
pub use worker::TaskHandle;

use crate::device::PreviewSurface;
use crate::frame::PoolStatsSnapshot;
use crate::gesture::Gesture;
use crate::options::{CameraOptions, ExtraProperties};
use crate::settings::{
    Audio, Facing, Flash, Hdr, Location, Point, SessionType, Settings, VideoQuality, WhiteBalance,
};
use crate::size::Size;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// Operations every camera backend provides.
///
/// Commands return immediately; the returned [`TaskHandle`] resolves once the
/// worker has processed them. Failures are reported on the event bus.
pub trait CameraController: Send + Sync {
    fn start(&self) -> TaskHandle;
    fn stop(&self) -> TaskHandle;
    fn restart(&self) -> TaskHandle;
    /// Stop the device and end the worker
    fn shutdown(&self) -> TaskHandle;

    fn surface_available(&self, surface: PreviewSurface) -> TaskHandle;
    fn surface_changed(&self, size: Size) -> TaskHandle;
    fn surface_destroyed(&self) -> TaskHandle;
    fn set_display_offset(&self, degrees: u32);
    fn set_device_orientation(&self, degrees: u32);

    fn set_facing(&self, facing: Facing) -> TaskHandle;
    fn set_flash(&self, flash: Flash) -> TaskHandle;
    fn set_white_balance(&self, white_balance: WhiteBalance) -> TaskHandle;
    fn set_hdr(&self, hdr: Hdr) -> TaskHandle;
    fn set_audio(&self, audio: Audio) -> TaskHandle;
    fn set_location(&self, location: Option<Location>) -> TaskHandle;
    fn set_session_type(&self, session_type: SessionType) -> TaskHandle;
    fn set_video_quality(&self, quality: VideoQuality) -> TaskHandle;
    /// `zoom` in `[0, 1]`
    fn set_zoom(&self, zoom: f32, points: Vec<Point>, notify: bool) -> TaskHandle;
    /// `bounds` are echoed in the change notification
    fn set_exposure_correction(
        &self,
        value: f32,
        bounds: (f32, f32),
        points: Vec<Point>,
        notify: bool,
    ) -> TaskHandle;

    fn capture_picture(&self) -> TaskHandle;
    fn capture_snapshot(&self) -> TaskHandle;
    fn start_video(&self, output: PathBuf) -> TaskHandle;
    fn end_video(&self) -> TaskHandle;
    fn start_auto_focus(&self, gesture: Option<Gesture>, point: Point) -> TaskHandle;

    fn state(&self) -> EngineState;
    fn settings(&self) -> Settings;
    fn options(&self) -> Option<Arc<CameraOptions>>;
    fn extra_properties(&self) -> Option<ExtraProperties>;
    /// Preview stream size in view orientation
    fn preview_size(&self) -> Option<Size>;
    /// Picture size in view orientation
    fn picture_size(&self) -> Option<Size>;
    fn is_capturing_video(&self) -> bool;
    fn frame_stats(&self) -> PoolStatsSnapshot;
}
