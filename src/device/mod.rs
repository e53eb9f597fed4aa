//! Narrow interface to the hardware camera driver.
//!
//! The engine only talks to the device through [`CameraDriver`], [`DeviceHandle`] and
//! [`Recorder`]. Asynchronous driver callbacks arrive through a [`DeviceEventSink`].

pub mod simulated;

pub use simulated::{Faults, SimulatedDriver, SimulatedStats};

use crate::error::DeviceError;
use crate::focus::MeteringArea;
use crate::frame::PixelFormat;
use crate::settings::{Facing, Flash, Hdr, Location, VideoQuality, WhiteBalance};
use crate::size::Size;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A camera the driver can open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: u32,
    pub facing: Facing,
    /// Clockwise sensor mounting angle in degrees
    pub orientation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Auto,
    ContinuousPicture,
    ContinuousVideo,
    Infinity,
    Fixed,
}

/// Live device configuration, read and written as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceParameters {
    pub preview_size: Size,
    pub picture_size: Size,
    pub preview_format: PixelFormat,
    pub supported_preview_sizes: Vec<Size>,
    pub supported_picture_sizes: Vec<Size>,

    pub flash: Flash,
    pub supported_flash: Vec<Flash>,
    pub white_balance: WhiteBalance,
    pub supported_white_balance: Vec<WhiteBalance>,
    pub hdr: Hdr,
    pub supported_hdr: Vec<Hdr>,

    pub focus_mode: FocusMode,
    pub supported_focus_modes: Vec<FocusMode>,
    pub focus_areas: Vec<MeteringArea>,
    pub metering_areas: Vec<MeteringArea>,
    pub max_num_focus_areas: u32,
    pub max_num_metering_areas: u32,

    pub zoom_supported: bool,
    pub zoom: u32,
    pub max_zoom: u32,

    /// Exposure compensation index, in steps
    pub exposure_compensation: i32,
    pub min_exposure_compensation: i32,
    pub max_exposure_compensation: i32,
    pub exposure_compensation_step: f32,

    pub video_snapshot_supported: bool,
    pub recording_hint: bool,
    /// Rotation applied to captured pictures
    pub rotation: u32,
    pub gps: Option<Location>,

    pub vertical_view_angle: f32,
    pub horizontal_view_angle: f32,
}

/// Native surface kind the preview renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Holder,
    Texture,
}

/// The host's preview surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSurface {
    pub kind: SurfaceKind,
    /// Size in view pixels
    pub size: Size,
}

impl PreviewSurface {
    pub fn new(kind: SurfaceKind, size: Size) -> Self {
        Self { kind, size }
    }
}

/// Encoding parameters for one recording quality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderProfile {
    pub file_format: String,
    pub video_codec: String,
    pub frame_size: Size,
    pub frame_rate: u32,
    pub video_bit_rate: u32,
    pub audio_codec: String,
    pub audio_channels: u32,
    pub audio_sample_rate: u32,
    pub audio_bit_rate: u32,
}

/// Everything a recorder needs before `prepare`
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    pub output: PathBuf,
    pub profile: EncoderProfile,
    pub audio: bool,
    pub location: Option<Location>,
    /// Clockwise rotation hint for players
    pub orientation_hint: u32,
    pub max_duration: Option<Duration>,
}

/// Error codes reported on the camera and recorder error channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorCode {
    /// The media server died; the handle must be recreated
    ServerDied,
    Unknown,
    Other(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderInfo {
    MaxDurationReached,
    Other(i32),
}

/// Asynchronous driver callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A filled preview callback buffer
    PreviewFrame(Vec<u8>),
    /// The frame requested with `request_one_shot_frame`
    OneShotFrame(Vec<u8>),
    Shutter,
    PictureTaken(Vec<u8>),
    AutoFocus { success: bool },
    Error(DeviceErrorCode),
    RecorderError { code: DeviceErrorCode, extra: i32 },
    RecorderInfo { info: RecorderInfo, extra: i32 },
}

/// Where a device delivers its callbacks
#[derive(Clone)]
pub struct DeviceEventSink {
    emit: Arc<dyn Fn(DeviceEvent) + Send + Sync>,
}

impl DeviceEventSink {
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn emit(&self, event: DeviceEvent) {
        (self.emit)(event)
    }
}

impl fmt::Debug for DeviceEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceEventSink")
    }
}

/// Entry point of a camera driver
pub trait CameraDriver: Send + Sync {
    fn cameras(&self) -> Result<Vec<CameraInfo>, DeviceError>;

    fn open(&self, id: u32, events: DeviceEventSink) -> Result<Box<dyn DeviceHandle>, DeviceError>;

    /// Encoder profile for `quality` on camera `id`, if the device has one
    fn encoder_profile(&self, id: u32, quality: VideoQuality) -> Option<EncoderProfile>;
}

/// An open camera device
pub trait DeviceHandle: Send {
    fn parameters(&self) -> Result<DeviceParameters, DeviceError>;

    /// Apply a full parameter set; the driver may reject it
    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), DeviceError>;

    fn set_display_orientation(&mut self, degrees: u32) -> Result<(), DeviceError>;

    fn set_preview_target(&mut self, surface: &PreviewSurface) -> Result<(), DeviceError>;

    fn start_preview(&mut self) -> Result<(), DeviceError>;

    fn stop_preview(&mut self) -> Result<(), DeviceError>;

    /// Enable or disable buffered preview callbacks; disabling drops queued buffers
    fn set_preview_callback(&mut self, enabled: bool) -> Result<(), DeviceError>;

    fn add_callback_buffer(&mut self, buffer: Vec<u8>);

    fn request_one_shot_frame(&mut self) -> Result<(), DeviceError>;

    /// Emits `Shutter` then `PictureTaken`
    fn take_picture(&mut self) -> Result<(), DeviceError>;

    /// Emits `AutoFocus` once focusing settles
    fn auto_focus(&mut self) -> Result<(), DeviceError>;

    fn cancel_auto_focus(&mut self) -> Result<(), DeviceError>;

    fn lock(&mut self) -> Result<(), DeviceError>;

    /// Hand the device over to a recorder
    fn unlock(&mut self) -> Result<(), DeviceError>;

    fn create_recorder(&mut self, settings: &RecorderSettings)
        -> Result<Box<dyn Recorder>, DeviceError>;

    fn release(&mut self) -> Result<(), DeviceError>;
}

/// A video recorder bound to an unlocked device
pub trait Recorder: Send {
    fn prepare(&mut self) -> Result<(), DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    fn set_location(&mut self, latitude: f64, longitude: f64);

    fn release(&mut self);
}

/// First camera with the requested facing
pub fn find_camera(cameras: &[CameraInfo], facing: Facing) -> Option<CameraInfo> {
    cameras.iter().copied().find(|info| info.facing == facing)
}

/// Best encoder profile available for `quality`, falling back to lower qualities
pub fn select_encoder_profile(
    driver: &dyn CameraDriver,
    id: u32,
    quality: VideoQuality,
) -> Option<EncoderProfile> {
    quality
        .fallback_chain()
        .iter()
        .find_map(|candidate| driver.encoder_profile(id, *candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::SimulatedDriver;

    #[test]
    fn test_find_camera_by_facing() {
        let cameras = vec![
            CameraInfo {
                id: 0,
                facing: Facing::Back,
                orientation: 90,
            },
            CameraInfo {
                id: 1,
                facing: Facing::Front,
                orientation: 270,
            },
        ];
        assert_eq!(find_camera(&cameras, Facing::Front).map(|c| c.id), Some(1));
        assert!(find_camera(&cameras[..1], Facing::Front).is_none());
    }

    #[test]
    fn test_encoder_profile_falls_back() {
        let driver = SimulatedDriver::new();
        driver.remove_encoder_profile(VideoQuality::Max720p);

        let profile = select_encoder_profile(&driver, 0, VideoQuality::Max720p).unwrap();
        assert_eq!(profile.frame_size, Size::new(720, 480));

        let profile = select_encoder_profile(&driver, 0, VideoQuality::Highest).unwrap();
        assert_eq!(profile.frame_size, Size::new(1920, 1080));
    }
}
