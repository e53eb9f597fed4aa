//! In-memory camera driver.
//!
//! Behaves like a two-camera phone: a back camera mounted at 90 degrees with the
//! full feature set and a front camera mounted at 270 degrees with fixed focus,
//! no zoom and no flash. Faults can be injected to exercise error paths.

use super::{
    CameraDriver, CameraInfo, DeviceEvent, DeviceEventSink, DeviceHandle, DeviceParameters,
    EncoderProfile, FocusMode, PreviewSurface, Recorder, RecorderSettings,
};
use crate::error::DeviceError;
use crate::frame::PixelFormat;
use crate::settings::{Facing, Flash, Hdr, VideoQuality, WhiteBalance};
use crate::size::Size;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Faults the simulated device injects
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Fail camera enumeration
    pub fail_camera_list: bool,
    pub fail_open: bool,
    pub fail_release: bool,
    /// Reject every `set_parameters` call
    pub reject_parameters: bool,
    pub fail_take_picture: bool,
    pub fail_recorder_start: bool,
    /// Report auto focus as failed
    pub auto_focus_fails: bool,
}

/// Call counters for assertions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    pub opens: u64,
    pub releases: u64,
    pub parameter_writes: u64,
    pub preview_starts: u64,
    pub pictures: u64,
    pub auto_focus_requests: u64,
    pub auto_focus_cancels: u64,
    pub recorders_started: u64,
}

struct OpenDevice {
    id: u32,
    token: u64,
    params: DeviceParameters,
    sink: DeviceEventSink,
    surface: Option<PreviewSurface>,
    display_orientation: u32,
    previewing: bool,
    callbacks: bool,
    buffers: VecDeque<Vec<u8>>,
    locked: bool,
}

struct SimulatedState {
    cameras: Vec<CameraInfo>,
    templates: HashMap<u32, DeviceParameters>,
    profiles: HashMap<VideoQuality, EncoderProfile>,
    faults: Faults,
    stats: SimulatedStats,
    next_token: u64,
    open: Option<OpenDevice>,
}

/// Cloneable handle to the simulated hardware
#[derive(Clone)]
pub struct SimulatedDriver {
    state: Arc<Mutex<SimulatedState>>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    pub fn new() -> Self {
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
        let mut templates = HashMap::new();
        templates.insert(0, back_parameters());
        templates.insert(1, front_parameters());

        Self {
            state: Arc::new(Mutex::new(SimulatedState {
                cameras,
                templates,
                profiles: default_profiles(),
                faults: Faults::default(),
                stats: SimulatedStats::default(),
                next_token: 0,
                open: None,
            })),
        }
    }

    /// Keep only the cameras with the given facing
    pub fn with_only(self, facing: Facing) -> Self {
        self.state.lock().cameras.retain(|info| info.facing == facing);
        self
    }

    /// Change the parameters of camera `id`, including a currently open one
    pub fn configure<F>(&self, id: u32, update: F)
    where
        F: Fn(&mut DeviceParameters),
    {
        let mut state = self.state.lock();
        if let Some(template) = state.templates.get_mut(&id) {
            update(template);
        }
        if let Some(open) = state.open.as_mut().filter(|open| open.id == id) {
            update(&mut open.params);
        }
    }

    pub fn faults<F>(&self, update: F)
    where
        F: FnOnce(&mut Faults),
    {
        update(&mut self.state.lock().faults);
    }

    pub fn remove_encoder_profile(&self, quality: VideoQuality) {
        self.state.lock().profiles.remove(&quality);
    }

    pub fn stats(&self) -> SimulatedStats {
        self.state.lock().stats.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open.is_some()
    }

    pub fn open_camera_id(&self) -> Option<u32> {
        self.state.lock().open.as_ref().map(|open| open.id)
    }

    pub fn is_previewing(&self) -> bool {
        self.state
            .lock()
            .open
            .as_ref()
            .is_some_and(|open| open.previewing)
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().open.as_ref().is_some_and(|open| open.locked)
    }

    pub fn display_orientation(&self) -> Option<u32> {
        self.state
            .lock()
            .open
            .as_ref()
            .map(|open| open.display_orientation)
    }

    /// Parameters of the open device as last written
    pub fn live_parameters(&self) -> Option<DeviceParameters> {
        self.state.lock().open.as_ref().map(|open| open.params.clone())
    }

    /// Number of callback buffers waiting to be filled
    pub fn queued_buffers(&self) -> usize {
        self.state
            .lock()
            .open
            .as_ref()
            .map_or(0, |open| open.buffers.len())
    }

    /// Fill the next callback buffer and deliver it; false if none is available
    pub fn emit_preview_frame(&self) -> bool {
        let (sink, buffer) = {
            let mut state = self.state.lock();
            let Some(open) = state.open.as_mut() else {
                return false;
            };
            if !open.previewing || !open.callbacks {
                return false;
            }
            let Some(mut buffer) = open.buffers.pop_front() else {
                trace!("Preview frame dropped, no callback buffer queued");
                return false;
            };
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = (i % 251) as u8;
            }
            (open.sink.clone(), buffer)
        };
        sink.emit(DeviceEvent::PreviewFrame(buffer));
        true
    }

    /// Deliver an arbitrary event from the open device
    pub fn emit(&self, event: DeviceEvent) -> bool {
        let sink = match self.state.lock().open.as_ref() {
            Some(open) => open.sink.clone(),
            None => return false,
        };
        sink.emit(event);
        true
    }
}

impl CameraDriver for SimulatedDriver {
    fn cameras(&self) -> Result<Vec<CameraInfo>, DeviceError> {
        let state = self.state.lock();
        if state.faults.fail_camera_list {
            return Err(DeviceError::driver("simulated camera list failure"));
        }
        Ok(state.cameras.clone())
    }

    fn open(&self, id: u32, events: DeviceEventSink) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        let mut state = self.state.lock();
        if state.faults.fail_open {
            return Err(DeviceError::Open {
                id,
                details: "simulated open failure".to_string(),
            });
        }
        if state.open.is_some() {
            return Err(DeviceError::Open {
                id,
                details: "camera is in use".to_string(),
            });
        }
        let params = state.templates.get(&id).cloned().ok_or(DeviceError::Open {
            id,
            details: "no such camera".to_string(),
        })?;

        state.next_token += 1;
        let token = state.next_token;
        state.stats.opens += 1;
        state.open = Some(OpenDevice {
            id,
            token,
            params,
            sink: events,
            surface: None,
            display_orientation: 0,
            previewing: false,
            callbacks: false,
            buffers: VecDeque::new(),
            locked: true,
        });
        info!("Simulated camera {} opened", id);

        Ok(Box::new(SimulatedDevice {
            state: Arc::clone(&self.state),
            token,
        }))
    }

    fn encoder_profile(&self, _id: u32, quality: VideoQuality) -> Option<EncoderProfile> {
        self.state.lock().profiles.get(&quality).cloned()
    }
}

struct SimulatedDevice {
    state: Arc<Mutex<SimulatedState>>,
    token: u64,
}

impl SimulatedDevice {
    fn with_open<T>(
        &self,
        action: impl FnOnce(&mut OpenDevice, &mut SimulatedStats, &Faults) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.open.as_mut() {
            Some(open) if open.token == self.token => {
                action(open, &mut state.stats, &state.faults)
            }
            _ => Err(DeviceError::driver("camera has been released")),
        }
    }
}

impl DeviceHandle for SimulatedDevice {
    fn parameters(&self) -> Result<DeviceParameters, DeviceError> {
        self.with_open(|open, _, _| Ok(open.params.clone()))
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), DeviceError> {
        self.with_open(|open, stats, faults| {
            if faults.reject_parameters {
                return Err(DeviceError::rejected("simulated rejection"));
            }
            validate(params)?;
            if open.previewing && params.preview_size != open.params.preview_size {
                return Err(DeviceError::rejected("preview size changed during preview"));
            }
            open.params = params.clone();
            stats.parameter_writes += 1;
            trace!("Simulated camera {} parameters updated", open.id);
            Ok(())
        })
    }

    fn set_display_orientation(&mut self, degrees: u32) -> Result<(), DeviceError> {
        self.with_open(|open, _, _| {
            if open.previewing {
                return Err(DeviceError::driver("display orientation set during preview"));
            }
            open.display_orientation = degrees;
            Ok(())
        })
    }

    fn set_preview_target(&mut self, surface: &PreviewSurface) -> Result<(), DeviceError> {
        self.with_open(|open, _, _| {
            open.surface = Some(*surface);
            Ok(())
        })
    }

    fn start_preview(&mut self) -> Result<(), DeviceError> {
        self.with_open(|open, stats, _| {
            if open.surface.is_none() {
                return Err(DeviceError::driver("no preview target"));
            }
            open.previewing = true;
            stats.preview_starts += 1;
            debug!("Simulated camera {} preview started at {}", open.id, open.params.preview_size);
            Ok(())
        })
    }

    fn stop_preview(&mut self) -> Result<(), DeviceError> {
        self.with_open(|open, _, _| {
            open.previewing = false;
            Ok(())
        })
    }

    fn set_preview_callback(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.with_open(|open, _, _| {
            open.callbacks = enabled;
            if !enabled {
                open.buffers.clear();
            }
            Ok(())
        })
    }

    fn add_callback_buffer(&mut self, buffer: Vec<u8>) {
        let _ = self.with_open(|open, _, _| {
            open.buffers.push_back(buffer);
            Ok(())
        });
    }

    fn request_one_shot_frame(&mut self) -> Result<(), DeviceError> {
        let (sink, frame) = self.with_open(|open, _, _| {
            if !open.previewing {
                return Err(DeviceError::driver("preview is not running"));
            }
            // Buffered callbacks are dropped once a one-shot frame is delivered.
            open.buffers.clear();
            let size = open.params.preview_format.buffer_size(open.params.preview_size);
            let frame = (0..size).map(|i| (i % 256) as u8).collect::<Vec<u8>>();
            Ok((open.sink.clone(), frame))
        })?;
        sink.emit(DeviceEvent::OneShotFrame(frame));
        Ok(())
    }

    fn take_picture(&mut self) -> Result<(), DeviceError> {
        let (sink, picture) = self.with_open(|open, stats, faults| {
            if faults.fail_take_picture {
                return Err(DeviceError::driver("simulated capture failure"));
            }
            if !open.previewing {
                return Err(DeviceError::driver("preview is not running"));
            }
            open.previewing = false;
            stats.pictures += 1;
            Ok((open.sink.clone(), fake_jpeg(open.params.picture_size)))
        })?;
        sink.emit(DeviceEvent::Shutter);
        sink.emit(DeviceEvent::PictureTaken(picture));
        Ok(())
    }

    fn auto_focus(&mut self) -> Result<(), DeviceError> {
        let (sink, success) = self.with_open(|open, stats, faults| {
            if open.params.focus_mode != FocusMode::Auto {
                return Err(DeviceError::driver("focus mode is not auto"));
            }
            stats.auto_focus_requests += 1;
            Ok((open.sink.clone(), !faults.auto_focus_fails))
        })?;
        sink.emit(DeviceEvent::AutoFocus { success });
        Ok(())
    }

    fn cancel_auto_focus(&mut self) -> Result<(), DeviceError> {
        self.with_open(|_, stats, _| {
            stats.auto_focus_cancels += 1;
            Ok(())
        })
    }

    fn lock(&mut self) -> Result<(), DeviceError> {
        self.with_open(|open, _, _| {
            open.locked = true;
            Ok(())
        })
    }

    fn unlock(&mut self) -> Result<(), DeviceError> {
        self.with_open(|open, _, _| {
            open.locked = false;
            Ok(())
        })
    }

    fn create_recorder(
        &mut self,
        settings: &RecorderSettings,
    ) -> Result<Box<dyn Recorder>, DeviceError> {
        let fail_start = self.with_open(|open, _, faults| {
            if open.locked {
                return Err(DeviceError::driver("camera must be unlocked for recording"));
            }
            Ok(faults.fail_recorder_start)
        })?;
        Ok(Box::new(SimulatedRecorder {
            state: Arc::clone(&self.state),
            settings: settings.clone(),
            fail_start,
            file: None,
            started: false,
        }))
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.faults.fail_release {
            // The device is gone either way.
            state.open = None;
            return Err(DeviceError::driver("simulated release failure"));
        }
        match state.open.take() {
            Some(open) if open.token == self.token => {
                state.stats.releases += 1;
                info!("Simulated camera {} released", open.id);
                Ok(())
            }
            other => {
                state.open = other;
                Err(DeviceError::driver("camera has been released"))
            }
        }
    }
}

struct SimulatedRecorder {
    state: Arc<Mutex<SimulatedState>>,
    settings: RecorderSettings,
    fail_start: bool,
    file: Option<File>,
    started: bool,
}

impl Recorder for SimulatedRecorder {
    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.file = Some(File::create(&self.settings.output)?);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.fail_start {
            return Err(DeviceError::driver("simulated recorder start failure"));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DeviceError::driver("recorder not prepared"))?;
        writeln!(
            file,
            "{} {} {}",
            self.settings.profile.file_format,
            self.settings.profile.video_codec,
            self.settings.profile.frame_size
        )?;
        self.started = true;
        self.state.lock().stats.recorders_started += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if !self.started {
            return Err(DeviceError::driver("recorder was not started"));
        }
        self.started = false;
        let mut file = OpenOptions::new().append(true).open(&self.settings.output)?;
        writeln!(file, "end")?;
        Ok(())
    }

    fn set_location(&mut self, latitude: f64, longitude: f64) {
        trace!("Recorder location {:.5}, {:.5}", latitude, longitude);
    }

    fn release(&mut self) {
        self.file = None;
    }
}

fn validate(params: &DeviceParameters) -> Result<(), DeviceError> {
    let reject = |what: &str| Err(DeviceError::rejected(what.to_string()));
    if !params.supported_flash.contains(&params.flash) {
        return reject("flash");
    }
    if !params.supported_white_balance.contains(&params.white_balance) {
        return reject("white balance");
    }
    if !params.supported_hdr.contains(&params.hdr) {
        return reject("scene mode");
    }
    if !params.supported_focus_modes.contains(&params.focus_mode) {
        return reject("focus mode");
    }
    if !params.supported_preview_sizes.contains(&params.preview_size) {
        return reject("preview size");
    }
    if !params.supported_picture_sizes.contains(&params.picture_size) {
        return reject("picture size");
    }
    if params.zoom > params.max_zoom {
        return reject("zoom");
    }
    if params.exposure_compensation < params.min_exposure_compensation
        || params.exposure_compensation > params.max_exposure_compensation
    {
        return reject("exposure compensation");
    }
    if params.focus_areas.len() > params.max_num_focus_areas as usize
        || params.metering_areas.len() > params.max_num_metering_areas as usize
    {
        return reject("focus areas");
    }
    Ok(())
}

fn fake_jpeg(size: Size) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.extend_from_slice(format!("{}", size).as_bytes());
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

fn back_parameters() -> DeviceParameters {
    DeviceParameters {
        preview_size: Size::new(640, 480),
        picture_size: Size::new(640, 480),
        preview_format: PixelFormat::Nv21,
        supported_preview_sizes: vec![
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(1280, 720),
            Size::new(960, 720),
            Size::new(640, 480),
            Size::new(352, 288),
            Size::new(176, 144),
        ],
        supported_picture_sizes: vec![
            Size::new(4032, 3024),
            Size::new(3840, 2160),
            Size::new(1920, 1080),
            Size::new(1280, 960),
            Size::new(640, 480),
        ],
        flash: Flash::Off,
        supported_flash: vec![Flash::Off, Flash::On, Flash::Auto, Flash::Torch],
        white_balance: WhiteBalance::Auto,
        supported_white_balance: vec![
            WhiteBalance::Auto,
            WhiteBalance::Daylight,
            WhiteBalance::Cloudy,
        ],
        hdr: Hdr::Off,
        supported_hdr: vec![Hdr::Off, Hdr::On],
        focus_mode: FocusMode::Auto,
        supported_focus_modes: vec![
            FocusMode::Auto,
            FocusMode::ContinuousPicture,
            FocusMode::ContinuousVideo,
            FocusMode::Infinity,
            FocusMode::Fixed,
        ],
        focus_areas: Vec::new(),
        metering_areas: Vec::new(),
        max_num_focus_areas: 2,
        max_num_metering_areas: 1,
        zoom_supported: true,
        zoom: 0,
        max_zoom: 30,
        exposure_compensation: 0,
        min_exposure_compensation: -20,
        max_exposure_compensation: 20,
        exposure_compensation_step: 0.5,
        video_snapshot_supported: true,
        recording_hint: false,
        rotation: 0,
        gps: None,
        vertical_view_angle: 50.0,
        horizontal_view_angle: 62.0,
    }
}

fn front_parameters() -> DeviceParameters {
    DeviceParameters {
        supported_preview_sizes: vec![
            Size::new(1280, 720),
            Size::new(640, 480),
            Size::new(320, 240),
        ],
        supported_picture_sizes: vec![Size::new(2560, 1440), Size::new(1280, 720), Size::new(640, 480)],
        supported_flash: vec![Flash::Off],
        supported_hdr: vec![Hdr::Off],
        focus_mode: FocusMode::Fixed,
        supported_focus_modes: vec![FocusMode::Fixed],
        max_num_focus_areas: 0,
        max_num_metering_areas: 0,
        zoom_supported: false,
        max_zoom: 0,
        min_exposure_compensation: -4,
        max_exposure_compensation: 4,
        video_snapshot_supported: false,
        vertical_view_angle: 60.0,
        horizontal_view_angle: 72.0,
        ..back_parameters()
    }
}

fn profile(width: u32, height: u32, bit_rate: u32) -> EncoderProfile {
    EncoderProfile {
        file_format: "mpeg4".to_string(),
        video_codec: "h264".to_string(),
        frame_size: Size::new(width, height),
        frame_rate: 30,
        video_bit_rate: bit_rate,
        audio_codec: "aac".to_string(),
        audio_channels: 2,
        audio_sample_rate: 48_000,
        audio_bit_rate: 96_000,
    }
}

fn default_profiles() -> HashMap<VideoQuality, EncoderProfile> {
    HashMap::from([
        (VideoQuality::Highest, profile(1920, 1080, 17_000_000)),
        (VideoQuality::Max1080p, profile(1920, 1080, 17_000_000)),
        (VideoQuality::Max720p, profile(1280, 720, 12_000_000)),
        (VideoQuality::Max480p, profile(720, 480, 2_000_000)),
        (VideoQuality::MaxQvga, profile(320, 240, 512_000)),
        (VideoQuality::Lowest, profile(176, 144, 192_000)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SurfaceKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sink() -> (DeviceEventSink, Arc<Mutex<Vec<DeviceEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        let sink = DeviceEventSink::new(move |event| sink_events.lock().push(event));
        (sink, events)
    }

    #[test]
    fn test_open_is_exclusive() {
        let driver = SimulatedDriver::new();
        let (sink, _) = counting_sink();
        let mut device = driver.open(0, sink.clone()).unwrap();
        assert!(driver.open(1, sink).is_err());

        device.release().unwrap();
        assert!(!driver.is_open());
        assert!(device.parameters().is_err());
        assert_eq!(driver.stats().releases, 1);
    }

    #[test]
    fn test_rejects_unsupported_values() {
        let driver = SimulatedDriver::new();
        let (sink, _) = counting_sink();
        let mut device = driver.open(0, sink).unwrap();

        let mut params = device.parameters().unwrap();
        params.white_balance = WhiteBalance::Incandescent;
        assert!(matches!(
            device.set_parameters(&params),
            Err(DeviceError::Rejected { .. })
        ));

        params.white_balance = WhiteBalance::Daylight;
        device.set_parameters(&params).unwrap();
        assert_eq!(
            driver.live_parameters().unwrap().white_balance,
            WhiteBalance::Daylight
        );
    }

    #[test]
    fn test_preview_frames_consume_buffers() {
        let driver = SimulatedDriver::new();
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);
        let sink = DeviceEventSink::new(move |event| {
            if let DeviceEvent::PreviewFrame(_) = event {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let mut device = driver.open(0, sink).unwrap();
        device
            .set_preview_target(&PreviewSurface::new(
                SurfaceKind::Texture,
                Size::new(480, 640),
            ))
            .unwrap();
        device.set_preview_callback(true).unwrap();
        device.add_callback_buffer(vec![0; 16]);
        device.start_preview().unwrap();

        assert!(driver.emit_preview_frame());
        assert!(!driver.emit_preview_frame());
        assert_eq!(frames.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_take_picture_emits_shutter_then_data() {
        let driver = SimulatedDriver::new();
        let (sink, events) = counting_sink();
        let mut device = driver.open(0, sink).unwrap();
        device
            .set_preview_target(&PreviewSurface::new(
                SurfaceKind::Holder,
                Size::new(480, 640),
            ))
            .unwrap();
        device.start_preview().unwrap();
        device.take_picture().unwrap();

        let events = events.lock();
        assert_eq!(events[0], DeviceEvent::Shutter);
        assert!(matches!(events[1], DeviceEvent::PictureTaken(_)));
        assert!(!driver.is_previewing());
    }
}
