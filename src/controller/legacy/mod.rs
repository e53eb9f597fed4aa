//! Controller for single-handle camera drivers.
//!
//! Host calls adopt the desired value in [`Shared`] and queue a job; the job
//! runs on the worker against the open device and rolls the value back when
//! the device refuses it.

mod capture;
mod lifecycle;
mod parameters;
mod video;

use super::worker::{spawn_worker, Scheduler, TaskHandle, Timer, WorkerCore};
use super::{CameraController, EngineState};
use crate::config::EngineConfig;
use crate::device::{
    CameraDriver, CameraInfo, DeviceErrorCode, DeviceEvent, DeviceHandle, PreviewSurface,
};
use crate::error::{CameraError, ConfigurationSetting, EngineError};
use crate::events::{CameraEvent, EventBus};
use crate::frame::{FramePool, FrameProcessors, PixelFormat, PoolStats, PoolStatsSnapshot};
use crate::gesture::Gesture;
use crate::options::{CameraOptions, ExtraProperties};
use crate::orientation;
use crate::settings::{
    Audio, Facing, Flash, Hdr, Location, Point, SessionType, Settings, VideoQuality, WhiteBalance,
};
use crate::size::Size;
use capture::PictureMeta;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use video::VideoSession;

/// A setter call travelling from the host to the worker
pub(super) struct PendingParameter<T> {
    setting: ConfigurationSetting,
    desired: T,
    previous: T,
    revision: u64,
    field: fn(&mut Settings) -> &mut T,
}

#[derive(Debug, Default)]
struct Desired {
    settings: Settings,
    revisions: HashMap<ConfigurationSetting, u64>,
}

/// What the open device looks like to the host; sizes in view orientation
#[derive(Debug, Default)]
struct DeviceSnapshot {
    options: Option<Arc<CameraOptions>>,
    extra: Option<ExtraProperties>,
    preview_size: Option<Size>,
    picture_size: Option<Size>,
}

/// State read by host threads and written by the worker
pub(super) struct Shared {
    state: Mutex<EngineState>,
    desired: Mutex<Desired>,
    surface: Mutex<Option<PreviewSurface>>,
    display_offset: AtomicU32,
    device_orientation: AtomicU32,
    snapshot: RwLock<DeviceSnapshot>,
    capturing_image: AtomicBool,
    capturing_video: AtomicBool,
    pool_stats: Arc<PoolStats>,
}

impl Shared {
    fn new(settings: Settings) -> Self {
        Self {
            state: Mutex::new(EngineState::Stopped),
            desired: Mutex::new(Desired {
                settings,
                revisions: HashMap::new(),
            }),
            surface: Mutex::new(None),
            display_offset: AtomicU32::new(0),
            device_orientation: AtomicU32::new(0),
            snapshot: RwLock::new(DeviceSnapshot::default()),
            capturing_image: AtomicBool::new(false),
            capturing_video: AtomicBool::new(false),
            pool_stats: Arc::new(PoolStats::default()),
        }
    }

    fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, state: EngineState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("Engine state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn settings(&self) -> Settings {
        self.desired.lock().settings.clone()
    }

    /// Take `value` as the desired value right away
    fn adopt<T: Clone>(
        &self,
        setting: ConfigurationSetting,
        value: T,
        field: fn(&mut Settings) -> &mut T,
    ) -> PendingParameter<T> {
        let mut desired = self.desired.lock();
        let previous = std::mem::replace(field(&mut desired.settings), value.clone());
        let revision = desired.revisions.entry(setting).or_insert(0);
        *revision += 1;
        PendingParameter {
            setting,
            desired: value,
            previous,
            revision: *revision,
            field,
        }
    }

    /// Whether no newer call for the same setting was made
    fn is_current<T>(&self, pending: &PendingParameter<T>) -> bool {
        self.desired.lock().revisions.get(&pending.setting).copied() == Some(pending.revision)
    }

    /// Replace the desired value unless a newer call superseded `pending`
    fn replace_if_current<T>(&self, pending: &PendingParameter<T>, value: T) {
        let mut desired = self.desired.lock();
        if desired.revisions.get(&pending.setting).copied() == Some(pending.revision) {
            *(pending.field)(&mut desired.settings) = value;
        }
    }

    /// Overwrite a desired value, invalidating calls still in flight
    fn reset<T>(&self, setting: ConfigurationSetting, field: fn(&mut Settings) -> &mut T, value: T) {
        let mut desired = self.desired.lock();
        *field(&mut desired.settings) = value;
        *desired.revisions.entry(setting).or_insert(0) += 1;
    }

    fn surface(&self) -> Option<PreviewSurface> {
        *self.surface.lock()
    }

    fn display_offset(&self) -> u32 {
        self.display_offset.load(Ordering::Relaxed)
    }

    fn device_orientation(&self) -> u32 {
        self.device_orientation.load(Ordering::Relaxed)
    }

    fn options(&self) -> Option<Arc<CameraOptions>> {
        self.snapshot.read().options.clone()
    }

    fn clear_snapshot(&self) {
        *self.snapshot.write() = DeviceSnapshot::default();
    }
}

/// Worker-side state: the device and everything derived from it
pub(super) struct LegacyCore {
    driver: Arc<dyn CameraDriver>,
    shared: Arc<Shared>,
    events: EventBus,
    processors: FrameProcessors,
    scheduler: Scheduler<LegacyCore>,

    device: Option<Box<dyn DeviceHandle>>,
    camera: Option<CameraInfo>,
    /// Values the device last accepted; rollbacks restore these
    committed: Settings,
    /// Incremented on every open; device callbacks carry the value they were created with
    session: u64,
    bound: bool,
    /// Sensor orientation
    preview_size: Option<Size>,
    /// Sensor orientation
    picture_size: Option<Size>,
    preview_format: PixelFormat,
    pool: FramePool,

    focus_reset: Timer,
    video_limit: Timer,
    pending_focus: Option<(Option<Gesture>, Point)>,
    pending_snapshot: bool,
    picture_meta: Option<PictureMeta>,
    video: Option<VideoSession>,

    post_focus_reset_delay: Duration,
    max_video_duration: Option<Duration>,
}

fn not_open() -> CameraError {
    CameraError::unavailable("Camera is not open")
}

impl LegacyCore {
    fn options(&self) -> Result<Arc<CameraOptions>, CameraError> {
        self.shared.options().ok_or_else(not_open)
    }

    fn camera(&self) -> Result<CameraInfo, CameraError> {
        self.camera.ok_or_else(not_open)
    }

    fn sensor_to_view(&self) -> u32 {
        self.camera.map_or(0, |camera| {
            orientation::sensor_to_view(
                camera.facing,
                camera.orientation,
                self.shared.display_offset(),
            )
        })
    }

    fn sensor_to_output(&self) -> u32 {
        self.camera.map_or(0, |camera| {
            orientation::sensor_to_output(
                camera.facing,
                camera.orientation,
                self.shared.device_orientation(),
            )
        })
    }

    fn flip_sizes(&self) -> bool {
        self.camera
            .is_some_and(|camera| orientation::should_flip_sizes(camera.orientation))
    }

    /// A sensor-oriented size as the view sees it
    fn to_view(&self, size: Size) -> Size {
        if self.flip_sizes() {
            size.flip()
        } else {
            size
        }
    }

    fn on_device_event(&mut self, session: u64, event: DeviceEvent) -> Result<(), CameraError> {
        if session != self.session || self.device.is_none() {
            trace!("Ignoring device event from closed session {}", session);
            return Ok(());
        }

        match event {
            DeviceEvent::PreviewFrame(data) => {
                self.on_preview_frame(data);
                Ok(())
            }
            DeviceEvent::OneShotFrame(data) => self.on_snapshot_frame(data),
            DeviceEvent::Shutter => {
                self.events.publish(CameraEvent::Shutter { snapshot: false });
                Ok(())
            }
            DeviceEvent::PictureTaken(data) => self.on_picture_taken(data),
            DeviceEvent::AutoFocus { success } => {
                self.on_auto_focus(success);
                Ok(())
            }
            DeviceEvent::Error(code) => self.on_device_error(code),
            DeviceEvent::RecorderError { code, extra } => self.on_recorder_error(code, extra),
            DeviceEvent::RecorderInfo { info, extra } => {
                self.on_recorder_info(info, extra);
                Ok(())
            }
        }
    }

    fn on_device_error(&mut self, code: DeviceErrorCode) -> Result<(), CameraError> {
        match code {
            DeviceErrorCode::ServerDied if self.video.is_some() => Err(self.video_failed(
                "Media server died while recording a video",
                None,
            )),
            DeviceErrorCode::ServerDied => {
                warn!("Media server died, restarting the camera");
                self.restart()
            }
            DeviceErrorCode::Unknown => Err(CameraError::configuration(
                ConfigurationSetting::Unknown,
                "Unspecified camera error",
            )),
            DeviceErrorCode::Other(code) => Err(CameraError::configuration(
                ConfigurationSetting::Other,
                format!("Received camera error code {}", code),
            )),
        }
    }
}

impl WorkerCore for LegacyCore {
    fn is_available(&self) -> bool {
        self.device.is_some()
    }

    fn on_job_failed(&mut self, name: &'static str, error: CameraError) {
        let unrecoverable = error.is_unrecoverable();
        self.events.publish(CameraEvent::Error(error));
        if unrecoverable && self.device.is_some() {
            warn!("'{}' left the camera unusable, stopping it", name);
            self.stop_immediately();
        }
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error while shutting down the camera: {}", e);
        }
    }
}

/// [`CameraController`] backed by a [`CameraDriver`]
pub(crate) struct LegacyController {
    scheduler: Scheduler<LegacyCore>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LegacyController {
    /// Spawn the worker; needs a running tokio runtime
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        config: &EngineConfig,
        events: EventBus,
        processors: FrameProcessors,
    ) -> Result<Self, EngineError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::system(
                "The camera worker must be created inside a tokio runtime",
            ));
        }

        let initial = config.initial_settings();
        let shared = Arc::new(Shared::new(initial.clone()));
        let (scheduler, inbox) = Scheduler::channel();
        let core = LegacyCore {
            driver,
            shared: Arc::clone(&shared),
            events,
            processors,
            scheduler: scheduler.clone(),
            device: None,
            camera: None,
            committed: initial,
            session: 0,
            bound: false,
            preview_size: None,
            picture_size: None,
            preview_format: PixelFormat::default(),
            pool: FramePool::with_stats(
                config.preview.frame_pool_size,
                Arc::clone(&shared.pool_stats),
            ),
            focus_reset: Timer::new(),
            video_limit: Timer::new(),
            pending_focus: None,
            pending_snapshot: false,
            picture_meta: None,
            video: None,
            post_focus_reset_delay: config.post_focus_reset_delay(),
            max_video_duration: config.max_video_duration(),
        };
        let worker = spawn_worker(core, inbox);
        info!("Legacy camera controller ready");

        Ok(Self {
            scheduler,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }
}

impl Drop for LegacyController {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        if let Some(worker) = self.worker.lock().take() {
            if worker.is_finished() {
                trace!("Camera worker already stopped");
            }
        }
    }
}

impl CameraController for LegacyController {
    fn start(&self) -> TaskHandle {
        self.scheduler.schedule("start", false, |core| core.start())
    }

    fn stop(&self) -> TaskHandle {
        self.scheduler.schedule("stop", false, |core| core.stop())
    }

    fn restart(&self) -> TaskHandle {
        self.scheduler.schedule("restart", false, |core| core.restart())
    }

    fn shutdown(&self) -> TaskHandle {
        self.scheduler.shutdown()
    }

    fn surface_available(&self, surface: PreviewSurface) -> TaskHandle {
        debug!("Surface available: {:?} {}", surface.kind, surface.size);
        *self.shared.surface.lock() = Some(surface);
        self.scheduler
            .schedule("surface available", true, |core| core.on_surface_available())
    }

    fn surface_changed(&self, size: Size) -> TaskHandle {
        debug!("Surface changed to {}", size);
        if let Some(surface) = self.shared.surface.lock().as_mut() {
            surface.size = size;
        }
        self.scheduler
            .schedule("surface changed", true, |core| core.on_surface_changed())
    }

    fn surface_destroyed(&self) -> TaskHandle {
        debug!("Surface destroyed");
        *self.shared.surface.lock() = None;
        self.scheduler
            .schedule("surface destroyed", false, |core| core.on_surface_destroyed())
    }

    fn set_display_offset(&self, degrees: u32) {
        self.shared
            .display_offset
            .store(degrees % 360, Ordering::Relaxed);
    }

    fn set_device_orientation(&self, degrees: u32) {
        self.shared
            .device_orientation
            .store(degrees % 360, Ordering::Relaxed);
    }

    fn set_facing(&self, facing: Facing) -> TaskHandle {
        let pending = self
            .shared
            .adopt(ConfigurationSetting::Facing, facing, |s| &mut s.facing);
        self.scheduler
            .schedule("set facing", true, move |core| core.apply_facing(pending))
    }

    fn set_flash(&self, flash: Flash) -> TaskHandle {
        let pending = self
            .shared
            .adopt(ConfigurationSetting::Flash, flash, |s| &mut s.flash);
        self.scheduler
            .schedule("set flash", true, move |core| core.apply_setting(pending))
    }

    fn set_white_balance(&self, white_balance: WhiteBalance) -> TaskHandle {
        let pending = self.shared.adopt(
            ConfigurationSetting::WhiteBalance,
            white_balance,
            |s| &mut s.white_balance,
        );
        self.scheduler
            .schedule("set white balance", true, move |core| core.apply_setting(pending))
    }

    fn set_hdr(&self, hdr: Hdr) -> TaskHandle {
        let pending = self
            .shared
            .adopt(ConfigurationSetting::Hdr, hdr, |s| &mut s.hdr);
        self.scheduler
            .schedule("set hdr", true, move |core| core.apply_setting(pending))
    }

    fn set_audio(&self, audio: Audio) -> TaskHandle {
        self.shared
            .adopt(ConfigurationSetting::Audio, audio, |s| &mut s.audio);
        if self.shared.capturing_video.load(Ordering::Relaxed) {
            warn!("Audio changed while recording, it applies to the next video");
        }
        TaskHandle::completed()
    }

    fn set_location(&self, location: Option<Location>) -> TaskHandle {
        let pending = self
            .shared
            .adopt(ConfigurationSetting::Location, location, |s| &mut s.location);
        self.scheduler
            .schedule("set location", true, move |core| core.apply_location(pending))
    }

    fn set_session_type(&self, session_type: SessionType) -> TaskHandle {
        let pending = self.shared.adopt(
            ConfigurationSetting::SessionType,
            session_type,
            |s| &mut s.session_type,
        );
        self.scheduler.schedule("set session type", true, move |core| {
            core.apply_session_type(pending)
        })
    }

    fn set_video_quality(&self, quality: VideoQuality) -> TaskHandle {
        let pending = self.shared.adopt(
            ConfigurationSetting::VideoQuality,
            quality,
            |s| &mut s.video_quality,
        );
        self.scheduler.schedule("set video quality", true, move |core| {
            core.apply_video_quality(pending)
        })
    }

    fn set_zoom(&self, zoom: f32, points: Vec<Point>, notify: bool) -> TaskHandle {
        let pending = self
            .shared
            .adopt(ConfigurationSetting::Zoom, zoom, |s| &mut s.zoom);
        self.scheduler.schedule("set zoom", true, move |core| {
            core.apply_zoom(pending, points, notify)
        })
    }

    fn set_exposure_correction(
        &self,
        value: f32,
        bounds: (f32, f32),
        points: Vec<Point>,
        notify: bool,
    ) -> TaskHandle {
        let pending = self.shared.adopt(
            ConfigurationSetting::ExposureCorrection,
            value,
            |s| &mut s.exposure_correction,
        );
        self.scheduler
            .schedule("set exposure correction", true, move |core| {
                core.apply_exposure_correction(pending, bounds, points, notify)
            })
    }

    fn capture_picture(&self) -> TaskHandle {
        self.scheduler
            .schedule("capture picture", true, |core| core.capture_picture())
    }

    fn capture_snapshot(&self) -> TaskHandle {
        self.scheduler
            .schedule("capture snapshot", true, |core| core.capture_snapshot())
    }

    fn start_video(&self, output: PathBuf) -> TaskHandle {
        self.scheduler
            .schedule("start video", true, move |core| core.start_video(output))
    }

    fn end_video(&self) -> TaskHandle {
        self.scheduler.schedule("end video", false, |core| {
            core.end_video();
            Ok(())
        })
    }

    fn start_auto_focus(&self, gesture: Option<Gesture>, point: Point) -> TaskHandle {
        self.scheduler.schedule("start auto focus", true, move |core| {
            core.start_auto_focus(gesture, point)
        })
    }

    fn state(&self) -> EngineState {
        self.shared.state()
    }

    fn settings(&self) -> Settings {
        self.shared.settings()
    }

    fn options(&self) -> Option<Arc<CameraOptions>> {
        self.shared.options()
    }

    fn extra_properties(&self) -> Option<ExtraProperties> {
        self.shared.snapshot.read().extra
    }

    fn preview_size(&self) -> Option<Size> {
        self.shared.snapshot.read().preview_size
    }

    fn picture_size(&self) -> Option<Size> {
        self.shared.snapshot.read().picture_size
    }

    fn is_capturing_video(&self) -> bool {
        self.shared.capturing_video.load(Ordering::Relaxed)
    }

    fn frame_stats(&self) -> PoolStatsSnapshot {
        self.shared.pool_stats.snapshot()
    }
}
