use super::parameters::DeviceSetting;
use super::{not_open, LegacyCore};
use crate::controller::EngineState;
use crate::device::{
    find_camera, select_encoder_profile, DeviceEventSink, DeviceParameters, FocusMode,
};
use crate::error::{CameraError, DeviceError};
use crate::events::CameraEvent;
use crate::options::{CameraOptions, ExtraProperties};
use crate::orientation::should_flip_sizes;
use crate::settings::{Flash, Hdr, SessionType, WhiteBalance};
use crate::size::{dedup_sizes, Size, SizeSelector};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Focus mode to fall back to when no tap-to-focus is active
pub(super) fn default_focus_mode(params: &DeviceParameters, session: SessionType) -> FocusMode {
    let preferred: &[FocusMode] = match session {
        SessionType::Video => &[
            FocusMode::ContinuousVideo,
            FocusMode::ContinuousPicture,
            FocusMode::Infinity,
            FocusMode::Fixed,
        ],
        SessionType::Picture => &[
            FocusMode::ContinuousPicture,
            FocusMode::Infinity,
            FocusMode::Fixed,
        ],
    };
    preferred
        .iter()
        .copied()
        .find(|mode| params.supported_focus_modes.contains(mode))
        .unwrap_or(params.focus_mode)
}

impl LegacyCore {
    pub(super) fn start(&mut self) -> Result<(), CameraError> {
        match self.shared.state() {
            EngineState::Starting | EngineState::Started => {
                debug!("Camera already started");
                return Ok(());
            }
            EngineState::Stopped | EngineState::Stopping => {}
        }

        info!("Starting camera");
        self.shared.set_state(EngineState::Starting);
        match self.on_start() {
            Ok(options) => {
                self.committed = self.shared.settings();
                self.shared.set_state(EngineState::Started);
                self.events.publish(CameraEvent::Opened { options });
                Ok(())
            }
            Err(e) => {
                self.stop_immediately();
                Err(e)
            }
        }
    }

    pub(super) fn stop(&mut self) -> Result<(), CameraError> {
        if self.shared.state() == EngineState::Stopped {
            debug!("Camera already stopped");
            return Ok(());
        }

        info!("Stopping camera");
        self.shared.set_state(EngineState::Stopping);
        let result = self.on_stop();
        self.shared.set_state(EngineState::Stopped);
        self.events.publish(CameraEvent::Closed);
        result
    }

    /// Stop then start; a failed stop is reported and the start still runs
    pub(super) fn restart(&mut self) -> Result<(), CameraError> {
        if let Err(e) = self.stop() {
            warn!("Error while stopping the camera for a restart: {}", e);
            self.events.publish(CameraEvent::Error(e));
        }
        self.start()
    }

    /// Tear everything down without reporting
    pub(super) fn stop_immediately(&mut self) {
        if let Err(e) = self.on_stop() {
            warn!("Error while force stopping the camera: {}", e);
        }
        self.shared.set_state(EngineState::Stopped);
    }

    fn on_start(&mut self) -> Result<Arc<CameraOptions>, CameraError> {
        if self.device.is_some() {
            warn!("Camera still open while starting, stopping it first");
            self.stop_immediately();
            self.shared.set_state(EngineState::Starting);
        }

        let cameras = self
            .driver
            .cameras()
            .map_err(|e| CameraError::unavailable_with("Could not list cameras", &e))?;
        let settings = self.shared.settings();
        let camera = find_camera(&cameras, settings.facing).ok_or_else(|| {
            CameraError::unavailable(format!("No camera facing {:?}", settings.facing))
        })?;

        self.session += 1;
        let session = self.session;
        let scheduler = self.scheduler.clone();
        let sink = DeviceEventSink::new(move |event| {
            scheduler.schedule("device event", false, move |core| {
                core.on_device_event(session, event)
            });
        });
        let device = self
            .driver
            .open(camera.id, sink)
            .map_err(|e| CameraError::unavailable_with("Failed to open the camera", &e))?;
        self.device = Some(device);
        self.camera = Some(camera);
        debug!(
            "Opened camera {} ({:?}, sensor at {} degrees), session {}",
            camera.id, camera.facing, camera.orientation, session
        );

        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        let mut params = device
            .parameters()
            .map_err(|e| CameraError::unavailable_with("Failed to read camera parameters", &e))?;
        let options = Arc::new(CameraOptions::new(
            &params,
            &cameras,
            should_flip_sizes(camera.orientation),
        ));
        let extra = ExtraProperties::from(&params);

        self.apply_initial::<Flash>(&options, &mut params);
        self.apply_initial::<WhiteBalance>(&options, &mut params);
        self.apply_initial::<Hdr>(&options, &mut params);
        params.gps = settings.location.clone();
        params.recording_hint = settings.session_type == SessionType::Video;
        params.focus_mode = default_focus_mode(&params, settings.session_type);

        let display = self.sensor_to_view();
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        device
            .set_parameters(&params)
            .map_err(|e| CameraError::unavailable_with("Failed to configure the camera", &e))?;
        device
            .set_display_orientation(display)
            .map_err(|e| CameraError::unavailable_with("Failed to set display orientation", &e))?;

        {
            let mut snapshot = self.shared.snapshot.write();
            snapshot.options = Some(Arc::clone(&options));
            snapshot.extra = Some(extra);
        }

        if self.shared.surface().is_some() && !self.bound {
            self.bind_to_surface()?;
        }

        Ok(options)
    }

    /// Write a pre-configured setting, falling back to its default when unsupported
    fn apply_initial<T: DeviceSetting>(&self, options: &CameraOptions, params: &mut DeviceParameters) {
        let desired = *T::field(&mut self.shared.settings());
        if T::supported(options, desired) {
            T::write(params, desired);
            return;
        }

        let fallback = T::default();
        warn!(
            "{} {:?} is not supported by this camera, using {:?}",
            T::SETTING,
            desired,
            fallback
        );
        self.shared.reset(T::SETTING, T::field, fallback);
        if T::supported(options, fallback) {
            T::write(params, fallback);
        }
    }

    fn on_stop(&mut self) -> Result<(), CameraError> {
        self.focus_reset.cancel();
        self.video_limit.cancel();
        self.pool.release();
        self.pending_focus = None;
        self.pending_snapshot = false;
        self.picture_meta = None;
        self.shared.capturing_image.store(false, Ordering::Relaxed);

        if self.video.is_some() {
            self.end_video();
        }

        let mut failure: Option<DeviceError> = None;
        if let Some(device) = self.device.as_deref_mut() {
            if let Err(e) = device.set_preview_callback(false) {
                warn!("Error while detaching preview callbacks: {}", e);
                failure = Some(e);
            }
            if let Err(e) = device.stop_preview() {
                warn!("Error while stopping the preview: {}", e);
                failure = Some(e);
            }
        }
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.release() {
                warn!("Error while releasing the camera: {}", e);
                failure = Some(e);
            }
        }

        self.shared.clear_snapshot();
        self.camera = None;
        self.bound = false;
        self.preview_size = None;
        self.picture_size = None;

        match failure {
            Some(e) => Err(CameraError::unavailable_with(
                "Error while stopping the camera",
                &e,
            )),
            None => Ok(()),
        }
    }

    fn bind_to_surface(&mut self) -> Result<(), CameraError> {
        let surface = self
            .shared
            .surface()
            .ok_or_else(|| CameraError::unavailable("No preview surface to bind to"))?;
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        device
            .set_preview_target(&surface)
            .map_err(|e| CameraError::unavailable_with("Can not bind to surface", &e))?;
        let params = device
            .parameters()
            .map_err(|e| CameraError::unavailable_with("Failed to read camera parameters", &e))?;

        let picture = self.compute_picture_size(&params)?;
        self.picture_size = Some(picture);
        self.preview_size = Some(self.compute_preview_size(&params, picture)?);
        self.apply_sizes_and_start_preview()?;
        self.bound = true;
        debug!("Bound to {:?} surface of {}", surface.kind, surface.size);
        Ok(())
    }

    /// Picture size in sensor orientation for the current session type
    pub(super) fn compute_picture_size(&self, params: &DeviceParameters) -> Result<Size, CameraError> {
        let sizes = dedup_sizes(&params.supported_picture_sizes);
        let settings = self.shared.settings();
        let selector = match settings.session_type {
            SessionType::Picture => SizeSelector::Biggest,
            SessionType::Video => {
                let camera = self.camera()?;
                match select_encoder_profile(
                    self.driver.as_ref(),
                    camera.id,
                    settings.video_quality,
                ) {
                    Some(profile) => {
                        let ratio = profile.frame_size.aspect_ratio();
                        SizeSelector::or(vec![
                            SizeSelector::and(vec![
                                SizeSelector::aspect_ratio(ratio, 0.0),
                                SizeSelector::Biggest,
                            ]),
                            SizeSelector::Biggest,
                        ])
                    }
                    None => {
                        warn!("No encoder profile for {:?}", settings.video_quality);
                        SizeSelector::Biggest
                    }
                }
            }
        };
        let size = selector
            .first(&sizes)
            .ok_or_else(|| CameraError::unavailable("Camera offers no picture sizes"))?;
        debug!("Picture size {} for {:?} session", size, settings.session_type);
        Ok(size)
    }

    /// Preview size in sensor orientation matching `picture` and covering the surface
    pub(super) fn compute_preview_size(
        &self,
        params: &DeviceParameters,
        picture: Size,
    ) -> Result<Size, CameraError> {
        let sizes = dedup_sizes(&params.supported_preview_sizes);
        let surface = self
            .shared
            .surface()
            .map_or(Size::new(0, 0), |surface| surface.size);
        let target = if self.flip_sizes() {
            surface.flip()
        } else {
            surface
        };
        let ratio = picture.aspect_ratio();

        let selector = SizeSelector::or(vec![
            SizeSelector::and(vec![
                SizeSelector::aspect_ratio(ratio, 0.0),
                SizeSelector::min_size(target),
                SizeSelector::Smallest,
            ]),
            SizeSelector::and(vec![
                SizeSelector::aspect_ratio(ratio, 0.0),
                SizeSelector::Biggest,
            ]),
            SizeSelector::and(vec![SizeSelector::min_size(target), SizeSelector::Smallest]),
            SizeSelector::ClosestRatio(ratio),
        ]);
        let size = selector
            .first(&sizes)
            .ok_or_else(|| CameraError::unavailable("Camera offers no preview sizes"))?;
        debug!("Preview size {} for surface {} ({})", size, surface, ratio);
        Ok(size)
    }

    /// Push the computed sizes to the device, refill callback buffers and start the preview
    pub(super) fn apply_sizes_and_start_preview(&mut self) -> Result<(), CameraError> {
        let preview = self.preview_size.ok_or_else(not_open)?;
        let picture = self.picture_size.ok_or_else(not_open)?;
        let view_preview = self.to_view(preview);
        let view_picture = self.to_view(picture);
        {
            let mut snapshot = self.shared.snapshot.write();
            snapshot.preview_size = Some(view_preview);
            snapshot.picture_size = Some(view_picture);
        }
        self.events
            .publish(CameraEvent::PreviewSizeChanged { size: view_preview });

        let unavailable = |e: DeviceError| CameraError::unavailable_with("Failed to start the preview", &e);
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        let mut params = device.parameters().map_err(unavailable)?;
        self.preview_format = params.preview_format;
        params.preview_size = preview;
        params.picture_size = picture;
        device.set_parameters(&params).map_err(unavailable)?;

        device.set_preview_callback(false).map_err(unavailable)?;
        device.set_preview_callback(true).map_err(unavailable)?;
        for buffer in self.pool.allocate(preview, self.preview_format) {
            device.add_callback_buffer(buffer);
        }

        device.start_preview().map_err(unavailable)?;
        info!("Preview started at {}", preview);
        Ok(())
    }

    pub(super) fn on_surface_available(&mut self) -> Result<(), CameraError> {
        if self.bound {
            return Ok(());
        }
        self.bind_to_surface()
    }

    pub(super) fn on_surface_changed(&mut self) -> Result<(), CameraError> {
        if !self.bound {
            return Ok(());
        }
        let picture = self.picture_size.ok_or_else(not_open)?;
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        let params = device
            .parameters()
            .map_err(|e| CameraError::unavailable_with("Failed to read camera parameters", &e))?;
        let preview = self.compute_preview_size(&params, picture)?;
        if Some(preview) == self.preview_size {
            return Ok(());
        }

        debug!("Surface change needs a new preview size {}", preview);
        self.restart_preview_with(preview)
    }

    /// Stop the preview and start it again at `preview`
    pub(super) fn restart_preview_with(&mut self, preview: Size) -> Result<(), CameraError> {
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        device
            .stop_preview()
            .map_err(|e| CameraError::unavailable_with("Failed to stop the preview", &e))?;
        self.preview_size = Some(preview);
        self.apply_sizes_and_start_preview()
    }

    pub(super) fn on_surface_destroyed(&mut self) -> Result<(), CameraError> {
        if !self.bound {
            return Ok(());
        }
        self.bound = false;
        self.pool.release();
        if let Some(device) = self.device.as_deref_mut() {
            if let Err(e) = device.set_preview_callback(false) {
                warn!("Error while detaching preview callbacks: {}", e);
            }
            if let Err(e) = device.stop_preview() {
                warn!("Error while stopping the preview: {}", e);
            }
        }
        Ok(())
    }
}
