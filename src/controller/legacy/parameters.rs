use super::{not_open, LegacyCore, PendingParameter};
use crate::device::{find_camera, DeviceParameters};
use crate::error::{CameraError, ConfigurationSetting};
use crate::events::CameraEvent;
use crate::options::CameraOptions;
use crate::settings::{Facing, Flash, Hdr, Location, Point, SessionType, Settings, VideoQuality, WhiteBalance};
use std::fmt;
use std::sync::atomic::Ordering;
use tracing::{debug, trace, warn};

/// A setting written straight into the device parameters
pub(super) trait DeviceSetting: Copy + PartialEq + Default + fmt::Debug + Send + 'static {
    const SETTING: ConfigurationSetting;

    fn supported(options: &CameraOptions, value: Self) -> bool;

    fn write(params: &mut DeviceParameters, value: Self);

    fn field(settings: &mut Settings) -> &mut Self;
}

impl DeviceSetting for Flash {
    const SETTING: ConfigurationSetting = ConfigurationSetting::Flash;

    fn supported(options: &CameraOptions, value: Self) -> bool {
        options.supports_flash(value)
    }

    fn write(params: &mut DeviceParameters, value: Self) {
        params.flash = value;
    }

    fn field(settings: &mut Settings) -> &mut Self {
        &mut settings.flash
    }
}

impl DeviceSetting for WhiteBalance {
    const SETTING: ConfigurationSetting = ConfigurationSetting::WhiteBalance;

    fn supported(options: &CameraOptions, value: Self) -> bool {
        options.supports_white_balance(value)
    }

    fn write(params: &mut DeviceParameters, value: Self) {
        params.white_balance = value;
    }

    fn field(settings: &mut Settings) -> &mut Self {
        &mut settings.white_balance
    }
}

impl DeviceSetting for Hdr {
    const SETTING: ConfigurationSetting = ConfigurationSetting::Hdr;

    fn supported(options: &CameraOptions, value: Self) -> bool {
        options.supports_hdr(value)
    }

    fn write(params: &mut DeviceParameters, value: Self) {
        params.hdr = value;
    }

    fn field(settings: &mut Settings) -> &mut Self {
        &mut settings.hdr
    }
}

impl LegacyCore {
    /// Read, modify and write the device parameters in one go
    pub(super) fn commit<F>(&mut self, setting: ConfigurationSetting, update: F) -> Result<(), CameraError>
    where
        F: FnOnce(&mut DeviceParameters),
    {
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        let failed = |e| CameraError::configuration_with(setting, format!("Failed to apply {}", setting), &e);
        let mut params = device.parameters().map_err(failed)?;
        update(&mut params);
        device.set_parameters(&params).map_err(failed)?;
        trace!("Committed {}", setting);
        Ok(())
    }

    /// Restore the value the device last accepted, unless `pending` was superseded
    fn rollback<T: Clone + fmt::Debug>(&mut self, pending: &PendingParameter<T>) {
        let value = (pending.field)(&mut self.committed).clone();
        debug!("Rolling {} back to {:?}", pending.setting, value);
        self.shared.replace_if_current(pending, value);
    }

    fn mark_committed<T>(&mut self, pending: &PendingParameter<T>, value: T) {
        *(pending.field)(&mut self.committed) = value;
    }

    pub(super) fn apply_setting<T: DeviceSetting>(
        &mut self,
        pending: PendingParameter<T>,
    ) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            trace!("{} superseded, skipping", T::SETTING);
            return Ok(());
        }

        let options = self.options()?;
        let desired = pending.desired;
        let result = if T::supported(&options, desired) {
            self.commit(T::SETTING, |params| T::write(params, desired))
        } else {
            Err(CameraError::configuration(
                T::SETTING,
                format!("{:?} is not supported by this camera", desired),
            ))
        };

        match result {
            Ok(()) => self.mark_committed(&pending, desired),
            Err(_) => self.rollback(&pending),
        }
        result
    }

    pub(super) fn apply_zoom(
        &mut self,
        pending: PendingParameter<f32>,
        points: Vec<Point>,
        notify: bool,
    ) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            return Ok(());
        }

        let options = self.options()?;
        if !options.zoom_supported {
            self.rollback(&pending);
            return Err(CameraError::configuration(
                ConfigurationSetting::Zoom,
                "Zoom is not supported by this camera",
            ));
        }

        let zoom = pending.desired;
        if let Err(e) = self.commit(ConfigurationSetting::Zoom, |params| {
            params.zoom = (zoom * params.max_zoom as f32) as u32;
        }) {
            self.rollback(&pending);
            return Err(e);
        }
        self.mark_committed(&pending, zoom);

        if notify {
            self.events
                .publish(CameraEvent::ZoomChanged { zoom, points });
        }
        Ok(())
    }

    pub(super) fn apply_exposure_correction(
        &mut self,
        pending: PendingParameter<f32>,
        bounds: (f32, f32),
        points: Vec<Point>,
        notify: bool,
    ) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            return Ok(());
        }

        let options = self.options()?;
        if !options.exposure_correction_supported() {
            self.rollback(&pending);
            return Err(CameraError::configuration(
                ConfigurationSetting::ExposureCorrection,
                "Exposure correction is not supported by this camera",
            ));
        }

        let (min, max) = options.exposure_correction_bounds();
        let value = pending.desired.clamp(min, max);
        self.shared.replace_if_current(&pending, value);
        if let Err(e) = self.commit(ConfigurationSetting::ExposureCorrection, |params| {
            let step = params.exposure_compensation_step;
            params.exposure_compensation = if step > 0.0 { (value / step) as i32 } else { 0 };
        }) {
            self.rollback(&pending);
            return Err(e);
        }
        self.mark_committed(&pending, value);

        if notify {
            self.events.publish(CameraEvent::ExposureChanged {
                value,
                bounds,
                points,
            });
        }
        Ok(())
    }

    pub(super) fn apply_location(
        &mut self,
        pending: PendingParameter<Option<Location>>,
    ) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            return Ok(());
        }

        let location = pending.desired.clone();
        if let Err(e) = self.commit(ConfigurationSetting::Location, |params| {
            params.gps = location.clone();
        }) {
            self.rollback(&pending);
            return Err(e);
        }
        self.mark_committed(&pending, pending.desired.clone());

        if let (Some(location), Some(recorder)) = (
            pending.desired.as_ref(),
            self.video.as_mut().and_then(|video| video.recorder.as_mut()),
        ) {
            recorder.set_location(location.latitude, location.longitude);
        }
        Ok(())
    }

    pub(super) fn apply_video_quality(
        &mut self,
        pending: PendingParameter<VideoQuality>,
    ) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            return Ok(());
        }

        if self.video.is_some() || self.shared.capturing_video.load(Ordering::Relaxed) {
            self.rollback(&pending);
            return Err(CameraError::configuration(
                ConfigurationSetting::VideoQuality,
                "Can't change video quality while recording a video",
            ));
        }

        if self.shared.settings().session_type != SessionType::Video {
            self.mark_committed(&pending, pending.desired);
            return Ok(());
        }

        let device = self.device.as_deref().ok_or_else(not_open)?;
        let params = device.parameters().map_err(|e| {
            CameraError::configuration_with(
                ConfigurationSetting::VideoQuality,
                "Failed to read camera parameters",
                &e,
            )
        })?;
        let picture = self.compute_picture_size(&params)?;
        if Some(picture) == self.picture_size {
            self.mark_committed(&pending, pending.desired);
            return Ok(());
        }

        debug!("Video quality {:?} needs picture size {}", pending.desired, picture);
        self.picture_size = Some(picture);
        if self.bound {
            let preview = self.compute_preview_size(&params, picture)?;
            self.restart_preview_with(preview)?;
        } else {
            self.commit(ConfigurationSetting::VideoQuality, |params| {
                params.picture_size = picture;
            })?;
        }
        self.mark_committed(&pending, pending.desired);
        Ok(())
    }

    pub(super) fn apply_facing(&mut self, pending: PendingParameter<Facing>) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            return Ok(());
        }

        let cameras = match self.driver.cameras() {
            Ok(cameras) => cameras,
            Err(e) => {
                self.rollback(&pending);
                return Err(CameraError::configuration_with(
                    ConfigurationSetting::Facing,
                    "Could not list cameras",
                    &e,
                ));
            }
        };
        if find_camera(&cameras, pending.desired).is_none() {
            self.rollback(&pending);
            return Err(CameraError::configuration(
                ConfigurationSetting::Facing,
                format!("No camera facing {:?}", pending.desired),
            ));
        }

        if self.camera.map(|camera| camera.facing) == Some(pending.desired) {
            self.mark_committed(&pending, pending.desired);
            return Ok(());
        }
        self.restart()
    }

    pub(super) fn apply_session_type(
        &mut self,
        pending: PendingParameter<SessionType>,
    ) -> Result<(), CameraError> {
        if !self.shared.is_current(&pending) {
            return Ok(());
        }
        if pending.desired == pending.previous {
            return Ok(());
        }
        if self.video.is_some() {
            warn!("Session type changed while recording, the recording ends");
        }
        self.restart()
    }
}
