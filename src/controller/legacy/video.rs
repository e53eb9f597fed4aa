use super::LegacyCore;
use crate::device::{
    select_encoder_profile, DeviceErrorCode, EncoderProfile, Recorder, RecorderInfo,
    RecorderSettings,
};
use crate::error::{CameraError, ConfigurationSetting, DeviceError};
use crate::events::CameraEvent;
use crate::settings::{Audio, Location, SessionType};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// A recording in progress
pub(super) struct VideoSession {
    /// Cleared when the output must not be reported
    pub(super) file: Option<PathBuf>,
    pub(super) recorder: Option<Box<dyn Recorder>>,
    pub(super) profile: EncoderProfile,
    pub(super) location: Option<Location>,
}

impl LegacyCore {
    pub(super) fn start_video(&mut self, output: PathBuf) -> Result<(), CameraError> {
        if self.video.is_some() || self.shared.capturing_video.load(Ordering::Relaxed) {
            return Err(CameraError::video(
                "A video is already being recorded",
                None,
                None,
            ));
        }
        let settings = self.shared.settings();
        if settings.session_type != SessionType::Video {
            return Err(CameraError::video(
                "Can't record video while session type is picture",
                None,
                None,
            ));
        }

        let camera = self.camera()?;
        let profile = select_encoder_profile(self.driver.as_ref(), camera.id, settings.video_quality)
            .ok_or_else(|| {
                CameraError::video(
                    format!("No encoder profile for {:?}", settings.video_quality),
                    None,
                    None,
                )
            })?;

        self.shared.capturing_video.store(true, Ordering::Relaxed);
        let recorder_settings = RecorderSettings {
            output: output.clone(),
            profile: profile.clone(),
            audio: settings.audio == Audio::On,
            location: settings.location.clone(),
            orientation_hint: self.sensor_to_output(),
            max_duration: self.max_video_duration,
        };
        self.video = Some(VideoSession {
            file: Some(output.clone()),
            recorder: None,
            profile,
            location: settings.location,
        });

        if let Err(e) = self.start_recorder(&recorder_settings) {
            let partial = self.video.as_mut().and_then(|video| video.file.take());
            self.end_video();
            return Err(CameraError::video(
                "Error while starting the recorder",
                partial,
                Some(&e),
            ));
        }

        if let Some(limit) = self.max_video_duration {
            self.video_limit
                .arm(&self.scheduler, limit, "video duration limit", |core: &mut LegacyCore| {
                    info!("Maximum video duration reached");
                    core.end_video();
                    Ok(())
                });
        }
        info!("Recording to {}", output.display());
        Ok(())
    }

    fn start_recorder(&mut self, settings: &RecorderSettings) -> Result<(), DeviceError> {
        let device = self
            .device
            .as_deref_mut()
            .ok_or_else(|| DeviceError::driver("camera is not open"))?;
        device.unlock()?;
        let recorder = device.create_recorder(settings)?;
        let video = self
            .video
            .as_mut()
            .ok_or_else(|| DeviceError::driver("no video session"))?;
        let recorder = video.recorder.insert(recorder);
        recorder.prepare()?;
        recorder.start()?;
        debug!(
            "Recorder started with {} {} at {}",
            video.profile.file_format, video.profile.video_codec, video.profile.frame_size
        );
        Ok(())
    }

    /// Finish the recording, publishing the file if it is still wanted
    pub(super) fn end_video(&mut self) {
        self.shared.capturing_video.store(false, Ordering::Relaxed);
        self.video_limit.cancel();
        let Some(mut video) = self.video.take() else {
            return;
        };

        if let Some(mut recorder) = video.recorder.take() {
            if let Err(e) = recorder.stop() {
                warn!("Error while stopping the recorder: {}", e);
            }
            recorder.release();
        }
        if let Some(device) = self.device.as_deref_mut() {
            if let Err(e) = device.lock() {
                warn!("Error while locking the camera after recording: {}", e);
            }
        }
        if let Some(location) = video.location.as_ref() {
            debug!(
                "Recording tagged at {:.5}, {:.5}",
                location.latitude, location.longitude
            );
        }

        if let Some(path) = video.file.take() {
            self.events.publish(CameraEvent::VideoReady { path });
        }
    }

    /// Drop the partial output, end the session and describe the failure
    pub(super) fn video_failed(&mut self, message: &str, cause: Option<&DeviceError>) -> CameraError {
        let partial = self.video.as_mut().and_then(|video| video.file.take());
        if let Some(path) = partial.as_ref().filter(|path| path.exists()) {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Could not delete partial video {}: {}", path.display(), e);
            }
        }
        self.end_video();
        CameraError::video(message, partial, cause)
    }

    pub(super) fn on_recorder_error(
        &mut self,
        code: DeviceErrorCode,
        extra: i32,
    ) -> Result<(), CameraError> {
        match code {
            DeviceErrorCode::ServerDied if self.video.is_some() => Err(self.video_failed(
                &format!("Media server died while recording a video (extra {})", extra),
                None,
            )),
            DeviceErrorCode::ServerDied => Err(CameraError::unavailable(format!(
                "Media server died while not recording (extra {})",
                extra
            ))),
            DeviceErrorCode::Unknown => Err(CameraError::configuration(
                ConfigurationSetting::Unknown,
                format!("Unspecified recorder error (extra {})", extra),
            )),
            DeviceErrorCode::Other(code) => Err(CameraError::configuration(
                ConfigurationSetting::Other,
                format!("Recorder error {} (extra {})", code, extra),
            )),
        }
    }

    pub(super) fn on_recorder_info(&mut self, info: RecorderInfo, extra: i32) {
        match info {
            RecorderInfo::MaxDurationReached => {
                info!("Recorder reached its maximum duration");
                self.end_video();
            }
            RecorderInfo::Other(code) => debug!("Recorder info {} (extra {})", code, extra),
        }
    }
}
