use super::lifecycle::default_focus_mode;
use super::{not_open, LegacyCore};
use crate::device::{DeviceHandle, FocusMode};
use crate::error::{CameraError, ConfigurationSetting, DeviceError};
use crate::events::CameraEvent;
use crate::focus::{areas_for_limit, metering_areas};
use crate::frame::{rotate_nv21, PixelFormat, Recycler, ReturnedBuffer, YuvImage};
use crate::gesture::Gesture;
use crate::orientation::output_matches_view;
use crate::settings::{Facing, Point};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// How a pending capture relates to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PictureMeta {
    matches_view: bool,
    mirror: bool,
}

fn take_picture(device: &mut dyn DeviceHandle, rotation: u32) -> Result<(), DeviceError> {
    let mut params = device.parameters()?;
    params.rotation = rotation;
    device.set_parameters(&params)?;
    device.take_picture()
}

impl LegacyCore {
    fn current_picture_meta(&self) -> Result<PictureMeta, CameraError> {
        let camera = self.camera()?;
        Ok(PictureMeta {
            matches_view: output_matches_view(self.sensor_to_output(), self.sensor_to_view()),
            mirror: camera.facing == Facing::Front,
        })
    }

    pub(super) fn capture_picture(&mut self) -> Result<(), CameraError> {
        if self.shared.capturing_image.load(Ordering::Relaxed) {
            debug!("Image capture already in progress");
            return Ok(());
        }
        let options = self.options()?;
        if self.shared.capturing_video.load(Ordering::Relaxed) && !options.video_snapshot_supported {
            debug!("Device can't take pictures while recording");
            return Ok(());
        }

        let meta = self.current_picture_meta()?;
        self.shared.capturing_image.store(true, Ordering::Relaxed);
        self.picture_meta = Some(meta);
        let rotation = self.sensor_to_output();
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        if let Err(e) = take_picture(device, rotation) {
            self.shared.capturing_image.store(false, Ordering::Relaxed);
            self.picture_meta = None;
            return Err(CameraError::picture("Capturing a picture failed", Some(&e)));
        }
        debug!("Picture requested with rotation {}", rotation);
        Ok(())
    }

    pub(super) fn on_picture_taken(&mut self, data: Vec<u8>) -> Result<(), CameraError> {
        self.shared.capturing_image.store(false, Ordering::Relaxed);
        let meta = match self.picture_meta.take() {
            Some(meta) => meta,
            None => self.current_picture_meta()?,
        };
        self.events.publish(CameraEvent::PictureReady {
            data: Arc::new(data),
            matches_view: meta.matches_view,
            mirror: meta.mirror,
        });

        // The device stops the preview to take a picture.
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        device.start_preview().map_err(|e| {
            CameraError::picture("Failed to restart the preview after capture", Some(&e))
        })
    }

    pub(super) fn capture_snapshot(&mut self) -> Result<(), CameraError> {
        if self.shared.capturing_image.load(Ordering::Relaxed) {
            debug!("Image capture already in progress");
            return Ok(());
        }
        if self.shared.capturing_video.load(Ordering::Relaxed) {
            debug!("Recording, taking a picture instead of a snapshot");
            return self.capture_picture();
        }
        if !self.bound {
            return Err(CameraError::snapshot("The preview is not running", None));
        }

        let meta = self.current_picture_meta()?;
        self.shared.capturing_image.store(true, Ordering::Relaxed);
        self.picture_meta = Some(meta);
        self.pending_snapshot = true;
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        if let Err(e) = device.request_one_shot_frame() {
            self.shared.capturing_image.store(false, Ordering::Relaxed);
            self.pending_snapshot = false;
            self.picture_meta = None;
            return Err(CameraError::snapshot("Could not request a preview frame", Some(&e)));
        }
        Ok(())
    }

    pub(super) fn on_snapshot_frame(&mut self, data: Vec<u8>) -> Result<(), CameraError> {
        if !std::mem::take(&mut self.pending_snapshot) {
            trace!("Unrequested one-shot frame dropped");
            return Ok(());
        }
        self.events.publish(CameraEvent::Shutter { snapshot: true });

        let meta = match self.picture_meta.take() {
            Some(meta) => meta,
            None => self.current_picture_meta()?,
        };
        let size = self.preview_size.ok_or_else(not_open)?;
        let format = self.preview_format;
        let rotation = self.sensor_to_output();
        let events = self.events.clone();
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || {
            let rotated = match format {
                PixelFormat::Nv21 => rotate_nv21(&data, size, rotation),
                _ => None,
            };
            match rotated {
                Some(rotated) => {
                    let size = if rotation % 180 == 0 { size } else { size.flip() };
                    events.publish(CameraEvent::SnapshotReady {
                        image: Arc::new(YuvImage {
                            data: rotated,
                            size,
                            format,
                        }),
                        matches_view: meta.matches_view,
                        mirror: meta.mirror,
                    });
                }
                None => {
                    events.publish(CameraEvent::Error(CameraError::snapshot(
                        format!("Can not rotate a {:?} frame of {}", format, size),
                        None,
                    )));
                }
            }
            shared.capturing_image.store(false, Ordering::Relaxed);
        });

        // The one-shot request dropped the queued callback buffers.
        let preview = self.preview_size.ok_or_else(not_open)?;
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        let reset = |e: DeviceError| CameraError::snapshot("Could not reset preview callbacks", Some(&e));
        device.set_preview_callback(false).map_err(reset)?;
        device.set_preview_callback(true).map_err(reset)?;
        for buffer in self.pool.allocate(preview, self.preview_format) {
            device.add_callback_buffer(buffer);
        }
        Ok(())
    }

    pub(super) fn on_preview_frame(&mut self, data: Vec<u8>) {
        let recycler = self.recycler();
        let rotation = self.sensor_to_output();
        match self.pool.frame(data, rotation, Some(recycler)) {
            Some(frame) => self.processors.dispatch(frame),
            None => trace!("Preview frame not from the current pool, dropped"),
        }
    }

    /// Returns released frames to the pool through the worker
    fn recycler(&self) -> Recycler {
        let scheduler = self.scheduler.clone();
        let session = self.session;
        Arc::new(move |buffer: ReturnedBuffer| {
            scheduler.schedule("recycle buffer", true, move |core| {
                core.recycle(session, buffer);
                Ok(())
            });
        })
    }

    fn recycle(&mut self, session: u64, buffer: ReturnedBuffer) {
        if session != self.session {
            trace!("Dropping buffer from closed session {}", session);
            return;
        }
        if let Some(data) = self.pool.recycle(buffer) {
            if let Some(device) = self.device.as_deref_mut() {
                device.add_callback_buffer(data);
            }
        }
    }

    pub(super) fn start_auto_focus(
        &mut self,
        gesture: Option<Gesture>,
        point: Point,
    ) -> Result<(), CameraError> {
        let options = self.options()?;
        if !options.auto_focus_supported {
            debug!("Auto focus is not supported by this camera");
            return Ok(());
        }
        let Some(surface) = self.shared.surface() else {
            debug!("No surface to map the focus point onto");
            return Ok(());
        };

        let areas = metering_areas(point, surface.size, self.sensor_to_view());
        self.commit(ConfigurationSetting::Focus, |params| {
            params.focus_areas = areas_for_limit(&areas, params.max_num_focus_areas);
            params.metering_areas = areas_for_limit(&areas, params.max_num_metering_areas);
            params.focus_mode = FocusMode::Auto;
        })?;

        self.events
            .publish(CameraEvent::FocusStarted { gesture, point });
        self.pending_focus = Some((gesture, point));
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        if let Err(e) = device.auto_focus() {
            self.pending_focus = None;
            return Err(CameraError::configuration_with(
                ConfigurationSetting::Focus,
                "Failed to start auto focus",
                &e,
            ));
        }
        Ok(())
    }

    pub(super) fn on_auto_focus(&mut self, success: bool) {
        let Some((gesture, point)) = self.pending_focus.take() else {
            trace!("Auto focus result without a pending request");
            return;
        };
        self.events.publish(CameraEvent::FocusEnded {
            gesture,
            success,
            point,
        });

        let delay = self.post_focus_reset_delay;
        self.focus_reset
            .arm(&self.scheduler, delay, "reset focus", |core: &mut LegacyCore| {
                core.reset_focus()
            });
    }

    fn reset_focus(&mut self) -> Result<(), CameraError> {
        let session_type = self.shared.settings().session_type;
        let device = self.device.as_deref_mut().ok_or_else(not_open)?;
        if let Err(e) = device.cancel_auto_focus() {
            warn!("Error while cancelling auto focus: {}", e);
        }
        self.commit(ConfigurationSetting::Focus, |params| {
            params.focus_areas.clear();
            params.metering_areas.clear();
            params.focus_mode = default_focus_mode(params, session_type);
        })
        .map_err(|e| match e {
            CameraError::ConfigurationFailed { setting, cause, .. } => CameraError::ConfigurationFailed {
                setting,
                message: "Failed to reset auto focus".to_string(),
                cause,
            },
            other => other,
        })
    }
}
