//! Host-facing facade over a camera controller.

mod builder;
#[cfg(test)]
mod tests;

pub use builder::CameraEngineBuilder;

use crate::config::EngineConfig;
use crate::controller::{CameraController, EngineState, TaskHandle};
use crate::device::PreviewSurface;
use crate::error::{EngineError, Result};
use crate::events::{CameraEvent, EventBus, EventFilter, EventReceiver};
use crate::frame::{FrameProcessor, FrameProcessors, PoolStatsSnapshot};
use crate::gesture::{scale_value, Gesture, GestureAction, GestureEvent, GestureMap};
use crate::options::{CameraOptions, ExtraProperties};
use crate::settings::{
    Audio, Facing, Flash, Hdr, Location, Point, SessionType, Settings, VideoQuality, WhiteBalance,
};
use crate::size::{self, LayoutDimension, MeasureSpec, Size};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Runtime permissions the engine depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Camera,
    RecordAudio,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Camera => f.write_str("camera"),
            Permission::RecordAudio => f.write_str("record audio"),
        }
    }
}

/// Answers whether the host holds a permission
pub trait PermissionCheck: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;
}

impl<F> PermissionCheck for F
where
    F: Fn(Permission) -> bool + Send + Sync,
{
    fn is_granted(&self, permission: Permission) -> bool {
        self(permission)
    }
}

/// The camera engine as seen by the host view
pub struct CameraEngine {
    controller: Box<dyn CameraController>,
    events: EventBus,
    processors: FrameProcessors,
    gestures: RwLock<GestureMap>,
    permissions: Option<Arc<dyn PermissionCheck>>,
    config: EngineConfig,
}

impl CameraEngine {
    pub fn builder() -> CameraEngineBuilder {
        CameraEngineBuilder::new()
    }

    pub(crate) fn new(
        controller: Box<dyn CameraController>,
        events: EventBus,
        processors: FrameProcessors,
        permissions: Option<Arc<dyn PermissionCheck>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            controller,
            events,
            processors,
            gestures: RwLock::new(config.gestures.to_map()),
            permissions,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the camera once the required permissions are granted
    pub fn start(&self) -> Result<TaskHandle> {
        self.check_permissions()?;
        info!("Camera start requested");
        Ok(self.controller.start())
    }

    fn check_permissions(&self) -> Result<()> {
        let Some(permissions) = self.permissions.as_ref() else {
            return Ok(());
        };

        let settings = self.controller.settings();
        let mut required = vec![Permission::Camera];
        if settings.session_type == SessionType::Video && settings.audio == Audio::On {
            required.push(Permission::RecordAudio);
        }
        for permission in required {
            if !permissions.is_granted(permission) {
                warn!("Missing {} permission, not starting", permission);
                return Err(EngineError::permission_denied(permission.to_string()));
            }
        }
        Ok(())
    }

    pub fn stop(&self) -> TaskHandle {
        self.controller.stop()
    }

    /// Stop the camera and end the worker; the engine is unusable afterwards
    pub fn shutdown(&self) -> TaskHandle {
        info!("Shutting down camera engine");
        self.controller.shutdown()
    }

    pub fn surface_available(&self, surface: PreviewSurface) -> TaskHandle {
        self.controller.surface_available(surface)
    }

    pub fn surface_changed(&self, size: Size) -> TaskHandle {
        self.controller.surface_changed(size)
    }

    pub fn surface_destroyed(&self) -> TaskHandle {
        self.controller.surface_destroyed()
    }

    /// Rotation of the display, applied on the next start
    pub fn set_display_offset(&self, degrees: u32) {
        self.controller.set_display_offset(degrees);
    }

    pub fn set_device_orientation(&self, degrees: u32) {
        self.controller.set_device_orientation(degrees);
    }

    pub fn set_facing(&self, facing: Facing) -> TaskHandle {
        self.controller.set_facing(facing)
    }

    /// Switch between the back and front camera
    pub fn toggle_facing(&self) -> TaskHandle {
        let facing = match self.controller.settings().facing {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        };
        self.set_facing(facing)
    }

    pub fn set_flash(&self, flash: Flash) -> TaskHandle {
        self.controller.set_flash(flash)
    }

    pub fn set_white_balance(&self, white_balance: WhiteBalance) -> TaskHandle {
        self.controller.set_white_balance(white_balance)
    }

    pub fn set_hdr(&self, hdr: Hdr) -> TaskHandle {
        self.controller.set_hdr(hdr)
    }

    pub fn set_audio(&self, audio: Audio) -> TaskHandle {
        self.controller.set_audio(audio)
    }

    pub fn set_location(&self, location: Option<Location>) -> TaskHandle {
        self.controller.set_location(location)
    }

    pub fn set_session_type(&self, session_type: SessionType) -> TaskHandle {
        self.controller.set_session_type(session_type)
    }

    pub fn set_video_quality(&self, quality: VideoQuality) -> TaskHandle {
        self.controller.set_video_quality(quality)
    }

    /// Zoom in `[0, 1]`; values outside are clamped and NaN means 0
    pub fn set_zoom(&self, zoom: f32) -> TaskHandle {
        self.controller
            .set_zoom(nan_to_zero(zoom).clamp(0.0, 1.0), Vec::new(), false)
    }

    /// Exposure correction in EV, clamped to the device bounds; NaN means 0
    pub fn set_exposure_correction(&self, value: f32) -> TaskHandle {
        let bounds = self.exposure_bounds();
        self.controller
            .set_exposure_correction(nan_to_zero(value), bounds, Vec::new(), false)
    }

    fn exposure_bounds(&self) -> (f32, f32) {
        self.controller
            .options()
            .map_or((0.0, 0.0), |options| options.exposure_correction_bounds())
    }

    pub fn capture_picture(&self) -> TaskHandle {
        self.controller.capture_picture()
    }

    pub fn capture_snapshot(&self) -> TaskHandle {
        self.controller.capture_snapshot()
    }

    pub fn start_video(&self, output: impl Into<PathBuf>) -> TaskHandle {
        self.controller.start_video(output.into())
    }

    pub fn end_video(&self) -> TaskHandle {
        self.controller.end_video()
    }

    /// Focus on a point of the view
    pub fn start_auto_focus(&self, point: Point) -> TaskHandle {
        self.controller.start_auto_focus(None, point)
    }

    /// Assign an action, returning what was actually stored
    pub fn map_gesture(&self, gesture: Gesture, action: GestureAction) -> GestureAction {
        self.gestures.write().map(gesture, action)
    }

    pub fn clear_gesture(&self, gesture: Gesture) {
        self.gestures.write().clear(gesture);
    }

    pub fn gesture_action(&self, gesture: Gesture) -> GestureAction {
        self.gestures.read().action(gesture)
    }

    /// Run the action mapped to a gesture; ignored unless the camera is started
    pub fn on_gesture(&self, event: GestureEvent) -> TaskHandle {
        if self.controller.state() != EngineState::Started {
            debug!("Ignoring {:?}, camera not started", event.gesture);
            return TaskHandle::completed();
        }

        let action = self.gestures.read().action(event.gesture);
        debug!("Gesture {:?} -> {:?}", event.gesture, action);
        match action {
            GestureAction::None => TaskHandle::completed(),
            GestureAction::Capture => self.controller.capture_picture(),
            GestureAction::Focus | GestureAction::FocusWithMarker => {
                let point = event.points.first().copied().unwrap_or_default();
                self.controller.start_auto_focus(Some(event.gesture), point)
            }
            GestureAction::Zoom => {
                let current = self.controller.settings().zoom;
                let zoom = scale_value(current, 0.0, 1.0, event.factor);
                self.controller.set_zoom(zoom, event.points, true)
            }
            GestureAction::ExposureCorrection => {
                let (min, max) = self.exposure_bounds();
                if min == 0.0 && max == 0.0 {
                    return TaskHandle::completed();
                }
                let current = self.controller.settings().exposure_correction;
                let value = scale_value(current, min, max, event.factor);
                self.controller
                    .set_exposure_correction(value, (min, max), event.points, true)
            }
        }
    }

    /// Size the view should take for the given layout constraints
    pub fn measure(
        &self,
        width: MeasureSpec,
        height: MeasureSpec,
        layout_width: LayoutDimension,
        layout_height: LayoutDimension,
    ) -> Size {
        size::measure(
            width.with_layout(layout_width),
            height.with_layout(layout_height),
            self.controller.preview_size(),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter, name: impl Into<String>) -> EventReceiver {
        EventReceiver::new(self.events.subscribe(), filter, name)
    }

    pub fn add_frame_processor(&self, processor: Arc<dyn FrameProcessor>) {
        self.processors.add(processor);
    }

    pub fn remove_frame_processor(&self, processor: &Arc<dyn FrameProcessor>) -> bool {
        self.processors.remove(processor)
    }

    pub fn clear_frame_processors(&self) {
        self.processors.clear();
    }

    pub fn state(&self) -> EngineState {
        self.controller.state()
    }

    pub fn settings(&self) -> Settings {
        self.controller.settings()
    }

    pub fn options(&self) -> Option<Arc<CameraOptions>> {
        self.controller.options()
    }

    pub fn extra_properties(&self) -> Option<ExtraProperties> {
        self.controller.extra_properties()
    }

    /// Preview stream size in view orientation
    pub fn preview_size(&self) -> Option<Size> {
        self.controller.preview_size()
    }

    /// Picture size in view orientation
    pub fn picture_size(&self) -> Option<Size> {
        self.controller.picture_size()
    }

    pub fn is_capturing_video(&self) -> bool {
        self.controller.is_capturing_video()
    }

    pub fn frame_stats(&self) -> PoolStatsSnapshot {
        self.controller.frame_stats()
    }
}

fn nan_to_zero(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}
