pub mod config;
pub mod controller;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod focus;
pub mod frame;
pub mod gesture;
pub mod options;
pub mod orientation;
pub mod settings;
pub mod size;

pub use config::{CameraBackend, EngineConfig};
pub use controller::{CameraController, EngineState, TaskHandle};
pub use device::{
    CameraDriver, CameraInfo, DeviceEvent, DeviceEventSink, DeviceHandle, Faults, PreviewSurface,
    Recorder, SimulatedDriver, SimulatedStats, SurfaceKind,
};
pub use engine::{CameraEngine, CameraEngineBuilder, Permission, PermissionCheck};
pub use error::{CameraError, CameraErrorKind, ConfigurationSetting, DeviceError, EngineError, Result};
pub use events::{CameraEvent, EventBus, EventFilter, EventReceiver};
pub use frame::{Frame, FrameProcessor, PixelFormat, PoolStatsSnapshot, YuvImage};
pub use gesture::{Gesture, GestureAction, GestureEvent};
pub use options::{CameraOptions, ExtraProperties};
pub use settings::{
    Audio, Facing, Flash, Hdr, Location, Point, SessionType, Settings, VideoQuality, WhiteBalance,
};
pub use size::{AspectRatio, LayoutDimension, MeasureSpec, Size};
