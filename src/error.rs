use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced synchronously to the host (construction, configuration, permissions)
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Permission denied: {permission}")]
    PermissionDenied { permission: String },

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("System error: {message}")]
    System { message: String },
}

impl EngineError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn permission_denied<S: Into<String>>(permission: S) -> Self {
        Self::PermissionDenied {
            permission: permission.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Faults raised by a camera driver call
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to open camera {id}: {details}")]
    Open { id: u32, details: String },

    #[error("Parameters rejected by driver: {details}")]
    Rejected { details: String },

    #[error("Operation not supported by driver: {operation}")]
    Unsupported { operation: String },

    #[error("Driver error: {details}")]
    Driver { details: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    pub fn driver<S: Into<String>>(details: S) -> Self {
        Self::Driver {
            details: details.into(),
        }
    }

    pub fn rejected<S: Into<String>>(details: S) -> Self {
        Self::Rejected {
            details: details.into(),
        }
    }
}

/// Failures receiving from the event bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus closed")]
    ChannelClosed,
}

/// The setting a failed configuration refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationSetting {
    Unknown,
    Other,
    Facing,
    Flash,
    Focus,
    WhiteBalance,
    Hdr,
    Location,
    Zoom,
    ExposureCorrection,
    VideoQuality,
    SessionType,
    Audio,
}

impl fmt::Display for ConfigurationSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigurationSetting::Unknown => "unknown",
            ConfigurationSetting::Other => "other",
            ConfigurationSetting::Facing => "facing",
            ConfigurationSetting::Flash => "flash",
            ConfigurationSetting::Focus => "focus",
            ConfigurationSetting::WhiteBalance => "white balance",
            ConfigurationSetting::Hdr => "hdr",
            ConfigurationSetting::Location => "location",
            ConfigurationSetting::Zoom => "zoom",
            ConfigurationSetting::ExposureCorrection => "exposure correction",
            ConfigurationSetting::VideoQuality => "video quality",
            ConfigurationSetting::SessionType => "session type",
            ConfigurationSetting::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Discriminant of a [`CameraError`], handy for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraErrorKind {
    DeviceUnavailable,
    ConfigurationFailed,
    CapturePictureFailed,
    CaptureSnapshotFailed,
    CaptureVideoFailed,
}

/// Errors reported asynchronously through the event bus.
///
/// Causes are kept as text so the error can be cloned to every subscriber.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera unavailable: {message}")]
    DeviceUnavailable {
        message: String,
        cause: Option<String>,
    },

    #[error("Failed to configure {setting}: {message}")]
    ConfigurationFailed {
        setting: ConfigurationSetting,
        message: String,
        cause: Option<String>,
    },

    #[error("Capturing a picture failed: {message}")]
    CapturePictureFailed {
        message: String,
        cause: Option<String>,
    },

    #[error("Capturing a snapshot failed: {message}")]
    CaptureSnapshotFailed {
        message: String,
        cause: Option<String>,
    },

    #[error("Capturing a video failed: {message}")]
    CaptureVideoFailed {
        message: String,
        partial_file: Option<PathBuf>,
        cause: Option<String>,
    },
}

impl CameraError {
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::DeviceUnavailable {
            message: message.into(),
            cause: None,
        }
    }

    pub fn unavailable_with<S: Into<String>>(message: S, cause: &DeviceError) -> Self {
        Self::DeviceUnavailable {
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn configuration<S: Into<String>>(setting: ConfigurationSetting, message: S) -> Self {
        Self::ConfigurationFailed {
            setting,
            message: message.into(),
            cause: None,
        }
    }

    pub fn configuration_with<S: Into<String>>(
        setting: ConfigurationSetting,
        message: S,
        cause: &DeviceError,
    ) -> Self {
        Self::ConfigurationFailed {
            setting,
            message: message.into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn picture<S: Into<String>>(message: S, cause: Option<&DeviceError>) -> Self {
        Self::CapturePictureFailed {
            message: message.into(),
            cause: cause.map(ToString::to_string),
        }
    }

    pub fn snapshot<S: Into<String>>(message: S, cause: Option<&DeviceError>) -> Self {
        Self::CaptureSnapshotFailed {
            message: message.into(),
            cause: cause.map(ToString::to_string),
        }
    }

    pub fn video<S: Into<String>>(
        message: S,
        partial_file: Option<PathBuf>,
        cause: Option<&DeviceError>,
    ) -> Self {
        Self::CaptureVideoFailed {
            message: message.into(),
            partial_file,
            cause: cause.map(ToString::to_string),
        }
    }

    pub fn kind(&self) -> CameraErrorKind {
        match self {
            CameraError::DeviceUnavailable { .. } => CameraErrorKind::DeviceUnavailable,
            CameraError::ConfigurationFailed { .. } => CameraErrorKind::ConfigurationFailed,
            CameraError::CapturePictureFailed { .. } => CameraErrorKind::CapturePictureFailed,
            CameraError::CaptureSnapshotFailed { .. } => CameraErrorKind::CaptureSnapshotFailed,
            CameraError::CaptureVideoFailed { .. } => CameraErrorKind::CaptureVideoFailed,
        }
    }

    /// The setting of a configuration failure, if this is one
    pub fn setting(&self) -> Option<ConfigurationSetting> {
        match self {
            CameraError::ConfigurationFailed { setting, .. } => Some(*setting),
            _ => None,
        }
    }

    /// Whether the engine has to drop the device after this error
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, CameraError::DeviceUnavailable { .. })
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            CameraError::DeviceUnavailable { cause, .. }
            | CameraError::ConfigurationFailed { cause, .. }
            | CameraError::CapturePictureFailed { cause, .. }
            | CameraError::CaptureSnapshotFailed { cause, .. }
            | CameraError::CaptureVideoFailed { cause, .. } => cause.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_carries_setting() {
        let cause = DeviceError::rejected("flash=torch");
        let error = CameraError::configuration_with(
            ConfigurationSetting::Flash,
            "Failed to set flash",
            &cause,
        );

        assert_eq!(error.kind(), CameraErrorKind::ConfigurationFailed);
        assert_eq!(error.setting(), Some(ConfigurationSetting::Flash));
        assert!(!error.is_unrecoverable());
        assert_eq!(
            error.cause(),
            Some("Parameters rejected by driver: flash=torch")
        );
        assert_eq!(error.to_string(), "Failed to configure flash: Failed to set flash");
    }

    #[test]
    fn test_unavailable_is_unrecoverable() {
        let error = CameraError::unavailable("no camera");
        assert!(error.is_unrecoverable());
        assert_eq!(error.setting(), None);
    }

    #[test]
    fn test_engine_error_wraps_camera_error() {
        let error: EngineError = CameraError::picture("boom", None).into();
        assert_eq!(error.to_string(), "Capturing a picture failed: boom");
    }
}
