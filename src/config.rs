use crate::gesture::{Gesture, GestureAction, GestureMap};
use crate::settings::{Audio, Facing, Flash, Hdr, SessionType, Settings, VideoQuality, WhiteBalance};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    pub camera: CameraConfig,
    pub preview: PreviewConfig,
    pub video: VideoConfig,
    pub gestures: GestureConfig,
    pub events: EventConfig,
}

/// Which camera API generation drives the device
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackend {
    #[default]
    Legacy,
    Camera2,
}

/// Backend selection and the settings applied when the device opens
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    #[serde(default)]
    pub backend: CameraBackend,

    #[serde(default)]
    pub facing: Facing,

    #[serde(default)]
    pub flash: Flash,

    #[serde(default)]
    pub white_balance: WhiteBalance,

    #[serde(default)]
    pub hdr: Hdr,

    #[serde(default)]
    pub audio: Audio,

    #[serde(default)]
    pub session_type: SessionType,

    #[serde(default)]
    pub video_quality: VideoQuality,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PreviewConfig {
    /// Number of preview buffers shared with the driver
    #[serde(default = "default_frame_pool_size")]
    pub frame_pool_size: usize,

    /// Delay before tap-to-focus regions are cleared, in milliseconds
    #[serde(default = "default_post_focus_reset_ms")]
    pub post_focus_reset_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VideoConfig {
    /// Recording length limit in milliseconds, 0 for unlimited
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GestureConfig {
    #[serde(default)]
    pub tap: GestureAction,

    #[serde(default)]
    pub long_tap: GestureAction,

    #[serde(default)]
    pub pinch: GestureAction,

    #[serde(default)]
    pub scroll_horizontal: GestureAction,

    #[serde(default)]
    pub scroll_vertical: GestureAction,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EventConfig {
    /// Capacity of the event broadcast channel
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl EngineConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camctl.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.backend", "legacy")?
            .set_default("camera.facing", "back")?
            .set_default("camera.flash", "off")?
            .set_default("camera.white_balance", "auto")?
            .set_default("camera.hdr", "off")?
            .set_default("camera.audio", "on")?
            .set_default("camera.session_type", "picture")?
            .set_default("camera.video_quality", "max480p")?
            .set_default("preview.frame_pool_size", default_frame_pool_size() as i64)?
            .set_default("preview.post_focus_reset_ms", default_post_focus_reset_ms() as i64)?
            .set_default("video.max_duration_ms", default_max_duration_ms() as i64)?
            .set_default("gestures.tap", "none")?
            .set_default("gestures.long_tap", "none")?
            .set_default("gestures.pinch", "none")?
            .set_default("gestures.scroll_horizontal", "none")?
            .set_default("gestures.scroll_vertical", "none")?
            .set_default("events.bus_capacity", default_bus_capacity() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            // CAMCTL_CAMERA_FACING=front overrides camera.facing
            .add_source(Environment::with_prefix("CAMCTL").separator("_"))
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview.frame_pool_size == 0 {
            return Err(ConfigError::Message(
                "Frame pool size must be greater than 0".to_string(),
            ));
        }

        if self.events.bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        for (gesture, action) in self.gestures.assignments() {
            if !gesture.is_assignable_to(action) {
                return Err(ConfigError::Message(format!(
                    "Action {:?} can not be assigned to gesture {:?}",
                    action, gesture
                )));
            }
        }

        Ok(())
    }

    /// Settings the engine starts from
    pub fn initial_settings(&self) -> Settings {
        Settings {
            facing: self.camera.facing,
            flash: self.camera.flash,
            white_balance: self.camera.white_balance,
            hdr: self.camera.hdr,
            audio: self.camera.audio,
            session_type: self.camera.session_type,
            video_quality: self.camera.video_quality,
            ..Settings::default()
        }
    }

    pub fn post_focus_reset_delay(&self) -> Duration {
        Duration::from_millis(self.preview.post_focus_reset_ms)
    }

    /// `None` when recordings are unlimited
    pub fn max_video_duration(&self) -> Option<Duration> {
        match self.video.max_duration_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl GestureConfig {
    pub fn assignments(&self) -> [(Gesture, GestureAction); 5] {
        [
            (Gesture::Tap, self.tap),
            (Gesture::LongTap, self.long_tap),
            (Gesture::Pinch, self.pinch),
            (Gesture::ScrollHorizontal, self.scroll_horizontal),
            (Gesture::ScrollVertical, self.scroll_vertical),
        ]
    }

    pub fn to_map(&self) -> GestureMap {
        let mut map = GestureMap::new();
        for (gesture, action) in self.assignments() {
            map.map(gesture, action);
        }
        map
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                backend: CameraBackend::default(),
                facing: Facing::default(),
                flash: Flash::default(),
                white_balance: WhiteBalance::default(),
                hdr: Hdr::default(),
                audio: Audio::default(),
                session_type: SessionType::default(),
                video_quality: VideoQuality::default(),
            },
            preview: PreviewConfig {
                frame_pool_size: default_frame_pool_size(),
                post_focus_reset_ms: default_post_focus_reset_ms(),
            },
            video: VideoConfig {
                max_duration_ms: default_max_duration_ms(),
            },
            gestures: GestureConfig::default(),
            events: EventConfig {
                bus_capacity: default_bus_capacity(),
            },
        }
    }
}

fn default_frame_pool_size() -> usize {
    2
}

fn default_post_focus_reset_ms() -> u64 {
    3000
}

fn default_max_duration_ms() -> u64 {
    5000
}

fn default_bus_capacity() -> usize {
    100
}
