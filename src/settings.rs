use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which physical sensor is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    #[default]
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Flash {
    #[default]
    Off,
    On,
    Auto,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WhiteBalance {
    #[default]
    Auto,
    Incandescent,
    Fluorescent,
    Daylight,
    Cloudy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Hdr {
    #[default]
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Audio {
    Off,
    #[default]
    On,
}

/// Whether the engine is configured for still pictures or video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Picture,
    Video,
}

/// Requested recording quality. `Max*` values fall back to the next lower
/// profile the device offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    Lowest,
    MaxQvga,
    #[default]
    Max480p,
    Max720p,
    Max1080p,
    Max2160p,
    Highest,
}

impl VideoQuality {
    /// Qualities to try, best first, when this one is requested
    pub fn fallback_chain(&self) -> &'static [VideoQuality] {
        use VideoQuality::*;
        const CHAIN: [VideoQuality; 6] = [Max2160p, Max1080p, Max720p, Max480p, MaxQvga, Lowest];
        match self {
            Highest => &[Highest],
            Max2160p => &CHAIN[0..],
            Max1080p => &CHAIN[1..],
            Max720p => &CHAIN[2..],
            Max480p => &CHAIN[3..],
            MaxQvga => &CHAIN[4..],
            Lowest => &CHAIN[5..],
        }
    }
}

/// Geographic position attached to pictures and recordings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub time: DateTime<Utc>,
    pub provider: String,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            time: Utc::now(),
            provider: "host".to_string(),
        }
    }
}

/// A point in view pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Desired setting values shared between the host and the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    pub facing: Facing,
    pub flash: Flash,
    pub white_balance: WhiteBalance,
    pub hdr: Hdr,
    pub audio: Audio,
    pub session_type: SessionType,
    pub video_quality: VideoQuality,
    pub location: Option<Location>,
    pub zoom: f32,
    pub exposure_correction: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.facing, Facing::Back);
        assert_eq!(settings.flash, Flash::Off);
        assert_eq!(settings.white_balance, WhiteBalance::Auto);
        assert_eq!(settings.hdr, Hdr::Off);
        assert_eq!(settings.audio, Audio::On);
        assert_eq!(settings.session_type, SessionType::Picture);
        assert_eq!(settings.video_quality, VideoQuality::Max480p);
        assert!(settings.location.is_none());
    }

    #[test]
    fn test_video_quality_fallback_chain() {
        assert_eq!(
            VideoQuality::Max720p.fallback_chain(),
            &[
                VideoQuality::Max720p,
                VideoQuality::Max480p,
                VideoQuality::MaxQvga,
                VideoQuality::Lowest
            ]
        );
        assert_eq!(VideoQuality::Highest.fallback_chain(), &[VideoQuality::Highest]);
        assert_eq!(VideoQuality::Lowest.fallback_chain(), &[VideoQuality::Lowest]);
    }
}
