use crate::device::{CameraInfo, DeviceParameters, FocusMode};
use crate::settings::{Facing, Flash, Hdr, WhiteBalance};
use crate::size::{dedup_sizes, AspectRatio, Size};
use serde::{Deserialize, Serialize};

/// Capabilities of the open device.
///
/// Read once per open and never mutated afterwards. Sizes are in view orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraOptions {
    pub supported_facing: Vec<Facing>,
    pub supported_flash: Vec<Flash>,
    pub supported_white_balance: Vec<WhiteBalance>,
    pub supported_hdr: Vec<Hdr>,
    pub supported_picture_sizes: Vec<Size>,
    pub supported_picture_aspect_ratios: Vec<AspectRatio>,
    pub zoom_supported: bool,
    pub video_snapshot_supported: bool,
    pub auto_focus_supported: bool,
    pub exposure_correction_min: f32,
    pub exposure_correction_max: f32,
}

impl CameraOptions {
    /// Build the snapshot; `flip` swaps picture sizes into view orientation
    pub fn new(params: &DeviceParameters, cameras: &[CameraInfo], flip: bool) -> Self {
        let mut supported_facing = Vec::new();
        for info in cameras {
            if !supported_facing.contains(&info.facing) {
                supported_facing.push(info.facing);
            }
        }

        let supported_picture_sizes: Vec<Size> = dedup_sizes(&params.supported_picture_sizes)
            .into_iter()
            .map(|size| if flip { size.flip() } else { size })
            .collect();
        let mut supported_picture_aspect_ratios = Vec::new();
        for size in &supported_picture_sizes {
            let ratio = size.aspect_ratio();
            if !supported_picture_aspect_ratios.contains(&ratio) {
                supported_picture_aspect_ratios.push(ratio);
            }
        }

        let step = params.exposure_compensation_step;
        Self {
            supported_facing,
            supported_flash: params.supported_flash.clone(),
            supported_white_balance: params.supported_white_balance.clone(),
            supported_hdr: params.supported_hdr.clone(),
            supported_picture_sizes,
            supported_picture_aspect_ratios,
            zoom_supported: params.zoom_supported,
            video_snapshot_supported: params.video_snapshot_supported,
            auto_focus_supported: params.supported_focus_modes.contains(&FocusMode::Auto),
            exposure_correction_min: params.min_exposure_compensation as f32 * step,
            exposure_correction_max: params.max_exposure_compensation as f32 * step,
        }
    }

    pub fn supports_facing(&self, facing: Facing) -> bool {
        self.supported_facing.contains(&facing)
    }

    pub fn supports_flash(&self, flash: Flash) -> bool {
        self.supported_flash.contains(&flash)
    }

    pub fn supports_white_balance(&self, white_balance: WhiteBalance) -> bool {
        self.supported_white_balance.contains(&white_balance)
    }

    pub fn supports_hdr(&self, hdr: Hdr) -> bool {
        self.supported_hdr.contains(&hdr)
    }

    pub fn exposure_correction_supported(&self) -> bool {
        self.exposure_correction_min != 0.0 || self.exposure_correction_max != 0.0
    }

    pub fn exposure_correction_bounds(&self) -> (f32, f32) {
        (self.exposure_correction_min, self.exposure_correction_max)
    }
}

/// Optical properties of the open device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtraProperties {
    /// Degrees
    pub vertical_view_angle: f32,
    /// Degrees
    pub horizontal_view_angle: f32,
}

impl From<&DeviceParameters> for ExtraProperties {
    fn from(params: &DeviceParameters) -> Self {
        Self {
            vertical_view_angle: params.vertical_view_angle,
            horizontal_view_angle: params.horizontal_view_angle,
        }
    }
}
