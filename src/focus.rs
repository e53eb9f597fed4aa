//! Tap-to-focus coordinate mapping.
//!
//! Touch points arrive in view pixels; focus and metering areas are expressed in
//! the driver's normalized sensor space, `[-1000, 1000]` on both axes.

use crate::settings::Point;
use crate::size::Size;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Bound of the normalized sensor space
pub const SENSOR_BOUND: i32 = 1000;

const INNER_EDGE: f64 = 150.0;
const INNER_WEIGHT: u32 = 1000;
const OUTER_EDGE: f64 = 300.0;
const OUTER_WEIGHT: u32 = 100;

/// Rectangle in normalized sensor space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Weighted focus/metering region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeteringArea {
    pub rect: Rect,
    pub weight: u32,
}

/// Map a view touch into the two concentric sensor-space regions, inner first.
///
/// `sensor_to_display` is the clockwise rotation, in degrees, between the sensor
/// frame and the screen.
pub fn metering_areas(point: Point, view: Size, sensor_to_display: u32) -> [MeteringArea; 2] {
    let view_x = -1000.0 + (point.x as f64 / view.width as f64) * 2000.0;
    let view_y = -1000.0 + (point.y as f64 / view.height as f64) * 2000.0;

    let theta = -(sensor_to_display as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let sensor_x = view_x * cos - view_y * sin;
    let sensor_y = view_x * sin + view_y * cos;
    trace!(
        "Focus point view ({:.1}, {:.1}) -> sensor ({:.1}, {:.1})",
        view_x,
        view_y,
        sensor_x,
        sensor_y
    );

    [
        MeteringArea {
            rect: square_around(sensor_x, sensor_y, INNER_EDGE),
            weight: INNER_WEIGHT,
        },
        MeteringArea {
            rect: square_around(sensor_x, sensor_y, OUTER_EDGE),
            weight: OUTER_WEIGHT,
        },
    ]
}

/// Regions to submit for a device accepting at most `max_areas` regions
pub fn areas_for_limit(areas: &[MeteringArea; 2], max_areas: u32) -> Vec<MeteringArea> {
    match max_areas {
        0 => Vec::new(),
        1 => vec![areas[0]],
        _ => areas.to_vec(),
    }
}

// Each edge is clamped on its own, so regions near the border may not be square.
fn square_around(center_x: f64, center_y: f64, edge: f64) -> Rect {
    let delta = edge / 2.0;
    let bound = SENSOR_BOUND as f64;
    Rect {
        left: (center_x - delta).max(-bound) as i32,
        top: (center_y - delta).max(-bound) as i32,
        right: (center_x + delta).min(bound) as i32,
        bottom: (center_y + delta).min(bound) as i32,
    }
}
