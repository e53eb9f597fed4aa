use crate::settings::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Pre-classified touch gestures delivered by the host view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    Tap,
    LongTap,
    Pinch,
    ScrollHorizontal,
    ScrollVertical,
}

impl Gesture {
    pub const ALL: [Gesture; 5] = [
        Gesture::Tap,
        Gesture::LongTap,
        Gesture::Pinch,
        Gesture::ScrollHorizontal,
        Gesture::ScrollVertical,
    ];

    /// One-shot gestures fire once; continuous ones carry a scale factor
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Gesture::Tap | Gesture::LongTap)
    }

    pub fn is_assignable_to(&self, action: GestureAction) -> bool {
        match action {
            GestureAction::None => true,
            GestureAction::Capture | GestureAction::Focus | GestureAction::FocusWithMarker => {
                self.is_one_shot()
            }
            GestureAction::Zoom | GestureAction::ExposureCorrection => !self.is_one_shot(),
        }
    }
}

/// What the engine does when a gesture arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GestureAction {
    #[default]
    None,
    Capture,
    Focus,
    FocusWithMarker,
    Zoom,
    ExposureCorrection,
}

/// Gesture to action assignments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureMap {
    actions: HashMap<Gesture, GestureAction>,
}

impl GestureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign an action; an action the gesture cannot carry stores `None`
    pub fn map(&mut self, gesture: Gesture, action: GestureAction) -> GestureAction {
        let stored = if gesture.is_assignable_to(action) {
            action
        } else {
            warn!(
                "Action {:?} can not be assigned to gesture {:?}",
                action, gesture
            );
            GestureAction::None
        };
        self.actions.insert(gesture, stored);
        stored
    }

    pub fn clear(&mut self, gesture: Gesture) {
        self.actions.insert(gesture, GestureAction::None);
    }

    pub fn action(&self, gesture: Gesture) -> GestureAction {
        self.actions
            .get(&gesture)
            .copied()
            .unwrap_or(GestureAction::None)
    }
}

/// A gesture as reported by the host
#[derive(Debug, Clone, PartialEq)]
pub struct GestureEvent {
    pub gesture: Gesture,
    /// Touch points in view pixels; the first one is the focus point
    pub points: Vec<Point>,
    /// Signed scale factor for continuous gestures
    pub factor: f32,
}

impl GestureEvent {
    pub fn tap(point: Point) -> Self {
        Self {
            gesture: Gesture::Tap,
            points: vec![point],
            factor: 0.0,
        }
    }

    pub fn long_tap(point: Point) -> Self {
        Self {
            gesture: Gesture::LongTap,
            points: vec![point],
            factor: 0.0,
        }
    }

    pub fn continuous(gesture: Gesture, factor: f32, points: Vec<Point>) -> Self {
        Self {
            gesture,
            points,
            factor,
        }
    }
}

/// Move `value` by `factor` of twice the range, clamped to `[min, max]`
pub fn scale_value(value: f32, min: f32, max: f32, factor: f32) -> f32 {
    let scaled = value + factor * (max - min) * 2.0;
    if scaled.is_nan() {
        return value.clamp(min, max);
    }
    scaled.clamp(min, max)
}
