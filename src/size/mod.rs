mod measure;
mod selector;

pub use measure::{measure, LayoutDimension, MeasureSpec};
pub use selector::SizeSelector;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A width × height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Swap width and height
    pub fn flip(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        AspectRatio::of(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// Remove duplicate sizes, keeping the first occurrence of each
pub fn dedup_sizes(sizes: &[Size]) -> Vec<Size> {
    let mut result: Vec<Size> = Vec::with_capacity(sizes.len());
    for size in sizes {
        if !result.contains(size) {
            result.push(*size);
        }
    }
    result
}

/// A width:height ratio reduced to lowest terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AspectRatio {
    x: u32,
    y: u32,
}

impl AspectRatio {
    pub fn of(width: u32, height: u32) -> Self {
        let divisor = gcd(width, height).max(1);
        Self {
            x: width / divisor,
            y: height / divisor,
        }
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn inverse(&self) -> Self {
        Self {
            x: self.y,
            y: self.x,
        }
    }

    pub fn to_f32(&self) -> f32 {
        if self.y == 0 {
            return 0.0;
        }
        self.x as f32 / self.y as f32
    }

    /// Whether `size` has this ratio within `tolerance`
    pub fn matches(&self, size: Size, tolerance: f32) -> bool {
        if tolerance <= 0.0 {
            return *self == size.aspect_ratio();
        }
        (self.to_f32() - size.aspect_ratio().to_f32()).abs() <= tolerance
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.y)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_equality_is_by_value() {
        assert_eq!(Size::new(640, 480), Size::from((640, 480)));
        assert_ne!(Size::new(640, 480), Size::new(480, 640));
        assert_eq!(Size::new(640, 480).flip(), Size::new(480, 640));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let sizes = [
            Size::new(1920, 1080),
            Size::new(640, 480),
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(640, 480),
        ];
        assert_eq!(
            dedup_sizes(&sizes),
            vec![Size::new(1920, 1080), Size::new(640, 480), Size::new(1280, 720)]
        );
    }

    #[test]
    fn test_aspect_ratio_is_reduced() {
        let ratio = AspectRatio::of(1920, 1080);
        assert_eq!((ratio.x(), ratio.y()), (16, 9));
        assert_eq!(ratio, AspectRatio::of(1280, 720));
        assert_eq!(ratio.inverse(), AspectRatio::of(9, 16));
        assert!(ratio.matches(Size::new(3840, 2160), 0.0));
        assert!(!ratio.matches(Size::new(640, 480), 0.0));
        assert!(ratio.matches(Size::new(1366, 768), 0.01));
    }
}
