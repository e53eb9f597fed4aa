use super::Size;
use serde::{Deserialize, Serialize};

/// A layout constraint on one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureSpec {
    Exact(u32),
    AtMost(u32),
    Unconstrained,
}

impl MeasureSpec {
    /// The size the view takes when the constraint is honored literally
    fn literal(&self) -> u32 {
        match self {
            MeasureSpec::Exact(value) | MeasureSpec::AtMost(value) => *value,
            MeasureSpec::Unconstrained => 0,
        }
    }

    /// Promote `AtMost` to `Exact` when the view wants to fill its parent
    pub fn with_layout(self, layout: LayoutDimension) -> Self {
        match (self, layout) {
            (MeasureSpec::AtMost(value), LayoutDimension::MatchParent) => MeasureSpec::Exact(value),
            (spec, _) => spec,
        }
    }
}

/// How the host layout sized the view on one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDimension {
    MatchParent,
    #[default]
    WrapContent,
    Fixed,
}

/// Measure the view for the given constraints and the view-oriented preview size.
///
/// Without a preview size the constraints are honored literally.
pub fn measure(width: MeasureSpec, height: MeasureSpec, preview: Option<Size>) -> Size {
    let preview = match preview {
        Some(preview) if !preview.is_empty() => preview,
        _ => return Size::new(width.literal(), height.literal()),
    };

    use MeasureSpec::*;
    // height / width of the preview
    let ratio = preview.height as f32 / preview.width as f32;
    let from_width = |w: u32| (w as f32 * ratio).round() as u32;
    let from_height = |h: u32| (h as f32 / ratio).round() as u32;

    match (width, height) {
        (Exact(w), Exact(h)) => Size::new(w, h),
        (Unconstrained, Unconstrained) => preview,
        (Unconstrained, Exact(h) | AtMost(h)) => Size::new(from_height(h), h),
        (Exact(w) | AtMost(w), Unconstrained) => Size::new(w, from_width(w)),
        (Exact(w), AtMost(h)) => Size::new(w, from_width(w).min(h)),
        (AtMost(w), Exact(h)) => Size::new(from_height(h).min(w), h),
        (AtMost(w), AtMost(h)) => {
            let bound_ratio = h as f32 / w as f32;
            if bound_ratio >= ratio {
                Size::new(w, from_width(w))
            } else {
                Size::new(from_height(h), h)
            }
        }
    }
}
