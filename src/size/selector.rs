use super::{AspectRatio, Size};
use std::cmp::Reverse;

/// Composable filter/sort over a list of candidate sizes.
///
/// `select` returns the surviving candidates, best first; an empty result means
/// the selector could not be satisfied.
#[derive(Debug, Clone)]
pub enum SizeSelector {
    AspectRatio { ratio: AspectRatio, tolerance: f32 },
    MinWidth(u32),
    MinHeight(u32),
    Biggest,
    Smallest,
    /// Sort by distance from the ratio, largest area first on ties
    ClosestRatio(AspectRatio),
    /// Apply every selector in turn
    And(Vec<SizeSelector>),
    /// First selector with a non-empty result wins
    Or(Vec<SizeSelector>),
}

impl SizeSelector {
    pub fn aspect_ratio(ratio: AspectRatio, tolerance: f32) -> Self {
        SizeSelector::AspectRatio { ratio, tolerance }
    }

    pub fn min_size(size: Size) -> Self {
        SizeSelector::And(vec![
            SizeSelector::MinWidth(size.width),
            SizeSelector::MinHeight(size.height),
        ])
    }

    pub fn and(selectors: Vec<SizeSelector>) -> Self {
        SizeSelector::And(selectors)
    }

    pub fn or(selectors: Vec<SizeSelector>) -> Self {
        SizeSelector::Or(selectors)
    }

    pub fn select(&self, sizes: &[Size]) -> Vec<Size> {
        match self {
            SizeSelector::AspectRatio { ratio, tolerance } => sizes
                .iter()
                .copied()
                .filter(|size| ratio.matches(*size, *tolerance))
                .collect(),
            SizeSelector::MinWidth(min) => {
                sizes.iter().copied().filter(|s| s.width >= *min).collect()
            }
            SizeSelector::MinHeight(min) => {
                sizes.iter().copied().filter(|s| s.height >= *min).collect()
            }
            SizeSelector::Biggest => {
                let mut sorted = sizes.to_vec();
                sorted.sort_by_key(|s| Reverse(s.area()));
                sorted
            }
            SizeSelector::Smallest => {
                let mut sorted = sizes.to_vec();
                sorted.sort_by_key(|s| s.area());
                sorted
            }
            SizeSelector::ClosestRatio(ratio) => {
                let target = ratio.to_f32();
                let mut sorted = sizes.to_vec();
                sorted.sort_by(|a, b| {
                    let da = (a.aspect_ratio().to_f32() - target).abs();
                    let db = (b.aspect_ratio().to_f32() - target).abs();
                    da.total_cmp(&db).then(b.area().cmp(&a.area()))
                });
                sorted
            }
            SizeSelector::And(selectors) => selectors
                .iter()
                .fold(sizes.to_vec(), |candidates, selector| {
                    selector.select(&candidates)
                }),
            SizeSelector::Or(selectors) => selectors
                .iter()
                .map(|selector| selector.select(sizes))
                .find(|result| !result.is_empty())
                .unwrap_or_default(),
        }
    }

    /// The best candidate, if any
    pub fn first(&self, sizes: &[Size]) -> Option<Size> {
        self.select(sizes).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Size> {
        vec![
            Size::new(640, 480),
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(800, 600),
            Size::new(3840, 2160),
        ]
    }

    #[test]
    fn test_biggest_and_smallest() {
        assert_eq!(SizeSelector::Biggest.first(&candidates()), Some(Size::new(3840, 2160)));
        assert_eq!(SizeSelector::Smallest.first(&candidates()), Some(Size::new(640, 480)));
        assert_eq!(SizeSelector::Biggest.first(&[]), None);
    }

    #[test]
    fn test_and_narrows_in_order() {
        let selector = SizeSelector::and(vec![
            SizeSelector::aspect_ratio(AspectRatio::of(16, 9), 0.0),
            SizeSelector::min_size(Size::new(1000, 700)),
            SizeSelector::Smallest,
        ]);
        assert_eq!(
            selector.select(&candidates()),
            vec![Size::new(1280, 720), Size::new(1920, 1080), Size::new(3840, 2160)]
        );
    }

    #[test]
    fn test_or_falls_through_to_first_non_empty() {
        let selector = SizeSelector::or(vec![
            SizeSelector::aspect_ratio(AspectRatio::of(1, 1), 0.0),
            SizeSelector::and(vec![
                SizeSelector::aspect_ratio(AspectRatio::of(4, 3), 0.0),
                SizeSelector::Biggest,
            ]),
            SizeSelector::Biggest,
        ]);
        assert_eq!(selector.first(&candidates()), Some(Size::new(800, 600)));
    }

    #[test]
    fn test_closest_ratio_prefers_larger_area_on_ties() {
        let selector = SizeSelector::ClosestRatio(AspectRatio::of(16, 10));
        let best = selector.first(&candidates()).unwrap();
        assert_eq!(best, Size::new(3840, 2160));
    }
}
