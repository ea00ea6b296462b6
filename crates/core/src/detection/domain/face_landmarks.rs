//! 5-point face landmarks decoded from the output stage.

use serde::Serialize;

use crate::shared::bounding_box::BoundingBox;

/// Landmarks per face: eyes, nose tip, mouth corners.
pub const NUM_LANDMARKS: usize = 5;

/// Point order of [`FaceLandmarks::points`].
pub const LANDMARK_NAMES: [&str; NUM_LANDMARKS] =
    ["left_eye", "right_eye", "nose", "mouth_left", "mouth_right"];

/// Absolute landmark coordinates in image-pixel space.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    points: [(f32, f32); NUM_LANDMARKS],
}

impl FaceLandmarks {
    pub fn new(points: [(f32, f32); NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    /// Decodes offsets expressed as fractions of `bbox` into absolute points:
    /// `x = x1 + dx * width`, `y = y1 + dy * height`.
    pub fn from_offsets(bbox: &BoundingBox, offsets: &[(f32, f32); NUM_LANDMARKS]) -> Self {
        let w = bbox.width();
        let h = bbox.height();
        Self {
            points: offsets.map(|(dx, dy)| (bbox.x1 + dx * w, bbox.y1 + dy * h)),
        }
    }

    pub fn points(&self) -> &[(f32, f32); NUM_LANDMARKS] {
        &self.points
    }

    /// `(name, point)` pairs in [`LANDMARK_NAMES`] order.
    pub fn named_points(&self) -> impl Iterator<Item = (&'static str, (f32, f32))> + '_ {
        LANDMARK_NAMES.iter().copied().zip(self.points.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_offsets_scales_by_box_size() {
        let bbox = BoundingBox::new(100.0, 50.0, 200.0, 250.0); // 100 x 200
        let offsets = [(0.25, 0.3), (0.75, 0.3), (0.5, 0.5), (0.3, 0.8), (0.7, 0.8)];
        let lm = FaceLandmarks::from_offsets(&bbox, &offsets);

        let pts = lm.points();
        assert_relative_eq!(pts[0].0, 125.0);
        assert_relative_eq!(pts[0].1, 110.0);
        assert_relative_eq!(pts[2].0, 150.0);
        assert_relative_eq!(pts[2].1, 150.0);
        assert_relative_eq!(pts[4].0, 170.0);
        assert_relative_eq!(pts[4].1, 210.0);
    }

    #[test]
    fn test_zero_offsets_land_on_top_left_corner() {
        let bbox = BoundingBox::new(-10.0, 20.0, 30.0, 60.0);
        let lm = FaceLandmarks::from_offsets(&bbox, &[(0.0, 0.0); NUM_LANDMARKS]);
        assert!(lm.points().iter().all(|&p| p == (-10.0, 20.0)));
    }

    #[test]
    fn test_named_points_order() {
        let lm = FaceLandmarks::new([(1.0, 1.0), (2.0, 2.0), (3.0, 3.0), (4.0, 4.0), (5.0, 5.0)]);
        let names: Vec<_> = lm.named_points().map(|(n, _)| n).collect();
        assert_eq!(names, LANDMARK_NAMES);
        assert_eq!(lm.named_points().nth(2), Some(("nose", (3.0, 3.0))));
    }
}
