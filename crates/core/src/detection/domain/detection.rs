use serde::Serialize;

use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::detection::domain::stage_evaluator::WindowScore;
use crate::shared::bounding_box::BoundingBox;

/// A scored face candidate flowing through the cascade.
///
/// Updates never mutate in place: every step returns a new value, so a stage
/// can filter and rewrite its candidate list without aliasing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    /// `(dy1, dx1, dy2, dx2)` as fractions of the box height/width.
    #[serde(skip)]
    pub regression: [f32; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<FaceLandmarks>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, regression: [f32; 4]) -> Self {
        Self {
            bbox,
            score,
            regression,
            landmarks: None,
        }
    }

    /// Same box, re-scored by a window evaluator. Landmark offsets, when
    /// present, are decoded against the box as it stands now.
    pub fn with_window_score(&self, window: &WindowScore) -> Self {
        let landmarks = window
            .landmarks
            .as_ref()
            .map(|offsets| FaceLandmarks::from_offsets(&self.bbox, offsets))
            .or_else(|| self.landmarks.clone());
        Self {
            bbox: self.bbox,
            score: window.score,
            regression: window.regression,
            landmarks,
        }
    }

    /// Box moved by this detection's regression vector.
    pub fn regressed(&self) -> Self {
        Self {
            bbox: self.bbox.regressed(&self.regression),
            ..self.clone()
        }
    }

    pub fn squared(&self) -> Self {
        Self {
            bbox: self.bbox.square(),
            ..self.clone()
        }
    }
}

/// Regression followed by squaring, the closing step of every stage.
pub fn regress_and_square(detections: &[Detection]) -> Vec<Detection> {
    detections
        .iter()
        .map(|d| d.regressed().squared())
        .collect()
}
