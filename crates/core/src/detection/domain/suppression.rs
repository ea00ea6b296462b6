use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::Detection;
use crate::shared::bounding_box::BoundingBox;

/// How two candidate boxes are compared during suppression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMetric {
    /// Intersection over union.
    #[default]
    IntersectionOverUnion,
    /// Intersection over the smaller area; prunes a small box nested inside
    /// a larger one even when their IoU is low.
    IntersectionOverMin,
}

impl OverlapMetric {
    pub fn overlap(self, a: &BoundingBox, b: &BoundingBox) -> f32 {
        match self {
            OverlapMetric::IntersectionOverUnion => a.iou(b),
            OverlapMetric::IntersectionOverMin => a.iom(b),
        }
    }
}

/// Greedy non-maximum suppression.
///
/// Candidates are stably sorted by descending score; the best remaining one is
/// kept and every other candidate overlapping it by more than `threshold` is
/// discarded, until none remain. Output is in selection order.
pub fn non_maximum_suppression(
    mut detections: Vec<Detection>,
    threshold: f32,
    metric: OverlapMetric,
) -> Vec<Detection> {
    if detections.len() <= 1 {
        return detections;
    }

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut suppressed = vec![false; detections.len()];
    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if suppressed[j] {
                continue;
            }
            if metric.overlap(&detections[i].bbox, &detections[j].bbox) > threshold {
                suppressed[j] = true;
            }
        }
    }

    detections
        .into_iter()
        .zip(suppressed)
        .filter_map(|(d, s)| (!s).then_some(d))
        .collect()
}
