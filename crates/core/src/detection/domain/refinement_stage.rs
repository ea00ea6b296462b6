//! Stage 2: re-score every proposal on its own window.

use crate::detection::domain::cascade_config::{CascadeConfig, StageConfig};
use crate::detection::domain::detection::{regress_and_square, Detection};
use crate::detection::domain::stage_evaluator::{EvaluatorError, WindowEvaluator};
use crate::detection::domain::suppression::non_maximum_suppression;
use crate::detection::domain::window_stage::score_candidates;
use crate::shared::image_tensor::ImageTensor;

pub struct RefinementStage<'a> {
    evaluator: &'a dyn WindowEvaluator,
    config: StageConfig,
    workers: usize,
}

impl<'a> RefinementStage<'a> {
    pub fn new(evaluator: &'a dyn WindowEvaluator, config: &CascadeConfig) -> Self {
        Self {
            evaluator,
            config: config.refinement,
            workers: config.workers,
        }
    }

    /// Scores, suppresses, then regresses and squares the survivors.
    pub fn run(
        &self,
        image: &ImageTensor,
        candidates: &[Detection],
    ) -> Result<Vec<Detection>, EvaluatorError> {
        let scored = score_candidates(
            "refinement",
            image,
            candidates,
            self.evaluator,
            self.config.score_threshold,
            self.workers,
        )?;
        let kept = non_maximum_suppression(
            scored,
            self.config.nms_threshold,
            self.config.nms_metric,
        );
        Ok(regress_and_square(&kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::stub_evaluators::{image_with_patch, StubWindowEvaluator};
    use crate::shared::bounding_box::BoundingBox;
    use approx::assert_relative_eq;

    fn candidate(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(BoundingBox::new(x1, y1, x2, y2), 0.6, [0.0; 4])
    }

    #[test]
    fn test_overlapping_survivors_are_suppressed() {
        let evaluator = StubWindowEvaluator::constant(24, 0.9);
        let out = RefinementStage::new(&evaluator, &CascadeConfig::default())
            .run(
                &ImageTensor::zeros(100, 100),
                &[
                    candidate(10.0, 10.0, 50.0, 50.0),
                    candidate(11.0, 11.0, 51.0, 51.0),
                    candidate(60.0, 60.0, 90.0, 90.0),
                ],
            )
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].bbox, BoundingBox::new(10.0, 10.0, 50.0, 50.0));
        assert_eq!(out[1].bbox, BoundingBox::new(60.0, 60.0, 90.0, 90.0));
    }

    #[test]
    fn test_survivors_are_regressed_then_squared() {
        // widen to the right by half the width
        let evaluator =
            StubWindowEvaluator::constant(24, 0.9).with_regression([0.0, 0.0, 0.0, 0.5]);
        let out = RefinementStage::new(&evaluator, &CascadeConfig::default())
            .run(&ImageTensor::zeros(100, 100), &[candidate(0.0, 0.0, 40.0, 40.0)])
            .unwrap();
        let b = out[0].bbox;
        assert_relative_eq!(b.x1, 0.0);
        assert_relative_eq!(b.x2, 60.0);
        assert_relative_eq!(b.y1, -10.0);
        assert_relative_eq!(b.y2, 50.0);
    }

    #[test]
    fn test_only_candidates_on_faces_survive() {
        let image = image_with_patch(120, 120, (60, 60, 40, 40));
        let evaluator = StubWindowEvaluator::brightness(24);
        let out = RefinementStage::new(&evaluator, &CascadeConfig::default())
            .run(
                &image,
                &[candidate(0.0, 0.0, 40.0, 40.0), candidate(60.0, 60.0, 100.0, 100.0)],
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, BoundingBox::new(60.0, 60.0, 100.0, 100.0));
    }

    #[test]
    fn test_below_threshold_yields_nothing() {
        let evaluator = StubWindowEvaluator::constant(24, 0.2);
        let out = RefinementStage::new(&evaluator, &CascadeConfig::default())
            .run(&ImageTensor::zeros(64, 64), &[candidate(0.0, 0.0, 30.0, 30.0)])
            .unwrap();
        assert!(out.is_empty());
    }
}
