//! Stage 3: final scoring, landmarks and containment suppression.

use crate::detection::domain::cascade_config::{CascadeConfig, StageConfig};
use crate::detection::domain::detection::Detection;
use crate::detection::domain::stage_evaluator::{EvaluatorError, WindowEvaluator};
use crate::detection::domain::suppression::non_maximum_suppression;
use crate::detection::domain::window_stage::score_candidates;
use crate::shared::image_tensor::ImageTensor;

pub struct OutputStage<'a> {
    evaluator: &'a dyn WindowEvaluator,
    config: StageConfig,
    workers: usize,
}

impl<'a> OutputStage<'a> {
    pub fn new(evaluator: &'a dyn WindowEvaluator, config: &CascadeConfig) -> Self {
        Self {
            evaluator,
            config: config.output,
            workers: config.workers,
        }
    }

    /// Unlike the earlier stages, boxes are regressed before suppression so
    /// that overlap is measured on the final geometry; squaring comes last.
    /// Landmarks stay decoded against the box this stage received.
    pub fn run(
        &self,
        image: &ImageTensor,
        candidates: &[Detection],
    ) -> Result<Vec<Detection>, EvaluatorError> {
        let scored = score_candidates(
            "output",
            image,
            candidates,
            self.evaluator,
            self.config.score_threshold,
            self.workers,
        )?;
        let regressed: Vec<Detection> = scored.iter().map(Detection::regressed).collect();
        let kept = non_maximum_suppression(
            regressed,
            self.config.nms_threshold,
            self.config.nms_metric,
        );
        Ok(kept.iter().map(Detection::squared).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::NUM_LANDMARKS;
    use crate::detection::domain::stub_evaluators::StubWindowEvaluator;
    use crate::shared::bounding_box::BoundingBox;
    use approx::assert_relative_eq;

    fn candidate(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(BoundingBox::new(x1, y1, x2, y2), 0.8, [0.0; 4])
    }

    #[test]
    fn test_nested_box_removed_by_containment() {
        // IoU between the two is well under 0.7 but the small box lies
        // entirely inside the large one.
        let evaluator = StubWindowEvaluator::constant(48, 0.9);
        let out = OutputStage::new(&evaluator, &CascadeConfig::default())
            .run(
                &ImageTensor::zeros(200, 200),
                &[candidate(0.0, 0.0, 99.0, 99.0), candidate(30.0, 30.0, 59.0, 59.0)],
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, BoundingBox::new(0.0, 0.0, 99.0, 99.0));
    }

    #[test]
    fn test_regression_happens_before_suppression() {
        // Regression doubles every box towards the bottom right, so
        // (0,0)-(40,40) grows to (0,0)-(80,80).
        let evaluator =
            StubWindowEvaluator::constant(48, 0.9).with_regression([0.0, 0.0, 1.0, 1.0]);
        let out = OutputStage::new(&evaluator, &CascadeConfig::default())
            .run(
                &ImageTensor::zeros(200, 200),
                &[candidate(0.0, 0.0, 40.0, 40.0), candidate(100.0, 100.0, 110.0, 110.0)],
            )
            .unwrap();
        // (0,0)-(80,80) and (100,100)-(120,120) stay disjoint
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].bbox, BoundingBox::new(0.0, 0.0, 80.0, 80.0));

        let merged = OutputStage::new(&evaluator, &CascadeConfig::default())
            .run(
                &ImageTensor::zeros(200, 200),
                &[candidate(0.0, 0.0, 40.0, 40.0), candidate(50.0, 50.0, 60.0, 60.0)],
            )
            .unwrap();
        // (50,50)-(70,70) now lies inside (0,0)-(80,80)
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_output_is_squared_after_suppression() {
        let evaluator =
            StubWindowEvaluator::constant(48, 0.9).with_regression([0.0, 0.0, -0.5, 0.0]);
        let out = OutputStage::new(&evaluator, &CascadeConfig::default())
            .run(&ImageTensor::zeros(200, 200), &[candidate(20.0, 20.0, 100.0, 100.0)])
            .unwrap();
        let b = out[0].bbox;
        assert_relative_eq!(b.width(), b.height());
        assert_relative_eq!(b.width(), 80.0);
        // regressed to 80 x 40 around y = 40, squared back around it
        assert_relative_eq!(b.y1, 0.0);
    }

    #[test]
    fn test_landmarks_use_box_before_regression() {
        let evaluator = StubWindowEvaluator::constant(48, 0.9)
            .with_regression([0.5, 0.5, 0.5, 0.5])
            .with_landmarks([(0.0, 0.0), (1.0, 0.0), (0.5, 0.5), (0.0, 1.0), (1.0, 1.0)]);
        let out = OutputStage::new(&evaluator, &CascadeConfig::default())
            .run(&ImageTensor::zeros(200, 200), &[candidate(10.0, 20.0, 110.0, 120.0)])
            .unwrap();
        let lm = out[0].landmarks.as_ref().unwrap();
        assert_eq!(lm.points().len(), NUM_LANDMARKS);
        assert_eq!(lm.points()[0], (10.0, 20.0));
        assert_eq!(lm.points()[2], (60.0, 70.0));
        assert_eq!(lm.points()[4], (110.0, 120.0));
        // the box itself moved by half its size
        assert_eq!(out[0].bbox, BoundingBox::new(60.0, 70.0, 160.0, 170.0));
    }

    #[test]
    fn test_evaluator_without_landmarks_leaves_none() {
        let evaluator = StubWindowEvaluator::constant(48, 0.9);
        let out = OutputStage::new(&evaluator, &CascadeConfig::default())
            .run(&ImageTensor::zeros(100, 100), &[candidate(10.0, 10.0, 60.0, 60.0)])
            .unwrap();
        assert!(out[0].landmarks.is_none());
    }
}
