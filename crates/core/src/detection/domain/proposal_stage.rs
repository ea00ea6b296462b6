//! Stage 1: dense scan of an image pyramid.

use crate::detection::domain::cascade_config::{CascadeConfig, StageConfig};
use crate::detection::domain::detection::{regress_and_square, Detection};
use crate::detection::domain::stage_evaluator::{DenseEvaluator, EvaluatorError, ScoreGrid};
use crate::detection::domain::suppression::{non_maximum_suppression, OverlapMetric};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::image_tensor::ImageTensor;
use crate::shared::worker_pool::parallel_map;

/// Resize factors that map faces of `min_face_size`, `min_face_size / factor`,
/// ... onto the evaluator window, for every face size that still fits inside
/// the shorter image side.
pub fn pyramid_scales(
    width: u32,
    height: u32,
    min_face_size: f32,
    scale_factor: f32,
    window_side: u32,
) -> Vec<f32> {
    let min_side = width.min(height) as f32;
    let mut scales = Vec::new();
    let mut face_size = min_face_size;
    while face_size <= min_side {
        scales.push(window_side as f32 / face_size);
        face_size /= scale_factor;
    }
    scales
}

/// Maps grid cells scoring at least `threshold` back to original-image boxes.
pub fn decode_grid(
    grid: &ScoreGrid,
    scale: f32,
    stride: u32,
    window_side: u32,
    threshold: f32,
) -> Vec<Detection> {
    let stride = stride as f32;
    let window = window_side as f32;
    grid.cells()
        .filter(|&(_, _, score, _)| score >= threshold)
        .map(|(x, y, score, regression)| {
            let gx = stride * x as f32;
            let gy = stride * y as f32;
            let bbox = BoundingBox::new(
                ((gx + 1.0) / scale).floor(),
                ((gy + 1.0) / scale).floor(),
                ((gx + window) / scale).floor(),
                ((gy + window) / scale).floor(),
            );
            Detection::new(bbox, score, regression)
        })
        .collect()
}

pub struct ProposalStage<'a> {
    evaluator: &'a dyn DenseEvaluator,
    config: StageConfig,
    per_scale_nms_threshold: f32,
    workers: usize,
}

impl<'a> ProposalStage<'a> {
    pub fn new(evaluator: &'a dyn DenseEvaluator, config: &CascadeConfig) -> Self {
        Self {
            evaluator,
            config: config.proposal,
            per_scale_nms_threshold: config.per_scale_nms_threshold,
            workers: config.workers,
        }
    }

    /// Scans every pyramid scale, merges the per-scale survivors and returns
    /// regressed, squared candidates for the refinement stage.
    pub fn run(
        &self,
        image: &ImageTensor,
        min_face_size: f32,
        scale_factor: f32,
    ) -> Result<Vec<Detection>, EvaluatorError> {
        let scales = pyramid_scales(
            image.width() as u32,
            image.height() as u32,
            min_face_size,
            scale_factor,
            self.evaluator.window_side(),
        );
        log::debug!("proposal: {} pyramid scales", scales.len());

        let per_scale = parallel_map(&scales, self.workers, |&scale| {
            self.scan_scale(image, scale)
        });

        let mut accumulated = Vec::new();
        for (scale, result) in scales.iter().zip(per_scale) {
            match result {
                Ok(detections) => accumulated.extend(detections),
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => log::warn!("proposal: dropping scale {scale:.4}: {e}"),
            }
        }

        let merged = non_maximum_suppression(
            accumulated,
            self.config.nms_threshold,
            self.config.nms_metric,
        );
        log::debug!("proposal: {} candidates after merge", merged.len());
        Ok(regress_and_square(&merged))
    }

    fn scan_scale(
        &self,
        image: &ImageTensor,
        scale: f32,
    ) -> Result<Vec<Detection>, EvaluatorError> {
        let window = self.evaluator.window_side();
        let width = (image.width() as f32 * scale) as u32;
        let height = (image.height() as f32 * scale) as u32;
        if width < window || height < window {
            log::debug!("proposal: skipping scale {scale:.4} ({width}x{height} < window)");
            return Ok(Vec::new());
        }

        let resized = image.resize(width, height);
        let grid = self.evaluator.evaluate_dense(&resized)?;
        let candidates = decode_grid(
            &grid,
            scale,
            self.evaluator.stride(),
            window,
            self.config.score_threshold,
        );
        Ok(non_maximum_suppression(
            candidates,
            self.per_scale_nms_threshold,
            OverlapMetric::IntersectionOverUnion,
        ))
    }
}
