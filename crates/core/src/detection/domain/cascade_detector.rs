use std::sync::Arc;
use std::time::Instant;

use crate::detection::domain::cascade_config::{check_pyramid, CascadeConfig};
use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::detection::domain::output_stage::OutputStage;
use crate::detection::domain::proposal_stage::ProposalStage;
use crate::detection::domain::refinement_stage::RefinementStage;
use crate::detection::domain::stage_evaluator::{DenseEvaluator, WindowEvaluator};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::frame::Frame;
use crate::shared::image_tensor::ImageTensor;

/// Three-stage face cascade: dense pyramid proposals, window refinement and
/// a final stage that adds landmarks.
///
/// Holds no per-call state, so a single instance can serve concurrent
/// `detect` calls from several threads.
pub struct CascadeDetector {
    proposal: Arc<dyn DenseEvaluator>,
    refinement: Arc<dyn WindowEvaluator>,
    output: Arc<dyn WindowEvaluator>,
    config: CascadeConfig,
}

impl CascadeDetector {
    pub fn new(
        proposal: Arc<dyn DenseEvaluator>,
        refinement: Arc<dyn WindowEvaluator>,
        output: Arc<dyn WindowEvaluator>,
        config: CascadeConfig,
    ) -> Result<Self, DetectionError> {
        config
            .validate()
            .map_err(|e| DetectionError::InvalidInput(e.to_string()))?;
        Ok(Self {
            proposal,
            refinement,
            output,
            config,
        })
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Finds faces at least `min_face_size` pixels wide, stepping the pyramid
    /// by `scale_factor`. Boxes are square; landmarks are attached when the
    /// output evaluator reports them.
    pub fn detect(
        &self,
        frame: &Frame,
        min_face_size: f32,
        scale_factor: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        self.detect_with_logger(frame, min_face_size, scale_factor, &mut NullPipelineLogger)
    }

    pub fn detect_with_logger(
        &self,
        frame: &Frame,
        min_face_size: f32,
        scale_factor: f32,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Vec<Detection>, DetectionError> {
        validate_frame(frame)?;
        check_pyramid(min_face_size, scale_factor).map_err(DetectionError::InvalidInput)?;

        let image = ImageTensor::from_frame(frame);

        let start = Instant::now();
        let proposals = ProposalStage::new(self.proposal.as_ref(), &self.config).run(
            &image,
            min_face_size,
            scale_factor,
        )?;
        record(logger, "proposal", start, proposals.len());
        if proposals.is_empty() {
            return Ok(proposals);
        }

        let start = Instant::now();
        let refined =
            RefinementStage::new(self.refinement.as_ref(), &self.config).run(&image, &proposals)?;
        record(logger, "refinement", start, refined.len());
        if refined.is_empty() {
            return Ok(refined);
        }

        let start = Instant::now();
        let faces = OutputStage::new(self.output.as_ref(), &self.config).run(&image, &refined)?;
        record(logger, "output", start, faces.len());

        log::debug!(
            "cascade: {} proposals, {} refined, {} faces",
            proposals.len(),
            refined.len(),
            faces.len()
        );
        Ok(faces)
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Vec<Detection>, DetectionError> {
        let (min_face_size, scale_factor) = (self.config.min_face_size, self.config.scale_factor);
        self.detect_with_logger(frame, min_face_size, scale_factor, logger)
    }
}

fn validate_frame(frame: &Frame) -> Result<(), DetectionError> {
    if frame.is_empty() {
        return Err(DetectionError::InvalidInput(format!(
            "image has no pixels ({}x{})",
            frame.width(),
            frame.height()
        )));
    }
    if frame.channels() != 3 {
        return Err(DetectionError::InvalidInput(format!(
            "expected an RGB image, got {} channels",
            frame.channels()
        )));
    }
    if !frame.has_consistent_len() {
        return Err(DetectionError::InvalidInput(format!(
            "pixel buffer holds {} bytes, expected {}x{}x3",
            frame.data().len(),
            frame.width(),
            frame.height()
        )));
    }
    Ok(())
}

fn record(logger: &mut dyn PipelineLogger, stage: &str, start: Instant, survivors: usize) {
    logger.timing(stage, start.elapsed().as_secs_f64() * 1000.0);
    logger.metric(&format!("{stage}_candidates"), survivors as f64);
}
