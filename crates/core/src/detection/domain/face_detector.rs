use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::stage_evaluator::EvaluatorError;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    /// The image or pyramid parameters cannot be searched.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
}

/// Domain interface for face detection.
///
/// Implementations may cache per-call state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        logger: &mut dyn PipelineLogger,
    ) -> Result<Vec<Detection>, DetectionError>;
}
