use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::detection::domain::detection::Detection;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Faces found in one image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionReport {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<Detection>,
}

/// Domain interface for emitting detection results.
pub trait ReportWriter {
    fn write(&mut self, reports: &[DetectionReport]) -> Result<(), ReportError>;
}
