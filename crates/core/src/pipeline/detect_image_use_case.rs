use std::path::{Path, PathBuf};

use crate::detection::domain::face_detector::FaceDetector;
use crate::io::domain::detection_report::DetectionReport;
use crate::io::domain::image_reader::ImageReader;
use crate::pipeline::pipeline_logger::PipelineLogger;

/// Image detection pipeline: read → detect → report.
pub struct DetectImageUseCase {
    reader: Box<dyn ImageReader>,
    detector: Box<dyn FaceDetector>,
    logger: Box<dyn PipelineLogger>,
}

impl DetectImageUseCase {
    pub fn new(
        reader: Box<dyn ImageReader>,
        detector: Box<dyn FaceDetector>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            reader,
            detector,
            logger,
        }
    }

    /// Detects faces in a single image.
    pub fn execute(&mut self, path: &Path) -> Result<DetectionReport, Box<dyn std::error::Error>> {
        let frame = self.reader.read(path)?;
        let faces = self.detector.detect(&frame, self.logger.as_mut())?;
        self.logger
            .info(&format!("{}: {} face(s)", path.display(), faces.len()));

        Ok(DetectionReport {
            source: path.to_path_buf(),
            width: frame.width(),
            height: frame.height(),
            faces,
        })
    }

    /// Processes `paths` in order, stopping at the first failure.
    pub fn execute_batch(
        &mut self,
        paths: &[PathBuf],
    ) -> Result<Vec<DetectionReport>, Box<dyn std::error::Error>> {
        let total = paths.len();
        let mut reports = Vec::with_capacity(total);
        for (i, path) in paths.iter().enumerate() {
            let report = self
                .execute(path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            reports.push(report);
            self.logger.progress(i + 1, total);
        }
        Ok(reports)
    }

    pub fn summary(&self) {
        self.logger.summary();
    }
}
