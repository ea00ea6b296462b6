use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::io::domain::detection_report::{DetectionReport, ReportError, ReportWriter};

/// Writes all reports as one pretty-printed JSON array.
pub struct JsonReportWriter {
    out: Box<dyn Write + Send>,
}

impl JsonReportWriter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn create(path: &Path) -> Result<Self, ReportError> {
        Ok(Self::new(Box::new(BufWriter::new(File::create(path)?))))
    }
}

impl ReportWriter for JsonReportWriter {
    fn write(&mut self, reports: &[DetectionReport]) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut self.out, reports)?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Writes one human-readable line per face.
pub struct TextReportWriter {
    out: Box<dyn Write + Send>,
}

impl TextReportWriter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn create(path: &Path) -> Result<Self, ReportError> {
        Ok(Self::new(Box::new(BufWriter::new(File::create(path)?))))
    }
}

impl ReportWriter for TextReportWriter {
    fn write(&mut self, reports: &[DetectionReport]) -> Result<(), ReportError> {
        for report in reports {
            writeln!(self.out, "{}", format_report(report))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn format_report(report: &DetectionReport) -> String {
    let mut lines = vec![format!(
        "{} ({}x{}): {} face(s)",
        report.source.display(),
        report.width,
        report.height,
        report.faces.len()
    )];
    for (i, face) in report.faces.iter().enumerate() {
        let b = face.bbox;
        let mut line = format!(
            "  #{i}: [{:.1}, {:.1}, {:.1}, {:.1}] score {:.3}",
            b.x1, b.y1, b.x2, b.y2, face.score
        );
        if let Some(landmarks) = &face.landmarks {
            for (name, (x, y)) in landmarks.named_points() {
                line.push_str(&format!(" {name}=({x:.1}, {y:.1})"));
            }
        }
        lines.push(line);
    }
    lines.join("\n")
}
