use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use facecascade_core::detection::domain::cascade_config::CascadeConfig;
use facecascade_core::detection::infrastructure::onnx_stage_evaluator::load_onnx_cascade;
use facecascade_core::io::domain::detection_report::ReportWriter;
use facecascade_core::io::infrastructure::image_file_reader::{
    collect_image_paths, ImageFileReader,
};
use facecascade_core::io::infrastructure::report_writers::{JsonReportWriter, TextReportWriter};
use facecascade_core::pipeline::detect_image_use_case::DetectImageUseCase;
use facecascade_core::pipeline::pipeline_logger::{
    NullPipelineLogger, PipelineLogger, StdoutPipelineLogger,
};
use facecascade_core::shared::model_resolver::{self, ModelSource, ProgressFn};

/// Cascaded face detection for still images.
#[derive(Parser)]
#[command(name = "facecascade")]
struct Cli {
    /// Image files or directories of images.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory holding det1.onnx, det2.onnx and det3.onnx.
    #[arg(long)]
    models: Option<PathBuf>,

    /// Base URL to download missing models from into the user cache.
    #[arg(long)]
    model_url: Option<String>,

    /// JSON file with cascade tunables; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Smallest face side in pixels.
    #[arg(long)]
    min_face_size: Option<f32>,

    /// Pyramid scale ratio, strictly between 0 and 1.
    #[arg(long)]
    scale_factor: Option<f32>,

    /// Per-stage score thresholds: proposal,refinement,output.
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f32>>,

    /// Worker threads per stage.
    #[arg(long)]
    workers: Option<usize>,

    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log per-stage timings and candidate counts after the run.
    #[arg(long)]
    stats: bool,
}

fn main() {
    let cli = Cli::parse();
    // --stats reports through the `info` level
    let default_filter = if cli.stats { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    validate(&cli)?;

    let config = build_config(&cli)?;
    let paths = collect_image_paths(&cli.inputs)?;
    if paths.is_empty() {
        return Err("No images found in the given inputs".into());
    }

    let source = ModelSource {
        model_dir: cli.models.clone(),
        base_url: cli.model_url.clone(),
    };
    let progress: ProgressFn = Box::new(download_progress);
    let models = model_resolver::resolve_cascade(&source, Some(&progress))?;
    log::info!("Loading cascade models from {}", models.proposal.display());
    let detector = load_onnx_cascade(&models, config)?;

    let logger: Box<dyn PipelineLogger> = if cli.stats {
        Box::new(StdoutPipelineLogger::new())
    } else {
        Box::new(NullPipelineLogger)
    };
    let mut use_case =
        DetectImageUseCase::new(Box::new(ImageFileReader::new()), Box::new(detector), logger);
    let reports = use_case.execute_batch(&paths)?;

    let mut writer = build_writer(cli.json, cli.output.as_deref())?;
    writer.write(&reports)?;
    if let Some(output) = &cli.output {
        log::info!("Report written to {}", output.display());
    }
    use_case.summary();
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn build_config(cli: &Cli) -> Result<CascadeConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => CascadeConfig::from_json_file(path)?,
        None => CascadeConfig::default(),
    };
    if let Some(min_face_size) = cli.min_face_size {
        config.min_face_size = min_face_size;
    }
    if let Some(scale_factor) = cli.scale_factor {
        config.scale_factor = scale_factor;
    }
    if let Some(thresholds) = &cli.thresholds {
        if thresholds.len() != 3 {
            return Err(format!(
                "--thresholds takes exactly 3 values, got {}",
                thresholds.len()
            )
            .into());
        }
        config.proposal.score_threshold = thresholds[0];
        config.refinement.score_threshold = thresholds[1];
        config.output.score_threshold = thresholds[2];
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn build_writer(
    json: bool,
    output: Option<&Path>,
) -> Result<Box<dyn ReportWriter>, Box<dyn std::error::Error>> {
    Ok(match (json, output) {
        (true, Some(path)) => Box::new(JsonReportWriter::create(path)?),
        (true, None) => Box::new(JsonReportWriter::stdout()),
        (false, Some(path)) => Box::new(TextReportWriter::create(path)?),
        (false, None) => Box::new(TextReportWriter::stdout()),
    })
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
    }
    if let Some(dir) = &cli.models {
        if !dir.is_dir() {
            return Err(format!("Model directory not found: {}", dir.display()).into());
        }
    }
    if cli.models.is_some() && cli.model_url.is_some() {
        return Err("--models and --model-url are mutually exclusive".into());
    }
    Ok(())
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecascade_core::detection::domain::suppression::OverlapMetric;
    use std::fs;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("facecascade").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = build_config(&parse(&["a.jpg"])).unwrap();
        assert_eq!(config, CascadeConfig::default());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "a.jpg",
            "--min-face-size",
            "20",
            "--scale-factor",
            "0.8",
            "--thresholds",
            "0.5,0.6,0.9",
            "--workers",
            "2",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.min_face_size, 20.0);
        assert_eq!(config.scale_factor, 0.8);
        assert_eq!(config.proposal.score_threshold, 0.5);
        assert_eq!(config.refinement.score_threshold, 0.6);
        assert_eq!(config.output.score_threshold, 0.9);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cascade.json");
        fs::write(
            &path,
            r#"{"min_face_size": 30.0, "output": {"score_threshold": 0.8, "nms_threshold": 0.6}}"#,
        )
        .unwrap();
        let cli = parse(&["a.jpg", "--config", path.to_str().unwrap(), "--min-face-size", "24"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.min_face_size, 24.0);
        assert_eq!(config.output.score_threshold, 0.8);
        assert_eq!(config.output.nms_threshold, 0.6);
        assert_eq!(config.output.nms_metric, OverlapMetric::IntersectionOverMin);
    }

    #[test]
    fn test_invalid_override_rejected() {
        assert!(build_config(&parse(&["a.jpg", "--scale-factor", "1.5"])).is_err());
        assert!(build_config(&parse(&["a.jpg", "--workers", "0"])).is_err());
    }

    #[test]
    fn test_thresholds_need_three_values() {
        let err = build_config(&parse(&["a.jpg", "--thresholds", "0.5,0.6"])).unwrap_err();
        assert!(err.to_string().contains("exactly 3"));
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let err = validate(&parse(&["/nonexistent/a.jpg"])).unwrap_err();
        assert!(err.to_string().contains("Input not found"));
    }

    #[test]
    fn test_validate_rejects_conflicting_model_sources() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().to_str().unwrap();
        let cli = parse(&[input, "--models", input, "--model-url", "http://example.com"]);
        assert!(validate(&cli).is_err());
    }
}
