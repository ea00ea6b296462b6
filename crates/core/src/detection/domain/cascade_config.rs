use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::detection::domain::suppression::OverlapMetric;

pub const DEFAULT_MIN_FACE_SIZE: f32 = 40.0;

/// Pyramid step; `0.709² ≈ 0.5` halves the image area every two levels.
pub const DEFAULT_SCALE_FACTOR: f32 = 0.709;

pub const DEFAULT_PROPOSAL_THRESHOLD: f32 = 0.6;
pub const DEFAULT_REFINEMENT_THRESHOLD: f32 = 0.7;
pub const DEFAULT_OUTPUT_THRESHOLD: f32 = 0.7;

/// IoU threshold applied within each pyramid scale before accumulation.
pub const DEFAULT_PER_SCALE_NMS_THRESHOLD: f32 = 0.5;

/// Threshold shared by the closing suppression pass of every stage.
pub const DEFAULT_STAGE_NMS_THRESHOLD: f32 = 0.7;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Score cut-off and closing suppression pass of one cascade stage.
///
/// In JSON each field is optional; missing ones keep the stage's own
/// default, so an `output` section without `nms_metric` still suppresses
/// by IoM.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StageConfig {
    /// Candidates scoring below this are discarded.
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub nms_metric: OverlapMetric,
}

/// A stage section as written in a config file.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StageOverrides {
    score_threshold: Option<f32>,
    nms_threshold: Option<f32>,
    nms_metric: Option<OverlapMetric>,
}

impl StageConfig {
    pub fn default_proposal() -> Self {
        Self {
            score_threshold: DEFAULT_PROPOSAL_THRESHOLD,
            nms_threshold: DEFAULT_STAGE_NMS_THRESHOLD,
            nms_metric: OverlapMetric::IntersectionOverUnion,
        }
    }

    pub fn default_refinement() -> Self {
        Self {
            score_threshold: DEFAULT_REFINEMENT_THRESHOLD,
            nms_threshold: DEFAULT_STAGE_NMS_THRESHOLD,
            nms_metric: OverlapMetric::IntersectionOverUnion,
        }
    }

    pub fn default_output() -> Self {
        Self {
            score_threshold: DEFAULT_OUTPUT_THRESHOLD,
            nms_threshold: DEFAULT_STAGE_NMS_THRESHOLD,
            nms_metric: OverlapMetric::IntersectionOverMin,
        }
    }

    fn overridden_by(self, overrides: StageOverrides) -> Self {
        Self {
            score_threshold: overrides.score_threshold.unwrap_or(self.score_threshold),
            nms_threshold: overrides.nms_threshold.unwrap_or(self.nms_threshold),
            nms_metric: overrides.nms_metric.unwrap_or(self.nms_metric),
        }
    }

    fn validate(&self, stage: &str) -> Result<(), ConfigError> {
        check_unit_interval(&format!("{stage}.score_threshold"), self.score_threshold)?;
        check_unit_interval(&format!("{stage}.nms_threshold"), self.nms_threshold)
    }
}

/// Tunables for a full cascade run.
///
/// Missing JSON fields, including fields missing from a stage section,
/// fall back to [`CascadeConfig::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Smallest face side, in pixels, the pyramid searches for.
    pub min_face_size: f32,
    /// Ratio between consecutive pyramid scales, in `(0, 1)`.
    pub scale_factor: f32,
    #[serde(deserialize_with = "proposal_overrides")]
    pub proposal: StageConfig,
    pub per_scale_nms_threshold: f32,
    #[serde(deserialize_with = "refinement_overrides")]
    pub refinement: StageConfig,
    #[serde(deserialize_with = "output_overrides")]
    pub output: StageConfig,
    /// Upper bound on concurrent evaluator calls within a stage.
    pub workers: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            scale_factor: DEFAULT_SCALE_FACTOR,
            proposal: StageConfig::default_proposal(),
            per_scale_nms_threshold: DEFAULT_PER_SCALE_NMS_THRESHOLD,
            refinement: StageConfig::default_refinement(),
            output: StageConfig::default_output(),
            workers: default_workers(),
        }
    }
}

impl CascadeConfig {
    /// Loads and validates a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: CascadeConfig =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_pyramid(self.min_face_size, self.scale_factor)
            .map_err(ConfigError::Invalid)?;
        self.proposal.validate("proposal")?;
        self.refinement.validate("refinement")?;
        self.output.validate("output")?;
        check_unit_interval("per_scale_nms_threshold", self.per_scale_nms_threshold)?;
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        Ok(())
    }
}

/// Validates the pyramid parameters shared by config and `detect()` calls.
pub fn check_pyramid(min_face_size: f32, scale_factor: f32) -> Result<(), String> {
    if !(min_face_size.is_finite() && min_face_size > 0.0) {
        return Err(format!(
            "min_face_size must be a positive number, got {min_face_size}"
        ));
    }
    if !(scale_factor > 0.0 && scale_factor < 1.0) {
        return Err(format!(
            "scale_factor must lie strictly between 0 and 1, got {scale_factor}"
        ));
    }
    Ok(())
}

fn check_unit_interval(name: &str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

fn proposal_overrides<'de, D: Deserializer<'de>>(d: D) -> Result<StageConfig, D::Error> {
    Ok(StageConfig::default_proposal().overridden_by(StageOverrides::deserialize(d)?))
}

fn refinement_overrides<'de, D: Deserializer<'de>>(d: D) -> Result<StageConfig, D::Error> {
    Ok(StageConfig::default_refinement().overridden_by(StageOverrides::deserialize(d)?))
}

fn output_overrides<'de, D: Deserializer<'de>>(d: D) -> Result<StageConfig, D::Error> {
    Ok(StageConfig::default_output().overridden_by(StageOverrides::deserialize(d)?))
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
