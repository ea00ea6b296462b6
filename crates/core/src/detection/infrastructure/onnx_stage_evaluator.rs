//! Stage evaluators backed by ONNX Runtime via `ort`.
//!
//! The three cascade networks are plain ONNX graphs with a single NCHW image
//! input. Outputs are looked up by name, defaulting to the blob names of the
//! reference Caffe models.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{s, ArrayD, Ix4};

use super::execution_provider::preferred_execution_providers;
use crate::detection::domain::cascade_config::CascadeConfig;
use crate::detection::domain::cascade_detector::CascadeDetector;
use crate::detection::domain::face_detector::DetectionError;
use crate::detection::domain::face_landmarks::NUM_LANDMARKS;
use crate::detection::domain::stage_evaluator::{
    DenseEvaluator, EvaluatorError, ScoreGrid, WindowEvaluator, WindowScore,
};
use crate::shared::constants::{
    OUTPUT_INPUT_SIZE, PROPOSAL_STRIDE, PROPOSAL_WINDOW_SIDE, REFINEMENT_INPUT_SIZE,
};
use crate::shared::image_tensor::ImageTensor;
use crate::shared::model_resolver::CascadeModels;

/// Names of the graph outputs an evaluator reads.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputNames {
    /// Two-class softmax; channel 1 is the face probability.
    pub score: String,
    pub regression: String,
    pub landmarks: Option<String>,
}

impl OutputNames {
    pub fn proposal() -> Self {
        Self::new("prob1", "conv4-2", None)
    }

    pub fn refinement() -> Self {
        Self::new("prob1", "conv5-2", None)
    }

    pub fn output() -> Self {
        Self::new("prob1", "conv6-2", Some("conv6-3"))
    }

    pub fn new(score: &str, regression: &str, landmarks: Option<&str>) -> Self {
        Self {
            score: score.to_string(),
            regression: regression.to_string(),
            landmarks: landmarks.map(str::to_string),
        }
    }

    fn all(&self) -> Vec<&str> {
        let mut names = vec![self.score.as_str(), self.regression.as_str()];
        names.extend(self.landmarks.as_deref());
        names
    }
}

/// Loads all three networks and assembles a cascade around them.
pub fn load_onnx_cascade(
    models: &CascadeModels,
    config: CascadeConfig,
) -> Result<CascadeDetector, DetectionError> {
    let proposal = OnnxDenseEvaluator::load(&models.proposal, OutputNames::proposal())?;
    let refinement = OnnxWindowEvaluator::load(
        &models.refinement,
        OutputNames::refinement(),
        REFINEMENT_INPUT_SIZE,
    )?;
    let output =
        OnnxWindowEvaluator::load(&models.output, OutputNames::output(), OUTPUT_INPUT_SIZE)?;
    CascadeDetector::new(
        Arc::new(proposal),
        Arc::new(refinement),
        Arc::new(output),
        config,
    )
}

/// `ort` session shared by concurrent stage workers.
///
/// `Session::run` needs exclusive access, so calls are serialised.
struct OnnxSession {
    session: Mutex<ort::session::Session>,
    input_size: Option<u32>,
}

impl OnnxSession {
    fn load(model_path: &Path) -> Result<Self, EvaluatorError> {
        let session = build_session(model_path).map_err(|e| {
            EvaluatorError::Unavailable(format!("{}: {e}", model_path.display()))
        })?;

        // NCHW: [1, 3, H, W]; dynamic dimensions are reported as -1
        let input_size = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() >= 4 && shape[2] > 0 {
                    Some(shape[2] as u32)
                } else {
                    None
                }
            } else {
                None
            }
        });
        log::debug!("loaded {} (input size {input_size:?})", model_path.display());

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }

    /// Runs the graph on one normalized image and copies out the named outputs.
    fn infer(
        &self,
        image: &ImageTensor,
        names: &[&str],
    ) -> Result<Vec<ArrayD<f32>>, EvaluatorError> {
        let input = ort::value::Tensor::from_array(image.to_normalized_nchw())
            .map_err(|e| EvaluatorError::Backend(e.to_string()))?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| EvaluatorError::Backend(format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| EvaluatorError::Backend(e.to_string()))?;

        names
            .iter()
            .map(|&name| {
                let value = outputs.get(name).ok_or_else(|| {
                    EvaluatorError::Unavailable(format!("model has no output named '{name}'"))
                })?;
                let array = value
                    .try_extract_array::<f32>()
                    .map_err(|e| EvaluatorError::Shape(format!("output '{name}': {e}")))?;
                Ok(array.to_owned())
            })
            .collect()
    }
}

fn build_session(
    model_path: &Path,
) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Fully-convolutional proposal network scanned over each pyramid level.
pub struct OnnxDenseEvaluator {
    session: OnnxSession,
    names: OutputNames,
}

impl OnnxDenseEvaluator {
    pub fn load(model_path: &Path, names: OutputNames) -> Result<Self, EvaluatorError> {
        Ok(Self {
            session: OnnxSession::load(model_path)?,
            names,
        })
    }
}

impl DenseEvaluator for OnnxDenseEvaluator {
    fn window_side(&self) -> u32 {
        PROPOSAL_WINDOW_SIDE
    }

    fn stride(&self) -> u32 {
        PROPOSAL_STRIDE
    }

    fn evaluate_dense(&self, image: &ImageTensor) -> Result<ScoreGrid, EvaluatorError> {
        let mut outputs = self.session.infer(image, &self.names.all())?.into_iter();
        match (outputs.next(), outputs.next()) {
            (Some(prob), Some(regression)) => parse_dense(prob, regression),
            _ => Err(EvaluatorError::Shape("missing proposal outputs".into())),
        }
    }
}

/// Refinement or output network scoring one fixed-size window per call.
pub struct OnnxWindowEvaluator {
    session: OnnxSession,
    names: OutputNames,
    input_size: u32,
}

impl OnnxWindowEvaluator {
    /// `default_size` is used when the model's input shape is dynamic.
    pub fn load(
        model_path: &Path,
        names: OutputNames,
        default_size: u32,
    ) -> Result<Self, EvaluatorError> {
        let session = OnnxSession::load(model_path)?;
        let input_size = session.input_size.unwrap_or(default_size);
        Ok(Self {
            session,
            names,
            input_size,
        })
    }
}

impl WindowEvaluator for OnnxWindowEvaluator {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn evaluate_window(&self, window: &ImageTensor) -> Result<WindowScore, EvaluatorError> {
        let mut outputs = self.session.infer(window, &self.names.all())?.into_iter();
        match (outputs.next(), outputs.next()) {
            (Some(prob), Some(regression)) => parse_window(prob, regression, outputs.next()),
            _ => Err(EvaluatorError::Shape("missing window outputs".into())),
        }
    }
}

/// `prob`: `[1, 2, H, W]`, `regression`: `[1, 4, H, W]`.
pub fn parse_dense(
    prob: ArrayD<f32>,
    regression: ArrayD<f32>,
) -> Result<ScoreGrid, EvaluatorError> {
    let prob = prob
        .into_dimensionality::<Ix4>()
        .map_err(|e| EvaluatorError::Shape(format!("score map: {e}")))?;
    let regression = regression
        .into_dimensionality::<Ix4>()
        .map_err(|e| EvaluatorError::Shape(format!("regression map: {e}")))?;
    if prob.dim().1 < 2 {
        return Err(EvaluatorError::Shape(format!(
            "score map needs 2 channels, got {:?}",
            prob.shape()
        )));
    }

    let scores = prob.slice(s![0, 1, .., ..]).to_owned();
    let regressions = regression.slice(s![0, .., .., ..]).to_owned();
    ScoreGrid::new(scores, regressions)
}

/// `prob`: 2 values, `regression`: 4 values, `landmarks`: 10 values laid out
/// as five x offsets followed by five y offsets.
pub fn parse_window(
    prob: ArrayD<f32>,
    regression: ArrayD<f32>,
    landmarks: Option<ArrayD<f32>>,
) -> Result<WindowScore, EvaluatorError> {
    let prob: Vec<f32> = prob.iter().copied().collect();
    let regression: Vec<f32> = regression.iter().copied().collect();
    if prob.len() != 2 {
        return Err(EvaluatorError::Shape(format!(
            "expected 2 class scores, got {}",
            prob.len()
        )));
    }
    if regression.len() != 4 {
        return Err(EvaluatorError::Shape(format!(
            "expected 4 regression values, got {}",
            regression.len()
        )));
    }

    let score = WindowScore::new(
        prob[1],
        [regression[0], regression[1], regression[2], regression[3]],
    );
    let Some(landmarks) = landmarks else {
        return Ok(score);
    };

    let values: Vec<f32> = landmarks.iter().copied().collect();
    if values.len() != 2 * NUM_LANDMARKS {
        return Err(EvaluatorError::Shape(format!(
            "expected {} landmark values, got {}",
            2 * NUM_LANDMARKS,
            values.len()
        )));
    }
    Ok(score.with_landmarks(std::array::from_fn(|i| {
        (values[i], values[i + NUM_LANDMARKS])
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn dyn_array(shape: &[usize], values: Vec<f32>) -> ArrayD<f32> {
        Array::from_shape_vec(IxDyn(shape), values).unwrap()
    }

    // ── parse_dense ──

    #[test]
    fn test_parse_dense_reads_face_channel() {
        // [1, 2, 2, 3]: channel 0 is background, channel 1 face
        let mut prob = vec![0.0; 12];
        prob[6 + 4] = 0.8; // channel 1, row 1, col 1
        let regression: Vec<f32> = (0..24).map(|v| v as f32).collect();

        let grid = parse_dense(
            dyn_array(&[1, 2, 2, 3], prob),
            dyn_array(&[1, 4, 2, 3], regression),
        )
        .unwrap();

        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
        let (score, reg) = grid.cell(1, 1);
        assert_eq!(score, 0.8);
        // channel k, row 1, col 1 -> 6k + 4
        assert_eq!(reg, [4.0, 10.0, 16.0, 22.0]);
    }

    #[test]
    fn test_parse_dense_rejects_wrong_rank() {
        let err = parse_dense(
            dyn_array(&[2, 2], vec![0.0; 4]),
            dyn_array(&[1, 4, 1, 1], vec![0.0; 4]),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluatorError::Shape(_)));
    }

    #[test]
    fn test_parse_dense_rejects_single_channel_scores() {
        let err = parse_dense(
            dyn_array(&[1, 1, 2, 2], vec![0.0; 4]),
            dyn_array(&[1, 4, 2, 2], vec![0.0; 16]),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluatorError::Shape(_)));
    }

    #[test]
    fn test_parse_dense_rejects_mismatched_grids() {
        let err = parse_dense(
            dyn_array(&[1, 2, 2, 2], vec![0.0; 8]),
            dyn_array(&[1, 4, 3, 2], vec![0.0; 24]),
        )
        .unwrap_err();
        assert!(matches!(err, EvaluatorError::Shape(_)));
    }

    // ── parse_window ──

    #[test]
    fn test_parse_window_without_landmarks() {
        let w = parse_window(
            dyn_array(&[1, 2], vec![0.1, 0.9]),
            dyn_array(&[1, 4], vec![0.1, 0.2, 0.3, 0.4]),
            None,
        )
        .unwrap();
        assert_eq!(w.score, 0.9);
        assert_eq!(w.regression, [0.1, 0.2, 0.3, 0.4]);
        assert!(w.landmarks.is_none());
    }

    #[test]
    fn test_parse_window_pairs_landmark_coordinates() {
        let values = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        let w = parse_window(
            dyn_array(&[1, 2], vec![0.0, 1.0]),
            dyn_array(&[1, 4], vec![0.0; 4]),
            Some(dyn_array(&[1, 10], values)),
        )
        .unwrap();
        let lm = w.landmarks.unwrap();
        assert_eq!(lm[0], (0.1, 0.6));
        assert_eq!(lm[4], (0.5, 1.0));
    }

    #[test]
    fn test_parse_window_rejects_short_outputs() {
        let err = parse_window(
            dyn_array(&[1, 1], vec![0.9]),
            dyn_array(&[1, 4], vec![0.0; 4]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EvaluatorError::Shape(_)));

        let err = parse_window(
            dyn_array(&[1, 2], vec![0.1, 0.9]),
            dyn_array(&[1, 4], vec![0.0; 4]),
            Some(dyn_array(&[1, 8], vec![0.0; 8])),
        )
        .unwrap_err();
        assert!(err.to_string().contains("landmark"));
    }

    // ── OutputNames ──

    #[test]
    fn test_output_names_defaults() {
        assert_eq!(OutputNames::proposal().all(), vec!["prob1", "conv4-2"]);
        assert_eq!(OutputNames::refinement().all(), vec!["prob1", "conv5-2"]);
        assert_eq!(OutputNames::output().all(), vec!["prob1", "conv6-2", "conv6-3"]);
    }
}
