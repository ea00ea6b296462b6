//! Scoring capability consumed by each cascade stage.
//!
//! The cascade never computes scores itself. A proposal-stage evaluator scans
//! a whole (resized) image and reports one score and regression per grid cell;
//! refinement and output evaluators score one fixed-size window at a time.
//! Both receive raw 0–255 tensors and normalize them exactly once.

use ndarray::{Array2, Array3};
use thiserror::Error;

use crate::detection::domain::face_landmarks::NUM_LANDMARKS;
use crate::shared::image_tensor::ImageTensor;

#[derive(Error, Debug)]
pub enum EvaluatorError {
    /// The evaluator cannot run at all (model missing, session unusable).
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),
    /// The inference backend failed while running.
    #[error("inference backend failed: {0}")]
    Backend(String),
    /// Output for this particular input was missing or malformed.
    #[error("malformed evaluator output: {0}")]
    Shape(String),
}

impl EvaluatorError {
    /// Systemic failures abort the whole detection call; anything else only
    /// drops the scale or candidate that produced it.
    pub fn is_systemic(&self) -> bool {
        !matches!(self, EvaluatorError::Shape(_))
    }
}

/// Dense proposal-stage output: one score and `(dy1, dx1, dy2, dx2)`
/// regression per grid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreGrid {
    /// `(rows, cols)`
    scores: Array2<f32>,
    /// `(4, rows, cols)`
    regressions: Array3<f32>,
}

impl ScoreGrid {
    pub fn new(scores: Array2<f32>, regressions: Array3<f32>) -> Result<Self, EvaluatorError> {
        let (rows, cols) = scores.dim();
        if regressions.dim() != (4, rows, cols) {
            return Err(EvaluatorError::Shape(format!(
                "regression grid {:?} does not match score grid {:?}",
                regressions.shape(),
                scores.shape()
            )));
        }
        Ok(Self {
            scores,
            regressions,
        })
    }

    pub fn width(&self) -> usize {
        self.scores.ncols()
    }

    pub fn height(&self) -> usize {
        self.scores.nrows()
    }

    /// Score and regression at column `x`, row `y`, with non-finite values
    /// replaced by zero.
    pub fn cell(&self, x: usize, y: usize) -> (f32, [f32; 4]) {
        let score = finite_or_zero(self.scores[[y, x]]);
        let regression = std::array::from_fn(|k| finite_or_zero(self.regressions[[k, y, x]]));
        (score, regression)
    }

    /// All cells in row-major order as `(x, y, score, regression)`.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, f32, [f32; 4])> + '_ {
        (0..self.height()).flat_map(move |y| {
            (0..self.width()).map(move |x| {
                let (score, regression) = self.cell(x, y);
                (x, y, score, regression)
            })
        })
    }
}

/// Single-window output of the refinement and output stages.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowScore {
    pub score: f32,
    pub regression: [f32; 4],
    /// Landmark offsets as fractions of the scored window, `(dx, dy)` per point.
    pub landmarks: Option<[(f32, f32); NUM_LANDMARKS]>,
}

impl WindowScore {
    pub fn new(score: f32, regression: [f32; 4]) -> Self {
        Self {
            score,
            regression,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: [(f32, f32); NUM_LANDMARKS]) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// Non-finite scores and regression components become zero; a landmark
    /// set containing any non-finite offset is dropped.
    pub fn sanitized(self) -> Self {
        let landmarks = self
            .landmarks
            .filter(|pts| pts.iter().all(|(x, y)| x.is_finite() && y.is_finite()));
        Self {
            score: finite_or_zero(self.score),
            regression: self.regression.map(finite_or_zero),
            landmarks,
        }
    }
}

/// Proposal-stage evaluator: scans an arbitrary-size image in one pass.
pub trait DenseEvaluator: Send + Sync {
    /// Side of the square receptive field, in resized-image pixels.
    fn window_side(&self) -> u32;

    /// Distance between neighbouring grid cells, in resized-image pixels.
    fn stride(&self) -> u32;

    fn evaluate_dense(&self, image: &ImageTensor) -> Result<ScoreGrid, EvaluatorError>;
}

/// Refinement/output-stage evaluator: scores one `input_size`² window.
pub trait WindowEvaluator: Send + Sync {
    fn input_size(&self) -> u32;

    fn evaluate_window(&self, window: &ImageTensor) -> Result<WindowScore, EvaluatorError>;
}

pub fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_grid_rejects_mismatched_regression_shape() {
        let scores = Array2::zeros((3, 4));
        let regressions = Array3::zeros((4, 4, 3));
        assert!(matches!(
            ScoreGrid::new(scores, regressions),
            Err(EvaluatorError::Shape(_))
        ));
    }

    #[test]
    fn test_grid_cell_reads_channel_planes() {
        let mut scores = Array2::zeros((2, 3));
        scores[[1, 2]] = 0.9;
        let mut regressions = Array3::zeros((4, 2, 3));
        for (k, v) in [0.0, 0.1, 0.2, 0.3].into_iter().enumerate() {
            regressions[[k, 1, 2]] = v;
        }
        let grid = ScoreGrid::new(scores, regressions).unwrap();

        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
        let (score, reg) = grid.cell(2, 1);
        assert_eq!(score, 0.9);
        assert_eq!(reg, [0.0, 0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_grid_cells_row_major() {
        let grid = ScoreGrid::new(Array2::zeros((2, 2)), Array3::zeros((4, 2, 2))).unwrap();
        let coords: Vec<_> = grid.cells().map(|(x, y, _, _)| (x, y)).collect();
        assert_eq!(coords, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_grid_non_finite_values_read_as_zero() {
        let scores = Array2::from_elem((1, 1), f32::NAN);
        let regressions = Array3::from_elem((4, 1, 1), f32::INFINITY);
        let grid = ScoreGrid::new(scores, regressions).unwrap();
        assert_eq!(grid.cell(0, 0), (0.0, [0.0; 4]));
    }

    #[test]
    fn test_window_score_sanitized_drops_bad_landmarks() {
        let mut pts = [(0.5, 0.5); NUM_LANDMARKS];
        pts[3] = (f32::NAN, 0.2);
        let w = WindowScore::new(f32::INFINITY, [f32::NAN, 0.1, 0.0, 0.0])
            .with_landmarks(pts)
            .sanitized();
        assert_eq!(w.score, 0.0);
        assert_eq!(w.regression, [0.0, 0.1, 0.0, 0.0]);
        assert!(w.landmarks.is_none());
    }

    #[test]
    fn test_window_score_sanitized_keeps_finite_landmarks() {
        let w = WindowScore::new(0.8, [0.0; 4])
            .with_landmarks([(0.1, 0.2); NUM_LANDMARKS])
            .sanitized();
        assert_eq!(w.landmarks, Some([(0.1, 0.2); NUM_LANDMARKS]));
    }

    #[rstest]
    #[case::unavailable(EvaluatorError::Unavailable("gone".into()), true)]
    #[case::backend(EvaluatorError::Backend("oom".into()), true)]
    #[case::shape(EvaluatorError::Shape("bad".into()), false)]
    fn test_is_systemic(#[case] err: EvaluatorError, #[case] expected: bool) {
        assert_eq!(err.is_systemic(), expected);
    }
}
