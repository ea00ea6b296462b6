//! In-test evaluator stubs shared by the stage and cascade tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ndarray::{Array2, Array3};

use crate::detection::domain::face_landmarks::NUM_LANDMARKS;
use crate::detection::domain::stage_evaluator::{
    DenseEvaluator, EvaluatorError, ScoreGrid, WindowEvaluator, WindowScore,
};
use crate::shared::image_tensor::ImageTensor;

pub const STUB_WINDOW: u32 = 12;
pub const STUB_STRIDE: u32 = 2;

type CellScore = dyn Fn(usize, usize) -> f32 + Send + Sync;
type WindowScoreFn = dyn Fn(&ImageTensor) -> f32 + Send + Sync;

fn failure(systemic: bool) -> EvaluatorError {
    if systemic {
        EvaluatorError::Backend("stub backend failure".into())
    } else {
        EvaluatorError::Shape("stub shape failure".into())
    }
}

/// Dense evaluator with a 12 px window and stride 2 whose cell scores come
/// from a closure over `(x, y)`.
pub struct StubDenseEvaluator {
    score_at: Box<CellScore>,
    regression: [f32; 4],
    fail_at_width: Option<(usize, bool)>,
    calls: AtomicUsize,
    widths: Mutex<Vec<usize>>,
}

impl StubDenseEvaluator {
    pub fn uniform(score: f32) -> Self {
        Self::from_fn(move |_, _| score)
    }

    /// Scores `score` at the single cell `(x, y)`, zero elsewhere.
    pub fn single_cell(x: usize, y: usize, score: f32) -> Self {
        Self::from_fn(move |cx, cy| if (cx, cy) == (x, y) { score } else { 0.0 })
    }

    pub fn from_fn(score_at: impl Fn(usize, usize) -> f32 + Send + Sync + 'static) -> Self {
        Self {
            score_at: Box::new(score_at),
            regression: [0.0; 4],
            fail_at_width: None,
            calls: AtomicUsize::new(0),
            widths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_regression(mut self, regression: [f32; 4]) -> Self {
        self.regression = regression;
        self
    }

    /// Fails whenever the scanned image is exactly `width` pixels wide.
    pub fn failing_at_width(mut self, width: usize, systemic: bool) -> Self {
        self.fail_at_width = Some((width, systemic));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn widths(&self) -> Vec<usize> {
        let mut widths = self.widths.lock().unwrap().clone();
        widths.sort_unstable_by(|a, b| b.cmp(a));
        widths
    }
}

impl DenseEvaluator for StubDenseEvaluator {
    fn window_side(&self) -> u32 {
        STUB_WINDOW
    }

    fn stride(&self) -> u32 {
        STUB_STRIDE
    }

    fn evaluate_dense(&self, image: &ImageTensor) -> Result<ScoreGrid, EvaluatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.widths.lock().unwrap().push(image.width());
        if let Some((width, systemic)) = self.fail_at_width {
            if image.width() == width {
                return Err(failure(systemic));
            }
        }

        let window = STUB_WINDOW as usize;
        let stride = STUB_STRIDE as usize;
        let rows = (image.height() - window) / stride + 1;
        let cols = (image.width() - window) / stride + 1;

        let scores = Array2::from_shape_fn((rows, cols), |(y, x)| (self.score_at)(x, y));
        let regressions =
            Array3::from_shape_fn((4, rows, cols), |(k, _, _)| self.regression[k]);
        ScoreGrid::new(scores, regressions)
    }
}

/// Window evaluator whose score is computed from the received window.
pub struct StubWindowEvaluator {
    input_size: u32,
    score_of: Box<WindowScoreFn>,
    regression: [f32; 4],
    landmarks: Option<[(f32, f32); NUM_LANDMARKS]>,
    fail_above: Option<(f32, bool)>,
    calls: AtomicUsize,
    sizes: Mutex<Vec<(usize, usize)>>,
}

impl StubWindowEvaluator {
    pub fn constant(input_size: u32, score: f32) -> Self {
        Self::from_fn(input_size, move |_| score)
    }

    /// Scores each window by its mean intensity divided by 255.
    pub fn brightness(input_size: u32) -> Self {
        Self::from_fn(input_size, |window| {
            let view = window.view();
            view.sum() / (view.len().max(1) as f32 * 255.0)
        })
    }

    pub fn from_fn(
        input_size: u32,
        score_of: impl Fn(&ImageTensor) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            input_size,
            score_of: Box::new(score_of),
            regression: [0.0; 4],
            landmarks: None,
            fail_above: None,
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_regression(mut self, regression: [f32; 4]) -> Self {
        self.regression = regression;
        self
    }

    pub fn with_landmarks(mut self, landmarks: [(f32, f32); NUM_LANDMARKS]) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// Fails for every window whose computed score exceeds `score`.
    pub fn failing_above(mut self, score: f32, systemic: bool) -> Self {
        self.fail_above = Some((score, systemic));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sizes(&self) -> Vec<(usize, usize)> {
        self.sizes.lock().unwrap().clone()
    }
}

impl WindowEvaluator for StubWindowEvaluator {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn evaluate_window(&self, window: &ImageTensor) -> Result<WindowScore, EvaluatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes
            .lock()
            .unwrap()
            .push((window.width(), window.height()));

        let score = (self.score_of)(window);
        if let Some((limit, systemic)) = self.fail_above {
            if score > limit {
                return Err(failure(systemic));
            }
        }

        let result = WindowScore::new(score, self.regression);
        Ok(match self.landmarks {
            Some(landmarks) => result.with_landmarks(landmarks),
            None => result,
        })
    }
}

/// `width × height` tensor, black except for a white axis-aligned patch.
pub fn image_with_patch(
    width: usize,
    height: usize,
    patch: (usize, usize, usize, usize),
) -> ImageTensor {
    let (px, py, pw, ph) = patch;
    ImageTensor::from_array(Array3::from_shape_fn((height, width, 3), |(y, x, _)| {
        if x >= px && x < px + pw && y >= py && y < py + ph {
            255.0
        } else {
            0.0
        }
    }))
}
