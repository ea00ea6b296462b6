pub const PROPOSAL_MODEL_NAME: &str = "det1.onnx";
pub const REFINEMENT_MODEL_NAME: &str = "det2.onnx";
pub const OUTPUT_MODEL_NAME: &str = "det3.onnx";

/// Receptive field of the proposal network, in resized-image pixels.
pub const PROPOSAL_WINDOW_SIDE: u32 = 12;
/// Cell spacing of the proposal network's output grid.
pub const PROPOSAL_STRIDE: u32 = 2;

/// Fallback window sizes when a model declares a dynamic input shape.
pub const REFINEMENT_INPUT_SIZE: u32 = 24;
pub const OUTPUT_INPUT_SIZE: u32 = 48;

/// Directory name under the per-user cache where models are kept.
pub const MODEL_CACHE_DIR_NAME: &str = "FaceCascade";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
