pub mod execution_provider;
pub mod onnx_stage_evaluator;
