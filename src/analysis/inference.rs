//! The neural inference backend (`spec.md` §4.2 "Invokes the neural
//! interpreter"), grounded in the ONNX-session construction pattern used
//! for the other retrieved corpus's speech model (`ort::session`,
//! `ndarray` tensors, CPU execution provider).

use ndarray::{Array1, Array2};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to build inference session: {0}")]
    Session(String),
    #[error("inference run failed: {0}")]
    Run(String),
    #[error("unexpected output tensor shape: {0}")]
    Shape(String),
}

/// A single model forward pass over one 3-second window plus its metadata
/// vector, returning one raw logit per label.
pub trait Interpreter: Send {
    fn infer(&mut self, audio_window: &[f32], metadata: [f32; 6]) -> Result<Vec<f32>, InferenceError>;
}

/// `ort`-backed interpreter wrapping the two-input BirdNET-style model:
/// a raw audio tensor and a 6-element metadata tensor, producing one
/// logit per label class.
pub struct OrtInterpreter {
    session: Session,
}

impl OrtInterpreter {
    pub fn load(model_path: &std::path::Path) -> Result<Self, InferenceError> {
        let session = Session::builder()
            .map_err(|e| InferenceError::Session(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferenceError::Session(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| InferenceError::Session(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| InferenceError::Session(e.to_string()))?;

        Ok(Self { session })
    }
}

impl Interpreter for OrtInterpreter {
    fn infer(&mut self, audio_window: &[f32], metadata: [f32; 6]) -> Result<Vec<f32>, InferenceError> {
        let audio_tensor: Array2<f32> =
            Array1::from_vec(audio_window.to_vec()).insert_axis(ndarray::Axis(0));
        let metadata_tensor: Array2<f32> = Array1::from_vec(metadata.to_vec()).insert_axis(ndarray::Axis(0));

        let outputs = self
            .session
            .run(ort::inputs![
                "audio" => audio_tensor.view(),
                "metadata" => metadata_tensor.view(),
            ])
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Shape(e.to_string()))?;

        Ok(scores.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A deterministic stand-in interpreter for pipeline tests that don't
    /// want to load a real ONNX model: scores every label proportional to
    /// its index, so truncation/threshold behaviour is exercisable.
    pub struct FakeInterpreter {
        pub scores: Vec<f32>,
    }

    impl Interpreter for FakeInterpreter {
        fn infer(&mut self, _audio_window: &[f32], _metadata: [f32; 6]) -> Result<Vec<f32>, InferenceError> {
            Ok(self.scores.clone())
        }
    }

    #[test]
    fn fake_interpreter_returns_configured_scores() {
        let mut interpreter = FakeInterpreter {
            scores: vec![0.1, 0.9],
        };
        let out = interpreter.infer(&[0.0; 10], [0.0; 6]).unwrap();
        assert_eq!(out, vec![0.1, 0.9]);
    }
}
