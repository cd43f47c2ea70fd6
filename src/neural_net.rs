//! Seam between the example pipeline and an externally trained network.

use crate::config::{GeneratorConfig, LossFunction, NetType};
use crate::data_io::ExampleError;
use crate::layout::{strip_constrained_channels, PredictorMatrix, TargetMatrices};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const METAFILE_NAME: &str = "model_metadata.json";

#[derive(Error, Debug)]
pub enum NeuralNetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Example(#[from] ExampleError),

    #[error("Cannot find metafile; expected at {0}")]
    MetafileNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Model failed: {0}")]
    Model(String),
}

/// A trained network that maps predictor tensors to target tensors
pub trait Model {
    fn predict(&self, predictors: &PredictorMatrix<f32>) -> Result<TargetMatrices<f32>, NeuralNetError>;
}

/// Run `model` over `predictors` in batches and stack the outputs
///
/// For a CNN trained with constrained MSE the two extra scalar channels are
/// removed from the result.
pub fn apply_model<M: Model + ?Sized>(
    model: &M,
    predictors: &PredictorMatrix<f32>,
    batch_size: usize,
    net_type: NetType,
    loss: &LossFunction,
) -> Result<TargetMatrices<f32>, NeuralNetError> {
    if batch_size == 0 {
        return Err(NeuralNetError::InvalidArgument(
            "batch size must be at least 1".to_string(),
        ));
    }
    let layout_ok = matches!(
        (net_type, predictors),
        (NetType::DenseNet, PredictorMatrix::Flat(_))
            | (NetType::Cnn | NetType::UNet, PredictorMatrix::Profile(_))
    );
    if !layout_ok {
        return Err(NeuralNetError::InvalidArgument(format!(
            "predictor tensor layout does not match net type {}",
            net_type
        )));
    }

    let num_examples = predictors.num_examples();
    if num_examples == 0 {
        return Err(NeuralNetError::InvalidArgument(
            "no examples to apply the model to".to_string(),
        ));
    }
    let batch_size = batch_size.min(num_examples);

    let mut outputs = Vec::with_capacity(num_examples.div_ceil(batch_size));
    for first in (0..num_examples).step_by(batch_size) {
        let last = (first + batch_size).min(num_examples);
        debug!(
            "Applying {} to examples {}-{} of {}",
            net_type,
            first + 1,
            last,
            num_examples
        );

        let output = model.predict(&predictors.select_examples(first..last))?;
        if output.num_examples() != last - first {
            return Err(NeuralNetError::Model(format!(
                "model returned {} predictions for {} examples",
                output.num_examples(),
                last - first
            )));
        }
        outputs.push(output);
    }

    let predictions = TargetMatrices::concat(&outputs)?;
    if net_type == NetType::Cnn && loss.is_constrained_mse() {
        return Ok(strip_constrained_channels(predictions)?);
    }
    Ok(predictions)
}

/// Training metadata stored next to a model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub num_epochs: usize,
    pub num_training_batches_per_epoch: usize,
    pub training_options: GeneratorConfig,
    pub num_validation_batches_per_epoch: usize,
    pub validation_options: GeneratorConfig,
    pub net_type: NetType,
    pub loss_function: LossFunction,
}

/// Path of the metafile in `model_dir`
///
/// With `raise_if_missing` false the expected path is returned even when the
/// file does not exist.
pub fn find_metafile(model_dir: &Path, raise_if_missing: bool) -> Result<PathBuf, NeuralNetError> {
    let path = model_dir.join(METAFILE_NAME);
    if raise_if_missing && !path.is_file() {
        return Err(NeuralNetError::MetafileNotFound(path.to_string_lossy().to_string()));
    }
    Ok(path)
}

pub fn write_metafile(path: &Path, metadata: &ModelMetadata) -> Result<(), NeuralNetError> {
    info!("Writing metadata to {}", path.display());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_metafile(path: &Path) -> Result<ModelMetadata, NeuralNetError> {
    if !path.is_file() {
        return Err(NeuralNetError::MetafileNotFound(path.to_string_lossy().to_string()));
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, Axis};

    /// Predicts the mean of each example's predictors everywhere
    struct MeanModel {
        num_heights: usize,
        num_vector: usize,
        num_scalar: usize,
    }

    impl Model for MeanModel {
        fn predict(&self, predictors: &PredictorMatrix<f32>) -> Result<TargetMatrices<f32>, NeuralNetError> {
            let means: Vec<f32> = match predictors {
                PredictorMatrix::Profile(m) => m
                    .axis_iter(Axis(0))
                    .map(|e| e.mean().unwrap_or(0.0))
                    .collect(),
                PredictorMatrix::Flat(_) => {
                    return Err(NeuralNetError::Model("dense input".to_string()))
                }
            };
            let n = means.len();
            Ok(TargetMatrices::Cnn {
                vector: Array3::from_shape_fn((n, self.num_heights, self.num_vector), |(i, _, _)| means[i]),
                scalar: Some(Array2::from_shape_fn((n, self.num_scalar), |(i, _)| means[i])),
            })
        }
    }

    #[test]
    fn test_apply_model_batches_and_strips() {
        let model = MeanModel {
            num_heights: 3,
            num_vector: 2,
            num_scalar: 4,
        };
        let predictors = PredictorMatrix::Profile(Array3::from_shape_fn((5, 3, 1), |(i, _, _)| i as f32));
        let loss = LossFunction::ConstrainedMse(crate::config::ConstrainedMseOptions {
            toa_up_flux_index: 2,
            toa_up_flux_weight: 1.0,
            surface_down_flux_index: 3,
            surface_down_flux_weight: 1.0,
            up_flux_channel_index: 1,
            down_flux_channel_index: 0,
            highest_up_flux_index: 0,
            lowest_down_flux_index: 1,
            net_flux_weight: 1.0,
        });

        let output = apply_model(&model, &predictors, 2, NetType::Cnn, &loss).unwrap();
        match output {
            TargetMatrices::Cnn { vector, scalar: Some(scalar) } => {
                assert_eq!(vector.dim(), (5, 3, 2));
                assert_eq!(scalar.dim(), (5, 2));
                assert_eq!(scalar[[4, 0]], 4.0);
            }
            other => panic!("unexpected layout {:?}", other),
        }

        let unconstrained = apply_model(&model, &predictors, 100, NetType::Cnn, &LossFunction::Mse).unwrap();
        match unconstrained {
            TargetMatrices::Cnn { scalar: Some(scalar), .. } => assert_eq!(scalar.ncols(), 4),
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_apply_model_rejects_bad_arguments() {
        let model = MeanModel {
            num_heights: 1,
            num_vector: 1,
            num_scalar: 0,
        };
        let predictors = PredictorMatrix::Profile(Array3::<f32>::zeros((2, 1, 1)));
        assert!(apply_model(&model, &predictors, 0, NetType::Cnn, &LossFunction::Mse).is_err());
        assert!(apply_model(&model, &predictors, 1, NetType::DenseNet, &LossFunction::Mse).is_err());
    }

    #[test]
    fn test_missing_metafile() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_metafile(dir.path(), true).is_err());
        assert_eq!(
            find_metafile(dir.path(), false).unwrap(),
            dir.path().join("model_metadata.json")
        );
    }
}
