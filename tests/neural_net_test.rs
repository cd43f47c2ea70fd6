mod common;

use ml4rt_rust::config::ConstrainedMseOptions;
use ml4rt_rust::layout::predictors_to_tensor;
use ml4rt_rust::neural_net::{
    apply_model, find_metafile, read_metafile, write_metafile, Model, ModelMetadata, NeuralNetError,
};
use ml4rt_rust::{Field, GeneratorConfig, LossFunction, NetType, PredictorMatrix, TargetMatrices};
use ndarray::{s, Array2};
use tempfile::tempdir;

fn metadata() -> ModelMetadata {
    let training_options = GeneratorConfig::new(
        "/data/training",
        "/data/training/rrtm_output_2017.nc",
        1024,
        1_483_228_800,
        1_514_764_799,
    )
        .with_vector_targets(vec![Field::DownFlux, Field::UpFlux])
        .with_heights(vec![10.0, 20.0, 40.0]);
    let validation_options = GeneratorConfig {
        example_dir: "/data/validation".into(),
        first_time_unix_sec: 1_514_764_800,
        last_time_unix_sec: 1_546_300_799,
        ..training_options.clone()
    };

    ModelMetadata {
        num_epochs: 100,
        num_training_batches_per_epoch: 500,
        training_options,
        num_validation_batches_per_epoch: 100,
        validation_options,
        net_type: NetType::Cnn,
        loss_function: LossFunction::ConstrainedMse(ConstrainedMseOptions {
            toa_up_flux_index: 2,
            toa_up_flux_weight: 0.25,
            surface_down_flux_index: 3,
            surface_down_flux_weight: 0.5,
            up_flux_channel_index: 1,
            down_flux_channel_index: 0,
            highest_up_flux_index: 0,
            lowest_down_flux_index: 1,
            net_flux_weight: 2.0,
        }),
    }
}

#[test]
fn test_metafile_round_trip() {
    let dir = tempdir().unwrap();
    let model_dir = dir.path().join("models").join("cnn");
    let path = find_metafile(&model_dir, false).unwrap();

    let original = metadata();
    write_metafile(&path, &original).unwrap();

    assert_eq!(find_metafile(&model_dir, true).unwrap(), path);
    assert_eq!(read_metafile(&path).unwrap(), original);

    // Field names are stored as their canonical strings
    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("\"shortwave_up_flux_W_m02\""));
}

#[test]
fn test_read_missing_metafile() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        read_metafile(&dir.path().join("model_metadata.json")),
        Err(NeuralNetError::MetafileNotFound(_))
    ));
}

/// Dense model that returns the first `num_outputs` predictors of every example
struct Passthrough {
    num_outputs: usize,
}

impl Model for Passthrough {
    fn predict(&self, predictors: &PredictorMatrix<f32>) -> Result<TargetMatrices<f32>, NeuralNetError> {
        match predictors {
            PredictorMatrix::Flat(flat) => Ok(TargetMatrices::Dense {
                flat: flat.slice(s![.., ..self.num_outputs]).to_owned(),
            }),
            PredictorMatrix::Profile(_) => Err(NeuralNetError::Model("expected flat predictors".to_string())),
        }
    }
}

#[test]
fn test_apply_model_stacks_batches_in_order() {
    let example = common::four_examples();
    let predictors = predictors_to_tensor(&example, NetType::DenseNet).to_f32();
    let model = Passthrough { num_outputs: 5 };

    let output = apply_model(&model, &predictors, 3, NetType::DenseNet, &LossFunction::Mse).unwrap();
    let flat = match output {
        TargetMatrices::Dense { flat } => flat,
        other => panic!("expected dense output, got {:?}", other),
    };
    assert_eq!(flat.dim(), (4, 5));

    let expected: Array2<f32> = match &predictors {
        PredictorMatrix::Flat(input) => input.slice(s![.., ..5]).to_owned(),
        PredictorMatrix::Profile(_) => unreachable!(),
    };
    assert_eq!(flat, expected);
    assert_eq!(flat[[3, 0]], 287.0);
}
