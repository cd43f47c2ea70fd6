use ml4rt_rust::data_io::prediction::{
    concat_predictions, find_file, read_file, subset_by_index, subset_by_month,
    subset_by_standard_atmo, subset_by_zenith_angle, write_file, PredictionError,
    PredictionFileKind, PredictionRecord, MAX_ZENITH_ANGLE_RAD,
};
use ml4rt_rust::data_io::StandardAtmosphere;
use ml4rt_rust::transforms::ExampleMetadata;
use ndarray::{Array2, Array3};
use tempfile::tempdir;

/// 2017-01-01 and 2017-07-01
const JANUARY: i64 = 1_483_228_800;
const JULY: i64 = 1_498_867_200;

fn example_id(zenith_angle_rad: f64, time: i64, atmosphere: StandardAtmosphere) -> String {
    ExampleMetadata {
        latitude_deg_n: 40.5,
        longitude_deg_e: 255.25,
        zenith_angle_rad,
        valid_time_unix_sec: time,
        standard_atmo_flag: atmosphere,
    }
    .to_id_string()
}

/// Four predictions on two heights; every value is exact in f32
fn record(num_scalar: usize) -> PredictionRecord {
    let example_id_strings = vec![
        example_id(0.25, JANUARY, StandardAtmosphere::Tropics),
        example_id(0.5, JANUARY + 60, StandardAtmosphere::MidlatitudeSummer),
        example_id(1.0, JULY, StandardAtmosphere::Tropics),
        example_id(MAX_ZENITH_ANGLE_RAD, JULY + 60, StandardAtmosphere::UsStandard),
    ];

    PredictionRecord {
        scalar_target_matrix: Array2::from_shape_fn((4, num_scalar), |(i, k)| 100.0 * i as f64 + k as f64),
        scalar_prediction_matrix: Array2::from_shape_fn((4, num_scalar), |(i, k)| {
            100.0 * i as f64 + k as f64 + 0.5
        }),
        vector_target_matrix: Array3::from_shape_fn((4, 2, 3), |(i, h, c)| {
            (10 * i + 5 * h + c) as f64
        }),
        vector_prediction_matrix: Array3::from_shape_fn((4, 2, 3), |(i, h, c)| {
            (10 * i + 5 * h + c) as f64 - 0.25
        }),
        heights_m_agl: vec![100.0, 500.0],
        example_id_strings,
        model_file_name: "/models/cnn/model.h5".to_string(),
        isotonic_model_file_name: None,
    }
}

#[test]
fn test_write_then_read() {
    let dir = tempdir().unwrap();
    let path = find_file(dir.path(), PredictionFileKind::All, false).unwrap();

    let original = record(2);
    write_file(&path, &original).unwrap();
    let restored = read_file(&path).unwrap();
    assert_eq!(restored, original);
}

#[test]
fn test_write_then_read_without_scalars() {
    let dir = tempdir().unwrap();
    let path = find_file(dir.path(), PredictionFileKind::Month(7), false).unwrap();

    let mut original = record(0);
    original.isotonic_model_file_name = Some("/models/cnn/isotonic".to_string());
    write_file(&path, &original).unwrap();

    let restored = read_file(&path).unwrap();
    assert_eq!(restored.scalar_target_matrix.dim(), (4, 0));
    assert_eq!(restored.scalar_prediction_matrix.dim(), (4, 0));
    assert_eq!(restored.isotonic_model_file_name.as_deref(), Some("/models/cnn/isotonic"));
    assert_eq!(restored, original);
}

#[test]
fn test_grid_cell_file_goes_in_row_directory() {
    let dir = tempdir().unwrap();
    let path = find_file(dir.path(), PredictionFileKind::GridCell { row: 3, column: 17 }, false).unwrap();
    write_file(&path, &record(1)).unwrap();

    assert!(path.starts_with(dir.path().join("grid-row=003")));
    assert!(find_file(dir.path(), PredictionFileKind::GridCell { row: 3, column: 17 }, true).is_ok());
    assert!(matches!(
        find_file(dir.path(), PredictionFileKind::GridCell { row: 3, column: 18 }, true),
        Err(PredictionError::FileNotFound(_))
    ));
}

#[test]
fn test_inconsistent_record_is_not_written() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("predictions.nc");
    let mut bad = record(2);
    bad.example_id_strings.pop();
    assert!(write_file(&path, &bad).is_err());
    assert!(!path.exists());
}

#[test]
fn test_subsets() {
    let full = record(2);

    let tropics = subset_by_standard_atmo(&full, StandardAtmosphere::Tropics).unwrap();
    assert_eq!(tropics.example_id_strings, vec![full.example_id_strings[0].clone(), full.example_id_strings[2].clone()]);
    assert_eq!(tropics.vector_target_matrix[[1, 0, 0]], 20.0);

    let july = subset_by_month(&full, 7).unwrap();
    assert_eq!(july.num_examples(), 2);
    assert_eq!(july.scalar_target_matrix[[0, 0]], 200.0);
    assert!(subset_by_month(&full, 13).is_err());

    // Upper edge excluded unless it is the largest possible angle
    let low = subset_by_zenith_angle(&full, 0.0, 0.5, None).unwrap();
    assert_eq!(low.num_examples(), 1);
    let low_inclusive = subset_by_zenith_angle(&full, 0.0, 0.5, Some(true)).unwrap();
    assert_eq!(low_inclusive.num_examples(), 2);
    let high = subset_by_zenith_angle(&full, 1.0, MAX_ZENITH_ANGLE_RAD, None).unwrap();
    assert_eq!(high.num_examples(), 2);
    assert!(subset_by_zenith_angle(&full, 0.5, 0.25, None).is_err());

    let reordered = subset_by_index(&full, &[3, 1]).unwrap();
    assert_eq!(reordered.example_id_strings[0], full.example_id_strings[3]);
    assert_eq!(reordered.vector_prediction_matrix[[1, 1, 2]], full.vector_prediction_matrix[[1, 1, 2]]);
    assert!(subset_by_index(&full, &[4]).is_err());
}

#[test]
fn test_concat_predictions() {
    let full = record(2);
    let first = subset_by_index(&full, &[0, 1]).unwrap();
    let second = subset_by_index(&full, &[2, 3]).unwrap();
    assert_eq!(concat_predictions(&[first.clone(), second]).unwrap(), full);

    let mut other_model = first.clone();
    other_model.model_file_name = "/models/dense/model.h5".to_string();
    assert!(concat_predictions(&[first, other_model]).is_err());
    assert!(concat_predictions(&[]).is_err());
}

#[test]
fn test_evaluate_record() {
    use approx::assert_relative_eq;
    use ml4rt_rust::evaluation::{evaluate, Climatology, EvaluationOptions};
    use ndarray::Axis;

    let full = record(2);
    let climatology = Climatology {
        scalar_means: full.scalar_target_matrix.mean_axis(Axis(0)).unwrap(),
        vector_means: full.vector_target_matrix.mean_axis(Axis(0)).unwrap(),
    };
    let evaluation = evaluate(&full, &climatology, &EvaluationOptions::default()).unwrap();

    assert_eq!(evaluation.scalar_scores.len(), 2);
    let scalar = &evaluation.scalar_scores[1];
    assert_relative_eq!(scalar.bias, 0.5);
    assert_relative_eq!(scalar.mse, 0.25);
    assert_relative_eq!(scalar.correlation, 1.0, epsilon = 1e-12);
    assert_relative_eq!(scalar.target_stdev, scalar.prediction_stdev, epsilon = 1e-12);

    assert_eq!(evaluation.vector_scores.len(), 2);
    assert_eq!(evaluation.vector_scores[0].len(), 3);
    let vector = &evaluation.vector_scores[1][2];
    assert_relative_eq!(vector.bias, -0.25);
    assert_relative_eq!(vector.mae, 0.25);
    assert!(vector.mse_skill_score > 0.99);
    assert_eq!(vector.reliability.example_counts.iter().sum::<usize>(), 4);

    let wrong_climatology = Climatology {
        scalar_means: ndarray::Array1::zeros(1),
        ..climatology
    };
    assert!(evaluate(&full, &wrong_climatology, &EvaluationOptions::default()).is_err());
}
