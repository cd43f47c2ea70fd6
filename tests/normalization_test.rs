mod common;

use approx::assert_relative_eq;
use ml4rt_rust::transforms::{denormalize_data, normalize_data, ApplyTo, NormalizationStats};
use ml4rt_rust::{ExampleError, Field, NormalizationPolicy};

#[test]
fn test_z_score_uses_sample_stdev() {
    let example = common::four_examples();
    let stats = NormalizationStats::from_examples(&example).unwrap();
    let policy = NormalizationPolicy::z_score();

    let normalized = normalize_data(&example, &stats, &policy, false, ApplyTo::Predictors).unwrap();

    // Zenith angles 0..3: mean 1.5, sample stdev sqrt(5/3)
    let zenith = normalized.scalar_field(Field::ZenithAngle).unwrap();
    assert_relative_eq!(zenith[0], -1.5 / (5.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    assert_relative_eq!(zenith.sum(), 0.0, epsilon = 1e-12);

    // Constant latitude normalizes to zero instead of dividing by zero
    let latitude = normalized.scalar_field(Field::Latitude).unwrap();
    assert!(latitude.iter().all(|v| v.abs() < 1e-12));

    // Targets untouched
    assert_eq!(normalized.vector_target_matrix, example.vector_target_matrix);
}

#[test]
fn test_min_max_per_height() {
    let example = common::four_examples();
    let stats = NormalizationStats::from_examples(&example).unwrap();
    let policy = NormalizationPolicy::min_max(0.0, 1.0);

    let normalized = normalize_data(&example, &stats, &policy, true, ApplyTo::Targets).unwrap();
    let down_flux = normalized.vector_field(Field::DownFlux).unwrap();

    // Lowest height: 300, 500, 450, 200 span [200, 500]
    assert_relative_eq!(down_flux[[0, 0]], 1.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(down_flux[[1, 0]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(down_flux[[3, 0]], 0.0, epsilon = 1e-12);
    // Highest height: 200, 300, 450, 100 span [100, 450]
    assert_relative_eq!(down_flux[[2, 1]], 1.0, epsilon = 1e-12);

    for value in normalized.vector_target_matrix.iter() {
        assert!((0.0..=1.0).contains(value));
    }
}

#[test]
fn test_normalization_inverts() {
    let example = common::four_examples();
    let stats = NormalizationStats::from_examples(&example).unwrap();

    let policies = [NormalizationPolicy::z_score(), NormalizationPolicy::min_max(-1.0, 1.0)];
    for policy in policies {
        for separate_heights in [false, true] {
            let normalized =
                normalize_data(&example, &stats, &policy, separate_heights, ApplyTo::Both).unwrap();
            let restored =
                denormalize_data(&normalized, &stats, &policy, separate_heights, ApplyTo::Both).unwrap();

            let pairs = [
                (&restored.scalar_predictor_matrix, &example.scalar_predictor_matrix),
                (&restored.scalar_target_matrix, &example.scalar_target_matrix),
            ];
            for (actual, expected) in pairs {
                common::assert_arrays_close(actual, expected, 1e-6);
            }
            common::assert_arrays_close(
                &restored.vector_predictor_matrix,
                &example.vector_predictor_matrix,
                1e-6,
            );
            common::assert_arrays_close(
                &restored.vector_target_matrix,
                &example.vector_target_matrix,
                1e-6,
            );
        }
    }
}

#[test]
fn test_no_normalization_is_identity() {
    let example = common::four_examples();
    let stats = NormalizationStats::from_examples(&example).unwrap();
    let normalized =
        normalize_data(&example, &stats, &NormalizationPolicy::none(), true, ApplyTo::Both).unwrap();
    assert_eq!(normalized, example);
}

#[test]
fn test_missing_statistics_are_an_error() {
    let example = common::four_examples();
    let reference = ml4rt_rust::transforms::subset_by_field(
        &example,
        &[Field::ZenithAngle, Field::Temperature, Field::DownFlux],
    )
    .unwrap();
    let stats = NormalizationStats::from_examples(&reference).unwrap();

    let result = normalize_data(
        &example,
        &stats,
        &NormalizationPolicy::z_score(),
        false,
        ApplyTo::Predictors,
    );
    assert!(result.is_err());
}

#[test]
fn test_degenerate_min_max_range_is_rejected() {
    let example = common::four_examples();
    let stats = NormalizationStats::from_examples(&example).unwrap();
    let policy = NormalizationPolicy::min_max(1.0, 1.0);

    assert!(matches!(
        normalize_data(&example, &stats, &policy, false, ApplyTo::Both),
        Err(ExampleError::InvalidArgument(_))
    ));
    assert!(matches!(
        denormalize_data(&example, &stats, &policy, false, ApplyTo::Both),
        Err(ExampleError::InvalidArgument(_))
    ));
}

#[test]
fn test_empty_reference_is_rejected() {
    let example = common::four_examples();
    let (empty, _) = ml4rt_rust::transforms::subset_by_index(&example, &[]).unwrap();
    assert_eq!(empty.num_examples(), 0);

    assert!(matches!(
        NormalizationStats::from_examples(&empty),
        Err(ExampleError::InvalidArgument(_))
    ));
}
