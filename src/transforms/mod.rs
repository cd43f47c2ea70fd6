pub mod example_ids;
pub mod normalization;

pub use example_ids::{create_example_ids, parse_example_id, parse_example_ids, ExampleMetadata};
pub use normalization::{denormalize_data, normalize_data, ApplyTo, NormalizationStats};

use crate::data_io::utils::match_heights;
use crate::data_io::{ExampleCollection, ExampleError, Field, FieldKind};
use ndarray::{concatenate, ArrayView2, ArrayView3, Axis};
use rand::Rng;
use std::collections::HashMap;

fn channels_to_keep(available: &[Field], requested: &[Field]) -> (Vec<Field>, Vec<usize>) {
    available
        .iter()
        .enumerate()
        .filter(|(_, field)| requested.contains(*field))
        .map(|(k, field)| (*field, k))
        .unzip()
}

/// Keep only the requested fields
///
/// Fields keep their original relative order within each kind. Requesting a
/// field the collection does not hold is an error.
pub fn subset_by_field(
    example: &ExampleCollection,
    field_names: &[Field],
) -> Result<ExampleCollection, ExampleError> {
    for field in field_names {
        let present = match field.kind() {
            FieldKind::ScalarPredictor => example.scalar_predictor_names.contains(field),
            FieldKind::VectorPredictor => example.vector_predictor_names.contains(field),
            FieldKind::ScalarTarget => example.scalar_target_names.contains(field),
            FieldKind::VectorTarget => example.vector_target_names.contains(field),
        };
        if !present {
            return Err(ExampleError::UnknownField(*field));
        }
    }

    let (scalar_predictor_names, sp) = channels_to_keep(&example.scalar_predictor_names, field_names);
    let (vector_predictor_names, vp) = channels_to_keep(&example.vector_predictor_names, field_names);
    let (scalar_target_names, st) = channels_to_keep(&example.scalar_target_names, field_names);
    let (vector_target_names, vt) = channels_to_keep(&example.vector_target_names, field_names);

    Ok(ExampleCollection {
        scalar_predictor_names,
        scalar_predictor_matrix: example.scalar_predictor_matrix.select(Axis(1), &sp),
        vector_predictor_names,
        vector_predictor_matrix: example.vector_predictor_matrix.select(Axis(2), &vp),
        scalar_target_names,
        scalar_target_matrix: example.scalar_target_matrix.select(Axis(1), &st),
        vector_target_names,
        vector_target_matrix: example.vector_target_matrix.select(Axis(2), &vt),
        ..example.clone()
    })
}

/// Keep only the requested heights, in the requested order
pub fn subset_by_height(
    example: &ExampleCollection,
    heights_m_agl: &[f64],
) -> Result<ExampleCollection, ExampleError> {
    let height_indices = heights_m_agl
        .iter()
        .map(|&h| match_heights(&example.heights_m_agl, h))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExampleCollection {
        vector_predictor_matrix: example.vector_predictor_matrix.select(Axis(1), &height_indices),
        vector_target_matrix: example.vector_target_matrix.select(Axis(1), &height_indices),
        heights_m_agl: height_indices.iter().map(|&k| example.heights_m_agl[k]).collect(),
        ..example.clone()
    })
}

/// Examples with valid time in [first, last]
pub fn subset_by_time(
    example: &ExampleCollection,
    first_time_unix_sec: i64,
    last_time_unix_sec: i64,
) -> Result<(ExampleCollection, Vec<usize>), ExampleError> {
    if first_time_unix_sec > last_time_unix_sec {
        return Err(ExampleError::InvalidArgument(format!(
            "first time {} is after last time {}",
            first_time_unix_sec, last_time_unix_sec
        )));
    }

    let indices: Vec<usize> = example
        .valid_times_unix_sec
        .iter()
        .enumerate()
        .filter(|(_, t)| (first_time_unix_sec..=last_time_unix_sec).contains(*t))
        .map(|(i, _)| i)
        .collect();
    Ok((example.select_rows(&indices), indices))
}

/// Examples with column liquid-water path in [min, max]
pub fn subset_by_column_lwp(
    example: &ExampleCollection,
    min_lwp_kg_m02: f64,
    max_lwp_kg_m02: f64,
) -> Result<(ExampleCollection, Vec<usize>), ExampleError> {
    if !(min_lwp_kg_m02 >= 0.0) || !(max_lwp_kg_m02 >= min_lwp_kg_m02) {
        return Err(ExampleError::InvalidArgument(format!(
            "invalid column-LWP window [{}, {}]",
            min_lwp_kg_m02, max_lwp_kg_m02
        )));
    }

    let column_lwp = example.scalar_field(Field::ColumnLiquidWaterPath)?;
    let indices: Vec<usize> = column_lwp
        .iter()
        .enumerate()
        .filter(|(_, lwp)| **lwp >= min_lwp_kg_m02 && **lwp <= max_lwp_kg_m02)
        .map(|(i, _)| i)
        .collect();
    Ok((example.select_rows(&indices), indices))
}

/// Examples at the given indices, in the given order
pub fn subset_by_index(
    example: &ExampleCollection,
    indices: &[usize],
) -> Result<(ExampleCollection, Vec<usize>), ExampleError> {
    let num_examples = example.num_examples();
    if let Some(&bad) = indices.iter().find(|&&i| i >= num_examples) {
        return Err(ExampleError::ShapeMismatch(format!(
            "index {} out of range for {} examples",
            bad, num_examples
        )));
    }
    Ok((example.select_rows(indices), indices.to_vec()))
}

/// Cut the collection down to at most `num_to_keep` examples
///
/// With a first index the contiguous block starting there is kept; without one
/// a uniform random sample (no replacement) is drawn from `rng`.
pub fn reduce_sample_size<R: Rng + ?Sized>(
    example: &ExampleCollection,
    num_to_keep: usize,
    first_index: Option<usize>,
    rng: &mut R,
) -> (ExampleCollection, Vec<usize>) {
    let num_examples = example.num_examples();

    let indices: Vec<usize> = match first_index {
        Some(first) => {
            let start = first.min(num_examples);
            let end = first.saturating_add(num_to_keep).min(num_examples);
            (start..end).collect()
        }
        None => {
            let amount = num_to_keep.min(num_examples);
            rand::seq::index::sample(rng, num_examples, amount).into_vec()
        }
    };
    (example.select_rows(&indices), indices)
}

fn stack_3d(parts: Vec<ArrayView3<f64>>) -> Result<ndarray::Array3<f64>, ExampleError> {
    concatenate(Axis(0), &parts).map_err(|e| ExampleError::ShapeMismatch(e.to_string()))
}

fn stack_2d(parts: Vec<ArrayView2<f64>>) -> Result<ndarray::Array2<f64>, ExampleError> {
    concatenate(Axis(0), &parts).map_err(|e| ExampleError::ShapeMismatch(e.to_string()))
}

/// Concatenate collections along the example axis
///
/// Field lists and height grids must match. IDs survive only if every input
/// carries them.
pub fn concat_examples(examples: &[ExampleCollection]) -> Result<ExampleCollection, ExampleError> {
    let first = examples.first().ok_or_else(|| {
        ExampleError::InvalidArgument("cannot concatenate an empty list of examples".to_string())
    })?;

    let schema = first.schema();
    for other in &examples[1..] {
        schema.check_compatible(&other.schema())?;
    }

    let example_id_strings = if examples.iter().all(|e| e.example_id_strings.is_some()) {
        Some(
            examples
                .iter()
                .flat_map(|e| e.example_id_strings.iter().flatten().cloned())
                .collect(),
        )
    } else {
        None
    };

    Ok(ExampleCollection {
        scalar_predictor_names: first.scalar_predictor_names.clone(),
        scalar_predictor_matrix: stack_2d(
            examples.iter().map(|e| e.scalar_predictor_matrix.view()).collect(),
        )?,
        vector_predictor_names: first.vector_predictor_names.clone(),
        vector_predictor_matrix: stack_3d(
            examples.iter().map(|e| e.vector_predictor_matrix.view()).collect(),
        )?,
        scalar_target_names: first.scalar_target_names.clone(),
        scalar_target_matrix: stack_2d(
            examples.iter().map(|e| e.scalar_target_matrix.view()).collect(),
        )?,
        vector_target_names: first.vector_target_names.clone(),
        vector_target_matrix: stack_3d(
            examples.iter().map(|e| e.vector_target_matrix.view()).collect(),
        )?,
        valid_times_unix_sec: examples
            .iter()
            .flat_map(|e| e.valid_times_unix_sec.iter().copied())
            .collect(),
        heights_m_agl: first.heights_m_agl.clone(),
        standard_atmo_flags: examples
            .iter()
            .flat_map(|e| e.standard_atmo_flags.iter().copied())
            .collect(),
        example_id_strings,
    })
}

/// Position of each desired ID within `all_ids`, in desired order
///
/// Missing IDs are an error unless `allow_missing`, in which case they map
/// to None.
pub fn find_examples<S: AsRef<str>, T: AsRef<str>>(
    all_ids: &[S],
    desired_ids: &[T],
    allow_missing: bool,
) -> Result<Vec<Option<usize>>, ExampleError> {
    let lookup: HashMap<&str, usize> = all_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_ref(), i))
        .collect();

    desired_ids
        .iter()
        .map(|id| match lookup.get(id.as_ref()) {
            Some(&i) => Ok(Some(i)),
            None if allow_missing => Ok(None),
            None => Err(ExampleError::MissingExample(id.as_ref().to_string())),
        })
        .collect()
}
