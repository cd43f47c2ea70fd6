use crate::config::{NormalizationPolicy, NormalizationType};
use crate::data_io::utils::match_heights;
use crate::data_io::{read_file, ExampleCollection, ExampleError, Field, ReaderError};
use ndarray::{Array2, Array3, Axis};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Summary statistics of one field
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    pub mean: f64,
    /// Sample standard deviation (one degree of freedom removed)
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

impl FieldStats {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a f64>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut collected = Vec::new();

        for &value in values {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
            collected.push(value);
        }

        let mean = sum / count as f64;
        let squares: f64 = collected.iter().map(|v| (v - mean).powi(2)).sum();
        let stdev = (squares / (count as f64 - 1.0)).sqrt();
        Self {
            mean,
            stdev,
            min,
            max,
        }
    }

    fn stdev_divisor(&self) -> f64 {
        if self.stdev.is_finite() && self.stdev > 0.0 {
            self.stdev
        } else {
            1.0
        }
    }

    fn range_divisor(&self) -> f64 {
        let range = self.max - self.min;
        if range.is_finite() && range > 0.0 {
            range
        } else {
            1.0
        }
    }

    fn normalize(&self, value: f64, policy: &NormalizationPolicy, norm_type: NormalizationType) -> f64 {
        match norm_type {
            NormalizationType::ZScore => (value - self.mean) / self.stdev_divisor(),
            NormalizationType::MinMax => {
                policy.min_value
                    + (value - self.min) / self.range_divisor() * (policy.max_value - policy.min_value)
            }
        }
    }

    fn denormalize(&self, value: f64, policy: &NormalizationPolicy, norm_type: NormalizationType) -> f64 {
        match norm_type {
            NormalizationType::ZScore => value * self.stdev_divisor() + self.mean,
            NormalizationType::MinMax => {
                (value - policy.min_value) / (policy.max_value - policy.min_value)
                    * self.range_divisor()
                    + self.min
            }
        }
    }
}

/// Statistics of a reference collection, pooled and per height
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizationStats {
    heights_m_agl: Vec<f64>,
    pooled: HashMap<Field, FieldStats>,
    per_height: HashMap<Field, Vec<FieldStats>>,
}

impl NormalizationStats {
    pub fn from_examples(reference: &ExampleCollection) -> Result<Self, ExampleError> {
        if reference.num_examples() == 0 {
            return Err(ExampleError::InvalidArgument(
                "normalization statistics need at least one reference example".to_string(),
            ));
        }

        let mut pooled = HashMap::new();
        let mut per_height = HashMap::new();

        let scalar_lists = [
            (&reference.scalar_predictor_names, &reference.scalar_predictor_matrix),
            (&reference.scalar_target_names, &reference.scalar_target_matrix),
        ];
        for (names, matrix) in scalar_lists {
            for (k, field) in names.iter().enumerate() {
                pooled.insert(*field, FieldStats::from_values(matrix.column(k)));
            }
        }

        let vector_lists = [
            (&reference.vector_predictor_names, &reference.vector_predictor_matrix),
            (&reference.vector_target_names, &reference.vector_target_matrix),
        ];
        for (names, matrix) in vector_lists {
            for (k, field) in names.iter().enumerate() {
                let channel = matrix.index_axis(Axis(2), k);
                pooled.insert(*field, FieldStats::from_values(channel.iter()));
                let by_height = channel
                    .axis_iter(Axis(1))
                    .map(|column| FieldStats::from_values(column.iter()))
                    .collect();
                per_height.insert(*field, by_height);
            }
        }

        Ok(Self {
            heights_m_agl: reference.heights_m_agl.clone(),
            pooled,
            per_height,
        })
    }

    /// Read a reference example file and summarize it
    pub fn from_file(path: &Path) -> Result<Self, ReaderError> {
        let reference = read_file(path, true)?;
        info!(
            "Computing normalization statistics from {} examples in {}",
            reference.num_examples(),
            path.display()
        );
        Self::from_examples(&reference).map_err(ReaderError::from)
    }

    pub fn heights_m_agl(&self) -> &[f64] {
        &self.heights_m_agl
    }

    pub fn pooled(&self, field: Field) -> Result<&FieldStats, ExampleError> {
        self.pooled.get(&field).ok_or(ExampleError::UnknownField(field))
    }

    /// Statistics of a vector field at the reference height nearest `height_m_agl`
    pub fn at_height(&self, field: Field, height_m_agl: f64) -> Result<&FieldStats, ExampleError> {
        let by_height = self
            .per_height
            .get(&field)
            .ok_or(ExampleError::UnknownField(field))?;
        let k = match_heights(&self.heights_m_agl, height_m_agl)?;
        Ok(&by_height[k])
    }
}

/// Which side of the data a (de)normalization touches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyTo {
    Predictors,
    Targets,
    Both,
}

impl ApplyTo {
    fn predictors(&self) -> bool {
        matches!(self, ApplyTo::Predictors | ApplyTo::Both)
    }

    fn targets(&self) -> bool {
        matches!(self, ApplyTo::Targets | ApplyTo::Both)
    }
}

fn transform_scalars<F>(
    names: &[Field],
    matrix: &mut Array2<f64>,
    stats: &NormalizationStats,
    f: &F,
) -> Result<(), ExampleError>
where
    F: Fn(&FieldStats, f64) -> f64,
{
    for (k, field) in names.iter().enumerate() {
        let field_stats = stats.pooled(*field)?;
        matrix.column_mut(k).mapv_inplace(|x| f(field_stats, x));
    }
    Ok(())
}

fn transform_vectors<F>(
    names: &[Field],
    matrix: &mut Array3<f64>,
    stats: &NormalizationStats,
    heights_m_agl: Option<&[f64]>,
    f: &F,
) -> Result<(), ExampleError>
where
    F: Fn(&FieldStats, f64) -> f64,
{
    for (k, field) in names.iter().enumerate() {
        let mut channel = matrix.index_axis_mut(Axis(2), k);
        match heights_m_agl {
            Some(heights) => {
                for (h, &height) in heights.iter().enumerate() {
                    let field_stats = stats.at_height(*field, height)?;
                    channel.column_mut(h).mapv_inplace(|x| f(field_stats, x));
                }
            }
            None => {
                let field_stats = stats.pooled(*field)?;
                channel.mapv_inplace(|x| f(field_stats, x));
            }
        }
    }
    Ok(())
}

fn transform_example<F>(
    example: &ExampleCollection,
    stats: &NormalizationStats,
    separate_heights: bool,
    apply_to: ApplyTo,
    f: F,
) -> Result<ExampleCollection, ExampleError>
where
    F: Fn(&FieldStats, f64) -> f64,
{
    let mut result = example.clone();
    let heights = if separate_heights {
        Some(example.heights_m_agl.as_slice())
    } else {
        None
    };

    if apply_to.predictors() {
        transform_scalars(
            &result.scalar_predictor_names,
            &mut result.scalar_predictor_matrix,
            stats,
            &f,
        )?;
        transform_vectors(
            &result.vector_predictor_names,
            &mut result.vector_predictor_matrix,
            stats,
            heights,
            &f,
        )?;
    }
    if apply_to.targets() {
        transform_scalars(
            &result.scalar_target_names,
            &mut result.scalar_target_matrix,
            stats,
            &f,
        )?;
        transform_vectors(
            &result.vector_target_names,
            &mut result.vector_target_matrix,
            stats,
            heights,
            &f,
        )?;
    }
    Ok(result)
}

/// Normalize predictors, targets or both
///
/// Vector fields use per-height statistics when `separate_heights` is set,
/// pooled statistics otherwise. Scalar fields always use pooled statistics.
pub fn normalize_data(
    example: &ExampleCollection,
    stats: &NormalizationStats,
    policy: &NormalizationPolicy,
    separate_heights: bool,
    apply_to: ApplyTo,
) -> Result<ExampleCollection, ExampleError> {
    policy
        .validate()
        .map_err(|e| ExampleError::InvalidArgument(e.to_string()))?;
    match policy.norm_type {
        None => Ok(example.clone()),
        Some(norm_type) => transform_example(example, stats, separate_heights, apply_to, |s, x| {
            s.normalize(x, policy, norm_type)
        }),
    }
}

/// Inverse of `normalize_data` with the same arguments
pub fn denormalize_data(
    example: &ExampleCollection,
    stats: &NormalizationStats,
    policy: &NormalizationPolicy,
    separate_heights: bool,
    apply_to: ApplyTo,
) -> Result<ExampleCollection, ExampleError> {
    policy
        .validate()
        .map_err(|e| ExampleError::InvalidArgument(e.to_string()))?;
    match policy.norm_type {
        None => Ok(example.clone()),
        Some(norm_type) => transform_example(example, stats, separate_heights, apply_to, |s, x| {
            s.denormalize(x, policy, norm_type)
        }),
    }
}
