//! Deterministic verification scores for prediction records.

use crate::data_io::prediction::PredictionRecord;
use crate::data_io::{ExampleCollection, ExampleError};
use crate::transforms::normalization::FieldStats;
use ndarray::{Array1, Array2, ArrayView1, Axis};

pub const DEFAULT_NUM_RELIABILITY_BINS: usize = 20;
pub const DEFAULT_MAX_BIN_EDGE_PERCENTILE: f64 = 99.0;

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationOptions {
    pub num_reliability_bins: usize,
    /// Upper edge of the last reliability bin, as a percentile of the targets
    pub max_bin_edge_percentile: f64,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            num_reliability_bins: DEFAULT_NUM_RELIABILITY_BINS,
            max_bin_edge_percentile: DEFAULT_MAX_BIN_EDGE_PERCENTILE,
        }
    }
}

impl EvaluationOptions {
    pub fn validate(&self) -> Result<(), ExampleError> {
        if !(10..=1000).contains(&self.num_reliability_bins) {
            return Err(ExampleError::InvalidArgument(format!(
                "{} reliability bins, expected 10 to 1000",
                self.num_reliability_bins
            )));
        }
        if !(90.0..=100.0).contains(&self.max_bin_edge_percentile) {
            return Err(ExampleError::InvalidArgument(format!(
                "bin-edge percentile {} is outside [90, 100]",
                self.max_bin_edge_percentile
            )));
        }
        Ok(())
    }
}

/// Mean training target values, the reference forecast for skill scores
#[derive(Clone, Debug, PartialEq)]
pub struct Climatology {
    /// Ts
    pub scalar_means: Array1<f64>,
    /// H x Tv
    pub vector_means: Array2<f64>,
}

impl Climatology {
    pub fn from_examples(training: &ExampleCollection) -> Result<Self, ExampleError> {
        let empty = || ExampleError::InvalidArgument("climatology needs at least one example".to_string());
        Ok(Self {
            scalar_means: training.scalar_target_matrix.mean_axis(Axis(0)).ok_or_else(empty)?,
            vector_means: training.vector_target_matrix.mean_axis(Axis(0)).ok_or_else(empty)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReliabilityCurve {
    /// Mean prediction per bin (NaN for empty bins)
    pub mean_predictions: Vec<f64>,
    /// Mean target per bin (NaN for empty bins)
    pub mean_targets: Vec<f64>,
    pub example_counts: Vec<usize>,
}

/// Scores for one target variable (one scalar, or one vector field at one height)
#[derive(Clone, Debug, PartialEq)]
pub struct Scores {
    pub target_stdev: f64,
    pub prediction_stdev: f64,
    pub mse: f64,
    pub mse_skill_score: f64,
    pub mae: f64,
    pub mae_skill_score: f64,
    pub bias: f64,
    pub correlation: f64,
    pub reliability: ReliabilityCurve,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// One entry per scalar target
    pub scalar_scores: Vec<Scores>,
    /// Indexed [height][vector target]
    pub vector_scores: Vec<Vec<Scores>>,
}

pub fn mean_squared_error(targets: ArrayView1<f64>, predictions: ArrayView1<f64>) -> f64 {
    let n = targets.len() as f64;
    targets.iter().zip(predictions).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n
}

pub fn mean_absolute_error(targets: ArrayView1<f64>, predictions: ArrayView1<f64>) -> f64 {
    let n = targets.len() as f64;
    targets.iter().zip(predictions).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
}

/// Mean signed error, positive when predictions run high
pub fn bias(targets: ArrayView1<f64>, predictions: ArrayView1<f64>) -> f64 {
    let n = targets.len() as f64;
    targets.iter().zip(predictions).map(|(t, p)| p - t).sum::<f64>() / n
}

/// Skill relative to always predicting `climatology_value`
pub fn mse_skill_score(targets: ArrayView1<f64>, predictions: ArrayView1<f64>, climatology_value: f64) -> f64 {
    let mse_actual = mean_squared_error(targets, predictions);
    let mse_climo = targets.iter().map(|t| (t - climatology_value).powi(2)).sum::<f64>() / targets.len() as f64;
    (mse_climo - mse_actual) / mse_climo
}

pub fn mae_skill_score(targets: ArrayView1<f64>, predictions: ArrayView1<f64>, climatology_value: f64) -> f64 {
    let mae_actual = mean_absolute_error(targets, predictions);
    let mae_climo = targets.iter().map(|t| (t - climatology_value).abs()).sum::<f64>() / targets.len() as f64;
    (mae_climo - mae_actual) / mae_climo
}

pub fn pearson_correlation(targets: ArrayView1<f64>, predictions: ArrayView1<f64>) -> f64 {
    let n = targets.len() as f64;
    let mean_t = targets.sum() / n;
    let mean_p = predictions.sum() / n;

    let mut numerator = 0.0;
    let mut sum_sq_t = 0.0;
    let mut sum_sq_p = 0.0;
    for (t, p) in targets.iter().zip(predictions) {
        numerator += (t - mean_t) * (p - mean_p);
        sum_sq_t += (t - mean_t).powi(2);
        sum_sq_p += (p - mean_p).powi(2);
    }
    numerator / (sum_sq_t * sum_sq_p).sqrt()
}

/// Percentile with linear interpolation between order statistics
pub fn percentile(values: ArrayView1<f64>, q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
}

/// Bin examples by prediction over [0, max_bin_edge]; values outside go to the end bins
pub fn reliability_curve(
    targets: ArrayView1<f64>,
    predictions: ArrayView1<f64>,
    num_bins: usize,
    max_bin_edge: f64,
) -> ReliabilityCurve {
    let mut sum_predictions = vec![0.0; num_bins];
    let mut sum_targets = vec![0.0; num_bins];
    let mut example_counts = vec![0usize; num_bins];

    for (t, p) in targets.iter().zip(predictions) {
        let bin = if max_bin_edge > 0.0 {
            let raw = (p / max_bin_edge * num_bins as f64).floor();
            raw.clamp(0.0, (num_bins - 1) as f64) as usize
        } else {
            0
        };
        sum_predictions[bin] += p;
        sum_targets[bin] += t;
        example_counts[bin] += 1;
    }

    let mean = |sum: f64, count: usize| if count == 0 { f64::NAN } else { sum / count as f64 };
    ReliabilityCurve {
        mean_predictions: sum_predictions
            .iter()
            .zip(&example_counts)
            .map(|(s, c)| mean(*s, *c))
            .collect(),
        mean_targets: sum_targets
            .iter()
            .zip(&example_counts)
            .map(|(s, c)| mean(*s, *c))
            .collect(),
        example_counts,
    }
}

fn score_one_variable(
    targets: ArrayView1<f64>,
    predictions: ArrayView1<f64>,
    climatology_value: f64,
    options: &EvaluationOptions,
) -> Scores {
    let max_bin_edge = percentile(targets, options.max_bin_edge_percentile);
    Scores {
        target_stdev: FieldStats::from_values(targets.iter()).stdev,
        prediction_stdev: FieldStats::from_values(predictions.iter()).stdev,
        mse: mean_squared_error(targets, predictions),
        mse_skill_score: mse_skill_score(targets, predictions, climatology_value),
        mae: mean_absolute_error(targets, predictions),
        mae_skill_score: mae_skill_score(targets, predictions, climatology_value),
        bias: bias(targets, predictions),
        correlation: pearson_correlation(targets, predictions),
        reliability: reliability_curve(targets, predictions, options.num_reliability_bins, max_bin_edge),
    }
}

/// Score every scalar target and every (height, vector target) pair
pub fn evaluate(
    record: &PredictionRecord,
    climatology: &Climatology,
    options: &EvaluationOptions,
) -> Result<Evaluation, ExampleError> {
    options.validate()?;
    record.validate()?;
    if record.num_examples() == 0 {
        return Err(ExampleError::InvalidArgument(
            "cannot evaluate an empty prediction record".to_string(),
        ));
    }

    let num_scalar = record.scalar_target_matrix.ncols();
    let (_, num_heights, num_vector) = record.vector_target_matrix.dim();
    if climatology.scalar_means.len() != num_scalar || climatology.vector_means.dim() != (num_heights, num_vector) {
        return Err(ExampleError::ShapeMismatch(format!(
            "climatology has {} scalars and {:?} vector means, predictions have {} and {:?}",
            climatology.scalar_means.len(),
            climatology.vector_means.dim(),
            num_scalar,
            (num_heights, num_vector)
        )));
    }

    let scalar_scores = (0..num_scalar)
        .map(|k| {
            score_one_variable(
                record.scalar_target_matrix.column(k),
                record.scalar_prediction_matrix.column(k),
                climatology.scalar_means[k],
                options,
            )
        })
        .collect();

    let vector_scores = (0..num_heights)
        .map(|h| {
            (0..num_vector)
                .map(|c| {
                    score_one_variable(
                        record.vector_target_matrix.slice(ndarray::s![.., h, c]),
                        record.vector_prediction_matrix.slice(ndarray::s![.., h, c]),
                        climatology.vector_means[[h, c]],
                        options,
                    )
                })
                .collect()
        })
        .collect();

    Ok(Evaluation {
        scalar_scores,
        vector_scores,
    })
}
