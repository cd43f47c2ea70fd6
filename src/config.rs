use crate::data_io::catalog::{
    Field, FieldKind, DEFAULT_SCALAR_PREDICTOR_NAMES, DEFAULT_SCALAR_TARGET_NAMES,
    DEFAULT_VECTOR_PREDICTOR_NAMES, DEFAULT_VECTOR_TARGET_NAMES,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Physical constants used by the moist-thermodynamic and radiative derivations
#[derive(Clone, Debug)]
pub struct Constants {
    /// Gravitational acceleration (m/s²)
    pub g: f64,
    /// Gas constant for dry air (J/(kg·K))
    pub r_dry: f64,
    /// Gas constant of water vapor (J/(kg·K))
    pub rv: f64,
    /// Specific heat of dry air at constant pressure (J/(kg·K))
    pub cp: f64,
    /// Freezing point of water (K)
    pub freezing_point: f64,
    /// Saturation vapour pressure at the freezing point (Pa)
    pub es0: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            g: 9.80665,
            r_dry: 287.04,
            rv: 461.5,
            cp: 1004.0,
            freezing_point: 273.15,
            es0: 611.2,
        }
    }
}

impl Constants {
    /// Ratio of the dry-air and water-vapour gas constants (~0.622)
    pub fn epsilon(&self) -> f64 {
        self.r_dry / self.rv
    }
}

/// Lower bound on training batch size
pub const MIN_TRAINING_BATCH_SIZE: usize = 32;

/// Passes over the whole file list without a single usable example before a
/// training generator gives up
pub const DEFAULT_MAX_EMPTY_PASSES: usize = 3;

/// Upper bound used when no column-LWP filter is wanted
pub const LARGE_FLOAT: f64 = 1e12;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Batch size {batch_size} is below the minimum of {minimum}")]
    InvalidBatchSize { batch_size: usize, minimum: usize },

    #[error("Time window is empty: first time {first} is after last time {last}")]
    InvalidTimeWindow { first: i64, last: i64 },

    #[error("Invalid height subset: {0}")]
    InvalidHeights(String),

    #[error("Invalid column-LWP window [{min}, {max}]")]
    InvalidColumnLwp { min: f64, max: f64 },

    #[error("Invalid normalization bounds [{min}, {max}]")]
    InvalidNormalizationBounds { min: f64, max: f64 },

    #[error("Invalid field list: {0}")]
    InvalidFieldList(String),

    #[error("Empty-pass limit must be at least 1")]
    InvalidEmptyPassLimit,

    #[error("Unknown value '{value}' for {what}")]
    UnknownValue { what: &'static str, value: String },
}

/// Network topology; decides the tensor layout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetType {
    Cnn,
    DenseNet,
    UNet,
}

impl NetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetType::Cnn => "cnn",
            NetType::DenseNet => "dense_net",
            NetType::UNet => "u_net",
        }
    }
}

impl fmt::Display for NetType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cnn" => Ok(NetType::Cnn),
            "dense_net" => Ok(NetType::DenseNet),
            "u_net" => Ok(NetType::UNet),
            _ => Err(ConfigError::UnknownValue {
                what: "net type",
                value: s.to_string(),
            }),
        }
    }
}

/// Available normalization schemes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationType {
    /// (x - mean) / stdev
    ZScore,
    /// Linear rescaling of [min, max] onto [min_value, max_value]
    MinMax,
}

impl fmt::Display for NormalizationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NormalizationType::ZScore => f.write_str("z-score"),
            NormalizationType::MinMax => f.write_str("min-max"),
        }
    }
}

/// Normalization applied to one side (predictors or targets) of the data
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizationPolicy {
    /// None leaves the data in physical units
    pub norm_type: Option<NormalizationType>,
    /// Lower end of the min-max range (ignored for z-scores)
    pub min_value: f64,
    /// Upper end of the min-max range (ignored for z-scores)
    pub max_value: f64,
}

impl NormalizationPolicy {
    pub fn none() -> Self {
        Self {
            norm_type: None,
            min_value: 0.0,
            max_value: 1.0,
        }
    }

    pub fn z_score() -> Self {
        Self {
            norm_type: Some(NormalizationType::ZScore),
            min_value: 0.0,
            max_value: 1.0,
        }
    }

    pub fn min_max(min_value: f64, max_value: f64) -> Self {
        Self {
            norm_type: Some(NormalizationType::MinMax),
            min_value,
            max_value,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.norm_type == Some(NormalizationType::MinMax)
            && !(self.min_value < self.max_value)
        {
            return Err(ConfigError::InvalidNormalizationBounds {
                min: self.min_value,
                max: self.max_value,
            });
        }
        Ok(())
    }
}

/// Indices and weights for the physically constrained MSE loss
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstrainedMseOptions {
    /// Channel of TOA upward flux in the constrained scalar-target tensor
    pub toa_up_flux_index: usize,
    pub toa_up_flux_weight: f64,
    /// Channel of surface downward flux in the constrained scalar-target tensor
    pub surface_down_flux_index: usize,
    pub surface_down_flux_weight: f64,
    /// Channel of upward flux in the vector-target tensor
    pub up_flux_channel_index: usize,
    /// Channel of downward flux in the vector-target tensor
    pub down_flux_channel_index: usize,
    /// Channel holding upward flux at the highest height
    pub highest_up_flux_index: usize,
    /// Channel holding downward flux at the lowest height
    pub lowest_down_flux_index: usize,
    pub net_flux_weight: f64,
}

/// Loss function identity, persisted with the model metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LossFunction {
    Mse,
    MseSkillScore,
    WeightedMse,
    DualWeightedMse,
    ConstrainedMse(ConstrainedMseOptions),
}

impl Default for LossFunction {
    fn default() -> Self {
        LossFunction::Mse
    }
}

impl LossFunction {
    /// Constrained MSE changes the CNN target layout
    pub fn is_constrained_mse(&self) -> bool {
        matches!(self, LossFunction::ConstrainedMse(_))
    }
}

/// Immutable configuration for the batch generators
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Directory with one example file per year
    pub example_dir: PathBuf,
    /// Number of examples per batch
    pub batch_size: usize,
    pub scalar_predictor_names: Vec<Field>,
    pub vector_predictor_names: Vec<Field>,
    pub scalar_target_names: Vec<Field>,
    pub vector_target_names: Vec<Field>,
    /// Heights to keep (m AGL); None keeps the whole grid
    pub heights_m_agl: Option<Vec<f64>>,
    /// Start of the time window (Unix seconds, inclusive)
    pub first_time_unix_sec: i64,
    /// End of the time window (Unix seconds, inclusive)
    pub last_time_unix_sec: i64,
    /// Minimum column liquid-water path (kg/m²)
    pub min_column_lwp_kg_m02: f64,
    /// Maximum column liquid-water path (kg/m²)
    pub max_column_lwp_kg_m02: f64,
    /// Example file whose statistics drive normalization
    pub normalization_file: PathBuf,
    pub predictor_normalization: NormalizationPolicy,
    pub target_normalization: NormalizationPolicy,
    /// Fuse against endless wraparound in training mode
    pub max_empty_passes: usize,
}

impl GeneratorConfig {
    /// Configuration with default fields, filters and normalization
    pub fn new(
        example_dir: impl AsRef<Path>,
        normalization_file: impl AsRef<Path>,
        batch_size: usize,
        first_time_unix_sec: i64,
        last_time_unix_sec: i64,
    ) -> Self {
        Self {
            example_dir: example_dir.as_ref().to_path_buf(),
            batch_size,
            scalar_predictor_names: DEFAULT_SCALAR_PREDICTOR_NAMES.to_vec(),
            vector_predictor_names: DEFAULT_VECTOR_PREDICTOR_NAMES.to_vec(),
            scalar_target_names: DEFAULT_SCALAR_TARGET_NAMES.to_vec(),
            vector_target_names: DEFAULT_VECTOR_TARGET_NAMES.to_vec(),
            heights_m_agl: None,
            first_time_unix_sec,
            last_time_unix_sec,
            min_column_lwp_kg_m02: 0.0,
            max_column_lwp_kg_m02: LARGE_FLOAT,
            normalization_file: normalization_file.as_ref().to_path_buf(),
            predictor_normalization: NormalizationPolicy::z_score(),
            target_normalization: NormalizationPolicy::min_max(0.0, 1.0),
            max_empty_passes: DEFAULT_MAX_EMPTY_PASSES,
        }
    }

    pub fn with_scalar_predictors(mut self, names: Vec<Field>) -> Self {
        self.scalar_predictor_names = names;
        self
    }

    pub fn with_vector_predictors(mut self, names: Vec<Field>) -> Self {
        self.vector_predictor_names = names;
        self
    }

    pub fn with_scalar_targets(mut self, names: Vec<Field>) -> Self {
        self.scalar_target_names = names;
        self
    }

    pub fn with_vector_targets(mut self, names: Vec<Field>) -> Self {
        self.vector_target_names = names;
        self
    }

    pub fn with_heights(mut self, heights_m_agl: Vec<f64>) -> Self {
        self.heights_m_agl = Some(heights_m_agl);
        self
    }

    pub fn with_column_lwp_range(mut self, min_kg_m02: f64, max_kg_m02: f64) -> Self {
        self.min_column_lwp_kg_m02 = min_kg_m02;
        self.max_column_lwp_kg_m02 = max_kg_m02;
        self
    }

    pub fn with_predictor_normalization(mut self, policy: NormalizationPolicy) -> Self {
        self.predictor_normalization = policy;
        self
    }

    pub fn with_target_normalization(mut self, policy: NormalizationPolicy) -> Self {
        self.target_normalization = policy;
        self
    }

    pub fn with_max_empty_passes(mut self, max_empty_passes: usize) -> Self {
        self.max_empty_passes = max_empty_passes;
        self
    }

    /// All requested fields: scalar predictors, vector predictors, scalar
    /// targets, vector targets
    pub fn all_field_names(&self) -> Vec<Field> {
        self.scalar_predictor_names
            .iter()
            .chain(&self.vector_predictor_names)
            .chain(&self.scalar_target_names)
            .chain(&self.vector_target_names)
            .copied()
            .collect()
    }

    /// Validate the configuration, failing on the first bad combination
    pub fn validate(&self, for_inference: bool) -> Result<(), ConfigError> {
        let minimum = if for_inference { 1 } else { MIN_TRAINING_BATCH_SIZE };
        if self.batch_size < minimum {
            return Err(ConfigError::InvalidBatchSize {
                batch_size: self.batch_size,
                minimum,
            });
        }

        if self.first_time_unix_sec > self.last_time_unix_sec {
            return Err(ConfigError::InvalidTimeWindow {
                first: self.first_time_unix_sec,
                last: self.last_time_unix_sec,
            });
        }

        if let Some(heights) = &self.heights_m_agl {
            if heights.is_empty() {
                return Err(ConfigError::InvalidHeights(
                    "height list is empty".to_string(),
                ));
            }
            if let Some(bad) = heights.iter().find(|h| !(**h >= 0.0)) {
                return Err(ConfigError::InvalidHeights(format!(
                    "height {} m AGL is negative or NaN",
                    bad
                )));
            }
        }

        if !(self.min_column_lwp_kg_m02 >= 0.0)
            || !(self.max_column_lwp_kg_m02 >= self.min_column_lwp_kg_m02)
        {
            return Err(ConfigError::InvalidColumnLwp {
                min: self.min_column_lwp_kg_m02,
                max: self.max_column_lwp_kg_m02,
            });
        }

        self.predictor_normalization.validate()?;
        self.target_normalization.validate()?;

        check_field_list(&self.scalar_predictor_names, FieldKind::ScalarPredictor)?;
        check_field_list(&self.vector_predictor_names, FieldKind::VectorPredictor)?;
        check_field_list(&self.scalar_target_names, FieldKind::ScalarTarget)?;
        check_field_list(&self.vector_target_names, FieldKind::VectorTarget)?;

        if self.scalar_predictor_names.is_empty() && self.vector_predictor_names.is_empty() {
            return Err(ConfigError::InvalidFieldList(
                "no predictor fields requested".to_string(),
            ));
        }
        if self.vector_target_names.is_empty() {
            return Err(ConfigError::InvalidFieldList(
                "no vector target fields requested".to_string(),
            ));
        }

        if self.max_empty_passes == 0 {
            return Err(ConfigError::InvalidEmptyPassLimit);
        }

        Ok(())
    }
}

fn check_field_list(names: &[Field], kind: FieldKind) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for field in names {
        if field.kind() != kind {
            return Err(ConfigError::InvalidFieldList(format!(
                "{} is a {:?}, not a {:?}",
                field,
                field.kind(),
                kind
            )));
        }
        if !seen.insert(*field) {
            return Err(ConfigError::InvalidFieldList(format!(
                "{} is listed twice",
                field
            )));
        }
    }
    Ok(())
}
