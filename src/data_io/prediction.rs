//! Prediction files: targets and predictions for a set of examples, stored
//! together with the IDs of those examples and the model that produced them.

use super::common::{dimension_len, open_netcdf_file, read_array1, read_array2, read_array3, read_string_attribute};
use super::utils::unix_sec_to_month;
use super::{ExampleError, ReaderError, StandardAtmosphere, HEIGHT_GRID_TOLERANCE};
use crate::transforms::parse_example_ids;
use ndarray::{concatenate, Array2, Array3, ArrayView2, ArrayView3, Axis};
use std::f64::consts::FRAC_PI_2;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const EXAMPLE_DIMENSION: &str = "example";
const HEIGHT_DIMENSION: &str = "height";
const VECTOR_TARGET_DIMENSION: &str = "vector_target";
const SCALAR_TARGET_DIMENSION: &str = "scalar_target";
const EXAMPLE_ID_CHAR_DIMENSION: &str = "example_id_char";

const MODEL_FILE_ATTRIBUTE: &str = "model_file_name";
const ISOTONIC_MODEL_FILE_ATTRIBUTE: &str = "isotonic_model_file_name";

const EXAMPLE_IDS_VARIABLE: &str = "example_id_strings";
const HEIGHTS_VARIABLE: &str = "heights_m_agl";
const SCALAR_TARGETS_VARIABLE: &str = "scalar_target_matrix";
const SCALAR_PREDICTIONS_VARIABLE: &str = "scalar_prediction_matrix";
const VECTOR_TARGETS_VARIABLE: &str = "vector_target_matrix";
const VECTOR_PREDICTIONS_VARIABLE: &str = "vector_prediction_matrix";

/// Largest solar zenith angle a prediction can carry (radians)
pub const MAX_ZENITH_ANGLE_RAD: f64 = FRAC_PI_2;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Example(#[from] ExampleError),

    #[error("Cannot find prediction file; expected at {0}")]
    FileNotFound(String),

    #[error("Cannot parse metadata from prediction-file name {0}")]
    InvalidFileName(String),
}

/// Targets and predictions for E examples on H heights
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRecord {
    /// E x Ts
    pub scalar_target_matrix: Array2<f64>,
    /// E x Ts
    pub scalar_prediction_matrix: Array2<f64>,
    /// E x H x Tv
    pub vector_target_matrix: Array3<f64>,
    /// E x H x Tv
    pub vector_prediction_matrix: Array3<f64>,
    pub heights_m_agl: Vec<f64>,
    pub example_id_strings: Vec<String>,
    pub model_file_name: String,
    pub isotonic_model_file_name: Option<String>,
}

impl PredictionRecord {
    pub fn num_examples(&self) -> usize {
        self.example_id_strings.len()
    }

    /// Check shapes, heights and example IDs
    pub fn validate(&self) -> Result<(), ExampleError> {
        let num_examples = self.num_examples();
        let (_, num_scalar) = self.scalar_target_matrix.dim();
        let (_, num_heights, num_vector) = self.vector_target_matrix.dim();

        let checks_2d = [
            ("scalar target", self.scalar_target_matrix.dim()),
            ("scalar prediction", self.scalar_prediction_matrix.dim()),
        ];
        for (what, actual) in checks_2d {
            if actual != (num_examples, num_scalar) {
                return Err(ExampleError::ShapeMismatch(format!(
                    "{} matrix is {:?}, expected {:?}",
                    what,
                    actual,
                    (num_examples, num_scalar)
                )));
            }
        }

        let checks_3d = [
            ("vector target", self.vector_target_matrix.dim()),
            ("vector prediction", self.vector_prediction_matrix.dim()),
        ];
        for (what, actual) in checks_3d {
            if actual != (num_examples, num_heights, num_vector) {
                return Err(ExampleError::ShapeMismatch(format!(
                    "{} matrix is {:?}, expected {:?}",
                    what,
                    actual,
                    (num_examples, num_heights, num_vector)
                )));
            }
        }

        if self.heights_m_agl.len() != num_heights {
            return Err(ExampleError::ShapeMismatch(format!(
                "{} heights for vector matrices with {} heights",
                self.heights_m_agl.len(),
                num_heights
            )));
        }
        if let Some(bad) = self.heights_m_agl.iter().find(|h| !(**h > 0.0)) {
            return Err(ExampleError::InvalidArgument(format!(
                "height {} m AGL is not positive",
                bad
            )));
        }

        parse_example_ids(&self.example_id_strings)?;
        Ok(())
    }

    fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            scalar_target_matrix: self.scalar_target_matrix.select(Axis(0), indices),
            scalar_prediction_matrix: self.scalar_prediction_matrix.select(Axis(0), indices),
            vector_target_matrix: self.vector_target_matrix.select(Axis(0), indices),
            vector_prediction_matrix: self.vector_prediction_matrix.select(Axis(0), indices),
            heights_m_agl: self.heights_m_agl.clone(),
            example_id_strings: indices.iter().map(|&i| self.example_id_strings[i].clone()).collect(),
            model_file_name: self.model_file_name.clone(),
            isotonic_model_file_name: self.isotonic_model_file_name.clone(),
        }
    }
}

/// Which slice of the evaluation data a prediction file holds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictionFileKind {
    All,
    ZenithAngleBin(usize),
    /// 1 through 12
    Month(u32),
    GridCell { row: usize, column: usize },
}

/// Path of a prediction file
///
/// With `raise_if_missing` false the expected path is returned even when the
/// file does not exist.
pub fn find_file(
    directory: &Path,
    kind: PredictionFileKind,
    raise_if_missing: bool,
) -> Result<PathBuf, PredictionError> {
    let path = match kind {
        PredictionFileKind::All => directory.join("predictions.nc"),
        PredictionFileKind::ZenithAngleBin(bin) => {
            directory.join(format!("predictions_zenith-angle-bin={:03}.nc", bin))
        }
        PredictionFileKind::Month(month) => {
            if !(1..=12).contains(&month) {
                return Err(ExampleError::InvalidArgument(format!("month {} is not in 1..12", month)).into());
            }
            directory.join(format!("predictions_month={:02}.nc", month))
        }
        PredictionFileKind::GridCell { row, column } => directory
            .join(format!("grid-row={:03}", row))
            .join(format!("predictions_grid-row={:03}_grid-column={:03}.nc", row, column)),
    };

    if raise_if_missing && !path.is_file() {
        return Err(PredictionError::FileNotFound(path.to_string_lossy().to_string()));
    }
    Ok(path)
}

fn parse_token<T: std::str::FromStr>(token: &str, key: &str) -> Option<T> {
    token.strip_prefix(key)?.strip_prefix('=')?.parse().ok()
}

/// Inverse of `find_file`
pub fn file_name_to_metadata(path: &Path) -> Result<PredictionFileKind, PredictionError> {
    let invalid = || PredictionError::InvalidFileName(path.to_string_lossy().to_string());
    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
    let words: Vec<&str> = stem.split('_').collect();

    match words.as_slice() {
        ["predictions"] => Ok(PredictionFileKind::All),
        ["predictions", last] if last.starts_with("zenith-angle-bin=") => parse_token(last, "zenith-angle-bin")
            .map(PredictionFileKind::ZenithAngleBin)
            .ok_or_else(invalid),
        ["predictions", last] if last.starts_with("month=") => {
            parse_token(last, "month").map(PredictionFileKind::Month).ok_or_else(invalid)
        }
        ["predictions", row, column] => {
            match (parse_token(row, "grid-row"), parse_token(column, "grid-column")) {
                (Some(row), Some(column)) => Ok(PredictionFileKind::GridCell { row, column }),
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

fn put_f32_2d(
    file: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    values: ArrayView2<f64>,
) -> Result<(), PredictionError> {
    let data: Vec<f32> = values.iter().map(|v| *v as f32).collect();
    let mut var = file.add_variable::<f32>(name, dims)?;
    var.put_values(&data, ..)?;
    Ok(())
}

fn put_f32_3d(
    file: &mut netcdf::FileMut,
    name: &str,
    dims: &[&str],
    values: ArrayView3<f64>,
) -> Result<(), PredictionError> {
    let data: Vec<f32> = values.iter().map(|v| *v as f32).collect();
    let mut var = file.add_variable::<f32>(name, dims)?;
    var.put_values(&data, ..)?;
    Ok(())
}

/// Write a prediction record; matrices are stored as f32
pub fn write_file(path: &Path, record: &PredictionRecord) -> Result<(), PredictionError> {
    record.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    info!("Writing {} predictions to {}", record.num_examples(), path.display());

    let num_examples = record.num_examples();
    let (_, num_heights, num_vector) = record.vector_target_matrix.dim();
    let num_scalar = record.scalar_target_matrix.ncols();
    let num_id_chars = record
        .example_id_strings
        .iter()
        .map(|id| id.len())
        .max()
        .unwrap_or(0)
        .max(1);

    let mut file = netcdf::create(path)?;
    file.add_attribute(MODEL_FILE_ATTRIBUTE, record.model_file_name.as_str())?;
    file.add_attribute(
        ISOTONIC_MODEL_FILE_ATTRIBUTE,
        record.isotonic_model_file_name.as_deref().unwrap_or(""),
    )?;

    file.add_dimension(EXAMPLE_DIMENSION, num_examples)?;
    file.add_dimension(HEIGHT_DIMENSION, num_heights)?;
    file.add_dimension(VECTOR_TARGET_DIMENSION, num_vector)?;
    if num_scalar > 0 {
        file.add_dimension(SCALAR_TARGET_DIMENSION, num_scalar)?;
    }
    file.add_dimension(EXAMPLE_ID_CHAR_DIMENSION, num_id_chars)?;

    let mut id_chars = vec![0u8; num_examples * num_id_chars];
    for (i, id) in record.example_id_strings.iter().enumerate() {
        id_chars[i * num_id_chars..i * num_id_chars + id.len()].copy_from_slice(id.as_bytes());
    }
    {
        let mut var = file.add_variable::<u8>(EXAMPLE_IDS_VARIABLE, &[EXAMPLE_DIMENSION, EXAMPLE_ID_CHAR_DIMENSION])?;
        if num_examples > 0 {
            var.put_values(&id_chars, ..)?;
        }
    }

    {
        let heights: Vec<f32> = record.heights_m_agl.iter().map(|h| *h as f32).collect();
        let mut var = file.add_variable::<f32>(HEIGHTS_VARIABLE, &[HEIGHT_DIMENSION])?;
        var.put_values(&heights, ..)?;
    }

    if num_scalar > 0 {
        let dims = [EXAMPLE_DIMENSION, SCALAR_TARGET_DIMENSION];
        put_f32_2d(&mut file, SCALAR_TARGETS_VARIABLE, &dims, record.scalar_target_matrix.view())?;
        put_f32_2d(&mut file, SCALAR_PREDICTIONS_VARIABLE, &dims, record.scalar_prediction_matrix.view())?;
    }

    let dims = [EXAMPLE_DIMENSION, HEIGHT_DIMENSION, VECTOR_TARGET_DIMENSION];
    put_f32_3d(&mut file, VECTOR_TARGETS_VARIABLE, &dims, record.vector_target_matrix.view())?;
    put_f32_3d(&mut file, VECTOR_PREDICTIONS_VARIABLE, &dims, record.vector_prediction_matrix.view())?;
    Ok(())
}

fn read_example_ids(file: &netcdf::File) -> Result<Vec<String>, PredictionError> {
    let num_examples = dimension_len(file, EXAMPLE_DIMENSION).unwrap_or(0);
    let num_chars = dimension_len(file, EXAMPLE_ID_CHAR_DIMENSION).unwrap_or(0);
    if num_examples == 0 {
        return Ok(Vec::new());
    }

    let var = file
        .variable(EXAMPLE_IDS_VARIABLE)
        .ok_or_else(|| ReaderError::MissingVariable(EXAMPLE_IDS_VARIABLE.to_string()))?;
    let bytes: Vec<u8> = var.get_values::<u8, _>(..)?;

    Ok(bytes
        .chunks(num_chars.max(1))
        .map(|chunk| {
            String::from_utf8_lossy(chunk)
                .trim_end_matches('\0')
                .to_string()
        })
        .collect())
}

/// Read a prediction file written by `write_file`
///
/// Files without scalar targets give E x 0 scalar matrices.
pub fn read_file(path: &Path) -> Result<PredictionRecord, PredictionError> {
    let file = open_netcdf_file(path)?;

    let vector_target_matrix = read_array3(&file, VECTOR_TARGETS_VARIABLE)?;
    let vector_prediction_matrix = read_array3(&file, VECTOR_PREDICTIONS_VARIABLE)?;
    let example_id_strings = read_example_ids(&file)?;
    let heights_m_agl = read_array1(&file, HEIGHTS_VARIABLE)?.to_vec();
    let num_examples = vector_target_matrix.len_of(Axis(0));

    let (scalar_target_matrix, scalar_prediction_matrix) = if file.variable(SCALAR_TARGETS_VARIABLE).is_some() {
        (
            read_array2(&file, SCALAR_TARGETS_VARIABLE)?,
            read_array2(&file, SCALAR_PREDICTIONS_VARIABLE)?,
        )
    } else {
        (Array2::zeros((num_examples, 0)), Array2::zeros((num_examples, 0)))
    };

    let model_file_name = read_string_attribute(&file, MODEL_FILE_ATTRIBUTE)?.unwrap_or_default();
    let isotonic_model_file_name =
        read_string_attribute(&file, ISOTONIC_MODEL_FILE_ATTRIBUTE)?.filter(|name| !name.is_empty());

    let record = PredictionRecord {
        scalar_target_matrix,
        scalar_prediction_matrix,
        vector_target_matrix,
        vector_prediction_matrix,
        heights_m_agl,
        example_id_strings,
        model_file_name,
        isotonic_model_file_name,
    };
    record.validate()?;
    Ok(record)
}

fn indices_where(flags: impl Iterator<Item = bool>) -> Vec<usize> {
    flags.enumerate().filter(|(_, keep)| *keep).map(|(i, _)| i).collect()
}

/// Examples generated from one standard atmosphere
pub fn subset_by_standard_atmo(
    record: &PredictionRecord,
    standard_atmo: StandardAtmosphere,
) -> Result<PredictionRecord, PredictionError> {
    let metadata = parse_example_ids(&record.example_id_strings)?;
    let indices = indices_where(metadata.iter().map(|m| m.standard_atmo_flag == standard_atmo));
    Ok(record.select_rows(&indices))
}

/// Examples with zenith angle in [min, max) or, with `max_inclusive`, [min, max]
///
/// `max_inclusive` defaults to true only when `max` is the largest possible angle.
pub fn subset_by_zenith_angle(
    record: &PredictionRecord,
    min_zenith_angle_rad: f64,
    max_zenith_angle_rad: f64,
    max_inclusive: Option<bool>,
) -> Result<PredictionRecord, PredictionError> {
    if !(min_zenith_angle_rad >= 0.0)
        || !(max_zenith_angle_rad <= MAX_ZENITH_ANGLE_RAD)
        || !(max_zenith_angle_rad > min_zenith_angle_rad)
    {
        return Err(ExampleError::InvalidArgument(format!(
            "invalid zenith-angle window [{}, {}]",
            min_zenith_angle_rad, max_zenith_angle_rad
        ))
        .into());
    }
    let max_inclusive = max_inclusive.unwrap_or(max_zenith_angle_rad == MAX_ZENITH_ANGLE_RAD);

    let metadata = parse_example_ids(&record.example_id_strings)?;
    let indices = indices_where(metadata.iter().map(|m| {
        let angle = m.zenith_angle_rad;
        let below_max = if max_inclusive {
            angle <= max_zenith_angle_rad
        } else {
            angle < max_zenith_angle_rad
        };
        angle >= min_zenith_angle_rad && below_max
    }));
    Ok(record.select_rows(&indices))
}

/// Examples valid in one calendar month (1 through 12)
pub fn subset_by_month(record: &PredictionRecord, month: u32) -> Result<PredictionRecord, PredictionError> {
    if !(1..=12).contains(&month) {
        return Err(ExampleError::InvalidArgument(format!("month {} is not in 1..12", month)).into());
    }

    let metadata = parse_example_ids(&record.example_id_strings)?;
    let months = metadata
        .iter()
        .map(|m| unix_sec_to_month(m.valid_time_unix_sec))
        .collect::<Result<Vec<_>, _>>()?;
    let indices = indices_where(months.iter().map(|m| *m == month));
    Ok(record.select_rows(&indices))
}

/// Examples at the given indices, in the given order
pub fn subset_by_index(record: &PredictionRecord, indices: &[usize]) -> Result<PredictionRecord, PredictionError> {
    let num_examples = record.num_examples();
    if let Some(&bad) = indices.iter().find(|&&i| i >= num_examples) {
        return Err(ExampleError::ShapeMismatch(format!(
            "index {} out of range for {} predictions",
            bad, num_examples
        ))
        .into());
    }
    Ok(record.select_rows(indices))
}

/// Concatenate records made by the same model on the same height grid
pub fn concat_predictions(records: &[PredictionRecord]) -> Result<PredictionRecord, PredictionError> {
    let first = records.first().ok_or_else(|| {
        ExampleError::InvalidArgument("cannot concatenate an empty list of predictions".to_string())
    })?;

    for (i, other) in records.iter().enumerate().skip(1) {
        let same_heights = first.heights_m_agl.len() == other.heights_m_agl.len()
            && first
                .heights_m_agl
                .iter()
                .zip(&other.heights_m_agl)
                .all(|(a, b)| (a - b).abs() <= HEIGHT_GRID_TOLERANCE);
        if !same_heights {
            return Err(ExampleError::SchemaMismatch(format!(
                "records 1 and {} have different heights: {:?} vs {:?}",
                i + 1,
                first.heights_m_agl,
                other.heights_m_agl
            ))
            .into());
        }
        if first.model_file_name != other.model_file_name
            || first.isotonic_model_file_name != other.isotonic_model_file_name
        {
            return Err(ExampleError::SchemaMismatch(format!(
                "records 1 and {} come from different models: {} ({:?}) vs {} ({:?})",
                i + 1,
                first.model_file_name,
                first.isotonic_model_file_name,
                other.model_file_name,
                other.isotonic_model_file_name
            ))
            .into());
        }
    }

    let stack_err = |e: ndarray::ShapeError| ExampleError::ShapeMismatch(e.to_string());
    let views_2d = |get: fn(&PredictionRecord) -> &Array2<f64>| -> Vec<ArrayView2<f64>> {
        records.iter().map(|r| get(r).view()).collect()
    };
    let views_3d = |get: fn(&PredictionRecord) -> &Array3<f64>| -> Vec<ArrayView3<f64>> {
        records.iter().map(|r| get(r).view()).collect()
    };

    Ok(PredictionRecord {
        scalar_target_matrix: concatenate(Axis(0), &views_2d(|r| &r.scalar_target_matrix)).map_err(stack_err)?,
        scalar_prediction_matrix: concatenate(Axis(0), &views_2d(|r| &r.scalar_prediction_matrix))
            .map_err(stack_err)?,
        vector_target_matrix: concatenate(Axis(0), &views_3d(|r| &r.vector_target_matrix)).map_err(stack_err)?,
        vector_prediction_matrix: concatenate(Axis(0), &views_3d(|r| &r.vector_prediction_matrix))
            .map_err(stack_err)?,
        heights_m_agl: first.heights_m_agl.clone(),
        example_id_strings: records
            .iter()
            .flat_map(|r| r.example_id_strings.iter().cloned())
            .collect(),
        model_file_name: first.model_file_name.clone(),
        isotonic_model_file_name: first.isotonic_model_file_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_round_trip() {
        let dir = Path::new("/tmp/preds");
        let kinds = [
            PredictionFileKind::All,
            PredictionFileKind::ZenithAngleBin(7),
            PredictionFileKind::Month(11),
            PredictionFileKind::GridCell { row: 12, column: 345 },
        ];
        for kind in kinds {
            let path = find_file(dir, kind, false).unwrap();
            assert_eq!(file_name_to_metadata(&path).unwrap(), kind);
        }
        assert_eq!(
            find_file(dir, PredictionFileKind::GridCell { row: 1, column: 2 }, false).unwrap(),
            dir.join("grid-row=001/predictions_grid-row=001_grid-column=002.nc")
        );
    }

    #[test]
    fn test_bad_month_and_name() {
        assert!(find_file(Path::new("d"), PredictionFileKind::Month(13), false).is_err());
        assert!(file_name_to_metadata(Path::new("d/forecasts.nc")).is_err());
        assert!(find_file(Path::new("/nonexistent"), PredictionFileKind::All, true).is_err());
    }
}
