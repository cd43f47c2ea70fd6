use super::catalog::{
    Field, DEFAULT_SCALAR_PREDICTOR_NAMES, DEFAULT_SCALAR_TARGET_NAMES,
    DEFAULT_VECTOR_PREDICTOR_NAMES, DEFAULT_VECTOR_TARGET_NAMES,
};
use super::common::{open_netcdf_file, read_array1, read_array2};
use super::{derived, utils, ExampleCollection, ExampleError, ExampleSchema, StandardAtmosphere};
use crate::config::Constants;
use crate::transforms::example_ids::create_example_ids;
use ndarray::{Array2, Array3, Axis};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Values at or above this are fill values in the yearly files
pub const MIN_BAD_VALUE: f64 = 1e30;

const KM_TO_METRES: f64 = 1000.0;

const VALID_TIMES_VARIABLE: &str = "time";
const HEIGHTS_VARIABLE: &str = "height";
const STANDARD_ATMO_VARIABLE: &str = "stdatmos";

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Variable {variable} has shape {shape:?}, expected rank {expected_rank}")]
    InvalidShape {
        variable: String,
        expected_rank: usize,
        shape: Vec<usize>,
    },

    #[error("{num_bad} of {num_examples} examples in {path} have values >= 1e30")]
    OutOfRangeValue {
        path: String,
        num_bad: usize,
        num_examples: usize,
    },

    #[error("Invalid standard-atmosphere flag {flag} in {path}")]
    InvalidStandardAtmosphere { path: String, flag: i64 },

    #[error("Cannot parse year from file name: {0}")]
    InvalidFileName(String),

    #[error("No example files in {dir} for years {first_year}-{last_year}")]
    NoFilesFound {
        dir: String,
        first_year: i32,
        last_year: i32,
    },

    #[error(transparent)]
    Example(#[from] ExampleError),
}

/// Path of the yearly example file
///
/// With `raise_if_missing` false the expected path is returned even when the
/// file does not exist.
pub fn find_file(directory: &Path, year: i32, raise_if_missing: bool) -> Result<PathBuf, ReaderError> {
    let path = directory.join(format!("rrtm_output_{:04}.nc", year));
    if raise_if_missing && !path.is_file() {
        return Err(ReaderError::FileNotFound(path.to_string_lossy().to_string()));
    }
    Ok(path)
}

/// Year encoded in an example-file name
pub fn file_name_to_year(path: &Path) -> Result<i32, ReaderError> {
    let invalid = || ReaderError::InvalidFileName(path.to_string_lossy().to_string());
    let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
    let year_token = stem.rsplit('_').next().ok_or_else(invalid)?;
    year_token.parse::<i32>().map_err(|_| invalid())
}

/// Existing example files for every year spanned by [first, last]
pub fn find_many_files(
    directory: &Path,
    first_time_unix_sec: i64,
    last_time_unix_sec: i64,
    raise_if_any_missing: bool,
    raise_if_all_missing: bool,
) -> Result<Vec<PathBuf>, ReaderError> {
    let years = utils::years_spanned(first_time_unix_sec, last_time_unix_sec)?;

    let mut file_names = Vec::new();
    for &year in &years {
        let path = find_file(directory, year, raise_if_any_missing)?;
        if path.is_file() {
            file_names.push(path);
        }
    }

    if raise_if_all_missing && file_names.is_empty() {
        return Err(ReaderError::NoFilesFound {
            dir: directory.to_string_lossy().to_string(),
            first_year: years.first().copied().unwrap_or_default(),
            last_year: years.last().copied().unwrap_or_default(),
        });
    }

    debug!("Found {} example files in {}", file_names.len(), directory.display());
    Ok(file_names)
}

fn read_scalar_fields(
    file: &netcdf::File,
    fields: &[Field],
    num_examples: usize,
) -> Result<Array2<f64>, ReaderError> {
    let mut matrix = Array2::zeros((num_examples, fields.len()));
    for (k, field) in fields.iter().enumerate() {
        let disk_name = field
            .disk_name()
            .ok_or_else(|| ReaderError::MissingVariable(field.to_string()))?;
        let values = read_array1(file, disk_name)?;
        if values.len() != num_examples {
            return Err(ReaderError::InvalidShape {
                variable: disk_name.to_string(),
                expected_rank: 1,
                shape: vec![values.len()],
            });
        }
        matrix
            .column_mut(k)
            .assign(&values.mapv(|v| v * field.conversion_factor()));
    }
    Ok(matrix)
}

fn read_vector_fields(
    file: &netcdf::File,
    fields: &[Field],
    num_examples: usize,
    heights_m_agl: &[f64],
) -> Result<Array3<f64>, ReaderError> {
    let num_heights = heights_m_agl.len();
    let mut matrix = Array3::zeros((num_examples, num_heights, fields.len()));

    for (k, field) in fields.iter().enumerate() {
        let disk_name = field
            .disk_name()
            .ok_or_else(|| ReaderError::MissingVariable(field.to_string()))?;
        let values = read_array2(file, disk_name)?;
        if values.dim() != (num_examples, num_heights) {
            return Err(ReaderError::InvalidShape {
                variable: disk_name.to_string(),
                expected_rank: 2,
                shape: vec![values.nrows(), values.ncols()],
            });
        }

        let mut values = values.mapv(|v| v * field.conversion_factor());
        if field.is_stored_as_layerwise_path() {
            let widths = utils::grid_cell_widths(heights_m_agl)?;
            values = crate::math::layerwise_path_to_content(values.view(), widths.view());
        }
        matrix.index_axis_mut(Axis(2), k).assign(&values);
    }
    Ok(matrix)
}

/// Read one yearly example file
///
/// Units are converted, bad examples dropped (or rejected), longitudes moved to
/// [0, 360), example IDs created and the derived fields appended.
pub fn read_file(path: &Path, allow_bad_values: bool) -> Result<ExampleCollection, ReaderError> {
    let path_string = path.to_string_lossy().to_string();
    let file = open_netcdf_file(path)?;

    let valid_times_unix_sec: Vec<i64> = read_array1(&file, VALID_TIMES_VARIABLE)?
        .iter()
        .map(|t| t.round() as i64)
        .collect();
    let heights_m_agl: Vec<f64> = read_array1(&file, HEIGHTS_VARIABLE)?
        .iter()
        .map(|h| h * KM_TO_METRES)
        .collect();

    let num_examples = valid_times_unix_sec.len();
    let flag_values = read_array1(&file, STANDARD_ATMO_VARIABLE)?;
    if flag_values.len() != num_examples {
        return Err(ReaderError::InvalidShape {
            variable: STANDARD_ATMO_VARIABLE.to_string(),
            expected_rank: 1,
            shape: vec![flag_values.len()],
        });
    }

    // Rows with an unknown flag count as bad examples when those are allowed
    let mut flagged_rows = Vec::with_capacity(num_examples);
    let mut standard_atmo_flags = Vec::with_capacity(num_examples);
    for (i, value) in flag_values.iter().enumerate() {
        match StandardAtmosphere::try_from(value.round() as i64) {
            Ok(atmosphere) => {
                flagged_rows.push(i);
                standard_atmo_flags.push(atmosphere);
            }
            Err(flag) if !allow_bad_values => {
                return Err(ReaderError::InvalidStandardAtmosphere {
                    path: path_string,
                    flag,
                })
            }
            Err(_) => {}
        }
    }

    info!(
        "Reading {} examples on {} heights from {}",
        num_examples,
        heights_m_agl.len(),
        path.display()
    );

    let schema = ExampleSchema {
        scalar_predictor_names: DEFAULT_SCALAR_PREDICTOR_NAMES.to_vec(),
        vector_predictor_names: DEFAULT_VECTOR_PREDICTOR_NAMES.to_vec(),
        scalar_target_names: DEFAULT_SCALAR_TARGET_NAMES.to_vec(),
        vector_target_names: DEFAULT_VECTOR_TARGET_NAMES.to_vec(),
        heights_m_agl: heights_m_agl.clone(),
    };

    let mut scalar_predictor_matrix =
        read_scalar_fields(&file, &schema.scalar_predictor_names, num_examples)?;
    let mut vector_predictor_matrix = read_vector_fields(
        &file,
        &schema.vector_predictor_names,
        num_examples,
        &heights_m_agl,
    )?;
    let mut scalar_target_matrix =
        read_scalar_fields(&file, &schema.scalar_target_names, num_examples)?;
    let mut vector_target_matrix = read_vector_fields(
        &file,
        &schema.vector_target_names,
        num_examples,
        &heights_m_agl,
    )?;

    let mut valid_times_unix_sec = valid_times_unix_sec;
    if flagged_rows.len() != num_examples {
        scalar_predictor_matrix = scalar_predictor_matrix.select(Axis(0), &flagged_rows);
        vector_predictor_matrix = vector_predictor_matrix.select(Axis(0), &flagged_rows);
        scalar_target_matrix = scalar_target_matrix.select(Axis(0), &flagged_rows);
        vector_target_matrix = vector_target_matrix.select(Axis(0), &flagged_rows);
        valid_times_unix_sec = flagged_rows.iter().map(|&i| valid_times_unix_sec[i]).collect();
    }

    let mut example = ExampleCollection::new(
        schema,
        scalar_predictor_matrix,
        vector_predictor_matrix,
        scalar_target_matrix,
        vector_target_matrix,
        valid_times_unix_sec,
        standard_atmo_flags,
    )?;

    let good_indices = find_good_examples(&example);
    if good_indices.len() != num_examples {
        let num_bad = num_examples - good_indices.len();
        if !allow_bad_values {
            return Err(ReaderError::OutOfRangeValue {
                path: path_string,
                num_bad,
                num_examples,
            });
        }
        warn!(
            "{} of {} examples in {} have bad values, dropping them",
            num_bad,
            num_examples,
            path.display()
        );
        example = example.select_rows(&good_indices);
    }

    if let Some(k) = example
        .scalar_predictor_names
        .iter()
        .position(|f| *f == Field::Longitude)
    {
        example
            .scalar_predictor_matrix
            .column_mut(k)
            .mapv_inplace(utils::longitude_to_0_360);
    }

    example.example_id_strings = Some(create_example_ids(&example)?);

    let constants = Constants::default();
    derived::add_water_path_profiles(&mut example, false, &constants)?;
    derived::add_water_path_profiles(&mut example, true, &constants)?;
    derived::add_relative_humidity(&mut example, &constants)?;
    derived::fluxes_actual_to_increments(&mut example)?;
    derived::fluxes_increments_to_actual(&mut example)?;

    Ok(example)
}

/// Indices of examples with no value at or above MIN_BAD_VALUE
fn find_good_examples(example: &ExampleCollection) -> Vec<usize> {
    (0..example.num_examples())
        .filter(|&i| {
            let scalars_ok = example
                .scalar_predictor_matrix
                .row(i)
                .iter()
                .chain(example.scalar_target_matrix.row(i).iter())
                .all(|v| *v < MIN_BAD_VALUE);
            let vectors_ok = example
                .vector_predictor_matrix
                .index_axis(Axis(0), i)
                .iter()
                .chain(example.vector_target_matrix.index_axis(Axis(0), i).iter())
                .all(|v| *v < MIN_BAD_VALUE);
            scalars_ok && vectors_ok
        })
        .collect()
}
