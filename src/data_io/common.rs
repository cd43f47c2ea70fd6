//! NetCDF helpers shared by the example reader and the prediction files

use super::ReaderError;
use ndarray::{Array1, Array2, Array3};
use std::path::Path;

/// Open a NetCDF file, failing with FileNotFound before touching the library
pub fn open_netcdf_file(path: &Path) -> Result<netcdf::File, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::FileNotFound(path.to_string_lossy().to_string()));
    }
    Ok(netcdf::open(path)?)
}

/// Read a numeric variable as f64, returning the raw values and the shape
pub fn read_variable_f64(
    file: &netcdf::File,
    variable_name: &str,
) -> Result<(Vec<f64>, Vec<usize>), ReaderError> {
    let var = file
        .variable(variable_name)
        .ok_or_else(|| ReaderError::MissingVariable(variable_name.to_string()))?;

    let raw_data: Vec<f64> = var.get_values::<f64, _>(..)?;
    let shape = var.dimensions().iter().map(|d| d.len()).collect::<Vec<_>>();
    Ok((raw_data, shape))
}

fn check_rank(variable_name: &str, shape: &[usize], rank: usize) -> Result<(), ReaderError> {
    if shape.len() != rank {
        return Err(ReaderError::InvalidShape {
            variable: variable_name.to_string(),
            expected_rank: rank,
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

fn shape_error(variable_name: &str, shape: &[usize]) -> ReaderError {
    ReaderError::InvalidShape {
        variable: variable_name.to_string(),
        expected_rank: shape.len(),
        shape: shape.to_vec(),
    }
}

pub fn read_array1(file: &netcdf::File, variable_name: &str) -> Result<Array1<f64>, ReaderError> {
    let (raw_data, shape) = read_variable_f64(file, variable_name)?;
    check_rank(variable_name, &shape, 1)?;
    Ok(Array1::from_vec(raw_data))
}

pub fn read_array2(file: &netcdf::File, variable_name: &str) -> Result<Array2<f64>, ReaderError> {
    let (raw_data, shape) = read_variable_f64(file, variable_name)?;
    check_rank(variable_name, &shape, 2)?;
    Array2::from_shape_vec((shape[0], shape[1]), raw_data)
        .map_err(|_| shape_error(variable_name, &shape))
}

pub fn read_array3(file: &netcdf::File, variable_name: &str) -> Result<Array3<f64>, ReaderError> {
    let (raw_data, shape) = read_variable_f64(file, variable_name)?;
    check_rank(variable_name, &shape, 3)?;
    Array3::from_shape_vec((shape[0], shape[1], shape[2]), raw_data)
        .map_err(|_| shape_error(variable_name, &shape))
}

/// Length of a named dimension, None if the file lacks it
pub fn dimension_len(file: &netcdf::File, dimension_name: &str) -> Option<usize> {
    file.dimension(dimension_name).map(|d| d.len())
}

/// Global string attribute, None if absent or not a string
pub fn read_string_attribute(
    file: &netcdf::File,
    attribute_name: &str,
) -> Result<Option<String>, ReaderError> {
    let attribute = match file.attribute(attribute_name) {
        Some(attribute) => attribute,
        None => return Ok(None),
    };
    match attribute.value()? {
        netcdf::AttributeValue::Str(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}
