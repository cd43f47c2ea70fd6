pub mod catalog;
pub mod common;
pub mod derived;
pub mod prediction;
pub mod reader;
pub mod utils;

pub use catalog::{Field, FieldKind};
pub use reader::*;

use ndarray::{concatenate, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use std::fmt;
use thiserror::Error;

/// Tolerance (m) used when comparing two height grids
pub const HEIGHT_GRID_TOLERANCE: f64 = 1e-6;

#[derive(Error, Debug, PartialEq)]
pub enum ExampleError {
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Field not present in example collection: {0}")]
    UnknownField(Field),

    #[error("No height within {tolerance} m of {height} m AGL")]
    NoMatchingHeight { height: f64, tolerance: f64 },

    #[error("Example not found: {0}")]
    MissingExample(String),

    #[error("Invalid example ID '{id}': {reason}")]
    InvalidExampleId { id: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Reference atmosphere used to generate an example
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StandardAtmosphere {
    Tropics = 1,
    MidlatitudeSummer = 2,
    MidlatitudeWinter = 3,
    SubarcticSummer = 4,
    SubarcticWinter = 5,
    UsStandard = 6,
}

impl StandardAtmosphere {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }
}

impl TryFrom<i64> for StandardAtmosphere {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StandardAtmosphere::Tropics),
            2 => Ok(StandardAtmosphere::MidlatitudeSummer),
            3 => Ok(StandardAtmosphere::MidlatitudeWinter),
            4 => Ok(StandardAtmosphere::SubarcticSummer),
            5 => Ok(StandardAtmosphere::SubarcticWinter),
            6 => Ok(StandardAtmosphere::UsStandard),
            other => Err(other),
        }
    }
}

impl fmt::Display for StandardAtmosphere {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// Field-name lists and height grid of an example collection
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleSchema {
    pub scalar_predictor_names: Vec<Field>,
    pub vector_predictor_names: Vec<Field>,
    pub scalar_target_names: Vec<Field>,
    pub vector_target_names: Vec<Field>,
    /// Height grid (metres above ground level)
    pub heights_m_agl: Vec<f64>,
}

impl ExampleSchema {
    pub fn num_heights(&self) -> usize {
        self.heights_m_agl.len()
    }

    /// Fails with SchemaMismatch unless field lists and heights agree
    pub fn check_compatible(&self, other: &ExampleSchema) -> Result<(), ExampleError> {
        let pairs = [
            ("scalar predictor", &self.scalar_predictor_names, &other.scalar_predictor_names),
            ("vector predictor", &self.vector_predictor_names, &other.vector_predictor_names),
            ("scalar target", &self.scalar_target_names, &other.scalar_target_names),
            ("vector target", &self.vector_target_names, &other.vector_target_names),
        ];
        for (what, mine, theirs) in pairs {
            if mine != theirs {
                return Err(ExampleError::SchemaMismatch(format!(
                    "{} names differ: {:?} vs {:?}",
                    what, mine, theirs
                )));
            }
        }

        let same_heights = self.heights_m_agl.len() == other.heights_m_agl.len()
            && self
                .heights_m_agl
                .iter()
                .zip(&other.heights_m_agl)
                .all(|(a, b)| (a - b).abs() <= HEIGHT_GRID_TOLERANCE);
        if !same_heights {
            return Err(ExampleError::SchemaMismatch(format!(
                "height grids differ: {:?} vs {:?}",
                self.heights_m_agl, other.heights_m_agl
            )));
        }
        Ok(())
    }

    fn check_names(&self) -> Result<(), ExampleError> {
        let lists = [
            (&self.scalar_predictor_names, FieldKind::ScalarPredictor),
            (&self.vector_predictor_names, FieldKind::VectorPredictor),
            (&self.scalar_target_names, FieldKind::ScalarTarget),
            (&self.vector_target_names, FieldKind::VectorTarget),
        ];
        for (names, kind) in lists {
            for (i, field) in names.iter().enumerate() {
                if field.kind() != kind {
                    return Err(ExampleError::SchemaMismatch(format!(
                        "{} is a {:?} but is listed as a {:?}",
                        field,
                        field.kind(),
                        kind
                    )));
                }
                if names[..i].contains(field) {
                    return Err(ExampleError::SchemaMismatch(format!(
                        "{} is listed twice",
                        field
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Collection of E examples on a shared grid of H heights
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleCollection {
    pub scalar_predictor_names: Vec<Field>,
    /// E x Ps
    pub scalar_predictor_matrix: Array2<f64>,
    pub vector_predictor_names: Vec<Field>,
    /// E x H x Pv
    pub vector_predictor_matrix: Array3<f64>,
    pub scalar_target_names: Vec<Field>,
    /// E x Ts
    pub scalar_target_matrix: Array2<f64>,
    pub vector_target_names: Vec<Field>,
    /// E x H x Tv
    pub vector_target_matrix: Array3<f64>,
    pub valid_times_unix_sec: Vec<i64>,
    pub heights_m_agl: Vec<f64>,
    pub standard_atmo_flags: Vec<StandardAtmosphere>,
    pub example_id_strings: Option<Vec<String>>,
}

impl ExampleCollection {
    /// Build a collection, checking every shape and name invariant
    pub fn new(
        schema: ExampleSchema,
        scalar_predictor_matrix: Array2<f64>,
        vector_predictor_matrix: Array3<f64>,
        scalar_target_matrix: Array2<f64>,
        vector_target_matrix: Array3<f64>,
        valid_times_unix_sec: Vec<i64>,
        standard_atmo_flags: Vec<StandardAtmosphere>,
    ) -> Result<Self, ExampleError> {
        let collection = Self {
            scalar_predictor_names: schema.scalar_predictor_names,
            scalar_predictor_matrix,
            vector_predictor_names: schema.vector_predictor_names,
            vector_predictor_matrix,
            scalar_target_names: schema.scalar_target_names,
            scalar_target_matrix,
            vector_target_names: schema.vector_target_names,
            vector_target_matrix,
            valid_times_unix_sec,
            heights_m_agl: schema.heights_m_agl,
            standard_atmo_flags,
            example_id_strings: None,
        };
        collection.validate()?;
        Ok(collection)
    }

    pub fn num_examples(&self) -> usize {
        self.valid_times_unix_sec.len()
    }

    pub fn num_heights(&self) -> usize {
        self.heights_m_agl.len()
    }

    pub fn schema(&self) -> ExampleSchema {
        ExampleSchema {
            scalar_predictor_names: self.scalar_predictor_names.clone(),
            vector_predictor_names: self.vector_predictor_names.clone(),
            scalar_target_names: self.scalar_target_names.clone(),
            vector_target_names: self.vector_target_names.clone(),
            heights_m_agl: self.heights_m_agl.clone(),
        }
    }

    /// Check shapes against the name lists, height grid and example count
    pub fn validate(&self) -> Result<(), ExampleError> {
        self.schema().check_names()?;

        let num_examples = self.num_examples();
        let num_heights = self.num_heights();

        let expected_2d = [
            (
                "scalar predictor",
                self.scalar_predictor_matrix.dim(),
                self.scalar_predictor_names.len(),
            ),
            (
                "scalar target",
                self.scalar_target_matrix.dim(),
                self.scalar_target_names.len(),
            ),
        ];
        for (what, actual, num_fields) in expected_2d {
            if actual != (num_examples, num_fields) {
                return Err(ExampleError::ShapeMismatch(format!(
                    "{} matrix is {:?}, expected {:?}",
                    what,
                    actual,
                    (num_examples, num_fields)
                )));
            }
        }

        let expected_3d = [
            (
                "vector predictor",
                self.vector_predictor_matrix.dim(),
                self.vector_predictor_names.len(),
            ),
            (
                "vector target",
                self.vector_target_matrix.dim(),
                self.vector_target_names.len(),
            ),
        ];
        for (what, actual, num_fields) in expected_3d {
            if actual != (num_examples, num_heights, num_fields) {
                return Err(ExampleError::ShapeMismatch(format!(
                    "{} matrix is {:?}, expected {:?}",
                    what,
                    actual,
                    (num_examples, num_heights, num_fields)
                )));
            }
        }

        if self.standard_atmo_flags.len() != num_examples {
            return Err(ExampleError::ShapeMismatch(format!(
                "{} standard-atmosphere flags for {} examples",
                self.standard_atmo_flags.len(),
                num_examples
            )));
        }
        if let Some(ids) = &self.example_id_strings {
            if ids.len() != num_examples {
                return Err(ExampleError::ShapeMismatch(format!(
                    "{} example IDs for {} examples",
                    ids.len(),
                    num_examples
                )));
            }
        }
        Ok(())
    }

    /// Values of one scalar field (predictor or target), length E
    pub fn scalar_field(&self, field: Field) -> Result<ArrayView1<'_, f64>, ExampleError> {
        if let Some(k) = self.scalar_predictor_names.iter().position(|f| *f == field) {
            return Ok(self.scalar_predictor_matrix.column(k));
        }
        if let Some(k) = self.scalar_target_names.iter().position(|f| *f == field) {
            return Ok(self.scalar_target_matrix.column(k));
        }
        Err(ExampleError::UnknownField(field))
    }

    /// Values of one vector field (predictor or target), E x H
    pub fn vector_field(&self, field: Field) -> Result<ArrayView2<'_, f64>, ExampleError> {
        if let Some(k) = self.vector_predictor_names.iter().position(|f| *f == field) {
            return Ok(self.vector_predictor_matrix.index_axis(Axis(2), k));
        }
        if let Some(k) = self.vector_target_names.iter().position(|f| *f == field) {
            return Ok(self.vector_target_matrix.index_axis(Axis(2), k));
        }
        Err(ExampleError::UnknownField(field))
    }

    /// Values of one vector field at the grid height closest to `height_m_agl`
    pub fn field_at_height(
        &self,
        field: Field,
        height_m_agl: f64,
    ) -> Result<Array1<f64>, ExampleError> {
        let height_index = utils::match_heights(&self.heights_m_agl, height_m_agl)?;
        Ok(self.vector_field(field)?.column(height_index).to_owned())
    }

    /// Replace a vector field, or append it as a new channel
    pub fn set_vector_field(&mut self, field: Field, values: Array2<f64>) -> Result<(), ExampleError> {
        let expected = (self.num_examples(), self.num_heights());
        if values.dim() != expected {
            return Err(ExampleError::ShapeMismatch(format!(
                "values for {} are {:?}, expected {:?}",
                field,
                values.dim(),
                expected
            )));
        }

        let (names, matrix) = match field.kind() {
            FieldKind::VectorPredictor => (
                &mut self.vector_predictor_names,
                &mut self.vector_predictor_matrix,
            ),
            FieldKind::VectorTarget => (&mut self.vector_target_names, &mut self.vector_target_matrix),
            _ => {
                return Err(ExampleError::InvalidArgument(format!(
                    "{} is not a vector field",
                    field
                )))
            }
        };

        if let Some(k) = names.iter().position(|f| *f == field) {
            matrix.index_axis_mut(Axis(2), k).assign(&values);
        } else {
            let column = values.insert_axis(Axis(2));
            *matrix = concatenate(Axis(2), &[matrix.view(), column.view()])
                .map_err(|e| ExampleError::ShapeMismatch(e.to_string()))?;
            names.push(field);
        }
        Ok(())
    }

    /// Replace a scalar field, or append it as a new column
    pub fn set_scalar_field(&mut self, field: Field, values: Array1<f64>) -> Result<(), ExampleError> {
        if values.len() != self.num_examples() {
            return Err(ExampleError::ShapeMismatch(format!(
                "{} values for {}, expected {}",
                values.len(),
                field,
                self.num_examples()
            )));
        }

        let (names, matrix) = match field.kind() {
            FieldKind::ScalarPredictor => (
                &mut self.scalar_predictor_names,
                &mut self.scalar_predictor_matrix,
            ),
            FieldKind::ScalarTarget => (&mut self.scalar_target_names, &mut self.scalar_target_matrix),
            _ => {
                return Err(ExampleError::InvalidArgument(format!(
                    "{} is not a scalar field",
                    field
                )))
            }
        };

        if let Some(k) = names.iter().position(|f| *f == field) {
            matrix.column_mut(k).assign(&values);
        } else {
            let column = values.insert_axis(Axis(1));
            *matrix = concatenate(Axis(1), &[matrix.view(), column.view()])
                .map_err(|e| ExampleError::ShapeMismatch(e.to_string()))?;
            names.push(field);
        }
        Ok(())
    }

    /// Rows at `indices`, in that order; indices must be in range
    pub(crate) fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            scalar_predictor_names: self.scalar_predictor_names.clone(),
            scalar_predictor_matrix: self.scalar_predictor_matrix.select(Axis(0), indices),
            vector_predictor_names: self.vector_predictor_names.clone(),
            vector_predictor_matrix: self.vector_predictor_matrix.select(Axis(0), indices),
            scalar_target_names: self.scalar_target_names.clone(),
            scalar_target_matrix: self.scalar_target_matrix.select(Axis(0), indices),
            vector_target_names: self.vector_target_names.clone(),
            vector_target_matrix: self.vector_target_matrix.select(Axis(0), indices),
            valid_times_unix_sec: indices.iter().map(|&i| self.valid_times_unix_sec[i]).collect(),
            heights_m_agl: self.heights_m_agl.clone(),
            standard_atmo_flags: indices.iter().map(|&i| self.standard_atmo_flags[i]).collect(),
            example_id_strings: self
                .example_id_strings
                .as_ref()
                .map(|ids| indices.iter().map(|&i| ids[i].clone()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn tiny_collection() -> ExampleCollection {
        let schema = ExampleSchema {
            scalar_predictor_names: vec![Field::Albedo],
            vector_predictor_names: vec![Field::Temperature],
            scalar_target_names: vec![],
            vector_target_names: vec![Field::DownFlux],
            heights_m_agl: vec![10.0, 20.0],
        };
        ExampleCollection::new(
            schema,
            array![[0.1], [0.2]],
            array![[[280.0], [270.0]], [[281.0], [271.0]]],
            Array2::zeros((2, 0)),
            array![[[500.0], [510.0]], [[600.0], [610.0]]],
            vec![0, 60],
            vec![StandardAtmosphere::Tropics, StandardAtmosphere::UsStandard],
        )
        .unwrap()
    }

    #[test]
    fn test_standard_atmosphere_codes() {
        for code in 1..=6 {
            let flag = StandardAtmosphere::try_from(code).unwrap();
            assert_eq!(flag.as_i64(), code);
        }
        assert_eq!(StandardAtmosphere::try_from(0), Err(0));
        assert_eq!(StandardAtmosphere::try_from(7), Err(7));
    }

    #[test]
    fn test_constructor_rejects_bad_shapes() {
        let mut collection = tiny_collection();
        collection.vector_target_matrix = Array3::zeros((2, 3, 1));
        assert!(matches!(
            collection.validate(),
            Err(ExampleError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_constructor_rejects_misfiled_field() {
        let mut collection = tiny_collection();
        collection.scalar_predictor_names = vec![Field::Temperature];
        assert!(matches!(
            collection.validate(),
            Err(ExampleError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_typed_accessors() {
        let collection = tiny_collection();
        assert_eq!(collection.scalar_field(Field::Albedo).unwrap().to_vec(), vec![0.1, 0.2]);
        assert_eq!(
            collection.field_at_height(Field::DownFlux, 20.3).unwrap().to_vec(),
            vec![510.0, 610.0]
        );
        assert!(matches!(
            collection.vector_field(Field::Pressure),
            Err(ExampleError::UnknownField(Field::Pressure))
        ));
    }

    #[test]
    fn test_set_vector_field_appends_then_replaces() {
        let mut collection = tiny_collection();
        collection
            .set_vector_field(Field::Pressure, array![[1.0, 2.0], [3.0, 4.0]])
            .unwrap();
        assert_eq!(
            collection.vector_predictor_names,
            vec![Field::Temperature, Field::Pressure]
        );
        collection
            .set_vector_field(Field::Pressure, array![[5.0, 6.0], [7.0, 8.0]])
            .unwrap();
        assert_eq!(collection.vector_predictor_matrix.dim(), (2, 2, 2));
        assert_eq!(collection.vector_field(Field::Pressure).unwrap()[[1, 1]], 8.0);
        assert!(collection.validate().is_ok());
    }
}
