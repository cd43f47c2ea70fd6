//! Conversion between example collections and the tensor layouts expected by
//! each network topology.
//!
//! CNN and U-Net inputs are E x H x C profiles (vector channels first, scalars
//! repeated over heights). Dense-net inputs are E x N rows with the vector part
//! flattened so that height varies fastest (index = channel * H + height).

use crate::config::{LossFunction, NetType};
use crate::data_io::utils::match_heights;
use crate::data_io::{ExampleCollection, ExampleError, ExampleSchema, Field};
use ndarray::{concatenate, s, Array2, Array3, ArrayD, Axis, IxDyn};
use std::ops::Range;

/// Predictor tensor for one network topology
#[derive(Clone, Debug, PartialEq)]
pub enum PredictorMatrix<A> {
    /// E x H x C (CNN and U-Net)
    Profile(Array3<A>),
    /// E x N (dense net)
    Flat(Array2<A>),
}

impl<A: Clone> PredictorMatrix<A> {
    pub fn num_examples(&self) -> usize {
        match self {
            PredictorMatrix::Profile(m) => m.len_of(Axis(0)),
            PredictorMatrix::Flat(m) => m.len_of(Axis(0)),
        }
    }

    /// Examples in `range`, copied
    pub fn select_examples(&self, range: Range<usize>) -> Self {
        match self {
            PredictorMatrix::Profile(m) => PredictorMatrix::Profile(m.slice(s![range, .., ..]).to_owned()),
            PredictorMatrix::Flat(m) => PredictorMatrix::Flat(m.slice(s![range, ..]).to_owned()),
        }
    }
}

impl PredictorMatrix<f64> {
    pub fn to_f32(&self) -> PredictorMatrix<f32> {
        match self {
            PredictorMatrix::Profile(m) => PredictorMatrix::Profile(m.mapv(|v| v as f32)),
            PredictorMatrix::Flat(m) => PredictorMatrix::Flat(m.mapv(|v| v as f32)),
        }
    }
}

impl PredictorMatrix<f32> {
    pub fn to_f64(&self) -> PredictorMatrix<f64> {
        match self {
            PredictorMatrix::Profile(m) => PredictorMatrix::Profile(m.mapv(f64::from)),
            PredictorMatrix::Flat(m) => PredictorMatrix::Flat(m.mapv(f64::from)),
        }
    }
}

/// Target tensors for one network topology
#[derive(Clone, Debug, PartialEq)]
pub enum TargetMatrices<A> {
    /// Vector head E x H x Tv, optional scalar head E x Ts
    Cnn {
        vector: Array3<A>,
        scalar: Option<Array2<A>>,
    },
    /// E x H x Tv
    UNet { vector: Array3<A> },
    /// E x (H * Tv + Ts)
    Dense { flat: Array2<A> },
}

impl<A: Clone> TargetMatrices<A> {
    pub fn num_examples(&self) -> usize {
        match self {
            TargetMatrices::Cnn { vector, .. } | TargetMatrices::UNet { vector } => {
                vector.len_of(Axis(0))
            }
            TargetMatrices::Dense { flat } => flat.len_of(Axis(0)),
        }
    }

    /// Stack batches of the same topology along the example axis
    pub fn concat(parts: &[TargetMatrices<A>]) -> Result<Self, ExampleError> {
        let stack_err = |e: ndarray::ShapeError| ExampleError::ShapeMismatch(e.to_string());
        let mismatch = || {
            ExampleError::ShapeMismatch("cannot concatenate target tensors of different layouts".to_string())
        };

        match parts.first() {
            None => Err(ExampleError::InvalidArgument(
                "cannot concatenate an empty list of target tensors".to_string(),
            )),
            Some(TargetMatrices::UNet { .. }) => {
                let mut vectors = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        TargetMatrices::UNet { vector } => vectors.push(vector.view()),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(TargetMatrices::UNet {
                    vector: concatenate(Axis(0), &vectors).map_err(stack_err)?,
                })
            }
            Some(TargetMatrices::Dense { .. }) => {
                let mut flats = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        TargetMatrices::Dense { flat } => flats.push(flat.view()),
                        _ => return Err(mismatch()),
                    }
                }
                Ok(TargetMatrices::Dense {
                    flat: concatenate(Axis(0), &flats).map_err(stack_err)?,
                })
            }
            Some(TargetMatrices::Cnn { scalar: first_scalar, .. }) => {
                let mut vectors = Vec::with_capacity(parts.len());
                let mut scalars = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        TargetMatrices::Cnn { vector, scalar } => {
                            if scalar.is_some() != first_scalar.is_some() {
                                return Err(mismatch());
                            }
                            vectors.push(vector.view());
                            if let Some(scalar) = scalar {
                                scalars.push(scalar.view());
                            }
                        }
                        _ => return Err(mismatch()),
                    }
                }
                let scalar = if first_scalar.is_some() {
                    Some(concatenate(Axis(0), &scalars).map_err(stack_err)?)
                } else {
                    None
                };
                Ok(TargetMatrices::Cnn {
                    vector: concatenate(Axis(0), &vectors).map_err(stack_err)?,
                    scalar,
                })
            }
        }
    }
}

impl TargetMatrices<f64> {
    pub fn to_f32(&self) -> TargetMatrices<f32> {
        match self {
            TargetMatrices::Cnn { vector, scalar } => TargetMatrices::Cnn {
                vector: vector.mapv(|v| v as f32),
                scalar: scalar.as_ref().map(|m| m.mapv(|v| v as f32)),
            },
            TargetMatrices::UNet { vector } => TargetMatrices::UNet {
                vector: vector.mapv(|v| v as f32),
            },
            TargetMatrices::Dense { flat } => TargetMatrices::Dense {
                flat: flat.mapv(|v| v as f32),
            },
        }
    }
}

impl TargetMatrices<f32> {
    pub fn to_f64(&self) -> TargetMatrices<f64> {
        match self {
            TargetMatrices::Cnn { vector, scalar } => TargetMatrices::Cnn {
                vector: vector.mapv(f64::from),
                scalar: scalar.as_ref().map(|m| m.mapv(f64::from)),
            },
            TargetMatrices::UNet { vector } => TargetMatrices::UNet {
                vector: vector.mapv(f64::from),
            },
            TargetMatrices::Dense { flat } => TargetMatrices::Dense {
                flat: flat.mapv(f64::from),
            },
        }
    }
}

/// Vector block flattened height-fastest, followed by the scalar block
fn flatten_profiles(vector: &Array3<f64>, scalar: &Array2<f64>) -> Array2<f64> {
    let (num_examples, num_heights, num_channels) = vector.dim();
    let num_vector_values = num_heights * num_channels;
    Array2::from_shape_fn(
        (num_examples, num_vector_values + scalar.ncols()),
        |(i, j)| {
            if j < num_vector_values {
                vector[[i, j % num_heights, j / num_heights]]
            } else {
                scalar[[i, j - num_vector_values]]
            }
        },
    )
}

fn unflatten_profiles(
    flat: &Array2<f64>,
    num_heights: usize,
    num_channels: usize,
    num_scalars: usize,
) -> Result<(Array2<f64>, Array3<f64>), ExampleError> {
    let (num_examples, width) = flat.dim();
    let num_vector_values = num_heights * num_channels;
    if width != num_vector_values + num_scalars {
        return Err(ExampleError::ShapeMismatch(format!(
            "flat tensor has {} columns, expected {} x {} + {} = {}",
            width,
            num_heights,
            num_channels,
            num_scalars,
            num_vector_values + num_scalars
        )));
    }

    let vector = Array3::from_shape_fn((num_examples, num_heights, num_channels), |(i, h, c)| {
        flat[[i, c * num_heights + h]]
    });
    let scalar = flat.slice(s![.., num_vector_values..]).to_owned();
    Ok((scalar, vector))
}

/// Profiles with the scalar channels repeated at every height
fn stack_channels(vector: &Array3<f64>, scalar: &Array2<f64>) -> Array3<f64> {
    let (num_examples, num_heights, num_channels) = vector.dim();
    Array3::from_shape_fn(
        (num_examples, num_heights, num_channels + scalar.ncols()),
        |(i, h, k)| {
            if k < num_channels {
                vector[[i, h, k]]
            } else {
                scalar[[i, k - num_channels]]
            }
        },
    )
}

/// Predictor tensor in the layout of `net_type`
pub fn predictors_to_tensor(example: &ExampleCollection, net_type: NetType) -> PredictorMatrix<f64> {
    match net_type {
        NetType::DenseNet => PredictorMatrix::Flat(flatten_profiles(
            &example.vector_predictor_matrix,
            &example.scalar_predictor_matrix,
        )),
        NetType::Cnn | NetType::UNet => PredictorMatrix::Profile(stack_channels(
            &example.vector_predictor_matrix,
            &example.scalar_predictor_matrix,
        )),
    }
}

/// Field and height (NaN for scalars) of every slot of one example's predictor tensor
pub fn predictor_names_and_heights(schema: &ExampleSchema, net_type: NetType) -> (ArrayD<Field>, ArrayD<f64>) {
    let num_heights = schema.num_heights();
    let num_vector = schema.vector_predictor_names.len();
    let num_scalar = schema.scalar_predictor_names.len();

    let slot = |h: usize, k: usize| -> (Field, f64) {
        if k < num_vector {
            (schema.vector_predictor_names[k], schema.heights_m_agl[h])
        } else {
            (schema.scalar_predictor_names[k - num_vector], f64::NAN)
        }
    };

    match net_type {
        NetType::DenseNet => {
            let num_vector_values = num_heights * num_vector;
            let slots: Vec<(Field, f64)> = (0..num_vector_values + num_scalar)
                .map(|j| {
                    if j < num_vector_values {
                        slot(j % num_heights, j / num_heights)
                    } else {
                        slot(0, num_vector + j - num_vector_values)
                    }
                })
                .collect();
            let shape = IxDyn(&[slots.len()]);
            (
                ArrayD::from_shape_fn(shape.clone(), |ix| slots[ix[0]].0),
                ArrayD::from_shape_fn(shape, |ix| slots[ix[0]].1),
            )
        }
        NetType::Cnn | NetType::UNet => {
            let shape = IxDyn(&[num_heights, num_vector + num_scalar]);
            (
                ArrayD::from_shape_fn(shape.clone(), |ix| slot(ix[0], ix[1]).0),
                ArrayD::from_shape_fn(shape, |ix| slot(ix[0], ix[1]).1),
            )
        }
    }
}

/// Inverse of `predictors_to_tensor`: (scalar E x Ps, vector E x H x Pv)
///
/// Profile layouts take the scalars from the first height row.
pub fn tensor_to_predictors(
    tensor: &PredictorMatrix<f64>,
    schema: &ExampleSchema,
    net_type: NetType,
) -> Result<(Array2<f64>, Array3<f64>), ExampleError> {
    let num_heights = schema.num_heights();
    let num_vector = schema.vector_predictor_names.len();
    let num_scalar = schema.scalar_predictor_names.len();

    match (net_type, tensor) {
        (NetType::DenseNet, PredictorMatrix::Flat(flat)) => {
            unflatten_profiles(flat, num_heights, num_vector, num_scalar)
        }
        (NetType::Cnn | NetType::UNet, PredictorMatrix::Profile(profile)) => {
            let (num_examples, h, c) = profile.dim();
            if h != num_heights || c != num_vector + num_scalar {
                return Err(ExampleError::ShapeMismatch(format!(
                    "predictor tensor is {:?}, expected ({}, {}, {})",
                    profile.dim(),
                    num_examples,
                    num_heights,
                    num_vector + num_scalar
                )));
            }
            let vector = profile.slice(s![.., .., ..num_vector]).to_owned();
            let scalar = profile.slice(s![.., 0, num_vector..]).to_owned();
            Ok((scalar, vector))
        }
        (net_type, _) => Err(ExampleError::ShapeMismatch(format!(
            "predictor tensor layout does not match net type {}",
            net_type
        ))),
    }
}

/// Target tensors in the layout of `net_type`
///
/// With constrained MSE the CNN scalar head gains two leading channels: upward
/// flux at the highest height and downward flux at the lowest height.
pub fn targets_to_tensors(
    example: &ExampleCollection,
    net_type: NetType,
    loss: &LossFunction,
) -> Result<TargetMatrices<f64>, ExampleError> {
    match net_type {
        NetType::UNet => Ok(TargetMatrices::UNet {
            vector: example.vector_target_matrix.clone(),
        }),
        NetType::DenseNet => Ok(TargetMatrices::Dense {
            flat: flatten_profiles(&example.vector_target_matrix, &example.scalar_target_matrix),
        }),
        NetType::Cnn if loss.is_constrained_mse() => {
            let num_heights = example.num_heights();
            if num_heights == 0 {
                return Err(ExampleError::ShapeMismatch(
                    "constrained targets need at least one height".to_string(),
                ));
            }
            let up_flux = example.vector_field(Field::UpFlux)?;
            let down_flux = example.vector_field(Field::DownFlux)?;
            let extra = ndarray::stack(
                Axis(1),
                &[up_flux.column(num_heights - 1), down_flux.column(0)],
            )
            .map_err(|e| ExampleError::ShapeMismatch(e.to_string()))?;
            let scalar = concatenate(Axis(1), &[extra.view(), example.scalar_target_matrix.view()])
                .map_err(|e| ExampleError::ShapeMismatch(e.to_string()))?;
            Ok(TargetMatrices::Cnn {
                vector: example.vector_target_matrix.clone(),
                scalar: Some(scalar),
            })
        }
        NetType::Cnn => Ok(TargetMatrices::Cnn {
            vector: example.vector_target_matrix.clone(),
            scalar: if example.scalar_target_names.is_empty() {
                None
            } else {
                Some(example.scalar_target_matrix.clone())
            },
        }),
    }
}

/// Drop the two leading constrained channels from a CNN scalar head
pub fn strip_constrained_channels<A: Clone>(
    matrices: TargetMatrices<A>,
) -> Result<TargetMatrices<A>, ExampleError> {
    match matrices {
        TargetMatrices::Cnn {
            vector,
            scalar: Some(scalar),
        } => {
            if scalar.ncols() < 2 {
                return Err(ExampleError::ShapeMismatch(format!(
                    "constrained scalar head has {} channels, expected at least 2",
                    scalar.ncols()
                )));
            }
            Ok(TargetMatrices::Cnn {
                vector,
                scalar: Some(scalar.slice(s![.., 2..]).to_owned()),
            })
        }
        _ => Err(ExampleError::InvalidArgument(
            "only CNN targets with a scalar head carry constrained channels".to_string(),
        )),
    }
}

/// Inverse of `targets_to_tensors` for unconstrained layouts: (scalar E x Ts, vector E x H x Tv)
///
/// U-Net tensors carry no scalars, so their scalar matrix is E x 0.
pub fn tensors_to_targets(
    matrices: &TargetMatrices<f64>,
    schema: &ExampleSchema,
    net_type: NetType,
) -> Result<(Array2<f64>, Array3<f64>), ExampleError> {
    let num_heights = schema.num_heights();
    let num_vector = schema.vector_target_names.len();
    let num_scalar = schema.scalar_target_names.len();

    let check_vector = |vector: &Array3<f64>| {
        let (_, h, c) = vector.dim();
        if h != num_heights || c != num_vector {
            return Err(ExampleError::ShapeMismatch(format!(
                "vector target tensor is {:?}, expected (E, {}, {})",
                vector.dim(),
                num_heights,
                num_vector
            )));
        }
        Ok(())
    };

    match (net_type, matrices) {
        (NetType::UNet, TargetMatrices::UNet { vector }) => {
            check_vector(vector)?;
            Ok((Array2::zeros((vector.len_of(Axis(0)), 0)), vector.clone()))
        }
        (NetType::DenseNet, TargetMatrices::Dense { flat }) => {
            unflatten_profiles(flat, num_heights, num_vector, num_scalar)
        }
        (NetType::Cnn, TargetMatrices::Cnn { vector, scalar }) => {
            check_vector(vector)?;
            let num_examples = vector.len_of(Axis(0));
            let scalar = match scalar {
                Some(scalar) => {
                    if scalar.dim() != (num_examples, num_scalar) {
                        return Err(ExampleError::ShapeMismatch(format!(
                            "scalar target tensor is {:?}, expected ({}, {})",
                            scalar.dim(),
                            num_examples,
                            num_scalar
                        )));
                    }
                    scalar.clone()
                }
                None => Array2::zeros((num_examples, 0)),
            };
            Ok((scalar, vector.clone()))
        }
        (net_type, _) => Err(ExampleError::ShapeMismatch(format!(
            "target tensor layout does not match net type {}",
            net_type
        ))),
    }
}

/// Target variable behind an output neuron: field and height (None for scalars)
///
/// U-Net neurons take 2 indices (height, channel), dense-net neurons 1, CNN
/// neurons 1 on the scalar head or 2 on the vector head.
pub fn neuron_indices_to_target_var(
    neuron_indices: &[usize],
    schema: &ExampleSchema,
    net_type: NetType,
) -> Result<(Field, Option<f64>), ExampleError> {
    let num_heights = schema.num_heights();
    let allowed = match net_type {
        NetType::UNet => 2..=2,
        NetType::DenseNet => 1..=1,
        NetType::Cnn => 1..=2,
    };
    if !allowed.contains(&neuron_indices.len()) {
        return Err(ExampleError::InvalidArgument(format!(
            "{} neuron indices given, {} expects {:?}",
            neuron_indices.len(),
            net_type,
            allowed
        )));
    }

    let out_of_range = || {
        ExampleError::InvalidArgument(format!("neuron indices {:?} out of range", neuron_indices))
    };

    if neuron_indices.len() == 2 {
        let (h, c) = (neuron_indices[0], neuron_indices[1]);
        let field = schema.vector_target_names.get(c).ok_or_else(out_of_range)?;
        let height = schema.heights_m_agl.get(h).ok_or_else(out_of_range)?;
        return Ok((*field, Some(*height)));
    }

    let index = neuron_indices[0];
    if net_type == NetType::DenseNet {
        let num_vector_values = num_heights * schema.vector_target_names.len();
        if index < num_vector_values {
            let field = schema.vector_target_names[index / num_heights];
            return Ok((field, Some(schema.heights_m_agl[index % num_heights])));
        }
        let field = schema
            .scalar_target_names
            .get(index - num_vector_values)
            .ok_or_else(out_of_range)?;
        return Ok((*field, None));
    }

    let field = schema.scalar_target_names.get(index).ok_or_else(out_of_range)?;
    Ok((*field, None))
}

/// Output-neuron indices of a target variable; inverse of `neuron_indices_to_target_var`
pub fn target_var_to_neuron_indices(
    schema: &ExampleSchema,
    net_type: NetType,
    field: Field,
    height_m_agl: Option<f64>,
) -> Result<Vec<usize>, ExampleError> {
    let num_heights = schema.num_heights();

    match height_m_agl {
        None => {
            let k = schema
                .scalar_target_names
                .iter()
                .position(|f| *f == field)
                .ok_or(ExampleError::UnknownField(field))?;
            match net_type {
                NetType::UNet => Err(ExampleError::InvalidArgument(
                    "U-Net outputs have no scalar neurons".to_string(),
                )),
                NetType::DenseNet => Ok(vec![num_heights * schema.vector_target_names.len() + k]),
                NetType::Cnn => Ok(vec![k]),
            }
        }
        Some(height) => {
            let c = schema
                .vector_target_names
                .iter()
                .position(|f| *f == field)
                .ok_or(ExampleError::UnknownField(field))?;
            let h = match_heights(&schema.heights_m_agl, height)?;
            match net_type {
                NetType::DenseNet => Ok(vec![c * num_heights + h]),
                NetType::Cnn | NetType::UNet => Ok(vec![h, c]),
            }
        }
    }
}
