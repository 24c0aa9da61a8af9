//! Helpers over constant tensor values.
//!
//! Rules fold constants in `f64` and convert back to the original data type,
//! so float constants keep their dtype through a rewrite.

use burn_tensor::{DType, TensorData};

use crate::error::GraphError;

/// Element access for constant values that does not care about the stored dtype.
pub trait TensorDataExt {
    /// Copy the elements out as `f64`. Fails for dtypes that are not plain
    /// floats or integers.
    fn to_f64_vec(&self) -> Result<Vec<f64>, GraphError>;

    fn to_i64_vec(&self) -> Result<Vec<i64>, GraphError>;

    fn shape_vec(&self) -> Vec<usize>;
}

impl TensorDataExt for TensorData {
    fn to_f64_vec(&self) -> Result<Vec<f64>, GraphError> {
        match self.dtype {
            DType::F64 => slice::<f64>(self).map(<[f64]>::to_vec),
            DType::F32 => Ok(slice::<f32>(self)?.iter().map(|&v| v as f64).collect()),
            DType::I64 => Ok(slice::<i64>(self)?.iter().map(|&v| v as f64).collect()),
            DType::I32 => Ok(slice::<i32>(self)?.iter().map(|&v| v as f64).collect()),
            other => Err(GraphError::TensorData(format!(
                "cannot read {other:?} values as f64"
            ))),
        }
    }

    fn to_i64_vec(&self) -> Result<Vec<i64>, GraphError> {
        match self.dtype {
            DType::I64 => slice::<i64>(self).map(<[i64]>::to_vec),
            DType::I32 => Ok(slice::<i32>(self)?.iter().map(|&v| v as i64).collect()),
            other => Err(GraphError::TensorData(format!(
                "cannot read {other:?} values as i64"
            ))),
        }
    }

    fn shape_vec(&self) -> Vec<usize> {
        self.shape.iter().copied().collect()
    }
}

fn slice<E: burn_tensor::Element>(data: &TensorData) -> Result<&[E], GraphError> {
    data.as_slice::<E>()
        .map_err(|err| GraphError::TensorData(format!("{err:?}")))
}

/// Build a float tensor of the given dtype from `f64` values.
pub fn float_tensor(
    values: Vec<f64>,
    shape: Vec<usize>,
    dtype: DType,
) -> Result<TensorData, GraphError> {
    let expected: usize = shape.iter().product();
    if values.len() != expected {
        return Err(GraphError::SizeMismatch {
            actual: values.len(),
            expected,
        });
    }
    match dtype {
        DType::F64 => Ok(TensorData::new(values, shape)),
        DType::F32 => Ok(TensorData::new(
            values.into_iter().map(|v| v as f32).collect::<Vec<f32>>(),
            shape,
        )),
        other => Err(GraphError::TensorData(format!(
            "cannot build a {other:?} tensor from float values"
        ))),
    }
}

/// Numpy-style broadcast of two shapes, `None` if they are incompatible.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    (0..rank)
        .rev()
        .map(|offset| {
            match (dim_from_right(lhs, offset), dim_from_right(rhs, offset)) {
                (l, r) if l == r => Some(l),
                (1, r) => Some(r),
                (l, 1) => Some(l),
                _ => None,
            }
        })
        .collect()
}

/// Dimension `offset` positions from the right, 1 when the shape is shorter.
fn dim_from_right(shape: &[usize], offset: usize) -> usize {
    if offset < shape.len() {
        shape[shape.len() - 1 - offset]
    } else {
        1
    }
}

/// Materialize `values` (row-major, of shape `shape`) broadcast to `target`.
pub fn broadcast_to(values: &[f64], shape: &[usize], target: &[usize]) -> Option<Vec<f64>> {
    if broadcast_shapes(shape, target)?.as_slice() != target {
        return None;
    }
    if values.len() != shape.iter().product::<usize>() {
        return None;
    }

    // Source strides aligned to the target rank; broadcast dimensions get 0.
    let rank = target.len();
    let mut strides = vec![0; rank];
    let mut stride = 1;
    for i in (0..rank).rev() {
        let dim = dim_from_right(shape, rank - 1 - i);
        if dim != 1 {
            strides[i] = stride;
        }
        stride *= dim;
    }

    let total: usize = target.iter().product();
    let mut out = Vec::with_capacity(total);
    let mut index = vec![0; rank];
    for _ in 0..total {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(values[offset]);
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < target[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Some(out)
}

/// Normalized root-mean-square deviation of `actual` from `expected`.
///
/// The RMS error is normalized by the value range of `expected`; a constant
/// `expected` yields 1.0.
pub fn nrmsd(actual: &[f64], expected: &[f64]) -> Result<f64, GraphError> {
    if actual.len() != expected.len() {
        return Err(GraphError::SizeMismatch {
            actual: actual.len(),
            expected: expected.len(),
        });
    }
    if expected.is_empty() {
        return Ok(0.0);
    }

    let sum: f64 = expected
        .iter()
        .zip(actual)
        .map(|(e, a)| (e - a).powi(2))
        .sum();
    let rmsd = (sum / expected.len() as f64).sqrt();

    let max = expected.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = expected.iter().copied().fold(f64::INFINITY, f64::min);
    if max - min == 0.0 {
        return Ok(1.0);
    }
    Ok(rmsd / (max - min))
}
