use crate::error::{TensorError, TensorResult};
use serde::{Deserialize, Serialize};

/// Represents the shape of a tensor (dimensions).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    pub fn scalar() -> Self {
        Shape { dims: vec![] }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Size along a specific axis.
    pub fn dim(&self, axis: usize) -> TensorResult<usize> {
        self.dims.get(axis).copied().ok_or(TensorError::InvalidAxis {
            axis,
            ndim: self.ndim(),
        })
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        if self.dims.is_empty() {
            1 // scalar
        } else {
            self.dims.iter().product()
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.dims.clone()
    }

    /// Compute row-major (C-order) strides.
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Flat offset of a multi-dimensional index, with bounds checking.
    pub fn offset_of(&self, indices: &[usize]) -> TensorResult<usize> {
        if indices.len() != self.ndim() {
            return Err(TensorError::DimensionMismatch(format!(
                "Expected {} indices, got {}",
                self.ndim(),
                indices.len()
            )));
        }
        let strides = self.strides();
        let mut offset = 0;
        for (axis, (&idx, &size)) in indices.iter().zip(self.dims.iter()).enumerate() {
            if idx >= size {
                return Err(TensorError::IndexOutOfBounds {
                    index: idx,
                    axis,
                    size,
                });
            }
            offset += idx * strides[axis];
        }
        Ok(offset)
    }

    /// Shape with the leading axis removed.
    pub fn without_leading(&self) -> TensorResult<Shape> {
        if self.dims.is_empty() {
            return Err(TensorError::InvalidAxis { axis: 0, ndim: 0 });
        }
        Ok(Shape::from_slice(&self.dims[1..]))
    }

    /// Shape with a new leading axis of size `n`.
    pub fn with_leading(&self, n: usize) -> Shape {
        let mut dims = Vec::with_capacity(self.dims.len() + 1);
        dims.push(n);
        dims.extend_from_slice(&self.dims);
        Shape { dims }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let s = Shape::new(vec![2, 3, 6, 6]);
        assert_eq!(s.ndim(), 4);
        assert_eq!(s.numel(), 216);
        assert_eq!(s.dim(1).unwrap(), 3);
        assert!(s.dim(4).is_err());
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(vec![5, 3, 3, 3]);
        assert_eq!(s.strides(), vec![27, 9, 3, 1]);
    }

    #[test]
    fn test_offset_of() {
        let s = Shape::new(vec![3, 4, 5]);
        assert_eq!(s.offset_of(&[1, 2, 3]).unwrap(), 20 + 10 + 3);
        assert_eq!(
            s.offset_of(&[0, 4, 0]),
            Err(TensorError::IndexOutOfBounds { index: 4, axis: 1, size: 4 })
        );
        assert!(s.offset_of(&[0, 0]).is_err());
    }

    #[test]
    fn test_leading_axis() {
        let s = Shape::new(vec![3, 6, 6]);
        let batched = s.with_leading(4);
        assert_eq!(batched.dims(), &[4, 3, 6, 6]);
        assert_eq!(batched.without_leading().unwrap(), s);
        assert!(Shape::scalar().without_leading().is_err());
    }

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
    }
}
