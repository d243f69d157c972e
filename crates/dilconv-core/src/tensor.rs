use crate::dtype::Float;
use crate::error::{TensorError, TensorResult};
use crate::shape::Shape;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// N-dimensional tensor, the fundamental data structure of dilconv.
///
/// Elements live in a reference-counted, row-major (C-order) backing store.
/// A tensor is a window `[offset, offset + numel)` into that store, so views
/// produced by [`Tensor::reshape`], [`Tensor::select`] and
/// [`Tensor::unsqueeze`] share memory with their source. Writes are
/// copy-on-write: a tensor whose store is shared takes a private copy of its
/// window before the first mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    bound = "T: Float",
    into = "TensorRepr<T>",
    try_from = "TensorRepr<T>"
)]
pub struct Tensor<T: Float> {
    storage: Arc<Vec<T>>,
    offset: usize,
    shape: Shape,
}

/// Serialized form: contiguous data plus shape.
#[derive(Serialize, Deserialize)]
#[serde(bound = "T: Float")]
struct TensorRepr<T: Float> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Float> From<Tensor<T>> for TensorRepr<T> {
    fn from(t: Tensor<T>) -> Self {
        TensorRepr {
            shape: t.shape_vec(),
            data: t.into_vec(),
        }
    }
}

impl<T: Float> TryFrom<TensorRepr<T>> for Tensor<T> {
    type Error = TensorError;

    fn try_from(repr: TensorRepr<T>) -> TensorResult<Self> {
        Tensor::new(repr.data, repr.shape)
    }
}

// ─── Construction ───────────────────────────────────────────────────────────

impl<T: Float> Tensor<T> {
    /// Create a tensor from raw data and shape.
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> TensorResult<Self> {
        let s = Shape::new(shape);
        if data.len() != s.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: s.to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Self::from_parts(data, s))
    }

    fn from_parts(data: Vec<T>, shape: Shape) -> Self {
        Tensor {
            storage: Arc::new(data),
            offset: 0,
            shape,
        }
    }

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        Self::full(shape, T::ZERO)
    }

    /// Create a tensor filled with a constant value.
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let s = Shape::new(shape);
        Self::from_parts(vec![value; s.numel()], s)
    }

    /// Create a tensor whose element at flat index `i` is `f(i)`.
    pub fn from_fn<F: FnMut(usize) -> T>(shape: Vec<usize>, f: F) -> Self {
        let s = Shape::new(shape);
        let data = (0..s.numel()).map(f).collect();
        Self::from_parts(data, s)
    }

    /// Random tensor with values drawn uniformly from `[low, high)`.
    ///
    /// The generator is supplied by the caller so runs are reproducible
    /// from an explicit seed.
    pub fn rand_uniform<R: Rng + ?Sized>(shape: Vec<usize>, low: T, high: T, rng: &mut R) -> Self {
        let span = high - low;
        Self::from_fn(shape, |_| low + span * T::from_f64(rng.gen::<f64>()))
    }

    /// Random tensor with standard normal distribution (Box-Muller).
    pub fn randn<R: Rng + ?Sized>(shape: Vec<usize>, rng: &mut R) -> Self {
        let s = Shape::new(shape);
        let n = s.numel();
        let mut data = Vec::with_capacity(n + 1);

        while data.len() < n {
            let u1 = T::from_f64(rng.gen::<f64>().max(1e-10));
            let u2 = T::from_f64(rng.gen::<f64>());
            let r = (-T::TWO * u1.ln()).sqrt();
            let theta = T::TWO * T::PI * u2;
            data.push(r * theta.cos());
            // sin(θ) = cos(θ - π/2)
            data.push(r * (theta - T::PI / T::TWO).cos());
        }
        data.truncate(n);
        Self::from_parts(data, s)
    }

    /// Stack equally shaped tensors along a new leading axis.
    pub fn stack(tensors: &[&Tensor<T>]) -> TensorResult<Tensor<T>> {
        let first = tensors.first().ok_or(TensorError::EmptyTensor)?;
        let mut data = Vec::with_capacity(first.numel() * tensors.len());
        for t in tensors {
            if t.shape != first.shape {
                return Err(TensorError::ShapeMismatch {
                    expected: first.shape_vec(),
                    got: t.shape_vec(),
                });
            }
            data.extend_from_slice(t.data());
        }
        Ok(Self::from_parts(data, first.shape.with_leading(tensors.len())))
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_vec(&self) -> Vec<usize> {
        self.shape.to_vec()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn data(&self) -> &[T] {
        &self.storage[self.offset..self.offset + self.numel()]
    }

    /// Mutable access to the elements, detaching from shared storage first.
    pub fn data_mut(&mut self) -> &mut [T] {
        if Arc::strong_count(&self.storage) > 1 {
            self.storage = Arc::new(self.data().to_vec());
            self.offset = 0;
        }
        let (start, end) = (self.offset, self.offset + self.numel());
        &mut Arc::make_mut(&mut self.storage)[start..end]
    }

    pub fn into_vec(self) -> Vec<T> {
        let (start, end) = (self.offset, self.offset + self.numel());
        match Arc::try_unwrap(self.storage) {
            Ok(mut store) if start == 0 => {
                store.truncate(end);
                store
            }
            Ok(store) => store[start..end].to_vec(),
            Err(shared) => shared[start..end].to_vec(),
        }
    }

    /// True when both tensors are windows into the same backing store.
    pub fn shares_storage(&self, other: &Tensor<T>) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Read a single element.
    pub fn get(&self, indices: &[usize]) -> TensorResult<T> {
        let offset = self.shape.offset_of(indices)?;
        Ok(self.data()[offset])
    }

    /// Set a single element.
    pub fn set(&mut self, indices: &[usize], value: T) -> TensorResult<()> {
        let offset = self.shape.offset_of(indices)?;
        self.data_mut()[offset] = value;
        Ok(())
    }

    // ─── Views ──────────────────────────────────────────────────────────────

    /// Reshape without copying; the result shares storage with `self`.
    pub fn reshape(&self, new_shape: Vec<usize>) -> TensorResult<Tensor<T>> {
        let ns = Shape::new(new_shape);
        if self.numel() != ns.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: ns.to_vec(),
                got: self.shape_vec(),
            });
        }
        Ok(Tensor {
            storage: Arc::clone(&self.storage),
            offset: self.offset,
            shape: ns,
        })
    }

    /// View of entry `index` along the leading axis.
    pub fn select(&self, index: usize) -> TensorResult<Tensor<T>> {
        let size = self.shape.dim(0)?;
        if index >= size {
            return Err(TensorError::IndexOutOfBounds {
                index,
                axis: 0,
                size,
            });
        }
        let inner = self.shape.without_leading()?;
        Ok(Tensor {
            storage: Arc::clone(&self.storage),
            offset: self.offset + index * inner.numel(),
            shape: inner,
        })
    }

    /// Add a dimension of size 1 at the given axis (a view).
    pub fn unsqueeze(&self, axis: usize) -> TensorResult<Tensor<T>> {
        let mut dims = self.shape.to_vec();
        if axis > dims.len() {
            return Err(TensorError::InvalidAxis {
                axis,
                ndim: self.ndim(),
            });
        }
        dims.insert(axis, 1);
        self.reshape(dims)
    }

    // ─── Element-wise Operations ────────────────────────────────────────────

    pub fn apply<F: Fn(T) -> T>(&self, f: F) -> Tensor<T> {
        Self::from_parts(self.data().iter().map(|&x| f(x)).collect(), self.shape.clone())
    }

    pub fn mul_scalar(&self, s: T) -> Tensor<T> {
        self.apply(|x| x * s)
    }

    fn check_same_shape(&self, other: &Tensor<T>) -> TensorResult<()> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape_vec(),
                got: other.shape_vec(),
            });
        }
        Ok(())
    }

    fn zip_with<F: Fn(T, T) -> T>(&self, other: &Tensor<T>, op: F) -> TensorResult<Tensor<T>> {
        self.check_same_shape(other)?;
        let data = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| op(a, b))
            .collect();
        Ok(Self::from_parts(data, self.shape.clone()))
    }

    pub fn add(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Tensor<T>) -> TensorResult<Tensor<T>> {
        self.zip_with(other, |a, b| a * b)
    }

    /// In-place `self += alpha * other`.
    pub fn add_scaled(&mut self, other: &Tensor<T>, alpha: T) -> TensorResult<()> {
        self.check_same_shape(other)?;
        for (x, &y) in self.data_mut().iter_mut().zip(other.data().iter()) {
            *x += alpha * y;
        }
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        for x in self.data_mut().iter_mut() {
            *x = value;
        }
    }

    // ─── Reductions ─────────────────────────────────────────────────────────

    /// Sum of all elements.
    pub fn sum_all(&self) -> T {
        self.data().iter().copied().sum()
    }

    /// Inner product of two equally shaped tensors.
    pub fn dot(&self, other: &Tensor<T>) -> TensorResult<T> {
        self.check_same_shape(other)?;
        Ok(self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a * b)
            .sum())
    }

    pub fn has_nan(&self) -> bool {
        self.data().iter().any(|x| x.is_nan())
    }
}

impl<T: Float> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data() == other.data()
    }
}

// ─── Display ────────────────────────────────────────────────────────────────

impl<T: Float> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor([")?;
        for (i, v) in self.data().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if i > 6 {
                write!(f, "...")?;
                break;
            }
            write!(f, "{:.4}", v)?;
        }
        write!(f, "], shape={})", self.shape)
    }
}
