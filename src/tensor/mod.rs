//! # Tensor Module
//!
//! Trainable parameters as seen by a trainer: a value tensor and an
//! optional gradient tensor, both shared with whoever owns the model.
//! Gradient computation itself happens elsewhere; this module only stores
//! the result.

use ndarray::{ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, TrainerError};

pub mod storage;

pub use storage::Storage;

/// Element type of parameter values, gradients and optimizer state.
pub type TensorData = f32;

/// # Parameter
///
/// A trainable tensor. Cloning a `Parameter` yields another handle to the
/// same value and gradient, which is how a trainer holds on to the
/// parameters of a model it does not own.
#[derive(Clone, Debug)]
pub struct Parameter {
    value: Storage<ArrayD<TensorData>>,
    // None until a gradient has been computed or reset.
    grad: Storage<Option<ArrayD<TensorData>>>,
    shape: Vec<usize>,
}

impl Parameter {
    /// Creates a parameter from an initial value. The gradient starts empty.
    pub fn new(value: ArrayD<TensorData>) -> Self {
        let shape = value.shape().to_vec();
        Parameter {
            value: Storage::new(value),
            grad: Storage::new(None),
            shape,
        }
    }

    /// Creates a parameter of the given shape filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Parameter {
            value: Storage::zeros(shape),
            grad: Storage::new(None),
            shape: shape.to_vec(),
        }
    }

    /// Creates a parameter from a flat list of values in row-major order.
    pub fn from_vec(shape: &[usize], values: Vec<TensorData>) -> Result<Self> {
        let value = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Ok(Self::new(value))
    }

    /// Creates a parameter initialised uniformly in `[low, high)`.
    pub fn uniform<R: Rng + ?Sized>(
        shape: &[usize],
        low: TensorData,
        high: TensorData,
        rng: &mut R,
    ) -> Self {
        let dist = Uniform::new(low, high);
        let value = ArrayD::from_shape_simple_fn(IxDyn(shape), || dist.sample(rng));
        Self::new(value)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Read access to the current value.
    pub fn value(&self) -> RwLockReadGuard<'_, ArrayD<TensorData>> {
        self.value.read_lock()
    }

    /// Write access to the current value.
    pub fn value_mut(&self) -> RwLockWriteGuard<'_, ArrayD<TensorData>> {
        self.value.write_lock()
    }

    pub fn value_clone(&self) -> ArrayD<TensorData> {
        self.value().clone()
    }

    /// Overwrites all values.
    pub fn reset_value(&self, value: ArrayD<TensorData>) -> Result<()> {
        self.check_shape("parameter value", value.shape())?;
        *self.value_mut() = value;
        Ok(())
    }

    /// Returns a copy of the current gradient, if one has been computed.
    pub fn gradient(&self) -> Option<ArrayD<TensorData>> {
        self.grad.read_lock().clone()
    }

    pub fn has_gradient(&self) -> bool {
        self.grad.read_lock().is_some()
    }

    /// Replaces the gradient.
    pub fn set_gradient(&self, grad: ArrayD<TensorData>) -> Result<()> {
        self.check_shape("gradient", grad.shape())?;
        *self.grad.write_lock() = Some(grad);
        Ok(())
    }

    /// Replaces the gradient from a flat list in row-major order.
    pub fn set_gradient_from_vec(&self, values: Vec<TensorData>) -> Result<()> {
        if values.len() != self.size() {
            return Err(TrainerError::ShapeMismatch {
                what: "flat gradient".to_string(),
                expected: vec![self.size()],
                got: vec![values.len()],
            });
        }
        self.set_gradient(ArrayD::from_shape_vec(IxDyn(&self.shape), values)?)
    }

    /// Current value flattened in row-major order.
    pub fn to_vec(&self) -> Vec<TensorData> {
        self.value().iter().copied().collect()
    }

    /// Adds `diff` to the gradient, starting from zeros if there is none yet.
    pub fn accumulate_gradient(&self, diff: &ArrayD<TensorData>) -> Result<()> {
        self.check_shape("gradient", diff.shape())?;
        let mut grad = self.grad.write_lock();
        match grad.as_mut() {
            Some(existing) => *existing += diff,
            None => *grad = Some(diff.clone()),
        }
        Ok(())
    }

    /// Sets the gradient to zeros.
    pub fn reset_gradient(&self) {
        let mut grad = self.grad.write_lock();
        match grad.as_mut() {
            Some(existing) => existing.fill(0.0),
            None => *grad = Some(ArrayD::zeros(IxDyn(&self.shape))),
        }
    }

    /// Whether `other` is a handle to the same parameter.
    pub fn same_parameter(&self, other: &Parameter) -> bool {
        self.value.same_allocation(&other.value)
    }

    fn check_shape(&self, what: &str, got: &[usize]) -> Result<()> {
        if got != self.shape.as_slice() {
            return Err(TrainerError::ShapeMismatch {
                what: what.to_string(),
                expected: self.shape.clone(),
                got: got.to_vec(),
            });
        }
        Ok(())
    }
}
