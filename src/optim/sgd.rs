//! # Stochastic Gradient Descent (SGD) Optimizer

use ndarray::ArrayD;

use super::{Step, UpdateRule};
use crate::tensor::TensorData;

pub const NAME: &str = "SGD";
pub const ETA: &str = "SGD.eta";

/// Plain gradient descent: `p -= lr_scale * eta * g`.
///
/// Keeps no per-parameter state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SGD {
    /// Learning rate. Defaults to `0.1`.
    pub eta: f64,
}

impl Default for SGD {
    fn default() -> Self {
        Self { eta: 0.1 }
    }
}

impl SGD {
    pub fn new(eta: f64) -> Self {
        Self { eta }
    }
}

impl UpdateRule for SGD {
    const NAME: &'static str = NAME;
    const STATE: &'static [&'static str] = &[];

    fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        vec![(ETA, self.eta)]
    }

    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            ETA => Some(&mut self.eta),
            _ => None,
        }
    }

    fn apply(
        &self,
        step: &Step,
        value: &mut ArrayD<TensorData>,
        grad: &ArrayD<TensorData>,
        _state: &mut [ArrayD<TensorData>],
    ) {
        let lr = (step.lr_scale * self.eta) as TensorData;
        value.scaled_add(-lr, grad);
    }
}
