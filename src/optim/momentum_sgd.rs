//! # Momentum SGD Optimizer

use ndarray::{ArrayD, Zip};

use super::{Step, UpdateRule};
use crate::tensor::TensorData;

pub const NAME: &str = "MomentumSGD";
pub const ETA: &str = "MomentumSGD.eta";
pub const MOMENTUM: &str = "MomentumSGD.momentum";

/// SGD with a classic momentum buffer `m`:
///
/// ```text
/// m = momentum * m - eta * g
/// p += lr_scale * m
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumSGD {
    /// Learning rate. Defaults to `0.01`.
    pub eta: f64,
    /// Decay factor of the momentum buffer. Defaults to `0.9`.
    pub momentum: f64,
}

impl Default for MomentumSGD {
    fn default() -> Self {
        Self {
            eta: 0.01,
            momentum: 0.9,
        }
    }
}

impl MomentumSGD {
    pub fn new(eta: f64, momentum: f64) -> Self {
        Self { eta, momentum }
    }
}

impl UpdateRule for MomentumSGD {
    const NAME: &'static str = NAME;
    const STATE: &'static [&'static str] = &["m"];

    fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        vec![(ETA, self.eta), (MOMENTUM, self.momentum)]
    }

    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            ETA => Some(&mut self.eta),
            MOMENTUM => Some(&mut self.momentum),
            _ => None,
        }
    }

    fn apply(
        &self,
        step: &Step,
        value: &mut ArrayD<TensorData>,
        grad: &ArrayD<TensorData>,
        state: &mut [ArrayD<TensorData>],
    ) {
        let [m] = state else {
            unreachable!("MomentumSGD keeps exactly one state tensor");
        };
        let eta = self.eta as TensorData;
        let momentum = self.momentum as TensorData;
        let scale = step.lr_scale as TensorData;
        Zip::from(value).and(grad).and(m).for_each(|p, &g, m| {
            *m = momentum * *m - eta * g;
            *p += scale * *m;
        });
    }
}
