//! # RMSProp Optimizer

use ndarray::{ArrayD, Zip};

use super::{Step, UpdateRule};
use crate::tensor::TensorData;

pub const NAME: &str = "RMSProp";
pub const ETA: &str = "RMSProp.eta";
pub const ALPHA: &str = "RMSProp.alpha";
pub const EPS: &str = "RMSProp.eps";

/// RMSProp keeps an exponential moving average `s` of squared gradients:
///
/// ```text
/// s = alpha * s + (1 - alpha) * g * g
/// p -= lr_scale * eta * g / (sqrt(s) + eps)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RMSProp {
    /// Learning rate. Defaults to `0.01`.
    pub eta: f64,
    /// Decay factor of the moving average. Defaults to `0.9`.
    pub alpha: f64,
    /// Added to the denominator for numerical stability. Defaults to `1e-8`.
    pub eps: f64,
}

impl Default for RMSProp {
    fn default() -> Self {
        Self {
            eta: 0.01,
            alpha: 0.9,
            eps: 1e-8,
        }
    }
}

impl RMSProp {
    pub fn new(eta: f64, alpha: f64, eps: f64) -> Self {
        Self { eta, alpha, eps }
    }
}

impl UpdateRule for RMSProp {
    const NAME: &'static str = NAME;
    const STATE: &'static [&'static str] = &["s"];

    fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        vec![(ETA, self.eta), (ALPHA, self.alpha), (EPS, self.eps)]
    }

    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            ETA => Some(&mut self.eta),
            ALPHA => Some(&mut self.alpha),
            EPS => Some(&mut self.eps),
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
        let [s] = state else {
            unreachable!("RMSProp keeps exactly one state tensor");
        };
        let lr = (step.lr_scale * self.eta) as TensorData;
        let alpha = self.alpha as TensorData;
        let eps = self.eps as TensorData;
        Zip::from(value).and(grad).and(s).for_each(|p, &g, s| {
            *s = alpha * *s + (1.0 - alpha) * g * g;
            *p -= lr * g / (s.sqrt() + eps);
        });
    }
}
