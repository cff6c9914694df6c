//! # Adam Optimizer

use ndarray::{ArrayD, Zip};

use super::{Step, UpdateRule};
use crate::tensor::TensorData;

pub const NAME: &str = "Adam";
pub const ALPHA: &str = "Adam.alpha";
pub const BETA1: &str = "Adam.beta1";
pub const BETA2: &str = "Adam.beta2";
pub const EPS: &str = "Adam.eps";

/// Implements the Adam algorithm.
/// Reference: Adam: A Method for Stochastic Optimization - https://arxiv.org/abs/1412.6980
///
/// The step count `t` is not stored per parameter; it is the trainer's
/// epoch plus one.
///
/// ```text
/// m = beta1 * m + (1 - beta1) * g
/// v = beta2 * v + (1 - beta2) * g * g
/// p -= lr_scale * alpha * (m / (1 - beta1^t)) / (sqrt(v / (1 - beta2^t)) + eps)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adam {
    /// Step size. Defaults to `0.001`.
    pub alpha: f64,
    /// Decay of the first moment estimate. Defaults to `0.9`.
    pub beta1: f64,
    /// Decay of the second moment estimate. Defaults to `0.999`.
    pub beta2: f64,
    /// Added to the denominator for numerical stability. Defaults to `1e-8`.
    pub eps: f64,
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Adam {
    pub fn new(alpha: f64, beta1: f64, beta2: f64, eps: f64) -> Self {
        Self {
            alpha,
            beta1,
            beta2,
            eps,
        }
    }
}

impl UpdateRule for Adam {
    const NAME: &'static str = NAME;
    const STATE: &'static [&'static str] = &["m", "v"];

    fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        vec![
            (ALPHA, self.alpha),
            (BETA1, self.beta1),
            (BETA2, self.beta2),
            (EPS, self.eps),
        ]
    }

    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            ALPHA => Some(&mut self.alpha),
            BETA1 => Some(&mut self.beta1),
            BETA2 => Some(&mut self.beta2),
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
        let [m, v] = state else {
            unreachable!("Adam keeps exactly two state tensors");
        };
        let beta1 = self.beta1 as TensorData;
        let beta2 = self.beta2 as TensorData;
        let step_size = step.lr_scale * self.alpha;

        if step_size == 0.0 {
            // Moments still advance so that a later non-zero step size
            // sees the same history.
            Zip::from(grad).and(m).and(v).for_each(|&g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
            });
            return;
        }

        let t = f64::from(step.t);
        let bias_correction1 = (1.0 - self.beta1.powf(t)) as TensorData;
        let bias_correction2 = (1.0 - self.beta2.powf(t)) as TensorData;
        let step_size = step_size as TensorData;
        let eps = self.eps as TensorData;

        Zip::from(value)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= step_size * m_hat / (v_hat.sqrt() + eps);
            });
    }
}
