//! # AdaGrad Optimizer

use ndarray::{ArrayD, Zip};

use super::{Step, UpdateRule};
use crate::tensor::TensorData;

pub const NAME: &str = "AdaGrad";
pub const ETA: &str = "AdaGrad.eta";
pub const EPS: &str = "AdaGrad.eps";

/// Implements the AdaGrad algorithm.
/// Reference: Adaptive Subgradient Methods for Online Learning and Stochastic Optimization - http://jmlr.org/papers/v12/duchi11a.html
///
/// ```text
/// s += g * g
/// p -= lr_scale * eta * g / (sqrt(s) + eps)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaGrad {
    /// Learning rate. Defaults to `0.001`.
    pub eta: f64,
    /// Added to the denominator for numerical stability. Defaults to `1e-8`.
    pub eps: f64,
}

impl Default for AdaGrad {
    fn default() -> Self {
        Self {
            eta: 0.001,
            eps: 1e-8,
        }
    }
}

impl AdaGrad {
    pub fn new(eta: f64, eps: f64) -> Self {
        Self { eta, eps }
    }
}

impl UpdateRule for AdaGrad {
    const NAME: &'static str = NAME;
    const STATE: &'static [&'static str] = &["s"];

    fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        vec![(ETA, self.eta), (EPS, self.eps)]
    }

    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            ETA => Some(&mut self.eta),
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
            unreachable!("AdaGrad keeps exactly one state tensor");
        };
        let lr = (step.lr_scale * self.eta) as TensorData;
        let eps = self.eps as TensorData;
        Zip::from(value).and(grad).and(s).for_each(|p, &g, s| {
            *s += g * g;
            *p -= lr * g / (s.sqrt() + eps);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, IxDyn};

    #[test]
    fn test_adagrad_shrinks_steps() {
        let rule = AdaGrad::new(0.1, 0.0);
        let mut value = arr1(&[1.0]).into_dyn();
        let grad = arr1(&[2.0]).into_dyn();
        let mut state = vec![ArrayD::zeros(IxDyn(&[1]))];
        let step = Step { lr_scale: 1.0, t: 1 };

        rule.apply(&step, &mut value, &grad, &mut state);
        assert!((state[0][[0]] - 4.0).abs() < 1e-6);
        assert!((value[[0]] - 0.9).abs() < 1e-6);

        rule.apply(&step, &mut value, &grad, &mut state);
        assert!((state[0][[0]] - 8.0).abs() < 1e-6);
        let expected = 0.9 - 0.2 / 8.0f32.sqrt();
        assert!((value[[0]] - expected).abs() < 1e-6);
    }
}
