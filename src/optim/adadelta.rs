//! # AdaDelta Optimizer

use ndarray::{ArrayD, Zip};

use super::{Step, UpdateRule};
use crate::tensor::TensorData;

pub const NAME: &str = "AdaDelta";
pub const RHO: &str = "AdaDelta.rho";
pub const EPS: &str = "AdaDelta.eps";

/// Implements the AdaDelta algorithm.
/// Reference: ADADELTA: An Adaptive Learning Rate Method - https://arxiv.org/abs/1212.5701
///
/// Two accumulators are kept per parameter, squared gradients `s` and
/// squared updates `u`:
///
/// ```text
/// s = rho * s + (1 - rho) * g * g
/// d = -sqrt(u + eps) / sqrt(s + eps) * g
/// u = rho * u + (1 - rho) * d * d
/// p += lr_scale * d
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaDelta {
    /// Decay factor of both accumulators. Defaults to `0.95`.
    pub rho: f64,
    /// Defaults to `1e-6`.
    pub eps: f64,
}

impl Default for AdaDelta {
    fn default() -> Self {
        Self {
            rho: 0.95,
            eps: 1e-6,
        }
    }
}

impl AdaDelta {
    pub fn new(rho: f64, eps: f64) -> Self {
        Self { rho, eps }
    }
}

impl UpdateRule for AdaDelta {
    const NAME: &'static str = NAME;
    const STATE: &'static [&'static str] = &["s", "u"];

    fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        vec![(RHO, self.rho), (EPS, self.eps)]
    }

    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            RHO => Some(&mut self.rho),
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
        let [s, u] = state else {
            unreachable!("AdaDelta keeps exactly two state tensors");
        };
        let rho = self.rho as TensorData;
        let eps = self.eps as TensorData;
        let scale = step.lr_scale as TensorData;
        Zip::from(value)
            .and(grad)
            .and(s)
            .and(u)
            .for_each(|p, &g, s, u| {
                *s = rho * *s + (1.0 - rho) * g * g;
                let d = -(*u + eps).sqrt() / (*s + eps).sqrt() * g;
                *u = rho * *u + (1.0 - rho) * d * d;
                *p += scale * d;
            });
    }
}
