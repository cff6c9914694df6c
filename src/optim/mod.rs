//! # Optimization Algorithms (`optim`)
//!
//! A [`Trainer`] drives one of a closed set of update rules
//! ([`Algorithm`]) over the parameters registered with it. Each rule is a
//! plain hyperparameter struct implementing [`UpdateRule`]; the trainer
//! owns the shared lifecycle (epoch, clipping, L2, learning-rate scale) and
//! the per-parameter auxiliary state.

use ndarray::{ArrayD, IxDyn};

use crate::error::{Result, TrainerError};
use crate::tensor::TensorData;

// --- Submodules ---
pub mod config;
pub mod trainer;
pub mod sgd;
pub mod momentum_sgd;
pub mod adagrad;
pub mod rmsprop;
pub mod adadelta;
pub mod adam;

// Re-export optimizers
pub use config::{FloatConfigs, TrainerConfig, UintConfigs};
pub use trainer::{ParamId, Trainer};
pub use sgd::SGD;
pub use momentum_sgd::MomentumSGD;
pub use adagrad::AdaGrad;
pub use rmsprop::RMSProp;
pub use adadelta::AdaDelta;
pub use adam::Adam;

/// Values of the shared trainer state an update rule may depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    /// Global learning-rate multiplier (`Trainer.lr_scale`).
    pub lr_scale: f64,
    /// 1-based index of the update being performed (`epoch + 1`).
    pub t: u32,
}

// --- UpdateRule Trait ---

/// Per-algorithm behaviour: identity, hyperparameters and the element-wise
/// update formula.
pub trait UpdateRule {
    /// Stable identifier, also the owner prefix of the rule's config keys.
    const NAME: &'static str;

    /// Names of the auxiliary tensors kept per parameter. Each has the shape
    /// of the parameter and starts at zero.
    const STATE: &'static [&'static str];

    /// All hyperparameters as fully qualified `(key, value)` pairs.
    fn hyperparameters(&self) -> Vec<(&'static str, f64)>;

    /// Mutable access to one hyperparameter by fully qualified key.
    fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64>;

    /// Applies one update to `value` given the (already regularized and
    /// clipped) gradient. `state` holds `STATE.len()` tensors shaped like
    /// `value`.
    fn apply(
        &self,
        step: &Step,
        value: &mut ArrayD<TensorData>,
        grad: &ArrayD<TensorData>,
        state: &mut [ArrayD<TensorData>],
    );
}

// --- Algorithm ---

/// The update rule driven by a [`Trainer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Algorithm {
    SGD(SGD),
    MomentumSGD(MomentumSGD),
    AdaGrad(AdaGrad),
    RMSProp(RMSProp),
    AdaDelta(AdaDelta),
    Adam(Adam),
}

macro_rules! dispatch {
    ($algorithm:expr, $rule:ident => $body:expr) => {
        match $algorithm {
            Algorithm::SGD($rule) => $body,
            Algorithm::MomentumSGD($rule) => $body,
            Algorithm::AdaGrad($rule) => $body,
            Algorithm::RMSProp($rule) => $body,
            Algorithm::AdaDelta($rule) => $body,
            Algorithm::Adam($rule) => $body,
        }
    };
}

fn name_of<R: UpdateRule>(_: &R) -> &'static str {
    R::NAME
}

fn state_of<R: UpdateRule>(_: &R) -> &'static [&'static str] {
    R::STATE
}

impl Algorithm {
    /// Every algorithm name, in declaration order.
    pub const NAMES: [&'static str; 6] = [
        sgd::NAME,
        momentum_sgd::NAME,
        adagrad::NAME,
        rmsprop::NAME,
        adadelta::NAME,
        adam::NAME,
    ];

    /// Builds the algorithm called `name` with default hyperparameters.
    pub fn from_name(name: &str) -> Result<Self> {
        let algorithm = match name {
            sgd::NAME => SGD::default().into(),
            momentum_sgd::NAME => MomentumSGD::default().into(),
            adagrad::NAME => AdaGrad::default().into(),
            rmsprop::NAME => RMSProp::default().into(),
            adadelta::NAME => AdaDelta::default().into(),
            adam::NAME => Adam::default().into(),
            other => return Err(TrainerError::UnknownAlgorithm(other.to_string())),
        };
        Ok(algorithm)
    }

    pub fn name(&self) -> &'static str {
        dispatch!(self, rule => name_of(rule))
    }

    pub fn state_names(&self) -> &'static [&'static str] {
        dispatch!(self, rule => state_of(rule))
    }

    pub fn hyperparameters(&self) -> Vec<(&'static str, f64)> {
        dispatch!(self, rule => rule.hyperparameters())
    }

    pub fn hyperparameter_mut(&mut self, key: &str) -> Option<&mut f64> {
        dispatch!(self, rule => rule.hyperparameter_mut(key))
    }

    /// Fresh auxiliary state for a parameter of the given shape.
    pub fn initial_state(&self, shape: &[usize]) -> Vec<ArrayD<TensorData>> {
        self.state_names()
            .iter()
            .map(|_| ArrayD::zeros(IxDyn(shape)))
            .collect()
    }

    pub fn apply(
        &self,
        step: &Step,
        value: &mut ArrayD<TensorData>,
        grad: &ArrayD<TensorData>,
        state: &mut [ArrayD<TensorData>],
    ) {
        dispatch!(self, rule => rule.apply(step, value, grad, state))
    }
}

macro_rules! impl_from_rule {
    ($($rule:ident),*) => {
        $(
            impl From<$rule> for Algorithm {
                fn from(rule: $rule) -> Self {
                    Algorithm::$rule(rule)
                }
            }
        )*
    };
}

impl_from_rule!(SGD, MomentumSGD, AdaGrad, RMSProp, AdaDelta, Adam);
