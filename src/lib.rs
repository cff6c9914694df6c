//! # RTrainer Core Library
//!
//! Gradient-based trainers for neural-network parameters: SGD,
//! MomentumSGD, AdaGrad, RMSProp, AdaDelta and Adam. Every trainer exposes
//! the same configuration protocol, a pair of flat maps keyed by
//! `"<Owner>.<field>"` (`"Trainer.epoch"`, `"Adam.beta1"`, ...), and the
//! same update pipeline over the parameters registered with it.
//!
//! The crate does not compute gradients; whoever owns the model fills in
//! [`tensor::Parameter`] gradients and calls [`optim::Trainer::update`].

pub mod error;
pub mod tensor;
pub mod optim;
pub mod utils;
pub mod bindings;

pub mod prelude {
    pub use crate::error::{Result, TrainerError};
    pub use crate::optim::{
        AdaDelta, AdaGrad, Adam, Algorithm, FloatConfigs, MomentumSGD, ParamId, RMSProp, Trainer,
        UintConfigs, UpdateRule, SGD,
    };
    pub use crate::tensor::Parameter;
}
