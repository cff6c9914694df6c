//! # Error Handling
//!
//! A single error enum covers configuration, registration, update and
//! checkpoint failures. Every fallible operation in the crate returns
//! [`Result`].

use crate::optim::ParamId;

#[derive(thiserror::Error, Debug)]
pub enum TrainerError {
    #[error("Unknown trainer config key: '{key}'")]
    UnknownConfigKey { key: String },

    #[error("Invalid value for config key '{key}': {value}")]
    InvalidConfigValue { key: String, value: f64 },

    #[error("update() called with no registered parameters")]
    NoParametersRegistered,

    #[error("Shape mismatch for {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Non-finite {what} detected for parameter {id}")]
    NumericDegenerate { id: ParamId, what: &'static str },

    #[error("Parameter is already registered as {0}")]
    DuplicateParameter(ParamId),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(ParamId),

    #[error("Unknown trainer algorithm: '{0}'")]
    UnknownAlgorithm(String),

    #[error("Checkpoint was written by '{found}', cannot load it into '{expected}'")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("Unsupported checkpoint format: {0}")]
    UnsupportedFormat(String),

    #[error("Gradient aggregation received no replicas")]
    NoReplicas,

    #[error("ndarray error: {0}")]
    Ndarray(#[from] ndarray::ShapeError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error (Bincode): {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
