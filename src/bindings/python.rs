//! # Python Bindings for RTrainer (`rtrainer`)
//!
//! Exposes the trainers to Python through PyO3. Each algorithm is a
//! subclass of `rtrainer.Trainer`. Parameters cross the boundary as flat
//! row-major lists of floats:
//!
//! ```python
//! import rtrainer
//! t = rtrainer.Adam()
//! assert t.name() == "Adam"
//! t.set_configs({"Trainer.epoch": 1}, {"Adam.alpha": 0.0})
//! uint_configs, float_configs = t.get_configs()
//!
//! w = rtrainer.Parameter([2], [0.5, -0.5])
//! t.add_parameter(w)
//! w.set_gradient([1.0, 1.0])
//! t.update()
//! ```

use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::error::TrainerError;
use crate::optim::{
    AdaDelta, AdaGrad, Adam, Algorithm, FloatConfigs, MomentumSGD, RMSProp, Trainer, UintConfigs,
    SGD,
};
use crate::tensor::{Parameter, TensorData};
use crate::utils::serialization;

// --- Helper to Convert Rust Errors to Python Exceptions ---

impl From<TrainerError> for PyErr {
    fn from(err: TrainerError) -> PyErr {
        let message = err.to_string();
        match err {
            TrainerError::UnknownConfigKey { .. } | TrainerError::UnknownParameter(_) => {
                PyKeyError::new_err(message)
            }
            TrainerError::InvalidConfigValue { .. }
            | TrainerError::ShapeMismatch { .. }
            | TrainerError::UnknownAlgorithm(_)
            | TrainerError::AlgorithmMismatch { .. }
            | TrainerError::UnsupportedFormat(_)
            | TrainerError::Ndarray(_) => PyValueError::new_err(message),
            TrainerError::Io(_) | TrainerError::Bincode(_) => PyIOError::new_err(message),
            TrainerError::NoParametersRegistered
            | TrainerError::NumericDegenerate { .. }
            | TrainerError::DuplicateParameter(_)
            | TrainerError::NoReplicas => PyRuntimeError::new_err(message),
        }
    }
}

// --- Parameter (`rtrainer.Parameter`) ---

#[pyclass(name = "Parameter", module = "rtrainer")]
pub struct PyParameter {
    inner: Parameter,
}

#[pymethods]
impl PyParameter {
    #[new]
    fn new(shape: Vec<usize>, values: Vec<TensorData>) -> PyResult<Self> {
        Ok(PyParameter {
            inner: Parameter::from_vec(&shape, values)?,
        })
    }

    fn shape(&self) -> Vec<usize> {
        self.inner.shape().to_vec()
    }

    fn value(&self) -> Vec<TensorData> {
        self.inner.to_vec()
    }

    /// The gradient as a flat list, or `None` if none has been set.
    fn gradient(&self) -> Option<Vec<TensorData>> {
        self.inner.gradient().map(|g| g.iter().copied().collect())
    }

    fn set_gradient(&self, values: Vec<TensorData>) -> PyResult<()> {
        Ok(self.inner.set_gradient_from_vec(values)?)
    }

    fn reset_gradient(&self) {
        self.inner.reset_gradient();
    }

    fn __repr__(&self) -> String {
        format!("Parameter(shape={:?})", self.inner.shape())
    }
}

// --- Trainer Base Class (`rtrainer.Trainer`) ---

#[pyclass(name = "Trainer", subclass, module = "rtrainer")]
pub struct PyTrainer {
    inner: Trainer,
}

impl PyTrainer {
    fn wrap<A: Into<Algorithm>>(algorithm: A) -> Self {
        PyTrainer {
            inner: Trainer::new(algorithm),
        }
    }
}

#[pymethods]
impl PyTrainer {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    /// Returns `(uint_configs, float_configs)` as two dicts.
    fn get_configs(&self) -> (UintConfigs, FloatConfigs) {
        self.inner.get_configs()
    }

    fn set_configs(&mut self, uint_configs: UintConfigs, float_configs: FloatConfigs) -> PyResult<()> {
        Ok(self.inner.set_configs(&uint_configs, &float_configs)?)
    }

    fn get_epoch(&self) -> u32 {
        self.inner.epoch()
    }

    fn set_epoch(&mut self, epoch: u32) {
        self.inner.set_epoch(epoch);
    }

    fn get_learning_rate_scaling(&self) -> f64 {
        self.inner.lr_scale()
    }

    fn set_learning_rate_scaling(&mut self, scale: f64) -> PyResult<()> {
        Ok(self.inner.set_lr_scale(scale)?)
    }

    fn get_weight_decay(&self) -> f64 {
        self.inner.l2_strength()
    }

    fn set_weight_decay(&mut self, strength: f64) -> PyResult<()> {
        Ok(self.inner.set_l2_strength(strength)?)
    }

    fn get_gradient_clipping(&self) -> f64 {
        self.inner.clip_threshold()
    }

    fn set_gradient_clipping(&mut self, threshold: f64) -> PyResult<()> {
        Ok(self.inner.set_clip_threshold(threshold)?)
    }

    /// Registers a parameter and returns its id.
    fn add_parameter(&mut self, param: PyRef<'_, PyParameter>) -> PyResult<u64> {
        Ok(self.inner.add_parameter(&param.inner)?.0)
    }

    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn reset_gradients(&self) {
        self.inner.reset_gradients();
    }

    fn update(&mut self) -> PyResult<()> {
        Ok(self.inner.update()?)
    }

    fn save(&self, path: PathBuf) -> PyResult<()> {
        Ok(self.inner.save_state(path)?)
    }

    #[pyo3(signature = (path, strict = true))]
    fn load(&mut self, path: PathBuf, strict: bool) -> PyResult<()> {
        Ok(self.inner.load_state(path, strict)?)
    }

    fn __repr__(&self) -> String {
        format!("{}(epoch={})", self.inner.name(), self.inner.epoch())
    }
}

// --- Algorithm Subclasses ---

#[pyclass(name = "SGD", extends = PyTrainer, module = "rtrainer")]
pub struct PySGD;

#[pymethods]
impl PySGD {
    #[new]
    #[pyo3(signature = (eta = 0.1))]
    fn new(eta: f64) -> (Self, PyTrainer) {
        (PySGD, PyTrainer::wrap(SGD::new(eta)))
    }
}

#[pyclass(name = "MomentumSGD", extends = PyTrainer, module = "rtrainer")]
pub struct PyMomentumSGD;

#[pymethods]
impl PyMomentumSGD {
    #[new]
    #[pyo3(signature = (eta = 0.01, momentum = 0.9))]
    fn new(eta: f64, momentum: f64) -> (Self, PyTrainer) {
        (PyMomentumSGD, PyTrainer::wrap(MomentumSGD::new(eta, momentum)))
    }
}

#[pyclass(name = "AdaGrad", extends = PyTrainer, module = "rtrainer")]
pub struct PyAdaGrad;

#[pymethods]
impl PyAdaGrad {
    #[new]
    #[pyo3(signature = (eta = 0.001, eps = 1e-8))]
    fn new(eta: f64, eps: f64) -> (Self, PyTrainer) {
        (PyAdaGrad, PyTrainer::wrap(AdaGrad::new(eta, eps)))
    }
}

#[pyclass(name = "RMSProp", extends = PyTrainer, module = "rtrainer")]
pub struct PyRMSProp;

#[pymethods]
impl PyRMSProp {
    #[new]
    #[pyo3(signature = (eta = 0.01, alpha = 0.9, eps = 1e-8))]
    fn new(eta: f64, alpha: f64, eps: f64) -> (Self, PyTrainer) {
        (PyRMSProp, PyTrainer::wrap(RMSProp::new(eta, alpha, eps)))
    }
}

#[pyclass(name = "AdaDelta", extends = PyTrainer, module = "rtrainer")]
pub struct PyAdaDelta;

#[pymethods]
impl PyAdaDelta {
    #[new]
    #[pyo3(signature = (rho = 0.95, eps = 1e-6))]
    fn new(rho: f64, eps: f64) -> (Self, PyTrainer) {
        (PyAdaDelta, PyTrainer::wrap(AdaDelta::new(rho, eps)))
    }
}

#[pyclass(name = "Adam", extends = PyTrainer, module = "rtrainer")]
pub struct PyAdam;

#[pymethods]
impl PyAdam {
    #[new]
    #[pyo3(signature = (alpha = 0.001, beta1 = 0.9, beta2 = 0.999, eps = 1e-8))]
    fn new(alpha: f64, beta1: f64, beta2: f64, eps: f64) -> (Self, PyTrainer) {
        (PyAdam, PyTrainer::wrap(Adam::new(alpha, beta1, beta2, eps)))
    }
}

// --- Module Functions ---

/// Name of the algorithm stored in a trainer file.
#[pyfunction]
fn detect_name(path: PathBuf) -> PyResult<String> {
    Ok(serialization::detect_name(path)?)
}

#[pymodule]
fn rtrainer(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyParameter>()?;
    m.add_class::<PyTrainer>()?;
    m.add_class::<PySGD>()?;
    m.add_class::<PyMomentumSGD>()?;
    m.add_class::<PyAdaGrad>()?;
    m.add_class::<PyRMSProp>()?;
    m.add_class::<PyAdaDelta>()?;
    m.add_class::<PyAdam>()?;
    m.add_function(wrap_pyfunction!(detect_name, m)?)?;
    Ok(())
}
