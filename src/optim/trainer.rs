//! # Trainer
//!
//! Shared lifecycle of every optimizer: parameter registration, the flat
//! configuration protocol and the update pipeline (L2 regularization,
//! global gradient clipping, the algorithm's rule, epoch bookkeeping).

use log::{debug, trace};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::config::{FloatConfigs, TrainerConfig, UintConfigs};
use super::{Algorithm, Step};
use crate::error::{Result, TrainerError};
use crate::tensor::{Parameter, TensorData};
use crate::utils::serialization;

/// Stable handle of a registered parameter, assigned by
/// [`Trainer::add_parameter`] in registration order and never reused by the
/// same trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u64);

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Auxiliary tensors of one parameter, ordered as [`Algorithm::state_names`].
pub type AuxState = Vec<ArrayD<TensorData>>;

#[derive(Debug)]
struct ParamSlot {
    id: ParamId,
    param: Parameter,
    // Allocated on the first update that touches this parameter.
    state: Option<AuxState>,
}

/// Working copy of one parameter during `update()`.
struct Staged {
    index: usize,
    value: ArrayD<TensorData>,
    grad: ArrayD<TensorData>,
}

/// A gradient-based optimizer.
///
/// ```rust
/// use rtrainer::optim::{Adam, Trainer};
/// use rtrainer::tensor::Parameter;
///
/// let mut trainer = Trainer::new(Adam::default());
/// let w = Parameter::from_vec(&[2], vec![0.5, -0.5]).unwrap();
/// trainer.add_parameter(&w).unwrap();
///
/// w.reset_gradient();
/// trainer.update().unwrap();
/// assert_eq!(trainer.epoch(), 1);
/// ```
#[derive(Debug)]
pub struct Trainer {
    shared: TrainerConfig,
    algorithm: Algorithm,
    slots: Vec<ParamSlot>,
    next_id: u64,
    // Restored state whose parameter has not been registered yet.
    pending: BTreeMap<ParamId, AuxState>,
}

impl Trainer {
    /// Creates a trainer with default shared settings.
    pub fn new<A: Into<Algorithm>>(algorithm: A) -> Self {
        Trainer {
            shared: TrainerConfig::default(),
            algorithm: algorithm.into(),
            slots: Vec::new(),
            next_id: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Algorithm identifier, e.g. `"Adam"`.
    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    /// Direct access to the typed hyperparameters. Switching to another
    /// variant is not allowed; use a new trainer instead.
    pub fn algorithm_mut(&mut self) -> &mut Algorithm {
        &mut self.algorithm
    }

    pub fn shared_config(&self) -> &TrainerConfig {
        &self.shared
    }

    // --- Typed accessors for the shared fields ---

    pub fn epoch(&self) -> u32 {
        self.shared.epoch
    }

    pub fn set_epoch(&mut self, epoch: u32) {
        self.shared.epoch = epoch;
    }

    pub fn lr_scale(&self) -> f64 {
        self.shared.lr_scale
    }

    pub fn set_lr_scale(&mut self, scale: f64) -> Result<()> {
        self.set_float_config(super::config::LR_SCALE, scale)
    }

    pub fn l2_strength(&self) -> f64 {
        self.shared.l2_strength
    }

    pub fn set_l2_strength(&mut self, strength: f64) -> Result<()> {
        self.set_float_config(super::config::L2_STRENGTH, strength)
    }

    pub fn clip_threshold(&self) -> f64 {
        self.shared.clip_threshold
    }

    pub fn set_clip_threshold(&mut self, threshold: f64) -> Result<()> {
        self.set_float_config(super::config::CLIP_THRESHOLD, threshold)
    }

    // --- Configuration protocol ---

    /// Every config key with its current value.
    pub fn get_configs(&self) -> (UintConfigs, FloatConfigs) {
        let mut uint_configs = UintConfigs::new();
        let mut float_configs = FloatConfigs::new();
        self.shared.export(&mut uint_configs, &mut float_configs);
        for (key, value) in self.algorithm.hyperparameters() {
            float_configs.insert(key.to_string(), value);
        }
        (uint_configs, float_configs)
    }

    /// Overwrites the given keys, leaving the others untouched.
    ///
    /// Fails with [`TrainerError::UnknownConfigKey`] if any key is not
    /// declared by this trainer in the map it was passed in, and with
    /// [`TrainerError::InvalidConfigValue`] for a negative clipping threshold
    /// or L2 strength. On failure nothing is applied.
    pub fn set_configs(&mut self, uint_configs: &UintConfigs, float_configs: &FloatConfigs) -> Result<()> {
        let mut shared = self.shared;
        let mut algorithm = self.algorithm.clone();

        for (key, &value) in uint_configs {
            let field = shared
                .uint_field_mut(key)
                .ok_or_else(|| TrainerError::UnknownConfigKey { key: key.clone() })?;
            *field = value;
        }
        for (key, &value) in float_configs {
            let field = match shared.float_field_mut(key) {
                Some(field) => field,
                None => algorithm
                    .hyperparameter_mut(key)
                    .ok_or_else(|| TrainerError::UnknownConfigKey { key: key.clone() })?,
            };
            *field = value;
        }
        shared.validate()?;

        self.shared = shared;
        self.algorithm = algorithm;
        Ok(())
    }

    pub fn get_uint_config(&self, key: &str) -> Option<u32> {
        self.get_configs().0.get(key).copied()
    }

    pub fn get_float_config(&self, key: &str) -> Option<f64> {
        self.get_configs().1.get(key).copied()
    }

    pub fn set_uint_config(&mut self, key: &str, value: u32) -> Result<()> {
        let uint_configs = UintConfigs::from([(key.to_string(), value)]);
        self.set_configs(&uint_configs, &FloatConfigs::new())
    }

    pub fn set_float_config(&mut self, key: &str, value: f64) -> Result<()> {
        let float_configs = FloatConfigs::from([(key.to_string(), value)]);
        self.set_configs(&UintConfigs::new(), &float_configs)
    }

    // --- Parameter registration ---

    /// Registers a parameter for optimization. Its auxiliary state is
    /// allocated on the first update, unless restored state is waiting for
    /// the assigned id.
    pub fn add_parameter(&mut self, param: &Parameter) -> Result<ParamId> {
        if let Some(slot) = self.slots.iter().find(|s| s.param.same_parameter(param)) {
            return Err(TrainerError::DuplicateParameter(slot.id));
        }
        let id = ParamId(self.next_id);
        let state = match self.pending.get(&id) {
            Some(state) => {
                check_state_shapes(id, self.algorithm.state_names().len(), param.shape(), state)?;
                self.pending.remove(&id)
            }
            None => None,
        };
        debug!(
            "{}: registered parameter {} with shape {:?}{}",
            self.name(),
            id,
            param.shape(),
            if state.is_some() { " (restored state)" } else { "" }
        );
        self.next_id += 1;
        self.slots.push(ParamSlot {
            id,
            param: param.clone(),
            state,
        });
        Ok(id)
    }

    pub fn add_parameters<'a, I>(&mut self, params: I) -> Result<Vec<ParamId>>
    where
        I: IntoIterator<Item = &'a Parameter>,
    {
        params.into_iter().map(|p| self.add_parameter(p)).collect()
    }

    /// Deregisters a parameter and drops its auxiliary state.
    pub fn remove_parameter(&mut self, id: ParamId) -> Result<Parameter> {
        let index = self.index_of(id)?;
        let slot = self.slots.remove(index);
        debug!("{}: removed parameter {}", self.name(), id);
        Ok(slot.param)
    }

    pub fn num_parameters(&self) -> usize {
        self.slots.len()
    }

    /// Registered ids in registration order.
    pub fn parameter_ids(&self) -> Vec<ParamId> {
        self.slots.iter().map(|s| s.id).collect()
    }

    pub fn parameter(&self, id: ParamId) -> Option<&Parameter> {
        self.slots.iter().find(|s| s.id == id).map(|s| &s.param)
    }

    /// Auxiliary state of a parameter, `None` until its first update.
    pub fn state(&self, id: ParamId) -> Option<&[ArrayD<TensorData>]> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| s.state.as_deref())
    }

    /// Sets every registered gradient to zero.
    pub fn reset_gradients(&self) {
        for slot in &self.slots {
            slot.param.reset_gradient();
        }
    }

    // --- Update ---

    /// Performs one optimization step over all registered parameters that
    /// hold a gradient, then increments the epoch.
    ///
    /// Either every parameter is updated and the epoch advances, or an error
    /// is returned and nothing observable has changed. The caller's
    /// gradients are left as they were.
    pub fn update(&mut self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(TrainerError::NoParametersRegistered);
        }
        let l2_strength = self.shared.l2_strength;
        let clip_threshold = self.shared.clip_threshold;

        let mut staged = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(mut grad) = slot.param.gradient() else {
                continue;
            };
            let value = slot.param.value_clone();
            check_finite(slot.id, "gradient", &grad)?;
            check_finite(slot.id, "parameter value", &value)?;
            if l2_strength > 0.0 {
                grad.scaled_add(l2_strength as TensorData, &value);
            }
            staged.push(Staged { index, value, grad });
        }

        if clip_threshold > 0.0 {
            let sq_norm: f64 = staged
                .iter()
                .flat_map(|s| s.grad.iter())
                .map(|&g| f64::from(g) * f64::from(g))
                .sum();
            if sq_norm > clip_threshold * clip_threshold {
                let clip_scale = (clip_threshold / sq_norm.sqrt()) as TensorData;
                debug!(
                    "{}: clipping gradients, norm {:.6} > {}",
                    self.name(),
                    sq_norm.sqrt(),
                    clip_threshold
                );
                for s in &mut staged {
                    s.grad *= clip_scale;
                }
            }
        }
        // L2 can overflow f32 even when every input is finite.
        for s in &staged {
            check_finite(self.slots[s.index].id, "working gradient", &s.grad)?;
        }

        let step = Step {
            lr_scale: self.shared.lr_scale,
            t: self.shared.epoch.saturating_add(1),
        };
        let num_states = self.algorithm.state_names().len();
        let mut committed = Vec::with_capacity(staged.len());
        for mut s in staged {
            let slot = &self.slots[s.index];
            let mut state = match &slot.state {
                Some(state) => {
                    check_state_shapes(slot.id, num_states, slot.param.shape(), state)?;
                    state.clone()
                }
                None => self.algorithm.initial_state(slot.param.shape()),
            };
            self.algorithm.apply(&step, &mut s.value, &s.grad, &mut state);
            check_finite(slot.id, "updated value", &s.value)?;
            for tensor in &state {
                check_finite(slot.id, "updated state", tensor)?;
            }
            committed.push((s.index, s.value, state));
        }

        trace!(
            "{}: epoch {} updated {} of {} parameters",
            self.name(),
            self.shared.epoch,
            committed.len(),
            self.slots.len()
        );
        for (index, value, state) in committed {
            let slot = &mut self.slots[index];
            *slot.param.value_mut() = value;
            slot.state = Some(state);
        }
        self.shared.epoch = self.shared.epoch.saturating_add(1);
        Ok(())
    }

    // --- Persistence ---

    /// Writes configs and all auxiliary state to `path`.
    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        serialization::save_state(self, path)
    }

    /// Restores configs and auxiliary state written by [`Trainer::save_state`].
    /// See [`serialization::load_state`] for the meaning of `strict`.
    pub fn load_state<P: AsRef<Path>>(&mut self, path: P, strict: bool) -> Result<()> {
        serialization::load_state(self, path, strict)
    }

    /// All stored auxiliary state by id, including restored state still
    /// waiting for its parameter.
    pub(crate) fn state_records(&self) -> Vec<(ParamId, &[ArrayD<TensorData>])> {
        let mut records: Vec<_> = self
            .slots
            .iter()
            .filter_map(|s| s.state.as_deref().map(|state| (s.id, state)))
            .chain(self.pending.iter().map(|(&id, state)| (id, state.as_slice())))
            .collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }

    /// Replaces all auxiliary state. Records for registered parameters are
    /// attached to them; the rest are kept until a parameter with that id is
    /// registered (`keep_unmatched`) or dropped.
    pub(crate) fn replace_states(
        &mut self,
        mut records: BTreeMap<ParamId, AuxState>,
        keep_unmatched: bool,
    ) -> Result<()> {
        let num_states = self.algorithm.state_names().len();
        for (id, state) in &records {
            let shape = match self.slots.iter().find(|s| s.id == *id) {
                Some(slot) => slot.param.shape(),
                None => match state.first() {
                    Some(first) => first.shape(),
                    None => &[],
                },
            };
            check_state_shapes(*id, num_states, shape, state)?;
        }
        for slot in &mut self.slots {
            slot.state = records.remove(&slot.id);
        }
        self.pending = if keep_unmatched { records } else { BTreeMap::new() };
        Ok(())
    }

    fn index_of(&self, id: ParamId) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.id == id)
            .ok_or(TrainerError::UnknownParameter(id))
    }
}

fn check_finite(id: ParamId, what: &'static str, array: &ArrayD<TensorData>) -> Result<()> {
    if array.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(TrainerError::NumericDegenerate { id, what })
    }
}

fn check_state_shapes(id: ParamId, num_states: usize, shape: &[usize], state: &[ArrayD<TensorData>]) -> Result<()> {
    if state.len() != num_states {
        return Err(TrainerError::ShapeMismatch {
            what: format!("number of state tensors of parameter {}", id),
            expected: vec![num_states],
            got: vec![state.len()],
        });
    }
    for tensor in state {
        if tensor.shape() != shape {
            return Err(TrainerError::ShapeMismatch {
                what: format!("state of parameter {}", id),
                expected: shape.to_vec(),
                got: tensor.shape().to_vec(),
            });
        }
    }
    Ok(())
}
