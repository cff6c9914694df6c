//! # Trainer Configuration
//!
//! Configurations travel as two flat maps keyed by `"<Owner>.<field>"`:
//! unsigned integers (counters) and floats (hyperparameters). Internally
//! every field lives in a typed struct; this module holds the shared
//! `Trainer.*` fields and the map types.

use std::collections::BTreeMap;

use crate::error::{Result, TrainerError};

/// Integer-valued configs, e.g. `"Trainer.epoch"`.
pub type UintConfigs = BTreeMap<String, u32>;
/// Float-valued configs, e.g. `"Adam.beta1"`.
pub type FloatConfigs = BTreeMap<String, f64>;

pub const EPOCH: &str = "Trainer.epoch";
pub const CLIP_THRESHOLD: &str = "Trainer.clip_threshold";
pub const LR_SCALE: &str = "Trainer.lr_scale";
pub const L2_STRENGTH: &str = "Trainer.l2_strength";

/// Fields shared by every trainer regardless of algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerConfig {
    /// Number of completed updates. Defaults to `0`.
    pub epoch: u32,
    /// Global gradient norm threshold, `0` disables clipping. Defaults to `0`.
    pub clip_threshold: f64,
    /// Multiplier applied to every learning rate. Defaults to `1`.
    pub lr_scale: f64,
    /// L2 regularization strength. Defaults to `0`.
    pub l2_strength: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epoch: 0,
            clip_threshold: 0.0,
            lr_scale: 1.0,
            l2_strength: 0.0,
        }
    }
}

impl TrainerConfig {
    pub(crate) fn export(&self, uint_configs: &mut UintConfigs, float_configs: &mut FloatConfigs) {
        uint_configs.insert(EPOCH.to_string(), self.epoch);
        float_configs.insert(CLIP_THRESHOLD.to_string(), self.clip_threshold);
        float_configs.insert(LR_SCALE.to_string(), self.lr_scale);
        float_configs.insert(L2_STRENGTH.to_string(), self.l2_strength);
    }

    pub(crate) fn uint_field_mut(&mut self, key: &str) -> Option<&mut u32> {
        match key {
            EPOCH => Some(&mut self.epoch),
            _ => None,
        }
    }

    pub(crate) fn float_field_mut(&mut self, key: &str) -> Option<&mut f64> {
        match key {
            CLIP_THRESHOLD => Some(&mut self.clip_threshold),
            LR_SCALE => Some(&mut self.lr_scale),
            L2_STRENGTH => Some(&mut self.l2_strength),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (key, value) in [
            (CLIP_THRESHOLD, self.clip_threshold),
            (L2_STRENGTH, self.l2_strength),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(TrainerError::InvalidConfigValue {
                    key: key.to_string(),
                    value,
                });
            }
        }
        // Negative scales are allowed, non-finite ones would poison every update.
        if !self.lr_scale.is_finite() {
            return Err(TrainerError::InvalidConfigValue {
                key: LR_SCALE.to_string(),
                value: self.lr_scale,
            });
        }
        Ok(())
    }
}
