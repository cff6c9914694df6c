//! # Trainer Checkpoints
//!
//! Saving and loading trainer state: every config key plus the auxiliary
//! state of each parameter, addressed by [`ParamId`]. Uses `serde` for
//! serialization and `bincode` as the binary format.

use bincode::Options;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Result, TrainerError};
use crate::optim::trainer::AuxState;
use crate::optim::{Algorithm, FloatConfigs, ParamId, Trainer, UintConfigs};
use crate::tensor::TensorData;

pub const FORMAT_MAJOR: u32 = 1;
pub const FORMAT_MINOR: u32 = 0;

const KIND_TRAINER: &str = "trainer";

// --- Serializable Tensor Wrapper ---

#[derive(Serialize, Deserialize, Debug)]
struct SerializableTensor {
    shape: Vec<usize>,
    // Flat row-major data
    data: Vec<TensorData>,
}

impl SerializableTensor {
    fn from_ndarray(array: &ndarray::ArrayD<TensorData>) -> Self {
        SerializableTensor {
            shape: array.shape().to_vec(),
            data: array.iter().cloned().collect(),
        }
    }

    fn into_ndarray(self) -> Result<ndarray::ArrayD<TensorData>> {
        Ok(ndarray::ArrayD::from_shape_vec(
            ndarray::IxDyn(&self.shape),
            self.data,
        )?)
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct StateRecord {
    id: ParamId,
    state: Vec<SerializableTensor>,
}

/// Leading fields of every checkpoint, readable without the body.
#[derive(Serialize, Deserialize, Debug)]
struct Header {
    major: u32,
    minor: u32,
    kind: String,
    name: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct Checkpoint {
    header: Header,
    uint_configs: UintConfigs,
    float_configs: FloatConfigs,
    records: Vec<StateRecord>,
}

// --- Save Function ---

/// Saves the configs and auxiliary state of `trainer` to `path`.
pub fn save_state<P: AsRef<Path>>(trainer: &Trainer, path: P) -> Result<()> {
    let (uint_configs, float_configs) = trainer.get_configs();
    let records: Vec<StateRecord> = trainer
        .state_records()
        .into_iter()
        .map(|(id, state)| StateRecord {
            id,
            state: state.iter().map(SerializableTensor::from_ndarray).collect(),
        })
        .collect();

    let checkpoint = Checkpoint {
        header: Header {
            major: FORMAT_MAJOR,
            minor: FORMAT_MINOR,
            kind: KIND_TRAINER.to_string(),
            name: trainer.name().to_string(),
        },
        uint_configs,
        float_configs,
        records,
    };

    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    codec().serialize_into(&mut writer, &checkpoint)?;
    writer.flush()?;
    info!(
        "Saved {} trainer state ({} state records) to {}",
        trainer.name(),
        checkpoint.records.len(),
        path.as_ref().display()
    );
    Ok(())
}

// --- Load Functions ---

/// Reads the algorithm name recorded in a checkpoint.
pub fn detect_name<P: AsRef<Path>>(path: P) -> Result<String> {
    let header: Header = decode_file(path.as_ref())?;
    check_header(&header)?;
    Ok(header.name)
}

/// Restores configs and auxiliary state into an existing trainer of the
/// same algorithm.
///
/// With `strict`, a state record whose parameter is not registered is an
/// error ([`TrainerError::UnknownParameter`]); otherwise such records are
/// skipped with a warning. Registered parameters without a record start
/// from fresh state. Nothing is modified unless the whole checkpoint is
/// accepted.
pub fn load_state<P: AsRef<Path>>(trainer: &mut Trainer, path: P, strict: bool) -> Result<()> {
    let checkpoint = read_checkpoint(path.as_ref())?;
    if checkpoint.header.name != trainer.name() {
        return Err(TrainerError::AlgorithmMismatch {
            expected: trainer.name().to_string(),
            found: checkpoint.header.name,
        });
    }

    let registered = trainer.parameter_ids();
    let mut records = into_states(checkpoint.records)?;
    let unmatched: Vec<ParamId> = records
        .keys()
        .filter(|id| !registered.contains(*id))
        .copied()
        .collect();
    for id in unmatched {
        if strict {
            return Err(TrainerError::UnknownParameter(id));
        }
        warn!(
            "State for parameter {} found in {} but not registered with the trainer. Skipping.",
            id,
            path.as_ref().display()
        );
        records.remove(&id);
    }

    // Configs are checked on a scratch trainer so that a rejected key
    // cannot leave the state replaced but the configs stale.
    let mut scratch = Trainer::new(trainer.algorithm().clone());
    scratch.set_configs(&checkpoint.uint_configs, &checkpoint.float_configs)?;

    trainer.replace_states(records, false)?;
    trainer.set_configs(&checkpoint.uint_configs, &checkpoint.float_configs)?;
    info!(
        "Loaded {} trainer state from {} (epoch {})",
        trainer.name(),
        path.as_ref().display(),
        trainer.epoch()
    );
    Ok(())
}

/// Builds a new trainer from a checkpoint. No parameters are registered;
/// the recorded state is attached as parameters are added, ids being
/// assigned from zero in registration order.
pub fn load_trainer<P: AsRef<Path>>(path: P) -> Result<Trainer> {
    let checkpoint = read_checkpoint(path.as_ref())?;
    let mut trainer = Trainer::new(Algorithm::from_name(&checkpoint.header.name)?);
    trainer.set_configs(&checkpoint.uint_configs, &checkpoint.float_configs)?;
    trainer.replace_states(into_states(checkpoint.records)?, true)?;
    info!(
        "Loaded {} trainer from {} (epoch {})",
        trainer.name(),
        path.as_ref().display(),
        trainer.epoch()
    );
    Ok(trainer)
}

fn read_checkpoint(path: &Path) -> Result<Checkpoint> {
    let checkpoint: Checkpoint = decode_file(path)?;
    check_header(&checkpoint.header)?;
    Ok(checkpoint)
}

/// Fixed-width little-endian encoding, same layout as `bincode::serialize`.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Decodes a value from the start of a file. Reads are capped at the file
/// size, so a corrupt length prefix fails instead of allocating.
fn decode_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let limit = file.metadata()?.len();
    let value = codec()
        .with_limit(limit)
        .deserialize_from(BufReader::new(file))?;
    Ok(value)
}

fn check_header(header: &Header) -> Result<()> {
    if header.major != FORMAT_MAJOR || header.minor > FORMAT_MINOR {
        return Err(TrainerError::UnsupportedFormat(format!(
            "version {}.{} (supported: {}.{})",
            header.major, header.minor, FORMAT_MAJOR, FORMAT_MINOR
        )));
    }
    if header.kind != KIND_TRAINER {
        return Err(TrainerError::UnsupportedFormat(format!(
            "expected a {} file, found '{}'",
            KIND_TRAINER, header.kind
        )));
    }
    Ok(())
}

fn into_states(records: Vec<StateRecord>) -> Result<BTreeMap<ParamId, AuxState>> {
    records
        .into_iter()
        .map(|record| {
            let state = record
                .state
                .into_iter()
                .map(SerializableTensor::into_ndarray)
                .collect::<Result<AuxState>>()?;
            Ok((record.id, state))
        })
        .collect()
}
