//! # Parallelism Utilities (CPU Threading)
//!
//! Data-parallel replicas compute gradients for the same parameter list on
//! different shards of a batch. Their gradients are reduced here, in
//! parallel over parameters with `rayon`, before a single-threaded
//! `Trainer::update()`.

use ndarray::ArrayD;
use rayon::prelude::*;

use crate::error::{Result, TrainerError};
use crate::tensor::{Parameter, TensorData};

/// Averages gradients element-wise across replicas.
///
/// `replicas[r][i]` is replica `r`'s gradient for parameter `i`; every
/// replica must list the same number of gradients with matching shapes.
/// Replicas are summed in order, so the result does not depend on thread
/// scheduling.
pub fn average_gradients(replicas: &[Vec<ArrayD<TensorData>>]) -> Result<Vec<ArrayD<TensorData>>> {
    let (first, rest) = replicas.split_first().ok_or(TrainerError::NoReplicas)?;
    for replica in rest {
        if replica.len() != first.len() {
            return Err(TrainerError::ShapeMismatch {
                what: "number of replica gradients".to_string(),
                expected: vec![first.len()],
                got: vec![replica.len()],
            });
        }
    }
    let count = replicas.len() as TensorData;

    first
        .par_iter()
        .enumerate()
        .map(|(i, grad)| {
            let mut total = grad.clone();
            for replica in rest {
                let other = &replica[i];
                if other.shape() != grad.shape() {
                    return Err(TrainerError::ShapeMismatch {
                        what: format!("replica gradient {}", i),
                        expected: grad.shape().to_vec(),
                        got: other.shape().to_vec(),
                    });
                }
                total += other;
            }
            total /= count;
            Ok(total)
        })
        .collect()
}

/// Averages replica gradients and stores the result as the gradient of
/// `params` (one gradient per parameter, in the same order).
pub fn aggregate_gradients(params: &[Parameter], replicas: &[Vec<ArrayD<TensorData>>]) -> Result<()> {
    let averaged = average_gradients(replicas)?;
    if averaged.len() != params.len() {
        return Err(TrainerError::ShapeMismatch {
            what: "number of parameters".to_string(),
            expected: vec![params.len()],
            got: vec![averaged.len()],
        });
    }
    // Check every shape first so a mismatch leaves all gradients untouched.
    for (param, grad) in params.iter().zip(&averaged) {
        if param.shape() != grad.shape() {
            return Err(TrainerError::ShapeMismatch {
                what: "aggregated gradient".to_string(),
                expected: param.shape().to_vec(),
                got: grad.shape().to_vec(),
            });
        }
    }
    for (param, grad) in params.iter().zip(averaged) {
        param.set_gradient(grad)?;
    }
    Ok(())
}
