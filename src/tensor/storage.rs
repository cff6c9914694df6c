//! # Tensor Storage
//!
//! Shared CPU memory backing parameter values and gradients.

use ndarray::{ArrayD, IxDyn};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::TensorData;

/// CPU memory shared between the model that owns a parameter and the
/// trainer that updates it.
///
/// Clones share the same allocation, so writes made by the trainer are
/// visible through every handle.
#[derive(Debug, Clone)]
pub struct Storage<T> {
    pub(crate) data: Arc<RwLock<T>>,
}

impl<T> Storage<T> {
    pub fn new(inner: T) -> Self {
        Storage {
            data: Arc::new(RwLock::new(inner)),
        }
    }

    /// Locks the storage for reading. Panics if the lock is poisoned.
    pub fn read_lock(&self) -> RwLockReadGuard<'_, T> {
        self.data.read().expect("Storage RwLock poisoned (read)")
    }

    /// Locks the storage for writing. Panics if the lock is poisoned.
    pub fn write_lock(&self) -> RwLockWriteGuard<'_, T> {
        self.data.write().expect("Storage RwLock poisoned (write)")
    }

    /// Whether both handles point at the same allocation.
    pub fn same_allocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Storage<ArrayD<TensorData>> {
    pub fn zeros(shape: &[usize]) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)))
    }
}
