//! # Language Bindings
//!
//! The Python extension module, built with the `python` feature.

#[cfg(feature = "python")]
pub mod python;
