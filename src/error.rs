// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error types for the snapping core.
//!
//! Contract violations (recomputing cached addressing, mismatched work array
//! sizes, seeds listed twice) are not represented here: they panic with the
//! offending indices. Everything a caller can reasonably react to is a
//! [`MeshError`].

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Recoverable errors raised by mesh, wave and snapping operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// A front propagation hit its iteration budget while still changing.
    #[error("wave propagation did not converge in {iterations} iterations ({unset} entities unset)")]
    ConvergenceFailed {
        /// Iterations performed.
        iterations: usize,
        /// Entities that never received a valid value.
        unset: usize,
    },

    /// A parameter is outside its legal range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// The parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A face zone referenced by name does not exist.
    #[error("cannot find face zone '{0}'")]
    UnknownZone(String),

    /// A patch referenced by name or index does not exist.
    #[error("cannot find patch '{0}'")]
    UnknownPatch(String),

    /// Input geometry is too degenerate to process.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Mesh construction input is inconsistent.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or written.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
