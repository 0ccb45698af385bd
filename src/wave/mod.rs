// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Front propagation over mesh and patch connectivity.
//!
//! A wave carries one [`WaveInfo`] record per entity. Seeds are set on some
//! entities; each iteration pushes every changed record to the adjacent
//! entities of the other kind, which accept it only if it improves on what
//! they hold. The loop stops when a half step changes nothing.
//!
//! - [`PointEdgeWave`]: points and edges of a [`PolyMesh`](crate::mesh::PolyMesh)
//! - [`PatchEdgeFaceWave`]: edges and faces of a
//!   [`PrimitivePatch`](crate::patch::PrimitivePatch)

pub mod patch_edge_face;
pub mod patch_edge_face_wave;
pub mod point_edge_point;
pub mod point_edge_wave;

pub use patch_edge_face::{PatchEdgeFaceInfo, PatchEdgeFaceRegion};
pub use patch_edge_face_wave::PatchEdgeFaceWave;
pub use point_edge_point::PointEdgePoint;
pub use point_edge_wave::PointEdgeWave;

use crate::error::{MeshError, Result};
use nalgebra::{Point3, Rotation3};
use serde::{Deserialize, Serialize};

/// Record carried by a wave
pub trait WaveInfo: Clone + Default + std::fmt::Debug {
    /// Whether the record has been set
    fn valid(&self) -> bool;

    /// Exact equality, used to skip updates that cannot change anything
    fn equal(&self, other: &Self) -> bool;

    /// Equality within the relative tolerance `tol`
    fn same_geometry(&self, other: &Self, tol: f64) -> bool;

    /// Relax towards `neighbour` as seen from `position`. Returns true if
    /// this record changed and should propagate further.
    fn update(&mut self, position: &Point3<f64>, neighbour: &Self, tol: f64) -> bool;

    /// Merge a record received from a coupled copy of this entity
    fn update_merge(&mut self, other: &Self, tol: f64) -> bool;

    /// Convert to a form relative to `position` before crossing a coupled
    /// boundary
    fn leave_domain(&mut self, _position: &Point3<f64>) {}

    /// Inverse of [`WaveInfo::leave_domain`] at the receiving side
    fn enter_domain(&mut self, _position: &Point3<f64>) {}

    /// Rotate a relative record
    fn transform(&mut self, _rotation: &Rotation3<f64>) {}
}

/// What to do when a wave runs out of iterations while still changing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergencePolicy {
    /// Panic; a wave that does not settle means broken connectivity
    #[default]
    Abort,
    /// Return [`MeshError::ConvergenceFailed`]
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveOptions {
    /// Relative tolerance below which an improvement is ignored
    pub propagation_tol: f64,
    pub policy: ConvergencePolicy,
}

impl Default for WaveOptions {
    fn default() -> Self {
        Self {
            propagation_tol: 0.01,
            policy: ConvergencePolicy::Abort,
        }
    }
}

impl WaveOptions {
    /// Apply the convergence policy to the outcome of `iterate`
    pub(crate) fn check_convergence(
        &self,
        kind: &str,
        iterations: usize,
        max_iter: usize,
        n_changed: (usize, usize),
        unset: usize,
    ) -> Result<usize> {
        if max_iter > 0 && iterations >= max_iter {
            match self.policy {
                ConvergencePolicy::Abort => panic!(
                    "{}: maximum number of iterations {} reached with {} and {} entities \
                     still changing; increase max_iter",
                    kind, max_iter, n_changed.0, n_changed.1
                ),
                ConvergencePolicy::Report => {
                    log::warn!(
                        "{} did not converge in {} iterations ({} entities unset)",
                        kind,
                        iterations,
                        unset
                    );
                    return Err(MeshError::ConvergenceFailed {
                        iterations,
                        unset,
                    });
                }
            }
        }
        Ok(iterations)
    }
}

/// Outcome of relaxing a squared distance record towards a candidate.
///
/// `current` is the stored squared distance, `candidate` the one offered.
/// Changes smaller than `SMALL` or than `tol` relative to `current` are not
/// worth propagating.
pub(crate) fn improves(current: f64, candidate: f64, tol: f64) -> bool {
    use crate::utils::math::SMALL;

    let diff = current - candidate;
    if diff < 0.0 {
        return false;
    }
    !(diff < SMALL || (current > SMALL && diff / current < tol))
}
