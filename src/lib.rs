// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polysnap
//!
//! Boundary-conforming mesh snapping for polyhedral finite-volume meshes.
//! Deforms a background mesh so its outer patches conform to a surface
//! while keeping every cell valid.
//!
//! - [`patch`]: face/edge/point addressing of a boundary patch
//! - [`geometry`]: tolerance-aware predicates and 3x3 matrices
//! - [`wave`]: front propagation over mesh and patch connectivity
//! - [`motion`]: displacement smoothing with quality-checked backoff
//! - [`snap`]: surface attraction driving the motion

pub mod config;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod motion;
pub mod parallel;
pub mod patch;
pub mod snap;
pub mod utils;
pub mod wave;

pub use config::{MeshQuality, MotionParameters, SnapConfig, SnapParameters};
pub use error::{MeshError, Result};
pub use mesh::{PatchKind, PolyMesh};
pub use motion::{MeshReport, MotionSmoother};
pub use patch::PrimitivePatch;
pub use snap::{RefinementSurfaces, SnapDriver, SnapReport};

/// Snap all patches of `mesh` onto `surfaces` with the given configuration
pub fn snap_mesh(
    mesh: PolyMesh,
    surfaces: &RefinementSurfaces,
    config: SnapConfig,
) -> Result<(PolyMesh, SnapReport)> {
    let patches: Vec<usize> = (0..mesh.patches().len()).collect();
    SnapDriver::new(surfaces, config).do_snap(mesh, &patches)
}
