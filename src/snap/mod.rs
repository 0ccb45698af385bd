// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Surface attraction of a mesh boundary.

pub mod driver;
pub mod surface;

pub use driver::{
    edge_patch_dist, get_collocated_points, get_zone_surface_points, outwards_displacement,
    smooth_patch_displacement, CheckpointSink, NoCheckpoint, SnapDriver, SnapReport,
};
pub use surface::{
    PointHit, RefinementSurfaces, SearchablePlane, SearchableSphere, SearchableSurface,
    SurfaceHit, TriSurface,
};
