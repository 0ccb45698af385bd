// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyhedral mesh storage, derived geometry and topology changes

pub mod face;
pub mod geometry;
pub mod poly_mesh;
pub mod topo_change;

pub use face::{Edge, Face};
pub use geometry::MeshGeometry;
pub use poly_mesh::{FaceZone, Patch, PatchKind, PolyMesh};
pub use topo_change::FaceMap;
