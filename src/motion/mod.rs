// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh motion: quality checks, smoothing diffusivity and the motion smoother

pub mod diffusivity;
pub mod mesh_check;
pub mod smoother;

pub use diffusivity::Diffusivity;
pub use mesh_check::{check_mesh, classify_cell, CellShape, CellShapeCounts, MeshReport};
pub use smoother::{Averageable, MotionSmoother};
