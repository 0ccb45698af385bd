// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - tolerance-aware geometric queries

pub mod bbox;
pub mod matrix3d;
pub mod predicates;
pub mod triangle_intersection;

pub use bbox::BoundingBox;
pub use matrix3d::Matrix3D;
pub use predicates::{Plane, Tetrahedron, Triangle};
pub use triangle_intersection::{IntersectionResult, IntersectionType};
