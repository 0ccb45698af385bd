// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Face patches and their derived topology

pub mod primitive_patch;
pub mod tools;

pub use primitive_patch::{PrimitivePatch, SurfaceTopo};
