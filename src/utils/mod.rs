// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shared numeric helpers

pub mod math;

pub use math::{Tolerances, GREAT, ROOTVSMALL, SMALL, VGREAT, VSMALL};
