// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Edge weights for displacement smoothing

use crate::utils::math::SMALL;
use serde::{Deserialize, Serialize};

/// How strongly an edge couples its end points while smoothing, as a
/// function of the edge's distance to the moving patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diffusivity {
    Uniform,
    /// Edges close to the patch dominate
    #[default]
    InverseDistance,
    InverseSquareDistance,
}

impl Diffusivity {
    pub fn weight(&self, distance: f64) -> f64 {
        match self {
            Diffusivity::Uniform => 1.0,
            Diffusivity::InverseDistance => 1.0 / (distance + SMALL),
            Diffusivity::InverseSquareDistance => 1.0 / (distance * distance + SMALL),
        }
    }

    pub fn edge_weights(&self, edge_distance: &[f64]) -> Vec<f64> {
        edge_distance.iter().map(|&d| self.weight(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_weights() {
        let d = [0.5, 2.0];
        assert_eq!(Diffusivity::Uniform.edge_weights(&d), vec![1.0, 1.0]);
        let w = Diffusivity::InverseDistance.edge_weights(&d);
        assert_relative_eq!(w[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(w[1], 0.5, epsilon = 1e-9);
        assert_relative_eq!(Diffusivity::InverseSquareDistance.weight(2.0), 0.25, epsilon = 1e-9);
    }
}
