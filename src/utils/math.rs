// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Math utilities and the named floating point tolerances

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Guard against division by zero
pub const VSMALL: f64 = 1.0e-300;

/// Geometric accept/reject slack
pub const SMALL: f64 = 1.0e-15;

/// Square root of [`VSMALL`]
pub const ROOTVSMALL: f64 = 1.0e-150;

/// Stand-in for "infinitely far"
pub const GREAT: f64 = 1.0e15;

/// Larger stand-in used where [`GREAT`] may be a legal value
pub const VGREAT: f64 = 1.0e300;

/// The two-tier tolerance pair used by the geometric predicates.
///
/// `vsmall` only protects divisions, `small` decides geometric accept/reject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub vsmall: f64,
    pub small: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            vsmall: VSMALL,
            small: SMALL,
        }
    }
}

/// Calculate the normal of a triangle given three vertices
pub fn calculate_triangle_normal(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
) -> Vector3<f64> {
    let v1 = p1 - p0;
    let v2 = p2 - p0;
    let n = v1.cross(&v2);
    n / (n.norm() + VSMALL)
}

/// Normalise a vector, leaving a zero vector untouched
pub fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    v / (v.norm() + VSMALL)
}

/// Clamp a value between min and max
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Convert degrees to radians
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * std::f64::consts::PI / 180.0
}

/// Convert radians to degrees
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / std::f64::consts::PI
}

/// Determinant of a 3x3 tensor given as rows
pub fn det3(rows: &[Vector3<f64>; 3]) -> f64 {
    rows[0].dot(&rows[1].cross(&rows[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
        assert_eq!(clamp(-5.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(15.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn test_angle_conversion() {
        let rad = deg_to_rad(180.0);
        assert_relative_eq!(rad, std::f64::consts::PI);
        assert_relative_eq!(rad_to_deg(rad), 180.0);
    }

    #[test]
    fn test_safe_normalize_zero() {
        let n = safe_normalize(&Vector3::zeros());
        assert_eq!(n, Vector3::zeros());
    }

    #[test]
    fn test_triangle_normal() {
        let n = calculate_triangle_normal(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(n, Vector3::z());
    }

    #[test]
    fn test_identity_determinant() {
        assert_relative_eq!(det3(&[Vector3::x(), Vector3::y(), Vector3::z()]), 1.0);
    }
}
