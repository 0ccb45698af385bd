// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Nearest seed location and squared distance to it.

use super::{improves, WaveInfo};
use crate::utils::math::SMALL;
use nalgebra::{Point3, Rotation3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointEdgePoint {
    /// Nearest seed; `None` while unset
    pub origin: Option<Point3<f64>>,
    pub dist_sqr: f64,
}

impl Default for PointEdgePoint {
    fn default() -> Self {
        Self {
            origin: None,
            dist_sqr: f64::MAX,
        }
    }
}

impl PointEdgePoint {
    pub fn new(origin: Point3<f64>, dist_sqr: f64) -> Self {
        Self {
            origin: Some(origin),
            dist_sqr,
        }
    }

    /// Seed record sitting on its own origin
    pub fn seed(origin: Point3<f64>) -> Self {
        Self::new(origin, 0.0)
    }

    pub fn distance(&self) -> f64 {
        self.dist_sqr.sqrt()
    }
}

/// Shared relaxation of an origin/distance pair
pub(crate) fn relax_towards(
    origin: &mut Option<Point3<f64>>,
    dist_sqr: &mut f64,
    position: &Point3<f64>,
    neighbour_origin: Option<Point3<f64>>,
    tol: f64,
) -> bool {
    let Some(nbr_origin) = neighbour_origin else {
        return false;
    };
    let dist2 = (position - nbr_origin).norm_squared();

    if origin.is_none() || improves(*dist_sqr, dist2, tol) {
        *origin = Some(nbr_origin);
        *dist_sqr = dist2;
        return true;
    }
    false
}

pub(crate) fn merge_records(
    origin: &mut Option<Point3<f64>>,
    dist_sqr: &mut f64,
    other_origin: Option<Point3<f64>>,
    other_dist_sqr: f64,
    tol: f64,
) -> bool {
    if other_origin.is_none() {
        return false;
    }
    if origin.is_none() || improves(*dist_sqr, other_dist_sqr, tol) {
        *origin = other_origin;
        *dist_sqr = other_dist_sqr;
        return true;
    }
    false
}

pub(crate) fn same_distance(a: f64, b: f64, tol: f64) -> bool {
    let diff = (a - b).abs();
    diff < SMALL || (a > SMALL && diff / a < tol)
}

impl WaveInfo for PointEdgePoint {
    fn valid(&self) -> bool {
        self.origin.is_some()
    }

    fn equal(&self, other: &Self) -> bool {
        self == other
    }

    fn same_geometry(&self, other: &Self, tol: f64) -> bool {
        same_distance(self.dist_sqr, other.dist_sqr, tol)
    }

    fn update(&mut self, position: &Point3<f64>, neighbour: &Self, tol: f64) -> bool {
        relax_towards(
            &mut self.origin,
            &mut self.dist_sqr,
            position,
            neighbour.origin,
            tol,
        )
    }

    fn update_merge(&mut self, other: &Self, tol: f64) -> bool {
        merge_records(
            &mut self.origin,
            &mut self.dist_sqr,
            other.origin,
            other.dist_sqr,
            tol,
        )
    }

    fn leave_domain(&mut self, position: &Point3<f64>) {
        if let Some(o) = self.origin.as_mut() {
            *o = Point3::from(*o - position);
        }
    }

    fn enter_domain(&mut self, position: &Point3<f64>) {
        if let Some(o) = self.origin.as_mut() {
            *o = Point3::from(o.coords + position.coords);
        }
    }

    fn transform(&mut self, rotation: &Rotation3<f64>) {
        if let Some(o) = self.origin.as_mut() {
            *o = rotation * *o;
        }
    }
}
