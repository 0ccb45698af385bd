// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Records carried across patch edges and faces

use super::point_edge_point::{merge_records, relax_towards, same_distance};
use super::WaveInfo;
use nalgebra::{Point3, Rotation3};
use serde::{Deserialize, Serialize};

/// Distance to the nearest seed, measured from edge and face centres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatchEdgeFaceInfo {
    pub origin: Option<Point3<f64>>,
    pub dist_sqr: f64,
}

impl Default for PatchEdgeFaceInfo {
    fn default() -> Self {
        Self {
            origin: None,
            dist_sqr: f64::MAX,
        }
    }
}

impl PatchEdgeFaceInfo {
    pub fn new(origin: Point3<f64>, dist_sqr: f64) -> Self {
        Self {
            origin: Some(origin),
            dist_sqr,
        }
    }
}

impl WaveInfo for PatchEdgeFaceInfo {
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

/// Connected region label. The lowest region label wins; blocked edges
/// never change and never pass anything on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatchEdgeFaceRegion {
    #[default]
    Unset,
    Blocked,
    Region(usize),
}

impl PatchEdgeFaceRegion {
    pub fn region(&self) -> Option<usize> {
        match self {
            Self::Region(r) => Some(*r),
            _ => None,
        }
    }

    fn take_lower(&mut self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::Blocked, _) => false,
            (_, Self::Region(theirs)) => match *self {
                Self::Region(mine) if mine <= theirs => false,
                _ => {
                    *self = Self::Region(theirs);
                    true
                }
            },
            _ => false,
        }
    }
}

impl WaveInfo for PatchEdgeFaceRegion {
    fn valid(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    fn equal(&self, other: &Self) -> bool {
        self == other
    }

    fn same_geometry(&self, other: &Self, _tol: f64) -> bool {
        self == other
    }

    fn update(&mut self, _position: &Point3<f64>, neighbour: &Self, _tol: f64) -> bool {
        self.take_lower(neighbour)
    }

    fn update_merge(&mut self, other: &Self, _tol: f64) -> bool {
        self.take_lower(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_min() {
        let p = Point3::origin();
        let mut r = PatchEdgeFaceRegion::Unset;
        assert!(r.update(&p, &PatchEdgeFaceRegion::Region(4), 0.0));
        assert!(!r.update(&p, &PatchEdgeFaceRegion::Region(6), 0.0));
        assert!(r.update(&p, &PatchEdgeFaceRegion::Region(1), 0.0));
        assert_eq!(r.region(), Some(1));

        let mut blocked = PatchEdgeFaceRegion::Blocked;
        assert!(blocked.valid());
        assert!(!blocked.update(&p, &PatchEdgeFaceRegion::Region(0), 0.0));
    }

    #[test]
    fn test_face_distance() {
        let mut info = PatchEdgeFaceInfo::default();
        let seed = PatchEdgeFaceInfo::new(Point3::new(0.0, 3.0, 4.0), 0.0);
        assert!(info.update(&Point3::origin(), &seed, 0.01));
        assert!((info.dist_sqr - 25.0).abs() < 1e-12);
        assert!(info.same_geometry(&PatchEdgeFaceInfo::new(Point3::origin(), 25.1), 0.01));
    }
}
