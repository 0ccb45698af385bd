// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Edges and polygonal faces addressed into a shared point array

use crate::utils::math::VSMALL;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A polygon as an ordered list of point indices
pub type Face = Vec<usize>;

/// An unordered pair of point indices.
///
/// Two edges compare equal regardless of direction; use [`Edge::compare`]
/// when the direction matters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edge {
    pub start: usize,
    pub end: usize,
}

impl Edge {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Lower point index first
    pub fn sorted(&self) -> (usize, usize) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }

    /// 1 if same direction, -1 if reversed, 0 if different edges
    pub fn compare(&self, other: &Edge) -> i32 {
        if self.start == other.start && self.end == other.end {
            1
        } else if self.start == other.end && self.end == other.start {
            -1
        } else {
            0
        }
    }

    pub fn other_vertex(&self, p: usize) -> Option<usize> {
        if p == self.start {
            Some(self.end)
        } else if p == self.end {
            Some(self.start)
        } else {
            None
        }
    }

    pub fn contains(&self, p: usize) -> bool {
        self.start == p || self.end == p
    }

    pub fn vec(&self, points: &[Point3<f64>]) -> Vector3<f64> {
        points[self.end] - points[self.start]
    }

    pub fn mag(&self, points: &[Point3<f64>]) -> f64 {
        self.vec(points).norm()
    }

    pub fn centre(&self, points: &[Point3<f64>]) -> Point3<f64> {
        nalgebra::center(&points[self.start], &points[self.end])
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.end, self.start)
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) != 0
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted().hash(state);
    }
}

/// Edge `i` of a face runs from point `i` to point `i + 1`
pub fn face_edge(face: &[usize], i: usize) -> Edge {
    Edge::new(face[i], face[(i + 1) % face.len()])
}

pub fn face_edges(face: &[usize]) -> impl Iterator<Item = Edge> + '_ {
    (0..face.len()).map(move |i| face_edge(face, i))
}

/// Position of a point label in the face
pub fn which(face: &[usize], p: usize) -> Option<usize> {
    face.iter().position(|&q| q == p)
}

pub fn next_label(face: &[usize], i: usize) -> usize {
    face[(i + 1) % face.len()]
}

/// Same first point, opposite winding
pub fn reverse_face(face: &[usize]) -> Face {
    let mut rev = Vec::with_capacity(face.len());
    if let Some(&first) = face.first() {
        rev.push(first);
        rev.extend(face[1..].iter().rev());
    }
    rev
}

/// Plain average of the face points
pub fn face_average(face: &[usize], points: &[Point3<f64>]) -> Point3<f64> {
    let mut sum = Vector3::zeros();
    for &p in face {
        sum += points[p].coords;
    }
    Point3::from(sum / face.len().max(1) as f64)
}

/// Area-weighted face centre from a triangle fan around the point average
pub fn face_centre(face: &[usize], points: &[Point3<f64>]) -> Point3<f64> {
    if face.len() == 3 {
        let c = points[face[0]].coords + points[face[1]].coords + points[face[2]].coords;
        return Point3::from(c / 3.0);
    }

    let centre_point = face_average(face, points);
    let mut sum_a = 0.0;
    let mut sum_ac = Vector3::zeros();

    for i in 0..face.len() {
        let this_point = &points[face[i]];
        let next_point = &points[next_label(face, i)];

        let c = this_point.coords + next_point.coords + centre_point.coords;
        let a = (next_point - this_point)
            .cross(&(centre_point - this_point))
            .norm();

        sum_a += a;
        sum_ac += a * c;
    }

    if sum_a > VSMALL {
        Point3::from(sum_ac / (3.0 * sum_a))
    } else {
        centre_point
    }
}

/// Area vector: magnitude is the face area, direction follows the winding
pub fn face_area_normal(face: &[usize], points: &[Point3<f64>]) -> Vector3<f64> {
    if face.len() == 3 {
        let p0 = &points[face[0]];
        return 0.5 * (points[face[1]] - p0).cross(&(points[face[2]] - p0));
    }

    let centre_point = face_average(face, points);
    let mut n = Vector3::zeros();
    for i in 0..face.len() {
        let this_point = &points[face[i]];
        let next_point = &points[next_label(face, i)];
        n += (next_point - this_point).cross(&(centre_point - this_point));
    }
    0.5 * n
}

pub fn face_unit_normal(face: &[usize], points: &[Point3<f64>]) -> Vector3<f64> {
    let n = face_area_normal(face, points);
    n / (n.norm() + VSMALL)
}

/// Number of edges the two faces share
pub fn n_shared_edges(a: &[usize], b: &[usize]) -> usize {
    face_edges(a)
        .filter(|ea| face_edges(b).any(|eb| eb == *ea))
        .count()
}
