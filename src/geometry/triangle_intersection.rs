// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Triangle-line, triangle-face and triangle-triangle intersection.
//!
//! Coplanar pairs go through a 2D Sutherland-Hodgman clip of one triangle
//! against the other. The clip is sensitive to round-off at tangential
//! contact: touching triangles may report a degenerate overlap polygon.

use super::matrix3d::Matrix3D;
use super::predicates::{closest_point_on_triangle, triangle_centre, Triangle};
use crate::mesh::face::{face_centre, next_label};
use crate::utils::math::Tolerances;
use nalgebra::{Point2, Point3, Vector2, Vector3};

/// Cosine of the 5 degree angle used to accept nearly parallel triangles
pub const DEFAULT_COS_TOL: f64 = 0.996_194_698_091_745_5;

/// Result of triangle-triangle intersection test
#[derive(Debug, Clone)]
pub struct IntersectionResult {
    /// Whether triangles intersect
    pub intersects: bool,
    /// Intersection type
    pub intersection_type: IntersectionType,
    /// Segment end points, or the overlap polygon for coplanar triangles
    pub intersection_points: Vec<Point3<f64>>,
}

impl IntersectionResult {
    fn none() -> Self {
        Self {
            intersects: false,
            intersection_type: IntersectionType::None,
            intersection_points: Vec::new(),
        }
    }

    fn coplanar(polygon: Option<Vec<Point3<f64>>>) -> Self {
        match polygon {
            Some(points) => Self {
                intersects: true,
                intersection_type: IntersectionType::Coplanar,
                intersection_points: points,
            },
            None => Self::none(),
        }
    }
}

/// Type of triangle-triangle intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionType {
    /// No intersection
    None,
    /// Triangles are coplanar and overlap
    Coplanar,
    /// Triangles intersect along a line segment
    Segment,
}

/// Intersection of the segment `[line_start, line_end]` with a triangle
pub fn tri_line_intersection(
    tri: &Triangle,
    line_start: &Point3<f64>,
    line_end: &Point3<f64>,
    tol: &Tolerances,
) -> Option<Point3<f64>> {
    let p0 = &tri[0];
    let v = line_start - line_end;
    let mat = Matrix3D::from_columns(&(tri[1] - p0), &(tri[2] - p0), &v);
    let source = line_start - p0;

    if mat.determinant().abs() < tol.small {
        return None;
    }

    let t = mat.solve_third(&source);
    if t < -tol.small || t > 1.0 + tol.small {
        return None;
    }

    let u0 = mat.solve_first(&source);
    if u0 < -tol.small {
        return None;
    }

    let u1 = mat.solve_second(&source);
    if u1 < -tol.small || u0 + u1 > 1.0 + tol.small {
        return None;
    }

    Some(line_start - t * v)
}

/// Intersection of a segment with a polygonal face, tested against the
/// triangle fan around the face centre
pub fn line_face_intersection(
    sp: &Point3<f64>,
    ep: &Point3<f64>,
    face: &[usize],
    points: &[Point3<f64>],
    tol: &Tolerances,
) -> Option<Point3<f64>> {
    let c = face_centre(face, points);
    (0..face.len()).find_map(|i| {
        let tri = [points[face[i]], points[next_label(face, i)], c];
        tri_line_intersection(&tri, sp, ep, tol)
    })
}

/// True if any triangle edge cuts the face or any face edge cuts the triangle
pub fn face_triangle_intersect(
    tri: &Triangle,
    face: &[usize],
    points: &[Point3<f64>],
    tol: &Tolerances,
) -> bool {
    let centre = face_centre(face, points);

    for e in 0..3 {
        let s = &tri[e];
        let t = &tri[(e + 1) % 3];
        for i in 0..face.len() {
            let fan = [points[face[i]], points[next_label(face, i)], centre];
            if tri_line_intersection(&fan, s, t, tol).is_some() {
                return true;
            }
        }
    }

    (0..face.len()).any(|i| {
        tri_line_intersection(tri, &points[face[i]], &points[next_label(face, i)], tol).is_some()
    })
}

fn area_normal(tri: &Triangle) -> Vector3<f64> {
    0.5 * (tri[1] - tri[0]).cross(&(tri[2] - tri[0]))
}

/// Overlap polygon of two nearly coplanar triangles.
///
/// Returns `None` when the planes deviate by more than `cos_tol`, when no
/// vertex lies within `dist_tol` of the other plane, or when the clipped
/// polygon is empty.
pub fn triangles_overlap(
    tri0: &Triangle,
    tri1: &Triangle,
    dist_tol: f64,
    cos_tol: f64,
    tol: &Tolerances,
) -> Option<Vec<Point3<f64>>> {
    if dist_tol < 0.0 {
        log::warn!("triangle overlap queried without a distance tolerance");
        return None;
    }

    let n0 = area_normal(tri0);
    let dn0 = n0.norm();
    if dn0 < tol.vsmall {
        return None;
    }
    let n0 = n0 / dn0;

    let n1 = area_normal(tri1);
    let dn1 = n1.norm();
    if dn1 < tol.vsmall {
        return None;
    }
    let n1 = n1 / dn1;

    if n0.dot(&n1).abs() < cos_tol {
        return None;
    }

    let near_plane = tri1.iter().any(|p| (p - tri0[0]).dot(&n0).abs() < dist_tol)
        || tri0.iter().any(|p| (p - tri1[0]).dot(&n1).abs() < dist_tol);
    if !near_plane {
        return None;
    }

    let vec = n0 + if n0.dot(&n1) >= 0.0 { n1 } else { -n1 };
    let vec = vec / (vec.norm() + tol.vsmall);
    let origin = nalgebra::center(&triangle_centre(tri0), &triangle_centre(tri1));

    let (best_point, dist_sq) = tri0
        .iter()
        .chain(tri1.iter())
        .map(|p| (*p, (p - origin).norm_squared()))
        .fold((tri0[0], -1.0), |best, cand| if cand.1 > best.1 { cand } else { best });
    if dist_sq < tol.vsmall {
        return None;
    }

    // planar frame with x towards the farthest vertex
    let r = best_point - origin;
    let x = r - r.dot(&vec) * vec;
    let x = x / (x.norm() + tol.vsmall);
    let y = vec.cross(&x);

    let project = |p: &Point3<f64>| Point2::new((p - origin).dot(&x), (p - origin).dot(&y));

    let mut poly: Vec<Point2<f64>> = tri0.iter().map(project).collect();
    let clip: Vec<Point2<f64>> = tri1.iter().map(project).collect();

    let orientation = {
        let a = clip[1] - clip[0];
        let b = clip[2] - clip[0];
        if a.x * b.y - a.y * b.x >= 0.0 {
            1.0
        } else {
            -1.0
        }
    };

    for e in 0..3 {
        let start = clip[e];
        let edge: Vector2<f64> = clip[(e + 1) % 3] - start;

        let distance: Vec<f64> = poly
            .iter()
            .map(|p| {
                let pv = p - start;
                orientation * (edge.x * pv.y - edge.y * pv.x)
            })
            .collect();

        let n = poly.len();
        let mut clipped = Vec::with_capacity(n + 1);
        for i in 0..n {
            let j = (i + 1) % n;
            let (di, dj) = (distance[i], distance[j]);

            if di >= 0.0 {
                clipped.push(poly[i]);
            }
            if (di >= 0.0) != (dj >= 0.0) {
                let w = di.abs() + dj.abs() + tol.vsmall;
                let crossing = (di.abs() * poly[j].coords + dj.abs() * poly[i].coords) / w;
                clipped.push(Point2::from(crossing));
            }
        }

        poly = clipped;
        if poly.is_empty() {
            return None;
        }
    }

    Some(
        poly.iter()
            .map(|p| origin + x * p.x + y * p.y)
            .collect(),
    )
}

/// Proximity based intersection test: a vertex of one triangle within
/// `dist_tol` of the other, or any edge crossing the other triangle
pub fn triangles_intersect(
    tri0: &Triangle,
    tri1: &Triangle,
    dist_tol: f64,
    tol: &Tolerances,
) -> bool {
    if dist_tol < 0.0 {
        log::warn!("triangle intersection queried without a distance tolerance");
        return false;
    }

    let dist_tol_sq = dist_tol * dist_tol;
    let near = |tri: &Triangle, p: &Point3<f64>| {
        (closest_point_on_triangle(tri, p, tol) - p).norm_squared() < dist_tol_sq
    };

    if tri0.iter().any(|p| near(tri1, p)) || tri1.iter().any(|p| near(tri0, p)) {
        return true;
    }

    let crosses = |tri: &Triangle, other: &Triangle| {
        (0..3).any(|e| tri_line_intersection(tri, &other[e], &other[(e + 1) % 3], tol).is_some())
    };

    crosses(tri0, tri1) || crosses(tri1, tri0)
}

enum PlaneSide {
    Separate,
    Crossing(Vec<Point3<f64>>),
    Coplanar,
}

/// Classify a triangle against a plane and collect the points where it
/// meets the plane
fn classify_against_plane(
    tri: &Triangle,
    plane_point: &Point3<f64>,
    normal: &Vector3<f64>,
    dist_tol: f64,
) -> PlaneSide {
    let mut d = [0.0; 3];
    for (i, p) in tri.iter().enumerate() {
        let dist = (p - plane_point).dot(normal);
        d[i] = if dist.abs() < dist_tol { 0.0 } else { dist };
    }

    let has_positive = d.iter().any(|&v| v >= dist_tol && v != 0.0);
    let has_negative = d.iter().any(|&v| v <= -dist_tol && v != 0.0);
    let has_zero = d.iter().any(|&v| v == 0.0);

    if (has_positive && !has_negative && !has_zero) || (has_negative && !has_positive && !has_zero)
    {
        return PlaneSide::Separate;
    }
    if !has_positive && !has_negative {
        return PlaneSide::Coplanar;
    }

    let mut line = Vec::with_capacity(2);
    for i in 0..3 {
        let j = (i + 1) % 3;
        if d[i] == 0.0 {
            line.push(tri[i]);
        } else if d[i] * d[j] < 0.0 {
            let t = d[i] / (d[i] - d[j]);
            line.push(tri[i] + t * (tri[j] - tri[i]));
        }
    }
    PlaneSide::Crossing(line)
}

/// Triangle-triangle intersection by signed plane distances.
///
/// Non-coplanar triangles are cut by each other's plane and the two cuts
/// compared along the planes' common direction; coplanar ones fall back to
/// [`triangles_overlap`].
pub fn triangle_triangle_intersection(
    tri0: &Triangle,
    tri1: &Triangle,
    dist_tol: f64,
    tol: &Tolerances,
) -> IntersectionResult {
    if dist_tol < 0.0 {
        log::warn!("triangle intersection queried without a distance tolerance");
        return IntersectionResult::none();
    }

    let n0 = area_normal(tri0);
    let n0 = n0 / (n0.norm() + tol.vsmall);
    let n1 = area_normal(tri1);
    let n1 = n1 / (n1.norm() + tol.vsmall);

    let overlap = || {
        IntersectionResult::coplanar(triangles_overlap(tri0, tri1, dist_tol, DEFAULT_COS_TOL, tol))
    };

    let line0 = match classify_against_plane(tri0, &tri1[0], &n1, dist_tol) {
        PlaneSide::Separate => return IntersectionResult::none(),
        PlaneSide::Coplanar => return overlap(),
        PlaneSide::Crossing(line) => line,
    };
    let line1 = match classify_against_plane(tri1, &tri0[0], &n0, dist_tol) {
        PlaneSide::Separate => return IntersectionResult::none(),
        PlaneSide::Coplanar => return overlap(),
        PlaneSide::Crossing(line) => line,
    };

    let vec = n0.cross(&n1);
    if vec.norm_squared() < tol.small {
        return overlap();
    }

    let interval = |line: &[Point3<f64>]| {
        line.iter().fold(
            (f64::MAX, Point3::origin(), f64::MIN, Point3::origin()),
            |(t_min, p_min, t_max, p_max), p| {
                let t = p.coords.dot(&vec);
                let (t_min, p_min) = if t < t_min { (t, *p) } else { (t_min, p_min) };
                let (t_max, p_max) = if t > t_max { (t, *p) } else { (t_max, p_max) };
                (t_min, p_min, t_max, p_max)
            },
        )
    };

    let (t0_min, p0_min, t0_max, p0_max) = interval(&line0);
    let (t1_min, p1_min, t1_max, p1_max) = interval(&line1);

    if t1_min <= t0_max && t1_max >= t0_min {
        let start = if t1_min >= t0_min { p1_min } else { p0_min };
        let end = if t1_max <= t0_max { p1_max } else { p0_max };
        return IntersectionResult {
            intersects: true,
            intersection_type: IntersectionType::Segment,
            intersection_points: vec![start, end],
        };
    }

    IntersectionResult::none()
}
