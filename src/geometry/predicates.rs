// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric queries used by mesh generation.
//!
//! Every query takes its [`Tolerances`] explicitly. `vsmall` only guards
//! divisions, `small` decides accept/reject. Degenerate input (zero length
//! edges, zero area triangles, parallel line and plane) gives a well defined
//! negative answer or a fallback point, never NaN.

use super::bbox::BoundingBox;
use super::matrix3d::Matrix3D;
use crate::mesh::face::{face_area_normal, face_centre, face_edge, face_unit_normal};
use crate::utils::math::{Tolerances, VSMALL};
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Triangle given by its three corners
pub type Triangle = [Point3<f64>; 3];

/// Tetrahedron given by its four corners
pub type Tetrahedron = [Point3<f64>; 4];

/// Infinite plane through a reference point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub ref_point: Point3<f64>,
    /// Unit normal
    pub normal: Vector3<f64>,
}

impl Plane {
    pub fn new(ref_point: Point3<f64>, normal: Vector3<f64>) -> Self {
        let mag = normal.norm();
        let normal = if mag > 0.0 { normal / mag } else { normal };
        Self { ref_point, normal }
    }

    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.ref_point).dot(&self.normal)
    }

    pub fn nearest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.signed_distance(p) * self.normal
    }
}

/// Unit normal and area of a triangle; the normal is zero when degenerate
pub fn triangle_normal(tri: &Triangle) -> (Vector3<f64>, f64) {
    let n = 0.5 * (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    let mag = n.norm();
    (n / (mag + VSMALL), mag)
}

pub fn triangle_centre(tri: &Triangle) -> Point3<f64> {
    Point3::from((tri[0].coords + tri[1].coords + tri[2].coords) / 3.0)
}

/// Orthogonal projection onto the infinite line through the edge
pub fn nearest_point_on_line(
    e0: &Point3<f64>,
    e1: &Point3<f64>,
    p: &Point3<f64>,
    tol: &Tolerances,
) -> Point3<f64> {
    let e = e1 - e0;
    let d = e.norm();
    if d < tol.vsmall.sqrt() {
        return *e0;
    }
    e0 + (e / (d * d)) * e.dot(&(p - e0))
}

/// Nearest point on the segment `[e0, e1]`; a zero length edge gives `e0`
pub fn nearest_point_on_edge(
    e0: &Point3<f64>,
    e1: &Point3<f64>,
    p: &Point3<f64>,
    tol: &Tolerances,
) -> Point3<f64> {
    let e = e1 - e0;
    let d_sq = e.norm_squared();
    if d_sq < tol.vsmall {
        return *e0;
    }

    let t = e.dot(&(p - e0)) / (d_sq + tol.vsmall);
    if t > 1.0 {
        *e1
    } else if t < 0.0 {
        *e0
    } else {
        e0 + e * t
    }
}

/// Nearest points between an edge and an infinite line.
///
/// Returns `(on_edge, on_line)`, or `None` for a zero length line or when the
/// two are parallel.
pub fn nearest_edge_point_to_line(
    e0: &Point3<f64>,
    e1: &Point3<f64>,
    lp0: &Point3<f64>,
    lp1: &Point3<f64>,
    tol: &Tolerances,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let v = lp1 - lp0;
    let d = lp0 - e0;
    let e = e1 - e0;

    let v_mag = v.norm();
    if v_mag < tol.vsmall {
        return None;
    }

    let e_mag = e.norm();
    if e_mag < tol.vsmall {
        let on_line = nearest_point_on_line(lp0, lp1, e0, tol);
        return Some((*e0, on_line));
    }

    if ((v / v_mag).dot(&(e / e_mag))).abs() > 1.0 - tol.small {
        return None;
    }

    let mat = Matrix3::new(
        v.dot(&v),
        -v.dot(&e),
        0.0,
        -v.dot(&e),
        e.dot(&e),
        0.0,
        0.0,
        0.0,
        tol.small,
    );
    let source = Vector3::new(-d.dot(&v), d.dot(&e), 0.0);
    let sol = mat.try_inverse()? * source;

    let on_line = lp0 + v * sol[0];
    let on_edge = if sol[1] > 1.0 {
        *e1
    } else if sol[1] < 0.0 {
        *e0
    } else {
        e0 + e * sol[1]
    };

    Some((on_edge, on_line))
}

/// Intersection of the segment `[start, end]` with a plane
pub fn plane_intersects_edge(
    start: &Point3<f64>,
    end: &Point3<f64>,
    plane: &Plane,
    tol: &Tolerances,
) -> Option<Point3<f64>> {
    let v = end - start;
    let mag = v.norm();
    if mag < tol.vsmall {
        return None;
    }

    let n = &plane.normal;
    if n.dot(&(v / mag)) < tol.small {
        return None;
    }

    let t = n.dot(&(plane.ref_point - start)) / n.dot(&v);
    if t > -tol.small && t < 1.0 + tol.small {
        Some(start + v * t)
    } else {
        None
    }
}

/// Barycentric containment test with `[-small, 1 + small]` slack
pub fn point_in_tetrahedron(p: &Point3<f64>, tet: &Tetrahedron, tol: &Tolerances) -> bool {
    let d = &tet[3];
    let mat = Matrix3D::from_columns(&(tet[0] - d), &(tet[1] - d), &(tet[2] - d));
    let source = p - d;

    if mat.determinant().abs() < tol.vsmall {
        return false;
    }

    let lo = -tol.small;
    let hi = 1.0 + tol.small;

    let u0 = mat.solve_first(&source);
    if u0 < lo || u0 > hi {
        return false;
    }

    let u1 = mat.solve_second(&source);
    if u1 < lo || u0 + u1 > hi {
        return false;
    }

    let u2 = mat.solve_third(&source);
    if u2 < lo || u2 > hi {
        return false;
    }

    let u3 = 1.0 - u0 - u1 - u2;
    u3 >= lo && u3 <= hi
}

/// Nearest point on a triangle.
///
/// A degenerate triangle falls back to the nearest point on its three
/// edges. Outside the barycentric range the projection is clamped onto
/// the edge facing the first violated coordinate. For obtuse triangles
/// that clamp is not the Euclidean nearest point; use
/// [`closest_point_on_triangle`] for distance queries.
pub fn nearest_point_on_triangle(tri: &Triangle, p: &Point3<f64>, tol: &Tolerances) -> Point3<f64> {
    let [a, b, c] = tri;
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);

    let det = dot00 * dot11 - dot01 * dot01;

    if det.abs() < tol.vsmall {
        let mut nearest = *p;
        let mut dist = f64::MAX;
        for (s, e) in [(a, b), (b, c), (c, a)] {
            let np = nearest_point_on_edge(s, e, p, tol);
            let d = (p - np).norm_squared();
            if d < dist {
                nearest = np;
                dist = d;
            }
        }
        return nearest;
    }

    let u = (dot11 * dot02 - dot01 * dot12) / det;
    let v = (dot00 * dot12 - dot01 * dot02) / det;
    let p_proj = a + u * v0 + v * v1;

    if u >= -tol.small && v >= -tol.small && u + v <= 1.0 + tol.small {
        return p_proj;
    }

    let clamp_to = |from: &Point3<f64>, to: &Point3<f64>| {
        let ev = to - from;
        let ed = (p_proj - from).dot(&ev) / (ev.norm_squared() + tol.vsmall);
        if ed > 1.0 {
            *to
        } else if ed < 0.0 {
            *from
        } else {
            from + ev * ed
        }
    };

    if u < -tol.small {
        clamp_to(a, c)
    } else if v < -tol.small {
        clamp_to(a, b)
    } else {
        clamp_to(c, b)
    }
}

/// Euclidean closest point on a triangle.
///
/// The plane projection when it falls inside the triangle, otherwise the
/// closest of the three edge projections.
pub fn closest_point_on_triangle(tri: &Triangle, p: &Point3<f64>, tol: &Tolerances) -> Point3<f64> {
    let [a, b, c] = tri;
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let dot00 = v0.dot(&v0);
    let dot01 = v0.dot(&v1);
    let dot02 = v0.dot(&v2);
    let dot11 = v1.dot(&v1);
    let dot12 = v1.dot(&v2);

    let det = dot00 * dot11 - dot01 * dot01;
    if det.abs() >= tol.vsmall {
        let u = (dot11 * dot02 - dot01 * dot12) / det;
        let v = (dot00 * dot12 - dot01 * dot02) / det;
        if u >= 0.0 && v >= 0.0 && u + v <= 1.0 {
            return a + u * v0 + v * v1;
        }
    }

    [(a, b), (b, c), (c, a)]
        .into_iter()
        .map(|(s, e)| nearest_point_on_edge(s, e, p, tol))
        .fold((*p, f64::MAX), |best, np| {
            let d = (p - np).norm_squared();
            if d < best.1 {
                (np, d)
            } else {
                best
            }
        })
        .0
}

/// Point minimising the squared distance to a set of planes.
///
/// `None` when the planes do not pin a point down (fewer than three
/// independent normals).
pub fn find_minimizer_point(
    origins: &[Point3<f64>],
    normals: &[Vector3<f64>],
    tol: &Tolerances,
) -> Option<Point3<f64>> {
    assert_eq!(
        origins.len(),
        normals.len(),
        "size of normals {} and origins {} do not match",
        normals.len(),
        origins.len()
    );

    let mut mat = Matrix3::zeros();
    let mut source = Vector3::zeros();

    for (origin, normal) in origins.iter().zip(normals) {
        let n = normal / (normal.norm() + tol.vsmall);
        mat += n * n.transpose();
        source += origin.coords.dot(&n) * n;
    }

    if mat.determinant().abs() < tol.small {
        return None;
    }

    mat.try_inverse().map(|inv| Point3::from(inv * source))
}

/// Slab test of the segment `[s, e]` against a box
pub fn bound_box_line_intersection(
    s: &Point3<f64>,
    e: &Point3<f64>,
    bb: &BoundingBox,
    tol: &Tolerances,
) -> bool {
    let mut t_max = 1.0 + tol.small;
    let mut t_min = -tol.small;

    let v = e - s;
    let d = v.norm();

    if d < tol.vsmall {
        return bb.contains(s);
    }

    for dir in 0..3 {
        let vd = v[dir];
        let sd = s[dir];

        if vd.abs() > tol.small * d {
            if vd >= 0.0 {
                t_min = t_min.max((bb.min[dir] - sd) / vd);
                t_max = t_max.min((bb.max[dir] - sd) / vd);
            } else {
                t_min = t_min.max((bb.max[dir] - sd) / vd);
                t_max = t_max.min((bb.min[dir] - sd) / vd);
            }
        } else if sd < bb.min[dir] || sd > bb.max[dir] {
            return false;
        }
    }

    t_max - t_min > -tol.small
}

/// True if `p` lies on the infinite line through the edge
pub fn vertex_on_line(p: &Point3<f64>, e0: &Point3<f64>, e1: &Point3<f64>, tol: &Tolerances) -> bool {
    let v = e1 - e0;
    let v = v / (v.norm() + tol.vsmall);
    let pv = p - e0;
    let pv_mag = pv.norm();
    if pv_mag < tol.vsmall {
        return true;
    }
    (pv / pv_mag).dot(&v).abs() > 1.0 - tol.small
}

pub fn vertex_in_plane(p: &Point3<f64>, plane: &Plane, tol: &Tolerances) -> bool {
    let mut d = p - plane.ref_point;
    let mag = d.norm();
    if mag > tol.vsmall {
        d /= mag;
    }
    d.dot(&plane.normal).abs() < tol.small
}

/// Overlapping part of two nearly collinear edges.
///
/// Edges deviating by more than `cos_tol` are rejected, as are edges whose
/// end points are further than `dist_tol` from the other edge line.
pub fn do_edges_overlap(
    e0p0: &Point3<f64>,
    e0p1: &Point3<f64>,
    e1p0: &Point3<f64>,
    e1p1: &Point3<f64>,
    dist_tol: f64,
    cos_tol: f64,
    tol: &Tolerances,
) -> Option<[Point3<f64>; 2]> {
    if dist_tol < 0.0 {
        log::warn!("edge overlap queried without a distance tolerance");
        return None;
    }

    let e0 = e0p1 - e0p0;
    let e0 = e0 / (e0.norm() + tol.vsmall);
    let e1 = e1p1 - e1p0;
    let e1 = e1 / (e1.norm() + tol.vsmall);

    if e0.dot(&e1).abs() < cos_tol {
        return None;
    }

    let t00 = (e1p0 - e0p0).dot(&e0);
    let t01 = (e1p1 - e0p0).dot(&e0);
    let t10 = (e0p0 - e1p0).dot(&e1);
    let t11 = (e0p1 - e1p0).dot(&e1);

    let dist_tol_sq = dist_tol * dist_tol;
    let collinear = (e0p0 + t00 * e0 - e1p0).norm_squared() <= dist_tol_sq
        || (e0p0 + t01 * e0 - e1p1).norm_squared() <= dist_tol_sq
        || (e1p0 + t10 * e1 - e0p0).norm_squared() <= dist_tol_sq
        || (e1p0 + t11 * e1 - e0p1).norm_squared() <= dist_tol_sq;

    if !collinear {
        return None;
    }

    let vec = e0 + if e0.dot(&e1) > 0.0 { e1 } else { -e1 };
    let vec = vec / (vec.norm() + tol.vsmall);
    let origin =
        Point3::from(0.25 * (e0p0.coords + e0p1.coords + e1p0.coords + e1p1.coords));

    let t00 = (e0p0 - origin).dot(&vec);
    let t01 = (e0p1 - origin).dot(&vec);
    let t10 = (e1p0 - origin).dot(&vec);
    let t11 = (e1p1 - origin).dot(&vec);

    let t0_min = t00.min(t01);
    let t0_max = t00.max(t01);
    let t1_min = t10.min(t11);
    let t1_max = t10.max(t11);

    if t1_min < t0_max {
        Some([origin + t1_min * vec, origin + t0_max * vec])
    } else if t0_min < t1_max {
        Some([origin + t0_min * vec, origin + t1_max * vec])
    } else {
        None
    }
}

/// Inside test against the face edges using a known face normal.
///
/// A point within `dist_tol` of a face vertex counts as inside.
pub fn point_inside_face(
    p: &Point3<f64>,
    face: &[usize],
    normal: &Vector3<f64>,
    points: &[Point3<f64>],
    dist_tol: f64,
) -> bool {
    for i in 0..face.len() {
        let pv = p - points[face[i]];
        let mag = pv.norm();
        if mag < dist_tol {
            return true;
        }
        let pv = pv / mag;

        let lv = normal.cross(&face_edge(face, i).vec(points));
        let lv = lv / lv.norm();

        if pv.dot(&lv) < -dist_tol {
            return false;
        }
    }
    true
}

/// Inside test by distance to the triangle fan around the face centre
pub fn point_inside_face_fan(
    p: &Point3<f64>,
    face: &[usize],
    points: &[Point3<f64>],
    dist_tol: f64,
    tol: &Tolerances,
) -> bool {
    let c = face_centre(face, points);
    let tol_sq = dist_tol * dist_tol;

    (0..face.len()).any(|i| {
        let e = face_edge(face, i);
        let tri = [points[e.start], points[e.end], c];
        (closest_point_on_triangle(&tri, p, tol) - p).norm_squared() <= tol_sq
    })
}

/// Convexity of a face; the returned flags mark the corners that are not
/// concave. A zero area face has every corner flagged.
pub fn is_face_convex_and_ok(
    face: &[usize],
    points: &[Point3<f64>],
    tol: &Tolerances,
) -> (bool, Vec<bool>) {
    let area = face_area_normal(face, points).norm();
    if area < tol.vsmall {
        return (false, vec![false; face.len()]);
    }

    let normal = face_unit_normal(face, points);
    let edge_vecs: Vec<Vector3<f64>> = (0..face.len())
        .map(|i| {
            let v = face_edge(face, i).vec(points);
            v / (v.norm() + tol.vsmall)
        })
        .collect();

    let mut valid = true;
    let ok: Vec<bool> = (0..face.len())
        .map(|i| {
            let prev = (i + face.len() - 1) % face.len();
            let convex = edge_vecs[prev].cross(&edge_vecs[i]).dot(&normal) >= -0.05;
            valid &= convex;
            convex
        })
        .collect();

    (valid, ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn right_triangle() -> Triangle {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_nearest_point_on_edge_clamps() {
        let tol = Tolerances::default();
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        assert_eq!(nearest_point_on_edge(&a, &b, &Point3::new(-1.0, 1.0, 0.0), &tol), a);
        assert_eq!(nearest_point_on_edge(&a, &b, &Point3::new(3.0, 1.0, 0.0), &tol), b);

        let np = nearest_point_on_edge(&a, &b, &Point3::new(0.5, 1.0, 0.0), &tol);
        assert_relative_eq!(np, Point3::new(0.5, 0.0, 0.0));
        assert_eq!(nearest_point_on_edge(&a, &b, &np, &tol), np);

        assert_eq!(nearest_point_on_edge(&a, &a, &b, &tol), a);
    }

    #[test]
    fn test_nearest_point_on_triangle_inside_and_outside() {
        let tol = Tolerances::default();
        let tri = right_triangle();

        let inside = Point3::new(0.25, 0.25, 0.0);
        assert_relative_eq!(nearest_point_on_triangle(&tri, &inside, &tol), inside);

        let np = nearest_point_on_triangle(&tri, &Point3::new(2.0, 2.0, 0.0), &tol);
        assert_relative_eq!(np, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);

        let above = Point3::new(0.2, 0.1, 3.0);
        assert_relative_eq!(
            nearest_point_on_triangle(&tri, &above, &tol),
            Point3::new(0.2, 0.1, 0.0),
            epsilon = 1e-12
        );

        let corner = nearest_point_on_triangle(&tri, &Point3::new(-1.0, -1.0, 0.0), &tol);
        assert_relative_eq!(corner, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_closest_point_on_obtuse_triangle() {
        let tol = Tolerances::default();
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
        ];
        let p = Point3::new(8.0, 2.0, 0.0);

        let np = closest_point_on_triangle(&tri, &p, &tol);
        assert_relative_eq!(np, Point3::new(100.0 / 13.0, 6.0 / 13.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!((p - np).norm(), 1.569, epsilon = 1e-3);

        // the barycentric clamp lands on the apex instead
        let clamped = nearest_point_on_triangle(&tri, &p, &tol);
        assert!((p - clamped).norm() > (p - np).norm() + 1.0);

        let inside = Point3::new(5.0, 0.5, 2.0);
        assert_relative_eq!(
            closest_point_on_triangle(&tri, &inside, &tol),
            Point3::new(5.0, 0.5, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_degenerate_triangle_uses_edges() {
        let tol = Tolerances::default();
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        let np = nearest_point_on_triangle(&tri, &Point3::new(0.5, 1.0, 0.0), &tol);
        assert_relative_eq!(np, Point3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_point_in_tetrahedron() {
        let tol = Tolerances::default();
        let tet = [
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 0.0),
        ];
        assert!(point_in_tetrahedron(&Point3::new(0.1, 0.1, 0.1), &tet, &tol));
        assert!(point_in_tetrahedron(&Point3::new(0.0, 0.0, 0.0), &tet, &tol));
        assert!(!point_in_tetrahedron(&Point3::new(0.5, 0.5, 0.5), &tet, &tol));

        let flat = [tet[0], tet[1], tet[3], tet[3]];
        assert!(!point_in_tetrahedron(&Point3::new(0.1, 0.1, 0.0), &flat, &tol));
    }

    #[test]
    fn test_plane_intersects_edge() {
        let tol = Tolerances::default();
        let plane = Plane::new(Point3::new(0.0, 0.0, 0.5), Vector3::z());
        let hit = plane_intersects_edge(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
            &plane,
            &tol,
        );
        assert_relative_eq!(hit.unwrap(), Point3::new(0.0, 0.0, 0.5));

        let parallel = plane_intersects_edge(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &plane,
            &tol,
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn test_bound_box_line_intersection() {
        let tol = Tolerances::default();
        let bb = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(bound_box_line_intersection(
            &Point3::new(-1.0, 0.5, 0.5),
            &Point3::new(2.0, 0.5, 0.5),
            &bb,
            &tol
        ));
        assert!(!bound_box_line_intersection(
            &Point3::new(-1.0, 2.0, 0.5),
            &Point3::new(2.0, 2.0, 0.5),
            &bb,
            &tol
        ));
        assert!(!bound_box_line_intersection(
            &Point3::new(-2.0, 0.5, 0.5),
            &Point3::new(-1.0, 0.5, 0.5),
            &bb,
            &tol
        ));
    }

    #[test]
    fn test_find_minimizer_point() {
        let tol = Tolerances::default();
        let target = Point3::new(1.0, 2.0, 3.0);
        let normals = [Vector3::x(), Vector3::y(), Vector3::z()];
        let origins = [target, target, target];
        let p = find_minimizer_point(&origins, &normals, &tol).unwrap();
        assert_relative_eq!(p, target, epsilon = 1e-12);

        assert!(find_minimizer_point(&origins[..2], &normals[..2], &tol).is_none());
    }

    #[test]
    fn test_nearest_edge_point_to_line() {
        let tol = Tolerances::default();
        let (on_edge, on_line) = nearest_edge_point_to_line(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.5, -1.0, 1.0),
            &Point3::new(0.5, 1.0, 1.0),
            &tol,
        )
        .unwrap();
        assert_relative_eq!(on_edge, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(on_line, Point3::new(0.5, 0.0, 1.0), epsilon = 1e-9);

        assert!(nearest_edge_point_to_line(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            &Point3::new(1.0, 1.0, 0.0),
            &tol,
        )
        .is_none());
    }

    #[test]
    fn test_vertex_on_line_and_in_plane() {
        let tol = Tolerances::default();
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 0.0);
        assert!(vertex_on_line(&Point3::new(3.0, 3.0, 0.0), &a, &b, &tol));
        assert!(!vertex_on_line(&Point3::new(3.0, 2.0, 0.0), &a, &b, &tol));

        let plane = Plane::new(a, Vector3::z());
        assert!(vertex_in_plane(&Point3::new(5.0, -2.0, 0.0), &plane, &tol));
        assert!(!vertex_in_plane(&Point3::new(5.0, -2.0, 0.1), &plane, &tol));
    }

    #[test]
    fn test_edges_overlap() {
        let tol = Tolerances::default();
        let cos_tol = (5.0f64).to_radians().cos();
        let overlap = do_edges_overlap(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(2.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(3.0, 0.0, 0.0),
            1e-6,
            cos_tol,
            &tol,
        )
        .unwrap();
        let xs = [overlap[0].x.min(overlap[1].x), overlap[0].x.max(overlap[1].x)];
        assert_relative_eq!(xs[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(xs[1], 2.0, epsilon = 1e-12);

        assert!(do_edges_overlap(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            1e-6,
            cos_tol,
            &tol,
        )
        .is_none());
    }

    #[test]
    fn test_point_inside_face() {
        let tol = Tolerances::default();
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let face = vec![0, 1, 2, 3];
        let n = Vector3::z();
        assert!(point_inside_face(&Point3::new(0.5, 0.5, 0.0), &face, &n, &points, 1e-9));
        assert!(!point_inside_face(&Point3::new(1.5, 0.5, 0.0), &face, &n, &points, 1e-9));
        assert!(point_inside_face_fan(&Point3::new(0.5, 0.2, 0.0), &face, &points, 1e-9, &tol));
        assert!(!point_inside_face_fan(&Point3::new(0.5, 0.2, 0.5), &face, &points, 1e-9, &tol));
    }

    #[test]
    fn test_face_convexity() {
        let tol = Tolerances::default();
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, 0.5, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        let (convex, ok) = is_face_convex_and_ok(&[0, 1, 3, 4], &points, &tol);
        assert!(convex);
        assert!(ok.iter().all(|&b| b));

        let (convex, ok) = is_face_convex_and_ok(&[0, 1, 2, 3, 4], &points, &tol);
        assert!(!convex);
        assert!(!ok[2]);
    }
}
