// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric predicate checks

use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use polysnap::geometry::predicates::{
    find_minimizer_point, nearest_point_on_edge, nearest_point_on_triangle, triangle_normal,
};
use polysnap::geometry::triangle_intersection::tri_line_intersection;
use polysnap::geometry::{BoundingBox, Matrix3D, Plane, Triangle};
use polysnap::utils::Tolerances;

fn unit_triangle() -> Triangle {
    [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ]
}

#[test]
fn test_nearest_point_on_triangle_regions() {
    let tol = Tolerances::default();
    let tri = unit_triangle();

    // above the interior
    let p = nearest_point_on_triangle(&tri, &Point3::new(0.25, 0.25, 3.0), &tol);
    assert_relative_eq!(p, Point3::new(0.25, 0.25, 0.0), epsilon = 1e-12);

    // beyond a vertex
    let p = nearest_point_on_triangle(&tri, &Point3::new(-1.0, -1.0, 0.5), &tol);
    assert_relative_eq!(p, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-12);

    // beyond the hypotenuse
    let p = nearest_point_on_triangle(&tri, &Point3::new(1.0, 1.0, 0.0), &tol);
    assert_relative_eq!(p, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
}

#[test]
fn test_triangle_normal_and_area() {
    let (n, area) = triangle_normal(&unit_triangle());
    assert_relative_eq!(n, Vector3::z(), epsilon = 1e-12);
    assert_relative_eq!(area, 0.5, epsilon = 1e-12);
}

#[test]
fn test_nearest_point_on_edge_clamps() {
    let tol = Tolerances::default();
    let a = Point3::new(0.0, 0.0, 0.0);
    let b = Point3::new(2.0, 0.0, 0.0);

    let p = nearest_point_on_edge(&a, &b, &Point3::new(1.0, 5.0, 0.0), &tol);
    assert_relative_eq!(p, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    let p = nearest_point_on_edge(&a, &b, &Point3::new(7.0, 1.0, 0.0), &tol);
    assert_relative_eq!(p, b);

    // a zero length edge gives its start
    let p = nearest_point_on_edge(&a, &a, &Point3::new(1.0, 1.0, 1.0), &tol);
    assert_relative_eq!(p, a);
}

#[test]
fn test_minimizer_point_of_three_planes() {
    let tol = Tolerances::default();
    let origins = [
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(0.0, 0.0, 3.0),
    ];
    let normals = [Vector3::x(), Vector3::y(), Vector3::z()];

    let p = find_minimizer_point(&origins, &normals, &tol).expect("three planes meet in a point");
    assert_relative_eq!(p, Point3::new(1.0, 2.0, 3.0), epsilon = 1e-12);

    assert!(find_minimizer_point(&origins[..2], &normals[..2], &tol).is_none());
}

#[test]
fn test_segment_through_triangle() {
    let tol = Tolerances::default();
    let tri = unit_triangle();

    let hit = tri_line_intersection(
        &tri,
        &Point3::new(0.2, 0.2, -1.0),
        &Point3::new(0.2, 0.2, 1.0),
        &tol,
    )
    .expect("segment crosses the triangle");
    assert_relative_eq!(hit, Point3::new(0.2, 0.2, 0.0), epsilon = 1e-12);

    // misses beside the triangle
    assert!(tri_line_intersection(
        &tri,
        &Point3::new(0.8, 0.8, -1.0),
        &Point3::new(0.8, 0.8, 1.0),
        &tol
    )
    .is_none());

    // stops short of the plane
    assert!(tri_line_intersection(
        &tri,
        &Point3::new(0.2, 0.2, -1.0),
        &Point3::new(0.2, 0.2, -0.5),
        &tol
    )
    .is_none());
}

#[test]
fn test_matrix_solve() {
    let m = Matrix3D::from_columns(
        &Vector3::new(2.0, 0.0, 0.0),
        &Vector3::new(0.0, 4.0, 0.0),
        &Vector3::new(1.0, 0.0, 1.0),
    );
    assert_relative_eq!(m.determinant(), 8.0, epsilon = 1e-12);

    let x = Vector3::new(1.0, -2.0, 0.5);
    let source = Vector3::new(
        2.0 * x.x + 1.0 * x.z,
        4.0 * x.y,
        x.z,
    );
    assert_relative_eq!(m.solve(&source), x, epsilon = 1e-12);
    assert_relative_eq!(m.solve_third(&source), 0.5, epsilon = 1e-12);
}

#[test]
fn test_plane_and_box() {
    let plane = Plane::new(Point3::new(0.0, 0.0, 1.0), Vector3::z());
    assert_relative_eq!(plane.signed_distance(&Point3::new(3.0, 4.0, 3.0)), 2.0);
    assert_relative_eq!(
        plane.nearest_point(&Point3::new(3.0, 4.0, -1.0)),
        Point3::new(3.0, 4.0, 1.0)
    );

    let bb = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
    assert!(bb.contains(&Point3::new(0.5, 0.5, 0.5)));
    assert!(!bb.contains(&Point3::new(1.5, 0.5, 0.5)));
    assert_relative_eq!(bb.distance_squared(&Point3::new(3.0, 0.5, 0.5)), 4.0);
    assert_relative_eq!(bb.distance_squared(&Point3::new(0.5, 0.5, 0.5)), 0.0);
}
