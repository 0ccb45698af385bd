// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Face and cell geometry of a [`PolyMesh`].
//!
//! Faces are split into triangles around their point average; the centre is
//! the area weighted triangle centre. Cells are split into pyramids from an
//! estimated centre (the average of the face centres) to every face.

use super::face::{face_average, next_label, Face};
use super::poly_mesh::PolyMesh;
use crate::utils::math::VSMALL;
use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone)]
pub struct MeshGeometry {
    pub face_centres: Vec<Point3<f64>>,
    /// Area vectors
    pub face_areas: Vec<Vector3<f64>>,
    pub cell_centres: Vec<Point3<f64>>,
    pub cell_volumes: Vec<f64>,
}

/// Centre and area vector of one face
pub fn face_centre_and_area(face: &[usize], points: &[Point3<f64>]) -> (Point3<f64>, Vector3<f64>) {
    if face.len() == 3 {
        let (p0, p1, p2) = (&points[face[0]], &points[face[1]], &points[face[2]]);
        let centre = Point3::from((p0.coords + p1.coords + p2.coords) / 3.0);
        return (centre, 0.5 * (p1 - p0).cross(&(p2 - p0)));
    }

    let f_centre = face_average(face, points);

    let mut sum_n = Vector3::zeros();
    let mut sum_a = 0.0;
    let mut sum_ac = Vector3::zeros();

    for i in 0..face.len() {
        let this_point = &points[face[i]];
        let next_point = &points[next_label(face, i)];

        let c = this_point.coords + next_point.coords + f_centre.coords;
        let n = (next_point - this_point).cross(&(f_centre - this_point));
        let a = n.norm();

        sum_n += n;
        sum_a += a;
        sum_ac += a * c;
    }

    (
        Point3::from(sum_ac / (3.0 * (sum_a + VSMALL))),
        0.5 * sum_n,
    )
}

impl MeshGeometry {
    pub fn new(mesh: &PolyMesh) -> Self {
        Self::from_parts(
            mesh.points(),
            mesh.faces(),
            mesh.owner(),
            mesh.neighbour(),
            mesh.n_cells(),
        )
    }

    /// Geometry of the given connectivity evaluated at arbitrary points
    pub fn from_parts(
        points: &[Point3<f64>],
        faces: &[Face],
        owner: &[usize],
        neighbour: &[usize],
        n_cells: usize,
    ) -> Self {
        let (face_centres, face_areas): (Vec<_>, Vec<_>) = faces
            .iter()
            .map(|f| face_centre_and_area(f, points))
            .unzip();

        let mut c_est = vec![Vector3::zeros(); n_cells];
        let mut n_cell_faces = vec![0usize; n_cells];
        for (facei, &own) in owner.iter().enumerate() {
            c_est[own] += face_centres[facei].coords;
            n_cell_faces[own] += 1;
        }
        for (facei, &nei) in neighbour.iter().enumerate() {
            c_est[nei] += face_centres[facei].coords;
            n_cell_faces[nei] += 1;
        }
        let c_est: Vec<Point3<f64>> = c_est
            .iter()
            .zip(&n_cell_faces)
            .map(|(c, &n)| Point3::from(c / n.max(1) as f64))
            .collect();

        let mut cell_centres = vec![Vector3::zeros(); n_cells];
        let mut cell_volumes = vec![0.0; n_cells];

        for (facei, &own) in owner.iter().enumerate() {
            let pyr3_vol = face_areas[facei]
                .dot(&(face_centres[facei] - c_est[own]))
                .max(VSMALL);
            let pc = 0.75 * face_centres[facei].coords + 0.25 * c_est[own].coords;
            cell_centres[own] += pyr3_vol * pc;
            cell_volumes[own] += pyr3_vol;
        }
        for (facei, &nei) in neighbour.iter().enumerate() {
            let pyr3_vol = face_areas[facei]
                .dot(&(c_est[nei] - face_centres[facei]))
                .max(VSMALL);
            let pc = 0.75 * face_centres[facei].coords + 0.25 * c_est[nei].coords;
            cell_centres[nei] += pyr3_vol * pc;
            cell_volumes[nei] += pyr3_vol;
        }

        let cell_centres = cell_centres
            .iter()
            .zip(&cell_volumes)
            .map(|(c, &v)| Point3::from(c / v))
            .collect();
        let cell_volumes = cell_volumes.iter().map(|v| v / 3.0).collect();

        Self {
            face_centres,
            face_areas,
            cell_centres,
            cell_volumes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_planar_quad() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let (c, a) = face_centre_and_area(&[0, 1, 2, 3], &points);
        assert_relative_eq!(c, Point3::new(1.0, 0.5, 0.0), epsilon = 1e-12);
        assert_relative_eq!(a, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_unit_cube_cell() {
        let mesh = PolyMesh::block([1, 1, 1], Point3::new(-1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 2.0))
            .unwrap();
        let geom = MeshGeometry::new(&mesh);
        assert_relative_eq!(geom.cell_volumes[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(geom.cell_centres[0], Point3::new(-0.5, 0.5, 1.0), epsilon = 1e-12);
    }
}
