// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Dense 3x3 matrix with a cached determinant and Cramer's-rule solves.
//!
//! The barycentric predicates only ever need one or two components of the
//! solution, so each component has its own solve sharing the cached
//! determinant.

use nalgebra::{Matrix3, Vector3};
use std::cell::Cell;

#[derive(Debug, Clone)]
pub struct Matrix3D {
    m: Matrix3<f64>,
    det: Cell<Option<f64>>,
}

impl Matrix3D {
    pub fn zeros() -> Self {
        Self::from_matrix(Matrix3::zeros())
    }

    pub fn from_matrix(m: Matrix3<f64>) -> Self {
        Self {
            m,
            det: Cell::new(None),
        }
    }

    /// Build from three column vectors
    pub fn from_columns(c0: &Vector3<f64>, c1: &Vector3<f64>, c2: &Vector3<f64>) -> Self {
        Self::from_matrix(Matrix3::from_columns(&[*c0, *c1, *c2]))
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.m[(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.m[(row, col)] = value;
        self.det.set(None);
    }

    pub fn column(&self, col: usize) -> Vector3<f64> {
        self.m.column(col).into_owned()
    }

    /// Determinant, computed once until the matrix is modified
    pub fn determinant(&self) -> f64 {
        if let Some(det) = self.det.get() {
            return det;
        }
        let m = &self.m;
        let det = m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
            - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
            + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)]);
        self.det.set(Some(det));
        det
    }

    fn solve_component(&self, col: usize, source: &Vector3<f64>) -> f64 {
        let mut replaced = self.m;
        replaced.set_column(col, source);
        let r = &replaced;
        let num = r[(0, 0)] * (r[(1, 1)] * r[(2, 2)] - r[(1, 2)] * r[(2, 1)])
            - r[(0, 1)] * (r[(1, 0)] * r[(2, 2)] - r[(1, 2)] * r[(2, 0)])
            + r[(0, 2)] * (r[(1, 0)] * r[(2, 1)] - r[(1, 1)] * r[(2, 0)]);
        num / self.determinant()
    }

    pub fn solve_first(&self, source: &Vector3<f64>) -> f64 {
        self.solve_component(0, source)
    }

    pub fn solve_second(&self, source: &Vector3<f64>) -> f64 {
        self.solve_component(1, source)
    }

    pub fn solve_third(&self, source: &Vector3<f64>) -> f64 {
        self.solve_component(2, source)
    }

    /// Full solution. Callers check the determinant against their tolerance
    /// first; a singular matrix yields non-finite components.
    pub fn solve(&self, source: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(
            self.solve_first(source),
            self.solve_second(source),
            self.solve_third(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> Matrix3D {
        Matrix3D::from_columns(
            &Vector3::new(2.0, 1.0, 0.5),
            &Vector3::new(-1.0, 3.0, 0.0),
            &Vector3::new(0.25, 0.0, 4.0),
        )
    }

    #[test]
    fn test_solve_own_columns_gives_unit_vectors() {
        let m = sample();
        assert!(m.determinant().abs() > 1e-6);
        for col in 0..3 {
            let sol = m.solve(&m.column(col));
            let mut expected = Vector3::zeros();
            expected[col] = 1.0;
            assert_relative_eq!(sol, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_determinant_matches_nalgebra() {
        let m = sample();
        let reference = Matrix3::from_columns(&[m.column(0), m.column(1), m.column(2)]);
        assert_relative_eq!(m.determinant(), reference.determinant(), epsilon = 1e-12);
    }

    #[test]
    fn test_set_invalidates_cached_determinant() {
        let mut m = Matrix3D::from_matrix(Matrix3::identity());
        assert_eq!(m.determinant(), 1.0);
        m.set(2, 2, 3.0);
        assert_eq!(m.determinant(), 3.0);
    }
}
