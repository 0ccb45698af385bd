// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Displacement smoothing and scale-back mesh motion.
//!
//! A [`MotionSmoother`] owns the mesh while it is being deformed. The caller
//! installs a displacement on the adapt patches, optionally smooths it into
//! the interior, and calls [`MotionSmoother::scale_mesh`] until the moved
//! mesh passes the quality checks. Every failing trial lowers the per-point
//! scale around the offending faces, so the next trial moves less there.
//!
//! Positions are always `old_points + scale * displacement`; a failed trial
//! stays in place until the next one.

use super::mesh_check::check_mesh;
use crate::config::{MeshQuality, MotionParameters};
use crate::error::{MeshError, Result};
use crate::mesh::{PatchKind, PolyMesh};
use crate::parallel::{CombineOp, Syncable};
use crate::patch::PrimitivePatch;
use crate::utils::math::{SMALL, VSMALL};
use ahash::{AHashMap, AHashSet};
use nalgebra::{Point3, Vector3};
use std::collections::BTreeSet;
use std::ops::{Add, Mul};

/// Point values that can be averaged over edges
pub trait Averageable: Syncable + Default + Add<Output = Self> + Mul<f64, Output = Self> {}

impl<T> Averageable for T where T: Syncable + Default + Add<Output = T> + Mul<f64, Output = T> {}

pub struct MotionSmoother {
    mesh: PolyMesh,
    adapt_patch_ids: Vec<usize>,
    patch: PrimitivePatch,
    params: MotionParameters,
    quality: MeshQuality,

    displacement: Vec<Vector3<f64>>,
    scale: Vec<f64>,
    old_points: Vec<Point3<f64>>,

    /// Displacement prescribed on the adapt patch points
    patch_displacement: Vec<Vector3<f64>>,
    is_internal_point: Vec<bool>,
    is_master_edge: Vec<bool>,
    /// Non-adapt points on symmetry planes with their patches
    slip_points: Vec<(usize, Vec<usize>)>,
    /// Non-adapt points on fixed patches
    fixed_points: Vec<usize>,

    wrong_faces: BTreeSet<usize>,
}

impl MotionSmoother {
    /// Take over `mesh` with the given patches as the moving (adapt) patches
    pub fn new(
        mesh: PolyMesh,
        adapt_patch_ids: Vec<usize>,
        params: MotionParameters,
        quality: MeshQuality,
    ) -> Result<Self> {
        if let Some(&bad) = adapt_patch_ids.iter().find(|&&p| p >= mesh.patches().len()) {
            return Err(MeshError::UnknownPatch(bad.to_string()));
        }

        let patch = PrimitivePatch::from_patches(&mesh, &adapt_patch_ids);
        let adapt_points: AHashSet<usize> = patch.mesh_points().iter().copied().collect();

        let mut is_internal_point = mesh.boundary_points();
        is_internal_point.iter_mut().for_each(|b| *b = !*b);

        let mut slip: AHashMap<usize, Vec<usize>> = AHashMap::new();
        let mut fixed = AHashSet::new();
        for (patchi, p) in mesh.patches().iter().enumerate() {
            if adapt_patch_ids.contains(&patchi) {
                continue;
            }
            for facei in p.range() {
                for &pointi in &mesh.faces()[facei] {
                    match p.kind {
                        PatchKind::SymmetryPlane => {
                            let patches = slip.entry(pointi).or_default();
                            if !patches.contains(&patchi) {
                                patches.push(patchi);
                            }
                        }
                        PatchKind::Patch | PatchKind::Wall => {
                            fixed.insert(pointi);
                        }
                    }
                }
            }
        }
        let mut slip_points: Vec<(usize, Vec<usize>)> = slip.into_iter().collect();
        slip_points.sort_unstable_by_key(|(p, _)| *p);
        let mut fixed_points: Vec<usize> = fixed.into_iter().collect();
        fixed_points.sort_unstable();

        log::debug!(
            "Motion smoother: {} adapt points, {} slip points, {} fixed points",
            adapt_points.len(),
            slip_points.len(),
            fixed_points.len()
        );

        let is_master_edge = mesh.coupling().master_edges(mesh.edges());
        let n_points = mesh.n_points();
        let n_patch_points = patch.n_points();

        Ok(Self {
            old_points: mesh.points().to_vec(),
            mesh,
            adapt_patch_ids,
            patch,
            params,
            quality,
            displacement: vec![Vector3::zeros(); n_points],
            scale: vec![1.0; n_points],
            patch_displacement: vec![Vector3::zeros(); n_patch_points],
            is_internal_point,
            is_master_edge,
            slip_points,
            fixed_points,
            wrong_faces: BTreeSet::new(),
        })
    }

    pub fn mesh(&self) -> &PolyMesh {
        &self.mesh
    }

    pub fn into_mesh(self) -> PolyMesh {
        self.mesh
    }

    /// Patch made of all adapt patch faces
    pub fn patch(&self) -> &PrimitivePatch {
        &self.patch
    }

    pub fn adapt_patch_ids(&self) -> &[usize] {
        &self.adapt_patch_ids
    }

    pub fn displacement(&self) -> &[Vector3<f64>] {
        &self.displacement
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn old_points(&self) -> &[Point3<f64>] {
        &self.old_points
    }

    pub fn params(&self) -> &MotionParameters {
        &self.params
    }

    pub fn quality(&self) -> &MeshQuality {
        &self.quality
    }

    pub fn is_internal_point(&self) -> &[bool] {
        &self.is_internal_point
    }

    /// Faces that failed the last [`scale_mesh`](Self::scale_mesh)
    pub fn wrong_faces(&self) -> &BTreeSet<usize> {
        &self.wrong_faces
    }

    /// Set the scale-back factor; returns the previous one
    pub fn set_error_reduction(&mut self, error_reduction: f64) -> f64 {
        std::mem::replace(&mut self.params.error_reduction, error_reduction)
    }

    pub fn error_reduction(&self) -> f64 {
        self.params.error_reduction
    }

    /// Install the displacement of the adapt patch points.
    ///
    /// Coupled points are zeroed first so that, after the max-magnitude
    /// sync, a copy that only touches the patch through an edge cannot
    /// override the copy that owns the face.
    ///
    /// # Panics
    ///
    /// If `patch_disp` does not have one value per patch point.
    pub fn set_displacement(&mut self, patch_disp: &[Vector3<f64>]) {
        let mesh_points = self.patch.mesh_points();
        assert_eq!(
            patch_disp.len(),
            mesh_points.len(),
            "patch displacement has {} values but the patch has {} points",
            patch_disp.len(),
            mesh_points.len()
        );

        let coupling = self.mesh.coupling();
        for p in coupling.coupled_points() {
            self.displacement[p] = Vector3::zeros();
        }
        for (&pointi, d) in mesh_points.iter().zip(patch_disp) {
            self.displacement[pointi] = *d;
        }
        coupling.sync_point_list(&mut self.displacement, CombineOp::MaxMag);

        for (i, &pointi) in mesh_points.iter().enumerate() {
            self.patch_displacement[i] = self.displacement[pointi];
        }

        self.correct_boundary_conditions();
    }

    /// Overwrite the whole displacement field, e.g. after smoothing it
    /// externally; the boundary conditions are applied afterwards.
    pub fn set_point_displacement(&mut self, displacement: Vec<Vector3<f64>>) {
        assert_eq!(
            displacement.len(),
            self.mesh.n_points(),
            "displacement has {} values for {} points",
            displacement.len(),
            self.mesh.n_points()
        );
        self.displacement = displacement;
        self.correct_boundary_conditions();
    }

    /// Unit normal of a symmetry plane patch
    fn patch_normal(&self, patchi: usize) -> Vector3<f64> {
        let areas = self.mesh.face_areas();
        let sum: Vector3<f64> = self.mesh.patches()[patchi]
            .range()
            .map(|f| areas[f])
            .sum();
        sum / (sum.norm() + VSMALL)
    }

    /// Re-impose the patch conditions on the displacement: adapt patches
    /// take their prescribed value, symmetry planes remove the normal
    /// component (all plane normals at corners), other patches are fixed.
    pub fn correct_boundary_conditions(&mut self) {
        for (i, &pointi) in self.patch.mesh_points().iter().enumerate() {
            self.displacement[pointi] = self.patch_displacement[i];
        }

        let normals: AHashMap<usize, Vector3<f64>> = self
            .slip_points
            .iter()
            .flat_map(|(_, patches)| patches.iter().copied())
            .collect::<AHashSet<usize>>()
            .into_iter()
            .map(|patchi| (patchi, self.patch_normal(patchi)))
            .collect();

        for (pointi, patches) in &self.slip_points {
            // orthonormal basis of the constraining normals
            let mut basis: Vec<Vector3<f64>> = Vec::with_capacity(patches.len());
            for patchi in patches {
                let mut n = normals.get(patchi).copied().unwrap_or_else(Vector3::zeros);
                for b in &basis {
                    n -= b * b.dot(&n);
                }
                let mag = n.norm();
                if mag > SMALL {
                    basis.push(n / mag);
                }
            }

            let d = &mut self.displacement[*pointi];
            for b in &basis {
                let normal_component = b.dot(d);
                *d -= b * normal_component;
            }
        }

        for &pointi in &self.fixed_points {
            self.displacement[pointi] = Vector3::zeros();
        }

        self.mesh
            .coupling()
            .sync_point_list(&mut self.displacement, CombineOp::MaxMag);
    }

    /// Weighted average of the edge neighbours of every point. Coupled
    /// edges are counted once. Points without weight keep their value.
    ///
    /// # Panics
    ///
    /// If the field or weights do not match the mesh.
    pub fn avg<T: Averageable>(&self, fld: &[T], edge_weight: &[f64]) -> Vec<T> {
        let edges = self.mesh.edges();
        assert_eq!(fld.len(), self.mesh.n_points(), "field is not a point field");
        assert_eq!(
            edge_weight.len(),
            edges.len(),
            "{} edge weights for {} edges",
            edge_weight.len(),
            edges.len()
        );

        let mut sum = vec![T::default(); fld.len()];
        let mut sum_weight = vec![0.0; fld.len()];

        for (edgei, e) in edges.iter().enumerate() {
            if !self.is_master_edge[edgei] {
                continue;
            }
            let w = edge_weight[edgei];
            sum[e.start] = sum[e.start] + fld[e.end] * w;
            sum[e.end] = sum[e.end] + fld[e.start] * w;
            sum_weight[e.start] += w;
            sum_weight[e.end] += w;
        }

        let coupling = self.mesh.coupling();
        coupling.sync_point_list(&mut sum, CombineOp::Sum);
        coupling.sync_point_list(&mut sum_weight, CombineOp::Sum);

        sum.into_iter()
            .zip(&sum_weight)
            .zip(fld)
            .map(|((s, &w), &old)| if w < VSMALL { old } else { s * (1.0 / w) })
            .collect()
    }

    /// One Jacobi sweep over the internal points: half the old value plus
    /// half the neighbour average. Boundary points are left alone.
    pub fn smooth<T: Averageable>(&self, fld: &[T], edge_weight: &[f64]) -> Vec<T> {
        let avg_fld = self.avg(fld, edge_weight);
        fld.iter()
            .zip(avg_fld)
            .zip(&self.is_internal_point)
            .map(|((&old, avg), &internal)| {
                if internal {
                    old * 0.5 + avg * 0.5
                } else {
                    old
                }
            })
            .collect()
    }

    /// Smooth the displacement once and re-apply the patch conditions
    pub fn smooth_displacement(&mut self, edge_weight: &[f64]) {
        self.displacement = self.smooth(&self.displacement, edge_weight);
        self.correct_boundary_conditions();
    }

    /// Move the mesh and the patch to new positions
    pub fn move_points(&mut self, new_points: Vec<Point3<f64>>) {
        self.patch.move_points(new_points.clone());
        self.mesh.move_points(new_points);
    }

    /// Accept the current positions as the new start
    pub fn correct(&mut self) {
        self.old_points = self.mesh.points().to_vec();
        self.scale.iter_mut().for_each(|s| *s = 1.0);
        self.correct_boundary_conditions();
    }

    /// Faces within `n_point_iter` point layers of the wrong faces, and the
    /// points of those faces
    pub fn get_affected_faces_and_points(
        &self,
        n_point_iter: usize,
        wrong_faces: &BTreeSet<usize>,
    ) -> (BTreeSet<usize>, Vec<bool>) {
        let mut is_affected_point = vec![false; self.mesh.n_points()];
        let mut next_faces = wrong_faces.clone();
        let mut affected_faces = BTreeSet::new();

        for _ in 0..n_point_iter {
            affected_faces = next_faces;

            for &facei in &affected_faces {
                for &pointi in &self.mesh.faces()[facei] {
                    is_affected_point[pointi] = true;
                }
            }
            self.mesh
                .coupling()
                .sync_point_list(&mut is_affected_point, CombineOp::Max);

            next_faces = is_affected_point
                .iter()
                .enumerate()
                .filter(|(_, &a)| a)
                .flat_map(|(pointi, _)| self.mesh.point_faces()[pointi].iter().copied())
                .collect();
        }

        (affected_faces, is_affected_point)
    }

    /// Smooth the scale at the affected points without ever increasing it
    pub fn min_smooth(&self, is_affected_point: &[bool], fld: &mut [f64]) {
        let uniform = vec![1.0; self.mesh.edges().len()];
        let avg_fld = self.avg(fld, &uniform);
        for (pointi, v) in fld.iter_mut().enumerate() {
            if is_affected_point[pointi] {
                *v = v.min(0.5 * *v + 0.5 * avg_fld[pointi]);
            }
        }
        self.mesh.coupling().sync_point_list(fld, CombineOp::Min);
    }

    /// Positions for the current scale and displacement
    fn scaled_points(&self, smooth_internal: bool) -> Vec<Point3<f64>> {
        let mut total: Vec<Vector3<f64>> = self
            .displacement
            .iter()
            .zip(&self.scale)
            .map(|(d, s)| d * *s)
            .collect();

        if smooth_internal {
            let uniform = vec![1.0; self.mesh.edges().len()];
            let avg_total = self.avg(&total, &uniform);
            for (pointi, t) in total.iter_mut().enumerate() {
                if self.is_internal_point[pointi] {
                    *t = avg_total[pointi];
                }
            }
        }

        self.old_points
            .iter()
            .zip(&total)
            .map(|(p, t)| p + t)
            .collect()
    }

    /// Move to `old_points + scale * displacement` and check the faces.
    /// Returns true if at most `n_allow` faces fail. Otherwise the scale is
    /// reduced around the failing faces for the next call and the mesh
    /// keeps the failed positions.
    pub fn scale_mesh(
        &mut self,
        check_faces: Option<&[usize]>,
        baffles: &[(usize, usize)],
        smooth_internal: bool,
        n_allow: usize,
    ) -> bool {
        let comm = self.mesh.comm_handle();
        let (min_scale, max_scale) = self
            .scale
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        log::info!(
            "Moving mesh using displacement scaling : min:{:.4} max:{:.4}",
            comm.min(min_scale),
            comm.max(max_scale)
        );

        let new_points = self.scaled_points(smooth_internal);
        self.move_points(new_points);

        let mut wrong_faces = BTreeSet::new();
        let n_wrong = check_mesh(
            false,
            &self.mesh,
            &self.quality,
            check_faces,
            baffles,
            &mut wrong_faces,
        );

        if n_wrong <= n_allow {
            log::info!("Successfully moved mesh");
            self.wrong_faces = wrong_faces;
            return true;
        }

        log::info!("Moving mesh failed the checks on {} faces", n_wrong);

        if self.params.error_reduction < SMALL {
            // put the points of the failing faces back
            let mut points = self.mesh.points().to_vec();
            for &facei in &wrong_faces {
                for &pointi in &self.mesh.faces()[facei] {
                    points[pointi] = self.old_points[pointi];
                    self.scale[pointi] = 0.0;
                }
            }
            self.move_points(points);
        } else {
            let (_, is_affected_point) =
                self.get_affected_faces_and_points(self.params.n_smooth_scale, &wrong_faces);

            for (s, &affected) in self.scale.iter_mut().zip(&is_affected_point) {
                if affected {
                    *s *= self.params.error_reduction;
                }
            }

            let mut scale = std::mem::take(&mut self.scale);
            for _ in 0..self.params.n_smooth_scale {
                self.min_smooth(&is_affected_point, &mut scale);
            }
            self.scale = scale;
        }

        self.wrong_faces = wrong_faces;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn block(n: usize) -> PolyMesh {
        PolyMesh::block([n, n, n], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    fn top_smoother(mut mesh: PolyMesh) -> MotionSmoother {
        for name in ["xmin", "xmax", "ymin", "ymax"] {
            let patchi = mesh.find_patch(name).unwrap();
            mesh.set_patch_kind(patchi, PatchKind::SymmetryPlane);
        }
        let zmax = mesh.find_patch("zmax").unwrap();
        MotionSmoother::new(mesh, vec![zmax], MotionParameters::default(), MeshQuality::default()).unwrap()
    }

    fn point_at(mesh: &PolyMesh, p: Point3<f64>) -> usize {
        mesh.points().iter().position(|q| (q - p).norm() < 1e-9).unwrap()
    }

    #[test]
    fn test_unknown_adapt_patch() {
        let result = MotionSmoother::new(
            block(1),
            vec![42],
            MotionParameters::default(),
            MeshQuality::default(),
        );
        assert!(matches!(result, Err(MeshError::UnknownPatch(_))));
    }

    #[test]
    fn test_slip_and_fixed_conditions() {
        let mut smoother = top_smoother(block(2));
        let n = smoother.patch().n_points();
        smoother.set_displacement(&vec![Vector3::new(0.1, 0.0, -0.1); n]);

        let mesh = smoother.mesh();
        let centre = point_at(mesh, Point3::new(0.5, 0.5, 1.0));
        let side = point_at(mesh, Point3::new(0.0, 0.5, 1.0));
        let corner = point_at(mesh, Point3::new(0.0, 0.0, 1.0));
        let interior = point_at(mesh, Point3::new(0.5, 0.5, 0.5));

        let d = smoother.displacement();
        assert_relative_eq!(d[centre], Vector3::new(0.1, 0.0, -0.1));
        // xmin removes the x component
        assert_relative_eq!(d[side], Vector3::new(0.0, 0.0, -0.1), epsilon = 1e-12);
        // xmin and ymin together
        assert_relative_eq!(d[corner], Vector3::new(0.0, 0.0, -0.1), epsilon = 1e-12);
        assert_eq!(d[interior], Vector3::zeros());

        // zmin stays a fixed patch
        let bottom = point_at(mesh, Point3::new(0.5, 0.5, 0.0));
        assert_eq!(d[bottom], Vector3::zeros());
    }

    #[test]
    fn test_avg_of_linear_field() {
        let smoother = top_smoother(block(3));
        let mesh = smoother.mesh();
        let x: Vec<f64> = mesh.points().iter().map(|p| p.x).collect();
        let weights = vec![1.0; mesh.edges().len()];
        let avg = smoother.avg(&x, &weights);
        for (pointi, &internal) in smoother.is_internal_point().iter().enumerate() {
            if internal {
                assert_relative_eq!(avg[pointi], x[pointi], epsilon = 1e-12);
            }
        }

        let smoothed = smoother.smooth(&x, &weights);
        for (s, x) in smoothed.iter().zip(&x) {
            assert_relative_eq!(*s, *x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_weight_keeps_value() {
        let smoother = top_smoother(block(1));
        let fld: Vec<f64> = (0..smoother.mesh().n_points()).map(|i| i as f64).collect();
        let weights = vec![0.0; smoother.mesh().edges().len()];
        assert_eq!(smoother.avg(&fld, &weights), fld);
    }

    #[test]
    fn test_small_motion_succeeds() {
        let mut smoother = top_smoother(block(3));
        let top = point_at(smoother.mesh(), Point3::new(1.0 / 3.0, 1.0 / 3.0, 1.0));
        let n = smoother.patch().n_points();
        smoother.set_displacement(&vec![Vector3::new(0.0, 0.0, -0.05); n]);

        let weights = vec![1.0; smoother.mesh().edges().len()];
        for _ in 0..10 {
            smoother.smooth_displacement(&weights);
        }

        assert!(smoother.scale_mesh(None, &[], false, 0));
        assert_relative_eq!(smoother.mesh().points()[top].z, 0.95, epsilon = 1e-12);
    }

    #[test]
    fn test_failed_motion_scales_back() {
        let mut smoother = top_smoother(block(3));
        let mesh = smoother.mesh();
        let moved = point_at(mesh, Point3::new(1.0 / 3.0, 1.0 / 3.0, 1.0));
        let local = smoother.patch().which_point(moved).unwrap();
        let mut disp = vec![Vector3::zeros(); smoother.patch().n_points()];
        disp[local] = Vector3::new(0.0, 0.0, -0.8);
        smoother.set_displacement(&disp);

        assert!(!smoother.scale_mesh(None, &[], false, 0));
        assert!(!smoother.wrong_faces().is_empty());
        assert!(smoother.scale()[moved] < 1.0);
        // the failed position is kept
        assert_relative_eq!(smoother.mesh().points()[moved].z, 0.2, epsilon = 1e-12);

        let mut succeeded = false;
        for _ in 0..30 {
            if smoother.scale_mesh(None, &[], false, 0) {
                succeeded = true;
                break;
            }
        }
        assert!(succeeded);
        assert!(smoother.mesh().points()[moved].z < 1.0);
    }

    #[test]
    fn test_zero_error_reduction_reverts() {
        let mut smoother = top_smoother(block(3));
        assert_eq!(smoother.set_error_reduction(0.0), 0.75);

        let moved = point_at(smoother.mesh(), Point3::new(1.0 / 3.0, 1.0 / 3.0, 1.0));
        let local = smoother.patch().which_point(moved).unwrap();
        let mut disp = vec![Vector3::zeros(); smoother.patch().n_points()];
        disp[local] = Vector3::new(0.0, 0.0, -0.8);
        smoother.set_displacement(&disp);

        assert!(!smoother.scale_mesh(None, &[], false, 0));
        assert_relative_eq!(smoother.mesh().points()[moved].z, 1.0, epsilon = 1e-12);
        assert!(smoother.scale_mesh(None, &[], false, 0));
    }

    #[test]
    fn test_correct_resets_scale() {
        let mut smoother = top_smoother(block(2));
        let n = smoother.patch().n_points();
        smoother.set_displacement(&vec![Vector3::new(0.0, 0.0, -0.01); n]);
        assert!(smoother.scale_mesh(None, &[], true, 0));
        smoother.correct();
        assert_eq!(smoother.old_points(), smoother.mesh().points());
        assert!(smoother.scale().iter().all(|&s| s == 1.0));
    }
}
