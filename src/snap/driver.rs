// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Snapping of a mesh boundary onto a set of surfaces.
//!
//! [`SnapDriver::do_snap`] runs the whole sequence:
//!
//! 1. split the face zones of zoned surfaces into baffles
//! 2. smooth the patch points
//! 3. per iteration: attract the patch points to the nearest surface
//!    (and optionally to its feature edges), smooth the displacement into
//!    the interior, then scale it back until the mesh passes the checks
//! 4. merge the baffles, move faces to the patch of their nearest surface
//!    region and merge coplanar patch faces

use crate::config::SnapConfig;
use crate::error::{MeshError, Result};
use crate::geometry::predicates::find_minimizer_point;
use crate::mesh::topo_change::{
    create_baffles, merge_baffles, merge_patch_faces, remove_straight_edge_points, repatch,
};
use crate::mesh::PolyMesh;
use crate::motion::{check_mesh, MotionSmoother};
use crate::parallel::CombineOp;
use crate::patch::PrimitivePatch;
use crate::snap::surface::RefinementSurfaces;
use crate::utils::math::{Tolerances, GREAT, SMALL};
use crate::wave::{PointEdgePoint, PointEdgeWave, WaveOptions};
use ahash::AHashSet;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Receives intermediate meshes for inspection
pub trait CheckpointSink {
    fn checkpoint(&mut self, label: &str, mesh: &PolyMesh, displacement: Option<&[Vector3<f64>]>);
}

/// Discards every checkpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCheckpoint;

impl CheckpointSink for NoCheckpoint {
    fn checkpoint(&mut self, _label: &str, _mesh: &PolyMesh, _displacement: Option<&[Vector3<f64>]>) {}
}

/// Outcome of a snapping run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapReport {
    /// Faces failing the quality checks before any motion
    pub n_initial_errors: usize,
    /// Faces failing the quality checks on the final mesh
    pub n_final_errors: usize,
    /// Whether the motion of each snap iteration passed the checks
    pub iterations: Vec<bool>,
    /// Iterations where some wanted displacement pointed into the mesh
    pub inward_iterations: usize,
    pub n_baffles: usize,
    pub n_repatched: usize,
    /// Patch faces merged into a larger face
    pub n_merged_faces: usize,
    pub n_removed_points: usize,
}

impl SnapReport {
    pub fn converged(&self) -> bool {
        self.iterations.iter().all(|&ok| ok)
    }
}

/// Flag points that share a location with another point, within `tol`.
/// Returns the flags and the number of flagged points.
pub fn get_collocated_points(tol: f64, points: &[Point3<f64>]) -> (Vec<bool>, usize) {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| points[a].x.total_cmp(&points[b].x));

    // representative of every point after merging
    let mut merged: Vec<usize> = (0..points.len()).collect();
    for (k, &i) in order.iter().enumerate() {
        if merged[i] != i {
            continue;
        }
        for &j in &order[k + 1..] {
            if points[j].x - points[i].x > tol {
                break;
            }
            if merged[j] == j && (points[j] - points[i]).norm() <= tol {
                merged[j] = i;
            }
        }
    }

    let mut n_uses = vec![0usize; points.len()];
    for &m in &merged {
        n_uses[m] += 1;
    }

    let collocated: Vec<bool> = merged.iter().map(|&m| n_uses[m] > 1).collect();
    let n_collocated = collocated.iter().filter(|&&c| c).count();
    (collocated, n_collocated)
}

/// Displacement moving every patch point towards a blend of the centres
/// of its boundary faces and its internal faces. Points where the patch is
/// not manifold and that have no internal faces are pulled towards the
/// centre of one of their cells instead.
pub fn smooth_patch_displacement(
    smoother: &MotionSmoother,
    baffles: &[(usize, usize)],
) -> Vec<Vector3<f64>> {
    let mesh = smoother.mesh();
    let pp = smoother.patch();
    let coupling = mesh.coupling();
    let mesh_points = pp.mesh_points();
    let n_points = pp.n_points();

    // only one side of a baffle counts
    let mut is_master_face = vec![true; mesh.n_faces()];
    for &(_, slave) in baffles {
        is_master_face[slave] = false;
    }

    let mut non_manifold = AHashSet::new();
    pp.check_point_manifold(Some(&mut non_manifold));
    let n_non_manifold = mesh.comm().sum_count(non_manifold.len());
    if n_non_manifold > 0 {
        log::info!("Non-manifold points on the patch : {}", n_non_manifold);
    }

    let face_centres = pp.face_centres();
    let mut avg_boundary = vec![Vector3::zeros(); n_points];
    let mut n_boundary = vec![0usize; n_points];
    for (pointi, faces) in pp.point_faces().iter().enumerate() {
        for &facei in faces {
            if is_master_face[pp.addressing()[facei]] {
                avg_boundary[pointi] += face_centres[facei].coords;
                n_boundary[pointi] += 1;
            }
        }
    }
    coupling.sync_patch_point_list(&mut avg_boundary, mesh_points, CombineOp::Sum, Vector3::zeros());
    coupling.sync_patch_point_list(&mut n_boundary, mesh_points, CombineOp::Sum, 0);

    let mesh_face_centres = mesh.face_centres();
    let mut global_sum = vec![Vector3::zeros(); mesh.n_points()];
    let mut global_num = vec![0usize; mesh.n_points()];
    for facei in 0..mesh.n_internal_faces() {
        for &pointi in &mesh.faces()[facei] {
            global_sum[pointi] += mesh_face_centres[facei].coords;
            global_num[pointi] += 1;
        }
    }
    coupling.sync_point_list(&mut global_sum, CombineOp::Sum);
    coupling.sync_point_list(&mut global_num, CombineOp::Sum);

    let cell_centres = mesh.cell_centres();
    let current = pp.local_points();

    let mut displacement = vec![Vector3::zeros(); n_points];
    for pointi in 0..n_points {
        let meshpointi = mesh_points[pointi];
        let cur = current[pointi].coords;
        let n_bnd = n_boundary[pointi];
        if n_bnd == 0 {
            continue;
        }
        let avg_bnd = avg_boundary[pointi] / n_bnd as f64;

        let n_int = global_num[meshpointi];
        let avg_int = if n_int > 0 {
            global_sum[meshpointi] / n_int as f64
        } else {
            global_sum[meshpointi]
        };

        let avg_pos = if !non_manifold.contains(&meshpointi) {
            let int_weight = 0.1 * n_int as f64;
            let bnd_weight = 0.9 * n_bnd as f64;
            (int_weight * avg_int + bnd_weight * avg_bnd) / (int_weight + bnd_weight)
        } else if n_int == 0 {
            let any_cell = mesh.owner()[mesh.point_faces()[meshpointi][0]];
            0.2 * avg_bnd + 0.8 * cell_centres[any_cell].coords
        } else {
            0.9 * avg_int + 0.1 * avg_bnd
        };

        let new_pos = 0.9 * avg_pos + 0.1 * cur;
        displacement[pointi] = new_pos - cur;
    }

    displacement
}

/// Distance from every mesh edge to the nearest patch point, measured
/// through the mesh edges
pub fn edge_patch_dist(mesh: &PolyMesh, pp: &PrimitivePatch) -> Result<Vec<f64>> {
    let seed_info: Vec<PointEdgePoint> =
        pp.local_points().iter().map(|&p| PointEdgePoint::seed(p)).collect();

    let mut point_info = vec![PointEdgePoint::default(); mesh.n_points()];
    let mut edge_info = vec![PointEdgePoint::default(); mesh.edges().len()];

    let wave = PointEdgeWave::run(
        mesh,
        pp.mesh_points(),
        &seed_info,
        &mut point_info,
        &mut edge_info,
        mesh.n_points(),
        WaveOptions::default(),
    )?;
    log::debug!("Edge distance evaluations : {}", wave.n_evals());
    drop(wave);

    Ok(edge_info.iter().map(|e| e.distance()).collect())
}

/// Points move out of the mesh when the displacement is on the outside
/// of every surrounding patch face. Reports the first point breaking this.
pub fn outwards_displacement(pp: &PrimitivePatch, patch_disp: &[Vector3<f64>]) -> bool {
    let face_normals = pp.face_normals();

    for (pointi, disp) in patch_disp.iter().enumerate() {
        let mag = disp.norm();
        if mag <= SMALL {
            continue;
        }
        let n = disp / mag;
        let visible = pp.point_faces()[pointi]
            .iter()
            .all(|&facei| face_normals[facei].dot(&n) >= SMALL);

        if !visible {
            log::warn!(
                "Displacement {:?} at mesh point {} coord {:?} points through the surrounding patch faces",
                disp,
                pp.mesh_points()[pointi],
                pp.local_points()[pointi]
            );
            return false;
        }
    }
    true
}

/// Patch points on the faces of a face zone
pub fn get_zone_surface_points(
    mesh: &PolyMesh,
    pp: &PrimitivePatch,
    zone_name: &str,
) -> Result<Vec<usize>> {
    let zonei = mesh
        .find_zone(zone_name)
        .ok_or_else(|| MeshError::UnknownZone(zone_name.to_string()))?;

    let mut on_zone = vec![false; pp.n_points()];
    for &facei in &mesh.face_zones()[zonei].faces {
        for &meshpointi in &mesh.faces()[facei] {
            if let Some(pointi) = pp.which_point(meshpointi) {
                on_zone[pointi] = true;
            }
        }
    }

    Ok(on_zone
        .iter()
        .enumerate()
        .filter_map(|(i, &on)| on.then_some(i))
        .collect())
}

/// Point nearest to `start` on the intersection of the planes
fn project_to_planes(
    start: Point3<f64>,
    origins: &[Point3<f64>],
    normals: &[Vector3<f64>],
) -> Point3<f64> {
    let mut p = start;
    for _ in 0..50 {
        for (origin, normal) in origins.iter().zip(normals) {
            p -= normal * normal.dot(&(p - origin));
        }
    }
    p
}

pub struct SnapDriver<'a> {
    surfaces: &'a RefinementSurfaces,
    config: SnapConfig,
    checkpoint: Box<dyn CheckpointSink + 'a>,
}

impl<'a> SnapDriver<'a> {
    pub fn new(surfaces: &'a RefinementSurfaces, config: SnapConfig) -> Self {
        Self {
            surfaces,
            config,
            checkpoint: Box::new(NoCheckpoint),
        }
    }

    /// Send intermediate meshes to `sink`
    pub fn with_checkpoint(mut self, sink: impl CheckpointSink + 'a) -> Self {
        self.checkpoint = Box::new(sink);
        self
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    /// Per patch point, the longest edge using it times the snap tolerance
    pub fn calc_snap_distance(&self, mesh: &PolyMesh, pp: &PrimitivePatch) -> Vec<f64> {
        let points = pp.local_points();
        let edges = pp.edges();

        let mut max_edge_len = vec![-GREAT; pp.n_points()];
        for (pointi, point_edges) in pp.point_edges().iter().enumerate() {
            for &edgei in point_edges {
                let e = &edges[edgei];
                let len = (points[e.end] - points[e.start]).norm();
                max_edge_len[pointi] = max_edge_len[pointi].max(len);
            }
        }
        mesh.coupling()
            .sync_patch_point_list(&mut max_edge_len, pp.mesh_points(), CombineOp::Max, -GREAT);

        max_edge_len
            .into_iter()
            .map(|len| self.config.snap.snap_tol * len)
            .collect()
    }

    /// Smooth the patch points before snapping so the patch faces are
    /// roughly uniform
    pub fn pre_smooth_patch(
        &self,
        n_init_errors: usize,
        baffles: &[(usize, usize)],
        smoother: &mut MotionSmoother,
    ) {
        let n_snap = self.config.snap.n_snap;

        for smooth_iter in 0..self.config.snap.n_smooth_patch {
            log::info!("Smoothing iteration {}", smooth_iter);

            let patch_disp = smooth_patch_displacement(smoother, baffles);
            smoother.set_displacement(&patch_disp);
            smoother.correct();

            let old_error_reduction = smoother.error_reduction();
            for snap_iter in 0..2 * n_snap {
                log::info!("Scaling iteration {}", snap_iter);
                if snap_iter == n_snap {
                    log::info!("Displacement scaling for error reduction set to 0.");
                    smoother.set_error_reduction(0.0);
                }
                if smoother.scale_mesh(None, baffles, true, n_init_errors) {
                    log::info!("Successfully moved mesh");
                    break;
                }
            }
            smoother.set_error_reduction(old_error_reduction);
        }

        // the moved mesh is the new starting point
        smoother.correct();
        log::info!("Patch points smoothed");
    }

    /// Displacement of every patch point to the nearest surface, limited
    /// to `snap_dist`. Points on the zone of a zoned surface only snap to
    /// that surface or a closer zoned one.
    pub fn calc_nearest_surface(
        &self,
        snap_dist: &[f64],
        smoother: &MotionSmoother,
    ) -> Result<Vec<Vector3<f64>>> {
        log::info!("Calculating patchDisplacement as distance to nearest surface point ...");

        let mesh = smoother.mesh();
        let pp = smoother.patch();
        let local_points = pp.local_points();
        let n_points = pp.n_points();

        let mut patch_disp = vec![Vector3::zeros(); n_points];
        let mut snap_surf: Vec<Option<usize>> = vec![None; n_points];

        let unzoned = self.surfaces.unzoned_surfaces();
        let dist_sqr: Vec<f64> = snap_dist.iter().map(|d| d * d).collect();
        let hits = self.surfaces.find_nearest(&unzoned, local_points, &dist_sqr);
        for (pointi, hit) in hits.iter().enumerate() {
            if let Some(hit) = hit {
                patch_disp[pointi] = hit.hit.point - local_points[pointi];
                snap_surf[pointi] = Some(hit.surface);
            }
        }

        // current best snap distance of points on a zone
        let mut min_snap_dist = snap_dist.to_vec();

        for surfi in self.surfaces.zoned_surfaces() {
            let Some(zone_name) = self.surfaces.face_zone(surfi) else {
                continue;
            };
            let zone_points = get_zone_surface_points(mesh, pp, zone_name)?;

            let samples: Vec<Point3<f64>> = zone_points.iter().map(|&i| local_points[i]).collect();
            let radius: Vec<f64> = zone_points
                .iter()
                .map(|&i| min_snap_dist[i] * min_snap_dist[i])
                .collect();

            let zone_hits = self.surfaces.find_nearest(&[surfi], &samples, &radius);
            for (&pointi, hit) in zone_points.iter().zip(&zone_hits) {
                if let Some(hit) = hit {
                    patch_disp[pointi] = hit.hit.point - local_points[pointi];
                    min_snap_dist[pointi] = min_snap_dist[pointi].min(patch_disp[pointi].norm());
                    snap_surf[pointi] = Some(surfi);
                }
            }
        }

        let n_unsnapped = snap_surf.iter().filter(|s| s.is_none()).count();
        let n_unsnapped = mesh.comm().sum_count(n_unsnapped);
        if n_unsnapped > 0 {
            log::warn!(
                "Did not snap {} points out of {}. Did you set up the snap tolerance correctly?",
                n_unsnapped,
                mesh.comm().sum_count(n_points)
            );
        }

        let mags: Vec<f64> = patch_disp.iter().map(|d| d.norm()).collect();
        let (min_mag, max_mag, sum_mag) = mags
            .iter()
            .fold((GREAT, 0.0f64, 0.0), |(lo, hi, s), &m| (lo.min(m), hi.max(m), s + m));
        let n_global = mesh.comm().sum_count(n_points).max(1);
        log::info!(
            "Wanted displacement : average:{} min:{} max:{}",
            mesh.comm().sum(sum_mag) / n_global as f64,
            mesh.comm().min(min_mag),
            mesh.comm().max(max_mag)
        );

        for (pointi, disp) in patch_disp.iter_mut().enumerate() {
            let mag = disp.norm();
            if mag > snap_dist[pointi] {
                *disp *= snap_dist[pointi] / mag;
                log::warn!(
                    "Limiting displacement for mesh point {} from {} to {}",
                    pp.mesh_points()[pointi],
                    mag,
                    snap_dist[pointi]
                );
            }
        }

        mesh.coupling().sync_patch_point_list(
            &mut patch_disp,
            pp.mesh_points(),
            CombineOp::MinMagSqr,
            Vector3::repeat(GREAT),
        );

        Ok(patch_disp)
    }

    /// Pull points on patch feature edges and corners onto the intersection
    /// of the surface planes seen by their faces. The attraction grows with
    /// the iteration, reaching full strength on the last one.
    pub fn calc_nearest_surface_feature(
        &self,
        iter: usize,
        n_feature_iter: usize,
        snap_dist: &[f64],
        patch_disp: &[Vector3<f64>],
        smoother: &MotionSmoother,
    ) -> Vec<Vector3<f64>> {
        let pp = smoother.patch();
        let feature_cos = self.config.snap.feature_cos;
        let blend = (iter + 1) as f64 / n_feature_iter.max(1) as f64;

        let local_points = pp.local_points();
        let face_normals = pp.face_normals();
        let face_centres = pp.face_centres();

        let face_dist_sqr: Vec<f64> = pp
            .local_faces()
            .iter()
            .map(|f| {
                let d = f.iter().map(|&p| snap_dist[p]).fold(0.0, f64::max);
                d * d
            })
            .collect();
        let face_hits = self
            .surfaces
            .find_nearest(&self.surfaces.all(), face_centres, &face_dist_sqr);

        let tol = Tolerances::default();
        let mut new_disp = patch_disp.to_vec();
        let mut n_attracted = 0;

        for (pointi, point_faces) in pp.point_faces().iter().enumerate() {
            let on_feature = point_faces.iter().enumerate().any(|(i, &fa)| {
                point_faces[i + 1..]
                    .iter()
                    .any(|&fb| face_normals[fa].dot(&face_normals[fb]) < feature_cos)
            });
            if !on_feature {
                continue;
            }

            let mut origins = Vec::new();
            let mut normals: Vec<Vector3<f64>> = Vec::new();
            for &facei in point_faces {
                let Some(hit) = face_hits[facei] else {
                    continue;
                };
                let normal = self.surfaces.surface(hit.surface).normal(&hit.hit);
                if normals.iter().all(|n| n.dot(&normal).abs() < feature_cos) {
                    origins.push(hit.hit.point);
                    normals.push(normal);
                }
            }
            if normals.len() < 2 {
                continue;
            }

            let start = local_points[pointi] + patch_disp[pointi];
            let target = match find_minimizer_point(&origins, &normals, &tol) {
                Some(p) if normals.len() >= 3 => p,
                _ => project_to_planes(start, &origins, &normals),
            };

            let feature_disp = target - local_points[pointi];
            if feature_disp.norm() > snap_dist[pointi] {
                continue;
            }
            new_disp[pointi] = (1.0 - blend) * patch_disp[pointi] + blend * feature_disp;
            n_attracted += 1;
        }

        log::info!(
            "Attracted {} points to feature edges with weight {:.3}",
            smoother.mesh().comm().sum_count(n_attracted),
            blend
        );
        new_disp
    }

    /// Smooth the patch displacement into the interior, weighting edges
    /// by their distance to the patch
    pub fn smooth_displacement(&self, smoother: &mut MotionSmoother) -> Result<()> {
        log::info!("Smoothing displacement ...");

        let edge_dist = edge_patch_dist(smoother.mesh(), smoother.patch())?;
        let edge_gamma = smoother.params().diffusivity.edge_weights(&edge_dist);

        for iter in 0..self.config.snap.n_smooth_disp {
            if iter % 10 == 0 {
                log::info!("Iteration {}", iter);
            }
            smoother.smooth_displacement(&edge_gamma);
        }
        log::info!("Displacement smoothed");
        Ok(())
    }

    /// Scale back the displacement until the mesh passes the checks. Past
    /// half the budget the points of failing faces are put back instead.
    pub fn scale_mesh(
        &self,
        n_init_errors: usize,
        baffles: &[(usize, usize)],
        smoother: &mut MotionSmoother,
    ) -> bool {
        let n_snap = self.config.snap.n_snap;
        let old_error_reduction = smoother.error_reduction();

        let mut mesh_ok = false;
        for iter in 0..2 * n_snap {
            log::info!("Iteration {}", iter);
            if iter == n_snap {
                log::info!("Displacement scaling for error reduction set to 0.");
                smoother.set_error_reduction(0.0);
            }
            if smoother.scale_mesh(None, baffles, true, n_init_errors) {
                log::info!("Successfully moved mesh");
                mesh_ok = true;
                break;
            }
        }

        smoother.set_error_reduction(old_error_reduction);
        mesh_ok
    }

    /// Split the face zones of zoned surfaces into baffles on the patch of
    /// the surface. Returns the new mesh and the baffle pairs.
    pub fn create_zone_baffles(
        &self,
        mesh: &PolyMesh,
        adapt_patch_ids: &mut Vec<usize>,
    ) -> Result<(PolyMesh, Vec<(usize, usize)>)> {
        let mut baffles = Vec::new();
        let mut seen = AHashSet::new();

        for surfi in self.surfaces.zoned_surfaces() {
            let Some(zone_name) = self.surfaces.face_zone(surfi) else {
                continue;
            };
            let zonei = mesh
                .find_zone(zone_name)
                .ok_or_else(|| MeshError::UnknownZone(zone_name.to_string()))?;
            let patchi = self.surfaces.region_patch(surfi, 0).ok_or_else(|| {
                MeshError::invalid_param(
                    "region_patch",
                    format!(
                        "zoned surface '{}' has no patch for its baffles",
                        self.surfaces.surface(surfi).name()
                    ),
                )
            })?;
            if patchi >= mesh.patches().len() {
                return Err(MeshError::UnknownPatch(patchi.to_string()));
            }
            if !adapt_patch_ids.contains(&patchi) {
                adapt_patch_ids.push(patchi);
            }

            for &facei in &mesh.face_zones()[zonei].faces {
                if mesh.is_internal_face(facei) && seen.insert(facei) {
                    baffles.push((facei, patchi, patchi));
                }
            }
        }

        if baffles.is_empty() {
            return Ok((mesh.clone(), Vec::new()));
        }

        let (new_mesh, pairs) = create_baffles(mesh, &baffles)?;
        log::info!(
            "Created {} baffles on zoned surfaces",
            new_mesh.comm().sum_count(pairs.len())
        );
        Ok((new_mesh, pairs))
    }

    /// Turn the zone baffles back into internal faces
    pub fn merge_zone_baffles(&self, mesh: &PolyMesh, baffles: &[(usize, usize)]) -> Result<PolyMesh> {
        if baffles.is_empty() {
            return Ok(mesh.clone());
        }
        log::info!(
            "Merging {} baffles on zoned surfaces",
            mesh.comm().sum_count(baffles.len())
        );
        merge_baffles(mesh, baffles)
    }

    /// Move every face of the adapted patches to the patch of the nearest
    /// unzoned surface region. Faces in `preserve_faces` keep their patch.
    pub fn repatch_to_surface(
        &self,
        mesh: &PolyMesh,
        adapt_patch_ids: &[usize],
        preserve_faces: &AHashSet<usize>,
    ) -> Result<(PolyMesh, usize)> {
        log::info!("Repatching faces according to nearest surface ...");

        let pp = PrimitivePatch::from_patches(mesh, adapt_patch_ids);
        let snap_dist = self.calc_snap_distance(mesh, &pp);

        let face_snap_dist_sqr: Vec<f64> = pp
            .local_faces()
            .iter()
            .map(|f| {
                let d = f.iter().map(|&p| snap_dist[p]).fold(0.0, f64::max);
                d * d
            })
            .collect();

        let hits = self.surfaces.find_nearest(
            &self.surfaces.unzoned_surfaces(),
            pp.face_centres(),
            &face_snap_dist_sqr,
        );

        let mut assignments = Vec::new();
        for (i, hit) in hits.iter().enumerate() {
            let facei = pp.addressing()[i];
            if preserve_faces.contains(&facei) {
                continue;
            }
            let Some(hit) = hit else {
                continue;
            };
            let Some(patchi) = self.surfaces.region_patch(hit.surface, hit.region) else {
                continue;
            };
            if mesh.which_patch(facei) != Some(patchi) {
                assignments.push((facei, patchi));
            }
        }

        let n_changed = mesh.comm().sum_count(assignments.len());
        log::info!("Repatched {} faces", n_changed);
        if assignments.is_empty() {
            return Ok((mesh.clone(), 0));
        }

        let (new_mesh, _) = repatch(mesh, &assignments)?;
        Ok((new_mesh, n_changed))
    }

    /// Merge coplanar faces of the patches, undoing every merge whose face
    /// fails the quality checks. Returns the number of merged face sets.
    pub fn merge_patch_faces_undo(
        &self,
        mesh: &PolyMesh,
        patch_ids: &[usize],
    ) -> Result<(PolyMesh, usize)> {
        let feature_cos = self.config.snap.feature_cos;
        let mut excluded_cells = AHashSet::new();

        loop {
            let (new_mesh, merged) = merge_patch_faces(mesh, patch_ids, feature_cos, &excluded_cells)?;
            if merged.is_empty() {
                return Ok((mesh.clone(), 0));
            }

            let merged_faces: Vec<usize> = merged.iter().map(|(f, _)| *f).collect();
            let mut wrong_faces = BTreeSet::new();
            check_mesh(
                false,
                &new_mesh,
                &self.config.quality,
                Some(&merged_faces),
                &[],
                &mut wrong_faces,
            );

            let n_before = excluded_cells.len();
            for (new_face, old_faces) in &merged {
                if wrong_faces.contains(new_face) {
                    excluded_cells.insert(mesh.owner()[old_faces[0]]);
                }
            }

            if excluded_cells.len() == n_before {
                let n_merged = new_mesh.comm().sum_count(merged.len());
                log::info!("Merged {} patch face sets", n_merged);
                return Ok((new_mesh, n_merged));
            }
            log::info!(
                "Undoing merges in {} cells that fail the quality checks",
                excluded_cells.len() - n_before
            );
        }
    }

    /// Remove points in the middle of straight edges, unless that adds
    /// failing faces
    pub fn merge_edges_undo(&self, mesh: &PolyMesh) -> Result<(PolyMesh, usize)> {
        let (new_mesh, n_removed) = remove_straight_edge_points(mesh, self.config.snap.feature_cos)?;
        if n_removed == 0 {
            return Ok((mesh.clone(), 0));
        }

        let mut wrong_before = BTreeSet::new();
        let n_before = check_mesh(false, mesh, &self.config.quality, None, &[], &mut wrong_before);
        let mut wrong_after = BTreeSet::new();
        let n_after = check_mesh(false, &new_mesh, &self.config.quality, None, &[], &mut wrong_after);

        if n_after > n_before {
            log::info!(
                "Removing {} straight edge points adds {} failing faces; keeping them",
                n_removed,
                n_after - n_before
            );
            return Ok((mesh.clone(), 0));
        }
        log::info!("Removed {} straight edge points", n_removed);
        Ok((new_mesh, n_removed))
    }

    /// Snap the boundary of `mesh` formed by `adapt_patch_ids` onto the
    /// surfaces
    pub fn do_snap(&mut self, mesh: PolyMesh, adapt_patch_ids: &[usize]) -> Result<(PolyMesh, SnapReport)> {
        log::info!("Morphing phase");
        log::info!("--------------");

        self.config.validate()?;
        let mut report = SnapReport::default();

        let mut adapt = adapt_patch_ids.to_vec();
        let (mesh, baffles) = self.create_zone_baffles(&mesh, &mut adapt)?;
        report.n_baffles = baffles.len();

        let do_features = self.config.snap.n_feature_snap > 0;
        let n_feat_iter = self.config.snap.n_feature_snap.max(1);

        let mut smoother = MotionSmoother::new(
            mesh,
            adapt.clone(),
            self.config.motion.clone(),
            self.config.quality.clone(),
        )?;

        let (_, n_collocated) =
            get_collocated_points(self.config.snap.merge_tol, smoother.patch().local_points());
        if n_collocated > 0 {
            log::info!("Collocated patch points : {}", n_collocated);
        }

        let snap_dist = self.calc_snap_distance(smoother.mesh(), smoother.patch());

        let mut wrong_faces = BTreeSet::new();
        let n_init_errors = check_mesh(
            false,
            smoother.mesh(),
            &self.config.quality,
            None,
            &baffles,
            &mut wrong_faces,
        );
        log::info!("Detected {} illegal faces (concave, zero area or negative cell pyramid volume)", n_init_errors);
        report.n_initial_errors = n_init_errors;

        self.pre_smooth_patch(n_init_errors, &baffles, &mut smoother);
        self.checkpoint.checkpoint("patch_smoothed", smoother.mesh(), None);

        for iter in 0..n_feat_iter {
            log::info!("Morph iteration {}", iter);
            log::info!("-----------------");

            let mut disp = self.calc_nearest_surface(&snap_dist, &smoother)?;
            if do_features {
                disp = self.calc_nearest_surface_feature(iter, n_feat_iter, &snap_dist, &disp, &smoother);
            }

            if !outwards_displacement(smoother.patch(), &disp) {
                report.inward_iterations += 1;
            }

            smoother.set_displacement(&disp);
            self.checkpoint
                .checkpoint("patch_displacement", smoother.mesh(), Some(smoother.displacement()));

            self.smooth_displacement(&mut smoother)?;
            self.checkpoint
                .checkpoint("smoothed_displacement", smoother.mesh(), Some(smoother.displacement()));

            let mesh_ok = self.scale_mesh(n_init_errors, &baffles, &mut smoother);
            if !mesh_ok {
                log::warn!(
                    "Did not successfully snap mesh. Writing mesh with the last trial motion"
                );
            }
            report.iterations.push(mesh_ok);
            self.checkpoint.checkpoint("scaled", smoother.mesh(), None);

            smoother.correct();
        }

        let mesh = smoother.into_mesh();
        let mesh = self.merge_zone_baffles(&mesh, &baffles)?;

        let mut preserve_faces = AHashSet::new();
        for surfi in self.surfaces.zoned_surfaces() {
            if let Some(zonei) = self.surfaces.face_zone(surfi).and_then(|z| mesh.find_zone(z)) {
                preserve_faces.extend(mesh.face_zones()[zonei].faces.iter().copied());
            }
        }

        let (mesh, n_repatched) = self.repatch_to_surface(&mesh, adapt_patch_ids, &preserve_faces)?;
        report.n_repatched = n_repatched;

        let (mesh, n_merged) = self.merge_patch_faces_undo(&mesh, adapt_patch_ids)?;
        report.n_merged_faces = n_merged;
        let (mesh, n_removed) = self.merge_edges_undo(&mesh)?;
        report.n_removed_points = n_removed;
        self.checkpoint.checkpoint("snapped", &mesh, None);

        let mut wrong_faces = BTreeSet::new();
        report.n_final_errors = check_mesh(
            false,
            &mesh,
            &self.config.quality,
            None,
            &[],
            &mut wrong_faces,
        );
        log::info!("Morphing phase done: {} illegal faces left", report.n_final_errors);

        Ok((mesh, report))
    }
}
