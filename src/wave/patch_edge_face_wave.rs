// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Wave over the edges and faces of a patch.
//!
//! Edges pass their record to the faces using them (evaluated at the face
//! centre); faces pass theirs to all their edges (evaluated at the edge
//! centre). Patch edges that are coupled copies of each other are merged
//! after every face to edge step.

use super::{WaveInfo, WaveOptions};
use crate::error::Result;
use crate::mesh::face::Edge;
use crate::mesh::PolyMesh;
use crate::patch::PrimitivePatch;
use nalgebra::Point3;

pub struct PatchEdgeFaceWave<'a, T: WaveInfo> {
    mesh: &'a PolyMesh,
    patch: &'a PrimitivePatch,
    edge_info: &'a mut [T],
    face_info: &'a mut [T],
    options: WaveOptions,

    /// Patch edges in mesh point labels
    mesh_edges: Vec<Edge>,
    /// Groups of patch edges that are copies of one edge
    coupled_edges: Vec<Vec<usize>>,

    changed_edge: Vec<bool>,
    changed_edges: Vec<usize>,
    changed_face: Vec<bool>,
    changed_faces: Vec<usize>,

    n_evals: usize,
    n_unvisited_edges: usize,
    n_unvisited_faces: usize,
}

impl<'a, T: WaveInfo> PatchEdgeFaceWave<'a, T> {
    /// # Panics
    ///
    /// If the work arrays do not match the number of patch edges and faces.
    pub fn new(
        mesh: &'a PolyMesh,
        patch: &'a PrimitivePatch,
        edge_info: &'a mut [T],
        face_info: &'a mut [T],
        options: WaveOptions,
    ) -> Self {
        assert_eq!(
            edge_info.len(),
            patch.n_edges(),
            "size of edge info work array {} is not the number of edges in the patch {}",
            edge_info.len(),
            patch.n_edges()
        );
        assert_eq!(
            face_info.len(),
            patch.size(),
            "size of face info work array {} is not the number of faces in the patch {}",
            face_info.len(),
            patch.size()
        );

        let mesh_points = patch.mesh_points();
        let mesh_edges: Vec<Edge> = patch
            .edges()
            .iter()
            .map(|e| Edge::new(mesh_points[e.start], mesh_points[e.end]))
            .collect();
        let coupled_edges = mesh.coupling().coupled_edge_groups(&mesh_edges);

        let n_unvisited_edges = edge_info.iter().filter(|i| !i.valid()).count();
        let n_unvisited_faces = face_info.iter().filter(|i| !i.valid()).count();

        Self {
            mesh,
            patch,
            edge_info,
            face_info,
            options,
            mesh_edges,
            coupled_edges,
            changed_edge: vec![false; patch.n_edges()],
            changed_edges: Vec::new(),
            changed_face: vec![false; patch.size()],
            changed_faces: Vec::new(),
            n_evals: 0,
            n_unvisited_edges,
            n_unvisited_faces,
        }
    }

    /// Seed the given edges and propagate until nothing changes
    pub fn run(
        mesh: &'a PolyMesh,
        patch: &'a PrimitivePatch,
        seed_edges: &[usize],
        seed_info: &[T],
        edge_info: &'a mut [T],
        face_info: &'a mut [T],
        max_iter: usize,
    ) -> Result<Self> {
        Self::run_with(
            mesh,
            patch,
            seed_edges,
            seed_info,
            edge_info,
            face_info,
            max_iter,
            WaveOptions::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run_with(
        mesh: &'a PolyMesh,
        patch: &'a PrimitivePatch,
        seed_edges: &[usize],
        seed_info: &[T],
        edge_info: &'a mut [T],
        face_info: &'a mut [T],
        max_iter: usize,
        options: WaveOptions,
    ) -> Result<Self> {
        let mut wave = Self::new(mesh, patch, edge_info, face_info, options);
        wave.set_edge_info(seed_edges, seed_info);
        log::debug!("Seed edges                : {}", wave.changed_edges.len());
        wave.iterate(max_iter)?;
        Ok(wave)
    }

    pub fn edge_info(&self) -> &[T] {
        self.edge_info
    }

    pub fn face_info(&self) -> &[T] {
        self.face_info
    }

    pub fn n_evals(&self) -> usize {
        self.n_evals
    }

    pub fn get_unset_edges(&self) -> usize {
        self.n_unvisited_edges
    }

    pub fn get_unset_faces(&self) -> usize {
        self.n_unvisited_faces
    }

    pub fn set_edge_info(&mut self, edges: &[usize], info: &[T]) {
        assert_eq!(
            edges.len(),
            info.len(),
            "{} seed edges but {} seed records",
            edges.len(),
            info.len()
        );

        for (&edgei, new_info) in edges.iter().zip(info) {
            let was_valid = self.edge_info[edgei].valid();
            self.edge_info[edgei] = new_info.clone();
            if !was_valid && self.edge_info[edgei].valid() {
                self.n_unvisited_edges -= 1;
            }
            self.mark_edge(edgei);
        }
    }

    fn mark_edge(&mut self, edgei: usize) {
        if !self.changed_edge[edgei] {
            self.changed_edge[edgei] = true;
            self.changed_edges.push(edgei);
        }
    }

    fn mark_face(&mut self, facei: usize) {
        if !self.changed_face[facei] {
            self.changed_face[facei] = true;
            self.changed_faces.push(facei);
        }
    }

    fn edge_centre(&self, edgei: usize) -> Point3<f64> {
        self.patch.edges()[edgei].centre(self.patch.local_points())
    }

    fn update_edge(&mut self, edgei: usize, neighbour: &T) -> bool {
        self.n_evals += 1;
        let position = self.edge_centre(edgei);
        let info = &mut self.edge_info[edgei];
        let was_valid = info.valid();
        let propagate = info.update(&position, neighbour, self.options.propagation_tol);
        let now_valid = info.valid();

        if propagate {
            self.mark_edge(edgei);
        }
        if !was_valid && now_valid {
            self.n_unvisited_edges -= 1;
        }
        propagate
    }

    fn update_face(&mut self, facei: usize, neighbour: &T) -> bool {
        self.n_evals += 1;
        let position = self.patch.face_centres()[facei];
        let info = &mut self.face_info[facei];
        let was_valid = info.valid();
        let propagate = info.update(&position, neighbour, self.options.propagation_tol);
        let now_valid = info.valid();

        if propagate {
            self.mark_face(facei);
        }
        if !was_valid && now_valid {
            self.n_unvisited_faces -= 1;
        }
        propagate
    }

    /// Merge changed records of coupled edge copies
    fn sync_edges(&mut self) {
        if self.coupled_edges.is_empty() {
            return;
        }
        let mesh = self.mesh;
        let coupling = mesh.coupling();
        let groups = std::mem::take(&mut self.coupled_edges);

        for group in &groups {
            let sent: Vec<(usize, T)> = group
                .iter()
                .filter(|&&e| self.changed_edge[e])
                .map(|&e| {
                    let mut info = self.edge_info[e].clone();
                    info.leave_domain(&self.edge_centre(e));
                    (e, info)
                })
                .collect();

            for (from, info) in &sent {
                let from_start = self.mesh_edges[*from].start;
                let from_master = coupling.master_point(from_start);

                for &to in group {
                    if to == *from {
                        continue;
                    }
                    let to_edge = self.mesh_edges[to];
                    let to_point = if coupling.master_point(to_edge.start) == from_master {
                        to_edge.start
                    } else {
                        to_edge.end
                    };

                    let mut received = info.clone();
                    received.transform(&coupling.relative_rotation(from_start, to_point));
                    received.enter_domain(&self.edge_centre(to));

                    if self.edge_info[to].equal(&received) {
                        continue;
                    }
                    let was_valid = self.edge_info[to].valid();
                    if self.edge_info[to].update_merge(&received, self.options.propagation_tol) {
                        self.mark_edge(to);
                    }
                    if !was_valid && self.edge_info[to].valid() {
                        self.n_unvisited_edges -= 1;
                    }
                }
            }
        }

        self.coupled_edges = groups;
    }

    /// Push changed face records to their edges; returns the global number
    /// of changed edges.
    pub fn face_to_edge(&mut self) -> usize {
        self.changed_edges.clear();
        self.changed_edge.iter_mut().for_each(|c| *c = false);

        let patch = self.patch;
        let changed = std::mem::take(&mut self.changed_faces);
        for &facei in &changed {
            if !self.changed_face[facei] {
                panic!(
                    "face {} not marked as having been changed; this might be caused by \
                     multiple occurrences of the same seed edge",
                    facei
                );
            }

            let neighbour = self.face_info[facei].clone();
            for &edgei in &patch.face_edges()[facei] {
                if !self.edge_info[edgei].equal(&neighbour) {
                    self.update_edge(edgei, &neighbour);
                }
            }
        }
        self.changed_faces = changed;

        self.sync_edges();

        log::trace!("Changed edges             : {}", self.changed_edges.len());
        self.mesh.comm().sum_count(self.changed_edges.len())
    }

    /// Push changed edge records to their faces; returns the global number
    /// of changed faces.
    pub fn edge_to_face(&mut self) -> usize {
        self.changed_faces.clear();
        self.changed_face.iter_mut().for_each(|c| *c = false);

        let patch = self.patch;
        let changed = std::mem::take(&mut self.changed_edges);
        for &edgei in &changed {
            if !self.changed_edge[edgei] {
                panic!(
                    "edge {} not marked as having been changed; this might be caused by \
                     multiple occurrences of the same seed edge",
                    edgei
                );
            }

            let neighbour = self.edge_info[edgei].clone();
            for &facei in &patch.edge_faces()[edgei] {
                if !self.face_info[facei].equal(&neighbour) {
                    self.update_face(facei, &neighbour);
                }
            }
        }
        self.changed_edges = changed;

        log::trace!("Changed faces             : {}", self.changed_faces.len());
        self.mesh.comm().sum_count(self.changed_faces.len())
    }

    pub fn iterate(&mut self, max_iter: usize) -> Result<usize> {
        self.sync_edges();

        self.n_evals = 0;
        let mut iter = 0;
        while iter < max_iter {
            let n_faces = self.edge_to_face();
            log::trace!("Iteration {}: {} changed faces", iter, n_faces);
            if n_faces == 0 {
                break;
            }

            let n_edges = self.face_to_edge();
            log::trace!(
                "Iteration {}: {} changed edges, {} evaluations, {} edges and {} faces unvisited",
                iter,
                n_edges,
                self.n_evals,
                self.n_unvisited_edges,
                self.n_unvisited_faces
            );
            if n_edges == 0 {
                break;
            }
            iter += 1;
        }

        self.options.check_convergence(
            "patch edge-face wave",
            iter,
            max_iter,
            (self.changed_edges.len(), self.changed_faces.len()),
            self.n_unvisited_faces,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::{PatchEdgeFaceInfo, PatchEdgeFaceRegion};
    use approx::assert_relative_eq;

    fn top_patch(n: usize) -> (PolyMesh, PrimitivePatch) {
        let mesh = PolyMesh::block([n, n, 1], Point3::origin(), Point3::new(n as f64, n as f64, 1.0)).unwrap();
        let zmax = mesh.find_patch("zmax").unwrap();
        let patch = PrimitivePatch::from_patches(&mesh, &[zmax]);
        (mesh, patch)
    }

    #[test]
    fn test_face_distance_over_patch() {
        let (mesh, patch) = top_patch(4);
        let mut edges = vec![PatchEdgeFaceInfo::default(); patch.n_edges()];
        let mut faces = vec![PatchEdgeFaceInfo::default(); patch.size()];

        // seed a boundary edge on x = 0
        let seed = (patch.n_internal_edges()..patch.n_edges())
            .find(|&e| {
                let c = patch.edges()[e].centre(patch.local_points());
                c.x.abs() < 1e-12
            })
            .unwrap();
        let origin = patch.edges()[seed].centre(patch.local_points());

        let wave = PatchEdgeFaceWave::run(
            &mesh,
            &patch,
            &[seed],
            &[PatchEdgeFaceInfo::new(origin, 0.0)],
            &mut edges,
            &mut faces,
            100,
        )
        .unwrap();
        assert_eq!(wave.get_unset_faces(), 0);
        assert_eq!(wave.get_unset_edges(), 0);
        drop(wave);

        for (facei, info) in faces.iter().enumerate() {
            let c = patch.face_centres()[facei];
            assert_relative_eq!(info.dist_sqr, (c - origin).norm_squared(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_blocked_edges_split_regions() {
        let (mesh, patch) = top_patch(4);
        let mut edges = vec![PatchEdgeFaceRegion::Unset; patch.n_edges()];
        let mut faces = vec![PatchEdgeFaceRegion::Unset; patch.size()];

        // block the internal edges on the line x = 2
        for (edgei, e) in patch.edges().iter().enumerate() {
            let c = e.centre(patch.local_points());
            if patch.is_internal_edge(edgei) && (c.x - 2.0).abs() < 1e-12 {
                edges[edgei] = PatchEdgeFaceRegion::Blocked;
            }
        }

        let seed = patch.face_edges()[0]
            .iter()
            .copied()
            .find(|&e| edges[e] != PatchEdgeFaceRegion::Blocked)
            .unwrap();
        let wave = PatchEdgeFaceWave::run(
            &mesh,
            &patch,
            &[seed],
            &[PatchEdgeFaceRegion::Region(0)],
            &mut edges,
            &mut faces,
            100,
        )
        .unwrap();
        assert_eq!(wave.get_unset_faces(), 8);
        drop(wave);

        let x0 = patch.face_centres()[0].x < 2.0;
        for (facei, region) in faces.iter().enumerate() {
            let same_side = (patch.face_centres()[facei].x < 2.0) == x0;
            assert_eq!(region.valid(), same_side);
        }
    }
}
