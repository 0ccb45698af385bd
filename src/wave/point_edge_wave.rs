// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Wave over the points and edges of a mesh.
//!
//! Points pass their record to the edges using them (evaluated at the edge
//! centre); edges pass theirs to both end points. Coupled copies of a point
//! exchange changed records after every edge to point step.

use super::{WaveInfo, WaveOptions};
use crate::error::Result;
use crate::mesh::PolyMesh;

pub struct PointEdgeWave<'a, T: WaveInfo> {
    mesh: &'a PolyMesh,
    point_info: &'a mut [T],
    edge_info: &'a mut [T],
    options: WaveOptions,

    changed_point: Vec<bool>,
    changed_points: Vec<usize>,
    changed_edge: Vec<bool>,
    changed_edges: Vec<usize>,

    n_evals: usize,
    n_unvisited_points: usize,
    n_unvisited_edges: usize,
}

impl<'a, T: WaveInfo> PointEdgeWave<'a, T> {
    /// Wave over caller owned work arrays, one record per mesh point and
    /// per mesh edge.
    ///
    /// # Panics
    ///
    /// If the work arrays do not match the mesh sizes.
    pub fn new(
        mesh: &'a PolyMesh,
        point_info: &'a mut [T],
        edge_info: &'a mut [T],
        options: WaveOptions,
    ) -> Self {
        assert_eq!(
            point_info.len(),
            mesh.n_points(),
            "size of point info work array {} is not the number of points in the mesh {}",
            point_info.len(),
            mesh.n_points()
        );
        let n_edges = mesh.edges().len();
        assert_eq!(
            edge_info.len(),
            n_edges,
            "size of edge info work array {} is not the number of edges in the mesh {}",
            edge_info.len(),
            n_edges
        );

        let n_unvisited_points = point_info.iter().filter(|i| !i.valid()).count();
        let n_unvisited_edges = edge_info.iter().filter(|i| !i.valid()).count();

        Self {
            mesh,
            point_info,
            edge_info,
            options,
            changed_point: vec![false; mesh.n_points()],
            changed_points: Vec::new(),
            changed_edge: vec![false; n_edges],
            changed_edges: Vec::new(),
            n_evals: 0,
            n_unvisited_points,
            n_unvisited_edges,
        }
    }

    /// Seed the given points and propagate until nothing changes
    pub fn run(
        mesh: &'a PolyMesh,
        seed_points: &[usize],
        seed_info: &[T],
        point_info: &'a mut [T],
        edge_info: &'a mut [T],
        max_iter: usize,
        options: WaveOptions,
    ) -> Result<Self> {
        let mut wave = Self::new(mesh, point_info, edge_info, options);
        wave.set_point_info(seed_points, seed_info);
        log::debug!("Seed points               : {}", wave.changed_points.len());
        wave.iterate(max_iter)?;
        Ok(wave)
    }

    pub fn point_info(&self) -> &[T] {
        self.point_info
    }

    pub fn edge_info(&self) -> &[T] {
        self.edge_info
    }

    pub fn n_changed_points(&self) -> usize {
        self.changed_points.len()
    }

    pub fn n_changed_edges(&self) -> usize {
        self.changed_edges.len()
    }

    pub fn n_evals(&self) -> usize {
        self.n_evals
    }

    /// Points that never received a valid record
    pub fn get_unset_points(&self) -> usize {
        self.n_unvisited_points
    }

    pub fn get_unset_edges(&self) -> usize {
        self.n_unvisited_edges
    }

    /// Overwrite the records of some points and mark them changed. A point
    /// listed twice keeps the last record.
    pub fn set_point_info(&mut self, points: &[usize], info: &[T]) {
        assert_eq!(
            points.len(),
            info.len(),
            "{} seed points but {} seed records",
            points.len(),
            info.len()
        );

        for (&pointi, new_info) in points.iter().zip(info) {
            let was_valid = self.point_info[pointi].valid();
            self.point_info[pointi] = new_info.clone();
            if !was_valid && self.point_info[pointi].valid() {
                self.n_unvisited_points -= 1;
            }
            self.mark_point(pointi);
        }
    }

    fn mark_point(&mut self, pointi: usize) {
        if !self.changed_point[pointi] {
            self.changed_point[pointi] = true;
            self.changed_points.push(pointi);
        }
    }

    fn mark_edge(&mut self, edgei: usize) {
        if !self.changed_edge[edgei] {
            self.changed_edge[edgei] = true;
            self.changed_edges.push(edgei);
        }
    }

    fn update_point(&mut self, pointi: usize, neighbour: &T) -> bool {
        self.n_evals += 1;
        let position = self.mesh.points()[pointi];
        let info = &mut self.point_info[pointi];
        let was_valid = info.valid();
        let propagate = info.update(&position, neighbour, self.options.propagation_tol);
        let now_valid = info.valid();

        if propagate {
            self.mark_point(pointi);
        }
        if !was_valid && now_valid {
            self.n_unvisited_points -= 1;
        }
        propagate
    }

    fn merge_point(&mut self, pointi: usize, received: &T) -> bool {
        self.n_evals += 1;
        let info = &mut self.point_info[pointi];
        let was_valid = info.valid();
        let propagate = info.update_merge(received, self.options.propagation_tol);
        let now_valid = info.valid();

        if propagate {
            self.mark_point(pointi);
        }
        if !was_valid && now_valid {
            self.n_unvisited_points -= 1;
        }
        propagate
    }

    fn update_edge(&mut self, edgei: usize, neighbour: &T) -> bool {
        self.n_evals += 1;
        let position = self.mesh.edges()[edgei].centre(self.mesh.points());
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

    /// Exchange changed records between coupled copies of a point
    fn sync_coupled_points(&mut self) {
        let mesh = self.mesh;
        let coupling = mesh.coupling();
        if coupling.is_empty() {
            return;
        }
        let points = mesh.points();

        for group in coupling.groups() {
            // records leaving every changed member, relative to that member
            let sent: Vec<(usize, T)> = group
                .members
                .iter()
                .filter(|&&p| self.changed_point[p])
                .map(|&p| {
                    let mut info = self.point_info[p].clone();
                    info.leave_domain(&points[p]);
                    (p, info)
                })
                .collect();

            for (from, info) in &sent {
                for &to in &group.members {
                    if to == *from {
                        continue;
                    }
                    let mut received = info.clone();
                    received.transform(&coupling.relative_rotation(*from, to));
                    received.enter_domain(&points[to]);
                    if !self.point_info[to].equal(&received) {
                        self.merge_point(to, &received);
                    }
                }
            }
        }
    }

    /// Push changed point records to their edges; returns the global number
    /// of changed edges.
    pub fn point_to_edge(&mut self) -> usize {
        let changed = std::mem::take(&mut self.changed_points);
        let mesh = self.mesh;

        for &pointi in &changed {
            if !self.changed_point[pointi] {
                panic!(
                    "point {} not marked as having been changed; this might be caused by \
                     multiple occurrences of the same seed point",
                    pointi
                );
            }

            let neighbour = self.point_info[pointi].clone();
            for &edgei in &mesh.point_edges()[pointi] {
                if !self.edge_info[edgei].equal(&neighbour) {
                    self.update_edge(edgei, &neighbour);
                }
            }
            self.changed_point[pointi] = false;
        }

        log::trace!("Changed edges             : {}", self.changed_edges.len());
        mesh.comm().sum_count(self.changed_edges.len())
    }

    /// Push changed edge records to their end points, then synchronise
    /// coupled points; returns the global number of changed points.
    pub fn edge_to_point(&mut self) -> usize {
        let changed = std::mem::take(&mut self.changed_edges);
        let mesh = self.mesh;

        for &edgei in &changed {
            if !self.changed_edge[edgei] {
                panic!(
                    "edge {} not marked as having been changed; this might be caused by \
                     multiple occurrences of the same seed point",
                    edgei
                );
            }

            let neighbour = self.edge_info[edgei].clone();
            let e = mesh.edges()[edgei];
            for pointi in [e.start, e.end] {
                if !self.point_info[pointi].equal(&neighbour) {
                    self.update_point(pointi, &neighbour);
                }
            }
            self.changed_edge[edgei] = false;
        }

        self.sync_coupled_points();

        log::trace!("Changed points            : {}", self.changed_points.len());
        mesh.comm().sum_count(self.changed_points.len())
    }

    /// Alternate point to edge and edge to point steps until one of them
    /// changes nothing or `max_iter` iterations were done. Running out of
    /// iterations is handled by the [`ConvergencePolicy`](super::ConvergencePolicy).
    pub fn iterate(&mut self, max_iter: usize) -> Result<usize> {
        self.sync_coupled_points();

        self.n_evals = 0;
        let mut iter = 0;
        while iter < max_iter {
            let n_edges = self.point_to_edge();
            log::trace!("Iteration {}: {} changed edges", iter, n_edges);
            if n_edges == 0 {
                break;
            }

            let n_points = self.edge_to_point();
            log::trace!(
                "Iteration {}: {} changed points, {} evaluations, {} points and {} edges unvisited",
                iter,
                n_points,
                self.n_evals,
                self.n_unvisited_points,
                self.n_unvisited_edges
            );
            if n_points == 0 {
                break;
            }
            iter += 1;
        }

        log::debug!(
            "Point-edge wave finished after {} iterations ({} unset points)",
            iter,
            self.n_unvisited_points
        );

        self.options.check_convergence(
            "point-edge wave",
            iter,
            max_iter,
            (self.changed_points.len(), self.changed_edges.len()),
            self.n_unvisited_points,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::{ConvergencePolicy, PointEdgePoint};
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_distance_from_corner() {
        let mesh = PolyMesh::block([3, 3, 3], Point3::origin(), Point3::new(3.0, 3.0, 3.0)).unwrap();
        let mut points = vec![PointEdgePoint::default(); mesh.n_points()];
        let mut edges = vec![PointEdgePoint::default(); mesh.edges().len()];

        let wave = PointEdgeWave::run(
            &mesh,
            &[0],
            &[PointEdgePoint::seed(Point3::origin())],
            &mut points,
            &mut edges,
            100,
            WaveOptions::default(),
        )
        .unwrap();
        assert_eq!(wave.get_unset_points(), 0);
        assert_eq!(wave.get_unset_edges(), 0);
        drop(wave);

        // a single seed reaches everything with the exact distance
        for (p, info) in mesh.points().iter().zip(&points) {
            assert_relative_eq!(info.dist_sqr, p.coords.norm_squared(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_nearest_of_two_seeds() {
        let mesh = PolyMesh::block([4, 1, 1], Point3::origin(), Point3::new(4.0, 1.0, 1.0)).unwrap();
        let mut points = vec![PointEdgePoint::default(); mesh.n_points()];
        let mut edges = vec![PointEdgePoint::default(); mesh.edges().len()];

        // points 0 and 4 lie on x = 0 and x = 4, y = z = 0
        let seeds = [0, 4];
        let info: Vec<_> = seeds
            .iter()
            .map(|&p| PointEdgePoint::seed(mesh.points()[p]))
            .collect();
        PointEdgeWave::run(&mesh, &seeds, &info, &mut points, &mut edges, 100, WaveOptions::default())
            .unwrap();

        for (p, info) in mesh.points().iter().zip(&points) {
            let origin = info.origin.unwrap();
            let expected_x = if p.x < 2.0 { 0.0 } else if p.x > 2.0 { 4.0 } else { origin.x };
            assert_relative_eq!(origin.x, expected_x);
        }
    }

    #[test]
    fn test_report_when_out_of_iterations() {
        let mesh = PolyMesh::block([5, 1, 1], Point3::origin(), Point3::new(5.0, 1.0, 1.0)).unwrap();
        let mut points = vec![PointEdgePoint::default(); mesh.n_points()];
        let mut edges = vec![PointEdgePoint::default(); mesh.edges().len()];
        let options = WaveOptions {
            policy: ConvergencePolicy::Report,
            ..Default::default()
        };

        let result = PointEdgeWave::run(
            &mesh,
            &[0],
            &[PointEdgePoint::seed(Point3::origin())],
            &mut points,
            &mut edges,
            1,
            options,
        );
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "size of point info work array")]
    fn test_size_mismatch_panics() {
        let mesh = PolyMesh::block([1, 1, 1], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let mut points = vec![PointEdgePoint::default(); 3];
        let mut edges = vec![PointEdgePoint::default(); mesh.edges().len()];
        PointEdgeWave::new(&mesh, &mut points, &mut edges, WaveOptions::default());
    }
}
