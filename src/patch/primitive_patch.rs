// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Demand-driven topology of a list of faces.
//!
//! A [`PrimitivePatch`] holds faces that index into a shared point array and
//! derives its connectivity only when asked for it:
//!
//! - local point numbering (`mesh_points`, `local_faces`)
//! - edges, internal edges first, with face-face, edge-face and face-edge
//!   addressing
//! - point-edge and point-face addressing in local point labels
//! - boundary points and closed boundary edge loops
//! - face centres, face normals and point normals
//!
//! Every derived quantity lives in its own [`OnceCell`]. Moving the points
//! clears the geometry only; changing the faces means building a new patch.

use crate::mesh::face::{face_centre, face_edge, face_unit_normal, Edge, Face};
use crate::mesh::PolyMesh;
use crate::utils::math::VSMALL;
use ahash::{AHashMap, AHashSet};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::VecDeque;

/// Classification of a patch surface by edge usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceTopo {
    /// Every edge is used by exactly two faces
    Manifold,
    /// Some edges are used by one face
    Open,
    /// Some edges are used by more than two faces
    Illegal,
}

#[derive(Debug, Clone)]
struct MeshAddressing {
    mesh_points: Vec<usize>,
    local_faces: Vec<Face>,
    mesh_point_map: AHashMap<usize, usize>,
}

#[derive(Debug, Clone)]
struct Topology {
    edges: Vec<Edge>,
    n_internal_edges: usize,
    face_faces: Vec<Vec<usize>>,
    edge_faces: Vec<Vec<usize>>,
    face_edges: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct PrimitivePatch {
    faces: Vec<Face>,
    points: Vec<Point3<f64>>,
    addressing: Vec<usize>,

    mesh_addr: OnceCell<MeshAddressing>,
    topology: OnceCell<Topology>,
    point_edges: OnceCell<Vec<Vec<usize>>>,
    point_faces: OnceCell<Vec<Vec<usize>>>,
    boundary_points: OnceCell<Vec<usize>>,
    edge_loops: OnceCell<Vec<Vec<usize>>>,
    local_point_order: OnceCell<Vec<usize>>,

    local_points: OnceCell<Vec<Point3<f64>>>,
    face_centres: OnceCell<Vec<Point3<f64>>>,
    face_normals: OnceCell<Vec<Vector3<f64>>>,
    point_normals: OnceCell<Vec<Vector3<f64>>>,
}

impl PrimitivePatch {
    /// Free-standing patch of `faces` over `points`
    pub fn new(faces: Vec<Face>, points: Vec<Point3<f64>>) -> Self {
        Self::with_addressing(faces, points, Vec::new())
    }

    /// Patch of a subset of mesh faces; keeps the face labels as addressing
    pub fn from_mesh(mesh: &PolyMesh, face_labels: &[usize]) -> Self {
        let faces = face_labels
            .iter()
            .map(|&f| mesh.faces()[f].clone())
            .collect();
        Self::with_addressing(faces, mesh.points().to_vec(), face_labels.to_vec())
    }

    /// Patch of all faces of the given mesh patches
    pub fn from_patches(mesh: &PolyMesh, patch_ids: &[usize]) -> Self {
        Self::from_mesh(mesh, &mesh.patch_faces(patch_ids))
    }

    fn with_addressing(faces: Vec<Face>, points: Vec<Point3<f64>>, addressing: Vec<usize>) -> Self {
        Self {
            faces,
            points,
            addressing,
            mesh_addr: OnceCell::new(),
            topology: OnceCell::new(),
            point_edges: OnceCell::new(),
            point_faces: OnceCell::new(),
            boundary_points: OnceCell::new(),
            edge_loops: OnceCell::new(),
            local_point_order: OnceCell::new(),
            local_points: OnceCell::new(),
            face_centres: OnceCell::new(),
            face_normals: OnceCell::new(),
            point_normals: OnceCell::new(),
        }
    }

    /// Faces in global point labels
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// The full point array the faces index into
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Mesh face label of every patch face; empty for a free patch
    pub fn addressing(&self) -> &[usize] {
        &self.addressing
    }

    pub fn size(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    // Local point addressing

    fn calc_mesh_data(&self) -> MeshAddressing {
        assert!(
            self.mesh_addr.get().is_none(),
            "mesh point addressing already calculated"
        );

        let mut mesh_point_map = AHashMap::with_capacity(4 * self.faces.len());
        let mut mesh_points = Vec::new();

        // number points in order of first appearance in the faces
        let local_faces = self
            .faces
            .iter()
            .map(|face| {
                face.iter()
                    .map(|&p| {
                        *mesh_point_map.entry(p).or_insert_with(|| {
                            mesh_points.push(p);
                            mesh_points.len() - 1
                        })
                    })
                    .collect()
            })
            .collect();

        MeshAddressing {
            mesh_points,
            local_faces,
            mesh_point_map,
        }
    }

    fn mesh_addr(&self) -> &MeshAddressing {
        self.mesh_addr.get_or_init(|| self.calc_mesh_data())
    }

    /// Global label of every local point
    pub fn mesh_points(&self) -> &[usize] {
        &self.mesh_addr().mesh_points
    }

    /// Faces renumbered into local point labels
    pub fn local_faces(&self) -> &[Face] {
        &self.mesh_addr().local_faces
    }

    /// Global to local point label
    pub fn mesh_point_map(&self) -> &AHashMap<usize, usize> {
        &self.mesh_addr().mesh_point_map
    }

    pub fn which_point(&self, global: usize) -> Option<usize> {
        self.mesh_point_map().get(&global).copied()
    }

    pub fn n_points(&self) -> usize {
        self.mesh_points().len()
    }

    // Edge addressing

    fn calc_addressing(&self) -> Topology {
        assert!(
            self.topology.get().is_none(),
            "addressing already calculated"
        );

        let local_faces = self.local_faces();
        let point_faces = self.point_faces();
        let n_faces = local_faces.len();

        let mut edges = Vec::new();
        let mut edge_faces: Vec<Vec<usize>> = Vec::new();
        let mut face_faces: Vec<Vec<usize>> = vec![Vec::new(); n_faces];
        let mut face_edges: Vec<Vec<Option<usize>>> =
            local_faces.iter().map(|f| vec![None; f.len()]).collect();

        for facei in 0..n_faces {
            let face = &local_faces[facei];

            // edges of this face shared with higher numbered faces
            let mut shared: Vec<(usize, Vec<(usize, usize)>)> = Vec::new();
            for fp in 0..face.len() {
                if face_edges[facei][fp].is_some() {
                    continue;
                }
                let e = face_edge(face, fp);

                let nbrs: Vec<(usize, usize)> = point_faces[e.start]
                    .iter()
                    .filter(|&&nbr| nbr > facei)
                    .filter_map(|&nbr| {
                        let nbr_face = &local_faces[nbr];
                        (0..nbr_face.len())
                            .find(|&nfp| face_edge(nbr_face, nfp) == e)
                            .map(|nfp| (nbr, nfp))
                    })
                    .collect();

                if !nbrs.is_empty() {
                    shared.push((fp, nbrs));
                }
            }

            // lowest neighbour first
            shared.sort_by_key(|(_, nbrs)| nbrs[0].0);

            for (fp, nbrs) in shared {
                let edgei = edges.len();
                edges.push(face_edge(face, fp));
                face_edges[facei][fp] = Some(edgei);

                let mut ef = Vec::with_capacity(nbrs.len() + 1);
                ef.push(facei);
                for (nbr, nfp) in nbrs {
                    face_edges[nbr][nfp] = Some(edgei);
                    ef.push(nbr);
                    if !face_faces[facei].contains(&nbr) {
                        face_faces[facei].push(nbr);
                        face_faces[nbr].push(facei);
                    }
                }
                edge_faces.push(ef);
            }
        }

        let n_internal_edges = edges.len();

        for (facei, face) in local_faces.iter().enumerate() {
            for fp in 0..face.len() {
                if face_edges[facei][fp].is_none() {
                    face_edges[facei][fp] = Some(edges.len());
                    edges.push(face_edge(face, fp));
                    edge_faces.push(vec![facei]);
                }
            }
        }

        let face_edges = face_edges
            .into_iter()
            .map(|fe| fe.into_iter().flatten().collect())
            .collect();

        log::trace!(
            "patch of {} faces: {} edges, {} internal",
            n_faces,
            edges.len(),
            n_internal_edges
        );

        Topology {
            edges,
            n_internal_edges,
            face_faces,
            edge_faces,
            face_edges,
        }
    }

    fn topology(&self) -> &Topology {
        self.topology.get_or_init(|| self.calc_addressing())
    }

    /// Edges in local point labels, internal edges first
    pub fn edges(&self) -> &[Edge] {
        &self.topology().edges
    }

    pub fn n_edges(&self) -> usize {
        self.edges().len()
    }

    pub fn n_internal_edges(&self) -> usize {
        self.topology().n_internal_edges
    }

    pub fn is_internal_edge(&self, edgei: usize) -> bool {
        edgei < self.n_internal_edges()
    }

    pub fn face_faces(&self) -> &[Vec<usize>] {
        &self.topology().face_faces
    }

    pub fn edge_faces(&self) -> &[Vec<usize>] {
        &self.topology().edge_faces
    }

    /// Edge of every face side; side `i` runs from point `i` to point `i + 1`
    pub fn face_edges(&self) -> &[Vec<usize>] {
        &self.topology().face_edges
    }

    pub fn point_edges(&self) -> &[Vec<usize>] {
        self.point_edges.get_or_init(|| {
            let mut pe = vec![Vec::new(); self.n_points()];
            for (edgei, e) in self.edges().iter().enumerate() {
                pe[e.start].push(edgei);
                pe[e.end].push(edgei);
            }
            pe
        })
    }

    /// Faces using each local point, in increasing face order
    pub fn point_faces(&self) -> &[Vec<usize>] {
        self.point_faces.get_or_init(|| {
            let mut pf = vec![Vec::new(); self.n_points()];
            for (facei, face) in self.local_faces().iter().enumerate() {
                for &p in face {
                    pf[p].push(facei);
                }
            }
            pf
        })
    }

    /// Local label of an edge given in local point labels
    pub fn which_edge(&self, e: &Edge) -> Option<usize> {
        self.point_edges()
            .get(e.start)?
            .iter()
            .copied()
            .find(|&edgei| self.edges()[edgei] == *e)
    }

    /// Mesh edge label of every patch edge.
    ///
    /// # Panics
    ///
    /// If a patch edge is not among the mesh edges.
    pub fn mesh_edges(&self, all_edges: &[Edge], point_edges: &[Vec<usize>]) -> Vec<usize> {
        let mesh_points = self.mesh_points();
        self.edges()
            .iter()
            .map(|e| {
                let global = Edge::new(mesh_points[e.start], mesh_points[e.end]);
                point_edges[global.start]
                    .iter()
                    .copied()
                    .find(|&edgei| all_edges[edgei] == global)
                    .unwrap_or_else(|| {
                        panic!(
                            "cannot find patch edge {:?} (mesh points {} {}) among the mesh edges",
                            e, global.start, global.end
                        )
                    })
            })
            .collect()
    }

    /// Local points on boundary edges, sorted
    pub fn boundary_points(&self) -> &[usize] {
        self.boundary_points.get_or_init(|| {
            let mut bp: Vec<usize> = self.edges()[self.n_internal_edges()..]
                .iter()
                .flat_map(|e| [e.start, e.end])
                .collect();
            bp.sort_unstable();
            bp.dedup();
            bp
        })
    }

    /// Closed loops of boundary points, each following the face winding
    pub fn edge_loops(&self) -> &[Vec<usize>] {
        self.edge_loops.get_or_init(|| self.calc_edge_loops())
    }

    fn calc_edge_loops(&self) -> Vec<Vec<usize>> {
        let edges = self.edges();
        let n_internal = self.n_internal_edges();
        let point_edges = self.point_edges();

        let mut visited = vec![false; edges.len()];
        let mut loops = Vec::new();

        for start_edge in n_internal..edges.len() {
            if visited[start_edge] {
                continue;
            }

            let mut current_loop = Vec::new();
            let mut edgei = start_edge;
            loop {
                visited[edgei] = true;
                let e = edges[edgei];
                current_loop.push(e.start);

                let next = point_edges[e.end]
                    .iter()
                    .copied()
                    .find(|&ne| ne >= n_internal && !visited[ne]);
                match next {
                    Some(ne) => edgei = ne,
                    None => break,
                }
            }
            loops.push(current_loop);
        }

        loops
    }

    /// Local points ordered by a breadth first walk over face neighbours
    pub fn local_point_order(&self) -> &[usize] {
        self.local_point_order
            .get_or_init(|| self.calc_local_point_order())
    }

    fn calc_local_point_order(&self) -> Vec<usize> {
        let local_faces = self.local_faces();
        let face_faces = self.face_faces();

        let mut order = Vec::with_capacity(self.n_points());
        let mut visited_point = vec![false; self.n_points()];
        let mut visited_face = vec![false; local_faces.len()];
        let mut queue = VecDeque::new();

        for seed in 0..local_faces.len() {
            if visited_face[seed] {
                continue;
            }
            visited_face[seed] = true;
            queue.push_back(seed);

            while let Some(facei) = queue.pop_front() {
                for &p in &local_faces[facei] {
                    if !visited_point[p] {
                        visited_point[p] = true;
                        order.push(p);
                    }
                }
                for &nbr in &face_faces[facei] {
                    if !visited_face[nbr] {
                        visited_face[nbr] = true;
                        queue.push_back(nbr);
                    }
                }
            }
        }

        order
    }

    // Checks

    pub fn surface_type(&self) -> SurfaceTopo {
        let mut topo = SurfaceTopo::Manifold;
        for ef in self.edge_faces() {
            match ef.len() {
                2 => {}
                1 => topo = SurfaceTopo::Open,
                _ => return SurfaceTopo::Illegal,
            }
        }
        topo
    }

    /// True if any edge is used by other than one or two faces. Mesh points
    /// of such edges are added to `bad_points`.
    pub fn check_topology(&self, mut bad_points: Option<&mut AHashSet<usize>>) -> bool {
        let mesh_points = self.mesh_points();
        let mut illegal = false;

        for (edgei, ef) in self.edge_faces().iter().enumerate() {
            if ef.len() < 1 || ef.len() > 2 {
                illegal = true;
                let e = self.edges()[edgei];
                match bad_points.as_deref_mut() {
                    Some(set) => {
                        set.insert(mesh_points[e.start]);
                        set.insert(mesh_points[e.end]);
                    }
                    None => break,
                }
            }
        }

        illegal
    }

    /// True if the faces around some point do not form one edge connected
    /// fan. Mesh points where that happens are added to `bad_points`.
    pub fn check_point_manifold(&self, mut bad_points: Option<&mut AHashSet<usize>>) -> bool {
        let point_faces = self.point_faces();
        let point_edges = self.point_edges();
        let edge_faces = self.edge_faces();
        let mesh_points = self.mesh_points();

        let mut found = false;
        let mut reached = AHashSet::new();
        let mut stack = Vec::new();

        for (pointi, pf) in point_faces.iter().enumerate() {
            if pf.len() < 2 {
                continue;
            }

            reached.clear();
            stack.clear();
            reached.insert(pf[0]);
            stack.push(pf[0]);

            // walk across edges that use this point
            while let Some(facei) = stack.pop() {
                for &edgei in &point_edges[pointi] {
                    let ef = &edge_faces[edgei];
                    if !ef.contains(&facei) {
                        continue;
                    }
                    for &nbr in ef {
                        if reached.insert(nbr) {
                            stack.push(nbr);
                        }
                    }
                }
            }

            if reached.len() != pf.len() {
                found = true;
                match bad_points.as_deref_mut() {
                    Some(set) => {
                        set.insert(mesh_points[pointi]);
                    }
                    None => break,
                }
            }
        }

        found
    }

    // Geometry

    pub fn local_points(&self) -> &[Point3<f64>] {
        self.local_points.get_or_init(|| {
            self.mesh_points()
                .iter()
                .map(|&p| self.points[p])
                .collect()
        })
    }

    pub fn face_centres(&self) -> &[Point3<f64>] {
        self.face_centres.get_or_init(|| {
            self.faces
                .iter()
                .map(|f| face_centre(f, &self.points))
                .collect()
        })
    }

    pub fn face_normals(&self) -> &[Vector3<f64>] {
        self.face_normals.get_or_init(|| {
            self.faces
                .iter()
                .map(|f| face_unit_normal(f, &self.points))
                .collect()
        })
    }

    /// Normalised sum of the unit normals of the faces using each local
    /// point
    pub fn point_normals(&self) -> &[Vector3<f64>] {
        self.point_normals.get_or_init(|| {
            let sums = self.point_normal_sums();
            sums.into_iter()
                .map(|n| n / (n.norm() + VSMALL))
                .collect()
        })
    }

    /// Unnormalised point normals, for callers that combine contributions
    /// from coupled copies before normalising
    pub fn point_normal_sums(&self) -> Vec<Vector3<f64>> {
        let face_normals = self.face_normals();
        let mut sums = vec![Vector3::zeros(); self.n_points()];
        for (pointi, pf) in self.point_faces().iter().enumerate() {
            for &facei in pf {
                sums[pointi] += face_normals[facei];
            }
        }
        sums
    }

    // Modification

    /// Replace the point array; keeps the topology
    pub fn move_points(&mut self, points: Vec<Point3<f64>>) {
        assert_eq!(
            points.len(),
            self.points.len(),
            "patch has {} points but {} positions were given",
            self.points.len(),
            points.len()
        );
        self.points = points;
        self.clear_geom();
    }

    pub fn clear_geom(&mut self) {
        self.local_points.take();
        self.face_centres.take();
        self.face_normals.take();
        self.point_normals.take();
    }

    pub fn clear_topology(&mut self) {
        self.topology.take();
        self.point_edges.take();
        self.point_faces.take();
        self.boundary_points.take();
        self.edge_loops.take();
        self.local_point_order.take();
    }

    pub fn clear_patch_mesh_addr(&mut self) {
        self.mesh_addr.take();
    }

    pub fn clear_out(&mut self) {
        self.clear_geom();
        self.clear_topology();
        self.clear_patch_mesh_addr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `n x n` quads on the unit square in the z = 0 plane
    fn grid(n: usize) -> PrimitivePatch {
        let mut points = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                points.push(Point3::new(i as f64 / n as f64, j as f64 / n as f64, 0.0));
            }
        }
        let idx = |i: usize, j: usize| i + (n + 1) * j;
        let mut faces = Vec::new();
        for j in 0..n {
            for i in 0..n {
                faces.push(vec![idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        PrimitivePatch::new(faces, points)
    }

    #[test]
    fn test_grid_addressing() {
        let patch = grid(2);
        assert_eq!(patch.n_points(), 9);
        assert_eq!(patch.n_edges(), 12);
        assert_eq!(patch.n_internal_edges(), 4);
        assert_eq!(patch.surface_type(), SurfaceTopo::Open);

        for (edgei, ef) in patch.edge_faces().iter().enumerate() {
            let expected = if patch.is_internal_edge(edgei) { 2 } else { 1 };
            assert_eq!(ef.len(), expected);
        }

        let n_face_edges: usize = patch.face_edges().iter().map(|fe| fe.len()).sum();
        assert_eq!(n_face_edges, 16);

        for (facei, fe) in patch.face_edges().iter().enumerate() {
            let face = &patch.local_faces()[facei];
            for (fp, &edgei) in fe.iter().enumerate() {
                assert_eq!(patch.edges()[edgei], face_edge(face, fp));
            }
        }

        // face 0 touches faces 1 and 2 through edges, face 3 only at a point
        let mut ff = patch.face_faces()[0].clone();
        ff.sort_unstable();
        assert_eq!(ff, vec![1, 2]);
    }

    #[test]
    fn test_internal_edges_lowest_neighbour_first() {
        let patch = grid(2);
        // face 0 shares an edge with face 1 and face 2; face 1 comes first
        assert_eq!(patch.edge_faces()[0], vec![0, 1]);
        assert_eq!(patch.edge_faces()[1], vec![0, 2]);
    }

    #[test]
    fn test_boundary_loop() {
        let patch = grid(2);
        assert_eq!(patch.boundary_points().len(), 8);
        let loops = patch.edge_loops();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 8);
        // the centre point is interior
        let centre = patch.which_point(4).unwrap();
        assert!(!loops[0].contains(&centre));
    }

    #[test]
    fn test_local_point_order_visits_every_point() {
        let patch = grid(3);
        let mut order = patch.local_point_order().to_vec();
        assert_eq!(order.len(), patch.n_points());
        order.sort_unstable();
        order.dedup();
        assert_eq!(order.len(), patch.n_points());
    }

    #[test]
    fn test_closed_block_boundary() {
        let mesh = PolyMesh::block([1, 1, 1], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let all: Vec<usize> = (0..mesh.patches().len()).collect();
        let patch = PrimitivePatch::from_patches(&mesh, &all);

        assert_eq!(patch.size(), 6);
        assert_eq!(patch.n_edges(), 12);
        assert_eq!(patch.n_internal_edges(), 12);
        assert_eq!(patch.surface_type(), SurfaceTopo::Manifold);
        assert!(patch.edge_loops().is_empty());
        assert!(!patch.check_topology(None));
        assert!(!patch.check_point_manifold(None));

        let corner = patch.which_point(0).unwrap();
        let expected = Vector3::new(-1.0, -1.0, -1.0).normalize();
        assert_relative_eq!(patch.point_normals()[corner], expected, epsilon = 1e-12);

        let mesh_edges = patch.mesh_edges(mesh.edges(), mesh.point_edges());
        for (edgei, &me) in mesh_edges.iter().enumerate() {
            let e = patch.edges()[edgei];
            let global = Edge::new(patch.mesh_points()[e.start], patch.mesh_points()[e.end]);
            assert_eq!(mesh.edges()[me], global);
        }
    }

    #[test]
    fn test_non_manifold_edge() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
            Point3::new(0.5, 0.0, 1.0),
        ];
        let faces = vec![vec![0, 1, 2], vec![1, 0, 3], vec![0, 1, 4]];
        let patch = PrimitivePatch::new(faces, points);

        assert_eq!(patch.surface_type(), SurfaceTopo::Illegal);
        assert_eq!(patch.edge_faces()[0], vec![0, 1, 2]);

        let mut bad = AHashSet::new();
        assert!(patch.check_topology(Some(&mut bad)));
        assert_eq!(bad.len(), 2);
        assert!(bad.contains(&0) && bad.contains(&1));
    }

    #[test]
    fn test_bow_tie_point() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
            Point3::new(-1.0, -1.0, 0.0),
        ];
        let faces = vec![vec![0, 1, 2], vec![0, 3, 4]];
        let patch = PrimitivePatch::new(faces, points);

        let mut bad = AHashSet::new();
        assert!(patch.check_point_manifold(Some(&mut bad)));
        assert_eq!(bad.into_iter().collect::<Vec<_>>(), vec![0]);
        assert!(!patch.check_topology(None));
    }

    #[test]
    fn test_move_points_clears_geometry() {
        let mut patch = grid(1);
        assert_relative_eq!(patch.face_centres()[0], Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
        let n_edges = patch.n_edges();

        let moved: Vec<_> = patch
            .points()
            .iter()
            .map(|p| p + Vector3::new(0.0, 0.0, 2.0))
            .collect();
        patch.move_points(moved);

        assert_relative_eq!(patch.face_centres()[0], Point3::new(0.5, 0.5, 2.0), epsilon = 1e-12);
        assert_relative_eq!(patch.local_points()[0], Point3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
        assert_eq!(patch.n_edges(), n_edges);
    }

    #[test]
    #[should_panic(expected = "addressing already calculated")]
    fn test_recalculating_addressing_panics() {
        let patch = grid(1);
        let _ = patch.edges();
        patch.calc_addressing();
    }
}
