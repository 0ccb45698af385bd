// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Face-based polyhedral mesh.
//!
//! Faces are stored internal first, followed by each boundary patch as a
//! contiguous range. Every face is owned by one cell; internal faces also
//! have a neighbour, and their normal points from owner to neighbour.
//! Connectivity derived from the faces (edges, point-faces, cell-faces) and
//! the geometry are computed on first use and dropped when the points move.

use super::face::{face_edges, reverse_face, Edge, Face};
use super::geometry::MeshGeometry;
use crate::error::{MeshError, Result};
use crate::parallel::{Communicator, PointCoupling, SerialCommunicator};
use ahash::AHashMap;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::sync::Arc;

/// Physical role of a boundary patch; decides how its points may move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    /// Points follow the prescribed displacement
    Patch,
    /// Wall; moves like [`PatchKind::Patch`], kept as a label for repatching
    Wall,
    /// Points slide in the patch plane
    SymmetryPlane,
}

/// Contiguous range of boundary faces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub name: String,
    pub start: usize,
    pub size: usize,
    pub kind: PatchKind,
}

impl Patch {
    pub fn new(name: impl Into<String>, start: usize, size: usize, kind: PatchKind) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            kind,
        }
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.size
    }
}

/// Named set of faces with per-face orientation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceZone {
    pub name: String,
    pub faces: Vec<usize>,
    /// `true` where the zone orientation is opposite to the face normal
    pub flip_map: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct PolyMesh {
    points: Vec<Point3<f64>>,
    faces: Vec<Face>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    patches: Vec<Patch>,
    face_zones: Vec<FaceZone>,
    n_cells: usize,
    coupling: PointCoupling,
    comm: Arc<dyn Communicator>,

    edges: OnceCell<Vec<Edge>>,
    edge_lookup: OnceCell<AHashMap<Edge, usize>>,
    point_edges: OnceCell<Vec<Vec<usize>>>,
    point_faces: OnceCell<Vec<Vec<usize>>>,
    cells: OnceCell<Vec<Vec<usize>>>,
    geometry: OnceCell<MeshGeometry>,
}

impl PolyMesh {
    /// Build and validate a mesh. `neighbour` holds one entry per internal
    /// face; patches must tile the remaining faces in order.
    pub fn new(
        points: Vec<Point3<f64>>,
        faces: Vec<Face>,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        patches: Vec<Patch>,
    ) -> Result<Self> {
        if owner.len() != faces.len() {
            return Err(MeshError::InvalidMesh(format!(
                "{} faces but {} owners",
                faces.len(),
                owner.len()
            )));
        }
        if neighbour.len() > faces.len() {
            return Err(MeshError::InvalidMesh(format!(
                "{} neighbours for {} faces",
                neighbour.len(),
                faces.len()
            )));
        }

        let mut next_start = neighbour.len();
        for patch in &patches {
            if patch.start != next_start {
                return Err(MeshError::InvalidMesh(format!(
                    "patch '{}' starts at face {} instead of {}",
                    patch.name, patch.start, next_start
                )));
            }
            next_start += patch.size;
        }
        if next_start != faces.len() {
            return Err(MeshError::InvalidMesh(format!(
                "patches end at face {} but the mesh has {} faces",
                next_start,
                faces.len()
            )));
        }

        for (facei, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::InvalidMesh(format!(
                    "face {} has only {} points",
                    facei,
                    face.len()
                )));
            }
            if let Some(&p) = face.iter().find(|&&p| p >= points.len()) {
                return Err(MeshError::InvalidMesh(format!(
                    "face {} uses point {} but there are {} points",
                    facei,
                    p,
                    points.len()
                )));
            }
        }

        let n_cells = owner
            .iter()
            .chain(neighbour.iter())
            .max()
            .map_or(0, |&c| c + 1);

        Ok(Self {
            points,
            faces,
            owner,
            neighbour,
            patches,
            face_zones: Vec::new(),
            n_cells,
            coupling: PointCoupling::default(),
            comm: Arc::new(SerialCommunicator),
            edges: OnceCell::new(),
            edge_lookup: OnceCell::new(),
            point_edges: OnceCell::new(),
            point_faces: OnceCell::new(),
            cells: OnceCell::new(),
            geometry: OnceCell::new(),
        })
    }

    /// Hexahedral block of `n[0] x n[1] x n[2]` cells spanning `[min, max]`,
    /// with one patch per side named `xmin`, `xmax`, `ymin`, `ymax`, `zmin`
    /// and `zmax`.
    pub fn block(n: [usize; 3], min: Point3<f64>, max: Point3<f64>) -> Result<Self> {
        let [nx, ny, nz] = n;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(MeshError::invalid_param(
                "n",
                "block needs at least one cell in every direction",
            ));
        }

        let pt = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);
        let cell = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
        let delta = max - min;

        let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    points.push(Point3::new(
                        min.x + delta.x * i as f64 / nx as f64,
                        min.y + delta.y * j as f64 / ny as f64,
                        min.z + delta.z * k as f64 / nz as f64,
                    ));
                }
            }
        }

        // faces with +x, +y and +z normals
        let x_face = |i, j, k| vec![pt(i, j, k), pt(i, j + 1, k), pt(i, j + 1, k + 1), pt(i, j, k + 1)];
        let y_face = |i, j, k| vec![pt(i, j, k), pt(i, j, k + 1), pt(i + 1, j, k + 1), pt(i + 1, j, k)];
        let z_face = |i, j, k| vec![pt(i, j, k), pt(i + 1, j, k), pt(i + 1, j + 1, k), pt(i, j + 1, k)];

        let mut faces = Vec::new();
        let mut owner = Vec::new();
        let mut neighbour = Vec::new();

        for k in 0..nz {
            for j in 0..ny {
                for i in 1..nx {
                    faces.push(x_face(i, j, k));
                    owner.push(cell(i - 1, j, k));
                    neighbour.push(cell(i, j, k));
                }
            }
        }
        for k in 0..nz {
            for j in 1..ny {
                for i in 0..nx {
                    faces.push(y_face(i, j, k));
                    owner.push(cell(i, j - 1, k));
                    neighbour.push(cell(i, j, k));
                }
            }
        }
        for k in 1..nz {
            for j in 0..ny {
                for i in 0..nx {
                    faces.push(z_face(i, j, k));
                    owner.push(cell(i, j, k - 1));
                    neighbour.push(cell(i, j, k));
                }
            }
        }

        let mut patches = Vec::with_capacity(6);
        let mut add_patch = |name: &str, new_faces: Vec<(Face, usize)>| {
            let start = faces.len();
            let size = new_faces.len();
            for (f, c) in new_faces {
                faces.push(f);
                owner.push(c);
            }
            patches.push(Patch::new(name, start, size, PatchKind::Patch));
        };

        let mut xmin = Vec::new();
        let mut xmax = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                xmin.push((reverse_face(&x_face(0, j, k)), cell(0, j, k)));
                xmax.push((x_face(nx, j, k), cell(nx - 1, j, k)));
            }
        }
        add_patch("xmin", xmin);
        add_patch("xmax", xmax);

        let mut ymin = Vec::new();
        let mut ymax = Vec::new();
        for k in 0..nz {
            for i in 0..nx {
                ymin.push((reverse_face(&y_face(i, 0, k)), cell(i, 0, k)));
                ymax.push((y_face(i, ny, k), cell(i, ny - 1, k)));
            }
        }
        add_patch("ymin", ymin);
        add_patch("ymax", ymax);

        let mut zmin = Vec::new();
        let mut zmax = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                zmin.push((reverse_face(&z_face(i, j, 0)), cell(i, j, 0)));
                zmax.push((z_face(i, j, nz), cell(i, j, nz - 1)));
            }
        }
        add_patch("zmin", zmin);
        add_patch("zmax", zmax);

        Self::new(points, faces, owner, neighbour, patches)
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn face_zones(&self) -> &[FaceZone] {
        &self.face_zones
    }

    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn n_internal_faces(&self) -> usize {
        self.neighbour.len()
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn is_internal_face(&self, facei: usize) -> bool {
        facei < self.neighbour.len()
    }

    pub fn coupling(&self) -> &PointCoupling {
        &self.coupling
    }

    pub fn set_coupling(&mut self, coupling: PointCoupling) {
        self.coupling = coupling;
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    /// Shared handle to the communicator, for meshes derived from this one
    pub fn comm_handle(&self) -> Arc<dyn Communicator> {
        Arc::clone(&self.comm)
    }

    pub fn set_comm(&mut self, comm: Arc<dyn Communicator>) {
        self.comm = comm;
    }

    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name == name)
    }

    pub fn set_patch_kind(&mut self, patchi: usize, kind: PatchKind) {
        self.patches[patchi].kind = kind;
    }

    /// Patch holding a boundary face; `None` for internal faces
    pub fn which_patch(&self, facei: usize) -> Option<usize> {
        if self.is_internal_face(facei) {
            return None;
        }
        self.patches.iter().position(|p| p.range().contains(&facei))
    }

    /// All face labels of the given patches, patch by patch
    pub fn patch_faces(&self, patch_ids: &[usize]) -> Vec<usize> {
        patch_ids
            .iter()
            .flat_map(|&p| self.patches[p].range())
            .collect()
    }

    pub fn find_zone(&self, name: &str) -> Option<usize> {
        self.face_zones.iter().position(|z| z.name == name)
    }

    pub fn add_face_zone(
        &mut self,
        name: impl Into<String>,
        faces: Vec<usize>,
        flip_map: Vec<bool>,
    ) -> Result<usize> {
        let name = name.into();
        if faces.len() != flip_map.len() {
            return Err(MeshError::InvalidMesh(format!(
                "zone '{}' has {} faces but {} flip flags",
                name,
                faces.len(),
                flip_map.len()
            )));
        }
        if let Some(&f) = faces.iter().find(|&&f| f >= self.faces.len()) {
            return Err(MeshError::InvalidMesh(format!(
                "zone '{}' references face {} of {}",
                name,
                f,
                self.faces.len()
            )));
        }
        self.face_zones.push(FaceZone {
            name,
            faces,
            flip_map,
        });
        Ok(self.face_zones.len() - 1)
    }

    pub(crate) fn set_face_zones(&mut self, zones: Vec<FaceZone>) {
        self.face_zones = zones;
    }

    /// Replace the point positions; drops cached geometry
    pub fn move_points(&mut self, new_points: Vec<Point3<f64>>) {
        assert_eq!(
            new_points.len(),
            self.points.len(),
            "moving {} points with {} new positions",
            self.points.len(),
            new_points.len()
        );
        self.points = new_points;
        self.geometry.take();
    }

    pub fn geometry(&self) -> &MeshGeometry {
        self.geometry.get_or_init(|| MeshGeometry::new(self))
    }

    pub fn face_centres(&self) -> &[Point3<f64>] {
        &self.geometry().face_centres
    }

    pub fn face_areas(&self) -> &[Vector3<f64>] {
        &self.geometry().face_areas
    }

    pub fn cell_centres(&self) -> &[Point3<f64>] {
        &self.geometry().cell_centres
    }

    pub fn cell_volumes(&self) -> &[f64] {
        &self.geometry().cell_volumes
    }

    /// Unique edges in order of first appearance in the faces
    pub fn edges(&self) -> &[Edge] {
        self.edges.get_or_init(|| {
            let mut edges = Vec::new();
            let mut seen = AHashMap::new();
            for face in &self.faces {
                for e in face_edges(face) {
                    seen.entry(e).or_insert_with(|| {
                        edges.push(e);
                        edges.len() - 1
                    });
                }
            }
            edges
        })
    }

    pub fn find_edge(&self, edge: &Edge) -> Option<usize> {
        self.edge_lookup
            .get_or_init(|| {
                self.edges()
                    .iter()
                    .enumerate()
                    .map(|(i, e)| (*e, i))
                    .collect()
            })
            .get(edge)
            .copied()
    }

    pub fn point_edges(&self) -> &[Vec<usize>] {
        self.point_edges.get_or_init(|| {
            let mut pe = vec![Vec::new(); self.points.len()];
            for (i, e) in self.edges().iter().enumerate() {
                pe[e.start].push(i);
                pe[e.end].push(i);
            }
            pe
        })
    }

    pub fn point_faces(&self) -> &[Vec<usize>] {
        self.point_faces.get_or_init(|| {
            let mut pf = vec![Vec::new(); self.points.len()];
            for (facei, face) in self.faces.iter().enumerate() {
                for &p in face {
                    pf[p].push(facei);
                }
            }
            pf
        })
    }

    /// Faces of every cell
    pub fn cells(&self) -> &[Vec<usize>] {
        self.cells.get_or_init(|| {
            let mut cells = vec![Vec::new(); self.n_cells];
            for (facei, &own) in self.owner.iter().enumerate() {
                cells[own].push(facei);
            }
            for (facei, &nei) in self.neighbour.iter().enumerate() {
                cells[nei].push(facei);
            }
            cells
        })
    }

    /// Distinct points of a cell
    pub fn cell_points(&self, celli: usize) -> Vec<usize> {
        let mut pts: Vec<usize> = self.cells()[celli]
            .iter()
            .flat_map(|&f| self.faces[f].iter().copied())
            .collect();
        pts.sort_unstable();
        pts.dedup();
        pts
    }

    pub fn point_cells(&self, pointi: usize) -> Vec<usize> {
        let mut cells: Vec<usize> = self.point_faces()[pointi]
            .iter()
            .flat_map(|&f| {
                let nei = self.neighbour.get(f).copied();
                std::iter::once(self.owner[f]).chain(nei)
            })
            .collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// True for points used by at least one boundary face
    pub fn boundary_points(&self) -> Vec<bool> {
        let mut on_boundary = vec![false; self.points.len()];
        for face in &self.faces[self.neighbour.len()..] {
            for &p in face {
                on_boundary[p] = true;
            }
        }
        on_boundary
    }

    /// Copy of the mesh with different point positions
    pub fn with_points(&self, points: Vec<Point3<f64>>) -> Self {
        let mut mesh = self.clone();
        mesh.move_points(points);
        mesh
    }
}
