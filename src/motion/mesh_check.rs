// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh quality checks.
//!
//! Every check compares one geometric measure per face or per cell against a
//! threshold from [`MeshQuality`] and adds the faces that fail to a set.
//! Baffle pairs `(master, slave)` are treated like internal faces: the
//! master face is checked with the slave's owner cell as its neighbour.
//!
//! [`check_mesh`] runs all enabled checks and is both a one-shot gate and
//! the inner oracle of [`MotionSmoother::scale_mesh`](super::MotionSmoother::scale_mesh).

use crate::config::MeshQuality;
use crate::mesh::face::next_label;
use crate::mesh::PolyMesh;
use crate::utils::math::{clamp, deg_to_rad, rad_to_deg, ROOTVSMALL, SMALL, VGREAT, VSMALL};
use ahash::AHashMap;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Normalised determinant of a unit cube's face tensor, 1/27
const CUBE_DETERMINANT: f64 = 0.037037037037037;

/// Neighbour cell of every baffle master face
fn baffle_neighbours(mesh: &PolyMesh, baffles: &[(usize, usize)]) -> AHashMap<usize, usize> {
    baffles
        .iter()
        .map(|&(master, slave)| (master, mesh.owner()[slave]))
        .collect()
}

/// Owner and neighbour cell of a face that separates two cells
fn face_cells(
    mesh: &PolyMesh,
    facei: usize,
    baffle_nbr: &AHashMap<usize, usize>,
) -> Option<(usize, usize)> {
    let own = mesh.owner()[facei];
    if mesh.is_internal_face(facei) {
        Some((own, mesh.neighbour()[facei]))
    } else {
        baffle_nbr.get(&facei).map(|&nei| (own, nei))
    }
}

// Measures

/// Cosine between the owner-neighbour vector and the face area vector
pub fn face_dot_product(d: &Vector3<f64>, s: &Vector3<f64>) -> f64 {
    d.dot(s) / (d.norm() * s.norm() + VSMALL)
}

/// Distance between the face centre and the point where the line between
/// the cell centres crosses the face, relative to the cell centre distance
pub fn internal_skewness(fc: &Point3<f64>, cc_own: &Point3<f64>, cc_nei: &Point3<f64>) -> f64 {
    let d_own = (fc - cc_own).norm();
    let d_nei = (fc - cc_nei).norm();
    let intersection = Point3::from(
        (cc_own.coords * d_nei + cc_nei.coords * d_own) / (d_own + d_nei + VSMALL),
    );
    (fc - intersection).norm() / ((cc_nei - cc_own).norm() + VSMALL)
}

/// Boundary face version: the owner cell centre is mirrored in the face
pub fn boundary_skewness(fc: &Point3<f64>, sf: &Vector3<f64>, cc_own: &Point3<f64>) -> f64 {
    let n = sf / (sf.norm() + ROOTVSMALL);
    let d_own = fc - cc_own;
    let d_wall = n * n.dot(&d_own);
    let intersection = cc_own + d_wall;
    (fc - intersection).norm() / (2.0 * d_wall.norm() + ROOTVSMALL)
}

/// Linear interpolation weight, 0.5 when the face sits halfway
pub fn face_weight(fc: &Point3<f64>, sf: &Vector3<f64>, cc_own: &Point3<f64>, cc_nei: &Point3<f64>) -> f64 {
    let d_own = sf.dot(&(fc - cc_own)).abs();
    let d_nei = sf.dot(&(cc_nei - fc)).abs();
    d_own.min(d_nei) / (d_own + d_nei + VSMALL)
}

pub fn volume_ratio(vol_own: f64, vol_nei: f64) -> f64 {
    let (a, b) = (vol_own.abs(), vol_nei.abs());
    a.min(b) / (a.max(b) + VSMALL)
}

/// Signed volume of the pyramid from a face to an apex; negative when the
/// apex lies behind the face
pub fn pyramid_volume(fc: &Point3<f64>, sf: &Vector3<f64>, apex: &Point3<f64>) -> f64 {
    sf.dot(&(apex - fc)) / 3.0
}

/// Largest sine of a concave corner of the face, if any corner bends
/// against the face normal by more than `max_sin`
pub fn face_concavity(face: &[usize], points: &[Point3<f64>], sf: &Vector3<f64>, max_sin: f64) -> Option<f64> {
    let face_normal = sf / (sf.norm() + VSMALL);

    let last = face.len() - 1;
    let mut e_prev = points[face[0]] - points[face[last]];
    let mut mag_e_prev = e_prev.norm();
    e_prev /= mag_e_prev + VSMALL;

    let mut max_edge_sin: Option<f64> = None;
    for fp0 in 0..face.len() {
        let fp1 = next_label(face, fp0);
        let mut e10 = points[fp1] - points[face[fp0]];
        let mag_e10 = e10.norm();
        e10 /= mag_e10 + VSMALL;

        if mag_e_prev > SMALL && mag_e10 > SMALL {
            let edge_normal = e_prev.cross(&e10);
            let mag_edge_normal = edge_normal.norm();

            // nearly aligned edges are fine
            if mag_edge_normal >= max_sin && (edge_normal / mag_edge_normal).dot(&face_normal) < SMALL {
                max_edge_sin = Some(max_edge_sin.map_or(mag_edge_normal, |m| m.max(mag_edge_normal)));
            }
        }

        e_prev = e10;
        mag_e_prev = mag_e10;
    }

    max_edge_sin
}

/// Smallest cosine between the face triangles (fanned around the face
/// centre) and the direction `nf`. `None` for triangles or when nothing was
/// measurable.
pub fn face_twist(face: &[usize], points: &[Point3<f64>], fc: &Point3<f64>, nf: &Vector3<f64>) -> Option<f64> {
    if face.len() <= 3 {
        return None;
    }
    let mut min_twist: Option<f64> = None;
    for fp in 0..face.len() {
        let a = points[face[fp]];
        let b = points[next_label(face, fp)];
        let tri_area = 0.5 * (b - a).cross(&(fc - a));
        let mag_tri = tri_area.norm();
        if mag_tri > VSMALL {
            let twist = nf.dot(&(tri_area / mag_tri));
            min_twist = Some(min_twist.map_or(twist, |m| m.min(twist)));
        }
    }
    min_twist
}

/// Determinant of the cell's normalised face tensor, scaled so a cube
/// gives 1
pub fn cell_determinant(mesh: &PolyMesh, celli: usize) -> f64 {
    let areas = mesh.face_areas();
    let mut area_sum = Matrix3::zeros();
    let mut mag_area_sum = 0.0;
    for &facei in &mesh.cells()[celli] {
        let sf = areas[facei];
        let mag = sf.norm();
        mag_area_sum += mag;
        area_sum += sf * (sf / (mag + VSMALL)).transpose();
    }
    (area_sum / (mag_area_sum + VSMALL)).determinant() / CUBE_DETERMINANT
}

/// Larger of the Cartesian component aspect ratio and the ratio of the
/// cell's surface to that of a cube of the same volume
pub fn cell_aspect_ratio(mesh: &PolyMesh, celli: usize) -> f64 {
    let areas = mesh.face_areas();
    let mut sum_mag = Vector3::zeros();
    for &facei in &mesh.cells()[celli] {
        sum_mag += areas[facei].abs();
    }

    let min_cmpt = sum_mag.min();
    let max_cmpt = sum_mag.max();
    let cmpt_ratio = max_cmpt / (min_cmpt + ROOTVSMALL);

    let v = mesh.cell_volumes()[celli].max(ROOTVSMALL);
    let hydraulic = sum_mag.sum() / 6.0 / v.powf(2.0 / 3.0);
    cmpt_ratio.max(hydraulic)
}

// Checks. Each returns true if any face failed.

pub fn check_face_dot_product(
    report: bool,
    max_non_ortho: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let cc = mesh.cell_centres();
    let areas = mesh.face_areas();
    let baffle_nbr = baffle_neighbours(mesh, baffles);
    let severe_threshold = deg_to_rad(max_non_ortho).cos();

    let mut min_d_dot_s = f64::MAX;
    let mut n_severe = 0;
    let mut n_error = 0;

    for &facei in check_faces {
        let Some((own, nei)) = face_cells(mesh, facei, &baffle_nbr) else {
            continue;
        };
        let d_dot_s = face_dot_product(&(cc[nei] - cc[own]), &areas[facei]);
        min_d_dot_s = min_d_dot_s.min(d_dot_s);

        if d_dot_s < severe_threshold {
            if d_dot_s > SMALL {
                n_severe += 1;
            } else {
                n_error += 1;
            }
            wrong_faces.insert(facei);
        }
    }

    let comm = mesh.comm();
    let n_severe = comm.sum_count(n_severe);
    let n_error = comm.sum_count(n_error);
    if report {
        if min_d_dot_s < f64::MAX {
            log::info!(
                "Mesh non-orthogonality Max: {:.2} degrees",
                rad_to_deg(clamp(comm.min(min_d_dot_s), -1.0, 1.0).acos())
            );
        }
        if n_severe > 0 {
            log::info!("*Number of severely non-orthogonal (> {} degrees) faces: {}", max_non_ortho, n_severe);
        }
        if n_error > 0 {
            log::info!("*Number of non-orthogonality errors: {}", n_error);
        }
    }

    n_severe + n_error > 0
}

pub fn check_face_pyramids(
    report: bool,
    min_pyr_vol: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let cc = mesh.cell_centres();
    let centres = mesh.face_centres();
    let areas = mesh.face_areas();
    let baffle_nbr = baffle_neighbours(mesh, baffles);

    let mut n_errors = 0;
    for &facei in check_faces {
        let (fc, sf) = (&centres[facei], &areas[facei]);
        let own = mesh.owner()[facei];

        // the owner pyramid has negative volume
        let mut wrong = pyramid_volume(fc, sf, &cc[own]) > -min_pyr_vol;
        if let Some((_, nei)) = face_cells(mesh, facei, &baffle_nbr) {
            wrong |= pyramid_volume(fc, sf, &cc[nei]) < min_pyr_vol;
        }

        if wrong {
            n_errors += 1;
            wrong_faces.insert(facei);
        }
    }

    let n_errors = mesh.comm().sum_count(n_errors);
    if report && n_errors > 0 {
        log::info!("*Number of faces with incorrectly oriented pyramids: {}", n_errors);
    }
    n_errors > 0
}

pub fn check_face_skewness(
    report: bool,
    internal_skew: f64,
    boundary_skew: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let cc = mesh.cell_centres();
    let centres = mesh.face_centres();
    let areas = mesh.face_areas();
    let baffle_nbr = baffle_neighbours(mesh, baffles);
    let slaves: ahash::AHashSet<usize> = baffles.iter().map(|&(_, s)| s).collect();

    let mut max_skew: f64 = 0.0;
    let mut n_warn = 0;
    for &facei in check_faces {
        let own = mesh.owner()[facei];
        let skew_limit;
        let skewness = match face_cells(mesh, facei, &baffle_nbr) {
            Some((own, nei)) => {
                skew_limit = internal_skew;
                internal_skewness(&centres[facei], &cc[own], &cc[nei])
            }
            None if slaves.contains(&facei) => continue,
            None => {
                skew_limit = boundary_skew;
                boundary_skewness(&centres[facei], &areas[facei], &cc[own])
            }
        };
        max_skew = max_skew.max(skewness);

        if skewness > skew_limit {
            n_warn += 1;
            wrong_faces.insert(facei);
        }
    }

    let comm = mesh.comm();
    let n_warn = comm.sum_count(n_warn);
    if report {
        log::info!("Max skewness: {:.4}", comm.max(max_skew));
        if n_warn > 0 {
            log::info!("*Number of severely skew faces: {}", n_warn);
        }
    }
    n_warn > 0
}

pub fn check_face_weights(
    report: bool,
    min_weight: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let cc = mesh.cell_centres();
    let centres = mesh.face_centres();
    let areas = mesh.face_areas();
    let baffle_nbr = baffle_neighbours(mesh, baffles);

    let mut min_w = VGREAT;
    let mut n_warn = 0;
    for &facei in check_faces {
        let Some((own, nei)) = face_cells(mesh, facei, &baffle_nbr) else {
            continue;
        };
        let w = face_weight(&centres[facei], &areas[facei], &cc[own], &cc[nei]);
        min_w = min_w.min(w);
        if w < min_weight {
            n_warn += 1;
            wrong_faces.insert(facei);
        }
    }

    let comm = mesh.comm();
    let n_warn = comm.sum_count(n_warn);
    if report && n_warn > 0 {
        log::info!(
            "*Number of faces with low interpolation weights (< {}): {}, min weight {:.4}",
            min_weight,
            n_warn,
            comm.min(min_w)
        );
    }
    n_warn > 0
}

pub fn check_vol_ratio(
    report: bool,
    min_ratio: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let vols = mesh.cell_volumes();
    let baffle_nbr = baffle_neighbours(mesh, baffles);

    let mut n_warn = 0;
    for &facei in check_faces {
        let Some((own, nei)) = face_cells(mesh, facei, &baffle_nbr) else {
            continue;
        };
        if volume_ratio(vols[own], vols[nei]) < min_ratio {
            n_warn += 1;
            wrong_faces.insert(facei);
        }
    }

    let n_warn = mesh.comm().sum_count(n_warn);
    if report && n_warn > 0 {
        log::info!("*Number of faces with low volume ratio (< {}): {}", min_ratio, n_warn);
    }
    n_warn > 0
}

/// Flags faces with a corner bending inwards by more than `max_deg`
///
/// # Panics
///
/// If `max_deg` is outside `[0, 180]`; validate the quality settings first.
pub fn check_face_angles(
    report: bool,
    max_deg: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    assert!(
        (-SMALL..=180.0 + SMALL).contains(&max_deg),
        "max_concave should be in [0, 180] degrees but is {}",
        max_deg
    );
    let max_sin = deg_to_rad(max_deg).sin();
    let points = mesh.points();
    let areas = mesh.face_areas();

    let mut max_edge_sin: f64 = 0.0;
    let mut n_concave = 0;
    for &facei in check_faces {
        if let Some(s) = face_concavity(&mesh.faces()[facei], points, &areas[facei], max_sin) {
            max_edge_sin = max_edge_sin.max(s);
            n_concave += 1;
            wrong_faces.insert(facei);
        }
    }

    let comm = mesh.comm();
    let n_concave = comm.sum_count(n_concave);
    if report && n_concave > 0 {
        let max_concave_deg = rad_to_deg(clamp(comm.max(max_edge_sin), -1.0, 1.0).asin());
        log::info!(
            "*Number of concave faces: {}, max concavity {:.2} degrees",
            n_concave,
            max_concave_deg
        );
    }
    n_concave > 0
}

/// Flags faces whose triangles tilt away from the owner-neighbour direction
///
/// # Panics
///
/// If `min_twist` is outside `[-1, 1]`.
pub fn check_face_twist(
    report: bool,
    min_twist: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    assert!(
        (-1.0 - SMALL..=1.0 + SMALL).contains(&min_twist),
        "min_twist should be a cosine in [-1, 1] but is {}",
        min_twist
    );
    let cc = mesh.cell_centres();
    let centres = mesh.face_centres();
    let points = mesh.points();
    let baffle_nbr = baffle_neighbours(mesh, baffles);

    let mut n_warped = 0;
    for &facei in check_faces {
        let face = &mesh.faces()[facei];
        if face.len() <= 3 {
            continue;
        }
        let nf = match face_cells(mesh, facei, &baffle_nbr) {
            Some((own, nei)) => cc[nei] - cc[own],
            None => centres[facei] - cc[mesh.owner()[facei]],
        };
        let nf = nf / (nf.norm() + VSMALL);
        if nf.norm_squared() < SMALL {
            continue;
        }

        if let Some(twist) = face_twist(face, points, &centres[facei], &nf) {
            if twist < min_twist {
                n_warped += 1;
                wrong_faces.insert(facei);
            }
        }
    }

    let n_warped = mesh.comm().sum_count(n_warped);
    if report && n_warped > 0 {
        log::info!("*Number of faces with excessive twist (< {}): {}", min_twist, n_warped);
    }
    n_warped > 0
}

pub fn check_face_area(
    report: bool,
    min_area: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let areas = mesh.face_areas();
    let mut n_zero = 0;
    for &facei in check_faces {
        if areas[facei].norm() < min_area {
            n_zero += 1;
            wrong_faces.insert(facei);
        }
    }

    let n_zero = mesh.comm().sum_count(n_zero);
    if report && n_zero > 0 {
        log::info!("*Number of faces with area < {}: {}", min_area, n_zero);
    }
    n_zero > 0
}

/// Cells next to the given faces
fn affected_cells(mesh: &PolyMesh, check_faces: &[usize]) -> BTreeSet<usize> {
    let mut cells = BTreeSet::new();
    for &facei in check_faces {
        cells.insert(mesh.owner()[facei]);
        if mesh.is_internal_face(facei) {
            cells.insert(mesh.neighbour()[facei]);
        }
    }
    cells
}

pub fn check_cell_determinant(
    report: bool,
    min_det: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let mut lowest = VGREAT;
    let mut n_warn = 0;
    for celli in affected_cells(mesh, check_faces) {
        let det = cell_determinant(mesh, celli);
        lowest = lowest.min(det);
        if det < min_det {
            n_warn += 1;
            wrong_faces.extend(mesh.cells()[celli].iter().copied());
        }
    }

    let comm = mesh.comm();
    let n_warn = comm.sum_count(n_warn);
    if report && n_warn > 0 {
        log::info!(
            "*Number of cells with determinant < {}: {}, min {:.4}",
            min_det,
            n_warn,
            comm.min(lowest)
        );
    }
    n_warn > 0
}

pub fn check_cell_aspect_ratio(
    report: bool,
    max_ratio: f64,
    mesh: &PolyMesh,
    check_faces: &[usize],
    wrong_faces: &mut BTreeSet<usize>,
) -> bool {
    let mut n_warn = 0;
    for celli in affected_cells(mesh, check_faces) {
        if cell_aspect_ratio(mesh, celli) > max_ratio {
            n_warn += 1;
            wrong_faces.extend(mesh.cells()[celli].iter().copied());
        }
    }

    let n_warn = mesh.comm().sum_count(n_warn);
    if report && n_warn > 0 {
        log::info!("*Number of cells with aspect ratio > {}: {}", max_ratio, n_warn);
    }
    n_warn > 0
}

/// Run every enabled check on `check_faces` (all faces if `None`), adding
/// the failing faces to `wrong_faces`. Returns the global number of wrong
/// faces.
pub fn check_mesh(
    report: bool,
    mesh: &PolyMesh,
    quality: &MeshQuality,
    check_faces: Option<&[usize]>,
    baffles: &[(usize, usize)],
    wrong_faces: &mut BTreeSet<usize>,
) -> usize {
    let all_faces: Vec<usize>;
    let check_faces = match check_faces {
        Some(faces) => faces,
        None => {
            all_faces = (0..mesh.n_faces()).collect();
            &all_faces
        }
    };

    if let Some(max_non_ortho) = MeshQuality::enabled(quality.max_non_ortho) {
        if max_non_ortho < 180.0 - SMALL {
            check_face_dot_product(report, max_non_ortho, mesh, check_faces, baffles, wrong_faces);
        }
    }
    if let Some(min_vol) = quality.min_vol {
        check_face_pyramids(report, min_vol, mesh, check_faces, baffles, wrong_faces);
    }
    let internal_skew = MeshQuality::enabled(quality.max_internal_skewness);
    let boundary_skew = MeshQuality::enabled(quality.max_boundary_skewness);
    if internal_skew.is_some() || boundary_skew.is_some() {
        check_face_skewness(
            report,
            internal_skew.unwrap_or(VGREAT),
            boundary_skew.unwrap_or(VGREAT),
            mesh,
            check_faces,
            baffles,
            wrong_faces,
        );
    }
    if let Some(min_weight) = MeshQuality::enabled(quality.min_face_weight) {
        check_face_weights(report, min_weight, mesh, check_faces, baffles, wrong_faces);
    }
    if let Some(min_ratio) = MeshQuality::enabled(quality.min_vol_ratio) {
        check_vol_ratio(report, min_ratio, mesh, check_faces, baffles, wrong_faces);
    }
    if let Some(max_concave) = MeshQuality::enabled(quality.max_concave) {
        if max_concave < 180.0 - SMALL {
            check_face_angles(report, max_concave, mesh, check_faces, wrong_faces);
        }
    }
    if let Some(min_twist) = quality.min_twist {
        check_face_twist(report, min_twist, mesh, check_faces, baffles, wrong_faces);
    }
    if let Some(min_area) = MeshQuality::enabled(quality.min_area) {
        check_face_area(report, min_area, mesh, check_faces, wrong_faces);
    }
    if let Some(min_det) = MeshQuality::enabled(quality.min_determinant) {
        check_cell_determinant(report, min_det, mesh, check_faces, wrong_faces);
    }
    if let Some(max_ratio) = MeshQuality::enabled(quality.max_aspect_ratio) {
        check_cell_aspect_ratio(report, max_ratio, mesh, check_faces, wrong_faces);
    }

    mesh.comm().sum_count(wrong_faces.len())
}

/// Shape of a cell, from its face and point counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellShape {
    Hex,
    Prism,
    Wedge,
    Pyramid,
    Tet,
    Polyhedron,
}

pub fn classify_cell(mesh: &PolyMesh, celli: usize) -> CellShape {
    let cell_faces = &mesh.cells()[celli];
    let n_points = mesh.cell_points(celli).len();
    let mut n_tri = 0;
    let mut n_quad = 0;
    for &facei in cell_faces {
        match mesh.faces()[facei].len() {
            3 => n_tri += 1,
            4 => n_quad += 1,
            _ => return CellShape::Polyhedron,
        }
    }

    match (cell_faces.len(), n_tri, n_quad, n_points) {
        (6, 0, 6, 8) => CellShape::Hex,
        (5, 2, 3, 6) => CellShape::Prism,
        (6, 2, 4, 7) => CellShape::Wedge,
        (5, 4, 1, 5) => CellShape::Pyramid,
        (4, 4, 0, 4) => CellShape::Tet,
        _ => CellShape::Polyhedron,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellShapeCounts {
    pub hex: usize,
    pub prism: usize,
    pub wedge: usize,
    pub pyramid: usize,
    pub tet: usize,
    pub polyhedron: usize,
}

/// Summary of a mesh and its quality
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshReport {
    pub n_points: usize,
    pub n_faces: usize,
    pub n_internal_faces: usize,
    pub n_cells: usize,
    pub cell_shapes: CellShapeCounts,
    /// Degrees
    pub max_non_ortho: f64,
    pub max_skewness: f64,
    pub min_face_weight: f64,
    pub min_vol_ratio: f64,
    pub min_volume: f64,
    pub total_volume: f64,
    pub min_determinant: f64,
    pub max_aspect_ratio: f64,
    pub n_wrong_faces: usize,
}

impl MeshReport {
    pub fn new(mesh: &PolyMesh, quality: &MeshQuality) -> Self {
        let mut shapes = CellShapeCounts::default();
        for celli in 0..mesh.n_cells() {
            match classify_cell(mesh, celli) {
                CellShape::Hex => shapes.hex += 1,
                CellShape::Prism => shapes.prism += 1,
                CellShape::Wedge => shapes.wedge += 1,
                CellShape::Pyramid => shapes.pyramid += 1,
                CellShape::Tet => shapes.tet += 1,
                CellShape::Polyhedron => shapes.polyhedron += 1,
            }
        }

        let cc = mesh.cell_centres();
        let centres = mesh.face_centres();
        let areas = mesh.face_areas();
        let vols = mesh.cell_volumes();

        let mut min_d_dot_s: f64 = 1.0;
        let mut max_skewness: f64 = 0.0;
        let mut min_face_weight: f64 = 0.5;
        let mut min_vol_ratio: f64 = 1.0;

        for facei in 0..mesh.n_faces() {
            let own = mesh.owner()[facei];
            if mesh.is_internal_face(facei) {
                let nei = mesh.neighbour()[facei];
                min_d_dot_s = min_d_dot_s.min(face_dot_product(&(cc[nei] - cc[own]), &areas[facei]));
                max_skewness = max_skewness.max(internal_skewness(&centres[facei], &cc[own], &cc[nei]));
                min_face_weight =
                    min_face_weight.min(face_weight(&centres[facei], &areas[facei], &cc[own], &cc[nei]));
                min_vol_ratio = min_vol_ratio.min(volume_ratio(vols[own], vols[nei]));
            } else {
                max_skewness = max_skewness.max(boundary_skewness(&centres[facei], &areas[facei], &cc[own]));
            }
        }

        let min_determinant = (0..mesh.n_cells())
            .map(|c| cell_determinant(mesh, c))
            .fold(VGREAT, f64::min);
        let max_aspect_ratio = (0..mesh.n_cells())
            .map(|c| cell_aspect_ratio(mesh, c))
            .fold(0.0, f64::max);

        let mut wrong_faces = BTreeSet::new();
        let n_wrong_faces = check_mesh(false, mesh, quality, None, &[], &mut wrong_faces);

        Self {
            n_points: mesh.n_points(),
            n_faces: mesh.n_faces(),
            n_internal_faces: mesh.n_internal_faces(),
            n_cells: mesh.n_cells(),
            cell_shapes: shapes,
            max_non_ortho: rad_to_deg(clamp(min_d_dot_s, -1.0, 1.0).acos()),
            max_skewness,
            min_face_weight,
            min_vol_ratio,
            min_volume: vols.iter().copied().fold(VGREAT, f64::min),
            total_volume: vols.iter().sum(),
            min_determinant,
            max_aspect_ratio,
            n_wrong_faces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cube(n: usize) -> PolyMesh {
        PolyMesh::block([n, n, n], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_regular_block_passes() {
        let mesh = cube(3);
        let mut wrong = BTreeSet::new();
        let n = check_mesh(true, &mesh, &MeshQuality::default(), None, &[], &mut wrong);
        assert_eq!(n, 0);
        assert!(wrong.is_empty());
    }

    #[test]
    fn test_cube_measures() {
        let mesh = cube(2);
        assert_relative_eq!(cell_determinant(&mesh, 0), 1.0, epsilon = 1e-9);
        assert_relative_eq!(cell_aspect_ratio(&mesh, 0), 1.0, epsilon = 1e-9);
        let report = MeshReport::new(&mesh, &MeshQuality::default());
        assert_eq!(report.cell_shapes.hex, 8);
        assert_relative_eq!(report.max_non_ortho, 0.0, epsilon = 1e-4);
        assert_relative_eq!(report.min_face_weight, 0.5, epsilon = 1e-9);
        assert_relative_eq!(report.total_volume, 1.0, epsilon = 1e-9);
        assert_eq!(report.n_wrong_faces, 0);
    }

    #[test]
    fn test_inverted_cell_is_caught() {
        let mesh = cube(2);
        // push the centre point far through the opposite corner
        let mut points = mesh.points().to_vec();
        let centre = points
            .iter()
            .position(|p| (p - Point3::new(0.5, 0.5, 0.5)).norm() < 1e-12)
            .unwrap();
        points[centre] = Point3::new(-0.4, -0.4, -0.4);
        let moved = mesh.with_points(points);

        let mut wrong = BTreeSet::new();
        let n = check_mesh(false, &moved, &MeshQuality::default(), None, &[], &mut wrong);
        assert!(n > 0);
        let centre_faces = &moved.point_faces()[centre];
        assert!(centre_faces.iter().any(|f| wrong.contains(f)));
    }

    #[test]
    fn test_skewness_formulas() {
        let fc = Point3::new(0.5, 0.0, 0.0);
        assert_relative_eq!(
            internal_skewness(&fc, &Point3::origin(), &Point3::new(1.0, 0.0, 0.0)),
            0.0,
            epsilon = 1e-12
        );
        let skewed = Point3::new(0.5, 0.5, 0.0);
        assert_relative_eq!(
            internal_skewness(&skewed, &Point3::origin(), &Point3::new(1.0, 0.0, 0.0)),
            0.5,
            epsilon = 1e-9
        );
        let sf = Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(
            boundary_skewness(&Point3::new(1.0, 0.5, 0.0), &sf, &Point3::origin()),
            0.25,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_concave_face() {
        // arrow head: point 2 bends inwards
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, 0.2, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ];
        let face = vec![0, 1, 2, 3];
        let sf = crate::mesh::face::face_area_normal(&face, &points);
        let max_sin = deg_to_rad(10.0).sin();
        assert!(face_concavity(&face, &points, &sf, max_sin).is_some());

        let square = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let sf = crate::mesh::face::face_area_normal(&face, &square);
        assert!(face_concavity(&face, &square, &sf, max_sin).is_none());
    }

    #[test]
    fn test_twist_of_flat_and_warped_faces() {
        let face = vec![0, 1, 2, 3];
        let flat = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let fc = Point3::new(0.5, 0.5, 0.0);
        let nf = Vector3::z();
        assert_relative_eq!(face_twist(&face, &flat, &fc, &nf).unwrap(), 1.0, epsilon = 1e-12);

        let mut warped = flat.clone();
        warped[2].z = 2.0;
        let fc = Point3::new(0.5, 0.5, 0.5);
        assert!(face_twist(&face, &warped, &fc, &nf).unwrap() < 0.9);
        assert!(face_twist(&[0, 1, 2], &flat, &fc, &nf).is_none());
    }

    #[test]
    fn test_classify_block_cells() {
        let mesh = cube(1);
        assert_eq!(classify_cell(&mesh, 0), CellShape::Hex);
    }
}
