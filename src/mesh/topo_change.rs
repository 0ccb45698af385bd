// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Topology changes used around snapping.
//!
//! Every change rebuilds the mesh from a flat face list so the layout
//! invariant (internal faces first, then contiguous patches) is restored by
//! construction. Face zones are carried across through the face map.

use super::face::{face_unit_normal, reverse_face, Face};
use super::poly_mesh::{FaceZone, PolyMesh};
use crate::error::Result;
use crate::parallel::{CoupledGroup, PointCoupling};
use ahash::{AHashMap, AHashSet};
use nalgebra::Point3;

/// A face of the mesh being assembled
#[derive(Debug, Clone)]
struct NewFace {
    face: Face,
    owner: usize,
    neighbour: Option<usize>,
    patch: Option<usize>,
    /// Originating face in the old mesh
    old: Option<usize>,
}

/// Result of a face-level topology change
#[derive(Debug, Clone)]
pub struct FaceMap {
    /// Old face label for every new face
    pub new_to_old: Vec<Option<usize>>,
}

impl FaceMap {
    pub fn old_to_new(&self, n_old: usize) -> Vec<Vec<usize>> {
        let mut map = vec![Vec::new(); n_old];
        for (new, old) in self.new_to_old.iter().enumerate() {
            if let Some(old) = old {
                map[*old].push(new);
            }
        }
        map
    }
}

fn existing_faces(mesh: &PolyMesh) -> Vec<NewFace> {
    (0..mesh.n_faces())
        .map(|f| NewFace {
            face: mesh.faces()[f].clone(),
            owner: mesh.owner()[f],
            neighbour: mesh.neighbour().get(f).copied(),
            patch: mesh.which_patch(f),
            old: Some(f),
        })
        .collect()
}

/// Order faces internal first then by patch, and build the mesh. Returns,
/// for every face of the new mesh, its index in `new_faces`.
fn assemble(
    mesh: &PolyMesh,
    points: Vec<Point3<f64>>,
    new_faces: Vec<NewFace>,
) -> Result<(PolyMesh, Vec<usize>)> {
    let n_patches = mesh.patches().len();
    let mut internal = Vec::new();
    let mut by_patch: Vec<Vec<(usize, NewFace)>> = vec![Vec::new(); n_patches];

    for (idx, nf) in new_faces.into_iter().enumerate() {
        match (nf.neighbour, nf.patch) {
            (Some(_), _) => internal.push((idx, nf)),
            (None, Some(p)) => by_patch[p].push((idx, nf)),
            (None, None) => panic!(
                "boundary face {:?} (owner {}) has no patch",
                nf.face, nf.owner
            ),
        }
    }

    let mut faces = Vec::new();
    let mut owner = Vec::new();
    let mut neighbour = Vec::new();
    let mut entries = Vec::new();
    let mut old_to_new: Vec<Option<usize>> = vec![None; mesh.n_faces()];

    let mut push = |idx: usize, nf: NewFace, faces: &mut Vec<Face>, owner: &mut Vec<usize>| {
        if let Some(old) = nf.old {
            old_to_new[old].get_or_insert(faces.len());
        }
        entries.push(idx);
        faces.push(nf.face);
        owner.push(nf.owner);
    };

    for (idx, nf) in internal {
        neighbour.push(nf.neighbour.unwrap_or(nf.owner));
        push(idx, nf, &mut faces, &mut owner);
    }

    let mut patches = mesh.patches().to_vec();
    for (p, patch_faces) in by_patch.into_iter().enumerate() {
        patches[p].start = faces.len();
        patches[p].size = patch_faces.len();
        for (idx, nf) in patch_faces {
            push(idx, nf, &mut faces, &mut owner);
        }
    }

    let mut new_mesh = PolyMesh::new(points, faces, owner, neighbour, patches)?;

    let zones = mesh
        .face_zones()
        .iter()
        .map(|z| {
            let mut faces = Vec::with_capacity(z.faces.len());
            let mut flip_map = Vec::with_capacity(z.faces.len());
            for (&f, &flip) in z.faces.iter().zip(&z.flip_map) {
                if let Some(nf) = old_to_new[f] {
                    faces.push(nf);
                    flip_map.push(flip);
                }
            }
            FaceZone {
                name: z.name.clone(),
                faces,
                flip_map,
            }
        })
        .collect();
    new_mesh.set_face_zones(zones);
    new_mesh.set_coupling(mesh.coupling().clone());
    new_mesh.set_comm(mesh.comm_handle());

    Ok((new_mesh, entries))
}

fn face_map(new_faces: &[NewFace], entries: &[usize]) -> FaceMap {
    FaceMap {
        new_to_old: entries.iter().map(|&e| new_faces[e].old).collect(),
    }
}

/// Split internal faces into pairs of boundary faces.
///
/// Each entry is `(face, owner_patch, neighbour_patch)`. The owner side keeps
/// the face as is; the neighbour side gets the reversed face. Returns the new
/// mesh and the baffle pairs `(owner side, neighbour side)` in new labels.
pub fn create_baffles(
    mesh: &PolyMesh,
    baffles: &[(usize, usize, usize)],
) -> Result<(PolyMesh, Vec<(usize, usize)>)> {
    let n_old = mesh.n_faces();
    let mut new_faces = existing_faces(mesh);
    let mut baffle_index = AHashMap::new();

    for (i, &(facei, own_patch, nei_patch)) in baffles.iter().enumerate() {
        assert!(
            mesh.is_internal_face(facei),
            "face {} is not an internal face and cannot be baffled",
            facei
        );
        let nei = mesh.neighbour()[facei];

        let nf = &mut new_faces[facei];
        nf.neighbour = None;
        nf.patch = Some(own_patch);
        baffle_index.insert(facei, i);

        new_faces.push(NewFace {
            face: reverse_face(&mesh.faces()[facei]),
            owner: nei,
            neighbour: None,
            patch: Some(nei_patch),
            old: None,
        });
    }

    let (new_mesh, entries) = assemble(mesh, mesh.points().to_vec(), new_faces)?;

    let mut pairs = vec![(0, 0); baffles.len()];
    for (new, &entry) in entries.iter().enumerate() {
        if entry >= n_old {
            pairs[entry - n_old].1 = new;
        } else if let Some(&i) = baffle_index.get(&entry) {
            pairs[i].0 = new;
        }
    }

    Ok((new_mesh, pairs))
}

/// Turn baffle pairs back into internal faces. The first face of each pair
/// keeps its orientation and becomes owned by its current owner.
pub fn merge_baffles(mesh: &PolyMesh, pairs: &[(usize, usize)]) -> Result<PolyMesh> {
    let mut new_faces: Vec<Option<NewFace>> = existing_faces(mesh).into_iter().map(Some).collect();

    for &(master, slave) in pairs {
        assert!(
            !mesh.is_internal_face(master) && !mesh.is_internal_face(slave),
            "baffle pair ({}, {}) contains an internal face",
            master,
            slave
        );
        let nei = mesh.owner()[slave];
        if let Some(nf) = new_faces[master].as_mut() {
            nf.neighbour = Some(nei);
            nf.patch = None;
        }
        new_faces[slave] = None;
    }

    let new_faces: Vec<NewFace> = new_faces.into_iter().flatten().collect();
    let (new_mesh, _) = assemble(mesh, mesh.points().to_vec(), new_faces)?;
    Ok(new_mesh)
}

/// Move boundary faces to other patches
pub fn repatch(mesh: &PolyMesh, assignments: &[(usize, usize)]) -> Result<(PolyMesh, FaceMap)> {
    let mut new_faces = existing_faces(mesh);
    for &(facei, patchi) in assignments {
        assert!(
            !mesh.is_internal_face(facei),
            "cannot repatch internal face {}",
            facei
        );
        new_faces[facei].patch = Some(patchi);
    }
    let (new_mesh, entries) = assemble(mesh, mesh.points().to_vec(), new_faces.clone())?;
    Ok((new_mesh, face_map(&new_faces, &entries)))
}

/// Join the directed edges of a face set into one polygon. Edges that appear
/// in both directions are interior to the set and dropped. `None` if the
/// remaining edges do not form a single loop.
fn merge_face_loop(faces: &[&Face]) -> Option<Face> {
    let mut directed: Vec<(usize, usize)> = Vec::new();
    for face in faces {
        for i in 0..face.len() {
            directed.push((face[i], face[(i + 1) % face.len()]));
        }
    }
    let all: AHashSet<(usize, usize)> = directed.iter().copied().collect();
    let outer: Vec<(usize, usize)> = directed
        .into_iter()
        .filter(|&(a, b)| !all.contains(&(b, a)))
        .collect();

    let mut next = AHashMap::new();
    for &(a, b) in &outer {
        if next.insert(a, b).is_some() {
            return None;
        }
    }

    let start = outer.first()?.0;
    let mut merged = vec![start];
    let mut current = *next.get(&start)?;
    while current != start {
        if merged.len() > outer.len() {
            return None;
        }
        merged.push(current);
        current = *next.get(&current)?;
    }

    if merged.len() == outer.len() && merged.len() >= 3 {
        Some(merged)
    } else {
        None
    }
}

/// Merge edge-connected boundary faces of one cell on one patch whose unit
/// normals agree within `feature_cos`.
///
/// Cells in `excluded_cells` are left alone. Returns the new mesh and, per
/// merged face, its new label and the old faces it replaced.
pub fn merge_patch_faces(
    mesh: &PolyMesh,
    patch_ids: &[usize],
    feature_cos: f64,
    excluded_cells: &AHashSet<usize>,
) -> Result<(PolyMesh, Vec<(usize, Vec<usize>)>)> {
    let points = mesh.points();
    let faces = mesh.faces();

    let mut cell_patch_faces: AHashMap<(usize, usize), Vec<usize>> = AHashMap::new();
    for &patchi in patch_ids {
        for facei in mesh.patches()[patchi].range() {
            let own = mesh.owner()[facei];
            if !excluded_cells.contains(&own) {
                cell_patch_faces.entry((own, patchi)).or_default().push(facei);
            }
        }
    }

    let mut keys: Vec<(usize, usize)> = cell_patch_faces.keys().copied().collect();
    keys.sort_unstable();

    let mut sets: Vec<Vec<usize>> = Vec::new();
    for key in keys {
        let candidates = &cell_patch_faces[&key];
        if candidates.len() < 2 {
            continue;
        }

        // union of faces connected through a shared edge at a small angle
        let mut group: Vec<usize> = (0..candidates.len()).collect();
        fn find(group: &mut [usize], i: usize) -> usize {
            let mut root = i;
            while group[root] != root {
                root = group[root];
            }
            group[i] = root;
            root
        }

        for a in 0..candidates.len() {
            for b in a + 1..candidates.len() {
                let (fa, fb) = (candidates[a], candidates[b]);
                if super::face::n_shared_edges(&faces[fa], &faces[fb]) == 0 {
                    continue;
                }
                let na = face_unit_normal(&faces[fa], points);
                let nb = face_unit_normal(&faces[fb], points);
                if na.dot(&nb) > feature_cos {
                    let ra = find(&mut group, a);
                    let rb = find(&mut group, b);
                    group[ra.max(rb)] = ra.min(rb);
                }
            }
        }

        let mut by_root: AHashMap<usize, Vec<usize>> = AHashMap::new();
        for i in 0..candidates.len() {
            let r = find(&mut group, i);
            by_root.entry(r).or_default().push(candidates[i]);
        }
        let mut roots: Vec<usize> = by_root.keys().copied().collect();
        roots.sort_unstable();
        for r in roots {
            if let Some(set) = by_root.remove(&r) {
                if set.len() > 1 {
                    sets.push(set);
                }
            }
        }
    }

    let mut new_faces: Vec<Option<NewFace>> = existing_faces(mesh).into_iter().map(Some).collect();
    let mut merged_sets = Vec::new();
    for set in sets {
        let set_faces: Vec<&Face> = set.iter().map(|&f| &faces[f]).collect();
        let Some(merged) = merge_face_loop(&set_faces) else {
            log::debug!("faces {:?} do not merge into a single polygon", set);
            continue;
        };
        if let Some(nf) = new_faces[set[0]].as_mut() {
            nf.face = merged;
        }
        for &f in &set[1..] {
            new_faces[f] = None;
        }
        merged_sets.push(set);
    }

    let new_faces: Vec<NewFace> = new_faces.into_iter().flatten().collect();
    let (new_mesh, entries) = assemble(mesh, points.to_vec(), new_faces.clone())?;
    let old_to_new = face_map(&new_faces, &entries).old_to_new(mesh.n_faces());

    let merged = merged_sets
        .into_iter()
        .filter_map(|set| old_to_new[set[0]].first().map(|&nf| (nf, set)))
        .collect();

    Ok((new_mesh, merged))
}

/// Remove points that sit on exactly two mesh edges pointing in the same
/// direction (within `min_cos`). Coupled points are kept. Returns the new
/// mesh and the number of removed points.
pub fn remove_straight_edge_points(mesh: &PolyMesh, min_cos: f64) -> Result<(PolyMesh, usize)> {
    let points = mesh.points();
    let edges = mesh.edges();
    let point_edges = mesh.point_edges();
    let point_faces = mesh.point_faces();

    let mut remove = vec![false; mesh.n_points()];
    for (pointi, pe) in point_edges.iter().enumerate() {
        if pe.len() != 2 || mesh.coupling().is_coupled(pointi) {
            continue;
        }
        let (e0, e1) = (&edges[pe[0]], &edges[pe[1]]);
        let (Some(a), Some(b)) = (e0.other_vertex(pointi), e1.other_vertex(pointi)) else {
            continue;
        };
        let d0 = points[pointi] - points[a];
        let d1 = points[b] - points[pointi];
        let cos = d0.dot(&d1) / (d0.norm() * d1.norm() + crate::utils::math::VSMALL);
        if cos > min_cos && point_faces[pointi].iter().all(|&f| mesh.faces()[f].len() > 3) {
            remove[pointi] = true;
        }
    }

    // a face may not lose so many points that it degenerates
    for face in mesh.faces() {
        let n_removed = face.iter().filter(|&&p| remove[p]).count();
        if face.len() - n_removed < 3 {
            for &p in face {
                remove[p] = false;
            }
        }
    }

    let mut old_to_new = vec![usize::MAX; mesh.n_points()];
    let mut new_points = Vec::new();
    for (p, &r) in remove.iter().enumerate() {
        if !r {
            old_to_new[p] = new_points.len();
            new_points.push(points[p]);
        }
    }
    let n_removed = mesh.n_points() - new_points.len();
    if n_removed == 0 {
        return Ok((mesh.clone(), 0));
    }

    let new_faces: Vec<NewFace> = existing_faces(mesh)
        .into_iter()
        .map(|mut nf| {
            nf.face = nf
                .face
                .iter()
                .filter(|&&p| !remove[p])
                .map(|&p| old_to_new[p])
                .collect();
            nf
        })
        .collect();

    let (mut new_mesh, _) = assemble(mesh, new_points, new_faces)?;

    let groups = mesh
        .coupling()
        .groups()
        .iter()
        .map(|g| CoupledGroup {
            members: g.members.iter().map(|&p| old_to_new[p]).collect(),
            rotations: g.rotations.clone(),
        })
        .collect();
    new_mesh.set_coupling(PointCoupling::new(groups));

    Ok((new_mesh, n_removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn block(n: [usize; 3]) -> PolyMesh {
        PolyMesh::block(n, Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_baffles_round_trip() {
        let mesh = block([2, 1, 1]);
        assert_eq!(mesh.n_internal_faces(), 1);
        let xmin = mesh.find_patch("xmin").unwrap();
        let xmax = mesh.find_patch("xmax").unwrap();

        let (baffled, pairs) = create_baffles(&mesh, &[(0, xmax, xmin)]).unwrap();
        assert_eq!(baffled.n_internal_faces(), 0);
        assert_eq!(baffled.n_faces(), mesh.n_faces() + 1);
        assert_eq!(pairs.len(), 1);

        let (m, s) = pairs[0];
        assert_eq!(baffled.which_patch(m), Some(xmax));
        assert_eq!(baffled.which_patch(s), Some(xmin));
        assert_relative_eq!(
            baffled.face_areas()[m] + baffled.face_areas()[s],
            nalgebra::Vector3::zeros(),
            epsilon = 1e-12
        );

        let merged = merge_baffles(&baffled, &pairs).unwrap();
        assert_eq!(merged.n_internal_faces(), 1);
        assert_eq!(merged.n_faces(), mesh.n_faces());
        assert_relative_eq!(merged.cell_volumes()[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zone_follows_baffle_master() {
        let mut mesh = block([2, 1, 1]);
        mesh.add_face_zone("mid", vec![0], vec![false]).unwrap();
        let xmax = mesh.find_patch("xmax").unwrap();
        let (baffled, pairs) = create_baffles(&mesh, &[(0, xmax, xmax)]).unwrap();
        assert_eq!(baffled.face_zones()[0].faces, vec![pairs[0].0]);
    }

    #[test]
    fn test_repatch() {
        let mesh = block([1, 1, 1]);
        let xmin = mesh.find_patch("xmin").unwrap();
        let zmax = mesh.find_patch("zmax").unwrap();
        let face = mesh.patches()[xmin].start;
        let (moved, _) = repatch(&mesh, &[(face, zmax)]).unwrap();
        assert_eq!(moved.patches()[xmin].size, 0);
        assert_eq!(moved.patches()[zmax].size, 2);
        assert_relative_eq!(moved.cell_volumes()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_merge_face_loop() {
        let a = vec![0, 1, 2, 3];
        let b = vec![1, 4, 5, 2];
        assert_eq!(merge_face_loop(&[&a, &b]), Some(vec![0, 1, 4, 5, 2, 3]));
        let c = vec![7, 8, 9];
        assert_eq!(merge_face_loop(&[&a, &c]), None);
    }

    #[test]
    fn test_merge_flattened_corner_faces() {
        // flatten the top of a single cell so the zmax and xmax faces line up
        let mesh = block([1, 1, 1]);
        let zmax = mesh.find_patch("zmax").unwrap();
        let xmax = mesh.find_patch("xmax").unwrap();
        let (mesh, _) = repatch(&mesh, &[(mesh.patches()[xmax].start, zmax)]).unwrap();

        let none = AHashSet::new();
        let (_, merged) = merge_patch_faces(&mesh, &[zmax], 0.5, &none).unwrap();
        assert!(merged.is_empty());

        let (merged_mesh, merged) = merge_patch_faces(&mesh, &[zmax], -0.5, &none).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged_mesh.n_faces(), mesh.n_faces() - 1);
        let new_face = merged[0].0;
        assert_eq!(merged_mesh.faces()[new_face].len(), 6);
    }

    #[test]
    fn test_remove_straight_edge_points() {
        let mesh = block([1, 1, 1]);
        let (same, removed) = remove_straight_edge_points(&mesh, 0.99).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(same.n_points(), 8);
    }
}
