// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Patch operations that need the owning mesh

use super::PrimitivePatch;
use crate::error::Result;
use crate::mesh::PolyMesh;
use crate::parallel::CombineOp;
use crate::utils::math::VSMALL;
use crate::wave::{PatchEdgeFaceRegion, PatchEdgeFaceWave, WaveInfo};
use nalgebra::Vector3;

/// Point normals of a mesh patch with the contributions of all coupled
/// copies of a point summed before normalising
pub fn coupled_point_normals(mesh: &PolyMesh, patch: &PrimitivePatch) -> Vec<Vector3<f64>> {
    let mut sums = patch.point_normal_sums();
    mesh.coupling().sync_patch_point_list(
        &mut sums,
        patch.mesh_points(),
        CombineOp::Sum,
        Vector3::zeros(),
    );
    sums.into_iter().map(|n| n / (n.norm() + VSMALL)).collect()
}

/// Split the patch faces into regions that are connected without crossing a
/// blocked edge. Returns the region of every face and the number of regions.
pub fn mark_regions(
    mesh: &PolyMesh,
    patch: &PrimitivePatch,
    blocked_edges: &[bool],
) -> Result<(Vec<usize>, usize)> {
    assert_eq!(
        blocked_edges.len(),
        patch.n_edges(),
        "{} blocked edge flags for {} patch edges",
        blocked_edges.len(),
        patch.n_edges()
    );

    let mut edge_info: Vec<PatchEdgeFaceRegion> = blocked_edges
        .iter()
        .map(|&b| {
            if b {
                PatchEdgeFaceRegion::Blocked
            } else {
                PatchEdgeFaceRegion::Unset
            }
        })
        .collect();
    let mut face_info = vec![PatchEdgeFaceRegion::Unset; patch.size()];

    let mut n_regions = 0;
    for seed_face in 0..patch.size() {
        if face_info[seed_face].valid() {
            continue;
        }

        let region = PatchEdgeFaceRegion::Region(n_regions);
        let seeds: Vec<usize> = patch.face_edges()[seed_face]
            .iter()
            .copied()
            .filter(|&e| !blocked_edges[e])
            .collect();

        if seeds.is_empty() {
            // fully enclosed by blocked edges
            face_info[seed_face] = region;
        } else {
            let seed_info = vec![region; seeds.len()];
            PatchEdgeFaceWave::run(
                mesh,
                patch,
                &seeds,
                &seed_info,
                &mut edge_info,
                &mut face_info,
                patch.size() + 1,
            )?;
        }
        n_regions += 1;
    }

    let regions = face_info
        .iter()
        .map(|r| r.region().unwrap_or(0))
        .collect();

    log::debug!("Patch of {} faces split into {} regions", patch.size(), n_regions);
    Ok((regions, n_regions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{CoupledGroup, PointCoupling};
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_regions_of_closed_box() {
        let mesh = PolyMesh::block([2, 2, 2], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let all: Vec<usize> = (0..mesh.patches().len()).collect();
        let patch = PrimitivePatch::from_patches(&mesh, &all);

        let (_, n) = mark_regions(&mesh, &patch, &vec![false; patch.n_edges()]).unwrap();
        assert_eq!(n, 1);

        // block the edges where the box sides meet: every side is a region
        let normals = patch.face_normals();
        let blocked: Vec<bool> = patch
            .edge_faces()
            .iter()
            .map(|ef| normals[ef[0]].dot(&normals[ef[1]]) < 0.5)
            .collect();
        let (regions, n) = mark_regions(&mesh, &patch, &blocked).unwrap();
        assert_eq!(n, 6);
        for (facei, &r) in regions.iter().enumerate() {
            let first = regions.iter().position(|&x| x == r).unwrap();
            assert_relative_eq!(normals[facei], normals[first], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_coupled_normals_agree() {
        let mut mesh = PolyMesh::block([1, 1, 1], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let zmax = mesh.find_patch("zmax").unwrap();
        // treat the top edge on x = 1 as a copy of the one on x = 0
        mesh.set_coupling(PointCoupling::new(vec![
            CoupledGroup::new(vec![5, 4]),
            CoupledGroup::new(vec![7, 6]),
        ]));
        let patch = PrimitivePatch::from_patches(&mesh, &[zmax]);
        let normals = coupled_point_normals(&mesh, &patch);
        for n in &normals {
            assert_relative_eq!(*n, Vector3::z(), epsilon = 1e-12);
        }
    }
}
