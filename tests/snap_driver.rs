// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end snapping of block meshes

use anyhow::Result;
use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use polysnap::snap::{SearchablePlane, SearchableSphere, SearchableSurface, TriSurface};
use polysnap::{PatchKind, PolyMesh, RefinementSurfaces, SnapConfig, SnapDriver};
use std::io::Write;

fn block(n: usize) -> Result<PolyMesh> {
    Ok(PolyMesh::block([n, n, n], Point3::origin(), Point3::new(1.0, 1.0, 1.0))?)
}

fn no_pre_smoothing() -> SnapConfig {
    let mut config = SnapConfig::default();
    config.snap.n_smooth_patch = 0;
    config
}

#[test]
fn test_sphere_attracts_every_boundary_point() -> Result<()> {
    let mesh = block(4)?;
    let before = mesh.clone();
    let centre = Point3::new(0.5, 0.5, 0.5);
    let radius = 0.8;

    let mut surfaces = RefinementSurfaces::new();
    surfaces.add(Box::new(SearchableSphere::new("ball", centre, radius)), None);

    let patches: Vec<usize> = (0..mesh.patches().len()).collect();
    let mut driver = SnapDriver::new(&surfaces, no_pre_smoothing());
    let (snapped, report) = driver.do_snap(mesh, &patches)?;

    assert_eq!(report.n_initial_errors, 0);
    assert_eq!(report.iterations.len(), 1);
    assert_eq!(snapped.n_cells(), 64);
    assert_eq!(snapped.n_points(), before.n_points());

    let on_boundary = before.boundary_points();
    let mut total_before = 0.0;
    let mut total_after = 0.0;
    for (p, &boundary) in on_boundary.iter().enumerate() {
        if !boundary {
            continue;
        }
        let gap_before = ((before.points()[p] - centre).norm() - radius).abs();
        let gap_after = ((snapped.points()[p] - centre).norm() - radius).abs();
        assert!(gap_after <= gap_before + 1e-9);
        total_before += gap_before;
        total_after += gap_after;
    }
    assert!(total_after < total_before);
    Ok(())
}

#[test]
fn test_snap_lid_to_stl_surface() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".stl").tempfile()?;
    write!(
        file,
        "solid lid
facet normal 0 0 1
  outer loop
    vertex -1 -1 1.1
    vertex 2 -1 1.1
    vertex 2 2 1.1
  endloop
endfacet
facet normal 0 0 1
  outer loop
    vertex -1 -1 1.1
    vertex 2 2 1.1
    vertex -1 2 1.1
  endloop
endfacet
endsolid lid
"
    )?;
    file.flush()?;

    let lid = TriSurface::from_stl(file.path())?;
    assert_eq!(lid.triangles().len(), 2);

    let mut mesh = block(3)?;
    for side in ["xmin", "xmax", "ymin", "ymax"] {
        let patchi = mesh.find_patch(side).expect("block side patch");
        mesh.set_patch_kind(patchi, PatchKind::SymmetryPlane);
    }
    let zmax = mesh.find_patch("zmax").expect("block has a zmax patch");

    let mut surfaces = RefinementSurfaces::new();
    surfaces.add(Box::new(lid), None);

    let mut driver = SnapDriver::new(&surfaces, no_pre_smoothing());
    let (snapped, report) = driver.do_snap(mesh, &[zmax])?;
    assert!(report.converged());
    assert_eq!(report.n_final_errors, 0);

    for facei in snapped.patches()[zmax].range() {
        for &p in &snapped.faces()[facei] {
            assert_relative_eq!(snapped.points()[p].z, 1.1, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn test_obtuse_stl_triangle_nearest() -> Result<()> {
    let mut file = tempfile::Builder::new().suffix(".stl").tempfile()?;
    write!(
        file,
        "solid sliver
facet normal 0 0 1
  outer loop
    vertex 0 0 0
    vertex 10 0 0
    vertex 5 1 0
  endloop
endfacet
endsolid sliver
"
    )?;
    file.flush()?;

    let sliver = TriSurface::from_stl(file.path())?;
    let sample = Point3::new(8.0, 2.0, 0.0);

    // within a snap distance of 2 the slanted edge is reachable
    let hit = sliver
        .find_nearest_point(&sample, 4.0)
        .expect("slanted edge lies within the search radius");
    assert_relative_eq!(hit.point, Point3::new(100.0 / 13.0, 6.0 / 13.0, 0.0), epsilon = 1e-6);
    assert_relative_eq!(hit.distance(), 1.569, epsilon = 1e-3);

    assert!(sliver.find_nearest_point(&sample, 2.0).is_none());
    Ok(())
}

#[test]
fn test_repatch_to_nearest_region() -> Result<()> {
    let mesh = block(2)?;
    let zmax = mesh.find_patch("zmax").expect("block has a zmax patch");
    let xmin = mesh.find_patch("xmin").expect("block has an xmin patch");

    let mut surfaces = RefinementSurfaces::new();
    let lid = surfaces.add(
        Box::new(SearchablePlane::new("lid", Point3::new(0.0, 0.0, 1.0), Vector3::z())),
        None,
    );
    surfaces.set_region_patch(lid, 0, xmin);

    let driver = SnapDriver::new(&surfaces, SnapConfig::default());
    let (repatched, n_changed) =
        driver.repatch_to_surface(&mesh, &[zmax], &Default::default())?;

    assert_eq!(n_changed, 4);
    assert_eq!(repatched.patches()[zmax].size, 0);
    assert_eq!(repatched.patches()[xmin].size, 8);
    assert_eq!(repatched.n_faces(), mesh.n_faces());
    Ok(())
}

#[test]
fn test_zoned_surface_moves_zone_only() -> Result<()> {
    let mut mesh = block(2)?;
    let mid_faces: Vec<usize> = (0..mesh.n_internal_faces())
        .filter(|&f| {
            mesh.faces()[f]
                .iter()
                .all(|&p| (mesh.points()[p].z - 0.5).abs() < 1e-12)
        })
        .collect();
    assert_eq!(mid_faces.len(), 4);
    let n_zone_faces = mid_faces.len();
    mesh.add_face_zone("mid", mid_faces, vec![false; n_zone_faces])?;
    let n_internal = mesh.n_internal_faces();
    let zmax = mesh.find_patch("zmax").expect("block has a zmax patch");

    let mut surfaces = RefinementSurfaces::new();
    let cut = surfaces.add(
        Box::new(SearchablePlane::new("cut", Point3::new(0.0, 0.0, 0.55), Vector3::z())),
        Some("mid".to_string()),
    );
    surfaces.set_region_patch(cut, 0, zmax);

    let mut driver = SnapDriver::new(&surfaces, no_pre_smoothing());
    let (snapped, report) = driver.do_snap(mesh, &[])?;

    assert_eq!(report.n_baffles, 4);
    assert_eq!(snapped.n_internal_faces(), n_internal);
    let zonei = snapped.find_zone("mid").expect("zone survives snapping");
    assert_eq!(snapped.face_zones()[zonei].faces.len(), 4);

    // the only free zone point is the block centre
    let centre = 1 + 3 * (1 + 3);
    assert_relative_eq!(snapped.points()[centre].z, 0.55, epsilon = 1e-9);
    // the lid did not move
    assert_relative_eq!(snapped.points()[centre + 9].z, 1.0, epsilon = 1e-12);
    Ok(())
}
