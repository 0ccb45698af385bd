// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Displacement smoothing and quality-checked motion

use anyhow::Result;
use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use polysnap::motion::{check_mesh, Diffusivity};
use polysnap::snap::edge_patch_dist;
use polysnap::{
    MeshQuality, MeshReport, MotionParameters, MotionSmoother, PatchKind, PolyMesh, SnapParameters,
};
use std::collections::BTreeSet;

fn slip_block(n: usize) -> Result<(PolyMesh, usize)> {
    let mut mesh = PolyMesh::block([n, n, n], Point3::origin(), Point3::new(1.0, 1.0, 1.0))?;
    for side in ["xmin", "xmax", "ymin", "ymax"] {
        let patchi = mesh.find_patch(side).expect("block side patch");
        mesh.set_patch_kind(patchi, PatchKind::SymmetryPlane);
    }
    let zmax = mesh.find_patch("zmax").expect("block has a zmax patch");
    Ok((mesh, zmax))
}

#[test]
fn test_lift_lid_and_smooth_interior() -> Result<()> {
    let (mesh, zmax) = slip_block(3)?;
    let mut smoother =
        MotionSmoother::new(mesh, vec![zmax], MotionParameters::default(), MeshQuality::default())?;

    let lift = vec![Vector3::new(0.0, 0.0, 0.05); smoother.patch().n_points()];
    smoother.set_displacement(&lift);

    let edge_dist = edge_patch_dist(smoother.mesh(), smoother.patch())?;
    let weights = Diffusivity::InverseDistance.edge_weights(&edge_dist);
    for _ in 0..20 {
        smoother.smooth_displacement(&weights);
    }

    // internal points follow the lid but less than it
    let internal_disp: Vec<f64> = smoother
        .is_internal_point()
        .iter()
        .zip(smoother.displacement())
        .filter_map(|(&internal, d)| internal.then_some(d.z))
        .collect();
    assert!(!internal_disp.is_empty());
    for dz in internal_disp {
        assert!(dz > 0.0 && dz < 0.05);
    }

    assert!(smoother.scale_mesh(None, &[], true, 0));
    smoother.correct();

    let mesh = smoother.into_mesh();
    let patch = &mesh.patches()[zmax];
    for facei in patch.range() {
        for &p in &mesh.faces()[facei] {
            assert_relative_eq!(mesh.points()[p].z, 1.05, epsilon = 1e-12);
        }
    }

    let report = MeshReport::new(&mesh, &MeshQuality::default());
    assert_eq!(report.n_wrong_faces, 0);
    assert_relative_eq!(report.total_volume, 1.05, epsilon = 1e-9);
    Ok(())
}

/// The block with its lid pushed below the first internal layer
fn crushed(mesh: &PolyMesh) -> PolyMesh {
    let points: Vec<Point3<f64>> = mesh
        .points()
        .iter()
        .map(|p| {
            if (p.z - 1.0).abs() < 1e-12 {
                Point3::new(p.x, p.y, 0.5)
            } else {
                *p
            }
        })
        .collect();
    mesh.with_points(points)
}

#[test]
fn test_crushed_layer_fails_checks() -> Result<()> {
    let (mesh, zmax) = slip_block(3)?;
    let crushed = crushed(&mesh);

    let mut wrong = BTreeSet::new();
    let n_wrong = check_mesh(false, &crushed, &MeshQuality::default(), None, &[], &mut wrong);
    assert!(n_wrong > 0);
    assert!(wrong.iter().any(|&f| crushed.which_patch(f) == Some(zmax)));

    let mut wrong = BTreeSet::new();
    assert_eq!(
        check_mesh(false, &mesh, &MeshQuality::default(), None, &[], &mut wrong),
        0
    );
    Ok(())
}

#[test]
fn test_negative_volume_threshold_stays_active() -> Result<()> {
    let (mesh, _) = slip_block(3)?;
    let crushed = crushed(&mesh);

    // a negative minimum pyramid volume is a threshold, not a switch
    let quality = MeshQuality {
        min_vol: Some(-1e-6),
        ..MeshQuality::disabled()
    };
    let mut wrong = BTreeSet::new();
    assert!(check_mesh(false, &crushed, &quality, None, &[], &mut wrong) > 0);

    let mut wrong = BTreeSet::new();
    assert_eq!(check_mesh(false, &mesh, &quality, None, &[], &mut wrong), 0);

    // other negative thresholds switch their check off
    let quality = MeshQuality {
        min_determinant: Some(-1.0),
        min_face_weight: Some(-1.0),
        min_vol_ratio: Some(-1.0),
        ..MeshQuality::disabled()
    };
    let mut wrong = BTreeSet::new();
    assert_eq!(check_mesh(false, &crushed, &quality, None, &[], &mut wrong), 0);

    // negative twist cosines are valid, out of range ones are not
    let twist = |min_twist| MeshQuality {
        min_twist: Some(min_twist),
        ..MeshQuality::default()
    };
    assert!(twist(-0.5).validate().is_ok());
    assert!(twist(-2.0).validate().is_err());
    Ok(())
}

#[test]
fn test_failed_motion_backs_off() -> Result<()> {
    let (mesh, zmax) = slip_block(3)?;
    let mut smoother =
        MotionSmoother::new(mesh, vec![zmax], MotionParameters::default(), MeshQuality::default())?;

    let push = vec![Vector3::new(0.0, 0.0, -0.5); smoother.patch().n_points()];
    smoother.set_displacement(&push);

    assert!(!smoother.scale_mesh(None, &[], true, 0));
    assert!(!smoother.wrong_faces().is_empty());
    // the points around the failing faces got a reduced scale
    assert!(smoother.scale().iter().any(|&s| s < 1.0));

    smoother.correct();
    assert!(smoother.scale().iter().all(|&s| s == 1.0));
    Ok(())
}

#[test]
fn test_repeated_backoff_reduces_errors() -> Result<()> {
    let (mesh, zmax) = slip_block(3)?;
    let mut smoother =
        MotionSmoother::new(mesh, vec![zmax], MotionParameters::default(), MeshQuality::default())?;
    let lid: Vec<usize> = smoother.patch().mesh_points().to_vec();

    let push = vec![Vector3::new(0.0, 0.0, -0.5); lid.len()];
    smoother.set_displacement(&push);

    let n_snap = SnapParameters::default().n_snap;
    let old_error_reduction = smoother.error_reduction();

    let mut n_wrong = Vec::new();
    let mut tried_scales = Vec::new();
    let mut moved = false;
    for iter in 0..2 * n_snap {
        if iter == n_snap {
            smoother.set_error_reduction(0.0);
        }
        tried_scales.push(smoother.scale()[lid[0]]);
        let ok = smoother.scale_mesh(None, &[], false, 0);
        n_wrong.push(smoother.wrong_faces().len());
        if ok {
            moved = true;
            break;
        }
    }
    smoother.set_error_reduction(old_error_reduction);

    assert!(moved, "no valid motion within {} trials", 2 * n_snap);
    assert!(n_wrong.len() > 1);
    assert!(n_wrong.windows(2).all(|w| w[1] <= w[0]), "{:?}", n_wrong);
    assert_eq!(n_wrong.last(), Some(&0));

    // scales 1 and 0.75 invert the top layer, 0.5625 is the first that passes
    assert_relative_eq!(tried_scales[0], 1.0);
    let accepted = *tried_scales.last().expect("at least one trial");
    assert_relative_eq!(accepted, 0.5625, epsilon = 1e-12);
    for &p in &lid {
        assert_relative_eq!(smoother.mesh().points()[p].z, 1.0 - 0.5 * accepted, epsilon = 1e-12);
    }
    assert_relative_eq!(smoother.error_reduction(), 0.75);
    Ok(())
}
