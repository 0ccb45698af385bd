// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Surfaces the mesh boundary is snapped to.
//!
//! The driver only needs nearest-point and segment queries. Triangulated
//! surfaces delegate the spatial search to a parry3d `TriMesh` and refine the
//! answer in double precision; analytic surfaces answer directly.

use crate::error::{MeshError, Result};
use crate::geometry::predicates::{closest_point_on_triangle, triangle_normal};
use crate::geometry::triangle_intersection::tri_line_intersection;
use crate::geometry::{BoundingBox, Plane, Triangle};
use crate::utils::math::{Tolerances, GREAT, VSMALL};
use nalgebra::{Point3, Vector3};
use parry3d::query::{PointQueryWithLocation, Ray, RayCast};
use parry3d::shape::TriMesh;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Nearest point found on a surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointHit {
    pub point: Point3<f64>,
    /// Primitive (triangle) that was hit; 0 for analytic surfaces
    pub index: usize,
    pub dist_sqr: f64,
}

impl PointHit {
    pub fn new(point: Point3<f64>, index: usize, sample: &Point3<f64>) -> Self {
        Self {
            point,
            index,
            dist_sqr: (point - sample).norm_squared(),
        }
    }

    pub fn distance(&self) -> f64 {
        self.dist_sqr.sqrt()
    }
}

/// Geometry that answers nearest-point and segment queries
pub trait SearchableSurface: Send + Sync {
    fn name(&self) -> &str;

    fn bounds(&self) -> BoundingBox;

    fn n_regions(&self) -> usize {
        1
    }

    /// Region of the primitive that was hit
    fn region(&self, _hit: &PointHit) -> usize {
        0
    }

    /// Nearest point within `sqrt(max_dist_sqr)` of `sample`
    fn find_nearest_point(&self, sample: &Point3<f64>, max_dist_sqr: f64) -> Option<PointHit>;

    /// Outward unit normal at a hit
    fn normal(&self, hit: &PointHit) -> Vector3<f64>;

    /// Any intersection of the segment `[start, end]` with the surface
    fn find_line_any(&self, start: &Point3<f64>, end: &Point3<f64>) -> Option<PointHit>;

    /// Batch nearest query, one search radius per sample
    fn find_nearest(&self, samples: &[Point3<f64>], max_dist_sqr: &[f64]) -> Vec<Option<PointHit>> {
        assert_eq!(
            samples.len(),
            max_dist_sqr.len(),
            "{} samples with {} search radii",
            samples.len(),
            max_dist_sqr.len()
        );
        samples
            .par_iter()
            .zip(max_dist_sqr.par_iter())
            .map(|(p, &d)| self.find_nearest_point(p, d))
            .collect()
    }
}

/// Triangulated surface with optional regions
pub struct TriSurface {
    name: String,
    points: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    regions: Vec<usize>,
    region_names: Vec<String>,
    search: TriMesh,
    bounds: BoundingBox,
}

impl std::fmt::Debug for TriSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriSurface")
            .field("name", &self.name)
            .field("points", &self.points.len())
            .field("triangles", &self.triangles.len())
            .field("regions", &self.region_names)
            .finish()
    }
}

impl TriSurface {
    /// Surface from indexed triangles, all in one region
    pub fn new(
        name: impl Into<String>,
        points: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
    ) -> Result<Self> {
        let n = triangles.len();
        let name = name.into();
        let region_names = vec![name.clone()];
        Self::with_regions(name, points, triangles, vec![0; n], region_names)
    }

    pub fn with_regions(
        name: impl Into<String>,
        points: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
        regions: Vec<usize>,
        region_names: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if triangles.is_empty() {
            return Err(MeshError::DegenerateGeometry(format!(
                "surface '{}' has no triangles",
                name
            )));
        }
        if let Some(t) = triangles.iter().find(|t| t.iter().any(|&p| p >= points.len())) {
            return Err(MeshError::DegenerateGeometry(format!(
                "surface '{}' triangle {:?} references a point beyond {}",
                name,
                t,
                points.len()
            )));
        }
        if regions.len() != triangles.len() || regions.iter().any(|&r| r >= region_names.len()) {
            return Err(MeshError::invalid_param(
                "regions",
                format!(
                    "{} region labels for {} triangles and {} regions",
                    regions.len(),
                    triangles.len(),
                    region_names.len()
                ),
            ));
        }

        let vertices: Vec<Point3<f32>> = points.iter().map(|p| p.cast::<f32>()).collect();
        let indices: Vec<[u32; 3]> = triangles
            .iter()
            .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
            .collect();
        let search = TriMesh::new(vertices, indices);
        let bounds = BoundingBox::from_points(&points);

        Ok(Self {
            name,
            points,
            triangles,
            regions,
            region_names,
            search,
            bounds,
        })
    }

    /// Load an ASCII or binary STL file; the surface is named after the
    /// file stem
    pub fn from_stl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let stl = stl_io::read_stl(&mut file)?;

        let points: Vec<Point3<f64>> = stl
            .vertices
            .iter()
            .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
            .collect();
        let triangles: Vec<[usize; 3]> = stl
            .faces
            .iter()
            .map(|f| f.vertices)
            .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
            .collect();

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "surface".to_string());
        log::info!(
            "Read surface '{}': {} points, {} triangles",
            name,
            points.len(),
            triangles.len()
        );
        Self::new(name, points, triangles)
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn region_names(&self) -> &[String] {
        &self.region_names
    }

    pub fn triangle(&self, index: usize) -> Triangle {
        let [a, b, c] = self.triangles[index];
        [self.points[a], self.points[b], self.points[c]]
    }
}

impl SearchableSurface for TriSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn n_regions(&self) -> usize {
        self.region_names.len()
    }

    fn region(&self, hit: &PointHit) -> usize {
        self.regions[hit.index]
    }

    fn find_nearest_point(&self, sample: &Point3<f64>, max_dist_sqr: f64) -> Option<PointHit> {
        if self.bounds.distance_squared(sample) > max_dist_sqr {
            return None;
        }

        let (_, (tri_id, _)) = self
            .search
            .project_local_point_and_get_location(&sample.cast::<f32>(), false);
        let index = tri_id as usize;
        let nearest = closest_point_on_triangle(&self.triangle(index), sample, &Tolerances::default());
        let hit = PointHit::new(nearest, index, sample);
        (hit.dist_sqr <= max_dist_sqr).then_some(hit)
    }

    fn normal(&self, hit: &PointHit) -> Vector3<f64> {
        triangle_normal(&self.triangle(hit.index)).0
    }

    fn find_line_any(&self, start: &Point3<f64>, end: &Point3<f64>) -> Option<PointHit> {
        let dir = end - start;
        let length = dir.norm();
        if length < VSMALL {
            return None;
        }
        let ray = Ray::new(start.cast::<f32>(), (dir / length).cast::<f32>());
        let toi = self.search.cast_local_ray(&ray, length as f32, false)?;
        let approx_hit = start + dir * (toi as f64 / length);

        // refine on the triangle nearest to the single precision hit
        let candidate = self.find_nearest_point(&approx_hit, GREAT)?;
        let tri = self.triangle(candidate.index);
        let point = tri_line_intersection(&tri, start, end, &Tolerances::default())
            .unwrap_or(candidate.point);
        Some(PointHit::new(point, candidate.index, start))
    }
}

/// Analytic sphere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchableSphere {
    pub name: String,
    pub centre: Point3<f64>,
    pub radius: f64,
}

impl SearchableSphere {
    pub fn new(name: impl Into<String>, centre: Point3<f64>, radius: f64) -> Self {
        Self {
            name: name.into(),
            centre,
            radius,
        }
    }
}

impl SearchableSurface for SearchableSphere {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.centre, self.centre).inflate(self.radius)
    }

    fn find_nearest_point(&self, sample: &Point3<f64>, max_dist_sqr: f64) -> Option<PointHit> {
        let d = sample - self.centre;
        let mag = d.norm();
        let dir = if mag < VSMALL { Vector3::x() } else { d / mag };
        let hit = PointHit::new(self.centre + dir * self.radius, 0, sample);
        (hit.dist_sqr <= max_dist_sqr).then_some(hit)
    }

    fn normal(&self, hit: &PointHit) -> Vector3<f64> {
        let d = hit.point - self.centre;
        d / (d.norm() + VSMALL)
    }

    fn find_line_any(&self, start: &Point3<f64>, end: &Point3<f64>) -> Option<PointHit> {
        // |start + t (end - start) - centre| = radius
        let dir = end - start;
        let rel = start - self.centre;
        let a = dir.norm_squared();
        if a < VSMALL {
            return None;
        }
        let b = 2.0 * rel.dot(&dir);
        let c = rel.norm_squared() - self.radius * self.radius;
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let sqrt_disc = disc.sqrt();
        [(-b - sqrt_disc) / (2.0 * a), (-b + sqrt_disc) / (2.0 * a)]
            .into_iter()
            .find(|t| (0.0..=1.0).contains(t))
            .map(|t| PointHit::new(start + dir * t, 0, start))
    }
}

/// Infinite plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchablePlane {
    pub name: String,
    pub plane: Plane,
}

impl SearchablePlane {
    pub fn new(name: impl Into<String>, point: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            plane: Plane::new(point, normal),
        }
    }
}

impl SearchableSurface for SearchablePlane {
    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> BoundingBox {
        BoundingBox::new(Point3::origin(), Point3::origin()).inflate(GREAT)
    }

    fn find_nearest_point(&self, sample: &Point3<f64>, max_dist_sqr: f64) -> Option<PointHit> {
        let hit = PointHit::new(self.plane.nearest_point(sample), 0, sample);
        (hit.dist_sqr <= max_dist_sqr).then_some(hit)
    }

    fn normal(&self, _hit: &PointHit) -> Vector3<f64> {
        self.plane.normal
    }

    fn find_line_any(&self, start: &Point3<f64>, end: &Point3<f64>) -> Option<PointHit> {
        let d0 = self.plane.signed_distance(start);
        let d1 = self.plane.signed_distance(end);
        if d0 * d1 > 0.0 || (d0 - d1).abs() < VSMALL {
            return None;
        }
        let t = d0 / (d0 - d1);
        Some(PointHit::new(start + (end - start) * t, 0, start))
    }
}

/// Nearest hit over several surfaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub surface: usize,
    pub region: usize,
    pub hit: PointHit,
}

struct SurfaceEntry {
    surface: Box<dyn SearchableSurface>,
    face_zone: Option<String>,
    /// Mesh patch of every region
    region_patch: Vec<Option<usize>>,
}

/// The set of surfaces a mesh is snapped to. A surface with a face zone is
/// zoned: only the points on that zone are attracted to it.
#[derive(Default)]
pub struct RefinementSurfaces {
    entries: Vec<SurfaceEntry>,
}

impl RefinementSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a surface, optionally tied to a face zone. Returns its index.
    pub fn add(&mut self, surface: Box<dyn SearchableSurface>, face_zone: Option<String>) -> usize {
        let n_regions = surface.n_regions();
        self.entries.push(SurfaceEntry {
            surface,
            face_zone,
            region_patch: vec![None; n_regions],
        });
        self.entries.len() - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn surface(&self, surfi: usize) -> &dyn SearchableSurface {
        self.entries[surfi].surface.as_ref()
    }

    pub fn face_zone(&self, surfi: usize) -> Option<&str> {
        self.entries[surfi].face_zone.as_deref()
    }

    /// Send faces snapped to a region of a surface to a mesh patch
    pub fn set_region_patch(&mut self, surfi: usize, region: usize, patchi: usize) {
        self.entries[surfi].region_patch[region] = Some(patchi);
    }

    pub fn region_patch(&self, surfi: usize, region: usize) -> Option<usize> {
        self.entries[surfi].region_patch.get(region).copied().flatten()
    }

    pub fn zoned_surfaces(&self) -> Vec<usize> {
        (0..self.len()).filter(|&s| self.entries[s].face_zone.is_some()).collect()
    }

    pub fn unzoned_surfaces(&self) -> Vec<usize> {
        (0..self.len()).filter(|&s| self.entries[s].face_zone.is_none()).collect()
    }

    /// Nearest hit on any of `surfaces`. The search radius of a sample
    /// shrinks to the best hit so far.
    pub fn find_nearest(
        &self,
        surfaces: &[usize],
        samples: &[Point3<f64>],
        max_dist_sqr: &[f64],
    ) -> Vec<Option<SurfaceHit>> {
        let mut nearest: Vec<Option<SurfaceHit>> = vec![None; samples.len()];
        let mut radius = max_dist_sqr.to_vec();

        for &surfi in surfaces {
            let surface = self.surface(surfi);
            let hits = surface.find_nearest(samples, &radius);
            for (i, hit) in hits.into_iter().enumerate() {
                if let Some(hit) = hit {
                    let better = nearest[i].map_or(true, |n| hit.dist_sqr < n.hit.dist_sqr);
                    if better {
                        radius[i] = hit.dist_sqr;
                        nearest[i] = Some(SurfaceHit {
                            surface: surfi,
                            region: surface.region(&hit),
                            hit,
                        });
                    }
                }
            }
        }
        nearest
    }

    pub fn all(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> TriSurface {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        TriSurface::new("square", points, vec![[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    #[test]
    fn test_trisurface_nearest() {
        let surf = square();
        let hit = surf
            .find_nearest_point(&Point3::new(0.25, 0.75, 0.5), 1.0)
            .unwrap();
        assert_relative_eq!(hit.point, Point3::new(0.25, 0.75, 0.0), epsilon = 1e-9);
        assert_relative_eq!(hit.distance(), 0.5, epsilon = 1e-9);
        assert_eq!(hit.index, 1);
        assert_relative_eq!(surf.normal(&hit), Vector3::z(), epsilon = 1e-12);

        // outside the search radius
        assert!(surf.find_nearest_point(&Point3::new(0.5, 0.5, 2.0), 1.0).is_none());
    }

    #[test]
    fn test_trisurface_line() {
        let surf = square();
        let hit = surf
            .find_line_any(&Point3::new(0.5, 0.25, 1.0), &Point3::new(0.5, 0.25, -1.0))
            .unwrap();
        assert_relative_eq!(hit.point, Point3::new(0.5, 0.25, 0.0), epsilon = 1e-6);
        assert!(surf
            .find_line_any(&Point3::new(2.0, 2.0, 1.0), &Point3::new(2.0, 2.0, -1.0))
            .is_none());
    }

    #[test]
    fn test_empty_surface_rejected() {
        assert!(TriSurface::new("none", vec![], vec![]).is_err());
        assert!(TriSurface::new("bad", vec![Point3::origin()], vec![[0, 1, 2]]).is_err());
    }

    #[test]
    fn test_sphere() {
        let sphere = SearchableSphere::new("ball", Point3::origin(), 2.0);
        let hit = sphere
            .find_nearest_point(&Point3::new(0.0, 3.0, 0.0), 4.0)
            .unwrap();
        assert_relative_eq!(hit.point, Point3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(sphere.normal(&hit), Vector3::y());

        let line = sphere
            .find_line_any(&Point3::new(-5.0, 0.0, 0.0), &Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(line.point, Point3::new(-2.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_plane_batch() {
        let plane = SearchablePlane::new("floor", Point3::origin(), Vector3::z());
        let samples = vec![Point3::new(1.0, 2.0, 0.5), Point3::new(0.0, 0.0, 3.0)];
        let hits = plane.find_nearest(&samples, &[1.0, 1.0]);
        assert_relative_eq!(hits[0].unwrap().point, Point3::new(1.0, 2.0, 0.0));
        assert!(hits[1].is_none());
    }

    #[test]
    fn test_nearest_over_surfaces() {
        let mut surfaces = RefinementSurfaces::new();
        let far = surfaces.add(
            Box::new(SearchablePlane::new("far", Point3::new(0.0, 0.0, -1.0), Vector3::z())),
            None,
        );
        let near = surfaces.add(
            Box::new(SearchablePlane::new("near", Point3::new(0.0, 0.0, 0.5), Vector3::z())),
            Some("baffle".to_string()),
        );
        assert_eq!(surfaces.unzoned_surfaces(), vec![far]);
        assert_eq!(surfaces.zoned_surfaces(), vec![near]);

        let hits = surfaces.find_nearest(&surfaces.all(), &[Point3::origin()], &[10.0]);
        assert_eq!(hits[0].unwrap().surface, near);
        assert_relative_eq!(hits[0].unwrap().hit.dist_sqr, 0.25);

        surfaces.set_region_patch(far, 0, 3);
        assert_eq!(surfaces.region_patch(far, 0), Some(3));
        assert_eq!(surfaces.region_patch(near, 0), None);
    }
}
