// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Synchronisation of values on coupled points.
//!
//! A mesh may hold several copies of one physical point: both sides of a
//! processor boundary, or the two halves of a cyclic match. Each copy is a
//! member of a [`CoupledGroup`]; synchronising a point field combines all
//! member values with a commutative [`CombineOp`] and writes the result back
//! to every member, rotated into the member's own frame.
//!
//! Global reductions (sum, or, min, ...) go through a [`Communicator`]. The
//! crate ships [`SerialCommunicator`], for which every reduction is the
//! identity.

use crate::mesh::face::Edge;
use ahash::{AHashMap, AHashSet};
use nalgebra::{Rotation3, Vector3};

/// Commutative, associative combine applied when merging coupled values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Sum,
    Max,
    Min,
    /// Per component: larger magnitude wins, larger value on a tie
    MaxMag,
    /// Whole value: smaller squared magnitude wins
    MinMagSqr,
}

/// A value that can be merged across coupled copies
pub trait Syncable: Copy {
    fn combine(&mut self, other: &Self, op: CombineOp);

    /// Express the value in a frame rotated by `rotation`
    fn rotate(&self, _rotation: &Rotation3<f64>) -> Self {
        *self
    }
}

fn max_mag(x: f64, y: f64) -> f64 {
    if y.abs() > x.abs() || (y.abs() == x.abs() && y > x) {
        y
    } else {
        x
    }
}

impl Syncable for f64 {
    fn combine(&mut self, other: &Self, op: CombineOp) {
        *self = match op {
            CombineOp::Sum => *self + other,
            CombineOp::Max => self.max(*other),
            CombineOp::Min => self.min(*other),
            CombineOp::MaxMag => max_mag(*self, *other),
            CombineOp::MinMagSqr => {
                if other * other < *self * *self {
                    *other
                } else {
                    *self
                }
            }
        };
    }
}

impl Syncable for usize {
    fn combine(&mut self, other: &Self, op: CombineOp) {
        *self = match op {
            CombineOp::Sum => *self + other,
            CombineOp::Max | CombineOp::MaxMag => (*self).max(*other),
            CombineOp::Min | CombineOp::MinMagSqr => (*self).min(*other),
        };
    }
}

impl Syncable for bool {
    fn combine(&mut self, other: &Self, op: CombineOp) {
        *self = match op {
            CombineOp::Sum | CombineOp::Max | CombineOp::MaxMag => *self || *other,
            CombineOp::Min | CombineOp::MinMagSqr => *self && *other,
        };
    }
}

impl Syncable for Vector3<f64> {
    fn combine(&mut self, other: &Self, op: CombineOp) {
        match op {
            CombineOp::MinMagSqr => {
                if other.norm_squared() < self.norm_squared() {
                    *self = *other;
                }
            }
            _ => {
                for i in 0..3 {
                    self[i].combine(&other[i], op);
                }
            }
        }
    }

    fn rotate(&self, rotation: &Rotation3<f64>) -> Self {
        rotation * self
    }
}

/// Copies of one physical point
#[derive(Debug, Clone)]
pub struct CoupledGroup {
    pub members: Vec<usize>,
    /// Rotation taking values from each member's frame into the group frame.
    /// `None` means every member shares one frame.
    pub rotations: Option<Vec<Rotation3<f64>>>,
}

impl CoupledGroup {
    pub fn new(members: Vec<usize>) -> Self {
        Self {
            members,
            rotations: None,
        }
    }

    pub fn with_rotations(members: Vec<usize>, rotations: Vec<Rotation3<f64>>) -> Self {
        assert_eq!(
            members.len(),
            rotations.len(),
            "coupled group with {} members but {} rotations",
            members.len(),
            rotations.len()
        );
        Self {
            members,
            rotations: Some(rotations),
        }
    }

    pub fn master(&self) -> usize {
        self.members[0]
    }

    pub fn rotation(&self, member: usize) -> Rotation3<f64> {
        self.rotations
            .as_ref()
            .map(|r| r[member])
            .unwrap_or_else(Rotation3::identity)
    }
}

/// All coupled point groups of a mesh
#[derive(Debug, Clone, Default)]
pub struct PointCoupling {
    groups: Vec<CoupledGroup>,
    // point -> (group, member)
    lookup: AHashMap<usize, (usize, usize)>,
}

impl PointCoupling {
    pub fn new(groups: Vec<CoupledGroup>) -> Self {
        let mut lookup = AHashMap::new();
        for (g, group) in groups.iter().enumerate() {
            for (m, &p) in group.members.iter().enumerate() {
                if lookup.insert(p, (g, m)).is_some() {
                    panic!("point {} is a member of more than one coupled group", p);
                }
            }
        }
        Self { groups, lookup }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[CoupledGroup] {
        &self.groups
    }

    pub fn is_coupled(&self, point: usize) -> bool {
        self.lookup.contains_key(&point)
    }

    pub fn coupled_points(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flat_map(|g| g.members.iter().copied())
    }

    /// Representative copy of a point (the point itself if uncoupled)
    pub fn master_point(&self, point: usize) -> usize {
        match self.lookup.get(&point) {
            Some(&(g, _)) => self.groups[g].master(),
            None => point,
        }
    }

    /// Rotation of a value from the frame of `from` into the frame of `to`;
    /// both must be members of the same group
    pub fn relative_rotation(&self, from: usize, to: usize) -> Rotation3<f64> {
        match (self.lookup.get(&from), self.lookup.get(&to)) {
            (Some(&(g, mf)), Some(&(g2, mt))) if g == g2 => {
                let group = &self.groups[g];
                group.rotation(mt).inverse() * group.rotation(mf)
            }
            _ => Rotation3::identity(),
        }
    }

    /// Combine the values of all copies of every coupled point
    pub fn sync_point_list<T: Syncable>(&self, values: &mut [T], op: CombineOp) {
        for group in &self.groups {
            let mut combined: Option<T> = None;
            for (m, &p) in group.members.iter().enumerate() {
                let v = values[p].rotate(&group.rotation(m));
                match combined.as_mut() {
                    Some(c) => c.combine(&v, op),
                    None => combined = Some(v),
                }
            }
            if let Some(c) = combined {
                for (m, &p) in group.members.iter().enumerate() {
                    values[p] = c.rotate(&group.rotation(m).inverse());
                }
            }
        }
    }

    /// Sync a field living on a subset of points. Copies outside the subset
    /// contribute `null_value`.
    pub fn sync_patch_point_list<T: Syncable>(
        &self,
        values: &mut [T],
        mesh_points: &[usize],
        op: CombineOp,
        null_value: T,
    ) {
        assert_eq!(
            values.len(),
            mesh_points.len(),
            "number of values {} is not the number of points {}",
            values.len(),
            mesh_points.len()
        );

        let local: AHashMap<usize, usize> = mesh_points
            .iter()
            .enumerate()
            .filter(|(_, p)| self.is_coupled(**p))
            .map(|(i, &p)| (p, i))
            .collect();

        if local.is_empty() {
            return;
        }

        for group in &self.groups {
            if !group.members.iter().any(|p| local.contains_key(p)) {
                continue;
            }

            let mut combined = null_value;
            let mut first = true;
            for (m, p) in group.members.iter().enumerate() {
                let v = match local.get(p) {
                    Some(&i) => values[i].rotate(&group.rotation(m)),
                    None => null_value,
                };
                if first {
                    combined = v;
                    first = false;
                } else {
                    combined.combine(&v, op);
                }
            }

            for (m, p) in group.members.iter().enumerate() {
                if let Some(&i) = local.get(p) {
                    values[i] = combined.rotate(&group.rotation(m).inverse());
                }
            }
        }
    }

    /// Flags the edges that own a coupled edge; uncoupled edges are always
    /// masters. Used to avoid counting a duplicated edge twice in sums.
    pub fn master_edges(&self, edges: &[Edge]) -> Vec<bool> {
        let mut seen = AHashSet::new();
        edges
            .iter()
            .map(|e| {
                if !(self.is_coupled(e.start) && self.is_coupled(e.end)) {
                    return true;
                }
                let key = Edge::new(self.master_point(e.start), self.master_point(e.end));
                seen.insert(key)
            })
            .collect()
    }

    /// Groups of edges that are copies of each other (two or more members)
    pub fn coupled_edge_groups(&self, edges: &[Edge]) -> Vec<Vec<usize>> {
        let mut by_key: AHashMap<Edge, Vec<usize>> = AHashMap::new();
        let mut order = Vec::new();
        for (i, e) in edges.iter().enumerate() {
            if self.is_coupled(e.start) && self.is_coupled(e.end) {
                let key = Edge::new(self.master_point(e.start), self.master_point(e.end));
                let entry = by_key.entry(key).or_default();
                if entry.is_empty() {
                    order.push(key);
                }
                entry.push(i);
            }
        }
        order
            .into_iter()
            .filter_map(|k| by_key.remove(&k))
            .filter(|g| g.len() > 1)
            .collect()
    }
}

/// Global reductions across partitions
pub trait Communicator: Send + Sync + std::fmt::Debug {
    fn n_procs(&self) -> usize;

    fn is_parallel(&self) -> bool {
        self.n_procs() > 1
    }

    fn sum(&self, value: f64) -> f64;
    fn sum_count(&self, value: usize) -> usize;
    fn max(&self, value: f64) -> f64;
    fn min(&self, value: f64) -> f64;
    fn or(&self, value: bool) -> bool;
    fn and(&self, value: bool) -> bool;
}

/// Single partition: reductions are the identity
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn n_procs(&self) -> usize {
        1
    }

    fn sum(&self, value: f64) -> f64 {
        value
    }

    fn sum_count(&self, value: usize) -> usize {
        value
    }

    fn max(&self, value: f64) -> f64 {
        value
    }

    fn min(&self, value: f64) -> f64 {
        value
    }

    fn or(&self, value: bool) -> bool {
        value
    }

    fn and(&self, value: bool) -> bool {
        value
    }
}
