// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Body & Material Model
//!
//! Kernel-side view of the bodies living in the physics backend. The variant set
//! is closed: [`BodyKind`] is matched exhaustively wherever behaviour differs.
//!
//! Live geometry (polygon, angle, velocity) is always read back from the backend,
//! so a body never caches state that integration could invalidate.

use std::fmt;

use mrsim_core::error::BackendResult;
use mrsim_core::math::{Point, Poly, EPSILON, SQRT_2};
use mrsim_core::physics::{BodyHandle, JointState, Motor, PhysicsBackend, Side, VoxelMaterial};
use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorGraph, AnchorId};
use crate::snapshot::{AnchorSnapshot, BodySnapshot};

/// Half-size of a voxel corner part, relative to the voxel side length.
pub const VOXEL_CORNER_FRACTION: f64 = 0.1;

/// Inset of rigid body anchors, relative to the square root of the body area.
const RIGID_ANCHOR_INSET: f64 = 0.05;

/// Inset of rotational joint anchors, relative to the joint width.
const JOINT_ANCHOR_INSET: f64 = 0.25;

/// Identifier of a body in the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of an anchor on the boundary of its body's polygon: the point at
/// parameter `t` along side `side`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorSite {
    /// Index of the polygon side.
    pub side: usize,
    /// Parameter along the side, `0` at its first vertex and `1` at its second.
    pub t: f64,
}

/// The body variants and their immutable parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyKind {
    /// A convex rigid body.
    Rigid {
        /// Mass of the body.
        mass: f64,
        /// Whether the body exposes one anchor per vertex.
        anchored: bool,
    },
    /// A soft square body with four actuable sides.
    Voxel {
        /// Side length at rest.
        side_length: f64,
        /// Total mass.
        mass: f64,
        /// Softness and area ratio range.
        material: VoxelMaterial,
    },
    /// A body that never moves.
    Unmovable {
        /// Whether the body exposes one anchor per side.
        anchored: bool,
    },
    /// Two rigid halves articulated by a motorised joint.
    RotationalJoint {
        /// Total mass.
        mass: f64,
        /// Width of the halves.
        width: f64,
        /// Motor parameters.
        motor: Motor,
        /// Range of commandable angles.
        active_angle_range: (f64, f64),
        /// Range of physically reachable angles.
        passive_angle_range: (f64, f64),
    },
}

/// Field-less tag of a [`BodyKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyVariant {
    /// See [`BodyKind::Rigid`].
    Rigid,
    /// See [`BodyKind::Voxel`].
    Voxel,
    /// See [`BodyKind::Unmovable`].
    Unmovable,
    /// See [`BodyKind::RotationalJoint`].
    RotationalJoint,
}

impl BodyKind {
    /// The variant tag.
    pub fn variant(&self) -> BodyVariant {
        match self {
            BodyKind::Rigid { .. } => BodyVariant::Rigid,
            BodyKind::Voxel { .. } => BodyVariant::Voxel,
            BodyKind::Unmovable { .. } => BodyVariant::Unmovable,
            BodyKind::RotationalJoint { .. } => BodyVariant::RotationalJoint,
        }
    }

    /// The mass; infinite for unmovable bodies.
    pub fn mass(&self) -> f64 {
        match self {
            BodyKind::Rigid { mass, .. }
            | BodyKind::Voxel { mass, .. }
            | BodyKind::RotationalJoint { mass, .. } => *mass,
            BodyKind::Unmovable { .. } => f64::INFINITY,
        }
    }

    /// Anchor sites of a body of this kind whose polygon at creation is `shape`.
    pub fn anchor_sites(&self, shape: &Poly) -> Vec<AnchorSite> {
        match self {
            BodyKind::Rigid { anchored: true, .. } => (0..shape.len())
                .map(|side| AnchorSite { side, t: 0.0 })
                .collect(),
            BodyKind::Unmovable { anchored: true } => (0..shape.len())
                .map(|side| AnchorSite { side, t: 0.5 })
                .collect(),
            BodyKind::Rigid { anchored: false, .. } | BodyKind::Unmovable { anchored: false } => {
                Vec::new()
            }
            // One anchor per corner: SW, SE, NE, NW.
            BodyKind::Voxel { .. } => (0..4).map(|side| AnchorSite { side, t: 0.0 }).collect(),
            // Both corners of each outer end, B first.
            BodyKind::RotationalJoint { .. } => [(2, 0.0), (2, 1.0), (5, 0.0), (5, 1.0)]
                .into_iter()
                .map(|(side, t)| AnchorSite { side, t })
                .collect(),
        }
    }

    /// Distance by which anchors are moved from the polygon boundary towards the
    /// polygon center.
    pub fn anchor_inset(&self, shape: &Poly) -> f64 {
        match self {
            BodyKind::Rigid { .. } => RIGID_ANCHOR_INSET * shape.area().sqrt(),
            BodyKind::Unmovable { .. } => 0.0,
            BodyKind::Voxel { side_length, .. } => VOXEL_CORNER_FRACTION * side_length * SQRT_2,
            BodyKind::RotationalJoint { width, .. } => JOINT_ANCHOR_INSET * width,
        }
    }
}

/// Position of the anchor at `site` on `poly`, moved `inset` towards the polygon
/// center. An inset longer than the distance to the center yields the center.
pub fn anchor_position(poly: &Poly, site: AnchorSite, inset: f64) -> Point {
    let center = poly.center();
    let Some(side) = poly.side(site.side) else {
        return center;
    };
    let on_boundary = side.point_at(site.t);
    let to_center = center - on_boundary;
    let distance = to_center.length();
    if distance <= inset || distance < EPSILON {
        center
    } else {
        on_boundary + to_center * (inset / distance)
    }
}

/// A body registered in the kernel.
#[derive(Debug, Clone)]
pub struct Body {
    id: BodyId,
    handle: BodyHandle,
    kind: BodyKind,
    anchors: Vec<AnchorId>,
    anchor_inset: f64,
    rest_area: f64,
}

impl Body {
    pub(crate) fn new(id: BodyId, handle: BodyHandle, kind: BodyKind, rest_shape: &Poly) -> Self {
        Self {
            id,
            handle,
            anchor_inset: kind.anchor_inset(rest_shape),
            rest_area: rest_shape.area(),
            kind,
            anchors: Vec::new(),
        }
    }

    pub(crate) fn push_anchor(&mut self, anchor: AnchorId) {
        self.anchors.push(anchor);
    }

    /// The body identifier.
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// The backend handle.
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    /// The body kind and its parameters.
    pub fn kind(&self) -> &BodyKind {
        &self.kind
    }

    /// The variant tag.
    pub fn variant(&self) -> BodyVariant {
        self.kind.variant()
    }

    /// The mass; infinite for unmovable bodies.
    pub fn mass(&self) -> f64 {
        self.kind.mass()
    }

    /// The anchors of the body, in site order.
    pub fn anchors(&self) -> &[AnchorId] {
        &self.anchors
    }

    /// Whether the body exposes at least one anchor.
    pub fn is_anchorable(&self) -> bool {
        !self.anchors.is_empty()
    }

    /// Distance between an anchor and the polygon boundary.
    pub fn anchor_inset(&self) -> f64 {
        self.anchor_inset
    }

    /// Polygon area at creation.
    pub fn rest_area(&self) -> f64 {
        self.rest_area
    }

    /// The range of commandable joint angles, for rotational joints.
    pub fn active_angle_range(&self) -> Option<(f64, f64)> {
        match self.kind {
            BodyKind::RotationalJoint {
                active_angle_range, ..
            } => Some(active_angle_range),
            _ => None,
        }
    }

    /// The live polygon.
    pub fn poly(&self, backend: &dyn PhysicsBackend) -> BackendResult<Poly> {
        backend.poly(self.handle)
    }

    /// The live orientation. Rigid bodies measure it from the direction of their
    /// first edge at creation; unmovable bodies always report `0`.
    pub fn angle(&self, backend: &dyn PhysicsBackend) -> BackendResult<f64> {
        match self.kind {
            BodyKind::Unmovable { .. } => Ok(0.0),
            _ => backend.angle(self.handle),
        }
    }

    /// The live velocity of the body center; zero for unmovable bodies.
    pub fn velocity(&self, backend: &dyn PhysicsBackend) -> BackendResult<Point> {
        match self.kind {
            BodyKind::Unmovable { .. } => Ok(Point::ZERO),
            _ => backend.linear_velocity(self.handle),
        }
    }

    /// Current area over rest area, for voxels.
    pub fn area_ratio(&self, backend: &dyn PhysicsBackend) -> BackendResult<Option<f64>> {
        match self.kind {
            BodyKind::Voxel { .. } if self.rest_area > 0.0 => {
                Ok(Some(self.poly(backend)?.area() / self.rest_area))
            }
            _ => Ok(None),
        }
    }

    /// The live joint state, for rotational joints.
    pub fn joint_state(&self, backend: &dyn PhysicsBackend) -> BackendResult<Option<JointState>> {
        match self.kind {
            BodyKind::RotationalJoint { .. } => backend.joint_state(self.handle).map(Some),
            _ => Ok(None),
        }
    }

    /// The anchors sitting on a voxel side.
    pub fn side_anchors(&self, side: Side) -> Vec<AnchorId> {
        match self.kind {
            BodyKind::Voxel { .. } if self.anchors.len() == 4 => {
                let first = side.poly_index();
                vec![self.anchors[first], self.anchors[(first + 1) % 4]]
            }
            _ => Vec::new(),
        }
    }

    /// Copies the live state of the body.
    pub fn snapshot(
        &self,
        backend: &dyn PhysicsBackend,
        graph: &AnchorGraph,
    ) -> BackendResult<BodySnapshot> {
        let poly = self.poly(backend)?;
        let mut anchors = Vec::with_capacity(self.anchors.len());
        for id in &self.anchors {
            let Ok(anchor) = graph.anchor(*id) else {
                continue;
            };
            let links = graph
                .links_from(*id)
                .map(|links| {
                    links
                        .iter()
                        .map(|l| (l.id(), l.destination(), l.kind()))
                        .collect()
                })
                .unwrap_or_default();
            anchors.push(AnchorSnapshot {
                id: *id,
                position: anchor_position(&poly, anchor.site(), self.anchor_inset),
                links,
            });
        }
        Ok(BodySnapshot {
            id: self.id,
            variant: self.variant(),
            angle: self.angle(backend)?,
            velocity: self.velocity(backend)?,
            mass: self.mass(),
            area_ratio: self.area_ratio(backend)?,
            joint: self.joint_state(backend)?,
            poly,
            anchors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn voxel_kind() -> BodyKind {
        BodyKind::Voxel {
            side_length: 1.0,
            mass: 1.0,
            material: VoxelMaterial::default(),
        }
    }

    #[test]
    fn test_unmovable_mass_is_infinite() {
        assert_eq!(BodyKind::Unmovable { anchored: false }.mass(), f64::INFINITY);
        assert_eq!(voxel_kind().mass(), 1.0);
    }

    #[test]
    fn test_voxel_anchor_sits_on_corner_part() {
        let square = Poly::square(Point::ZERO, 1.0);
        let kind = voxel_kind();
        let sites = kind.anchor_sites(&square);
        assert_eq!(sites.len(), 4);
        let p = anchor_position(&square, sites[0], kind.anchor_inset(&square));
        assert_relative_eq!(p.x, 0.1, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.1, epsilon = 1e-12);
        let p = anchor_position(&square, sites[2], kind.anchor_inset(&square));
        assert_relative_eq!(p.x, 0.9, epsilon = 1e-12);
        assert_relative_eq!(p.y, 0.9, epsilon = 1e-12);
    }

    #[test]
    fn test_unmovable_anchors_are_side_midpoints() {
        let rect = Poly::rect(Point::ZERO, 4.0, 2.0);
        let kind = BodyKind::Unmovable { anchored: true };
        let sites = kind.anchor_sites(&rect);
        assert_eq!(sites.len(), 4);
        let top = anchor_position(&rect, sites[2], kind.anchor_inset(&rect));
        assert_relative_eq!(top.x, 2.0);
        assert_relative_eq!(top.y, 2.0);
        assert!(BodyKind::Unmovable { anchored: false }
            .anchor_sites(&rect)
            .is_empty());
    }

    #[test]
    fn test_inset_larger_than_body_yields_center() {
        let square = Poly::square(Point::ZERO, 1.0);
        let p = anchor_position(&square, AnchorSite { side: 0, t: 0.0 }, 10.0);
        assert_eq!(p, Point::new(0.5, 0.5));
    }

    #[test]
    fn test_side_anchors_follow_polygon_sides() {
        let square = Poly::square(Point::ZERO, 1.0);
        let mut body = Body::new(BodyId(0), BodyHandle(0), voxel_kind(), &square);
        let mut graph = AnchorGraph::new();
        for site in voxel_kind().anchor_sites(&square) {
            body.push_anchor(graph.add_anchor(body.id(), site));
        }
        let anchors = body.anchors().to_vec();
        // South side runs from the SW corner to the SE corner.
        assert_eq!(body.side_anchors(Side::S), vec![anchors[0], anchors[1]]);
        assert_eq!(body.side_anchors(Side::W), vec![anchors[3], anchors[0]]);
        assert_relative_eq!(body.rest_area(), 1.0);
    }
}
