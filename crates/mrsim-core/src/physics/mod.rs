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

//! # Physics Abstractions
//!
//! The contract between the simulation kernel and a concrete physics solver.
//!
//! The kernel never integrates anything itself: it creates bodies and constraints
//! through a [`PhysicsBackend`], forwards actuation, and reads back live geometry.
//!
//! ## Shape conventions
//!
//! Polygons returned by [`PhysicsBackend::poly`] keep a fixed vertex order per
//! body kind, because anchors and voxel sides are indexed by polygon side:
//!
//! * rigid and unmovable bodies: the vertices given at creation, in that order;
//! * voxels: four corners `SW, SE, NE, NW`, so sides are `S, E, N, W`;
//! * rotational joints: six vertices `[A outer-bottom, joint-bottom, B outer-bottom,
//!   B outer-top, joint-top, A outer-top]`, so side `2` is the outer end of half `B`
//!   and side `5` the outer end of half `A`.

use serde::{Deserialize, Serialize};

use crate::error::BackendResult;
use crate::math::{Point, Poly, FRAC_PI_2};

/// Opaque handle to a body (possibly made of several solver parts) in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u64);

/// Opaque handle to a constraint materialising a link in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintHandle(pub u64);

/// The type of a link between two anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// The anchors are pinned together.
    Rigid,
    /// The anchors are joined by a spring.
    Soft,
}

/// One of the four sides of a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// North (top).
    N,
    /// East (right).
    E,
    /// South (bottom).
    S,
    /// West (left).
    W,
}

impl Side {
    /// All sides, in actuation order.
    pub const ALL: [Side; 4] = [Side::N, Side::E, Side::S, Side::W];

    /// Position of the side in actuation arrays (`N, E, S, W`).
    #[inline]
    pub fn actuation_index(self) -> usize {
        match self {
            Side::N => 0,
            Side::E => 1,
            Side::S => 2,
            Side::W => 3,
        }
    }

    /// Index of the side in a voxel polygon (`S, E, N, W`).
    #[inline]
    pub fn poly_index(self) -> usize {
        match self {
            Side::S => 0,
            Side::E => 1,
            Side::N => 2,
            Side::W => 3,
        }
    }
}

/// Material of a soft (voxel) body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelMaterial {
    /// Softness in `[0, 1]`: `0` is stiff, `1` is as soft as the backend allows.
    pub softness: f64,
    /// Range of the area ratio reachable by actuation, as `(min, max)`.
    pub area_ratio_range: (f64, f64),
}

impl Default for VoxelMaterial {
    fn default() -> Self {
        Self {
            softness: 0.75,
            area_ratio_range: (0.8, 1.2),
        }
    }
}

/// Parameters of the position loop driving a rotational joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motor {
    /// Maximum angular speed (rad/s).
    pub max_speed: f64,
    /// Maximum torque the motor can apply.
    pub max_torque: f64,
    /// Proportional gain.
    pub p: f64,
    /// Integral gain.
    pub i: f64,
    /// Derivative gain.
    pub d: f64,
    /// Angle error below which the motor stops correcting.
    pub angle_tolerance: f64,
}

impl Default for Motor {
    fn default() -> Self {
        Self {
            max_speed: 20.0,
            max_torque: 1000.0,
            p: 8.0,
            i: 0.0,
            d: 0.2,
            angle_tolerance: 0.01,
        }
    }
}

/// Description for creating a rigid body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDesc {
    /// Convex shape of the body, in world coordinates.
    pub poly: Poly,
    /// Mass of the body.
    pub mass: f64,
    /// Linear damping; `None` uses the backend default.
    pub linear_damping: Option<f64>,
    /// Angular damping; `None` uses the backend default.
    pub angular_damping: Option<f64>,
}

/// Description for creating an unmovable body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmovableBodyDesc {
    /// Shape of the body, in world coordinates; may be concave.
    pub poly: Poly,
}

/// Description for creating a voxel, initially the square `[0, side]²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoxelDesc {
    /// Length of a side at rest.
    pub side_length: f64,
    /// Total mass.
    pub mass: f64,
    /// Voxel material.
    pub material: VoxelMaterial,
}

/// Description for creating a rotational joint, initially the rectangle
/// `[0, length] × [0, width]` with half `A` on the left and half `B` on the right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationalJointDesc {
    /// Total length of the two halves.
    pub length: f64,
    /// Width of the halves.
    pub width: f64,
    /// Total mass.
    pub mass: f64,
    /// Motor parameters.
    pub motor: Motor,
    /// Range of joint angles the motor may be commanded to.
    pub active_angle_range: (f64, f64),
    /// Range of joint angles the articulation physically allows.
    pub passive_angle_range: (f64, f64),
}

impl Default for RotationalJointDesc {
    fn default() -> Self {
        Self {
            length: 1.0,
            width: 0.2,
            mass: 1.0,
            motor: Motor::default(),
            active_angle_range: (-FRAC_PI_2, FRAC_PI_2),
            passive_angle_range: (-FRAC_PI_2, FRAC_PI_2),
        }
    }
}

/// Live state of a rotational joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointState {
    /// Current angle of half `B` with respect to half `A`.
    pub angle: f64,
    /// Last commanded target angle.
    pub target_angle: f64,
    /// Distance between the outer ends of the two halves.
    pub length: f64,
}

/// Interface contract for any 2D physics solver (e.g., Rapier).
///
/// Implementations must be deterministic: the same sequence of calls must produce
/// the same states.
pub trait PhysicsBackend: Send {
    /// The current simulation time.
    fn time(&self) -> f64;

    /// Advances the simulation by one step, returning the new simulation time.
    fn integrate(&mut self) -> f64;

    /// Adds a dynamic rigid body.
    fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> BackendResult<BodyHandle>;

    /// Adds a body that never moves.
    fn add_unmovable_body(&mut self, desc: &UnmovableBodyDesc) -> BackendResult<BodyHandle>;

    /// Adds a soft voxel.
    fn add_voxel(&mut self, desc: &VoxelDesc) -> BackendResult<BodyHandle>;

    /// Adds a two-part rotational joint.
    fn add_rotational_joint(&mut self, desc: &RotationalJointDesc) -> BackendResult<BodyHandle>;

    /// Removes a body and every constraint attached to it.
    fn remove_body(&mut self, handle: BodyHandle) -> BackendResult<()>;

    /// The current shape of a body, following the module's shape conventions.
    fn poly(&self, handle: BodyHandle) -> BackendResult<Poly>;

    /// The current orientation of a body.
    fn angle(&self, handle: BodyHandle) -> BackendResult<f64>;

    /// The current linear velocity of the body center.
    fn linear_velocity(&self, handle: BodyHandle) -> BackendResult<Point>;

    /// Moves a body by `translation`.
    fn translate(&mut self, handle: BodyHandle, translation: Point) -> BackendResult<()>;

    /// Rotates a body by `angle` around its polygon center.
    fn rotate(&mut self, handle: BodyHandle, angle: f64) -> BackendResult<()>;

    /// Applies `force` at the world point `at` for the next integration step.
    fn apply_force(&mut self, handle: BodyHandle, force: Point, at: Point) -> BackendResult<()>;

    /// Sets the per-side actuation of a voxel; values are in `[-1, 1]`, ordered
    /// `N, E, S, W`.
    fn actuate_voxel(&mut self, handle: BodyHandle, values: [f64; 4]) -> BackendResult<()>;

    /// Sets the target angle of a rotational joint.
    fn set_joint_target(&mut self, handle: BodyHandle, angle: f64) -> BackendResult<()>;

    /// The live state of a rotational joint.
    fn joint_state(&self, handle: BodyHandle) -> BackendResult<JointState>;

    /// Creates a constraint between the world point `at_a` on body `a` and the world
    /// point `at_b` on body `b`.
    fn add_constraint(
        &mut self,
        a: BodyHandle,
        at_a: Point,
        b: BodyHandle,
        at_b: Point,
        kind: LinkKind,
    ) -> BackendResult<ConstraintHandle>;

    /// Removes a constraint.
    fn remove_constraint(&mut self, handle: ConstraintHandle) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_indices_are_permutations() {
        let mut actuation: Vec<usize> = Side::ALL.iter().map(|s| s.actuation_index()).collect();
        let mut poly: Vec<usize> = Side::ALL.iter().map(|s| s.poly_index()).collect();
        actuation.sort_unstable();
        poly.sort_unstable();
        assert_eq!(actuation, vec![0, 1, 2, 3]);
        assert_eq!(poly, vec![0, 1, 2, 3]);
    }
}
