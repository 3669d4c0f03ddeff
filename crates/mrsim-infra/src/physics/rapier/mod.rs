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

//! Rapier implementation of the physics backend.
//!
//! Every kernel body maps onto one or more Rapier rigid bodies:
//!
//! * rigid and unmovable bodies are a single Rapier body with one collider;
//! * a voxel is four square corner bodies held together by six springs (four
//!   sides and two diagonals), whose rest lengths follow the actuation;
//! * a rotational joint is two rectangular halves articulated by a revolute joint
//!   driven by a PID loop evaluated once per step.

mod conversions;

use std::collections::BTreeMap;

use mrsim_core::error::{BackendError, BackendResult};
use mrsim_core::math::{self, Point, Poly, EPSILON};
use mrsim_core::physics::{
    BodyHandle, ConstraintHandle, JointState, LinkKind, Motor, PhysicsBackend, RigidBodyDesc,
    RotationalJointDesc, UnmovableBodyDesc, VoxelDesc, VoxelMaterial,
};
use rapier2d_f64::math::{Isometry, Point as RapierPoint, Real, Vector};
use rapier2d_f64::prelude::{
    BroadPhaseMultiSap, CCDSolver, ColliderBuilder, ColliderSet, GenericJoint, GenericJointBuilder,
    ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager, JointAxesMask,
    JointAxis, MultibodyJointSet, NarrowPhase, PhysicsPipeline, RevoluteJointBuilder,
    RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};

use self::conversions::{from_rapier_point, from_rapier_vec, to_rapier_point, to_rapier_vec};

/// Tunable constants of the Rapier backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RapierSettings {
    /// Duration of one integration step.
    pub dt: f64,
    /// Gravity acceleration.
    pub gravity: Point,
    /// Default linear damping of dynamic bodies.
    pub linear_damping: f64,
    /// Default angular damping of dynamic bodies.
    pub angular_damping: f64,
    /// Friction coefficient of every collider.
    pub friction: f64,
    /// Restitution coefficient of every collider.
    pub restitution: f64,
    /// Voxel spring stiffness as `(softest, stiffest)`, selected by the material softness.
    pub voxel_stiffness_range: (f64, f64),
    /// Damping of voxel springs.
    pub voxel_damping: f64,
    /// Stiffness of soft links.
    pub link_stiffness: f64,
    /// Damping of soft links.
    pub link_damping: f64,
    /// Half-size of a voxel corner body, relative to the voxel side length.
    pub corner_fraction: f64,
}

impl Default for RapierSettings {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            gravity: Point::new(0.0, -10.0),
            linear_damping: 0.1,
            angular_damping: 0.1,
            friction: 1.0,
            restitution: 0.1,
            voxel_stiffness_range: (20.0, 200.0),
            voxel_damping: 5.0,
            link_stiffness: 200.0,
            link_damping: 5.0,
            corner_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Pid {
    integral: f64,
    previous_error: f64,
}

#[derive(Debug)]
struct VoxelParts {
    /// `SW, SE, NE, NW`.
    corners: [RigidBodyHandle; 4],
    /// `S, E, N, W` sides, then the two diagonals.
    springs: [ImpulseJointHandle; 6],
    side_length: f64,
    half: f64,
    stiffness: f64,
    material: VoxelMaterial,
}

#[derive(Debug)]
struct JointParts {
    /// Halves `A` then `B`.
    halves: [RigidBodyHandle; 2],
    hinge: ImpulseJointHandle,
    quarter_length: f64,
    half_width: f64,
    motor: Motor,
    active_angle_range: (f64, f64),
    target: f64,
    pid: Pid,
}

#[derive(Debug)]
enum Parts {
    Rigid {
        body: RigidBodyHandle,
        local: Vec<RapierPoint<Real>>,
    },
    Unmovable {
        body: RigidBodyHandle,
        local: Vec<RapierPoint<Real>>,
    },
    Voxel(VoxelParts),
    Joint(JointParts),
}

impl Parts {
    fn rigid_bodies(&self) -> Vec<RigidBodyHandle> {
        match self {
            Parts::Rigid { body, .. } | Parts::Unmovable { body, .. } => vec![*body],
            Parts::Voxel(voxel) => voxel.corners.to_vec(),
            Parts::Joint(joint) => joint.halves.to_vec(),
        }
    }
}

#[derive(Debug)]
struct LinkConstraint {
    joint: ImpulseJointHandle,
    bodies: (BodyHandle, BodyHandle),
}

/// Implementation of the [`PhysicsBackend`] trait using the Rapier2D physics engine.
pub struct RapierBackend {
    settings: RapierSettings,
    time: f64,
    next_body: u64,
    next_constraint: u64,
    bodies: BTreeMap<BodyHandle, Parts>,
    constraints: BTreeMap<ConstraintHandle, LinkConstraint>,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl Default for RapierBackend {
    fn default() -> Self {
        Self::new(RapierSettings::default())
    }
}

impl std::fmt::Debug for RapierBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RapierBackend")
            .field("time", &self.time)
            .field("bodies", &self.bodies.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl RapierBackend {
    /// Creates an empty world.
    pub fn new(settings: RapierSettings) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = settings.dt;
        Self {
            gravity: to_rapier_vec(settings.gravity),
            settings,
            time: 0.0,
            next_body: 0,
            next_constraint: 0,
            bodies: BTreeMap::new(),
            constraints: BTreeMap::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    /// The settings the world was created with.
    pub fn settings(&self) -> &RapierSettings {
        &self.settings
    }

    /// Number of live kernel bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of live link constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    fn parts(&self, handle: BodyHandle) -> BackendResult<&Parts> {
        self.bodies
            .get(&handle)
            .ok_or(BackendError::UnknownBody(handle))
    }

    fn position_of(&self, owner: BodyHandle, rb: RigidBodyHandle) -> BackendResult<Isometry<Real>> {
        self.rigid_body_set
            .get(rb)
            .map(|body| *body.position())
            .ok_or(BackendError::UnknownBody(owner))
    }

    fn world_point(
        &self,
        owner: BodyHandle,
        rb: RigidBodyHandle,
        local: (f64, f64),
    ) -> BackendResult<Point> {
        let iso = self.position_of(owner, rb)?;
        Ok(from_rapier_point(
            &iso.transform_point(&RapierPoint::new(local.0, local.1)),
        ))
    }

    fn register(&mut self, parts: Parts) -> BodyHandle {
        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.bodies.insert(handle, parts);
        handle
    }

    fn insert_body(&mut self, body: RigidBodyBuilder, collider: ColliderBuilder) -> RigidBodyHandle {
        let handle = self.rigid_body_set.insert(body.build());
        self.collider_set.insert_with_parent(
            collider
                .friction(self.settings.friction)
                .restitution(self.settings.restitution)
                .build(),
            handle,
            &mut self.rigid_body_set,
        );
        handle
    }

    fn dynamic_builder(&self, at: Point) -> RigidBodyBuilder {
        RigidBodyBuilder::dynamic()
            .translation(to_rapier_vec(at))
            .linear_damping(self.settings.linear_damping)
            .angular_damping(self.settings.angular_damping)
    }

    fn nearest_part(&self, owner: BodyHandle, at: Point) -> BackendResult<RigidBodyHandle> {
        let mut best: Option<(RigidBodyHandle, f64)> = None;
        for rb in self.parts(owner)?.rigid_bodies() {
            let iso = self.position_of(owner, rb)?;
            let distance = from_rapier_vec(&iso.translation.vector).distance(at);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((rb, distance));
            }
        }
        best.map(|(rb, _)| rb)
            .ok_or(BackendError::UnknownBody(owner))
    }

    fn modify_joints(
        &mut self,
        handles: &[ImpulseJointHandle],
        mut f: impl FnMut(usize, &mut GenericJoint),
    ) {
        for (handle, joint) in self.impulse_joint_set.iter_mut() {
            if let Some(index) = handles.iter().position(|h| *h == handle) {
                f(index, &mut joint.data);
            }
        }
    }

    fn wake(&mut self, rbs: &[RigidBodyHandle]) {
        for rb in rbs {
            if let Some(body) = self.rigid_body_set.get_mut(*rb) {
                body.wake_up(true);
            }
        }
    }

    fn relative_angle(&self, owner: BodyHandle, halves: [RigidBodyHandle; 2]) -> BackendResult<f64> {
        let a = self.position_of(owner, halves[0])?.rotation.angle();
        let b = self.position_of(owner, halves[1])?.rotation.angle();
        Ok(math::normalize_angle(b - a))
    }

    /// Runs the joint position loops and hands the resulting speeds to the motors.
    fn drive_joints(&mut self) {
        let dt = self.settings.dt;
        let mut commands = Vec::new();
        for (handle, parts) in &self.bodies {
            let Parts::Joint(joint) = parts else {
                continue;
            };
            let (Some(a), Some(b)) = (
                self.rigid_body_set.get(joint.halves[0]),
                self.rigid_body_set.get(joint.halves[1]),
            ) else {
                log::warn!("Joint {:?} lost one of its halves", handle);
                continue;
            };
            let angle = math::normalize_angle(b.rotation().angle() - a.rotation().angle());
            commands.push((*handle, joint.target - angle));
        }

        let mut speeds = Vec::with_capacity(commands.len());
        for (handle, error) in commands {
            if let Some(Parts::Joint(joint)) = self.bodies.get_mut(&handle) {
                let speed = if error.abs() < joint.motor.angle_tolerance {
                    joint.pid.integral = 0.0;
                    0.0
                } else {
                    joint.pid.integral += error * dt;
                    let derivative = (error - joint.pid.previous_error) / dt;
                    (joint.motor.p * error
                        + joint.motor.i * joint.pid.integral
                        + joint.motor.d * derivative)
                        .clamp(-joint.motor.max_speed, joint.motor.max_speed)
                };
                joint.pid.previous_error = error;
                speeds.push((joint.hinge, joint.halves, speed, joint.motor.max_torque));
            }
        }

        for (hinge, halves, speed, max_torque) in speeds {
            self.modify_joints(&[hinge], |_, data| {
                data.set_motor_velocity(JointAxis::AngX, speed, 1.0);
                data.set_motor_max_force(JointAxis::AngX, max_torque);
            });
            if speed != 0.0 {
                self.wake(&halves);
            }
        }
    }
}

/// Rest lengths of the voxel springs (`S, E, N, W`, diagonal, diagonal) between
/// corner body centers, for an actuation ordered `N, E, S, W`.
fn voxel_rest_lengths(
    side_length: f64,
    half: f64,
    area_ratio_range: (f64, f64),
    actuation: [f64; 4],
) -> [f64; 6] {
    let edge = |value: f64| {
        let ratio = math::map_signed_unit(value, area_ratio_range.0, area_ratio_range.1);
        (side_length * ratio.max(0.0).sqrt() - 2.0 * half).max(EPSILON)
    };
    let (n, e, s, w) = (
        edge(actuation[0]),
        edge(actuation[1]),
        edge(actuation[2]),
        edge(actuation[3]),
    );
    let diagonal = ((n + s) / 2.0).hypot((e + w) / 2.0);
    [s, e, n, w, diagonal, diagonal]
}

fn spring(
    rest_length: f64,
    stiffness: f64,
    damping: f64,
    anchor1: RapierPoint<Real>,
    anchor2: RapierPoint<Real>,
) -> GenericJoint {
    GenericJointBuilder::new(JointAxesMask::empty())
        .coupled_axes(JointAxesMask::LIN_AXES)
        .motor_position(JointAxis::LinX, rest_length, stiffness, damping)
        .local_anchor1(anchor1)
        .local_anchor2(anchor2)
        .contacts_enabled(false)
        .build()
}

fn check_positive(name: &str, value: f64) -> BackendResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(BackendError::InvalidShape(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn local_vertices(poly: &Poly) -> BackendResult<(Point, Vec<RapierPoint<Real>>)> {
    if poly.len() < 3 || poly.area() <= EPSILON {
        return Err(BackendError::InvalidShape(format!(
            "polygon with {} vertices and area {} is degenerate",
            poly.len(),
            poly.area()
        )));
    }
    let center = poly.center();
    let local = poly
        .vertices()
        .iter()
        .map(|v| to_rapier_point(*v - center))
        .collect();
    Ok((center, local))
}

impl PhysicsBackend for RapierBackend {
    fn time(&self) -> f64 {
        self.time
    }

    fn integrate(&mut self) -> f64 {
        self.drive_joints();
        self.integration_parameters.dt = self.settings.dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
        }
        self.time += self.settings.dt;
        self.time
    }

    fn add_rigid_body(&mut self, desc: &RigidBodyDesc) -> BackendResult<BodyHandle> {
        check_positive("mass", desc.mass)?;
        let (center, local) = local_vertices(&desc.poly)?;
        let collider = ColliderBuilder::convex_hull(&local)
            .ok_or_else(|| BackendError::InvalidShape("no convex hull".to_string()))?
            .mass(desc.mass);
        let builder = self
            .dynamic_builder(center)
            .linear_damping(desc.linear_damping.unwrap_or(self.settings.linear_damping))
            .angular_damping(desc.angular_damping.unwrap_or(self.settings.angular_damping));
        let body = self.insert_body(builder, collider);
        Ok(self.register(Parts::Rigid { body, local }))
    }

    fn add_unmovable_body(&mut self, desc: &UnmovableBodyDesc) -> BackendResult<BodyHandle> {
        let (center, local) = local_vertices(&desc.poly)?;
        let n = local.len();
        let indices: Vec<[u32; 2]> = (0..n)
            .map(|i| [i as u32, ((i + 1) % n) as u32])
            .collect();
        let collider = ColliderBuilder::convex_decomposition(&local, &indices);
        let builder = RigidBodyBuilder::fixed().translation(to_rapier_vec(center));
        let body = self.insert_body(builder, collider);
        Ok(self.register(Parts::Unmovable { body, local }))
    }

    fn add_voxel(&mut self, desc: &VoxelDesc) -> BackendResult<BodyHandle> {
        check_positive("side length", desc.side_length)?;
        check_positive("mass", desc.mass)?;
        let side = desc.side_length;
        let half = self.settings.corner_fraction * side;
        let centers = [
            Point::new(half, half),
            Point::new(side - half, half),
            Point::new(side - half, side - half),
            Point::new(half, side - half),
        ];
        let corners = centers.map(|center| {
            let collider = ColliderBuilder::cuboid(half, half).mass(desc.mass / 4.0);
            let builder = self.dynamic_builder(center);
            self.insert_body(builder, collider)
        });

        let softness = desc.material.softness.clamp(0.0, 1.0);
        let (soft, stiff) = self.settings.voxel_stiffness_range;
        let stiffness = stiff + (soft - stiff) * softness;
        let rests = voxel_rest_lengths(side, half, desc.material.area_ratio_range, [0.0; 4]);
        let pairs = [(0, 1), (1, 2), (2, 3), (3, 0), (0, 2), (1, 3)];
        let origin = RapierPoint::origin();
        let springs = std::array::from_fn(|i| {
            let (a, b) = pairs[i];
            let joint = spring(
                rests[i],
                stiffness,
                self.settings.voxel_damping,
                origin,
                origin,
            );
            self.impulse_joint_set
                .insert(corners[a], corners[b], joint, true)
        });

        Ok(self.register(Parts::Voxel(VoxelParts {
            corners,
            springs,
            side_length: side,
            half,
            stiffness,
            material: desc.material,
        })))
    }

    fn add_rotational_joint(&mut self, desc: &RotationalJointDesc) -> BackendResult<BodyHandle> {
        check_positive("length", desc.length)?;
        check_positive("width", desc.width)?;
        check_positive("mass", desc.mass)?;
        let quarter = desc.length / 4.0;
        let half_width = desc.width / 2.0;
        let halves = [
            Point::new(quarter, half_width),
            Point::new(3.0 * quarter, half_width),
        ]
        .map(|center| {
            let collider = ColliderBuilder::cuboid(quarter, half_width).mass(desc.mass / 2.0);
            let builder = self.dynamic_builder(center);
            self.insert_body(builder, collider)
        });

        let (low, high) = desc.passive_angle_range;
        let hinge = RevoluteJointBuilder::new()
            .local_anchor1(RapierPoint::new(quarter, 0.0))
            .local_anchor2(RapierPoint::new(-quarter, 0.0))
            .limits([low.min(high), low.max(high)])
            .motor_max_force(desc.motor.max_torque)
            .contacts_enabled(false)
            .build();
        let hinge = self
            .impulse_joint_set
            .insert(halves[0], halves[1], hinge, true);

        Ok(self.register(Parts::Joint(JointParts {
            halves,
            hinge,
            quarter_length: quarter,
            half_width,
            motor: desc.motor,
            active_angle_range: desc.active_angle_range,
            target: 0.0,
            pid: Pid::default(),
        })))
    }

    fn remove_body(&mut self, handle: BodyHandle) -> BackendResult<()> {
        let parts = self
            .bodies
            .remove(&handle)
            .ok_or(BackendError::UnknownBody(handle))?;
        let attached: Vec<ConstraintHandle> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.bodies.0 == handle || c.bodies.1 == handle)
            .map(|(h, _)| *h)
            .collect();
        for constraint in attached {
            if let Some(link) = self.constraints.remove(&constraint) {
                self.impulse_joint_set.remove(link.joint, true);
            }
        }
        for rb in parts.rigid_bodies() {
            self.rigid_body_set.remove(
                rb,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        Ok(())
    }

    fn poly(&self, handle: BodyHandle) -> BackendResult<Poly> {
        match self.parts(handle)? {
            Parts::Rigid { body, local } | Parts::Unmovable { body, local } => {
                let iso = self.position_of(handle, *body)?;
                Ok(Poly::new(
                    local
                        .iter()
                        .map(|p| from_rapier_point(&iso.transform_point(p)))
                        .collect(),
                ))
            }
            Parts::Voxel(voxel) => {
                let h = voxel.half;
                let outer = [(-h, -h), (h, -h), (h, h), (-h, h)];
                let mut vertices = Vec::with_capacity(4);
                for (corner, local) in voxel.corners.iter().zip(outer) {
                    vertices.push(self.world_point(handle, *corner, local)?);
                }
                Ok(Poly::new(vertices))
            }
            Parts::Joint(joint) => {
                let (q, w) = (joint.quarter_length, joint.half_width);
                let [a, b] = joint.halves;
                let bottom = Point::lerp(
                    self.world_point(handle, a, (q, -w))?,
                    self.world_point(handle, b, (-q, -w))?,
                    0.5,
                );
                let top = Point::lerp(
                    self.world_point(handle, a, (q, w))?,
                    self.world_point(handle, b, (-q, w))?,
                    0.5,
                );
                Ok(Poly::new(vec![
                    self.world_point(handle, a, (-q, -w))?,
                    bottom,
                    self.world_point(handle, b, (q, -w))?,
                    self.world_point(handle, b, (q, w))?,
                    top,
                    self.world_point(handle, a, (-q, w))?,
                ]))
            }
        }
    }

    fn angle(&self, handle: BodyHandle) -> BackendResult<f64> {
        let (from, to) = match self.parts(handle)? {
            Parts::Rigid { body, .. } => {
                return Ok(self.position_of(handle, *body)?.rotation.angle());
            }
            Parts::Unmovable { .. } => return Ok(0.0),
            // West side to east side.
            Parts::Voxel(_) => (3, 1),
            // Outer end of `A` to outer end of `B`.
            Parts::Joint(_) => (5, 2),
        };
        let poly = self.poly(handle)?;
        match (poly.side(from), poly.side(to)) {
            (Some(from), Some(to)) => Ok((to.center() - from.center()).direction()),
            _ => Err(BackendError::InvalidShape(format!(
                "body {handle:?} has only {} sides",
                poly.len()
            ))),
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> BackendResult<Point> {
        let parts = self.parts(handle)?;
        if let Parts::Unmovable { .. } = parts {
            return Ok(Point::ZERO);
        }
        let mut velocities = Vec::new();
        for rb in parts.rigid_bodies() {
            let body = self
                .rigid_body_set
                .get(rb)
                .ok_or(BackendError::UnknownBody(handle))?;
            velocities.push(from_rapier_vec(body.linvel()));
        }
        Ok(Point::average(&velocities).unwrap_or(Point::ZERO))
    }

    fn translate(&mut self, handle: BodyHandle, translation: Point) -> BackendResult<()> {
        let rbs = self.parts(handle)?.rigid_bodies();
        for rb in rbs {
            if let Some(body) = self.rigid_body_set.get_mut(rb) {
                let moved = body.translation() + to_rapier_vec(translation);
                body.set_translation(moved, true);
            }
        }
        Ok(())
    }

    fn rotate(&mut self, handle: BodyHandle, angle: f64) -> BackendResult<()> {
        let pivot = self.poly(handle)?.center();
        let rbs = self.parts(handle)?.rigid_bodies();
        for rb in rbs {
            if let Some(body) = self.rigid_body_set.get_mut(rb) {
                let iso = *body.position();
                let at = from_rapier_vec(&iso.translation.vector).rotate_around(pivot, angle);
                body.set_position(
                    Isometry::new(to_rapier_vec(at), iso.rotation.angle() + angle),
                    true,
                );
            }
        }
        Ok(())
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Point, at: Point) -> BackendResult<()> {
        let rb = self.nearest_part(handle, at)?;
        if let Some(body) = self.rigid_body_set.get_mut(rb) {
            body.add_force_at_point(to_rapier_vec(force), to_rapier_point(at), true);
        }
        Ok(())
    }

    fn actuate_voxel(&mut self, handle: BodyHandle, values: [f64; 4]) -> BackendResult<()> {
        let (springs, corners, rests, stiffness) = match self.bodies.get(&handle) {
            Some(Parts::Voxel(voxel)) => (
                voxel.springs,
                voxel.corners,
                voxel_rest_lengths(
                    voxel.side_length,
                    voxel.half,
                    voxel.material.area_ratio_range,
                    values.map(|v| v.clamp(-1.0, 1.0)),
                ),
                voxel.stiffness,
            ),
            Some(_) => {
                return Err(BackendError::WrongBodyKind {
                    body: handle,
                    operation: "actuate_voxel",
                })
            }
            None => return Err(BackendError::UnknownBody(handle)),
        };
        let damping = self.settings.voxel_damping;
        self.modify_joints(&springs, |index, data| {
            data.set_motor_position(JointAxis::LinX, rests[index], stiffness, damping);
        });
        self.wake(&corners);
        Ok(())
    }

    fn set_joint_target(&mut self, handle: BodyHandle, angle: f64) -> BackendResult<()> {
        match self.bodies.get_mut(&handle) {
            Some(Parts::Joint(joint)) => {
                let (low, high) = joint.active_angle_range;
                joint.target = angle.clamp(low.min(high), low.max(high));
                joint.pid = Pid::default();
                Ok(())
            }
            Some(_) => Err(BackendError::WrongBodyKind {
                body: handle,
                operation: "set_joint_target",
            }),
            None => Err(BackendError::UnknownBody(handle)),
        }
    }

    fn joint_state(&self, handle: BodyHandle) -> BackendResult<JointState> {
        let Parts::Joint(joint) = self.parts(handle)? else {
            return Err(BackendError::WrongBodyKind {
                body: handle,
                operation: "joint_state",
            });
        };
        let angle = self.relative_angle(handle, joint.halves)?;
        let q = joint.quarter_length;
        let a_end = self.world_point(handle, joint.halves[0], (-q, 0.0))?;
        let b_end = self.world_point(handle, joint.halves[1], (q, 0.0))?;
        Ok(JointState {
            angle,
            target_angle: joint.target,
            length: a_end.distance(b_end),
        })
    }

    fn add_constraint(
        &mut self,
        a: BodyHandle,
        at_a: Point,
        b: BodyHandle,
        at_b: Point,
        kind: LinkKind,
    ) -> BackendResult<ConstraintHandle> {
        if a == b {
            return Err(BackendError::InvalidShape(format!(
                "cannot constrain body {a:?} to itself"
            )));
        }
        let part_a = self.nearest_part(a, at_a)?;
        let part_b = self.nearest_part(b, at_b)?;
        let iso_a = self.position_of(a, part_a)?;
        let iso_b = self.position_of(b, part_b)?;

        let joint: GenericJoint = match kind {
            LinkKind::Rigid => {
                let pin = to_rapier_point(Point::lerp(at_a, at_b, 0.5));
                RevoluteJointBuilder::new()
                    .local_anchor1(iso_a.inverse_transform_point(&pin))
                    .local_anchor2(iso_b.inverse_transform_point(&pin))
                    .contacts_enabled(false)
                    .build()
                    .into()
            }
            LinkKind::Soft => spring(
                at_a.distance(at_b),
                self.settings.link_stiffness,
                self.settings.link_damping,
                iso_a.inverse_transform_point(&to_rapier_point(at_a)),
                iso_b.inverse_transform_point(&to_rapier_point(at_b)),
            ),
        };
        let joint = self.impulse_joint_set.insert(part_a, part_b, joint, true);

        let handle = ConstraintHandle(self.next_constraint);
        self.next_constraint += 1;
        self.constraints.insert(
            handle,
            LinkConstraint {
                joint,
                bodies: (a, b),
            },
        );
        Ok(handle)
    }

    fn remove_constraint(&mut self, handle: ConstraintHandle) -> BackendResult<()> {
        let link = self
            .constraints
            .remove(&handle)
            .ok_or(BackendError::UnknownConstraint(handle))?;
        self.impulse_joint_set.remove(link.joint, true);
        Ok(())
    }
}
