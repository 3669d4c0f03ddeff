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

//! Built-in solvers for the primitive actions of [`crate::catalog`].
//!
//! A solver validates its action against the live state, then mutates the anchor
//! graph, the body registry, the message board or the physics backend. Anything it
//! refuses is reported as [`ActionError::Rejected`].

use mrsim_core::math::{self, Point};
use mrsim_core::physics::{RigidBodyDesc, UnmovableBodyDesc, VoxelDesc};

use crate::action::catalog::*;
use crate::action::SolverRegistry;
use crate::agent::AgentId;
use crate::anchor::{self, LinkId};
use crate::body::{BodyId, BodyKind};
use crate::error::ActionError;
use crate::kernel::Kernel;
use crate::message::NfcMessage;

/// Registers a solver for every primitive action type of the catalog.
pub fn register_builtin_solvers(registry: &mut SolverRegistry) {
    // Bodies
    registry.register::<CreateRigidBody, _>(create_rigid_body);
    registry.register::<CreateUnmovableBody, _>(create_unmovable_body);
    registry.register::<CreateVoxel, _>(create_voxel);
    registry.register::<CreateRotationalJoint, _>(create_rotational_joint);
    registry.register::<RemoveBody, _>(remove_body);
    registry.register::<TranslateBody, _>(translate_body);
    registry.register::<TranslateBodyAt, _>(translate_body_at);
    registry.register::<RotateBody, _>(rotate_body);

    // Links
    registry.register::<CreateLink, _>(create_link);
    registry.register::<RemoveLink, _>(remove_link);
    registry.register::<DetachAnchor, _>(detach_anchor);
    registry.register::<DetachAllAnchorsFromAnchorable, _>(detach_all_anchors);
    registry.register::<AttachClosestAnchors, _>(attach_closest_anchors);
    registry.register::<AttractAnchor, _>(attract_anchor);

    // Sensing
    registry.register::<SenseDistanceToBody, _>(sense_distance_to_body);
    registry.register::<SenseAngle, _>(sense_angle);
    registry.register::<SenseVelocity, _>(sense_velocity);
    registry.register::<SenseAreaRatio, _>(sense_area_ratio);
    registry.register::<SenseJointAngle, _>(sense_joint_angle);
    registry.register::<SenseSideAttachment, _>(sense_side_attachment);
    registry.register::<SenseSideCompression, _>(sense_side_compression);
    registry.register::<SenseNfc, _>(sense_nfc);

    // Actuation and messaging
    registry.register::<ActuateVoxel, _>(actuate_voxel);
    registry.register::<ActuateRotationalJoint, _>(actuate_rotational_joint);
    registry.register::<EmitNfcMessage, _>(emit_nfc_message);
}

fn require_finite(name: &str, value: f64) -> Result<f64, ActionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ActionError::rejected(format!("{name} must be finite, got {value}")))
    }
}

fn require_finite_point(name: &str, point: Point) -> Result<Point, ActionError> {
    require_finite(name, point.x)?;
    require_finite(name, point.y)?;
    Ok(point)
}

fn require_channel(kernel: &Kernel, channel: u16) -> Result<u16, ActionError> {
    let channels = kernel.configuration().nfc_channels;
    if channel < channels {
        Ok(channel)
    } else {
        Err(ActionError::rejected(format!(
            "channel {channel} is outside 0..{channels}"
        )))
    }
}

// --- Bodies ---

fn create_rigid_body(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &CreateRigidBody,
) -> Result<BodyId, ActionError> {
    let handle = kernel.backend_mut().add_rigid_body(&RigidBodyDesc {
        poly: action.poly.clone(),
        mass: action.mass,
        linear_damping: None,
        angular_damping: None,
    })?;
    kernel.insert_body(
        handle,
        BodyKind::Rigid {
            mass: action.mass,
            anchored: action.anchored,
        },
    )
}

fn create_unmovable_body(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &CreateUnmovableBody,
) -> Result<BodyId, ActionError> {
    let handle = kernel.backend_mut().add_unmovable_body(&UnmovableBodyDesc {
        poly: action.poly.clone(),
    })?;
    kernel.insert_body(
        handle,
        BodyKind::Unmovable {
            anchored: action.anchored,
        },
    )
}

fn create_voxel(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &CreateVoxel,
) -> Result<BodyId, ActionError> {
    let material = action.material;
    if !(0.0..=1.0).contains(&material.softness) {
        return Err(ActionError::rejected(format!(
            "softness {} is outside [0, 1]",
            material.softness
        )));
    }
    let (low, high) = material.area_ratio_range;
    if !(low > 0.0 && low <= high && high.is_finite()) {
        return Err(ActionError::rejected(format!(
            "invalid area ratio range ({low}, {high})"
        )));
    }
    let handle = kernel.backend_mut().add_voxel(&VoxelDesc {
        side_length: action.side_length,
        mass: action.mass,
        material,
    })?;
    kernel.insert_body(
        handle,
        BodyKind::Voxel {
            side_length: action.side_length,
            mass: action.mass,
            material,
        },
    )
}

fn create_rotational_joint(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &CreateRotationalJoint,
) -> Result<BodyId, ActionError> {
    let desc = action.desc;
    for (name, (low, high)) in [
        ("active angle range", desc.active_angle_range),
        ("passive angle range", desc.passive_angle_range),
    ] {
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(ActionError::rejected(format!(
                "invalid {name} ({low}, {high})"
            )));
        }
    }
    let handle = kernel.backend_mut().add_rotational_joint(&desc)?;
    kernel.insert_body(
        handle,
        BodyKind::RotationalJoint {
            mass: desc.mass,
            width: desc.width,
            motor: desc.motor,
            active_angle_range: desc.active_angle_range,
            passive_angle_range: desc.passive_angle_range,
        },
    )
}

fn remove_body(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &RemoveBody,
) -> Result<(), ActionError> {
    kernel.destroy_body(action.body)
}

fn translate_body(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &TranslateBody,
) -> Result<(), ActionError> {
    let translation = require_finite_point("translation", action.translation)?;
    let handle = kernel.require_body(action.body)?.handle();
    kernel.backend_mut().translate(handle, translation)?;
    Ok(())
}

fn translate_body_at(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &TranslateBodyAt,
) -> Result<Point, ActionError> {
    let destination = require_finite_point("destination", action.destination)?;
    let handle = kernel.require_body(action.body)?.handle();
    let translation = destination - kernel.body_poly(action.body)?.bounding_box().min;
    kernel.backend_mut().translate(handle, translation)?;
    Ok(translation)
}

fn rotate_body(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &RotateBody,
) -> Result<(), ActionError> {
    let angle = require_finite("angle", action.angle)?;
    let handle = kernel.require_body(action.body)?.handle();
    kernel.backend_mut().rotate(handle, angle)?;
    Ok(())
}

// --- Links ---

fn create_link(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &CreateLink,
) -> Result<LinkId, ActionError> {
    kernel.create_link(action.source, action.destination, action.kind)
}

fn remove_link(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &RemoveLink,
) -> Result<(), ActionError> {
    kernel.remove_link(action.link)
}

fn detach_anchor(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &DetachAnchor,
) -> Result<Vec<LinkId>, ActionError> {
    kernel.detach_anchor(action.anchor)
}

fn detach_all_anchors(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &DetachAllAnchorsFromAnchorable,
) -> Result<Vec<LinkId>, ActionError> {
    let anchors = kernel.require_body(action.body)?.anchors().to_vec();
    let mut removed = Vec::new();
    for anchor in anchors {
        removed.extend(kernel.detach_anchor(anchor)?);
    }
    Ok(removed)
}

fn attach_closest_anchors(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &AttachClosestAnchors,
) -> Result<Vec<LinkId>, ActionError> {
    if action.source == action.destination {
        return Err(ActionError::rejected(format!(
            "cannot attach body {} to itself",
            action.source
        )));
    }
    let sources = kernel.anchor_positions(action.source)?;
    let destinations = kernel.anchor_positions(action.destination)?;
    let pairs: Vec<_> = anchor::closest_pairs(&sources, &destinations, action.k)
        .into_iter()
        .filter(|(source, destination)| kernel.graph().find_link(*source, *destination).is_none())
        .collect();
    for (source, destination) in &pairs {
        kernel.graph().check_linkable(*source, *destination)?;
    }

    let mut links = Vec::with_capacity(pairs.len());
    for (source, destination) in pairs {
        match kernel.create_link(source, destination, action.kind) {
            Ok(link) => links.push(link),
            Err(err) => {
                kernel.discard_links(&links);
                return Err(err);
            }
        }
    }
    Ok(links)
}

fn attract_anchor(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &AttractAnchor,
) -> Result<f64, ActionError> {
    let magnitude = require_finite("magnitude", action.magnitude)?;
    if magnitude < 0.0 {
        return Err(ActionError::rejected(format!(
            "magnitude must not be negative, got {magnitude}"
        )));
    }
    let source_body = kernel.graph().anchor(action.source)?.body();
    let destination_body = kernel.graph().anchor(action.destination)?.body();
    if source_body == destination_body {
        return Err(ActionError::rejected(format!(
            "anchors both belong to body {source_body}"
        )));
    }
    let from = kernel.anchor_position(action.source)?;
    let to = kernel.anchor_position(action.destination)?;
    let distance = from.distance(to);
    if distance < math::EPSILON || distance > kernel.configuration().attraction_range {
        return Ok(0.0);
    }

    let force = (to - from).normalize() * magnitude;
    let source_handle = kernel.require_body(source_body)?.handle();
    let destination_handle = kernel.require_body(destination_body)?.handle();
    let backend = kernel.backend_mut();
    backend.apply_force(source_handle, force, from)?;
    backend.apply_force(destination_handle, -force, to)?;
    Ok(magnitude)
}

// --- Sensing ---

fn sense_distance_to_body(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseDistanceToBody,
) -> Result<f64, ActionError> {
    let range = require_finite("range", action.range)?;
    if range <= 0.0 {
        return Err(ActionError::rejected(format!(
            "range must be positive, got {range}"
        )));
    }
    let direction = require_finite("direction", action.direction)?;
    let origin = kernel.body_poly(action.body)?.center();
    let angle = kernel.require_body(action.body)?.angle(kernel.backend())?;
    let ray = Point::from_polar(angle + direction, 1.0);

    let mut nearest = range;
    for body in kernel.bodies() {
        if body.id() == action.body {
            continue;
        }
        let poly = body.poly(kernel.backend())?;
        if let Some(distance) = poly.ray_distance(origin, ray) {
            nearest = nearest.min(distance);
        }
    }
    Ok(nearest)
}

fn sense_angle(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseAngle,
) -> Result<f64, ActionError> {
    Ok(kernel.require_body(action.body)?.angle(kernel.backend())?)
}

fn sense_velocity(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseVelocity,
) -> Result<f64, ActionError> {
    let direction = require_finite("direction", action.direction)?;
    let body = kernel.require_body(action.body)?;
    let angle = body.angle(kernel.backend())?;
    let velocity = body.velocity(kernel.backend())?;
    Ok(velocity.dot(Point::from_polar(angle + direction, 1.0)))
}

fn sense_area_ratio(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseAreaRatio,
) -> Result<f64, ActionError> {
    kernel
        .require_body(action.body)?
        .area_ratio(kernel.backend())?
        .ok_or_else(|| ActionError::rejected(format!("body {} is not a voxel", action.body)))
}

fn sense_joint_angle(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseJointAngle,
) -> Result<f64, ActionError> {
    kernel
        .require_body(action.body)?
        .joint_state(kernel.backend())?
        .map(|state| state.angle)
        .ok_or_else(|| {
            ActionError::rejected(format!("body {} is not a rotational joint", action.body))
        })
}

fn sense_side_attachment(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseSideAttachment,
) -> Result<f64, ActionError> {
    let anchors = kernel.require_body(action.body)?.side_anchors(action.side);
    if anchors.is_empty() {
        return Err(ActionError::rejected(format!(
            "body {} has no anchors on side {:?}",
            action.body, action.side
        )));
    }
    let mut linked = 0;
    for id in &anchors {
        if kernel.graph().anchor(*id)?.is_linked() {
            linked += 1;
        }
    }
    Ok(linked as f64 / anchors.len() as f64)
}

fn sense_side_compression(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseSideCompression,
) -> Result<f64, ActionError> {
    let BodyKind::Voxel { side_length, .. } = *kernel.require_body(action.body)?.kind() else {
        return Err(ActionError::rejected(format!(
            "body {} is not a voxel",
            action.body
        )));
    };
    let poly = kernel.body_poly(action.body)?;
    let side = poly.side(action.side.poly_index()).ok_or_else(|| {
        ActionError::Fault(format!("voxel {} has no side {:?}", action.body, action.side))
    })?;
    Ok(side.length() / side_length)
}

fn sense_nfc(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &SenseNfc,
) -> Result<f64, ActionError> {
    let channel = require_channel(kernel, action.channel)?;
    let displacement = require_finite_point("displacement", action.displacement)?;
    let center = kernel.body_poly(action.body)?.center();
    let angle = kernel.require_body(action.body)?.angle(kernel.backend())?;
    let configuration = kernel.configuration();
    Ok(kernel.messages().sense(
        center + displacement.rotate(angle),
        channel,
        configuration.nfc_distance_range,
        configuration.nfc_angle_range,
    ))
}

// --- Actuation and messaging ---

fn actuate_voxel(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &ActuateVoxel,
) -> Result<[f64; 4], ActionError> {
    if action.values.iter().any(|v| v.is_nan()) {
        return Err(ActionError::rejected(format!(
            "actuation values must be numbers, got {:?}",
            action.values
        )));
    }
    let values = action.values.map(|v| v.clamp(-1.0, 1.0));
    let handle = kernel.require_body(action.body)?.handle();
    kernel.backend_mut().actuate_voxel(handle, values)?;
    Ok(values)
}

fn actuate_rotational_joint(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &ActuateRotationalJoint,
) -> Result<f64, ActionError> {
    if action.angle.is_nan() {
        return Err(ActionError::rejected("joint target must be a number"));
    }
    let body = kernel.require_body(action.body)?;
    let (low, high) = body.active_angle_range().ok_or_else(|| {
        ActionError::rejected(format!("body {} is not a rotational joint", action.body))
    })?;
    let handle = body.handle();
    let target = action.angle.clamp(low, high);
    kernel.backend_mut().set_joint_target(handle, target)?;
    Ok(target)
}

fn emit_nfc_message(
    kernel: &mut Kernel,
    _agent: Option<AgentId>,
    action: &EmitNfcMessage,
) -> Result<NfcMessage, ActionError> {
    let channel = require_channel(kernel, action.channel)?;
    let value = require_finite("value", action.value)?;
    let direction = require_finite("direction", action.direction)?;
    let displacement = require_finite_point("displacement", action.displacement)?;
    let center = kernel.body_poly(action.body)?.center();
    let angle = kernel.require_body(action.body)?.angle(kernel.backend())?;
    let message = NfcMessage {
        source: center + displacement.rotate(angle),
        direction: math::normalize_angle(angle + direction),
        channel,
        value,
    };
    kernel.messages_mut().emit(message);
    Ok(message)
}
