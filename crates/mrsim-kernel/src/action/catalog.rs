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

//! The built-in action types.
//!
//! Primitive actions are performed by the solvers in [`crate::solvers`]. Composite
//! actions are self-described: their decomposition performs other actions through
//! the kernel, so every step leaves its own outcome in the tick log.

use mrsim_core::math::{BoundingBox, Point, Poly};
use mrsim_core::physics::{LinkKind, RotationalJointDesc, Side, VoxelMaterial};

use super::{Action, Decomposition};
use crate::agent::AgentId;
use crate::anchor::{self, AnchorId, LinkId};
use crate::body::BodyId;
use crate::error::ActionError;
use crate::kernel::Kernel;
use crate::message::NfcMessage;

// --- Bodies ---

/// Creates a convex rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRigidBody {
    /// Shape in world coordinates; its first edge gives the reference direction.
    pub poly: Poly,
    /// Mass of the body.
    pub mass: f64,
    /// Whether the body exposes one anchor per vertex.
    pub anchored: bool,
}

impl Action for CreateRigidBody {
    type Outcome = BodyId;
}

/// Creates a body that never moves.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateUnmovableBody {
    /// Shape in world coordinates.
    pub poly: Poly,
    /// Whether the body exposes one anchor per side.
    pub anchored: bool,
}

impl Action for CreateUnmovableBody {
    type Outcome = BodyId;
}

/// Creates a voxel occupying `[0, side_length]²`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateVoxel {
    /// Side length at rest.
    pub side_length: f64,
    /// Total mass.
    pub mass: f64,
    /// Voxel material.
    pub material: VoxelMaterial,
}

impl Action for CreateVoxel {
    type Outcome = BodyId;
}

/// Creates a rotational joint occupying `[0, length] × [0, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRotationalJoint {
    /// Geometry, mass, motor and angle ranges.
    pub desc: RotationalJointDesc,
}

impl Action for CreateRotationalJoint {
    type Outcome = BodyId;
}

/// Removes a body together with its anchors and links.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveBody {
    /// The body to remove.
    pub body: BodyId,
}

impl Action for RemoveBody {
    type Outcome = ();
}

/// Moves a body.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateBody {
    /// The body to move.
    pub body: BodyId,
    /// Displacement.
    pub translation: Point,
}

impl Action for TranslateBody {
    type Outcome = ();
}

/// Moves a body so that the minimum corner of its bounding box lands on
/// `destination`. The outcome is the applied translation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateBodyAt {
    /// The body to move.
    pub body: BodyId,
    /// Target of the bounding box minimum corner.
    pub destination: Point,
}

impl Action for TranslateBodyAt {
    type Outcome = Point;
}

/// Rotates a body around its polygon center.
#[derive(Debug, Clone, PartialEq)]
pub struct RotateBody {
    /// The body to rotate.
    pub body: BodyId,
    /// Rotation angle.
    pub angle: f64,
}

impl Action for RotateBody {
    type Outcome = ();
}

/// Moves every body of an embodied agent.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateAgent {
    /// The agent to move.
    pub agent: AgentId,
    /// Displacement.
    pub translation: Point,
}

impl Action for TranslateAgent {
    type Outcome = ();

    fn decomposition() -> Option<Decomposition<Self>> {
        Some(translate_agent)
    }
}

fn translate_agent(
    action: &TranslateAgent,
    kernel: &mut Kernel,
    agent: Option<AgentId>,
) -> Result<(), ActionError> {
    for body in kernel.require_agent_bodies(action.agent)? {
        kernel.perform_as(
            TranslateBody {
                body,
                translation: action.translation,
            },
            agent,
        )?;
    }
    Ok(())
}

/// Moves an embodied agent so that the minimum corner of the bounding box of all its
/// bodies lands on `destination`. The outcome is the applied translation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateAgentAt {
    /// The agent to move.
    pub agent: AgentId,
    /// Target of the bounding box minimum corner.
    pub destination: Point,
}

impl Action for TranslateAgentAt {
    type Outcome = Point;

    fn decomposition() -> Option<Decomposition<Self>> {
        Some(translate_agent_at)
    }
}

fn translate_agent_at(
    action: &TranslateAgentAt,
    kernel: &mut Kernel,
    agent: Option<AgentId>,
) -> Result<Point, ActionError> {
    let mut bounds: Option<BoundingBox> = None;
    for body in kernel.require_agent_bodies(action.agent)? {
        let bbox = kernel.body_poly(body)?.bounding_box();
        bounds = Some(bounds.map_or(bbox, |b| b.merge(&bbox)));
    }
    let bounds = bounds.ok_or_else(|| ActionError::rejected("the agent has no body"))?;
    let translation = action.destination - bounds.min;
    kernel.perform_as(
        TranslateAgent {
            agent: action.agent,
            translation,
        },
        agent,
    )?;
    Ok(translation)
}

// --- Links ---

/// Links two anchors of different bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateLink {
    /// Source anchor.
    pub source: AnchorId,
    /// Destination anchor.
    pub destination: AnchorId,
    /// Rigid or soft.
    pub kind: LinkKind,
}

impl Action for CreateLink {
    type Outcome = LinkId;
}

/// Removes a link in both directions.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoveLink {
    /// The link to remove.
    pub link: LinkId,
}

impl Action for RemoveLink {
    type Outcome = ();
}

/// Removes every link touching an anchor. The outcome lists the removed links.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachAnchor {
    /// The anchor to detach.
    pub anchor: AnchorId,
}

impl Action for DetachAnchor {
    type Outcome = Vec<LinkId>;
}

/// Removes every link touching any anchor of a body. The outcome lists the removed
/// links.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachAllAnchorsFromAnchorable {
    /// The body to detach.
    pub body: BodyId,
}

impl Action for DetachAllAnchorsFromAnchorable {
    type Outcome = Vec<LinkId>;
}

/// Links up to `k` disjoint anchor pairs between two bodies, closest pairs first.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachClosestAnchors {
    /// Maximum number of links.
    pub k: usize,
    /// Body providing source anchors.
    pub source: BodyId,
    /// Body providing destination anchors.
    pub destination: BodyId,
    /// Rigid or soft.
    pub kind: LinkKind,
}

impl Action for AttachClosestAnchors {
    type Outcome = Vec<LinkId>;
}

/// Pulls an anchor's body towards another anchor. The outcome is the magnitude of
/// the applied force, `0` when the anchors are out of attraction range.
#[derive(Debug, Clone, PartialEq)]
pub struct AttractAnchor {
    /// Anchor being pulled.
    pub source: AnchorId,
    /// Anchor pulled towards.
    pub destination: AnchorId,
    /// Force magnitude.
    pub magnitude: f64,
}

impl Action for AttractAnchor {
    type Outcome = f64;
}

/// Result of an attract-and-link step: either a force was applied or a link exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttractAndLink {
    /// Magnitude of the applied force, when attracting.
    pub force: Option<f64>,
    /// The link, when the anchors were close enough (or already linked).
    pub link: Option<LinkId>,
}

/// Links two anchors if they are close enough, attracts them otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct AttractAndLinkAnchor {
    /// Source anchor.
    pub source: AnchorId,
    /// Destination anchor.
    pub destination: AnchorId,
    /// Attraction magnitude.
    pub magnitude: f64,
    /// Kind of the link to create.
    pub kind: LinkKind,
}

impl Action for AttractAndLinkAnchor {
    type Outcome = AttractAndLink;

    fn decomposition() -> Option<Decomposition<Self>> {
        Some(attract_and_link_anchor)
    }
}

fn attract_and_link_anchor(
    action: &AttractAndLinkAnchor,
    kernel: &mut Kernel,
    agent: Option<AgentId>,
) -> Result<AttractAndLink, ActionError> {
    if let Some(link) = kernel.graph().find_link(action.source, action.destination) {
        return Ok(AttractAndLink {
            force: None,
            link: Some(link),
        });
    }
    let distance = kernel
        .anchor_position(action.source)?
        .distance(kernel.anchor_position(action.destination)?);
    if distance < kernel.link_threshold(action.source, action.destination)? {
        let link = kernel.perform_as(
            CreateLink {
                source: action.source,
                destination: action.destination,
                kind: action.kind,
            },
            agent,
        )?;
        Ok(AttractAndLink {
            force: None,
            link: Some(link),
        })
    } else {
        let force = kernel.perform_as(
            AttractAnchor {
                source: action.source,
                destination: action.destination,
                magnitude: action.magnitude,
            },
            agent,
        )?;
        Ok(AttractAndLink {
            force: Some(force),
            link: None,
        })
    }
}

/// Pairs each source anchor, in order, with the nearest unused anchor of
/// `destination`, and attracts-and-links every pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AttractAndLinkAnchorable {
    /// Source anchors, all on one body.
    pub sources: Vec<AnchorId>,
    /// Body providing destination anchors.
    pub destination: BodyId,
    /// Attraction magnitude.
    pub magnitude: f64,
    /// Kind of the links to create.
    pub kind: LinkKind,
}

impl Action for AttractAndLinkAnchorable {
    type Outcome = Vec<AttractAndLink>;

    fn decomposition() -> Option<Decomposition<Self>> {
        Some(attract_and_link_anchorable)
    }
}

fn attract_and_link_anchorable(
    action: &AttractAndLinkAnchorable,
    kernel: &mut Kernel,
    agent: Option<AgentId>,
) -> Result<Vec<AttractAndLink>, ActionError> {
    let owner = kernel.owner_of(&action.sources)?;
    if owner == action.destination {
        return Err(ActionError::rejected(format!(
            "cannot attract body {owner} to itself"
        )));
    }
    if !action.magnitude.is_finite() || action.magnitude < 0.0 {
        return Err(ActionError::rejected(format!(
            "magnitude must be finite and not negative, got {}",
            action.magnitude
        )));
    }
    let sources = kernel.positions_of(&action.sources)?;
    let destinations = kernel.anchor_positions(action.destination)?;

    // Either every pair is handled or the links made so far are undone.
    let mut outcomes = Vec::with_capacity(sources.len());
    let mut created = Vec::new();
    for (source, destination) in anchor::nearest_unused_pairs(&sources, &destinations) {
        let linked = kernel.graph().find_link(source, destination).is_some();
        let attempt = kernel.perform_as(
            AttractAndLinkAnchor {
                source,
                destination,
                magnitude: action.magnitude,
                kind: action.kind,
            },
            agent,
        );
        match attempt {
            Ok(outcome) => {
                if let (false, Some(link)) = (linked, outcome.link) {
                    created.push(link);
                }
                outcomes.push(outcome);
            }
            Err(err) => {
                kernel.discard_links(&created);
                return Err(err);
            }
        }
    }
    Ok(outcomes)
}

/// Finds the anchorable body closest to the source anchors and
/// attracts-and-links them to it. The outcome is empty when no body lies within the
/// body-find range.
#[derive(Debug, Clone, PartialEq)]
pub struct AttractAndLinkClosestAnchorable {
    /// Source anchors, all on one body.
    pub sources: Vec<AnchorId>,
    /// Attraction magnitude.
    pub magnitude: f64,
    /// Kind of the links to create.
    pub kind: LinkKind,
}

impl Action for AttractAndLinkClosestAnchorable {
    type Outcome = Vec<AttractAndLink>;

    fn decomposition() -> Option<Decomposition<Self>> {
        Some(attract_and_link_closest_anchorable)
    }
}

fn attract_and_link_closest_anchorable(
    action: &AttractAndLinkClosestAnchorable,
    kernel: &mut Kernel,
    agent: Option<AgentId>,
) -> Result<Vec<AttractAndLink>, ActionError> {
    let owner = kernel.owner_of(&action.sources)?;
    let sources = kernel.positions_of(&action.sources)?;
    let Some(destination) = kernel.closest_anchorable(owner, &sources)? else {
        return Ok(Vec::new());
    };
    kernel.perform_as(
        AttractAndLinkAnchorable {
            sources: action.sources.clone(),
            destination,
            magnitude: action.magnitude,
            kind: action.kind,
        },
        agent,
    )
}

// --- Sensing ---

/// Distance from the body center to the nearest other body along
/// `body angle + direction`, capped at `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseDistanceToBody {
    /// The sensing body.
    pub body: BodyId,
    /// Ray direction relative to the body angle.
    pub direction: f64,
    /// Maximum sensed distance.
    pub range: f64,
}

impl Action for SenseDistanceToBody {
    type Outcome = f64;
}

/// Orientation of a body.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseAngle {
    /// The sensing body.
    pub body: BodyId,
}

impl Action for SenseAngle {
    type Outcome = f64;
}

/// Center velocity projected on `body angle + direction`.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseVelocity {
    /// The sensing body.
    pub body: BodyId,
    /// Projection direction relative to the body angle.
    pub direction: f64,
}

impl Action for SenseVelocity {
    type Outcome = f64;
}

/// Current area over rest area of a voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseAreaRatio {
    /// The sensing voxel.
    pub body: BodyId,
}

impl Action for SenseAreaRatio {
    type Outcome = f64;
}

/// Angle of a rotational joint.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseJointAngle {
    /// The sensing joint.
    pub body: BodyId,
}

impl Action for SenseJointAngle {
    type Outcome = f64;
}

/// Fraction of the anchors of a voxel side that hold at least one link.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseSideAttachment {
    /// The sensing voxel.
    pub body: BodyId,
    /// The sensed side.
    pub side: Side,
}

impl Action for SenseSideAttachment {
    type Outcome = f64;
}

/// Current length over rest length of a voxel side.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseSideCompression {
    /// The sensing voxel.
    pub body: BodyId,
    /// The sensed side.
    pub side: Side,
}

impl Action for SenseSideCompression {
    type Outcome = f64;
}

/// Strongest NFC value received on a channel at a point attached to the body.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseNfc {
    /// The sensing body.
    pub body: BodyId,
    /// Sensor position relative to the body center, in the body frame.
    pub displacement: Point,
    /// Channel listened to.
    pub channel: u16,
}

impl Action for SenseNfc {
    type Outcome = f64;
}

// --- Actuation ---

/// Actuates the four sides of a voxel. Values are clipped to `[-1, 1]` and ordered
/// `N, E, S, W`; the outcome is the clipped values.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuateVoxel {
    /// The actuated voxel.
    pub body: BodyId,
    /// Per-side actuation.
    pub values: [f64; 4],
}

impl Action for ActuateVoxel {
    type Outcome = [f64; 4];
}

/// Sets the target angle of a rotational joint, clipped to its active range. The
/// outcome is the clipped target.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuateRotationalJoint {
    /// The actuated joint.
    pub body: BodyId,
    /// Target angle.
    pub angle: f64,
}

impl Action for ActuateRotationalJoint {
    type Outcome = f64;
}

/// Broadcasts an NFC message sensed during the next tick. The outcome is the
/// message in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitNfcMessage {
    /// The emitting body.
    pub body: BodyId,
    /// Emitter position relative to the body center, in the body frame.
    pub displacement: Point,
    /// Emission direction relative to the body angle.
    pub direction: f64,
    /// Channel of the message.
    pub channel: u16,
    /// Payload.
    pub value: f64,
}

impl Action for EmitNfcMessage {
    type Outcome = NfcMessage;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ErasedAction;

    #[test]
    fn test_composite_actions_are_self_described() {
        let translate = TranslateAgent {
            agent: AgentId(0),
            translation: Point::ZERO,
        };
        assert!(translate.is_self_described());
        assert!(AttractAndLinkClosestAnchorable {
            sources: Vec::new(),
            magnitude: 1.0,
            kind: LinkKind::Rigid,
        }
        .is_self_described());
        assert!(!SenseAngle { body: BodyId(0) }.is_self_described());
        assert_eq!(
            SenseAngle { body: BodyId(0) }.action_name(),
            "SenseAngle"
        );
    }
}
