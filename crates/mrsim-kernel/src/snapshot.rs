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

//! Immutable per-tick views of the kernel state.

use mrsim_core::math::{Point, Poly};
use mrsim_core::physics::{JointState, LinkKind};

use crate::action::ActionOutcome;
use crate::agent::AgentId;
use crate::anchor::{AnchorId, LinkId};
use crate::body::{BodyId, BodyVariant};
use crate::message::NfcMessage;
use crate::profile::Profile;

/// Copy of an anchor and its links.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSnapshot {
    /// The anchor.
    pub id: AnchorId,
    /// Live position of the anchor.
    pub position: Point,
    /// Links oriented from this anchor: `(link, destination, kind)`.
    pub links: Vec<(LinkId, AnchorId, LinkKind)>,
}

/// Copy of the live state of a body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySnapshot {
    /// The body.
    pub id: BodyId,
    /// The body variant.
    pub variant: BodyVariant,
    /// Live polygon.
    pub poly: Poly,
    /// Live orientation.
    pub angle: f64,
    /// Live center velocity.
    pub velocity: Point,
    /// Mass (infinite for unmovable bodies).
    pub mass: f64,
    /// Current area over rest area, for voxels.
    pub area_ratio: Option<f64>,
    /// Joint state, for rotational joints.
    pub joint: Option<JointState>,
    /// Anchors of the body.
    pub anchors: Vec<AnchorSnapshot>,
}

/// Copy of an agent's bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSnapshot {
    /// The agent.
    pub id: AgentId,
    /// Bodies the agent assembled, empty for disembodied agents.
    pub bodies: Vec<BodyId>,
}

/// Everything that happened during one tick.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Simulation time after the tick's integration step.
    pub time: f64,
    /// Every body, by increasing identifier.
    pub bodies: Vec<BodySnapshot>,
    /// Every agent, in polling order.
    pub agents: Vec<AgentSnapshot>,
    /// Outcomes of every action performed during the tick, in order.
    pub outcomes: Vec<ActionOutcome>,
    /// NFC messages that could be sensed during the tick.
    pub messages: Vec<NfcMessage>,
    /// Profile accumulated up to the end of the tick.
    pub profile: Profile,
}

impl Snapshot {
    /// Looks up a body.
    pub fn body(&self, id: BodyId) -> Option<&BodySnapshot> {
        self.bodies
            .binary_search_by_key(&id, |b| b.id)
            .ok()
            .map(|i| &self.bodies[i])
    }

    /// Outcomes of the actions issued by `agent` during the tick.
    pub fn outcomes_of(&self, agent: AgentId) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.agent() == Some(agent))
    }

    /// A textual digest of the snapshot that excludes wall-clock measurements, so
    /// two runs of the same scene on a deterministic backend give equal digests.
    pub fn fingerprint(&self) -> String {
        format!(
            "{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
            self.time,
            self.bodies,
            self.agents,
            self.outcomes,
            self.messages,
            self.profile.counters()
        )
    }
}
