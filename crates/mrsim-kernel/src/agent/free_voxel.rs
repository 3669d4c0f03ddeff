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

//! A single voxel that finds, attracts and links to nearby bodies, and talks to
//! its neighbours over NFC.

use mrsim_core::math::{Point, FRAC_PI_2};
use mrsim_core::physics::{LinkKind, VoxelMaterial};

use super::{assembly_step, Agent, AgentId, Controller, EmbodiedAgent};
use crate::action::catalog::{
    ActuateVoxel, AttractAndLinkClosestAnchorable, CreateVoxel, EmitNfcMessage, SenseAreaRatio,
    SenseNfc,
};
use crate::action::{ActionOutcome, BoxedAction};
use crate::anchor::AnchorId;
use crate::body::BodyId;
use crate::error::AssemblyError;
use crate::kernel::Kernel;

/// Controller inputs: the NFC value sensed at the voxel center and the area ratio.
pub const FREE_VOXEL_INPUTS: usize = 2;

/// Controller outputs: actuation, emitted NFC value, and attraction.
pub const FREE_VOXEL_OUTPUTS: usize = 3;

/// A free-floating voxel agent.
///
/// Every tick it actuates its four sides with the first controller output,
/// broadcasts the second output on its channel in the four side directions, and,
/// when the third output is positive, pulls its anchors towards the closest
/// anchorable body with a force proportional to it.
#[derive(Debug)]
pub struct FreeVoxel {
    side_length: f64,
    mass: f64,
    material: VoxelMaterial,
    channel: u16,
    attraction: f64,
    controller: Controller,
    body: Option<BodyId>,
    anchors: Vec<AnchorId>,
}

impl FreeVoxel {
    /// Creates an unassembled voxel agent. `attraction` is the force applied for a
    /// controller attraction output of `1`.
    pub fn new(
        side_length: f64,
        mass: f64,
        material: VoxelMaterial,
        channel: u16,
        attraction: f64,
        controller: Controller,
    ) -> Self {
        Self {
            side_length,
            mass,
            material,
            channel,
            attraction,
            controller,
            body: None,
            anchors: Vec::new(),
        }
    }

    /// The voxel, once assembled.
    pub fn body(&self) -> Option<BodyId> {
        self.body
    }

    fn inputs(&self, body: BodyId, previous: &[ActionOutcome]) -> [f64; FREE_VOXEL_INPUTS] {
        let mut nfc = 0.0;
        let mut area_ratio = 1.0;
        for outcome in previous {
            if let Some(value) = outcome.result_as::<SenseNfc>() {
                nfc = *value;
            } else if let Some(value) = outcome.result_as::<SenseAreaRatio>() {
                if outcome.action_as::<SenseAreaRatio>().is_some_and(|a| a.body == body) {
                    area_ratio = *value;
                }
            }
        }
        [nfc, area_ratio]
    }
}

impl Agent for FreeVoxel {
    fn act(&mut self, time: f64, previous: &[ActionOutcome]) -> Vec<BoxedAction> {
        let Some(body) = self.body else {
            return Vec::new();
        };
        let inputs = self.inputs(body, previous);
        let outputs = self.controller.apply(time, &inputs);
        let (actuation, emitted, attraction) = (outputs[0], outputs[1], outputs[2]);

        let mut actions: Vec<BoxedAction> = vec![Box::new(ActuateVoxel {
            body,
            values: [actuation; 4],
        })];
        for quarter in 0..4u8 {
            actions.push(Box::new(EmitNfcMessage {
                body,
                displacement: Point::ZERO,
                direction: f64::from(quarter) * FRAC_PI_2,
                channel: self.channel,
                value: emitted,
            }));
        }
        actions.push(Box::new(SenseNfc {
            body,
            displacement: Point::ZERO,
            channel: self.channel,
        }));
        actions.push(Box::new(SenseAreaRatio { body }));
        if attraction > 0.0 {
            actions.push(Box::new(AttractAndLinkClosestAnchorable {
                sources: self.anchors.clone(),
                magnitude: attraction * self.attraction,
                kind: LinkKind::Rigid,
            }));
        }
        actions
    }
}

impl EmbodiedAgent for FreeVoxel {
    fn assemble(&mut self, kernel: &mut Kernel, id: AgentId) -> Result<(), AssemblyError> {
        if !(self.attraction.is_finite() && self.attraction >= 0.0) {
            return Err(AssemblyError::InvalidParameter(format!(
                "attraction must be a non-negative number, got {}",
                self.attraction
            )));
        }
        let channels = kernel.configuration().nfc_channels;
        if self.channel >= channels {
            return Err(AssemblyError::InvalidParameter(format!(
                "channel {} is outside 0..{channels}",
                self.channel
            )));
        }
        self.controller.check(FREE_VOXEL_INPUTS, FREE_VOXEL_OUTPUTS)?;

        let body = assembly_step(
            kernel,
            id,
            CreateVoxel {
                side_length: self.side_length,
                mass: self.mass,
                material: self.material,
            },
        )?;
        self.anchors = kernel
            .body(body)
            .map(|b| b.anchors().to_vec())
            .unwrap_or_default();
        self.body = Some(body);
        Ok(())
    }

    fn bodies(&self) -> Vec<BodyId> {
        self.body.into_iter().collect()
    }
}
