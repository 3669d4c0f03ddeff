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

//! A robot made of voxels laid out on a grid.

use std::collections::BTreeMap;

use mrsim_core::math::Point;
use mrsim_core::physics::{LinkKind, VoxelMaterial};

use super::{assembly_step, Agent, AgentId, Controller, EmbodiedAgent};
use crate::action::catalog::{
    ActuateVoxel, AttachClosestAnchors, CreateVoxel, SenseAreaRatio, TranslateBodyAt,
};
use crate::action::{ActionOutcome, BoxedAction};
use crate::body::BodyId;
use crate::error::AssemblyError;
use crate::kernel::Kernel;

/// Voxels placed on the occupied cells of a grid, each rigidly linked to its right
/// and upper neighbours.
///
/// `layout[y][x]` tells whether cell `(x, y)` holds a voxel, with `y = 0` the
/// bottom row. The controller reads one area ratio per voxel and writes one
/// actuation value per voxel, applied to all four of its sides.
#[derive(Debug)]
pub struct GridVoxelRobot {
    layout: Vec<Vec<bool>>,
    side_length: f64,
    mass: f64,
    material: VoxelMaterial,
    controller: Controller,
    voxels: Vec<BodyId>,
}

impl GridVoxelRobot {
    /// Creates an unassembled robot.
    pub fn new(
        layout: Vec<Vec<bool>>,
        side_length: f64,
        mass: f64,
        material: VoxelMaterial,
        controller: Controller,
    ) -> Self {
        Self {
            layout,
            side_length,
            mass,
            material,
            controller,
            voxels: Vec::new(),
        }
    }

    /// Parses a layout where each line is a row, top row first, and `#` marks a
    /// voxel.
    pub fn parse_layout(text: &str) -> Vec<Vec<bool>> {
        let mut rows: Vec<Vec<bool>> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.chars().map(|c| c == '#').collect())
            .collect();
        rows.reverse();
        rows
    }

    /// The occupied cells, row by row from the bottom.
    pub fn cells(&self) -> Vec<(usize, usize)> {
        let mut cells = Vec::new();
        for (y, row) in self.layout.iter().enumerate() {
            for (x, occupied) in row.iter().enumerate() {
                if *occupied {
                    cells.push((x, y));
                }
            }
        }
        cells
    }

    /// The voxels, in [`GridVoxelRobot::cells`] order. Empty until assembled.
    pub fn voxels(&self) -> &[BodyId] {
        &self.voxels
    }
}

impl Agent for GridVoxelRobot {
    fn act(&mut self, time: f64, previous: &[ActionOutcome]) -> Vec<BoxedAction> {
        let inputs: Vec<f64> = self
            .voxels
            .iter()
            .map(|voxel| {
                previous
                    .iter()
                    .filter(|o| o.action_as::<SenseAreaRatio>().is_some_and(|a| a.body == *voxel))
                    .find_map(|o| o.result_as::<SenseAreaRatio>().copied())
                    .unwrap_or(1.0)
            })
            .collect();
        let outputs = self.controller.apply(time, &inputs);

        let mut actions: Vec<BoxedAction> = Vec::with_capacity(2 * self.voxels.len());
        for (voxel, value) in self.voxels.iter().zip(outputs) {
            actions.push(Box::new(ActuateVoxel {
                body: *voxel,
                values: [value; 4],
            }));
        }
        for voxel in &self.voxels {
            actions.push(Box::new(SenseAreaRatio { body: *voxel }));
        }
        actions
    }
}

impl EmbodiedAgent for GridVoxelRobot {
    fn assemble(&mut self, kernel: &mut Kernel, id: AgentId) -> Result<(), AssemblyError> {
        let cells = self.cells();
        if cells.is_empty() {
            return Err(AssemblyError::EmptyBody);
        }
        self.controller.check(cells.len(), cells.len())?;

        let mut placed = BTreeMap::new();
        for (x, y) in &cells {
            let body = assembly_step(
                kernel,
                id,
                CreateVoxel {
                    side_length: self.side_length,
                    mass: self.mass,
                    material: self.material,
                },
            )?;
            assembly_step(
                kernel,
                id,
                TranslateBodyAt {
                    body,
                    destination: Point::new(*x as f64, *y as f64) * self.side_length,
                },
            )?;
            placed.insert((*x, *y), body);
        }

        for ((x, y), body) in &placed {
            for neighbour in [(x + 1, *y), (*x, y + 1)] {
                if let Some(other) = placed.get(&neighbour) {
                    assembly_step(
                        kernel,
                        id,
                        AttachClosestAnchors {
                            k: 2,
                            source: *body,
                            destination: *other,
                            kind: LinkKind::Rigid,
                        },
                    )?;
                }
            }
        }

        self.voxels = cells.iter().filter_map(|cell| placed.get(cell).copied()).collect();
        Ok(())
    }

    fn bodies(&self) -> Vec<BodyId> {
        self.voxels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot(layout: &str) -> GridVoxelRobot {
        let layout = GridVoxelRobot::parse_layout(layout);
        let n = layout.iter().flatten().filter(|c| **c).count();
        GridVoxelRobot::new(
            layout,
            1.0,
            1.0,
            VoxelMaterial::default(),
            Controller::constant(n, n, 0.5),
        )
    }

    #[test]
    fn test_parse_layout_puts_bottom_row_first() {
        let layout = GridVoxelRobot::parse_layout(
            "
            #.
            ##
            ",
        );
        assert_eq!(layout, vec![vec![true, true], vec![true, false]]);
        assert_eq!(robot("#.\n##").cells(), vec![(0, 0), (1, 0), (0, 1)]);
    }

    #[test]
    fn test_unassembled_robot_does_nothing() {
        let mut robot = robot("##");
        assert!(robot.act(0.0, &[]).is_empty());
        assert!(robot.bodies().is_empty());
    }

    #[test]
    fn test_act_emits_actuation_then_sensing() {
        let mut robot = robot("##");
        robot.voxels = vec![BodyId(4), BodyId(5)];
        let actions = robot.act(0.0, &[]);
        let names: Vec<_> = actions.iter().map(|a| a.action_name()).collect();
        assert_eq!(
            names,
            vec!["ActuateVoxel", "ActuateVoxel", "SenseAreaRatio", "SenseAreaRatio"]
        );
        let first = actions[0].as_any().downcast_ref::<ActuateVoxel>().unwrap();
        assert_eq!(first.values, [0.5; 4]);
    }
}
