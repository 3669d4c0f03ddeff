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

mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use approx::assert_abs_diff_eq;
use mrsim_core::math::{Point, Poly};
use mrsim_core::physics::VoxelMaterial;
use mrsim_core::Configuration;
use mrsim_infra::RapierBackend;
use mrsim_kernel::agent::{mirror_filter, Controller, GridVoxelRobot};
use mrsim_kernel::catalog::{
    ActuateVoxel, CreateVoxel, EmitNfcMessage, SenseAngle, SenseAreaRatio, SenseDistanceToBody,
    SenseNfc, TranslateAgentAt,
};
use mrsim_kernel::{
    Action, ActionOutcome, AgentId, AssemblyError, BodyId, BoxedAction, EmbodiedAgent, Kernel,
    Snapshot,
};

use common::{kernel, rigid_square, terrain, voxel_at, Scripted};

#[derive(Debug)]
struct Unsupported;

impl Action for Unsupported {
    type Outcome = ();
}

#[test]
fn test_outcomes_match_performed_actions() {
    let mut kernel = kernel();
    let body = voxel_at(&mut kernel, 0.0, 0.0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    kernel.add_agent(Box::new(Scripted::new(move |_, previous| {
        log.lock().unwrap().push(previous.len());
        vec![
            Box::new(SenseAreaRatio { body }) as BoxedAction,
            Box::new(SenseAngle { body: BodyId(999) }),
            Box::new(Unsupported),
        ]
    })));

    // Outcomes of the setup actions are dropped when the first tick starts.
    assert_eq!(kernel.outcomes().len(), 2);
    let mut actions = kernel.profile().actions;
    for _ in 0..3 {
        let snapshot = kernel.tick();
        assert_eq!(snapshot.outcomes.len() as u64, snapshot.profile.actions - actions);
        assert_eq!(snapshot.outcomes.len(), 3);
        assert!(kernel.outcomes().is_empty());
        actions = snapshot.profile.actions;
    }
    assert_eq!(*seen.lock().unwrap(), vec![0, 3, 3]);
}

#[test]
fn test_illegal_and_unsupported_counters_are_monotone() {
    let mut kernel = kernel();
    kernel.add_agent(Box::new(Scripted::new(|_, _| {
        vec![
            Box::new(SenseAngle { body: BodyId(7) }) as BoxedAction,
            Box::new(Unsupported),
        ]
    })));
    let mut last = kernel.profile().counters();
    for _ in 0..4 {
        let snapshot = kernel.tick();
        let now = snapshot.profile.counters();
        assert_eq!(now.illegal_actions, last.illegal_actions + 1);
        assert_eq!(now.unsupported_actions, last.unsupported_actions + 1);
        assert_eq!(now.ticks, last.ticks + 1);
        assert!(snapshot.outcomes.iter().all(|o| !o.is_success()));
        last = now;
    }
}

#[test]
fn test_nfc_message_is_visible_on_next_tick_only() {
    let mut kernel = kernel();
    let emitter = voxel_at(&mut kernel, 0.0, 0.0);
    let receiver = voxel_at(&mut kernel, 1.05, 0.0);
    let mut tick = 0;
    kernel.add_agent(Box::new(Scripted::new(move |_, _| {
        tick += 1;
        let mut actions: Vec<BoxedAction> = vec![Box::new(SenseNfc {
            body: receiver,
            displacement: Point::ZERO,
            channel: 1,
        })];
        if tick == 1 {
            actions.push(Box::new(EmitNfcMessage {
                body: emitter,
                displacement: Point::ZERO,
                direction: 0.0,
                channel: 1,
                value: 0.75,
            }));
        }
        actions
    })));

    let sensed = |snapshot: &Snapshot| {
        snapshot
            .outcomes
            .iter()
            .find_map(|o| o.result_as::<SenseNfc>().copied())
    };

    let first = kernel.tick();
    assert!(first.messages.is_empty());
    assert_eq!(sensed(&first), Some(0.0));

    let second = kernel.tick();
    assert_eq!(second.messages.len(), 1);
    assert_eq!(second.messages[0].channel, 1);
    assert_abs_diff_eq!(second.messages[0].value, 0.75);
    assert_eq!(sensed(&second), Some(0.75));

    let third = kernel.tick();
    assert!(third.messages.is_empty());
    assert_eq!(sensed(&third), Some(0.0));
}

#[test]
fn test_nfc_channel_out_of_range_is_rejected() {
    let mut kernel = kernel();
    let body = voxel_at(&mut kernel, 0.0, 0.0);
    let channels = kernel.configuration().nfc_channels;
    let result = kernel.perform_as(
        EmitNfcMessage {
            body,
            displacement: Point::ZERO,
            direction: 0.0,
            channel: channels,
            value: 1.0,
        },
        None,
    );
    assert!(result.is_err());
    assert!(kernel.messages().outbound().is_empty());
}

#[test]
fn test_sense_distance_to_body() -> Result<()> {
    let mut kernel = kernel();
    terrain(&mut kernel);
    let sensor = rigid_square(&mut kernel, 0.0, 0.0, false);
    let target = rigid_square(&mut kernel, 2.0, 0.0, false);

    let distance = kernel.perform_as(
        SenseDistanceToBody {
            body: sensor,
            direction: 0.0,
            range: 2.0,
        },
        None,
    )?;
    assert!(distance <= 2.0);
    assert_abs_diff_eq!(distance, 1.5, epsilon = 1e-6);

    let capped = kernel.perform_as(
        SenseDistanceToBody {
            body: sensor,
            direction: 0.0,
            range: 1.0,
        },
        None,
    )?;
    assert_abs_diff_eq!(capped, 1.0);

    // Looking away from the target sees nothing within range.
    let behind = kernel.perform_as(
        SenseDistanceToBody {
            body: sensor,
            direction: std::f64::consts::PI,
            range: 2.0,
        },
        None,
    )?;
    assert_abs_diff_eq!(behind, 2.0);

    assert!(kernel.body(target).is_some());
    Ok(())
}

fn grid_scene() -> Result<(Kernel, AgentId)> {
    let mut kernel = kernel();
    terrain(&mut kernel);
    let layout = GridVoxelRobot::parse_layout("##\n##");
    let controller = Controller::new(4, 4, |t, _| {
        (0..4).map(|i| (t * 6.0 + i as f64).sin()).collect()
    });
    let robot = GridVoxelRobot::new(layout, 1.0, 1.0, VoxelMaterial::default(), controller);
    let agent = kernel.add_embodied_agent(robot)?;
    kernel.perform_as(
        TranslateAgentAt {
            agent,
            destination: Point::new(0.0, 0.05),
        },
        None,
    )?;
    Ok((kernel, agent))
}

#[test]
fn test_grid_robot_assembly_and_motion() -> Result<()> {
    let (mut kernel, agent) = grid_scene()?;
    let bodies = kernel.agent_bodies(agent).unwrap().to_vec();
    assert_eq!(bodies.len(), 4);
    // Four adjacent pairs, two links each.
    assert_eq!(kernel.graph().link_count(), 8);

    let mut snapshot = kernel.tick();
    for _ in 0..60 {
        snapshot = kernel.tick();
    }
    assert_eq!(snapshot.agents.len(), 1);
    assert_eq!(snapshot.agents[0].bodies, bodies);
    for body in &bodies {
        let state = snapshot.body(*body).unwrap();
        let ratio = state.area_ratio.unwrap();
        assert!(ratio > 0.5 && ratio < 1.5, "area ratio {ratio}");
    }
    assert_eq!(snapshot.outcomes_of(agent).count(), 8);
    assert_eq!(snapshot.profile.illegal_actions, 0);
    Ok(())
}

#[test]
fn test_runs_are_deterministic() -> Result<()> {
    let run = || -> Result<Vec<String>> {
        let (mut kernel, _) = grid_scene()?;
        Ok((0..30).map(|_| kernel.tick().fingerprint()).collect())
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn test_mirror_filter_is_applied_before_performing() {
    let mut kernel = kernel();
    let body = voxel_at(&mut kernel, 0.0, 0.0);
    let agent = kernel.add_agent(Box::new(Scripted::new(move |_, _| {
        vec![Box::new(ActuateVoxel {
            body,
            values: [0.0, 1.0, 0.5, -2.0],
        }) as BoxedAction]
    })));
    kernel.set_action_filter(agent, mirror_filter());

    let snapshot = kernel.tick();
    let outcome = snapshot.outcomes_of(agent).next().unwrap();
    assert_eq!(outcome.action_as::<ActuateVoxel>().unwrap().values[1], -2.0);
    assert_eq!(outcome.result_as::<ActuateVoxel>(), Some(&[0.0, -1.0, 0.5, 1.0]));
}

#[test]
fn test_panicking_solver_is_contained() {
    let mut kernel = Kernel::builder(Box::new(RapierBackend::default()))
        .with_solver::<SenseAngle, _>(|_, _, _| panic!("sensor exploded"))
        .build()
        .unwrap();
    let body = voxel_at(&mut kernel, 0.0, 0.0);
    kernel.add_agent(Box::new(Scripted::new(move |_, _| {
        vec![
            Box::new(SenseAngle { body }) as BoxedAction,
            Box::new(SenseAreaRatio { body }),
        ]
    })));

    let snapshot = kernel.tick();
    assert_eq!(snapshot.profile.illegal_actions, 1);
    assert!(!snapshot.outcomes[0].is_success());
    assert!(snapshot.outcomes[1].is_success());
}

/// Creates a voxel, then fails.
struct Faulty;

impl mrsim_kernel::Agent for Faulty {
    fn act(&mut self, _: f64, _: &[ActionOutcome]) -> Vec<BoxedAction> {
        Vec::new()
    }
}

impl EmbodiedAgent for Faulty {
    fn assemble(&mut self, kernel: &mut Kernel, id: AgentId) -> Result<(), AssemblyError> {
        mrsim_kernel::agent::assembly_step(
            kernel,
            id,
            CreateVoxel {
                side_length: 1.0,
                mass: 1.0,
                material: VoxelMaterial::default(),
            },
        )?;
        mrsim_kernel::agent::assembly_step(kernel, id, SenseAreaRatio { body: BodyId(999) })?;
        Ok(())
    }

    fn bodies(&self) -> Vec<BodyId> {
        Vec::new()
    }
}

#[test]
fn test_failed_assembly_rolls_back() {
    let mut kernel = kernel();
    let ground = terrain(&mut kernel);
    let err = kernel.add_embodied_agent(Faulty).unwrap_err();
    assert!(matches!(
        err,
        AssemblyError::ActionFailed {
            action: "SenseAreaRatio",
            ..
        }
    ));
    assert_eq!(kernel.bodies().map(|b| b.id()).collect::<Vec<_>>(), vec![ground]);
    assert_eq!(kernel.graph().anchor_count(), 0);
    assert!(kernel.agents().is_empty());
}

#[test]
fn test_controller_size_mismatch_fails_assembly() {
    let mut kernel = kernel();
    let robot = GridVoxelRobot::new(
        GridVoxelRobot::parse_layout("###"),
        1.0,
        1.0,
        VoxelMaterial::default(),
        Controller::constant(2, 3, 0.0),
    );
    assert_eq!(
        kernel.add_embodied_agent(robot).unwrap_err(),
        AssemblyError::InputSize {
            expected: 2,
            actual: 3
        }
    );
    let empty = GridVoxelRobot::new(
        Vec::new(),
        1.0,
        1.0,
        VoxelMaterial::default(),
        Controller::constant(0, 0, 0.0),
    );
    assert_eq!(
        kernel.add_embodied_agent(empty).unwrap_err(),
        AssemblyError::EmptyBody
    );
    assert_eq!(kernel.bodies().count(), 0);
}

#[test]
fn test_invalid_configuration_is_refused() {
    let configuration = Configuration {
        attraction_range: -1.0,
        ..Default::default()
    };
    assert!(Kernel::new(Box::new(RapierBackend::default()), configuration).is_err());
}

#[test]
fn test_unmovable_poly_is_stable() -> Result<()> {
    let mut kernel = kernel();
    let ground = terrain(&mut kernel);
    let before = kernel.body(ground).unwrap().poly(kernel.backend())?;
    for _ in 0..10 {
        kernel.tick();
    }
    let after = kernel.body(ground).unwrap().poly(kernel.backend())?;
    assert_eq!(before, after);
    let expected = Poly::rect(Point::new(-20.0, -1.0), 40.0, 1.0);
    for (got, want) in after.vertices().iter().zip(expected.vertices()) {
        assert_abs_diff_eq!(got.x, want.x, epsilon = 1e-9);
        assert_abs_diff_eq!(got.y, want.y, epsilon = 1e-9);
    }
    Ok(())
}
