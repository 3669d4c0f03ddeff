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

// mrsim Sandbox
// Runs a walking voxel robot and two free voxels on flat terrain.
//
// Usage: sandbox [ticks] [configuration.json]

use std::env;
use std::fs;

use anyhow::{Context, Result};
use mrsim_core::math::{Point, Poly};
use mrsim_core::physics::VoxelMaterial;
use mrsim_core::Configuration;
use mrsim_infra::RapierBackend;
use mrsim_kernel::agent::free_voxel::{FREE_VOXEL_INPUTS, FREE_VOXEL_OUTPUTS};
use mrsim_kernel::agent::{mirror_filter, Controller, FreeVoxel, GridVoxelRobot};
use mrsim_kernel::catalog::{CreateUnmovableBody, TranslateAgentAt};
use mrsim_kernel::{AgentId, Kernel, Snapshot};

const DEFAULT_TICKS: u64 = 600;
const REPORT_EVERY: u64 = 60;

fn load_configuration(path: Option<String>) -> Result<Configuration> {
    let Some(path) = path else {
        return Ok(Configuration::default());
    };
    let text =
        fs::read_to_string(&path).with_context(|| format!("reading configuration {path}"))?;
    Configuration::from_json_str(&text).with_context(|| format!("parsing configuration {path}"))
}

fn walker(phase: f64) -> GridVoxelRobot {
    let layout = GridVoxelRobot::parse_layout(
        "
        ###
        #.#
        ",
    );
    let voxels = layout.iter().flatten().filter(|occupied| **occupied).count();
    let controller = Controller::new(voxels, voxels, move |t, _| {
        (0..voxels)
            .map(|i| (2.0 * std::f64::consts::PI * t + phase * i as f64).sin())
            .collect()
    });
    GridVoxelRobot::new(layout, 1.0, 1.0, VoxelMaterial::default(), controller)
}

fn free_voxel() -> FreeVoxel {
    // Pulse on the NFC channel and pull towards neighbours while hearing them.
    let controller = Controller::new(FREE_VOXEL_INPUTS, FREE_VOXEL_OUTPUTS, |t, inputs| {
        vec![(4.0 * t).sin(), 1.0, inputs[0]]
    });
    FreeVoxel::new(1.0, 1.0, VoxelMaterial::default(), 0, 20.0, controller)
}

fn place(kernel: &mut Kernel, agent: AgentId, x: f64) -> Result<()> {
    kernel
        .perform_as(
            TranslateAgentAt {
                agent,
                destination: Point::new(x, 0.05),
            },
            None,
        )
        .with_context(|| format!("placing {agent}"))?;
    Ok(())
}

fn report(snapshot: &Snapshot, walkers: &[AgentId]) {
    for agent in walkers {
        let Some(bodies) = snapshot.agents.iter().find(|a| a.id == *agent) else {
            continue;
        };
        let centers: Vec<Point> = bodies
            .bodies
            .iter()
            .filter_map(|id| snapshot.body(*id))
            .map(|body| body.poly.center())
            .collect();
        if let Some(center) = Point::average(&centers) {
            log::info!("t={:.2}s {agent} at x={:.3}", snapshot.time, center.x);
        }
    }
    let profile = &snapshot.profile;
    log::info!(
        "t={:.2}s ticks={} actions={} illegal={} unsupported={} mean tick={:.3}ms",
        snapshot.time,
        profile.ticks,
        profile.actions,
        profile.illegal_actions,
        profile.unsupported_actions,
        profile.mean_tick_time() * 1e3
    );
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let ticks = match args.next() {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("invalid tick count '{arg}'"))?,
        None => DEFAULT_TICKS,
    };
    let configuration = load_configuration(args.next())?;

    let mut kernel = Kernel::new(Box::new(RapierBackend::default()), configuration)?;
    kernel
        .perform_as(
            CreateUnmovableBody {
                poly: Poly::rect(Point::new(-50.0, -1.0), 100.0, 1.0),
                anchored: true,
            },
            None,
        )
        .context("creating terrain")?;

    let forward = kernel.add_embodied_agent(walker(0.5))?;
    place(&mut kernel, forward, 0.0)?;
    let mirrored = kernel.add_embodied_agent(walker(0.5))?;
    place(&mut kernel, mirrored, -10.0)?;
    kernel.set_action_filter(mirrored, mirror_filter());

    let first = kernel.add_embodied_agent(free_voxel())?;
    place(&mut kernel, first, 10.0)?;
    let second = kernel.add_embodied_agent(free_voxel())?;
    place(&mut kernel, second, 11.5)?;

    log::info!("Sandbox: running {ticks} ticks");
    for _ in 0..ticks {
        let snapshot = kernel.tick();
        if snapshot.profile.ticks % REPORT_EVERY == 0 {
            report(&snapshot, &[forward, mirrored]);
        }
    }
    log::info!(
        "Sandbox: done with {} links between {} bodies",
        kernel.graph().link_count(),
        kernel.bodies().count()
    );
    Ok(())
}
