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

//! Shared scene helpers for the kernel integration tests.

#![allow(dead_code)]

use mrsim_core::math::{Point, Poly};
use mrsim_core::physics::VoxelMaterial;
use mrsim_core::Configuration;
use mrsim_infra::RapierBackend;
use mrsim_kernel::catalog::{CreateRigidBody, CreateUnmovableBody, CreateVoxel, TranslateBodyAt};
use mrsim_kernel::{ActionOutcome, Agent, BodyId, BoxedAction, Kernel};

pub fn kernel() -> Kernel {
    let _ = env_logger::builder().is_test(true).try_init();
    Kernel::new(Box::new(RapierBackend::default()), Configuration::default())
        .expect("default configuration is valid")
}

pub fn voxel_at(kernel: &mut Kernel, x: f64, y: f64) -> BodyId {
    let body = kernel
        .perform_as(
            CreateVoxel {
                side_length: 1.0,
                mass: 1.0,
                material: VoxelMaterial::default(),
            },
            None,
        )
        .expect("voxel is created");
    kernel
        .perform_as(
            TranslateBodyAt {
                body,
                destination: Point::new(x, y),
            },
            None,
        )
        .expect("voxel is moved");
    body
}

pub fn rigid_square(kernel: &mut Kernel, x: f64, y: f64, anchored: bool) -> BodyId {
    kernel
        .perform_as(
            CreateRigidBody {
                poly: Poly::square(Point::new(x, y), 1.0),
                mass: 1.0,
                anchored,
            },
            None,
        )
        .expect("rigid body is created")
}

pub fn terrain(kernel: &mut Kernel) -> BodyId {
    kernel
        .perform_as(
            CreateUnmovableBody {
                poly: Poly::rect(Point::new(-20.0, -1.0), 40.0, 1.0),
                anchored: false,
            },
            None,
        )
        .expect("terrain is created")
}

type Script = Box<dyn FnMut(f64, &[ActionOutcome]) -> Vec<BoxedAction> + Send>;

/// A disembodied agent driven by a closure.
pub struct Scripted {
    script: Script,
}

impl Scripted {
    pub fn new<F>(script: F) -> Self
    where
        F: FnMut(f64, &[ActionOutcome]) -> Vec<BoxedAction> + Send + 'static,
    {
        Self {
            script: Box::new(script),
        }
    }
}

impl Agent for Scripted {
    fn act(&mut self, time: f64, previous: &[ActionOutcome]) -> Vec<BoxedAction> {
        (self.script)(time, previous)
    }
}
