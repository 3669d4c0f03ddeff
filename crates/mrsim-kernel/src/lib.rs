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

//! # Modular Robot Simulation Kernel
//!
//! The discrete-time kernel that turns agent intents into physical effects.
//!
//! Each [`Kernel::tick`] polls every agent for actions, dispatches them through the
//! [`SolverRegistry`](action::SolverRegistry) (or their own decomposition when they
//! are self-described), rotates the NFC message buffers, integrates the physics
//! backend, and returns an immutable [`Snapshot`].
//!
//! Bodies may expose anchors, which are joined by links to compose structures that
//! can be reconfigured at runtime (see [`anchor`]).

#![warn(missing_docs)]

pub mod action;
pub mod agent;
pub mod anchor;
pub mod body;
pub mod error;
pub mod kernel;
pub mod message;
pub mod profile;
pub mod snapshot;
pub mod solvers;

pub use action::catalog;
pub use action::{Action, ActionOutcome, BoxedAction, ErasedAction, SolverRegistry};
pub use agent::{ActionFilter, Agent, AgentId, Controller, EmbodiedAgent};
pub use anchor::{AnchorGraph, AnchorId, LinkId};
pub use body::{Body, BodyId, BodyKind};
pub use error::{ActionError, AssemblyError, GraphError};
pub use kernel::{Kernel, KernelBuilder};
pub use profile::Profile;
pub use snapshot::Snapshot;
