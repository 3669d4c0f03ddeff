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

//! Cumulative profiling counters.

use serde::{Deserialize, Serialize};

/// Times (in seconds) and counters accumulated over a kernel's lifetime.
///
/// Every field is monotone: nothing ever resets it except building a new kernel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Completed ticks.
    pub ticks: u64,
    /// Performed actions, nested decompositions included.
    pub actions: u64,
    /// Top-level actions rejected by their solver or faulting while performed.
    /// A failing decomposition counts once, however deep the failure started.
    pub illegal_actions: u64,
    /// Top-level actions with neither a solver nor a decomposition.
    pub unsupported_actions: u64,
    /// Wall-clock time since the kernel was built.
    pub wall_time: f64,
    /// Time spent inside ticks.
    pub tick_time: f64,
    /// Time spent performing actions.
    pub action_time: f64,
    /// Time spent in the backend integration step.
    pub integration_time: f64,
}

/// The counters of a [`Profile`], without the wall-clock measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileCounters {
    /// See [`Profile::ticks`].
    pub ticks: u64,
    /// See [`Profile::actions`].
    pub actions: u64,
    /// See [`Profile::illegal_actions`].
    pub illegal_actions: u64,
    /// See [`Profile::unsupported_actions`].
    pub unsupported_actions: u64,
}

impl Profile {
    /// The deterministic part of the profile.
    pub fn counters(&self) -> ProfileCounters {
        ProfileCounters {
            ticks: self.ticks,
            actions: self.actions,
            illegal_actions: self.illegal_actions,
            unsupported_actions: self.unsupported_actions,
        }
    }

    /// Average tick duration, or `0` before the first tick.
    pub fn mean_tick_time(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.tick_time / self.ticks as f64
        }
    }
}
