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

//! Agents: the policies polled by the kernel once per tick.

pub mod free_voxel;
pub mod grid;

use std::fmt;

use mrsim_core::physics::Side;
use serde::{Deserialize, Serialize};

use crate::action::catalog::{ActuateRotationalJoint, ActuateVoxel};
use crate::action::{short_type_name, Action, ActionOutcome, BoxedAction};
use crate::body::BodyId;
use crate::error::AssemblyError;
use crate::kernel::Kernel;

pub use self::free_voxel::FreeVoxel;
pub use self::grid::GridVoxelRobot;

/// Identifier of an agent in the kernel, assigned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

/// A policy producing actions.
pub trait Agent: Send {
    /// Returns the actions to perform this tick, given the current time and the
    /// outcomes of the actions this agent issued during the previous tick.
    fn act(&mut self, time: f64, previous: &[ActionOutcome]) -> Vec<BoxedAction>;
}

/// An agent owning bodies, built once when it is added to the kernel.
pub trait EmbodiedAgent: Agent {
    /// Creates the agent's bodies by performing actions as `id`.
    ///
    /// On error, the kernel removes every body created since assembly started.
    fn assemble(&mut self, kernel: &mut Kernel, id: AgentId) -> Result<(), AssemblyError>;

    /// The bodies created during assembly.
    fn bodies(&self) -> Vec<BodyId>;
}

/// A transform applied to every action of one agent before it is performed.
pub type ActionFilter = Box<dyn Fn(BoxedAction) -> BoxedAction + Send + Sync>;

/// Reflects actuation across the vertical axis: voxel `E` and `W` commands are
/// swapped and joint targets are negated. Other actions pass through.
pub fn mirror_filter() -> ActionFilter {
    Box::new(|action: BoxedAction| -> BoxedAction {
        if let Some(actuate) = action.as_any().downcast_ref::<ActuateVoxel>() {
            let mut values = actuate.values;
            values.swap(Side::E.actuation_index(), Side::W.actuation_index());
            return Box::new(ActuateVoxel {
                body: actuate.body,
                values,
            });
        }
        if let Some(actuate) = action.as_any().downcast_ref::<ActuateRotationalJoint>() {
            return Box::new(ActuateRotationalJoint {
                body: actuate.body,
                angle: -actuate.angle,
            });
        }
        action
    })
}

/// Performs one assembly action as `agent`, turning a missing result into an
/// [`AssemblyError::ActionFailed`].
pub fn assembly_step<A: Action>(
    kernel: &mut Kernel,
    agent: AgentId,
    action: A,
) -> Result<A::Outcome, AssemblyError> {
    kernel
        .perform_as(action, Some(agent))
        .map_err(|source| AssemblyError::ActionFailed {
            action: short_type_name::<A>(),
            source,
        })
}

/// A controller mapping `inputs` values to `outputs` values at a given time.
pub struct Controller {
    inputs: usize,
    outputs: usize,
    function: Box<dyn FnMut(f64, &[f64]) -> Vec<f64> + Send>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Wraps `function`, which declares `inputs` inputs and `outputs` outputs.
    pub fn new<F>(inputs: usize, outputs: usize, function: F) -> Self
    where
        F: FnMut(f64, &[f64]) -> Vec<f64> + Send + 'static,
    {
        Self {
            inputs,
            outputs,
            function: Box::new(function),
        }
    }

    /// A controller ignoring its inputs and always producing `value`.
    pub fn constant(inputs: usize, outputs: usize, value: f64) -> Self {
        Self::new(inputs, outputs, move |_, _| vec![value; outputs])
    }

    /// Declared number of inputs.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// Declared number of outputs.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Checks the declared sizes against what a body provides and consumes.
    pub fn check(&self, inputs: usize, outputs: usize) -> Result<(), AssemblyError> {
        if self.inputs != inputs {
            return Err(AssemblyError::InputSize {
                expected: self.inputs,
                actual: inputs,
            });
        }
        if self.outputs != outputs {
            return Err(AssemblyError::OutputSize {
                expected: self.outputs,
                actual: outputs,
            });
        }
        Ok(())
    }

    /// Evaluates the controller. The result always has the declared number of
    /// outputs: missing values are `0` and non-finite ones are replaced by `0`.
    pub fn apply(&mut self, time: f64, inputs: &[f64]) -> Vec<f64> {
        let mut outputs = (self.function)(time, inputs);
        outputs.resize(self.outputs, 0.0);
        for value in &mut outputs {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::catalog::SenseAngle;

    #[test]
    fn test_mirror_swaps_east_and_west() {
        let filter = mirror_filter();
        let action = filter(Box::new(ActuateVoxel {
            body: BodyId(1),
            values: [0.1, 0.2, 0.3, 0.4],
        }));
        let actuate = action.as_any().downcast_ref::<ActuateVoxel>().unwrap();
        assert_eq!(actuate.values, [0.1, 0.4, 0.3, 0.2]);
        assert_eq!(actuate.body, BodyId(1));
    }

    #[test]
    fn test_mirror_negates_joint_target() {
        let filter = mirror_filter();
        let action = filter(Box::new(ActuateRotationalJoint {
            body: BodyId(2),
            angle: 0.5,
        }));
        let actuate = action
            .as_any()
            .downcast_ref::<ActuateRotationalJoint>()
            .unwrap();
        assert_eq!(actuate.angle, -0.5);
    }

    #[test]
    fn test_mirror_leaves_other_actions_alone() {
        let filter = mirror_filter();
        let action = filter(Box::new(SenseAngle { body: BodyId(3) }));
        assert_eq!(action.action_name(), "SenseAngle");
        assert_eq!(
            action.as_any().downcast_ref::<SenseAngle>(),
            Some(&SenseAngle { body: BodyId(3) })
        );
    }

    #[test]
    fn test_controller_sizes() {
        let controller = Controller::constant(2, 3, 0.5);
        assert!(controller.check(2, 3).is_ok());
        assert_eq!(
            controller.check(1, 3),
            Err(AssemblyError::InputSize {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            controller.check(2, 4),
            Err(AssemblyError::OutputSize {
                expected: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn test_controller_output_is_sanitized() {
        let mut controller = Controller::new(0, 3, |_, _| vec![f64::NAN, 1.0]);
        assert_eq!(controller.apply(0.0, &[]), vec![0.0, 1.0, 0.0]);
    }
}
