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

//! # Action/Outcome Protocol
//!
//! An [`Action`] is a typed, immutable request whose result type is
//! [`Action::Outcome`]. The kernel performs type-erased actions
//! ([`BoxedAction`]) by looking up a solver registered for the action's concrete
//! type in the [`SolverRegistry`], or, when none is registered, by running the
//! action's own decomposition if it is self-described.
//!
//! Every performed action yields exactly one [`ActionOutcome`], whose result is
//! absent when the action was rejected, faulted, or is unsupported.

pub mod catalog;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::agent::AgentId;
use crate::error::ActionError;
use crate::kernel::Kernel;

/// The decomposition of a self-described action into other actions, performed
/// against the kernel on behalf of an optional agent.
pub type Decomposition<A> =
    fn(&A, &mut Kernel, Option<AgentId>) -> Result<<A as Action>::Outcome, ActionError>;

/// A typed request to the kernel.
pub trait Action: Debug + Send + Sync + 'static {
    /// The result of a successful action.
    type Outcome: Debug + Clone + Send + Sync + 'static;

    /// The decomposition of a self-described action. Only consulted when no solver
    /// is registered for the action type.
    fn decomposition() -> Option<Decomposition<Self>>
    where
        Self: Sized,
    {
        None
    }
}

/// A type-erased action result.
pub trait OutcomeValue: Any + Debug + Send + Sync {
    /// Upcast used to recover the concrete result type.
    fn value_any(&self) -> &dyn Any;
}

impl<T: Any + Debug + Send + Sync> OutcomeValue for T {
    fn value_any(&self) -> &dyn Any {
        self
    }
}

/// Object-safe face of [`Action`], implemented for every action type.
pub trait ErasedAction: Debug + Send + Sync {
    /// Upcast used to recover the concrete action type.
    fn as_any(&self) -> &dyn Any;

    /// [`TypeId`] of the concrete action type.
    fn action_type(&self) -> TypeId;

    /// Short name of the concrete action type.
    fn action_name(&self) -> &'static str;

    /// Whether the action carries its own decomposition.
    fn is_self_described(&self) -> bool;

    /// Runs the decomposition, if any.
    fn perform_self_described(
        &self,
        kernel: &mut Kernel,
        agent: Option<AgentId>,
    ) -> Option<Result<Arc<dyn OutcomeValue>, ActionError>>;
}

impl<A: Action> ErasedAction for A {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn action_type(&self) -> TypeId {
        TypeId::of::<A>()
    }

    fn action_name(&self) -> &'static str {
        short_type_name::<A>()
    }

    fn is_self_described(&self) -> bool {
        A::decomposition().is_some()
    }

    fn perform_self_described(
        &self,
        kernel: &mut Kernel,
        agent: Option<AgentId>,
    ) -> Option<Result<Arc<dyn OutcomeValue>, ActionError>> {
        let decompose = A::decomposition()?;
        Some(decompose(self, kernel, agent).map(|outcome| Arc::new(outcome) as Arc<dyn OutcomeValue>))
    }
}

/// An owned, type-erased action, as returned by agents.
pub type BoxedAction = Box<dyn ErasedAction>;

/// The last path segment of a type name.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

/// The record of one performed action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    agent: Option<AgentId>,
    action: Arc<dyn ErasedAction>,
    result: Option<Arc<dyn OutcomeValue>>,
}

impl ActionOutcome {
    pub(crate) fn new(
        agent: Option<AgentId>,
        action: Arc<dyn ErasedAction>,
        result: Option<Arc<dyn OutcomeValue>>,
    ) -> Self {
        Self {
            agent,
            action,
            result,
        }
    }

    /// The agent that issued the action, if any.
    pub fn agent(&self) -> Option<AgentId> {
        self.agent
    }

    /// The performed action, after filtering.
    pub fn action(&self) -> &dyn ErasedAction {
        self.action.as_ref()
    }

    /// Whether the action produced a result.
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// The action, if it has type `A`.
    pub fn action_as<A: Action>(&self) -> Option<&A> {
        self.action.as_ref().as_any().downcast_ref::<A>()
    }

    /// The result, if the action has type `A` and succeeded.
    pub fn result_as<A: Action>(&self) -> Option<&A::Outcome> {
        self.action_as::<A>()?;
        let value: &dyn OutcomeValue = self.result.as_ref()?.as_ref();
        value.value_any().downcast_ref::<A::Outcome>()
    }
}

type ErasedSolver = Box<
    dyn Fn(&mut Kernel, Option<AgentId>, &dyn ErasedAction) -> Result<Arc<dyn OutcomeValue>, ActionError>
        + Send
        + Sync,
>;

/// Solvers keyed by the [`TypeId`] of the action type they perform.
///
/// The registry is filled while building the kernel and is immutable afterwards.
#[derive(Default)]
pub struct SolverRegistry {
    solvers: HashMap<TypeId, ErasedSolver>,
}

impl Debug for SolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverRegistry")
            .field("len", &self.solvers.len())
            .finish()
    }
}

impl SolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            solvers: HashMap::new(),
        }
    }

    /// Registers the solver performing actions of type `A`.
    ///
    /// If a solver was already registered for `A`, it is replaced.
    pub fn register<A, F>(&mut self, solver: F)
    where
        A: Action,
        F: Fn(&mut Kernel, Option<AgentId>, &A) -> Result<A::Outcome, ActionError>
            + Send
            + Sync
            + 'static,
    {
        let erased: ErasedSolver = Box::new(move |kernel, agent, action| {
            let action = action.as_any().downcast_ref::<A>().ok_or_else(|| {
                ActionError::Fault(format!(
                    "solver for {} received {}",
                    short_type_name::<A>(),
                    action.action_name()
                ))
            })?;
            solver(kernel, agent, action).map(|outcome| Arc::new(outcome) as Arc<dyn OutcomeValue>)
        });
        self.solvers.insert(TypeId::of::<A>(), erased);
    }

    /// Returns `true` if a solver is registered for `A`.
    #[must_use]
    pub fn contains<A: Action>(&self) -> bool {
        self.solvers.contains_key(&TypeId::of::<A>())
    }

    /// Returns the number of registered solvers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    /// Returns `true` if no solver is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    /// Performs `action` with its registered solver, or returns `None` when there
    /// is none.
    pub(crate) fn solve(
        &self,
        kernel: &mut Kernel,
        agent: Option<AgentId>,
        action: &dyn ErasedAction,
    ) -> Option<Result<Arc<dyn OutcomeValue>, ActionError>> {
        let solver = self.solvers.get(&action.action_type())?;
        Some(solver(kernel, agent, action))
    }
}
