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

//! Error types of the simulation kernel.

use mrsim_core::error::BackendError;
use thiserror::Error;

use crate::anchor::{AnchorId, LinkId};
use crate::body::BodyId;

/// Why an action produced no result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// The action is not legal in the current state (unknown body, wrong body kind,
    /// invalid argument...).
    #[error("rejected: {0}")]
    Rejected(String),
    /// The action failed unexpectedly while being performed.
    #[error("fault: {0}")]
    Fault(String),
}

impl ActionError {
    /// Shorthand for a [`ActionError::Rejected`] error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

impl From<GraphError> for ActionError {
    fn from(err: GraphError) -> Self {
        Self::Rejected(err.to_string())
    }
}

impl From<BackendError> for ActionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::WrongBodyKind { .. } | BackendError::InvalidShape(_) => {
                Self::Rejected(err.to_string())
            }
            // The kernel only hands out handles it owns, so a stale one is a fault.
            BackendError::UnknownBody(_) | BackendError::UnknownConstraint(_) => {
                Self::Fault(err.to_string())
            }
        }
    }
}

/// A failure of the anchor/link graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// The anchor does not exist (or was removed with its body).
    #[error("unknown anchor {0:?}")]
    UnknownAnchor(AnchorId),
    /// The link does not exist.
    #[error("unknown link {0:?}")]
    UnknownLink(LinkId),
    /// Both anchors belong to the same body.
    #[error("anchors {0:?} and {1:?} belong to the same body")]
    SameBody(AnchorId, AnchorId),
    /// The two anchors are already linked together.
    #[error("anchors are already joined by link {0:?}")]
    AlreadyLinked(LinkId),
    /// A set of anchors that should belong to exactly one body does not.
    #[error("anchors span {0} bodies, expected exactly one")]
    AnchorsSpanBodies(usize),
    /// The body does not exist.
    #[error("unknown body {0}")]
    UnknownBody(BodyId),
}

/// A failure while assembling an embodied agent. The partially assembled bodies
/// are removed before this error reaches the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    /// The agent describes no body at all.
    #[error("the agent has no body")]
    EmptyBody,
    /// An assembly action did not produce a result.
    #[error("assembly action '{action}' failed")]
    ActionFailed {
        /// Short name of the failed action.
        action: &'static str,
        /// The underlying error.
        #[source]
        source: ActionError,
    },
    /// The controller does not accept as many inputs as the body provides.
    #[error("controller expects {expected} inputs but the body provides {actual}")]
    InputSize {
        /// Inputs declared by the controller.
        expected: usize,
        /// Inputs provided by the body.
        actual: usize,
    },
    /// The controller does not produce as many outputs as the body consumes.
    #[error("controller produces {expected} outputs but the body consumes {actual}")]
    OutputSize {
        /// Outputs declared by the controller.
        expected: usize,
        /// Outputs consumed by the body.
        actual: usize,
    },
    /// A parameter of the agent is out of range.
    #[error("invalid agent parameter: {0}")]
    InvalidParameter(String),
}
