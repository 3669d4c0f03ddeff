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

//! Error types shared by the kernel and the physics backends.

use thiserror::Error;

use crate::physics::{BodyHandle, ConstraintHandle};

/// An invalid kernel configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A range or ratio that must be strictly positive is not.
    #[error("option '{name}' must be positive and finite, got {value}")]
    NotPositive {
        /// The option name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// There must be at least one NFC channel.
    #[error("at least one NFC channel is required")]
    NoChannels,
    /// The configuration document could not be parsed.
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A failure reported by a physics backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The handle does not refer to a live body.
    #[error("unknown body {0:?}")]
    UnknownBody(BodyHandle),
    /// The handle does not refer to a live constraint.
    #[error("unknown constraint {0:?}")]
    UnknownConstraint(ConstraintHandle),
    /// The operation does not apply to this kind of body.
    #[error("operation '{operation}' not supported by body {body:?}")]
    WrongBodyKind {
        /// The body the operation was attempted on.
        body: BodyHandle,
        /// A short name of the operation.
        operation: &'static str,
    },
    /// The requested shape cannot be built.
    #[error("invalid shape: {0}")]
    InvalidShape(String),
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
