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

//! Provides the 2D mathematics primitives used throughout the simulator.
//!
//! Everything in the simulation plane is expressed with `f64` components. All
//! angular functions operate in **radians**, measured counter-clockwise from the
//! positive X axis.

// --- Fundamental Constants ---

/// A small constant for floating-point comparisons.
pub const EPSILON: f64 = 1e-9;

pub use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2, TAU};

// --- Declare Sub-Modules ---

pub mod geometry;
pub mod vector;

// --- Re-export Principal Types ---

pub use self::geometry::{BoundingBox, Poly, Segment};
pub use self::vector::Point;

// --- Utility Functions ---

/// Wraps an angle into the `(-PI, PI]` range.
///
/// # Examples
///
/// ```
/// use mrsim_core::math::{normalize_angle, PI};
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-9);
/// assert!((normalize_angle(-PI / 2.0) + PI / 2.0).abs() < 1e-9);
/// ```
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Linearly maps `value` from `[-1, 1]` onto `[min, max]`, clipping it first.
///
/// # Examples
///
/// ```
/// use mrsim_core::math::map_signed_unit;
/// assert_eq!(map_signed_unit(0.0, 0.8, 1.2), 1.0);
/// assert_eq!(map_signed_unit(5.0, 0.8, 1.2), 1.2);
/// ```
#[inline]
pub fn map_signed_unit(value: f64, min: f64, max: f64) -> f64 {
    let t = (value.clamp(-1.0, 1.0) + 1.0) / 2.0;
    min + (max - min) * t
}

/// Performs an approximate equality comparison between two floats with a custom tolerance.
#[inline]
pub fn approx_eq_eps(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

/// Performs an approximate equality comparison using the module's default [`EPSILON`].
#[inline]
pub fn approx_eq(a: f64, b: f64) -> bool {
    approx_eq_eps(a, b, EPSILON)
}
