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

use mrsim_core::math::Point;
use rapier2d_f64::math::{Point as RapierPoint, Real, Vector};

pub fn to_rapier_vec(v: Point) -> Vector<Real> {
    Vector::new(v.x, v.y)
}

pub fn to_rapier_point(p: Point) -> RapierPoint<Real> {
    RapierPoint::new(p.x, p.y)
}

pub fn from_rapier_vec(v: &Vector<Real>) -> Point {
    Point::new(v.x, v.y)
}

pub fn from_rapier_point(p: &RapierPoint<Real>) -> Point {
    Point::new(p.x, p.y)
}
