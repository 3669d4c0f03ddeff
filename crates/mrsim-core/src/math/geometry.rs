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

//! Provides the geometric primitive shapes used for spatial reasoning.
//!
//! Bodies are described by closed polygons ([`Poly`]); sensors reason about
//! [`Segment`]s and rays; the proximity index and the snapshot consumers work with
//! axis-aligned [`BoundingBox`]es.

use serde::{Deserialize, Serialize};

use super::{Point, EPSILON};

/// A straight segment between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start point.
    pub p1: Point,
    /// End point.
    pub p2: Point,
}

impl Segment {
    /// Creates a segment from its two endpoints.
    #[inline]
    pub const fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    /// The length of the segment.
    #[inline]
    pub fn length(&self) -> f64 {
        self.p1.distance(self.p2)
    }

    /// The direction of the segment, from `p1` towards `p2`.
    #[inline]
    pub fn direction(&self) -> f64 {
        (self.p2 - self.p1).direction()
    }

    /// The midpoint of the segment.
    #[inline]
    pub fn center(&self) -> Point {
        (self.p1 + self.p2) * 0.5
    }

    /// The point at parameter `t` along the segment (`0` is `p1`, `1` is `p2`).
    #[inline]
    pub fn point_at(&self, t: f64) -> Point {
        Point::lerp(self.p1, self.p2, t)
    }

    /// The point of the segment closest to `p`.
    pub fn closest_point(&self, p: Point) -> Point {
        let d = self.p2 - self.p1;
        let len_sq = d.length_squared();
        if len_sq < EPSILON {
            return self.p1;
        }
        let t = (p - self.p1).dot(d) / len_sq;
        self.point_at(t)
    }

    /// The distance between `p` and the closest point of the segment.
    #[inline]
    pub fn distance(&self, p: Point) -> f64 {
        self.closest_point(p).distance(p)
    }

    /// Intersects the segment with a ray cast from `origin` along the unit vector
    /// `direction`, returning the distance from `origin` to the hit if any.
    pub fn ray_intersection(&self, origin: Point, direction: Point) -> Option<f64> {
        let edge = self.p2 - self.p1;
        let denom = direction.cross(edge);
        if denom.abs() < EPSILON {
            return None;
        }
        let to_start = self.p1 - origin;
        let t = to_start.cross(edge) / denom;
        let u = to_start.cross(direction) / denom;
        if t >= 0.0 && (-EPSILON..=1.0 + EPSILON).contains(&u) {
            Some(t)
        } else {
            None
        }
    }
}

/// A closed polygon described by its vertices, in order.
///
/// The vertex order is significant: the sides of the polygon are
/// `(v[0], v[1]), (v[1], v[2]), ..., (v[n-1], v[0])` and several derived
/// quantities (a rigid body's reference direction, voxel sides, anchor sites) are
/// indexed by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poly {
    vertices: Vec<Point>,
}

impl Poly {
    /// Creates a polygon from its vertices.
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// Creates an axis-aligned rectangle with the given minimum corner and size,
    /// with vertices ordered counter-clockwise starting from the minimum corner.
    pub fn rect(min: Point, width: f64, height: f64) -> Self {
        Self::new(vec![
            min,
            Point::new(min.x + width, min.y),
            Point::new(min.x + width, min.y + height),
            Point::new(min.x, min.y + height),
        ])
    }

    /// Creates a square of side `side` whose minimum corner is at `min`.
    pub fn square(min: Point, side: f64) -> Self {
        Self::rect(min, side, side)
    }

    /// The polygon vertices.
    #[inline]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// The number of vertices (and sides).
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the polygon has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The `index`-th side, from vertex `index` to the following one.
    pub fn side(&self, index: usize) -> Option<Segment> {
        let n = self.vertices.len();
        if index >= n || n < 2 {
            return None;
        }
        Some(Segment::new(self.vertices[index], self.vertices[(index + 1) % n]))
    }

    /// All the sides of the polygon, in vertex order.
    pub fn sides(&self) -> impl Iterator<Item = Segment> + '_ {
        (0..self.vertices.len()).filter_map(move |i| self.side(i))
    }

    /// The signed area (shoelace formula); positive for counter-clockwise polygons.
    pub fn signed_area(&self) -> f64 {
        self.sides().map(|s| s.p1.cross(s.p2)).sum::<f64>() / 2.0
    }

    /// The (unsigned) area of the polygon.
    #[inline]
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// The perimeter of the polygon.
    pub fn perimeter(&self) -> f64 {
        self.sides().map(|s| s.length()).sum()
    }

    /// The center of the polygon, taken as the mean of its vertices.
    pub fn center(&self) -> Point {
        Point::average(&self.vertices).unwrap_or(Point::ZERO)
    }

    /// The smallest axis-aligned box enclosing the polygon.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.vertices).unwrap_or(BoundingBox::from_point(Point::ZERO))
    }

    /// Whether `p` is inside the polygon (even-odd rule).
    pub fn contains(&self, p: Point) -> bool {
        let mut inside = false;
        for side in self.sides() {
            let (a, b) = (side.p1, side.p2);
            if (a.y > p.y) != (b.y > p.y) {
                let x_at = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if p.x < x_at {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// The distance from `p` to the polygon: `0` when `p` is inside, otherwise the
    /// distance to the closest side.
    pub fn distance(&self, p: Point) -> f64 {
        if self.contains(p) {
            return 0.0;
        }
        self.boundary_distance(p)
    }

    /// The distance from `p` to the closest side, regardless of containment.
    pub fn boundary_distance(&self, p: Point) -> f64 {
        self.sides()
            .map(|s| s.distance(p))
            .fold(f64::INFINITY, f64::min)
    }

    /// The distance from `origin` to the first side hit by a ray along the unit
    /// vector `direction`, if any.
    pub fn ray_distance(&self, origin: Point, direction: Point) -> Option<f64> {
        self.sides()
            .filter_map(|s| s.ray_intersection(origin, direction))
            .reduce(f64::min)
    }

    /// The length of the shortest side.
    pub fn min_side_length(&self) -> f64 {
        self.sides()
            .map(|s| s.length())
            .fold(f64::INFINITY, f64::min)
    }

    /// Returns a translated copy of the polygon.
    pub fn translated(&self, translation: Point) -> Self {
        Self::new(self.vertices.iter().map(|v| *v + translation).collect())
    }

    /// Returns a copy rotated by `angle` around `pivot`.
    pub fn rotated(&self, pivot: Point, angle: f64) -> Self {
        Self::new(
            self.vertices
                .iter()
                .map(|v| v.rotate_around(pivot, angle))
                .collect(),
        )
    }
}

/// Represents a 2D Axis-Aligned Bounding Box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The corner with the smallest coordinates.
    pub min: Point,
    /// The corner with the largest coordinates.
    pub max: Point,
}

impl BoundingBox {
    /// Creates a new box from two corner points, in any order.
    #[inline]
    pub fn from_min_max(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a degenerate box containing a single point.
    #[inline]
    pub fn from_point(point: Point) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Creates a box that tightly encloses a given set of points.
    ///
    /// Returns `None` if the input slice is empty.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = *points.first()?;
        Some(
            points
                .iter()
                .skip(1)
                .fold(Self::from_point(first), |bb, p| bb.merged_with_point(*p)),
        )
    }

    /// The center point of the box.
    #[inline]
    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }

    /// The width of the box.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// The height of the box.
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Half the length of the box diagonal.
    #[inline]
    pub fn half_diagonal(&self) -> f64 {
        self.min.distance(self.max) / 2.0
    }

    /// Checks if a point is inside or on the boundary of the box.
    #[inline]
    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Checks if this box overlaps with another one; touching boxes intersect.
    #[inline]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Creates a box enclosing both this box and another one.
    #[inline]
    pub fn merge(&self, other: &BoundingBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// Creates a box enclosing both this box and an additional point.
    #[inline]
    pub fn merged_with_point(&self, point: Point) -> Self {
        Self {
            min: Point::new(self.min.x.min(point.x), self.min.y.min(point.y)),
            max: Point::new(self.max.x.max(point.x), self.max.y.max(point.y)),
        }
    }
}
