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

//! # Spatial Proximity Index
//!
//! A uniform hash grid answering "everything within `radius` of `point`" queries.
//!
//! The index is cheap to rebuild, so transient per-tick data (messages) simply
//! gets a fresh index every tick. Queries are exact: a candidate is returned if and
//! only if its distance from the query point is at most the radius. Results come
//! back in a deterministic order (cell scan order, then insertion order inside a
//! cell), which keeps the simulation reproducible even though the grid itself is
//! a hash map.

use std::collections::HashMap;

use crate::math::Point;

/// The default edge length of a grid cell.
pub const DEFAULT_CELL_SIZE: f64 = 1.0;

type CellKey = (i64, i64);

/// A radius-queryable collection of values keyed by position.
#[derive(Debug, Clone)]
pub struct SpatialIndex<T> {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<(Point, T)>>,
    len: usize,
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

impl<T> SpatialIndex<T> {
    /// Creates an empty index with the given cell edge length.
    ///
    /// Non-positive or non-finite sizes fall back to [`DEFAULT_CELL_SIZE`].
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            log::warn!(
                "[SpatialIndex] invalid cell size {cell_size}, using {DEFAULT_CELL_SIZE}"
            );
            DEFAULT_CELL_SIZE
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            len: 0,
        }
    }

    /// Builds an index from `(point, value)` pairs.
    pub fn build(cell_size: f64, items: impl IntoIterator<Item = (Point, T)>) -> Self {
        let mut index = Self::new(cell_size);
        for (p, v) in items {
            index.insert(p, v);
        }
        index
    }

    /// The edge length of the grid cells.
    #[inline]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `value` at `point`.
    pub fn insert(&mut self, point: Point, value: T) {
        let key = self.key(point);
        self.cells.entry(key).or_default().push((point, value));
        self.len += 1;
    }

    /// All the values stored within `radius` of `point`, paired with their position.
    pub fn query_with_points(&self, point: Point, radius: f64) -> Vec<(Point, &T)> {
        if radius.is_nan() || radius < 0.0 || self.is_empty() {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        let (min_x, min_y) = self.key(Point::new(point.x - radius, point.y - radius));
        let (max_x, max_y) = self.key(Point::new(point.x + radius, point.y + radius));
        let mut found = Vec::new();
        let scanned_cells = max_x
            .saturating_sub(min_x)
            .saturating_add(1)
            .saturating_mul(max_y.saturating_sub(min_y).saturating_add(1));
        if !radius.is_finite() || scanned_cells as usize > self.cells.len() {
            // Huge radius: walking the occupied cells is cheaper than the grid scan.
            let mut keys: Vec<&CellKey> = self.cells.keys().collect();
            keys.sort_unstable();
            for key in keys {
                found.extend(
                    self.cells[key]
                        .iter()
                        .filter(|(p, _)| (*p - point).length_squared() <= radius_sq)
                        .map(|(p, v)| (*p, v)),
                );
            }
            return found;
        }
        for cx in min_x..=max_x {
            for cy in min_y..=max_y {
                let Some(cell) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                found.extend(
                    cell.iter()
                        .filter(|(p, _)| (*p - point).length_squared() <= radius_sq)
                        .map(|(p, v)| (*p, v)),
                );
            }
        }
        found
    }

    /// All the values stored within `radius` of `point`.
    pub fn query(&self, point: Point, radius: f64) -> Vec<&T> {
        self.query_with_points(point, radius)
            .into_iter()
            .map(|(_, v)| v)
            .collect()
    }

    fn key(&self, point: Point) -> CellKey {
        (
            (point.x / self.cell_size).floor() as i64,
            (point.y / self.cell_size).floor() as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_returns_exactly_points_in_radius() {
        let mut index = SpatialIndex::new(0.7);
        let mut expected = Vec::new();
        let center = Point::new(0.3, -1.2);
        let radius = 2.1;
        let mut id = 0;
        for i in -10..10 {
            for j in -10..10 {
                let p = Point::new(i as f64 * 0.37, j as f64 * 0.41);
                index.insert(p, id);
                if p.distance(center) <= radius {
                    expected.push(id);
                }
                id += 1;
            }
        }
        let mut found: Vec<i32> = index.query(center, radius).into_iter().copied().collect();
        found.sort_unstable();
        assert_eq!(found, expected);
        assert_eq!(index.len(), 400);
    }

    #[test]
    fn test_negative_coordinates_and_cell_boundaries() {
        let mut index = SpatialIndex::new(1.0);
        index.insert(Point::new(-0.0001, 0.0), "left");
        index.insert(Point::new(0.0001, 0.0), "right");
        let found = index.query(Point::ZERO, 0.001);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_build_indexes_every_item() {
        let index = SpatialIndex::build(
            0.5,
            vec![
                (Point::new(3.0, 0.0), 'a'),
                (Point::new(1.0, 0.0), 'b'),
                (Point::new(-2.0, 0.0), 'c'),
            ],
        );
        assert_eq!(index.len(), 3);
        assert_eq!(index.query(Point::ZERO, 1.5), vec![&'b']);
        assert!(index.query(Point::ZERO, 0.5).is_empty());
    }

    #[test]
    fn test_invalid_cell_size_falls_back() {
        let index: SpatialIndex<u8> = SpatialIndex::new(-3.0);
        assert_eq!(index.cell_size(), DEFAULT_CELL_SIZE);
        let index: SpatialIndex<u8> = SpatialIndex::new(f64::NAN);
        assert_eq!(index.cell_size(), DEFAULT_CELL_SIZE);
    }
}
