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

//! # NFC Messages
//!
//! Short-range broadcast messages. A message emitted during tick `N` is sensed
//! during tick `N + 1` only: the board keeps an outbound buffer filled during the
//! current tick and a sensed buffer indexed for proximity queries, and swaps them
//! once per tick.

use mrsim_core::math::{self, Point};
use mrsim_core::spatial::SpatialIndex;
use serde::{Deserialize, Serialize};

/// An ephemeral broadcast unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NfcMessage {
    /// Where the message was emitted.
    pub source: Point,
    /// Absolute direction the message is emitted towards.
    pub direction: f64,
    /// Channel of the message.
    pub channel: u16,
    /// Payload.
    pub value: f64,
}

/// Double-buffered message store.
#[derive(Debug, Clone)]
pub struct MessageBoard {
    outbound: Vec<NfcMessage>,
    sensed: Vec<NfcMessage>,
    index: SpatialIndex<usize>,
}

impl MessageBoard {
    /// Creates an empty board whose proximity index uses `cell_size` buckets.
    pub fn new(cell_size: f64) -> Self {
        Self {
            outbound: Vec::new(),
            sensed: Vec::new(),
            index: SpatialIndex::new(cell_size),
        }
    }

    /// Starts a fresh, empty outbound buffer.
    pub fn begin_tick(&mut self) {
        self.outbound.clear();
    }

    /// Queues a message for the next tick.
    pub fn emit(&mut self, message: NfcMessage) {
        self.outbound.push(message);
    }

    /// Messages emitted so far during the current tick.
    pub fn outbound(&self) -> &[NfcMessage] {
        &self.outbound
    }

    /// Messages sensed during the current tick.
    pub fn sensed(&self) -> &[NfcMessage] {
        &self.sensed
    }

    /// Makes the outbound messages the sensed ones, rebuilds the index, and returns
    /// the messages that were sensed during the tick that just ended.
    pub fn rotate(&mut self) -> Vec<NfcMessage> {
        let visible = std::mem::replace(&mut self.sensed, std::mem::take(&mut self.outbound));
        self.index = SpatialIndex::build(
            self.index.cell_size(),
            self.sensed.iter().enumerate().map(|(i, m)| (m.source, i)),
        );
        visible
    }

    /// The strongest value on `channel` among sensed messages emitted within
    /// `distance_range` of `point` and pointing at it within `angle_range`; `0` when
    /// there is none.
    pub fn sense(&self, point: Point, channel: u16, distance_range: f64, angle_range: f64) -> f64 {
        self.index
            .query(point, distance_range)
            .into_iter()
            .filter_map(|i| self.sensed.get(*i))
            .filter(|m| m.channel == channel)
            .filter(|m| {
                let towards = point - m.source;
                towards.length() < math::EPSILON
                    || math::normalize_angle(towards.direction() - m.direction).abs()
                        <= angle_range
            })
            .map(|m| m.value)
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
            .unwrap_or(0.0)
    }
}
