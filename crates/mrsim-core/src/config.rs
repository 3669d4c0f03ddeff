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

//! Tunable kernel constants.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::math::FRAC_PI_2;

/// Immutable set of kernel constants, supplied once at kernel construction.
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use mrsim_core::Configuration;
/// let c = Configuration::from_json_str(r#"{ "nfc_channels": 8 }"#).unwrap();
/// assert_eq!(c.nfc_channels, 8);
/// assert_eq!(c.body_find_range, Configuration::default().body_find_range);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Maximum anchor distance at which an attraction force has any effect.
    pub attraction_range: f64,
    /// Multiplier of the minimum achievable anchor separation below which an
    /// attract-and-link turns into a link.
    pub attract_link_range_ratio: f64,
    /// Maximum summed anchor-to-polygon distance for the closest-anchorable search.
    pub body_find_range: f64,
    /// Maximum distance between an NFC message source and a sensor.
    pub nfc_distance_range: f64,
    /// Maximum deviation between a message direction and the direction towards a
    /// sensor for the message to be received.
    pub nfc_angle_range: f64,
    /// Number of NFC channels; valid channels are `0..nfc_channels`.
    pub nfc_channels: u16,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            attraction_range: 1.0,
            attract_link_range_ratio: 1.1,
            body_find_range: 5.0,
            nfc_distance_range: 1.5,
            nfc_angle_range: FRAC_PI_2,
            nfc_channels: 4,
        }
    }
}

impl Configuration {
    /// Parses and validates a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let configuration: Self = serde_json::from_str(json)?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Checks that every range is usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("attraction_range", self.attraction_range),
            ("attract_link_range_ratio", self.attract_link_range_ratio),
            ("body_find_range", self.body_find_range),
            ("nfc_distance_range", self.nfc_distance_range),
            ("nfc_angle_range", self.nfc_angle_range),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::NotPositive { name, value });
            }
        }
        if self.nfc_channels == 0 {
            return Err(ConfigurationError::NoChannels);
        }
        Ok(())
    }
}
