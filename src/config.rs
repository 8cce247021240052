// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it overrides:
//!
//! ```json
//! { "ids": { "subprocess_floor": 50000 }, "codec": { "compression_level": 9 } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::format::codec::DEFAULT_COMPRESSION_LEVEL;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ids: IdConfig,
    pub layout: LayoutConfig,
    pub analysis: AnalysisConfig,
    pub codec: CodecConfig,
}

/// Identifier allocation ranges for generated cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    /// Lowest id handed to a generated vertex.
    pub subprocess_floor: u64,
    /// Distance kept between the highest existing numeric id and the first generated one.
    pub offset: u64,
    /// Distance between the vertex range and the edge range of one save.
    pub edge_range_gap: u64,
    /// Collision retries before the allocator gives up.
    pub max_probes: u64,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            subprocess_floor: 10_000,
            offset: 100,
            edge_range_gap: 10_000,
            max_probes: 100_000,
        }
    }
}

/// Placement of generated vertices. Not a layout engine: new cells only need a sensible
/// starting position that the visual editor can adjust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub origin_x: f64,
    pub origin_y: f64,
    pub vertex_width: f64,
    pub vertex_height: f64,
    /// Horizontal distance between consecutive main steps.
    pub main_spacing: f64,
    /// Vertical distance between a node and its first row of sub-steps.
    pub sub_offset_y: f64,
    /// Horizontal distance between sibling sub-steps.
    pub sub_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            origin_x: 40.0,
            origin_y: 40.0,
            vertex_width: 120.0,
            vertex_height: 60.0,
            main_spacing: 180.0,
            sub_offset_y: 110.0,
            sub_spacing: 140.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// DFS expansions allowed while searching for the main flow.
    pub max_path_steps: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_path_steps: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Raw deflate level, 0 to 9.
    pub compression_level: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "ids": { "subprocess_floor": 50000 } }"#).unwrap();
        assert_eq!(config.ids.subprocess_floor, 50_000);
        assert_eq!(config.ids.offset, 100);
        assert_eq!(config.ids.edge_range_gap, 10_000);
        assert_eq!(config.codec.compression_level, 6);
        assert_eq!(config.analysis.max_path_steps, 1_000_000);
    }

    #[test]
    fn empty_object_is_the_default() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
