// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ids::CellId;
use super::shape::Shape;
use super::style::Style;

/// Style used for edges this crate creates.
pub const DEFAULT_EDGE_STYLE: &str =
    "edgeStyle=orthogonalEdgeStyle;rounded=0;orthogonalLoop=1;jettySize=auto;html=1;";

/// A vertex with domain meaning: one step of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[schemars(with = "String")]
    pub id: CellId,
    pub label: String,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub subprocesses: Vec<Subprocess>,
}

impl Node {
    pub fn new(id: CellId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            shape: Shape::default(),
            x: 0.0,
            y: 0.0,
            owner: None,
            subprocesses: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_subprocesses(mut self, subprocesses: Vec<Subprocess>) -> Self {
        self.subprocesses = subprocesses;
        self
    }
}

/// Where a sub-step hangs: the owning node, or the k-th sub-step of the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParentRef {
    #[default]
    Main,
    Subprocess(usize),
}

const SUBPROCESS_PREFIX: &str = "subprocess-";

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Subprocess(index) => write!(f, "{SUBPROCESS_PREFIX}{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid parent reference {raw:?} (expected \"main\" or \"subprocess-<k>\")")]
pub struct ParseParentRefError {
    raw: String,
}

impl FromStr for ParentRef {
    type Err = ParseParentRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "main" {
            return Ok(Self::Main);
        }
        s.strip_prefix(SUBPROCESS_PREFIX)
            .and_then(|index| index.parse::<usize>().ok())
            .map(Self::Subprocess)
            .ok_or_else(|| ParseParentRefError { raw: s.to_owned() })
    }
}

impl Serialize for ParentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParentRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubprocessState {
    /// Inferred from an off-flow vertex; read-only provenance.
    Detected,
    UserAuthored,
}

/// A user-visible child of a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subprocess {
    pub name: String,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default)]
    #[schemars(with = "String")]
    pub parent: ParentRef,
    #[serde(default)]
    pub is_detected: bool,
    /// Cell id of the vertex this entry was detected from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub branch_id: Option<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub id: Option<CellId>,
}

impl Subprocess {
    pub fn new(name: impl Into<String>, parent: ParentRef) -> Self {
        Self {
            name: name.into(),
            shape: Shape::default(),
            parent,
            is_detected: false,
            branch_id: None,
            id: None,
        }
    }

    pub fn detected(
        name: impl Into<String>,
        shape: Shape,
        parent: ParentRef,
        cell: CellId,
    ) -> Self {
        Self {
            name: name.into(),
            shape,
            parent,
            is_detected: true,
            branch_id: Some(cell.clone()),
            id: Some(cell),
        }
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn state(&self) -> SubprocessState {
        if self.is_detected {
            SubprocessState::Detected
        } else {
            SubprocessState::UserAuthored
        }
    }

    /// Promotes a detected entry once the user edits it. `branch_id` stays so the vertex is
    /// not detected a second time.
    pub fn mark_edited(&mut self) {
        self.is_detected = false;
    }

    /// The document cell backing this entry, if it has one.
    pub fn cell_id(&self) -> Option<&CellId> {
        self.id.as_ref().or(self.branch_id.as_ref())
    }
}

/// Domain projection of an edge cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[schemars(with = "String")]
    pub from: CellId,
    #[schemars(with = "String")]
    pub to: CellId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub id: Option<CellId>,
    #[serde(default)]
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_arrow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_arrow: Option<String>,
    #[serde(default)]
    pub dashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_pattern: Option<String>,
}

impl Connection {
    pub fn new(from: CellId, to: CellId) -> Self {
        Self {
            from,
            to,
            id: None,
            style: String::new(),
            stroke_width: None,
            stroke_color: None,
            end_arrow: None,
            start_arrow: None,
            dashed: false,
            dash_pattern: None,
        }
    }

    /// Builds a connection from an edge cell, lifting the visual fields out of its style.
    pub fn from_edge(id: CellId, from: CellId, to: CellId, style: &str) -> Self {
        let parsed = Style::parse(style);
        Self {
            from,
            to,
            id: Some(id),
            style: style.to_owned(),
            stroke_width: parsed.get("strokeWidth").and_then(|v| v.parse().ok()),
            stroke_color: parsed.get("strokeColor").map(str::to_owned),
            end_arrow: parsed.get("endArrow").map(str::to_owned),
            start_arrow: parsed.get("startArrow").map(str::to_owned),
            dashed: parsed.flag("dashed"),
            dash_pattern: parsed.get("dashPattern").map(str::to_owned),
        }
    }

    /// Style string to write for this connection: the raw style (or the default edge style)
    /// with the explicit visual fields applied on top.
    pub fn edge_style(&self) -> String {
        let mut style = if self.style.trim().is_empty() {
            Style::parse(DEFAULT_EDGE_STYLE)
        } else {
            Style::parse(&self.style)
        };
        if let Some(width) = self.stroke_width {
            style.set("strokeWidth", width.to_string());
        }
        if let Some(color) = &self.stroke_color {
            style.set("strokeColor", color.clone());
        }
        if let Some(arrow) = &self.end_arrow {
            style.set("endArrow", arrow.clone());
        }
        if let Some(arrow) = &self.start_arrow {
            style.set("startArrow", arrow.clone());
        }
        if self.dashed {
            style.set("dashed", "1");
        }
        if let Some(pattern) = &self.dash_pattern {
            style.set("dashPattern", pattern.clone());
        }
        style.to_string()
    }
}

/// Typed node/edge view of one diagram body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GraphModel {
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

impl GraphModel {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    pub fn node(&self, id: &CellId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn contains_node(&self, id: &CellId) -> bool {
        self.node(id).is_some()
    }
}
