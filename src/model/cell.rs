// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::ids::CellId;
use super::style::Style;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKindTag {
    Vertex,
    Edge,
    Structural,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellKind {
    Vertex {
        label: String,
        owner: Option<String>,
        geometry: Geometry,
    },
    Edge {
        source: Option<CellId>,
        target: Option<CellId>,
        label: String,
    },
    /// Root and layer cells: neither vertex nor edge.
    Structural,
}

/// One interchange cell with its effective id/label resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    id: CellId,
    parent: Option<CellId>,
    style: String,
    kind: CellKind,
}

impl Cell {
    pub fn new(
        id: CellId,
        parent: Option<CellId>,
        style: impl Into<String>,
        kind: CellKind,
    ) -> Self {
        Self {
            id,
            parent,
            style: style.into(),
            kind,
        }
    }

    pub fn id(&self) -> &CellId {
        &self.id
    }

    pub fn parent(&self) -> Option<&CellId> {
        self.parent.as_ref()
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn parsed_style(&self) -> Style {
        Style::parse(&self.style)
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    pub fn tag(&self) -> CellKindTag {
        match self.kind {
            CellKind::Vertex { .. } => CellKindTag::Vertex,
            CellKind::Edge { .. } => CellKindTag::Edge,
            CellKind::Structural => CellKindTag::Structural,
        }
    }

    pub fn is_vertex(&self) -> bool {
        self.tag() == CellKindTag::Vertex
    }

    pub fn is_edge(&self) -> bool {
        self.tag() == CellKindTag::Edge
    }

    pub fn label(&self) -> &str {
        match &self.kind {
            CellKind::Vertex { label, .. } | CellKind::Edge { label, .. } => label,
            CellKind::Structural => "",
        }
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.kind {
            CellKind::Vertex { geometry, .. } => Some(geometry),
            _ => None,
        }
    }

    /// `(source, target)` for edges with both endpoints set.
    pub fn endpoints(&self) -> Option<(&CellId, &CellId)> {
        match &self.kind {
            CellKind::Edge {
                source: Some(source),
                target: Some(target),
                ..
            } => Some((source, target)),
            _ => None,
        }
    }
}
