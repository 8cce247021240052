// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Graph extraction: cells out of an [`XmlTree`], and the node/connection projection.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::xml::{ElementId, XmlError, XmlTree};
use crate::model::{label, Cell, CellId, CellKind, Connection, Geometry, GraphModel, Node, Shape};

pub const CELL_TAG: &str = "mxCell";
pub const GEOMETRY_TAG: &str = "mxGeometry";

/// Elements that carry id/label/custom attributes around an inner `mxCell`.
pub fn is_wrapper(name: &str) -> bool {
    name.eq_ignore_ascii_case("UserObject") || name.eq_ignore_ascii_case("object")
}

/// A cell together with the elements that hold it in the tree.
#[derive(Debug, Clone)]
pub struct CellSite {
    pub cell: Cell,
    /// The `mxCell` element.
    pub element: ElementId,
    pub wrapper: Option<ElementId>,
}

impl CellSite {
    /// The element to remove when the cell is deleted.
    pub fn outer(&self) -> ElementId {
        self.wrapper.unwrap_or(self.element)
    }

    /// The element holding the label: the wrapper's `label`, or the cell's `value`.
    pub fn label_slot(&self) -> (ElementId, &'static str) {
        match self.wrapper {
            Some(wrapper) => (wrapper, "label"),
            None => (self.element, "value"),
        }
    }
}

/// Every `mxCell` in document order, with the effective id and label resolved.
///
/// A wrapper's `id` and `label` win over the inner cell's `id` and `value`; the inner values
/// are the fallback. Cells without any id are skipped.
pub fn scan_cells(tree: &XmlTree) -> Vec<CellSite> {
    let mut sites = Vec::new();
    for element in tree.elements() {
        if tree.name(element) != CELL_TAG {
            continue;
        }
        let wrapper = tree
            .parent(element)
            .filter(|&parent| is_wrapper(tree.name(parent)));

        let raw_id = wrapper
            .and_then(|w| tree.attr(w, "id"))
            .or_else(|| tree.attr(element, "id"));
        let Some(id) = raw_id.and_then(|raw| CellId::new(raw.into_owned()).ok()) else {
            debug!(element = ?element, "skipping cell without a usable id");
            continue;
        };

        let label = wrapper
            .and_then(|w| tree.attr(w, "label"))
            .or_else(|| tree.attr(element, "value"))
            .map(|v| v.into_owned())
            .unwrap_or_default();
        let owner = wrapper
            .and_then(|w| tree.attr(w, "owner"))
            .or_else(|| tree.attr(element, "owner"))
            .map(|v| v.into_owned())
            .filter(|v| !v.trim().is_empty());
        let parent = tree
            .attr(element, "parent")
            .and_then(|raw| CellId::new(raw.into_owned()).ok());
        let style = tree
            .attr(element, "style")
            .map(|v| v.into_owned())
            .unwrap_or_default();
        let cell_ref = |key: &str| {
            tree.attr(element, key)
                .and_then(|raw| CellId::new(raw.into_owned()).ok())
        };

        let kind = if flag(tree, element, "vertex") {
            CellKind::Vertex {
                label,
                owner,
                geometry: read_geometry(tree, element),
            }
        } else if flag(tree, element, "edge") {
            CellKind::Edge {
                source: cell_ref("source"),
                target: cell_ref("target"),
                label,
            }
        } else {
            CellKind::Structural
        };

        sites.push(CellSite {
            cell: Cell::new(id, parent, style, kind),
            element,
            wrapper,
        });
    }
    sites
}

fn flag(tree: &XmlTree, element: ElementId, key: &str) -> bool {
    tree.attr(element, key).as_deref() == Some("1")
}

fn read_geometry(tree: &XmlTree, element: ElementId) -> Geometry {
    let Some(geometry) = tree.first_child_named(element, GEOMETRY_TAG) else {
        return Geometry::default();
    };
    let number = |key: &str| {
        tree.attr(geometry, key)
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    Geometry {
        x: number("x"),
        y: number("y"),
        width: number("width"),
        height: number("height"),
    }
}

/// Every `id` attribute in the tree, wrappers and structural cells included.
pub fn scan_ids(tree: &XmlTree) -> Vec<String> {
    tree.elements()
        .into_iter()
        .filter_map(|element| tree.attr(element, "id").map(|id| id.into_owned()))
        .collect()
}

/// Projects cells onto nodes and connections.
///
/// Vertices parented to an edge are edge labels, not nodes. Edges without both endpoints, or
/// with an endpoint that is not a node, are not connections.
pub fn graph_from_cells(sites: &[CellSite]) -> GraphModel {
    let edge_ids: HashSet<&CellId> = sites
        .iter()
        .filter(|site| site.cell.is_edge())
        .map(|site| site.cell.id())
        .collect();

    let mut nodes = Vec::new();
    for site in sites {
        let cell = &site.cell;
        let CellKind::Vertex {
            label: raw_label,
            owner,
            geometry,
        } = cell.kind()
        else {
            continue;
        };
        if cell.parent().is_some_and(|parent| edge_ids.contains(parent)) {
            continue;
        }

        let matched = Shape::classify(&cell.parsed_style());
        if let Some(token) = &matched.unknown_token {
            debug!(cell_id = %cell.id(), token = %token, "unknown shape token; using rectangle");
        }
        nodes.push(Node {
            id: cell.id().clone(),
            label: label::plain_text(raw_label),
            shape: matched.shape,
            x: geometry.x,
            y: geometry.y,
            owner: owner.clone(),
            subprocesses: Vec::new(),
        });
    }

    let node_ids: HashSet<&CellId> = nodes.iter().map(|node| &node.id).collect();
    let connections = sites
        .iter()
        .filter_map(|site| {
            let (source, target) = site.cell.endpoints()?;
            if !node_ids.contains(source) || !node_ids.contains(target) {
                debug!(cell_id = %site.cell.id(), "edge endpoint is not a node; skipping");
                return None;
            }
            Some(Connection::from_edge(
                site.cell.id().clone(),
                source.clone(),
                target.clone(),
                site.cell.style(),
            ))
        })
        .collect();

    GraphModel { nodes, connections }
}

pub fn extract_graph(tree: &XmlTree) -> GraphModel {
    graph_from_cells(&scan_cells(tree))
}

/// Parses a body and extracts its graph. An empty body is an empty graph.
pub fn parse_graph(body: &str) -> Result<GraphModel, XmlError> {
    if body.trim().is_empty() {
        return Ok(GraphModel::default());
    }
    XmlTree::parse(body).map(|tree| extract_graph(&tree))
}

/// Like [`parse_graph`], but a malformed body yields an empty graph.
pub fn graph_or_empty(body: &str) -> GraphModel {
    parse_graph(body).unwrap_or_else(|err| {
        warn!(error = %err, "malformed diagram body; using an empty graph");
        GraphModel::default()
    })
}
