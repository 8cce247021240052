// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Generates a complete diagram body from a [`GraphModel`].
//!
//! Used when there is no prior document to patch. The output always carries the root cell `0`
//! and the default layer `1`; everything else is laid out from the model positions or, when a
//! node has none, on a single row.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use super::xml::{NewElement, XmlTree};
use crate::config::EngineConfig;
use crate::model::{
    CellId, Connection, Geometry, GraphModel, ParentRef, Subprocess, DEFAULT_EDGE_STYLE,
};
use crate::ops::{validate_body, IdAllocator, PatchError};

const GRAPH_MODEL_SKELETON: &str = concat!(
    r#"<mxGraphModel dx="1200" dy="800" grid="1" gridSize="10" guides="1" tooltips="1" "#,
    r#"connect="1" arrows="1" fold="1" page="1" pageScale="1" pageWidth="1169" "#,
    r#"pageHeight="827" math="0" shadow="0">"#,
    "\n  <root>\n    <mxCell id=\"0\"/>\n    <mxCell id=\"1\" parent=\"0\"/>\n",
    "  </root>\n</mxGraphModel>"
);

const ROOT_CELL: &str = "0";
const LAYER_CELL: &str = "1";

/// `mxCell` element for a vertex with its geometry child.
pub fn vertex_element(
    id: &CellId,
    label: &str,
    style: &str,
    owner: Option<&str>,
    layer: &CellId,
    geometry: &Geometry,
) -> NewElement {
    let mut cell = NewElement::new("mxCell")
        .attr("id", id.as_str())
        .attr("value", label)
        .attr("style", style)
        .attr("vertex", "1")
        .attr("parent", layer.as_str());
    if let Some(owner) = owner.filter(|o| !o.trim().is_empty()) {
        cell = cell.attr("owner", owner);
    }
    cell.child(
        NewElement::new("mxGeometry")
            .attr("x", geometry.x.to_string())
            .attr("y", geometry.y.to_string())
            .attr("width", geometry.width.to_string())
            .attr("height", geometry.height.to_string())
            .attr("as", "geometry"),
    )
}

/// `mxCell` element for an edge with a relative geometry child.
pub fn edge_element(
    id: &CellId,
    style: &str,
    layer: &CellId,
    source: &CellId,
    target: &CellId,
) -> NewElement {
    NewElement::new("mxCell")
        .attr("id", id.as_str())
        .attr("style", style)
        .attr("edge", "1")
        .attr("parent", layer.as_str())
        .attr("source", source.as_str())
        .attr("target", target.as_str())
        .child(
            NewElement::new("mxGeometry")
                .attr("relative", "1")
                .attr("as", "geometry"),
        )
}

/// A generated body and the model with every id it was written under.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuiltBody {
    pub body: String,
    pub graph: GraphModel,
}

/// Claims the ids the model already carries; duplicates and the reserved root/layer ids are
/// left for the allocator.
fn claim_ids(graph: &GraphModel) -> HashSet<String> {
    let mut claimed: HashSet<String> = HashSet::from([ROOT_CELL.to_owned(), LAYER_CELL.to_owned()]);
    let mut keep = |id: &CellId| {
        claimed.insert(id.as_str().to_owned());
    };
    for node in &graph.nodes {
        keep(&node.id);
        for sub in &node.subprocesses {
            if let Some(cell) = sub.cell_id() {
                keep(cell);
            }
        }
    }
    for connection in &graph.connections {
        if let Some(id) = &connection.id {
            keep(id);
        }
    }
    claimed
}

struct IdSlots {
    alloc: IdAllocator,
    taken: HashSet<String>,
}

impl IdSlots {
    /// `requested` when it is free and not reserved, otherwise a fresh vertex id.
    fn vertex(&mut self, requested: Option<&CellId>) -> Result<CellId, PatchError> {
        match requested {
            Some(id) if self.claim(id) => Ok(id.clone()),
            _ => self.alloc.next_vertex(),
        }
    }

    fn edge(&mut self, requested: Option<&CellId>) -> Result<CellId, PatchError> {
        match requested {
            Some(id) if self.claim(id) => Ok(id.clone()),
            _ => self.alloc.next_edge(),
        }
    }

    fn claim(&mut self, id: &CellId) -> bool {
        let raw = id.as_str();
        raw != ROOT_CELL && raw != LAYER_CELL && self.taken.insert(raw.to_owned())
    }
}

/// Rows below the owner: one for a direct child, one more per ancestor sub-step.
fn branch_depth(subs: &[Subprocess], index: usize) -> f64 {
    let mut depth = 1.0;
    let mut cursor = subs[index].parent;
    let mut hops = 0;
    while let ParentRef::Subprocess(k) = cursor {
        hops += 1;
        if k >= subs.len() || hops > subs.len() {
            break;
        }
        depth += 1.0;
        cursor = subs[k].parent;
    }
    depth
}

/// Builds a fresh body for `graph`.
///
/// Node ids are kept when they are unique; a duplicate or reserved id is replaced and
/// connections follow the first node that carried it. Connections to unknown nodes are dropped.
#[instrument(skip_all, fields(nodes = graph.nodes.len(), connections = graph.connections.len()))]
pub fn rebuild_body(graph: &GraphModel, config: &EngineConfig) -> Result<RebuiltBody, PatchError> {
    let mut tree =
        XmlTree::parse(GRAPH_MODEL_SKELETON).map_err(|err| PatchError::MalformedDocument {
            reason: err.to_string(),
        })?;
    let root = tree
        .find_first("root")
        .ok_or_else(|| PatchError::MalformedDocument {
            reason: "missing <root> element".to_owned(),
        })?;
    let layer = CellId::from_number(1);
    let layout = &config.layout;

    let mut slots = IdSlots {
        alloc: IdAllocator::new(claim_ids(graph), &config.ids),
        taken: HashSet::new(),
    };
    let mut remap: HashMap<CellId, CellId> = HashMap::new();
    let mut out = GraphModel::default();

    for (index, node) in graph.nodes.iter().enumerate() {
        let id = slots.vertex(Some(&node.id))?;
        if id != node.id {
            debug!(requested = %node.id, cell_id = %id, "reassigned node id");
        }
        remap.entry(node.id.clone()).or_insert_with(|| id.clone());

        let (x, y) = if node.x != 0.0 || node.y != 0.0 {
            (node.x, node.y)
        } else {
            (layout.origin_x + index as f64 * layout.main_spacing, layout.origin_y)
        };
        let geometry = Geometry {
            x,
            y,
            width: layout.vertex_width,
            height: layout.vertex_height,
        };
        let style = node.shape.vertex_style();
        let owner = node.owner.as_deref();
        tree.append_element(
            root,
            &vertex_element(&id, &node.label, &style, owner, &layer, &geometry),
        );

        let mut built = node.clone();
        built.id = id.clone();
        built.x = x;
        built.y = y;

        let mut sub_ids: Vec<CellId> = Vec::with_capacity(node.subprocesses.len());
        let mut subs = node.subprocesses.clone();
        crate::form::normalize_parents(&mut subs);
        let depths: Vec<f64> = (0..subs.len()).map(|k| branch_depth(&subs, k)).collect();
        for ((position, sub), depth) in subs.iter_mut().enumerate().zip(depths) {
            let cell = slots.vertex(sub.cell_id())?;
            let geometry = Geometry {
                x: x + position as f64 * layout.sub_spacing,
                y: y + depth * layout.sub_offset_y,
                width: layout.vertex_width,
                height: layout.vertex_height,
            };
            let style = sub.shape.vertex_style();
            tree.append_element(
                root,
                &vertex_element(&cell, &sub.name, &style, None, &layer, &geometry),
            );
            sub.id = Some(cell.clone());
            sub.is_detected = false;
            sub_ids.push(cell);
        }

        for (position, sub) in subs.iter().enumerate() {
            let parent = match sub.parent {
                ParentRef::Main => id.clone(),
                ParentRef::Subprocess(k) => sub_ids[k].clone(),
            };
            let edge = slots.edge(None)?;
            tree.append_element(
                root,
                &edge_element(&edge, DEFAULT_EDGE_STYLE, &layer, &parent, &sub_ids[position]),
            );
        }

        built.subprocesses = subs;
        out.nodes.push(built);
    }

    for connection in &graph.connections {
        let (Some(from), Some(to)) = (remap.get(&connection.from), remap.get(&connection.to)) else {
            warn!(
                from = %connection.from,
                to = %connection.to,
                "dropping connection to unknown node"
            );
            continue;
        };
        let id = slots.edge(connection.id.as_ref())?;
        let style = connection.edge_style();
        tree.append_element(root, &edge_element(&id, &style, &layer, from, to));
        out.connections.push(Connection {
            from: from.clone(),
            to: to.clone(),
            id: Some(id),
            style,
            ..connection.clone()
        });
    }

    let body = tree.to_xml_string();
    validate_body(&body)?;
    Ok(RebuiltBody { body, graph: out })
}
