// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Patch engine: applies an edited form node list to an existing diagram body.
//!
//! The body is parsed into a lossless [`XmlTree`], mutated in place and serialized once. Only
//! cells in the managed scope (main-flow nodes and their branches) are touched. A patch that
//! fails structural validation is discarded and the original body is returned.

pub mod alloc;
pub mod validate;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use crate::config::EngineConfig;
use crate::format::build::{edge_element, vertex_element};
use crate::format::extract::{extract_graph, scan_cells, scan_ids, CellSite};
use crate::format::xml::{ElementId, XmlTree};
use crate::model::label::plain_text;
use crate::model::{
    Cell, CellId, CellKind, Geometry, GraphModel, Node, ParentRef, Shape, Subprocess,
    DEFAULT_EDGE_STYLE,
};
use crate::query::FlowAnalysis;

pub use alloc::IdAllocator;
pub use validate::{structural_issues, validate_body, validate_patch, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("malformed diagram body: {reason}")]
    MalformedDocument { reason: String },
    #[error("no free cell id after {probes} probes starting at {start}")]
    IdentifierExhaustion { start: u64, probes: u64 },
    #[error("patched body failed structural validation: {0}")]
    StructuralValidation(#[from] ValidationError),
}

/// Cells the form surface knows about, taken from the analysis the user was shown.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagedScope {
    main: Vec<CellId>,
    branches: BTreeMap<CellId, Vec<CellId>>,
    skipped: BTreeSet<CellId>,
    /// Branch id to the cell it hung from when the form was built.
    parents: BTreeMap<CellId, CellId>,
}

impl ManagedScope {
    pub fn new(graph: &GraphModel, analysis: &FlowAnalysis) -> Self {
        let mut parents = BTreeMap::new();
        for (main_id, branches) in analysis.branches() {
            for branch in branches {
                if let Some(parent) = crate::form::branch_parent(graph, main_id, branches, branch) {
                    parents.insert(branch.clone(), parent.clone());
                }
            }
        }
        Self {
            main: analysis.main_flow().to_vec(),
            branches: analysis.branches().clone(),
            skipped: BTreeSet::new(),
            parents,
        }
    }

    /// Ids to leave alone even when the target list mentions them.
    pub fn with_skipped(mut self, skipped: impl IntoIterator<Item = CellId>) -> Self {
        self.skipped.extend(skipped);
        self
    }

    pub fn main_flow(&self) -> &[CellId] {
        &self.main
    }

    pub fn branches_of(&self, main_id: &CellId) -> &[CellId] {
        self.branches.get(main_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &CellId) -> bool {
        self.main.contains(id) || self.branches.values().any(|b| b.contains(id))
    }

    pub fn is_skipped(&self, id: &CellId) -> bool {
        self.skipped.contains(id)
    }

    /// `None` for a branch that was reached only through its own children.
    pub fn parent_of(&self, branch: &CellId) -> Option<&CellId> {
        self.parents.get(branch)
    }
}

/// Cells touched by one patch, each list sorted by natural id order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    pub added: Vec<CellId>,
    pub removed: Vec<CellId>,
    pub updated: Vec<CellId>,
    /// Target entries left out because their cell was deleted in the document.
    pub skipped: Vec<CellId>,
}

impl PatchReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Default)]
struct ReportBuilder {
    added: HashSet<CellId>,
    removed: HashSet<CellId>,
    updated: HashSet<CellId>,
    skipped: HashSet<CellId>,
}

impl ReportBuilder {
    fn record_added(&mut self, id: CellId) {
        self.removed.remove(&id);
        self.updated.remove(&id);
        self.added.insert(id);
    }

    fn record_removed(&mut self, id: CellId) {
        if self.added.remove(&id) {
            return;
        }
        self.updated.remove(&id);
        self.removed.insert(id);
    }

    fn record_updated(&mut self, id: CellId) {
        if self.added.contains(&id) || self.removed.contains(&id) {
            return;
        }
        self.updated.insert(id);
    }

    fn record_skipped(&mut self, id: CellId) {
        self.skipped.insert(id);
    }

    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    fn finish(self) -> PatchReport {
        PatchReport {
            added: sorted(self.added),
            removed: sorted(self.removed),
            updated: sorted(self.updated),
            skipped: sorted(self.skipped),
        }
    }
}

fn sorted(ids: HashSet<CellId>) -> Vec<CellId> {
    let mut ids: Vec<CellId> = ids.into_iter().collect();
    ids.sort_by(|a, b| a.cmp_natural(b));
    ids
}

/// Result of [`Patcher::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    /// The patched body, or the original when nothing changed or the patch was discarded.
    pub body: String,
    pub report: PatchReport,
    /// The target nodes with every assigned cell id filled in. Applying these again to
    /// `body` changes nothing.
    pub nodes: Vec<Node>,
    /// Why the original body was returned, when a patch had to be discarded.
    pub recovered: Option<PatchError>,
}

impl PatchOutcome {
    pub fn changed(&self) -> bool {
        self.recovered.is_none() && !self.report.is_empty()
    }

    fn unchanged(body: &str, nodes: &[Node], recovered: Option<PatchError>) -> Self {
        Self {
            body: body.to_owned(),
            report: PatchReport::default(),
            nodes: nodes.to_vec(),
            recovered,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Patcher<'c> {
    config: &'c EngineConfig,
}

include!("patch_impl.rs");

#[cfg(test)]
mod tests;
