// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Form-surface view of a diagram: main steps with merged sub-step lists.
//!
//! A node's displayed sub-steps are the detected ones (branch vertices found by the flow
//! analysis) followed by the user-authored ones from the saved [`FormState`]. Detected entries
//! already represented in the user list are dropped, as are entries the user deleted during the
//! current [`EditSession`].

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::label::name_key;
use crate::model::{CellId, GraphModel, Node, ParentRef, Subprocess};
use crate::query::FlowAnalysis;

/// Last saved form nodes, persisted next to the document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub nodes: Vec<Node>,
}

impl FormState {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn subprocesses_of(&self, node_id: &CellId) -> &[Subprocess] {
        self.nodes
            .iter()
            .find(|node| &node.id == node_id)
            .map(|node| node.subprocesses.as_slice())
            .unwrap_or(&[])
    }
}

/// User-initiated sub-step deletions for one load session, by node and normalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSession {
    deleted: BTreeMap<CellId, BTreeSet<String>>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deletion(&mut self, node_id: &CellId, name: &str) {
        self.deleted
            .entry(node_id.clone())
            .or_default()
            .insert(name_key(name));
    }

    pub fn is_deleted(&self, node_id: &CellId, name: &str) -> bool {
        self.deleted
            .get(node_id)
            .is_some_and(|names| names.contains(&name_key(name)))
    }

    /// Removes the sub-step at `index` from `node` and remembers its name.
    pub fn delete_subprocess(&mut self, node: &mut Node, index: usize) -> Option<Subprocess> {
        let removed = remove_subprocess(&mut node.subprocesses, index)?;
        self.record_deletion(&node.id, &removed.name);
        Some(removed)
    }

    /// Forgets recorded deletions, e.g. after a reload.
    pub fn clear(&mut self) {
        self.deleted.clear();
    }
}

/// Removes one entry and rewrites the positional parents of the rest: children of the removed
/// entry inherit its parent, later indices shift down by one.
pub fn remove_subprocess(subs: &mut Vec<Subprocess>, index: usize) -> Option<Subprocess> {
    if index >= subs.len() {
        return None;
    }
    let removed = subs.remove(index);
    for sub in subs.iter_mut() {
        sub.parent = match sub.parent {
            ParentRef::Subprocess(k) if k == index => match removed.parent {
                ParentRef::Subprocess(p) if p > index => ParentRef::Subprocess(p - 1),
                other => other,
            },
            ParentRef::Subprocess(k) if k > index => ParentRef::Subprocess(k - 1),
            other => other,
        };
    }
    normalize_parents(subs);
    Some(removed)
}

/// Rewrites parents that are out of range, self-referential, or part of a parent cycle to
/// [`ParentRef::Main`].
pub fn normalize_parents(subs: &mut [Subprocess]) {
    let len = subs.len();
    for index in 0..len {
        match subs[index].parent {
            ParentRef::Main => continue,
            ParentRef::Subprocess(k) if k >= len || k == index => {
                warn!(index, parent = %subs[index].parent, "invalid sub-step parent; using main");
                subs[index].parent = ParentRef::Main;
                continue;
            }
            ParentRef::Subprocess(_) => {}
        }

        let mut seen = vec![false; len];
        seen[index] = true;
        let mut cursor = subs[index].parent;
        while let ParentRef::Subprocess(k) = cursor {
            if k >= len {
                break;
            }
            if seen[k] {
                warn!(index, parent = %subs[index].parent, "cyclic sub-step parent; using main");
                subs[index].parent = ParentRef::Main;
                break;
            }
            seen[k] = true;
            cursor = subs[k].parent;
        }
    }
}

/// The cell a branch node hangs from: its main-flow node when that links to it directly, else
/// the first sibling branch that does. `None` for a branch reached only through its children.
pub fn branch_parent<'g>(
    graph: &'g GraphModel,
    main_id: &CellId,
    siblings: &[CellId],
    branch_id: &CellId,
) -> Option<&'g CellId> {
    let mut sibling = None;
    for connection in graph.connections.iter().filter(|c| &c.to == branch_id) {
        if &connection.from == main_id {
            return Some(&connection.from);
        }
        if sibling.is_none() && &connection.from != branch_id && siblings.contains(&connection.from)
        {
            sibling = Some(&connection.from);
        }
    }
    sibling
}

/// Detected sub-steps for one main-flow node, in branch order.
///
/// A branch hanging directly off `main_id` gets `main`; one hanging off another branch of the
/// same node points at that branch's position. A branch with no parent edge is shown as `main`.
pub fn detected_subprocesses(
    graph: &GraphModel,
    analysis: &FlowAnalysis,
    main_id: &CellId,
) -> Vec<Subprocess> {
    let branches = analysis.branches_of(main_id);
    let mut detected: Vec<Subprocess> = branches
        .iter()
        .filter_map(|branch_id| {
            let node = graph.node(branch_id)?;
            let parent = match branch_parent(graph, main_id, branches, branch_id) {
                Some(from) if from != main_id => branches
                    .iter()
                    .position(|b| b == from)
                    .map_or(ParentRef::Main, ParentRef::Subprocess),
                _ => ParentRef::Main,
            };
            Some(Subprocess::detected(
                node.label.clone(),
                node.shape,
                parent,
                branch_id.clone(),
            ))
        })
        .collect();
    normalize_parents(&mut detected);
    detected
}

enum DetectedFate {
    Kept(usize),
    Represented(usize),
    Dropped,
}

/// Merges detected and user-authored sub-steps into the displayed list.
///
/// Detected entries already represented in `user` (same normalized name, same `branchId`, or
/// same cell id) or deleted this session are dropped; the rest are prepended. User parent
/// indices shift past the prepended entries. A kept detected entry whose parent was dropped
/// points at the representing user entry, or at the dropped entry's own parent.
pub fn merge_subprocesses(
    detected: Vec<Subprocess>,
    user: Vec<Subprocess>,
    is_deleted: impl Fn(&str) -> bool,
) -> Vec<Subprocess> {
    let represented_by = |candidate: &Subprocess| {
        let key = name_key(&candidate.name);
        let cell = candidate.cell_id();
        user.iter().position(|u| {
            name_key(&u.name) == key
                || (cell.is_some() && (u.branch_id.as_ref() == cell || u.id.as_ref() == cell))
        })
    };

    let mut fates = Vec::with_capacity(detected.len());
    let mut kept = 0usize;
    for sub in &detected {
        if let Some(user_index) = represented_by(sub) {
            fates.push(DetectedFate::Represented(user_index));
        } else if is_deleted(&sub.name) {
            fates.push(DetectedFate::Dropped);
        } else {
            fates.push(DetectedFate::Kept(kept));
            kept += 1;
        }
    }
    let prepended = kept;

    let resolve = |start: ParentRef| -> ParentRef {
        let mut cursor = start;
        for _ in 0..=detected.len() {
            let ParentRef::Subprocess(k) = cursor else {
                return ParentRef::Main;
            };
            match fates.get(k) {
                Some(DetectedFate::Kept(pos)) => return ParentRef::Subprocess(*pos),
                Some(DetectedFate::Represented(u)) => {
                    return ParentRef::Subprocess(prepended + u)
                }
                Some(DetectedFate::Dropped) => cursor = detected[k].parent,
                None => return ParentRef::Main,
            }
        }
        ParentRef::Main
    };

    let mut merged: Vec<Subprocess> = Vec::with_capacity(prepended + user.len());
    for (sub, fate) in detected.iter().zip(&fates) {
        if let DetectedFate::Kept(_) = fate {
            let mut entry = sub.clone();
            entry.parent = resolve(sub.parent);
            merged.push(entry);
        }
    }
    for sub in &user {
        let mut entry = sub.clone();
        if let ParentRef::Subprocess(k) = entry.parent {
            entry.parent = ParentRef::Subprocess(k + prepended);
        }
        merged.push(entry);
    }

    normalize_parents(&mut merged);
    merged
}

/// The merged node list the form surface shows: one entry per main-flow node.
pub fn build_form(
    graph: &GraphModel,
    analysis: &FlowAnalysis,
    state: &FormState,
    session: &EditSession,
) -> Vec<Node> {
    analysis
        .main_flow()
        .iter()
        .filter_map(|main_id| {
            let mut node = graph.node(main_id)?.clone();
            let detected = detected_subprocesses(graph, analysis, main_id);
            let user = state.subprocesses_of(main_id).to_vec();
            node.subprocesses =
                merge_subprocesses(detected, user, |name| session.is_deleted(main_id, name));
            Some(node)
        })
        .collect()
}
