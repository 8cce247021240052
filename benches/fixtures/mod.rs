// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

#![allow(dead_code)]

// Shared deterministic benchmark fixtures (no RNG).

use flowform::config::EngineConfig;
use flowform::format::build::rebuild_body;
use flowform::model::{CellId, Connection, GraphModel, Node, ParentRef, Subprocess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessParams {
    pub main_len: usize,
    /// Sub-steps per main step, chained below each other.
    pub subs_per_step: usize,
    pub label_len: usize,
}

impl ProcessParams {
    pub const fn new(main_len: usize, subs_per_step: usize, label_len: usize) -> Self {
        Self {
            main_len,
            subs_per_step,
            label_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Small,
    Medium,
    LargeLongLabels,
}

impl Case {
    pub const fn params(self) -> ProcessParams {
        match self {
            Self::Small => ProcessParams::new(8, 1, 12),
            Self::Medium => ProcessParams::new(40, 3, 16),
            Self::LargeLongLabels => ProcessParams::new(150, 4, 64),
        }
    }
}

fn cell(raw: String) -> CellId {
    CellId::new(raw).expect("valid cell id")
}

fn label(prefix: &str, index: usize, len: usize) -> String {
    let mut out = format!("{prefix} {index:04} ");
    while out.len() < len {
        out.push_str("lorem ");
    }
    out.truncate(len.max(prefix.len() + 5));
    out.trim_end().to_owned()
}

/// Main flow of `main_len` steps, each with a chain of up to `subs_per_step` sub-steps.
pub fn process(params: ProcessParams) -> GraphModel {
    let nodes: Vec<Node> = (0..params.main_len)
        .map(|i| {
            // Capped by the steps left after this one so no sub-step chain outgrows the flow.
            let depth = params.subs_per_step.min(params.main_len - 1 - i);
            let subs = (0..depth)
                .map(|k| {
                    let parent = match k {
                        0 => ParentRef::Main,
                        _ => ParentRef::Subprocess(k - 1),
                    };
                    Subprocess::new(label("sub", i * 10 + k, params.label_len), parent)
                })
                .collect();
            Node::new(cell(format!("{}", i + 2)), label("step", i, params.label_len))
                .with_subprocesses(subs)
        })
        .collect();
    let connections = nodes
        .windows(2)
        .map(|pair| Connection::new(pair[0].id.clone(), pair[1].id.clone()))
        .collect();
    GraphModel { nodes, connections }
}

pub fn fixture(case: Case) -> GraphModel {
    process(case.params())
}

/// The generated body of `fixture(case)` and its model with assigned ids.
pub fn body(case: Case) -> (String, GraphModel) {
    let rebuilt = rebuild_body(&fixture(case), &EngineConfig::default()).expect("rebuild");
    (rebuilt.body, rebuilt.graph)
}

/// Layered graph where every node links to `fanout` nodes of the next layer; the number of
/// simple paths grows as `width * fanout^(layers - 1)`.
pub fn layered(layers: usize, width: usize, fanout: usize) -> GraphModel {
    let id = |layer: usize, idx: usize| cell(format!("l{layer:02}_n{idx:03}"));
    let mut graph = GraphModel::default();
    for layer in 0..layers {
        for idx in 0..width {
            graph
                .nodes
                .push(Node::new(id(layer, idx), format!("L{layer} N{idx}")));
            if layer + 1 < layers {
                for f in 0..fanout {
                    graph
                        .connections
                        .push(Connection::new(id(layer, idx), id(layer + 1, (idx + f) % width)));
                }
            }
        }
    }
    graph
}
