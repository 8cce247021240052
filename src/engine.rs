// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Load/save orchestration over whole document texts.
//!
//! The engine holds no state between calls: every operation receives the full document text
//! and returns a full new text.

use std::collections::BTreeSet;

use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::form::{build_form, EditSession, FormState};
use crate::format::build::rebuild_body;
use crate::format::codec::{CodecError, Document};
use crate::format::extract::graph_or_empty;
use crate::model::{CellId, Connection, GraphModel, Node};
use crate::ops::{ManagedScope, PatchError, PatchReport, Patcher};
use crate::query::{FlowAnalysis, FlowView};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl SyncError {
    pub fn is_decompression_failure(&self) -> bool {
        matches!(self, Self::Codec(err) if err.is_decompression_failure())
    }
}

/// One decoded document with its graph and flow analysis.
#[derive(Debug, Clone)]
pub struct LoadedDiagram {
    pub document: Document,
    pub graph: GraphModel,
    pub analysis: FlowAnalysis,
}

impl LoadedDiagram {
    pub fn body(&self) -> &str {
        self.document.body()
    }

    pub fn view(&self) -> FlowView {
        self.analysis.view(&self.graph)
    }

    pub fn scope(&self) -> ManagedScope {
        ManagedScope::new(&self.graph, &self.analysis)
    }
}

/// A form save: the nodes the user edited, the document they were shown, and the document as
/// it is persisted now.
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    /// The document the form was built from. `None` when the form was built from `latest_text`.
    pub base_text: Option<String>,
    pub latest_text: String,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The full document text to persist. Equal to `latest_text` when nothing changed.
    pub text: String,
    pub report: PatchReport,
    pub nodes: Vec<Node>,
    /// Set when the patch was discarded and `text` is the latest document unchanged.
    pub recovered: Option<PatchError>,
}

impl SaveOutcome {
    pub fn changed(&self) -> bool {
        self.recovered.is_none() && !self.report.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebuildOutcome {
    pub text: String,
    pub graph: GraphModel,
}

#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decodes `text` and analyzes its flow. A body that does not parse yields an empty graph;
    /// a payload that does not decompress is an error.
    #[instrument(skip_all, fields(bytes = text.len()))]
    pub fn load(&self, text: &str) -> Result<LoadedDiagram, SyncError> {
        let document = Document::parse_with_level(text, self.config.codec.compression_level)?;
        let graph = graph_or_empty(document.body());
        let analysis = FlowAnalysis::analyze_with(&graph, &self.config.analysis);
        Ok(LoadedDiagram {
            document,
            graph,
            analysis,
        })
    }

    /// Replaces `loaded` with a fresh load of `text`.
    pub fn reload(&self, loaded: &mut LoadedDiagram, text: &str) -> Result<(), SyncError> {
        *loaded = self.load(text)?;
        Ok(())
    }

    pub fn form(
        &self,
        loaded: &LoadedDiagram,
        state: &FormState,
        session: &EditSession,
    ) -> Vec<Node> {
        build_form(&loaded.graph, &loaded.analysis, state, session)
    }

    /// Applies a form save to the latest document.
    ///
    /// The managed scope comes from the base document; cells added to the latest document
    /// since then are outside it and survive, and managed cells deleted since then are skipped.
    #[instrument(
        skip_all,
        fields(nodes = request.nodes.len(), has_base = request.base_text.is_some())
    )]
    pub fn save(&self, request: &SaveRequest) -> Result<SaveOutcome, SyncError> {
        let latest = self.load(&request.latest_text)?;

        if latest.body().trim().is_empty() {
            return self.save_into_empty(&latest, &request.nodes);
        }

        let scope = match &request.base_text {
            Some(base_text) => {
                let base = self.load(base_text)?;
                let deleted: BTreeSet<CellId> = base
                    .analysis
                    .managed_ids()
                    .filter(|id| !latest.graph.contains_node(id))
                    .cloned()
                    .collect();
                if !deleted.is_empty() {
                    warn!(count = deleted.len(), "steps deleted since the form was loaded");
                }
                base.scope().with_skipped(deleted)
            }
            None => latest.scope(),
        };

        let patch = Patcher::new(&self.config).apply_scoped(latest.body(), &request.nodes, &scope);
        if let Some(err @ PatchError::IdentifierExhaustion { .. }) = &patch.recovered {
            return Err(err.clone().into());
        }

        let text = if patch.changed() {
            latest.document.with_body(&patch.body)?.to_text()
        } else {
            request.latest_text.clone()
        };
        info!(
            added = patch.report.added.len(),
            removed = patch.report.removed.len(),
            updated = patch.report.updated.len(),
            "save applied"
        );
        Ok(SaveOutcome {
            text,
            report: patch.report,
            nodes: patch.nodes,
            recovered: patch.recovered,
        })
    }

    /// A document with no body gets a generated one: the nodes in order, chained.
    fn save_into_empty(
        &self,
        latest: &LoadedDiagram,
        nodes: &[Node],
    ) -> Result<SaveOutcome, SyncError> {
        let graph = GraphModel {
            nodes: nodes.to_vec(),
            connections: nodes
                .windows(2)
                .map(|pair| Connection::new(pair[0].id.clone(), pair[1].id.clone()))
                .collect(),
        };
        let rebuilt = rebuild_body(&graph, &self.config)?;
        let document = if latest.document.has_envelope() {
            latest.document.with_body(&rebuilt.body)?
        } else {
            Document::new_compressed(&rebuilt.body, self.config.codec.compression_level)?
        };

        let mut added: Vec<CellId> = rebuilt
            .graph
            .nodes
            .iter()
            .flat_map(|node| {
                std::iter::once(node.id.clone())
                    .chain(node.subprocesses.iter().filter_map(|s| s.id.clone()))
            })
            .collect();
        added.sort_by(|a, b| a.cmp_natural(b));
        Ok(SaveOutcome {
            text: document.to_text(),
            report: PatchReport {
                added,
                ..PatchReport::default()
            },
            nodes: rebuilt.graph.nodes,
            recovered: None,
        })
    }

    /// Regenerates the whole body from `graph`, keeping the envelope of `previous_text`.
    #[instrument(skip_all, fields(nodes = graph.nodes.len()))]
    pub fn rebuild(
        &self,
        previous_text: Option<&str>,
        graph: &GraphModel,
    ) -> Result<RebuildOutcome, SyncError> {
        let rebuilt = rebuild_body(graph, &self.config)?;
        let level = self.config.codec.compression_level;
        let document = match previous_text {
            Some(previous) => {
                Document::parse_with_level(previous, level)?.with_body(&rebuilt.body)?
            }
            None => Document::new_compressed(&rebuilt.body, level)?,
        };
        Ok(RebuildOutcome {
            text: document.to_text(),
            graph: rebuilt.graph,
        })
    }
}
