// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Flowform: keeps a compressed draw.io process diagram and a structured step form in sync.
//!
//! A document is decoded ([`format::codec`]), its cells extracted into a [`model::GraphModel`]
//! ([`format::extract`]), and the graph split into a main flow with branches
//! ([`query::flow`]). The form surface edits [`model::Node`] lists ([`form`]); saving patches
//! the original body in place ([`ops`]) so everything the form does not manage survives.

pub mod config;
pub mod engine;
pub mod form;
pub mod format;
pub mod model;
pub mod ops;
pub mod query;
pub mod store;

pub use config::EngineConfig;
pub use engine::{LoadedDiagram, RebuildOutcome, SaveOutcome, SaveRequest, SyncEngine, SyncError};
