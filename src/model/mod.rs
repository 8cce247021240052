// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model.
//!
//! [`Cell`]s are the interchange view of one diagram body; [`GraphModel`] is the domain
//! projection the form surface edits (nodes with positional sub-steps, plus connections).

pub mod cell;
pub mod graph;
pub mod ids;
pub mod label;
pub mod shape;
pub mod style;

pub use cell::{Cell, CellKind, CellKindTag, Geometry};
pub use graph::{
    Connection, GraphModel, Node, ParentRef, ParseParentRefError, Subprocess, SubprocessState,
    DEFAULT_EDGE_STYLE,
};
pub use ids::{CellId, DocumentId, Id, IdError};
pub use shape::{Shape, ShapeMatch};
pub use style::{Style, StyleEntry};
