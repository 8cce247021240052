// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Diagram file handling: the compressed envelope, the lossless XML tree, cell extraction and
//! body generation.

pub mod build;
pub mod codec;
pub mod extract;
pub mod xml;

pub use build::{rebuild_body, RebuiltBody};
pub use codec::{compress, decompress, CodecError, Document, PayloadEncoding};
pub use extract::{extract_graph, graph_or_empty, parse_graph};
pub use xml::{XmlError, XmlTree};
