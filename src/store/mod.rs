// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence for documents on disk.
//!
//! The engine itself only handles whole-document strings; this module is the file-backed
//! store the CLI uses.

pub mod document_folder;

pub use document_folder::{parse_document_id, DocumentFolder, StoreError, WriteDurability};
