// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Read-only queries over extracted graphs.
//!
//! The flow query derives the main flow and branch attachment the form surface displays.

pub mod flow;

pub use flow::{degrees, FlowAnalysis, FlowNodeDegree, FlowView};
