// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Structural checks run on every generated or patched body before it is returned.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::format::extract::{scan_cells, scan_ids};
use crate::format::xml::XmlTree;

const REQUIRED_MARKERS: [&str; 2] = ["<mxGraphModel", "<root"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationError {
    MissingMarker(&'static str),
    Reparse(String),
    DuplicateId(String),
    DanglingEndpoint { edge: String, endpoint: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMarker(marker) => write!(f, "missing {marker}> element"),
            Self::Reparse(reason) => write!(f, "body no longer parses: {reason}"),
            Self::DuplicateId(id) => write!(f, "duplicate cell id {id}"),
            Self::DanglingEndpoint { edge, endpoint } => {
                write!(f, "edge {edge} points at missing cell {endpoint}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Every structural problem in `body`, sorted.
pub fn structural_issues(body: &str) -> BTreeSet<ValidationError> {
    let mut issues = BTreeSet::new();
    for marker in REQUIRED_MARKERS {
        if !body.contains(marker) {
            issues.insert(ValidationError::MissingMarker(marker));
        }
    }

    let tree = match XmlTree::parse(body) {
        Ok(tree) => tree,
        Err(err) => {
            issues.insert(ValidationError::Reparse(err.to_string()));
            return issues;
        }
    };

    let mut seen = HashSet::new();
    for id in scan_ids(&tree) {
        if !seen.insert(id.clone()) {
            issues.insert(ValidationError::DuplicateId(id));
        }
    }

    for site in scan_cells(&tree) {
        let Some((source, target)) = site.cell.endpoints() else {
            continue;
        };
        for endpoint in [source, target] {
            if !seen.contains(endpoint.as_str()) {
                issues.insert(ValidationError::DanglingEndpoint {
                    edge: site.cell.id().to_string(),
                    endpoint: endpoint.to_string(),
                });
            }
        }
    }

    issues
}

/// Fails on the first structural problem.
pub fn validate_body(body: &str) -> Result<(), ValidationError> {
    match structural_issues(body).into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Fails on a problem in `patched` that `original` did not already have.
pub fn validate_patch(original: &str, patched: &str) -> Result<(), ValidationError> {
    let baseline = structural_issues(original);
    match structural_issues(patched)
        .into_iter()
        .find(|issue| !baseline.contains(issue))
    {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}
