// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashSet;

use super::PatchError;
use crate::config::IdConfig;
use crate::model::CellId;

/// Hands out cell ids that are unused in one document.
///
/// Built from a single scan of every id in the document. Generated vertices are numbered
/// `max(subprocess_floor, max_id + offset) + n` and generated edges `vertex_base + edge_range_gap
/// + n`, where `n` counts allocations in the order they are requested. A candidate that is
/// already taken is skipped; more than `max_probes` consecutive skips is an error.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    used: HashSet<String>,
    max_id: u64,
    vertex_base: u64,
    edge_base: u64,
    next_vertex: u64,
    next_edge: u64,
    max_probes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Range {
    Vertex,
    Edge,
}

impl IdAllocator {
    pub fn new<I, S>(ids: I, config: &IdConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let used: HashSet<String> = ids.into_iter().map(Into::into).collect();
        let max_id = used
            .iter()
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let vertex_base = config
            .subprocess_floor
            .max(max_id.saturating_add(config.offset));
        let edge_base = vertex_base.saturating_add(config.edge_range_gap);

        Self {
            used,
            max_id,
            vertex_base,
            edge_base,
            next_vertex: 0,
            next_edge: 0,
            max_probes: config.max_probes,
        }
    }

    /// Highest purely numeric id seen by the scan.
    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    pub fn vertex_base(&self) -> u64 {
        self.vertex_base
    }

    pub fn edge_base(&self) -> u64 {
        self.edge_base
    }

    pub fn is_used(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Marks an id as taken. Returns `false` if it already was.
    pub fn reserve(&mut self, id: &str) -> bool {
        self.used.insert(id.to_owned())
    }

    pub fn next_vertex(&mut self) -> Result<CellId, PatchError> {
        self.draw(Range::Vertex)
    }

    pub fn next_edge(&mut self) -> Result<CellId, PatchError> {
        self.draw(Range::Edge)
    }

    fn draw(&mut self, range: Range) -> Result<CellId, PatchError> {
        let (base, counter) = match range {
            Range::Vertex => (self.vertex_base, &mut self.next_vertex),
            Range::Edge => (self.edge_base, &mut self.next_edge),
        };
        let start = base.saturating_add(*counter);
        let mut probes = 0u64;
        loop {
            let candidate = base
                .checked_add(*counter)
                .ok_or(PatchError::IdentifierExhaustion { start, probes })?;
            *counter += 1;

            let id = CellId::from_number(candidate);
            if self.used.insert(id.as_str().to_owned()) {
                return Ok(id);
            }
            probes += 1;
            if probes >= self.max_probes {
                return Err(PatchError::IdentifierExhaustion { start, probes });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdAllocator;
    use crate::config::IdConfig;
    use crate::ops::PatchError;

    #[test]
    fn bases_follow_floor_and_max_id() {
        let config = IdConfig::default();
        let small = IdAllocator::new(["0", "1", "2", "abc"], &config);
        assert_eq!(small.max_id(), 2);
        assert_eq!(small.vertex_base(), 10_000);
        assert_eq!(small.edge_base(), 20_000);

        let large = IdAllocator::new(["0", "1", "15000", "x-99999"], &config);
        assert_eq!(large.max_id(), 15_000);
        assert_eq!(large.vertex_base(), 15_100);
        assert_eq!(large.edge_base(), 25_100);
    }

    #[test]
    fn sequential_ids_skip_taken_candidates() {
        let mut alloc = IdAllocator::new(["0", "1", "10001"], &IdConfig::default());
        assert_eq!(alloc.next_vertex().unwrap().as_str(), "10000");
        assert_eq!(alloc.next_vertex().unwrap().as_str(), "10002");
        assert_eq!(alloc.next_edge().unwrap().as_str(), "20000");
        assert!(alloc.is_used("10002"));
    }

    #[test]
    fn reserved_ids_are_never_handed_out() {
        let mut alloc = IdAllocator::new(["0"], &IdConfig::default());
        assert!(alloc.reserve("10000"));
        assert!(!alloc.reserve("10000"));
        assert_eq!(alloc.next_vertex().unwrap().as_str(), "10001");
    }

    #[test]
    fn probing_is_bounded() {
        let config = IdConfig {
            max_probes: 3,
            ..IdConfig::default()
        };
        let mut alloc = IdAllocator::new(["10000", "10001", "10002", "10003"], &config);
        // max id 10003 lifts the base to 10103, so force collisions by reserving that range.
        for id in 10_103..10_110u64 {
            alloc.reserve(&id.to_string());
        }
        let err = alloc.next_vertex().unwrap_err();
        assert!(matches!(err, PatchError::IdentifierExhaustion { probes: 3, .. }));
    }
}
