// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Main-flow inference.
//!
//! The main flow is the longest simple path from an in-degree-0 node to an out-degree-0 node.
//! Equally long candidates are ordered by their node-id sequences under
//! [`Id::cmp_natural`](crate::model::Id::cmp_natural) and the smallest wins, so the result does
//! not depend on edge order. Every other node is a branch attached to one main-flow node.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};

use schemars::JsonSchema;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, instrument, warn};

use crate::config::AnalysisConfig;
use crate::model::{CellId, GraphModel, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowNodeDegree {
    pub in_degree: u64,
    pub out_degree: u64,
}

/// In/out degree per node, counting each distinct `from → to` pair once.
pub fn degrees(graph: &GraphModel) -> BTreeMap<CellId, FlowNodeDegree> {
    let adjacency = Adjacency::build(graph);
    graph
        .nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            (
                node.id.clone(),
                FlowNodeDegree {
                    in_degree: adjacency.parents[idx].len() as u64,
                    out_degree: adjacency.children[idx].len() as u64,
                },
            )
        })
        .collect()
}

type Neighbors = SmallVec<[usize; 4]>;

/// Index-based adjacency over `graph.nodes`, neighbors in connection order.
struct Adjacency<'a> {
    ids: Vec<&'a CellId>,
    children: Vec<Neighbors>,
    parents: Vec<Neighbors>,
}

impl<'a> Adjacency<'a> {
    fn build(graph: &'a GraphModel) -> Self {
        let ids: Vec<&CellId> = graph.nodes.iter().map(|node| &node.id).collect();
        let index: HashMap<&CellId, usize> =
            ids.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

        let mut children = vec![Neighbors::new(); ids.len()];
        let mut parents = vec![Neighbors::new(); ids.len()];
        for connection in &graph.connections {
            let (Some(&from), Some(&to)) = (index.get(&connection.from), index.get(&connection.to))
            else {
                continue;
            };
            if !children[from].contains(&to) {
                children[from].push(to);
                parents[to].push(from);
            }
        }

        Self {
            ids,
            children,
            parents,
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn cmp_paths(&self, a: &[usize], b: &[usize]) -> Ordering {
        for (&x, &y) in a.iter().zip(b) {
            match self.ids[x].cmp_natural(self.ids[y]) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        a.len().cmp(&b.len())
    }
}

struct PathSearch<'g, 'a> {
    graph: &'g Adjacency<'a>,
    on_path: Vec<bool>,
    path: Vec<usize>,
    best: Vec<usize>,
    steps: u64,
    budget: u64,
    exhausted: bool,
}

impl<'g, 'a> PathSearch<'g, 'a> {
    fn new(graph: &'g Adjacency<'a>, budget: u64) -> Self {
        Self {
            graph,
            on_path: vec![false; graph.len()],
            path: Vec::new(),
            best: Vec::new(),
            steps: 0,
            budget,
            exhausted: false,
        }
    }

    fn visit(&mut self, node: usize) {
        if self.exhausted {
            return;
        }
        self.steps += 1;
        if self.steps > self.budget {
            self.exhausted = true;
            return;
        }

        self.path.push(node);
        self.on_path[node] = true;

        let graph = self.graph;
        if graph.children[node].is_empty() {
            self.consider();
        } else {
            for &child in &graph.children[node] {
                if !self.on_path[child] {
                    self.visit(child);
                }
            }
        }

        self.on_path[node] = false;
        self.path.pop();
    }

    fn consider(&mut self) {
        let better = match self.path.len().cmp(&self.best.len()) {
            Ordering::Greater => true,
            Ordering::Equal => self.graph.cmp_paths(&self.path, &self.best) == Ordering::Less,
            Ordering::Less => false,
        };
        if better {
            self.best.clone_from(&self.path);
        }
    }
}

/// Kahn order over all nodes. When every remaining node has a parent (a cycle), the first
/// remaining node in document order with the fewest remaining parents is forced next.
fn kahn_order(graph: &Adjacency<'_>) -> Vec<usize> {
    let mut remaining_in: Vec<usize> = graph.parents.iter().map(|p| p.len()).collect();
    let mut placed = vec![false; graph.len()];
    let mut queue: VecDeque<usize> = (0..graph.len()).filter(|&i| remaining_in[i] == 0).collect();
    let mut order = Vec::with_capacity(graph.len());

    while order.len() < graph.len() {
        let next = match queue.pop_front() {
            Some(next) if placed[next] => continue,
            Some(next) => next,
            None => {
                let Some(forced) = (0..graph.len())
                    .filter(|&i| !placed[i])
                    .min_by_key(|&i| (remaining_in[i], i))
                else {
                    break;
                };
                debug!(node_id = %graph.ids[forced], "cycle without entry; forcing node");
                forced
            }
        };

        placed[next] = true;
        order.push(next);
        for &child in &graph.children[next] {
            if placed[child] {
                continue;
            }
            remaining_in[child] = remaining_in[child].saturating_sub(1);
            if remaining_in[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    order
}

/// Result of main-flow inference over one [`GraphModel`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowAnalysis {
    main_flow: Vec<CellId>,
    branches: BTreeMap<CellId, Vec<CellId>>,
    branch_owner: HashMap<CellId, CellId>,
    orphans: Vec<CellId>,
}

impl FlowAnalysis {
    pub fn analyze(graph: &GraphModel) -> Self {
        Self::analyze_with(graph, &AnalysisConfig::default())
    }

    #[instrument(
        skip_all,
        fields(nodes = graph.nodes.len(), connections = graph.connections.len())
    )]
    pub fn analyze_with(graph: &GraphModel, config: &AnalysisConfig) -> Self {
        let adjacency = Adjacency::build(graph);
        let has_edges = adjacency.children.iter().any(|c| !c.is_empty());
        if !has_edges {
            return Self {
                main_flow: graph.nodes.iter().map(|node| node.id.clone()).collect(),
                ..Self::default()
            };
        }

        let main = longest_path(&adjacency, config.max_path_steps);
        let main = if main.is_empty() {
            debug!("no start-to-end path; falling back to topological order");
            kahn_order(&adjacency)
        } else {
            main
        };

        let mut position: Vec<Option<usize>> = vec![None; adjacency.len()];
        for (pos, &node) in main.iter().enumerate() {
            position[node] = Some(pos);
        }

        let mut analysis = Self {
            main_flow: main.iter().map(|&i| adjacency.ids[i].clone()).collect(),
            ..Self::default()
        };

        for branch in (0..adjacency.len()).filter(|&i| position[i].is_none()) {
            let mut visited = vec![false; adjacency.len()];
            visited[branch] = true;
            match resolve_main_ancestor(&adjacency, &main, &position, branch, &mut visited) {
                Some(owner) => {
                    let owner_id = adjacency.ids[owner].clone();
                    let branch_id = adjacency.ids[branch].clone();
                    analysis
                        .branches
                        .entry(owner_id.clone())
                        .or_default()
                        .push(branch_id.clone());
                    analysis.branch_owner.insert(branch_id, owner_id);
                }
                None => {
                    let node_id = &adjacency.ids[branch];
                    warn!(node_id = %node_id, "branch node has no main-flow ancestor; dropping");
                    analysis.orphans.push(adjacency.ids[branch].clone());
                }
            }
        }

        analysis
    }

    pub fn main_flow(&self) -> &[CellId] {
        &self.main_flow
    }

    pub fn branches(&self) -> &BTreeMap<CellId, Vec<CellId>> {
        &self.branches
    }

    pub fn branches_of(&self, main_id: &CellId) -> &[CellId] {
        self.branches.get(main_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Branch nodes with no resolvable main-flow ancestor.
    pub fn orphans(&self) -> &[CellId] {
        &self.orphans
    }

    pub fn is_on_main_flow(&self, id: &CellId) -> bool {
        self.main_flow.contains(id)
    }

    pub fn main_node_of(&self, branch: &CellId) -> Option<&CellId> {
        self.branch_owner.get(branch)
    }

    /// Main-flow ids followed by every attached branch id.
    pub fn managed_ids(&self) -> impl Iterator<Item = &CellId> {
        self.main_flow
            .iter()
            .chain(self.branches.values().flatten())
    }

    pub fn view(&self, graph: &GraphModel) -> FlowView {
        let lookup = |id: &CellId| graph.node(id).cloned();
        FlowView {
            main_flow: self.main_flow.iter().filter_map(lookup).collect(),
            branches_by_main_node: self
                .branches
                .iter()
                .map(|(main, branches)| {
                    (main.clone(), branches.iter().filter_map(lookup).collect())
                })
                .collect(),
        }
    }
}

fn longest_path(adjacency: &Adjacency<'_>, budget: u64) -> Vec<usize> {
    let mut search = PathSearch::new(adjacency, budget);
    for start in (0..adjacency.len()).filter(|&i| adjacency.parents[i].is_empty()) {
        search.visit(start);
        if search.exhausted {
            warn!(
                budget,
                best_len = search.best.len(),
                "main-flow search budget exhausted; using the best path found so far"
            );
            break;
        }
    }
    search.best
}

fn resolve_main_ancestor(
    graph: &Adjacency<'_>,
    main: &[usize],
    position: &[Option<usize>],
    node: usize,
    visited: &mut [bool],
) -> Option<usize> {
    if let Some(&parent) = graph.parents[node].iter().find(|&&p| position[p].is_some()) {
        return Some(parent);
    }

    for &parent in &graph.parents[node] {
        if visited[parent] {
            continue;
        }
        visited[parent] = true;
        if let Some(found) = resolve_main_ancestor(graph, main, position, parent, visited) {
            return Some(found);
        }
    }

    graph.children[node].iter().find_map(|&child| {
        position[child].map(|pos| if pos == 0 { main[0] } else { main[pos - 1] })
    })
}

/// Serializable form of a [`FlowAnalysis`] for the form surface.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowView {
    pub main_flow: Vec<Node>,
    #[schemars(with = "BTreeMap<String, Vec<Node>>")]
    pub branches_by_main_node: BTreeMap<CellId, Vec<Node>>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{degrees, FlowAnalysis};
    use crate::config::AnalysisConfig;
    use crate::model::{CellId, Connection, GraphModel, Node};

    fn id(raw: &str) -> CellId {
        CellId::new(raw).expect("cell id")
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> GraphModel {
        GraphModel {
            nodes: nodes.iter().map(|n| Node::new(id(n), n.to_uppercase())).collect(),
            connections: edges
                .iter()
                .map(|(from, to)| Connection::new(id(from), id(to)))
                .collect(),
        }
    }

    fn ids(values: &[CellId]) -> Vec<&str> {
        values.iter().map(CellId::as_str).collect()
    }

    #[test]
    fn linear_chain_is_the_main_flow() {
        let analysis = FlowAnalysis::analyze(&graph(&["1", "2", "3"], &[("1", "2"), ("2", "3")]));
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3"]);
        assert!(analysis.branches().is_empty());
    }

    #[test]
    fn one_hop_branch_attaches_to_its_parent() {
        let analysis = FlowAnalysis::analyze(&graph(
            &["1", "2", "3", "6"],
            &[("1", "2"), ("2", "3"), ("2", "6")],
        ));
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3"]);
        assert_eq!(ids(analysis.branches_of(&id("2"))), vec!["6"]);
        assert_eq!(analysis.branches().len(), 1);
        assert_eq!(analysis.main_node_of(&id("6")), Some(&id("2")));
    }

    #[test]
    fn empty_connections_keep_document_order() {
        let analysis = FlowAnalysis::analyze(&graph(&["b", "a", "c"], &[]));
        assert_eq!(ids(analysis.main_flow()), vec!["b", "a", "c"]);
        assert!(analysis.branches().is_empty());
    }

    #[test]
    fn equal_length_paths_break_ties_by_natural_id_order() {
        // 10→11 and 2→3 are both two nodes long; "2" sorts before "10" numerically.
        let forward = graph(&["10", "11", "2", "3"], &[("10", "11"), ("2", "3")]);
        let reversed = graph(&["10", "11", "2", "3"], &[("2", "3"), ("10", "11")]);
        let a = FlowAnalysis::analyze(&forward);
        let b = FlowAnalysis::analyze(&reversed);
        assert_eq!(ids(a.main_flow()), vec!["2", "3"]);
        assert_eq!(a.main_flow(), b.main_flow());
    }

    #[test]
    fn deep_branch_recurses_through_branch_parents() {
        let analysis = FlowAnalysis::analyze(&graph(
            &["1", "2", "3", "4", "5", "6"],
            &[("1", "2"), ("2", "3"), ("3", "4"), ("2", "5"), ("5", "6")],
        ));
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3", "4"]);
        assert_eq!(ids(analysis.branches_of(&id("2"))), vec!["5", "6"]);
    }

    #[test]
    fn remerging_branch_attaches_before_the_merge_point() {
        // 9 has no parent but feeds 3; it belongs under 3's predecessor.
        let analysis = FlowAnalysis::analyze(&graph(
            &["1", "2", "3", "4", "9"],
            &[("1", "2"), ("2", "3"), ("3", "4"), ("9", "3")],
        ));
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3", "4"]);
        assert_eq!(ids(analysis.branches_of(&id("2"))), vec!["9"]);
    }

    #[test]
    fn upstream_entry_extends_the_main_flow() {
        let analysis = FlowAnalysis::analyze(&graph(
            &["1", "2", "3", "8"],
            &[("1", "2"), ("2", "3"), ("8", "1"), ("0", "1")],
        ));
        // 8→1→2→3 is the longest path, so 8 is on the main flow.
        assert_eq!(ids(analysis.main_flow()), vec!["8", "1", "2", "3"]);
    }

    #[test]
    fn disconnected_cycle_is_orphaned_not_fatal() {
        let analysis = FlowAnalysis::analyze(&graph(
            &["1", "2", "3", "x", "y"],
            &[("1", "2"), ("2", "3"), ("x", "y"), ("y", "x")],
        ));
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3"]);
        assert_eq!(ids(analysis.orphans()), vec!["x", "y"]);
        assert!(analysis.branches().is_empty());
    }

    #[test]
    fn pure_cycle_falls_back_to_topological_order() {
        let analysis = FlowAnalysis::analyze(&graph(
            &["1", "2", "3"],
            &[("1", "2"), ("2", "3"), ("3", "1")],
        ));
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3"]);
        assert!(analysis.orphans().is_empty());
    }

    #[test]
    fn exhausted_budget_keeps_best_path_so_far() {
        let g = graph(&["1", "2", "3", "4"], &[("1", "2"), ("1", "3"), ("3", "4")]);
        let analysis = FlowAnalysis::analyze_with(&g, &AnalysisConfig { max_path_steps: 2 });
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2"]);
        assert_eq!(ids(analysis.branches_of(&id("1"))), vec!["3", "4"]);
    }

    #[test]
    fn exhausted_budget_without_a_path_falls_back_to_topological_order() {
        let g = graph(&["1", "2", "3", "4"], &[("1", "2"), ("2", "3"), ("3", "4")]);
        let analysis = FlowAnalysis::analyze_with(&g, &AnalysisConfig { max_path_steps: 2 });
        assert_eq!(ids(analysis.main_flow()), vec!["1", "2", "3", "4"]);
    }

    #[rstest]
    #[case(&[("1", "2"), ("2", "3"), ("1", "3")], &["1", "2", "3"])]
    #[case(&[("a", "b"), ("b", "d"), ("a", "c"), ("c", "d")], &["a", "b", "d"])]
    #[case(&[("a", "c"), ("c", "d"), ("a", "b"), ("b", "d")], &["a", "b", "d"])]
    fn longest_path_is_deterministic(#[case] edges: &[(&str, &str)], #[case] expected: &[&str]) {
        let mut unique: Vec<&str> = Vec::new();
        for n in edges.iter().flat_map(|(a, b)| [*a, *b]) {
            if !unique.contains(&n) {
                unique.push(n);
            }
        }
        let g = graph(&unique, edges);
        for _ in 0..3 {
            assert_eq!(ids(FlowAnalysis::analyze(&g).main_flow()), expected);
        }
    }

    #[test]
    fn degrees_count_distinct_pairs() {
        let g = graph(&["1", "2", "3"], &[("1", "2"), ("1", "2"), ("2", "3")]);
        let degrees = degrees(&g);
        assert_eq!(degrees[&id("1")].out_degree, 1);
        assert_eq!(degrees[&id("2")].in_degree, 1);
        assert_eq!(degrees[&id("3")].out_degree, 0);
    }

    #[test]
    fn view_serializes_nodes_by_main_node() {
        let g = graph(&["1", "2", "3", "6"], &[("1", "2"), ("2", "3"), ("2", "6")]);
        let view = FlowAnalysis::analyze(&g).view(&g);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mainFlow"][1]["id"], "2");
        assert_eq!(json["branchesByMainNode"]["2"][0]["id"], "6");
    }
}
