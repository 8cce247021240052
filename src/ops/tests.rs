// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::{fixture, rstest};

use crate::config::{EngineConfig, IdConfig};
use crate::form::{build_form, remove_subprocess, EditSession, FormState};
use crate::format::extract::parse_graph;
use crate::model::{CellId, Node, ParentRef, Shape, Subprocess};
use crate::query::FlowAnalysis;

use super::{ManagedScope, PatchError, PatchOutcome, Patcher, ValidationError};

const BASE: &str = r#"<mxGraphModel dx="1200" dy="800" grid="1">
  <root>
    <mxCell id="0" />
    <mxCell id="1" parent="0" />
    <mxCell id="2" value="Start" style="ellipse;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="40" y="40" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="3" value="Review" style="rounded=0;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="220" y="40" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="4" value="Approve" style="rounded=0;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="400" y="40" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="5" value="Ship" style="rounded=0;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="580" y="40" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="6" value="Done" style="ellipse;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="760" y="40" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="7" style="edgeStyle=orthogonalEdgeStyle;" edge="1" parent="1" source="2" target="3">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
    <mxCell id="8" style="edgeStyle=orthogonalEdgeStyle;" edge="1" parent="1" source="3" target="4">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
    <mxCell id="9" style="edgeStyle=orthogonalEdgeStyle;" edge="1" parent="1" source="4" target="5">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
    <mxCell id="10" style="edgeStyle=orthogonalEdgeStyle;" edge="1" parent="1" source="5" target="6">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
    <mxCell id="11" value="ok" style="edgeLabel;html=1;" vertex="1" connectable="0" parent="9">
      <mxGeometry x="-0.2" relative="1" as="geometry" />
    </mxCell>
    <mxCell id="14" value="Legend" style="text;html=1;" vertex="1" parent="1">
      <mxGeometry x="40" y="400" width="80" height="30" as="geometry" />
    </mxCell>
  </root>
</mxGraphModel>"#;

const CHECK_BRANCH: &str = r#"    <mxCell id="12" value="Check" style="rhombus;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="220" y="150" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="13" style="edgeStyle=orthogonalEdgeStyle;" edge="1" parent="1" source="3" target="12">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
  </root>"#;

const LOG_BRANCH: &str = r#"    <mxCell id="15" value="Log" vertex="1" parent="1">
      <mxGeometry x="220" y="260" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="16" edge="1" parent="1" source="12" target="15">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
  </root>"#;

/// A side path that only rejoins the main flow: no edge leads into it.
const SIDE_PATH: &str = r#"    <mxCell id="20" value="Side" vertex="1" parent="1">
      <mxGeometry x="400" y="150" width="120" height="60" as="geometry" />
    </mxCell>
    <mxCell id="21" edge="1" parent="1" source="20" target="4">
      <mxGeometry relative="1" as="geometry" />
    </mxCell>
  </root>"#;

fn id(raw: &str) -> CellId {
    CellId::new(raw).expect("cell id")
}

fn ids(raw: &[&str]) -> Vec<CellId> {
    raw.iter().map(|r| id(r)).collect()
}

#[fixture]
fn config() -> EngineConfig {
    EngineConfig::default()
}

/// The node list the form would show for `body` with no saved form state.
fn form_nodes(body: &str) -> Vec<Node> {
    form_nodes_with(body, &FormState::default())
}

fn form_nodes_with(body: &str, state: &FormState) -> Vec<Node> {
    let graph = parse_graph(body).expect("parse");
    let analysis = FlowAnalysis::analyze(&graph);
    build_form(&graph, &analysis, state, &EditSession::new())
}

fn scope_of(body: &str) -> ManagedScope {
    let graph = parse_graph(body).expect("parse");
    ManagedScope::new(&graph, &FlowAnalysis::analyze(&graph))
}

fn has_edge(body: &str, from: &CellId, to: &CellId) -> bool {
    parse_graph(body)
        .expect("parse")
        .connections
        .iter()
        .any(|c| &c.from == from && &c.to == to)
}

fn changed_lines(before: &str, after: &str) -> usize {
    before
        .lines()
        .zip(after.lines())
        .filter(|(a, b)| a != b)
        .count()
}

fn with_check_branch() -> String {
    BASE.replace("  </root>", CHECK_BRANCH)
}

/// Review -> Check -> Log, both detected from edges.
fn with_log_branch() -> String {
    with_check_branch().replace("  </root>", LOG_BRANCH)
}

fn add_edge_line(body: &str, edge: &str, from: &str, to: &str) -> String {
    let cell = format!(
        r#"<mxCell id="{edge}" edge="1" parent="1" source="{from}" target="{to}" />"#
    );
    body.replace("  </root>", &format!("    {cell}\n  </root>"))
}

fn node_mut<'n>(nodes: &'n mut [Node], raw: &str) -> &'n mut Node {
    nodes
        .iter_mut()
        .find(|n| n.id.as_str() == raw)
        .expect("node in form")
}

fn node<'n>(nodes: &'n [Node], raw: &str) -> &'n Node {
    nodes
        .iter()
        .find(|n| n.id.as_str() == raw)
        .expect("node in form")
}

fn assert_reapply_is_noop(patcher: &Patcher<'_>, outcome: &PatchOutcome) {
    let again = patcher.apply(&outcome.body, &outcome.nodes);
    assert_eq!(again.body, outcome.body);
    assert!(again.report.is_empty(), "unexpected changes: {:?}", again.report);
    assert!(!again.changed());
}

#[rstest]
fn unchanged_form_returns_body_byte_for_byte(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let outcome = patcher.apply(BASE, &form_nodes(BASE));
    assert_eq!(outcome.body, BASE);
    assert!(outcome.report.is_empty());
    assert_eq!(outcome.recovered, None);
    assert!(!outcome.changed());
}

#[rstest]
fn label_edit_touches_only_the_label(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    node_mut(&mut nodes, "3").label = "Review & sign".to_owned();

    let outcome = patcher.apply(BASE, &nodes);
    assert_eq!(
        outcome.body,
        BASE.replace(r#"value="Review""#, r#"value="Review &amp; sign""#)
    );
    assert_eq!(outcome.report.updated, ids(&["3"]));
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn shape_and_owner_edits_rewrite_one_start_tag(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    let node = node_mut(&mut nodes, "4");
    node.shape = Shape::Rhombus;
    node.owner = Some("qa-team".to_owned());

    let outcome = patcher.apply(BASE, &nodes);
    assert_eq!(changed_lines(BASE, &outcome.body), 1);
    assert_eq!(BASE.lines().count(), outcome.body.lines().count());

    let graph = parse_graph(&outcome.body).expect("parse");
    let approve = graph.node(&id("4")).expect("node 4");
    assert_eq!(approve.shape, Shape::Rhombus);
    assert_eq!(approve.owner.as_deref(), Some("qa-team"));
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn new_subprocesses_get_vertices_and_parent_edges(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    node_mut(&mut nodes, "3").subprocesses = vec![
        Subprocess::new("Collect docs", ParentRef::Main),
        Subprocess::new("Scan", ParentRef::Subprocess(0)).with_shape(Shape::Document),
    ];

    let outcome = patcher.apply(BASE, &nodes);
    assert!(outcome.changed());
    assert_eq!(outcome.report.added, ids(&["10000", "10001", "20000", "20001"]));

    let subs = &node(&outcome.nodes, "3").subprocesses;
    assert_eq!(subs[0].id, Some(id("10000")));
    assert_eq!(subs[1].id, Some(id("10001")));
    assert!(has_edge(&outcome.body, &id("3"), &id("10000")));
    assert!(has_edge(&outcome.body, &id("10000"), &id("10001")));

    let graph = parse_graph(&outcome.body).expect("parse");
    let analysis = FlowAnalysis::analyze(&graph);
    assert_eq!(analysis.main_flow(), ids(&["2", "3", "4", "5", "6"]).as_slice());
    assert_eq!(analysis.branches_of(&id("3")), ids(&["10000", "10001"]).as_slice());
    assert_eq!(graph.node(&id("10001")).map(|n| n.shape), Some(Shape::Document));
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn positional_parents_survive_three_saves(config: EngineConfig) {
    let patcher = Patcher::new(&config);

    let mut nodes = form_nodes(BASE);
    node_mut(&mut nodes, "3").subprocesses = vec![Subprocess::new("A", ParentRef::Main)];
    let first = patcher.apply(BASE, &nodes);

    let mut nodes = first.nodes.clone();
    node_mut(&mut nodes, "3")
        .subprocesses
        .push(Subprocess::new("B", ParentRef::Subprocess(0)));
    let second = patcher.apply(&first.body, &nodes);

    let mut nodes = second.nodes.clone();
    let subs = &mut node_mut(&mut nodes, "3").subprocesses;
    subs.insert(0, Subprocess::new("C", ParentRef::Main));
    subs[2].parent = ParentRef::Subprocess(1);
    let third = patcher.apply(&second.body, &nodes);

    let subs = &node(&third.nodes, "3").subprocesses;
    let a = subs[1].id.clone().expect("A id");
    let b = subs[2].id.clone().expect("B id");
    let c = subs[0].id.clone().expect("C id");
    assert!(has_edge(&third.body, &id("3"), &a));
    assert!(has_edge(&third.body, &a, &b));
    assert!(has_edge(&third.body, &id("3"), &c));
    assert!(!has_edge(&third.body, &c, &b));

    let state = FormState::new(third.nodes.clone());
    let reloaded = form_nodes_with(&third.body, &state);
    let parents: Vec<(String, String)> = node(&reloaded, "3")
        .subprocesses
        .iter()
        .map(|s| (s.name.clone(), s.parent.to_string()))
        .collect();
    assert_eq!(
        parents,
        vec![
            ("C".to_owned(), "main".to_owned()),
            ("A".to_owned(), "main".to_owned()),
            ("B".to_owned(), "subprocess-1".to_owned()),
        ]
    );
    assert_reapply_is_noop(&patcher, &third);
}

#[rstest]
fn reparenting_replaces_the_old_parent_edge(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    node_mut(&mut nodes, "3").subprocesses = vec![
        Subprocess::new("A", ParentRef::Main),
        Subprocess::new("B", ParentRef::Subprocess(0)),
    ];
    let saved = patcher.apply(BASE, &nodes);

    let mut nodes = saved.nodes.clone();
    node_mut(&mut nodes, "3").subprocesses[1].parent = ParentRef::Main;
    let moved = patcher.apply(&saved.body, &nodes);

    let (a, b) = (id("10000"), id("10001"));
    assert!(!has_edge(&moved.body, &a, &b));
    assert!(has_edge(&moved.body, &id("3"), &a));
    assert!(has_edge(&moved.body, &id("3"), &b));
    assert_eq!(moved.report.removed, ids(&["20001"]));
    assert_reapply_is_noop(&patcher, &moved);
}

#[rstest]
fn removing_a_subprocess_cascades_to_its_edges(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    node_mut(&mut nodes, "3").subprocesses = vec![
        Subprocess::new("A", ParentRef::Main),
        Subprocess::new("B", ParentRef::Subprocess(0)),
    ];
    let saved = patcher.apply(BASE, &nodes);

    let mut nodes = saved.nodes.clone();
    let removed = remove_subprocess(&mut node_mut(&mut nodes, "3").subprocesses, 0);
    assert_eq!(removed.map(|s| s.name), Some("A".to_owned()));
    let pruned = patcher.apply(&saved.body, &nodes);

    assert!(!pruned.body.contains(r#"id="10000""#));
    assert!(has_edge(&pruned.body, &id("3"), &id("10001")));
    assert_eq!(pruned.report.removed, ids(&["10000", "20000", "20001"]));
    assert_eq!(pruned.report.added.len(), 1);
    assert_reapply_is_noop(&patcher, &pruned);
}

#[rstest]
fn deleting_a_main_step_bridges_its_neighbours(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let nodes: Vec<Node> = form_nodes(BASE)
        .into_iter()
        .filter(|n| n.id.as_str() != "4")
        .collect();

    let outcome = patcher.apply(BASE, &nodes);
    assert_eq!(outcome.report.removed, ids(&["4", "8", "9", "11"]));
    assert_eq!(outcome.report.added, ids(&["20000"]));
    assert!(has_edge(&outcome.body, &id("3"), &id("5")));
    assert!(outcome.body.contains(r#"value="Legend""#));

    let analysis = FlowAnalysis::analyze(&parse_graph(&outcome.body).expect("parse"));
    assert_eq!(analysis.main_flow(), ids(&["2", "3", "5", "6"]).as_slice());
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn new_main_step_is_spliced_between_neighbours(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    nodes.insert(2, Node::new(id("draft-1"), "Legal check"));

    let outcome = patcher.apply(BASE, &nodes);
    let created = outcome.nodes[2].id.clone();
    assert_eq!(created, id("10000"));
    assert!(!has_edge(&outcome.body, &id("3"), &id("4")));
    assert!(has_edge(&outcome.body, &id("3"), &created));
    assert!(has_edge(&outcome.body, &created, &id("4")));

    let graph = parse_graph(&outcome.body).expect("parse");
    let inserted = graph.node(&created).expect("inserted node");
    assert_eq!((inserted.x, inserted.y), (400.0, 40.0));
    let analysis = FlowAnalysis::analyze(&graph);
    assert_eq!(
        analysis.main_flow(),
        ids(&["2", "3", "10000", "4", "5", "6"]).as_slice()
    );
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn detected_subprocesses_are_left_alone(config: EngineConfig) {
    let body = with_log_branch();
    let patcher = Patcher::new(&config);
    let nodes = form_nodes(&body);
    let subs = &node(&nodes, "3").subprocesses;
    assert_eq!(subs.len(), 2);
    assert!(subs.iter().all(|s| s.is_detected));
    assert_eq!(subs[1].parent, ParentRef::Subprocess(0));

    let unchanged = patcher.apply(&body, &nodes);
    assert_eq!(unchanged.body, body);

    let mut nodes = nodes;
    node_mut(&mut nodes, "3")
        .subprocesses
        .push(Subprocess::new("Escalate", ParentRef::Subprocess(0)));
    let outcome = patcher.apply(&body, &nodes);
    assert_eq!(outcome.report.added, ids(&["10000", "20000"]));
    assert!(has_edge(&outcome.body, &id("3"), &id("12")));
    assert!(has_edge(&outcome.body, &id("12"), &id("15")));
    assert!(has_edge(&outcome.body, &id("12"), &id("10000")));
    assert!(outcome.body.contains(CHECK_BRANCH.lines().next().expect("line")));
}

#[rstest]
fn reparenting_a_detected_subprocess_moves_its_edge(config: EngineConfig) {
    let body = with_log_branch();
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(&body);
    node_mut(&mut nodes, "3").subprocesses[1].parent = ParentRef::Main;

    let outcome = patcher.apply(&body, &nodes);
    assert!(has_edge(&outcome.body, &id("3"), &id("15")));
    assert!(!has_edge(&outcome.body, &id("12"), &id("15")));
    assert!(has_edge(&outcome.body, &id("3"), &id("12")));
    assert_eq!(outcome.report.removed, ids(&["16"]));
    assert_eq!(outcome.report.added.len(), 1);

    let log = &node(&outcome.nodes, "3").subprocesses[1];
    assert_eq!(log.id, Some(id("15")));
    assert!(!log.is_detected);

    let reloaded = form_nodes(&outcome.body);
    let parents: Vec<ParentRef> = node(&reloaded, "3")
        .subprocesses
        .iter()
        .map(|s| s.parent)
        .collect();
    assert_eq!(parents, vec![ParentRef::Main, ParentRef::Main]);
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn renaming_a_side_path_adds_no_edges(config: EngineConfig) {
    let body = BASE.replace("  </root>", SIDE_PATH);
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(&body);
    let side = &mut node_mut(&mut nodes, "3").subprocesses[0];
    assert_eq!((side.name.as_str(), side.parent), ("Side", ParentRef::Main));
    side.name = "Side check".to_owned();

    let outcome = patcher.apply(&body, &nodes);
    assert_eq!(outcome.report.updated, ids(&["20"]));
    assert!(outcome.report.added.is_empty());
    assert!(outcome.report.removed.is_empty());
    assert!(!has_edge(&outcome.body, &id("3"), &id("20")));
    assert_eq!(changed_lines(&body, &outcome.body), 1);
    assert_reapply_is_noop(&patcher, &outcome);
}

#[rstest]
fn edges_added_in_the_latest_document_survive_subprocess_edits(config: EngineConfig) {
    let base = with_log_branch();
    let latest = add_edge_line(&add_edge_line(&base, "30", "5", "12"), "31", "4", "15");
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(&base);
    let subs = &mut node_mut(&mut nodes, "3").subprocesses;
    subs[0].name = "Check twice".to_owned();
    subs[1].parent = ParentRef::Main;

    let outcome = patcher.apply_scoped(&latest, &nodes, &scope_of(&base));
    assert_eq!(outcome.recovered, None);
    assert!(has_edge(&outcome.body, &id("5"), &id("12")));
    assert!(has_edge(&outcome.body, &id("4"), &id("15")));
    assert!(has_edge(&outcome.body, &id("3"), &id("15")));
    assert!(!has_edge(&outcome.body, &id("12"), &id("15")));
    assert_eq!(outcome.report.removed, ids(&["16"]));
    assert_eq!(outcome.report.updated, ids(&["12"]));
}

#[rstest]
fn patch_that_breaks_structure_returns_the_original_body(config: EngineConfig) {
    // A note nested inside Approve goes with it, leaving its outside edge dangling.
    let nested = r#"<mxGeometry x="400" y="40" width="120" height="60" as="geometry" />
      <mxCell id="40" value="Note" style="text;html=1;" vertex="1" parent="1" />"#;
    let body = BASE.replacen(
        r#"<mxGeometry x="400" y="40" width="120" height="60" as="geometry" />"#,
        nested,
        1,
    );
    let body = add_edge_line(&body, "41", "40", "14");
    let patcher = Patcher::new(&config);
    let nodes: Vec<Node> = form_nodes(&body)
        .into_iter()
        .filter(|n| n.id.as_str() != "4")
        .collect();

    let outcome = patcher.apply(&body, &nodes);
    assert_eq!(outcome.body, body);
    assert_eq!(outcome.nodes, nodes);
    assert!(!outcome.changed());
    assert_eq!(
        outcome.recovered,
        Some(PatchError::StructuralValidation(
            ValidationError::DanglingEndpoint {
                edge: "41".to_owned(),
                endpoint: "40".to_owned(),
            }
        ))
    );
}

#[rstest]
fn steps_deleted_in_the_latest_document_are_skipped(config: EngineConfig) {
    let patcher = Patcher::new(&config);
    let without_approve: Vec<Node> = form_nodes(BASE)
        .into_iter()
        .filter(|n| n.id.as_str() != "4")
        .collect();
    let latest = patcher.apply(BASE, &without_approve).body;

    let mut stale = form_nodes(BASE);
    node_mut(&mut stale, "2").label = "Kickoff".to_owned();
    let scope = scope_of(BASE).with_skipped([id("4")]);
    let outcome = patcher.apply_scoped(&latest, &stale, &scope);

    assert_eq!(outcome.report.skipped, ids(&["4"]));
    assert_eq!(outcome.report.updated, ids(&["2"]));
    assert!(outcome.report.added.is_empty());
    assert!(!outcome.body.contains(r#"value="Approve""#));
    assert!(outcome.nodes.iter().all(|n| n.id.as_str() != "4"));
}

#[rstest]
#[case::empty("")]
#[case::unclosed("<mxGraphModel><root>")]
#[case::no_root("<mxGraphModel/>")]
fn malformed_bodies_are_returned_unchanged(config: EngineConfig, #[case] body: &str) {
    let patcher = Patcher::new(&config);
    let nodes = vec![Node::new(id("2"), "Start")];
    let outcome = patcher.apply(body, &nodes);
    assert_eq!(outcome.body, body);
    assert_eq!(outcome.nodes, nodes);
    assert!(matches!(
        outcome.recovered,
        Some(PatchError::MalformedDocument { .. })
    ));
}

#[test]
fn exhausted_id_space_returns_the_original_body() {
    let config = EngineConfig {
        ids: IdConfig {
            subprocess_floor: 0,
            offset: 0,
            max_probes: 1,
            ..IdConfig::default()
        },
        ..EngineConfig::default()
    };
    let patcher = Patcher::new(&config);
    let mut nodes = form_nodes(BASE);
    node_mut(&mut nodes, "3").subprocesses = vec![Subprocess::new("A", ParentRef::Main)];

    let outcome = patcher.apply(BASE, &nodes);
    assert_eq!(outcome.body, BASE);
    assert_eq!(
        outcome.recovered,
        Some(PatchError::IdentifierExhaustion { start: 14, probes: 1 })
    );
}
