// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// Tree workspace and save algorithm behind `Patcher`.
/// Keeps `ops::mod` focused on the public patch types.
#[derive(Debug, Clone)]
struct EdgeRef {
    id: CellId,
    source: CellId,
    target: CellId,
}

struct Workspace<'c> {
    tree: XmlTree,
    root: ElementId,
    sites: HashMap<CellId, CellSite>,
    /// Cell ids in document order, generated cells appended.
    order: Vec<CellId>,
    edges: Vec<EdgeRef>,
    removed: HashSet<CellId>,
    alloc: IdAllocator,
    report: ReportBuilder,
    default_layer: CellId,
    config: &'c EngineConfig,
}

impl<'c> Workspace<'c> {
    fn new(body: &str, config: &'c EngineConfig) -> Result<Self, PatchError> {
        let tree = XmlTree::parse(body).map_err(|err| PatchError::MalformedDocument {
            reason: err.to_string(),
        })?;
        let root = tree
            .find_first("root")
            .ok_or_else(|| PatchError::MalformedDocument {
                reason: "missing <root> element".to_owned(),
            })?;

        let alloc = IdAllocator::new(scan_ids(&tree), &config.ids);
        let mut sites = HashMap::new();
        let mut order = Vec::new();
        let mut edges = Vec::new();
        for site in scan_cells(&tree) {
            let id = site.cell.id().clone();
            if sites.contains_key(&id) {
                continue;
            }
            if let Some((source, target)) = site.cell.endpoints() {
                edges.push(EdgeRef {
                    id: id.clone(),
                    source: source.clone(),
                    target: target.clone(),
                });
            }
            order.push(id.clone());
            sites.insert(id, site);
        }

        let default_layer = order
            .iter()
            .filter_map(|id| sites.get(id))
            .find(|site| {
                matches!(site.cell.kind(), CellKind::Structural) && site.cell.parent().is_some()
            })
            .map(|site| site.cell.id().clone())
            .unwrap_or_else(|| CellId::from_number(1));

        Ok(Self {
            tree,
            root,
            sites,
            order,
            edges,
            removed: HashSet::new(),
            alloc,
            report: ReportBuilder::default(),
            default_layer,
            config,
        })
    }

    fn is_live(&self, id: &CellId) -> bool {
        self.sites.contains_key(id) && !self.removed.contains(id)
    }

    fn vertex(&self, id: &CellId) -> Option<&CellSite> {
        self.sites
            .get(id)
            .filter(|site| site.cell.is_vertex() && !self.removed.contains(id))
    }

    fn is_live_vertex(&self, id: &CellId) -> bool {
        self.vertex(id).is_some()
    }

    fn layer_of(&self, id: &CellId) -> CellId {
        self.vertex(id)
            .and_then(|site| site.cell.parent().cloned())
            .unwrap_or_else(|| self.default_layer.clone())
    }

    fn geometry_of(&self, id: &CellId) -> Option<Geometry> {
        self.vertex(id).and_then(|site| site.cell.geometry().copied())
    }

    fn has_edge(&self, source: &CellId, target: &CellId) -> bool {
        self.edges
            .iter()
            .any(|edge| &edge.source == source && &edge.target == target)
    }

    fn incoming(&self, id: &CellId) -> Vec<EdgeRef> {
        self.edges
            .iter()
            .filter(|edge| &edge.target == id)
            .cloned()
            .collect()
    }

    /// The cell `id` hangs from inside `group`: the first entry (the main step) when it links to
    /// `id`, else the first other member that does.
    fn current_parent(&self, id: &CellId, group: &[CellId]) -> Option<CellId> {
        let sources: Vec<&CellId> = self
            .edges
            .iter()
            .filter(|edge| &edge.target == id && &edge.source != id)
            .map(|edge| &edge.source)
            .collect();
        group
            .iter()
            .find(|member| sources.contains(member))
            .cloned()
    }

    fn outgoing(&self, id: &CellId) -> Vec<EdgeRef> {
        self.edges
            .iter()
            .filter(|edge| &edge.source == id)
            .cloned()
            .collect()
    }

    fn set_label(&mut self, id: &CellId, label: &str) -> bool {
        let Some(site) = self.vertex(id) else {
            return false;
        };
        if plain_text(site.cell.label()) == label {
            return false;
        }
        let (element, key) = site.label_slot();
        if self.tree.set_attr(element, key, label) {
            debug!(cell_id = %id, "updated label");
            self.report.record_updated(id.clone());
            return true;
        }
        false
    }

    fn set_owner(&mut self, id: &CellId, owner: Option<&str>) -> bool {
        let Some(site) = self.vertex(id) else {
            return false;
        };
        let current = match site.cell.kind() {
            CellKind::Vertex { owner, .. } => owner.as_deref(),
            _ => None,
        };
        let owner = owner.filter(|o| !o.trim().is_empty());
        if current == owner {
            return false;
        }

        let element = match site.wrapper {
            Some(wrapper) if !self.tree.has_attr(site.element, "owner") => wrapper,
            _ => site.element,
        };
        let changed = match owner {
            Some(owner) => self.tree.set_attr(element, "owner", owner),
            None => self.tree.remove_attr(element, "owner"),
        };
        if changed {
            self.report.record_updated(id.clone());
        }
        changed
    }

    fn set_shape(&mut self, id: &CellId, shape: Shape) -> bool {
        let Some(site) = self.vertex(id) else {
            return false;
        };
        let mut style = site.cell.parsed_style();
        if Shape::classify(&style).shape == shape {
            return false;
        }
        shape.apply_to(&mut style);
        let element = site.element;
        if self.tree.set_attr(element, "style", &style.to_string()) {
            debug!(cell_id = %id, shape = shape.name(), "updated shape");
            self.report.record_updated(id.clone());
            return true;
        }
        false
    }

    fn add_vertex(
        &mut self,
        label: &str,
        shape: Shape,
        owner: Option<&str>,
        layer: &CellId,
        geometry: Geometry,
    ) -> Result<CellId, PatchError> {
        let id = self.alloc.next_vertex()?;
        let style = shape.vertex_style();
        let element = self.tree.append_element(
            self.root,
            &vertex_element(&id, label, &style, owner, layer, &geometry),
        );
        let cell = Cell::new(
            id.clone(),
            Some(layer.clone()),
            style,
            CellKind::Vertex {
                label: label.to_owned(),
                owner: owner.map(str::to_owned),
                geometry,
            },
        );
        self.sites.insert(
            id.clone(),
            CellSite {
                cell,
                element,
                wrapper: None,
            },
        );
        self.order.push(id.clone());
        self.report.record_added(id.clone());
        Ok(id)
    }

    /// Adds `source → target` unless such an edge already exists.
    fn add_edge(&mut self, source: &CellId, target: &CellId) -> Result<Option<CellId>, PatchError> {
        if self.has_edge(source, target) {
            return Ok(None);
        }
        let id = self.alloc.next_edge()?;
        let layer = self.layer_of(source);
        let element = self.tree.append_element(
            self.root,
            &edge_element(&id, DEFAULT_EDGE_STYLE, &layer, source, target),
        );
        let cell = Cell::new(
            id.clone(),
            Some(layer),
            DEFAULT_EDGE_STYLE,
            CellKind::Edge {
                source: Some(source.clone()),
                target: Some(target.clone()),
                label: String::new(),
            },
        );
        self.sites.insert(
            id.clone(),
            CellSite {
                cell,
                element,
                wrapper: None,
            },
        );
        self.order.push(id.clone());
        self.edges.push(EdgeRef {
            id: id.clone(),
            source: source.clone(),
            target: target.clone(),
        });
        debug!(cell_id = %id, source = %source, target = %target, "added edge");
        self.report.record_added(id.clone());
        Ok(Some(id))
    }

    /// Removes a cell, every edge touching it and every cell parented to a removed cell.
    fn remove_cascade(&mut self, id: &CellId) {
        if !self.is_live(id) {
            return;
        }
        let mut doomed: HashSet<CellId> = HashSet::from([id.clone()]);
        loop {
            let mut grew = false;
            for cell_id in &self.order {
                if self.removed.contains(cell_id) || doomed.contains(cell_id) {
                    continue;
                }
                let Some(site) = self.sites.get(cell_id) else {
                    continue;
                };
                let parent_doomed = site.cell.parent().is_some_and(|p| doomed.contains(p));
                let endpoint_doomed = site
                    .cell
                    .endpoints()
                    .is_some_and(|(s, t)| doomed.contains(s) || doomed.contains(t));
                if parent_doomed || endpoint_doomed {
                    doomed.insert(cell_id.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        for cell_id in &self.order {
            if !doomed.contains(cell_id) {
                continue;
            }
            if let Some(site) = self.sites.get(cell_id) {
                self.tree.remove(site.outer());
            }
            self.removed.insert(cell_id.clone());
            self.report.record_removed(cell_id.clone());
        }
        self.edges.retain(|edge| !doomed.contains(&edge.id));
        debug!(cell_id = %id, cascade = doomed.len(), "removed cell");
    }

    fn remove_edges_between(&mut self, source: &CellId, target: &CellId) {
        let doomed: Vec<CellId> = self
            .edges
            .iter()
            .filter(|edge| &edge.source == source && &edge.target == target)
            .map(|edge| edge.id.clone())
            .collect();
        for edge in doomed {
            self.remove_cascade(&edge);
        }
    }

    /// Nearest live main-flow cells reached from `id` against (`forward = false`) or along the
    /// edges, walking through cells in `skip`.
    fn live_neighbors(
        &self,
        id: &CellId,
        forward: bool,
        main: &[CellId],
        skip: &HashSet<CellId>,
    ) -> Vec<CellId> {
        let mut found: Vec<CellId> = Vec::new();
        let mut visited: HashSet<CellId> = HashSet::from([id.clone()]);
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let next: Vec<CellId> = if forward {
                self.outgoing(&current).into_iter().map(|e| e.target).collect()
            } else {
                self.incoming(&current).into_iter().map(|e| e.source).collect()
            };
            for candidate in next {
                if !visited.insert(candidate.clone()) || !main.contains(&candidate) {
                    continue;
                }
                if skip.contains(&candidate) {
                    stack.push(candidate);
                } else if !found.contains(&candidate) {
                    found.push(candidate);
                }
            }
        }
        found
    }

    fn sub_geometry(&self, owner: &Geometry, position: usize, depth: usize) -> Geometry {
        let layout = &self.config.layout;
        let width = if owner.width > 0.0 { owner.width } else { layout.vertex_width };
        Geometry {
            x: owner.x + position as f64 * layout.sub_spacing,
            y: owner.y + (depth as f64 + 1.0) * layout.sub_offset_y,
            width,
            height: layout.vertex_height,
        }
    }

    fn main_geometry(&self, node: &Node, previous: Option<&CellId>) -> Geometry {
        let layout = &self.config.layout;
        let (x, y) = if node.x != 0.0 || node.y != 0.0 {
            (node.x, node.y)
        } else if let Some(prev) = previous.and_then(|p| self.geometry_of(p)) {
            (prev.x + layout.main_spacing, prev.y)
        } else {
            (layout.origin_x, layout.origin_y)
        };
        Geometry {
            x,
            y,
            width: layout.vertex_width,
            height: layout.vertex_height,
        }
    }
}

fn parent_depth(subs: &[Subprocess], index: usize) -> usize {
    let mut depth = 0;
    let mut cursor = subs[index].parent;
    while let ParentRef::Subprocess(k) = cursor {
        depth += 1;
        if depth > subs.len() || k >= subs.len() {
            break;
        }
        cursor = subs[k].parent;
    }
    depth
}

impl<'c> Patcher<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    /// Applies `nodes` with the managed scope taken from `body` itself.
    pub fn apply(&self, body: &str, nodes: &[Node]) -> PatchOutcome {
        let scope = match XmlTree::parse(body) {
            Ok(tree) => {
                let graph = extract_graph(&tree);
                let analysis = FlowAnalysis::analyze_with(&graph, &self.config.analysis);
                ManagedScope::new(&graph, &analysis)
            }
            Err(_) => ManagedScope::default(),
        };
        self.apply_scoped(body, nodes, &scope)
    }

    /// Applies `nodes` to `body`. `scope` names the cells the caller's form was built from;
    /// managed cells missing from `nodes` are deleted, everything outside the scope is kept.
    #[instrument(skip_all, fields(nodes = nodes.len()))]
    pub fn apply_scoped(&self, body: &str, nodes: &[Node], scope: &ManagedScope) -> PatchOutcome {
        let mut ws = match Workspace::new(body, self.config) {
            Ok(ws) => ws,
            Err(err) => {
                warn!(error = %err, "cannot patch body; returning it unchanged");
                return PatchOutcome::unchanged(body, nodes, Some(err));
            }
        };

        let mut targets = nodes.to_vec();
        if let Err(err) = self.run(&mut ws, &mut targets, scope) {
            error!(error = %err, "patch aborted; returning original body");
            return PatchOutcome::unchanged(body, nodes, Some(err));
        }

        if ws.report.is_empty() {
            return PatchOutcome {
                body: body.to_owned(),
                report: ws.report.finish(),
                nodes: targets,
                recovered: None,
            };
        }

        let patched = ws.tree.to_xml_string();
        if let Err(issue) = validate_patch(body, &patched) {
            error!(reason = %issue, "patched body failed validation; returning original body");
            let recovered = Some(PatchError::StructuralValidation(issue));
            return PatchOutcome::unchanged(body, nodes, recovered);
        }

        PatchOutcome {
            body: patched,
            report: ws.report.finish(),
            nodes: targets,
            recovered: None,
        }
    }

    fn run(
        &self,
        ws: &mut Workspace<'_>,
        targets: &mut Vec<Node>,
        scope: &ManagedScope,
    ) -> Result<(), PatchError> {
        targets.retain(|node| {
            let gone = scope.is_skipped(&node.id)
                || (scope.main_flow().contains(&node.id) && !ws.is_live_vertex(&node.id));
            if gone {
                warn!(node_id = %node.id, "step was deleted in the latest document; skipping");
                ws.report.record_skipped(node.id.clone());
            }
            !gone
        });

        let target_main: HashSet<CellId> = targets.iter().map(|n| n.id.clone()).collect();
        let target_subs: HashSet<CellId> = targets
            .iter()
            .flat_map(|n| n.subprocesses.iter().filter_map(|s| s.cell_id().cloned()))
            .collect();
        let keep = |id: &CellId| target_main.contains(id) || target_subs.contains(id);

        self.delete_main_steps(ws, scope, &keep)?;

        for node in targets.iter() {
            if !ws.is_live_vertex(&node.id) {
                continue;
            }
            for branch in scope.branches_of(&node.id) {
                if !keep(branch) && ws.is_live_vertex(branch) {
                    debug!(node_id = %node.id, cell_id = %branch, "deleting removed sub-step");
                    ws.remove_cascade(branch);
                }
            }
        }

        let created = self.upsert_main_steps(ws, targets)?;
        self.splice_new_main_steps(ws, targets, &created)?;

        for node in targets.iter_mut() {
            self.sync_subprocesses(ws, node, scope)?;
        }
        Ok(())
    }

    fn delete_main_steps(
        &self,
        ws: &mut Workspace<'_>,
        scope: &ManagedScope,
        keep: &dyn Fn(&CellId) -> bool,
    ) -> Result<(), PatchError> {
        let doomed: Vec<CellId> = scope
            .main_flow()
            .iter()
            .filter(|id| !keep(id) && ws.is_live_vertex(id))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        let doomed_set: HashSet<CellId> = doomed.iter().cloned().collect();

        let mut bridges: Vec<(CellId, CellId)> = Vec::new();
        for id in &doomed {
            let preds = ws.live_neighbors(id, false, scope.main_flow(), &doomed_set);
            let succs = ws.live_neighbors(id, true, scope.main_flow(), &doomed_set);
            if let ([pred], [succ]) = (preds.as_slice(), succs.as_slice()) {
                if pred != succ && !bridges.contains(&(pred.clone(), succ.clone())) {
                    bridges.push((pred.clone(), succ.clone()));
                }
            }
        }

        for id in &doomed {
            debug!(node_id = %id, "deleting removed step");
            ws.remove_cascade(id);
            for branch in scope.branches_of(id) {
                if !keep(branch) {
                    ws.remove_cascade(branch);
                }
            }
        }

        for (pred, succ) in bridges {
            if ws.is_live_vertex(&pred) && ws.is_live_vertex(&succ) {
                ws.add_edge(&pred, &succ)?;
            }
        }
        Ok(())
    }

    /// Updates existing main steps and creates missing ones. Returns which entries were created.
    fn upsert_main_steps(
        &self,
        ws: &mut Workspace<'_>,
        targets: &mut [Node],
    ) -> Result<Vec<bool>, PatchError> {
        let mut created = Vec::with_capacity(targets.len());
        for index in 0..targets.len() {
            let node = &targets[index];
            if ws.is_live_vertex(&node.id) {
                ws.set_label(&node.id, &node.label);
                ws.set_shape(&node.id, node.shape);
                ws.set_owner(&node.id, node.owner.as_deref());
                created.push(false);
                continue;
            }

            let previous = index.checked_sub(1).map(|p| targets[p].id.clone());
            let geometry = ws.main_geometry(node, previous.as_ref());
            let layer = previous
                .as_ref()
                .map(|p| ws.layer_of(p))
                .unwrap_or_else(|| ws.default_layer.clone());
            let owner = node.owner.as_deref();
            let id = ws.add_vertex(&node.label, node.shape, owner, &layer, geometry)?;
            debug!(requested = %node.id, cell_id = %id, "created step");
            targets[index].id = id;
            created.push(true);
        }
        Ok(created)
    }

    fn splice_new_main_steps(
        &self,
        ws: &mut Workspace<'_>,
        targets: &[Node],
        created: &[bool],
    ) -> Result<(), PatchError> {
        for index in (0..targets.len()).filter(|&i| created[i]) {
            let prev_existing = (0..index).rev().find(|&i| !created[i]);
            let next_existing = (index + 1..targets.len()).find(|&i| !created[i]);
            if let (Some(a), Some(b)) = (prev_existing, next_existing) {
                ws.remove_edges_between(&targets[a].id, &targets[b].id);
            }

            let id = &targets[index].id;
            if let Some(prev) = index.checked_sub(1) {
                ws.add_edge(&targets[prev].id, id)?;
            }
            if let Some(next) = targets.get(index + 1) {
                ws.add_edge(id, &next.id)?;
            }
        }
        Ok(())
    }

    fn sync_subprocesses(
        &self,
        ws: &mut Workspace<'_>,
        node: &mut Node,
        scope: &ManagedScope,
    ) -> Result<(), PatchError> {
        let mut subs = std::mem::take(&mut node.subprocesses);
        crate::form::normalize_parents(&mut subs);

        for index in (0..subs.len()).rev() {
            let Some(cell) = subs[index].cell_id() else {
                continue;
            };
            if scope.contains(cell) && !ws.is_live_vertex(cell) {
                warn!(
                    node_id = %node.id,
                    cell_id = %cell,
                    "sub-step was deleted in the latest document; skipping"
                );
                ws.report.record_skipped(cell.clone());
                crate::form::remove_subprocess(&mut subs, index);
            }
        }

        let owner_geometry = ws.geometry_of(&node.id).unwrap_or_default();
        let layer = ws.layer_of(&node.id);
        let mut created = Vec::with_capacity(subs.len());
        for index in 0..subs.len() {
            let existing = subs[index]
                .cell_id()
                .filter(|cell| ws.is_live_vertex(cell))
                .cloned();
            let cell = match existing {
                Some(cell) => {
                    let sub = &subs[index];
                    let relabel = ws.set_label(&cell, &sub.name);
                    let reshape = ws.set_shape(&cell, sub.shape);
                    if (relabel || reshape) && sub.is_detected {
                        subs[index].mark_edited();
                    }
                    created.push(false);
                    cell
                }
                None => {
                    let depth = parent_depth(&subs, index);
                    let geometry = ws.sub_geometry(&owner_geometry, index, depth);
                    let sub = &subs[index];
                    let cell = ws.add_vertex(&sub.name, sub.shape, None, &layer, geometry)?;
                    debug!(node_id = %node.id, cell_id = %cell, "created sub-step");
                    subs[index].is_detected = false;
                    created.push(true);
                    cell
                }
            };
            subs[index].id = Some(cell);
        }

        let cells: Vec<CellId> = subs.iter().filter_map(|s| s.id.clone()).collect();
        let group: Vec<CellId> = std::iter::once(node.id.clone())
            .chain(cells.iter().cloned())
            .collect();
        for index in 0..subs.len() {
            let cell = &cells[index];
            let wanted = match subs[index].parent {
                ParentRef::Main => &node.id,
                ParentRef::Subprocess(k) => &cells[k],
            };
            if created[index] {
                ws.add_edge(wanted, cell)?;
                continue;
            }

            let previous = if scope.contains(cell) {
                scope.parent_of(cell).cloned()
            } else {
                ws.current_parent(cell, &group)
            };
            // A branch with no parent edge is listed under the main step.
            if previous.as_ref().unwrap_or(&node.id) == wanted {
                continue;
            }

            debug!(cell_id = %cell, parent = %wanted, "re-parenting sub-step");
            if subs[index].is_detected {
                subs[index].mark_edited();
            }
            if let Some(previous) = &previous {
                ws.remove_edges_between(previous, cell);
            }
            ws.add_edge(wanted, cell)?;
        }

        node.subprocesses = subs;
        Ok(())
    }
}
