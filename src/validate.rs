//! Structural validation of a query before planning.
//!
//! Every rule is checked and every violation collected; validation fails
//! with a [`ValidationError`] when the list is non-empty.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::model::{
    CompareOp, Condition, Constraint, Container, ContainerId, DerivedLinkSpec, Item, ItemId, Query,
};
use crate::walk::{QueryVisitor, QueryWalker, WalkContext};

/// A query failed validation.
///
/// Carries the offending query and every violation found, in the order they
/// were detected.
#[derive(Debug, Clone)]
pub struct ValidationError {
    query: Box<Query>,
    violations: Vec<String>,
}

impl ValidationError {
    /// The query that failed.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// All violations in detection order.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// First violation up to its first `:`, or the whole text when it has
    /// none.
    pub fn primary_message(&self) -> &str {
        let first = self.violations.first().map(String::as_str).unwrap_or("");
        match first.find(':') {
            Some(idx) => &first[..idx],
            None => first,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primary_message())
    }
}

impl std::error::Error for ValidationError {}

/// Validates `query`, returning every violation on failure.
pub fn validate(query: &Query) -> Result<(), ValidationError> {
    let violations = collect_violations(query);
    if violations.is_empty() {
        return Ok(());
    }
    debug!(
        query = query.name(),
        violations = violations.len(),
        "validate.rejected"
    );
    Err(ValidationError {
        query: Box::new(query.clone()),
        violations,
    })
}

/// Runs every check and returns the violations found.
pub fn collect_violations(query: &Query) -> Vec<String> {
    let mut checks = StructureChecks {
        violations: Vec::new(),
    };
    if let Err(err) = QueryWalker::default().walk(query, &mut checks) {
        checks.add(format!("internal error walking query: {err}"));
    }
    checks.check_duplicate_names(query);
    match without_negated_elements(query) {
        Ok(pruned) => {
            if pruned.connected_components().len() != 1 {
                checks.add("query (without negated elements) is not connected".to_owned());
            }
        }
        Err(err) => checks.add(format!("internal error copying query: {err}")),
    }
    checks.violations
}

struct StructureChecks {
    violations: Vec<String>,
}

impl StructureChecks {
    fn add(&mut self, violation: String) {
        self.violations.push(violation);
    }

    fn check_duplicate_names(&mut self, query: &Query) {
        let mut seen = BTreeSet::new();
        let mut duplicates = Vec::new();
        for id in query.items(true) {
            let Ok(item) = query.item(id) else { continue };
            for name in item.names() {
                if !seen.insert(name.clone()) {
                    duplicates.push(name.clone());
                }
            }
        }
        if !duplicates.is_empty() {
            self.add(format!(
                "found {} duplicate item name(s): {duplicates:?}",
                duplicates.len()
            ));
        }
    }

    fn check_condition(&mut self, condition: &Condition) {
        let mut found = Vec::new();
        condition.for_each_test(&mut |test| match test.compare_op() {
            None => found.push(format!(
                "operator wasn't one of: 'eq', 'ge', 'gt', 'le', 'lt', 'ne', or 'exists': {}",
                test.operator()
            )),
            Some(CompareOp::Exists) if test.value().is_some() => {
                found.push("exists operator takes a single operand".to_owned())
            }
            Some(op) if op.is_binary() && test.value().is_none() => {
                found.push(format!("{} operator requires two operands", test.operator()))
            }
            Some(_) => {}
        });
        self.violations.extend(found);
    }

    fn check_name(&mut self, item: &Item) {
        if item.names().iter().any(String::is_empty) {
            self.add("vertex or edge name cannot be empty".to_owned());
        }
    }

    fn check_annotated_vertex(&mut self, query: &Query, vertex: &Item) {
        if !vertex.is_annotated() {
            return;
        }
        let Some(data) = vertex.as_vertex() else { return };
        for edge in data.edges() {
            if let Ok(edge) = query.item(*edge) {
                if !edge.is_annotated() {
                    self.add(format!(
                        "annotated vertices require all incident edges to be annotated. Vertex: {} Edge: {}",
                        vertex.first_name(),
                        edge.first_name()
                    ));
                }
            }
        }
    }

    fn check_edge(&mut self, query: &Query, edge_id: ItemId) {
        let Ok(edge) = query.item(edge_id) else { return };
        let Some(data) = edge.as_edge() else { return };
        let v1 = data.from().and_then(|id| query.item(id).ok());
        let v2 = data.to().and_then(|id| query.item(id).ok());
        let (Some(v1), Some(v2)) = (v1, v2) else {
            self.add(format!(
                "one or both edge vertices are invalid. Vertex 1: {} ({}), Vertex 2: {} ({})",
                data.from_name(),
                if v1.is_some() { "ok" } else { "bad" },
                data.to_name(),
                if v2.is_some() { "ok" } else { "bad" },
            ));
            return;
        };

        if v1.is_annotated() && v2.is_annotated() {
            self.add(format!(
                "at most one of any two adjacent vertices can be annotated. Vertex 1: {}, Vertex 2: {}",
                v1.first_name(),
                v2.first_name()
            ));
        }

        let in_annotated_subquery = |v: &Item| {
            v.container()
                .and_then(|c| query.container(c).ok())
                .is_some_and(|c| c.is_subquery() && c.annotation().is_some())
        };
        let crosses = query.crosses_boundary(edge_id).unwrap_or(false);
        if crosses && in_annotated_subquery(v1) && in_annotated_subquery(v2) {
            self.add(format!(
                "no edge can connect one annotated subquery to another: {}",
                edge.first_name()
            ));
        }
        if (v1.is_annotated() || v2.is_annotated()) && !edge.is_annotated() {
            self.add(format!(
                "edge incident to an annotated vertex must be annotated: {}",
                edge.first_name()
            ));
        }
        if crosses && !edge.is_annotated() {
            self.add(format!(
                "edge crossing a subquery boundary must be annotated: {}",
                edge.first_name()
            ));
        }
        if edge.container() != v1.container() && edge.container() != v2.container() {
            self.add(format!(
                "at least one of every edge's vertices is in the same parent query/subquery as the edge itself. Edge: {}",
                edge.first_name()
            ));
        }
        if edge.annotation().is_some_and(|a| a.min() == Some(0)) {
            self.add(format!(
                "edge min numeric annotation cannot be 0. Edge: {}",
                edge.first_name()
            ));
        }
    }

    fn check_boundary(&mut self, query: &Query, subquery: ContainerId, annotated: bool) {
        let (Ok(edges), Ok(anchors)) =
            (query.boundary_edges(subquery), query.anchor_vertices(subquery))
        else {
            return;
        };
        if annotated {
            for anchor in anchors.iter().filter_map(|id| query.item(*id).ok()) {
                if anchor.is_annotated() {
                    self.add(format!(
                        "no numeric annotation allowed on a vertex adjacent to an annotated subquery: {}",
                        anchor.first_name()
                    ));
                }
            }
        }
        let mut inner: Vec<ItemId> = Vec::new();
        for edge in edges {
            let endpoints = query.item(edge).ok().and_then(Item::as_edge);
            let Some((from, to)) = endpoints.and_then(|e| e.endpoints()) else {
                continue;
            };
            let vertex = if anchors.contains(&from) { to } else { from };
            if !inner.contains(&vertex) {
                inner.push(vertex);
            }
        }
        for vertex in inner.iter().filter_map(|id| query.item(*id).ok()) {
            if vertex.is_annotated() {
                self.add(format!(
                    "no annotation allowed on boundary vertex of subquery: {}",
                    vertex.first_name()
                ));
            }
        }
    }

    fn check_constraint(&mut self, query: &Query, constraint: &Constraint) {
        let operator_ok = CompareOp::parse(constraint.operator()).is_some_and(|op| op.is_binary());
        if !operator_ok {
            self.add(format!(
                "constraint operator wasn't one of: 'eq', 'ge', 'gt', 'le', 'lt', 'ne': {}",
                constraint.operator()
            ));
        }
        if constraint.has_mixed_operands() {
            self.add(format!(
                "constraint had inconsistent operands: {}, {}. operands should be consistent with each other: two items, or two attributes",
                constraint.left(),
                constraint.right()
            ));
        }
        self.check_constraint_items(query, constraint);
    }

    fn check_constraint_items(&mut self, query: &Query, constraint: &Constraint) {
        let names = constraint.item_names();
        let mut items = Vec::with_capacity(names.len());
        for name in &names {
            let item = query.item_by_name(name).and_then(|id| query.item(id).ok());
            if item.is_none() {
                self.add(format!("constraint: unknown item: {name}"));
            }
            items.push(item);
        }
        // a literal operand relates nothing
        let (&[name1, name2], &[Some(item1), Some(item2)]) = (names.as_slice(), items.as_slice())
        else {
            return;
        };

        if item1.is_edge() != item2.is_edge() {
            self.add(format!(
                "constraint: inconsistent operands: {name1}, {name2}. constraints should only relate pairs of vertices or pairs of edges, with no mixing"
            ));
        }
        if item1.is_annotated() && item2.is_annotated() {
            self.add(format!(
                "constraint: only one item in the constraint can be annotated: {name1}"
            ));
        }
        let in_annotated_subquery = |item: &Item| {
            item.container()
                .and_then(|c| query.container(c).ok())
                .is_some_and(|c| c.is_subquery() && c.annotation().is_some())
        };
        if item1.is_annotated() && in_annotated_subquery(item2) {
            self.add(format!(
                "constraint: only one item in the constraint can be annotated: {name1} is annotated, and {name2} is in an annotated sub-query"
            ));
        }
        if item2.is_annotated() && in_annotated_subquery(item1) {
            self.add(format!(
                "constraint: only one item in the constraint can be annotated: {name2} is annotated, and {name1} is in an annotated sub-query"
            ));
        }

        if item1.container() == item2.container() {
            return;
        }
        if item1.is_annotated() || item2.is_annotated() {
            let annotated = if item1.is_annotated() { item1 } else { item2 };
            if let Some(data) = annotated.as_edge() {
                let negated_endpoint = [data.from(), data.to()]
                    .into_iter()
                    .flatten()
                    .filter_map(|id| query.item(id).ok())
                    .find(|v| v.is_annotated());
                if !negated_endpoint
                    .and_then(Item::annotation)
                    .is_some_and(|a| a.min() == Some(0))
                {
                    self.add(format!(
                        "constraint: In a constraint involving an annotated link, at least one of the end vertices has to be annotated with [0..]: {name1}, {name2}"
                    ));
                }
            } else if annotated.annotation().is_some_and(|a| a.min() != Some(0)) {
                self.add(format!(
                    "constraint: In a constraint that spans multiple sub-queries, one of the items has to be annotated with [0..]: {name1}, {name2}"
                ));
            }
        } else {
            self.add(format!(
                "constraint: In a constraint that spans multiple sub-queries, one of the items has to be annotated with [0..]: {name1}, {name2}"
            ));
        }
    }
}

impl QueryVisitor for StructureChecks {
    fn start_container(&mut self, ctx: &WalkContext<'_>, container: ContainerId) {
        let Ok(current) = ctx.query().container(container) else {
            return;
        };
        if current.vertices().is_empty() {
            let kind = if current.is_subquery() { "subquery" } else { "query" };
            self.add(format!("{kind} has zero vertices, but should have at least one"));
        }
        let parent_is_subquery = current
            .parent()
            .and_then(|p| ctx.query().container(p).ok())
            .is_some_and(Container::is_subquery);
        if parent_is_subquery {
            self.add(
                "found a subquery whose parent was itself a subquery (nested subqueries not supported)"
                    .to_owned(),
            );
        }
        if current.is_subquery() {
            self.check_boundary(ctx.query(), container, current.annotation().is_some());
        }
    }

    fn vertex(&mut self, ctx: &WalkContext<'_>, vertex: ItemId) {
        let Ok(item) = ctx.query().item(vertex) else { return };
        self.check_name(item);
        if let Some(condition) = item.condition() {
            self.check_condition(condition);
        }
        self.check_annotated_vertex(ctx.query(), item);
    }

    fn edge(&mut self, ctx: &WalkContext<'_>, edge: ItemId) {
        let Ok(item) = ctx.query().item(edge) else { return };
        self.check_name(item);
        if let Some(condition) = item.condition() {
            self.check_condition(condition);
        }
        self.check_edge(ctx.query(), edge);
    }

    fn constraint(&mut self, ctx: &WalkContext<'_>, constraint: &Constraint) {
        self.check_constraint(ctx.query(), constraint);
    }

    fn derived_link(&mut self, ctx: &WalkContext<'_>, link: &DerivedLinkSpec) {
        for name in [link.from(), link.to()] {
            if ctx.query().item_by_name(name).is_none() {
                self.add(format!("add-link for non-existing vertex: {name}"));
            }
        }
    }

    fn cached_item(&mut self, ctx: &WalkContext<'_>, item: &str, _source: &str) {
        if ctx.query().item_by_name(item).is_none() {
            self.add(format!("cache for non-existing element: {item}"));
        }
    }
}

/// Collects negated elements: items annotated with a zero minimum and
/// everything inside a subquery annotated that way.
#[derive(Default)]
struct NegatedElements {
    subqueries: Vec<ContainerId>,
    vertices: Vec<ItemId>,
    edges: Vec<ItemId>,
}

fn inside_negated(ctx: &WalkContext<'_>) -> bool {
    ctx.any_enclosing(|c| {
        ctx.query()
            .container(c)
            .ok()
            .and_then(Container::annotation)
            .is_some_and(|a| a.is_negated())
    })
}

fn is_negated(query: &Query, item: ItemId) -> bool {
    query
        .item(item)
        .ok()
        .and_then(Item::annotation)
        .is_some_and(|a| a.is_negated())
}

impl QueryVisitor for NegatedElements {
    fn start_container(&mut self, ctx: &WalkContext<'_>, container: ContainerId) {
        if container != ContainerId::ROOT && inside_negated(ctx) {
            self.subqueries.push(container);
        }
    }

    fn vertex(&mut self, ctx: &WalkContext<'_>, vertex: ItemId) {
        if inside_negated(ctx) || is_negated(ctx.query(), vertex) {
            self.vertices.push(vertex);
        }
    }

    fn edge(&mut self, ctx: &WalkContext<'_>, edge: ItemId) {
        if inside_negated(ctx) || is_negated(ctx.query(), edge) {
            self.edges.push(edge);
        }
    }
}

/// Copy of `query` with negated elements removed, plus every edge left
/// without both endpoints.
fn without_negated_elements(query: &Query) -> crate::Result<Query> {
    let mut negated = NegatedElements::default();
    QueryWalker::default().walk(query, &mut negated)?;

    let mut pruned = query.clone();
    let mut edges: BTreeSet<ItemId> = negated.edges.into_iter().collect();
    for vertex in &negated.vertices {
        edges.extend(pruned.vertex_edges(*vertex)?);
    }
    for edge in edges {
        pruned.remove_edge(edge)?;
    }
    for vertex in negated.vertices {
        pruned.remove_vertex(vertex)?;
    }
    for subquery in negated.subqueries.into_iter().rev() {
        pruned.remove_subquery(subquery)?;
    }
    Ok(pruned)
}
