use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hasher;

use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::Xxh64;

use crate::error::{Error, Result};

use super::{
    Annotation, Constraint, Container, ContainerId, ContainerKind, DerivedLinkSpec, EdgeData,
    Item, ItemId, VertexData,
};

/// A graph-pattern query: the root container, its subqueries, and the
/// vertices and edges they own.
///
/// Item names are unique across the whole query. Removed items and
/// containers leave a tombstone so every surviving id keeps its meaning.
#[derive(Clone, Debug)]
pub struct Query {
    name: String,
    description: String,
    items: Vec<Option<Item>>,
    containers: Vec<Option<Container>>,
}

impl Query {
    /// Empty query with just the root container.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            items: Vec::new(),
            containers: vec![Some(Container::new(ContainerKind::Query))],
        }
    }

    /// Query name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Root container id.
    pub fn root(&self) -> ContainerId {
        ContainerId::ROOT
    }

    /// Looks up a live container.
    pub fn container(&self, id: ContainerId) -> Result<&Container> {
        self.containers
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::invalid_state(format!("container {id} is not part of the query")))
    }

    fn container_mut(&mut self, id: ContainerId) -> Result<&mut Container> {
        self.containers
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::invalid_state(format!("container {id} is not part of the query")))
    }

    /// Looks up a live item.
    pub fn item(&self, id: ItemId) -> Result<&Item> {
        self.items
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::invalid_state(format!("item {id} is not part of the query")))
    }

    /// Mutable access for annotation and provenance edits.
    pub fn item_mut(&mut self, id: ItemId) -> Result<&mut Item> {
        self.items
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::invalid_state(format!("item {id} is not part of the query")))
    }

    /// Whether `id` names a live item.
    pub fn contains_item(&self, id: ItemId) -> bool {
        self.item(id).is_ok()
    }

    fn vertex_data(&self, id: ItemId) -> Result<&VertexData> {
        let item = self.item(id)?;
        item.as_vertex()
            .ok_or_else(|| Error::invalid_argument(format!("'{}' is not a vertex", item.catenated_name())))
    }

    fn vertex_data_mut(&mut self, id: ItemId) -> Result<&mut VertexData> {
        let item = self.item_mut(id)?;
        let name = item.catenated_name();
        item.vertex_mut()
            .ok_or_else(|| Error::invalid_argument(format!("'{name}' is not a vertex")))
    }

    fn edge_data(&self, id: ItemId) -> Result<&EdgeData> {
        let item = self.item(id)?;
        item.as_edge()
            .ok_or_else(|| Error::invalid_argument(format!("'{}' is not an edge", item.catenated_name())))
    }

    fn edge_data_mut(&mut self, id: ItemId) -> Result<&mut EdgeData> {
        let item = self.item_mut(id)?;
        let name = item.catenated_name();
        item.edge_mut()
            .ok_or_else(|| Error::invalid_argument(format!("'{name}' is not an edge")))
    }

    fn ensure_unique_names(&self, candidate: &Item, except: Option<ItemId>) -> Result<()> {
        for (idx, slot) in self.items.iter().enumerate() {
            let Some(existing) = slot else { continue };
            if except == Some(ItemId(idx as u32)) {
                continue;
            }
            if let Some(clash) = candidate.names().iter().find(|n| existing.has_name(n)) {
                return Err(Error::invalid_state(format!(
                    "name '{clash}' is already used by '{}'",
                    existing.catenated_name()
                )));
            }
        }
        Ok(())
    }

    fn ensure_detached(item: &Item) -> Result<()> {
        if item.container().is_some() {
            return Err(Error::invalid_state(format!(
                "'{}' already belongs to a query",
                item.catenated_name()
            )));
        }
        Ok(())
    }

    fn alloc(&mut self, mut item: Item, container: ContainerId) -> ItemId {
        item.set_container(Some(container));
        let id = ItemId(self.items.len() as u32);
        self.items.push(Some(item));
        id
    }

    /// Adds a vertex to `container`. Fails with `InvalidState` when any of its
    /// names is already used in the query.
    pub fn add_vertex(&mut self, container: ContainerId, vertex: Item) -> Result<ItemId> {
        let data = vertex.as_vertex().ok_or_else(|| {
            Error::invalid_argument(format!("'{}' is not a vertex", vertex.catenated_name()))
        })?;
        if !data.edges().is_empty() {
            return Err(Error::invalid_argument("a new vertex cannot carry edges"));
        }
        Self::ensure_detached(&vertex)?;
        self.container(container)?;
        self.ensure_unique_names(&vertex, None)?;
        let id = self.alloc(vertex, container);
        self.container_mut(container)?.vertices.push(id);
        Ok(id)
    }

    /// Adds an edge to `container` and connects it to the vertices named by
    /// its endpoint names. Endpoints that name no vertex stay unresolved.
    pub fn add_edge(&mut self, container: ContainerId, edge: Item) -> Result<ItemId> {
        let data = edge.as_edge().ok_or_else(|| {
            Error::invalid_argument(format!("'{}' is not an edge", edge.catenated_name()))
        })?;
        Self::ensure_detached(&edge)?;
        self.container(container)?;
        self.ensure_unique_names(&edge, None)?;
        let from = self.vertex_named(data.from_name());
        let to = self.vertex_named(data.to_name());
        let id = self.alloc(edge, container);
        {
            let data = self.edge_data_mut(id)?;
            data.set_from(from);
            data.set_to(to);
        }
        for vertex in [from, to].into_iter().flatten() {
            self.vertex_data_mut(vertex)?.attach(id);
        }
        self.container_mut(container)?.edges.push(id);
        Ok(id)
    }

    /// Adds an empty subquery below `parent`.
    pub fn add_subquery(
        &mut self,
        parent: ContainerId,
        annotation: Option<Annotation>,
    ) -> Result<ContainerId> {
        self.container(parent)?;
        let id = ContainerId(self.containers.len() as u32);
        self.containers
            .push(Some(Container::new(ContainerKind::Subquery { parent, annotation })));
        self.container_mut(parent)?.subqueries.push(id);
        Ok(id)
    }

    /// Adds a constraint, recording whether it relates edges.
    pub fn add_constraint(&mut self, container: ContainerId, mut constraint: Constraint) -> Result<()> {
        let on_edges = constraint
            .item_names()
            .first()
            .and_then(|name| self.item_by_name(name))
            .and_then(|id| self.item(id).ok())
            .is_some_and(Item::is_edge);
        constraint.set_on_edges(on_edges);
        self.container_mut(container)?.constraints.push(constraint);
        Ok(())
    }

    /// Adds a derived-link request.
    pub fn add_derived_link(&mut self, container: ContainerId, link: DerivedLinkSpec) -> Result<()> {
        self.container_mut(container)?.links.push(link);
        Ok(())
    }

    /// Records that results for `item` already exist in container `source`.
    pub fn add_cached_item(
        &mut self,
        container: ContainerId,
        item: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<()> {
        let item = item.into();
        if item.is_empty() {
            return Err(Error::invalid_argument("cached item name is empty"));
        }
        let target = self.container_mut(container)?;
        if target.cached.contains_key(&item) {
            return Err(Error::invalid_state(format!("item '{item}' is already cached")));
        }
        target.cached.insert(item, source.into());
        Ok(())
    }

    /// Removes an edge from its container and from its endpoints.
    pub fn remove_edge(&mut self, edge: ItemId) -> Result<Item> {
        let item = self.item(edge)?;
        let data = self.edge_data(edge)?;
        let endpoints = [data.from(), data.to()];
        let container = item
            .container()
            .ok_or_else(|| Error::invalid_state("edge has no owning container"))?;
        self.container_mut(container)?.edges.retain(|e| *e != edge);
        for vertex in endpoints.into_iter().flatten() {
            if let Ok(data) = self.vertex_data_mut(vertex) {
                data.detach(edge);
            }
        }
        self.take_item(edge)
    }

    /// Removes a vertex that no longer has incident edges.
    pub fn remove_vertex(&mut self, vertex: ItemId) -> Result<Item> {
        let data = self.vertex_data(vertex)?;
        if !data.edges().is_empty() {
            return Err(Error::invalid_state(format!(
                "vertex '{}' still has {} incident edge(s)",
                self.item(vertex)?.catenated_name(),
                data.edges().len()
            )));
        }
        let container = self
            .item(vertex)?
            .container()
            .ok_or_else(|| Error::invalid_state("vertex has no owning container"))?;
        self.container_mut(container)?.vertices.retain(|v| *v != vertex);
        self.take_item(vertex)
    }

    fn take_item(&mut self, id: ItemId) -> Result<Item> {
        let mut item = self
            .items
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| Error::invalid_state(format!("item {id} is not part of the query")))?;
        item.set_container(None);
        Ok(item)
    }

    /// Swaps `current` for `replacement` in place: same container position,
    /// same incident edges. Returns the replacement's id.
    pub fn replace_vertex(&mut self, current: ItemId, replacement: Item) -> Result<ItemId> {
        if !replacement.is_vertex() {
            return Err(Error::invalid_argument(format!(
                "replacement '{}' is not a vertex",
                replacement.catenated_name()
            )));
        }
        Self::ensure_detached(&replacement)?;
        let edges: Vec<ItemId> = self.vertex_data(current)?.edges().iter().copied().collect();
        let container = self
            .item(current)?
            .container()
            .ok_or_else(|| Error::invalid_state("vertex has no owning container"))?;
        self.ensure_unique_names(&replacement, Some(current))?;

        self.take_item(current)?;
        let id = self.alloc(replacement, container);
        let owner = self.container_mut(container)?;
        if let Some(slot) = owner.vertices.iter_mut().find(|v| **v == current) {
            *slot = id;
        }
        for edge in edges {
            let data = self.edge_data_mut(edge)?;
            if data.from() == Some(current) {
                data.set_from(Some(id));
            }
            if data.to() == Some(current) {
                data.set_to(Some(id));
            }
            self.vertex_data_mut(id)?.attach(edge);
        }
        Ok(id)
    }

    /// Removes an empty subquery; its constraints, derived links and cached
    /// entries go with it.
    pub fn remove_subquery(&mut self, subquery: ContainerId) -> Result<Container> {
        let container = self.container(subquery)?;
        let parent = container
            .parent()
            .ok_or_else(|| Error::invalid_argument("the root container cannot be removed"))?;
        if !container.is_empty() {
            return Err(Error::invalid_state(format!(
                "subquery {subquery} still owns vertices, edges or subqueries"
            )));
        }
        self.container_mut(parent)?.subqueries.retain(|s| *s != subquery);
        self.containers
            .get_mut(subquery.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| Error::invalid_state(format!("container {subquery} is not part of the query")))
    }

    /// Removes a constraint from whichever container declares it.
    pub fn remove_constraint(&mut self, constraint: &Constraint) -> Result<Constraint> {
        for container in self.containers.iter_mut().flatten() {
            if let Some(pos) = container.constraints.iter().position(|c| c == constraint) {
                return Ok(container.constraints.remove(pos));
            }
        }
        Err(Error::invalid_state(format!(
            "constraint '{constraint}' is not part of the query"
        )))
    }

    /// Removes a derived-link request from whichever container declares it.
    pub fn remove_derived_link(&mut self, link: &DerivedLinkSpec) -> Result<DerivedLinkSpec> {
        for container in self.containers.iter_mut().flatten() {
            if let Some(pos) = container.links.iter().position(|l| l == link) {
                return Ok(container.links.remove(pos));
            }
        }
        Err(Error::invalid_state(format!("derived link '{link}' is not part of the query")))
    }

    /// Removes a cached-item entry; returns the source container name.
    pub fn remove_cached_item(&mut self, item: &str) -> Result<String> {
        for container in self.containers.iter_mut().flatten() {
            if let Some(source) = container.cached.remove(item) {
                return Ok(source);
            }
        }
        Err(Error::invalid_state(format!("item '{item}' is not cached")))
    }

    /// Removes `edge`, moves every other edge of `absorbed` onto the edge's
    /// other endpoint, and removes `absorbed`.
    ///
    /// An edge that joined both endpoints becomes a self-loop. `edge` may
    /// cross a subquery boundary; moved edges keep their own container.
    pub fn absorb_edge_and_vertex(&mut self, edge: ItemId, absorbed: ItemId) -> Result<()> {
        let data = self.edge_data(edge)?;
        let edge_name = self.item(edge)?.catenated_name();
        let kept = data.other_endpoint(absorbed).ok_or_else(|| {
            Error::invalid_argument(format!("vertex {absorbed} is not an endpoint of '{edge_name}'"))
        })?;
        if kept == absorbed {
            return Err(Error::invalid_argument(format!(
                "'{edge_name}' is a self-loop and cannot absorb its vertex"
            )));
        }
        self.remove_edge(edge)?;

        let moved: Vec<ItemId> = self.vertex_data(absorbed)?.edges().iter().copied().collect();
        for other in &moved {
            let data = self.edge_data_mut(*other)?;
            if data.from() == Some(absorbed) {
                data.set_from(Some(kept));
            }
            if data.to() == Some(absorbed) {
                data.set_to(Some(kept));
            }
            self.vertex_data_mut(kept)?.attach(*other);
        }
        let data = self.vertex_data_mut(absorbed)?;
        for other in &moved {
            data.detach(*other);
        }
        self.remove_vertex(absorbed)?;
        Ok(())
    }

    /// Adds `names` to a composite vertex. The names must be unused by any
    /// other live item.
    pub fn add_names(&mut self, target: ItemId, names: &[String]) -> Result<()> {
        let candidate = Item::composite(names.iter().cloned())?;
        self.ensure_unique_names(&candidate, Some(target))?;
        self.item_mut(target)?.add_names(names)
    }

    /// Moves every member of `subquery` into its parent and removes it.
    pub fn flatten_subquery(&mut self, subquery: ContainerId) -> Result<()> {
        let parent = self
            .container(subquery)?
            .parent()
            .ok_or_else(|| Error::invalid_argument("the root container cannot be flattened"))?;
        let kind = self.container(subquery)?.kind().clone();
        let taken = std::mem::replace(self.container_mut(subquery)?, Container::new(kind));

        for id in taken.vertices.iter().chain(taken.edges.iter()) {
            self.item_mut(*id)?.set_container(Some(parent));
        }
        for nested in &taken.subqueries {
            let child = self.container_mut(*nested)?;
            if let ContainerKind::Subquery { annotation, .. } = child.kind {
                child.kind = ContainerKind::Subquery { parent, annotation };
            }
        }
        let target = self.container_mut(parent)?;
        target.vertices.extend(taken.vertices);
        target.edges.extend(taken.edges);
        target.subqueries.extend(taken.subqueries);
        target.constraints.extend(taken.constraints);
        target.links.extend(taken.links);
        for (item, source) in taken.cached {
            target.cached.entry(item).or_insert(source);
        }
        self.remove_subquery(subquery)?;
        Ok(())
    }

    /// Root followed by every subquery, depth first in insertion order.
    pub fn containers(&self) -> Vec<ContainerId> {
        let mut out = Vec::new();
        self.collect_containers(ContainerId::ROOT, &mut out);
        out
    }

    fn collect_containers(&self, id: ContainerId, out: &mut Vec<ContainerId>) {
        let Ok(container) = self.container(id) else {
            return;
        };
        out.push(id);
        for sub in &container.subqueries {
            self.collect_containers(*sub, out);
        }
    }

    fn scope(&self, recursive: bool) -> Vec<ContainerId> {
        if recursive {
            self.containers()
        } else {
            vec![ContainerId::ROOT]
        }
    }

    /// Vertices of the root, or of every container when `recursive`.
    pub fn vertices(&self, recursive: bool) -> Vec<ItemId> {
        self.scope(recursive)
            .into_iter()
            .filter_map(|c| self.container(c).ok())
            .flat_map(|c| c.vertices.iter().copied())
            .collect()
    }

    /// Edges of the root, or of every container when `recursive`.
    pub fn edges(&self, recursive: bool) -> Vec<ItemId> {
        self.scope(recursive)
            .into_iter()
            .filter_map(|c| self.container(c).ok())
            .flat_map(|c| c.edges.iter().copied())
            .collect()
    }

    /// Vertices then edges.
    pub fn items(&self, recursive: bool) -> Vec<ItemId> {
        let mut out = self.vertices(recursive);
        out.extend(self.edges(recursive));
        out
    }

    /// Direct subqueries of the root, or all of them when `recursive`.
    pub fn subqueries(&self, recursive: bool) -> Vec<ContainerId> {
        if recursive {
            self.containers().into_iter().skip(1).collect()
        } else {
            self.container(ContainerId::ROOT)
                .map(|c| c.subqueries.clone())
                .unwrap_or_default()
        }
    }

    /// Vertex count.
    pub fn num_vertices(&self, recursive: bool) -> usize {
        self.vertices(recursive).len()
    }

    /// Edge count.
    pub fn num_edges(&self, recursive: bool) -> usize {
        self.edges(recursive).len()
    }

    /// Constraints of the root, or of every container when `recursive`.
    pub fn constraints(&self, recursive: bool) -> Vec<&Constraint> {
        self.scope(recursive)
            .into_iter()
            .filter_map(|c| self.container(c).ok())
            .flat_map(|c| c.constraints.iter())
            .collect()
    }

    /// Derived-link requests of the root, or of every container.
    pub fn derived_links(&self, recursive: bool) -> Vec<&DerivedLinkSpec> {
        self.scope(recursive)
            .into_iter()
            .filter_map(|c| self.container(c).ok())
            .flat_map(|c| c.links.iter())
            .collect()
    }

    /// Cached items of the root, or of every container; the first
    /// declaration of a name wins.
    pub fn cached_items(&self, recursive: bool) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for container in self.scope(recursive) {
            if let Ok(container) = self.container(container) {
                for (item, source) in &container.cached {
                    out.entry(item.clone()).or_insert_with(|| source.clone());
                }
            }
        }
        out
    }

    /// Live item whose only name is `name`.
    pub fn item_by_name(&self, name: &str) -> Option<ItemId> {
        self.items(true).into_iter().find(|id| {
            self.item(*id)
                .is_ok_and(|item| item.names().len() == 1 && item.first_name() == name)
        })
    }

    /// Live item that carries `name` among its names.
    pub fn item_containing(&self, name: &str) -> Option<ItemId> {
        self.items(true)
            .into_iter()
            .find(|id| self.item(*id).is_ok_and(|item| item.has_name(name)))
    }

    fn vertex_named(&self, name: &str) -> Option<ItemId> {
        self.vertices(true)
            .into_iter()
            .find(|id| self.item(*id).is_ok_and(|item| item.has_name(name)))
    }

    /// Incident edges of a vertex.
    pub fn vertex_edges(&self, vertex: ItemId) -> Result<Vec<ItemId>> {
        Ok(self.vertex_data(vertex)?.edges().iter().copied().collect())
    }

    /// Distinct vertices reachable over one resolved edge, excluding `vertex`
    /// itself.
    pub fn neighbors(&self, vertex: ItemId) -> Result<Vec<ItemId>> {
        let mut out = Vec::new();
        for edge in self.vertex_edges(vertex)? {
            if let Some(other) = self.edge_data(edge)?.other_endpoint(vertex) {
                if other != vertex && !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        Ok(out)
    }

    /// Edges joining `a` and `b` in either direction.
    pub fn edges_between(&self, a: ItemId, b: ItemId) -> Result<Vec<ItemId>> {
        let mut out = Vec::new();
        for edge in self.vertex_edges(a)? {
            if self.edge_data(edge)?.other_endpoint(a) == Some(b) {
                out.push(edge);
            }
        }
        Ok(out)
    }

    /// Self-loops on `vertex`.
    pub fn self_loops(&self, vertex: ItemId) -> Result<Vec<ItemId>> {
        self.edges_between(vertex, vertex)
    }

    /// Whether the edge joins vertices owned by different containers.
    pub fn crosses_boundary(&self, edge: ItemId) -> Result<bool> {
        let Some((from, to)) = self.edge_data(edge)?.endpoints() else {
            return Ok(false);
        };
        let (Ok(from), Ok(to)) = (self.item(from), self.item(to)) else {
            return Ok(false);
        };
        Ok(from.container() != to.container())
    }

    /// Edges with exactly one endpoint inside `subquery`, wherever the edge
    /// itself is owned.
    pub fn boundary_edges(&self, subquery: ContainerId) -> Result<Vec<ItemId>> {
        if !self.container(subquery)?.is_subquery() {
            return Err(Error::invalid_argument("the root container has no boundary"));
        }
        let mut out = Vec::new();
        for edge in self.edges(true) {
            let Some((from, to)) = self.edge_data(edge)?.endpoints() else {
                continue;
            };
            let inside = |v: ItemId| self.item(v).is_ok_and(|item| item.container() == Some(subquery));
            if inside(from) != inside(to) {
                out.push(edge);
            }
        }
        Ok(out)
    }

    /// Vertices outside `subquery` that a boundary edge joins to it.
    pub fn anchor_vertices(&self, subquery: ContainerId) -> Result<Vec<ItemId>> {
        let mut out = Vec::new();
        for edge in self.boundary_edges(subquery)? {
            let Some((from, to)) = self.edge_data(edge)?.endpoints() else {
                continue;
            };
            let anchor = if self.item(from)?.container() == Some(subquery) { to } else { from };
            if !out.contains(&anchor) {
                out.push(anchor);
            }
        }
        Ok(out)
    }

    /// Whether the item lives inside a subquery.
    pub fn is_in_subquery(&self, item: ItemId) -> Result<bool> {
        let container = self
            .item(item)?
            .container()
            .ok_or_else(|| Error::invalid_state("item has no owning container"))?;
        Ok(self.container(container)?.is_subquery())
    }

    /// A single unannotated, unmarked composite vertex with no edges,
    /// subqueries or constraints left.
    pub fn is_consolidated(&self) -> bool {
        let Ok(root) = self.container(ContainerId::ROOT) else {
            return false;
        };
        if root.vertices.len() != 1
            || !root.edges.is_empty()
            || !root.subqueries.is_empty()
            || !root.constraints.is_empty()
        {
            return false;
        }
        self.item(root.vertices[0])
            .is_ok_and(|v| v.is_composite() && !v.is_annotated() && !v.is_marked())
    }

    /// Connected components over every vertex and resolved edge, each
    /// ordered by id; components appear in vertex order.
    pub fn connected_components(&self) -> Vec<BTreeSet<ItemId>> {
        let vertices = self.vertices(true);
        let index: FxHashMap<ItemId, usize> =
            vertices.iter().enumerate().map(|(i, v)| (*v, i)).collect();
        let mut parent: Vec<usize> = (0..vertices.len()).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for edge in self.edges(true) {
            let Ok(data) = self.edge_data(edge) else { continue };
            let Some((from, to)) = data.endpoints() else { continue };
            if let (Some(&a), Some(&b)) = (index.get(&from), index.get(&to)) {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra != rb {
                    parent[rb] = ra;
                }
            }
        }

        let mut order: Vec<usize> = Vec::new();
        let mut groups: FxHashMap<usize, BTreeSet<ItemId>> = FxHashMap::default();
        for (i, vertex) in vertices.iter().enumerate() {
            let root = find(&mut parent, i);
            groups
                .entry(root)
                .or_insert_with(|| {
                    order.push(root);
                    BTreeSet::new()
                })
                .insert(*vertex);
        }
        order
            .into_iter()
            .filter_map(|root| groups.remove(&root))
            .collect()
    }

    fn sorted_items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.items.iter().flatten().collect();
        items.sort_by(|a, b| {
            a.catenated_name()
                .cmp(&b.catenated_name())
                .then(a.class().cmp(&b.class()))
        });
        items
    }

    fn constraint_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.constraints(true).iter().map(|c| c.sort_key()).collect();
        keys.sort();
        keys
    }

    /// Structural equality: same items by class, names and provenance, same
    /// number of subqueries, same constraints. Annotations and ids are not
    /// compared.
    pub fn content_eq(&self, other: &Query) -> bool {
        let mine = self.sorted_items();
        let theirs = other.sorted_items();
        mine.len() == theirs.len()
            && mine.iter().zip(&theirs).all(|(a, b)| a.same_identity(b))
            && self.subqueries(true).len() == other.subqueries(true).len()
            && self.constraint_keys() == other.constraint_keys()
    }

    /// Hash over the same fields [`Query::content_eq`] compares, so
    /// content-equal queries share a fingerprint.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        for item in self.sorted_items() {
            hasher.write(item.class().tag().as_bytes());
            for name in item.names() {
                hasher.write(name.as_bytes());
                hasher.write_u8(0);
            }
            if let (true, Some(marker)) = (item.class().supports_provenance(), item.provenance()) {
                hasher.write(marker.source().as_bytes());
                hasher.write_u8(0);
                hasher.write(marker.item().as_bytes());
            }
            hasher.write_u8(0xff);
        }
        hasher.write_u64(self.subqueries(true).len() as u64);
        for key in self.constraint_keys() {
            hasher.write(key.as_bytes());
            hasher.write_u8(0);
        }
        hasher.finish()
    }

    fn fmt_container(&self, f: &mut fmt::Formatter<'_>, id: ContainerId, depth: usize) -> fmt::Result {
        let Ok(container) = self.container(id) else {
            return Ok(());
        };
        let pad = "  ".repeat(depth + 1);
        let render = |ids: &[ItemId]| -> String {
            ids.iter()
                .filter_map(|id| self.item(*id).ok())
                .map(|item| item.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !container.vertices.is_empty() {
            writeln!(f, "{pad}vertices: {}", render(&container.vertices))?;
        }
        if !container.edges.is_empty() {
            writeln!(f, "{pad}edges: {}", render(&container.edges))?;
        }
        for constraint in &container.constraints {
            writeln!(f, "{pad}constraint: {constraint}")?;
        }
        for link in &container.links {
            writeln!(f, "{pad}add-link: {link}")?;
        }
        for (item, source) in &container.cached {
            writeln!(f, "{pad}cached: {item} in '{source}'")?;
        }
        for sub in &container.subqueries {
            match self.container(*sub).ok().and_then(Container::annotation) {
                Some(ann) => writeln!(f, "{pad}subquery {sub}{ann}:")?,
                None => writeln!(f, "{pad}subquery {sub}:")?,
            }
            self.fmt_container(f, *sub, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "query '{}'", self.name)?;
        self.fmt_container(f, ContainerId::ROOT, 0)
    }
}
