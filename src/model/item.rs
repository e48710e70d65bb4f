use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

use super::{Annotation, Condition, ContainerId, Provenance};

/// Stable handle of an item inside a [`super::Query`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Item class used by equality: the same names in a different class denote a
/// different item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemClass {
    /// Vertex written by the user.
    Vertex,
    /// Vertex produced by a rewrite, standing for already matched items.
    CompositeVertex,
    /// Edge.
    Edge,
}

impl ItemClass {
    /// Only composite vertices and edges may carry a provenance marker.
    pub fn supports_provenance(&self) -> bool {
        matches!(self, ItemClass::CompositeVertex | ItemClass::Edge)
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            ItemClass::Vertex => "v",
            ItemClass::CompositeVertex => "c",
            ItemClass::Edge => "e",
        }
    }
}

/// Vertex-only fields.
#[derive(Clone, Debug, Default)]
pub struct VertexData {
    composite: bool,
    edges: BTreeSet<ItemId>,
}

impl VertexData {
    /// Whether the vertex was produced by a rewrite.
    pub fn is_composite(&self) -> bool {
        self.composite
    }

    /// Incident edges. A self-loop appears once.
    pub fn edges(&self) -> &BTreeSet<ItemId> {
        &self.edges
    }
}

/// Edge-only fields. Endpoint names are the vertex names written in the
/// query; the endpoint ids follow the vertices those names were merged into.
#[derive(Clone, Debug)]
pub struct EdgeData {
    from: Option<ItemId>,
    to: Option<ItemId>,
    from_name: String,
    to_name: String,
    directed: bool,
}

impl EdgeData {
    /// Current first endpoint, `None` while unresolved.
    pub fn from(&self) -> Option<ItemId> {
        self.from
    }

    /// Current second endpoint, `None` while unresolved.
    pub fn to(&self) -> Option<ItemId> {
        self.to
    }

    /// Vertex name the edge leaves from.
    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    /// Vertex name the edge arrives at.
    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    /// Whether link direction matters when matching.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Both endpoints, when resolved.
    pub fn endpoints(&self) -> Option<(ItemId, ItemId)> {
        Some((self.from?, self.to?))
    }

    /// Endpoint opposite to `vertex`; `None` when `vertex` is not an endpoint.
    pub fn other_endpoint(&self, vertex: ItemId) -> Option<ItemId> {
        let (from, to) = self.endpoints()?;
        if from == vertex {
            Some(to)
        } else if to == vertex {
            Some(from)
        } else {
            None
        }
    }

    /// Both endpoints resolve to the same vertex.
    pub fn is_self_loop(&self) -> bool {
        matches!(self.endpoints(), Some((a, b)) if a == b)
    }

    /// Endpoint name that belongs to `vertex`, given the vertex's names.
    pub fn endpoint_name_in(&self, names: &[String]) -> Option<&str> {
        if names.iter().any(|n| n == &self.from_name) {
            Some(&self.from_name)
        } else if names.iter().any(|n| n == &self.to_name) {
            Some(&self.to_name)
        } else {
            None
        }
    }
}

/// Vertex or edge payload.
#[derive(Clone, Debug)]
pub enum ItemKind {
    /// Vertex fields.
    Vertex(VertexData),
    /// Edge fields.
    Edge(EdgeData),
}

/// A named vertex or edge of a query.
///
/// Names are kept sorted. Only composite vertices hold more than one name.
#[derive(Clone, Debug)]
pub struct Item {
    names: SmallVec<[String; 1]>,
    kind: ItemKind,
    condition: Option<Condition>,
    annotation: Option<Annotation>,
    provenance: Option<Provenance>,
    container: Option<ContainerId>,
}

impl Item {
    /// New plain vertex.
    pub fn vertex(name: impl Into<String>) -> Result<Self> {
        let name = checked_name(name.into())?;
        Ok(Self::with_kind(
            SmallVec::from_elem(name, 1),
            ItemKind::Vertex(VertexData::default()),
        ))
    }

    /// New composite vertex carrying `names`.
    pub fn composite<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: SmallVec<[String; 1]> = SmallVec::new();
        for name in names {
            collected.push(checked_name(name.into())?);
        }
        if collected.is_empty() {
            return Err(Error::invalid_argument("composite vertex needs at least one name"));
        }
        collected.sort();
        collected.dedup();
        Ok(Self::with_kind(
            collected,
            ItemKind::Vertex(VertexData {
                composite: true,
                edges: BTreeSet::new(),
            }),
        ))
    }

    /// New edge between the vertices named `from` and `to`.
    pub fn edge(
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        directed: bool,
    ) -> Result<Self> {
        let name = checked_name(name.into())?;
        let from_name = from.into();
        let to_name = to.into();
        if from_name.is_empty() || to_name.is_empty() {
            return Err(Error::invalid_argument(format!(
                "edge '{name}' has an empty endpoint name"
            )));
        }
        Ok(Self::with_kind(
            SmallVec::from_elem(name, 1),
            ItemKind::Edge(EdgeData {
                from: None,
                to: None,
                from_name,
                to_name,
                directed,
            }),
        ))
    }

    fn with_kind(names: SmallVec<[String; 1]>, kind: ItemKind) -> Self {
        Self {
            names,
            kind,
            condition: None,
            annotation: None,
            provenance: None,
            container: None,
        }
    }

    /// Builder: attach a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Builder: attach an annotation.
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Sorted names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// First name in sort order.
    pub fn first_name(&self) -> &str {
        &self.names[0]
    }

    /// Names joined with `.`; identifies the item in plans and temp tables.
    pub fn catenated_name(&self) -> String {
        self.names.join(".")
    }

    /// Whether `name` is one of the item's names.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Item class.
    pub fn class(&self) -> ItemClass {
        match &self.kind {
            ItemKind::Vertex(v) if v.composite => ItemClass::CompositeVertex,
            ItemKind::Vertex(_) => ItemClass::Vertex,
            ItemKind::Edge(_) => ItemClass::Edge,
        }
    }

    /// Payload.
    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Vertex payload, if a vertex.
    pub fn as_vertex(&self) -> Option<&VertexData> {
        match &self.kind {
            ItemKind::Vertex(v) => Some(v),
            ItemKind::Edge(_) => None,
        }
    }

    /// Edge payload, if an edge.
    pub fn as_edge(&self) -> Option<&EdgeData> {
        match &self.kind {
            ItemKind::Edge(e) => Some(e),
            ItemKind::Vertex(_) => None,
        }
    }

    /// Whether the item is a vertex (plain or composite).
    pub fn is_vertex(&self) -> bool {
        matches!(self.kind, ItemKind::Vertex(_))
    }

    /// Whether the item is an edge.
    pub fn is_edge(&self) -> bool {
        matches!(self.kind, ItemKind::Edge(_))
    }

    /// Whether the item is a composite vertex.
    pub fn is_composite(&self) -> bool {
        self.class() == ItemClass::CompositeVertex
    }

    /// Attribute condition.
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Numeric annotation.
    pub fn annotation(&self) -> Option<Annotation> {
        self.annotation
    }

    /// Whether the item carries an annotation.
    pub fn is_annotated(&self) -> bool {
        self.annotation.is_some()
    }

    /// Provenance marker.
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Whether the item carries a provenance marker.
    pub fn is_marked(&self) -> bool {
        self.provenance.is_some()
    }

    /// Owning container; `None` until the item is added to a query.
    pub fn container(&self) -> Option<ContainerId> {
        self.container
    }

    /// Replaces the annotation.
    pub fn set_annotation(&mut self, annotation: Option<Annotation>) {
        self.annotation = annotation;
    }

    /// Sets or clears the provenance marker. Plain vertices cannot carry one.
    pub fn set_provenance(&mut self, provenance: Option<Provenance>) -> Result<()> {
        if provenance.is_some() && !self.class().supports_provenance() {
            return Err(Error::invalid_state(format!(
                "vertex '{}' cannot carry a provenance marker",
                self.catenated_name()
            )));
        }
        self.provenance = provenance;
        Ok(())
    }

    /// Same class, same names, and for classes that support it the same
    /// provenance origin.
    pub fn same_identity(&self, other: &Item) -> bool {
        if self.class() != other.class() || self.names != other.names {
            return false;
        }
        if !self.class().supports_provenance() {
            return true;
        }
        match (&self.provenance, &other.provenance) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_origin(b),
            _ => false,
        }
    }

    pub(crate) fn add_names(&mut self, names: &[String]) -> Result<()> {
        if self.class() != ItemClass::CompositeVertex {
            return Err(Error::invalid_state(format!(
                "only composite vertices gain names, not '{}'",
                self.catenated_name()
            )));
        }
        self.names.extend(names.iter().cloned());
        self.names.sort();
        self.names.dedup();
        Ok(())
    }

    pub(crate) fn set_container(&mut self, container: Option<ContainerId>) {
        self.container = container;
    }

    pub(crate) fn vertex_mut(&mut self) -> Option<&mut VertexData> {
        match &mut self.kind {
            ItemKind::Vertex(v) => Some(v),
            ItemKind::Edge(_) => None,
        }
    }

    pub(crate) fn edge_mut(&mut self) -> Option<&mut EdgeData> {
        match &mut self.kind {
            ItemKind::Edge(e) => Some(e),
            ItemKind::Vertex(_) => None,
        }
    }
}

impl VertexData {
    pub(crate) fn attach(&mut self, edge: ItemId) {
        self.edges.insert(edge);
    }

    pub(crate) fn detach(&mut self, edge: ItemId) {
        self.edges.remove(&edge);
    }
}

impl EdgeData {
    pub(crate) fn set_from(&mut self, vertex: Option<ItemId>) {
        self.from = vertex;
    }

    pub(crate) fn set_to(&mut self, vertex: Option<ItemId>) {
        self.to = vertex;
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ItemKind::Vertex(v) if v.composite => write!(f, "{{{}}}", self.catenated_name())?,
            ItemKind::Vertex(_) => f.write_str(self.first_name())?,
            ItemKind::Edge(e) => {
                let arrow = if e.directed { "->" } else { "--" };
                write!(f, "{}({} {arrow} {})", self.first_name(), e.from_name, e.to_name)?
            }
        }
        if let Some(ann) = self.annotation {
            write!(f, "{ann}")?;
        }
        if self.provenance.is_some() {
            f.write_str("*")?;
        }
        Ok(())
    }
}

fn checked_name(name: String) -> Result<String> {
    if name.is_empty() {
        return Err(Error::invalid_argument("item name is empty"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_names_are_sorted_and_catenated() {
        let item = Item::composite(["Y", "A", "B"]).unwrap();
        assert_eq!(item.names(), ["A", "B", "Y"]);
        assert_eq!(item.catenated_name(), "A.B.Y");
        assert_eq!(item.first_name(), "A");
        assert!(Item::composite(Vec::<String>::new()).is_err());
    }

    #[test]
    fn plain_vertices_reject_provenance() {
        let mut plain = Item::vertex("A").unwrap();
        let marker = Provenance::new("B", "B", Some(1)).unwrap();
        assert!(plain.set_provenance(Some(marker.clone())).is_err());
        let mut composite = Item::composite(["A"]).unwrap();
        composite.set_provenance(Some(marker)).unwrap();
        assert!(composite.is_marked());
    }

    #[test]
    fn identity_depends_on_class_and_marker() {
        let plain = Item::vertex("A").unwrap();
        let composite = Item::composite(["A"]).unwrap();
        assert!(!plain.same_identity(&composite));

        let mut marked = composite.clone();
        marked
            .set_provenance(Some(Provenance::new("B", "B", None).unwrap()))
            .unwrap();
        assert!(!composite.same_identity(&marked));
        assert!(marked.same_identity(&marked.clone()));
    }

    #[test]
    fn edge_requires_endpoint_names() {
        assert!(Item::edge("Y", "A", "", true).is_err());
        let edge = Item::edge("Y", "A", "B", true).unwrap();
        let data = edge.as_edge().unwrap();
        assert_eq!(data.endpoint_name_in(&["B".to_owned()]), Some("B"));
        assert_eq!(data.endpoints(), None);
        assert_eq!(edge.to_string(), "Y(A -> B)");
    }
}
