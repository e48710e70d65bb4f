use std::collections::BTreeMap;
use std::fmt;

use super::{Annotation, Constraint, DerivedLinkSpec, ItemId};

/// Stable handle of the root query or one of its subqueries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub u32);

impl ContainerId {
    /// The root query container.
    pub const ROOT: ContainerId = ContainerId(0);
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Root or subquery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    /// The root query.
    Query,
    /// A nested subquery.
    Subquery {
        /// Enclosing container.
        parent: ContainerId,
        /// Cardinality of the subquery as a whole.
        annotation: Option<Annotation>,
    },
}

/// Members of one query or subquery, each list in insertion order.
#[derive(Clone, Debug)]
pub struct Container {
    pub(crate) kind: ContainerKind,
    pub(crate) vertices: Vec<ItemId>,
    pub(crate) edges: Vec<ItemId>,
    pub(crate) subqueries: Vec<ContainerId>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) links: Vec<DerivedLinkSpec>,
    pub(crate) cached: BTreeMap<String, String>,
}

impl Container {
    pub(crate) fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            vertices: Vec::new(),
            edges: Vec::new(),
            subqueries: Vec::new(),
            constraints: Vec::new(),
            links: Vec::new(),
            cached: BTreeMap::new(),
        }
    }

    /// Root or subquery.
    pub fn kind(&self) -> &ContainerKind {
        &self.kind
    }

    /// Whether this is a subquery.
    pub fn is_subquery(&self) -> bool {
        matches!(self.kind, ContainerKind::Subquery { .. })
    }

    /// Enclosing container of a subquery.
    pub fn parent(&self) -> Option<ContainerId> {
        match self.kind {
            ContainerKind::Subquery { parent, .. } => Some(parent),
            ContainerKind::Query => None,
        }
    }

    /// Annotation of a subquery.
    pub fn annotation(&self) -> Option<Annotation> {
        match self.kind {
            ContainerKind::Subquery { annotation, .. } => annotation,
            ContainerKind::Query => None,
        }
    }

    /// Owned vertices.
    pub fn vertices(&self) -> &[ItemId] {
        &self.vertices
    }

    /// Owned edges.
    pub fn edges(&self) -> &[ItemId] {
        &self.edges
    }

    /// Direct subqueries.
    pub fn subqueries(&self) -> &[ContainerId] {
        &self.subqueries
    }

    /// Constraints declared on this container.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Derived links declared on this container.
    pub fn derived_links(&self) -> &[DerivedLinkSpec] {
        &self.links
    }

    /// Item name -> name of the container already holding its results.
    pub fn cached_items(&self) -> &BTreeMap<String, String> {
        &self.cached
    }

    /// Whether the container owns no vertices, edges or subqueries.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.edges.is_empty() && self.subqueries.is_empty()
    }
}
