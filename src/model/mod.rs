//! Query model: vertices, edges, subqueries, constraints and derived links.
//!
//! A [`Query`] owns every item in an arena keyed by [`ItemId`] and every
//! container (the root query and its subqueries) keyed by [`ContainerId`].
//! Ids stay stable across `clone`, so a copied query can be edited with the
//! ids that were looked up on the original.

mod annotation;
mod condition;
mod constraint;
mod container;
mod description;
mod item;
mod query;

pub use annotation::{Annotation, Provenance};
pub use condition::{CompareOp, Condition, ConditionTest};
pub use constraint::{Constraint, ConstraintSide, DerivedLinkSpec};
pub use container::{Container, ContainerId, ContainerKind};
pub use description::{
    AddLinkDescription, AnnotationDescription, BodyDescription, CachedDescription,
    ConditionDescription, ConstraintDescription, EdgeDescription, OperandDescription,
    QueryDescription, SubqueryDescription, TestDescription, VertexDescription,
};
pub use item::{EdgeData, Item, ItemClass, ItemId, ItemKind, VertexData};
pub use query::Query;
