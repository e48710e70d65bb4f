//! JSON description of a query, the boundary format read by the CLI.
//!
//! ```json
//! {
//!   "name": "cites",
//!   "vertices": [{"name": "A"}, {"name": "B", "annotation": {"min": 1}}],
//!   "edges": [{"name": "Y", "from": "A", "to": "B", "directed": true,
//!              "annotation": {"min": 1}}]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::value::Value;

use super::{
    Annotation, Condition, Constraint, ConstraintSide, ContainerId, DerivedLinkSpec, Item, Query,
};

/// Top-level query description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescription {
    /// Query name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Root container members.
    #[serde(flatten)]
    pub body: BodyDescription,
}

/// Members of the root query or of a subquery.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDescription {
    /// Vertices.
    pub vertices: Vec<VertexDescription>,
    /// Edges.
    pub edges: Vec<EdgeDescription>,
    /// Nested subqueries.
    pub subqueries: Vec<SubqueryDescription>,
    /// Constraints.
    pub constraints: Vec<ConstraintDescription>,
    /// Derived links.
    pub add_links: Vec<AddLinkDescription>,
    /// Cached items.
    pub cached: Vec<CachedDescription>,
}

/// Vertex entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VertexDescription {
    /// Vertex name.
    pub name: String,
    /// Attribute condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionDescription>,
    /// Cardinality annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<AnnotationDescription>,
}

/// Edge entry; `from` and `to` name vertices anywhere in the query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescription {
    /// Edge name.
    pub name: String,
    /// Source vertex name.
    pub from: String,
    /// Target vertex name.
    pub to: String,
    /// Whether link direction matters.
    #[serde(default)]
    pub directed: bool,
    /// Attribute condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionDescription>,
    /// Cardinality annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<AnnotationDescription>,
}

/// Subquery entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubqueryDescription {
    /// Cardinality of the subquery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<AnnotationDescription>,
    /// Subquery members.
    #[serde(flatten)]
    pub body: BodyDescription,
}

/// `{"min": 1, "max": 3}`; either bound may be omitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDescription {
    /// Lower bound.
    #[serde(default)]
    pub min: Option<u32>,
    /// Upper bound.
    #[serde(default)]
    pub max: Option<u32>,
}

/// Condition tree: `{"and": [...]}`, `{"or": [...]}`, `{"not": {...}}` or
/// `{"test": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionDescription {
    /// Conjunction.
    And(Vec<ConditionDescription>),
    /// Disjunction.
    Or(Vec<ConditionDescription>),
    /// Negation.
    Not(Box<ConditionDescription>),
    /// Leaf test.
    Test(TestDescription),
}

/// Leaf test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDescription {
    /// Operator keyword.
    pub operator: String,
    /// Attribute name.
    pub attribute: String,
    /// Right-hand literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Constraint operand: an item object or a bare literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandDescription {
    /// Named item.
    Item {
        /// Item name.
        item: String,
        /// Attribute name; identity comparison when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
    },
    /// Constant.
    Literal(Value),
}

/// Constraint entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDescription {
    /// Operator keyword.
    pub operator: String,
    /// Left operand.
    pub left: OperandDescription,
    /// Right operand.
    pub right: OperandDescription,
    /// Item the annotation applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_item: Option<String>,
    /// Constraint annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<AnnotationDescription>,
}

/// Derived link entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddLinkDescription {
    /// Source vertex name.
    pub from: String,
    /// Target vertex name.
    pub to: String,
    /// Attribute written on new links.
    pub attribute: String,
    /// Attribute value.
    pub value: String,
}

/// Cached item entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedDescription {
    /// Item name.
    pub item: String,
    /// Container holding the item's results.
    pub container: String,
}

impl QueryDescription {
    /// Parses a JSON description.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Builds the query. Vertices of every container are added before any
    /// edge so edges may reference vertices in other containers; endpoints
    /// that name no vertex are left unresolved for the validator to report.
    pub fn build(&self) -> Result<Query> {
        let mut query = Query::new(self.name.clone(), self.description.clone());
        let root = query.root();
        let mut bodies: Vec<(ContainerId, &BodyDescription)> = Vec::new();
        add_vertices(&mut query, root, &self.body, &mut bodies)?;
        for (container, body) in &bodies {
            for edge in &body.edges {
                let mut item = Item::edge(&edge.name, &edge.from, &edge.to, edge.directed)?;
                if let Some(condition) = &edge.condition {
                    item = item.with_condition(condition.build()?);
                }
                if let Some(annotation) = edge.annotation {
                    item = item.with_annotation(annotation.build()?);
                }
                query.add_edge(*container, item)?;
            }
        }
        for (container, body) in &bodies {
            for constraint in &body.constraints {
                query.add_constraint(*container, constraint.build()?)?;
            }
            for link in &body.add_links {
                let spec = DerivedLinkSpec::new(&link.from, &link.to, &link.attribute, &link.value)?;
                query.add_derived_link(*container, spec)?;
            }
            for cached in &body.cached {
                query.add_cached_item(*container, &cached.item, &cached.container)?;
            }
        }
        Ok(query)
    }
}

fn add_vertices<'a>(
    query: &mut Query,
    container: ContainerId,
    body: &'a BodyDescription,
    bodies: &mut Vec<(ContainerId, &'a BodyDescription)>,
) -> Result<()> {
    bodies.push((container, body));
    for vertex in &body.vertices {
        let mut item = Item::vertex(&vertex.name)?;
        if let Some(condition) = &vertex.condition {
            item = item.with_condition(condition.build()?);
        }
        if let Some(annotation) = vertex.annotation {
            item = item.with_annotation(annotation.build()?);
        }
        query.add_vertex(container, item)?;
    }
    for sub in &body.subqueries {
        let annotation = sub.annotation.map(|a| a.build()).transpose()?;
        let id = query.add_subquery(container, annotation)?;
        add_vertices(query, id, &sub.body, bodies)?;
    }
    Ok(())
}

impl AnnotationDescription {
    /// Validated annotation.
    pub fn build(&self) -> Result<Annotation> {
        Annotation::new(self.min, self.max)
    }
}

impl ConditionDescription {
    /// Condition tree.
    pub fn build(&self) -> Result<Condition> {
        Ok(match self {
            ConditionDescription::And(children) => {
                Condition::And(children.iter().map(Self::build).collect::<Result<_>>()?)
            }
            ConditionDescription::Or(children) => {
                Condition::Or(children.iter().map(Self::build).collect::<Result<_>>()?)
            }
            ConditionDescription::Not(child) => Condition::Not(Box::new(child.build()?)),
            ConditionDescription::Test(test) => {
                Condition::test(&test.operator, &test.attribute, test.value.clone())?
            }
        })
    }
}

impl OperandDescription {
    fn build(&self) -> ConstraintSide {
        match self {
            OperandDescription::Item {
                item,
                attribute: Some(attr),
            } => ConstraintSide::attribute(item, attr),
            OperandDescription::Item { item, attribute: None } => ConstraintSide::item(item),
            OperandDescription::Literal(value) => ConstraintSide::literal(value.clone()),
        }
    }
}

impl ConstraintDescription {
    /// Constraint.
    pub fn build(&self) -> Result<Constraint> {
        let constraint = Constraint::new(&self.operator, self.left.build(), self.right.build())?;
        match (&self.annotated_item, self.annotation) {
            (Some(item), Some(annotation)) => constraint.with_annotation(item, annotation.build()?),
            _ => Ok(constraint),
        }
    }
}
