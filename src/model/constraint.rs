use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

use super::Annotation;

/// One operand of a [`Constraint`]: an item, optionally narrowed to one of
/// its attributes, or a literal value. An item without an attribute is
/// compared by identity.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintSide {
    /// A named item of the query.
    Item {
        /// Item name.
        item: String,
        /// Attribute compared instead of the item's identity.
        attribute: Option<String>,
    },
    /// A constant the other operand is compared with.
    Literal(Value),
}

impl ConstraintSide {
    /// Compares the item's identity.
    pub fn item(item: impl Into<String>) -> Self {
        ConstraintSide::Item {
            item: item.into(),
            attribute: None,
        }
    }

    /// Compares one attribute of the item.
    pub fn attribute(item: impl Into<String>, attribute: impl Into<String>) -> Self {
        ConstraintSide::Item {
            item: item.into(),
            attribute: Some(attribute.into()),
        }
    }

    /// Compares with a constant.
    pub fn literal(value: impl Into<Value>) -> Self {
        ConstraintSide::Literal(value.into())
    }

    /// Item name; `None` for a literal.
    pub fn item_name(&self) -> Option<&str> {
        match self {
            ConstraintSide::Item { item, .. } => Some(item),
            ConstraintSide::Literal(_) => None,
        }
    }

    /// Attribute name, if any.
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            ConstraintSide::Item { attribute, .. } => attribute.as_deref(),
            ConstraintSide::Literal(_) => None,
        }
    }

    /// The constant, for a literal operand.
    pub fn literal_value(&self) -> Option<&Value> {
        match self {
            ConstraintSide::Literal(value) => Some(value),
            ConstraintSide::Item { .. } => None,
        }
    }
}

impl fmt::Display for ConstraintSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintSide::Item {
                item,
                attribute: Some(attr),
            } => write!(f, "{item}.{attr}"),
            ConstraintSide::Item { item, attribute: None } => write!(f, "{item}.id"),
            ConstraintSide::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// Relation that must hold between two items of every matching subgraph.
///
/// Equality compares the operator and both operands only.
#[derive(Clone, Debug)]
pub struct Constraint {
    operator: String,
    left: ConstraintSide,
    right: ConstraintSide,
    annotation: Option<Annotation>,
    annotated_item: Option<String>,
    on_edges: bool,
}

impl Constraint {
    /// Creates a constraint; item names and operator must be non-empty and at
    /// least one operand must name an item.
    pub fn new(operator: impl Into<String>, left: ConstraintSide, right: ConstraintSide) -> Result<Self> {
        let operator = operator.into();
        if operator.is_empty() {
            return Err(Error::invalid_argument("constraint operator is empty"));
        }
        if left.item_name() == Some("") || right.item_name() == Some("") {
            return Err(Error::invalid_argument("constraint item name is empty"));
        }
        if left.item_name().is_none() && right.item_name().is_none() {
            return Err(Error::invalid_argument("constraint relates two literals"));
        }
        Ok(Self {
            operator,
            left,
            right,
            annotation: None,
            annotated_item: None,
            on_edges: false,
        })
    }

    /// Annotates one of the two related items.
    pub fn with_annotation(mut self, item: impl Into<String>, annotation: Annotation) -> Result<Self> {
        let item = item.into();
        if !self.item_names().contains(&item.as_str()) {
            return Err(Error::invalid_argument(format!(
                "annotated item '{item}' is not related by the constraint"
            )));
        }
        self.annotated_item = Some(item);
        self.annotation = Some(annotation);
        Ok(self)
    }

    /// Operator keyword as written.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Left operand.
    pub fn left(&self) -> &ConstraintSide {
        &self.left
    }

    /// Right operand.
    pub fn right(&self) -> &ConstraintSide {
        &self.right
    }

    /// Names of the related items, left first; a literal operand names none.
    pub fn item_names(&self) -> Vec<&str> {
        [&self.left, &self.right]
            .into_iter()
            .filter_map(ConstraintSide::item_name)
            .collect()
    }

    /// Whether one operand is a constant.
    pub fn has_literal(&self) -> bool {
        self.left.literal_value().is_some() || self.right.literal_value().is_some()
    }

    /// Annotation on the constraint, if any.
    pub fn annotation(&self) -> Option<Annotation> {
        self.annotation
    }

    /// Name of the annotated item, if any.
    pub fn annotated_item(&self) -> Option<&str> {
        self.annotated_item.as_deref()
    }

    /// Whether the related items are edges (links) rather than vertices.
    pub fn on_edges(&self) -> bool {
        self.on_edges
    }

    pub(crate) fn set_on_edges(&mut self, on_edges: bool) {
        self.on_edges = on_edges;
    }

    /// Both operands are items and only one names an attribute.
    pub fn has_mixed_operands(&self) -> bool {
        match (&self.left, &self.right) {
            (
                ConstraintSide::Item { attribute: left, .. },
                ConstraintSide::Item { attribute: right, .. },
            ) => left.is_some() != right.is_some(),
            _ => false,
        }
    }

    pub(crate) fn sort_key(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator && self.left == other.left && self.right == other.right
    }
}

impl Eq for Constraint {}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator, self.right)?;
        if let (Some(item), Some(ann)) = (&self.annotated_item, &self.annotation) {
            write!(f, " {item}{ann}")?;
        }
        Ok(())
    }
}

/// Request to create a link between the objects bound to two vertices in
/// every subgraph of the result container.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DerivedLinkSpec {
    from: String,
    to: String,
    attribute: String,
    value: String,
}

impl DerivedLinkSpec {
    /// Links objects named `from` to objects named `to`, tagging each new
    /// link with `attribute = value`.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let spec = Self {
            from: from.into(),
            to: to.into(),
            attribute: attribute.into(),
            value: value.into(),
        };
        if spec.from.is_empty() || spec.to.is_empty() || spec.attribute.is_empty() {
            return Err(Error::invalid_argument(
                "derived link needs non-empty vertex and attribute names",
            ));
        }
        Ok(spec)
    }

    /// Source vertex name.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Target vertex name.
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Attribute written on created links.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Attribute value written on created links.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for DerivedLinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({}={})", self.from, self.to, self.attribute, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_annotation() {
        let plain = Constraint::new(
            "eq",
            ConstraintSide::attribute("A", "year"),
            ConstraintSide::attribute("B", "year"),
        )
        .unwrap();
        let annotated = plain
            .clone()
            .with_annotation("B", Annotation::at_least(1))
            .unwrap();
        assert_eq!(plain, annotated);
        assert_eq!(plain.to_string(), "A.year eq B.year");
        assert_eq!(annotated.to_string(), "A.year eq B.year B[1..]");
    }

    #[test]
    fn annotation_must_target_a_side() {
        let c = Constraint::new("ne", ConstraintSide::item("A"), ConstraintSide::item("B")).unwrap();
        assert!(c.with_annotation("C", Annotation::at_least(1)).is_err());
    }

    #[test]
    fn literal_operands_compare_with_a_constant() {
        let c = Constraint::new("gt", ConstraintSide::attribute("A", "age"), ConstraintSide::literal(35_i64))
            .unwrap();
        assert_eq!(c.to_string(), "A.age gt 35");
        assert_eq!(c.item_names(), ["A"]);
        assert!(c.has_literal());
        assert!(!c.has_mixed_operands());
        let quoted = Constraint::new("eq", ConstraintSide::literal("35"), ConstraintSide::attribute("A", "age"))
            .unwrap();
        assert_eq!(quoted.to_string(), "\"35\" eq A.age");
        assert_ne!(c.sort_key(), quoted.sort_key());
        assert!(quoted.clone().with_annotation("A", Annotation::at_least(0)).is_ok());
    }

    #[test]
    fn two_literals_are_rejected() {
        let err = Constraint::new("eq", ConstraintSide::literal(1_i64), ConstraintSide::literal(1_i64));
        assert!(err.is_err());
    }

    #[test]
    fn derived_link_requires_names() {
        assert!(DerivedLinkSpec::new("A", "", "rel", "x").is_err());
        let spec = DerivedLinkSpec::new("A", "B", "rel", "cites").unwrap();
        assert_eq!(spec.to_string(), "A -> B (rel=cites)");
    }
}
