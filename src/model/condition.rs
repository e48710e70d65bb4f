use std::cmp::Ordering;
use std::fmt;

use crate::error::{Error, Result};
use crate::value::Value;

/// Comparison operators understood by condition tests and constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `lt`
    Lt,
    /// `le`
    Le,
    /// `gt`
    Gt,
    /// `ge`
    Ge,
    /// `exists`; only meaningful in condition tests.
    Exists,
}

impl CompareOp {
    /// Parses an operator keyword.
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "exists" => CompareOp::Exists,
            _ => return None,
        })
    }

    /// Keyword form.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Exists => "exists",
        }
    }

    /// Whether the operator takes a right-hand operand.
    pub fn is_binary(&self) -> bool {
        !matches!(self, CompareOp::Exists)
    }

    /// Operator that gives the same result with the operands exchanged.
    pub fn swapped(&self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => *other,
        }
    }

    /// Evaluates the operator over two values. Incomparable values never
    /// satisfy an ordering operator; `ne` holds for them.
    pub fn holds(&self, left: &Value, right: &Value) -> bool {
        let ordering = left.compare(right);
        match self {
            CompareOp::Eq => ordering == Some(Ordering::Equal),
            CompareOp::Ne => ordering != Some(Ordering::Equal),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            CompareOp::Exists => !left.is_null(),
        }
    }
}

/// Leaf test of a [`Condition`]. The operator is kept as written so the
/// validator can report unknown keywords.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionTest {
    operator: String,
    attribute: String,
    value: Option<Value>,
}

impl ConditionTest {
    /// Operator keyword as written.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Parsed operator, if the keyword is known.
    pub fn compare_op(&self) -> Option<CompareOp> {
        CompareOp::parse(&self.operator)
    }

    /// Attribute tested.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Right-hand operand, absent for `exists`.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

/// Boolean attribute filter attached to a vertex or edge.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// All children hold.
    And(Vec<Condition>),
    /// At least one child holds.
    Or(Vec<Condition>),
    /// The child does not hold.
    Not(Box<Condition>),
    /// Attribute comparison.
    Test(ConditionTest),
}

impl Condition {
    /// Builds a leaf test. Operator and attribute must be non-empty; whether
    /// the operator is known is left to the validator.
    pub fn test(
        operator: impl Into<String>,
        attribute: impl Into<String>,
        value: Option<Value>,
    ) -> Result<Self> {
        let operator = operator.into();
        let attribute = attribute.into();
        if operator.is_empty() {
            return Err(Error::invalid_argument("condition operator is empty"));
        }
        if attribute.is_empty() {
            return Err(Error::invalid_argument("condition attribute is empty"));
        }
        Ok(Condition::Test(ConditionTest {
            operator,
            attribute,
            value,
        }))
    }

    /// Shorthand for an `eq` test.
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::test("eq", attribute, Some(value.into()))
    }

    /// Visits every leaf test in depth-first order.
    pub fn for_each_test<'a>(&'a self, visit: &mut dyn FnMut(&'a ConditionTest)) {
        match self {
            Condition::And(children) | Condition::Or(children) => {
                for child in children {
                    child.for_each_test(visit);
                }
            }
            Condition::Not(child) => child.for_each_test(visit),
            Condition::Test(test) => visit(test),
        }
    }

    /// Evaluates the condition, looking attributes up through `lookup`.
    /// Tests with an unknown operator never hold.
    pub fn matches(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        match self {
            Condition::And(children) => children.iter().all(|c| c.matches(lookup)),
            Condition::Or(children) => children.iter().any(|c| c.matches(lookup)),
            Condition::Not(child) => !child.matches(lookup),
            Condition::Test(test) => {
                let Some(op) = test.compare_op() else {
                    return false;
                };
                let actual = lookup(&test.attribute).unwrap_or(Value::Null);
                match (&test.value, op) {
                    (_, CompareOp::Exists) => !actual.is_null(),
                    (Some(expected), op) => op.holds(&actual, expected),
                    (None, _) => false,
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::And(children) | Condition::Or(children) => {
                let joiner = if matches!(self, Condition::And(_)) {
                    " and "
                } else {
                    " or "
                };
                f.write_str("(")?;
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Condition::Not(child) => write!(f, "not {child}"),
            Condition::Test(test) => match &test.value {
                Some(value) => write!(f, "{} {} {}", test.attribute, test.operator, value),
                None => write!(f, "{} {}", test.attribute, test.operator),
            },
        }
    }
}
