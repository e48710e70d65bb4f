use std::fmt;

use crate::error::{Error, Result};

/// Numeric cardinality range attached to a vertex, edge, subquery or
/// constraint.
///
/// A minimum of zero marks the annotated element as negated: the pattern
/// must match when the element is absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Annotation {
    min: Option<u32>,
    max: Option<u32>,
}

impl Annotation {
    /// Creates an annotation; fails when both bounds are set and `min > max`.
    pub fn new(min: Option<u32>, max: Option<u32>) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(Error::invalid_argument(format!(
                    "annotation minimum {lo} exceeds maximum {hi}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// `[n..]`
    pub fn at_least(min: u32) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    /// `[min..max]`
    pub fn range(min: u32, max: u32) -> Result<Self> {
        Self::new(Some(min), Some(max))
    }

    /// `[n..n]`
    pub fn exactly(n: u32) -> Self {
        Self {
            min: Some(n),
            max: Some(n),
        }
    }

    /// Lower bound, if set.
    pub fn min(&self) -> Option<u32> {
        self.min
    }

    /// Upper bound, if set.
    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// Returns `true` when the minimum is exactly zero.
    pub fn is_negated(&self) -> bool {
        self.min == Some(0)
    }

    /// Returns `true` when `count` lies inside the range.
    pub fn admits(&self, count: u64) -> bool {
        count >= u64::from(self.min.unwrap_or(0)) && self.max.map_or(true, |m| count <= u64::from(m))
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        if let Some(min) = self.min {
            write!(f, "{min}")?;
        }
        f.write_str("..")?;
        if let Some(max) = self.max {
            write!(f, "{max}")?;
        }
        f.write_str("]")
    }
}

/// Provenance marker ("asterisk") left on a composite vertex or edge after an
/// annotated vertex with an upper bound was absorbed into it.
///
/// The upper bound still has to be enforced by a later rewrite, which counts
/// the rows named [`Provenance::item`] inside each subgraph.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Provenance {
    source: String,
    item: String,
    max: Option<u32>,
}

impl Provenance {
    /// Records that `source` (a catenated name) was absorbed and that its
    /// instances are identified by rows named `item`.
    pub fn new(source: impl Into<String>, item: impl Into<String>, max: Option<u32>) -> Result<Self> {
        let source = source.into();
        let item = item.into();
        if source.is_empty() || item.is_empty() {
            return Err(Error::invalid_argument("provenance names must be non-empty"));
        }
        Ok(Self { source, item, max })
    }

    /// Catenated name of the absorbed vertex.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Item name counted when the upper bound is applied.
    pub fn item(&self) -> &str {
        &self.item
    }

    /// Upper bound still to be enforced.
    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// Two markers denote the same absorption when source and item agree.
    pub fn same_origin(&self, other: &Provenance) -> bool {
        self.source == other.source && self.item == other.item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(matches!(
            Annotation::new(Some(3), Some(1)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Annotation::new(Some(1), Some(1)).is_ok());
        assert!(Annotation::new(None, None).is_ok());
    }

    #[test]
    fn admits_counts_inside_range() {
        let ann = Annotation::range(1, 3).unwrap();
        assert!(!ann.admits(0));
        assert!(ann.admits(1));
        assert!(ann.admits(3));
        assert!(!ann.admits(4));
        assert!(Annotation::at_least(0).admits(0));
        assert!(Annotation::at_least(0).is_negated());
    }

    #[test]
    fn display_shows_open_bounds() {
        assert_eq!(Annotation::at_least(1).to_string(), "[1..]");
        assert_eq!(Annotation::exactly(2).to_string(), "[2..2]");
        assert_eq!(Annotation::new(None, Some(4)).unwrap().to_string(), "[..4]");
    }

    #[test]
    fn provenance_origin_ignores_bound() {
        let a = Provenance::new("B", "B", Some(2)).unwrap();
        let b = Provenance::new("B", "B", None).unwrap();
        assert!(a.same_origin(&b));
        assert!(Provenance::new("", "B", None).is_err());
    }
}
