//! Table backend seams used by rewrite steps and the executor.
//!
//! Three traits split the backend by concern:
//! - [`TableEngine`] manipulates temporary tables,
//! - [`SourceScope`] answers "which objects and links match" over the data
//!   being queried,
//! - [`ContainerStore`] persists result containers.
//!
//! [`MemoryBackend`] implements all three for tests and the CLI.

mod import;
mod memory;

use thiserror::Error;

use crate::model::{CompareOp, Condition};
use crate::value::Value;

pub use import::{ImportError, ImportSummary, LinkImport, ObjectImport};
pub use memory::{ContainerSnapshot, MemoryBackend, Row};

/// Item id column of a subgraph-item table.
pub const ITEM_ID: &str = "item_id";
/// Subgraph id column of a subgraph-item table.
pub const SUBG_ID: &str = "subg_id";
/// Query item name column of a subgraph-item table.
pub const NAME: &str = "name";
/// Column layout of every subgraph-item table.
pub const SGI_COLUMNS: [&str; 3] = [ITEM_ID, SUBG_ID, NAME];

/// Object id column returned by [`SourceScope::matching_objects`].
pub const OBJECT_ID: &str = "o_id";
/// Link id column returned by [`SourceScope::matching_links`].
pub const LINK_ID: &str = "link_id";
/// Link source object column.
pub const LINK_O1: &str = "o1_id";
/// Link target object column.
pub const LINK_O2: &str = "o2_id";
/// Id column returned by [`SourceScope::attribute_values`].
pub const ATTR_ID: &str = "id";
/// Value column returned by [`SourceScope::attribute_values`].
pub const ATTR_VALUE: &str = "value";

/// Handle of a temporary table owned by a [`TableEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub u64);

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Failures reported by a backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// The table was never created or was already released.
    #[error("unknown table {0}")]
    UnknownTable(TableId),
    /// A referenced column does not exist.
    #[error("table {table} has no column '{column}'")]
    UnknownColumn {
        /// Table inspected.
        table: TableId,
        /// Missing column.
        column: String,
    },
    /// A column with that name already exists.
    #[error("table {table} already has a column '{column}'")]
    ColumnExists {
        /// Table modified.
        table: TableId,
        /// Clashing column.
        column: String,
    },
    /// Tables with different layouts were combined.
    #[error("schema mismatch: {0}")]
    Schema(String),
    /// A container with that name already exists.
    #[error("container already exists: '{0}'")]
    ContainerExists(String),
    /// No container with that name exists.
    #[error("unknown container '{0}'")]
    UnknownContainer(String),
    /// Import or other backend-specific failure.
    #[error("{0}")]
    Message(String),
}

/// Convenience alias for backend results.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Which side of a join a projected column comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinSide {
    /// Left input.
    Left,
    /// Right input.
    Right,
}

/// Column projected out of a join, possibly renamed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinColumn {
    /// Input side.
    pub side: JoinSide,
    /// Column name in the input.
    pub column: String,
    /// Column name in the output.
    pub alias: String,
}

impl JoinColumn {
    /// Left column under `alias`.
    pub fn left(column: &str, alias: &str) -> Self {
        Self {
            side: JoinSide::Left,
            column: column.to_owned(),
            alias: alias.to_owned(),
        }
    }

    /// Right column under `alias`.
    pub fn right(column: &str, alias: &str) -> Self {
        Self {
            side: JoinSide::Right,
            column: column.to_owned(),
            alias: alias.to_owned(),
        }
    }
}

/// Operand of a row filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Cell of the named column.
    Column(String),
    /// Constant.
    Value(Value),
}

/// Predicate over table rows.
#[derive(Clone, Debug, PartialEq)]
pub enum RowFilter {
    /// Comparison between two operands.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// Every child holds. An empty list holds for every row.
    All(Vec<RowFilter>),
}

impl RowFilter {
    /// `column op value`
    pub fn column_value(column: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        RowFilter::Compare {
            left: Operand::Column(column.to_owned()),
            op,
            right: Operand::Value(value.into()),
        }
    }

    /// `left op right` over two columns.
    pub fn columns(left: &str, op: CompareOp, right: &str) -> Self {
        RowFilter::Compare {
            left: Operand::Column(left.to_owned()),
            op,
            right: Operand::Column(right.to_owned()),
        }
    }
}

/// Relational operations over temporary tables.
///
/// Operations that return a [`TableId`] create a new table the caller owns
/// and must eventually [`TableEngine::release`]. Inputs are never modified
/// except by the in-place column operations.
pub trait TableEngine: Send + Sync {
    /// Creates an empty table with the given columns.
    fn create_table(&self, columns: &[&str]) -> BackendResult<TableId>;
    /// Column names of a table.
    fn columns(&self, table: TableId) -> BackendResult<Vec<String>>;
    /// Inner equi-join on pairs of (left column, right column).
    fn join(
        &self,
        left: TableId,
        right: TableId,
        on: &[(&str, &str)],
        project: &[JoinColumn],
    ) -> BackendResult<TableId>;
    /// Rows of `left` with no match in `right` on the given column pairs.
    fn anti_join(&self, left: TableId, right: TableId, on: &[(&str, &str)]) -> BackendResult<TableId>;
    /// Rows satisfying `filter`.
    fn filter(&self, table: TableId, filter: &RowFilter) -> BackendResult<TableId>;
    /// Distinct rows projected onto `columns`.
    fn distinct(&self, table: TableId, columns: &[&str]) -> BackendResult<TableId>;
    /// Renames a column in place.
    fn rename_column(&self, table: TableId, from: &str, to: &str) -> BackendResult<()>;
    /// Appends a column holding `value` in every row.
    fn add_constant_column(&self, table: TableId, column: &str, value: Value) -> BackendResult<()>;
    /// Appends a column numbering rows from 1.
    fn add_row_number(&self, table: TableId, column: &str) -> BackendResult<()>;
    /// Groups by `keys`, adding the group size as `count_column`.
    fn count_by(&self, table: TableId, keys: &[&str], count_column: &str) -> BackendResult<TableId>;
    /// Concatenates tables that share a column set; columns are matched by
    /// name and laid out like the first input.
    fn union(&self, tables: &[TableId]) -> BackendResult<TableId>;
    /// Copies a table.
    fn copy(&self, table: TableId) -> BackendResult<TableId>;
    /// Number of rows.
    fn row_count(&self, table: TableId) -> BackendResult<usize>;
    /// Drops a table.
    fn release(&self, table: TableId) -> BackendResult<()>;
}

/// Kind of source element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Objects (matched by vertices).
    Object,
    /// Links (matched by edges).
    Link,
}

/// The data a query runs against.
pub trait SourceScope {
    /// Objects satisfying `condition`, as a one-column table `o_id`.
    fn matching_objects(&self, condition: Option<&Condition>) -> BackendResult<TableId>;
    /// Links satisfying `condition`, as `link_id, o1_id, o2_id`.
    fn matching_links(&self, condition: Option<&Condition>) -> BackendResult<TableId>;
    /// Values of `attribute` for every object or link that has it, as
    /// `id, value`.
    fn attribute_values(&self, kind: SourceKind, attribute: &str) -> BackendResult<TableId>;
}

/// Persistent result containers.
pub trait ContainerStore {
    /// Whether a container named `name` exists.
    fn has_child(&self, name: &str) -> BackendResult<bool>;
    /// Deletes the container named `name`.
    fn delete_child(&self, name: &str) -> BackendResult<()>;
    /// Creates a container from copies of two subgraph-item tables.
    fn create_child_from_temp_tables(
        &self,
        name: &str,
        objects: TableId,
        links: TableId,
    ) -> BackendResult<()>;
    /// Copies the rows of `container` whose item name is in `names`, as two
    /// new subgraph-item tables (objects, links).
    fn item_tables(&self, container: &str, names: &[&str]) -> BackendResult<(TableId, TableId)>;
    /// Creates one link per row of `from, to` (plus `attr_*` columns that
    /// become link attributes); returns the number created.
    fn create_links(&self, table: TableId) -> BackendResult<usize>;
    /// Number of distinct subgraphs in a container.
    fn subgraph_count(&self, container: &str) -> BackendResult<usize>;
    /// Makes every change so far durable.
    fn commit(&self) -> BackendResult<()>;
}

/// A backend serving every concern.
pub trait Backend: TableEngine + SourceScope + ContainerStore {}

impl<T: TableEngine + SourceScope + ContainerStore> Backend for T {}
