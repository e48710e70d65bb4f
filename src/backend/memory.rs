use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::model::{CompareOp, Condition};
use crate::value::{Value, ValueKey};

use super::{
    BackendError, BackendResult, ContainerStore, JoinColumn, JoinSide, Operand, RowFilter,
    SourceKind, SourceScope, TableEngine, TableId, ATTR_ID, ATTR_VALUE, ITEM_ID, LINK_ID, LINK_O1,
    LINK_O2, NAME, OBJECT_ID, SGI_COLUMNS, SUBG_ID,
};

/// A table row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Rows of a stored result container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerSnapshot {
    /// Object rows: `item_id, subg_id, name`.
    pub objects: Vec<Row>,
    /// Link rows: `item_id, subg_id, name`.
    pub links: Vec<Row>,
}

impl ContainerSnapshot {
    /// Distinct subgraph ids.
    pub fn subgraph_ids(&self) -> BTreeSet<i64> {
        self.objects
            .iter()
            .chain(&self.links)
            .filter_map(|row| row.get(SUBG_ID).and_then(Value::as_int))
            .collect()
    }

    /// `(item_id, name)` pairs of the objects in subgraph `subg`, sorted.
    pub fn objects_in(&self, subg: i64) -> Vec<(i64, String)> {
        members(&self.objects, subg)
    }

    /// `(item_id, name)` pairs of the links in subgraph `subg`, sorted.
    pub fn links_in(&self, subg: i64) -> Vec<(i64, String)> {
        members(&self.links, subg)
    }
}

fn members(rows: &[Row], subg: i64) -> Vec<(i64, String)> {
    let mut out: Vec<(i64, String)> = rows
        .iter()
        .filter(|row| row.get(SUBG_ID).and_then(Value::as_int) == Some(subg))
        .filter_map(|row| {
            let id = row.get(ITEM_ID).and_then(Value::as_int)?;
            match row.get(NAME) {
                Some(Value::String(name)) => Some((id, name.clone())),
                _ => None,
            }
        })
        .collect();
    out.sort();
    out
}

#[derive(Clone, Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: Vec::new(),
        }
    }

    fn col(&self, id: TableId, column: &str) -> BackendResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| BackendError::UnknownColumn {
                table: id,
                column: column.to_owned(),
            })
    }

    fn cols(&self, id: TableId, columns: &[&str]) -> BackendResult<Vec<usize>> {
        columns.iter().map(|c| self.col(id, c)).collect()
    }

    fn key(row: &[Value], idx: &[usize]) -> Option<Vec<ValueKey>> {
        idx.iter()
            .map(|i| match &row[*i] {
                Value::Null => None,
                v => Some(v.key()),
            })
            .collect()
    }

    /// Rows re-laid out as `columns`, matching by name.
    fn project(&self, id: TableId, columns: &[&str]) -> BackendResult<Table> {
        let idx = self.cols(id, columns)?;
        Ok(Table {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| idx.iter().map(|i| row[*i].clone()).collect())
                .collect(),
        })
    }

    fn to_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
struct StoredLink {
    o1: i64,
    o2: i64,
    attrs: BTreeMap<String, Value>,
}

#[derive(Clone, Debug)]
struct StoredContainer {
    objects: Table,
    links: Table,
}

#[derive(Default)]
struct Inner {
    next_table: u64,
    tables: FxHashMap<TableId, Table>,
    objects: BTreeMap<i64, BTreeMap<String, Value>>,
    links: BTreeMap<i64, StoredLink>,
    containers: BTreeMap<String, StoredContainer>,
    commits: u64,
    fail_commit: bool,
}

impl Inner {
    fn table(&self, id: TableId) -> BackendResult<&Table> {
        self.tables.get(&id).ok_or(BackendError::UnknownTable(id))
    }

    fn table_mut(&mut self, id: TableId) -> BackendResult<&mut Table> {
        self.tables.get_mut(&id).ok_or(BackendError::UnknownTable(id))
    }

    fn insert(&mut self, table: Table) -> TableId {
        self.next_table += 1;
        let id = TableId(self.next_table);
        self.tables.insert(id, table);
        id
    }
}

/// In-memory objects, links, temporary tables and result containers.
///
/// All state sits behind one mutex, so a shared reference serves as every
/// backend trait at once.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn add_object<I, K, V>(&self, id: i64, attrs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let attrs = attrs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.inner.lock().objects.insert(id, attrs);
    }

    /// Adds or replaces a link from `o1` to `o2`.
    pub fn add_link<I, K, V>(&self, id: i64, o1: i64, o2: i64, attrs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let attrs = attrs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.inner
            .lock()
            .links
            .insert(id, StoredLink { o1, o2, attrs });
    }

    /// Number of objects.
    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    /// Number of links, including created ones.
    pub fn link_count(&self) -> usize {
        self.inner.lock().links.len()
    }

    /// `(o1, o2, attrs)` of a link.
    pub fn link(&self, id: i64) -> Option<(i64, i64, BTreeMap<String, Value>)> {
        self.inner
            .lock()
            .links
            .get(&id)
            .map(|l| (l.o1, l.o2, l.attrs.clone()))
    }

    /// Stores a container directly from `(item_id, subg_id, name)` triples.
    pub fn insert_container(
        &self,
        name: &str,
        objects: &[(i64, i64, &str)],
        links: &[(i64, i64, &str)],
    ) -> BackendResult<()> {
        let build = |rows: &[(i64, i64, &str)]| Table {
            columns: SGI_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
            rows: rows
                .iter()
                .map(|(id, subg, item)| {
                    vec![Value::Int(*id), Value::Int(*subg), Value::from(*item)]
                })
                .collect(),
        };
        let mut inner = self.inner.lock();
        if inner.containers.contains_key(name) {
            return Err(BackendError::ContainerExists(name.to_owned()));
        }
        inner.containers.insert(
            name.to_owned(),
            StoredContainer {
                objects: build(objects),
                links: build(links),
            },
        );
        Ok(())
    }

    /// Rows of a stored container.
    pub fn container(&self, name: &str) -> Option<ContainerSnapshot> {
        self.inner.lock().containers.get(name).map(|c| ContainerSnapshot {
            objects: c.objects.to_rows(),
            links: c.links.to_rows(),
        })
    }

    /// Names of stored containers.
    pub fn container_names(&self) -> Vec<String> {
        self.inner.lock().containers.keys().cloned().collect()
    }

    /// Rows of a temporary table.
    pub fn table_rows(&self, table: TableId) -> BackendResult<Vec<Row>> {
        Ok(self.inner.lock().table(table)?.to_rows())
    }

    /// Number of temporary tables not yet released.
    pub fn live_tables(&self) -> usize {
        self.inner.lock().tables.len()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.inner.lock().commits
    }

    /// Makes every later commit fail, for failure-path tests.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.inner.lock().fail_commit = fail;
    }
}

fn resolve<'r>(table: &Table, id: TableId, row: &'r [Value], operand: &'r Operand) -> BackendResult<&'r Value> {
    match operand {
        Operand::Column(column) => Ok(&row[table.col(id, column)?]),
        Operand::Value(value) => Ok(value),
    }
}

fn eval(table: &Table, id: TableId, row: &[Value], filter: &RowFilter) -> BackendResult<bool> {
    match filter {
        RowFilter::Compare { left, op, right } => {
            let l = resolve(table, id, row, left)?;
            let r = resolve(table, id, row, right)?;
            Ok(match op {
                CompareOp::Exists => !l.is_null(),
                op => op.holds(l, r),
            })
        }
        RowFilter::All(children) => {
            for child in children {
                if !eval(table, id, row, child)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

impl TableEngine for MemoryBackend {
    fn create_table(&self, columns: &[&str]) -> BackendResult<TableId> {
        let unique: FxHashSet<&str> = columns.iter().copied().collect();
        if unique.len() != columns.len() {
            return Err(BackendError::Schema(format!("duplicate columns in {columns:?}")));
        }
        Ok(self.inner.lock().insert(Table::with_columns(columns)))
    }

    fn columns(&self, table: TableId) -> BackendResult<Vec<String>> {
        Ok(self.inner.lock().table(table)?.columns.clone())
    }

    fn join(
        &self,
        left: TableId,
        right: TableId,
        on: &[(&str, &str)],
        project: &[JoinColumn],
    ) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let (lt, rt) = (inner.table(left)?, inner.table(right)?);
        let left_keys = lt.cols(left, &on.iter().map(|(l, _)| *l).collect::<Vec<_>>())?;
        let right_keys = rt.cols(right, &on.iter().map(|(_, r)| *r).collect::<Vec<_>>())?;
        let picks: Vec<(JoinSide, usize)> = project
            .iter()
            .map(|p| match p.side {
                JoinSide::Left => lt.col(left, &p.column).map(|i| (JoinSide::Left, i)),
                JoinSide::Right => rt.col(right, &p.column).map(|i| (JoinSide::Right, i)),
            })
            .collect::<BackendResult<_>>()?;

        let mut index: FxHashMap<Vec<ValueKey>, Vec<usize>> = FxHashMap::default();
        for (pos, row) in rt.rows.iter().enumerate() {
            if let Some(key) = Table::key(row, &right_keys) {
                index.entry(key).or_default().push(pos);
            }
        }
        let mut out = Table {
            columns: project.iter().map(|p| p.alias.clone()).collect(),
            rows: Vec::new(),
        };
        for lrow in &lt.rows {
            let Some(key) = Table::key(lrow, &left_keys) else { continue };
            let Some(matches) = index.get(&key) else { continue };
            for pos in matches {
                let rrow = &rt.rows[*pos];
                out.rows.push(
                    picks
                        .iter()
                        .map(|(side, i)| match side {
                            JoinSide::Left => lrow[*i].clone(),
                            JoinSide::Right => rrow[*i].clone(),
                        })
                        .collect(),
                );
            }
        }
        Ok(inner.insert(out))
    }

    fn anti_join(&self, left: TableId, right: TableId, on: &[(&str, &str)]) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let (lt, rt) = (inner.table(left)?, inner.table(right)?);
        let left_keys = lt.cols(left, &on.iter().map(|(l, _)| *l).collect::<Vec<_>>())?;
        let right_keys = rt.cols(right, &on.iter().map(|(_, r)| *r).collect::<Vec<_>>())?;
        let present: FxHashSet<Vec<ValueKey>> = rt
            .rows
            .iter()
            .filter_map(|row| Table::key(row, &right_keys))
            .collect();
        let out = Table {
            columns: lt.columns.clone(),
            rows: lt
                .rows
                .iter()
                .filter(|row| Table::key(row, &left_keys).map_or(true, |k| !present.contains(&k)))
                .cloned()
                .collect(),
        };
        Ok(inner.insert(out))
    }

    fn filter(&self, table: TableId, filter: &RowFilter) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let source = inner.table(table)?;
        let mut out = Table {
            columns: source.columns.clone(),
            rows: Vec::new(),
        };
        for row in &source.rows {
            if eval(source, table, row, filter)? {
                out.rows.push(row.clone());
            }
        }
        Ok(inner.insert(out))
    }

    fn distinct(&self, table: TableId, columns: &[&str]) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let projected = inner.table(table)?.project(table, columns)?;
        let mut seen = FxHashSet::default();
        let all: Vec<usize> = (0..columns.len()).collect();
        let rows = projected
            .rows
            .into_iter()
            .filter(|row| {
                let key: Vec<ValueKey> = all.iter().map(|i| row[*i].key()).collect();
                seen.insert(key)
            })
            .collect();
        Ok(inner.insert(Table {
            columns: projected.columns,
            rows,
        }))
    }

    fn rename_column(&self, table: TableId, from: &str, to: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        let target = inner.table_mut(table)?;
        let idx = target.col(table, from)?;
        if from != to && target.columns.iter().any(|c| c == to) {
            return Err(BackendError::ColumnExists {
                table,
                column: to.to_owned(),
            });
        }
        target.columns[idx] = to.to_owned();
        Ok(())
    }

    fn add_constant_column(&self, table: TableId, column: &str, value: Value) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        let target = inner.table_mut(table)?;
        if target.columns.iter().any(|c| c == column) {
            return Err(BackendError::ColumnExists {
                table,
                column: column.to_owned(),
            });
        }
        target.columns.push(column.to_owned());
        for row in &mut target.rows {
            row.push(value.clone());
        }
        Ok(())
    }

    fn add_row_number(&self, table: TableId, column: &str) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        let target = inner.table_mut(table)?;
        if target.columns.iter().any(|c| c == column) {
            return Err(BackendError::ColumnExists {
                table,
                column: column.to_owned(),
            });
        }
        target.columns.push(column.to_owned());
        for (n, row) in target.rows.iter_mut().enumerate() {
            row.push(Value::Int(n as i64 + 1));
        }
        Ok(())
    }

    fn count_by(&self, table: TableId, keys: &[&str], count_column: &str) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let source = inner.table(table)?;
        let idx = source.cols(table, keys)?;
        let mut groups: Vec<(Vec<Value>, i64)> = Vec::new();
        let mut positions: FxHashMap<Vec<ValueKey>, usize> = FxHashMap::default();
        for row in &source.rows {
            let values: Vec<Value> = idx.iter().map(|i| row[*i].clone()).collect();
            let key: Vec<ValueKey> = values.iter().map(Value::key).collect();
            match positions.get(&key) {
                Some(pos) => groups[*pos].1 += 1,
                None => {
                    positions.insert(key, groups.len());
                    groups.push((values, 1));
                }
            }
        }
        let mut columns: Vec<String> = keys.iter().map(|k| (*k).to_owned()).collect();
        columns.push(count_column.to_owned());
        let rows = groups
            .into_iter()
            .map(|(mut values, count)| {
                values.push(Value::Int(count));
                values
            })
            .collect();
        Ok(inner.insert(Table { columns, rows }))
    }

    fn union(&self, tables: &[TableId]) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let (first, rest) = tables
            .split_first()
            .ok_or_else(|| BackendError::Schema("union of zero tables".to_owned()))?;
        let layout = inner.table(*first)?.columns.clone();
        let names: Vec<&str> = layout.iter().map(String::as_str).collect();
        let mut out = inner.table(*first)?.clone();
        for id in rest {
            let table = inner.table(*id)?;
            if table.columns.len() != layout.len() {
                return Err(BackendError::Schema(format!(
                    "cannot union {first} {:?} with {id} {:?}",
                    layout, table.columns
                )));
            }
            out.rows.extend(table.project(*id, &names)?.rows);
        }
        Ok(inner.insert(out))
    }

    fn copy(&self, table: TableId) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let copy = inner.table(table)?.clone();
        Ok(inner.insert(copy))
    }

    fn row_count(&self, table: TableId) -> BackendResult<usize> {
        Ok(self.inner.lock().table(table)?.rows.len())
    }

    fn release(&self, table: TableId) -> BackendResult<()> {
        self.inner
            .lock()
            .tables
            .remove(&table)
            .map(|_| ())
            .ok_or(BackendError::UnknownTable(table))
    }
}

impl SourceScope for MemoryBackend {
    fn matching_objects(&self, condition: Option<&Condition>) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let mut out = Table::with_columns(&[OBJECT_ID]);
        for (id, attrs) in &inner.objects {
            let keep = condition.map_or(true, |c| c.matches(&|attr| attrs.get(attr).cloned()));
            if keep {
                out.rows.push(vec![Value::Int(*id)]);
            }
        }
        Ok(inner.insert(out))
    }

    fn matching_links(&self, condition: Option<&Condition>) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let mut out = Table::with_columns(&[LINK_ID, LINK_O1, LINK_O2]);
        for (id, link) in &inner.links {
            let keep = condition.map_or(true, |c| c.matches(&|attr| link.attrs.get(attr).cloned()));
            if keep {
                out.rows
                    .push(vec![Value::Int(*id), Value::Int(link.o1), Value::Int(link.o2)]);
            }
        }
        Ok(inner.insert(out))
    }

    fn attribute_values(&self, kind: SourceKind, attribute: &str) -> BackendResult<TableId> {
        let mut inner = self.inner.lock();
        let mut out = Table::with_columns(&[ATTR_ID, ATTR_VALUE]);
        match kind {
            SourceKind::Object => {
                for (id, attrs) in &inner.objects {
                    if let Some(value) = attrs.get(attribute).filter(|v| !v.is_null()) {
                        out.rows.push(vec![Value::Int(*id), value.clone()]);
                    }
                }
            }
            SourceKind::Link => {
                for (id, link) in &inner.links {
                    if let Some(value) = link.attrs.get(attribute).filter(|v| !v.is_null()) {
                        out.rows.push(vec![Value::Int(*id), value.clone()]);
                    }
                }
            }
        }
        Ok(inner.insert(out))
    }
}

impl ContainerStore for MemoryBackend {
    fn has_child(&self, name: &str) -> BackendResult<bool> {
        Ok(self.inner.lock().containers.contains_key(name))
    }

    fn delete_child(&self, name: &str) -> BackendResult<()> {
        self.inner
            .lock()
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::UnknownContainer(name.to_owned()))
    }

    fn create_child_from_temp_tables(
        &self,
        name: &str,
        objects: TableId,
        links: TableId,
    ) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        if inner.containers.contains_key(name) {
            return Err(BackendError::ContainerExists(name.to_owned()));
        }
        let stored = StoredContainer {
            objects: inner.table(objects)?.project(objects, &SGI_COLUMNS)?,
            links: inner.table(links)?.project(links, &SGI_COLUMNS)?,
        };
        debug!(
            container = name,
            objects = stored.objects.rows.len(),
            links = stored.links.rows.len(),
            "memory.create_child"
        );
        inner.containers.insert(name.to_owned(), stored);
        Ok(())
    }

    fn item_tables(&self, container: &str, names: &[&str]) -> BackendResult<(TableId, TableId)> {
        let mut inner = self.inner.lock();
        let stored = inner
            .containers
            .get(container)
            .ok_or_else(|| BackendError::UnknownContainer(container.to_owned()))?;
        let wanted: FxHashSet<&str> = names.iter().copied().collect();
        let select = |table: &Table| Table {
            columns: table.columns.clone(),
            rows: table
                .rows
                .iter()
                .filter(|row| matches!(&row[2], Value::String(n) if wanted.contains(n.as_str())))
                .cloned()
                .collect(),
        };
        let (objects, links) = (select(&stored.objects), select(&stored.links));
        Ok((inner.insert(objects), inner.insert(links)))
    }

    fn create_links(&self, table: TableId) -> BackendResult<usize> {
        let mut inner = self.inner.lock();
        let source = inner.table(table)?;
        let from = source.col(table, "from")?;
        let to = source.col(table, "to")?;
        let attrs: Vec<(usize, String)> = source
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.strip_prefix("attr_").map(|a| (i, a.to_owned())))
            .collect();
        let mut created = Vec::with_capacity(source.rows.len());
        for row in &source.rows {
            let (Some(o1), Some(o2)) = (row[from].as_int(), row[to].as_int()) else {
                return Err(BackendError::Schema(format!(
                    "link endpoints must be integers, got {} and {}",
                    row[from], row[to]
                )));
            };
            let attrs = attrs
                .iter()
                .map(|(i, name)| (name.clone(), row[*i].clone()))
                .collect();
            created.push(StoredLink { o1, o2, attrs });
        }
        let mut next = inner.links.keys().next_back().copied().unwrap_or(0);
        let count = created.len();
        for link in created {
            next += 1;
            inner.links.insert(next, link);
        }
        Ok(count)
    }

    fn subgraph_count(&self, container: &str) -> BackendResult<usize> {
        let inner = self.inner.lock();
        let stored = inner
            .containers
            .get(container)
            .ok_or_else(|| BackendError::UnknownContainer(container.to_owned()))?;
        let ids: FxHashSet<ValueKey> = stored
            .objects
            .rows
            .iter()
            .chain(&stored.links.rows)
            .map(|row| row[1].key())
            .collect();
        Ok(ids.len())
    }

    fn commit(&self) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_commit {
            return Err(BackendError::Message("commit failed".to_owned()));
        }
        inner.commits += 1;
        Ok(())
    }
}
