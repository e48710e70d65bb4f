//! Relational building blocks over subgraph-item (SGI) tables.
//!
//! An SGI table has the columns `item_id, subg_id, name`: one row per object
//! or link taking part in one match, tagged with the query item it matched.

use crate::backend::{
    Backend, ContainerStore, JoinColumn, RowFilter, SourceScope, TableEngine, TableId, ITEM_ID,
    LINK_ID, LINK_O1, LINK_O2, NAME, OBJECT_ID, SGI_COLUMNS, SUBG_ID,
};
use crate::error::Result;
use crate::exec::{ScratchTables, SubgraphTables};
use crate::model::{Annotation, CompareOp, Condition, Item, ItemId, Query};
use crate::value::Value;

use super::StepContext;

/// Subgraph id on the "from" side of a link match.
pub(crate) const S_FROM: &str = "s_from";
/// Subgraph id on the "to" side of a link match.
pub(crate) const S_TO: &str = "s_to";
/// Count column produced by grouping.
pub(crate) const COUNT: &str = "n";
/// Renumbered subgraph id.
pub(crate) const NEW_SUBG: &str = "new_subg";

const FAR: &str = "far";

/// The three SGI columns projected from the left input of a join.
pub(crate) fn sgi_left() -> [JoinColumn; 3] {
    [
        JoinColumn::left(ITEM_ID, ITEM_ID),
        JoinColumn::left(SUBG_ID, SUBG_ID),
        JoinColumn::left(NAME, NAME),
    ]
}

/// Empty SGI table.
pub(crate) fn empty(backend: &dyn Backend) -> Result<TableId> {
    Ok(backend.create_table(&SGI_COLUMNS)?)
}

/// Objects matching `condition`, one subgraph each, named `name`.
pub(crate) fn single_vertex(
    backend: &dyn Backend,
    condition: Option<&Condition>,
    name: &str,
) -> Result<TableId> {
    let table = backend.matching_objects(condition)?;
    let built = (|| {
        backend.rename_column(table, OBJECT_ID, ITEM_ID)?;
        backend.add_row_number(table, SUBG_ID)?;
        backend.add_constant_column(table, NAME, Value::from(name))
    })();
    match built {
        Ok(()) => Ok(table),
        Err(err) => {
            let _ = backend.release(table);
            Err(err.into())
        }
    }
}

/// SGI tables for `vertex`: the registry entry of a composite vertex (taken
/// out and tracked for release), or a fresh match of a plain one.
pub(crate) fn vertex_tables(
    query: &Query,
    vertex: ItemId,
    ctx: &mut StepContext<'_, '_>,
    scratch: &mut ScratchTables<'_>,
) -> Result<SubgraphTables> {
    let item = query.item(vertex)?;
    if item.is_composite() {
        return Ok(scratch.track_pair(ctx.registry.take(&item.catenated_name())?));
    }
    let objects = scratch.track(single_vertex(ctx.backend, item.condition(), item.first_name())?);
    let links = scratch.track(empty(ctx.backend)?);
    Ok(SubgraphTables { objects, links })
}

/// Rows of `table` named `name`.
pub(crate) fn named_rows(
    backend: &dyn Backend,
    scratch: &mut ScratchTables<'_>,
    table: TableId,
    name: &str,
) -> Result<TableId> {
    let filter = RowFilter::column_value(NAME, CompareOp::Eq, name);
    Ok(scratch.track(backend.filter(table, &filter)?))
}

/// Links of `edge` joining a `from_rows` object to a `to_rows` object, as
/// `s_from, s_to, link_id`. Undirected edges match links in either
/// direction. With `same_subgraph`, both ends must share a subgraph id.
pub(crate) fn link_matches(
    backend: &dyn Backend,
    scratch: &mut ScratchTables<'_>,
    edge: &Item,
    from_rows: TableId,
    to_rows: TableId,
    same_subgraph: bool,
) -> Result<TableId> {
    let links = scratch.track(backend.matching_links(edge.condition())?);
    let directed = edge.as_edge().is_some_and(|e| e.is_directed());
    let forward = one_direction(backend, scratch, links, from_rows, to_rows, (LINK_O1, LINK_O2), same_subgraph)?;
    if directed {
        return Ok(forward);
    }
    let reverse = one_direction(backend, scratch, links, from_rows, to_rows, (LINK_O2, LINK_O1), same_subgraph)?;
    let both = scratch.track(backend.union(&[forward, reverse])?);
    Ok(scratch.track(backend.distinct(both, &[S_FROM, S_TO, LINK_ID])?))
}

fn one_direction(
    backend: &dyn Backend,
    scratch: &mut ScratchTables<'_>,
    links: TableId,
    from_rows: TableId,
    to_rows: TableId,
    (near, far): (&str, &str),
    same_subgraph: bool,
) -> Result<TableId> {
    let first = scratch.track(backend.join(
        from_rows,
        links,
        &[(ITEM_ID, near)],
        &[
            JoinColumn::left(SUBG_ID, S_FROM),
            JoinColumn::right(LINK_ID, LINK_ID),
            JoinColumn::right(far, FAR),
        ],
    )?);
    let on: &[(&str, &str)] = if same_subgraph {
        &[(FAR, ITEM_ID), (S_FROM, SUBG_ID)]
    } else {
        &[(FAR, ITEM_ID)]
    };
    Ok(scratch.track(backend.join(
        first,
        to_rows,
        on,
        &[
            JoinColumn::left(S_FROM, S_FROM),
            JoinColumn::right(SUBG_ID, S_TO),
            JoinColumn::left(LINK_ID, LINK_ID),
        ],
    )?))
}

/// `column` bounds from `annotation` as a row filter.
pub(crate) fn within(column: &str, annotation: Annotation) -> RowFilter {
    let mut bounds = Vec::new();
    if let Some(min) = annotation.min() {
        bounds.push(RowFilter::column_value(column, CompareOp::Ge, i64::from(min)));
    }
    if let Some(max) = annotation.max() {
        bounds.push(RowFilter::column_value(column, CompareOp::Le, i64::from(max)));
    }
    RowFilter::All(bounds)
}

/// Rows of `sgi` whose subgraph appears in column `kept_col` of `kept`.
/// `kept` must hold each subgraph id once.
pub(crate) fn keep_subgraphs(
    backend: &dyn Backend,
    sgi: TableId,
    kept: TableId,
    kept_col: &str,
) -> Result<TableId> {
    Ok(backend.join(sgi, kept, &[(SUBG_ID, kept_col)], &sgi_left())?)
}

/// Rows of `sgi` moved to new subgraph ids: every `(old_col, new_col)` pair
/// of `mapping` copies the rows of subgraph `old_col` into `new_col`.
pub(crate) fn recode(
    backend: &dyn Backend,
    sgi: TableId,
    mapping: TableId,
    old_col: &str,
    new_col: &str,
) -> Result<TableId> {
    Ok(backend.join(
        sgi,
        mapping,
        &[(SUBG_ID, old_col)],
        &[
            JoinColumn::left(ITEM_ID, ITEM_ID),
            JoinColumn::right(new_col, SUBG_ID),
            JoinColumn::left(NAME, NAME),
        ],
    )?)
}

/// Link rows of matched links: `link_id` becomes `item_id`, `subg_col`
/// becomes `subg_id`, and every row is named `name`.
pub(crate) fn edge_rows(
    backend: &dyn Backend,
    matches: TableId,
    subg_col: &str,
    name: &str,
) -> Result<TableId> {
    let rows = backend.distinct(matches, &[LINK_ID, subg_col])?;
    let built = (|| {
        backend.rename_column(rows, LINK_ID, ITEM_ID)?;
        backend.rename_column(rows, subg_col, SUBG_ID)?;
        backend.add_constant_column(rows, NAME, Value::from(name))
    })();
    match built {
        Ok(()) => Ok(rows),
        Err(err) => {
            let _ = backend.release(rows);
            Err(err.into())
        }
    }
}

/// Copies the SGI rows of `container` named by `names` into new tables.
pub(crate) fn cached_tables(
    backend: &dyn Backend,
    container: &str,
    names: &[String],
) -> Result<SubgraphTables> {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let (objects, links) = backend.item_tables(container, &names)?;
    Ok(SubgraphTables { objects, links })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.add_object(1, [("kind", "a")]);
        backend.add_object(2, [("kind", "b")]);
        backend.add_object(3, [("kind", "b")]);
        backend.add_link(10, 1, 2, [("type", "x")]);
        backend.add_link(11, 3, 1, [("type", "x")]);
        backend
    }

    #[test]
    fn single_vertex_numbers_subgraphs() {
        let backend = backend();
        let cond = Condition::eq("kind", "b").unwrap();
        let table = single_vertex(&backend, Some(&cond), "B").unwrap();
        let rows = backend.table_rows(table).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][SUBG_ID], Value::Int(1));
        assert_eq!(rows[1][NAME], Value::from("B"));
    }

    #[test]
    fn undirected_matches_cover_both_directions() {
        let backend = backend();
        let mut scratch = ScratchTables::new(&backend);
        let a = single_vertex(&backend, Some(&Condition::eq("kind", "a").unwrap()), "A").unwrap();
        let b = single_vertex(&backend, Some(&Condition::eq("kind", "b").unwrap()), "B").unwrap();
        scratch.track(a);
        scratch.track(b);

        let directed = Item::edge("Y", "A", "B", true).unwrap();
        let matches = link_matches(&backend, &mut scratch, &directed, a, b, false).unwrap();
        assert_eq!(backend.row_count(matches).unwrap(), 1);

        let undirected = Item::edge("Y", "A", "B", false).unwrap();
        let matches = link_matches(&backend, &mut scratch, &undirected, a, b, false).unwrap();
        let links: Vec<i64> = backend
            .table_rows(matches)
            .unwrap()
            .iter()
            .map(|r| r[LINK_ID].as_int().unwrap())
            .collect();
        assert_eq!(links, vec![10, 11]);

        let rows = edge_rows(&backend, matches, S_FROM, "Y").unwrap();
        scratch.track(rows);
        assert_eq!(backend.row_count(rows).unwrap(), 2);
        drop(scratch);
        assert_eq!(backend.live_tables(), 0);
    }

    #[test]
    fn within_builds_bounds() {
        let ann = Annotation::range(1, 2).unwrap();
        match within(COUNT, ann) {
            RowFilter::All(bounds) => assert_eq!(bounds.len(), 2),
            other => panic!("unexpected filter {other:?}"),
        }
        assert_eq!(within(COUNT, Annotation::new(None, None).unwrap()), RowFilter::All(vec![]));
    }
}
