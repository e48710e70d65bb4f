use tracing::info;

use crate::backend::{Backend, ContainerStore, JoinColumn, TableEngine, ITEM_ID, SUBG_ID};
use crate::error::Result;
use crate::model::DerivedLinkSpec;
use crate::value::Value;

use super::ScratchTables;

const FROM: &str = "from";
const TO: &str = "to";

/// Creates the links requested by `specs` between objects of `container`.
///
/// For every spec, each object named `from` is linked to each object named
/// `to` in the same subgraph; repeated pairs produce one link. Returns the
/// number of links created.
pub fn materialize(backend: &dyn Backend, container: &str, specs: &[&DerivedLinkSpec]) -> Result<usize> {
    let mut total = 0;
    for spec in specs {
        let mut scratch = ScratchTables::new(backend);
        let (from_objects, from_links) = backend.item_tables(container, &[spec.from()])?;
        scratch.track(from_objects);
        scratch.track(from_links);
        let (to_objects, to_links) = backend.item_tables(container, &[spec.to()])?;
        scratch.track(to_objects);
        scratch.track(to_links);

        let pairs = scratch.track(backend.join(
            from_objects,
            to_objects,
            &[(SUBG_ID, SUBG_ID)],
            &[JoinColumn::left(ITEM_ID, FROM), JoinColumn::right(ITEM_ID, TO)],
        )?);
        let unique = scratch.track(backend.distinct(pairs, &[FROM, TO])?);
        backend.add_constant_column(
            unique,
            &format!("attr_{}", spec.attribute()),
            Value::infer(spec.value()),
        )?;
        let created = backend.create_links(unique)?;
        backend.commit()?;
        info!(
            container,
            from = spec.from(),
            to = spec.to(),
            attribute = spec.attribute(),
            created,
            "executor.derived_links"
        );
        total += created;
    }
    Ok(total)
}
