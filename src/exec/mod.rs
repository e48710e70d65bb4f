//! Plan execution.
//!
//! The [`Executor`] replays a plan's rewrites against a [`Backend`]: each
//! step reads the intermediate tables of its inputs from the
//! [`TempTableRegistry`] and writes the tables of the composite it produces.
//! The last remaining entry becomes the result container.
//!
//! [`Backend`]: crate::backend::Backend

mod executor;
pub mod links;
mod registry;

pub use executor::{ExecutionReport, Executor, ExecutorConfig};
pub use registry::{ScratchTables, SubgraphTables, TempTableRegistry};
