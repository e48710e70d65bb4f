//! Graph-pattern query compiler.
//!
//! A [`model::Query`] describes a pattern of vertices, edges, nested
//! subqueries, constraints and derived links. The crate validates such a
//! pattern, searches for a sequence of rewrite steps that collapses it into a
//! single consolidated vertex, and replays those steps against a table
//! backend to materialize every matching subgraph into a new container.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod error;
pub mod exec;
pub mod model;
pub mod plan;
pub mod profile;
pub mod session;
pub mod strategy;
pub mod validate;
pub mod value;
pub mod walk;

pub use error::{Error, Result};
pub use session::{CompileOutcome, QuerySession, RunOutcome};
