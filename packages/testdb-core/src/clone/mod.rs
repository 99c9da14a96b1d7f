//! Clone plan generation.
//!
//! A clone plan is an ordered list of typed steps (create namespace, copy
//! table, add foreign key). Drivers decide how to run each step; none of them
//! assemble statements from untyped strings.

mod generator;
mod plan;

pub use generator::CloneGenerator;
pub use plan::{ClonePlan, CloneStep, ForeignKeyConstraint};
