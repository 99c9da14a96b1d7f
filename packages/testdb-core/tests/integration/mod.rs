//! Template and clone lifecycle tests against the memory engine.

pub mod clone_isolation;
pub mod ephemeral_tests;
pub mod helpers;
pub mod template_lifecycle;
