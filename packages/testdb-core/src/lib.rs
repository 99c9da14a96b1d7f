//! Template-backed test databases.
//!
//! A [`TemplateDatabase`] builds one canonical namespace per test run (schema
//! plus fixtures) and hands out [`EphemeralDatabase`] clones of it, one per
//! test, each dropped when the test is done.
//!
//! ```no_run
//! # #[cfg(feature = "memory")]
//! # async fn run() -> testdb_core::Result<()> {
//! use std::sync::Arc;
//! use testdb_core::memory::MemoryDriver;
//! use testdb_core::{init_template, init_test_db, TemplateDatabase, TemplateDatabaseConfig};
//!
//! let template = Arc::new(TemplateDatabase::new(
//!     TemplateDatabaseConfig::from_env()?,
//!     MemoryDriver::new(),
//! )?);
//! let pinned = init_template(&template).await?;
//!
//! let db = init_test_db(&template).await?;
//! // ... run queries through db.session() ...
//! db.close().await?;
//!
//! pinned.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod catalog;
pub mod clone;
pub mod config;
pub mod driver;
pub mod ephemeral;
pub mod error;
pub mod fixtures;
pub mod ident;
pub mod schema;
pub mod template;

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

pub use bootstrap::{init_template, init_test_db, TestDatabase};
pub use catalog::{Catalog, CatalogInspector, ForeignKeyDescriptor, ReferentialRule};
pub use clone::{CloneGenerator, ClonePlan, CloneStep, ForeignKeyConstraint};
pub use config::TemplateDatabaseConfig;
pub use driver::{Connection, Dialect, Driver};
pub use ephemeral::EphemeralDatabase;
pub use error::{DriverError, FixtureError, IdentError, Result, SchemaError, TestDbError};
pub use fixtures::{FixtureLoader, FixtureRow, FixtureSet, FixtureTable};
pub use ident::Ident;
pub use schema::SchemaApplier;
pub use template::TemplateDatabase;
