//! Engine driver seam.
//!
//! A [`Driver`] knows how to reach one engine: it opens administrative
//! [`Connection`]s (no namespace selected) used to build, clone and drop
//! namespaces, and sessions bound to a single namespace for test bodies.

use std::fmt;

use async_trait::async_trait;

use crate::catalog::ForeignKeyDescriptor;
use crate::clone::ClonePlan;
use crate::error::DriverError;
use crate::fixtures::FixtureSet;
use crate::ident::Ident;

/// Engine dialect identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL / InnoDB over the network
    MySql,
    /// Process-local engine
    Memory,
}

impl Dialect {
    /// Returns the identifier handed to fixture loading and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Memory => "memory",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens connections and sessions against one engine.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Administrative connection type.
    type Conn: Connection;
    /// Session handed to test code.
    type Session: Send + 'static;

    /// Dialect of the engine.
    fn dialect(&self) -> Dialect;

    /// Connection string for a namespace (or the server when `None`), with
    /// the password redacted.
    fn connection_string(&self, namespace: Option<&Ident>) -> String;

    /// Opens an administrative connection.
    async fn connect(&self) -> Result<Self::Conn, DriverError>;

    /// Opens a session bound to `namespace`.
    async fn open_session(&self, namespace: &Ident) -> Result<Self::Session, DriverError>;

    /// Closes a session returned by [`Driver::open_session`].
    async fn close_session(&self, session: Self::Session) -> Result<(), DriverError>;
}

/// Administrative connection used for namespace maintenance.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Creates an empty namespace.
    async fn create_namespace(&self, namespace: &Ident) -> Result<(), DriverError>;

    /// Drops a namespace and everything in it.
    async fn drop_namespace(&self, namespace: &Ident) -> Result<(), DriverError>;

    /// Executes a raw, possibly multi-statement, script with `namespace` as
    /// the default namespace.
    async fn execute_script(&self, namespace: &Ident, script: &str) -> Result<(), DriverError>;

    /// Empties the fixture tables and inserts every fixture row, with
    /// foreign-key checks disabled for the duration of the load.
    async fn load_fixtures(&self, namespace: &Ident, fixtures: &FixtureSet)
        -> Result<(), DriverError>;

    /// Lists base tables of `namespace` ordered by name.
    async fn list_tables(&self, namespace: &Ident) -> Result<Vec<Ident>, DriverError>;

    /// Lists foreign-key columns owned by `table`, ordered by constraint
    /// name and column position.
    async fn list_foreign_keys(
        &self,
        namespace: &Ident,
        table: &Ident,
    ) -> Result<Vec<ForeignKeyDescriptor>, DriverError>;

    /// Executes a clone plan as one batch.
    ///
    /// Fails without side effects when the target namespace already exists.
    /// When execution fails after the target was created, the target is
    /// dropped before the error is returned.
    async fn execute_plan(&self, plan: &ClonePlan) -> Result<(), DriverError>;

    /// Renders a clone plan the way [`Connection::execute_plan`] would run it.
    fn render_plan(&self, plan: &ClonePlan) -> String;

    /// Closes the connection. Other operations fail with
    /// [`DriverError::Closed`] afterwards.
    async fn close(&self) -> Result<(), DriverError>;
}
