//! Error types for template and clone database management.

use std::path::PathBuf;

use thiserror::Error;

#[cfg(feature = "memory")]
use crate::memory::MemoryError;

/// Errors raised by template and clone database operations.
///
/// Every variant names the operation that failed; underlying causes are
/// kept as error sources.
#[derive(Error, Debug)]
pub enum TestDbError {
    /// Missing or invalid connection parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Engine unreachable, connection refused, or namespace creation rejected
    #[error("{operation}: {source}")]
    Connection {
        operation: &'static str,
        #[source]
        source: DriverError,
    },

    /// DDL script could not be read or executed
    #[error("Apply schema '{}' to '{namespace}': {source}", .path.display())]
    SchemaApplication {
        path: PathBuf,
        namespace: String,
        #[source]
        source: SchemaError,
    },

    /// Seeding fixtures failed
    #[error("Load fixtures from '{}' into '{namespace}': {source}", .dir.display())]
    FixtureLoad {
        dir: PathBuf,
        namespace: String,
        #[source]
        source: FixtureError,
    },

    /// Metadata query failed
    #[error("{operation} in '{namespace}': {source}")]
    Introspection {
        operation: &'static str,
        namespace: String,
        #[source]
        source: DriverError,
    },

    /// Clone plan failed to execute
    #[error("Clone '{template}' into '{target}': {source}")]
    Clone {
        template: String,
        target: String,
        #[source]
        source: DriverError,
    },

    /// Operation requires a successful `init` first
    #[error("{operation}: template database is not initialized")]
    NotInitialized { operation: &'static str },

    /// Dropping a namespace or closing its connection failed
    #[error("{operation} '{namespace}': {source}")]
    Cleanup {
        operation: &'static str,
        namespace: String,
        #[source]
        source: DriverError,
    },

    /// Session requested for a clone that was already torn down
    #[error("Test database '{namespace}' already cleaned up")]
    AlreadyCleanedUp { namespace: String },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TestDbError>;

/// Errors surfaced by engine drivers.
#[derive(Error, Debug)]
pub enum DriverError {
    /// MySQL driver error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    /// In-memory engine error
    #[cfg(feature = "memory")]
    #[error("Memory engine error: {0}")]
    Memory(#[from] MemoryError),

    /// Catalog returned a name that is not a usable identifier
    #[error("Invalid identifier: {0}")]
    Ident(#[from] IdentError),

    /// Catalog returned an unknown referential rule
    #[error("Unknown referential rule '{0}'")]
    UnknownRule(String),

    /// Clone target name is already taken
    #[error("Namespace '{0}' already exists")]
    NamespaceExists(String),

    /// Connection used after close
    #[error("Connection closed")]
    Closed,
}

/// Identifier validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentError {
    /// Empty identifier
    #[error("identifier is empty")]
    Empty,

    /// Identifier longer than the engine allows
    #[error("identifier '{ident}' exceeds {max} characters")]
    TooLong { ident: String, max: usize },

    /// Identifier contains a character the engine rejects
    #[error("identifier '{ident}' contains invalid character {ch:?}")]
    InvalidCharacter { ident: String, ch: char },

    /// Identifier ends with whitespace
    #[error("identifier '{ident}' ends with whitespace")]
    TrailingWhitespace { ident: String },
}

/// Schema application errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Script file unreadable
    #[error("read schema file: {0}")]
    Read(#[source] std::io::Error),

    /// Script execution failed
    #[error("execute schema script: {0}")]
    Execute(#[source] DriverError),
}

/// Fixture loading errors.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Fixture directory unreadable
    #[error("read fixture directory: {0}")]
    ReadDir(#[source] std::io::Error),

    /// Fixture file unreadable
    #[error("read fixture file '{}': {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture file is not a list of rows
    #[error("parse fixture file '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// Table or column name in a fixture file is not a valid identifier
    #[error("fixture file '{}': {source}", .path.display())]
    Ident {
        path: PathBuf,
        #[source]
        source: IdentError,
    },

    /// Column value is an array or object
    #[error("fixture file '{}': column '{column}' must hold a scalar value", .path.display())]
    NestedValue { path: PathBuf, column: String },

    /// Driver rejected the rows
    #[error("insert fixtures: {0}")]
    Insert(#[source] DriverError),
}
