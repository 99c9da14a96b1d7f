//! Disposable clone of a template database.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::driver::{Connection, Driver};
use crate::error::{Result, TestDbError};
use crate::ident::Ident;

/// A cloned namespace owned by a single test.
///
/// Holds its own administrative connection; [`EphemeralDatabase::cleanup`]
/// drops the namespace and closes it. Handles dropped without cleanup leak
/// the namespace and log a warning.
pub struct EphemeralDatabase<D: Driver> {
    name: Ident,
    connection_string: String,
    driver: Arc<D>,
    state: RwLock<EphemeralState<D::Conn>>,
}

struct EphemeralState<C> {
    conn: Option<C>,
    cleaned_up: bool,
    /// Handed off with [`EphemeralDatabase::keep`]
    kept: bool,
}

impl<D: Driver> EphemeralDatabase<D> {
    pub(crate) fn new(
        name: Ident,
        connection_string: String,
        driver: Arc<D>,
        conn: D::Conn,
    ) -> Self {
        Self {
            name,
            connection_string,
            driver,
            state: RwLock::new(EphemeralState {
                conn: Some(conn),
                cleaned_up: false,
                kept: false,
            }),
        }
    }

    /// Generated namespace name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn ident(&self) -> &Ident {
        &self.name
    }

    /// Connection string of the clone, password redacted.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub async fn is_cleaned_up(&self) -> bool {
        self.state.read().await.cleaned_up
    }

    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }

    /// Opens a new session bound to the clone. Each call yields an
    /// independent session.
    pub async fn open(&self) -> Result<D::Session> {
        let state = self.state.read().await;
        if state.cleaned_up {
            return Err(TestDbError::AlreadyCleanedUp {
                namespace: self.name.to_string(),
            });
        }
        self.driver
            .open_session(&self.name)
            .await
            .map_err(|source| TestDbError::Connection {
                operation: "open test database",
                source,
            })
    }

    /// Drops the namespace and closes the administrative connection.
    /// Calls after the first are no-ops.
    pub async fn cleanup(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.cleaned_up {
            return Ok(());
        }
        state.cleaned_up = true;

        let Some(conn) = state.conn.take() else {
            return Ok(());
        };
        let dropped = conn
            .drop_namespace(&self.name)
            .await
            .map_err(|source| TestDbError::Cleanup {
                operation: "drop test database",
                namespace: self.name.to_string(),
                source,
            });
        let closed = conn.close().await.map_err(|source| TestDbError::Cleanup {
            operation: "close test database connection",
            namespace: self.name.to_string(),
            source,
        });

        dropped?;
        closed?;
        tracing::debug!("Test database {} dropped", self.name);
        Ok(())
    }

    /// Releases the handle without dropping the namespace, which then
    /// outlives the process. Returns the namespace name.
    pub async fn keep(self) -> Result<Ident> {
        let mut state = self.state.write().await;
        if state.cleaned_up {
            return Err(TestDbError::AlreadyCleanedUp {
                namespace: self.name.to_string(),
            });
        }
        state.kept = true;
        if let Some(conn) = state.conn.take() {
            conn.close().await.map_err(|source| TestDbError::Cleanup {
                operation: "close test database connection",
                namespace: self.name.to_string(),
                source,
            })?;
        }
        drop(state);
        Ok(self.name.clone())
    }
}

impl<D: Driver> Drop for EphemeralDatabase<D> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.cleaned_up && !state.kept {
            tracing::warn!(
                "Test database {} dropped without cleanup; namespace leaked",
                self.name
            );
        }
    }
}

impl<D: Driver> std::fmt::Debug for EphemeralDatabase<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralDatabase")
            .field("name", &self.name)
            .field("connection_string", &self.connection_string)
            .finish_non_exhaustive()
    }
}
