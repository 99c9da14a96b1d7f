//! One-call helpers for test suites.

use std::sync::Arc;

use crate::driver::Driver;
use crate::ephemeral::EphemeralDatabase;
use crate::error::{Result, TestDbError};
use crate::template::TemplateDatabase;

/// Builds the template (if needed) and pins it for the caller.
///
/// Call once per test run and `release` the returned handle when the run
/// ends.
pub async fn init_template<D: Driver>(
    template: &Arc<TemplateDatabase<D>>,
) -> Result<Arc<TemplateDatabase<D>>> {
    template.init().await?;
    template.acquire().await
}

/// A session over a fresh clone together with the clone itself.
pub struct TestDatabase<D: Driver> {
    session: D::Session,
    database: EphemeralDatabase<D>,
}

impl<D: Driver> TestDatabase<D> {
    pub fn session(&self) -> &D::Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut D::Session {
        &mut self.session
    }

    pub fn database(&self) -> &EphemeralDatabase<D> {
        &self.database
    }

    pub fn name(&self) -> &str {
        self.database.name()
    }

    /// Closes the session, then drops the clone.
    pub async fn close(self) -> Result<()> {
        let Self { session, database } = self;
        let closed = database
            .driver()
            .close_session(session)
            .await
            .map_err(|source| TestDbError::Cleanup {
                operation: "close test database session",
                namespace: database.name().to_string(),
                source,
            });
        let cleaned = database.cleanup().await;
        closed?;
        cleaned
    }
}

/// Initializes the template, clones it and opens a session on the clone.
pub async fn init_test_db<D: Driver>(template: &TemplateDatabase<D>) -> Result<TestDatabase<D>> {
    template.init().await?;
    let database = template.new_test_db().await?;
    match database.open().await {
        Ok(session) => Ok(TestDatabase { session, database }),
        Err(err) => {
            if let Err(e) = database.cleanup().await {
                tracing::warn!("Failed to clean up {} after open failure: {}", database.name(), e);
            }
            Err(err)
        }
    }
}
