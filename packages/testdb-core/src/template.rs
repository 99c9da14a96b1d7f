//! Reference-counted template database and clone issuance.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::catalog::{Catalog, CatalogInspector, ForeignKeyDescriptor};
use crate::clone::CloneGenerator;
use crate::config::TemplateDatabaseConfig;
use crate::driver::{Connection, Driver};
use crate::ephemeral::EphemeralDatabase;
use crate::error::{Result, TestDbError};
use crate::fixtures::FixtureLoader;
use crate::ident::{unique_namespace, Ident};
use crate::schema::SchemaApplier;

/// Owner of the canonical namespace that every test database is cloned from.
///
/// Construct one per test run and share it by `Arc`. `init` builds the
/// namespace once; `acquire`/`release` pin it, and the last `release` drops
/// it so a later `init` can rebuild from scratch.
pub struct TemplateDatabase<D: Driver> {
    config: TemplateDatabaseConfig,
    driver: Arc<D>,
    state: RwLock<TemplateState<D::Conn>>,
}

/// State guarded by the template lock.
struct TemplateState<C> {
    /// Namespace name of the current construction cycle
    name: Option<Ident>,
    /// Connection used for template maintenance and clone scripts
    conn: Option<C>,
    /// Tables in catalog order
    tables: Vec<Ident>,
    foreign_keys: Vec<ForeignKeyDescriptor>,
    initialized: bool,
    ref_count: usize,
}

impl<C> Default for TemplateState<C> {
    fn default() -> Self {
        Self {
            name: None,
            conn: None,
            tables: Vec::new(),
            foreign_keys: Vec::new(),
            initialized: false,
            ref_count: 0,
        }
    }
}

impl<D: Driver> TemplateDatabase<D> {
    /// Creates an uninitialized template. Nothing touches the engine until
    /// [`TemplateDatabase::init`].
    pub fn new(config: TemplateDatabaseConfig, driver: D) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            driver: Arc::new(driver),
            state: RwLock::new(TemplateState::default()),
        })
    }

    pub fn config(&self) -> &TemplateDatabaseConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Builds the template namespace if it has not been built yet.
    ///
    /// Creates a fresh namespace, applies the schema, loads fixtures and
    /// caches the catalog. Any failure leaves the template uninitialized with
    /// the half-built namespace dropped, so the call can be retried.
    pub async fn init(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.initialized {
            return Ok(());
        }

        let name = unique_namespace(&self.config.namespace_prefix, "template")
            .map_err(|e| TestDbError::Configuration(e.to_string()))?;
        let conn = self
            .driver
            .connect()
            .await
            .map_err(|source| TestDbError::Connection {
                operation: "connect template database",
                source,
            })?;

        let catalog = match self.build(&conn, &name).await {
            Ok(catalog) => catalog,
            Err(err) => {
                if let Err(e) = conn.close().await {
                    tracing::warn!("Failed to close template connection after init failure: {}", e);
                }
                return Err(err);
            }
        };

        tracing::info!(
            "Template database {} initialized ({} tables, {} foreign key columns)",
            name,
            catalog.tables.len(),
            catalog.foreign_keys.len()
        );

        state.name = Some(name);
        state.conn = Some(conn);
        state.tables = catalog.tables;
        state.foreign_keys = catalog.foreign_keys;
        state.initialized = true;
        Ok(())
    }

    /// Creates the namespace and fills it; drops it again if filling fails.
    async fn build(&self, conn: &D::Conn, name: &Ident) -> Result<Catalog> {
        conn.create_namespace(name)
            .await
            .map_err(|source| TestDbError::Connection {
                operation: "create template namespace",
                source,
            })?;

        let result = async {
            SchemaApplier::new(conn, &self.config.schema_path)
                .apply(name)
                .await?;
            FixtureLoader::new(conn, self.driver.dialect(), &self.config.fixtures_dir)
                .load(name)
                .await?;
            CatalogInspector::new(conn).load_catalog(name).await
        }
        .await;

        if result.is_err() {
            if let Err(e) = conn.drop_namespace(name).await {
                tracing::warn!("Failed to drop half-built template {}: {}", name, e);
            }
        }
        result
    }

    /// Pins the template and returns the shared instance.
    pub async fn acquire(self: &Arc<Self>) -> Result<Arc<Self>> {
        let mut state = self.state.write().await;
        tracing::info!("Acquire template database, ref_count = {}", state.ref_count);
        if !state.initialized {
            return Err(TestDbError::NotInitialized {
                operation: "acquire template database",
            });
        }
        state.ref_count += 1;
        Ok(Arc::clone(self))
    }

    /// Unpins the template. The release that brings the count to zero drops
    /// the namespace and resets the template to uninitialized. Releasing at
    /// a count of zero does nothing.
    pub async fn release(&self) -> Result<()> {
        let mut state = self.state.write().await;
        tracing::info!("Release template database, ref_count = {}", state.ref_count);
        if !state.initialized {
            return Err(TestDbError::NotInitialized {
                operation: "release template database",
            });
        }
        if state.ref_count == 0 {
            return Ok(());
        }

        state.ref_count -= 1;
        if state.ref_count > 0 {
            return Ok(());
        }

        Self::teardown(&mut state).await
    }

    async fn teardown(state: &mut TemplateState<D::Conn>) -> Result<()> {
        let name = state.name.take();
        let conn = state.conn.take();
        state.tables.clear();
        state.foreign_keys.clear();
        state.initialized = false;

        let (Some(name), Some(conn)) = (name, conn) else {
            return Ok(());
        };

        let dropped = conn
            .drop_namespace(&name)
            .await
            .map_err(|source| TestDbError::Cleanup {
                operation: "drop template database",
                namespace: name.to_string(),
                source,
            });
        let closed = conn.close().await.map_err(|source| TestDbError::Cleanup {
            operation: "close template connection",
            namespace: name.to_string(),
            source,
        });

        dropped?;
        closed?;
        tracing::info!("Template database {} dropped", name);
        Ok(())
    }

    /// Clones the template into a fresh namespace.
    ///
    /// Takes the lock in shared mode only, so clones are issued concurrently.
    pub async fn new_test_db(&self) -> Result<EphemeralDatabase<D>> {
        let state = self.state.read().await;
        let (true, Some(template), Some(conn)) =
            (state.initialized, state.name.as_ref(), state.conn.as_ref())
        else {
            return Err(TestDbError::NotInitialized {
                operation: "new test database",
            });
        };

        let target = unique_namespace(&self.config.namespace_prefix, "")
            .map_err(|e| TestDbError::Configuration(e.to_string()))?;
        let plan = CloneGenerator::new(&state.tables, &state.foreign_keys).plan(template, &target);
        tracing::debug!("Clone plan for {}:\n{}", target, conn.render_plan(&plan));

        let clone_conn = self
            .driver
            .connect()
            .await
            .map_err(|source| TestDbError::Connection {
                operation: "connect test database",
                source,
            })?;

        if let Err(source) = conn.execute_plan(&plan).await {
            if let Err(e) = clone_conn.close().await {
                tracing::warn!("Failed to close connection of failed clone {}: {}", target, e);
            }
            return Err(TestDbError::Clone {
                template: template.to_string(),
                target: target.to_string(),
                source,
            });
        }

        tracing::debug!("Test database {} cloned from {}", target, template);
        let connection_string = self.driver.connection_string(Some(&target));
        Ok(EphemeralDatabase::new(
            target,
            connection_string,
            Arc::clone(&self.driver),
            clone_conn,
        ))
    }

    /// Namespace name of the current construction cycle.
    pub async fn name(&self) -> Option<Ident> {
        self.state.read().await.name.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.initialized
    }

    pub async fn ref_count(&self) -> usize {
        self.state.read().await.ref_count
    }

    /// Cached tables, in catalog order.
    pub async fn tables(&self) -> Vec<Ident> {
        self.state.read().await.tables.clone()
    }

    /// Cached foreign-key columns.
    pub async fn foreign_keys(&self) -> Vec<ForeignKeyDescriptor> {
        self.state.read().await.foreign_keys.clone()
    }

    /// Renders the plan a clone into `target` would execute.
    pub async fn render_clone_plan(&self, target: &Ident) -> Result<String> {
        let state = self.state.read().await;
        let (true, Some(template), Some(conn)) =
            (state.initialized, state.name.as_ref(), state.conn.as_ref())
        else {
            return Err(TestDbError::NotInitialized {
                operation: "render clone plan",
            });
        };
        let plan = CloneGenerator::new(&state.tables, &state.foreign_keys).plan(template, target);
        Ok(conn.render_plan(&plan))
    }
}

impl<D: Driver> Drop for TemplateDatabase<D> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let (true, Some(name)) = (state.initialized, state.name.as_ref()) {
            tracing::warn!(
                "Template database {} dropped while initialized (ref_count = {}); namespace leaked",
                name,
                state.ref_count
            );
        }
    }
}
