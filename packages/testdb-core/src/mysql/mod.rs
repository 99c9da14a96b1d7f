//! MySQL driver built on `sqlx`.

pub mod statements;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{Connection as _, MySql, Row};

use crate::catalog::ForeignKeyDescriptor;
use crate::clone::ClonePlan;
use crate::config::TemplateDatabaseConfig;
use crate::driver::{Connection, Dialect, Driver};
use crate::error::{DriverError, Result};
use crate::fixtures::FixtureSet;
use crate::ident::Ident;
use crate::template::TemplateDatabase;

const LIST_TABLES: &str = "\
SELECT CAST(TABLE_NAME AS CHAR) \
FROM information_schema.TABLES \
WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' \
ORDER BY TABLE_NAME";

const LIST_FOREIGN_KEYS: &str = "\
SELECT \
    CAST(kcu.CONSTRAINT_NAME AS CHAR), \
    CAST(kcu.COLUMN_NAME AS CHAR), \
    CAST(kcu.REFERENCED_TABLE_NAME AS CHAR), \
    CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR), \
    CAST(rc.UPDATE_RULE AS CHAR), \
    CAST(rc.DELETE_RULE AS CHAR) \
FROM information_schema.TABLE_CONSTRAINTS tc \
JOIN information_schema.KEY_COLUMN_USAGE kcu \
    ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
    AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
    AND tc.TABLE_NAME = kcu.TABLE_NAME \
JOIN information_schema.REFERENTIAL_CONSTRAINTS rc \
    ON tc.CONSTRAINT_NAME = rc.CONSTRAINT_NAME \
    AND tc.TABLE_SCHEMA = rc.CONSTRAINT_SCHEMA \
    AND tc.TABLE_NAME = rc.TABLE_NAME \
WHERE tc.CONSTRAINT_TYPE = 'FOREIGN KEY' \
    AND tc.TABLE_SCHEMA = ? \
    AND tc.TABLE_NAME = ? \
ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION";

const SCHEMA_EXISTS: &str =
    "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?";

/// Driver for a MySQL server.
#[derive(Debug, Clone)]
pub struct MySqlDriver {
    options: MySqlConnectOptions,
    max_connections: u32,
    host: String,
    port: u16,
    user: String,
    has_password: bool,
}

impl MySqlDriver {
    pub fn new(config: &TemplateDatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password);
        Self {
            options,
            max_connections: config.max_connections,
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            has_password: !config.password.is_empty(),
        }
    }

    fn pool_options(&self) -> MySqlPoolOptions {
        MySqlPoolOptions::new().max_connections(self.max_connections)
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    type Conn = MySqlAdmin;
    type Session = MySqlPool;

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn connection_string(&self, namespace: Option<&Ident>) -> String {
        let credentials = if self.has_password {
            format!("{}:***", self.user)
        } else {
            self.user.clone()
        };
        format!(
            "mysql://{}@{}:{}/{}",
            credentials,
            self.host,
            self.port,
            namespace.map(Ident::as_str).unwrap_or_default()
        )
    }

    async fn connect(&self) -> std::result::Result<MySqlAdmin, DriverError> {
        let pool = self.pool_options().connect_with(self.options.clone()).await?;
        Ok(MySqlAdmin {
            pool,
            options: self.options.clone(),
        })
    }

    async fn open_session(&self, namespace: &Ident) -> std::result::Result<MySqlPool, DriverError> {
        let options = self.options.clone().database(namespace.as_str());
        Ok(self.pool_options().connect_with(options).await?)
    }

    async fn close_session(&self, session: MySqlPool) -> std::result::Result<(), DriverError> {
        session.close().await;
        Ok(())
    }
}

/// Administrative connection: a pool without a default database.
#[derive(Debug)]
pub struct MySqlAdmin {
    pool: MySqlPool,
    options: MySqlConnectOptions,
}

impl MySqlAdmin {
    fn pool(&self) -> std::result::Result<&MySqlPool, DriverError> {
        if self.pool.is_closed() {
            return Err(DriverError::Closed);
        }
        Ok(&self.pool)
    }

    async fn namespace_exists(&self, namespace: &Ident) -> std::result::Result<bool, DriverError> {
        let count: i64 = sqlx::query_scalar(SCHEMA_EXISTS)
            .bind(namespace.as_str())
            .fetch_one(self.pool()?)
            .await?;
        Ok(count > 0)
    }

    async fn insert_fixtures(
        conn: &mut sqlx::MySqlConnection,
        namespace: &Ident,
        fixtures: &FixtureSet,
    ) -> std::result::Result<(), DriverError> {
        for fixture in fixtures.tables() {
            sqlx::query(&statements::delete_all(namespace, &fixture.table))
                .execute(&mut *conn)
                .await?;
        }
        for fixture in fixtures.tables() {
            for row in &fixture.rows {
                let columns: Vec<Ident> = row.iter().map(|(c, _)| c.clone()).collect();
                let sql = statements::insert_row(namespace, &fixture.table, &columns);
                let mut query = sqlx::query(&sql);
                for (_, value) in row {
                    query = bind_value(query, value);
                }
                query.execute(&mut *conn).await?;
            }
        }
        Ok(())
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

#[async_trait]
impl Connection for MySqlAdmin {
    async fn create_namespace(&self, namespace: &Ident) -> std::result::Result<(), DriverError> {
        sqlx::query(&statements::create_database(namespace))
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    async fn drop_namespace(&self, namespace: &Ident) -> std::result::Result<(), DriverError> {
        sqlx::query(&statements::drop_database(namespace))
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    async fn execute_script(&self, namespace: &Ident, script: &str) -> std::result::Result<(), DriverError> {
        self.pool()?;
        let options = self.options.clone().database(namespace.as_str());
        let mut conn = sqlx::MySqlConnection::connect_with(&options).await?;
        let result = sqlx::Executor::execute(&mut conn, sqlx::raw_sql(script)).await;
        if let Err(e) = conn.close().await {
            tracing::warn!("Failed to close schema connection for {}: {}", namespace, e);
        }
        result?;
        Ok(())
    }

    async fn load_fixtures(
        &self,
        namespace: &Ident,
        fixtures: &FixtureSet,
    ) -> std::result::Result<(), DriverError> {
        let mut conn = self.pool()?.acquire().await?;
        sqlx::query("SET FOREIGN_KEY_CHECKS = 0")
            .execute(&mut *conn)
            .await?;
        let result = Self::insert_fixtures(&mut *conn, namespace, fixtures).await;
        let restored = sqlx::query("SET FOREIGN_KEY_CHECKS = 1")
            .execute(&mut *conn)
            .await;
        result?;
        restored?;
        Ok(())
    }

    async fn list_tables(&self, namespace: &Ident) -> std::result::Result<Vec<Ident>, DriverError> {
        let names: Vec<String> = sqlx::query_scalar(LIST_TABLES)
            .bind(namespace.as_str())
            .fetch_all(self.pool()?)
            .await?;
        let tables = names
            .into_iter()
            .map(Ident::new)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    async fn list_foreign_keys(
        &self,
        namespace: &Ident,
        table: &Ident,
    ) -> std::result::Result<Vec<ForeignKeyDescriptor>, DriverError> {
        let rows = sqlx::query(LIST_FOREIGN_KEYS)
            .bind(namespace.as_str())
            .bind(table.as_str())
            .fetch_all(self.pool()?)
            .await?;

        rows.iter()
            .map(|row| -> std::result::Result<ForeignKeyDescriptor, DriverError> {
                Ok(ForeignKeyDescriptor {
                    table: table.clone(),
                    constraint: Ident::new(row.try_get::<String, _>(0)?)?,
                    column: Ident::new(row.try_get::<String, _>(1)?)?,
                    referenced_table: Ident::new(row.try_get::<String, _>(2)?)?,
                    referenced_column: Ident::new(row.try_get::<String, _>(3)?)?,
                    update_rule: row.try_get::<String, _>(4)?.parse()?,
                    delete_rule: row.try_get::<String, _>(5)?.parse()?,
                })
            })
            .collect()
    }

    async fn execute_plan(&self, plan: &ClonePlan) -> std::result::Result<(), DriverError> {
        if self.namespace_exists(plan.target()).await? {
            return Err(DriverError::NamespaceExists(plan.target().to_string()));
        }

        let script = statements::clone_script(plan);
        if let Err(e) = sqlx::raw_sql(&script).execute(self.pool()?).await {
            let cleanup = statements::drop_database_if_exists(plan.target());
            if let Err(drop_err) = sqlx::query(&cleanup).execute(self.pool()?).await {
                tracing::warn!(
                    "Failed to drop partial clone {}: {}",
                    plan.target(),
                    drop_err
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn render_plan(&self, plan: &ClonePlan) -> String {
        statements::clone_script(plan)
    }

    async fn close(&self) -> std::result::Result<(), DriverError> {
        self.pool.close().await;
        Ok(())
    }
}

impl TemplateDatabase<MySqlDriver> {
    /// Template over a MySQL server described by `config`.
    pub fn mysql(config: TemplateDatabaseConfig) -> Result<Self> {
        let driver = MySqlDriver::new(&config);
        TemplateDatabase::new(config, driver)
    }
}
