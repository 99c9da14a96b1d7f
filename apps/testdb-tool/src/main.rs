//! Command-line front end for template test databases.
//!
//! Builds a template from a schema script and fixture directory, then
//! prints its catalog or clone plan, issues clones, or drops namespaces left
//! behind by earlier runs.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use testdb_core::ident::unique_namespace;
use testdb_core::memory::MemoryDriver;
use testdb_core::mysql::MySqlDriver;
use testdb_core::{
    init_template, Catalog, Connection, Driver, Ident, TemplateDatabase, TemplateDatabaseConfig,
};

/// Command-line arguments for the test database tool.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; `DB_*` environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the process-local engine instead of MySQL
    #[arg(long)]
    memory: bool,

    /// Engine host
    #[arg(long)]
    host: Option<String>,

    /// Engine port
    #[arg(long)]
    port: Option<u16>,

    /// Login user
    #[arg(long)]
    user: Option<String>,

    /// Prefix of generated namespace names
    #[arg(long)]
    prefix: Option<String>,

    /// DDL script applied to the template
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Fixture directory
    #[arg(long)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the template, print its catalog as JSON, tear it down
    Inspect,
    /// Build the template, print the clone plan, tear it down
    Plan,
    /// Build the template and leave N clones behind
    Clone {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Drop namespaces by name
    Drop {
        #[arg(required = true)]
        namespaces: Vec<String>,
    },
}

impl Args {
    fn load_config(&self) -> Result<TemplateDatabaseConfig> {
        let mut config = match &self.config {
            Some(path) => TemplateDatabaseConfig::from_file(path)?,
            None => TemplateDatabaseConfig::default(),
        };
        config.apply_env_overrides()?;

        let config = self.layer_flags(config);
        config.validate()?;
        Ok(config)
    }

    /// Overrides `config` with every flag given on the command line.
    fn layer_flags(&self, mut config: TemplateDatabaseConfig) -> TemplateDatabaseConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.namespace_prefix = prefix.clone();
        }
        if let Some(schema) = &self.schema {
            config.schema_path = schema.clone();
        }
        if let Some(fixtures) = &self.fixtures {
            config.fixtures_dir = fixtures.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    if args.memory {
        let template = TemplateDatabase::new(config, MemoryDriver::new())?;
        run(Arc::new(template), args.command).await
    } else {
        let driver = MySqlDriver::new(&config);
        let template = TemplateDatabase::new(config, driver)?;
        run(Arc::new(template), args.command).await
    }
}

async fn run<D: Driver>(template: Arc<TemplateDatabase<D>>, command: Command) -> Result<()> {
    match command {
        Command::Inspect => with_pinned_template(&template, print_catalog(&template)).await,
        Command::Plan => with_pinned_template(&template, print_plan(&template)).await,
        Command::Clone { count } => {
            with_pinned_template(&template, issue_clones(&template, count)).await
        }
        Command::Drop { namespaces } => drop_namespaces(&template, namespaces).await,
    }
}

/// Builds and pins the template, runs `work`, then releases the template
/// whether or not `work` succeeded. Returns the first error.
async fn with_pinned_template<D: Driver>(
    template: &Arc<TemplateDatabase<D>>,
    work: impl Future<Output = Result<()>>,
) -> Result<()> {
    let pinned = init_template(template).await?;
    let result = work.await;
    let released = pinned.release().await.context("release template database");
    match (result, released) {
        (Err(e), Err(release_err)) => {
            tracing::warn!("{:#}", release_err);
            Err(e)
        }
        (result, released) => result.and(released),
    }
}

async fn print_catalog<D: Driver>(template: &TemplateDatabase<D>) -> Result<()> {
    let catalog = Catalog {
        tables: template.tables().await,
        foreign_keys: template.foreign_keys().await,
    };
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}

async fn print_plan<D: Driver>(template: &TemplateDatabase<D>) -> Result<()> {
    let target = unique_namespace(&template.config().namespace_prefix, "")
        .context("generate clone name")?;
    println!("{}", template.render_clone_plan(&target).await?);
    Ok(())
}

async fn issue_clones<D: Driver>(template: &TemplateDatabase<D>, count: usize) -> Result<()> {
    for _ in 0..count {
        let db = template.new_test_db().await?;
        let connection_string = db.connection_string().to_string();
        let name = db.keep().await?;
        println!("{name}\t{connection_string}");
    }
    tracing::info!("Left {} clones in place", count);
    Ok(())
}

async fn drop_namespaces<D: Driver>(
    template: &TemplateDatabase<D>,
    namespaces: Vec<String>,
) -> Result<()> {
    let conn = template
        .driver()
        .connect()
        .await
        .context("connect to engine")?;
    let mut failed = 0usize;
    for raw in namespaces {
        let namespace = Ident::new(raw.as_str()).with_context(|| format!("namespace '{raw}'"))?;
        match conn.drop_namespace(&namespace).await {
            Ok(()) => println!("dropped {namespace}"),
            Err(e) => {
                tracing::error!("Failed to drop {}: {}", namespace, e);
                failed += 1;
            }
        }
    }
    conn.close().await?;
    if failed > 0 {
        anyhow::bail!("{failed} namespace(s) could not be dropped");
    }
    Ok(())
}
