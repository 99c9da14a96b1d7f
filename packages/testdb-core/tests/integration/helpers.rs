//! Shared setup for integration tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::{tempdir, TempDir};
use tracing::subscriber::DefaultGuard;

use testdb_core::memory::{MemoryDriver, MemoryEngine};
use testdb_core::{TemplateDatabase, TemplateDatabaseConfig};

pub type MemoryTemplate = TemplateDatabase<MemoryDriver>;

/// Directory of the crate's bundled schema and fixtures.
pub fn testdata_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

/// Config pointing at the bundled users/todos dataset.
pub fn testdata_config() -> TemplateDatabaseConfig {
    TemplateDatabaseConfig {
        namespace_prefix: "todo".to_string(),
        schema_path: testdata_dir().join("schema.sql"),
        fixtures_dir: testdata_dir().join("fixtures"),
        ..Default::default()
    }
}

/// Uninitialized template over a fresh memory engine.
pub fn memory_template(config: TemplateDatabaseConfig) -> (Arc<MemoryTemplate>, Arc<MemoryEngine>) {
    let driver = MemoryDriver::new();
    let engine = Arc::clone(driver.engine());
    let template = TemplateDatabase::new(config, driver).unwrap();
    (Arc::new(template), engine)
}

/// Initialized template over the bundled dataset.
pub async fn todo_template() -> (Arc<MemoryTemplate>, Arc<MemoryEngine>) {
    let (template, engine) = memory_template(testdata_config());
    template.init().await.unwrap();
    (template, engine)
}

/// Scratch directory holding a schema file and a fixture directory.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("fixtures")).unwrap();
        Self { dir }
    }

    pub fn schema_path(&self) -> PathBuf {
        self.dir.path().join("schema.sql")
    }

    pub fn write_schema(&self, sql: &str) {
        fs::write(self.schema_path(), sql).unwrap();
    }

    pub fn write_fixture(&self, file: &str, content: &str) {
        fs::write(self.dir.path().join("fixtures").join(file), content).unwrap();
    }

    pub fn config(&self, prefix: &str) -> TemplateDatabaseConfig {
        TemplateDatabaseConfig {
            namespace_prefix: prefix.to_string(),
            schema_path: self.schema_path(),
            fixtures_dir: self.dir.path().join("fixtures"),
            ..Default::default()
        }
    }
}

/// Log lines written while the returned guard is alive on this thread.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
