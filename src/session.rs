//! Sessions and the registries they share.
//!
//! A [`Catalog`] owns the type registry and the schema cache and is shared
//! by reference (`Arc`) between any number of sessions and threads. A
//! [`Session`] owns one store connection. [`Database`] keeps named
//! sessions over one catalog.

use crate::connection::{Connection, RowResult};
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::mapper::{Row, RowMapper};
use crate::query::{Query, RawQuery};
use crate::schema::{SchemaCache, TableDescriptor};
use crate::sqlite::{JournalMode, SqliteConfig, SqliteConnection};
use crate::store::Store;
use crate::transaction::Transaction;
use crate::types::{TypeRegistry, TypeResolver};
use crate::value::Value;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Type registry plus descriptor cache.
#[derive(Default)]
pub struct Catalog {
    types: Arc<TypeRegistry>,
    schemas: SchemaCache,
}

impl Catalog {
    /// Catalog with the default resolvers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: TypeRegistry) -> Self {
        Self {
            types: Arc::new(types),
            schemas: SchemaCache::new(),
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_handle(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.types)
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// Registers a resolver for `T`, replacing any previous one. Descriptors
    /// already cached keep the storage class they were probed with.
    pub fn register_type<T, R>(&self, resolver: R)
    where
        T: 'static,
        R: TypeResolver<T> + 'static,
    {
        self.types.register::<T, R>(resolver);
    }

    pub fn probe<E: Entity>(&self) -> Result<Arc<TableDescriptor<E>>> {
        self.schemas.probe::<E>(&self.types)
    }
}

/// One store connection bound to a catalog.
pub struct Session {
    name: String,
    connection: Box<dyn Connection>,
    catalog: Arc<Catalog>,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        connection: impl Connection + 'static,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            name: name.into(),
            connection: Box::new(connection),
            catalog,
        }
    }

    /// Opens a SQLite session with a private catalog.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        Self::open_with_catalog(config, Arc::new(Catalog::new()))
    }

    pub fn open_with_catalog(config: &SqliteConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let connection = SqliteConnection::open(config)?;
        let name = config
            .db_path
            .file_stem()
            .map_or_else(|| config.db_path.display().to_string(), |stem| {
                stem.to_string_lossy().into_owned()
            });
        Ok(Self::new(name, connection, catalog))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn types(&self) -> &TypeRegistry {
        self.catalog.types()
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn mapper(&self) -> RowMapper<'_> {
        RowMapper::new(self.types())
    }

    pub fn probe<E: Entity>(&self) -> Result<Arc<TableDescriptor<E>>> {
        self.catalog.probe::<E>()
    }

    /// Executes one statement, logging its timing.
    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<Box<dyn RowResult>> {
        let start = Instant::now();
        let result = self.connection.execute_statement(sql, args);
        debug!(
            schema = %self.name,
            sql,
            args = args.len(),
            elapsed_us = start.elapsed().as_micros(),
            "executed statement"
        );
        result
    }

    pub fn execute_ddl(&self, ddl: &str) -> Result<()> {
        debug!(schema = %self.name, ddl, "executing ddl");
        self.connection.execute_ddl(ddl)
    }

    /// Creates the table and indexes of `E` if they do not exist.
    pub fn create_table<E: Entity>(&self) -> Result<()> {
        let descriptor = self.probe::<E>()?;
        let ddl = descriptor.create_table_sql()?.join("\n");
        self.execute_ddl(&ddl)?;
        info!(schema = %self.name, table = %descriptor.name(), "table created");
        Ok(())
    }

    /// Like [`create_table`](Self::create_table), also installing the
    /// factory used to instantiate `E` when mapping rows.
    pub fn create_table_with_factory<E, F>(&self, factory: F) -> Result<()>
    where
        E: Entity,
        F: Fn() -> Result<E> + Send + Sync + 'static,
    {
        self.probe::<E>()?.set_factory(Arc::new(factory));
        self.create_table::<E>()
    }

    pub fn drop_table<E: Entity>(&self) -> Result<()> {
        let descriptor = self.probe::<E>()?;
        self.execute_ddl(&descriptor.drop_table_sql())?;
        info!(schema = %self.name, table = %descriptor.name(), "table dropped");
        Ok(())
    }

    pub fn store<E: Entity>(&self) -> Result<Store<'_, E>> {
        Ok(Store::new(self, self.probe::<E>()?))
    }

    /// Query over `E` selecting every column of its table.
    pub fn query<E: Entity>(&self) -> Result<Query<'_, E>> {
        Ok(self.store::<E>()?.query())
    }

    pub fn raw_query<E: Entity>(&self, sql: impl Into<String>, args: Vec<Value>) -> RawQuery<'_, E> {
        RawQuery::new(self, sql, args)
    }

    /// Runs `sql` and returns unmapped rows.
    pub fn rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let mut rows = self.execute(sql, args)?;
        self.mapper().map_rows(rows.as_mut())
    }

    pub fn begin(&self) -> Result<Transaction<'_>> {
        Transaction::begin(self.connection.as_ref())
    }
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Where named schemas live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub directory: PathBuf,
    #[serde(default)]
    pub journal_mode: JournalMode,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            journal_mode: JournalMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    /// SQLite configuration for schema `name`, stored as `<name>.db`.
    pub fn schema_config(&self, name: &str) -> SqliteConfig {
        let file = if name.ends_with(".db") {
            name.to_string()
        } else {
            format!("{name}.db")
        };
        SqliteConfig {
            db_path: self.directory.join(file),
            journal_mode: self.journal_mode,
            busy_timeout_ms: self.busy_timeout_ms,
            foreign_keys: false,
        }
    }
}

/// Named schemas sharing one catalog.
pub struct Database {
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    schemas: Vec<Session>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_catalog(config, Arc::new(Catalog::new()))
    }

    pub fn with_catalog(config: DatabaseConfig, catalog: Arc<Catalog>) -> Self {
        Self {
            config,
            catalog,
            schemas: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Opens schema `name`, or returns it when already open.
    pub fn create_schema(&mut self, name: &str) -> Result<&Session> {
        let position = match self.position(name) {
            Some(position) => position,
            None => {
                let config = self.config.schema_config(name);
                let session = Session::open_with_catalog(&config, Arc::clone(&self.catalog))?;
                self.schemas.push(session);
                self.schemas.len() - 1
            }
        };
        Ok(&self.schemas[position])
    }

    /// Schema `name`; `None` selects the first schema created.
    pub fn schema(&self, name: Option<&str>) -> Result<&Session> {
        match name {
            None => self.schemas.first().ok_or_else(|| {
                OrmError::Configuration("You need to create your schemas first.".to_string())
            }),
            Some(name) => self
                .position(name)
                .map(|position| &self.schemas[position])
                .ok_or_else(|| OrmError::Configuration(format!("Schema [{name}] not found."))),
        }
    }

    pub fn store<E: Entity>(&self, schema: Option<&str>) -> Result<Store<'_, E>> {
        self.schema(schema)?.store::<E>()
    }

    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(Session::name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        let name = name.strip_suffix(".db").unwrap_or(name);
        self.schemas.iter().position(|session| session.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_appends_extension_once() {
        let config = DatabaseConfig::new("/data");
        assert_eq!(config.schema_config("app").db_path, PathBuf::from("/data/app.db"));
        assert_eq!(config.schema_config("app.db").db_path, PathBuf::from("/data/app.db"));
    }

    #[test]
    fn database_config_deserializes() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{ "directory": "/var/lib/app", "journal_mode": "delete" }"#)
                .unwrap();
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn empty_database_has_no_default_schema() {
        let database = Database::new(DatabaseConfig::new("/nonexistent"));
        assert!(matches!(database.schema(None), Err(OrmError::Configuration(_))));
        assert!(matches!(
            database.schema(Some("missing")),
            Err(OrmError::Configuration(_))
        ));
    }
}
