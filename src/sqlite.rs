use crate::connection::{Connection, RowResult};
use crate::error::{OrmError, Result};
use crate::value::{StorageClass, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, ToSql};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// In-memory database path understood by SQLite.
pub const MEMORY_PATH: &str = ":memory:";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite `journal_mode` pragma values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
            Self::Memory => "memory",
        }
    }
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: PathBuf,
    #[serde(default)]
    pub journal_mode: JournalMode,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Sets `PRAGMA foreign_keys`. Reference markers are never compiled, so
    /// this only matters for hand-written constraints.
    #[serde(default)]
    pub foreign_keys: bool,
}

impl SqliteConfig {
    /// Create a new SQLite config for a database file
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            journal_mode: JournalMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: false,
        }
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> Self {
        Self {
            journal_mode: JournalMode::Memory,
            ..Self::new(MEMORY_PATH)
        }
    }

    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = journal_mode;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == MEMORY_PATH
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(OrmError::Configuration(
                "db_path must not be empty".to_string(),
            ));
        }
        if !self.is_in_memory() && self.db_path.is_dir() {
            return Err(OrmError::Configuration(format!(
                "db_path [{}] is a directory",
                self.db_path.display()
            )));
        }
        Ok(())
    }
}

/// [`Connection`] over a single rusqlite connection.
pub struct SqliteConnection {
    connection: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        config.validate()?;
        let connection = if config.is_in_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(&config.db_path)?
        };
        connection.execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            config.journal_mode.pragma_value()
        ))?;
        connection.execute_batch(&format!(
            "PRAGMA foreign_keys = {};",
            if config.foreign_keys { "ON" } else { "OFF" }
        ))?;
        connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        info!(path = %config.db_path.display(), "opened sqlite database");
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    /// Underlying rusqlite handle.
    pub fn raw(&self) -> &rusqlite::Connection {
        &self.connection
    }
}

impl Connection for SqliteConnection {
    fn execute_statement(&self, sql: &str, args: &[Value]) -> Result<Box<dyn RowResult>> {
        let mut statement = self.connection.prepare(sql)?;
        let column_count = statement.column_count();
        if column_count == 0 {
            statement.execute(params_from_iter(args.iter()))?;
            return Ok(Box::new(SqliteRows::default()));
        }

        let columns = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut cursor = statement.query(params_from_iter(args.iter()))?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(owned_value(row.get_ref(index)?));
            }
            rows.push(values);
        }
        Ok(Box::new(SqliteRows::new(columns, rows)))
    }

    fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.connection.execute_batch(sql)?;
        Ok(())
    }

    fn begin_transaction(&self) -> Result<()> {
        self.connection.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        self.connection.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        self.connection.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        !self.connection.is_autocommit()
    }
}

fn owned_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Self::Null => ValueRef::Null,
            Self::Integer(v) => ValueRef::Integer(*v),
            Self::Real(v) => ValueRef::Real(*v),
            Self::Text(v) => ValueRef::Text(v.as_bytes()),
            Self::Blob(v) => ValueRef::Blob(v),
        }))
    }
}

/// Renders a REAL the way SQLite's own text conversion does (`%!.15g`):
/// 15 significant digits, trailing zeros trimmed, and always a fractional
/// part, so `1.0` stays `"1.0"` and `1e20` becomes `"1.0e+20"`.
fn real_to_text(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    let scientific = format!("{value:.14e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..15).contains(&exponent) {
        let decimals = usize::try_from(14 - exponent).unwrap_or(0);
        with_fraction(trim_zeros(&format!("{value:.decimals$}")))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            with_fraction(trim_zeros(mantissa)),
            exponent.unsigned_abs()
        )
    }
}

fn trim_zeros(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

fn with_fraction(digits: &str) -> String {
    if digits.contains('.') {
        digits.to_string()
    } else {
        format!("{digits}.0")
    }
}

/// Materialized statement result with positional navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqliteRows {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl SqliteRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: None,
        }
    }

    fn current(&self, index: usize) -> Option<&Value> {
        self.position
            .and_then(|position| self.rows.get(position))
            .and_then(|row| row.get(index))
    }

    fn mismatch(&self, index: usize, expected: &str) -> OrmError {
        let name = self.columns.get(index).map_or("?", String::as_str);
        let found = self
            .current(index)
            .and_then(Value::storage_class)
            .map_or("null", StorageClass::as_sql);
        OrmError::Access(format!(
            "column [{name}] holds {found}, expected {expected}"
        ))
    }
}

impl RowResult for SqliteRows {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    fn column_class(&self, index: usize) -> Option<StorageClass> {
        self.current(index).and_then(Value::storage_class)
    }

    fn move_to(&mut self, position: usize) -> bool {
        if position < self.rows.len() {
            self.position = Some(position);
            true
        } else {
            self.position = None;
            false
        }
    }

    fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |position| position + 1);
        self.move_to(next)
    }

    fn get_text(&self, index: usize) -> Result<Option<String>> {
        match self.current(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(v)) => Ok(Some(v.clone())),
            Some(Value::Integer(v)) => Ok(Some(v.to_string())),
            Some(Value::Real(v)) => Ok(Some(real_to_text(*v))),
            Some(Value::Blob(v)) => Ok(Some(String::from_utf8_lossy(v).into_owned())),
        }
    }

    fn get_integer(&self, index: usize) -> Result<Option<i64>> {
        match self.current(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(v)) => Ok(Some(*v)),
            Some(Value::Real(v)) => Ok(Some(*v as i64)),
            Some(Value::Text(v)) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.mismatch(index, "INTEGER")),
            Some(Value::Blob(_)) => Err(self.mismatch(index, "INTEGER")),
        }
    }

    fn get_real(&self, index: usize) -> Result<Option<f64>> {
        match self.current(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Real(v)) => Ok(Some(*v)),
            Some(Value::Integer(v)) => Ok(Some(*v as f64)),
            Some(Value::Text(v)) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.mismatch(index, "REAL")),
            Some(Value::Blob(_)) => Err(self.mismatch(index, "REAL")),
        }
    }

    fn get_blob(&self, index: usize) -> Result<Option<Vec<u8>>> {
        match self.current(index) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Blob(v)) => Ok(Some(v.clone())),
            Some(Value::Text(v)) => Ok(Some(v.clone().into_bytes())),
            Some(_) => Err(self.mismatch(index, "BINARY")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SqliteConfig = serde_json::from_str(r#"{ "db_path": "app.db" }"#).unwrap();
        assert_eq!(config, SqliteConfig::new("app.db"));
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.busy_timeout_ms, 5_000);

        let config: SqliteConfig = serde_json::from_str(
            r#"{ "db_path": ":memory:", "journal_mode": "delete", "foreign_keys": true }"#,
        )
        .unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert!(config.foreign_keys);
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(
            SqliteConfig::new("").validate(),
            Err(OrmError::Configuration(_))
        ));
    }

    #[test]
    fn statements_without_rows_return_empty_result() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        connection
            .execute_ddl("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();
        let result = connection
            .execute_statement("INSERT INTO t (id, name) VALUES (?, ?)", &crate::args![1, "a"])
            .unwrap();
        assert_eq!(result.row_count(), 0);

        let mut result = connection
            .execute_statement("SELECT id, name FROM t", &[])
            .unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.column_index("name"), Some(1));
        assert!(result.move_first());
        assert_eq!(result.get_text(1).unwrap().as_deref(), Some("a"));
        assert_eq!(result.column_class(0), Some(StorageClass::Integer));
        assert!(!result.move_next());
    }

    #[test]
    fn rejected_statement_surfaces_store_error() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        assert!(matches!(
            connection.execute_statement("SELECT * FROM missing", &[]),
            Err(OrmError::Store(_))
        ));
    }

    #[test]
    fn transaction_flag_follows_autocommit() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        assert!(!connection.is_transaction_active());
        connection.begin_transaction().unwrap();
        assert!(connection.is_transaction_active());
        connection.rollback_transaction().unwrap();
        assert!(!connection.is_transaction_active());
    }

    #[test]
    fn real_text_keeps_sqlite_formatting() {
        let mut rows = SqliteRows::new(
            vec!["r".to_string()],
            vec![
                vec![Value::Real(1.0)],
                vec![Value::Real(0.1)],
                vec![Value::Real(-2.5)],
                vec![Value::Real(1e20)],
                vec![Value::Real(1.5e-7)],
            ],
        );
        let mut texts = Vec::new();
        while rows.move_next() {
            texts.push(rows.get_text(0).unwrap().unwrap());
        }
        assert_eq!(texts, ["1.0", "0.1", "-2.5", "1.0e+20", "1.5e-07"]);
        assert_eq!(real_to_text(1.0 / 3.0), "0.333333333333333");
    }

    #[test]
    fn real_text_matches_store_cast() {
        let connection = SqliteConnection::open_in_memory().unwrap();
        let mut result = connection
            .execute_statement(
                "SELECT 1.0, CAST(1.0 AS TEXT), 0.1, CAST(0.1 AS TEXT), \
                 -3.0, CAST(-3.0 AS TEXT), 123456.789, CAST(123456.789 AS TEXT)",
                &[],
            )
            .unwrap();
        assert!(result.move_first());
        for index in (0..8).step_by(2) {
            assert_eq!(result.column_class(index), Some(StorageClass::Real));
            assert_eq!(
                result.get_text(index).unwrap(),
                result.get_text(index + 1).unwrap()
            );
        }
    }

    #[test]
    fn blob_cannot_be_read_as_integer() {
        let mut rows = SqliteRows::new(vec!["b".to_string()], vec![vec![Value::Blob(vec![1])]]);
        rows.move_first();
        assert!(matches!(rows.get_integer(0), Err(OrmError::Access(_))));
    }
}
