//! Entity mapping over SQLite for the Runar ecosystem.
//!
//! # Intention
//!
//! - Turn entity declarations into table schemas and precompiled SQL.
//! - Build parameterized queries fluently and map result rows back into
//!   typed entities.
//!
//! # Architectural Boundaries
//!
//! - The store executes SQL; this crate only compiles statements and maps
//!   rows. Everything store-specific sits behind [`Connection`] and
//!   [`RowResult`], with a rusqlite implementation in [`sqlite`].
//! - No joins, migrations, connection pooling or foreign-key enforcement.
//!
//! # Example
//!
//! ```
//! use rust_orm::{args, Column, Entity, EntitySchema, Session};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     fn schema() -> EntitySchema<Self> {
//!         EntitySchema::new()
//!             .table("users")
//!             .column(Column::new("id", |u: &User| &u.id, |u: &mut User, v: i64| u.id = v).primary_key())
//!             .column(Column::new("name", |u: &User| &u.name, |u: &mut User, v: String| u.name = v))
//!     }
//! }
//!
//! # fn main() -> rust_orm::Result<()> {
//! let session = Session::open_in_memory()?;
//! session.create_table::<User>()?;
//! let users = session.store::<User>()?;
//! users.create(&User { id: 1, name: "a".to_string() })?;
//! assert_eq!(users.get(&args![1_i64])?.map(|u| u.name), Some("a".to_string()));
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod connection;
pub mod entity;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod query;
pub mod schema;
pub mod session;
pub mod sqlite;
pub mod store;
pub mod transaction;
pub mod types;
pub mod value;

pub use connection::{Connection, RowResult};
pub use entity::{Column, Entity, EntitySchema, IndexMarker, Reference, SortOrder};
pub use error::{OrmError, Result};
pub use mapper::{MappedRows, Row, RowMapper};
pub use query::{CompiledQuery, Query, QuerySpec, RawQuery};
pub use schema::{ColumnDescriptor, Factory, SchemaCache, TableDescriptor};
pub use session::{Catalog, Database, DatabaseConfig, Session};
pub use sqlite::{JournalMode, SqliteConfig, SqliteConnection, SqliteRows};
pub use store::Store;
pub use transaction::Transaction;
pub use types::{TypeRegistry, TypeResolver};
pub use value::{StorageClass, Value};
