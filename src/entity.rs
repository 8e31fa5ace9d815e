//! Entity declaration surface.
//!
//! An entity type describes its table through [`Entity::schema`]: a table
//! name override and one [`Column`] per persisted field, each carrying its
//! accessor pair and key/index markers. Nothing is discovered at runtime.

use crate::connection::RowResult;
use crate::error::Result;
use crate::types::TypeRegistry;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

/// Application record type mapped to one table.
///
/// Instances are built with `Default` unless a factory was installed via
/// [`Session::create_table_with_factory`](crate::Session::create_table_with_factory).
pub trait Entity: Default + Send + Sync + 'static {
    fn schema() -> EntitySchema<Self>;
}

pub(crate) type Reader<E> = Arc<dyn Fn(&E, &TypeRegistry) -> Result<Value> + Send + Sync>;
pub(crate) type Writer<E> =
    Arc<dyn Fn(&mut E, &TypeRegistry, &dyn RowResult, usize) -> Result<()> + Send + Sync>;

/// Per-field sort order inside an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Membership of a column in a named (unique) index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMarker {
    pub name: String,
    pub order: Option<SortOrder>,
}

/// Reference to a column of another table.
///
/// Kept on the column descriptor only; it is not compiled into DDL and not
/// enforced on writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub table: String,
    pub column: String,
}

/// Declarative description of an entity's table.
pub struct EntitySchema<E> {
    pub(crate) table: Option<String>,
    pub(crate) columns: Vec<Column<E>>,
}

impl<E: Entity> EntitySchema<E> {
    pub fn new() -> Self {
        Self {
            table: None,
            columns: Vec::new(),
        }
    }

    /// Overrides the table name (defaults to the type name).
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    pub fn column(mut self, column: Column<E>) -> Self {
        self.columns.push(column);
        self
    }
}

impl<E: Entity> Default for EntitySchema<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// One persisted field of `E`.
pub struct Column<E> {
    pub(crate) field: &'static str,
    pub(crate) name: Option<String>,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) unique: bool,
    pub(crate) primary_key: bool,
    pub(crate) index: Option<IndexMarker>,
    pub(crate) unique_index: Option<IndexMarker>,
    pub(crate) reference: Option<Reference>,
    pub(crate) read: Reader<E>,
    pub(crate) write: Writer<E>,
}

impl<E: Entity> Column<E> {
    /// Declares field `field` of type `F` with its getter and setter.
    ///
    /// ```ignore
    /// Column::new("name", |u: &User| &u.name, |u: &mut User, v: String| u.name = v)
    /// ```
    pub fn new<F, G, S>(field: &'static str, get: G, set: S) -> Self
    where
        F: 'static,
        G: Fn(&E) -> &F + Send + Sync + 'static,
        S: Fn(&mut E, F) + Send + Sync + 'static,
    {
        let read: Reader<E> =
            Arc::new(move |entity: &E, types: &TypeRegistry| types.encode::<F>(get(entity)));
        let write: Writer<E> = Arc::new(
            move |entity: &mut E,
                  types: &TypeRegistry,
                  row: &dyn RowResult,
                  index: usize|
                  -> Result<()> {
                set(entity, types.decode::<F>(row, index)?);
                Ok(())
            },
        );
        Self {
            field,
            name: None,
            type_id: TypeId::of::<F>(),
            type_name: type_name::<F>(),
            unique: false,
            primary_key: false,
            index: None,
            unique_index: None,
            reference: None,
            read,
            write,
        }
    }

    /// Stores the field under `name` instead of the field name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Adds a column-level `UNIQUE` constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index(self, name: impl Into<String>) -> Self {
        self.index_marker(name.into(), None)
    }

    pub fn index_ordered(self, name: impl Into<String>, order: SortOrder) -> Self {
        self.index_marker(name.into(), Some(order))
    }

    pub fn unique_index(mut self, name: impl Into<String>) -> Self {
        self.unique_index = Some(IndexMarker {
            name: name.into(),
            order: None,
        });
        self
    }

    pub fn unique_index_ordered(mut self, name: impl Into<String>, order: SortOrder) -> Self {
        self.unique_index = Some(IndexMarker {
            name: name.into(),
            order: Some(order),
        });
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.reference = Some(Reference {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    fn index_marker(mut self, name: String, order: Option<SortOrder>) -> Self {
        self.index = Some(IndexMarker { name, order });
        self
    }
}

impl<E> fmt::Debug for Column<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("field", &self.field)
            .field("name", &self.name)
            .field("type", &self.type_name)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

/// Table name used when a schema does not override it: the bare type name.
pub(crate) fn default_table_name<E>() -> String {
    let full = type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sample;

    impl Entity for Sample {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
        }
    }

    #[test]
    fn default_table_name_strips_module_path() {
        assert_eq!(default_table_name::<Sample>(), "Sample");
    }

    #[test]
    fn column_markers_accumulate() {
        #[derive(Default)]
        struct Account {
            email: String,
        }

        impl Entity for Account {
            fn schema() -> EntitySchema<Self> {
                EntitySchema::new()
            }
        }

        let column = Column::new(
            "email",
            |a: &Account| &a.email,
            |a: &mut Account, v: String| a.email = v,
        )
        .named("mail")
        .unique()
        .index_ordered("idx_mail", SortOrder::Desc)
        .references("users", "email");

        assert_eq!(column.name.as_deref(), Some("mail"));
        assert!(column.unique);
        assert!(!column.primary_key);
        assert_eq!(column.index.as_ref().and_then(|i| i.order), Some(SortOrder::Desc));
        assert_eq!(column.reference.as_ref().map(|r| r.table.as_str()), Some("users"));
        assert_eq!(column.type_id, TypeId::of::<String>());
    }
}
