//! Schema introspection and the per-entity descriptor cache.

use crate::compiler::{self, Statements};
use crate::connection::RowResult;
use crate::entity::{default_table_name, Column, Entity, IndexMarker, Reader, Reference, Writer};
use crate::error::{OrmError, Result};
use crate::types::TypeRegistry;
use crate::value::{StorageClass, Value};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds entity instances in place of `Default`.
pub type Factory<E> = Arc<dyn Fn() -> Result<E> + Send + Sync>;

/// Resolved metadata for one column.
pub struct ColumnDescriptor<E> {
    pub name: String,
    pub field: &'static str,
    pub type_name: &'static str,
    pub storage_class: StorageClass,
    pub primary_key: bool,
    pub unique: bool,
    pub index: Option<IndexMarker>,
    pub unique_index: Option<IndexMarker>,
    pub reference: Option<Reference>,
    read: Reader<E>,
    write: Writer<E>,
}

impl<E> ColumnDescriptor<E> {
    fn resolve(column: Column<E>, storage_class: StorageClass) -> Self {
        Self {
            name: column.name.unwrap_or_else(|| column.field.to_string()),
            field: column.field,
            type_name: column.type_name,
            storage_class,
            primary_key: column.primary_key,
            unique: column.unique,
            index: column.index,
            unique_index: column.unique_index,
            reference: column.reference,
            read: column.read,
            write: column.write,
        }
    }

    /// Encodes this column's field of `entity`.
    pub fn encode(&self, entity: &E, types: &TypeRegistry) -> Result<Value> {
        (self.read)(entity, types)
    }

    /// Decodes column `index` of the current row into this column's field.
    pub fn assign(
        &self,
        entity: &mut E,
        types: &TypeRegistry,
        row: &dyn RowResult,
        index: usize,
    ) -> Result<()> {
        (self.write)(entity, types, row, index)
    }
}

impl<E> fmt::Debug for ColumnDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("storage_class", &self.storage_class)
            .field("primary_key", &self.primary_key)
            .field("unique", &self.unique)
            .field("index", &self.index)
            .field("unique_index", &self.unique_index)
            .field("reference", &self.reference)
            .finish()
    }
}

/// Cached schema metadata and precompiled DML for one entity type.
pub struct TableDescriptor<E> {
    name: String,
    columns: Vec<ColumnDescriptor<E>>,
    statements: Statements,
    factory: RwLock<Option<Factory<E>>>,
}

impl<E: Entity> TableDescriptor<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor<E>] {
        &self.columns
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor<E>> {
        self.columns.iter().filter(|column| column.primary_key)
    }

    pub fn insert_sql(&self) -> &str {
        &self.statements.insert
    }

    /// `None` when every column is part of the primary key.
    pub fn update_sql(&self) -> Option<&str> {
        self.statements.update.as_deref()
    }

    pub fn delete_sql(&self) -> &str {
        &self.statements.delete
    }

    pub fn get_sql(&self) -> &str {
        &self.statements.get
    }

    pub fn get_where_clause(&self) -> &str {
        &self.statements.get_where
    }

    pub fn upsert_sql(&self) -> &str {
        &self.statements.upsert
    }

    /// `CREATE TABLE` followed by one statement per index group.
    pub fn create_table_sql(&self) -> Result<Vec<String>> {
        compiler::create_table(&self.name, &self.columns)
    }

    pub fn drop_table_sql(&self) -> String {
        compiler::drop_table(&self.name)
    }

    /// Installs (or replaces) the instantiation factory.
    pub fn set_factory(&self, factory: Factory<E>) {
        *self.factory.write() = Some(factory);
    }

    /// New instance from the factory, or `E::default()` without one.
    pub fn instantiate(&self) -> Result<E> {
        let factory = self.factory.read().clone();
        match factory {
            Some(factory) => factory().map_err(|error| match error {
                OrmError::Access(message) => OrmError::Access(message),
                other => OrmError::Access(format!(
                    "factory for entity [{}] failed: {other}",
                    self.name
                )),
            }),
            None => Ok(E::default()),
        }
    }

    /// Every column value of `entity`, in declaration order.
    pub fn values(&self, entity: &E, types: &TypeRegistry) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .map(|column| column.encode(entity, types))
            .collect()
    }

    /// Primary key values of `entity`, in declaration order.
    pub fn key_values(&self, entity: &E, types: &TypeRegistry) -> Result<Vec<Value>> {
        self.primary_key_columns()
            .map(|column| column.encode(entity, types))
            .collect()
    }

    /// Non-key values followed by key values, matching the update template.
    pub fn update_values(&self, entity: &E, types: &TypeRegistry) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in self.columns.iter().filter(|column| !column.primary_key) {
            values.push(column.encode(entity, types)?);
        }
        values.extend(self.key_values(entity, types)?);
        Ok(values)
    }
}

impl<E> fmt::Debug for TableDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("statements", &self.statements)
            .finish_non_exhaustive()
    }
}

/// Derives the descriptor of `E` from its declared schema.
pub fn introspect<E: Entity>(types: &TypeRegistry) -> Result<TableDescriptor<E>> {
    let schema = E::schema();
    let name = schema.table.unwrap_or_else(default_table_name::<E>);

    let mut columns = Vec::with_capacity(schema.columns.len());
    let mut seen = HashSet::new();
    for column in schema.columns {
        let storage_class = types.storage_class_of(column.type_id).ok_or_else(|| {
            OrmError::Configuration(format!(
                "Field [{}] of entity [{}] with type [{}] can not be mapped to a storage class.",
                column.field, name, column.type_name
            ))
        })?;
        let column = ColumnDescriptor::resolve(column, storage_class);
        if !seen.insert(column.name.clone()) {
            return Err(OrmError::Configuration(format!(
                "Entity [{}] declares column [{}] more than once.",
                name, column.name
            )));
        }
        columns.push(column);
    }

    if columns.is_empty() {
        return Err(OrmError::Configuration(format!(
            "Entity [{name}] has not defined columns."
        )));
    }
    if !columns.iter().any(|column| column.primary_key) {
        return Err(OrmError::Configuration(format!(
            "You must define a primary key for table [{name}]."
        )));
    }

    let statements = compiler::compile_statements(&name, &columns);
    Ok(TableDescriptor {
        name,
        columns,
        statements,
        factory: RwLock::new(None),
    })
}

/// Process-lifetime memo of table descriptors, keyed by entity type.
///
/// Lookups of published descriptors take the shared lock only; the first
/// probe of a type computes under the exclusive lock so each type is
/// introspected at most once. Entries are never evicted.
#[derive(Default)]
pub struct SchemaCache {
    tables: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe<E: Entity>(&self, types: &TypeRegistry) -> Result<Arc<TableDescriptor<E>>> {
        if let Some(descriptor) = self.lookup::<E>() {
            return Ok(descriptor);
        }

        let mut tables = self.tables.write();
        if let Some(entry) = tables.get(&TypeId::of::<E>()) {
            return downcast(entry);
        }
        let descriptor = Arc::new(introspect::<E>(types)?);
        debug!(table = %descriptor.name, columns = descriptor.columns.len(), "schema probed");
        tables.insert(TypeId::of::<E>(), descriptor.clone());
        Ok(descriptor)
    }

    pub fn lookup<E: Entity>(&self) -> Option<Arc<TableDescriptor<E>>> {
        self.tables
            .read()
            .get(&TypeId::of::<E>())
            .and_then(|entry| downcast(entry).ok())
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

fn downcast<E: Entity>(entry: &Arc<dyn Any + Send + Sync>) -> Result<Arc<TableDescriptor<E>>> {
    Arc::clone(entry)
        .downcast::<TableDescriptor<E>>()
        .map_err(|_| OrmError::Access("cached descriptor has an unexpected type".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntitySchema;

    #[derive(Default)]
    struct Note {
        id: i64,
        body: String,
    }

    impl Entity for Note {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
                .table("notes")
                .column(Column::new("id", |n: &Note| &n.id, |n: &mut Note, v: i64| n.id = v).primary_key())
                .column(
                    Column::new("body", |n: &Note| &n.body, |n: &mut Note, v: String| n.body = v)
                        .named("text"),
                )
        }
    }

    #[derive(Default)]
    struct Keyless {
        value: i32,
    }

    impl Entity for Keyless {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new().column(Column::new(
                "value",
                |k: &Keyless| &k.value,
                |k: &mut Keyless, v: i32| k.value = v,
            ))
        }
    }

    #[derive(Default)]
    struct Empty;

    impl Entity for Empty {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
        }
    }

    #[derive(Default)]
    struct Exotic {
        id: i64,
        amount: u128,
    }

    impl Entity for Exotic {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
                .column(Column::new("id", |e: &Exotic| &e.id, |e: &mut Exotic, v: i64| e.id = v).primary_key())
                .column(Column::new(
                    "amount",
                    |e: &Exotic| &e.amount,
                    |e: &mut Exotic, v: u128| e.amount = v,
                ))
        }
    }

    #[test]
    fn probe_is_memoized() {
        let types = TypeRegistry::with_defaults();
        let cache = SchemaCache::new();
        let first = cache.probe::<Note>(&types).unwrap();
        let second = cache.probe::<Note>(&types).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.insert_sql(), second.insert_sql());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn column_names_follow_overrides() {
        let descriptor = introspect::<Note>(&TypeRegistry::with_defaults()).unwrap();
        let names: Vec<_> = descriptor.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "text"]);
        assert_eq!(descriptor.columns()[0].storage_class, StorageClass::Numeric);
    }

    #[test]
    fn entity_without_columns_is_rejected() {
        let error = introspect::<Empty>(&TypeRegistry::with_defaults()).unwrap_err();
        assert!(matches!(error, OrmError::Configuration(message) if message.contains("not defined columns")));
    }

    #[test]
    fn entity_without_primary_key_is_rejected() {
        let cache = SchemaCache::new();
        let types = TypeRegistry::with_defaults();
        assert!(matches!(
            cache.probe::<Keyless>(&types),
            Err(OrmError::Configuration(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn unresolved_field_type_names_the_field() {
        let error = introspect::<Exotic>(&TypeRegistry::with_defaults()).unwrap_err();
        match error {
            OrmError::Configuration(message) => {
                assert!(message.contains("[amount]"));
                assert!(message.contains("u128"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn factory_replaces_default_construction() {
        let descriptor = introspect::<Note>(&TypeRegistry::with_defaults()).unwrap();
        assert_eq!(descriptor.instantiate().unwrap().body, "");
        descriptor.set_factory(Arc::new(|| -> Result<Note> {
            Ok(Note {
                id: 0,
                body: "fresh".to_string(),
            })
        }));
        assert_eq!(descriptor.instantiate().unwrap().body, "fresh");

        descriptor.set_factory(Arc::new(|| -> Result<Note> {
            Err(OrmError::Store("boom".to_string()))
        }));
        assert!(matches!(descriptor.instantiate(), Err(OrmError::Access(_))));
    }
}
