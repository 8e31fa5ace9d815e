//! CRUD façade over one entity type.

use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::query::{Query, QuerySpec};
use crate::schema::TableDescriptor;
use crate::session::Session;
use crate::transaction::Transaction;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// Create/read/update/delete/find for `E` through precompiled templates.
pub struct Store<'s, E> {
    session: &'s Session,
    descriptor: Arc<TableDescriptor<E>>,
}

impl<'s, E: Entity> Store<'s, E> {
    pub(crate) fn new(session: &'s Session, descriptor: Arc<TableDescriptor<E>>) -> Self {
        Self {
            session,
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &TableDescriptor<E> {
        &self.descriptor
    }

    /// Inserts `entity`; fails in the store if its key already exists.
    pub fn create(&self, entity: &E) -> Result<()> {
        let values = self.descriptor.values(entity, self.session.types())?;
        self.session.execute(self.descriptor.insert_sql(), &values)?;
        Ok(())
    }

    /// Deletes the row keyed by `entity`'s primary key.
    pub fn remove(&self, entity: &E) -> Result<()> {
        let keys = self.descriptor.key_values(entity, self.session.types())?;
        self.session.execute(self.descriptor.delete_sql(), &keys)?;
        Ok(())
    }

    /// Rewrites every non-key column of the row keyed by `entity`.
    pub fn update(&self, entity: &E) -> Result<()> {
        let Some(sql) = self.descriptor.update_sql() else {
            debug!(table = %self.descriptor.name(), "no non-key columns, update skipped");
            return Ok(());
        };
        let values = self.descriptor.update_values(entity, self.session.types())?;
        self.session.execute(sql, &values)?;
        Ok(())
    }

    /// Inserts or updates `entity` in one atomic upsert statement.
    pub fn save(&self, entity: &E) -> Result<()> {
        let values = self.descriptor.values(entity, self.session.types())?;
        self.session.execute(self.descriptor.upsert_sql(), &values)?;
        Ok(())
    }

    /// Point lookup by primary key values, in key declaration order.
    pub fn get(&self, key: &[Value]) -> Result<Option<E>> {
        let expected = self.descriptor.primary_key_columns().count();
        if key.len() != expected {
            return Err(OrmError::Configuration(format!(
                "Entity [{}] expects {expected} key value(s), got {}.",
                self.descriptor.name(),
                key.len()
            )));
        }
        let mut rows = self.session.execute(self.descriptor.get_sql(), key)?;
        if rows.row_count() > 1 {
            return Err(OrmError::Cardinality(format!(
                "Entity [{}] : there is more than one result to return [{}].",
                self.descriptor.name(),
                rows.row_count()
            )));
        }
        self.session
            .mapper()
            .map_one(&self.descriptor, rows.as_mut())
    }

    /// Current stored state of `entity`, looked up by its key.
    pub fn reload(&self, entity: &E) -> Result<Option<E>> {
        let keys = self.descriptor.key_values(entity, self.session.types())?;
        self.get(&keys)
    }

    /// `SELECT * FROM <table> WHERE <predicate>`.
    pub fn find(&self, predicate: &str, args: Vec<Value>) -> Result<Vec<E>> {
        self.query()
            .select("*")
            .from(self.descriptor.name())
            .filter(predicate, args)
            .get_many()
    }

    pub fn find_all(&self) -> Result<Vec<E>> {
        self.query().get_many()
    }

    pub fn count(&self) -> Result<i64> {
        self.query().count()
    }

    /// Fresh query preloaded with this entity's table.
    pub fn query(&self) -> Query<'s, E> {
        Query::new(
            self.session,
            QuerySpec::new().select("*").from(self.descriptor.name()),
        )
    }

    pub fn begin(&self) -> Result<Transaction<'s>> {
        self.session.begin()
    }
}
