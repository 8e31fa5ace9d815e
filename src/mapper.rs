//! Row-to-entity mapping.

use crate::connection::RowResult;
use crate::entity::Entity;
use crate::error::{OrmError, Result};
use crate::schema::TableDescriptor;
use crate::types::TypeRegistry;
use crate::value::{StorageClass, Value};
use std::sync::Arc;

/// One unmapped row: column names with dynamically tagged values, in
/// projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(column, value)| (column.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }
}

/// Maps store rows onto entities, scalars or ad hoc [`Row`]s.
pub struct RowMapper<'a> {
    types: &'a TypeRegistry,
}

impl<'a> RowMapper<'a> {
    pub const fn new(types: &'a TypeRegistry) -> Self {
        Self { types }
    }

    /// Zero rows map to `None`; more than one is a cardinality error.
    pub fn map_one<E: Entity>(
        &self,
        descriptor: &TableDescriptor<E>,
        rows: &mut dyn RowResult,
    ) -> Result<Option<E>> {
        if !single_row(rows)? {
            return Ok(None);
        }
        let positions = column_positions(descriptor, rows);
        self.map_current(descriptor, &positions, rows).map(Some)
    }

    /// Every row, in store order.
    pub fn map_many<E: Entity>(
        &self,
        descriptor: &TableDescriptor<E>,
        rows: &mut dyn RowResult,
    ) -> Result<Vec<E>> {
        let positions = column_positions(descriptor, rows);
        let mut entities = Vec::with_capacity(rows.row_count());
        let mut more = rows.move_first();
        while more {
            entities.push(self.map_current(descriptor, &positions, rows)?);
            more = rows.move_next();
        }
        Ok(entities)
    }

    /// Single value of a registered native type from a one-column result.
    pub fn map_scalar<T: 'static>(&self, rows: &mut dyn RowResult) -> Result<Option<T>> {
        if !single_row(rows)? {
            return Ok(None);
        }
        if rows.column_count() > 1 {
            return Err(OrmError::Cardinality(
                "More than one column to extract.".to_string(),
            ));
        }
        self.types.decode::<T>(rows, 0).map(Some)
    }

    /// Every row as name/value pairs, typed by what the store reports.
    pub fn map_rows(&self, rows: &mut dyn RowResult) -> Result<Vec<Row>> {
        let mut mapped = Vec::with_capacity(rows.row_count());
        for position in 0..rows.row_count() {
            if !rows.move_to(position) {
                break;
            }
            let mut entries = Vec::with_capacity(rows.column_count());
            for index in 0..rows.column_count() {
                let name = rows.column_name(index).unwrap_or_default().to_string();
                entries.push((name, column_value(rows, index)?));
            }
            mapped.push(Row { entries });
        }
        Ok(mapped)
    }

    fn map_current<E: Entity>(
        &self,
        descriptor: &TableDescriptor<E>,
        positions: &[Option<usize>],
        row: &dyn RowResult,
    ) -> Result<E> {
        let mut entity = descriptor.instantiate()?;
        for (column, position) in descriptor.columns().iter().zip(positions) {
            if let Some(index) = *position {
                column.assign(&mut entity, self.types, row, index)?;
            }
        }
        Ok(entity)
    }
}

/// Positions `rows` on its only row; false when empty.
fn single_row(rows: &mut dyn RowResult) -> Result<bool> {
    match rows.row_count() {
        0 => Ok(false),
        1 => Ok(rows.move_first()),
        count => Err(OrmError::Cardinality(format!(
            "More than one row to fetch [{count}]."
        ))),
    }
}

/// Result position of each descriptor column; `None` when not projected.
fn column_positions<E: Entity>(
    descriptor: &TableDescriptor<E>,
    rows: &dyn RowResult,
) -> Vec<Option<usize>> {
    descriptor
        .columns()
        .iter()
        .map(|column| rows.column_index(&column.name))
        .collect()
}

fn column_value(row: &dyn RowResult, index: usize) -> Result<Value> {
    let value = match row.column_class(index) {
        None => None,
        Some(StorageClass::Binary) => row.get_blob(index)?.map(Value::Blob),
        Some(StorageClass::Real) => row.get_real(index)?.map(Value::Real),
        Some(StorageClass::Integer | StorageClass::Numeric) => {
            row.get_integer(index)?.map(Value::Integer)
        }
        Some(StorageClass::Text) => row.get_text(index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// One-shot iterator decoding rows as it advances. Owns the row handle and
/// releases it when dropped.
pub struct MappedRows<E: Entity> {
    rows: Box<dyn RowResult>,
    descriptor: Arc<TableDescriptor<E>>,
    types: Arc<TypeRegistry>,
    positions: Vec<Option<usize>>,
    next: usize,
}

impl<E: Entity> MappedRows<E> {
    pub(crate) fn new(
        rows: Box<dyn RowResult>,
        descriptor: Arc<TableDescriptor<E>>,
        types: Arc<TypeRegistry>,
    ) -> Self {
        let positions = column_positions(&descriptor, rows.as_ref());
        Self {
            rows,
            descriptor,
            types,
            positions,
            next: 0,
        }
    }
}

impl<E: Entity> Iterator for MappedRows<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.rows.move_to(self.next) {
            return None;
        }
        self.next += 1;
        let mapper = RowMapper::new(&self.types);
        Some(mapper.map_current(&self.descriptor, &self.positions, self.rows.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.row_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
