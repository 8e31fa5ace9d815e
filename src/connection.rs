//! Contract required from the relational store.
//!
//! The mapping layer never parses or executes SQL itself; it hands compiled
//! text and positional arguments to a [`Connection`] and reads back a
//! [`RowResult`]. Dropping a `RowResult` releases it.

use crate::error::Result;
use crate::value::{StorageClass, Value};

/// Statement execution and transaction primitives of the store.
pub trait Connection: Send {
    /// Executes one statement with positional arguments.
    ///
    /// Statements that produce no rows return an empty result.
    fn execute_statement(&self, sql: &str, args: &[Value]) -> Result<Box<dyn RowResult>>;

    /// Executes schema statements (possibly several, `;` separated).
    fn execute_ddl(&self, sql: &str) -> Result<()>;

    fn begin_transaction(&self) -> Result<()>;

    fn commit_transaction(&self) -> Result<()>;

    fn rollback_transaction(&self) -> Result<()>;

    fn is_transaction_active(&self) -> bool;
}

/// Positional cursor over the rows a statement produced.
///
/// A fresh result is positioned before the first row.
pub trait RowResult {
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> Option<&str>;

    /// Index of the column named `name`, if the projection contains it.
    fn column_index(&self, name: &str) -> Option<usize> {
        (0..self.column_count()).find(|&index| self.column_name(index) == Some(name))
    }

    /// Storage class of the value in the current row, `None` for null.
    fn column_class(&self, index: usize) -> Option<StorageClass>;

    /// Moves to row `position`; returns false when out of range.
    fn move_to(&mut self, position: usize) -> bool;

    /// Advances to the next row; returns false past the last row.
    fn move_next(&mut self) -> bool;

    fn move_first(&mut self) -> bool {
        self.move_to(0)
    }

    fn is_null(&self, index: usize) -> bool {
        self.column_class(index).is_none()
    }

    fn get_text(&self, index: usize) -> Result<Option<String>>;

    fn get_integer(&self, index: usize) -> Result<Option<i64>>;

    fn get_real(&self, index: usize) -> Result<Option<f64>>;

    fn get_blob(&self, index: usize) -> Result<Option<Vec<u8>>>;
}
