//! Fluent query building and execution.
//!
//! [`QuerySpec`] accumulates clauses and compiles them into one
//! parameterized [`CompiledQuery`]. [`Query`] binds a `QuerySpec` to a session and
//! an entity type; [`RawQuery`] runs a literal statement instead.

use crate::entity::Entity;
use crate::error::Result;
use crate::mapper::{MappedRows, Row, RowMapper};
use crate::session::Session;
use crate::value::Value;
use std::marker::PhantomData;

/// Clause state of a `SELECT`. Empty strings count as unset.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    projection: String,
    source: String,
    filter: String,
    filter_args: Vec<Value>,
    grouping: String,
    having: String,
    having_args: Vec<Value>,
    ordering: String,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self {
            projection: "*".to_string(),
            source: String::new(),
            filter: String::new(),
            filter_args: Vec::new(),
            grouping: String::new(),
            having: String::new(),
            having_args: Vec::new(),
            ordering: String::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn select(mut self, projection: impl Into<String>) -> Self {
        self.projection = projection.into();
        self
    }

    pub fn from(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>, args: Vec<Value>) -> Self {
        self.filter = predicate.into();
        self.filter_args = args;
        self
    }

    pub fn group_by(mut self, grouping: impl Into<String>) -> Self {
        self.grouping = grouping.into();
        self
    }

    /// Only emitted (and its arguments only bound) when grouping is set.
    pub fn having(mut self, predicate: impl Into<String>, args: Vec<Value>) -> Self {
        self.having = predicate.into();
        self.having_args = args;
        self
    }

    pub fn order_by(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = ordering.into();
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Assembles the statement. When either bound is set both are bound:
    /// a missing limit becomes `i64::MAX`, a missing offset becomes 0.
    /// Arguments follow filter, having (grouped only), limit, offset.
    pub fn compile(self) -> CompiledQuery {
        let mut sql = format!("SELECT {} FROM {}", self.projection, self.source);
        let mut args = Vec::with_capacity(self.filter_args.len() + self.having_args.len() + 2);

        if !self.filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filter);
        }
        args.extend(self.filter_args);

        if !self.grouping.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.grouping);
            if !self.having.is_empty() {
                sql.push_str(" HAVING ");
                sql.push_str(&self.having);
            }
            args.extend(self.having_args);
        }

        if !self.ordering.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.ordering);
        }

        if self.limit.is_some() || self.offset.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(Value::Integer(self.limit.unwrap_or(i64::MAX)));
            args.push(Value::Integer(self.offset.unwrap_or(0)));
        }

        CompiledQuery { sql, args }
    }
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self::new()
    }
}

/// Statement text plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub args: Vec<Value>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// `SELECT count(*) FROM (<sql>)` over the same arguments.
    pub fn into_count(self) -> Self {
        Self {
            sql: format!("SELECT count(*) FROM ({})", self.sql),
            args: self.args,
        }
    }

    pub fn get_one<E: Entity>(self, session: &Session) -> Result<Option<E>> {
        let descriptor = session.probe::<E>()?;
        let mut rows = session.execute(&self.sql, &self.args)?;
        RowMapper::new(session.types()).map_one(&descriptor, rows.as_mut())
    }

    pub fn get_many<E: Entity>(self, session: &Session) -> Result<Vec<E>> {
        let descriptor = session.probe::<E>()?;
        let mut rows = session.execute(&self.sql, &self.args)?;
        RowMapper::new(session.types()).map_many(&descriptor, rows.as_mut())
    }

    pub fn iter<E: Entity>(self, session: &Session) -> Result<MappedRows<E>> {
        let descriptor = session.probe::<E>()?;
        let rows = session.execute(&self.sql, &self.args)?;
        Ok(MappedRows::new(rows, descriptor, session.catalog().types_handle()))
    }

    pub fn scalar<T: 'static>(self, session: &Session) -> Result<Option<T>> {
        let mut rows = session.execute(&self.sql, &self.args)?;
        RowMapper::new(session.types()).map_scalar::<T>(rows.as_mut())
    }

    pub fn count(self, session: &Session) -> Result<i64> {
        Ok(self.into_count().scalar::<i64>(session)?.unwrap_or(0))
    }

    pub fn rows(self, session: &Session) -> Result<Vec<Row>> {
        let mut rows = session.execute(&self.sql, &self.args)?;
        RowMapper::new(session.types()).map_rows(rows.as_mut())
    }
}

/// Query over entity type `E`, executed on a session.
pub struct Query<'s, E> {
    session: &'s Session,
    spec: QuerySpec,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> Query<'s, E> {
    pub(crate) fn new(session: &'s Session, spec: QuerySpec) -> Self {
        Self {
            session,
            spec,
            _entity: PhantomData,
        }
    }

    pub fn select(self, projection: impl Into<String>) -> Self {
        self.map(|spec| spec.select(projection))
    }

    pub fn from(self, source: impl Into<String>) -> Self {
        self.map(|spec| spec.from(source))
    }

    pub fn filter(self, predicate: impl Into<String>, args: Vec<Value>) -> Self {
        self.map(|spec| spec.filter(predicate, args))
    }

    pub fn group_by(self, grouping: impl Into<String>) -> Self {
        self.map(|spec| spec.group_by(grouping))
    }

    pub fn having(self, predicate: impl Into<String>, args: Vec<Value>) -> Self {
        self.map(|spec| spec.having(predicate, args))
    }

    pub fn order_by(self, ordering: impl Into<String>) -> Self {
        self.map(|spec| spec.order_by(ordering))
    }

    pub fn limit(self, limit: i64) -> Self {
        self.map(|spec| spec.limit(limit))
    }

    pub fn offset(self, offset: i64) -> Self {
        self.map(|spec| spec.offset(offset))
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn compile(self) -> CompiledQuery {
        self.spec.compile()
    }

    /// At most one entity; more than one row is a cardinality error.
    pub fn get_one(self) -> Result<Option<E>> {
        let session = self.session;
        self.compile().get_one(session)
    }

    pub fn get_many(self) -> Result<Vec<E>> {
        let session = self.session;
        self.compile().get_many(session)
    }

    /// Lazily mapped rows; see [`MappedRows`].
    pub fn iter(self) -> Result<MappedRows<E>> {
        let session = self.session;
        self.compile().iter(session)
    }

    pub fn count(self) -> Result<i64> {
        let session = self.session;
        self.compile().count(session)
    }

    /// Unmapped name/value rows.
    pub fn rows(self) -> Result<Vec<Row>> {
        let session = self.session;
        self.compile().rows(session)
    }

    fn map(self, apply: impl FnOnce(QuerySpec) -> QuerySpec) -> Self {
        Self {
            session: self.session,
            spec: apply(self.spec),
            _entity: PhantomData,
        }
    }
}

/// Literal statement with fixed positional arguments.
pub struct RawQuery<'s, E> {
    session: &'s Session,
    query: CompiledQuery,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> RawQuery<'s, E> {
    pub(crate) fn new(session: &'s Session, sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            session,
            query: CompiledQuery::new(sql, args),
            _entity: PhantomData,
        }
    }

    pub fn compile(self) -> CompiledQuery {
        self.query
    }

    pub fn get_one(self) -> Result<Option<E>> {
        self.query.get_one(self.session)
    }

    pub fn get_many(self) -> Result<Vec<E>> {
        self.query.get_many(self.session)
    }

    pub fn iter(self) -> Result<MappedRows<E>> {
        self.query.iter(self.session)
    }

    pub fn count(self) -> Result<i64> {
        self.query.count(self.session)
    }

    pub fn rows(self) -> Result<Vec<Row>> {
        self.query.rows(self.session)
    }
}
