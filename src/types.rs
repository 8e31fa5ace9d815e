//! Native type resolution.
//!
//! A [`TypeRegistry`] maps each Rust value type to a [`TypeResolver`] that
//! knows its storage class and how to move values in and out of the store.

use crate::connection::RowResult;
use crate::error::{OrmError, Result};
use crate::value::{StorageClass, Value};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Encode/decode contract for one native type.
pub trait TypeResolver<T>: Send + Sync {
    /// Storage class declared for columns of this type.
    fn storage_class(&self) -> StorageClass;

    /// Reads the value at `index` of the current row. Null must not fail.
    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<T>;

    /// Converts a native value into a store-ready argument.
    fn encode(&self, value: &T) -> Value;
}

struct Registered {
    type_name: &'static str,
    storage_class: StorageClass,
    // Holds an `Arc<dyn TypeResolver<T>>` for the keyed `T`.
    resolver: Arc<dyn Any + Send + Sync>,
}

/// Registry of resolvers keyed by native type.
pub struct TypeRegistry {
    resolvers: RwLock<HashMap<TypeId, Registered>>,
}

impl TypeRegistry {
    /// Registry without any resolver.
    pub fn empty() -> Self {
        Self {
            resolvers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with resolvers for text, `i8`..`i64`, `bool`,
    /// `f32`/`f64`, byte buffers and their `Option` forms.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register::<String, _>(TextResolver);
        registry.register::<i8, _>(Integral::new(StorageClass::Integer));
        registry.register::<i16, _>(Integral::new(StorageClass::Integer));
        registry.register::<i32, _>(Integral::new(StorageClass::Integer));
        registry.register::<i64, _>(Integral::new(StorageClass::Numeric));
        registry.register::<bool, _>(BoolResolver);
        registry.register::<f32, _>(RealResolver);
        registry.register::<f64, _>(RealResolver);
        registry.register::<Vec<u8>, _>(BinaryResolver);

        registry.register::<Option<String>, _>(Nullable::new(TextResolver));
        registry.register::<Option<i8>, _>(Nullable::new(Integral::new(StorageClass::Integer)));
        registry.register::<Option<i16>, _>(Nullable::new(Integral::new(StorageClass::Integer)));
        registry.register::<Option<i32>, _>(Nullable::new(Integral::new(StorageClass::Integer)));
        registry.register::<Option<i64>, _>(Nullable::new(Integral::new(StorageClass::Numeric)));
        registry.register::<Option<bool>, _>(Nullable::new(BoolResolver));
        registry.register::<Option<f32>, _>(Nullable::new(RealResolver));
        registry.register::<Option<f64>, _>(Nullable::new(RealResolver));
        registry.register::<Option<Vec<u8>>, _>(Nullable::new(BinaryResolver));
        registry
    }

    /// Registers `resolver` for `T`, replacing any previous one.
    pub fn register<T, R>(&self, resolver: R)
    where
        T: 'static,
        R: TypeResolver<T> + 'static,
    {
        let storage_class = resolver.storage_class();
        let resolver: Arc<dyn TypeResolver<T>> = Arc::new(resolver);
        self.resolvers.write().insert(
            TypeId::of::<T>(),
            Registered {
                type_name: type_name::<T>(),
                storage_class,
                resolver: Arc::new(resolver),
            },
        );
    }

    /// Resolver currently registered for `T`.
    pub fn resolve<T: 'static>(&self) -> Result<Arc<dyn TypeResolver<T>>> {
        let resolvers = self.resolvers.read();
        let registered = resolvers
            .get(&TypeId::of::<T>())
            .ok_or(OrmError::UnknownType(type_name::<T>()))?;
        registered
            .resolver
            .downcast_ref::<Arc<dyn TypeResolver<T>>>()
            .cloned()
            .ok_or_else(|| {
                OrmError::Access(format!(
                    "resolver registered for [{}] does not produce [{}]",
                    registered.type_name,
                    type_name::<T>()
                ))
            })
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.resolvers.read().contains_key(&TypeId::of::<T>())
    }

    /// Storage class of the type identified by `type_id`.
    pub fn storage_class_of(&self, type_id: TypeId) -> Option<StorageClass> {
        self.resolvers
            .read()
            .get(&type_id)
            .map(|registered| registered.storage_class)
    }

    pub fn decode<T: 'static>(&self, row: &dyn RowResult, index: usize) -> Result<T> {
        self.resolve::<T>()?.decode(row, index)
    }

    pub fn encode<T: 'static>(&self, value: &T) -> Result<Value> {
        Ok(self.resolve::<T>()?.encode(value))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Text columns. Null decodes to an empty string.
pub struct TextResolver;

impl TypeResolver<String> for TextResolver {
    fn storage_class(&self) -> StorageClass {
        StorageClass::Text
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<String> {
        Ok(row.get_text(index)?.unwrap_or_default())
    }

    fn encode(&self, value: &String) -> Value {
        Value::Text(value.clone())
    }
}

/// Signed integers. Narrow widths are decoded from the stored 64-bit
/// value and truncated (`i8` goes through `i16` first). Null decodes to 0.
pub struct Integral {
    storage_class: StorageClass,
}

impl Integral {
    pub const fn new(storage_class: StorageClass) -> Self {
        Self { storage_class }
    }
}

fn stored_integer(row: &dyn RowResult, index: usize) -> Result<i64> {
    Ok(row.get_integer(index)?.unwrap_or(0))
}

impl TypeResolver<i8> for Integral {
    fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<i8> {
        Ok(stored_integer(row, index)? as i16 as i8)
    }

    fn encode(&self, value: &i8) -> Value {
        Value::from(*value)
    }
}

impl TypeResolver<i16> for Integral {
    fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<i16> {
        Ok(stored_integer(row, index)? as i16)
    }

    fn encode(&self, value: &i16) -> Value {
        Value::from(*value)
    }
}

impl TypeResolver<i32> for Integral {
    fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<i32> {
        Ok(stored_integer(row, index)? as i32)
    }

    fn encode(&self, value: &i32) -> Value {
        Value::from(*value)
    }
}

impl TypeResolver<i64> for Integral {
    fn storage_class(&self) -> StorageClass {
        self.storage_class
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<i64> {
        stored_integer(row, index)
    }

    fn encode(&self, value: &i64) -> Value {
        Value::Integer(*value)
    }
}

/// Booleans stored as INTEGER 0/1.
pub struct BoolResolver;

impl TypeResolver<bool> for BoolResolver {
    fn storage_class(&self) -> StorageClass {
        StorageClass::Integer
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<bool> {
        Ok(stored_integer(row, index)? != 0)
    }

    fn encode(&self, value: &bool) -> Value {
        Value::from(*value)
    }
}

/// Floating point values. `f32` is narrowed from the stored double.
pub struct RealResolver;

impl TypeResolver<f64> for RealResolver {
    fn storage_class(&self) -> StorageClass {
        StorageClass::Real
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<f64> {
        Ok(row.get_real(index)?.unwrap_or(0.0))
    }

    fn encode(&self, value: &f64) -> Value {
        Value::Real(*value)
    }
}

impl TypeResolver<f32> for RealResolver {
    fn storage_class(&self) -> StorageClass {
        StorageClass::Real
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<f32> {
        Ok(row.get_real(index)?.unwrap_or(0.0) as f32)
    }

    fn encode(&self, value: &f32) -> Value {
        Value::from(*value)
    }
}

/// Byte buffers. Null decodes to an empty buffer.
pub struct BinaryResolver;

impl TypeResolver<Vec<u8>> for BinaryResolver {
    fn storage_class(&self) -> StorageClass {
        StorageClass::Binary
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<Vec<u8>> {
        Ok(row.get_blob(index)?.unwrap_or_default())
    }

    fn encode(&self, value: &Vec<u8>) -> Value {
        Value::Blob(value.clone())
    }
}

/// Lifts a resolver for `T` to `Option<T>`, mapping null to `None`.
pub struct Nullable<R, T> {
    inner: R,
    _marker: PhantomData<fn() -> T>,
}

impl<R, T> Nullable<R, T> {
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<R, T> TypeResolver<Option<T>> for Nullable<R, T>
where
    R: TypeResolver<T>,
{
    fn storage_class(&self) -> StorageClass {
        self.inner.storage_class()
    }

    fn decode(&self, row: &dyn RowResult, index: usize) -> Result<Option<T>> {
        if row.is_null(index) {
            return Ok(None);
        }
        self.inner.decode(row, index).map(Some)
    }

    fn encode(&self, value: &Option<T>) -> Value {
        value
            .as_ref()
            .map_or(Value::Null, |inner| self.inner.encode(inner))
    }
}
