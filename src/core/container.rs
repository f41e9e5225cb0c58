//! # Containers
//!
//! The two container shapes that make up every payload: an ordered [`ValueList`] and an
//! insertion-ordered, unique-keyed [`ValueMap`]. [`Container`] is the top-level unit the
//! binary codec encodes.
//!
//! Containers can only be filled through checked insertion, so any container that exists
//! is guaranteed to be encodable: string and key lengths, element counts and nesting depth
//! are verified when values go in, never when bytes go out.

use crate::core::value::Value;
use crate::error::ValueError;

/// Largest element count, string length or key length the wire format can express
pub const MAX_ELEMENTS: usize = u16::MAX as usize;

/// Deepest container nesting accepted at construction and at decode
pub const MAX_DEPTH: usize = 64;

/// Ordered sequence of values. Order is the wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueList {
    items: Vec<Value>,
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(MAX_ELEMENTS)),
        }
    }

    /// Append a value
    ///
    /// # Errors
    /// Returns a `ValueError` if the list is full or the value exceeds a wire limit
    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), ValueError> {
        let value = value.into();
        if self.items.len() >= MAX_ELEMENTS {
            return Err(ValueError::TooManyElements(self.items.len() + 1));
        }
        value.validate()?;
        self.items.push(value);
        Ok(())
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, value: impl Into<Value>) -> Result<Self, ValueError> {
        self.push(value)?;
        Ok(self)
    }

    /// Used by the decoder, which enforces the same limits while reading
    pub(crate) fn push_decoded(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Nesting depth, counting this list as 1
    pub fn depth(&self) -> usize {
        1 + self.items.iter().map(Value::depth).max().unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Key/value mapping with unique keys, kept in insertion order.
///
/// Equality ignores order: two maps are equal when they hold the same keys with equal values.
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. Replacing keeps the key's original position.
    ///
    /// # Errors
    /// Returns a `ValueError` if the key or value exceeds a wire limit or the map is full
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ValueError> {
        let key = key.into();
        let value = value.into();
        if key.len() > MAX_ELEMENTS {
            return Err(ValueError::KeyTooLong(key.len()));
        }
        value.validate()?;

        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Ok(Some(std::mem::replace(&mut slot.1, value)));
        }
        if self.entries.len() >= MAX_ELEMENTS {
            return Err(ValueError::TooManyElements(self.entries.len() + 1));
        }
        self.entries.push((key, value));
        Ok(None)
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self, ValueError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Used by the decoder, which has already rejected duplicate keys
    pub(crate) fn push_decoded(&mut self, key: String, value: Value) {
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Nesting depth, counting this map as 1
    pub fn depth(&self) -> usize {
        1 + self
            .entries
            .iter()
            .map(|(_, v)| v.depth())
            .max()
            .unwrap_or(0)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_byte(&self, key: &str) -> Option<u8> {
        match self.get(key) {
            Some(Value::Byte(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_short(&self, key: &str) -> Option<i16> {
        match self.get(key) {
            Some(Value::Short(v)) => Some(*v),
            _ => None,
        }
    }

    /// Int lookup that also accepts the narrower integral kinds
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.get(key) {
            Some(Value::Byte(v)) => Some(i32::from(*v)),
            Some(Value::Short(v)) => Some(i32::from(*v)),
            Some(Value::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_list(&self, key: &str) -> Option<&ValueList> {
        self.get(key).and_then(Value::as_list)
    }

    pub fn get_map(&self, key: &str) -> Option<&ValueMap> {
        self.get(key).and_then(Value::as_map)
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
    }
}

/// A top-level codec unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    List(ValueList),
    Map(ValueMap),
}

impl Container {
    pub fn depth(&self) -> usize {
        match self {
            Container::List(list) => list.depth(),
            Container::Map(map) => map.depth(),
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Container::Map(map) => Some(map),
            Container::List(_) => None,
        }
    }

    pub fn into_map(self) -> Option<ValueMap> {
        match self {
            Container::Map(map) => Some(map),
            Container::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&ValueList> {
        match self {
            Container::List(list) => Some(list),
            Container::Map(_) => None,
        }
    }
}

impl From<ValueList> for Container {
    fn from(list: ValueList) -> Self {
        Container::List(list)
    }
}

impl From<ValueMap> for Container {
    fn from(map: ValueMap) -> Self {
        Container::Map(map)
    }
}
