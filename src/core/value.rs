//! # Typed Values
//!
//! The closed set of value kinds the Bitswarm wire format can carry.
//!
//! Every [`Value`] maps to exactly one [`ValueKind`], and every kind to exactly one tag byte.
//! Conversions are exhaustive matches; there is no type erasure anywhere in the codec.

use crate::core::container::{ValueList, ValueMap, MAX_DEPTH, MAX_ELEMENTS};
use crate::error::ValueError;

/// Wire tag of each value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Null = 0x00,
    Bool = 0x01,
    Byte = 0x02,
    Short = 0x03,
    Int = 0x04,
    Long = 0x05,
    Float = 0x06,
    Double = 0x07,
    Utf8String = 0x08,
    BoolArray = 0x09,
    ByteArray = 0x0A,
    ShortArray = 0x0B,
    IntArray = 0x0C,
    LongArray = 0x0D,
    FloatArray = 0x0E,
    DoubleArray = 0x0F,
    Utf8StringArray = 0x10,
    List = 0x11,
    Map = 0x12,
}

impl ValueKind {
    /// Tag byte written before a value of this kind
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a tag byte read from the wire
    pub fn from_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            0x00 => ValueKind::Null,
            0x01 => ValueKind::Bool,
            0x02 => ValueKind::Byte,
            0x03 => ValueKind::Short,
            0x04 => ValueKind::Int,
            0x05 => ValueKind::Long,
            0x06 => ValueKind::Float,
            0x07 => ValueKind::Double,
            0x08 => ValueKind::Utf8String,
            0x09 => ValueKind::BoolArray,
            0x0A => ValueKind::ByteArray,
            0x0B => ValueKind::ShortArray,
            0x0C => ValueKind::IntArray,
            0x0D => ValueKind::LongArray,
            0x0E => ValueKind::FloatArray,
            0x0F => ValueKind::DoubleArray,
            0x10 => ValueKind::Utf8StringArray,
            0x11 => ValueKind::List,
            0x12 => ValueKind::Map,
            _ => return None,
        };
        Some(kind)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Byte => "byte",
            ValueKind::Short => "short",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Utf8String => "utf-string",
            ValueKind::BoolArray => "bool-array",
            ValueKind::ByteArray => "byte-array",
            ValueKind::ShortArray => "short-array",
            ValueKind::IntArray => "int-array",
            ValueKind::LongArray => "long-array",
            ValueKind::FloatArray => "float-array",
            ValueKind::DoubleArray => "double-array",
            ValueKind::Utf8StringArray => "utf-string-array",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        }
    }

    /// Whether this kind is a nested container
    pub fn is_container(self) -> bool {
        matches!(self, ValueKind::List | ValueKind::Map)
    }
}

/// A single wire-representable value.
///
/// Floats compare by bit pattern, so NaN equals itself and `0.0 != -0.0`. Equality then
/// matches wire identity: two values are equal exactly when they encode to the same bytes.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Utf8String(String),
    BoolArray(Vec<bool>),
    ByteArray(Vec<u8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    Utf8StringArray(Vec<String>),
    List(ValueList),
    Map(ValueMap),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Byte(_) => ValueKind::Byte,
            Value::Short(_) => ValueKind::Short,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Utf8String(_) => ValueKind::Utf8String,
            Value::BoolArray(_) => ValueKind::BoolArray,
            Value::ByteArray(_) => ValueKind::ByteArray,
            Value::ShortArray(_) => ValueKind::ShortArray,
            Value::IntArray(_) => ValueKind::IntArray,
            Value::LongArray(_) => ValueKind::LongArray,
            Value::FloatArray(_) => ValueKind::FloatArray,
            Value::DoubleArray(_) => ValueKind::DoubleArray,
            Value::Utf8StringArray(_) => ValueKind::Utf8StringArray,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    /// Container nesting depth of this value; primitives are 0.
    pub fn depth(&self) -> usize {
        match self {
            Value::List(list) => list.depth(),
            Value::Map(map) => map.depth(),
            _ => 0,
        }
    }

    /// Check that this value fits the wire limits.
    ///
    /// Nested containers are not re-walked: they could only be built through the
    /// checked container API, so they already satisfy the limits.
    pub fn validate(&self) -> Result<(), ValueError> {
        match self {
            Value::Utf8String(s) => check_string(s),
            Value::BoolArray(v) => check_count(v.len()),
            Value::ByteArray(v) => check_count(v.len()),
            Value::ShortArray(v) => check_count(v.len()),
            Value::IntArray(v) => check_count(v.len()),
            Value::LongArray(v) => check_count(v.len()),
            Value::FloatArray(v) => check_count(v.len()),
            Value::DoubleArray(v) => check_count(v.len()),
            Value::Utf8StringArray(v) => {
                check_count(v.len())?;
                v.iter().try_for_each(|s| check_string(s))
            }
            Value::List(_) | Value::Map(_) => {
                // one level is added by whatever container this value goes into
                let depth = self.depth() + 1;
                if depth > MAX_DEPTH {
                    Err(ValueError::DepthExceeded(depth))
                } else {
                    Ok(())
                }
            }
            Value::Null
            | Value::Bool(_)
            | Value::Byte(_)
            | Value::Short(_)
            | Value::Int(_)
            | Value::Long(_)
            | Value::Float(_)
            | Value::Double(_) => Ok(()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of any integral kind, widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ValueList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

#[inline]
fn check_string(s: &str) -> Result<(), ValueError> {
    if s.len() > MAX_ELEMENTS {
        Err(ValueError::StringTooLong(s.len()))
    } else {
        Ok(())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Utf8String(a), Value::Utf8String(b)) => a == b,
            (Value::BoolArray(a), Value::BoolArray(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::ShortArray(a), Value::ShortArray(b)) => a == b,
            (Value::IntArray(a), Value::IntArray(b)) => a == b,
            (Value::LongArray(a), Value::LongArray(b)) => a == b,
            (Value::FloatArray(a), Value::FloatArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Value::DoubleArray(a), Value::DoubleArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Value::Utf8StringArray(a), Value::Utf8StringArray(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

#[inline]
fn check_count(count: usize) -> Result<(), ValueError> {
    if count > MAX_ELEMENTS {
        Err(ValueError::TooManyElements(count))
    } else {
        Ok(())
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    u8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Utf8String,
    Vec<bool> => BoolArray,
    Vec<u8> => ByteArray,
    Vec<i16> => ShortArray,
    Vec<i32> => IntArray,
    Vec<i64> => LongArray,
    Vec<f32> => FloatArray,
    Vec<f64> => DoubleArray,
    Vec<String> => Utf8StringArray,
    ValueList => List,
    ValueMap => Map,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8String(v.to_owned())
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::Utf8StringArray(v.into_iter().map(str::to_owned).collect())
    }
}
