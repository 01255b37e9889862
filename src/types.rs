//! # Core Value Types
//!
//! Identifiers and property values shared by every layer of emberdb.
//!
//! ## Identifiers
//!
//! - [`ObjectId`]: the object an event stream belongs to
//! - [`Timestamp`]: signed event time, in caller-defined epoch units
//! - [`BlockId`]: opaque block handle issued by the block store
//! - [`SymbolId`]: compact id of an action or property name
//!
//! ## Property Values
//!
//! [`Value`] covers the four property data types events carry: strings,
//! integers, floats and booleans. Values are stored inline without boxing;
//! only strings own a heap allocation.

use std::fmt;
use std::ops::RangeInclusive;

pub type ObjectId = u64;
pub type Timestamp = i64;
pub type BlockId = u64;
pub type SymbolId = u32;

/// Inclusive timestamp window used to filter fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub const ALL: TimeRange = TimeRange {
        start: Timestamp::MIN,
        end: Timestamp::MAX,
    };

    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }

    pub fn intersects(&self, min: Timestamp, max: Timestamp) -> bool {
        min <= max && min <= self.end && self.start <= max
    }
}

impl From<RangeInclusive<Timestamp>> for TimeRange {
    fn from(range: RangeInclusive<Timestamp>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String = 1,
    Integer = 2,
    Float = 3,
    Boolean = 4,
}

impl DataType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DataType::String),
            2 => Some(DataType::Integer),
            3 => Some(DataType::Float),
            4 => Some(DataType::Boolean),
            _ => None,
        }
    }
}

/// Whether a property describes the object itself or a single action.
/// Object properties hold state that persists across events; action
/// properties only qualify the event that carries them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Object = 1,
    Action = 2,
}

impl PropertyKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(PropertyKind::Object),
            2 => Some(PropertyKind::Action),
            _ => None,
        }
    }
}

/// Declared kind and value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyType {
    pub kind: PropertyKind,
    pub data_type: DataType,
}

impl PropertyType {
    pub fn new(kind: PropertyKind, data_type: DataType) -> Self {
        Self { kind, data_type }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_intersection_is_inclusive() {
        let range = TimeRange::new(100, 200);

        assert!(range.intersects(200, 300));
        assert!(range.intersects(0, 100));
        assert!(!range.intersects(201, 300));
        assert!(!range.intersects(0, 99));
    }

    #[test]
    fn empty_block_sentinels_never_intersect() {
        assert!(!TimeRange::ALL.intersects(Timestamp::MAX, Timestamp::MIN));
    }

    #[test]
    fn data_type_tags_are_stable() {
        for dt in [
            DataType::String,
            DataType::Integer,
            DataType::Float,
            DataType::Boolean,
        ] {
            assert_eq!(DataType::from_tag(dt as u8), Some(dt));
        }
        assert_eq!(DataType::from_tag(0), None);
    }

    #[test]
    fn property_kind_tags_are_stable() {
        assert_eq!(PropertyKind::from_tag(PropertyKind::Object as u8), Some(PropertyKind::Object));
        assert_eq!(PropertyKind::from_tag(PropertyKind::Action as u8), Some(PropertyKind::Action));
        assert_eq!(PropertyKind::from_tag(0), None);
        assert_eq!(PropertyKind::from_tag(3), None);
    }
}
