//! # Event Records
//!
//! This module defines [`Event`] and the record codec used inside block
//! payloads. The block store never looks inside a payload; the engine only
//! needs each record's object id, timestamp and byte span to keep blocks
//! ordered, to compute descriptor bounds and to pick split points.
//!
//! ## Record Layout
//!
//! ```text
//! +-------------+----------------+-------------+----------------+-------------+
//! | object_id   | timestamp      | action_id   | props_len      | props       |
//! | varint      | zigzag varint  | varint      | varint         | props_len B |
//! +-------------+----------------+-------------+----------------+-------------+
//! ```
//!
//! A payload is a plain concatenation of records, sorted by
//! `(object_id, timestamp)` with insertion order kept for ties.
//!
//! ## Property Layout
//!
//! ```text
//! count: varint
//! for each property:
//!   property_id: varint
//!   tag: u8            (1=string, 2=integer, 3=float, 4=boolean)
//!   value:
//!     string   varint length + UTF-8 bytes
//!     integer  zigzag varint
//!     float    8 bytes little-endian
//!     boolean  1 byte (0 or 1)
//! ```
//!
//! [`scan_records`] walks a payload without decoding property values, which
//! are only materialized by [`RecordSpan::decode`] when a fetch yields the
//! event.

use eyre::{bail, ensure, Result, WrapErr};

use crate::encoding::{put_signed_varint, put_varint, ByteReader};
use crate::types::{DataType, ObjectId, SymbolId, Timestamp, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub object_id: ObjectId,
    pub timestamp: Timestamp,
    pub action_id: SymbolId,
    pub properties: Vec<(SymbolId, Value)>,
}

impl Event {
    pub fn new(object_id: ObjectId, timestamp: Timestamp, action_id: SymbolId) -> Self {
        Self {
            object_id,
            timestamp,
            action_id,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property_id: SymbolId, value: impl Into<Value>) -> Self {
        self.properties.push((property_id, value.into()));
        self
    }

    pub fn property(&self, property_id: SymbolId) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(id, _)| *id == property_id)
            .map(|(_, v)| v)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut props = Vec::new();
        encode_properties(&self.properties, &mut props);

        let mut buf = Vec::with_capacity(props.len() + 24);
        put_varint(&mut buf, self.object_id);
        put_signed_varint(&mut buf, self.timestamp);
        put_varint(&mut buf, self.action_id as u64);
        put_varint(&mut buf, props.len() as u64);
        buf.extend_from_slice(&props);
        buf
    }
}

/// Position and sort key of one record inside a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub object_id: ObjectId,
    pub timestamp: Timestamp,
    pub start: usize,
    pub end: usize,
}

impl RecordSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn key(&self) -> (ObjectId, Timestamp) {
        (self.object_id, self.timestamp)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Event> {
        let mut reader = ByteReader::new(&payload[self.start..self.end]);
        let object_id = reader.read_varint()?;
        let timestamp = reader.read_signed_varint()?;
        let action_id = read_symbol_id(&mut reader)?;
        let props = reader.read_len_prefixed()?;

        Ok(Event {
            object_id,
            timestamp,
            action_id,
            properties: decode_properties(props)?,
        })
    }
}

pub fn scan_records(payload: &[u8]) -> Result<Vec<RecordSpan>> {
    let mut reader = ByteReader::new(payload);
    let mut spans = Vec::new();

    while !reader.is_empty() {
        let start = reader.position();
        let object_id = reader
            .read_varint()
            .wrap_err_with(|| format!("bad object id in record at offset {}", start))?;
        let timestamp = reader
            .read_signed_varint()
            .wrap_err_with(|| format!("bad timestamp in record at offset {}", start))?;
        read_symbol_id(&mut reader)?;
        reader
            .read_len_prefixed()
            .wrap_err_with(|| format!("bad property block in record at offset {}", start))?;

        spans.push(RecordSpan {
            object_id,
            timestamp,
            start,
            end: reader.position(),
        });
    }

    Ok(spans)
}

fn read_symbol_id(reader: &mut ByteReader<'_>) -> Result<SymbolId> {
    let raw = reader.read_varint()?;
    SymbolId::try_from(raw).map_err(|_| eyre::eyre!("symbol id {} out of range", raw))
}

pub fn encode_properties(properties: &[(SymbolId, Value)], buf: &mut Vec<u8>) {
    put_varint(buf, properties.len() as u64);

    for (id, value) in properties {
        put_varint(buf, *id as u64);
        buf.push(value.data_type() as u8);
        match value {
            Value::String(s) => {
                put_varint(buf, s.len() as u64);
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Integer(i) => put_signed_varint(buf, *i),
            Value::Float(x) => buf.extend_from_slice(&x.to_le_bytes()),
            Value::Boolean(b) => buf.push(*b as u8),
        }
    }
}

pub fn decode_properties(bytes: &[u8]) -> Result<Vec<(SymbolId, Value)>> {
    let mut reader = ByteReader::new(bytes);
    let count = reader.read_varint()? as usize;
    ensure!(
        count <= bytes.len(),
        "property count {} exceeds encoded size {}",
        count,
        bytes.len()
    );

    let mut properties = Vec::with_capacity(count);
    for _ in 0..count {
        let id = read_symbol_id(&mut reader)?;
        let tag = reader.read_u8()?;
        let value = match DataType::from_tag(tag) {
            Some(DataType::String) => {
                let raw = reader.read_len_prefixed()?;
                let s = std::str::from_utf8(raw).wrap_err("property string is not UTF-8")?;
                Value::String(s.to_string())
            }
            Some(DataType::Integer) => Value::Integer(reader.read_signed_varint()?),
            Some(DataType::Float) => Value::Float(f64::from_le_bytes(reader.read_array::<8>()?)),
            Some(DataType::Boolean) => match reader.read_u8()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => bail!("invalid boolean byte {}", other),
            },
            None => bail!("unknown property type tag {}", tag),
        };
        properties.push((id, value));
    }

    ensure!(
        reader.is_empty(),
        "{} trailing bytes after properties",
        reader.remaining()
    );

    Ok(properties)
}
