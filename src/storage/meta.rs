//! # Metadata Trailer
//!
//! Serialization of the symbol tables and the block info index into the
//! metadata trailer that follows the slot region of a storage file.
//!
//! ## Trailer Format
//!
//! ```text
//! action_count: varint
//! for each action:
//!   id: varint
//!   name: varint length + UTF-8 bytes
//! property_count: varint
//! for each property:
//!   id: varint
//!   name: varint length + UTF-8 bytes
//!   kind: u8 (0 untyped, 1 object, 2 action)
//!   data_type: u8 (only when kind != 0)
//! block_count: varint
//! for each block: IndexRecord (41 bytes)
//! ```
//!
//! ### Index Record Format
//!
//! ```text
//! Offset  Size  Description
//! 0       8     Block id (u64 little-endian)
//! 8       8     Min object id (u64 little-endian)
//! 16      8     Max object id (u64 little-endian)
//! 24      8     Min timestamp (i64 little-endian)
//! 32      8     Max timestamp (i64 little-endian)
//! 40      1     Spanned (0 or 1)
//! ```
//!
//! Index records are stored in index order. The trailer's length and CRC-64
//! live in the file header; any decoding failure here is reported as
//! `CorruptIndex`.

use eyre::Result;
use zerocopy::little_endian::{I64, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::INDEX_RECORD_SIZE;
use crate::encoding::{put_varint, ByteReader};
use crate::error::StorageError;
use crate::index::BlockInfo;
use crate::types::{DataType, PropertyKind, PropertyType, SymbolId};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexRecord {
    block_id: U64,
    min_object_id: U64,
    max_object_id: U64,
    min_timestamp: I64,
    max_timestamp: I64,
    spanned: u8,
}

const _: () = assert!(std::mem::size_of::<IndexRecord>() == INDEX_RECORD_SIZE);

impl From<&BlockInfo> for IndexRecord {
    fn from(info: &BlockInfo) -> Self {
        Self {
            block_id: U64::new(info.id),
            min_object_id: U64::new(info.min_object_id),
            max_object_id: U64::new(info.max_object_id),
            min_timestamp: I64::new(info.min_timestamp),
            max_timestamp: I64::new(info.max_timestamp),
            spanned: info.spanned as u8,
        }
    }
}

impl IndexRecord {
    pub fn to_block_info(&self) -> Result<BlockInfo> {
        let spanned = match self.spanned {
            0 => false,
            1 => true,
            other => eyre::bail!(StorageError::corrupt_index(format!(
                "block {} has spanned byte {}",
                self.block_id.get(),
                other
            ))),
        };

        Ok(BlockInfo {
            id: self.block_id.get(),
            min_object_id: self.min_object_id.get(),
            max_object_id: self.max_object_id.get(),
            min_timestamp: self.min_timestamp.get(),
            max_timestamp: self.max_timestamp.get(),
            spanned,
        })
    }
}

/// Decoded trailer contents. Symbol entries are in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub actions: Vec<(SymbolId, String)>,
    pub properties: Vec<(SymbolId, String, Option<PropertyType>)>,
    pub blocks: Vec<BlockInfo>,
}

pub struct MetaCodec;

impl MetaCodec {
    pub fn encode<'a>(
        actions: impl ExactSizeIterator<Item = (SymbolId, &'a str)>,
        properties: impl ExactSizeIterator<Item = (SymbolId, &'a str, Option<PropertyType>)>,
        blocks: &[BlockInfo],
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(blocks.len() * INDEX_RECORD_SIZE + 64);

        Self::encode_symbols(actions, &mut buf);
        put_varint(&mut buf, properties.len() as u64);
        for (id, name, property_type) in properties {
            Self::encode_symbol(id, name, &mut buf);
            match property_type {
                Some(t) => {
                    buf.push(t.kind as u8);
                    buf.push(t.data_type as u8);
                }
                None => buf.push(0),
            }
        }

        put_varint(&mut buf, blocks.len() as u64);
        for info in blocks {
            buf.extend_from_slice(IndexRecord::from(info).as_bytes());
        }

        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Metadata> {
        if bytes.is_empty() {
            return Ok(Metadata::default());
        }

        Self::decode_inner(bytes).map_err(|e| match StorageError::of(&e) {
            Some(_) => e,
            None => eyre::Report::new(StorageError::corrupt_index(format!(
                "malformed metadata trailer: {}",
                e
            ))),
        })
    }

    fn decode_inner(bytes: &[u8]) -> Result<Metadata> {
        let mut reader = ByteReader::new(bytes);

        let actions = Self::decode_symbols(&mut reader, "action")?;
        let property_count = reader.read_varint()? as usize;
        let mut properties = Vec::with_capacity(property_count.min(reader.remaining()));
        for _ in 0..property_count {
            let (id, name) = Self::decode_symbol(&mut reader, "property")?;
            let property_type = match reader.read_u8()? {
                0 => None,
                tag => {
                    let kind = PropertyKind::from_tag(tag)
                        .ok_or_else(|| eyre::eyre!("property {} has unknown kind {}", id, tag))?;
                    let raw = reader.read_u8()?;
                    let data_type = DataType::from_tag(raw)
                        .ok_or_else(|| eyre::eyre!("property {} has unknown data type {}", id, raw))?;
                    Some(PropertyType::new(kind, data_type))
                }
            };
            properties.push((id, name, property_type));
        }

        let block_count = reader.read_varint()? as usize;
        eyre::ensure!(
            block_count.saturating_mul(INDEX_RECORD_SIZE) <= reader.remaining(),
            "index declares {} blocks but only {} bytes remain",
            block_count,
            reader.remaining()
        );

        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let raw = reader.read_bytes(INDEX_RECORD_SIZE)?;
            let record = IndexRecord::read_from_bytes(raw)
                .map_err(|e| eyre::eyre!("failed to parse IndexRecord: {:?}", e))?;
            blocks.push(record.to_block_info()?);
        }

        eyre::ensure!(
            reader.is_empty(),
            "{} trailing bytes after index segment",
            reader.remaining()
        );

        Ok(Metadata {
            actions,
            properties,
            blocks,
        })
    }

    fn encode_symbols<'a>(
        entries: impl ExactSizeIterator<Item = (SymbolId, &'a str)>,
        buf: &mut Vec<u8>,
    ) {
        put_varint(buf, entries.len() as u64);
        for (id, name) in entries {
            Self::encode_symbol(id, name, buf);
        }
    }

    fn encode_symbol(id: SymbolId, name: &str, buf: &mut Vec<u8>) {
        put_varint(buf, id as u64);
        put_varint(buf, name.len() as u64);
        buf.extend_from_slice(name.as_bytes());
    }

    fn decode_symbols(reader: &mut ByteReader<'_>, kind: &str) -> Result<Vec<(SymbolId, String)>> {
        let count = reader.read_varint()? as usize;
        let mut entries = Vec::with_capacity(count.min(reader.remaining()));

        for _ in 0..count {
            entries.push(Self::decode_symbol(reader, kind)?);
        }

        Ok(entries)
    }

    fn decode_symbol(reader: &mut ByteReader<'_>, kind: &str) -> Result<(SymbolId, String)> {
        let raw_id = reader.read_varint()?;
        let id = SymbolId::try_from(raw_id)
            .map_err(|_| eyre::eyre!("{} id {} out of range", kind, raw_id))?;
        let name = std::str::from_utf8(reader.read_len_prefixed()?)
            .map_err(|_| eyre::eyre!("{} {} has a non UTF-8 name", kind, id))?;
        Ok((id, name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: u64, min: u64, max: u64, spanned: bool) -> BlockInfo {
        BlockInfo {
            id,
            min_object_id: min,
            max_object_id: max,
            min_timestamp: -5,
            max_timestamp: 900,
            spanned,
        }
    }

    fn ip_type() -> Option<PropertyType> {
        Some(PropertyType::new(PropertyKind::Action, DataType::String))
    }

    fn sample() -> Vec<u8> {
        let actions = [(1, "login"), (2, "logout")];
        let properties = [(1, "ip", ip_type()), (2, "note", None)];
        let blocks = [info(3, 1, 5, true), info(7, 5, 9, false)];

        MetaCodec::encode(actions.iter().copied(), properties.iter().copied(), &blocks)
    }

    #[test]
    fn decode_restores_symbols_and_index_order() {
        let meta = MetaCodec::decode(&sample()).unwrap();

        assert_eq!(
            meta.actions,
            vec![(1, "login".to_string()), (2, "logout".to_string())]
        );
        assert_eq!(
            meta.properties,
            vec![(1, "ip".to_string(), ip_type()), (2, "note".to_string(), None)]
        );
        assert_eq!(meta.blocks, vec![info(3, 1, 5, true), info(7, 5, 9, false)]);
    }

    #[test]
    fn empty_trailer_is_empty_metadata() {
        assert_eq!(MetaCodec::decode(&[]).unwrap(), Metadata::default());
    }

    #[test]
    fn truncated_trailer_is_corrupt_index() {
        let bytes = sample();

        let err = MetaCodec::decode(&bytes[..bytes.len() - 3]).unwrap_err();

        assert!(matches!(
            StorageError::of(&err),
            Some(StorageError::CorruptIndex(_))
        ));
    }

    #[test]
    fn bad_spanned_byte_is_rejected() {
        let mut bytes = sample();
        let last = bytes.len() - 1;
        bytes[last] = 9;

        let err = MetaCodec::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("spanned byte"));
    }

    #[test]
    fn unknown_property_kind_is_corrupt_index() {
        let actions: [(SymbolId, &str); 0] = [];
        let mut bytes = MetaCodec::encode(actions.iter().copied(), [(1, "ip", ip_type())].into_iter(), &[]);
        // count, id, name length, "ip", kind, data type, block count
        assert_eq!(bytes[6], PropertyKind::Action as u8);
        bytes[6] = 9;

        let err = MetaCodec::decode(&bytes).unwrap_err();
        assert!(matches!(
            StorageError::of(&err),
            Some(StorageError::CorruptIndex(_))
        ));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut bytes = sample();
        bytes.push(0);

        assert!(MetaCodec::decode(&bytes).is_err());
    }
}
