//! # Encoding Module
//!
//! Byte-level encoding helpers shared by the block payload codec and the
//! metadata trailer:
//!
//! - **Varint encoding**: variable-length integers for ids, lengths and
//!   zigzag-mapped timestamps, plus a bounds-checked [`ByteReader`]

pub mod varint;

pub use varint::{
    decode_varint, encode_varint, put_signed_varint, put_varint, varint_len, zigzag_encode,
    ByteReader,
};
