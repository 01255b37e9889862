//! # Variable-Length Integer Encoding
//!
//! Varints encode every length and id stored by emberdb: event record fields
//! inside block payloads and symbol entries in the metadata trailer.
//!
//! ## Encoding Format
//!
//! A leading marker byte says how many bytes follow:
//!
//! | Value Range              | Bytes | Format                           |
//! |--------------------------|-------|----------------------------------|
//! | 0 - 240                  | 1     | `[value]`                        |
//! | 241 - 2287               | 2     | `[241 + (v-240)>>8, (v-240)&FF]` |
//! | 2288 - 67823             | 3     | `[249, (v-2288)>>8, (v-2288)&FF]`|
//! | 67824 - 16777215         | 4     | `[250, v>>16, v>>8, v]`          |
//! | 16777216 - 4294967295    | 5     | `[251, v>>24, v>>16, v>>8, v]`   |
//! | 4294967296 - u64::MAX    | 9     | `[255, 8-byte big-endian]`       |
//!
//! Markers 252-254 are invalid.
//!
//! Signed values (event timestamps) are zigzag-mapped first so that small
//! negative numbers stay short.
//!
//! ## Readers and Writers
//!
//! `encode_varint`/`decode_varint` work on fixed slices. Serializers append
//! with [`put_varint`] and parse with [`ByteReader`], which tracks the
//! position and reports truncation as an error rather than panicking.

use eyre::{bail, ensure, Result};

pub const MAX_VARINT_LEN: usize = 9;

pub fn varint_len(value: u64) -> usize {
    if value <= 240 {
        1
    } else if value <= 2287 {
        2
    } else if value <= 67823 {
        3
    } else if value <= 0xFF_FFFF {
        4
    } else if value <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

pub fn encode_varint(value: u64, buf: &mut [u8]) -> usize {
    if value <= 240 {
        buf[0] = value as u8;
        1
    } else if value <= 2287 {
        let v = value - 240;
        buf[0] = ((v >> 8) + 241) as u8;
        buf[1] = (v & 0xFF) as u8;
        2
    } else if value <= 67823 {
        let v = value - 2288;
        buf[0] = 249;
        buf[1] = (v >> 8) as u8;
        buf[2] = (v & 0xFF) as u8;
        3
    } else if value <= 0xFF_FFFF {
        buf[0] = 250;
        buf[1] = (value >> 16) as u8;
        buf[2] = (value >> 8) as u8;
        buf[3] = value as u8;
        4
    } else if value <= 0xFFFF_FFFF {
        buf[0] = 251;
        buf[1..5].copy_from_slice(&(value as u32).to_be_bytes());
        5
    } else {
        buf[0] = 255;
        buf[1..9].copy_from_slice(&value.to_be_bytes());
        9
    }
}

pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize)> {
    ensure!(!buf.is_empty(), "empty buffer for varint decode");

    let first = buf[0];

    match first {
        0..=240 => Ok((first as u64, 1)),
        241..=248 => {
            ensure!(buf.len() >= 2, "truncated 2-byte varint");
            Ok((240 + ((first as u64 - 241) << 8) + buf[1] as u64, 2))
        }
        249 => {
            ensure!(buf.len() >= 3, "truncated 3-byte varint");
            Ok((2288 + ((buf[1] as u64) << 8) + buf[2] as u64, 3))
        }
        250 => {
            ensure!(buf.len() >= 4, "truncated 4-byte varint");
            let value = ((buf[1] as u64) << 16) | ((buf[2] as u64) << 8) | buf[3] as u64;
            Ok((value, 4))
        }
        251 => {
            ensure!(buf.len() >= 5, "truncated 5-byte varint");
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&buf[1..5]);
            Ok((u32::from_be_bytes(bytes) as u64, 5))
        }
        255 => {
            ensure!(buf.len() >= 9, "truncated 9-byte varint");
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[1..9]);
            Ok((u64::from_be_bytes(bytes), 9))
        }
        _ => bail!("invalid varint marker: {}", first),
    }
}

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn put_varint(buf: &mut Vec<u8>, value: u64) {
    let mut tmp = [0u8; MAX_VARINT_LEN];
    let len = encode_varint(value, &mut tmp);
    buf.extend_from_slice(&tmp[..len]);
}

pub fn put_signed_varint(buf: &mut Vec<u8>, value: i64) {
    put_varint(buf, zigzag_encode(value));
}

/// Forward-only parser over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = decode_varint(&self.buf[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    pub fn read_signed_varint(&mut self) -> Result<i64> {
        self.read_varint().map(zigzag_decode)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        ensure!(self.remaining() >= 1, "truncated byte at offset {}", self.pos);
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        ensure!(
            self.remaining() >= len,
            "truncated field: need {} bytes at offset {}, have {}",
            len,
            self.pos,
            self.remaining()
        );
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| eyre::eyre!("length {} overflows usize", len))?;
        self.read_bytes(len)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_len_matches_marker_bands() {
        assert_eq!(varint_len(240), 1);
        assert_eq!(varint_len(241), 2);
        assert_eq!(varint_len(2287), 2);
        assert_eq!(varint_len(2288), 3);
        assert_eq!(varint_len(67823), 3);
        assert_eq!(varint_len(67824), 4);
        assert_eq!(varint_len(0xFF_FFFF), 4);
        assert_eq!(varint_len(0x100_0000), 5);
        assert_eq!(varint_len(0xFFFF_FFFF), 5);
        assert_eq!(varint_len(0x1_0000_0000), 9);
    }

    #[test]
    fn encode_two_byte_layout() {
        let mut buf = [0u8; 9];

        assert_eq!(encode_varint(2287, &mut buf), 2);
        assert_eq!(&buf[..2], &[248, 255]);
    }

    #[test]
    fn decode_rejects_reserved_markers() {
        for marker in 252u8..=254 {
            assert!(decode_varint(&[marker, 0, 0, 0, 0]).is_err());
        }
    }

    #[test]
    fn decode_rejects_truncation() {
        assert!(decode_varint(&[]).is_err());
        assert!(decode_varint(&[241]).is_err());
        assert!(decode_varint(&[251, 0, 0, 0]).is_err());
        assert!(decode_varint(&[255, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn boundary_values_survive_put_and_read() {
        let values = [
            0u64,
            240,
            241,
            2287,
            2288,
            67823,
            67824,
            0xFF_FFFF,
            0x100_0000,
            0xFFFF_FFFF,
            0x1_0000_0000,
            u64::MAX,
        ];

        let mut buf = Vec::new();
        for &v in &values {
            put_varint(&mut buf, v);
        }

        let mut reader = ByteReader::new(&buf);
        for &v in &values {
            assert_eq!(reader.read_varint().unwrap(), v);
        }
        assert!(reader.is_empty());
    }

    #[test]
    fn zigzag_keeps_small_negatives_short() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MIN)), i64::MIN);
        assert_eq!(zigzag_decode(zigzag_encode(i64::MAX)), i64::MAX);

        let mut buf = Vec::new();
        put_signed_varint(&mut buf, -100);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn reader_reports_truncated_fields() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 10);
        buf.extend_from_slice(b"short");

        let mut reader = ByteReader::new(&buf);
        let err = reader.read_len_prefixed().unwrap_err();
        assert!(err.to_string().contains("truncated field"));
    }
}
