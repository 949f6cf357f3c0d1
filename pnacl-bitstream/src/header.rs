//! The `PEXE` header that precedes every PNaCl bitstream.
//!
//! The header is a `"PEXE"` magic, a little-endian `u16` field count and a
//! little-endian `u16` byte count for the fields that follow. Each field is a
//! `u16` holding `(tag << 4) | type`, a `u16` data length, and the data itself,
//! padded out to a multiple of four bytes.

use std::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::Error;

/// The magic every PNaCl bitcode file starts with.
pub const PEXE_MAGIC: &[u8; 4] = b"PEXE";

/// The size of the fixed part of the header: the magic and the two counts.
const FIXED_HEADER_SIZE: usize = 8;

/// The PNaCl versions this crate can read.
pub const SUPPORTED_PNACL_VERSIONS: &[u32] = &[1, 2];

/// Known header field tags.
#[derive(Clone, Copy, Debug, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum HeaderTag {
    /// An invalid tag.
    Invalid = 0,
    /// The PNaCl bitcode version.
    PnaclVersion,
    /// Whether bitcode records are aligned.
    AlignBitcodeRecords,
}

/// Known header field types.
#[derive(Clone, Copy, Debug, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum HeaderFieldType {
    /// Raw bytes.
    Buffer = 0,
    /// A little-endian `u32`.
    UInt32,
}

/// A single header field.
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderField {
    /// The field's tag, as a raw value.
    pub tag: u16,
    /// The field's type, as a raw value.
    pub field_type: u16,
    /// The field's data, without padding.
    pub data: Vec<u8>,
}

impl HeaderField {
    /// Returns the field's value as a `u32`, if it's a well-formed `UInt32` field.
    pub fn as_u32(&self) -> Option<u32> {
        if HeaderFieldType::try_from(self.field_type).ok()? != HeaderFieldType::UInt32 {
            return None;
        }

        let bytes = <[u8; 4]>::try_from(self.data.as_slice()).ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

/// A parsed `PEXE` header, along with its exact bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct PexeHeader {
    /// The header's fields, in order.
    pub fields: Vec<HeaderField>,
    raw: Vec<u8>,
}

fn read_u16(bytes: &[u8], pos: usize) -> Result<u16, Error> {
    bytes
        .get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| Error::BadHeader(format!("truncated at byte {}", pos)))
}

impl PexeHeader {
    /// Parse a header from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < FIXED_HEADER_SIZE || &bytes[0..4] != PEXE_MAGIC {
            return Err(Error::BadHeader("missing PEXE magic".into()));
        }

        let num_fields = read_u16(bytes, 4)? as usize;
        let num_bytes = read_u16(bytes, 6)? as usize;
        let header_size = FIXED_HEADER_SIZE + num_bytes;
        if bytes.len() < header_size {
            return Err(Error::BadHeader(format!(
                "header claims {} bytes of fields, but input is only {} bytes",
                num_bytes,
                bytes.len()
            )));
        }

        let field_bytes = &bytes[FIXED_HEADER_SIZE..header_size];
        let mut fields = Vec::with_capacity(num_fields);
        let mut pos = 0;
        for _ in 0..num_fields {
            let id = read_u16(field_bytes, pos)?;
            let len = read_u16(field_bytes, pos + 2)? as usize;
            pos += 4;

            let data = field_bytes
                .get(pos..pos + len)
                .ok_or_else(|| Error::BadHeader("field data overruns header".into()))?;
            fields.push(HeaderField {
                tag: id >> 4,
                field_type: id & 0xf,
                data: data.to_vec(),
            });

            pos += (len + 3) & !3;
        }

        if pos != num_bytes {
            return Err(Error::BadHeader(format!(
                "fields take {} bytes, but header claims {}",
                pos, num_bytes
            )));
        }

        log::debug!("parsed PEXE header with {} fields", fields.len());

        Ok(Self {
            fields: fields,
            raw: bytes[..header_size].to_vec(),
        })
    }

    /// Create a header holding only the given PNaCl version.
    pub fn with_version(version: u32) -> Self {
        let field = HeaderField {
            tag: HeaderTag::PnaclVersion.into(),
            field_type: HeaderFieldType::UInt32.into(),
            data: version.to_le_bytes().to_vec(),
        };

        let mut raw = PEXE_MAGIC.to_vec();
        raw.extend_from_slice(&1u16.to_le_bytes());
        raw.extend_from_slice(&8u16.to_le_bytes());
        raw.extend_from_slice(&((field.tag << 4) | field.field_type).to_le_bytes());
        raw.extend_from_slice(&4u16.to_le_bytes());
        raw.extend_from_slice(&field.data);

        Self {
            fields: vec![field],
            raw: raw,
        }
    }

    /// Returns the header's size in bytes. The bitstream starts right after it.
    pub fn header_size(&self) -> usize {
        self.raw.len()
    }

    /// Returns the header exactly as it appeared in the input.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns the PNaCl version recorded in the header, if any.
    pub fn version(&self) -> Option<u32> {
        self.fields
            .iter()
            .find(|f| f.tag == u16::from(HeaderTag::PnaclVersion))
            .and_then(HeaderField::as_u32)
    }

    /// Returns whether a bitstream with this header can be read.
    pub fn is_readable(&self) -> bool {
        matches!(self.version(), Some(v) if SUPPORTED_PNACL_VERSIONS.contains(&v))
    }

    /// Returns whether this header is fully supported: readable, and carrying
    /// no fields other than the version.
    pub fn is_supported(&self) -> bool {
        self.is_readable() && self.fields.len() == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_version_round_trip() {
        let header = PexeHeader::with_version(2);
        assert_eq!(header.header_size(), 16);
        assert_eq!(&header.raw()[..8], b"PEXE\x01\x00\x08\x00");
        assert_eq!(&header.raw()[8..12], &[0x11, 0x00, 0x04, 0x00]);

        let parsed = PexeHeader::parse(header.raw()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), Some(2));
        assert!(parsed.is_supported());
    }

    #[test]
    fn test_unsupported_versions() {
        assert!(!PexeHeader::with_version(0).is_readable());
        assert!(!PexeHeader::with_version(3).is_supported());
        assert!(PexeHeader::with_version(1).is_supported());
    }

    #[test]
    fn test_extra_field_is_readable_but_unsupported() {
        #[rustfmt::skip]
        let bytes = [
            b'P', b'E', b'X', b'E', 0x02, 0x00, 0x10, 0x00,
            0x11, 0x00, 0x04, 0x00, 0x02, 0x00, 0x00, 0x00,
            0x20, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00,
        ];

        let header = PexeHeader::parse(&bytes).unwrap();
        assert_eq!(header.fields.len(), 2);
        assert_eq!(header.fields[1].tag, 2);
        assert_eq!(header.fields[1].data, vec![0x01]);
        assert!(header.is_readable());
        assert!(!header.is_supported());
    }

    #[test]
    fn test_malformed() {
        assert!(PexeHeader::parse(b"BC\xc0\xde").is_err());
        assert!(PexeHeader::parse(b"PEXE\x01\x00\x08\x00\x11\x00").is_err());
        assert!(PexeHeader::parse(b"PEXE\x01\x00\x04\x00\x11\x00\x08\x00").is_err());
    }
}
