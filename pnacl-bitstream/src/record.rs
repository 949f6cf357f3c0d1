//! Records and blocks, as surfaced by the stream parser.

use std::fmt;

/// Represents a single bitstream record.
///
/// Values that an abbreviation packs together (arrays, Char6 strings, blobs) are
/// flattened into `fields`, one value per element.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The abbreviation ID that was used to parse this record, or `None` if
    /// this record was parsed from an `UNABBREV_RECORD` encoding.
    pub abbrev_id: Option<u64>,

    /// The code that identifies the record's kind.
    pub code: u64,

    /// The fields of this record.
    pub fields: Vec<u64>,

    /// The number of bits this record took up in the stream, abbreviation ID included.
    pub bits: u64,
}

impl Record {
    /// Creates a new, unabbreviated `Record` from the given code and fields.
    pub fn from_unabbrev(code: u64, fields: Vec<u64>) -> Self {
        Self {
            abbrev_id: None,
            code: code,
            fields: fields,
            bits: 0,
        }
    }

    /// Creates a new `Record` from the given abbreviation ID and values.
    ///
    /// The first value is the record's code.
    pub fn from_abbrev(abbrev_id: u64, mut values: Vec<u64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let code = values.remove(0);
        Some(Self {
            abbrev_id: Some(abbrev_id),
            code: code,
            fields: values,
            bits: 0,
        })
    }

    /// Returns the record's code followed by its fields.
    pub fn values(&self) -> Vec<u64> {
        let mut values = Vec::with_capacity(self.fields.len() + 1);
        values.push(self.code);
        values.extend_from_slice(&self.fields);
        values
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.code)?;
        for field in self.fields.iter() {
            write!(f, ", {}", field)?;
        }
        write!(f, "]")
    }
}

/// Represents a single block scope in the bitstream.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// The ID of the block.
    pub block_id: u64,
    /// The length of the block, in bytes. Blocks are always 32-bit-word-aligned.
    pub len: u64,
}
