//! Enum constants for the reserved and PNaCl-defined parts of a bitstream.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::FIRST_APPLICATION_BLOCK_ID;

/// Block IDs that are reserved by the bitstream format.
// NOTE: IDs 1 through 7 are reserved too, but nothing assigns them a meaning.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
pub enum ReservedBlockId {
    /// The `BLOCKINFO` block ID.
    BlockInfo = 0,
}

/// Block IDs used by PNaCl bitcode.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
pub enum PnaclBlockId {
    /// `MODULE_BLOCK_ID`
    Module = FIRST_APPLICATION_BLOCK_ID,
    /// `PARAMATTR_BLOCK_ID`
    ParamAttr,
    /// `PARAMATTR_GROUP_BLOCK_ID`
    ParamAttrGroup,
    /// `CONSTANTS_BLOCK_ID`
    Constants,
    /// `FUNCTION_BLOCK_ID`
    Function,
    /// `VALUE_SYMTAB_BLOCK_ID`
    ValueSymtab = 14,
    /// `METADATA_BLOCK_ID`
    Metadata,
    /// `METADATA_ATTACHMENT_ID`
    MetadataAttachment,
    /// `TYPE_BLOCK_ID_NEW`
    Type,
    /// `USELIST_BLOCK_ID`
    Uselist,
    /// `GLOBALVAR_BLOCK_ID`
    GlobalVar,
}

/// Abbreviation IDs that are reserved by the bitstream format.
#[derive(Clone, Copy, Debug, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
pub enum ReservedAbbrevId {
    /// Identifies an `END_BLOCK` record.
    EndBlock = 0,
    /// Identifies an `ENTER_SUBBLOCK` record.
    EnterSubBlock,
    /// Identifies a `DEFINE_ABBREV` record.
    DefineAbbrev,
    /// Identifies an `UNABBREV_RECORD` record.
    UnabbrevRecord,
}

/// Codes for each operand encoding supported by `DEFINE_ABBREV`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
pub enum AbbrevOpEnc {
    /// A fixed-width, unsigned operand.
    Fixed = 1,
    /// A variable-width, unsigned operand.
    Vbr,
    /// An array of values.
    Array,
    /// A single 6-bit-encoded character.
    Char6,
    /// A blob of bytes.
    Blob,
}

/// Codes for each `UNABBREV_RECORD` in `BLOCKINFO`.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u64)]
pub enum BlockInfoCode {
    /// SETBID: `[blockid]`
    SetBid = 1,
    /// BLOCKNAME: `[...name...]`
    BlockName,
    /// SETRECORDNAME: `[recordid, ...name...]`
    SetRecordName,
}
