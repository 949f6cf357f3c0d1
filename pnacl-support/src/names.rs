//! Human-readable names for block IDs and record codes, as used in diagnostics.

use std::borrow::Cow;
use std::convert::TryFrom;

use crate::bitcodes::{PnaclBlockId, ReservedBlockId};

/// Returns the printable name of the given block ID.
pub fn block_name(block_id: u64) -> Cow<'static, str> {
    if let Ok(ReservedBlockId::BlockInfo) = ReservedBlockId::try_from(block_id) {
        return "BLOCKINFO_BLOCK".into();
    }

    let name = match PnaclBlockId::try_from(block_id) {
        Ok(PnaclBlockId::Module) => "MODULE_BLOCK",
        Ok(PnaclBlockId::ParamAttr) => "PARAMATTR_BLOCK",
        Ok(PnaclBlockId::ParamAttrGroup) => "PARAMATTR_GROUP_BLOCK_ID",
        Ok(PnaclBlockId::Constants) => "CONSTANTS_BLOCK",
        Ok(PnaclBlockId::Function) => "FUNCTION_BLOCK",
        Ok(PnaclBlockId::ValueSymtab) => "VALUE_SYMTAB",
        Ok(PnaclBlockId::Metadata) => "METADATA_BLOCK",
        Ok(PnaclBlockId::MetadataAttachment) => "METADATA_ATTACHMENT_BLOCK",
        Ok(PnaclBlockId::Type) => "TYPE_BLOCK_ID",
        Ok(PnaclBlockId::Uselist) => "USELIST_BLOCK_ID",
        Ok(PnaclBlockId::GlobalVar) => "GLOBALVAR_BLOCK",
        Err(_) => return format!("UnknownBlock{}", block_id).into(),
    };

    name.into()
}

fn module_code(code: u64) -> Option<&'static str> {
    Some(match code {
        1 => "VERSION",
        2 => "TRIPLE",
        3 => "DATALAYOUT",
        4 => "ASM",
        5 => "SECTIONNAME",
        6 => "DEPLIB",
        7 => "GLOBALVAR",
        8 => "FUNCTION",
        9 => "ALIAS",
        10 => "PURGEVALS",
        11 => "GCNAME",
        _ => return None,
    })
}

fn type_code(code: u64) -> Option<&'static str> {
    Some(match code {
        1 => "NUMENTRY",
        2 => "VOID",
        3 => "FLOAT",
        4 => "DOUBLE",
        5 => "LABEL",
        6 => "OPAQUE",
        7 => "INTEGER",
        8 => "POINTER",
        11 => "ARRAY",
        12 => "VECTOR",
        13 => "X86_FP80",
        14 => "FP128",
        15 => "PPC_FP128",
        16 => "METADATA",
        18 => "STRUCT_ANON",
        19 => "STRUCT_NAME",
        20 => "STRUCT_NAMED",
        21 => "FUNCTION",
        _ => return None,
    })
}

fn constants_code(code: u64) -> Option<&'static str> {
    Some(match code {
        1 => "SETTYPE",
        2 => "NULL",
        3 => "UNDEF",
        4 => "INTEGER",
        5 => "WIDE_INTEGER",
        6 => "FLOAT",
        7 => "AGGREGATE",
        8 => "STRING",
        9 => "CSTRING",
        10 => "CE_BINOP",
        11 => "CE_CAST",
        12 => "CE_GEP",
        13 => "CE_SELECT",
        14 => "CE_EXTRACTELT",
        15 => "CE_INSERTELT",
        16 => "CE_SHUFFLEVEC",
        17 => "CE_CMP",
        18 => "INLINEASM",
        19 => "CE_SHUFVEC_EX",
        20 => "CE_INBOUNDS_GEP",
        21 => "CST_CODE_BLOCKADDRESS",
        22 => "DATA",
        _ => return None,
    })
}

fn function_code(code: u64) -> Option<&'static str> {
    Some(match code {
        1 => "DECLAREBLOCKS",
        2 => "INST_BINOP",
        3 => "INST_CAST",
        4 => "INST_GEP",
        5 => "INST_SELECT",
        6 => "INST_EXTRACTELT",
        7 => "INST_INSERTELT",
        8 => "INST_SHUFFLEVEC",
        9 => "INST_CMP",
        10 => "INST_RET",
        11 => "INST_BR",
        12 => "INST_SWITCH",
        13 => "INST_INVOKE",
        15 => "INST_UNREACHABLE",
        16 => "INST_PHI",
        19 => "INST_ALLOCA",
        20 => "INST_LOAD",
        23 => "INST_VAARG",
        24 => "INST_STORE",
        26 => "INST_EXTRACTVAL",
        27 => "INST_INSERTVAL",
        28 => "INST_CMP2",
        29 => "INST_VSELECT",
        30 => "INST_INBOUNDS_GEP",
        33 => "DEBUG_LOC_AGAIN",
        34 => "INST_CALL",
        35 => "DEBUG_LOC",
        43 => "FORWARDTYPEREF",
        44 => "INST_CALL_INDIRECT",
        _ => return None,
    })
}

fn metadata_code(code: u64) -> Option<&'static str> {
    Some(match code {
        1 => "METADATA_STRING",
        3 => "METADATA_NODE",
        4 => "METADATA_NAME",
        5 => "METADATA_FN_NODE",
        6 => "METADATA_KIND",
        10 => "METADATA_NAMED_NODE",
        _ => return None,
    })
}

fn globalvar_code(code: u64) -> Option<&'static str> {
    Some(match code {
        0 => "VAR",
        1 => "COMPOUND",
        2 => "ZEROFILL",
        3 => "DATA",
        4 => "RELOC",
        5 => "COUNT",
        _ => return None,
    })
}

/// Returns the printable name of record `code` within block `block_id`.
pub fn code_name(block_id: u64, code: u64) -> Cow<'static, str> {
    let name = match ReservedBlockId::try_from(block_id) {
        Ok(ReservedBlockId::BlockInfo) => match code {
            1 => Some("SETBID"),
            _ => None,
        },
        Err(_) => match PnaclBlockId::try_from(block_id) {
            Ok(PnaclBlockId::Module) => module_code(code),
            Ok(PnaclBlockId::ParamAttr) => match code {
                1..=3 => Some("ENTRY"),
                _ => None,
            },
            Ok(PnaclBlockId::Type) => type_code(code),
            Ok(PnaclBlockId::Constants) => constants_code(code),
            Ok(PnaclBlockId::Function) => function_code(code),
            Ok(PnaclBlockId::ValueSymtab) => match code {
                1 => Some("ENTRY"),
                2 => Some("BBENTRY"),
                _ => None,
            },
            Ok(PnaclBlockId::Metadata) => metadata_code(code),
            Ok(PnaclBlockId::MetadataAttachment) => match code {
                11 => Some("METADATA_ATTACHMENT"),
                _ => None,
            },
            Ok(PnaclBlockId::GlobalVar) => globalvar_code(code),
            _ => None,
        },
    };

    match name {
        Some(name) => name.into(),
        None => format!("UnknownCode{}", code).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_name() {
        assert_eq!(block_name(0), "BLOCKINFO_BLOCK");
        assert_eq!(block_name(8), "MODULE_BLOCK");
        assert_eq!(block_name(12), "FUNCTION_BLOCK");
        assert_eq!(block_name(17), "TYPE_BLOCK_ID");
        assert_eq!(block_name(13), "UnknownBlock13");
        assert_eq!(block_name(1), "UnknownBlock1");
    }

    #[test]
    fn test_code_name() {
        assert_eq!(code_name(0, 1), "SETBID");
        assert_eq!(code_name(8, 1), "VERSION");
        assert_eq!(code_name(17, 1), "NUMENTRY");
        assert_eq!(code_name(12, 34), "INST_CALL");
        assert_eq!(code_name(19, 0), "VAR");
        assert_eq!(code_name(9, 2), "ENTRY");
        assert_eq!(code_name(12, 14), "UnknownCode14");
        assert_eq!(code_name(200, 3), "UnknownCode3");
    }
}
