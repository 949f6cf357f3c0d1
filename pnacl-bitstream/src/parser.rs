//! Core parsing functionality for `pnacl-bitstream`.

use std::convert::TryInto;

use hashbrown::HashMap;
use pnacl_bitcursor::BitCursor;
use pnacl_support::bitcodes::{BlockInfoCode, ReservedAbbrevId, ReservedBlockId};
use pnacl_support::{FIRST_APPLICATION_ABBREV_ID, INITIAL_ABBREV_ID_WIDTH};

use crate::abbrev::{Abbrev, AbbrevId};
use crate::error::Error;
use crate::record::{Block, Record};

/// The kinds of entries we can see while advancing through the bitstream.
///
/// The `BLOCKINFO` block is interpreted by the parser and never surfaced as a
/// `SubBlock`, but the abbreviations it defines are.
#[derive(Debug, PartialEq)]
pub enum StreamEntry {
    /// The end of a block scope.
    EndBlock,
    /// The beginning of a new block scope.
    SubBlock(Block),
    /// A record within the current scope.
    Record(Record),
    /// A newly defined abbreviation.
    Abbrev {
        /// The block ID the abbreviation applies to.
        block_id: u64,
        /// The abbreviation itself.
        abbrev: Abbrev,
        /// `true` for a `DEFINE_ABBREV` in the current block, `false` for one
        /// that `BLOCKINFO` defines for every block with `block_id`.
        is_local: bool,
    },
}

/// Represents the necessary parse state for a particular scope in the bitstream.
///
/// Every parser begins with an initial non-block scope, before the first block is entered.
#[derive(Debug)]
enum Scope {
    Initial,
    Block {
        abbrev_id_width: u64,
        block_id: u64,
        blockinfo_block_id: Option<u64>,
        abbrevs: Vec<Abbrev>,
    },
}

impl Default for Scope {
    fn default() -> Self {
        Self::Initial
    }
}

impl Scope {
    fn new(abbrev_id_width: u64, block_id: u64, abbrevs: Vec<Abbrev>) -> Self {
        Self::Block {
            abbrev_id_width: abbrev_id_width,
            block_id: block_id,
            blockinfo_block_id: None,
            abbrevs: abbrevs,
        }
    }

    fn abbrev_id_width(&self) -> u64 {
        match self {
            Scope::Initial => INITIAL_ABBREV_ID_WIDTH,
            Scope::Block {
                abbrev_id_width, ..
            } => *abbrev_id_width,
        }
    }

    fn block_id(&self) -> Option<u64> {
        match self {
            Scope::Initial => None,
            Scope::Block { block_id, .. } => Some(*block_id),
        }
    }

    fn push_abbrev(&mut self, abbrev: Abbrev) -> Result<(), Error> {
        match self {
            Scope::Initial => Err(Error::BadScope(
                "non-block scope cannot define abbreviations".into(),
            )),
            Scope::Block { abbrevs, .. } => {
                abbrevs.push(abbrev);
                Ok(())
            }
        }
    }

    fn get_abbrev(&self, abbrev_id: u64) -> Result<&Abbrev, Error> {
        match self {
            Scope::Initial => Err(Error::BadScope(
                "non-block scope cannot contain records".into(),
            )),
            Scope::Block { abbrevs, .. } => abbrev_id
                .checked_sub(FIRST_APPLICATION_ABBREV_ID)
                .and_then(|idx| abbrevs.get(idx as usize))
                .ok_or(Error::BadAbbrev(abbrev_id)),
        }
    }

    fn is_blockinfo(&self) -> bool {
        self.block_id() == Some(ReservedBlockId::BlockInfo.into())
    }

    fn blockinfo_block_id(&self) -> Option<u64> {
        match self {
            Scope::Initial => None,
            Scope::Block {
                blockinfo_block_id, ..
            } => *blockinfo_block_id,
        }
    }

    fn set_blockinfo_block_id(&mut self, new_bid: u64) -> Result<(), Error> {
        if let Scope::Block {
            blockinfo_block_id, ..
        } = self
        {
            *blockinfo_block_id = Some(new_bid);
            return Ok(());
        }

        Err(Error::BadScope(
            "can't set BLOCKINFO block ID for non-BLOCKINFO scope".into(),
        ))
    }
}

/// A parser for individual bitstream entries.
///
/// The parser expects a cursor that's already positioned at the start of the
/// bitstream proper, past the `PEXE` header. For a parser that handles the
/// header too, see [`Bitstream`](crate::Bitstream).
#[derive(Debug)]
pub struct StreamParser<T: AsRef<[u8]>> {
    cursor: BitCursor<T>,
    scopes: Vec<Scope>,
    blockinfo: HashMap<u64, Vec<Abbrev>>,
}

impl<T: AsRef<[u8]>> StreamParser<T> {
    /// Create a new `StreamParser` from the given `BitCursor`.
    pub fn new(cur: BitCursor<T>) -> Self {
        Self {
            cursor: cur,
            scopes: vec![Scope::default()],
            blockinfo: Default::default(),
        }
    }

    /// Returns the nesting depth of the current scope. Zero means "outside of any block".
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    fn scope(&self) -> &Scope {
        // Unwrap safety: `scopes` always holds the initial scope, which is never popped.
        #[allow(clippy::unwrap_used)]
        self.scopes.last().unwrap()
    }

    fn scope_mut(&mut self) -> &mut Scope {
        // Unwrap safety: `scopes` always holds the initial scope, which is never popped.
        #[allow(clippy::unwrap_used)]
        self.scopes.last_mut().unwrap()
    }

    fn enter_block(&mut self) -> Result<Option<StreamEntry>, Error> {
        let block_id = self.cursor.read_vbr(8)?;
        let new_width = self.cursor.read_vbr(4)?;

        self.cursor.align32();

        if new_width < 1 || new_width > 32 {
            return Err(Error::BadScope(format!(
                "can't enter block {}: invalid abbreviation ID width: {}",
                block_id, new_width
            )));
        }

        // The block length is a count of 32-bit words.
        let block_len = self.cursor.read(32)? * 4;
        log::debug!(
            "entered block: ID={}, new abbrev width={}, block_len={} @ bit position {}",
            block_id,
            new_width,
            block_len,
            self.cursor.tell_bit()
        );

        let abbrevs = self.blockinfo.get(&block_id).cloned().unwrap_or_default();
        self.scopes.push(Scope::new(new_width, block_id, abbrevs));

        if self.scope().is_blockinfo() {
            return Ok(None);
        }

        Ok(Some(StreamEntry::SubBlock(Block {
            block_id: block_id,
            len: block_len,
        })))
    }

    fn exit_block(&mut self) -> Result<Option<StreamEntry>, Error> {
        self.cursor.align32();

        // The initial scope isn't a block, so it can't be exited.
        if self.scopes.len() <= 1 {
            return Err(Error::BadScope(
                "malformed stream: END_BLOCK outside of any block".into(),
            ));
        }

        // Unwrap safety: we checked for more than one scope above.
        #[allow(clippy::unwrap_used)]
        let scope = self.scopes.pop().unwrap();

        if scope.is_blockinfo() {
            return Ok(None);
        }

        Ok(Some(StreamEntry::EndBlock))
    }

    fn define_abbrev(&mut self) -> Result<StreamEntry, Error> {
        let abbrev = Abbrev::read(&mut self.cursor)?;
        log::debug!("new abbrev: {}", abbrev);

        // In BLOCKINFO, an abbreviation belongs to the block ID chosen by the last
        // SETBID. Anywhere else, it belongs to the current block only.
        if self.scope().is_blockinfo() {
            let block_id = self.scope().blockinfo_block_id().ok_or_else(|| {
                Error::StreamParse("DEFINE_ABBREV in BLOCKINFO but no preceding SETBID".into())
            })?;
            self.blockinfo
                .entry(block_id)
                .or_insert_with(Vec::new)
                .push(abbrev.clone());

            Ok(StreamEntry::Abbrev {
                block_id: block_id,
                abbrev: abbrev,
                is_local: false,
            })
        } else {
            let block_id = self.scope().block_id().ok_or_else(|| {
                Error::StreamParse("DEFINE_ABBREV outside of any block scope".into())
            })?;
            self.scope_mut().push_abbrev(abbrev.clone())?;

            Ok(StreamEntry::Abbrev {
                block_id: block_id,
                abbrev: abbrev,
                is_local: true,
            })
        }
    }

    fn parse_unabbrev(&mut self, start_bit: usize) -> Result<Option<StreamEntry>, Error> {
        if matches!(self.scope(), Scope::Initial) {
            return Err(Error::StreamParse(
                "UNABBREV_RECORD outside of any block scope".into(),
            ));
        }

        // [code:VBR6, numops:VBR6, op0:VBR6, op1:VBR6, ...]
        let code = self.cursor.read_vbr(6)?;
        let num_opnds = self.cursor.read_vbr(6)?;

        log::debug!("unabbrev record code={}, num_opnds={}", code, num_opnds);

        let mut fields = Vec::with_capacity(num_opnds as usize);
        for _ in 0..num_opnds {
            fields.push(self.cursor.read_vbr(6)?);
        }

        if self.scope().is_blockinfo() {
            let code: BlockInfoCode = code.try_into()?;
            match code {
                BlockInfoCode::SetBid => {
                    let block_id = *fields.first().ok_or_else(|| {
                        Error::StreamParse("SETBID record without a block ID".into())
                    })?;
                    log::debug!("SETBID: BLOCKINFO block ID is now {}", block_id);
                    self.scope_mut().set_blockinfo_block_id(block_id)?;
                }
                BlockInfoCode::BlockName => log::debug!("skipping BLOCKNAME code in BLOCKINFO"),
                BlockInfoCode::SetRecordName => {
                    log::debug!("skipping SETRECORDNAME code in BLOCKINFO")
                }
                other => log::debug!("skipping {:?} code in BLOCKINFO", other),
            };
            return Ok(None);
        }

        let mut record = Record::from_unabbrev(code, fields);
        record.bits = (self.cursor.tell_bit() - start_bit) as u64;
        Ok(Some(StreamEntry::Record(record)))
    }

    fn parse_with_abbrev(
        &mut self,
        abbrev_id: u64,
        start_bit: usize,
    ) -> Result<Option<StreamEntry>, Error> {
        let values = {
            let scope = &self.scopes[self.scopes.len() - 1];
            scope.get_abbrev(abbrev_id)?.read_values(&mut self.cursor)?
        };
        log::debug!("parsed values: {:?}", values);

        if self.scope().is_blockinfo() {
            return Ok(None);
        }

        let mut record = Record::from_abbrev(abbrev_id, values).ok_or_else(|| {
            Error::StreamParse(format!("abbreviated record {} has no code", abbrev_id))
        })?;
        record.bits = (self.cursor.tell_bit() - start_bit) as u64;

        Ok(Some(StreamEntry::Record(record)))
    }

    /// Return the next [`StreamEntry`](StreamEntry) in this bitstream.
    ///
    /// Returns an error on any parsing error, *or* the special
    /// [`Error::Exhausted`](Error::Exhausted) if the bitstream has
    /// been fully consumed.
    pub fn advance(&mut self) -> Result<StreamEntry, Error> {
        loop {
            if self.cursor.exhausted() {
                if self.depth() > 0 {
                    return Err(Error::BadScope(format!(
                        "stream ended inside {} open block(s)",
                        self.depth()
                    )));
                }
                return Err(Error::Exhausted);
            }

            let start_bit = self.cursor.tell_bit();
            let id: AbbrevId = self
                .cursor
                .read(self.scope().abbrev_id_width() as usize)?
                .into();
            log::debug!("next entry ID: {:?} @ bit position {}", id, start_bit);

            // Parse details (BLOCKINFO and its records) produce no entry; keep going.
            let entry = match id {
                AbbrevId::Reserved(ReservedAbbrevId::EndBlock) => self.exit_block()?,
                AbbrevId::Reserved(ReservedAbbrevId::EnterSubBlock) => self.enter_block()?,
                AbbrevId::Reserved(ReservedAbbrevId::DefineAbbrev) => Some(self.define_abbrev()?),
                AbbrevId::Reserved(ReservedAbbrevId::UnabbrevRecord) => {
                    self.parse_unabbrev(start_bit)?
                }
                AbbrevId::Defined(abbrev_id) => self.parse_with_abbrev(abbrev_id, start_bit)?,
            };

            if let Some(entry) = entry {
                return Ok(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pnacl_bitcursor::BitWriter;

    use super::*;
    use crate::abbrev::AbbrevOp;

    fn parse_all(bytes: &[u8]) -> Result<Vec<StreamEntry>, Error> {
        let mut parser = StreamParser::new(BitCursor::new(bytes));
        let mut entries = vec![];
        loop {
            match parser.advance() {
                Ok(entry) => entries.push(entry),
                Err(Error::Exhausted) => return Ok(entries),
                Err(e) => return Err(e),
            }
        }
    }

    // Hand-assembled: ENTER_SUBBLOCK(8, width 3), an unabbreviated [1, 2] and END_BLOCK.
    fn tiny_module() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.emit(1, 2).unwrap();
        w.emit_vbr(8, 8).unwrap();
        w.emit_vbr(3, 4).unwrap();
        w.align32();
        w.emit(1, 32).unwrap();

        w.emit(3, 3).unwrap();
        w.emit_vbr(1, 6).unwrap();
        w.emit_vbr(1, 6).unwrap();
        w.emit_vbr(2, 6).unwrap();

        w.emit(0, 3).unwrap();
        w.align32();
        w.into_inner()
    }

    #[test]
    fn test_tiny_module() {
        let entries = parse_all(&tiny_module()).unwrap();

        assert_eq!(
            entries,
            vec![
                StreamEntry::SubBlock(Block {
                    block_id: 8,
                    len: 4,
                }),
                StreamEntry::Record(Record {
                    abbrev_id: None,
                    code: 1,
                    fields: vec![2],
                    bits: 21,
                }),
                StreamEntry::EndBlock,
            ]
        );
    }

    #[test]
    fn test_blockinfo_and_local_abbrevs() {
        let global = Abbrev::new(vec![AbbrevOp::Literal(7), AbbrevOp::Fixed(4)]);
        let local = Abbrev::new(vec![AbbrevOp::Array, AbbrevOp::Char6]);

        let mut w = BitWriter::new();

        // BLOCKINFO, width 2: SETBID 12, DEFINE_ABBREV, END_BLOCK.
        w.emit(1, 2).unwrap();
        w.emit_vbr(0, 8).unwrap();
        w.emit_vbr(2, 4).unwrap();
        w.align32();
        w.emit(0, 32).unwrap();
        w.emit(3, 2).unwrap();
        w.emit_vbr(1, 6).unwrap();
        w.emit_vbr(1, 6).unwrap();
        w.emit_vbr(12, 6).unwrap();
        w.emit(2, 2).unwrap();
        global.write(&mut w).unwrap();
        w.emit(0, 2).unwrap();
        w.align32();

        // Block 12, width 3: a local DEFINE_ABBREV, then records through ids 4 and 5.
        w.emit(1, 2).unwrap();
        w.emit_vbr(12, 8).unwrap();
        w.emit_vbr(3, 4).unwrap();
        w.align32();
        w.emit(0, 32).unwrap();
        w.emit(2, 3).unwrap();
        local.write(&mut w).unwrap();
        w.emit(4, 3).unwrap();
        global.write_values(&mut w, &[7, 9]).unwrap();
        w.emit(5, 3).unwrap();
        local
            .write_values(&mut w, &[b'h' as u64, b'i' as u64])
            .unwrap();
        w.emit(0, 3).unwrap();
        w.align32();

        let entries = parse_all(&w.into_inner()).unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(
            entries[0],
            StreamEntry::Abbrev {
                block_id: 12,
                abbrev: global.clone(),
                is_local: false,
            }
        );
        assert!(matches!(entries[1], StreamEntry::SubBlock(Block { block_id: 12, .. })));
        assert_eq!(
            entries[2],
            StreamEntry::Abbrev {
                block_id: 12,
                abbrev: local,
                is_local: true,
            }
        );

        match &entries[3] {
            StreamEntry::Record(record) => {
                assert_eq!(record.abbrev_id, Some(4));
                assert_eq!(record.code, 7);
                assert_eq!(record.fields, vec![9]);
                assert_eq!(record.bits, 3 + 4);
            }
            e => panic!("unexpected entry: {:?}", e),
        }

        match &entries[4] {
            StreamEntry::Record(record) => {
                assert_eq!(record.abbrev_id, Some(5));
                assert_eq!(record.code, b'h' as u64);
                assert_eq!(record.fields, vec![b'i' as u64]);
            }
            e => panic!("unexpected entry: {:?}", e),
        }

        assert_eq!(entries[5], StreamEntry::EndBlock);
    }

    #[test]
    fn test_unknown_abbrev() {
        let mut w = BitWriter::new();
        w.emit(1, 2).unwrap();
        w.emit_vbr(8, 8).unwrap();
        w.emit_vbr(3, 4).unwrap();
        w.align32();
        w.emit(1, 32).unwrap();
        w.emit(6, 3).unwrap();
        w.align32();

        assert!(matches!(
            parse_all(&w.into_inner()),
            Err(Error::BadAbbrev(6))
        ));
    }

    #[test]
    fn test_unbalanced_blocks() {
        let mut bytes = tiny_module();
        bytes.truncate(bytes.len() - 4);
        assert!(parse_all(&bytes).is_err());

        let mut w = BitWriter::new();
        w.emit(0, 2).unwrap();
        w.align32();
        assert!(matches!(
            parse_all(&w.into_inner()),
            Err(Error::BadScope(_))
        ));
    }
}
