//! Emitting bitstreams: blocks, abbreviation definitions, `BLOCKINFO`, and records.

use hashbrown::HashMap;

use pnacl_bitcursor::BitWriter;
use pnacl_support::bitcodes::{BlockInfoCode, ReservedAbbrevId, ReservedBlockId};
use pnacl_support::{abbrev_id_width, FIRST_APPLICATION_ABBREV_ID, INITIAL_ABBREV_ID_WIDTH};

use crate::abbrev::Abbrev;
use crate::error::Error;
use crate::header::PexeHeader;

#[derive(Debug)]
struct WriteScope {
    block_id: u64,
    abbrev_id_width: u64,
    /// Byte offset of the block's length word, patched at `exit_block`.
    len_pos: usize,
    abbrevs: Vec<Abbrev>,
}

/// Writes a bitstream, tracking the same scoping rules the parser applies.
///
/// Abbreviation IDs are resolved against the abbreviations visible in the current
/// block: first those that `BLOCKINFO` defined for its block ID, then those defined
/// locally, starting at ID 4.
#[derive(Debug, Default)]
pub struct StreamWriter {
    writer: BitWriter,
    scopes: Vec<WriteScope>,
    blockinfo: HashMap<u64, Vec<Abbrev>>,
}

impl StreamWriter {
    /// Create a new, empty `StreamWriter`.
    pub fn new() -> Self {
        Self::default()
    }

    fn abbrev_id_width(&self) -> u64 {
        self.scopes
            .last()
            .map_or(INITIAL_ABBREV_ID_WIDTH, |s| s.abbrev_id_width)
    }

    fn emit_abbrev_id(&mut self, id: u64) -> Result<(), Error> {
        let width = self.abbrev_id_width() as usize;
        self.writer.emit(id, width)?;
        Ok(())
    }

    /// Emit a header verbatim. Must be called before anything else is written.
    pub fn write_header(&mut self, header: &PexeHeader) -> Result<(), Error> {
        if self.writer.tell_bit() != 0 {
            return Err(Error::BadHeader("header must come first".into()));
        }

        self.writer.emit_words(header.raw())?;
        Ok(())
    }

    /// Enter a new block whose abbreviation IDs are `abbrev_id_width` bits wide.
    pub fn enter_block(&mut self, block_id: u64, abbrev_id_width: u64) -> Result<(), Error> {
        self.emit_abbrev_id(ReservedAbbrevId::EnterSubBlock.into())?;
        self.writer.emit_vbr(block_id, 8)?;
        self.writer.emit_vbr(abbrev_id_width, 4)?;
        self.writer.align32();

        let len_pos = self.writer.tell_byte();
        self.writer.emit(0, 32)?;

        log::debug!(
            "enter_block: ID={}, abbrev width={}, length word @ byte {}",
            block_id,
            abbrev_id_width,
            len_pos
        );

        self.scopes.push(WriteScope {
            block_id: block_id,
            abbrev_id_width: abbrev_id_width,
            len_pos: len_pos,
            abbrevs: self.blockinfo.get(&block_id).cloned().unwrap_or_default(),
        });

        Ok(())
    }

    /// Exit the current block, filling in its length.
    pub fn exit_block(&mut self) -> Result<(), Error> {
        if self.scopes.is_empty() {
            return Err(Error::BadScope("no block to exit".into()));
        }

        self.emit_abbrev_id(ReservedAbbrevId::EndBlock.into())?;
        self.writer.align32();

        // Unwrap safety: we checked for a scope above.
        #[allow(clippy::unwrap_used)]
        let scope = self.scopes.pop().unwrap();

        let words = (self.writer.tell_byte() - scope.len_pos - 4) / 4;
        self.writer.backpatch_word(scope.len_pos, words as u32)?;

        log::debug!("exit_block: ID={}, {} words", scope.block_id, words);
        Ok(())
    }

    /// Define an abbreviation local to the current block, returning its ID.
    pub fn define_abbrev(&mut self, abbrev: &Abbrev) -> Result<u64, Error> {
        if self.scopes.is_empty() {
            return Err(Error::BadScope(
                "abbreviations can only be defined inside a block".into(),
            ));
        }

        self.emit_abbrev_id(ReservedAbbrevId::DefineAbbrev.into())?;
        abbrev.write(&mut self.writer)?;

        // Unwrap safety: we checked for a scope above.
        #[allow(clippy::unwrap_used)]
        let scope = self.scopes.last_mut().unwrap();
        scope.abbrevs.push(abbrev.clone());

        Ok(FIRST_APPLICATION_ABBREV_ID + scope.abbrevs.len() as u64 - 1)
    }

    /// Emit a `BLOCKINFO` block defining `abbrevs` for each listed block ID.
    ///
    /// Blocks entered afterwards see these abbreviations first, from ID 4.
    pub fn write_blockinfo(&mut self, abbrevs: &[(u64, Vec<Abbrev>)]) -> Result<(), Error> {
        self.enter_block(ReservedBlockId::BlockInfo.into(), INITIAL_ABBREV_ID_WIDTH)?;

        for (block_id, block_abbrevs) in abbrevs.iter() {
            if block_abbrevs.is_empty() {
                continue;
            }

            self.write_unabbrev(BlockInfoCode::SetBid.into(), &[*block_id])?;
            for abbrev in block_abbrevs.iter() {
                self.emit_abbrev_id(ReservedAbbrevId::DefineAbbrev.into())?;
                abbrev.write(&mut self.writer)?;
                self.blockinfo
                    .entry(*block_id)
                    .or_insert_with(Vec::new)
                    .push(abbrev.clone());
            }
        }

        self.exit_block()
    }

    /// Emit an unabbreviated record.
    pub fn write_unabbrev(&mut self, code: u64, fields: &[u64]) -> Result<(), Error> {
        if self.scopes.is_empty() {
            return Err(Error::BadScope("records can only appear inside a block".into()));
        }

        self.emit_abbrev_id(ReservedAbbrevId::UnabbrevRecord.into())?;
        self.writer.emit_vbr(code, 6)?;
        self.writer.emit_vbr(fields.len() as u64, 6)?;
        for field in fields {
            self.writer.emit_vbr(*field, 6)?;
        }

        Ok(())
    }

    /// Emit a record with the abbreviation `abbrev_id` of the current block.
    pub fn write_abbreviated(
        &mut self,
        abbrev_id: u64,
        code: u64,
        fields: &[u64],
    ) -> Result<(), Error> {
        let abbrev = self
            .scopes
            .last()
            .ok_or_else(|| Error::BadScope("records can only appear inside a block".into()))?
            .abbrevs
            .get(abbrev_id.saturating_sub(FIRST_APPLICATION_ABBREV_ID) as usize)
            .filter(|_| abbrev_id >= FIRST_APPLICATION_ABBREV_ID)
            .cloned()
            .ok_or(Error::BadAbbrev(abbrev_id))?;

        let mut values = Vec::with_capacity(fields.len() + 1);
        values.push(code);
        values.extend_from_slice(fields);

        // Check first, so that a mismatch never leaves a dangling abbreviation ID behind.
        if !abbrev.can_encode(&values) {
            return Err(Error::Unencodable(format!(
                "abbreviation {} can't encode {:?}",
                abbrev, values
            )));
        }

        self.emit_abbrev_id(abbrev_id)?;
        abbrev.write_values(&mut self.writer, &values)
    }

    /// Returns the width needed for the abbreviation IDs of a block with `num_abbrevs`
    /// abbreviations.
    pub fn width_for(num_abbrevs: usize) -> u64 {
        abbrev_id_width(FIRST_APPLICATION_ABBREV_ID + num_abbrevs as u64 - 1)
    }

    /// Finish writing, returning the stream's bytes.
    pub fn finish(self) -> Result<Vec<u8>, Error> {
        if let Some(scope) = self.scopes.last() {
            return Err(Error::BadScope(format!(
                "block {} was never exited",
                scope.block_id
            )));
        }

        Ok(self.writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abbrev::AbbrevOp;
    use crate::parser::StreamEntry;
    use crate::record::{Block, Record};
    use crate::Bitstream;

    fn entries(bytes: Vec<u8>) -> Vec<StreamEntry> {
        Bitstream::from(bytes)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_width_for() {
        assert_eq!(StreamWriter::width_for(0), 2);
        assert_eq!(StreamWriter::width_for(1), 3);
        assert_eq!(StreamWriter::width_for(4), 3);
        assert_eq!(StreamWriter::width_for(5), 4);
    }

    #[test]
    fn test_write_and_parse() {
        let global = Abbrev::new(vec![AbbrevOp::Literal(3), AbbrevOp::Vbr(4)]);
        let local = Abbrev::new(vec![AbbrevOp::Literal(1), AbbrevOp::Array, AbbrevOp::Fixed(8)]);

        let mut w = StreamWriter::new();
        w.write_header(&PexeHeader::with_version(2)).unwrap();
        w.enter_block(8, 3).unwrap();
        w.write_blockinfo(&[(12, vec![global.clone()]), (17, vec![])])
            .unwrap();
        w.write_unabbrev(1, &[2]).unwrap();
        w.enter_block(12, 3).unwrap();
        assert_eq!(w.define_abbrev(&local).unwrap(), 5);
        w.write_abbreviated(4, 3, &[100]).unwrap();
        w.write_abbreviated(5, 1, &[0xca, 0xfe]).unwrap();
        assert!(w.write_abbreviated(6, 1, &[]).is_err());
        assert!(w.write_abbreviated(3, 1, &[]).is_err());
        assert!(w.write_abbreviated(4, 2, &[100]).is_err());
        w.exit_block().unwrap();
        w.exit_block().unwrap();
        let bytes = w.finish().unwrap();

        assert_eq!(bytes.len() % 4, 0);
        let entries = entries(bytes);

        let records: Vec<(Option<u64>, u64, Vec<u64>)> = entries
            .iter()
            .filter_map(|e| match e {
                StreamEntry::Record(Record {
                    abbrev_id,
                    code,
                    fields,
                    ..
                }) => Some((*abbrev_id, *code, fields.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            records,
            vec![
                (None, 1, vec![2]),
                (Some(4), 3, vec![100]),
                (Some(5), 1, vec![0xca, 0xfe]),
            ]
        );

        let blocks: Vec<u64> = entries
            .iter()
            .filter_map(|e| match e {
                StreamEntry::SubBlock(Block { block_id, .. }) => Some(*block_id),
                _ => None,
            })
            .collect();
        assert_eq!(blocks, vec![8, 12]);
        assert_eq!(
            entries
                .iter()
                .filter(|e| matches!(e, StreamEntry::EndBlock))
                .count(),
            2
        );
    }

    #[test]
    fn test_block_lengths() {
        let mut w = StreamWriter::new();
        w.enter_block(8, 2).unwrap();
        w.write_unabbrev(1, &[1, 2, 3]).unwrap();
        w.exit_block().unwrap();
        let bytes = w.finish().unwrap();

        // Enter (one word), length (one word), then the body.
        let len_word = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(len_word as usize, bytes.len() / 4 - 2);
    }

    #[test]
    fn test_scope_errors() {
        let mut w = StreamWriter::new();
        assert!(w.exit_block().is_err());
        assert!(w.write_unabbrev(1, &[]).is_err());
        assert!(w.define_abbrev(&Abbrev::new(vec![AbbrevOp::Literal(1)])).is_err());

        w.enter_block(8, 2).unwrap();
        assert!(w.write_header(&PexeHeader::with_version(2)).is_err());
        assert!(w.finish().is_err());
    }
}
