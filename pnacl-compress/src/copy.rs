//! Writing an unrolled bitcode file back out with the selected abbreviations.

use pnacl_bitstream::{Abbrev, StreamWriter};
use pnacl_support::bitcodes::PnaclBlockId;
use pnacl_support::INITIAL_ABBREV_ID_WIDTH;

use crate::abbrevs::UNABBREV_INDEX;
use crate::error::Error;
use crate::select::SelectionMap;
use crate::unroll::{Block, Entry, Record, UnrolledBitcode};

struct Copier<'a> {
    writer: StreamWriter,
    /// `None` when every record is written unabbreviated.
    selection: Option<&'a mut SelectionMap>,
    wrote_blockinfo: bool,
}

impl<'a> Copier<'a> {
    fn module_id() -> u64 {
        PnaclBlockId::Module.into()
    }

    fn kept(&self, block_id: u64) -> &[Abbrev] {
        match &self.selection {
            Some(selection) => selection.get(&block_id).map_or(&[], |s| s.kept()),
            None => &[],
        }
    }

    /// Emit the kept abbreviations of every block ID but the module's, once.
    fn write_blockinfo(&mut self) -> Result<(), Error> {
        if self.wrote_blockinfo {
            return Ok(());
        }
        self.wrote_blockinfo = true;

        let abbrevs: Vec<(u64, Vec<Abbrev>)> = match &self.selection {
            Some(selection) => selection
                .iter()
                .filter(|(id, s)| **id != Self::module_id() && !s.kept().is_empty())
                .map(|(id, s)| (*id, s.kept().to_vec()))
                .collect(),
            None => vec![],
        };

        if abbrevs.is_empty() {
            return Ok(());
        }

        log::debug!("writing BLOCKINFO for {} block IDs", abbrevs.len());
        Ok(self.writer.write_blockinfo(&abbrevs)?)
    }

    fn copy_block(&mut self, block: &Block) -> Result<(), Error> {
        let width = match self.selection {
            Some(_) => StreamWriter::width_for(self.kept(block.id).len()),
            None => INITIAL_ABBREV_ID_WIDTH,
        };
        self.writer.enter_block(block.id, width)?;

        // The module block's abbreviations are local, since BLOCKINFO comes after them.
        if block.id == Self::module_id() {
            let module_abbrevs = self.kept(block.id).to_vec();
            for abbrev in module_abbrevs.iter() {
                self.writer.define_abbrev(abbrev)?;
            }
            self.write_blockinfo()?;
        }

        for entry in block.entries.iter() {
            match entry {
                Entry::Record(record) => self.copy_record(block.id, record)?,
                Entry::Block(child) => self.copy_block(child)?,
            }
        }

        Ok(self.writer.exit_block()?)
    }

    fn copy_record(&mut self, block_id: u64, record: &Record) -> Result<(), Error> {
        let abbrev_id = match self.selection.as_mut() {
            Some(selection) => selection
                .get_mut(&block_id)
                .and_then(|s| s.next_id())
                .ok_or_else(|| {
                    Error::Unroll(format!(
                        "no abbreviation selected for record {} in block {}",
                        record.code, block_id
                    ))
                })?,
            None => UNABBREV_INDEX as u64,
        };

        if abbrev_id == UNABBREV_INDEX as u64 {
            self.writer.write_unabbrev(record.code, &record.fields)?;
        } else {
            self.writer
                .write_abbreviated(abbrev_id, record.code, &record.fields)?;
        }

        Ok(())
    }
}

/// Write `bitcode` back out, using the abbreviations in `selection`.
///
/// Without a selection, every record is written unabbreviated and no
/// abbreviations are defined.
pub fn copy_bitcode(
    bitcode: &UnrolledBitcode,
    selection: Option<&mut SelectionMap>,
) -> Result<Vec<u8>, Error> {
    let mut copier = Copier {
        writer: StreamWriter::new(),
        selection: selection,
        wrote_blockinfo: false,
    };

    copier.writer.write_header(&bitcode.header)?;
    for block in bitcode.blocks.iter() {
        // Without a module block to carry it, BLOCKINFO goes before the first
        // top-level block.
        if block.id != Copier::module_id() {
            copier.write_blockinfo()?;
        }
        copier.copy_block(block)?;
    }

    Ok(copier.writer.finish()?)
}

#[cfg(test)]
mod tests {
    use pnacl_bitstream::{AbbrevOp, Bitstream, PexeHeader, StreamEntry};

    use super::*;
    use crate::abbrevs::BlockAbbrevsMap;
    use crate::select::choose_abbrevs;

    fn record(code: u64, fields: &[u64]) -> Entry {
        Entry::Record(Record {
            code: code,
            fields: fields.to_vec(),
            abbrev_index: UNABBREV_INDEX,
            bits: 0,
        })
    }

    fn sample() -> UnrolledBitcode {
        let function = Block {
            id: 12,
            entries: vec![record(2, &[1, 2]), record(3, &[])],
            bits: 0,
        };
        UnrolledBitcode {
            header: PexeHeader::with_version(2),
            blocks: vec![Block {
                id: 8,
                entries: vec![record(1, &[7]), Entry::Block(function)],
                bits: 0,
            }],
        }
    }

    fn records(buf: &[u8]) -> Vec<(u64, Vec<u64>)> {
        Bitstream::from(buf)
            .unwrap()
            .filter_map(|e| match e.unwrap() {
                StreamEntry::Record(r) => Some((r.code, r.fields)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_copy_unabbreviated() {
        let buf = copy_bitcode(&sample(), None).unwrap();

        assert_eq!(&buf[..4], b"PEXE");
        assert_eq!(
            records(&buf),
            vec![(1, vec![7]), (2, vec![1, 2]), (3, vec![])]
        );
    }

    #[test]
    fn test_copy_with_blockinfo() {
        let bitcode = sample();
        let mut map = BlockAbbrevsMap::new();
        let mut abbrevs = crate::abbrevs::BlockAbbrevs::new(12);
        abbrevs.add(Abbrev::new(vec![
            AbbrevOp::Literal(2),
            AbbrevOp::Fixed(2),
            AbbrevOp::Fixed(2),
        ]));
        abbrevs.build_lookup();
        map.insert(8, crate::abbrevs::BlockAbbrevs::new(8));
        map.insert(12, abbrevs);

        let mut selection = choose_abbrevs(&bitcode, &map);
        // One use isn't enough to keep the abbreviation.
        assert!(selection.get(&12).unwrap().kept().is_empty());

        let buf = copy_bitcode(&bitcode, Some(&mut selection)).unwrap();
        assert_eq!(
            records(&buf),
            vec![(1, vec![7]), (2, vec![1, 2]), (3, vec![])]
        );

        let defined = Bitstream::from(&buf[..])
            .unwrap()
            .filter(|e| matches!(e, Ok(StreamEntry::Abbrev { .. })))
            .count();
        assert_eq!(defined, 0);
    }

    #[test]
    fn test_copy_top_level_blockinfo() {
        let entries = std::iter::repeat_with(|| record(2, &[1, 2]))
            .take(6)
            .collect();
        let bitcode = UnrolledBitcode {
            header: PexeHeader::with_version(2),
            blocks: vec![Block {
                id: 12,
                entries: entries,
                bits: 0,
            }],
        };

        let mut map = BlockAbbrevsMap::new();
        let mut abbrevs = crate::abbrevs::BlockAbbrevs::new(12);
        abbrevs.add(Abbrev::new(vec![
            AbbrevOp::Literal(2),
            AbbrevOp::Fixed(2),
            AbbrevOp::Fixed(2),
        ]));
        abbrevs.build_lookup();
        map.insert(12, abbrevs);

        let mut selection = choose_abbrevs(&bitcode, &map);
        assert_eq!(selection.get(&12).unwrap().kept().len(), 1);

        let buf = copy_bitcode(&bitcode, Some(&mut selection)).unwrap();
        let entries: Vec<StreamEntry> = Bitstream::from(&buf[..])
            .unwrap()
            .map(|e| e.unwrap())
            .collect();

        // BLOCKINFO's definition comes first, then the block's records use it.
        assert!(matches!(
            entries[0],
            StreamEntry::Abbrev {
                block_id: 12,
                is_local: false,
                ..
            }
        ));
        let abbreviated = entries
            .iter()
            .filter(|e| matches!(e, StreamEntry::Record(r) if r.abbrev_id == Some(4)))
            .count();
        assert_eq!(abbreviated, 6);
    }
}
