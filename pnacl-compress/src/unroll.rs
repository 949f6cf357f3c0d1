//! Routines and structures for "unrolling" a [`Bitstream`](pnacl_bitstream::Bitstream)
//! into a block-and-record hierarchy.
//!
//! While unrolling, every abbreviation the stream defines is collected into a
//! [`BlockAbbrevsMap`](crate::abbrevs::BlockAbbrevsMap), and every record is
//! tagged with the table index of the abbreviation it was read with.

use pnacl_bitstream::{Bitstream, PexeHeader, StreamEntry};

use crate::abbrevs::{block_abbrevs, write_block_abbrev, BlockAbbrevsMap, IdMap, UNABBREV_INDEX};
use crate::error::Error;

/// An unrolled record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The record's code.
    pub code: u64,
    /// The record's fields, with any arrays or blobs flattened.
    pub fields: Vec<u64>,
    /// The index (into its block's abbreviation table) of the abbreviation this
    /// record was read with.
    pub abbrev_index: usize,
    /// The number of bits the record took up in the input.
    pub bits: u64,
}

impl Record {
    /// Returns whether the record was read with an abbreviation.
    pub fn used_abbrev(&self) -> bool {
        self.abbrev_index != UNABBREV_INDEX
    }

    /// Returns the record's code followed by its fields.
    pub fn values(&self) -> Vec<u64> {
        let mut values = Vec::with_capacity(self.fields.len() + 1);
        values.push(self.code);
        values.extend_from_slice(&self.fields);
        values
    }
}

/// A block entry, in stream order.
#[derive(Clone, Debug)]
pub enum Entry {
    /// A record directly in the block.
    Record(Record),
    /// A nested block.
    Block(Block),
}

/// A fully unrolled block within the bitstream, with its records and sub-blocks
/// in the order they appeared.
#[derive(Clone, Debug)]
pub struct Block {
    /// This block's ID.
    pub id: u64,
    /// This block's records and sub-blocks.
    pub entries: Vec<Entry>,
    /// The size of the block's body in the input, in bits.
    pub bits: u64,
}

impl Block {
    fn new(id: u64, bits: u64) -> Self {
        Self {
            id: id,
            entries: vec![],
            bits: bits,
        }
    }

    /// Returns an iterator over the records directly in this block.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Record(r) => Some(r),
            Entry::Block(_) => None,
        })
    }

    /// Returns an iterator over the blocks directly nested in this block.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Entry::Block(b) => Some(b),
            Entry::Record(_) => None,
        })
    }

    /// Returns the bits this block takes up, excluding those of nested blocks.
    pub fn local_bits(&self) -> u64 {
        let nested: u64 = self.blocks().map(|b| b.bits).sum();
        self.bits.saturating_sub(nested)
    }

    /// Visit this block and every block nested within it, parents first.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Block)) {
        f(self);
        for block in self.blocks() {
            block.visit(f);
        }
    }
}

/// A fully unrolled bitcode file.
#[derive(Debug)]
pub struct UnrolledBitcode {
    /// The file's header.
    pub header: PexeHeader,
    /// The top-level blocks in this bitcode file.
    pub blocks: Vec<Block>,
}

struct Unroller<'a, T: AsRef<[u8]>> {
    bitstream: Bitstream<T>,
    abbrevs: &'a mut BlockAbbrevsMap,
    trace: bool,
}

impl<'a, T: AsRef<[u8]>> Unroller<'a, T> {
    /// Record a newly read abbreviation, returning its table index.
    fn add_abbrev(&mut self, block_id: u64, abbrev: pnacl_bitstream::Abbrev) -> usize {
        let abbrev = abbrev.simplify();
        let (index, added) = block_abbrevs(self.abbrevs, block_id).add(abbrev);

        if added && self.trace {
            // NOTE: Tracing is best-effort; a closed stderr isn't worth failing over.
            let _ = write_block_abbrev(
                &mut std::io::stderr(),
                block_id,
                &self.abbrevs[&block_id].abbrevs()[index],
            );
        }

        index
    }

    fn global_abbrev(&mut self, block_id: u64, abbrev: pnacl_bitstream::Abbrev) {
        let index = self.add_abbrev(block_id, abbrev);
        block_abbrevs(self.abbrevs, block_id)
            .global_ids_mut()
            .install(index);
    }

    fn enter_block(&mut self, block_id: u64, len: u64) -> Result<Block, Error> {
        let mut unrolled_block = Block::new(block_id, len * 8);

        // Local abbreviations are numbered after every ID that BLOCKINFO defined
        // for this block.
        let mut local_ids = IdMap::starting_at(
            block_abbrevs(self.abbrevs, block_id)
                .global_ids()
                .next_id(),
        );

        loop {
            let entry = self
                .bitstream
                .next()
                .ok_or_else(|| Error::Unroll("unexpected stream end during unroll".into()))?;

            match entry? {
                StreamEntry::Record(record) => {
                    let abbrev_index = match record.abbrev_id {
                        None => UNABBREV_INDEX,
                        Some(id) => local_ids
                            .get(id)
                            .or_else(|| self.abbrevs[&block_id].global_ids().get(id))
                            .ok_or(Error::BadAbbrevIndex {
                                block_id: block_id,
                                index: id,
                            })?,
                    };

                    unrolled_block.entries.push(Entry::Record(Record {
                        code: record.code,
                        fields: record.fields,
                        abbrev_index: abbrev_index,
                        bits: record.bits,
                    }));
                }
                StreamEntry::SubBlock(block) => {
                    let child = self.enter_block(block.block_id, block.len)?;
                    unrolled_block.entries.push(Entry::Block(child));
                }
                StreamEntry::Abbrev {
                    block_id: abbrev_block_id,
                    abbrev,
                    is_local,
                } => {
                    if is_local {
                        let index = self.add_abbrev(abbrev_block_id, abbrev);
                        local_ids.install(index);
                    } else {
                        self.global_abbrev(abbrev_block_id, abbrev);
                    }
                }
                StreamEntry::EndBlock => {
                    // End our current block scope.
                    break;
                }
            }
        }

        Ok(unrolled_block)
    }

    fn unroll(mut self) -> Result<UnrolledBitcode, Error> {
        let header = self.bitstream.header().clone();
        let mut blocks = vec![];

        while let Some(entry) = self.bitstream.next() {
            match entry? {
                StreamEntry::SubBlock(block) => {
                    blocks.push(self.enter_block(block.block_id, block.len)?);
                }
                // A top-level BLOCKINFO surfaces only its abbreviations.
                StreamEntry::Abbrev {
                    block_id,
                    abbrev,
                    is_local: false,
                } => self.global_abbrev(block_id, abbrev),
                _ => {
                    return Err(Error::Unroll(
                        "bitstream has non-blocks at the top-level scope".into(),
                    ))
                }
            }
        }

        Ok(UnrolledBitcode {
            header: header,
            blocks: blocks,
        })
    }
}

impl UnrolledBitcode {
    /// Unroll the given bitcode file, collecting its abbreviations into `abbrevs`.
    ///
    /// With `trace`, every abbreviation read is printed to stderr as it's added.
    pub fn unroll(
        buf: &[u8],
        abbrevs: &mut BlockAbbrevsMap,
        trace: bool,
    ) -> Result<UnrolledBitcode, Error> {
        if buf.len() % 4 != 0 {
            return Err(Error::BadSize(buf.len()));
        }

        Unroller {
            bitstream: Bitstream::from(buf)?,
            abbrevs: abbrevs,
            trace: trace,
        }
        .unroll()
    }

    /// Visit every block in the file, parents first.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Block)) {
        for block in self.blocks.iter() {
            block.visit(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use pnacl_bitstream::{Abbrev, AbbrevOp, StreamWriter};

    use super::*;

    fn lit_vbr(lit: u64) -> Abbrev {
        Abbrev::new(vec![AbbrevOp::Literal(lit), AbbrevOp::Vbr(6)])
    }

    fn sample() -> Vec<u8> {
        let mut w = StreamWriter::new();
        w.write_header(&PexeHeader::with_version(2)).unwrap();
        w.enter_block(8, 3).unwrap();
        w.write_blockinfo(&[(12, vec![lit_vbr(1)])]).unwrap();
        w.write_unabbrev(1, &[2]).unwrap();
        w.enter_block(12, 3).unwrap();
        w.define_abbrev(&lit_vbr(2)).unwrap();
        w.write_abbreviated(4, 1, &[7]).unwrap();
        w.write_abbreviated(5, 2, &[9]).unwrap();
        w.write_unabbrev(3, &[4, 5]).unwrap();
        w.exit_block().unwrap();
        w.exit_block().unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn test_unroll() {
        let mut abbrevs = BlockAbbrevsMap::new();
        let bitcode = UnrolledBitcode::unroll(&sample(), &mut abbrevs, false).unwrap();

        assert_eq!(bitcode.header.version(), Some(2));
        assert_eq!(bitcode.blocks.len(), 1);

        let module = &bitcode.blocks[0];
        assert_eq!(module.id, 8);
        assert_eq!(module.records().count(), 1);
        assert_eq!(module.blocks().count(), 1);
        assert!(module.local_bits() < module.bits);

        let inner = module.blocks().next().unwrap();
        let records: Vec<_> = inner.records().collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].abbrev_index, 4);
        assert_eq!(records[0].values(), vec![1, 7]);
        assert_eq!(records[1].abbrev_index, 5);
        assert_eq!(records[2].abbrev_index, UNABBREV_INDEX);
        assert!(!records[2].used_abbrev());

        assert_eq!(abbrevs[&12].get(4), Some(&lit_vbr(1)));
        assert_eq!(abbrevs[&12].get(5), Some(&lit_vbr(2)));
        assert!(abbrevs[&8].is_empty());
    }

    #[test]
    fn test_visit() {
        let mut abbrevs = BlockAbbrevsMap::new();
        let bitcode = UnrolledBitcode::unroll(&sample(), &mut abbrevs, false).unwrap();

        let mut ids = vec![];
        bitcode.visit(&mut |b| ids.push(b.id));
        assert_eq!(ids, vec![8, 12]);
    }

    #[test]
    fn test_duplicate_abbrevs_share_an_index() {
        let mut w = StreamWriter::new();
        w.write_header(&PexeHeader::with_version(2)).unwrap();
        for _ in 0..2 {
            w.enter_block(12, 3).unwrap();
            w.define_abbrev(&lit_vbr(2)).unwrap();
            w.write_abbreviated(4, 2, &[1]).unwrap();
            w.exit_block().unwrap();
        }
        let bytes = w.finish().unwrap();

        let mut abbrevs = BlockAbbrevsMap::new();
        let bitcode = UnrolledBitcode::unroll(&bytes, &mut abbrevs, false).unwrap();
        assert_eq!(abbrevs[&12].len(), 5);
        for block in bitcode.blocks.iter() {
            assert_eq!(block.records().next().unwrap().abbrev_index, 4);
        }
    }

    #[test]
    fn test_bad_size() {
        let mut bytes = sample();
        bytes.push(0);
        assert!(matches!(
            UnrolledBitcode::unroll(&bytes, &mut BlockAbbrevsMap::new(), false),
            Err(Error::BadSize(_))
        ));
    }
}
