//! Distributions over blocks: the root of the distribution tree.

use std::io::{self, Write};

use pnacl_support::names::block_name;

use crate::abbrevs::BlockAbbrevsMap;
use crate::dist::{
    percent, write_bits_stats, write_count_stats, write_nested_dist, AbbrevElement, Dist,
    DistElement,
};
use crate::unroll::{Block, UnrolledBitcode};

/// Counts the blocks with one ID, the bits they take up (excluding nested blocks),
/// and the abbreviations their records were read with.
#[derive(Debug)]
pub struct BlockElement {
    count: u64,
    bits: u64,
    abbrevs: Dist<AbbrevElement>,
}

impl BlockElement {
    /// Returns the bits these blocks take up, excluding nested blocks.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Returns the distribution of abbreviations used by these blocks' records.
    pub fn abbrevs(&self) -> &Dist<AbbrevElement> {
        &self.abbrevs
    }
}

impl DistElement for BlockElement {
    type Item = Block;
    type Context = ();

    const TITLE: &'static str = "Block Histogram";
    const VALUE_HEADER: &'static str = "Block";

    fn create(_context: &(), key: u64) -> Self {
        Self {
            count: 0,
            bits: 0,
            abbrevs: Dist::new(key),
        }
    }

    fn key_list(_context: &(), block: &Block) -> Vec<u64> {
        vec![block.id]
    }

    fn add(&mut self, block: &Block) {
        self.count += 1;
        self.bits += block.local_bits();
        for record in block.records() {
            self.abbrevs.add(record);
        }
    }

    fn count(&self) -> u64 {
        self.count
    }

    /// Blocks rank by their share of the file.
    fn importance(&self) -> f64 {
        self.bits as f64
    }

    fn write_stats_header(out: &mut dyn Write) -> io::Result<()> {
        write!(out, "  %File   Count %Count    # Bits    Bits/Elmt")
    }

    fn write_stats(&self, out: &mut dyn Write, dist: &Dist<Self>) -> io::Result<()> {
        let file_bits: u64 = dist.elements().map(|(_, e)| e.bits).sum();
        write!(out, " {:6.2}", percent(self.bits as f64, file_bits as f64))?;
        write_count_stats(out, self.count, dist.total())?;
        write_bits_stats(out, self.bits, self.count)
    }

    fn write_value(&self, out: &mut dyn Write, _context: &(), key: u64) -> io::Result<()> {
        write!(out, "{}", block_name(key))
    }

    fn write_nested(&self, out: &mut dyn Write, indent: &str) -> io::Result<bool> {
        let mut printed = false;
        write_nested_dist(out, indent, &self.abbrevs, &mut printed)?;
        Ok(printed)
    }
}

/// Build the distribution tree for every block in `bitcode`.
pub fn block_dist(bitcode: &UnrolledBitcode) -> Dist<BlockElement> {
    let mut dist = Dist::new(());
    bitcode.visit(&mut |block| dist.add(block));
    dist
}

/// Print, for each block ID with an abbreviation table, how often each of its
/// abbreviations was used.
pub fn write_abbrev_frequencies(
    out: &mut dyn Write,
    dist: &Dist<BlockElement>,
    map: &BlockAbbrevsMap,
) -> io::Result<()> {
    for (block_id, element) in dist.sorted_elements() {
        let abbrevs = match map.get(&block_id) {
            Some(abbrevs) => abbrevs,
            None => continue,
        };

        writeln!(out, "Block {}", block_id)?;
        let total = element.abbrevs.total();
        for (index, abbrev_element) in element.abbrevs.sorted_elements() {
            let count = abbrev_element.count();
            write!(
                out,
                "{:8} ({:6.2}%): ",
                count,
                percent(count as f64, total as f64)
            )?;
            match abbrevs.get(index as usize) {
                Some(abbrev) => writeln!(out, "{}", abbrev)?,
                None => writeln!(out, "?")?,
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unroll::{Entry, Record};

    fn record(code: u64, bits: u64) -> Entry {
        Entry::Record(Record {
            code: code,
            fields: vec![1],
            abbrev_index: 3,
            bits: bits,
        })
    }

    fn sample() -> UnrolledBitcode {
        let inner = Block {
            id: 12,
            entries: vec![record(1, 32), record(1, 32)],
            bits: 128,
        };
        let module = Block {
            id: 8,
            entries: vec![record(2, 64), Entry::Block(inner.clone()), Entry::Block(inner)],
            bits: 512,
        };

        UnrolledBitcode {
            header: pnacl_bitstream::PexeHeader::with_version(2),
            blocks: vec![module],
        }
    }

    #[test]
    fn test_block_dist() {
        let dist = block_dist(&sample());

        assert_eq!(dist.total(), 3);
        assert_eq!(dist.get(8).unwrap().count(), 1);
        assert_eq!(dist.get(8).unwrap().bits(), 256);
        assert_eq!(dist.get(12).unwrap().count(), 2);
        assert_eq!(dist.get(12).unwrap().bits(), 256);

        let inner = dist.get(12).unwrap();
        assert_eq!(inner.abbrevs().get(3).unwrap().count(), 4);

        // Equal bits: the lower block ID ranks first.
        let keys: Vec<u64> = dist.sorted().iter().map(|(_, k)| *k).collect();
        assert_eq!(keys, vec![8, 12]);
    }

    #[test]
    fn test_print_header() {
        let dist = block_dist(&sample());
        let mut out = vec![];
        dist.print(&mut out, "").unwrap();
        let out = String::from_utf8(out).unwrap();

        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("Block Histogram (2 elements):"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(
            lines.next(),
            Some("  %File   Count %Count    # Bits    Bits/Elmt Block")
        );
        assert_eq!(
            lines.next(),
            Some("  50.00       1  33.33       256       256.00 MODULE_BLOCK")
        );
        assert!(out.contains("  Block Histogram (continued)\n"));
        assert!(out.contains("    Abbreviation Indices (1 elements):\n"));
    }

    #[test]
    fn test_abbrev_frequencies() {
        let bitcode = sample();
        let dist = block_dist(&bitcode);
        let mut map = BlockAbbrevsMap::new();
        map.insert(12, crate::abbrevs::BlockAbbrevs::new(12));

        let mut out = vec![];
        write_abbrev_frequencies(&mut out, &dist, &map).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Block 12\n       4 (100.00%): [Array(VBR(6))]\n\n"
        );
    }
}
