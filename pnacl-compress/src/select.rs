//! Choosing an abbreviation for every record, and dropping the abbreviations
//! that end up rarely used.

use indexmap::IndexMap;
use pnacl_bitcursor::vbr_bit_size;
use pnacl_bitstream::Abbrev;
use pnacl_support::FIRST_APPLICATION_ABBREV_ID;

use crate::abbrevs::{BlockAbbrevs, BlockAbbrevsMap, UNABBREV_INDEX};
use crate::unroll::{Block, Entry, UnrolledBitcode};

/// An abbreviation has to be chosen at least this many times in a block ID to be kept.
const MIN_USAGE_COUNT: u64 = 5;

/// Returns the bits an `UNABBREV_RECORD` for `values` (code, then fields) takes,
/// not counting the abbreviation ID.
pub fn unabbreviated_bits(values: &[u64]) -> u64 {
    let (code, fields) = match values.split_first() {
        Some(split) => split,
        None => return 0,
    };

    let mut bits = vbr_bit_size(*code, 6) + vbr_bit_size(fields.len() as u64, 6);
    for field in fields {
        bits += vbr_bit_size(*field, 6);
    }
    bits as u64
}

/// Returns the bits `abbrev` needs for `values`, if it can encode them.
///
/// Blob padding depends on where the record lands in the stream, so it's
/// estimated as half a word.
fn abbreviated_bits(abbrev: &Abbrev, values: &[u64]) -> Option<u64> {
    if let Some(bits) = abbrev.encoded_bits(values) {
        return Some(bits);
    }

    if !abbrev.can_encode(values) {
        return None;
    }

    // Only a trailing blob gets here: price the prefix, then the bytes.
    let head = Abbrev::new(abbrev.ops()[..abbrev.len() - 1].to_vec());
    let head_len = abbrev.len() - 1;
    let blob_len = (values.len() - head_len) as u64;
    Some(
        head.encoded_bits(&values[..head_len])?
            + vbr_bit_size(blob_len, 6) as u64
            + blob_len * 8
            + 16,
    )
}

/// Returns the table index of the abbreviation that writes `values` (code, then
/// fields) in the fewest bits, or [`UNABBREV_INDEX`] if none beats writing the
/// record unabbreviated.
///
/// Equal sizes favor synthesized abbreviations, then lower indices.
pub fn select_abbrev(abbrevs: &BlockAbbrevs, values: &[u64]) -> usize {
    let node = match abbrevs.candidates_for(values) {
        Some(node) => node,
        None => return UNABBREV_INDEX,
    };

    let mut best: Option<(u64, usize)> = None;
    for index in node.abbrevs().iter().copied() {
        let bits = match abbrevs
            .get(index)
            .and_then(|abbrev| abbreviated_bits(abbrev, values))
        {
            Some(bits) => bits,
            None => continue,
        };

        let better = match best {
            None => true,
            Some((best_bits, best_index)) => {
                bits < best_bits
                    || (bits == best_bits
                        && abbrevs.is_synthesized(index)
                        && !abbrevs.is_synthesized(best_index))
            }
        };

        if better {
            best = Some((bits, index));
        }
    }

    match best {
        Some((bits, index)) if bits <= unabbreviated_bits(values) => index,
        _ => UNABBREV_INDEX,
    }
}

/// The abbreviations chosen for every record of one block ID, in stream order.
#[derive(Debug, Default)]
pub struct SelectedAbbrevs {
    queue: Vec<usize>,
    next: usize,
    kept: Vec<Abbrev>,
}

impl SelectedAbbrevs {
    /// Queue the table index chosen for the next record.
    pub fn push(&mut self, index: usize) {
        self.queue.push(index);
    }

    /// Keep only the frequently chosen abbreviations, renumbering the queue to
    /// their bitstream IDs (from 4, in table order). Records whose abbreviation
    /// is dropped fall back to `UNABBREV_RECORD`.
    pub fn install_frequent(&mut self, abbrevs: &BlockAbbrevs) {
        let mut usage: std::collections::BTreeMap<usize, u64> = Default::default();
        for index in self.queue.iter().filter(|i| **i != UNABBREV_INDEX) {
            *usage.entry(*index).or_insert(0) += 1;
        }

        let mut renumbered = std::collections::BTreeMap::new();
        for (index, _) in usage.into_iter().filter(|(_, n)| *n >= MIN_USAGE_COUNT) {
            if let Some(abbrev) = abbrevs.get(index) {
                renumbered.insert(index, FIRST_APPLICATION_ABBREV_ID as usize + self.kept.len());
                self.kept.push(abbrev.clone());
            }
        }

        for index in self.queue.iter_mut() {
            *index = renumbered.get(index).copied().unwrap_or(UNABBREV_INDEX);
        }

        log::debug!(
            "block {}: keeping {} abbreviations for {} records",
            abbrevs.block_id(),
            self.kept.len(),
            self.queue.len()
        );
    }

    /// Returns the abbreviations to define, in ID order.
    pub fn kept(&self) -> &[Abbrev] {
        &self.kept
    }

    /// Take the abbreviation ID for the next record, if any remain.
    pub fn next_id(&mut self) -> Option<u64> {
        let index = *self.queue.get(self.next)?;
        self.next += 1;
        Some(index as u64)
    }
}

/// Every block ID's selections, in the same order as the abbreviation tables.
pub type SelectionMap = IndexMap<u64, SelectedAbbrevs>;

fn select_block(block: &Block, map: &BlockAbbrevsMap, selection: &mut SelectionMap) {
    selection.entry(block.id).or_default();

    for entry in block.entries.iter() {
        match entry {
            Entry::Record(record) => {
                let index = map
                    .get(&block.id)
                    .map_or(UNABBREV_INDEX, |abbrevs| {
                        select_abbrev(abbrevs, &record.values())
                    });
                selection.entry(block.id).or_default().push(index);
            }
            Entry::Block(child) => select_block(child, map, selection),
        }
    }
}

/// Choose an abbreviation for every record in `bitcode`, then keep only the
/// frequently used ones.
///
/// Records are visited in stream order, the same order the writer consumes them in.
pub fn choose_abbrevs(bitcode: &UnrolledBitcode, map: &BlockAbbrevsMap) -> SelectionMap {
    let mut selection: SelectionMap = map
        .keys()
        .map(|id| (*id, SelectedAbbrevs::default()))
        .collect();

    for block in bitcode.blocks.iter() {
        select_block(block, map, &mut selection);
    }

    for (block_id, selected) in selection.iter_mut() {
        if let Some(abbrevs) = map.get(block_id) {
            selected.install_frequent(abbrevs);
        }
    }

    selection
}
