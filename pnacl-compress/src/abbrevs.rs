//! Per-block abbreviation tables, and the mapping from bitstream abbreviation IDs
//! onto them.

use std::collections::BTreeMap;
use std::io::{self, Write};

use indexmap::IndexMap;
use pnacl_bitstream::{Abbrev, AbbrevOp};
use pnacl_support::bitcodes::ReservedAbbrevId;
use pnacl_support::FIRST_APPLICATION_ABBREV_ID;

use crate::trie::{build_lookup_map, lookup_key, print_lookup_map, LookupMap, TrieNode};

/// The table index of the (implicit) abbreviation used by unabbreviated records.
pub const UNABBREV_INDEX: usize = ReservedAbbrevId::UnabbrevRecord as usize;

/// The first table index that holds an abbreviation defined by the bitstream.
pub const FIRST_APPLICATION_INDEX: usize = FIRST_APPLICATION_ABBREV_ID as usize;

/// Returns the abbreviation every unabbreviated record can be read as.
pub fn default_abbrev() -> Abbrev {
    Abbrev::new(vec![AbbrevOp::Array, AbbrevOp::Vbr(6)])
}

/// Prints an abbreviation along with the block it belongs to.
pub fn write_block_abbrev(out: &mut dyn Write, block_id: u64, abbrev: &Abbrev) -> io::Result<()> {
    writeln!(out, "Abbrev(block {}): {}", block_id, abbrev)
}

/// Maps the abbreviation IDs used in a bitstream to table indices.
///
/// IDs are handed out sequentially, in the order the stream defines them.
#[derive(Clone, Debug, Default)]
pub struct IdMap {
    next_id: u64,
    ids: BTreeMap<u64, usize>,
}

impl IdMap {
    /// Create an empty map whose first defined abbreviation gets `next_id`.
    pub fn starting_at(next_id: u64) -> Self {
        Self {
            next_id: next_id,
            ids: BTreeMap::new(),
        }
    }

    /// Returns the ID the next defined abbreviation will get.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Assign the next abbreviation ID to table index `index`.
    pub fn install(&mut self, index: usize) {
        self.ids.insert(self.next_id, index);
        self.next_id += 1;
    }

    /// Returns the table index for the given abbreviation ID, if it's been defined.
    pub fn get(&self, id: u64) -> Option<usize> {
        self.ids.get(&id).copied()
    }
}

/// The abbreviations known for one block ID.
///
/// Indices `0..4` are placeholders holding the default `[Array(VBR(6))]`, so that
/// every record has a shape to analyze; index 3 stands for unabbreviated records.
/// Abbreviations read from the input come next, followed by synthesized ones.
#[derive(Debug)]
pub struct BlockAbbrevs {
    block_id: u64,
    abbrevs: Vec<Abbrev>,
    first_synthesized: Option<usize>,
    global_ids: IdMap,
    lookup: LookupMap,
}

impl BlockAbbrevs {
    /// Create a table for `block_id` holding only the placeholder abbreviations.
    pub fn new(block_id: u64) -> Self {
        Self {
            block_id: block_id,
            abbrevs: vec![default_abbrev(); FIRST_APPLICATION_INDEX],
            first_synthesized: None,
            global_ids: IdMap::starting_at(FIRST_APPLICATION_ABBREV_ID),
            lookup: LookupMap::new(),
        }
    }

    /// Returns the block ID this table belongs to.
    pub fn block_id(&self) -> u64 {
        self.block_id
    }

    /// Returns every abbreviation in the table, placeholders included.
    pub fn abbrevs(&self) -> &[Abbrev] {
        &self.abbrevs
    }

    /// Returns the abbreviation at `index`, if there is one.
    pub fn get(&self, index: usize) -> Option<&Abbrev> {
        self.abbrevs.get(index)
    }

    /// Returns the number of abbreviations in the table, placeholders included.
    pub fn len(&self) -> usize {
        self.abbrevs.len()
    }

    /// Returns whether the table holds anything besides the placeholders.
    pub fn is_empty(&self) -> bool {
        self.abbrevs.len() <= FIRST_APPLICATION_INDEX
    }

    /// Returns the index of an application abbreviation equal to `abbrev`.
    pub fn find(&self, abbrev: &Abbrev) -> Option<usize> {
        self.abbrevs
            .iter()
            .enumerate()
            .skip(FIRST_APPLICATION_INDEX)
            .find(|(_, a)| *a == abbrev)
            .map(|(idx, _)| idx)
    }

    /// Add `abbrev` unless it's already present.
    ///
    /// Returns its index, and whether it was newly added.
    pub fn add(&mut self, abbrev: Abbrev) -> (usize, bool) {
        match self.find(&abbrev) {
            Some(idx) => (idx, false),
            None => {
                self.abbrevs.push(abbrev);
                (self.abbrevs.len() - 1, true)
            }
        }
    }

    /// Like [`add`](BlockAbbrevs::add), but marks the abbreviation as synthesized
    /// rather than read from the input.
    pub fn add_synthesized(&mut self, abbrev: Abbrev) -> (usize, bool) {
        let (idx, added) = self.add(abbrev);
        if added && self.first_synthesized.is_none() {
            self.first_synthesized = Some(idx);
        }
        (idx, added)
    }

    /// Returns whether the abbreviation at `index` was synthesized.
    pub fn is_synthesized(&self, index: usize) -> bool {
        self.first_synthesized.map_or(false, |first| index >= first)
    }

    /// Returns the IDs that `BLOCKINFO` assigned for this block.
    pub fn global_ids(&self) -> &IdMap {
        &self.global_ids
    }

    /// Returns the IDs that `BLOCKINFO` assigned for this block, mutably.
    pub fn global_ids_mut(&mut self) -> &mut IdMap {
        &mut self.global_ids
    }

    /// (Re)build the lookup tries over this table's application abbreviations.
    pub fn build_lookup(&mut self) {
        self.lookup = build_lookup_map(&self.abbrevs, FIRST_APPLICATION_INDEX);
    }

    /// Returns the lookup tries, keyed by record size.
    pub fn lookup(&self) -> &LookupMap {
        &self.lookup
    }

    /// Returns the trie node holding every abbreviation that may apply to `values`
    /// (a record's code followed by its fields).
    pub fn candidates_for(&self, values: &[u64]) -> Option<&TrieNode> {
        self.lookup
            .get(&lookup_key(values.len()))
            .map(|root| root.match_values(values))
    }

    /// Print this table's lookup tries.
    pub fn print_lookup(&self, out: &mut dyn Write) -> io::Result<()> {
        print_lookup_map(out, self.block_id, &self.lookup, &self.abbrevs)
    }
}

/// Every block ID's abbreviation table, in the order the block IDs were first seen.
pub type BlockAbbrevsMap = IndexMap<u64, BlockAbbrevs>;

/// Returns the table for `block_id`, creating it if needed.
pub fn block_abbrevs(map: &mut BlockAbbrevsMap, block_id: u64) -> &mut BlockAbbrevs {
    map.entry(block_id)
        .or_insert_with(|| BlockAbbrevs::new(block_id))
}
