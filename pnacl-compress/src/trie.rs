//! Abbreviation lookup tries.
//!
//! Checking every abbreviation of a block against every record is slow, so the
//! abbreviations are sorted into tries keyed on their literal operators. A record
//! walks its trie by the values at those literal positions, and only the
//! abbreviations at the node it stops at need to be tried.
//!
//! Tries are kept per record size (code included); every size past
//! [`VALUE_INDEX_CUTOFF`] shares one trie.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use pnacl_bitstream::{Abbrev, AbbrevOp};
use pnacl_support::VALUE_INDEX_CUTOFF;

/// Lookup tries, keyed by record size.
pub type LookupMap = BTreeMap<usize, TrieNode>;

/// A node in an abbreviation lookup trie.
#[derive(Debug, Default)]
pub struct TrieNode {
    /// Children, by value position (0 is the code) and then by the value found there.
    successors: BTreeMap<usize, BTreeMap<u64, TrieNode>>,
    /// The table indices of the abbreviations that may apply at this node.
    abbrevs: BTreeSet<usize>,
}

impl TrieNode {
    /// Returns the table indices of the abbreviations that may apply at this node.
    pub fn abbrevs(&self) -> &BTreeSet<usize> {
        &self.abbrevs
    }

    /// Returns the child reached by the value `value` at position `index`.
    pub fn successor(&self, index: usize, value: u64) -> Option<&TrieNode> {
        self.successors.get(&index)?.get(&value)
    }

    /// Add the nodes that `abbrev`'s literals (from `index` on) call for.
    ///
    /// Literals past `skip` need nodes under every existing child for the
    /// positions in between, since a record could have followed any of them.
    /// Returns whether any node was created.
    fn add(&mut self, abbrev: &Abbrev, mut index: usize, mut skip: usize) -> bool {
        let ops = abbrev.ops();
        if index >= ops.len() {
            return false;
        }

        let mut added = false;
        while skip < index {
            if let Some(children) = self.successors.get_mut(&skip) {
                for child in children.values_mut() {
                    added |= child.add(abbrev, index, skip + 1);
                }
            }
            skip += 1;
        }

        while index < abbrev.min_record_size() {
            if let AbbrevOp::Literal(value) = ops[index] {
                if index == skip {
                    let child = match self.successors.entry(index).or_default().entry(value) {
                        Entry::Occupied(e) => e.into_mut(),
                        Entry::Vacant(e) => {
                            added = true;
                            e.insert(TrieNode::default())
                        }
                    };
                    added |= child.add(abbrev, index + 1, index + 1);
                } else {
                    added |= self.add(abbrev, index, skip);
                }
                return added;
            }
            index += 1;
        }

        added
    }

    /// Record abbreviation `index` at every node a matching record could end at.
    fn insert(&mut self, index: usize, abbrev: &Abbrev) {
        let min_size = abbrev.min_record_size();

        for (pos, children) in self.successors.iter_mut() {
            if *pos < min_size {
                match abbrev.ops()[*pos] {
                    // A matching record always follows this edge, so it never ends here.
                    AbbrevOp::Literal(value) => {
                        if let Some(child) = children.get_mut(&value) {
                            child.insert(index, abbrev);
                            return;
                        }
                    }
                    _ => children
                        .values_mut()
                        .for_each(|child| child.insert(index, abbrev)),
                }
            } else if !abbrev.is_fixed_size() {
                // The record's value here may be an array element.
                children
                    .values_mut()
                    .for_each(|child| child.insert(index, abbrev));
            }
        }

        self.abbrevs.insert(index);
    }

    /// Follow `values` (a record's code, then its fields) down the trie, returning
    /// the deepest node reached.
    pub fn match_values(&self, values: &[u64]) -> &TrieNode {
        for (pos, children) in self.successors.iter() {
            match values.get(*pos) {
                Some(value) => {
                    if let Some(child) = children.get(value) {
                        return child.match_values(values);
                    }
                }
                None => break,
            }
        }

        self
    }

    /// Print this node (and, unless `local_only`, everything under it).
    pub fn print(
        &self,
        out: &mut dyn Write,
        indent: &str,
        abbrevs: &[Abbrev],
        local_only: bool,
    ) -> io::Result<()> {
        if !self.abbrevs.is_empty() {
            writeln!(out, "{}Abbreviations:", indent)?;
            for index in self.abbrevs.iter() {
                match abbrevs.get(*index) {
                    Some(abbrev) => writeln!(out, "{}  {} (abbrev #{})", indent, abbrev, index)?,
                    None => writeln!(out, "{}  ? (abbrev #{})", indent, index)?,
                }
            }
        }

        if local_only || self.successors.is_empty() {
            return Ok(());
        }

        writeln!(out, "{}Successor Map:", indent)?;
        let child_indent = format!("{}    ", indent);
        for (pos, children) in self.successors.iter() {
            for (value, child) in children.iter() {
                match pos {
                    0 => writeln!(out, "{}  Record.Code = {}", indent, value)?,
                    _ => writeln!(out, "{}  Record.Values[{}] = {}", indent, pos - 1, value)?,
                }
                child.print(out, &child_indent, abbrevs, false)?;
            }
        }

        Ok(())
    }
}

/// Returns the lookup key for a record with `num_values` values (code included).
pub fn lookup_key(num_values: usize) -> usize {
    num_values.min(VALUE_INDEX_CUTOFF + 1)
}

/// Returns the (inclusive) range of lookup keys `abbrev` may apply to.
fn key_range(abbrev: &Abbrev) -> (usize, usize) {
    let min = lookup_key(abbrev.min_record_size());
    let max = if abbrev.is_fixed_size() {
        min
    } else {
        VALUE_INDEX_CUTOFF + 1
    };
    (min, max)
}

/// Build the lookup tries for `abbrevs[initial..]`.
pub fn build_lookup_map(abbrevs: &[Abbrev], initial: usize) -> LookupMap {
    let mut map = LookupMap::new();

    // Adding one abbreviation can create nodes that an earlier one needs
    // to be added under, so repeat until nothing changes.
    loop {
        let mut added = false;
        for abbrev in abbrevs.iter().skip(initial) {
            let (min, max) = key_range(abbrev);
            for key in min..=max {
                let root = match map.entry(key) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        added = true;
                        e.insert(TrieNode::default())
                    }
                };
                added |= root.add(abbrev, 0, 0);
            }
        }

        if !added {
            break;
        }
    }

    for (index, abbrev) in abbrevs.iter().enumerate().skip(initial) {
        let (min, max) = key_range(abbrev);
        for key in min..=max {
            if let Some(root) = map.get_mut(&key) {
                root.insert(index, abbrev);
            }
        }
    }

    log::debug!("built {} lookup tries over {} abbreviations", map.len(), abbrevs.len());
    map
}

/// Print every trie in `map`, for the block `block_id`.
pub fn print_lookup_map(
    out: &mut dyn Write,
    block_id: u64,
    map: &LookupMap,
    abbrevs: &[Abbrev],
) -> io::Result<()> {
    writeln!(out, "------------------------------")?;
    writeln!(out, "Block {} abbreviation tries:", block_id)?;
    for (idx, (key, root)) in map.iter().enumerate() {
        if idx > 0 {
            writeln!(out, "-----")?;
        }
        writeln!(out, "Index {}:", key)?;
        root.print(out, "  ", abbrevs, false)?;
    }
    writeln!(out, "------------------------------")
}
