//! Nested frequency distributions over a bitcode file's blocks and records.
//!
//! A [`Dist`] maps keys (block IDs, abbreviation indices, record codes, ...) to
//! elements that count what was added under that key. Elements may own further
//! distributions, giving the Block → Abbrev → Code → Size → ValueIndex → Value
//! tree that candidate synthesis walks.

pub mod abbrev;
pub mod block;
pub mod code;
pub mod size;
pub mod value;

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::io::{self, Write};

pub use self::abbrev::AbbrevElement;
pub use self::block::{block_dist, write_abbrev_frequencies, BlockElement};
pub use self::code::CodeElement;
pub use self::size::SizeElement;
pub use self::value::{range_index, value_range, ValueElement, ValueIndexElement};

/// The kind-specific behavior of a distribution's elements.
pub trait DistElement: Sized {
    /// The thing added to the distribution.
    type Item: ?Sized;

    /// Per-distribution state that elements and keys are derived from.
    type Context;

    /// The title printed above the distribution.
    const TITLE: &'static str;

    /// The header of the column holding each element's value.
    const VALUE_HEADER: &'static str;

    /// Create an empty element for `key`.
    fn create(context: &Self::Context, key: u64) -> Self;

    /// Returns the keys of the elements that `item` contributes to.
    fn key_list(context: &Self::Context, item: &Self::Item) -> Vec<u64>;

    /// Count `item` in this element (and any nested distributions).
    fn add(&mut self, item: &Self::Item);

    /// Returns the number of items counted.
    fn count(&self) -> u64;

    /// Returns the weight used when sorting; zero-weight elements are left out.
    fn importance(&self) -> f64 {
        self.count() as f64
    }

    /// Write the headers of the statistics columns.
    fn write_stats_header(out: &mut dyn Write) -> io::Result<()> {
        write!(out, "   Count %Count")
    }

    /// Write this element's statistics columns.
    fn write_stats(&self, out: &mut dyn Write, dist: &Dist<Self>) -> io::Result<()> {
        write_count_stats(out, self.count(), dist.total())
    }

    /// Write this element's value column.
    fn write_value(&self, out: &mut dyn Write, _context: &Self::Context, key: u64) -> io::Result<()> {
        write!(out, "{:7}", key)
    }

    /// Write any nested distributions, returning whether anything was written.
    fn write_nested(&self, _out: &mut dyn Write, _indent: &str) -> io::Result<bool> {
        Ok(false)
    }
}

/// Write the `Count` and `%Count` columns.
pub fn write_count_stats(out: &mut dyn Write, count: u64, total: u64) -> io::Result<()> {
    write!(out, "{:8} {:6.2}", count, percent(count as f64, total as f64))
}

/// Write the `# Bits` and `Bits/Elmt` columns.
pub fn write_bits_stats(out: &mut dyn Write, bits: u64, count: u64) -> io::Result<()> {
    write!(out, " {:9} {:12.2}", bits, bits as f64 / count.max(1) as f64)
}

pub(crate) fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Print `dist` as a nested distribution, preceded by a blank line if it's the
/// first one printed for its parent element.
pub(crate) fn write_nested_dist<E: DistElement>(
    out: &mut dyn Write,
    indent: &str,
    dist: &Dist<E>,
    printed: &mut bool,
) -> io::Result<()> {
    if dist.is_empty() {
        return Ok(());
    }

    if !*printed {
        writeln!(out)?;
        *printed = true;
    }

    dist.print(out, &format!("{}    ", indent))?;
    writeln!(out)
}

/// A distribution: elements keyed by `u64`, with a cached importance ranking.
#[derive(Debug)]
pub struct Dist<E: DistElement> {
    context: E::Context,
    elements: BTreeMap<u64, E>,
    total: u64,
    sorted: OnceCell<Vec<(f64, u64)>>,
}

impl<E: DistElement> Dist<E> {
    /// Create an empty distribution.
    pub fn new(context: E::Context) -> Self {
        Self {
            context: context,
            elements: BTreeMap::new(),
            total: 0,
            sorted: OnceCell::new(),
        }
    }

    /// Returns the context this distribution was created with.
    pub fn context(&self) -> &E::Context {
        &self.context
    }

    /// Add `item` to every element its key list names.
    ///
    /// Items with an empty key list are ignored.
    pub fn add(&mut self, item: &E::Item) {
        let keys = E::key_list(&self.context, item);
        if keys.is_empty() {
            return;
        }

        self.sorted = OnceCell::new();
        let context = &self.context;
        for key in keys {
            self.elements
                .entry(key)
                .or_insert_with(|| E::create(context, key))
                .add(item);
        }
        self.total += 1;
    }

    /// Returns the number of items that contributed to this distribution.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns the element for `key`, if any.
    pub fn get(&self, key: u64) -> Option<&E> {
        self.elements.get(&key)
    }

    /// Returns every element, in key order.
    pub fn elements(&self) -> impl Iterator<Item = (u64, &E)> + '_ {
        self.elements.iter().map(|(k, e)| (*k, e))
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns `(importance, key)` for every element of nonzero importance, most
    /// important first. Equally important elements stay in key order.
    pub fn sorted(&self) -> &[(f64, u64)] {
        self.sorted.get_or_init(|| {
            let mut sorted: Vec<(f64, u64)> = self
                .elements
                .iter()
                .map(|(key, elem)| (elem.importance(), *key))
                .filter(|(importance, _)| *importance != 0.0)
                .collect();

            sorted.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            sorted
        })
    }

    /// Returns the keys of [`sorted`](Dist::sorted) along with their elements.
    pub fn sorted_elements(&self) -> impl Iterator<Item = (u64, &E)> + '_ {
        self.sorted()
            .iter()
            .filter_map(move |(_, key)| self.elements.get(key).map(|e| (*key, e)))
    }

    fn write_header(&self, out: &mut dyn Write, indent: &str) -> io::Result<()> {
        write!(out, "{}", indent)?;
        E::write_stats_header(out)?;
        writeln!(out, " {}", E::VALUE_HEADER)
    }

    /// Print this distribution, most important elements first.
    pub fn print(&self, out: &mut dyn Write, indent: &str) -> io::Result<()> {
        write!(out, "{}{} ({} elements):\n\n", indent, E::TITLE, self.len())?;
        self.write_header(out, indent)?;

        let mut needs_header = false;
        for (key, elem) in self.sorted_elements() {
            if needs_header {
                writeln!(out, "{}  {} (continued)", indent, E::TITLE)?;
                self.write_header(out, indent)?;
            }

            write!(out, "{}", indent)?;
            elem.write_stats(out, self)?;
            write!(out, " ")?;
            elem.write_value(out, &self.context, key)?;
            writeln!(out)?;

            needs_header = elem.write_nested(out, indent)?;
        }

        Ok(())
    }
}
