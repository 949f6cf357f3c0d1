//! Distributions over record field values, by field index.

use std::io::{self, Write};

use pnacl_support::VALUE_INDEX_CUTOFF;

use crate::dist::{write_nested_dist, Dist, DistElement};
use crate::unroll::Record;

/// Values below this are tracked individually; larger ones fall into ranges.
const SINGLETON_CUTOFF: u64 = 64;

/// The (exclusive) upper bounds of the value ranges past the singletons.
const RANGE_CUTOFFS: [u64; 5] = [1 << 8, 1 << 12, 1 << 16, 1 << 24, 1 << 32];

/// Returns the index of the range that `value` falls into.
pub fn range_index(value: u64) -> u64 {
    if value < SINGLETON_CUTOFF {
        return value;
    }

    let bucket = RANGE_CUTOFFS
        .iter()
        .position(|cutoff| value < *cutoff)
        .unwrap_or(RANGE_CUTOFFS.len());
    SINGLETON_CUTOFF + bucket as u64
}

/// Returns the (inclusive) bounds of the range with index `index`.
pub fn value_range(index: u64) -> (u64, u64) {
    if index < SINGLETON_CUTOFF {
        return (index, index);
    }

    let bucket = (index - SINGLETON_CUTOFF) as usize;
    let lo = match bucket {
        0 => SINGLETON_CUTOFF,
        _ => RANGE_CUTOFFS[(bucket - 1).min(RANGE_CUTOFFS.len() - 1)],
    };
    let hi = RANGE_CUTOFFS.get(bucket).map_or(u64::MAX, |cutoff| cutoff - 1);
    (lo, hi)
}

/// Counts the values (by range) seen at one field index.
#[derive(Debug)]
pub struct ValueElement {
    count: u64,
    range: u64,
}

impl DistElement for ValueElement {
    type Item = Record;
    /// The field index whose values are counted.
    type Context = usize;

    const TITLE: &'static str = "Values";
    const VALUE_HEADER: &'static str = "Value / Range";

    fn create(_context: &usize, key: u64) -> Self {
        Self {
            count: 0,
            range: key,
        }
    }

    fn key_list(context: &usize, record: &Record) -> Vec<u64> {
        record
            .fields
            .get(*context)
            .map(|value| vec![range_index(*value)])
            .unwrap_or_default()
    }

    fn add(&mut self, _record: &Record) {
        self.count += 1;
    }

    fn count(&self) -> u64 {
        self.count
    }

    /// Counts are spread over the width of the range, so that a range of many
    /// distinct values ranks below a single frequent value.
    fn importance(&self) -> f64 {
        let (lo, hi) = value_range(self.range);
        self.count as f64 / ((hi - lo) as f64 + 1.0)
    }

    fn write_value(&self, out: &mut dyn Write, _context: &usize, key: u64) -> io::Result<()> {
        match value_range(key) {
            (lo, hi) if lo == hi => write!(out, "{}", lo),
            (lo, hi) => write!(out, "{} .. {}", lo, hi),
        }
    }
}

impl ValueElement {
    /// Returns the range this element counts.
    pub fn range(&self) -> (u64, u64) {
        value_range(self.range)
    }
}

/// Counts the records that have a field at one index, and the values found there.
#[derive(Debug)]
pub struct ValueIndexElement {
    count: u64,
    values: Dist<ValueElement>,
}

impl ValueIndexElement {
    /// Returns the distribution of values at this index.
    pub fn values(&self) -> &Dist<ValueElement> {
        &self.values
    }
}

impl DistElement for ValueIndexElement {
    type Item = Record;
    type Context = ();

    const TITLE: &'static str = "Value indices";
    const VALUE_HEADER: &'static str = "  Index";

    fn create(_context: &(), key: u64) -> Self {
        Self {
            count: 0,
            values: Dist::new(key as usize),
        }
    }

    fn key_list(_context: &(), record: &Record) -> Vec<u64> {
        (0..record.fields.len().min(VALUE_INDEX_CUTOFF) as u64).collect()
    }

    fn add(&mut self, record: &Record) {
        self.count += 1;
        self.values.add(record);
    }

    fn count(&self) -> u64 {
        self.count
    }

    /// Indices whose values cluster tightly rank first.
    fn importance(&self) -> f64 {
        self.values
            .elements()
            .map(|(_, v)| v.importance() * v.importance())
            .sum()
    }

    fn write_nested(&self, out: &mut dyn Write, indent: &str) -> io::Result<bool> {
        let mut printed = false;
        write_nested_dist(out, indent, &self.values, &mut printed)?;
        Ok(printed)
    }
}
