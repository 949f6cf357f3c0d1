//! Distributions over record sizes.

use std::io::{self, Write};

use pnacl_support::VALUE_INDEX_CUTOFF;

use crate::dist::{write_nested_dist, Dist, DistElement, ValueIndexElement};
use crate::unroll::Record;

/// Counts the records with a given number of fields. Every record with
/// [`VALUE_INDEX_CUTOFF`] or more fields shares one element.
#[derive(Debug)]
pub struct SizeElement {
    count: u64,
    indices: Dist<ValueIndexElement>,
}

impl SizeElement {
    /// Returns the distribution of values by field index.
    pub fn indices(&self) -> &Dist<ValueIndexElement> {
        &self.indices
    }
}

impl DistElement for SizeElement {
    type Item = Record;
    type Context = ();

    const TITLE: &'static str = "Record sizes";
    const VALUE_HEADER: &'static str = "   Size";

    fn create(_context: &(), _key: u64) -> Self {
        Self {
            count: 0,
            indices: Dist::new(()),
        }
    }

    fn key_list(_context: &(), record: &Record) -> Vec<u64> {
        vec![record.fields.len().min(VALUE_INDEX_CUTOFF) as u64]
    }

    fn add(&mut self, record: &Record) {
        self.count += 1;
        self.indices.add(record);
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn write_value(&self, out: &mut dyn Write, _context: &(), key: u64) -> io::Result<()> {
        write!(out, "{:7}", key)?;
        if key >= VALUE_INDEX_CUTOFF as u64 {
            write!(out, "+")?;
        }
        Ok(())
    }

    fn write_nested(&self, out: &mut dyn Write, indent: &str) -> io::Result<bool> {
        let mut printed = false;
        write_nested_dist(out, indent, &self.indices, &mut printed)?;
        Ok(printed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(len: usize) -> Record {
        Record {
            code: 1,
            fields: vec![1; len],
            abbrev_index: 3,
            bits: 0,
        }
    }

    #[test]
    fn test_sizes() {
        let mut sizes: Dist<SizeElement> = Dist::new(());
        for len in &[0, 1, 1, 6, 9] {
            sizes.add(&record(*len));
        }

        assert_eq!(sizes.total(), 5);
        assert_eq!(sizes.get(0).unwrap().count(), 1);
        assert_eq!(sizes.get(1).unwrap().count(), 2);
        assert_eq!(sizes.get(6).unwrap().count(), 2);
        assert!(sizes.get(0).unwrap().indices().is_empty());
        assert_eq!(sizes.get(6).unwrap().indices().len(), 6);
    }

    #[test]
    fn test_print_nested() {
        let mut sizes: Dist<SizeElement> = Dist::new(());
        sizes.add(&record(0));
        sizes.add(&record(0));
        sizes.add(&record(7));

        let mut out = vec![];
        sizes.print(&mut out, "").unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with(
            "Record sizes (2 elements):\n\n   Count %Count    Size\n       2  66.67       0\n       1  33.33       6+\n\n"
        ));
        assert!(out.contains("    Value indices (6 elements):\n"));
        assert!(out.contains("        Values (1 elements):\n"));
    }
}
