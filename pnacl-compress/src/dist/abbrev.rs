//! Distributions over the abbreviations records were read with.

use std::io::{self, Write};

use crate::dist::{write_nested_dist, CodeElement, Dist, DistElement};
use crate::unroll::Record;

/// Counts the records read with one abbreviation (by table index).
#[derive(Debug)]
pub struct AbbrevElement {
    count: u64,
    codes: Dist<CodeElement>,
}

impl AbbrevElement {
    /// Returns the distribution of these records' codes.
    pub fn codes(&self) -> &Dist<CodeElement> {
        &self.codes
    }
}

impl DistElement for AbbrevElement {
    type Item = Record;
    /// The block ID the records belong to.
    type Context = u64;

    const TITLE: &'static str = "Abbreviation Indices";
    const VALUE_HEADER: &'static str = "  Index";

    fn create(block_id: &u64, _key: u64) -> Self {
        Self {
            count: 0,
            codes: Dist::new(*block_id),
        }
    }

    fn key_list(_context: &u64, record: &Record) -> Vec<u64> {
        vec![record.abbrev_index as u64]
    }

    fn add(&mut self, record: &Record) {
        self.count += 1;
        self.codes.add(record);
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn write_nested(&self, out: &mut dyn Write, indent: &str) -> io::Result<bool> {
        let mut printed = false;
        write_nested_dist(out, indent, &self.codes, &mut printed)?;
        Ok(printed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_indices() {
        let mut abbrevs: Dist<AbbrevElement> = Dist::new(12);
        for (code, index) in &[(1, 3), (1, 4), (2, 4), (2, 4)] {
            abbrevs.add(&Record {
                code: *code,
                fields: vec![],
                abbrev_index: *index,
                bits: 8,
            });
        }

        assert_eq!(abbrevs.sorted()[0].1, 4);
        let four = abbrevs.get(4).unwrap();
        assert_eq!(four.count(), 3);
        assert_eq!(*four.codes().context(), 12);
        assert_eq!(four.codes().get(2).unwrap().count(), 2);
    }
}
