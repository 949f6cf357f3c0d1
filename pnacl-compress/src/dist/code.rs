//! Distributions over record codes.

use std::io::{self, Write};

use pnacl_support::names::code_name;

use crate::dist::{
    percent, write_bits_stats, write_count_stats, write_nested_dist, Dist, DistElement,
    SizeElement,
};
use crate::unroll::Record;

/// Counts the records with one code, their bits, and how many were abbreviated.
#[derive(Debug)]
pub struct CodeElement {
    count: u64,
    bits: u64,
    num_abbrevs: u64,
    sizes: Dist<SizeElement>,
}

impl CodeElement {
    /// Returns the total bits these records took up.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Returns how many of these records were read with an abbreviation.
    pub fn num_abbrevs(&self) -> u64 {
        self.num_abbrevs
    }

    /// Returns the distribution of these records' sizes.
    pub fn sizes(&self) -> &Dist<SizeElement> {
        &self.sizes
    }
}

impl DistElement for CodeElement {
    type Item = Record;
    /// The block ID the records belong to.
    type Context = u64;

    const TITLE: &'static str = "Record Histogram:";
    const VALUE_HEADER: &'static str = "Record Kind";

    fn create(_context: &u64, _key: u64) -> Self {
        Self {
            count: 0,
            bits: 0,
            num_abbrevs: 0,
            sizes: Dist::new(()),
        }
    }

    fn key_list(_context: &u64, record: &Record) -> Vec<u64> {
        vec![record.code]
    }

    fn add(&mut self, record: &Record) {
        self.count += 1;
        self.bits += record.bits;
        if record.used_abbrev() {
            self.num_abbrevs += 1;
        }
        self.sizes.add(record);
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn write_stats_header(out: &mut dyn Write) -> io::Result<()> {
        write!(out, "   Count %Count    # Bits    Bits/Elmt   % Abv")
    }

    fn write_stats(&self, out: &mut dyn Write, dist: &Dist<Self>) -> io::Result<()> {
        write_count_stats(out, self.count, dist.total())?;
        write_bits_stats(out, self.bits, self.count)?;
        if self.num_abbrevs > 0 {
            write!(
                out,
                " {:7.2}",
                percent(self.num_abbrevs as f64, self.count as f64)
            )
        } else {
            write!(out, "        ")
        }
    }

    fn write_value(&self, out: &mut dyn Write, block_id: &u64, key: u64) -> io::Result<()> {
        write!(out, "{}", code_name(*block_id, key))
    }

    fn write_nested(&self, out: &mut dyn Write, indent: &str) -> io::Result<bool> {
        let mut printed = false;
        write_nested_dist(out, indent, &self.sizes, &mut printed)?;
        Ok(printed)
    }
}
