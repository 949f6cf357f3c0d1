//! `pnacl-compress` analyzes PNaCl bitcode files and rewrites them with better
//! abbreviations.
//!
//! Compression runs in three passes over an [`UnrolledBitcode`]: analysis
//! (abbreviations and [distributions](dist)), synthesis of new
//! [candidate](candidates) abbreviations, and [selection](select) of the best
//! abbreviation for every record before the file is [copied](copy) back out.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

pub mod abbrevs;
pub mod candidates;
pub mod copy;
pub mod dist;
pub mod error;
pub mod select;
pub mod trie;
pub mod unroll;

use std::io::Write;

pub use crate::abbrevs::{BlockAbbrevs, BlockAbbrevsMap};
pub use crate::error::Error;
pub use crate::unroll::UnrolledBitcode;

/// What the compressor prints and how it writes its output.
#[derive(Clone, Debug, Default)]
pub struct CompressFlags {
    /// Print every abbreviation as it's read, and the ones synthesized, to stderr.
    pub trace_abbreviations: bool,
    /// Print the distribution tree instead of compressing.
    pub show_distributions: bool,
    /// Print the abbreviation lookup tries instead of compressing.
    pub show_lookup_tries: bool,
    /// Print how often each input abbreviation is used instead of compressing.
    pub show_abbreviation_frequencies: bool,
    /// Write every record unabbreviated.
    pub remove_abbreviations: bool,
}

/// Analyzes and compresses bitcode files.
#[derive(Debug)]
pub struct Compressor {
    flags: CompressFlags,
}

impl Compressor {
    /// Create a new `Compressor` with the given flags.
    pub fn new(flags: CompressFlags) -> Self {
        Self { flags: flags }
    }

    /// Returns whether these flags ask for diagnostics rather than bitcode.
    pub fn is_analysis_only(&self) -> bool {
        self.flags.show_distributions
            || self.flags.show_lookup_tries
            || self.flags.show_abbreviation_frequencies
    }

    /// Write the requested diagnostics for the bitcode in `input` to `out`.
    pub fn analyze(&self, input: &[u8], out: &mut dyn Write) -> Result<(), Error> {
        let mut map = BlockAbbrevsMap::new();
        let bitcode = UnrolledBitcode::unroll(input, &mut map, self.flags.trace_abbreviations)?;
        let dist = dist::block_dist(&bitcode);

        if self.flags.show_abbreviation_frequencies {
            dist::write_abbrev_frequencies(out, &dist, &map)?;
        }
        if self.flags.show_distributions {
            dist.print(out, "")?;
        }

        if self.flags.show_lookup_tries {
            candidates::add_candidates(&dist, &mut map, self.flags.trace_abbreviations);
            for abbrevs in map.values_mut() {
                abbrevs.build_lookup();
                abbrevs.print_lookup(out)?;
            }
        }

        Ok(())
    }

    /// Compress the bitcode in `input`, returning the new file.
    ///
    /// New abbreviations are synthesized (and traced) even when
    /// [`remove_abbreviations`](CompressFlags::remove_abbreviations) discards them
    /// from the output.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>, Error> {
        let mut map = BlockAbbrevsMap::new();
        let bitcode = UnrolledBitcode::unroll(input, &mut map, self.flags.trace_abbreviations)?;

        let dist = dist::block_dist(&bitcode);
        candidates::add_candidates(&dist, &mut map, self.flags.trace_abbreviations);

        if self.flags.remove_abbreviations {
            log::debug!("writing every record unabbreviated");
            return copy::copy_bitcode(&bitcode, None);
        }

        for abbrevs in map.values_mut() {
            abbrevs.build_lookup();
        }

        let mut selection = select::choose_abbrevs(&bitcode, &map);
        let output = copy::copy_bitcode(&bitcode, Some(&mut selection))?;
        log::debug!("compressed {} bytes to {}", input.len(), output.len());

        Ok(output)
    }
}
