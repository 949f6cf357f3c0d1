//! Synthesizing new abbreviations from a file's distributions.
//!
//! Every (block, abbreviation, code, size) combination seen in the input is a
//! starting point. The abbreviation is unrolled to that size, and small changes
//! (a literal code, a literal value, narrower value encodings) are proposed. The
//! proposals that would apply to the most records are added to the block's table.

use std::collections::BTreeMap;
use std::io;

use pnacl_bitstream::{Abbrev, AbbrevOp};
use pnacl_support::VALUE_INDEX_CUTOFF;

use crate::abbrevs::{write_block_abbrev, BlockAbbrevs, BlockAbbrevsMap};
use crate::dist::{BlockElement, Dist, DistElement, SizeElement, ValueElement};

/// The widest VBR chunk size an abbreviation may use.
const MAX_VBR_WIDTH: u64 = 32;

/// An abbreviation with one operator per value of a record of a particular size.
#[derive(Clone, Debug)]
struct Unrolled {
    code_op: AbbrevOp,
    ops: Vec<AbbrevOp>,
    /// Operators past the unrolled size, kept when the record may be longer.
    more_ops: Vec<AbbrevOp>,
}

impl Unrolled {
    /// Unroll `abbrev` for records of `size` values (code included).
    ///
    /// Returns `None` if `abbrev` can't describe records of that size.
    fn new(abbrev: &Abbrev, size: usize, can_be_bigger: bool) -> Option<Self> {
        let ops = abbrev.ops();
        let mut next = 0;

        let unroll_op = |next: &mut usize| -> Option<AbbrevOp> {
            match ops.get(*next)? {
                // Arrays repeat their element for every remaining value.
                AbbrevOp::Array => ops.get(*next + 1).copied(),
                AbbrevOp::Blob => None,
                op => {
                    *next += 1;
                    Some(*op)
                }
            }
        };

        let code_op = unroll_op(&mut next)?;
        let mut unrolled = Vec::with_capacity(size.saturating_sub(1));
        for _ in 1..size {
            unrolled.push(unroll_op(&mut next)?);
        }

        let more_ops = if can_be_bigger {
            ops[next..].to_vec()
        } else {
            if next < ops.len() && ops[next] != AbbrevOp::Array {
                return None;
            }
            vec![]
        };

        Some(Self {
            code_op: code_op,
            ops: unrolled,
            more_ops: more_ops,
        })
    }

    /// Returns the (simplified) abbreviation this describes.
    fn restore(&self) -> Abbrev {
        let mut ops = Vec::with_capacity(1 + self.ops.len() + self.more_ops.len());
        ops.push(self.code_op);
        ops.extend_from_slice(&self.ops);
        ops.extend_from_slice(&self.more_ops);
        Abbrev::new(ops).simplify()
    }
}

/// Candidate abbreviations, with the number of records each is expected to apply to.
#[derive(Debug, Default)]
struct Candidates {
    counts: BTreeMap<(u64, Abbrev), u64>,
}

impl Candidates {
    /// Propose `unrolled` for `abbrevs`' block, returning whether it was accepted.
    fn add(&mut self, abbrevs: &BlockAbbrevs, unrolled: &Unrolled, count: u64) -> bool {
        let abbrev = unrolled.restore();
        if !abbrev.is_valid() || abbrevs.find(&abbrev).is_some() {
            return false;
        }

        *self
            .counts
            .entry((abbrevs.block_id(), abbrev))
            .or_insert(0) += count;
        true
    }

    /// Propose making the first value index (most important first) with a constant
    /// value into a literal of its most important constant.
    fn add_constant(&mut self, abbrevs: &BlockAbbrevs, unrolled: &Unrolled, size: &SizeElement) {
        for (index, elem) in size.indices().sorted_elements() {
            let index = index as usize;
            match unrolled.ops.get(index) {
                Some(op) if !op.is_literal() => {}
                _ => continue,
            }

            let constant = elem
                .values()
                .sorted_elements()
                .map(|(_, v)| (v.range(), v.count()))
                .find(|((lo, hi), _)| lo == hi);

            if let Some(((value, _), count)) = constant {
                let mut candidate = unrolled.clone();
                candidate.ops[index] = AbbrevOp::Literal(value);
                if self.add(abbrevs, &candidate, count) {
                    return;
                }
            }
        }
    }

    /// Propose re-encoding every Fixed or VBR value with the cheapest encoding
    /// for the values actually seen there.
    fn add_narrowed(&mut self, abbrevs: &BlockAbbrevs, unrolled: &Unrolled, size: &SizeElement) {
        let mut candidate = unrolled.clone();
        let mut changed = false;

        for (index, elem) in size.indices().elements() {
            let index = index as usize;
            if let Some(op) = candidate.ops.get_mut(index) {
                if let Some(narrowed) = narrow(*op, elem.values()) {
                    *op = narrowed;
                    changed = true;
                }
            }
        }

        if changed {
            self.add(abbrevs, &candidate, size.count());
        }
    }
}

/// Estimates the bits `op` needs for every value in `values`, treating each value
/// as the top of its range.
fn encoding_cost(op: AbbrevOp, values: &Dist<ValueElement>) -> Option<u64> {
    values
        .elements()
        .map(|(_, v)| op.scalar_bits(v.range().1).map(|bits| bits * v.count()))
        .sum()
}

/// Returns a cheaper Fixed or VBR encoding than `op` for `values`, if there is one.
fn narrow(op: AbbrevOp, values: &Dist<ValueElement>) -> Option<AbbrevOp> {
    if !matches!(op, AbbrevOp::Fixed(_) | AbbrevOp::Vbr(_)) {
        return None;
    }

    let current = encoding_cost(op, values)?;
    let max = values.elements().map(|(_, v)| v.range().1).max()?;
    let fixed_width = (64 - u64::from(max.leading_zeros())).max(1);

    std::iter::once(AbbrevOp::Fixed(fixed_width))
        .chain((2..=MAX_VBR_WIDTH).map(AbbrevOp::Vbr))
        .filter_map(|candidate| encoding_cost(candidate, values).map(|cost| (cost, candidate)))
        .min()
        .filter(|(cost, candidate)| *cost < current && *candidate != op)
        .map(|(_, candidate)| candidate)
}

/// Walk `dist`, proposing new abbreviations, and add the most widely applicable
/// ones to `map`.
///
/// With `trace`, the added abbreviations are printed to stderr.
pub fn add_candidates(dist: &Dist<BlockElement>, map: &mut BlockAbbrevsMap, trace: bool) {
    let mut candidates = Candidates::default();

    for (block_id, block) in dist.sorted_elements() {
        let abbrevs = match map.get(&block_id) {
            Some(abbrevs) => abbrevs,
            None => continue,
        };

        for (abbrev_index, abbrev_elem) in block.abbrevs().sorted_elements() {
            let abbrev = match abbrevs.get(abbrev_index as usize) {
                Some(abbrev) => abbrev,
                None => continue,
            };

            for (code, code_elem) in abbrev_elem.codes().sorted_elements() {
                for (size, size_elem) in code_elem.sizes().sorted_elements() {
                    let size_key = size as usize;
                    let unrolled = match Unrolled::new(
                        abbrev,
                        size_key + 1,
                        size_key >= VALUE_INDEX_CUTOFF,
                    ) {
                        Some(unrolled) => unrolled,
                        None => {
                            log::debug!(
                                "block {}: can't unroll {} to {} values",
                                block_id,
                                abbrev,
                                size_key + 1
                            );
                            continue;
                        }
                    };

                    if !unrolled.code_op.is_literal() {
                        let mut candidate = unrolled.clone();
                        candidate.code_op = AbbrevOp::Literal(code);
                        candidates.add(abbrevs, &candidate, size_elem.count());
                    }

                    candidates.add_constant(abbrevs, &unrolled, size_elem);
                    candidates.add_narrowed(abbrevs, &unrolled, size_elem);
                }
            }
        }
    }

    install(candidates, map, trace);
}

fn install(candidates: Candidates, map: &mut BlockAbbrevsMap, trace: bool) {
    let mut ranked: Vec<(u64, u64, Abbrev)> = candidates
        .counts
        .into_iter()
        .map(|((block_id, abbrev), count)| (count, block_id, abbrev))
        .collect();
    ranked.sort_by(|a, b| b.cmp(a));

    let min = match ranked.first() {
        Some((top, _, _)) => top >> 2,
        None => return,
    };

    let mut stderr = io::stderr();
    if trace {
        eprintln!("-- New abbreviations:");
    }

    for (count, block_id, abbrev) in ranked {
        if count < min {
            break;
        }

        if trace {
            eprint!("{:12}: ", count);
            // NOTE: Tracing is best-effort; a closed stderr isn't worth failing over.
            let _ = write_block_abbrev(&mut stderr, block_id, &abbrev);
        }

        log::debug!("block {}: new abbreviation {} ({} uses)", block_id, abbrev, count);
        if let Some(abbrevs) = map.get_mut(&block_id) {
            abbrevs.add_synthesized(abbrev);
        }
    }

    if trace {
        eprintln!("--");
    }
}
