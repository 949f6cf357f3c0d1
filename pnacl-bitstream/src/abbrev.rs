//! Abbreviation definitions, and abbreviated record reading and writing.

use std::cmp::Ordering;
use std::convert::{From, TryFrom, TryInto};
use std::fmt;

use pnacl_bitcursor::{vbr_bit_size, BitCursor, BitWriter};
use pnacl_support::bitcodes::{AbbrevOpEnc, ReservedAbbrevId};
use pnacl_support::{char6_decode, char6_encode};

use crate::error::Error;

/// An abbreviation ID, whether reserved or defined by the stream itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AbbrevId {
    /// A reserved abbreviation ID.
    Reserved(ReservedAbbrevId),
    /// An abbreviation ID that's been defined within the stream.
    Defined(u64),
}

impl From<u64> for AbbrevId {
    fn from(value: u64) -> Self {
        ReservedAbbrevId::try_from(value)
            .map_or_else(|_| AbbrevId::Defined(value), AbbrevId::Reserved)
    }
}

/// A single abbreviation operator.
///
/// `Array` takes its element encoding from the operator that follows it, so an
/// abbreviation is a flat list such as `[Literal(5), Array, Vbr(6)]`.
/// Operators are ordered by kind (in declaration order), then by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AbbrevOp {
    /// A constant operand, which takes no bits.
    Literal(u64),
    /// A fixed-width field of the given width.
    Fixed(u64),
    /// A VBR field with chunks of the given width.
    Vbr(u64),
    /// A VBR6 element count, followed by that many elements.
    Array,
    /// A single 6-bit character.
    Char6,
    /// A VBR6 length, followed by 32-bit aligned bytes.
    Blob,
}

impl AbbrevOp {
    /// Returns whether this operator is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, AbbrevOp::Literal(_))
    }

    /// Returns whether this operator is an encoding (i.e., anything but a literal).
    pub fn is_encoding(&self) -> bool {
        !self.is_literal()
    }

    /// Returns this operator's literal value, if it is one.
    pub fn literal_value(&self) -> Option<u64> {
        match self {
            AbbrevOp::Literal(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns this operator's encoding, if it has one.
    pub fn encoding(&self) -> Option<AbbrevOpEnc> {
        Some(match self {
            AbbrevOp::Literal(_) => return None,
            AbbrevOp::Fixed(_) => AbbrevOpEnc::Fixed,
            AbbrevOp::Vbr(_) => AbbrevOpEnc::Vbr,
            AbbrevOp::Array => AbbrevOpEnc::Array,
            AbbrevOp::Char6 => AbbrevOpEnc::Char6,
            AbbrevOp::Blob => AbbrevOpEnc::Blob,
        })
    }

    /// Returns how many of the following operators belong to this one.
    pub fn num_arguments(&self) -> usize {
        match self {
            AbbrevOp::Array => 1,
            _ => 0,
        }
    }

    /// Returns whether this operator encodes exactly one value by itself.
    ///
    /// Only these operators may be array elements.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            AbbrevOp::Literal(_) | AbbrevOp::Fixed(_) | AbbrevOp::Vbr(_) | AbbrevOp::Char6
        )
    }

    /// Returns the number of bits this (scalar) operator needs for `value`, or
    /// `None` if it can't represent it.
    pub fn scalar_bits(&self, value: u64) -> Option<u64> {
        match self {
            AbbrevOp::Literal(literal) => (*literal == value).then(|| 0),
            AbbrevOp::Fixed(0) | AbbrevOp::Vbr(0) => (value == 0).then(|| 0),
            AbbrevOp::Fixed(width) => {
                // Fixed fields never carry more than 32 significant bits.
                if value >> 32 != 0 || (*width < 64 && value >> *width != 0) {
                    None
                } else {
                    Some(*width)
                }
            }
            AbbrevOp::Vbr(width) => Some(vbr_bit_size(value, *width as usize) as u64),
            AbbrevOp::Char6 => char6_encode(value).map(|_| 6),
            AbbrevOp::Array | AbbrevOp::Blob => None,
        }
    }

    fn read_scalar<T: AsRef<[u8]>>(&self, cur: &mut BitCursor<T>) -> Result<u64, Error> {
        Ok(match self {
            AbbrevOp::Literal(value) => *value,
            AbbrevOp::Fixed(0) | AbbrevOp::Vbr(0) => 0,
            AbbrevOp::Fixed(width) => cur.read(*width as usize)?,
            AbbrevOp::Vbr(width) => cur.read_vbr(*width as usize)?,
            AbbrevOp::Char6 => {
                // Unwrap safety: every 6-bit value is a valid Char6 index.
                #[allow(clippy::unwrap_used)]
                let c = char6_decode(cur.read(6)?).unwrap();
                c as u64
            }
            AbbrevOp::Array | AbbrevOp::Blob => {
                return Err(Error::AbbrevParse(format!("{} is not a scalar operand", self)))
            }
        })
    }

    fn write_scalar(&self, writer: &mut BitWriter, value: u64) -> Result<(), Error> {
        if self.scalar_bits(value).is_none() {
            return Err(Error::Unencodable(format!(
                "operand {} can't encode {}",
                self, value
            )));
        }

        match self {
            AbbrevOp::Literal(_) | AbbrevOp::Fixed(0) | AbbrevOp::Vbr(0) => {}
            AbbrevOp::Fixed(width) => writer.emit(value, *width as usize)?,
            AbbrevOp::Vbr(width) => writer.emit_vbr(value, *width as usize)?,
            // Unwrap safety: `scalar_bits` succeeded, so `value` is a Char6 character.
            #[allow(clippy::unwrap_used)]
            AbbrevOp::Char6 => writer.emit(char6_encode(value).unwrap(), 6)?,
            AbbrevOp::Array | AbbrevOp::Blob => unreachable!(),
        }

        Ok(())
    }

    /// Read one (non-literal) operator of a `DEFINE_ABBREV` body.
    fn read_encoding<T: AsRef<[u8]>>(cur: &mut BitCursor<T>) -> Result<Self, Error> {
        let enc: AbbrevOpEnc = cur.read(3)?.try_into()?;
        Ok(match enc {
            AbbrevOpEnc::Fixed | AbbrevOpEnc::Vbr => {
                let width = cur.read_vbr(5)?;

                // A zero-width field is just a zero literal.
                if width == 0 {
                    return Ok(AbbrevOp::Literal(0));
                }

                if enc == AbbrevOpEnc::Fixed {
                    if width > 63 {
                        return Err(Error::AbbrevParse(format!("fixed width too large: {}", width)));
                    }
                    AbbrevOp::Fixed(width)
                } else {
                    if !(2..=32).contains(&width) {
                        return Err(Error::AbbrevParse(format!("invalid VBR width: {}", width)));
                    }
                    AbbrevOp::Vbr(width)
                }
            }
            AbbrevOpEnc::Array => AbbrevOp::Array,
            AbbrevOpEnc::Char6 => AbbrevOp::Char6,
            AbbrevOpEnc::Blob => AbbrevOp::Blob,
        })
    }

    fn write_definition(&self, writer: &mut BitWriter) -> Result<(), Error> {
        match self {
            AbbrevOp::Literal(value) => {
                writer.emit(1, 1)?;
                writer.emit_vbr(*value, 8)?;
            }
            _ => {
                writer.emit(0, 1)?;
                // Unwrap safety: only literals lack an encoding.
                #[allow(clippy::unwrap_used)]
                let enc = self.encoding().unwrap();
                writer.emit(u64::from(enc), 3)?;
                if let AbbrevOp::Fixed(width) | AbbrevOp::Vbr(width) = self {
                    writer.emit_vbr(*width, 5)?;
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for AbbrevOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbbrevOp::Literal(value) => write!(f, "{}", value),
            AbbrevOp::Fixed(width) => write!(f, "Fixed({})", width),
            AbbrevOp::Vbr(width) => write!(f, "VBR({})", width),
            AbbrevOp::Array => write!(f, "Array"),
            AbbrevOp::Char6 => write!(f, "Char6"),
            AbbrevOp::Blob => write!(f, "Blob"),
        }
    }
}

/// An abbreviation: the operators that describe one record shape.
///
/// The first value an abbreviation encodes is the record's code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Abbrev {
    ops: Vec<AbbrevOp>,
}

impl Abbrev {
    /// Create an abbreviation from its operators.
    pub fn new(ops: Vec<AbbrevOp>) -> Self {
        Self { ops: ops }
    }

    /// Returns this abbreviation's operators.
    pub fn ops(&self) -> &[AbbrevOp] {
        &self.ops
    }

    /// Returns the number of operators in this abbreviation.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether this abbreviation has no operators.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parse the body of a `DEFINE_ABBREV` record.
    ///
    /// Assumes that the `DEFINE_ABBREV` ID has already been consumed.
    pub fn read<T: AsRef<[u8]>>(cur: &mut BitCursor<T>) -> Result<Self, Error> {
        // [DEFINE_ABBREV, VBR5:numabbrevops, abbrevop0, abbrevop1, ...]
        let num_ops = cur.read_vbr(5)? as usize;
        if num_ops < 1 {
            return Err(Error::AbbrevParse(
                "expected at least one abbrev operand".into(),
            ));
        }

        log::debug!("DEFINE_ABBREV: expecting {} operands", num_ops);

        let mut ops = Vec::with_capacity(num_ops);
        for idx in 0..num_ops {
            // Each operand starts with a bit that says whether it's a literal (a VBR8).
            let op = if cur.read(1)? == 1 {
                AbbrevOp::Literal(cur.read_vbr(8)?)
            } else {
                AbbrevOp::read_encoding(cur)?
            };

            match op {
                AbbrevOp::Array if idx + 2 != num_ops => {
                    return Err(Error::AbbrevParse("array operand at invalid index".into()));
                }
                AbbrevOp::Blob if idx + 1 != num_ops => {
                    return Err(Error::AbbrevParse("blob operand at invalid index".into()));
                }
                _ => {}
            }

            if let Some(AbbrevOp::Array) = ops.last() {
                if op.is_literal() || !op.is_scalar() {
                    return Err(Error::AbbrevParse(format!(
                        "invalid element type for an array: {}",
                        op
                    )));
                }
            }

            ops.push(op);
        }

        Ok(Self::new(ops))
    }

    /// Emit the body of a `DEFINE_ABBREV` record (everything after the abbreviation ID).
    pub fn write(&self, writer: &mut BitWriter) -> Result<(), Error> {
        writer.emit_vbr(self.ops.len() as u64, 5)?;
        for op in self.ops.iter() {
            op.write_definition(writer)?;
        }
        Ok(())
    }

    /// Read the values of a record encoded with this abbreviation.
    ///
    /// The values are flattened: array elements, Char6 characters and blob bytes each
    /// become one value. The first value is the record's code.
    pub fn read_values<T: AsRef<[u8]>>(&self, cur: &mut BitCursor<T>) -> Result<Vec<u64>, Error> {
        let mut values = Vec::with_capacity(self.ops.len());

        let mut ops = self.ops.iter();
        while let Some(op) = ops.next() {
            match op {
                AbbrevOp::Array => {
                    let elem = ops.next().ok_or_else(|| {
                        Error::AbbrevParse("array operand without element type".into())
                    })?;
                    let count = cur.read_vbr(6)?;
                    for _ in 0..count {
                        values.push(elem.read_scalar(cur)?);
                    }
                }
                AbbrevOp::Blob => {
                    let len = cur.read_vbr(6)?;
                    cur.align32();
                    for _ in 0..len {
                        values.push(cur.read(8)?);
                    }
                    cur.align32();
                }
                _ => values.push(op.read_scalar(cur)?),
            }
        }

        Ok(values)
    }

    /// Emit `values` (starting with the record code) as encoded by this abbreviation.
    ///
    /// The abbreviation ID must already have been emitted.
    pub fn write_values(&self, writer: &mut BitWriter, values: &[u64]) -> Result<(), Error> {
        let mut remaining = values;

        let mut ops = self.ops.iter();
        while let Some(op) = ops.next() {
            match op {
                AbbrevOp::Array => {
                    let elem = ops.next().ok_or_else(|| {
                        Error::Unencodable("array operand without element type".into())
                    })?;
                    writer.emit_vbr(remaining.len() as u64, 6)?;
                    for value in remaining {
                        elem.write_scalar(writer, *value)?;
                    }
                    remaining = &[];
                }
                AbbrevOp::Blob => {
                    writer.emit_vbr(remaining.len() as u64, 6)?;
                    writer.align32();
                    for value in remaining {
                        if *value > 0xff {
                            return Err(Error::Unencodable(format!(
                                "blob byte out of range: {}",
                                value
                            )));
                        }
                        writer.emit(*value, 8)?;
                    }
                    writer.align32();
                    remaining = &[];
                }
                _ => {
                    let (value, rest) = remaining.split_first().ok_or_else(|| {
                        Error::Unencodable(format!("too few values for abbreviation {}", self))
                    })?;
                    op.write_scalar(writer, *value)?;
                    remaining = rest;
                }
            }
        }

        if !remaining.is_empty() {
            return Err(Error::Unencodable(format!(
                "too many values for abbreviation {}",
                self
            )));
        }

        Ok(())
    }

    /// Returns the number of bits needed to encode `values` (starting with the
    /// record code) with this abbreviation, not counting the abbreviation ID.
    ///
    /// Returns `None` if the abbreviation can't represent `values`. Blob sizes
    /// depend on stream alignment, so abbreviations with a blob always return `None`.
    pub fn encoded_bits(&self, values: &[u64]) -> Option<u64> {
        let mut bits = 0;
        let mut remaining = values;

        let mut ops = self.ops.iter();
        while let Some(op) = ops.next() {
            match op {
                AbbrevOp::Array => {
                    let elem = ops.next()?;
                    bits += vbr_bit_size(remaining.len() as u64, 6) as u64;
                    for value in remaining {
                        bits += elem.scalar_bits(*value)?;
                    }
                    remaining = &[];
                }
                AbbrevOp::Blob => return None,
                _ => {
                    let (value, rest) = remaining.split_first()?;
                    bits += op.scalar_bits(*value)?;
                    remaining = rest;
                }
            }
        }

        remaining.is_empty().then(|| bits)
    }

    /// Returns whether `values` (starting with the record code) can be written with
    /// this abbreviation.
    pub fn can_encode(&self, values: &[u64]) -> bool {
        match self.ops.split_last() {
            Some((AbbrevOp::Blob, head)) => {
                values.len() >= head.len()
                    && Abbrev::new(head.to_vec())
                        .encoded_bits(&values[..head.len()])
                        .is_some()
                    && values[head.len()..].iter().all(|v| *v <= 0xff)
            }
            _ => self.encoded_bits(values).is_some(),
        }
    }

    /// Returns a copy with any operators that directly precede an `Array` and
    /// match its element type folded into the array.
    pub fn simplify(&self) -> Self {
        let mut ops: Vec<AbbrevOp> = Vec::with_capacity(self.ops.len());
        for (idx, op) in self.ops.iter().enumerate() {
            if *op == AbbrevOp::Array {
                if let Some(elem) = self.ops.get(idx + 1) {
                    while ops.last() == Some(elem) {
                        ops.pop();
                    }
                }
            }
            ops.push(*op);
        }

        Self::new(ops)
    }

    /// Returns whether every `Array` operator is exactly second-to-last.
    pub fn is_valid(&self) -> bool {
        self.ops
            .iter()
            .enumerate()
            .all(|(idx, op)| *op != AbbrevOp::Array || idx + 2 == self.ops.len())
    }

    /// Returns whether every record this abbreviation encodes has the same number of values.
    pub fn is_fixed_size(&self) -> bool {
        !self
            .ops
            .iter()
            .any(|op| matches!(op, AbbrevOp::Array | AbbrevOp::Blob))
    }

    /// Returns the fewest values (including the code) a record encoded with this
    /// abbreviation can have.
    pub fn min_record_size(&self) -> usize {
        match self.ops.iter().position(|op| matches!(op, AbbrevOp::Array | AbbrevOp::Blob)) {
            Some(idx) => idx,
            None => self.ops.len(),
        }
    }

    fn fmt_expr(&self, f: &mut fmt::Formatter<'_>, idx: usize) -> Result<usize, fmt::Error> {
        let op = &self.ops[idx];
        write!(f, "{}", op)?;

        let mut next = idx + 1;
        let num_args = op.num_arguments();
        if num_args > 0 {
            write!(f, "(")?;
            for arg in 0..num_args {
                if next >= self.ops.len() {
                    break;
                }
                if arg > 0 {
                    write!(f, ", ")?;
                }
                next = self.fmt_expr(f, next)?;
            }
            write!(f, ")")?;
        }

        Ok(next)
    }
}

impl fmt::Display for Abbrev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut idx = 0;
        while idx < self.ops.len() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            idx = self.fmt_expr(f, idx)?;
        }
        write!(f, "]")
    }
}

impl PartialOrd for Abbrev {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shorter abbreviations order first; equal lengths order by operator.
impl Ord for Abbrev {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ops
            .len()
            .cmp(&other.ops.len())
            .then_with(|| self.ops.cmp(&other.ops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abbrev(ops: &[AbbrevOp]) -> Abbrev {
        Abbrev::new(ops.to_vec())
    }

    #[test]
    fn test_abbrev_id() {
        assert_eq!(
            AbbrevId::from(2),
            AbbrevId::Reserved(ReservedAbbrevId::DefineAbbrev)
        );
        assert_eq!(AbbrevId::from(4), AbbrevId::Defined(4));
    }

    #[test]
    fn test_op_classification() {
        assert!(AbbrevOp::Literal(3).is_literal());
        assert!(!AbbrevOp::Literal(3).is_encoding());
        assert_eq!(AbbrevOp::Literal(3).encoding(), None);
        assert_eq!(AbbrevOp::Vbr(6).encoding(), Some(AbbrevOpEnc::Vbr));
        assert_eq!(AbbrevOp::Array.num_arguments(), 1);
        assert_eq!(AbbrevOp::Blob.num_arguments(), 0);

        assert!(AbbrevOp::Literal(100) < AbbrevOp::Fixed(1));
        assert!(AbbrevOp::Fixed(8) < AbbrevOp::Vbr(2));
        assert!(AbbrevOp::Vbr(6) < AbbrevOp::Vbr(8));
        assert!(AbbrevOp::Char6 < AbbrevOp::Blob);
    }

    #[test]
    fn test_display() {
        use AbbrevOp::*;

        assert_eq!(abbrev(&[Literal(5), Vbr(6)]).to_string(), "[5, VBR(6)]");
        assert_eq!(abbrev(&[Array, Vbr(6)]).to_string(), "[Array(VBR(6))]");
        assert_eq!(
            abbrev(&[Literal(1), Fixed(3), Array, Char6]).to_string(),
            "[1, Fixed(3), Array(Char6)]"
        );
        assert_eq!(abbrev(&[Literal(8), Blob]).to_string(), "[8, Blob]");
    }

    #[test]
    fn test_is_valid() {
        use AbbrevOp::*;

        assert!(abbrev(&[Literal(1), Vbr(6)]).is_valid());
        assert!(abbrev(&[Array, Vbr(6)]).is_valid());
        assert!(abbrev(&[Literal(1), Array, Fixed(8)]).is_valid());
        assert!(!abbrev(&[Array, Vbr(6), Vbr(6)]).is_valid());
        assert!(!abbrev(&[Literal(1), Array]).is_valid());
        assert!(!abbrev(&[Array, Array, Vbr(6)]).is_valid());
    }

    #[test]
    fn test_simplify() {
        use AbbrevOp::*;

        let folded = abbrev(&[Vbr(6), Vbr(6), Array, Vbr(6)]).simplify();
        assert_eq!(folded, abbrev(&[Array, Vbr(6)]));

        let kept = abbrev(&[Literal(3), Fixed(4), Array, Vbr(6)]).simplify();
        assert_eq!(kept, abbrev(&[Literal(3), Fixed(4), Array, Vbr(6)]));

        let partial = abbrev(&[Literal(3), Fixed(4), Char6, Array, Char6]).simplify();
        assert_eq!(partial, abbrev(&[Literal(3), Fixed(4), Array, Char6]));

        for a in &[folded, kept, partial] {
            assert_eq!(a.simplify(), *a);
        }
    }

    #[test]
    fn test_sizes() {
        use AbbrevOp::*;

        let fixed = abbrev(&[Literal(5), Vbr(6), Fixed(3)]);
        assert!(fixed.is_fixed_size());
        assert_eq!(fixed.min_record_size(), 3);

        let array = abbrev(&[Literal(5), Array, Vbr(6)]);
        assert!(!array.is_fixed_size());
        assert_eq!(array.min_record_size(), 1);

        let blob = abbrev(&[Literal(5), Vbr(6), Blob]);
        assert!(!blob.is_fixed_size());
        assert_eq!(blob.min_record_size(), 2);
    }

    #[test]
    fn test_ordering() {
        use AbbrevOp::*;

        let short = abbrev(&[Array, Vbr(6)]);
        let long = abbrev(&[Literal(1), Literal(2), Vbr(6)]);
        assert!(short < long);

        let lit = abbrev(&[Literal(9), Vbr(6)]);
        assert!(lit < short);
    }

    #[test]
    fn test_encoded_bits() {
        use AbbrevOp::*;

        let a = abbrev(&[Literal(5), Vbr(6), Fixed(3)]);
        assert_eq!(a.encoded_bits(&[5, 42, 7]), Some(15));
        assert_eq!(a.encoded_bits(&[5, 31, 7]), Some(9));
        assert_eq!(a.encoded_bits(&[5, 42, 8]), None);
        assert_eq!(a.encoded_bits(&[4, 42, 7]), None);
        assert_eq!(a.encoded_bits(&[5, 42]), None);
        assert_eq!(a.encoded_bits(&[5, 42, 1, 1]), None);

        let arr = abbrev(&[Literal(5), Array, Char6]);
        assert_eq!(arr.encoded_bits(&[5, b'a' as u64, b'Z' as u64]), Some(6 + 12));
        assert_eq!(arr.encoded_bits(&[5, b'-' as u64]), None);
        assert_eq!(arr.encoded_bits(&[5]), Some(6));

        assert_eq!(abbrev(&[Literal(5), Blob]).encoded_bits(&[5, 1]), None);
        assert!(abbrev(&[Literal(5), Blob]).can_encode(&[5, 1, 255]));
        assert!(!abbrev(&[Literal(5), Blob]).can_encode(&[5, 256]));
        assert!(!abbrev(&[Literal(5), Blob]).can_encode(&[6]));
        assert!(a.can_encode(&[5, 42, 7]));
        assert_eq!(abbrev(&[Fixed(33)]).encoded_bits(&[1 << 32]), None);
    }

    #[test]
    fn test_definition_round_trip() {
        use AbbrevOp::*;

        let a = abbrev(&[Literal(200), Fixed(7), Vbr(6), Char6, Array, Fixed(8)]);
        let mut writer = BitWriter::new();
        a.write(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let mut cur = BitCursor::new(&bytes);
        assert_eq!(Abbrev::read(&mut cur).unwrap(), a);
    }

    #[test]
    fn test_read_rejects_misplaced_array() {
        // numops=2: [Array, Literal(1)] has an array whose element is a literal.
        let mut writer = BitWriter::new();
        writer.emit_vbr(2, 5).unwrap();
        AbbrevOp::Array.write_definition(&mut writer).unwrap();
        AbbrevOp::Literal(1).write_definition(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert!(Abbrev::read(&mut BitCursor::new(&bytes)).is_err());

        // numops=3: [Array, Vbr(6), Vbr(6)] has an array in the wrong place.
        let mut writer = BitWriter::new();
        writer.emit_vbr(3, 5).unwrap();
        AbbrevOp::Array.write_definition(&mut writer).unwrap();
        AbbrevOp::Vbr(6).write_definition(&mut writer).unwrap();
        AbbrevOp::Vbr(6).write_definition(&mut writer).unwrap();
        let bytes = writer.into_inner();
        assert!(Abbrev::read(&mut BitCursor::new(&bytes)).is_err());
    }

    #[test]
    fn test_read_zero_width_is_literal() {
        let mut writer = BitWriter::new();
        writer.emit_vbr(2, 5).unwrap();
        AbbrevOp::Literal(4).write_definition(&mut writer).unwrap();
        AbbrevOp::Fixed(0).write_definition(&mut writer).unwrap();
        let bytes = writer.into_inner();

        let a = Abbrev::read(&mut BitCursor::new(&bytes)).unwrap();
        assert_eq!(a, abbrev(&[AbbrevOp::Literal(4), AbbrevOp::Literal(0)]));
    }

    #[test]
    fn test_values_round_trip() {
        use AbbrevOp::*;

        let a = abbrev(&[Literal(7), Fixed(4), Vbr(3), Char6, Array, Vbr(6)]);
        let values: [u64; 7] = [7, 9, 100, b'x' as u64, 1, 2000, 3];
        let blob = abbrev(&[Literal(8), Blob]);
        let bytes_values: [u64; 4] = [8, 0xde, 0xad, 0xbe];

        let mut writer = BitWriter::new();
        a.write_values(&mut writer, &values).unwrap();
        blob.write_values(&mut writer, &bytes_values).unwrap();
        writer.emit(0x3, 2).unwrap();
        let bytes = writer.into_inner();

        let mut cur = BitCursor::new(&bytes);
        assert_eq!(a.read_values(&mut cur).unwrap(), values.to_vec());
        assert_eq!(blob.read_values(&mut cur).unwrap(), bytes_values.to_vec());
        assert_eq!(cur.read(2).unwrap(), 0x3);
    }

    #[test]
    fn test_write_values_rejects_mismatch() {
        use AbbrevOp::*;

        let mut writer = BitWriter::new();
        let a = abbrev(&[Literal(7), Fixed(4)]);
        assert!(a.write_values(&mut writer, &[7, 16]).is_err());
        assert!(a.write_values(&mut writer, &[8, 1]).is_err());
        assert!(a.write_values(&mut writer, &[7]).is_err());
    }
}
