//! `pnacl-bitstream` reads and writes PNaCl bitcode files: a `PEXE` header
//! followed by a bitstream in the LLVM 3.3 container format.
//!
//! Reading is done with [`Bitstream`], which yields [`StreamEntry`](parser::StreamEntry)
//! values. Writing is done with [`StreamWriter`](writer::StreamWriter).

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

pub mod abbrev;
pub mod error;
pub mod header;
pub mod parser;
pub mod record;
pub mod writer;

use std::io::{Seek, SeekFrom};

use pnacl_bitcursor::BitCursor;

pub use crate::abbrev::{Abbrev, AbbrevOp};
pub use crate::error::Error;
pub use crate::header::PexeHeader;
pub use crate::parser::StreamEntry;
pub use crate::record::{Block, Record};
pub use crate::writer::StreamWriter;

/// A PNaCl bitcode file being read: its header, and a parser positioned at the
/// start of its bitstream.
#[derive(Debug)]
pub struct Bitstream<T: AsRef<[u8]>> {
    header: PexeHeader,
    parser: parser::StreamParser<T>,
}

impl<T: AsRef<[u8]>> Bitstream<T> {
    /// Create a new `Bitstream` from the given source, parsing its header.
    ///
    /// Fails if the input isn't a whole number of 32-bit words, or if the header is
    /// malformed or of a version that can't be read.
    pub fn from(inner: T) -> Result<Self, Error> {
        let len = inner.as_ref().len();
        if len % 4 != 0 {
            return Err(Error::BadHeader(format!(
                "bitcode size ({}) is not a multiple of 4",
                len
            )));
        }

        let header = PexeHeader::parse(inner.as_ref())?;
        if !header.is_readable() {
            return Err(Error::BadHeader(format!(
                "unsupported PNaCl version: {:?}",
                header.version()
            )));
        }
        if !header.is_supported() {
            log::warn!("PEXE header has unrecognized fields; continuing anyway");
        }

        let mut cur = BitCursor::new(inner);
        cur.seek(SeekFrom::Start(header.header_size() as u64))
            .map_err(|e| Error::StreamParse(format!("couldn't seek past header: {:?}", e)))?;

        Ok(Self {
            header: header,
            parser: parser::StreamParser::new(cur),
        })
    }

    /// Returns this bitstream's header.
    pub fn header(&self) -> &PexeHeader {
        &self.header
    }

    /// Advance the underlying bitstream parser by one entry.
    ///
    /// NOTE: Most users should prefer the iterator implementation.
    pub fn advance(&mut self) -> Result<StreamEntry, Error> {
        self.parser.advance()
    }
}

impl<T: AsRef<[u8]>> Iterator for Bitstream<T> {
    type Item = Result<StreamEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(entry) => Some(Ok(entry)),
            Err(Error::Exhausted) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
