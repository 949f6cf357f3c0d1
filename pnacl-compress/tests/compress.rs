use pnacl_bitstream::{Abbrev, AbbrevOp, Bitstream, PexeHeader, StreamEntry, StreamWriter};
use pnacl_compress::{CompressFlags, Compressor, Error};

fn header() -> PexeHeader {
    PexeHeader::with_version(2)
}

/// A module block holding 1000 unabbreviated `(5, [42])` records.
fn repeated_records() -> Vec<u8> {
    let mut writer = StreamWriter::new();
    writer.write_header(&header()).unwrap();
    writer.enter_block(8, 2).unwrap();
    for _ in 0..1000 {
        writer.write_unabbrev(5, &[42]).unwrap();
    }
    writer.exit_block().unwrap();
    writer.finish().unwrap()
}

/// A module with local and BLOCKINFO abbreviations, and nested blocks.
fn mixed_module() -> Vec<u8> {
    let mut writer = StreamWriter::new();
    writer.write_header(&header()).unwrap();
    writer.enter_block(8, 3).unwrap();

    let name = writer
        .define_abbrev(&Abbrev::new(vec![
            AbbrevOp::Literal(1),
            AbbrevOp::Array,
            AbbrevOp::Char6,
        ]))
        .unwrap();
    writer
        .write_blockinfo(&[(
            12,
            vec![Abbrev::new(vec![AbbrevOp::Fixed(4), AbbrevOp::Vbr(6)])],
        )])
        .unwrap();

    let hello: Vec<u64> = b"hello".iter().map(|b| *b as u64).collect();
    writer.write_abbreviated(name, 1, &hello).unwrap();
    writer.write_unabbrev(2, &[1, 2, 3]).unwrap();

    for i in 0..20 {
        writer.enter_block(12, 3).unwrap();
        writer.write_abbreviated(4, 3, &[i]).unwrap();
        writer.write_unabbrev(7, &[i, 1000 + i]).unwrap();

        writer.enter_block(11, 2).unwrap();
        writer.write_unabbrev(1, &[i % 3]).unwrap();
        writer.write_unabbrev(4, &[2 * i]).unwrap();
        writer.exit_block().unwrap();

        writer.write_unabbrev(10, &[]).unwrap();
        writer.exit_block().unwrap();
    }

    writer.exit_block().unwrap();
    writer.finish().unwrap()
}

#[derive(Debug, PartialEq)]
enum Event {
    Enter(u64),
    Exit,
    Record(u64, Vec<u64>),
}

/// The block and record structure of a file, without any abbreviation details.
fn events(buf: &[u8]) -> Vec<Event> {
    Bitstream::from(buf)
        .unwrap()
        .filter_map(|entry| match entry.unwrap() {
            StreamEntry::SubBlock(block) => Some(Event::Enter(block.block_id)),
            StreamEntry::EndBlock => Some(Event::Exit),
            StreamEntry::Record(record) => Some(Event::Record(record.code, record.fields)),
            StreamEntry::Abbrev { .. } => None,
        })
        .collect()
}

fn compress(input: &[u8], flags: CompressFlags) -> Vec<u8> {
    Compressor::new(flags).compress(input).unwrap()
}

fn remove_flags() -> CompressFlags {
    CompressFlags {
        remove_abbreviations: true,
        ..Default::default()
    }
}

#[test]
fn test_repeated_records_shrink() {
    let input = repeated_records();
    let output = compress(&input, CompressFlags::default());

    assert!(output.len() < input.len());
    assert_eq!(events(&output), events(&input));

    let abbrevs: Vec<Abbrev> = Bitstream::from(&output[..])
        .unwrap()
        .filter_map(|entry| match entry.unwrap() {
            StreamEntry::Abbrev { abbrev, .. } => Some(abbrev),
            _ => None,
        })
        .collect();
    assert_eq!(
        abbrevs,
        vec![Abbrev::new(vec![AbbrevOp::Vbr(6), AbbrevOp::Literal(42)])]
    );

    let records: Vec<Option<u64>> = Bitstream::from(&output[..])
        .unwrap()
        .filter_map(|entry| match entry.unwrap() {
            StreamEntry::Record(record) => Some(record.abbrev_id),
            _ => None,
        })
        .collect();
    assert_eq!(records.len(), 1000);
    assert!(records.iter().all(|id| *id == Some(4)));
}

#[test]
fn test_remove_abbreviations() {
    let input = repeated_records();
    let compressed = compress(&input, CompressFlags::default());
    let removed = compress(&compressed, remove_flags());

    assert!(removed.len() >= input.len());
    assert!(removed.len() > compressed.len());
    assert_eq!(events(&removed), events(&input));
    assert!(Bitstream::from(&removed[..])
        .unwrap()
        .all(|entry| !matches!(entry.unwrap(), StreamEntry::Abbrev { .. })));
}

#[test]
fn test_mixed_module_is_lossless() {
    let input = mixed_module();

    let output = compress(&input, CompressFlags::default());
    assert_eq!(events(&output), events(&input));
    assert_eq!(events(&compress(&input, remove_flags())), events(&input));

    // Compressing again still round-trips.
    let again = compress(&output, CompressFlags::default());
    assert_eq!(events(&again), events(&input));
}

#[test]
fn test_header_is_preserved() {
    let input = mixed_module();
    let output = compress(&input, CompressFlags::default());

    let header = Bitstream::from(&output[..]).unwrap().header().clone();
    assert_eq!(header.version(), Some(2));
}

#[test]
fn test_bad_size() {
    let mut input = repeated_records();
    input.push(0);

    let result = Compressor::new(CompressFlags::default()).compress(&input);
    assert!(matches!(result, Err(Error::BadSize(n)) if n == input.len()));
}

#[test]
fn test_analysis_modes() {
    let input = mixed_module();
    let analyze = |flags: CompressFlags| {
        let compressor = Compressor::new(flags);
        assert!(compressor.is_analysis_only());

        let mut out = vec![];
        compressor.analyze(&input, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    };

    let dists = analyze(CompressFlags {
        show_distributions: true,
        ..Default::default()
    });
    assert!(dists.starts_with("Block Histogram (3 elements):\n"));
    assert!(dists.contains("MODULE_BLOCK"));
    assert!(dists.contains("FUNCTION_BLOCK"));

    let frequencies = analyze(CompressFlags {
        show_abbreviation_frequencies: true,
        ..Default::default()
    });
    assert!(frequencies.contains("Block 12\n"));
    assert!(frequencies.contains("[Fixed(4), VBR(6)]\n"));
    assert!(frequencies.contains("[1, Array(Char6)]\n"));

    let tries = analyze(CompressFlags {
        show_lookup_tries: true,
        ..Default::default()
    });
    assert!(tries.contains("Block 12 abbreviation tries:\n"));

    assert!(!Compressor::new(CompressFlags::default()).is_analysis_only());
}
