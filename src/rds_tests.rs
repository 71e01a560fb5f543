// Unit tests for the RDS group decoder.
// This file is included via #[cfg(test)] mod in rds.rs

use super::*;
use crate::notify::Notice;

const BAND_MIN: f32 = 87.5;

/// Feed one group's four blocks, in order, as device records.
fn feed_group(decoder: &mut RdsDecoder, blocks: [u16; 4], current_mhz: f32) {
    for (n, word) in blocks.iter().enumerate() {
        let rec = BlockRecord {
            lsb: (word & 0xFF) as u8,
            msb: (word >> 8) as u8,
            block: n as u8,
        };
        decoder.handle_record(rec, current_mhz);
    }
}

/// Build a type-0A group: `segment` 0..=3, `chars` in block 4,
/// `flags` OR-ed into block 2 (TP/TA/DI bits), `af` as block 3.
fn group_0a(pi: u16, segment: u16, flags: u16, af: u16, chars: [u8; 2]) -> [u16; 4] {
    [
        pi,
        segment | flags,
        af,
        (chars[0] as u16) << 8 | chars[1] as u16,
    ]
}

/// Build a type-2A group writing 4 characters at `index`, with the
/// given A/B flag.
fn group_2a(pi: u16, index: u16, ab: bool, chars: [u8; 4]) -> [u16; 4] {
    [
        pi,
        0x2000 | index | if ab { 0x10 } else { 0 },
        (chars[0] as u16) << 8 | chars[1] as u16,
        (chars[2] as u16) << 8 | chars[3] as u16,
    ]
}

/// Build a type-4A group from date/time fields.
fn group_4a(pi: u16, mjd: u32, hour: u16, minute: u16, offset_half_hours: i16) -> [u16; 4] {
    let (sign, magnitude) = if offset_half_hours < 0 {
        (0x20u16, (-offset_half_hours) as u16)
    } else {
        (0, offset_half_hours as u16)
    };
    [
        pi,
        0x4000 | (mjd >> 15) as u16,
        ((mjd & 0x7FFF) as u16) << 1 | hour >> 4,
        (hour & 0x0F) << 12 | minute << 6 | sign | magnitude,
    ]
}

fn notices_of(decoder: &mut RdsDecoder) -> Vec<Notice> {
    decoder.take_notices()
}

#[test]
fn test_block_record_fields() {
    let rec = BlockRecord::from_bytes([0x34, 0x12, 0x83]);
    assert_eq!(rec.word(), 0x1234);
    assert_eq!(rec.number(), 3);
    assert!(rec.is_uncorrectable());

    let rec = BlockRecord::from_bytes([0x00, 0xFF, 0x02]);
    assert_eq!(rec.number(), 2);
    assert!(!rec.is_uncorrectable());
}

#[test]
fn test_program_type_table_has_31_distinct_entries() {
    assert_eq!(PROGRAM_TYPES.len(), 31);
    assert_eq!(program_type_name(0), None);
    assert_eq!(program_type_name(1), Some("News"));
    assert_eq!(program_type_name(20), Some("Religion"));
    assert_eq!(program_type_name(21), Some("Phone-in"));
    assert_eq!(program_type_name(31), Some("Alarm"));
    assert_eq!(program_type_name(32), None);
}

#[test]
fn test_pi_creates_program_at_current_frequency() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    feed_group(&mut decoder, group_0a(0xF212, 0, 0, 0, *b"  "), 99.1);

    let program = decoder.programs().get(0xF212).expect("program created");
    assert!((program.freq_mhz - 99.1).abs() < 1e-4);
    assert_eq!(decoder.programs().len(), 1);
}

#[test]
fn test_program_service_name_assembly() {
    // Segments 0..3 carrying "BB", "C ", "R1", "  "
    let mut decoder = RdsDecoder::new(BAND_MIN);
    feed_group(&mut decoder, group_0a(0x1234, 0, 0, 0, *b"BB"), 98.5);
    feed_group(&mut decoder, group_0a(0x1234, 1, 0, 0, *b"C "), 98.5);
    feed_group(&mut decoder, group_0a(0x1234, 2, 0, 0, *b"R1"), 98.5);
    let early: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::Program { .. }))
        .collect();
    assert!(early.is_empty(), "name must not be emitted before segment 3");

    feed_group(&mut decoder, group_0a(0x1234, 3, 0, 0, *b"  "), 98.5);
    let names: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter_map(|n| match n {
            Notice::Program { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["BBC R1".to_string()]);
}

#[test]
fn test_program_name_not_repeated_until_changed() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    for round in 0..2 {
        // Vary the AF word so duplicate-group suppression does not kick in
        let af = 0x0100 + round;
        feed_group(&mut decoder, group_0a(0x1234, 0, 0, af, *b"AB"), 98.5);
        feed_group(&mut decoder, group_0a(0x1234, 1, 0, af, *b"CD"), 98.5);
        feed_group(&mut decoder, group_0a(0x1234, 2, 0, af, *b"EF"), 98.5);
        feed_group(&mut decoder, group_0a(0x1234, 3, 0, af, *b"GH"), 98.5);
    }
    let names: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter_map(|n| match n {
            Notice::Program { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["ABCDEFGH".to_string()], "same name must emit once");
}

#[test]
fn test_music_flag_recorded_not_emitted() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    assert!(!decoder.is_music());
    // Music/speech is block-2 bit 3
    feed_group(&mut decoder, group_0a(0x1234, 0, 0x0008, 0, *b"  "), 98.5);
    assert!(decoder.is_music());
    assert!(notices_of(&mut decoder).is_empty(), "music changes are silent");
}

#[test]
fn test_traffic_announcement_changes_emitted() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // TP bit is block-2 bit 10 (0x0400), TA is bit 4 (0x0010)
    feed_group(&mut decoder, group_0a(0x1234, 0, 0x0410, 0, *b"  "), 98.5);
    let on: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::TrafficAnnouncement { .. }))
        .collect();
    assert_eq!(on, vec![Notice::TrafficAnnouncement { on: true }]);

    // Same TA again: no change, no notice
    feed_group(&mut decoder, group_0a(0x1234, 1, 0x0410, 0, *b"  "), 98.5);
    assert!(notices_of(&mut decoder)
        .iter()
        .all(|n| !matches!(n, Notice::TrafficAnnouncement { .. })));

    feed_group(&mut decoder, group_0a(0x1234, 2, 0x0400, 0, *b"  "), 98.5);
    let off: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::TrafficAnnouncement { .. }))
        .collect();
    assert_eq!(off, vec![Notice::TrafficAnnouncement { on: false }]);
}

#[test]
fn test_stereo_latch_and_changes() {
    // DI segment 3 with stereo set, then clear, then repeated states
    let mut decoder = RdsDecoder::new(BAND_MIN);

    // segment 3 with DI bit (block-2 bit 2) set = stereo
    feed_group(&mut decoder, group_0a(0x1234, 3, 0x0004, 0, *b"AA"), 98.5);
    let stereo: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::Stereo { .. }))
        .collect();
    assert_eq!(stereo, vec![Notice::Stereo { stereo: true }]);

    feed_group(&mut decoder, group_0a(0x1234, 3, 0, 0, *b"AB"), 98.5);
    let mono: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::Stereo { .. }))
        .collect();
    assert_eq!(mono, vec![Notice::Stereo { stereo: false }]);

    // Repeated mono state (different PS bytes to defeat duplicate
    // suppression) must stay silent
    feed_group(&mut decoder, group_0a(0x1234, 3, 0, 0, *b"AC"), 98.5);
    assert!(notices_of(&mut decoder)
        .iter()
        .all(|n| !matches!(n, Notice::Stereo { .. })));
}

#[test]
fn test_program_type_change_emitted_once() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // PTY lives in block-2 bits 9..5; 9 = "Varied"
    feed_group(&mut decoder, group_0a(0x1234, 0, 9 << 5, 0, *b"  "), 98.5);
    let types: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter_map(|n| match n {
            Notice::ProgramType { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(types, vec!["Varied".to_string()]);

    // Same PTY again: silent
    feed_group(&mut decoder, group_0a(0x1234, 1, 9 << 5, 0, *b"  "), 98.5);
    assert!(notices_of(&mut decoder)
        .iter()
        .all(|n| !matches!(n, Notice::ProgramType { .. })));
}

#[test]
fn test_radiotext_emitted_on_ab_flip() {
    // Fill "Now playing: Song", then flip the A/B bit
    let mut decoder = RdsDecoder::new(BAND_MIN);
    let segments: [[u8; 4]; 5] = [*b"Now ", *b"play", *b"ing:", *b" Son", *b"g   "];
    for (i, chars) in segments.iter().enumerate() {
        feed_group(&mut decoder, group_2a(0x1234, i as u16, false, *chars), 98.5);
    }
    assert!(
        notices_of(&mut decoder)
            .iter()
            .all(|n| !matches!(n, Notice::Text { .. })),
        "text must not be emitted before the A/B flip"
    );

    feed_group(&mut decoder, group_2a(0x1234, 0, true, *b"    "), 98.5);
    let texts: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter_map(|n| match n {
            Notice::Text { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["Now playing: Song".to_string()]);
}

#[test]
fn test_radiotext_empty_buffer_not_emitted() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // Flip A/B with nothing but spaces in the buffer
    feed_group(&mut decoder, group_2a(0x1234, 0, true, *b"    "), 98.5);
    assert!(notices_of(&mut decoder)
        .iter()
        .all(|n| !matches!(n, Notice::Text { .. })));
}

#[test]
fn test_radiotext_index_bounds() {
    // Index 15 writes the last 4 bytes; must not panic or spill
    let mut decoder = RdsDecoder::new(BAND_MIN);
    feed_group(&mut decoder, group_2a(0x1234, 15, false, *b"END."), 98.5);
    feed_group(&mut decoder, group_2a(0x1234, 0, true, *b"    "), 98.5);
    let texts: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter_map(|n| match n {
            Notice::Text { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].ends_with("END."), "got: {:?}", texts[0]);
    assert_eq!(texts[0].len(), 64, "60 leading spaces plus the last segment");
}

#[test]
fn test_clock_decode() {
    // 2020-01-15, 12:19 UTC, offset +1 h
    let mut decoder = RdsDecoder::new(BAND_MIN);
    let mjd = crate::clock::date_to_mjd(2020, 1, 15);
    feed_group(&mut decoder, group_4a(0x1234, mjd, 12, 19, 2), 98.5);

    let dates: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::Date { .. }))
        .collect();
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].to_string(), "Date: 2020-01-15 13:19 (+01:00)");
}

#[test]
fn test_clock_decode_negative_offset_crosses_midnight() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    let mjd = crate::clock::date_to_mjd(2020, 3, 1);
    feed_group(&mut decoder, group_4a(0x1234, mjd, 0, 10, -1), 98.5);

    let dates: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::Date { .. }))
        .collect();
    assert_eq!(dates[0].to_string(), "Date: 2020-02-29 23:40 (-00:30)");
}

#[test]
fn test_duplicate_group_suppressed() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    let group = group_4a(0x1234, crate::clock::date_to_mjd(2020, 1, 1), 8, 0, 0);

    feed_group(&mut decoder, group, 98.5);
    assert_eq!(
        notices_of(&mut decoder)
            .iter()
            .filter(|n| matches!(n, Notice::Date { .. }))
            .count(),
        1
    );

    feed_group(&mut decoder, group, 98.5);
    assert!(
        notices_of(&mut decoder).is_empty(),
        "byte-identical group must produce no output"
    );

    // A different group goes through again
    feed_group(
        &mut decoder,
        group_4a(0x1234, crate::clock::date_to_mjd(2020, 1, 2), 8, 0, 0),
        98.5,
    );
    assert_eq!(
        notices_of(&mut decoder)
            .iter()
            .filter(|n| matches!(n, Notice::Date { .. }))
            .count(),
        1
    );
}

#[test]
fn test_uncorrectable_block_counted_and_dropped() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    let rec = BlockRecord::from_bytes([0x34, 0x12, 0x80]);
    decoder.handle_record(rec, 98.5);

    let (blocks, errors) = decoder.stats();
    assert_eq!((blocks, errors), (1, 1));
    assert!(
        decoder.programs().is_empty(),
        "an errored block 0 must not create a program"
    );
    let notices = notices_of(&mut decoder);
    assert_eq!(
        notices,
        vec![Notice::BlockErrors {
            errors: 1,
            blocks: 1
        }]
    );
}

#[test]
fn test_block_number_out_of_range_ignored() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // Block number 5 has no slot in the 8-byte accumulator
    decoder.handle_record(BlockRecord::from_bytes([0xAA, 0xBB, 0x05]), 98.5);
    let (blocks, errors) = decoder.stats();
    assert_eq!((blocks, errors), (1, 0));
    assert!(notices_of(&mut decoder).is_empty());
}

#[test]
fn test_tmc_single_group_message() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // Block 2: 8A code with subtype 1 (bit 3) and duration code 2
    let block2 = 0x8000 | 0x08 | 0x02;
    // Block 3: extent 3, event high bits 0x5; block 4: location
    let block3 = (3 << 3) | 0x05;
    let group = [0x1234u16, block2, block3 << 8 | 0x21, 0xCAFE];
    feed_group(&mut decoder, group, 98.5);

    let tmc: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::TmcSingle { .. }))
        .collect();
    assert_eq!(tmc.len(), 1);
    assert_eq!(
        tmc[0].to_string(),
        "TMC(single): evt=521, loc=CAFE, extent=3, dur=30 minutes"
    );
}

#[test]
fn test_tmc_other_subtypes_are_verbose_only() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // Subtype 0 (group message)
    let group = [0x1234u16, 0x8000, 0x0000, 0x0000];
    feed_group(&mut decoder, group, 98.5);
    let notices = notices_of(&mut decoder);
    assert_eq!(notices.len(), 1);
    assert!(matches!(notices[0], Notice::TmcOther { .. }));
    assert_eq!(notices[0].level(), 1);
}

#[test]
fn test_eon_name_fragments() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // 14A variants 0..=3 assemble the other network's name
    for (variant, chars) in [(0u16, *b"RA"), (1, *b"DI"), (2, *b"O "), (3, *b"X ")] {
        let block2 = 0xE000 | variant;
        let block3 = (chars[0] as u16) << 8 | chars[1] as u16;
        feed_group(&mut decoder, [0x3333, block2, block3, 0x4444], 91.7);
    }
    let other = decoder.programs().get(0x4444).expect("EON program created");
    assert_eq!(other.name().as_deref(), Some("RADIO X"));
}

#[test]
fn test_eon_alternate_frequency_mapping() {
    // This program at 91.70; EON variant 5 with
    // f1 matching it maps the other network to f2 = 98.90
    let mut decoder = RdsDecoder::new(BAND_MIN);
    feed_group(&mut decoder, group_0a(0x3333, 0, 0, 0, *b"  "), 91.70);

    // AF codes: 42 -> 91.70 MHz, 114 -> 98.90 MHz
    let block3 = (42u16) << 8 | 114;
    feed_group(&mut decoder, [0x3333, 0xE005, block3, 0x4444], 91.70);

    let other = decoder.programs().get(0x4444).expect("EON program created");
    assert!(
        (other.freq_mhz - 98.90).abs() < 1e-4,
        "expected 98.90, got {}",
        other.freq_mhz
    );
}

#[test]
fn test_eon_alternate_frequency_requires_match() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    feed_group(&mut decoder, group_0a(0x3333, 0, 0, 0, *b"  "), 95.00);

    // f1 = 91.70, far from 95.00: no mapping
    let block3 = (42u16) << 8 | 114;
    feed_group(&mut decoder, [0x3333, 0xE005, block3, 0x4444], 95.00);

    let other = decoder.programs().get(0x4444).expect("EON program created");
    assert_eq!(other.freq_mhz, 0.0, "mismatched f1 must not map");
}

#[test]
fn test_eon_traffic_announcement() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // Variant 0xD with TPON (block-2 bit 4) and TAON (block-3 bit 0)
    feed_group(&mut decoder, [0x3333, 0xE01D, 0x0001, 0x4444], 91.7);
    let notices = notices_of(&mut decoder);
    let eon: Vec<_> = notices
        .iter()
        .filter(|n| matches!(n, Notice::EonTraffic { .. }))
        .collect();
    assert_eq!(eon.len(), 1);
    assert_eq!(eon[0].to_string(), "Traffic Announcement on 4444 is on");
    assert!(decoder.programs().get(0x4444).unwrap().ta);

    // Same state again (different info word): no repeat
    feed_group(&mut decoder, [0x3333, 0xE01D, 0x0101, 0x4444], 91.7);
    assert!(notices_of(&mut decoder)
        .iter()
        .all(|n| !matches!(n, Notice::EonTraffic { .. })));
}

#[test]
fn test_unhandled_group_dumped_raw() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // 6A (code 0x0C): in-house applications
    feed_group(&mut decoder, [0x1234, 0x6000, 0xAABB, 0xCCDD], 98.5);
    let notices = notices_of(&mut decoder);
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        Notice::RawGroup { group_type, .. } => assert_eq!(*group_type, 0x0C),
        other => panic!("expected raw dump, got {:?}", other),
    }
    assert_eq!(notices[0].level(), 2, "raw dumps are high-verbosity only");
}

#[test]
fn test_alternate_frequency_list_counting() {
    let mut decoder = RdsDecoder::new(BAND_MIN);
    // Header: 224 + 2 announces two AF entries, first code in the pair
    let header_af = ((224u16 + 2) << 8) | 42;
    feed_group(&mut decoder, group_0a(0x1234, 0, 0, header_af, *b"  "), 98.5);
    let first: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::AlternateFrequency { .. }))
        .collect();
    assert_eq!(first.len(), 1);
    assert_eq!(
        first[0],
        Notice::AlternateFrequency { freq_mhz: 91.7 }
    );

    // Follow-up group consumes the remaining entry (pair slots)
    let pair = (114u16) << 8 | 30;
    feed_group(&mut decoder, group_0a(0x1234, 1, 0, pair, *b"  "), 98.5);
    let rest: Vec<_> = notices_of(&mut decoder)
        .into_iter()
        .filter(|n| matches!(n, Notice::AlternateFrequency { .. }))
        .collect();
    assert_eq!(rest.len(), 2);

    // Counter exhausted: further pairs are ignored
    feed_group(&mut decoder, group_0a(0x1234, 2, 0, pair, *b"AB"), 98.5);
    assert!(notices_of(&mut decoder)
        .iter()
        .all(|n| !matches!(n, Notice::AlternateFrequency { .. })));
}
