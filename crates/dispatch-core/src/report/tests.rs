//! Tests for report number parsing and generation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use super::{ReportIdGenerator, ReportNumber, ReportNumberError};
use crate::clock::{ManualClock, SharedClock};

fn manual_clock() -> Arc<ManualClock> {
    let start = Utc.with_ymd_and_hms(2024, 12, 1, 14, 30, 0).unwrap();
    Arc::new(ManualClock::new(start))
}

#[test]
fn parses_well_formed_report_number() {
    let number: ReportNumber = "ER-20241201143000-A1B2".parse().unwrap();
    assert_eq!(number.as_str(), "ER-20241201143000-A1B2");
    assert_eq!(
        number.issued_at(),
        Utc.with_ymd_and_hms(2024, 12, 1, 14, 30, 0).unwrap()
    );
}

#[test]
fn rejects_malformed_report_numbers() {
    for bad in [
        "",
        "ER-20241201143000-a1b2",
        "ER-2024120114300-A1B2",
        "ER-20241201143000-A1B",
        "XX-20241201143000-A1B2",
        "ER-20241201143000-A1B2X",
    ] {
        let err = bad.parse::<ReportNumber>().unwrap_err();
        assert_eq!(
            err,
            ReportNumberError::InvalidFormat {
                value: bad.to_string()
            }
        );
    }
}

#[test]
fn serde_round_trip_validates_on_deserialize() {
    let number: ReportNumber = "ER-20241201143000-A1B2".parse().unwrap();
    let json = serde_json::to_string(&number).unwrap();
    assert_eq!(json, "\"ER-20241201143000-A1B2\"");

    let back: ReportNumber = serde_json::from_str(&json).unwrap();
    assert_eq!(back, number);

    let malformed = serde_json::from_str::<ReportNumber>("\"ER-bogus\"");
    assert!(malformed.is_err());
}

#[test]
fn generated_numbers_match_the_pattern() {
    let generator = ReportIdGenerator::with_clock(manual_clock());
    for _ in 0..100 {
        let number = generator.next().unwrap();
        assert!(number.as_str().parse::<ReportNumber>().is_ok());
    }
}

#[test]
fn same_second_suffixes_never_repeat() {
    let generator = ReportIdGenerator::with_clock(manual_clock());
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let number = generator.next().unwrap();
        assert!(seen.insert(number), "duplicate identifier issued");
    }
}

#[test]
fn concurrent_generation_yields_distinct_identifiers() {
    let generator = Arc::new(ReportIdGenerator::with_clock(manual_clock()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let generator = Arc::clone(&generator);
        handles.push(std::thread::spawn(move || {
            (0..500)
                .map(|_| generator.next().unwrap())
                .collect::<Vec<_>>()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for number in handle.join().unwrap() {
            assert!(seen.insert(number), "duplicate identifier issued");
        }
    }
    assert_eq!(seen.len(), 8 * 500);
}

#[test]
fn identifiers_sort_by_intake_second() {
    let clock = manual_clock();
    let shared: SharedClock = clock.clone();
    let generator = ReportIdGenerator::with_clock(shared);

    let earlier = generator.next().unwrap();
    clock.advance(chrono::Duration::seconds(2));
    let later = generator.next().unwrap();

    assert!(earlier < later);
    assert!(earlier.issued_at() < later.issued_at());
}

#[test]
fn clock_step_backwards_does_not_reissue_suffixes() {
    let clock = manual_clock();
    let shared: SharedClock = clock.clone();
    let generator = ReportIdGenerator::with_clock(shared);

    let mut seen = HashSet::new();
    for _ in 0..50 {
        assert!(seen.insert(generator.next().unwrap()));
    }

    // Step the clock back one minute; the generator must keep issuing from
    // the newest second it has seen.
    clock.advance(chrono::Duration::minutes(-1));
    for _ in 0..50 {
        assert!(seen.insert(generator.next().unwrap()));
    }
}

proptest! {
    #[test]
    fn arbitrary_strings_never_panic_the_parser(input in ".{0,40}") {
        let _ = input.parse::<ReportNumber>();
    }
}
