//! Binary record layout: round trips, header checks, truncation.

use fangcare_core::{
    catalog::{Catalog, Species},
    codec::{self, Header, FIXED_LEN, HEADER_LEN},
    error::CodecError,
    reaction::{Mood, PatienceLevel},
    state::{SimulationState, Slot, Subject},
};
use proptest::prelude::*;

fn sample_state(player_name: Option<&str>) -> SimulationState {
    SimulationState {
        fluoride: 165,
        last_dip: 4,
        last_effort: 2,
        dip: 10,
        effort: 5,
        subject_idx: 1,
        tool_idx: 0,
        score: 11,
        turns: 2,
        fluoride_used: 35,
        render_mode: true,
        color_mode: false,
        player_name: player_name.map(str::to_string),
    }
}

fn sample_subject() -> Subject {
    Subject {
        age: 57,
        name: "Lupa Greymane".to_string(),
        species: Species::Werewolf,
        patience: 7,
        pain_tolerance: 4,
        mood: Mood::Unhappy,
        patience_level: PatienceLevel::Calm,
        slots: [
            Slot::new(4, 5, 66),
            Slot::new(5, 6, 100),
            Slot::new(6, 8, 73),
            Slot::new(4, 7, 91),
        ],
    }
}

#[test]
fn record_round_trips_with_and_without_player_name() {
    for name in [Some("Riley"), None] {
        let state = sample_state(name);
        let subject = sample_subject();
        let bytes = codec::encode_record(&state, &subject);
        let (decoded_state, decoded_subject) = codec::decode_record(&bytes).unwrap();
        assert_eq!(decoded_state, state);
        assert_eq!(decoded_subject, subject);
    }
}

#[test]
fn encoding_is_deterministic() {
    let state = sample_state(Some("Riley"));
    let subject = sample_subject();
    assert_eq!(
        codec::encode_record(&state, &subject),
        codec::encode_record(&state, &subject)
    );
}

#[test]
fn record_length_matches_layout() {
    let bytes = codec::encode_record(&sample_state(Some("Riley")), &sample_subject());
    // two NUL-terminated names follow the fixed blocks
    assert_eq!(bytes.len(), FIXED_LEN + "Riley".len() + 1 + "Lupa Greymane".len() + 1);
}

#[test]
fn every_header_byte_is_checked() {
    let bytes = codec::encode_record(&sample_state(None), &sample_subject());
    for position in 0..HEADER_LEN {
        let mut corrupt = bytes.clone();
        corrupt[position] ^= 0xFF;
        assert!(
            matches!(codec::decode_record(&corrupt), Err(CodecError::VersionMismatch { .. })),
            "flipping header byte {position} was not rejected"
        );
    }
}

#[test]
fn older_version_is_a_mismatch() {
    let mut bytes = codec::encode_record(&sample_state(None), &sample_subject());
    bytes[4] = 1;
    match codec::decode_record(&bytes) {
        Err(CodecError::VersionMismatch { found }) => {
            assert_eq!(found, Header { major: 1, ..Header::CURRENT });
        }
        other => panic!("expected a version mismatch, got {other:?}"),
    }
}

#[test]
fn every_strict_prefix_is_truncated() {
    let bytes = codec::encode_record(&sample_state(Some("Riley")), &sample_subject());
    for len in 0..bytes.len() {
        assert_eq!(
            codec::decode_record(&bytes[..len]),
            Err(CodecError::Truncated),
            "prefix of {len} bytes"
        );
    }
}

#[test]
fn trailing_bytes_are_malformed() {
    let mut bytes = codec::encode_record(&sample_state(None), &sample_subject());
    bytes.push(0x2a);
    assert!(matches!(codec::decode_record(&bytes), Err(CodecError::Malformed(_))));
}

#[test]
fn unknown_manifest_bits_are_malformed() {
    let mut bytes = codec::encode_record(&sample_state(None), &sample_subject());
    bytes[FIXED_LEN - 1] |= 0b1000_0000;
    assert!(matches!(codec::decode_record(&bytes), Err(CodecError::Malformed(_))));
}

#[test]
fn unknown_species_tag_is_malformed() {
    let mut bytes = codec::encode_record(&sample_state(None), &sample_subject());
    // species byte sits right after the subject's age
    let species_at = HEADER_LEN + codec::STATE_LEN + 4;
    bytes[species_at] = 0xEE;
    assert!(matches!(codec::decode_record(&bytes), Err(CodecError::Malformed(_))));
}

#[test]
fn color_cache_is_ignored_on_decode() {
    let subject = sample_subject();
    let mut bytes = codec::encode_record(&sample_state(None), &subject);
    let first_color = HEADER_LEN + codec::STATE_LEN + 15 + 12;
    bytes[first_color] = 0x7F;
    let (_, decoded) = codec::decode_record(&bytes).unwrap();
    assert_eq!(decoded.slots[0].color(), subject.slots[0].color());
}

#[test]
fn range_checks_catch_negative_counters_and_bad_indices() {
    let subject = sample_subject();
    let catalog = Catalog::builtin();

    let mut state = sample_state(None);
    assert!(codec::check_ranges(&state, &subject, Some(&catalog)).is_ok());

    state.fluoride = -1;
    let reason = codec::check_ranges(&state, &subject, None).unwrap_err();
    assert!(reason.contains("fluoride"), "{reason}");

    let mut state = sample_state(None);
    state.tool_idx = 99;
    assert!(codec::check_ranges(&state, &subject, None).is_ok());
    assert!(codec::check_ranges(&state, &subject, Some(&catalog)).is_err());
}

fn arb_slot() -> impl Strategy<Value = Slot> {
    (0..10i32, 0..10i32, 0..=100i32).prop_map(|(l, s, h)| Slot::new(l, s, h))
}

fn arb_name() -> impl Strategy<Value = String> {
    "[A-Za-z '\\-]{0,25}"
}

prop_compose! {
    fn arb_record()(
        counters in proptest::array::uniform10(0..100_000i32),
        render_mode in any::<bool>(),
        color_mode in any::<bool>(),
        player_name in proptest::option::of(arb_name()),
        name in arb_name(),
        age in 0..2_000i32,
        species in prop::sample::select(Species::ALL.to_vec()),
        patience in 0..20i32,
        pain_tolerance in 0..10i32,
        slots in proptest::array::uniform4(arb_slot()),
    ) -> (SimulationState, Subject) {
        let state = SimulationState {
            fluoride: counters[0],
            last_dip: counters[1],
            last_effort: counters[2],
            dip: counters[3],
            effort: counters[4],
            subject_idx: counters[5],
            tool_idx: counters[6],
            score: counters[7],
            turns: counters[8],
            fluoride_used: counters[9],
            render_mode,
            color_mode,
            player_name,
        };
        let subject = Subject {
            age,
            name,
            species,
            patience,
            pain_tolerance,
            mood: Mood::from_pain(pain_tolerance),
            patience_level: PatienceLevel::from_patience(patience),
            slots,
        };
        (state, subject)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn any_valid_record_round_trips((state, subject) in arb_record()) {
        let bytes = codec::encode_record(&state, &subject);
        let (decoded_state, decoded_subject) = codec::decode_record(&bytes).unwrap();
        prop_assert_eq!(decoded_state, state);
        prop_assert_eq!(decoded_subject, subject);
    }

    #[test]
    fn decode_never_panics_on_noise(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = codec::decode_record(&bytes);
    }
}
