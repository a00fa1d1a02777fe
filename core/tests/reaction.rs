//! Patient reaction thresholds and patience decay.

use fangcare_core::reaction::{pain_inflicted, react, Mood, PatienceLevel};
use proptest::prelude::*;

#[test]
fn mood_thresholds() {
    assert_eq!(Mood::from_pain(0), Mood::Happy);
    assert_eq!(Mood::from_pain(4), Mood::Happy);
    assert_eq!(Mood::from_pain(5), Mood::Unhappy);
    assert_eq!(Mood::from_pain(8), Mood::Unhappy);
    assert_eq!(Mood::from_pain(9), Mood::Angry);
}

#[test]
fn patience_thresholds() {
    assert_eq!(PatienceLevel::from_patience(0), PatienceLevel::Impatient);
    assert_eq!(PatienceLevel::from_patience(3), PatienceLevel::Impatient);
    assert_eq!(PatienceLevel::from_patience(4), PatienceLevel::Calm);
    assert_eq!(PatienceLevel::from_patience(7), PatienceLevel::Calm);
    assert_eq!(PatienceLevel::from_patience(8), PatienceLevel::Bliss);
}

#[test]
fn patience_decays_only_while_the_fang_needs_work() {
    assert_eq!(react(1, 5, 3, 60, 1, "Nyx").patience, 4);
    assert_eq!(react(1, 5, 3, 100, 1, "Nyx").patience, 5);
}

#[test]
fn patience_never_goes_negative() {
    let reaction = react(1, 0, 3, 10, 1, "Nyx");
    assert_eq!(reaction.patience, 0);
    assert_eq!(reaction.patience_level, PatienceLevel::Impatient);
}

#[test]
fn gentle_work_on_a_clean_fang_is_painless() {
    assert_eq!(pain_inflicted(1, 3, 100, 1), 0);
    let reaction = react(1, 9, 3, 100, 1, "Nyx");
    assert_eq!(reaction.mood, Mood::Happy);
    assert_eq!(reaction.patience_level, PatienceLevel::Bliss);
    assert!(reaction.phrase.contains("Nyx"));
}

#[test]
fn phrase_matches_mood_and_patience() {
    let calm_unhappy = react(3, 6, 2, 80, 2, "Mortimer");
    assert_eq!(calm_unhappy.pain, 6);
    assert_eq!(calm_unhappy.mood, Mood::Unhappy);
    assert_eq!(calm_unhappy.patience_level, PatienceLevel::Calm);
    assert!(calm_unhappy.phrase.contains("undead smirk"));
}

#[test]
fn empty_name_uses_a_generic_reference() {
    assert!(react(1, 1, 0, 50, 1, "").phrase.contains("the patient"));
}

proptest! {
    #[test]
    fn reaction_stays_in_range(
        effort in 0..20i32,
        patience in 0..20i32,
        tolerance in 0..10i32,
        health in 0..=100i32,
        factor in 0..5i32,
    ) {
        let reaction = react(effort, patience, tolerance, health, factor, "Azrael");
        prop_assert!(reaction.pain >= 0);
        prop_assert!(reaction.patience >= 0);
        prop_assert!(reaction.patience <= patience);
        prop_assert!(!reaction.phrase.is_empty());
    }
}
