//! Turn engine: formulas, round flow, terminal phases.

use std::path::PathBuf;

use proptest::prelude::*;

use fangcare_core::{
    catalog::{Catalog, Species},
    command::PlayerCommand,
    config::GameConfig,
    engine::{
        fluoride_consumed, health_gain, resume_phase, Phase, SetupOptions, TreatmentOutcome, TurnEngine,
    },
    error::SimError,
    event::SimEvent,
    gateway::{LoadedGame, PersistenceGateway},
    reaction::{Mood, PatienceLevel},
    rng::ScriptedRng,
    state::{SimulationState, Slot, Subject},
};

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fangcare-engine-{label}-{}.btfd", uuid::Uuid::new_v4()))
}

/// Count Varga with four fangs at health 60, holding the Slayer's Dagger.
fn varga_engine() -> TurnEngine {
    TurnEngine::setup(
        "varga".into(),
        GameConfig::default_test(),
        &mut ScriptedRng::new(vec![0]),
        &mut ScriptedRng::new(vec![0]),
        SetupOptions::default(),
    )
    .expect("setup")
}

/// Resume a Count Varga run whose fangs sit at the given health values.
fn engine_with_fangs(healths: [i32; 4]) -> TurnEngine {
    TurnEngine::restore("fangs".into(), GameConfig::default_test(), saved_game(healths, 10, 1))
        .expect("restore")
}

fn saved_game(healths: [i32; 4], score: i32, turns: i32) -> LoadedGame {
    let catalog = Catalog::builtin();
    let template = catalog.creature(0).expect("builtin creature");
    let subject = Subject::from_template(template, healths.map(|h| Slot::new(5, 6, h)));
    let state = SimulationState {
        fluoride: 200,
        last_dip: 0,
        last_effort: 0,
        dip: 0,
        effort: 0,
        subject_idx: 0,
        tool_idx: 0,
        score,
        turns,
        fluoride_used: 0,
        render_mode: false,
        color_mode: false,
        player_name: Some("Riley".into()),
    };
    LoadedGame {
        state,
        subject,
        player_name: "Riley".into(),
    }
}

fn gateway() -> PersistenceGateway {
    PersistenceGateway::new(&GameConfig::default_test())
}

#[test]
fn fresh_setup_resets_counters() {
    let engine = varga_engine();
    let state = engine.state();
    assert_eq!(state.fluoride, 200);
    assert_eq!(state.score, 10);
    assert_eq!(state.turns, 1);
    assert_eq!(engine.subject().name, "Count Varga");
    assert_eq!(engine.subject().species, Species::Vampire);
    assert!(engine.subject().slots.iter().all(|s| s.health() == 60));
    assert_eq!(engine.phase(), Phase::AwaitingTreatment);
    assert_eq!(engine.pending_slot(), Some(0));
    assert_eq!(engine.player_name(), "Buffy");
}

#[test]
fn one_treatment_debits_heals_and_scores() {
    let mut engine = varga_engine();
    let outcome = engine.treat(10, 5).expect("treat");

    let TreatmentOutcome::Applied(report) = outcome else {
        panic!("expected an applied treatment");
    };
    assert_eq!(report.consumed, 35);
    assert_eq!(report.health_before, 60);
    assert_eq!(report.health_after, 66);
    assert!(!report.slot_healed);
    assert_eq!(engine.state().fluoride, 165);
    assert_eq!(engine.state().fluoride_used, 35);
    assert_eq!(engine.state().score, 11);
    assert_eq!(engine.subject().slots[0].health(), 66);
    assert_eq!(engine.phase(), Phase::TreatmentApplied);
    assert_eq!(engine.pending_slot(), Some(1));
}

#[test]
fn reaction_uses_health_before_treatment() {
    let mut engine = varga_engine();
    let TreatmentOutcome::Applied(report) = engine.treat(10, 5).expect("treat") else {
        panic!("expected an applied treatment");
    };
    // 5*2 - 2 + (100 - 60) / 10 = 12
    assert_eq!(report.reaction.pain, 12);
    assert_eq!(report.reaction.mood, Mood::Angry);
    assert_eq!(report.reaction.patience, 9);
    assert_eq!(report.reaction.patience_level, PatienceLevel::Bliss);
    assert!(report.reaction.phrase.contains("Count Varga"));
    assert_eq!(engine.subject().patience, 9);
    assert_eq!(engine.subject().mood, Mood::Angry);
    assert_eq!(engine.last_reaction(), Some(&report.reaction));
}

#[test]
fn inputs_are_clamped_to_the_tool() {
    let mut engine = varga_engine();
    let TreatmentOutcome::Applied(report) = engine.treat(500, -7).expect("treat") else {
        panic!("expected an applied treatment");
    };
    assert_eq!((report.dip, report.effort), (10, 0));
    assert_eq!(engine.state().dip, 10);
    assert_eq!(engine.state().effort, 0);
}

#[test]
fn previous_inputs_are_kept_as_last() {
    let mut engine = varga_engine();
    engine.treat(4, 2).expect("first");
    engine.treat(10, 5).expect("second");
    let state = engine.state();
    assert_eq!((state.last_dip, state.last_effort), (4, 2));
    assert_eq!((state.dip, state.effort), (10, 5));
}

#[test]
fn round_completion_awards_bonus_and_waits() {
    let mut engine = varga_engine();
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    assert_eq!(engine.phase(), Phase::AwaitingContinue);
    assert_eq!(engine.pending_slot(), None);
    assert_eq!(engine.state().turns, 2);
    assert_eq!(engine.state().score, 10 + 4 + 5);
    assert_eq!(engine.state().fluoride, 200 - 4 * 35);

    let events = engine.drain_events();
    assert!(events.iter().any(|e| matches!(e, SimEvent::RoundCompleted { turn: 1, score: 19 })));
}

#[test]
fn exhaustion_ends_the_run_without_debit() {
    let gateway = gateway();
    let path = temp_path("unused");
    let mut engine = varga_engine();
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    engine.decide(PlayerCommand::Continue, &gateway, &path).expect("continue");
    engine.treat(10, 5).expect("fifth treatment");
    assert_eq!(engine.state().fluoride, 25);

    let outcome = engine.treat(10, 5).expect("sixth treatment");
    assert_eq!(
        outcome,
        TreatmentOutcome::Exhausted { slot: 1, needed: 35, available: 25 }
    );
    assert_eq!(engine.state().fluoride, 25);
    assert_eq!(engine.phase(), Phase::Exhausted);
    assert!(engine.phase().is_terminal());
    assert!(matches!(engine.treat(1, 1), Err(SimError::InvalidPhase { .. })));
}

#[test]
fn cheaper_treatment_still_fits_the_budget() {
    let mut engine = varga_engine();
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    let gateway = gateway();
    engine
        .decide(PlayerCommand::Continue, &gateway, &temp_path("unused"))
        .expect("continue");
    engine.treat(10, 5).expect("treat");
    // 25 left covers 2*5 + 3*5 = 25 exactly
    let outcome = engine.treat(5, 5).expect("treat");
    assert!(matches!(outcome, TreatmentOutcome::Applied(_)));
    assert_eq!(engine.state().fluoride, 0);
}

#[test]
fn healed_slots_are_skipped() {
    let mut engine = engine_with_fangs([100, 60, 100, 60]);
    assert_eq!(engine.pending_slot(), Some(1));
    let events = engine.drain_events();
    assert_eq!(events, vec![SimEvent::SlotSkipped { turn: 1, slot: 0 }]);

    engine.treat(10, 5).expect("treat");
    assert_eq!(engine.pending_slot(), Some(3));
}

#[test]
fn healing_every_fang_wins() {
    let mut engine = engine_with_fangs([99, 100, 100, 100]);
    let TreatmentOutcome::Applied(report) = engine.treat(10, 5).expect("treat") else {
        panic!("expected an applied treatment");
    };
    assert!(report.slot_healed);
    assert_eq!(report.health_after, 100);
    assert_eq!(report.phase, Phase::Won);
    assert_eq!(engine.phase(), Phase::Won);
    // treatment + slot healed + round + all healed
    assert_eq!(engine.state().score, 10 + 1 + 3 + 5 + 100);
    assert!(engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, SimEvent::SubjectHealed { .. })));
}

#[test]
fn health_never_exceeds_maximum() {
    let mut engine = engine_with_fangs([98, 60, 60, 60]);
    engine.treat(10, 5).expect("treat");
    assert_eq!(engine.subject().slots[0].health(), 100);
}

#[test]
fn quit_is_terminal() {
    let mut engine = varga_engine();
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    let phase = engine
        .decide(PlayerCommand::parse("n"), &gateway(), &temp_path("unused"))
        .expect("quit");
    assert_eq!(phase, Phase::Quit);
    assert!(matches!(engine.treat(1, 1), Err(SimError::InvalidPhase { .. })));
}

#[test]
fn save_answer_writes_and_ends() {
    let gateway = gateway();
    let path = temp_path("saved");
    let mut engine = varga_engine();
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    let phase = engine
        .decide(PlayerCommand::parse("s"), &gateway, &path)
        .expect("save");
    assert_eq!(phase, Phase::Saved);
    assert!(gateway.validate(&path));
    std::fs::remove_file(&path).ok();
}

#[test]
fn failed_save_keeps_waiting_for_an_answer() {
    let gateway = gateway();
    let path = std::env::temp_dir()
        .join(format!("fangcare-no-such-dir-{}", uuid::Uuid::new_v4()))
        .join("save.btfd");
    let mut engine = varga_engine();
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    let err = engine.decide(PlayerCommand::Save, &gateway, &path).unwrap_err();
    assert!(matches!(err, SimError::Persist(_)), "{err}");
    assert_eq!(engine.phase(), Phase::AwaitingContinue);
}

#[test]
fn decide_outside_round_end_is_rejected() {
    let mut engine = varga_engine();
    let err = engine
        .decide(PlayerCommand::Continue, &gateway(), &temp_path("unused"))
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidPhase { operation: "decide", .. }));
}

#[test]
fn setup_rejects_bad_options() {
    let bad_tool = SetupOptions { tool_idx: 7, ..SetupOptions::default() };
    assert!(matches!(
        TurnEngine::setup_seeded("x".into(), GameConfig::default_test(), 1, bad_tool),
        Err(SimError::UnknownTool { index: 7 })
    ));

    let bad_name = SetupOptions {
        player_name: Some("Bu\0ffy".into()),
        ..SetupOptions::default()
    };
    assert!(matches!(
        TurnEngine::setup_seeded("x".into(), GameConfig::default_test(), 1, bad_name),
        Err(SimError::InvalidName(_))
    ));

    let mut config = GameConfig::default_test();
    config.catalog.creatures.clear();
    assert!(matches!(
        TurnEngine::setup_seeded("x".into(), config, 1, SetupOptions::default()),
        Err(SimError::EmptyCatalog)
    ));
}

#[test]
fn consumption_follows_species() {
    let catalog = Catalog::builtin();
    assert_eq!(fluoride_consumed(10, 5, Species::Vampire.modifiers()), 35);
    assert_eq!(fluoride_consumed(10, 5, Species::Werewolf.modifiers()), 43);
    assert_eq!(fluoride_consumed(10, 5, Species::Ghoul.modifiers()), 31);
    assert_eq!(fluoride_consumed(0, 0, Species::Demon.modifiers()), 0);

    let dagger = catalog.tool(0).expect("dagger");
    let swab = catalog.tool(2).expect("swab");
    assert_eq!(health_gain(10, 5, dagger, Species::Vampire.modifiers()), 6);
    // (7 + 2) * 120 * 80 * 1000 / 10^7 = 8.64, truncated
    assert_eq!(health_gain(15, 8, swab, Species::Vampire.modifiers()), 8);
    assert_eq!(health_gain(1, 2, dagger, Species::Vampire.modifiers()), 0);
}

#[test]
fn snapshot_reflects_engine() {
    let mut engine = varga_engine();
    engine.treat(10, 5).expect("treat");
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, Phase::TreatmentApplied);
    assert_eq!(&snapshot.state, engine.state());
    let json = snapshot.to_json().expect("json");
    let back = fangcare_core::snapshot::SimSnapshot::from_json(&json).expect("parse");
    assert_eq!(back, snapshot);
}

#[test]
fn shipped_data_matches_builtin_tables() {
    let data_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../data");
    let loaded = GameConfig::load(data_dir).expect("load data/");
    assert_eq!(loaded, GameConfig::default_test());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn health_stays_within_bounds(dip in 0..=10_000i32, effort in 0..=10_000i32, start in 0..100i32) {
        let mut engine = engine_with_fangs([start, 60, 60, 60]);
        engine.treat(dip, effort).expect("treat");
        let health = engine.subject().slots[0].health();
        prop_assert!((0..=100).contains(&health));
        prop_assert!(health >= start);
    }

    #[test]
    fn budget_never_goes_negative(inputs in proptest::collection::vec((0..=20i32, 0..=10i32), 1..60)) {
        let gateway = gateway();
        let unused = temp_path("floor");
        let mut engine = varga_engine();
        for (dip, effort) in inputs {
            if engine.phase() == Phase::AwaitingContinue {
                engine.decide(PlayerCommand::Continue, &gateway, &unused).expect("continue");
            }
            if engine.phase().is_terminal() {
                break;
            }
            let before = engine.state().fluoride;
            match engine.treat(dip, effort).expect("treat") {
                TreatmentOutcome::Applied(report) => {
                    prop_assert_eq!(engine.state().fluoride, before - report.consumed);
                }
                TreatmentOutcome::Exhausted { needed, available, .. } => {
                    prop_assert!(needed > available);
                    prop_assert_eq!(engine.state().fluoride, before);
                }
            }
            prop_assert!(engine.state().fluoride >= 0);
        }
    }
}

#[test]
fn restoring_a_healed_subject_keeps_its_score() {
    let engine = TurnEngine::restore(
        "healed".into(),
        GameConfig::default_test(),
        saved_game([100, 100, 100, 100], 50, 3),
    )
    .expect("restore");

    assert_eq!(engine.phase(), Phase::Won);
    assert_eq!(engine.state().score, 50);
    assert_eq!(engine.state().turns, 3);
    assert_eq!(engine.pending_slot(), None);
}

#[test]
fn loading_a_healed_save_enters_won_without_bonuses() {
    let gateway = gateway();
    let path = temp_path("healed");
    let healed = saved_game([100, 100, 100, 100], 50, 3);
    gateway.save(&path, &healed.state, &healed.subject).expect("save");

    let mut engine = varga_engine();
    engine.load(&gateway, &path).expect("load");

    assert_eq!(engine.phase(), Phase::Won);
    assert_eq!(engine.state(), &healed.state);
    assert_eq!(resume_phase(engine.subject()), Phase::Won);
    std::fs::remove_file(&path).ok();
}
