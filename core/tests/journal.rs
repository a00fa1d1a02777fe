//! The SQLite turn journal: events, per-round rows, snapshots.

use fangcare_core::{
    command::PlayerCommand,
    config::GameConfig,
    engine::{Phase, SetupOptions, TurnEngine},
    gateway::PersistenceGateway,
    rng::ScriptedRng,
    snapshot::SimSnapshot,
    store::SimStore,
};

fn journaled_engine(run_id: &str) -> TurnEngine {
    journaled_engine_with(run_id, SimStore::in_memory().expect("in-memory store"))
}

fn journaled_engine_with(run_id: &str, store: SimStore) -> TurnEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    store.migrate().expect("migration");
    let mut engine = TurnEngine::setup(
        run_id.to_string(),
        GameConfig::default_test(),
        &mut ScriptedRng::new(vec![0]),
        &mut ScriptedRng::new(vec![0]),
        SetupOptions {
            player_name: Some("Riley".into()),
            ..SetupOptions::default()
        },
    )
    .expect("setup");
    engine.attach_store(store).expect("attach");
    engine
}

#[test]
fn attaching_flushes_queued_events() {
    let engine = journaled_engine("flush");
    let store = engine.store().expect("store");
    assert_eq!(store.run_count().expect("count"), 1);

    let events = store.events_for_run("flush").expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "run_initialized");
}

#[test]
fn completed_round_writes_a_turn_row() {
    let mut engine = journaled_engine("rows");
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    assert_eq!(engine.phase(), Phase::AwaitingContinue);

    let rows = engine.store().expect("store").turn_rows("rows").expect("rows");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.turn, 1);
    assert_eq!(row.player, "Riley");
    assert_eq!(row.score, 19);
    assert_eq!(row.fluoride, 60);
    assert_eq!((row.tool_dip, row.tool_effort), (10, 5));
    assert_eq!(row.fangs, [66, 66, 66, 66]);
    assert_eq!(row.patience, 6);
    assert_eq!(row.mood, "angry");
}

#[test]
fn treatment_events_are_journaled_in_order() {
    let mut engine = journaled_engine("order");
    engine.treat(10, 5).expect("treat");

    let types: Vec<String> = engine
        .store()
        .expect("store")
        .events_for_run("order")
        .expect("events")
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, ["run_initialized", "treatment_applied", "patient_reacted"]);
}

#[test]
fn terminal_phase_takes_a_snapshot() {
    let mut engine = journaled_engine("snap");
    for _ in 0..4 {
        engine.treat(10, 5).expect("treat");
    }
    let gateway = PersistenceGateway::new(&GameConfig::default_test());
    let unused = std::env::temp_dir().join(format!("fangcare-journal-{}", uuid::Uuid::new_v4()));
    engine.decide(PlayerCommand::Quit, &gateway, &unused).expect("quit");

    let (turn, json) = engine
        .store()
        .expect("store")
        .latest_snapshot("snap")
        .expect("query")
        .expect("a snapshot");
    assert_eq!(turn, 2);
    let snapshot = SimSnapshot::from_json(&json).expect("parse");
    assert_eq!(snapshot.phase, Phase::Quit);
    assert_eq!(&snapshot.state, engine.state());
}

#[test]
fn failed_journal_write_rolls_the_treatment_back() {
    let db = std::env::temp_dir().join(format!("fangcare-journal-{}.db", uuid::Uuid::new_v4()));
    let db_str = db.to_str().expect("utf-8 temp path");
    let mut engine = journaled_engine_with("rollback", SimStore::open(db_str).expect("open store"));
    let before = engine.context().clone();

    let other = rusqlite::Connection::open(&db).expect("second connection");
    other.execute_batch("DROP TABLE event_log;").expect("drop");

    for _ in 0..2 {
        assert!(engine.treat(10, 5).is_err());
        assert_eq!(engine.context(), &before);
        assert_eq!(engine.state().fluoride, 200);
        assert_eq!(engine.state().score, 10);
        assert_eq!(engine.pending_slot(), Some(0));
        assert_eq!(engine.phase(), Phase::AwaitingTreatment);
        assert!(engine.last_reaction().is_none());
    }
    let events = engine.drain_events();
    assert_eq!(events.len(), 1, "only the setup event survives: {events:?}");

    drop(other);
    drop(engine);
    for suffix in ["", "-wal", "-shm"] {
        std::fs::remove_file(format!("{db_str}{suffix}")).ok();
    }
}
