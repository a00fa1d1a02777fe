//! The turn engine — owns the authoritative simulation state.
//!
//! PHASES:
//!   Setup -> AwaitingTreatment -> TreatmentApplied ... -> AwaitingContinue
//!   AwaitingContinue -> AwaitingTreatment | Quit | Saved
//!   any treatment -> Exhausted when the budget cannot cover it
//!   round end -> Won when every slot is at full health
//!
//! RULES:
//!   - One `SimulationContext` per engine; nothing else holds it mutably.
//!   - Player inputs are clamped to the active tool before any formula.
//!   - The fluoride budget is never debited below zero. A treatment that
//!     would do so ends the run without touching the budget.
//!   - A failed load leaves the context exactly as it was.
//!   - All arithmetic truncates.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    catalog::{SpeciesModifiers, ToolSpec},
    command::PlayerCommand,
    config::GameConfig,
    error::{SimError, SimResult},
    event::{EventLogEntry, SimEvent},
    gateway::{LoadedGame, PersistenceGateway},
    reaction::{react, Reaction},
    rng::{RandomSource, RngBank, RngStream},
    snapshot::SimSnapshot,
    state::{SimulationState, Subject},
    store::{SimStore, TurnRow},
    types::{RunId, MAX_HEALTH, SLOT_COUNT},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    AwaitingTreatment,
    TreatmentApplied,
    AwaitingContinue,
    Won,
    Exhausted,
    Quit,
    Saved,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Exhausted | Self::Quit | Self::Saved)
    }
}

/// The state a save file captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationContext {
    pub state: SimulationState,
    pub subject: Subject,
}

#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    pub player_name: Option<String>,
    pub tool_idx: usize,
    pub render_mode: bool,
    pub color_mode: bool,
}

/// What one applied treatment did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentReport {
    pub slot: usize,
    pub dip: i32,
    pub effort: i32,
    pub consumed: i32,
    pub health_before: i32,
    pub health_after: i32,
    pub slot_healed: bool,
    pub reaction: Reaction,
    /// The phase the engine moved to.
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreatmentOutcome {
    Applied(TreatmentReport),
    /// The budget could not cover the treatment. Nothing was debited.
    Exhausted { slot: usize, needed: i32, available: i32 },
}

/// Fluoride a treatment costs: `(2*dip + 3*effort) * species consumption`.
pub fn fluoride_consumed(dip: i32, effort: i32, modifiers: SpeciesModifiers) -> i32 {
    let base = 2 * i64::from(dip) + 3 * i64::from(effort);
    clamp_i32(base * modifiers.consumption_permille / 1000)
}

/// Health a treatment restores: `(dip/2 + effort/3)` scaled by the tool's
/// effectiveness and durability and the species' healing response.
pub fn health_gain(dip: i32, effort: i32, tool: &ToolSpec, modifiers: SpeciesModifiers) -> i32 {
    let base = i64::from(dip) / 2 + i64::from(effort) / 3;
    let scaled = base
        * i64::from(tool.effectiveness_pct)
        * i64::from(tool.durability_pct)
        * modifiers.healing_permille
        / (100 * 100 * 1000);
    clamp_i32(scaled.max(0))
}

/// Phase a loaded game resumes in: `Won` if nothing is left to heal.
pub fn resume_phase(subject: &Subject) -> Phase {
    if subject.all_healed() {
        Phase::Won
    } else {
        Phase::AwaitingTreatment
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

pub struct TurnEngine {
    pub run_id: RunId,
    config: GameConfig,
    seed: Option<u64>,
    ctx: SimulationContext,
    phase: Phase,
    /// Next slot to consider in the current round.
    cursor: usize,
    last_reaction: Option<Reaction>,
    events: Vec<SimEvent>,
    store: Option<SimStore>,
    /// Journal writes of the operation in progress; flushed in one transaction.
    journal: Vec<JournalWrite>,
}

enum JournalWrite {
    Event(EventLogEntry),
    Turn(TurnRow),
    Snapshot { turn: i32, json: String },
}

/// Everything an operation may change before its journal is committed.
struct Checkpoint {
    ctx: SimulationContext,
    phase: Phase,
    cursor: usize,
    last_reaction: Option<Reaction>,
    events_len: usize,
}

impl TurnEngine {
    /// Fresh run: pick a subject, roll its fangs, reset every counter.
    pub fn setup(
        run_id: RunId,
        config: GameConfig,
        selection: &mut dyn RandomSource,
        slot_roll: &mut dyn RandomSource,
        options: SetupOptions,
    ) -> SimResult<Self> {
        let tool = config
            .catalog
            .tool(options.tool_idx)
            .ok_or(SimError::UnknownTool { index: options.tool_idx })?
            .name
            .clone();
        if let Some(name) = &options.player_name {
            check_player_name(name, config.rules.max_name_len)?;
        }
        let (subject_idx, subject) =
            Subject::generate(&config.catalog, selection, slot_roll).ok_or(SimError::EmptyCatalog)?;

        let rules = &config.rules;
        let state = SimulationState {
            fluoride: rules.starting_fluoride,
            last_dip: 0,
            last_effort: 0,
            dip: 0,
            effort: 0,
            subject_idx: subject_idx as i32,
            tool_idx: options.tool_idx as i32,
            score: rules.starting_score,
            turns: rules.starting_turns,
            fluoride_used: 0,
            render_mode: options.render_mode,
            color_mode: options.color_mode,
            player_name: options.player_name,
        };

        let mut engine = Self {
            run_id,
            config,
            seed: None,
            ctx: SimulationContext { state, subject },
            phase: Phase::Setup,
            cursor: 0,
            last_reaction: None,
            events: Vec::new(),
            store: None,
            journal: Vec::new(),
        };
        log::info!(
            "Run {} initialized: {} the {} with the {}",
            engine.run_id,
            engine.ctx.subject.name,
            engine.ctx.subject.species.label(),
            tool
        );
        engine.emit(SimEvent::RunInitialized {
            run_id: engine.run_id.clone(),
            seed: None,
            subject: engine.ctx.subject.name.clone(),
            species: engine.ctx.subject.species,
            tool,
        })?;
        engine.begin_round()?;
        Ok(engine)
    }

    /// Fresh run driven by the production RNG streams of `seed`.
    pub fn setup_seeded(run_id: RunId, config: GameConfig, seed: u64, options: SetupOptions) -> SimResult<Self> {
        let bank = RngBank::new(seed);
        let mut selection = bank.stream(RngStream::SubjectSelection);
        let mut slot_roll = bank.stream(RngStream::SlotRoll);
        let mut engine = Self::setup(run_id, config, &mut selection, &mut slot_roll, options)?;
        engine.seed = Some(seed);
        if let Some(SimEvent::RunInitialized { seed: logged, .. }) = engine.events.first_mut() {
            *logged = Some(seed);
        }
        Ok(engine)
    }

    /// Seeded run on the built-in tables, for tests.
    pub fn build_test(run_id: RunId, seed: u64) -> SimResult<Self> {
        Self::setup_seeded(run_id, GameConfig::default_test(), seed, SetupOptions::default())
    }

    /// Resume a game read back by the gateway.
    pub fn restore(run_id: RunId, config: GameConfig, loaded: LoadedGame) -> SimResult<Self> {
        let tool_idx = loaded.state.tool_idx as usize;
        if config.catalog.tool(tool_idx).is_none() {
            return Err(SimError::UnknownTool { index: tool_idx });
        }
        let mut engine = Self {
            run_id,
            config,
            seed: None,
            ctx: SimulationContext {
                state: loaded.state,
                subject: loaded.subject,
            },
            phase: Phase::Setup,
            cursor: 0,
            last_reaction: None,
            events: Vec::new(),
            store: None,
            journal: Vec::new(),
        };
        engine.resume()?;
        Ok(engine)
    }

    /// Journal every event from now on, including those still queued.
    pub fn attach_store(&mut self, store: SimStore) -> SimResult<()> {
        let entries = self
            .events
            .iter()
            .map(|event| log_entry(&self.run_id, self.ctx.state.turns, event))
            .collect::<SimResult<Vec<_>>>()?;
        store.in_transaction(|store| {
            store.insert_run(&self.run_id, self.seed, env!("CARGO_PKG_VERSION"))?;
            entries.iter().try_for_each(|entry| store.append_event(entry))
        })?;
        self.store = Some(store);
        Ok(())
    }

    pub fn store(&self) -> Option<&SimStore> {
        self.store.as_ref()
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SimulationState {
        &self.ctx.state
    }

    pub fn subject(&self) -> &Subject {
        &self.ctx.subject
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn last_reaction(&self) -> Option<&Reaction> {
        self.last_reaction.as_ref()
    }

    pub fn tool(&self) -> SimResult<&ToolSpec> {
        let index = self.ctx.state.tool_idx as usize;
        self.config.catalog.tool(index).ok_or(SimError::UnknownTool { index })
    }

    pub fn player_name(&self) -> &str {
        self.ctx.state.display_name(&self.config.rules.default_player_name)
    }

    /// The slot the next `treat` call applies to, if a treatment is expected.
    pub fn pending_slot(&self) -> Option<usize> {
        match self.phase {
            Phase::AwaitingTreatment | Phase::TreatmentApplied if self.cursor < SLOT_COUNT => Some(self.cursor),
            _ => None,
        }
    }

    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            run_id: self.run_id.clone(),
            phase: self.phase,
            state: self.ctx.state.clone(),
            subject: self.ctx.subject.clone(),
        }
    }

    // ── Transitions ────────────────────────────────────────────

    /// Apply one treatment to the pending slot.
    ///
    /// If the journal write fails the engine is left exactly as it was.
    pub fn treat(&mut self, raw_dip: i32, raw_effort: i32) -> SimResult<TreatmentOutcome> {
        self.require(&[Phase::AwaitingTreatment, Phase::TreatmentApplied], "treat")?;
        self.transact(|engine| engine.apply_treatment(raw_dip, raw_effort))
    }

    fn apply_treatment(&mut self, raw_dip: i32, raw_effort: i32) -> SimResult<TreatmentOutcome> {
        let slot = self.cursor;
        let turn = self.ctx.state.turns;
        let tool = self.tool()?.clone();
        let modifiers = self.ctx.subject.species.modifiers();

        let (dip, effort) = tool.clamp_inputs(raw_dip, raw_effort);
        let consumed = fluoride_consumed(dip, effort, modifiers);
        let available = self.ctx.state.fluoride;
        if consumed > available {
            log::info!("Run {}: fluoride exhausted ({consumed} needed, {available} left)", self.run_id);
            self.phase = Phase::Exhausted;
            self.emit(SimEvent::ResourceExhausted { turn, slot, needed: consumed, available })?;
            self.take_snapshot()?;
            return Ok(TreatmentOutcome::Exhausted { slot, needed: consumed, available });
        }

        let rules = &self.config.rules;
        let (bonus_treatment, bonus_slot_healed) = (rules.bonus_treatment, rules.bonus_slot_healed);
        let state = &mut self.ctx.state;
        state.fluoride -= consumed;
        state.fluoride_used = consumed;
        state.push_inputs(dip, effort);

        let subject = &mut self.ctx.subject;
        let health_before = subject.slots[slot].health();
        let health_after = subject.slots[slot].heal(health_gain(dip, effort, &tool, modifiers));
        let slot_healed = health_after >= MAX_HEALTH && health_before < MAX_HEALTH;

        state.score = state.score.saturating_add(bonus_treatment);
        if slot_healed {
            state.score = state.score.saturating_add(bonus_slot_healed);
        }

        let reaction = react(
            effort,
            subject.patience,
            subject.pain_tolerance,
            health_before,
            tool.pain_factor,
            &subject.name,
        );
        subject.patience = reaction.patience;
        subject.mood = reaction.mood;
        subject.patience_level = reaction.patience_level;

        let (fluoride_left, score) = (state.fluoride, state.score);
        self.emit(SimEvent::TreatmentApplied {
            turn,
            slot,
            dip,
            effort,
            consumed,
            fluoride_left,
            health_before,
            health_after,
            score,
        })?;
        self.emit(SimEvent::PatientReacted {
            turn,
            slot,
            mood: reaction.mood,
            patience: reaction.patience,
            patience_level: reaction.patience_level,
            phrase: reaction.phrase.clone(),
        })?;
        self.last_reaction = Some(reaction.clone());

        self.cursor += 1;
        self.phase = Phase::TreatmentApplied;
        self.skip_healed_slots()?;

        Ok(TreatmentOutcome::Applied(TreatmentReport {
            slot,
            dip,
            effort,
            consumed,
            health_before,
            health_after,
            slot_healed,
            reaction,
            phase: self.phase,
        }))
    }

    /// Act on the player's end-of-round answer.
    ///
    /// A failed save leaves the engine waiting for another answer.
    pub fn decide(
        &mut self,
        command: PlayerCommand,
        gateway: &PersistenceGateway,
        save_path: &Path,
    ) -> SimResult<Phase> {
        self.require(&[Phase::AwaitingContinue], "decide")?;
        self.transact(|engine| {
            match command {
                PlayerCommand::Continue => engine.begin_round()?,
                PlayerCommand::Quit => {
                    engine.phase = Phase::Quit;
                    engine.emit(SimEvent::GameQuit {
                        turn: engine.ctx.state.turns,
                        score: engine.ctx.state.score,
                    })?;
                    engine.take_snapshot()?;
                }
                PlayerCommand::Save => {
                    engine.write_save(gateway, save_path)?;
                    engine.phase = Phase::Saved;
                    engine.take_snapshot()?;
                }
            }
            Ok(engine.phase)
        })
    }

    /// Persist the current context without changing phase.
    pub fn save(&mut self, gateway: &PersistenceGateway, path: &Path) -> SimResult<()> {
        self.transact(|engine| engine.write_save(gateway, path))
    }

    fn write_save(&mut self, gateway: &PersistenceGateway, path: &Path) -> SimResult<()> {
        gateway.save(path, &self.ctx.state, &self.ctx.subject)?;
        self.emit(SimEvent::GameSaved {
            turn: self.ctx.state.turns,
            path: path.display().to_string(),
        })
    }

    /// Best-effort dump of the current context on an abnormal exit.
    pub fn dump_diagnostic(&self, gateway: &PersistenceGateway, path: &Path) -> SimResult<()> {
        log::warn!("Run {}: writing diagnostic dump to {}", self.run_id, path.display());
        gateway.save(path, &self.ctx.state, &self.ctx.subject)?;
        Ok(())
    }

    /// Replace the whole context with the game at `path`.
    ///
    /// On failure nothing changes and the error is returned.
    pub fn load(&mut self, gateway: &PersistenceGateway, path: &Path) -> SimResult<()> {
        let loaded = gateway.load(path)?;
        let tool_idx = loaded.state.tool_idx as usize;
        if self.config.catalog.tool(tool_idx).is_none() {
            return Err(SimError::UnknownTool { index: tool_idx });
        }
        self.transact(|engine| {
            engine.ctx = SimulationContext {
                state: loaded.state,
                subject: loaded.subject,
            };
            engine.last_reaction = None;
            engine.emit(SimEvent::GameLoaded {
                turn: engine.ctx.state.turns,
                path: path.display().to_string(),
            })?;
            engine.resume()
        })
    }

    // ── Internals ──────────────────────────────────────────────

    /// Run `op`, then commit its journal writes. Any error restores the
    /// engine to where it stood before `op`.
    fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> SimResult<T>) -> SimResult<T> {
        let checkpoint = Checkpoint {
            ctx: self.ctx.clone(),
            phase: self.phase,
            cursor: self.cursor,
            last_reaction: self.last_reaction.clone(),
            events_len: self.events.len(),
        };
        let result = op(self).and_then(|value| self.flush_journal().map(|()| value));
        if let Err(err) = &result {
            log::warn!("Run {}: operation rolled back: {err}", self.run_id);
            self.ctx = checkpoint.ctx;
            self.phase = checkpoint.phase;
            self.cursor = checkpoint.cursor;
            self.last_reaction = checkpoint.last_reaction;
            self.events.truncate(checkpoint.events_len);
            self.journal.clear();
        }
        result
    }

    fn flush_journal(&mut self) -> SimResult<()> {
        let writes = std::mem::take(&mut self.journal);
        let Some(store) = &self.store else {
            return Ok(());
        };
        if writes.is_empty() {
            return Ok(());
        }
        store.in_transaction(|store| {
            writes.iter().try_for_each(|write| match write {
                JournalWrite::Event(entry) => store.append_event(entry),
                JournalWrite::Turn(row) => store.record_turn(row),
                JournalWrite::Snapshot { turn, json } => store.save_snapshot(&self.run_id, *turn, json),
            })
        })
    }

    fn require(&self, allowed: &[Phase], operation: &'static str) -> SimResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(SimError::InvalidPhase { operation, phase: self.phase })
        }
    }

    /// Enter the phase a freshly loaded context starts in. A subject that
    /// was already healed when saved has been scored; it goes straight to
    /// `Won` with no further bonuses.
    fn resume(&mut self) -> SimResult<()> {
        match resume_phase(&self.ctx.subject) {
            Phase::Won => {
                self.cursor = SLOT_COUNT;
                self.phase = Phase::Won;
                log::info!("Run {}: loaded subject is already healed", self.run_id);
                Ok(())
            }
            _ => self.begin_round(),
        }
    }

    fn begin_round(&mut self) -> SimResult<()> {
        self.cursor = 0;
        self.phase = Phase::AwaitingTreatment;
        self.skip_healed_slots()
    }

    /// Move the cursor past fully healed slots; close the round at the end.
    fn skip_healed_slots(&mut self) -> SimResult<()> {
        while self.cursor < SLOT_COUNT && self.ctx.subject.slots[self.cursor].is_healed() {
            self.emit(SimEvent::SlotSkipped {
                turn: self.ctx.state.turns,
                slot: self.cursor,
            })?;
            self.cursor += 1;
        }
        if self.cursor >= SLOT_COUNT {
            self.complete_round()?;
        }
        Ok(())
    }

    fn complete_round(&mut self) -> SimResult<()> {
        let rules = &self.config.rules;
        let (bonus_round, bonus_all_healed) = (rules.bonus_round, rules.bonus_all_healed);
        let finished_turn = self.ctx.state.turns;

        let state = &mut self.ctx.state;
        state.turns = state.turns.saturating_add(1);
        state.score = state.score.saturating_add(bonus_round);
        self.emit(SimEvent::RoundCompleted {
            turn: finished_turn,
            score: self.ctx.state.score,
        })?;

        let healed = self.ctx.subject.all_healed();
        if healed {
            let state = &mut self.ctx.state;
            state.score = state.score.saturating_add(bonus_all_healed);
            self.phase = Phase::Won;
            log::info!("Run {}: every fang healed, score {}", self.run_id, self.ctx.state.score);
            self.emit(SimEvent::SubjectHealed {
                turn: finished_turn,
                score: self.ctx.state.score,
            })?;
        } else {
            self.phase = Phase::AwaitingContinue;
        }

        self.journal_turn(finished_turn, if healed { "healed" } else { "" })?;
        if healed {
            self.take_snapshot()?;
        }
        Ok(())
    }

    fn emit(&mut self, event: SimEvent) -> SimResult<()> {
        if self.store.is_some() {
            let entry = log_entry(&self.run_id, self.ctx.state.turns, &event)?;
            self.journal.push(JournalWrite::Event(entry));
        }
        self.events.push(event);
        Ok(())
    }

    fn journal_turn(&mut self, turn: i32, annotation: &str) -> SimResult<()> {
        if self.store.is_none() {
            return Ok(());
        }
        let state = &self.ctx.state;
        let subject = &self.ctx.subject;
        let row = TurnRow {
            run_id: self.run_id.clone(),
            turn,
            player: self.player_name().to_string(),
            subject_idx: state.subject_idx,
            score: state.score,
            fluoride: state.fluoride,
            tool_dip: state.dip,
            tool_effort: state.effort,
            mood: format!("{:?}", subject.mood).to_lowercase(),
            patience: subject.patience,
            fangs: subject.slots.map(|slot| slot.health()),
            annotation: annotation.to_string(),
        };
        self.journal.push(JournalWrite::Turn(row));
        Ok(())
    }

    fn take_snapshot(&mut self) -> SimResult<()> {
        if self.store.is_none() {
            return Ok(());
        }
        let turn = self.ctx.state.turns;
        let json = serde_json::to_string(&self.snapshot())?;
        self.journal.push(JournalWrite::Snapshot { turn, json });
        log::debug!("Snapshot queued at turn {turn}");
        Ok(())
    }
}

fn log_entry(run_id: &str, turn: i32, event: &SimEvent) -> SimResult<EventLogEntry> {
    Ok(EventLogEntry {
        id: None,
        run_id: run_id.to_string(),
        turn,
        event_type: event.type_name().to_string(),
        payload: serde_json::to_string(event)?,
    })
}

fn check_player_name(name: &str, max_len: usize) -> SimResult<()> {
    if name.contains('\0') {
        return Err(SimError::InvalidName("contains a NUL character".to_string()));
    }
    if name.trim().is_empty() {
        return Err(SimError::InvalidName("is empty".to_string()));
    }
    if name.chars().count() > max_len {
        return Err(SimError::InvalidName(format!("longer than {max_len} characters")));
    }
    Ok(())
}
