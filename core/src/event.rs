//! Everything the engine reports about a run.
//!
//! Events are queued on the engine for the UI and, when a store is
//! attached, appended to the journal as JSON.
//! Variants are only ever appended — never removed or reordered.

use serde::{Deserialize, Serialize};

use crate::{
    catalog::Species,
    reaction::{Mood, PatienceLevel},
    types::{Health, RunId, Turn},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Run lifecycle ──────────────────────────────
    RunInitialized {
        run_id: RunId,
        seed: Option<u64>,
        subject: String,
        species: Species,
        tool: String,
    },
    GameLoaded {
        turn: Turn,
        path: String,
    },
    GameSaved {
        turn: Turn,
        path: String,
    },
    GameQuit {
        turn: Turn,
        score: i32,
    },

    // ── Treatment ──────────────────────────────────
    TreatmentApplied {
        turn: Turn,
        slot: usize,
        dip: i32,
        effort: i32,
        consumed: i32,
        fluoride_left: i32,
        health_before: Health,
        health_after: Health,
        score: i32,
    },
    SlotSkipped {
        turn: Turn,
        slot: usize,
    },
    PatientReacted {
        turn: Turn,
        slot: usize,
        mood: Mood,
        patience: i32,
        patience_level: PatienceLevel,
        phrase: String,
    },
    ResourceExhausted {
        turn: Turn,
        slot: usize,
        needed: i32,
        available: i32,
    },

    // ── Round ──────────────────────────────────────
    RoundCompleted {
        turn: Turn,
        score: i32,
    },
    SubjectHealed {
        turn: Turn,
        score: i32,
    },
}

impl SimEvent {
    /// Stable name for the journal's event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunInitialized { .. }    => "run_initialized",
            Self::GameLoaded { .. }        => "game_loaded",
            Self::GameSaved { .. }         => "game_saved",
            Self::GameQuit { .. }          => "game_quit",
            Self::TreatmentApplied { .. }  => "treatment_applied",
            Self::SlotSkipped { .. }       => "slot_skipped",
            Self::PatientReacted { .. }    => "patient_reacted",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::RoundCompleted { .. }    => "round_completed",
            Self::SubjectHealed { .. }     => "subject_healed",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub turn: Turn,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}
