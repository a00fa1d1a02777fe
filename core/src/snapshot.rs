//! Snapshot serialization — full simulation state to/from JSON.
//!
//! Taken at every terminal transition and stored in the journal; the CLI
//! also prints one for `--inspect`. Unlike the binary save record, this is
//! for people and tooling, not for resuming.

use serde::{Deserialize, Serialize};

use crate::{
    engine::Phase,
    state::{SimulationState, Subject},
    types::RunId,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimSnapshot {
    pub run_id: RunId,
    pub phase: Phase,
    pub state: SimulationState,
    pub subject: Subject,
}

impl SimSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
