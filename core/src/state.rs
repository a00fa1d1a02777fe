//! The simulation's data model: run counters, the subject, and its slots.
//!
//! Both records are exclusively owned by the engine. The persistence layer
//! only ever sees byte copies of them.

use serde::{Deserialize, Serialize};

use crate::{
    catalog::{Catalog, CreatureTemplate, Species},
    reaction::{Mood, PatienceLevel},
    rng::RandomSource,
    types::{Health, MAX_HEALTH, SLOT_COUNT},
};

/// Run-wide counters and settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationState {
    /// Resource budget. Never negative.
    pub fluoride: i32,
    pub last_dip: i32,
    pub last_effort: i32,
    pub dip: i32,
    pub effort: i32,
    pub subject_idx: i32,
    pub tool_idx: i32,
    pub score: i32,
    pub turns: i32,
    /// Consumption of the most recent treatment.
    pub fluoride_used: i32,
    pub render_mode: bool,
    pub color_mode: bool,
    pub player_name: Option<String>,
}

impl SimulationState {
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.player_name.as_deref().unwrap_or(fallback)
    }

    /// Record a new treatment input, keeping the previous one as "last".
    pub(crate) fn push_inputs(&mut self, dip: i32, effort: i32) {
        self.last_dip = self.dip;
        self.last_effort = self.effort;
        self.dip = dip;
        self.effort = effort;
    }

    /// Every integer field that must never be negative, labelled.
    pub fn integer_fields(&self) -> [(&'static str, i32); 10] {
        [
            ("fluoride", self.fluoride),
            ("last_dip", self.last_dip),
            ("last_effort", self.last_effort),
            ("dip", self.dip),
            ("effort", self.effort),
            ("subject_idx", self.subject_idx),
            ("tool_idx", self.tool_idx),
            ("score", self.score),
            ("turns", self.turns),
            ("fluoride_used", self.fluoride_used),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FangColor {
    White,
    Dull,
    Yellow,
}

impl FangColor {
    pub fn from_health(health: Health) -> Self {
        if health >= 90 {
            Self::White
        } else if health >= 80 {
            Self::Dull
        } else {
            Self::Yellow
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::White => 0,
            Self::Dull => 1,
            Self::Yellow => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Dull => "dull",
            Self::Yellow => "yellow",
        }
    }
}

/// Dirtiest to cleanest.
pub const HEALTH_MARKERS: [char; 7] = ['*', '#', '=', '+', '-', ':', '.'];

/// Art marker for a slot: 60-64 `*` ... 90+ `.`; anything below 60 is `*`.
pub fn health_marker(health: Health) -> char {
    let index = ((health - 60).max(0) / 5) as usize;
    HEALTH_MARKERS[index.min(HEALTH_MARKERS.len() - 1)]
}

/// One treatable fang. Length and sharpness are fixed at creation;
/// health is the only field the simulation changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    length: i32,
    sharpness: i32,
    health: Health,
}

impl Slot {
    pub fn new(length: i32, sharpness: i32, health: Health) -> Self {
        Self {
            length,
            sharpness,
            health: health.clamp(0, MAX_HEALTH),
        }
    }

    /// Unchecked construction for decoded records; range checks run separately.
    pub(crate) fn from_wire(length: i32, sharpness: i32, health: Health) -> Self {
        Self { length, sharpness, health }
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    pub fn sharpness(&self) -> i32 {
        self.sharpness
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// Always derived; there is no stored color to go stale.
    pub fn color(&self) -> FangColor {
        FangColor::from_health(self.health)
    }

    pub fn marker(&self) -> char {
        health_marker(self.health)
    }

    pub fn is_healed(&self) -> bool {
        self.health >= MAX_HEALTH
    }

    /// Add `gain`, clamped to the valid health range. Returns the new health.
    pub(crate) fn heal(&mut self, gain: i32) -> Health {
        self.health = (i64::from(self.health) + i64::from(gain)).clamp(0, i64::from(MAX_HEALTH)) as Health;
        self.health
    }

    /// Random cosmetics, with health biased toward dirty fangs:
    /// 60% land in 60-70, 30% in 71-80, 10% in 90-100.
    pub fn roll(rng: &mut dyn RandomSource) -> Self {
        let length = rng.in_range(4, 6);
        let sharpness = rng.in_range(5, 8);
        let r = rng.below(MAX_HEALTH as u32);
        let health = if r < 60 {
            rng.in_range(60, 70)
        } else if r < 90 {
            rng.in_range(71, 80)
        } else {
            rng.in_range(90, 100)
        };
        Self::new(length, sharpness, health)
    }
}

/// The creature whose fangs are being treated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub age: i32,
    pub name: String,
    pub species: Species,
    pub patience: i32,
    pub pain_tolerance: i32,
    pub mood: Mood,
    pub patience_level: PatienceLevel,
    pub slots: [Slot; SLOT_COUNT],
}

impl Subject {
    pub fn from_template(template: &CreatureTemplate, slots: [Slot; SLOT_COUNT]) -> Self {
        Self {
            age: template.age,
            name: template.name.clone(),
            species: template.species,
            patience: template.patience,
            pain_tolerance: template.pain_tolerance,
            mood: Mood::Happy,
            patience_level: PatienceLevel::from_patience(template.patience),
            slots,
        }
    }

    /// Pick a creature from the catalog and roll its fangs.
    /// Returns the catalog index alongside the subject.
    pub fn generate(
        catalog: &Catalog,
        selection: &mut dyn RandomSource,
        slot_roll: &mut dyn RandomSource,
    ) -> Option<(usize, Self)> {
        if catalog.creatures.is_empty() {
            return None;
        }
        let index = selection.below(catalog.creatures.len() as u32) as usize;
        let template = catalog.creature(index)?;
        let slots = std::array::from_fn(|_| Slot::roll(slot_roll));
        Some((index, Self::from_template(template, slots)))
    }

    pub fn all_healed(&self) -> bool {
        self.slots.iter().all(Slot::is_healed)
    }
}
