//! Content tables: tools and creature templates.
//!
//! Read-only reference data. The engine looks entries up by index and
//! never mutates them during a run.

use serde::{Deserialize, Serialize};

/// Species carries every per-species modifier so the engine resolves it
/// once per treatment instead of comparing names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Vampire,
    Werewolf,
    Ghoul,
    Demon,
}

impl Species {
    pub const ALL: [Species; 4] = [
        Species::Vampire,
        Species::Werewolf,
        Species::Ghoul,
        Species::Demon,
    ];

    /// Stable on-disk tag. Append only.
    pub fn tag(self) -> u8 {
        match self {
            Self::Vampire => 0,
            Self::Werewolf => 1,
            Self::Ghoul => 2,
            Self::Demon => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.tag() == tag)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Vampire => "Vampire",
            Self::Werewolf => "Werewolf",
            Self::Ghoul => "Ghoul",
            Self::Demon => "Demon",
        }
    }

    pub fn modifiers(self) -> SpeciesModifiers {
        match self {
            Self::Vampire => SpeciesModifiers { consumption_permille: 1000, healing_permille: 1000 },
            // Thick enamel drinks fluoride and resists it.
            Self::Werewolf => SpeciesModifiers { consumption_permille: 1250, healing_permille: 900 },
            Self::Ghoul => SpeciesModifiers { consumption_permille: 900, healing_permille: 1100 },
            Self::Demon => SpeciesModifiers { consumption_permille: 1500, healing_permille: 800 },
        }
    }
}

/// Fixed-point multipliers, 1000 = x1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeciesModifiers {
    pub consumption_permille: i64,
    pub healing_permille: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Capacity of the dip input.
    pub max_dip: i32,
    /// Capacity of the effort input.
    pub max_effort: i32,
    /// Percent multiplier on health gain (100 = x1.0).
    pub effectiveness_pct: i32,
    /// Percent multiplier on health gain (100 = x1.0).
    pub durability_pct: i32,
    pub pain_factor: i32,
}

impl ToolSpec {
    /// Clamp raw player inputs to this tool's capacity.
    /// A negative capacity counts as zero.
    pub fn clamp_inputs(&self, dip: i32, effort: i32) -> (i32, i32) {
        (
            dip.clamp(0, self.max_dip.max(0)),
            effort.clamp(0, self.max_effort.max(0)),
        )
    }

    /// Name of the first field holding a negative value, if any.
    pub fn negative_field(&self) -> Option<&'static str> {
        [
            ("max_dip", self.max_dip),
            ("max_effort", self.max_effort),
            ("effectiveness_pct", self.effectiveness_pct),
            ("durability_pct", self.durability_pct),
            ("pain_factor", self.pain_factor),
        ]
        .into_iter()
        .find(|(_, value)| *value < 0)
        .map(|(field, _)| field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatureTemplate {
    pub name: String,
    pub species: Species,
    pub age: i32,
    pub patience: i32,
    pub pain_tolerance: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub tools: Vec<ToolSpec>,
    pub creatures: Vec<CreatureTemplate>,
}

impl CreatureTemplate {
    pub fn negative_field(&self) -> Option<&'static str> {
        [
            ("age", self.age),
            ("patience", self.patience),
            ("pain_tolerance", self.pain_tolerance),
        ]
        .into_iter()
        .find(|(_, value)| *value < 0)
        .map(|(field, _)| field)
    }
}

impl Catalog {
    pub fn tool(&self, index: usize) -> Option<&ToolSpec> {
        self.tools.get(index)
    }

    pub fn creature(&self, index: usize) -> Option<&CreatureTemplate> {
        self.creatures.get(index)
    }

    /// The tables shipped with the game.
    pub fn builtin() -> Self {
        Self {
            tools: vec![
                tool("Slayer's Dagger", "A stake-sharp blade dipped in fluoride paste.", 10, 5, 100, 100, 2),
                tool("Fang Brush", "Soft bristles. Slow, but nobody bites.", 5, 2, 100, 100, 1),
                tool("Stake Swab", "Oversized swab on a hawthorn stake. Wears out fast.", 15, 8, 120, 80, 3),
            ],
            creatures: vec![
                creature("Count Varga", Species::Vampire, 412, 10, 2),
                creature("Lupa Greymane", Species::Werewolf, 57, 8, 4),
                creature("Mortimer", Species::Ghoul, 131, 6, 1),
                creature("Azrael", Species::Demon, 999, 12, 5),
                creature("Nyx", Species::Vampire, 100, 9, 3),
            ],
        }
    }
}

fn tool(
    name: &str,
    description: &str,
    max_dip: i32,
    max_effort: i32,
    effectiveness_pct: i32,
    durability_pct: i32,
    pain_factor: i32,
) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        max_dip,
        max_effort,
        effectiveness_pct,
        durability_pct,
        pain_factor,
    }
}

fn creature(name: &str, species: Species, age: i32, patience: i32, pain_tolerance: i32) -> CreatureTemplate {
    CreatureTemplate {
        name: name.to_string(),
        species,
        age,
        patience,
        pain_tolerance,
    }
}
