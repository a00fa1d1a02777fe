//! Patient reaction model.
//!
//! Gentle treatment pleases the patient but slow cleanings wear their
//! patience down; hard scrubbing is quick but painful. The evaluator is a
//! pure function of the inputs; the engine stores the results on the subject.

use serde::{Deserialize, Serialize};

use crate::types::{Health, MAX_HEALTH};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy = 0,
    Unhappy = 1,
    Angry = 2,
}

impl Mood {
    pub fn from_pain(pain: i32) -> Self {
        if pain > 8 {
            Self::Angry
        } else if pain > 4 {
            Self::Unhappy
        } else {
            Self::Happy
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Happy),
            1 => Some(Self::Unhappy),
            2 => Some(Self::Angry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatienceLevel {
    Impatient = 0,
    Calm = 1,
    Bliss = 2,
}

impl PatienceLevel {
    pub fn from_patience(patience: i32) -> Self {
        if patience > 7 {
            Self::Bliss
        } else if patience > 3 {
            Self::Calm
        } else {
            Self::Impatient
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Impatient),
            1 => Some(Self::Calm),
            2 => Some(Self::Bliss),
            _ => None,
        }
    }
}

/// Indexed by `mood * 3 + patience_level`. `{}` is the patient's name.
const PHRASES: [&str; 9] = [
    "{} bares fangs, eyes narrowed in ancient impatience.",
    "A low growl escapes. Immortality has not made {} more patient.",
    "{} sighs theatrically, fangs glinting, clearly unimpressed.",
    "A sharp hiss. Centuries of tolerance wearing thin for {}.",
    "{} arches a brow, lips curled in a wry, undead smirk.",
    "A nod of approval from {}, as regal as a creature of the night can muster.",
    "A guttural snarl: 'Careful, mortal. {} does bite back.'",
    "{} winces, but the sarcasm is sharper than the canines.",
    "A rare, genuine smile: 'Efficient. You may live another night,' {} intones.",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub phrase: String,
    pub mood: Mood,
    pub patience_level: PatienceLevel,
    pub patience: i32,
    pub pain: i32,
}

/// Derive the patient's reaction to one treatment.
///
/// `slot_health` is the health of the slot before the treatment landed;
/// patience only decays while that slot still needed work.
pub fn react(
    effort: i32,
    prior_patience: i32,
    pain_tolerance: i32,
    slot_health: Health,
    tool_pain_factor: i32,
    subject_name: &str,
) -> Reaction {
    let patience = if slot_health < MAX_HEALTH {
        (prior_patience - 1).max(0)
    } else {
        prior_patience.max(0)
    };

    let pain = pain_inflicted(effort, pain_tolerance, slot_health, tool_pain_factor);
    let mood = Mood::from_pain(pain);
    let patience_level = PatienceLevel::from_patience(patience);

    Reaction {
        phrase: phrase_for(mood as usize * 3 + patience_level as usize, subject_name),
        mood,
        patience_level,
        patience,
        pain,
    }
}

/// Dirtier fangs hurt more: `effort * factor - tolerance + (100 - health) / 10`, floored at 0.
pub fn pain_inflicted(effort: i32, pain_tolerance: i32, slot_health: Health, tool_pain_factor: i32) -> i32 {
    let raw = i64::from(effort) * i64::from(tool_pain_factor) - i64::from(pain_tolerance)
        + (i64::from(MAX_HEALTH) - i64::from(slot_health)) / 10;
    raw.clamp(0, i64::from(i32::MAX)) as i32
}

fn phrase_for(index: usize, subject_name: &str) -> String {
    let name = if subject_name.is_empty() { "the patient" } else { subject_name };
    PHRASES
        .get(index)
        .map(|template| template.replace("{}", name))
        .unwrap_or_default()
}
