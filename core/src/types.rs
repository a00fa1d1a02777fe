//! Shared primitive types used across the entire simulation.

/// A completed-round counter. One turn = one pass over all four slots.
pub type Turn = i32;

/// The canonical run identifier.
pub type RunId = String;

/// Slot health, always within `0..=MAX_HEALTH`.
pub type Health = i32;

/// Every subject has exactly this many treatable fangs.
pub const SLOT_COUNT: usize = 4;

pub const MAX_HEALTH: Health = 100;

/// Dental names and universal tooth numbers, indexed by slot.
pub const SLOT_NAMES: [(&str, u8); SLOT_COUNT] = [
    ("Maxillary Right Canine", 6),
    ("Maxillary Left Canine", 11),
    ("Mandibular Left Canine", 22),
    ("Mandibular Right Canine", 27),
];

pub fn slot_name(index: usize) -> &'static str {
    SLOT_NAMES.get(index).map(|(name, _)| *name).unwrap_or("Unknown Fang")
}

/// Fresh random run identifier.
pub fn new_run_id() -> RunId {
    uuid::Uuid::new_v4().to_string()
}
