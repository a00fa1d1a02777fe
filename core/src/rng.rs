//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through a `RandomSource`. In production that is a
//! `StreamRng` derived from the single master seed of the run; tests may
//! substitute any other implementation.
//!
//! Each stream is seeded deterministically from
//! (master_seed XOR stream_index * golden ratio), so adding a stream never
//! changes the sequence an existing stream produces.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// The only randomness the simulation consumes.
pub trait RandomSource {
    /// Roll an integer in [0, n). `n` must be > 0.
    fn below(&mut self, n: u32) -> u32;

    /// Roll an integer in [lo, hi].
    fn in_range(&mut self, lo: i32, hi: i32) -> i32 {
        debug_assert!(hi >= lo);
        lo + self.below((hi - lo + 1) as u32) as i32
    }
}

/// A named, deterministic RNG for a single stream.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }
}

impl RandomSource for StreamRng {
    fn below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "n must be > 0");
        (self.next_u64() % u64::from(n)) as u32
    }
}

/// Every stream for a single run, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn stream(&self, stream: RngStream) -> StreamRng {
        StreamRng::new(self.master_seed, stream as u64).with_name(stream.name())
    }
}

/// Stable stream assignments.
/// NEVER reorder or remove entries — only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngStream {
    SubjectSelection = 0,
    SlotRoll = 1,
}

impl RngStream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubjectSelection => "subject_selection",
            Self::SlotRoll => "slot_roll",
        }
    }
}

/// Replays a fixed list of rolls, cycling when exhausted. Each roll is
/// reduced modulo the requested bound.
#[derive(Debug, Clone)]
pub struct ScriptedRng {
    rolls: Vec<u32>,
    cursor: usize,
}

impl ScriptedRng {
    pub fn new(rolls: Vec<u32>) -> Self {
        assert!(!rolls.is_empty(), "scripted rng needs at least one roll");
        Self { rolls, cursor: 0 }
    }
}

impl RandomSource for ScriptedRng {
    fn below(&mut self, n: u32) -> u32 {
        assert!(n > 0, "n must be > 0");
        let roll = self.rolls[self.cursor % self.rolls.len()];
        self.cursor += 1;
        roll % n
    }
}
