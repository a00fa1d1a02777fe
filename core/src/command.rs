use serde::{Deserialize, Serialize};

/// The player's answer at the end of a round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCommand {
    Continue,
    Quit,
    Save,
}

impl PlayerCommand {
    /// Only the first character counts. Anything unrecognized quits.
    pub fn parse(input: &str) -> Self {
        match input.trim_start().chars().next() {
            Some('y' | 'Y' | 'c' | 'C') => Self::Continue,
            Some('s' | 'S') => Self::Save,
            Some('n' | 'N' | 'q' | 'Q') => Self::Quit,
            other => {
                log::debug!("Unrecognized continue answer {other:?}; treating as quit");
                Self::Quit
            }
        }
    }
}
