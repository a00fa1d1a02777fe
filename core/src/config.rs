use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CreatureTemplate, ToolSpec};

/// Every tunable constant of a run, plus the content tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub rules: RulesConfig,
    pub persistence: PersistenceConfig,
    pub catalog: Catalog,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RulesConfig {
    pub starting_fluoride: i32,
    pub starting_score: i32,
    pub starting_turns: i32,
    /// Awarded for every applied treatment.
    pub bonus_treatment: i32,
    /// Awarded when a treatment brings a slot to full health.
    pub bonus_slot_healed: i32,
    /// Awarded for every completed round.
    pub bonus_round: i32,
    /// Awarded once when every slot is at full health.
    pub bonus_all_healed: i32,
    pub default_player_name: String,
    pub max_name_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub default_save_file: String,
    /// Bound on every blocking wait for a worker.
    pub worker_timeout_ms: u64,
    /// Larger files are rejected without being decoded.
    pub max_record_bytes: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            starting_fluoride: 200,
            starting_score: 10,
            starting_turns: 1,
            bonus_treatment: 1,
            bonus_slot_healed: 3,
            bonus_round: 5,
            bonus_all_healed: 100,
            default_player_name: "Buffy".to_string(),
            max_name_len: 25,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            default_save_file: ".buffy_save.btfd".to_string(),
            worker_timeout_ms: 5_000,
            max_record_bytes: 64 * 1024,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rules: RulesConfig::default(),
            persistence: PersistenceConfig::default(),
            catalog: Catalog::builtin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GameFile {
    rules: RulesConfig,
    persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolsFile {
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreaturesFile {
    creatures: Vec<CreatureTemplate>,
}

impl GameConfig {
    /// Load from the data/ directory.
    /// In tests, use GameConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let game_path = format!("{data_dir}/game.json");
        let game_content = std::fs::read_to_string(&game_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {game_path}: {e}"))?;
        let game_file: GameFile = serde_json::from_str(&game_content)?;

        let tools_path = format!("{data_dir}/tools.json");
        let tools_content = std::fs::read_to_string(&tools_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {tools_path}: {e}"))?;
        let tools_file: ToolsFile = serde_json::from_str(&tools_content)?;

        let creatures_path = format!("{data_dir}/creatures.json");
        let creatures_content = std::fs::read_to_string(&creatures_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {creatures_path}: {e}"))?;
        let creatures_file: CreaturesFile = serde_json::from_str(&creatures_content)?;

        if tools_file.tools.is_empty() {
            anyhow::bail!("{tools_path} lists no tools");
        }
        if creatures_file.creatures.is_empty() {
            anyhow::bail!("{creatures_path} lists no creatures");
        }
        for tool in &tools_file.tools {
            if let Some(field) = tool.negative_field() {
                anyhow::bail!("{tools_path}: tool '{}' has a negative {field}", tool.name);
            }
        }
        for creature in &creatures_file.creatures {
            if let Some(field) = creature.negative_field() {
                anyhow::bail!("{creatures_path}: creature '{}' has a negative {field}", creature.name);
            }
        }
        if game_file.rules.starting_fluoride < 0 {
            anyhow::bail!("{game_path}: starting_fluoride is negative");
        }

        Ok(Self {
            rules: game_file.rules,
            persistence: game_file.persistence,
            catalog: Catalog {
                tools: tools_file.tools,
                creatures: creatures_file.creatures,
            },
        })
    }

    /// Built-in tables; no filesystem access.
    pub fn default_test() -> Self {
        Self::default()
    }

    pub fn worker_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persistence.worker_timeout_ms)
    }
}
