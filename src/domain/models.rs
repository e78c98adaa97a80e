use crate::domain::week_calendar::{week_key_for_date, WeekKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterRef {
    pub name: String,
    pub index: u32,
}

impl CharacterRef {
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "character.name")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Normal,
    Chaos,
    Hard,
    Hell,
    Extreme,
}

impl Difficulty {
    /// Rank used when a clear has to be implied; Hard and Hell share a tier.
    pub fn priority(self) -> u8 {
        match self {
            Difficulty::Extreme => 4,
            Difficulty::Hard | Difficulty::Hell => 3,
            Difficulty::Chaos => 2,
            Difficulty::Normal => 1,
            Difficulty::Easy => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Chaos => "Chaos",
            Difficulty::Hard => "Hard",
            Difficulty::Hell => "Hell",
            Difficulty::Extreme => "Extreme",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "normal" => Ok(Difficulty::Normal),
            "chaos" => Ok(Difficulty::Chaos),
            "hard" => Ok(Difficulty::Hard),
            "hell" => Ok(Difficulty::Hell),
            "extreme" => Ok(Difficulty::Extreme),
            other => Err(format!("invalid difficulty: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossClearRecord {
    pub character: String,
    pub character_index: u32,
    pub boss_name: String,
    pub difficulty: Difficulty,
    pub cleared_at: DateTime<Utc>,
    pub week_key: WeekKey,
}

impl BossClearRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.character, "boss_clear.character")?;
        validate_non_empty(&self.boss_name, "boss_clear.boss_name")?;
        if week_key_for_date(self.cleared_at) != self.week_key {
            return Err("boss_clear.cleared_at must fall inside boss_clear.week_key".to_string());
        }
        Ok(())
    }

    pub fn key(&self) -> BossClearKey {
        BossClearKey::new(&self.character, &self.boss_name, self.difficulty)
    }
}

/// Fields that make a pitched item record unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PitchedItemIdentity {
    pub character: String,
    pub boss_name: String,
    pub item_name: String,
    pub week_key: WeekKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchedItemRecord {
    pub character: String,
    pub character_index: u32,
    pub boss_name: String,
    pub item_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_image: Option<String>,
    pub obtained_at: DateTime<Utc>,
    pub week_key: WeekKey,
}

impl PitchedItemRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.character, "pitched_item.character")?;
        validate_non_empty(&self.boss_name, "pitched_item.boss_name")?;
        validate_non_empty(&self.item_name, "pitched_item.item_name")?;
        Ok(())
    }

    pub fn identity(&self) -> PitchedItemIdentity {
        PitchedItemIdentity {
            character: self.character.clone(),
            boss_name: self.boss_name.clone(),
            item_name: self.item_name.clone(),
            week_key: self.week_key,
        }
    }

    pub fn matches(&self, character: &str, boss_name: &str, item_name: &str) -> bool {
        self.character == character && self.boss_name == boss_name && self.item_name == item_name
    }

    pub fn checked_key(&self) -> PitchedKey {
        PitchedKey {
            character: self.character.clone(),
            character_index: self.character_index,
            boss_name: self.boss_name.clone(),
            item_name: self.item_name.clone(),
            week_key: self.week_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BossClearKey {
    pub character: String,
    pub boss_name: String,
    pub difficulty: Difficulty,
}

impl BossClearKey {
    pub fn new(character: &str, boss_name: &str, difficulty: Difficulty) -> Self {
        Self {
            character: character.to_string(),
            boss_name: boss_name.to_string(),
            difficulty,
        }
    }
}

impl fmt::Display for BossClearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.character, self.boss_name, self.difficulty)
    }
}

/// Composite key of one pitched item checkbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchedKey {
    pub character: String,
    pub character_index: u32,
    pub boss_name: String,
    pub item_name: String,
    pub week_key: WeekKey,
}

impl fmt::Display for PitchedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.character, self.character_index, self.boss_name, self.item_name, self.week_key
        )
    }
}

pub type CheckedState = BTreeMap<BossClearKey, bool>;
pub type PitchedCheckedState = BTreeMap<PitchedKey, bool>;

pub fn checked_state_from_clears(records: &[BossClearRecord]) -> CheckedState {
    records.iter().map(|record| (record.key(), true)).collect()
}

pub fn pitched_state_for_week(records: &[PitchedItemRecord], week: &WeekKey) -> PitchedCheckedState {
    records
        .iter()
        .filter(|record| record.week_key == *week)
        .map(|record| (record.checked_key(), true))
        .collect()
}

/// Cached bundle for one week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekSnapshot {
    pub week_key: WeekKey,
    pub checked_state: CheckedState,
    pub boss_clears: Vec<BossClearRecord>,
    pub pitched_items: Vec<PitchedItemRecord>,
    pub has_data: bool,
}

impl WeekSnapshot {
    pub fn empty(week_key: WeekKey) -> Self {
        Self {
            week_key,
            checked_state: CheckedState::new(),
            boss_clears: Vec::new(),
            pitched_items: Vec::new(),
            has_data: false,
        }
    }

    pub fn from_records(
        week_key: WeekKey,
        boss_clears: Vec<BossClearRecord>,
        pitched_items: Vec<PitchedItemRecord>,
    ) -> Self {
        let boss_clears: Vec<BossClearRecord> = boss_clears
            .into_iter()
            .filter(|record| record.week_key == week_key)
            .collect();
        let pitched_items: Vec<PitchedItemRecord> = pitched_items
            .into_iter()
            .filter(|record| record.week_key == week_key)
            .collect();
        let checked_state = checked_state_from_clears(&boss_clears);
        let has_data = !boss_clears.is_empty() || !pitched_items.is_empty();
        Self {
            week_key,
            checked_state,
            boss_clears,
            pitched_items,
            has_data,
        }
    }

    pub fn is_boss_cleared(&self, character: &str, boss_name: &str) -> bool {
        self.checked_state
            .iter()
            .any(|(key, checked)| *checked && key.character == character && key.boss_name == boss_name)
    }

    pub(crate) fn refresh_has_data(&mut self) {
        self.has_data = self.checked_state.values().any(|checked| *checked)
            || !self.boss_clears.is_empty()
            || !self.pitched_items.is_empty();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    New,
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalAnalysis {
    pub has_historical_data: bool,
    pub oldest_historical_week: Option<WeekKey>,
    pub user_type: UserType,
    pub adaptive_week_limit: u32,
}

impl HistoricalAnalysis {
    pub fn fallback(default_week_limit: u32) -> Self {
        Self {
            has_historical_data: false,
            oldest_historical_week: None,
            user_type: UserType::New,
            adaptive_week_limit: default_week_limit,
        }
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
