use crate::domain::models::{BossClearRecord, Difficulty, PitchedItemRecord};
use crate::domain::week_calendar::WeekKey;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire shape of a boss clear row. Every field is kept loose so one bad row can be
/// skipped without failing the whole read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BossClearRow {
    pub character: String,
    #[serde(default)]
    pub character_index: u32,
    pub boss_name: String,
    pub difficulty: String,
    pub cleared_at: String,
    pub week_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PitchedItemRow {
    pub character: String,
    #[serde(default)]
    pub character_index: u32,
    pub boss_name: String,
    pub item_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_image: Option<String>,
    pub obtained_at: String,
    pub week_key: String,
}

pub fn encode_boss_clear(record: &BossClearRecord) -> BossClearRow {
    BossClearRow {
        character: record.character.clone(),
        character_index: record.character_index,
        boss_name: record.boss_name.clone(),
        difficulty: record.difficulty.as_str().to_string(),
        cleared_at: record.cleared_at.to_rfc3339(),
        week_key: record.week_key.to_string(),
    }
}

pub fn encode_pitched_item(record: &PitchedItemRecord) -> PitchedItemRow {
    PitchedItemRow {
        character: record.character.clone(),
        character_index: record.character_index,
        boss_name: record.boss_name.clone(),
        item_name: record.item_name.clone(),
        item_image: record
            .item_image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .map(ToOwned::to_owned),
        obtained_at: record.obtained_at.to_rfc3339(),
        week_key: record.week_key.to_string(),
    }
}

pub fn decode_boss_clear(row: &BossClearRow) -> Result<BossClearRecord, InfraError> {
    let record = BossClearRecord {
        character: row.character.trim().to_string(),
        character_index: row.character_index,
        boss_name: row.boss_name.trim().to_string(),
        difficulty: row
            .difficulty
            .parse::<Difficulty>()
            .map_err(InfraError::Remote)?,
        cleared_at: parse_rfc3339_utc(&row.cleared_at, "clearedAt")?,
        week_key: parse_week_key(&row.week_key)?,
    };
    record.validate().map_err(InfraError::Remote)?;
    Ok(record)
}

pub fn decode_pitched_item(row: &PitchedItemRow) -> Result<PitchedItemRecord, InfraError> {
    let record = PitchedItemRecord {
        character: row.character.trim().to_string(),
        character_index: row.character_index,
        boss_name: row.boss_name.trim().to_string(),
        item_name: row.item_name.trim().to_string(),
        item_image: row
            .item_image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .map(ToOwned::to_owned),
        obtained_at: parse_rfc3339_utc(&row.obtained_at, "obtainedAt")?,
        week_key: parse_week_key(&row.week_key)?,
    };
    record.validate().map_err(InfraError::Remote)?;
    Ok(record)
}

/// Decodes every row that can be decoded; the rest are logged and dropped.
pub fn decode_rows<R, T>(
    rows: &[R],
    decode: impl Fn(&R) -> Result<T, InfraError>,
    context: &str,
) -> Vec<T> {
    rows.iter()
        .enumerate()
        .filter_map(|(position, row)| match decode(row) {
            Ok(record) => Some(record),
            Err(error) => {
                log::warn!("skipping malformed {context} row {position}: {error}");
                None
            }
        })
        .collect()
}

pub fn parse_week_key(value: &str) -> Result<WeekKey, InfraError> {
    WeekKey::parse(value).map_err(|error| InfraError::Remote(error.to_string()))
}

pub fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::Remote(format!("invalid {field_name} '{value}': {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> PitchedItemRecord {
        PitchedItemRecord {
            character: "Alice".to_string(),
            character_index: 2,
            boss_name: "Lotus".to_string(),
            item_name: "Total Control".to_string(),
            item_image: Some("/items/tc.png".to_string()),
            obtained_at: parse_rfc3339_utc("2025-03-28T12:00:00Z", "test").expect("valid datetime"),
            week_key: WeekKey::parse("2025-13-13").expect("valid key"),
        }
    }

    #[test]
    fn pitched_item_row_keeps_the_stored_key_form() {
        let mut record = sample_item();
        record.week_key = WeekKey::parse("2025-13").expect("legacy key");
        let row = encode_pitched_item(&record);
        assert_eq!(row.week_key, "2025-13");

        let decoded = decode_pitched_item(&row).expect("decode");
        assert!(decoded.week_key.is_legacy());
        assert_eq!(decoded, record);
    }

    #[test]
    fn rows_use_camel_case_field_names() {
        let value = serde_json::to_value(encode_pitched_item(&sample_item())).expect("serialize");
        assert_eq!(value["characterIndex"], 2);
        assert_eq!(value["weekKey"], "2025-13-13");
        assert!(value.get("obtainedAt").is_some());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let good = encode_pitched_item(&sample_item());
        let mut bad_week = good.clone();
        bad_week.week_key = "13th week".to_string();
        let mut bad_date = good.clone();
        bad_date.obtained_at = "yesterday".to_string();
        let mut blank_item = good.clone();
        blank_item.item_name = " ".to_string();

        let decoded = decode_rows(
            &[bad_week, good, bad_date, blank_item],
            decode_pitched_item,
            "pitched item",
        );
        assert_eq!(decoded, vec![sample_item()]);
    }

    #[test]
    fn boss_clear_rejects_unknown_difficulty() {
        let row = BossClearRow {
            character: "Alice".to_string(),
            character_index: 0,
            boss_name: "Lotus".to_string(),
            difficulty: "Mythic".to_string(),
            cleared_at: "2025-03-28T12:00:00Z".to_string(),
            week_key: "2025-13-13".to_string(),
        };
        assert!(decode_boss_clear(&row).is_err());

        let fixed = BossClearRow {
            difficulty: "hard".to_string(),
            ..row
        };
        let decoded = decode_boss_clear(&fixed).expect("decode");
        assert_eq!(decoded.difficulty, Difficulty::Hard);
    }
}
