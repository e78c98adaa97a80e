use crate::domain::models::{BossClearRecord, PitchedItemRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_codec::{
    decode_boss_clear, decode_pitched_item, decode_rows, encode_boss_clear, encode_pitched_item,
    BossClearRow, PitchedItemRow,
};
use crate::infrastructure::record_store::{RecordFilter, RecordStore};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Runs `task` on a fresh connection off the async runtime.
    async fn run<T, F>(&self, task: F) -> Result<T, InfraError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, InfraError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<T, InfraError> {
            let mut connection = Connection::open(&db_path)?;
            task(&mut connection)
        })
        .await
        .map_err(|error| InfraError::Remote(format!("sqlite task failed: {error}")))?
    }
}

fn load_boss_clear_rows(
    connection: &Connection,
    user_id: &str,
) -> Result<Vec<(i64, BossClearRow)>, InfraError> {
    let mut statement = connection.prepare(
        "SELECT id, character, character_index, boss_name, difficulty, cleared_at, week_key
         FROM boss_clears WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = statement
        .query_map(params![user_id], |row| {
            Ok((
                row.get(0)?,
                BossClearRow {
                    character: row.get(1)?,
                    character_index: row.get(2)?,
                    boss_name: row.get(3)?,
                    difficulty: row.get(4)?,
                    cleared_at: row.get(5)?,
                    week_key: row.get(6)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_pitched_item_rows(
    connection: &Connection,
    user_id: &str,
) -> Result<Vec<(i64, PitchedItemRow)>, InfraError> {
    let mut statement = connection.prepare(
        "SELECT id, character, character_index, boss_name, item_name, item_image, obtained_at, week_key
         FROM pitched_items WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = statement
        .query_map(params![user_id], |row| {
            Ok((
                row.get(0)?,
                PitchedItemRow {
                    character: row.get(1)?,
                    character_index: row.get(2)?,
                    boss_name: row.get(3)?,
                    item_name: row.get(4)?,
                    item_image: row.get(5)?,
                    obtained_at: row.get(6)?,
                    week_key: row.get(7)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Ids of the rows a write may replace. Rows that do not decode are never read
/// back as records, so a write leaves them in place.
fn decodable_ids<R, T>(
    rows: &[(i64, R)],
    decode: impl Fn(&R) -> Result<T, InfraError>,
    context: &str,
) -> Vec<i64> {
    let ids: Vec<i64> = rows
        .iter()
        .filter(|(_, row)| decode(row).is_ok())
        .map(|(id, _)| *id)
        .collect();
    if ids.len() < rows.len() {
        log::warn!(
            "keeping {} undecodable {context} rows",
            rows.len() - ids.len()
        );
    }
    ids
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn read_boss_clears(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<BossClearRecord>, InfraError> {
        let user_id = user_id.to_string();
        let rows: Vec<BossClearRow> = self
            .run(move |connection| load_boss_clear_rows(connection, &user_id))
            .await?
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        Ok(decode_rows(&rows, decode_boss_clear, "boss clear")
            .into_iter()
            .filter(|record| filter.matches(&record.week_key))
            .collect())
    }

    async fn write_boss_clears(
        &self,
        user_id: &str,
        records: &[BossClearRecord],
    ) -> Result<(), InfraError> {
        let user_id = user_id.to_string();
        let rows: Vec<BossClearRow> = records.iter().map(encode_boss_clear).collect();
        self.run(move |connection| {
            let transaction = connection.transaction()?;
            let existing = load_boss_clear_rows(&transaction, &user_id)?;
            for id in decodable_ids(&existing, decode_boss_clear, "boss clear") {
                transaction.execute("DELETE FROM boss_clears WHERE id = ?1", params![id])?;
            }
            for row in rows {
                transaction.execute(
                    "INSERT INTO boss_clears
                       (user_id, character, character_index, boss_name, difficulty, cleared_at, week_key)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        user_id,
                        row.character,
                        row.character_index,
                        row.boss_name,
                        row.difficulty,
                        row.cleared_at,
                        row.week_key
                    ],
                )?;
            }
            transaction.commit()?;
            Ok(())
        })
        .await
    }

    async fn read_pitched_items(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<PitchedItemRecord>, InfraError> {
        let user_id = user_id.to_string();
        let rows: Vec<PitchedItemRow> = self
            .run(move |connection| load_pitched_item_rows(connection, &user_id))
            .await?
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        Ok(decode_rows(&rows, decode_pitched_item, "pitched item")
            .into_iter()
            .filter(|record| filter.matches(&record.week_key))
            .collect())
    }

    async fn write_pitched_items(
        &self,
        user_id: &str,
        records: &[PitchedItemRecord],
    ) -> Result<(), InfraError> {
        let user_id = user_id.to_string();
        let rows: Vec<PitchedItemRow> = records.iter().map(encode_pitched_item).collect();
        self.run(move |connection| {
            let transaction = connection.transaction()?;
            let existing = load_pitched_item_rows(&transaction, &user_id)?;
            for id in decodable_ids(&existing, decode_pitched_item, "pitched item") {
                transaction.execute("DELETE FROM pitched_items WHERE id = ?1", params![id])?;
            }
            for row in rows {
                transaction.execute(
                    "INSERT INTO pitched_items
                       (user_id, character, character_index, boss_name, item_name, item_image, obtained_at, week_key)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        user_id,
                        row.character,
                        row.character_index,
                        row.boss_name,
                        row.item_name,
                        row.item_image,
                        row.obtained_at,
                        row.week_key
                    ],
                )?;
            }
            transaction.commit()?;
            Ok(())
        })
        .await
    }
}
