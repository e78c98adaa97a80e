use crate::domain::models::{BossClearRecord, PitchedItemIdentity, PitchedItemRecord};
use crate::domain::week_calendar::WeekKey;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    BossClears,
    PitchedItems,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::BossClears => "boss_clears",
            RecordKind::PitchedItems => "pitched_items",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub week: Option<WeekKey>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self { week: None }
    }

    pub fn week(week: WeekKey) -> Self {
        Self { week: Some(week) }
    }

    pub fn matches(&self, week_key: &WeekKey) -> bool {
        self.week.is_none_or(|week| week == *week_key)
    }
}

/// Remote collaborator holding the durable records of every user.
///
/// Writes replace every record of that kind the store can decode for the user.
/// Stored rows that do not decode are kept.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn read_boss_clears(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<BossClearRecord>, InfraError>;

    async fn write_boss_clears(
        &self,
        user_id: &str,
        records: &[BossClearRecord],
    ) -> Result<(), InfraError>;

    async fn read_pitched_items(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<PitchedItemRecord>, InfraError>;

    async fn write_pitched_items(
        &self,
        user_id: &str,
        records: &[PitchedItemRecord],
    ) -> Result<(), InfraError>;

    /// Missing records are `Ok(None)`, never an error.
    async fn find_pitched_item(
        &self,
        user_id: &str,
        identity: &PitchedItemIdentity,
    ) -> Result<Option<PitchedItemRecord>, InfraError> {
        let records = self
            .read_pitched_items(user_id, RecordFilter::week(identity.week_key))
            .await?;
        Ok(records
            .into_iter()
            .find(|record| record.identity() == *identity))
    }
}

#[derive(Debug, Default, Clone)]
struct UserRecords {
    boss_clears: Vec<BossClearRecord>,
    pitched_items: Vec<PitchedItemRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    users: Mutex<HashMap<String, UserRecords>>,
}

impl InMemoryRecordStore {
    fn normalized_user(user_id: &str) -> Result<String, InfraError> {
        let normalized = user_id.trim();
        if normalized.is_empty() {
            return Err(InfraError::Remote("user id must not be empty".to_string()));
        }
        Ok(normalized.to_string())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, UserRecords>>, InfraError> {
        self.users
            .lock()
            .map_err(|error| InfraError::LockPoisoned(format!("record store lock poisoned: {error}")))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn read_boss_clears(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<BossClearRecord>, InfraError> {
        let user_id = Self::normalized_user(user_id)?;
        let users = self.lock()?;
        Ok(users
            .get(&user_id)
            .map(|records| {
                records
                    .boss_clears
                    .iter()
                    .filter(|record| filter.matches(&record.week_key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_boss_clears(
        &self,
        user_id: &str,
        records: &[BossClearRecord],
    ) -> Result<(), InfraError> {
        let user_id = Self::normalized_user(user_id)?;
        let mut users = self.lock()?;
        users.entry(user_id).or_default().boss_clears = records.to_vec();
        Ok(())
    }

    async fn read_pitched_items(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<PitchedItemRecord>, InfraError> {
        let user_id = Self::normalized_user(user_id)?;
        let users = self.lock()?;
        Ok(users
            .get(&user_id)
            .map(|records| {
                records
                    .pitched_items
                    .iter()
                    .filter(|record| filter.matches(&record.week_key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_pitched_items(
        &self,
        user_id: &str,
        records: &[PitchedItemRecord],
    ) -> Result<(), InfraError> {
        let user_id = Self::normalized_user(user_id)?;
        let mut users = self.lock()?;
        users.entry(user_id).or_default().pitched_items = records.to_vec();
        Ok(())
    }
}
