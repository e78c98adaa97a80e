use crate::application::interaction::InteractionGuard;
use crate::application::week_navigation::{NavigationError, WeekNavigator};
use crate::domain::bosses::{default_catalog, BossCatalog};
use crate::domain::models::{
    pitched_state_for_week, validate_non_empty, BossClearKey, BossClearRecord, CharacterRef,
    Difficulty, PitchedCheckedState, PitchedItemRecord, WeekSnapshot,
};
use crate::domain::week_calendar::{date_range_for_key, week_key_for_date, NowProvider, WeekKey};
use crate::infrastructure::config::DEFAULT_SETTLE_DELAY_MS;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordFilter, RecordStore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Remote(#[from] InfraError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddItemRequest {
    pub character: CharacterRef,
    pub boss_name: String,
    pub item_name: String,
    pub item_image: Option<String>,
    /// Defaults to now on the current week, or the week's reset on a past week.
    pub obtained_at: Option<DateTime<Utc>>,
}

impl AddItemRequest {
    pub fn new(
        character: CharacterRef,
        boss_name: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Self {
            character,
            boss_name: boss_name.into(),
            item_name: item_name.into(),
            item_image: None,
            obtained_at: None,
        }
    }

    pub fn with_image(mut self, item_image: impl Into<String>) -> Self {
        self.item_image = Some(item_image.into());
        self
    }

    pub fn obtained_at(mut self, obtained_at: DateTime<Utc>) -> Self {
        self.obtained_at = Some(obtained_at);
        self
    }

    fn validate(&self) -> Result<(), ReconcileError> {
        self.character.validate().map_err(ReconcileError::Validation)?;
        validate_non_empty(&self.boss_name, "boss_name").map_err(ReconcileError::Validation)?;
        validate_non_empty(&self.item_name, "item_name").map_err(ReconcileError::Validation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveItemRequest {
    pub character: String,
    pub boss_name: String,
    pub item_name: String,
    /// Limits the removal to records obtained on this UTC day.
    pub obtained_at: Option<DateTime<Utc>>,
}

impl RemoveItemRequest {
    pub fn new(
        character: impl Into<String>,
        boss_name: impl Into<String>,
        item_name: impl Into<String>,
    ) -> Self {
        Self {
            character: character.into(),
            boss_name: boss_name.into(),
            item_name: item_name.into(),
            obtained_at: None,
        }
    }

    pub fn on(mut self, obtained_at: DateTime<Utc>) -> Self {
        self.obtained_at = Some(obtained_at);
        self
    }

    fn validate(&self) -> Result<(), ReconcileError> {
        validate_non_empty(&self.character, "character").map_err(ReconcileError::Validation)?;
        validate_non_empty(&self.boss_name, "boss_name").map_err(ReconcileError::Validation)?;
        validate_non_empty(&self.item_name, "item_name").map_err(ReconcileError::Validation)
    }

    fn matches(&self, record: &PitchedItemRecord) -> bool {
        record.matches(&self.character, &self.boss_name, &self.item_name)
            && self
                .obtained_at
                .is_none_or(|at| at.date_naive() == record.obtained_at.date_naive())
    }

    fn describe(&self) -> String {
        format!("{}/{}/{}", self.character, self.boss_name, self.item_name)
    }
}

/// Side effect of recording a pitched item on the boss it dropped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImpliedClear {
    AlreadyCleared,
    Marked(BossClearKey),
    UnknownBoss,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddItemOutcome {
    Added { implied_clear: ImpliedClear },
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    SkippedDuringInteraction,
}

#[derive(Debug, Default)]
pub struct BatchRemovalReport {
    pub removed: Vec<PitchedItemRecord>,
    pub failed: Vec<(RemoveItemRequest, ReconcileError)>,
}

impl BatchRemovalReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct ReconcilerState {
    records: Vec<PitchedItemRecord>,
    pitched: PitchedCheckedState,
}

impl ReconcilerState {
    fn rederive(&mut self, week: &WeekKey) {
        self.pitched = pitched_state_for_week(&self.records, week);
    }

    /// Latest matching record wins, so an un-tick undoes the most recent tick.
    fn latest_match(&self, request: &RemoveItemRequest) -> Option<usize> {
        latest_match(&self.records, request)
    }

    fn take(&mut self, index: usize) -> PitchedItemRecord {
        let record = self.records.remove(index);
        self.pitched.remove(&record.checked_key());
        record
    }

    fn restore(&mut self, record: PitchedItemRecord, selected: &WeekKey) {
        if record.week_key == *selected {
            self.pitched.insert(record.checked_key(), true);
        }
        if !self.records.contains(&record) {
            self.records.push(record);
        }
    }
}

fn latest_match(records: &[PitchedItemRecord], request: &RemoveItemRequest) -> Option<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| request.matches(record))
        .max_by_key(|(_, record)| record.obtained_at)
        .map(|(index, _)| index)
}

/// Keeps the pitched item view of the selected week in line with the store.
///
/// Edits apply to the local view first and are rolled back when the store write
/// fails. Background refreshes are skipped while an edit is in flight.
pub struct PitchedItemReconciler<S>
where
    S: RecordStore,
{
    store: Arc<S>,
    navigator: Arc<WeekNavigator<S>>,
    catalog: BossCatalog,
    guard: InteractionGuard,
    settle_delay: Duration,
    now_provider: NowProvider,
    user_id: String,
    state: Mutex<ReconcilerState>,
}

impl<S> PitchedItemReconciler<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>, navigator: Arc<WeekNavigator<S>>) -> Self {
        let settle_delay = Duration::from_millis(DEFAULT_SETTLE_DELAY_MS);
        let now_provider = navigator.calendar().now_provider();
        Self {
            store,
            user_id: navigator.user_id().to_string(),
            navigator,
            catalog: default_catalog(),
            guard: InteractionGuard::new(settle_delay).with_now_provider(Arc::clone(&now_provider)),
            settle_delay,
            now_provider,
            state: Mutex::new(ReconcilerState::default()),
        }
    }

    pub fn with_catalog(mut self, catalog: BossCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self.rebuild_guard();
        self
    }

    /// Clock used by the interaction guard only; week math follows the navigator.
    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self.rebuild_guard();
        self
    }

    fn rebuild_guard(&mut self) {
        self.guard = InteractionGuard::new(self.settle_delay)
            .with_now_provider(Arc::clone(&self.now_provider));
    }

    fn state(&self) -> MutexGuard<'_, ReconcilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn navigator(&self) -> &Arc<WeekNavigator<S>> {
        &self.navigator
    }

    pub fn is_interaction_in_progress(&self) -> bool {
        self.guard.is_busy()
    }

    pub fn records(&self) -> Vec<PitchedItemRecord> {
        self.state().records.clone()
    }

    pub fn pitched_state(&self) -> PitchedCheckedState {
        self.state().pitched.clone()
    }

    pub fn is_obtained(
        &self,
        character: &str,
        boss_name: &str,
        item_name: &str,
        week: &WeekKey,
    ) -> bool {
        self.state().pitched.iter().any(|(key, obtained)| {
            *obtained
                && key.week_key == *week
                && key.character == character
                && key.boss_name == boss_name
                && key.item_name == item_name
        })
    }

    /// Re-reads every pitched record of the user and rebuilds the selected week's
    /// view. Nothing local changes while an edit is in flight.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ReconcileError> {
        if self.guard.is_busy() {
            log::debug!("refresh skipped: interaction in progress");
            return Ok(RefreshOutcome::SkippedDuringInteraction);
        }
        let records = self
            .store
            .read_pitched_items(&self.user_id, RecordFilter::all())
            .await?;
        if self.guard.is_busy() {
            log::debug!("refresh result dropped: interaction started during read");
            return Ok(RefreshOutcome::SkippedDuringInteraction);
        }

        let selected = self.navigator.selected_week();
        let mut state = self.state();
        state.records = records;
        state.rederive(&selected);
        Ok(RefreshOutcome::Applied)
    }

    /// Navigates to `week` and rebuilds the view from the week's snapshot.
    pub async fn select_week(&self, week: WeekKey) -> Result<WeekSnapshot, ReconcileError> {
        let snapshot = self.navigator.go_to(week).await?;
        let busy = self.guard.is_busy();
        let mut state = self.state();
        if !busy {
            state.records.retain(|record| record.week_key != week);
            state.records.extend(snapshot.pitched_items.iter().cloned());
        }
        state.rederive(&week);
        Ok(snapshot)
    }

    fn default_obtained_at(&self) -> DateTime<Utc> {
        let calendar = self.navigator.calendar();
        let selected = self.navigator.selected_week();
        if calendar.is_current(&selected) {
            calendar.now()
        } else {
            date_range_for_key(&selected).start
        }
    }

    pub async fn add_item(&self, request: AddItemRequest) -> Result<AddItemOutcome, ReconcileError> {
        request.validate()?;
        let _token = self.guard.begin();

        let obtained_at = request
            .obtained_at
            .unwrap_or_else(|| self.default_obtained_at());
        let record = PitchedItemRecord {
            character: request.character.name.trim().to_string(),
            character_index: request.character.index,
            boss_name: request.boss_name.trim().to_string(),
            item_name: request.item_name.trim().to_string(),
            item_image: request
                .item_image
                .as_deref()
                .map(str::trim)
                .filter(|image| !image.is_empty())
                .map(ToOwned::to_owned),
            obtained_at,
            week_key: week_key_for_date(obtained_at),
        };
        record.validate().map_err(ReconcileError::Validation)?;
        let identity = record.identity();
        let selected = self.navigator.selected_week();

        {
            let mut state = self.state();
            if state
                .records
                .iter()
                .any(|existing| existing.identity() == identity)
            {
                log::debug!("pitched item {} already recorded locally", record.checked_key());
                return Ok(AddItemOutcome::AlreadyExists);
            }
            state.restore(record.clone(), &selected);
        }

        let already_stored = match self.persist_added(&record).await {
            Ok(already_stored) => already_stored,
            Err(error) => {
                log::warn!(
                    "adding pitched item {} failed, rolling back: {error}",
                    record.checked_key()
                );
                let mut state = self.state();
                if let Some(index) = state.records.iter().position(|r| *r == record) {
                    state.take(index);
                }
                return Err(error.into());
            }
        };
        if let Some(existing) = already_stored {
            log::debug!("pitched item {} already in store", record.checked_key());
            let mut state = self.state();
            if let Some(index) = state.records.iter().position(|r| *r == record) {
                state.take(index);
            }
            state.restore(existing, &selected);
            return Ok(AddItemOutcome::AlreadyExists);
        }

        self.navigator.update_week(&record.week_key, |snapshot| {
            snapshot.pitched_items.push(record.clone());
        });
        let character = CharacterRef::new(record.character.clone(), record.character_index);
        let implied_clear = self
            .ensure_boss_cleared(&character, &record.boss_name, record.week_key, obtained_at)
            .await;
        Ok(AddItemOutcome::Added { implied_clear })
    }

    /// Returns the stored copy when the store already holds the same item for that
    /// week, `None` once the record is written.
    async fn persist_added(
        &self,
        record: &PitchedItemRecord,
    ) -> Result<Option<PitchedItemRecord>, InfraError> {
        if let Some(existing) = self
            .store
            .find_pitched_item(&self.user_id, &record.identity())
            .await?
        {
            return Ok(Some(existing));
        }
        let mut records = self
            .store
            .read_pitched_items(&self.user_id, RecordFilter::all())
            .await?;
        records.push(record.clone());
        self.store
            .write_pitched_items(&self.user_id, &records)
            .await?;
        Ok(None)
    }

    /// An obtained item means the boss was beaten that week. Marks the highest
    /// priority difficulty when no difficulty of the boss is cleared yet.
    async fn ensure_boss_cleared(
        &self,
        character: &CharacterRef,
        boss_name: &str,
        week: WeekKey,
        cleared_at: DateTime<Utc>,
    ) -> ImpliedClear {
        let Some(difficulty) = self.catalog.highest_priority_difficulty(boss_name) else {
            log::debug!("boss {boss_name} is not in the catalog; no implied clear");
            return ImpliedClear::UnknownBoss;
        };
        let clear = BossClearRecord {
            character: character.name.clone(),
            character_index: character.index,
            boss_name: boss_name.to_string(),
            difficulty,
            cleared_at,
            week_key: week,
        };

        let result = self.persist_implied_clear(&clear).await;

        match result {
            Ok(ImpliedClear::Marked(key)) => {
                self.navigator.update_week(&week, |snapshot| {
                    snapshot.checked_state.insert(key.clone(), true);
                    snapshot.boss_clears.push(clear.clone());
                });
                log::info!("marked {key} cleared for week {week}");
                ImpliedClear::Marked(key)
            }
            Ok(other) => other,
            Err(error) => {
                log::warn!("implied boss clear for {boss_name} failed: {error}");
                ImpliedClear::Failed(error.to_string())
            }
        }
    }

    async fn persist_implied_clear(
        &self,
        clear: &BossClearRecord,
    ) -> Result<ImpliedClear, InfraError> {
        let mut clears = self
            .store
            .read_boss_clears(&self.user_id, RecordFilter::all())
            .await?;
        if clears.iter().any(|existing| {
            existing.week_key == clear.week_key
                && existing.character == clear.character
                && existing.boss_name == clear.boss_name
        }) {
            return Ok(ImpliedClear::AlreadyCleared);
        }
        clears.push(clear.clone());
        self.store.write_boss_clears(&self.user_id, &clears).await?;
        Ok(ImpliedClear::Marked(clear.key()))
    }

    /// Removes one record and returns it. Without a date the most recently
    /// obtained match goes.
    pub async fn remove_item(
        &self,
        request: RemoveItemRequest,
    ) -> Result<PitchedItemRecord, ReconcileError> {
        request.validate()?;
        let _token = self.guard.begin();
        let selected = self.navigator.selected_week();

        let local = {
            let mut state = self.state();
            state.latest_match(&request).map(|index| state.take(index))
        };

        let result = self.persist_removed(&request, local.as_ref()).await;
        match result {
            Ok(Some(removed)) => {
                self.navigator.update_week(&removed.week_key, |snapshot| {
                    snapshot.pitched_items.retain(|record| *record != removed);
                });
                Ok(removed)
            }
            Ok(None) => Err(ReconcileError::NotFound(request.describe())),
            Err(error) => {
                log::warn!(
                    "removing pitched item {} failed, rolling back: {error}",
                    request.describe()
                );
                if let Some(record) = local {
                    self.state().restore(record, &selected);
                }
                Err(error.into())
            }
        }
    }

    /// Writes the collection without the stored record sharing the target's
    /// identity. A target with no such record in the store counts as removed.
    async fn persist_removed(
        &self,
        request: &RemoveItemRequest,
        local: Option<&PitchedItemRecord>,
    ) -> Result<Option<PitchedItemRecord>, InfraError> {
        let mut records = self
            .store
            .read_pitched_items(&self.user_id, RecordFilter::all())
            .await?;
        let index = match local {
            Some(target) => {
                let identity = target.identity();
                records.iter().position(|record| record.identity() == identity)
            }
            None => latest_match(&records, request),
        };
        let Some(index) = index else {
            return Ok(local.cloned());
        };
        let removed = records.remove(index);
        self.store
            .write_pitched_items(&self.user_id, &records)
            .await?;
        Ok(Some(removed))
    }

    /// Clears every local key first, then persists each removal in order. A failed
    /// write restores only that item.
    pub async fn remove_many(&self, requests: Vec<RemoveItemRequest>) -> BatchRemovalReport {
        let _token = self.guard.begin();
        let selected = self.navigator.selected_week();
        let mut report = BatchRemovalReport::default();

        let mut targets = Vec::new();
        {
            let mut state = self.state();
            for request in requests {
                if let Err(error) = request.validate() {
                    report.failed.push((request, error));
                    continue;
                }
                match state.latest_match(&request) {
                    Some(index) => {
                        let record = state.take(index);
                        targets.push((request, record));
                    }
                    None => {
                        let error = ReconcileError::NotFound(request.describe());
                        report.failed.push((request, error));
                    }
                }
            }
        }
        if targets.is_empty() {
            return report;
        }

        let mut remote = match self
            .store
            .read_pitched_items(&self.user_id, RecordFilter::all())
            .await
        {
            Ok(records) => records,
            Err(error) => {
                log::warn!("batch removal could not read the store: {error}");
                let message = error.to_string();
                let mut state = self.state();
                for (request, record) in targets {
                    state.restore(record, &selected);
                    let error = ReconcileError::Remote(InfraError::Remote(message.clone()));
                    report.failed.push((request, error));
                }
                return report;
            }
        };

        for (request, record) in targets {
            let identity = record.identity();
            let Some(index) = remote
                .iter()
                .position(|candidate| candidate.identity() == identity)
            else {
                report.removed.push(record);
                continue;
            };
            let mut next = remote.clone();
            let stored = next.remove(index);
            match self.store.write_pitched_items(&self.user_id, &next).await {
                Ok(()) => {
                    remote = next;
                    self.navigator.update_week(&stored.week_key, |snapshot| {
                        snapshot.pitched_items.retain(|item| *item != stored);
                    });
                    report.removed.push(stored);
                }
                Err(error) => {
                    log::warn!("removing {} failed, restoring: {error}", request.describe());
                    self.state().restore(record, &selected);
                    report.failed.push((request, error.into()));
                }
            }
        }
        report
    }

    /// Toggles one boss clear on the selected week.
    pub async fn set_boss_cleared(
        &self,
        character: &CharacterRef,
        boss_name: &str,
        difficulty: Difficulty,
        cleared: bool,
    ) -> Result<(), ReconcileError> {
        character.validate().map_err(ReconcileError::Validation)?;
        validate_non_empty(boss_name, "boss_name").map_err(ReconcileError::Validation)?;
        let _token = self.guard.begin();

        let week = self.navigator.selected_week();
        let cleared_at = self.default_obtained_at();
        let record = BossClearRecord {
            character: character.name.clone(),
            character_index: character.index,
            boss_name: boss_name.to_string(),
            difficulty,
            cleared_at,
            week_key: week,
        };
        let key = record.key();
        let before = self.navigator.displayed();

        self.navigator.update_week(&week, |snapshot| {
            apply_boss_clear(snapshot, &record, cleared);
        });

        let result = self.persist_boss_clear(&record, cleared).await;

        if let Err(error) = result {
            log::warn!("toggling {key} failed, rolling back: {error}");
            self.navigator.update_week(&week, |snapshot| {
                if snapshot.week_key == before.week_key {
                    snapshot.checked_state = before.checked_state.clone();
                    snapshot.boss_clears = before.boss_clears.clone();
                }
            });
            return Err(error.into());
        }
        Ok(())
    }

    async fn persist_boss_clear(
        &self,
        record: &BossClearRecord,
        cleared: bool,
    ) -> Result<(), InfraError> {
        let mut clears = self
            .store
            .read_boss_clears(&self.user_id, RecordFilter::all())
            .await?;
        let key = record.key();
        let position = clears
            .iter()
            .position(|existing| existing.week_key == record.week_key && existing.key() == key);
        match (cleared, position) {
            (true, Some(_)) | (false, None) => return Ok(()),
            (true, None) => clears.push(record.clone()),
            (false, Some(index)) => {
                clears.remove(index);
            }
        }
        self.store.write_boss_clears(&self.user_id, &clears).await
    }

    /// Deletes every pitched record of one character across all weeks. Returns
    /// how many records the store dropped.
    pub async fn purge_character(&self, character: &str) -> Result<usize, ReconcileError> {
        validate_non_empty(character, "character").map_err(ReconcileError::Validation)?;
        let _token = self.guard.begin();
        let selected = self.navigator.selected_week();

        let purged_locally: Vec<PitchedItemRecord> = {
            let mut state = self.state();
            let (purged, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.records)
                .into_iter()
                .partition(|record| record.character == character);
            state.records = kept;
            state.rederive(&selected);
            purged
        };

        let result = self.persist_purge(character).await;

        match result {
            Ok(purged) => {
                for week in purged.iter().map(|record| record.week_key) {
                    self.navigator.update_week(&week, |snapshot| {
                        snapshot.pitched_items.retain(|record| record.character != character);
                    });
                }
                log::info!("purged {} pitched records of {character}", purged.len());
                Ok(purged.len())
            }
            Err(error) => {
                log::warn!("purging {character} failed, rolling back: {error}");
                let mut state = self.state();
                for record in purged_locally {
                    state.restore(record, &selected);
                }
                Err(error.into())
            }
        }
    }

    async fn persist_purge(&self, character: &str) -> Result<Vec<PitchedItemRecord>, InfraError> {
        let records = self
            .store
            .read_pitched_items(&self.user_id, RecordFilter::all())
            .await?;
        let (purged, kept): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|record| record.character == character);
        if !purged.is_empty() {
            self.store.write_pitched_items(&self.user_id, &kept).await?;
        }
        Ok(purged)
    }
}

fn apply_boss_clear(snapshot: &mut WeekSnapshot, record: &BossClearRecord, cleared: bool) {
    let key = record.key();
    if cleared {
        snapshot.checked_state.insert(key, true);
        if !snapshot.boss_clears.iter().any(|existing| existing.key() == record.key()) {
            snapshot.boss_clears.push(record.clone());
        }
    } else {
        snapshot.checked_state.remove(&key);
        snapshot.boss_clears.retain(|existing| existing.key() != key);
    }
}
