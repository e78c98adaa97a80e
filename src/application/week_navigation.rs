use crate::application::historical_analysis::HistoricalRangeAnalyzer;
use crate::domain::models::{HistoricalAnalysis, WeekSnapshot};
use crate::domain::week_calendar::{offset_between, week_key_offset, WeekCalendar, WeekKey};
use crate::infrastructure::config::DEFAULT_WEEK_LIMIT;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordFilter, RecordStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("week {week} is outside the navigable range (offset {offset}, limit {limit})")]
    OutOfRange { week: WeekKey, offset: i64, limit: u32 },
    #[error(transparent)]
    Remote(#[from] InfraError),
}

#[derive(Debug)]
struct NavigationState {
    selected: WeekKey,
    analysis: HistoricalAnalysis,
    cache: HashMap<WeekKey, WeekSnapshot>,
    displayed: WeekSnapshot,
}

/// Owns the selected week for one user session.
///
/// Selection stays within `[-limit, 0]` weeks of the current week. Past weeks are
/// cached once fetched; the current week is live and always re-read.
pub struct WeekNavigator<S>
where
    S: RecordStore,
{
    store: Arc<S>,
    analyzer: HistoricalRangeAnalyzer<S>,
    calendar: WeekCalendar,
    user_id: String,
    state: Mutex<NavigationState>,
}

impl<S> WeekNavigator<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>, user_id: impl Into<String>) -> Self {
        let calendar = WeekCalendar::new();
        let current = calendar.current_week_key();
        Self {
            analyzer: HistoricalRangeAnalyzer::new(Arc::clone(&store)),
            store,
            calendar,
            user_id: user_id.into(),
            state: Mutex::new(NavigationState {
                selected: current,
                analysis: HistoricalAnalysis::fallback(DEFAULT_WEEK_LIMIT),
                cache: HashMap::new(),
                displayed: WeekSnapshot::empty(current),
            }),
        }
    }

    pub fn with_calendar(mut self, calendar: WeekCalendar) -> Self {
        let current = calendar.current_week_key();
        self.analyzer = self.analyzer.with_calendar(calendar.clone());
        self.calendar = calendar;
        {
            let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
            state.selected = current;
            state.displayed = WeekSnapshot::empty(current);
        }
        self
    }

    pub fn with_default_week_limit(mut self, default_week_limit: u32) -> Self {
        self.analyzer = self.analyzer.with_default_week_limit(default_week_limit);
        let limit = self.analyzer.default_week_limit();
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .analysis = HistoricalAnalysis::fallback(limit);
        self
    }

    fn state(&self) -> MutexGuard<'_, NavigationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calendar(&self) -> &WeekCalendar {
        &self.calendar
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn current_week(&self) -> WeekKey {
        self.calendar.current_week_key()
    }

    pub fn selected_week(&self) -> WeekKey {
        self.state().selected
    }

    pub fn is_current_week(&self) -> bool {
        self.selected_week() == self.current_week()
    }

    /// Zero for the current week, negative for past weeks.
    pub fn week_offset(&self) -> i64 {
        self.calendar.offset_from_current(&self.selected_week())
    }

    pub fn analysis(&self) -> HistoricalAnalysis {
        self.state().analysis.clone()
    }

    pub fn week_limit(&self) -> u32 {
        self.state().analysis.adaptive_week_limit
    }

    pub fn displayed(&self) -> WeekSnapshot {
        self.state().displayed.clone()
    }

    pub fn cached_weeks(&self) -> Vec<WeekKey> {
        let mut weeks: Vec<WeekKey> = self.state().cache.keys().copied().collect();
        weeks.sort();
        weeks
    }

    pub fn can_go_previous(&self) -> bool {
        self.week_offset() > -i64::from(self.week_limit())
    }

    pub fn can_go_next(&self) -> bool {
        self.week_offset() < 0
    }

    /// Recomputes the navigable range. A failed analysis falls back to the default
    /// window instead of blocking navigation.
    pub async fn refresh_analysis(&self) -> HistoricalAnalysis {
        let analysis = match self.analyzer.analyze(&self.user_id).await {
            Ok(analysis) => analysis,
            Err(error) => {
                log::warn!(
                    "historical analysis failed for {}; using default window: {error}",
                    self.user_id
                );
                HistoricalAnalysis::fallback(self.analyzer.default_week_limit())
            }
        };
        self.state().analysis = analysis.clone();
        analysis
    }

    /// Loads the range analysis and the live current week.
    pub async fn initialize(&self) -> Result<WeekSnapshot, NavigationError> {
        self.refresh_analysis().await;
        self.go_to(self.current_week()).await
    }

    pub async fn go_to(&self, week: WeekKey) -> Result<WeekSnapshot, NavigationError> {
        let current = self.current_week();
        let offset = offset_between(&week, &current);
        let limit = self.week_limit();
        if offset > 0 || offset < -i64::from(limit) {
            return Err(NavigationError::OutOfRange {
                week,
                offset,
                limit,
            });
        }

        {
            let mut state = self.state();
            let previous = state.displayed.clone();
            if previous.week_key != current
                && previous.has_data
                && !state.cache.contains_key(&previous.week_key)
            {
                log::debug!("caching week {} before leaving it", previous.week_key);
                state.cache.insert(previous.week_key, previous);
            }

            if week != current {
                if let Some(cached) = state.cache.get(&week).cloned() {
                    log::debug!("week {week} served from cache");
                    state.selected = week;
                    state.displayed = cached.clone();
                    return Ok(cached);
                }
            }
        }

        let snapshot = self.fetch_snapshot(week).await?;

        let mut state = self.state();
        if week != current {
            state.cache.insert(week, snapshot.clone());
        }
        state.selected = week;
        state.displayed = snapshot.clone();
        log::debug!("selected week {week} (offset {offset})");
        Ok(snapshot)
    }

    /// One week back; `Ok(None)` at the oldest allowed week.
    pub async fn previous(&self) -> Result<Option<WeekSnapshot>, NavigationError> {
        if !self.can_go_previous() {
            return Ok(None);
        }
        let target = week_key_offset(-1, &self.selected_week());
        self.go_to(target).await.map(Some)
    }

    /// One week forward; `Ok(None)` on the current week.
    pub async fn next(&self) -> Result<Option<WeekSnapshot>, NavigationError> {
        if !self.can_go_next() {
            return Ok(None);
        }
        let target = week_key_offset(1, &self.selected_week());
        self.go_to(target).await.map(Some)
    }

    pub async fn jump_to_oldest(&self) -> Result<WeekSnapshot, NavigationError> {
        let analysis = self.analysis();
        let target = analysis.oldest_historical_week.unwrap_or_else(|| {
            week_key_offset(
                -i64::from(analysis.adaptive_week_limit),
                &self.current_week(),
            )
        });
        self.go_to(target).await
    }

    pub async fn jump_to_current(&self) -> Result<WeekSnapshot, NavigationError> {
        self.go_to(self.current_week()).await
    }

    /// Re-reads the displayed week when it is the live current week.
    pub async fn reload_current(&self) -> Result<Option<WeekSnapshot>, NavigationError> {
        if !self.is_current_week() {
            return Ok(None);
        }
        self.go_to(self.current_week()).await.map(Some)
    }

    pub fn invalidate(&self, week: &WeekKey) {
        if self.state().cache.remove(week).is_some() {
            log::debug!("invalidated cached week {week}");
        }
    }

    /// Applies a local edit to `week`. Any cached copy is dropped; the displayed
    /// snapshot is patched when it shows that week.
    pub(crate) fn update_week(&self, week: &WeekKey, apply: impl FnOnce(&mut WeekSnapshot)) {
        let mut state = self.state();
        state.cache.remove(week);
        if state.displayed.week_key == *week {
            apply(&mut state.displayed);
            state.displayed.refresh_has_data();
        }
    }

    async fn fetch_snapshot(&self, week: WeekKey) -> Result<WeekSnapshot, InfraError> {
        let filter = RecordFilter::week(week);
        let boss_clears = self.store.read_boss_clears(&self.user_id, filter).await?;
        let pitched_items = self.store.read_pitched_items(&self.user_id, filter).await?;
        Ok(WeekSnapshot::from_records(week, boss_clears, pitched_items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BossClearRecord, Difficulty, PitchedItemRecord};
    use crate::domain::week_calendar::date_range_for_key;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use crate::infrastructure::record_store::InMemoryRecordStore;

    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryRecordStore,
        reads_by_week: Mutex<HashMap<Option<WeekKey>, usize>>,
        fail_reads: AtomicBool,
        boss_reads: AtomicUsize,
    }

    impl CountingStore {
        fn reads_for(&self, week: WeekKey) -> usize {
            self.reads_by_week
                .lock()
                .expect("read counter poisoned")
                .get(&Some(week))
                .copied()
                .unwrap_or(0)
        }

        fn check(&self) -> Result<(), InfraError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(InfraError::Remote("network error".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn read_boss_clears(
            &self,
            user_id: &str,
            filter: RecordFilter,
        ) -> Result<Vec<BossClearRecord>, InfraError> {
            self.check()?;
            self.boss_reads.fetch_add(1, Ordering::SeqCst);
            *self
                .reads_by_week
                .lock()
                .expect("read counter poisoned")
                .entry(filter.week)
                .or_default() += 1;
            self.inner.read_boss_clears(user_id, filter).await
        }

        async fn write_boss_clears(
            &self,
            user_id: &str,
            records: &[BossClearRecord],
        ) -> Result<(), InfraError> {
            self.inner.write_boss_clears(user_id, records).await
        }

        async fn read_pitched_items(
            &self,
            user_id: &str,
            filter: RecordFilter,
        ) -> Result<Vec<PitchedItemRecord>, InfraError> {
            self.check()?;
            self.inner.read_pitched_items(user_id, filter).await
        }

        async fn write_pitched_items(
            &self,
            user_id: &str,
            records: &[PitchedItemRecord],
        ) -> Result<(), InfraError> {
            self.inner.write_pitched_items(user_id, records).await
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-10T12:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn calendar() -> WeekCalendar {
        WeekCalendar::new().with_now_provider(Arc::new(now))
    }

    fn weeks_ago(weeks: i64) -> WeekKey {
        week_key_offset(-weeks, &calendar().current_week_key())
    }

    fn clear_in(week: WeekKey) -> BossClearRecord {
        BossClearRecord {
            character: "Alice".to_string(),
            character_index: 0,
            boss_name: "Lucid".to_string(),
            difficulty: Difficulty::Normal,
            cleared_at: date_range_for_key(&week).start + Duration::hours(1),
            week_key: week,
        }
    }

    async fn navigator_with(clears: Vec<BossClearRecord>) -> (Arc<CountingStore>, WeekNavigator<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        store
            .inner
            .write_boss_clears("user-1", &clears)
            .await
            .expect("seed clears");
        let navigator = WeekNavigator::new(Arc::clone(&store), "user-1").with_calendar(calendar());
        (store, navigator)
    }

    #[tokio::test]
    async fn revisiting_a_past_week_is_served_from_cache() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(2))]).await;
        let week_a = weeks_ago(2);
        let week_b = weeks_ago(3);

        let first = navigator.go_to(week_a).await.expect("go to A");
        assert!(first.has_data);
        navigator.go_to(week_b).await.expect("go to B");
        let again = navigator.go_to(week_a).await.expect("back to A");

        assert_eq!(again, first);
        assert_eq!(store.reads_for(week_a), 1);
        assert_eq!(navigator.selected_week(), week_a);
        assert_eq!(navigator.cached_weeks(), vec![week_b, week_a]);
    }

    #[tokio::test]
    async fn invalidated_week_is_read_again() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(2))]).await;
        let week = weeks_ago(2);

        navigator.go_to(week).await.expect("first visit");
        navigator.go_to(weeks_ago(3)).await.expect("leave");
        navigator.invalidate(&week);
        navigator.invalidate(&weeks_ago(5));
        assert_eq!(navigator.cached_weeks(), vec![weeks_ago(3)]);

        let again = navigator.go_to(week).await.expect("second visit");
        assert!(again.has_data);
        assert_eq!(store.reads_for(week), 2);
    }

    #[tokio::test]
    async fn current_week_is_always_read_live() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(0))]).await;
        let current = navigator.current_week();

        navigator.go_to(current).await.expect("first visit");
        navigator.go_to(weeks_ago(1)).await.expect("leave");
        navigator.go_to(current).await.expect("second visit");

        assert_eq!(store.reads_for(current), 2);
        assert!(!navigator.cached_weeks().contains(&current));
    }

    #[tokio::test]
    async fn previous_and_next_stop_at_the_bounds() {
        let (_store, navigator) = navigator_with(vec![]).await;
        navigator.refresh_analysis().await;
        assert_eq!(navigator.week_limit(), 8);

        assert!(navigator.next().await.expect("next at current").is_none());
        for _ in 0..8 {
            assert!(navigator.previous().await.expect("previous").is_some());
        }
        assert_eq!(navigator.week_offset(), -8);
        assert!(navigator.previous().await.expect("previous at bound").is_none());
        assert_eq!(navigator.week_offset(), -8);

        assert!(navigator.next().await.expect("next").is_some());
        assert_eq!(navigator.week_offset(), -7);
    }

    #[tokio::test]
    async fn go_to_rejects_weeks_outside_the_range() {
        let (_store, navigator) = navigator_with(vec![]).await;
        let future = week_key_offset(1, &navigator.current_week());
        assert!(matches!(
            navigator.go_to(future).await,
            Err(NavigationError::OutOfRange { offset: 1, .. })
        ));
        assert!(matches!(
            navigator.go_to(weeks_ago(9)).await,
            Err(NavigationError::OutOfRange { .. })
        ));
        assert!(navigator.is_current_week());
    }

    #[tokio::test]
    async fn failed_read_keeps_the_previous_selection() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(1))]).await;
        let shown = navigator.go_to(weeks_ago(1)).await.expect("go to week");

        store.fail_reads.store(true, Ordering::SeqCst);
        let result = navigator.go_to(weeks_ago(4)).await;

        assert!(matches!(result, Err(NavigationError::Remote(_))));
        assert_eq!(navigator.selected_week(), weeks_ago(1));
        assert_eq!(navigator.displayed(), shown);
    }

    #[tokio::test]
    async fn jump_to_oldest_uses_known_history_or_the_limit() {
        let (_store, navigator) = navigator_with(vec![clear_in(weeks_ago(12))]).await;
        navigator.refresh_analysis().await;
        assert_eq!(navigator.week_limit(), 12);
        navigator.jump_to_oldest().await.expect("jump to oldest");
        assert_eq!(navigator.selected_week(), weeks_ago(12));
        assert!(!navigator.can_go_previous());

        navigator.jump_to_current().await.expect("jump to current");
        assert!(navigator.is_current_week());

        let (_store, fresh) = navigator_with(vec![]).await;
        fresh.refresh_analysis().await;
        fresh.jump_to_oldest().await.expect("jump to oldest");
        assert_eq!(fresh.selected_week(), weeks_ago(8));
    }

    #[tokio::test]
    async fn failed_analysis_falls_back_to_default_window() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(20))]).await;
        store.fail_reads.store(true, Ordering::SeqCst);

        let analysis = navigator.refresh_analysis().await;
        assert_eq!(analysis, HistoricalAnalysis::fallback(8));
        assert_eq!(navigator.week_limit(), 8);
    }

    #[tokio::test]
    async fn edited_week_is_recached_from_the_displayed_snapshot() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(2))]).await;
        let week = weeks_ago(2);
        navigator.go_to(week).await.expect("go to week");

        navigator.update_week(&week, |snapshot| {
            snapshot.checked_state.clear();
            snapshot.boss_clears.clear();
        });
        navigator.update_week(&week, |snapshot| {
            snapshot.boss_clears.push(clear_in(week));
        });
        assert!(navigator.cached_weeks().is_empty());

        navigator.go_to(weeks_ago(3)).await.expect("leave week");
        assert!(navigator.cached_weeks().contains(&week));
        navigator.go_to(week).await.expect("return");
        assert_eq!(store.reads_for(week), 1);
        assert_eq!(navigator.displayed().boss_clears.len(), 1);
    }

    #[tokio::test]
    async fn initialize_loads_live_week() {
        let (store, navigator) = navigator_with(vec![clear_in(weeks_ago(0))]).await;
        let snapshot = navigator.initialize().await.expect("initialize");
        assert!(snapshot.has_data);
        assert!(navigator.is_current_week());
        // analysis reads once, the live week once
        assert_eq!(store.boss_reads.load(Ordering::SeqCst), 2);
        assert!(navigator.reload_current().await.expect("reload").is_some());
    }
}
