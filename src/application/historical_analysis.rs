use crate::domain::models::{HistoricalAnalysis, UserType};
use crate::domain::week_calendar::{offset_between, WeekCalendar, WeekKey};
use crate::infrastructure::config::DEFAULT_WEEK_LIMIT;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordFilter, RecordStore};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Decides how far back week navigation may go for one user, based on how much
/// history the store actually holds for them.
pub struct HistoricalRangeAnalyzer<S>
where
    S: RecordStore,
{
    store: Arc<S>,
    calendar: WeekCalendar,
    default_week_limit: u32,
}

impl<S> HistoricalRangeAnalyzer<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            calendar: WeekCalendar::new(),
            default_week_limit: DEFAULT_WEEK_LIMIT,
        }
    }

    pub fn with_calendar(mut self, calendar: WeekCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_default_week_limit(mut self, default_week_limit: u32) -> Self {
        self.default_week_limit = default_week_limit.max(1);
        self
    }

    pub fn default_week_limit(&self) -> u32 {
        self.default_week_limit
    }

    pub async fn analyze(&self, user_id: &str) -> Result<HistoricalAnalysis, InfraError> {
        let boss_clears = self
            .store
            .read_boss_clears(user_id, RecordFilter::all())
            .await?;
        let pitched_items = self
            .store
            .read_pitched_items(user_id, RecordFilter::all())
            .await?;

        let current = self.calendar.current_week_key();
        let historical_weeks: BTreeSet<WeekKey> = boss_clears
            .iter()
            .map(|record| record.week_key)
            .chain(pitched_items.iter().map(|record| record.week_key))
            .filter(|week| *week < current)
            .collect();

        let Some(oldest) = historical_weeks.first().copied() else {
            log::debug!("user {user_id} has no historical weeks");
            return Ok(HistoricalAnalysis::fallback(self.default_week_limit));
        };

        let weeks_of_history = u32::try_from(offset_between(&oldest, &current).unsigned_abs())
            .unwrap_or(u32::MAX);
        let (user_type, adaptive_week_limit) = if weeks_of_history > self.default_week_limit {
            (UserType::Existing, weeks_of_history)
        } else {
            (UserType::New, self.default_week_limit)
        };
        log::debug!(
            "user {user_id}: {} historical weeks, oldest {oldest}, limit {adaptive_week_limit}",
            historical_weeks.len()
        );

        Ok(HistoricalAnalysis {
            has_historical_data: true,
            oldest_historical_week: Some(oldest),
            user_type,
            adaptive_week_limit,
        })
    }
}
