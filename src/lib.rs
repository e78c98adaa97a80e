//! Weekly boss clear and pitched item tracking.
//!
//! Weeks reset every Thursday at 00:00 UTC. [`WeekNavigator`] keeps the selected
//! week inside the range of the user's history and [`PitchedItemReconciler`]
//! keeps the pitched item view of that week in line with a [`RecordStore`].

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, init_logging, ConfiguredStore};
pub use application::historical_analysis::HistoricalRangeAnalyzer;
pub use application::pitched_reconciler::{
    AddItemOutcome, AddItemRequest, BatchRemovalReport, ImpliedClear, PitchedItemReconciler,
    ReconcileError, RefreshOutcome, RemoveItemRequest,
};
pub use application::session::TrackerSession;
pub use application::week_navigation::{NavigationError, WeekNavigator};
pub use domain::models::{
    BossClearRecord, CharacterRef, Difficulty, HistoricalAnalysis, PitchedItemRecord, UserType,
    WeekSnapshot,
};
pub use domain::week_calendar::{WeekCalendar, WeekKey, WeekKeyParseError};
pub use infrastructure::error::InfraError;
pub use infrastructure::record_store::{InMemoryRecordStore, RecordFilter, RecordStore};
