use crate::application::bootstrap::{
    bootstrap_workspace, init_logging, open_record_store, BootstrapResult, ConfiguredStore,
};
use crate::application::pitched_reconciler::{PitchedItemReconciler, ReconcileError};
use crate::application::week_navigation::WeekNavigator;
use crate::domain::week_calendar::WeekCalendar;
use crate::infrastructure::config::{read_store_backend, read_tracker_settings, TrackerSettings};
use crate::infrastructure::error::InfraError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One user's tracker wired from a workspace on disk.
pub struct TrackerSession {
    bootstrap: BootstrapResult,
    settings: TrackerSettings,
    navigator: Arc<WeekNavigator<ConfiguredStore>>,
    reconciler: PitchedItemReconciler<ConfiguredStore>,
}

impl TrackerSession {
    pub fn open(workspace_root: &Path, user_id: &str) -> Result<Self, InfraError> {
        Self::open_with_calendar(workspace_root, user_id, WeekCalendar::new())
    }

    pub fn open_with_calendar(
        workspace_root: &Path,
        user_id: &str,
        calendar: WeekCalendar,
    ) -> Result<Self, InfraError> {
        if user_id.trim().is_empty() {
            return Err(InfraError::InvalidConfig("user id must not be empty".to_string()));
        }
        let bootstrap = bootstrap_workspace(workspace_root)?;
        let settings = read_tracker_settings(&bootstrap.config_dir)?;
        init_logging(&settings.log_level);

        let backend = read_store_backend(&bootstrap.config_dir)?;
        let store = Arc::new(open_record_store(&backend, &bootstrap.database_path)?);
        let navigator = Arc::new(
            WeekNavigator::new(Arc::clone(&store), user_id.trim())
                .with_calendar(calendar)
                .with_default_week_limit(settings.default_week_limit),
        );
        let reconciler = PitchedItemReconciler::new(store, Arc::clone(&navigator))
            .with_settle_delay(Duration::from_millis(settings.settle_delay_ms));
        log::info!(
            "tracker session opened for {} in {}",
            user_id.trim(),
            bootstrap.workspace_root.display()
        );

        Ok(Self {
            bootstrap,
            settings,
            navigator,
            reconciler,
        })
    }

    /// Loads the navigable range, the live week and its pitched item view.
    pub async fn start(&self) -> Result<(), ReconcileError> {
        self.navigator.initialize().await?;
        self.reconciler.refresh().await?;
        Ok(())
    }

    pub fn workspace(&self) -> &BootstrapResult {
        &self.bootstrap
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn navigator(&self) -> &Arc<WeekNavigator<ConfiguredStore>> {
        &self.navigator
    }

    pub fn reconciler(&self) -> &PitchedItemReconciler<ConfiguredStore> {
        &self.reconciler
    }
}
