pub mod bootstrap;
pub mod historical_analysis;
pub mod interaction;
pub mod pitched_reconciler;
pub mod session;
pub mod week_navigation;
