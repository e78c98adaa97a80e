pub mod bosses;
pub mod models;
pub mod week_calendar;
