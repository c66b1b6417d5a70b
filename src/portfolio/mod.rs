//! Portfolio ingestion and the per-calendar-year schedule.

pub mod schedule;

pub use schedule::{build_yearly_schedule, ScheduleRow, YearlySchedule};
