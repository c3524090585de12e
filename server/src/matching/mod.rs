//! Daily match scheduling.

pub mod handlers;
pub mod scheduler;

pub use scheduler::{
    spawn_match_scheduler, MatchScheduler, SchedulerState, SchedulerStatus, SweepReport,
    TickOutcome,
};
