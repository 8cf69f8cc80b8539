// Public API - what other modules can use
pub use models::ClassSchedule;
pub use reconciler::{ReconcilerConfig, ScheduleReconciler, TickReport};
pub use source::{InMemoryScheduleSource, PostgresScheduleSource, ScheduleSource};

// Internal modules
mod models;
mod reconciler;
mod source;
