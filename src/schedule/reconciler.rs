//! Schedule reconciler background task.
//!
//! Aligns room lifecycle with class times. On every tick:
//! 1. Creates rooms for classes starting within the lead window
//! 2. Deletes rooms for classes that ended more than the grace period ago
//!
//! Failures for one room are logged and retried on the next tick; they never
//! stop the loop or the rest of the tick.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered, after finishing
//! the tick in progress.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::models::ClassSchedule;
use super::source::ScheduleSource;
use crate::room::RoomService;
use crate::shared::AppError;

/// Default tick interval in seconds (1 minute).
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Default minutes before class start that the room is opened.
pub const DEFAULT_LEAD_MINUTES: i64 = 5;

/// Default minutes after class end that the room is torn down.
pub const DEFAULT_GRACE_MINUTES: i64 = 10;

/// Default minutes of ended classes scanned for teardown (1 day).
pub const DEFAULT_TEARDOWN_LOOKBACK_MINUTES: i64 = 24 * 60;

/// Configuration for the schedule reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    /// Rooms open for classes starting within this window.
    pub lead: ChronoDuration,
    /// Rooms close once a class has been over for longer than this.
    pub grace: ChronoDuration,
    /// How far past the grace cutoff ended classes are still scanned.
    pub teardown_lookback: ChronoDuration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECONDS),
            lead: ChronoDuration::minutes(DEFAULT_LEAD_MINUTES),
            grace: ChronoDuration::minutes(DEFAULT_GRACE_MINUTES),
            teardown_lookback: ChronoDuration::minutes(DEFAULT_TEARDOWN_LOOKBACK_MINUTES),
        }
    }
}

/// Outcome of a single tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Rooms this tick created (already existing rooms are not counted).
    pub created: usize,
    /// Rooms this tick deleted.
    pub deleted: usize,
    /// Rooms or feed queries that failed and will be retried.
    pub failures: usize,
}

pub struct ScheduleReconciler {
    rooms: Arc<dyn RoomService>,
    schedules: Arc<dyn ScheduleSource>,
    config: ReconcilerConfig,
}

impl ScheduleReconciler {
    pub fn new(
        rooms: Arc<dyn RoomService>,
        schedules: Arc<dyn ScheduleSource>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            rooms,
            schedules,
            config,
        }
    }

    /// Starts the reconciler on its own task.
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    /// Ticks until `cancel_token` is triggered.
    #[instrument(skip_all, name = "schedule.reconciler")]
    pub async fn run(&self, cancel_token: CancellationToken) {
        info!(
            interval_seconds = self.config.interval.as_secs(),
            lead_minutes = self.config.lead.num_minutes(),
            grace_minutes = self.config.grace.num_minutes(),
            "Starting schedule reconciler"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_tick(Utc::now()).await;
                }
                _ = cancel_token.cancelled() => {
                    info!("Schedule reconciler received shutdown signal, exiting");
                    break;
                }
            }
        }

        info!("Schedule reconciler stopped");
    }

    /// Runs one reconciliation pass as of `now`.
    ///
    /// Separated from the loop so tests can drive it with a fixed clock.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        self.open_upcoming(now, &mut report).await;
        self.close_finished(now, &mut report).await;

        if report.created > 0 || report.deleted > 0 || report.failures > 0 {
            info!(
                created = report.created,
                deleted = report.deleted,
                failures = report.failures,
                "Reconciler tick completed"
            );
        } else {
            debug!("Reconciler tick completed with no changes");
        }

        report
    }

    async fn open_upcoming(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let Some(until) = now.checked_add_signed(self.config.lead) else {
            error!(lead = %self.config.lead, "Lead window is out of range");
            report.failures += 1;
            return;
        };

        let upcoming = match self.schedules.starting_between(now, until).await {
            Ok(schedules) => schedules,
            Err(e) => {
                error!(error = %e, "Failed to load upcoming class schedules");
                report.failures += 1;
                return;
            }
        };

        for schedule in upcoming {
            match self.rooms.create_room(&schedule.room_id()).await {
                Ok(true) => {
                    info!(
                        room_id = %schedule.room_id(),
                        started_at = %schedule.started_at,
                        "Opened room ahead of class start"
                    );
                    report.created += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        room_id = %schedule.room_id(),
                        error = %e,
                        "Failed to open room, will retry next tick"
                    );
                    report.failures += 1;
                }
            }
        }
    }

    async fn close_finished(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let window = now.checked_sub_signed(self.config.grace).and_then(|cutoff| {
            cutoff
                .checked_sub_signed(self.config.teardown_lookback)
                .map(|from| (from, cutoff))
        });
        let Some((from, cutoff)) = window else {
            error!(
                grace = %self.config.grace,
                lookback = %self.config.teardown_lookback,
                "Teardown window is out of range"
            );
            report.failures += 1;
            return;
        };

        let finished = match self.schedules.ended_between(from, cutoff).await {
            Ok(schedules) => schedules,
            Err(e) => {
                error!(error = %e, "Failed to load ended class schedules");
                report.failures += 1;
                return;
            }
        };

        for schedule in finished {
            self.close_room(&schedule, report).await;
        }
    }

    async fn close_room(&self, schedule: &ClassSchedule, report: &mut TickReport) {
        let room_id = schedule.room_id();
        match self.rooms.delete_room(&room_id).await {
            Ok(()) => {
                info!(
                    room_id = %room_id,
                    ended_at = %schedule.ended_at,
                    "Closed room after class end"
                );
                report.deleted += 1;
            }
            // Already gone, or never opened
            Err(AppError::NotFound(_)) => {}
            Err(e) => {
                warn!(
                    room_id = %room_id,
                    error = %e,
                    "Failed to close room, will retry next tick"
                );
                report.failures += 1;
            }
        }
    }
}
