use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, instrument, warn};

use super::models::ClassSchedule;
use crate::shared::AppError;

/// Read-only feed of class schedules. Both ranges are inclusive.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClassSchedule>, AppError>;

    async fn ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClassSchedule>, AppError>;
}

/// In-memory implementation of ScheduleSource for development and testing
#[derive(Default)]
pub struct InMemoryScheduleSource {
    schedules: Mutex<Vec<ClassSchedule>>,
}

impl InMemoryScheduleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<ClassSchedule>) -> Self {
        Self {
            schedules: Mutex::new(schedules),
        }
    }

    pub fn insert(&self, schedule: ClassSchedule) {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(schedule);
    }

    fn filter(&self, predicate: impl Fn(&ClassSchedule) -> bool) -> Vec<ClassSchedule> {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|schedule| predicate(schedule))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ScheduleSource for InMemoryScheduleSource {
    async fn starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClassSchedule>, AppError> {
        Ok(self.filter(|s| s.started_at >= from && s.started_at <= to))
    }

    async fn ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClassSchedule>, AppError> {
        Ok(self.filter(|s| s.ended_at >= from && s.ended_at <= to))
    }
}

/// PostgreSQL implementation reading the `class_schedules` table
pub struct PostgresScheduleSource {
    pool: PgPool,
}

impl PostgresScheduleSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleSource for PostgresScheduleSource {
    #[instrument(skip(self))]
    async fn starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClassSchedule>, AppError> {
        let schedules = sqlx::query_as::<_, ClassSchedule>(
            "SELECT id, started_at, ended_at FROM class_schedules WHERE started_at >= $1 AND started_at <= $2 ORDER BY started_at"
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch upcoming class schedules");
            AppError::DatabaseError(e.to_string())
        })?;

        debug!(count = schedules.len(), "Fetched upcoming class schedules");
        Ok(schedules)
    }

    #[instrument(skip(self))]
    async fn ended_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClassSchedule>, AppError> {
        let schedules = sqlx::query_as::<_, ClassSchedule>(
            "SELECT id, started_at, ended_at FROM class_schedules WHERE ended_at >= $1 AND ended_at <= $2 ORDER BY ended_at"
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch ended class schedules");
            AppError::DatabaseError(e.to_string())
        })?;

        debug!(count = schedules.len(), "Fetched ended class schedules");
        Ok(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn schedule(id: i64, start_offset_min: i64, length_min: i64) -> ClassSchedule {
        let now = Utc::now();
        ClassSchedule {
            id,
            started_at: now + Duration::minutes(start_offset_min),
            ended_at: now + Duration::minutes(start_offset_min + length_min),
        }
    }

    #[tokio::test]
    async fn test_in_memory_ranges_are_inclusive() {
        let exact = schedule(1, 10, 60);
        let source = InMemoryScheduleSource::with_schedules(vec![exact.clone()]);

        let starting = source
            .starting_between(exact.started_at, exact.started_at)
            .await
            .unwrap();
        let ended = source
            .ended_between(exact.ended_at, exact.ended_at)
            .await
            .unwrap();

        assert_eq!(starting, vec![exact.clone()]);
        assert_eq!(ended, vec![exact]);
    }

    #[tokio::test]
    async fn test_in_memory_filters_by_range() {
        let source = InMemoryScheduleSource::new();
        source.insert(schedule(1, 5, 60));
        source.insert(schedule(2, 120, 60));

        let now = Utc::now();
        let starting = source
            .starting_between(now, now + Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(starting.len(), 1);
        assert_eq!(starting[0].id, 1);
    }
}
