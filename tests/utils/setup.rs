#![allow(dead_code)] // Not every test file uses every helper

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use classroom_realtime::{
    bus::{InMemoryMessageBus, MessageBus},
    live::LiveSessionRegistry,
    room::{RoomConfig, RoomRegistry},
    schedule::{ClassSchedule, InMemoryScheduleSource, ReconcilerConfig, ScheduleReconciler},
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// One simulated server process
pub struct Instance {
    pub rooms: Arc<RoomRegistry>,
    pub live_sessions: Arc<LiveSessionRegistry>,
}

pub struct TestSetup {
    pub instances: Vec<Instance>,
    pub schedules: Arc<InMemoryScheduleSource>,
    pub now: DateTime<Utc>,
}

impl TestSetup {
    /// The first instance's registry
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.instances[0].rooms
    }

    pub fn live_sessions(&self) -> &Arc<LiveSessionRegistry> {
        &self.instances[0].live_sessions
    }

    /// Reconciler driving the first instance, with default windows
    pub fn reconciler(&self) -> ScheduleReconciler {
        ScheduleReconciler::new(
            self.rooms().clone(),
            self.schedules.clone(),
            ReconcilerConfig::default(),
        )
    }

    /// Adds a class relative to the setup's reference time
    pub fn add_class(&self, id: i64, starts_in_minutes: i64, length_minutes: i64) -> ClassSchedule {
        let schedule = ClassSchedule {
            id,
            started_at: self.now + Duration::minutes(starts_in_minutes),
            ended_at: self.now + Duration::minutes(starts_in_minutes + length_minutes),
        };
        self.schedules.insert(schedule.clone());
        schedule
    }
}

pub struct TestSetupBuilder {
    instances: usize,
    bus: Option<Arc<dyn MessageBus>>,
    room_config: RoomConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            instances: 1,
            bus: None,
            room_config: RoomConfig::default(),
        }
    }

    /// Several registries sharing one bus, like several server processes
    pub fn with_instances(mut self, instances: usize) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_subscriber_buffer(mut self, size: usize) -> Self {
        self.room_config.subscriber_buffer = size;
        self
    }

    pub fn build(self) -> TestSetup {
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryMessageBus::new()));

        let instances = (0..self.instances.max(1))
            .map(|_| {
                let live_sessions = Arc::new(LiveSessionRegistry::new());
                let rooms = Arc::new(
                    RoomRegistry::new(bus.clone(), self.room_config.clone())
                        .with_live_sessions(live_sessions.clone()),
                );
                Instance {
                    rooms,
                    live_sessions,
                }
            })
            .collect();

        TestSetup {
            instances,
            schedules: Arc::new(InMemoryScheduleSource::new()),
            now: Utc::now(),
        }
    }
}
