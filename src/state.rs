use crate::clock::Clock;
use crate::registry::ConnectionRegistry;
use common::messages::{ClockStatus, Snapshot};

// Process-wide singletons shared by every connection and route
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub clock: Clock,
    pub registry: ConnectionRegistry,
}

impl AppState {
    pub async fn snapshot_for(&self, id: &str) -> Snapshot {
        let role = self.registry.role_of(id).await;
        self.clock.read().await.snapshot(role.slot())
    }

    pub async fn status(&self) -> ClockStatus {
        let connections = self.registry.len().await;
        let clock = self.clock.read().await;
        ClockStatus {
            time: clock.time_remaining(),
            active_turns: clock.active_turns().to_vec(),
            enabled: clock.enabled(),
            connections,
        }
    }
}
