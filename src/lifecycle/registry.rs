//! Subsystem registry: per-service lifecycle state, queryable before and
//! after dismissal.

use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum ServiceState {
    NotConfigured,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SubsystemId {
    StringPool,
    SecretPool,
    ResourceMapper,
    LogPipeline,
    WorkerPool,
    Network,
    WebUi,
    TextRenderer,
}

/// Startup order; shutdown walks the drainable services in reverse.
pub const SUBSYSTEM_ORDER: [SubsystemId; 8] = [
    SubsystemId::StringPool,
    SubsystemId::SecretPool,
    SubsystemId::ResourceMapper,
    SubsystemId::LogPipeline,
    SubsystemId::WorkerPool,
    SubsystemId::Network,
    SubsystemId::WebUi,
    SubsystemId::TextRenderer,
];

#[derive(Debug, Clone, Serialize)]
pub struct SubsystemRegistry {
    entries: Vec<(SubsystemId, ServiceState)>,
}

impl Default for SubsystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubsystemRegistry {
    pub fn new() -> Self {
        Self {
            entries: SUBSYSTEM_ORDER
                .iter()
                .map(|id| (*id, ServiceState::NotConfigured))
                .collect(),
        }
    }

    pub fn set(&mut self, id: SubsystemId, state: ServiceState) {
        if let Some(entry) = self.entries.iter_mut().find(|(entry, _)| *entry == id) {
            entry.1 = state;
        }
    }

    pub fn state(&self, id: SubsystemId) -> ServiceState {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, state)| *state)
            .unwrap_or(ServiceState::NotConfigured)
    }

    /// Entries in startup order.
    pub fn iter(&self) -> impl Iterator<Item = (SubsystemId, ServiceState)> + '_ {
        self.entries.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_tracks_states_in_startup_order() {
        let mut registry = SubsystemRegistry::new();
        assert!(
            registry
                .iter()
                .all(|(_, state)| state == ServiceState::NotConfigured)
        );
        registry.set(SubsystemId::LogPipeline, ServiceState::Running);
        assert_eq!(
            registry.state(SubsystemId::LogPipeline),
            ServiceState::Running
        );
        let order: Vec<SubsystemId> = registry.iter().map(|(id, _)| id).collect();
        assert_eq!(order.as_slice(), &SUBSYSTEM_ORDER);
    }
}
