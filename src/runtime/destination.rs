//! Per-destination runtime state.
//!
//! A destination is one backend endpoint within a cluster, with
//! independently tracked health. The wrapper is mutable only through atomic
//! swaps: config by `ArcSwap`, health values as atomics. Readers on the
//! request path never take a lock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::DestinationConfig;

/// Health of one destination on one track.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationHealth {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for DestinationHealth {
    fn from(val: u8) -> Self {
        match val {
            1 => DestinationHealth::Healthy,
            2 => DestinationHealth::Unhealthy,
            _ => DestinationHealth::Unknown,
        }
    }
}

/// The two independent health tracks of a destination.
///
/// Active health is driven by synthetic probes, passive health by live
/// traffic outcomes. The passive track carries a generation counter so a
/// scheduled reactivation can tell whether the value it is about to revert
/// is still the one it was armed for.
#[derive(Debug, Default)]
pub struct DestinationHealthState {
    active: AtomicU8,
    passive: AtomicU8,
    passive_generation: AtomicU64,
}

impl DestinationHealthState {
    pub fn active(&self) -> DestinationHealth {
        self.active.load(Ordering::Acquire).into()
    }

    pub fn passive(&self) -> DestinationHealth {
        self.passive.load(Ordering::Acquire).into()
    }

    pub(crate) fn set_active(&self, health: DestinationHealth) {
        self.active.store(health as u8, Ordering::Release);
    }

    /// Write passive health and bump the generation, returning the new
    /// generation for reactivation bookkeeping.
    pub(crate) fn set_passive(&self, health: DestinationHealth) -> u64 {
        self.passive.store(health as u8, Ordering::Release);
        self.passive_generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn passive_generation(&self) -> u64 {
        self.passive_generation.load(Ordering::Acquire)
    }
}

/// Runtime wrapper around an immutable destination config snapshot.
///
/// Owned exclusively by its cluster's destination registry; created on first
/// reference during config application and destroyed when no longer
/// referenced by config.
#[derive(Debug)]
pub struct DestinationState {
    id: String,
    config: ArcSwapOption<DestinationConfig>,
    health: DestinationHealthState,
}

impl DestinationState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: ArcSwapOption::empty(),
            health: DestinationHealthState::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current config snapshot. `None` only during the window between
    /// creation and the first config installation.
    pub fn config(&self) -> Option<Arc<DestinationConfig>> {
        self.config.load_full()
    }

    /// Install a new config snapshot by reference swap.
    pub fn set_config(&self, config: Arc<DestinationConfig>) {
        self.config.store(Some(config));
    }

    pub fn health(&self) -> &DestinationHealthState {
        &self.health
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_tracks_are_independent() {
        let destination = DestinationState::new("d1");
        assert_eq!(destination.health().active(), DestinationHealth::Unknown);
        assert_eq!(destination.health().passive(), DestinationHealth::Unknown);

        destination.health().set_active(DestinationHealth::Unhealthy);
        assert_eq!(destination.health().active(), DestinationHealth::Unhealthy);
        assert_eq!(destination.health().passive(), DestinationHealth::Unknown);
    }

    #[test]
    fn passive_writes_bump_generation() {
        let destination = DestinationState::new("d1");
        let g1 = destination.health().set_passive(DestinationHealth::Unhealthy);
        let g2 = destination.health().set_passive(DestinationHealth::Healthy);
        assert!(g2 > g1);
        assert_eq!(destination.health().passive_generation(), g2);
    }

    #[test]
    fn config_swaps_by_reference() {
        let destination = DestinationState::new("d1");
        assert!(destination.config().is_none());

        let config = Arc::new(DestinationConfig {
            id: "d1".to_string(),
            address: "http://127.0.0.1:3000".to_string(),
            health_address: Some("http://127.0.0.1:3001/ping".to_string()),
            metadata: Default::default(),
        });
        destination.set_config(config.clone());

        assert!(Arc::ptr_eq(&destination.config().unwrap(), &config));
    }
}
