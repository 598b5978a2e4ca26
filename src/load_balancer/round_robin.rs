//! Round-robin destination selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::DestinationSelector;
use crate::runtime::destination::DestinationState;

/// Rotates through the eligible snapshot with an internal counter.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DestinationSelector for RoundRobin {
    fn pick(&self, available: &[Arc<DestinationState>]) -> Option<Arc<DestinationState>> {
        if available.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % available.len();
        Some(available[index].clone())
    }
}
