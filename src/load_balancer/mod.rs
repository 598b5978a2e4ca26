//! Destination selection.
//!
//! Selection is a pure consumer of the cluster's published dynamic state:
//! it receives the eligible-destination snapshot and picks one. Health
//! filtering already happened when the snapshot was computed.

pub mod round_robin;

use std::sync::Arc;

use crate::runtime::destination::DestinationState;

/// Picks one destination out of a cluster's eligible snapshot.
pub trait DestinationSelector: Send + Sync + std::fmt::Debug {
    fn pick(&self, available: &[Arc<DestinationState>]) -> Option<Arc<DestinationState>>;
}

pub use round_robin::RoundRobin;
