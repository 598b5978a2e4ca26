//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active track (prober.rs):
//!     Periodic round per cluster
//!     → Probe each destination (timeout-bound)
//!     → Aggregate one ProbingResult batch
//!     → policy.rs decides new health values
//!     → updater.rs writes them + recomputes dynamic state
//!
//! Passive track (fed by the proxy path):
//!     Upstream failure observed
//!     → updater.rs set_passive(Unhealthy, reactivation period)
//!     → timed reversion to Unknown
//! ```
//!
//! # Design Decisions
//! - Active and passive tracks are independent; either may exclude a
//!   destination from selection
//! - Policies are pure: they compute values, only the updater writes
//! - Per-destination probe failures never abort a round

pub mod policy;
pub mod prober;
pub mod updater;

pub use policy::{
    default_policies, HealthPolicy, NewActiveHealth, ProbeOutcome, ProbingResult,
};
pub use prober::HealthProber;
pub use updater::HealthUpdater;
