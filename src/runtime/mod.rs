//! Runtime topology: mutable wrappers around immutable config snapshots.
//!
//! # Data Flow
//! ```text
//! Config reload:
//!     applier.rs reconciles registry.rs entries
//!     → route.rs / cluster.rs / destination.rs install new snapshots
//!     → cluster.rs recomputes dynamic state
//!
//! Health monitoring:
//!     health::updater writes destination health
//!     → cluster.rs recomputes dynamic state
//!
//! Request path (read only):
//!     route table snapshot → RouteState.model()
//!     → ClusterState.dynamic_state() → eligible destinations
//! ```
//!
//! # Design Decisions
//! - All shared mutable state is published by atomic reference swap;
//!   readers never take a lock and never observe a torn snapshot
//! - Registries are explicitly owned and injected, never ambient statics
//! - Dynamic state is recomputed eagerly on every write, not lazily on read

pub mod applier;
pub mod cluster;
pub mod destination;
pub mod registry;
pub mod route;

pub use applier::{ApplyError, ConfigApplier};
pub use cluster::{ClusterModel, ClusterState, DynamicClusterState};
pub use destination::{DestinationHealth, DestinationState};
pub use registry::ItemRegistry;
pub use route::{RouteModel, RouteState};

/// Top-level route table.
pub type RouteRegistry = ItemRegistry<RouteState>;

/// Top-level cluster table.
pub type ClusterRegistry = ItemRegistry<ClusterState>;

/// Per-cluster destination table.
pub type DestinationRegistry = ItemRegistry<DestinationState>;
