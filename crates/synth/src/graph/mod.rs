//! Resource builders, one module per tier of the graph.
//!
//! The builders run in dependency order — network, access, capacity,
//! scale-down, orchestration, routing, service — and hand typed handles
//! forward. Shared wiring constants live here so the port and name contract
//! between tiers is stated once.

pub mod access;
pub mod capacity;
pub mod network;
pub mod orchestration;
pub mod routing;
pub mod scaling;
pub mod service;

/// Port the application container listens on. The service security group,
/// target group, and both health checks must match this exactly.
pub const APP_PORT: u16 = 8181;

/// Status endpoint probed by the container and target-group health checks.
pub const HEALTH_PATH: &str = "/system_stats";

/// Port the public listener terminates on.
pub const LISTENER_PORT: u16 = 80;

/// ECS cluster name; instances join it via their boot script.
pub const CLUSTER_NAME: &str = "nimbus-cluster";

/// Name of the single application container in the task definition.
pub const CONTAINER_NAME: &str = "app";

/// Externally published image repository holding the application image.
pub const IMAGE_REPOSITORY: &str = "nimbus-app";
