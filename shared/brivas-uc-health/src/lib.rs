//! UC Cluster Status Aggregation Engine
//!
//! Fans out to the configuration, real-time registration and counter APIs
//! of a UC cluster, normalizes their answers into one health model and
//! reduces it to a single verdict per server. Backends fail independently;
//! every failure is carried as data in the returned structures.

pub mod aggregator;
pub mod backend;
pub mod builder;
pub mod config;
pub mod directory;
pub mod engine;
pub mod mock;
pub mod probe;
pub mod rollup;
pub mod types;
pub mod verdict;

pub use aggregator::ClusterAggregator;
pub use backend::{
    Backend, BackendError, BackendSet, ConfigClient, ConfigPayload, CounterClient, DeviceClass,
    DeviceQuery, DeviceState, RealtimeClient, RegistrationStatus,
};
pub use builder::HealthBuilder;
pub use config::EngineConfig;
pub use directory::{ServerDirectory, StaticDirectory, TenantScope};
pub use engine::{BackendStatus, StatusEngine};
pub use probe::{BackendProbe, PortConnector, ProbeSet, ProbeTarget, TcpConnector};
pub use rollup::{ClusterSummary, Section};
pub use types::*;
