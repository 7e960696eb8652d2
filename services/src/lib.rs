//! Node-network services: upstream sync, retention cleanup and a TTL query
//! cache, plus the lifecycle manager that starts and stops them together.
//!
//! All services talk to storage through [`nodegraph_store::Datastore`] and to
//! the upstream provider through [`nodegraph_upstream::NodeSource`], so any
//! backend (LMDB in the daemon, nullables in tests) can be plugged in.

pub mod config;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod periodic;
pub mod query_cache;
pub mod retention;
pub mod retry;
pub mod shutdown;
pub mod sync;
pub mod tracing_spans;

pub use config::ServicesConfig;
pub use error::ServiceError;
pub use guard::{CycleGuard, CyclePermit, CycleState};
pub use lifecycle::ServiceManager;
pub use logging::{init_logging, LogFormat};
pub use metrics::ServiceMetrics;
pub use periodic::PeriodicTask;
pub use query_cache::{cache_key, CacheEntry, CacheSettings, CacheStats, QueryCache};
pub use retention::{
    CleanupOutcome, CleanupReport, CleanupSettings, RetentionCleaner, RetentionPolicy,
};
pub use retry::{Delay, RetryPolicy};
pub use shutdown::ShutdownController;
pub use sync::{SyncOrchestrator, SyncOutcome, SyncReport, SyncSettings};
