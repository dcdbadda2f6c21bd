// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod registry;

// ---- Re-exports for stable public API ----
pub use crate::config::RelayConfig;
pub use crate::ingest::scheduler::{JobId, Scheduler};
pub use crate::ingest::{PollReport, Reconciler};
pub use crate::model::{Destination, FeedKind, Item, Target, Watermark};
pub use crate::notify::{DeliverySink, Outbox};
pub use crate::registry::watcher::RegistryWatcher;
pub use crate::registry::{ChangeNotifier, Registry};
