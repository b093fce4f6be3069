pub mod cache;
pub mod clock;
pub mod freshness;
pub mod mirror;
pub mod reconciler;
pub mod tasks;

// Re-export commonly used items
pub use crate::cache::{CachedState, Offer};
pub use crate::clock::{local_midnight, until_next_midnight, Clock, FixedClock, SystemClock};
pub use crate::freshness::FreshnessPolicy;
pub use crate::mirror::{MirrorSnapshot, OfficeStatusService, StatusMirror};
pub use crate::reconciler::{format_amount, Ingest, PresenceSink, Reconciler, Snapshot};
pub use crate::tasks::BackgroundTasks;
