//! Document lifecycle on top of the markdown layer: entity paths, mutation
//! events, snapshot updates, overview reads, and the pending-update queue.

pub mod events;
pub mod overview;
pub mod paths;
pub mod queue;
pub mod updater;

pub use events::{EventSink, NullEventSink, SqliteEventSink};
pub use paths::{EntityRef, EntityType};
pub use queue::PendingQueue;
pub use updater::SnapshotUpdater;
