//! docflow — document lifecycle and concurrency coordinator.
//!
//! The library boundary covers collaborative locking, the append-only
//! version store, the processing and virus-scan state machines, and the
//! bulk-operation coordinator. Identity/permissions, blob byte storage,
//! the async job runner and notification delivery are consumed as
//! opaque traits (see `external`).

pub mod bulk;
pub mod config;
pub mod db;
pub mod external;
pub mod lifecycle;
pub mod locks;
pub mod models;
pub mod service;
pub mod versioning;

pub use bulk::{BulkAction, BulkError, BulkFailure, BulkOperationResult};
pub use config::CoordinatorConfig;
pub use external::{
    AccessAction, Authorizer, BlobError, BlobStore, Event, JobKind, JobRunner, Notifier,
};
pub use lifecycle::{LifecycleError, SideEffect};
pub use locks::sweeper::{start_sweeper, LockSweeperHandle};
pub use locks::LockError;
pub use models::enums::{ContentKind, ProcessingStatus, VersionEvent, VirusScanStatus};
pub use models::{Document, LockState, Version};
pub use service::{DocumentService, DownloadError, MutationError, QuarantineReport, ScanVerdict};
pub use versioning::{DiffResult, VersionError};
