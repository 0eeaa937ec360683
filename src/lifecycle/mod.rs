//! Lifecycle state machines for processing and virus scanning.
//!
//! Transitions are explicit functions that mutate document state and
//! return the side effects they want performed (job to enqueue,
//! notification to emit) as data. The service facade executes them, so
//! every transition is testable without a job runner or notification
//! sink attached.

pub mod processing;
pub mod scan;

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::external::{Event, JobKind};

/// A side effect requested by a state transition.
#[derive(Debug, Clone)]
pub enum SideEffect {
    Enqueue {
        job: JobKind,
        document_id: Uuid,
        delay: Option<Duration>,
    },
    Notify(Event),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("document {0} is archived and read-only")]
    Archived(Uuid),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("AI confidence {0} outside 0.0..=1.0")]
    InvalidConfidence(f32),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}
