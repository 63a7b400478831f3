// src/pool/error.rs

use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by [`WorkerPool`](super::WorkerPool) to its callers.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A job of the batch failed. `location` is where `run` was called.
    #[error("job failed in batch submitted at {location}")]
    JobFailed {
        location: &'static Location<'static>,
        #[source]
        source: JobFailure,
    },

    /// The job behind a promise failed. `location` is where `resolve` was called.
    #[error("promise resolved at {location} failed")]
    PromiseFailed {
        location: &'static Location<'static>,
        #[source]
        source: JobFailure,
    },

    #[error("pool cannot be joined from one of its own workers")]
    JoinFromWorker,

    #[error("failed to start a pool worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl PoolError {
    /// The job failure behind this error, if any.
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            PoolError::JobFailed { source, .. } | PoolError::PromiseFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Call site of the `run`/`resolve` that surfaced the failure.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            PoolError::JobFailed { location, .. } | PoolError::PromiseFailed { location, .. } => {
                Some(location)
            }
            _ => None,
        }
    }
}

/// The error a job body returned (or its panic, converted), as captured
/// where it happened.
///
/// The wrapped `anyhow::Error` keeps the job's own context chain and
/// backtrace. Cloning shares the same error.
#[derive(Clone)]
pub struct JobFailure(Arc<anyhow::Error>);

impl JobFailure {
    pub(crate) fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(anyhow::anyhow!("job panicked: {message}"))
    }

    /// The error as the job returned it.
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Look for an error of type `E` anywhere in the job's context chain,
    /// including failures of nested batches.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(found) = self.0.downcast_ref::<E>() {
            return Some(found);
        }
        self.0.chain().find_map(|cause| {
            cause.downcast_ref::<E>().or_else(|| {
                cause
                    .downcast_ref::<JobFailure>()
                    .and_then(|nested| nested.downcast_ref::<E>())
            })
        })
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for JobFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        (**self.0).source()
    }
}
