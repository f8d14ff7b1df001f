//! C10 — async object I/O scheduler: a bounded pool of permits guarding
//! blocking storage calls, so a flood of concurrent requests can't pin
//! every actix worker thread in disk I/O at once (spec.md §4.10).

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::constants::DEFAULT_IO_SCHED_WORKERS;
use crate::error::SyncError;

/// Bounds how many object-store calls run concurrently. Cloning is cheap;
/// all clones share the same permit pool.
#[derive(Clone)]
pub struct IoScheduler {
    semaphore: Arc<Semaphore>,
}

impl IoScheduler {
    pub fn new(workers: usize) -> Self {
        IoScheduler {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run `f` (a blocking call into the object store) on the blocking pool,
    /// holding one scheduler permit for the duration.
    pub async fn run<F, T>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce() -> Result<T, SyncError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit: SemaphorePermit<'_> = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SyncError::internal("io scheduler semaphore closed"))?;
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|err| SyncError::internal(format!("io task panicked: {err}")))?
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for IoScheduler {
    fn default() -> Self {
        IoScheduler::new(DEFAULT_IO_SCHED_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_blocking_work_and_returns_result() {
        let sched = IoScheduler::new(2);
        let result = sched.run(|| Ok::<_, SyncError>(2 + 2)).await.unwrap();
        assert_eq!(result, 4);
    }

    #[tokio::test]
    async fn permit_is_released_after_completion() {
        let sched = IoScheduler::new(1);
        assert_eq!(sched.available_permits(), 1);
        sched.run(|| Ok::<_, SyncError>(())).await.unwrap();
        assert_eq!(sched.available_permits(), 1);
    }

    #[tokio::test]
    async fn propagates_errors_from_the_closure() {
        let sched = IoScheduler::new(1);
        let err = sched
            .run(|| Err::<(), _>(SyncError::not_found("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }
}
