//! Job bookkeeping for the controller

use crate::cancel::CancelToken;
use crate::compression_result::CompressionResult;
use crate::error::{CompressionError, Result};
use tokio::task::JoinHandle;

pub type JobId = u64;

/// The video job currently tracked by a controller
#[derive(Debug, Clone)]
pub struct ActiveJob {
    pub id: JobId,
    pub cancel: CancelToken,
}

/// Handle to a running video job
#[derive(Debug)]
pub struct VideoJobHandle {
    id: JobId,
    cancel: CancelToken,
    task: JoinHandle<Result<CompressionResult>>,
}

impl VideoJobHandle {
    pub(crate) fn new(id: JobId, cancel: CancelToken, task: JoinHandle<Result<CompressionResult>>) -> Self {
        Self { id, cancel, task }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Request cancellation of this job
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> Result<CompressionResult> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(CompressionError::cancelled()),
            Err(e) => Err(CompressionError::encode(format!("Video job aborted: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handle_forwards_cancel_and_outcome() {
        let cancel = CancelToken::new();
        let watched = cancel.clone();
        let task = tokio::spawn(async move {
            watched.cancelled().await;
            Err(CompressionError::cancelled())
        });
        let handle = VideoJobHandle::new(9, cancel, task);

        assert_eq!(handle.id(), 9);
        handle.cancel();
        let err = tokio::time::timeout(Duration::from_secs(1), handle.wait())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_aborted_task_is_cancelled() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(CompressionError::encode("unreachable"))
        });
        task.abort();
        let handle = VideoJobHandle::new(1, CancelToken::new(), task);

        assert!(handle.wait().await.unwrap_err().is_cancelled());
    }
}
