/// Cancellation and deadline checks applied at each await point of a call
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{RatesError, Result};

#[derive(Debug, Clone, Default)]
pub struct CallGuard {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallGuard {
    /// Guard that never fires
    pub fn none() -> Self {
        CallGuard::default()
    }

    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        CallGuard {
            cancel,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Await `fut` unless the token fires or the deadline passes first
    pub async fn run<T, F>(&self, stage: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(RatesError::Cancelled(format!("{} cancelled", stage)));
        }

        let guarded = async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    Err(RatesError::Cancelled(format!("{} cancelled", stage)))
                }
                result = fut => result,
            }
        };

        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, guarded)
                .await
                .map_err(|_| RatesError::Cancelled(format!("{} timed out", stage)))?,
            None => guarded.await,
        }
    }
}
