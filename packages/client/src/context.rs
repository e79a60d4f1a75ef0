//! Per-request execution context: a deadline composed from the client's
//! absolute timeout and a caller-supplied one, plus a cancellation token
//! propagated into every blocking point (resolve, dial, handshake, read).

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{self, Error, Result};

/// Cancellation and deadline handle carried by a request.
///
/// Cloning is cheap; children observe the parent's cancellation.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context that never cancels and never times out.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Bind a cancellation token. The earliest of any composed deadlines
    /// still applies.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child context whose deadline is the earliest of the current
    /// one and `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(candidate)),
            None => Some(candidate),
        };
        Self {
            token: self.token.clone(),
            deadline,
        }
    }

    /// Derive a child context with an absolute deadline, keeping the
    /// earlier of the two.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => Some(existing.min(deadline)),
            None => Some(deadline),
        };
        Self {
            token: self.token.clone(),
            deadline,
        }
    }

    /// Request cancellation of this context and all of its clones.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `Cancelled` or `Timeout` if the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(error::cancelled());
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(error::timeout());
            }
        }
        Ok(())
    }

    /// Run `fut` under this context. Cancellation wins over the deadline
    /// when both fire in the same poll.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(error::cancelled()),
                    outcome = tokio::time::timeout_at(deadline.into(), fut) => match outcome {
                        Ok(result) => result,
                        Err(_) => Err(error::timeout()),
                    },
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(error::cancelled()),
                    result = fut => result,
                }
            }
        }
    }

    /// Like [`run`](Self::run) for futures whose error is an `io::Error`.
    pub async fn run_io<F, T>(&self, fut: F, wrap: fn(std::io::Error) -> Error) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        self.run(async move { fut.await.map_err(wrap) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_is_earliest_wins() {
        let ctx = Context::new()
            .with_timeout(Duration::from_secs(60))
            .with_timeout(Duration::from_millis(1));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn cancel_aborts_inflight_future() {
        let ctx = Context::new();
        let child = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            child.cancel();
        });
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
