//! Scoped transactions.
//!
//! A repository call creates one [`Scope`] that bounds every store round trip
//! by the configured timeout, opens at most one transaction, evaluates its
//! body into a value and hands the transaction plus that value to
//! [`finish`]. `finish` consumes the transaction, so it runs exactly once per
//! opened transaction. If the whole call is dropped instead, sqlx rolls the
//! transaction back when it is dropped.

use std::future::Future;
use std::time::Duration;

use sqlx::{Postgres, Transaction};
use tokio::time::Instant;

use super::{log_error, RepoError, RepoResult};

/// Deadline shared by all steps of one repository call.
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    timeout: Duration,
    deadline: Instant,
}

impl Scope {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Drives `op` until the scope's deadline. On expiry `op` is dropped,
    /// which releases any borrow it held on the transaction, and the
    /// outcome becomes [`RepoError::Timeout`].
    pub async fn run<T, F>(&self, op: F) -> RepoResult<T>
    where
        F: Future<Output = RepoResult<T>>,
    {
        match tokio::time::timeout_at(self.deadline, op).await {
            Ok(outcome) => outcome,
            Err(_) => Err(log_error(RepoError::Timeout(self.timeout))),
        }
    }
}

/// Commits on success and rolls back on failure, both bounded by the
/// scope's deadline.
///
/// A commit that overruns the deadline reports [`RepoError::Timeout`]; the
/// dropped transaction is rolled back by sqlx unless the server already
/// applied the commit. A rollback that overruns it returns the original
/// cause and leaves the rollback to the dropped transaction. A failed
/// rollback is reported as [`RepoError::Rollback`], which keeps the error
/// that caused the rollback as `cause`.
pub async fn finish<T>(
    scope: &Scope,
    tx: Transaction<'_, Postgres>,
    outcome: RepoResult<T>,
) -> RepoResult<T> {
    match outcome {
        Ok(value) => {
            scope
                .run(async {
                    tx.commit()
                        .await
                        .map_err(|err| log_error(RepoError::Commit(err)))
                })
                .await?;
            Ok(value)
        }
        Err(cause) => match tokio::time::timeout_at(scope.deadline, tx.rollback()).await {
            Ok(Ok(())) => Err(cause),
            Ok(Err(err)) => Err(log_error(RepoError::Rollback {
                source: err,
                cause: Box::new(cause),
            })),
            Err(_) => {
                tracing::warn!(error = %cause, "rollback overran the deadline, dropping transaction");
                Err(cause)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_passes_through_outcome_before_deadline() {
        let scope = Scope::new(Duration::from_secs(5));
        let outcome = scope.run(async { Ok::<_, RepoError>(7) }).await;
        assert_eq!(outcome.unwrap(), 7);
    }

    #[tokio::test]
    async fn run_times_out_and_drops_the_operation() {
        let scope = Scope::new(Duration::from_millis(20));
        let outcome = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, RepoError>(())
            })
            .await;
        assert!(matches!(outcome, Err(RepoError::Timeout(d)) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn deadline_is_shared_across_steps() {
        let scope = Scope::new(Duration::from_millis(300));
        let first = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, RepoError>(())
            })
            .await;
        assert!(first.is_ok());

        let second = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, RepoError>(())
            })
            .await;
        assert!(matches!(second, Err(RepoError::Timeout(_))));
    }

    #[test]
    fn rollback_error_keeps_the_cause() {
        let err = RepoError::Rollback {
            source: sqlx::Error::PoolClosed,
            cause: Box::new(RepoError::NotFound {
                entity: "group",
                id: uuid::Uuid::nil(),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("rollback failed"));
        assert!(text.contains("group not found"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
