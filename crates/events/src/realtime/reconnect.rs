//! Retry schedule for re-establishing a dropped realtime connection.
//!
//! The channel task waits, dials, and on failure waits twice as long,
//! up to a ceiling. A successful dial starts the next outage from the
//! base delay again because every outage gets a fresh [`Backoff`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::client::{RealtimeClient, RealtimeConnection};

/// Bounds of the retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Wait before the first dial after a drop.
    pub base: Duration,
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            ceiling: Duration::from_secs(30),
        }
    }
}

/// Doubling delays for one outage.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    upcoming: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            upcoming: policy.base.min(policy.ceiling),
            policy,
        }
    }

    /// The wait before the next dial. Each call doubles the one after.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.upcoming;
        self.upcoming = wait.saturating_mul(2).min(self.policy.ceiling);
        wait
    }
}

/// Dial `client` until it answers or `cancel` fires.
///
/// Every dial, the first included, is preceded by a wait from a fresh
/// [`Backoff`].
pub async fn redial(
    client: &RealtimeClient,
    policy: BackoffPolicy,
    channel: &str,
    cancel: &CancellationToken,
) -> Option<RealtimeConnection> {
    let mut backoff = Backoff::new(policy);

    for attempt in 1u32.. {
        let wait = backoff.next_wait();
        tracing::debug!(channel, attempt, wait_ms = wait.as_millis() as u64, "Waiting to redial");

        let dialed = tokio::select! {
            _ = cancel.cancelled() => None,
            dialed = async {
                tokio::time::sleep(wait).await;
                client.connect().await
            } => Some(dialed),
        };

        match dialed {
            None => {
                tracing::debug!(channel, "Redial abandoned");
                return None;
            }
            Some(Ok(conn)) => {
                tracing::info!(channel, attempt, "Realtime connection restored");
                return Some(conn);
            }
            Some(Err(e)) => {
                tracing::warn!(channel, attempt, error = %e, "Realtime redial failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_double_up_to_ceiling() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let waits: Vec<u64> = (0..7).map(|_| backoff.next_wait().as_secs()).collect();
        assert_eq!(waits, [1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn base_above_ceiling_is_clamped() {
        let mut backoff = Backoff::new(BackoffPolicy {
            base: Duration::from_secs(45),
            ceiling: Duration::from_secs(10),
        });
        assert_eq!(backoff.next_wait(), Duration::from_secs(10));
        assert_eq!(backoff.next_wait(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancelled_redial_gives_up() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = RealtimeClient::new("http://127.0.0.1:9", "key");
        let conn = redial(&client, BackoffPolicy::default(), "notes-changes", &cancel).await;
        assert!(conn.is_none());
    }
}
