//! Background task expiring idle sessions.

use crate::services::registry::SessionRegistry;
use service_core::middleware::IpRateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct SessionSweeper {
    shutdown_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SessionSweeper {
    /// Spawn the sweep loop. The first sweep runs one `interval` after start.
    /// Each tick also forgets rate limiter clients that have gone quiet.
    pub fn start(
        registry: Arc<SessionRegistry>,
        rate_limiter: Option<IpRateLimiter>,
        interval: Duration,
    ) -> Self {
        let shutdown_token = CancellationToken::new();
        let shutdown = shutdown_token.clone();

        tracing::info!(
            interval_secs = interval.as_secs(),
            timeout_secs = registry.settings().inactivity_timeout.num_seconds(),
            "Starting session sweeper"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Session sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let expired = registry.sweep();
                        if expired > 0 {
                            tracing::info!(
                                expired,
                                remaining = registry.len(),
                                "Expired idle sessions"
                            );
                        } else {
                            tracing::debug!(remaining = registry.len(), "Sweep found no idle sessions");
                        }

                        if let Some(limiter) = &rate_limiter {
                            limiter.prune();
                            tracing::debug!(
                                clients = limiter.tracked_clients(),
                                "Pruned rate limiter state"
                            );
                        }
                    }
                }
            }
        });

        Self {
            shutdown_token,
            handle,
        }
    }

    /// Stop the loop and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Session sweeper task failed");
        }
    }
}
