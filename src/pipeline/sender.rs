//! Rate-limit-aware delivery to a single destination.
//!
//! Drives the gateway's send capability with three recovery paths:
//! a mandatory cooldown for rate-limit signals (unbounded retries,
//! bounded cumulative wait), exponential backoff for transient faults
//! (bounded attempts), and immediate failure for permanent errors.
//! One `send` call handles one destination; fan-out concurrency is
//! the pipeline's concern.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::pipeline::types::{ChatId, DeliveryOutcome, ForwardPayload, MessageGateway};

/// Transient-error attempt ceiling.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First backoff interval after a transient failure; doubles per retry.
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Cap on cumulative mandatory rate-limit waiting for one send.
/// Guarantees termination even if the platform keeps demanding waits.
const DEFAULT_MAX_FLOOD_WAIT: Duration = Duration::from_secs(900);

/// Tunables for the retry loop.
#[derive(Debug, Clone)]
pub struct SenderSettings {
    /// Total attempts allowed for transient errors (rate-limit retries
    /// are mandatory and do not count against this ceiling).
    pub max_attempts: u32,
    /// First transient backoff interval; doubles each retry.
    pub backoff_base: Duration,
    /// Cumulative rate-limit wait budget per send.
    pub max_flood_wait: Duration,
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_flood_wait: DEFAULT_MAX_FLOOD_WAIT,
        }
    }
}

/// Per-destination delivery with retry. Cheap to clone across fan-out
/// tasks; all shared state is read-only.
#[derive(Clone)]
pub struct RateLimitedSender {
    gateway: Arc<dyn MessageGateway>,
    settings: SenderSettings,
    shutdown: CancellationToken,
}

impl RateLimitedSender {
    pub fn new(
        gateway: Arc<dyn MessageGateway>,
        settings: SenderSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            settings,
            shutdown,
        }
    }

    /// Deliver one payload to one destination, absorbing rate-limit
    /// cooldowns and transient faults. Always returns an outcome; the
    /// caller decides what a failure means.
    pub async fn send(&self, destination: &ChatId, payload: &ForwardPayload) -> DeliveryOutcome {
        if self.shutdown.is_cancelled() {
            return DeliveryOutcome::Skipped {
                reason: "shutdown".into(),
            };
        }

        let mut attempts: u32 = 0;
        let mut transient_tries: u32 = 0;
        let mut flood_waited = Duration::ZERO;

        loop {
            attempts += 1;
            match self.gateway.deliver(destination, payload).await {
                Ok(()) => {
                    debug!(destination = %destination, attempts, "delivered");
                    return DeliveryOutcome::Delivered { attempts };
                }

                Err(SendError::RateLimited { retry_after }) => {
                    if flood_waited + retry_after > self.settings.max_flood_wait {
                        warn!(
                            destination = %destination,
                            waited_secs = flood_waited.as_secs(),
                            demanded_secs = retry_after.as_secs(),
                            "rate-limit wait budget exhausted, giving up"
                        );
                        return DeliveryOutcome::Failed {
                            error: SendError::RateLimited { retry_after },
                            attempts,
                        };
                    }
                    flood_waited += retry_after;
                    warn!(
                        destination = %destination,
                        wait_secs = retry_after.as_secs(),
                        "rate limited, honoring mandatory wait"
                    );
                    if !self.pause(retry_after).await {
                        return DeliveryOutcome::Skipped {
                            reason: "shutdown during rate-limit wait".into(),
                        };
                    }
                }

                Err(SendError::Transient(reason)) => {
                    transient_tries += 1;
                    if transient_tries >= self.settings.max_attempts {
                        warn!(
                            destination = %destination,
                            attempts,
                            reason = %reason,
                            "transient attempts exhausted"
                        );
                        return DeliveryOutcome::Failed {
                            error: SendError::Transient(reason),
                            attempts,
                        };
                    }
                    let backoff = self.settings.backoff_base * 2u32.pow(transient_tries - 1);
                    debug!(
                        destination = %destination,
                        backoff_ms = backoff.as_millis() as u64,
                        reason = %reason,
                        "transient send failure, backing off"
                    );
                    if !self.pause(backoff).await {
                        return DeliveryOutcome::Skipped {
                            reason: "shutdown during backoff".into(),
                        };
                    }
                }

                // Configuration problem; retrying cannot help.
                Err(err @ SendError::Permanent(_)) => {
                    warn!(destination = %destination, error = %err, "permanent send failure");
                    return DeliveryOutcome::Failed {
                        error: err,
                        attempts,
                    };
                }
            }
        }
    }

    /// Sleep for `wait`, returning false if shutdown lands first.
    async fn pause(&self, wait: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }
}
