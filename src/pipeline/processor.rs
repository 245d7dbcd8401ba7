//! Forwarding pipeline — orchestrates one inbound message from source
//! admission through filter, planning, and concurrent fan-out.
//!
//! Per message: `Received → Filtered → Planned → Fanned-out → Completed`,
//! with `Ignored`/`Dropped` as early terminals. The pipeline itself
//! never retries; all retry lives in the per-destination sender. There
//! is no pipeline-level failure state: partial delivery is a valid
//! terminal outcome, recorded per destination.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::pipeline::extractor::extract_nodes;
use crate::pipeline::filter::{DropReason, FilterDecision, FilterPolicy};
use crate::pipeline::planner::plan;
use crate::pipeline::sender::RateLimitedSender;
use crate::pipeline::types::{
    ChatId, ChatKind, DeliveryOutcome, DeliveryReport, ForwardMode, ForwardPayload,
    InboundMessage,
};

// ── Source selection ────────────────────────────────────────────────

/// Immutable snapshot of which chats are monitored, resolved once at
/// startup. Membership changes require a new snapshot (restart), never
/// in-place mutation.
#[derive(Debug, Clone)]
pub enum SourceSelector {
    /// Listen only to an explicit chat list.
    Custom { chats: Vec<ChatId> },
    /// Listen to every chat of the given kinds, minus an exclusion set.
    Auto {
        kinds: Vec<ChatKind>,
        exclude: Vec<ChatId>,
    },
}

impl SourceSelector {
    /// Whether a message from this origin enters the pipeline.
    ///
    /// Configured entries match the origin either by numeric ID or by
    /// the chat's public `@handle` (case-insensitive).
    pub fn admits(&self, message: &InboundMessage) -> bool {
        let matches_entry = |entry: &ChatId| {
            entry.matches(&message.origin)
                || message.origin_handle.as_deref().is_some_and(
                    |h| matches!(entry, ChatId::Handle(e) if e.eq_ignore_ascii_case(h)),
                )
        };
        match self {
            Self::Custom { chats } => chats.iter().any(matches_entry),
            Self::Auto { kinds, exclude } => {
                kinds.contains(&message.origin_kind) && !exclude.iter().any(matches_entry)
            }
        }
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

/// Terminal state of one pipeline invocation.
pub enum PipelineRun {
    /// Origin not monitored, or the message carried no text. Never an
    /// error; the message simply isn't ours.
    Ignored,
    /// Rejected by the content policy.
    Dropped(DropReason),
    /// Payload fanned out; the handle resolves to the aggregated
    /// per-destination report once every destination has been attempted.
    Dispatched(JoinHandle<DeliveryReport>),
}

/// The ingestion → extraction → filter → fan-out pipeline.
///
/// `handle` is synchronous apart from spawning: messages from one
/// source are filtered and planned strictly in arrival order, while the
/// spawned fan-out of earlier messages proceeds concurrently.
pub struct ForwardingPipeline {
    sources: SourceSelector,
    policy: FilterPolicy,
    mode: ForwardMode,
    destinations: Arc<Vec<ChatId>>,
    sender: RateLimitedSender,
}

impl ForwardingPipeline {
    pub fn new(
        sources: SourceSelector,
        policy: FilterPolicy,
        mode: ForwardMode,
        destinations: Vec<ChatId>,
        sender: RateLimitedSender,
    ) -> Self {
        Self {
            sources,
            policy,
            mode,
            destinations: Arc::new(destinations),
            sender,
        }
    }

    /// Run one inbound message through the pipeline.
    pub fn handle(&self, message: InboundMessage) -> PipelineRun {
        if !self.sources.admits(&message) {
            debug!(origin = %message.origin, "origin not monitored");
            return PipelineRun::Ignored;
        }
        if message.text.is_empty() {
            debug!(origin = %message.origin, "empty message body");
            return PipelineRun::Ignored;
        }

        let links = extract_nodes(&message.text);
        match self.policy.decide(&message.text, &links) {
            FilterDecision::Drop(reason) => {
                debug!(origin = %message.origin, reason = %reason, "message dropped");
                PipelineRun::Dropped(reason)
            }
            FilterDecision::Pass => {
                info!(
                    origin = %message.origin,
                    links = links.len(),
                    destinations = self.destinations.len(),
                    "forwarding message"
                );
                let payload = plan(&message, &links, self.mode);
                PipelineRun::Dispatched(self.fan_out(payload))
            }
        }
    }

    /// Fan one payload out to every destination as independent tasks.
    ///
    /// A rate-limit cooldown or failure on one destination never delays
    /// another; the aggregator joins outcomes back in destination order.
    fn fan_out(&self, payload: ForwardPayload) -> JoinHandle<DeliveryReport> {
        let tasks: Vec<(ChatId, JoinHandle<DeliveryOutcome>)> = self
            .destinations
            .iter()
            .cloned()
            .map(|destination| {
                let sender = self.sender.clone();
                let payload = payload.clone();
                let dest = destination.clone();
                let task =
                    tokio::spawn(async move { sender.send(&dest, &payload).await });
                (destination, task)
            })
            .collect();

        tokio::spawn(async move {
            let mut outcomes = Vec::with_capacity(tasks.len());
            for (destination, task) in tasks {
                let outcome = match task.await {
                    Ok(outcome) => outcome,
                    Err(join_err) => DeliveryOutcome::Failed {
                        error: SendError::Transient(format!("send task died: {join_err}")),
                        attempts: 0,
                    },
                };
                match &outcome {
                    DeliveryOutcome::Delivered { .. } => {
                        info!(destination = %destination, "sent")
                    }
                    DeliveryOutcome::Skipped { reason } => {
                        info!(destination = %destination, reason = %reason, "skipped")
                    }
                    DeliveryOutcome::Failed { error, attempts } => {
                        warn!(
                            destination = %destination,
                            class = error.label(),
                            error = %error,
                            attempts,
                            "send failed"
                        )
                    }
                }
                outcomes.push((destination, outcome));
            }

            let report = DeliveryReport { outcomes };
            info!(
                delivered = report.delivered(),
                failed = report.failed(),
                skipped = report.skipped(),
                "fan-out complete"
            );
            report
        })
    }
}
