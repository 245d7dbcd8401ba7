use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use node_relay::channels::TelegramGateway;
use node_relay::commands::{self, StatusSnapshot};
use node_relay::config::Config;
use node_relay::pipeline::processor::{ForwardingPipeline, PipelineRun};
use node_relay::pipeline::sender::RateLimitedSender;
use node_relay::pipeline::types::{ChatKind, ForwardPayload, MessageGateway};

/// How long shutdown waits for in-flight deliveries before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let gateway = Arc::new(TelegramGateway::new(config.bot_token.clone()));
    let username = gateway
        .get_me()
        .await
        .context("platform startup probe failed")?;

    info!(bot = %username, "connected");
    info!(
        monitor = %config.monitor_description(),
        destinations = config.destinations.len(),
        forward_mode = %config.forward_mode,
        nodes_only = config.policy.nodes_only,
        "relay configured"
    );

    let shutdown = CancellationToken::new();
    let sender = RateLimitedSender::new(
        Arc::clone(&gateway) as Arc<dyn MessageGateway>,
        config.sender.clone(),
        shutdown.clone(),
    );
    let pipeline = ForwardingPipeline::new(
        config.sources.clone(),
        config.policy.clone(),
        config.forward_mode,
        config.destinations.clone(),
        sender,
    );
    let status = StatusSnapshot {
        monitor: config.monitor_description(),
        destinations: config.destinations.len(),
        forward_mode: config.forward_mode,
        nodes_only: config.policy.nodes_only,
    };

    let mut updates = gateway.listen();
    let mut in_flight: JoinSet<()> = JoinSet::new();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("relay running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break;
            }
            maybe = updates.next() => {
                let Some(message) = maybe else {
                    warn!("update stream ended");
                    break;
                };

                // Private chats are the control surface, never a source.
                if message.origin_kind == ChatKind::Private {
                    if let Some(reply) = commands::respond(&message.text, &status) {
                        let gateway = Arc::clone(&gateway);
                        let origin = message.origin.clone();
                        tokio::spawn(async move {
                            if let Err(e) = gateway
                                .deliver(&origin, &ForwardPayload::ExtractedText(reply))
                                .await
                            {
                                warn!(error = %e, "command reply failed");
                            }
                        });
                    }
                    continue;
                }

                if let PipelineRun::Dispatched(report) = pipeline.handle(message) {
                    in_flight.spawn(async move {
                        let _ = report.await;
                    });
                }
                // Reap fan-outs that already finished.
                while in_flight.try_join_next().is_some() {}
            }
        }
    }

    // Intake has stopped; drain outstanding fan-outs, then abandon
    // whatever the grace period could not flush.
    drop(updates);
    if tokio::time::timeout(SHUTDOWN_GRACE, drain(&mut in_flight))
        .await
        .is_err()
    {
        warn!("grace period expired, abandoning remaining deliveries");
        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), drain(&mut in_flight)).await;
        in_flight.shutdown().await;
    }

    info!("relay stopped");
    Ok(())
}

async fn drain(in_flight: &mut JoinSet<()>) {
    while in_flight.join_next().await.is_some() {}
}
