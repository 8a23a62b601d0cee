//! Reconciliation worker.
//!
//! Runs the background halves of the Reconciliation Listener: the realtime
//! change feed over `provider_transactions` and the fallback poller. Event
//! persistence and operator alert delivery run alongside them on the
//! worker's own event bus.

use std::time::Duration;

use raffle_engine::Engine;
use raffle_events::{AlertDispatcher, EventPersistence, WebhookDelivery};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long each service gets to wind down after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Worker-only settings.
///
/// | Env Var             | Default                    |
/// |---------------------|----------------------------|
/// | `ALERT_WEBHOOK_URL` | unset (alerts stored only) |
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub alert_webhook_url: Option<String>,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Start every worker service and wait until `cancel` fires and they stop.
pub async fn run(engine: Engine, config: WorkerConfig, cancel: CancellationToken) {
    let persistence = tokio::spawn(EventPersistence::run(
        engine.pool.clone(),
        engine.bus.subscribe(),
    ));

    let dispatcher = config.alert_webhook_url.map(|url| {
        tokio::spawn(
            AlertDispatcher::new(url, WebhookDelivery::new())
                .run(engine.bus.subscribe(), cancel.clone()),
        )
    });
    if dispatcher.is_none() {
        tracing::warn!("ALERT_WEBHOOK_URL not set; operator alerts are stored but not pushed");
    }

    let feed = engine.change_feed();
    let feed_cancel = cancel.clone();
    let feed_handle = tokio::spawn(async move {
        if let Err(e) = feed.run(feed_cancel).await {
            tracing::error!(error = %e, "Change feed listener failed to start");
        }
    });

    let poller = engine.poller();
    let poller_cancel = cancel.clone();
    let poller_handle = tokio::spawn(async move { poller.run(poller_cancel).await });

    tracing::info!("Reconciliation worker running");
    cancel.cancelled().await;
    tracing::info!("Reconciliation worker stopping");

    join("change feed", feed_handle).await;
    join("fallback poller", poller_handle).await;
    if let Some(handle) = dispatcher {
        join("alert dispatcher", handle).await;
    }

    // Persistence exits once every bus sender is gone.
    drop(engine);
    join("event persistence", persistence).await;
}

async fn join(name: &str, handle: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
        Ok(Ok(())) => tracing::info!(service = name, "Stopped"),
        Ok(Err(e)) => tracing::error!(service = name, error = %e, "Task panicked"),
        Err(_) => tracing::warn!(service = name, "Did not stop within the grace period"),
    }
}
