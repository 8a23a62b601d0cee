//! Operator alert dispatcher.
//!
//! Forwards every `alert.*` event from the bus to the configured alert
//! webhook. The `operator_alerts` row is written by whoever raises the
//! alert; this channel is the push notification on top of it.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::PlatformEvent;
use crate::delivery::webhook::WebhookDelivery;

pub struct AlertDispatcher {
    url: String,
    delivery: WebhookDelivery,
}

impl AlertDispatcher {
    pub fn new(url: impl Into<String>, delivery: WebhookDelivery) -> Self {
        Self {
            url: url.into(),
            delivery,
        }
    }

    /// Run until cancelled or the bus is dropped.
    ///
    /// Each delivery runs on its own task so a slow endpoint does not make
    /// the receiver lag.
    pub async fn run(
        self,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!(url = %self.url, "Alert dispatcher started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => received,
            };
            match event {
                Ok(event) if event.is_alert() => {
                    let delivery = self.delivery.clone();
                    let url = self.url.clone();
                    tokio::spawn(async move {
                        if let Err(e) = delivery.deliver(&url, &event).await {
                            tracing::error!(
                                error = %e,
                                event_type = %event.event_type,
                                "Operator alert could not be delivered"
                            );
                        }
                    });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Alert dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("Alert dispatcher stopped");
    }
}
