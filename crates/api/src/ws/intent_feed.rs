use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, Stream, StreamExt};
use raffle_core::types::IntentId;
use raffle_db::repositories::PrizeTagRepo;
use raffle_engine::checkout::{self, IntentSnapshot};
use raffle_events::bus::names;
use raffle_events::PlatformEvent;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use crate::state::AppState;

/// Re-read interval. Resolutions made by the worker process are published
/// on its own bus, so events alone do not cover them.
const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// How long a confirmed socket waits for prize tagging before closing.
const PRIZE_WAIT: Duration = Duration::from_secs(3);

/// The peer went away mid-send.
struct SocketClosed;

/// What to do after a snapshot was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Wait,
    /// Confirmed, but prize tags are not evaluated yet.
    AwaitPrizes,
    Close,
}

/// Outbound frame.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame<'a> {
    Snapshot { data: &'a IntentSnapshot },
    NotFound { intent_id: IntentId },
}

/// GET /api/v1/checkout/intents/{id}/ws
pub async fn intent_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(intent_id): Path<IntentId>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, intent_id))
}

/// Stream snapshots of one intent until it reaches a final view. A
/// confirmed view stays open until its prize tags are evaluated, or
/// [`PRIZE_WAIT`] passes.
///
/// The bus subscription is taken before the first read so a resolution
/// landing between the two is not missed.
async fn handle_socket(socket: WebSocket, state: AppState, intent_id: IntentId) {
    let mut events = state.event_bus.subscribe();
    let (mut sink, mut stream) = socket.split();
    tracing::debug!(%intent_id, "Result-page socket connected");

    let mut last_sent: Option<serde_json::Value> = None;
    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    refresh.tick().await;

    loop {
        match push_snapshot(&state, intent_id, &mut sink, &mut last_sent).await {
            Ok(Step::Close) => break,
            Ok(Step::AwaitPrizes) => {
                if wait_for_prizes(&mut events, &mut stream, intent_id).await.is_err() {
                    tracing::debug!(%intent_id, "Result-page socket disconnected");
                    return;
                }
                if push_snapshot(&state, intent_id, &mut sink, &mut last_sent)
                    .await
                    .is_err()
                {
                    return;
                }
                break;
            }
            Ok(Step::Wait) => {}
            Err(SocketClosed) => {
                tracing::debug!(%intent_id, "Result-page socket closed while sending");
                return;
            }
        }

        // Wait for something that may have changed the intent.
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) if event.concerns_intent(intent_id) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(%intent_id, skipped, "Result-page socket lagged");
                        break;
                    }
                    Err(RecvError::Closed) => return,
                },
                _ = refresh.tick() => break,
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(%intent_id, "Result-page socket disconnected");
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(%intent_id, error = %e, "Result-page socket receive error");
                        return;
                    }
                },
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    tracing::debug!(%intent_id, "Result-page socket finished");
}

/// Block until the tagger reports on `intent_id`, the deadline passes or
/// the peer leaves.
async fn wait_for_prizes<R>(
    events: &mut Receiver<PlatformEvent>,
    stream: &mut R,
    intent_id: IntentId,
) -> Result<(), SocketClosed>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(PRIZE_WAIT);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::debug!(%intent_id, "Prize tags not reported in time");
                return Ok(());
            }
            received = events.recv() => match received {
                Ok(event)
                    if event.event_type == names::PRIZES_TAGGED
                        && event.concerns_intent(intent_id) => return Ok(()),
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) | Err(RecvError::Closed) => return Ok(()),
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Err(SocketClosed),
                Some(Ok(_)) => continue,
            },
        }
    }
}

/// Send the current snapshot if it differs from the last one sent, and say
/// whether the socket is done: the view is final (with prizes evaluated)
/// or the intent does not exist.
async fn push_snapshot<S>(
    state: &AppState,
    intent_id: IntentId,
    sink: &mut S,
    last_sent: &mut Option<serde_json::Value>,
) -> Result<Step, SocketClosed>
where
    S: SinkExt<Message> + Unpin,
{
    let snapshot = match checkout::load_snapshot(&state.pool, intent_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            // Keep the socket; the next event or tick retries the read.
            tracing::warn!(%intent_id, error = %e, "Failed to load intent snapshot");
            return Ok(Step::Wait);
        }
    };

    let Some(snapshot) = snapshot else {
        send_json(sink, &Frame::NotFound { intent_id }).await?;
        return Ok(Step::Close);
    };

    let value =
        serde_json::to_value(Frame::Snapshot { data: &snapshot }).map_err(|_| SocketClosed)?;
    if last_sent.as_ref() != Some(&value) {
        sink.send(Message::Text(value.to_string().into()))
            .await
            .map_err(|_| SocketClosed)?;
        *last_sent = Some(value);
    }
    if !snapshot.is_final() {
        return Ok(Step::Wait);
    }
    let Some(assignment) = &snapshot.assignment else {
        return Ok(Step::Close);
    };
    match PrizeTagRepo::is_evaluated(&state.pool, assignment.id).await {
        Ok(true) => Ok(Step::Close),
        Ok(false) => Ok(Step::AwaitPrizes),
        Err(e) => {
            tracing::warn!(%intent_id, error = %e, "Failed to read prize evaluation");
            Ok(Step::AwaitPrizes)
        }
    }
}

async fn send_json<S>(sink: &mut S, frame: &Frame<'_>) -> Result<(), SocketClosed>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(frame).map_err(|_| SocketClosed)?;
    sink.send(Message::Text(text.into())).await.map_err(|_| SocketClosed)
}
