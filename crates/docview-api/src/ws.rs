//! WebSocket progress stream
//!
//! `/ws/progress/{task_id}` replays the most recent cached event, then
//! forwards live broker events until the client disconnects or the task
//! reaches a terminal event.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use uuid::Uuid;

use docview_core::{ProgressEvent, ProgressEventType, TaskId};

use crate::AppState;

pub async fn progress_ws(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let task_id = TaskId::from_uuid(task_id);
    upgrade.on_upgrade(move |socket| stream_progress(state, task_id, socket))
}

async fn stream_progress(state: AppState, task_id: TaskId, socket: WebSocket) {
    let (mut sink, mut source) = socket.split();
    let (cached, mut events) = state.broker.subscribe(task_id);

    if let Some(event) = cached {
        let terminal = is_terminal(&event);
        if send_event(&mut sink, &event).await.is_err() || terminal {
            let _ = sink.close().await;
            return;
        }
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let terminal = is_terminal(&event);
                    if send_event(&mut sink, &event).await.is_err() || terminal {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(task_id = %task_id, skipped, "progress subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Clients have nothing to say on this channel.
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
}

fn is_terminal(event: &ProgressEvent) -> bool {
    matches!(
        event.event_type,
        ProgressEventType::Completed | ProgressEventType::Error
    )
}

async fn send_event<S>(sink: &mut S, event: &ProgressEvent) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let payload = serde_json::to_string(event).unwrap_or_default();
    sink.send(Message::Text(payload)).await
}
