//! `messages-stream`: one long-lived SSE response per open chat view.
//!
//! The handler checks ownership, then hands the connection to [`drive_chat_stream`],
//! which runs as its own task and feeds the response body through a small channel.
//! Every exit path drops the [`Subscription`](crate::services::chat_stream::Subscription),
//! so hub cleanup happens exactly once.

use axum::{
    extract::{Extension, Path, State},
    http::header::{CONNECTION, HeaderName, HeaderValue},
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use futures_util::StreamExt;
use metrics::counter;
use shared::models::StreamEvent;
use std::{fmt, sync::Arc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::AppResult,
    middleware::request_context::RequestContext,
    services::{
        chat_stream::{Delivery, SharedStreams, Subscription},
        repository::MessageRepository,
    },
};

/// Frames buffered between the driver and the response body.
const OUTBOUND_BUFFER: usize = 16;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientDisconnected,
    Evicted,
    Recycled,
    SnapshotFailed,
}

impl CloseReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientDisconnected => "client_disconnected",
            Self::Evicted => "evicted",
            Self::Recycled => "recycled",
            Self::SnapshotFailed => "snapshot_failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one connection: snapshot, then queued events interleaved with heartbeats.
///
/// Returns once the client is gone, the subscriber was evicted, the heartbeat
/// budget is spent, or the history could not be loaded.
pub async fn drive_chat_stream(
    streams: SharedStreams,
    messages: Arc<dyn MessageRepository>,
    chat_id: Uuid,
    sink: mpsc::Sender<StreamEvent>,
) -> CloseReason {
    let mut subscription = streams.subscribe(chat_id);
    let reason = stream_until_closed(&streams, &messages, &mut subscription, &sink).await;
    drop(subscription);

    counter!("docchat_sse_streams_closed_total", "reason" => reason.as_str()).increment(1);
    debug!(%chat_id, %reason, remaining = streams.total_connections(), "chat stream closed");
    reason
}

async fn stream_until_closed(
    streams: &SharedStreams,
    messages: &Arc<dyn MessageRepository>,
    subscription: &mut Subscription,
    sink: &mpsc::Sender<StreamEvent>,
) -> CloseReason {
    let chat_id = subscription.chat_id();

    let snapshot = match messages.chat_messages(chat_id).await {
        Ok(history) => StreamEvent::snapshot(&history),
        Err(err) => {
            warn!(%chat_id, error = %err, "failed to load chat history");
            return CloseReason::SnapshotFailed;
        }
    };
    let snapshot = match snapshot {
        Ok(event) => event,
        Err(err) => {
            warn!(%chat_id, error = %err, "failed to encode chat history");
            return CloseReason::SnapshotFailed;
        }
    };
    if sink.send(snapshot).await.is_err() {
        return CloseReason::ClientDisconnected;
    }

    let mut heartbeats = streams.heartbeat();

    loop {
        if sink.is_closed() {
            return CloseReason::ClientDisconnected;
        }
        if subscription.should_disconnect() {
            return CloseReason::Evicted;
        }

        tokio::select! {
            biased;

            () = sink.closed() => return CloseReason::ClientDisconnected,

            delivery = subscription.recv() => match delivery {
                Some(Delivery::Event(event)) => {
                    if sink.send(event).await.is_err() {
                        return CloseReason::ClientDisconnected;
                    }
                }
                Some(Delivery::Close) | None => return CloseReason::Evicted,
            },

            Some(heartbeat) = heartbeats.next() => {
                if subscription.record_heartbeat() {
                    return CloseReason::Recycled;
                }
                if sink.send(heartbeat).await.is_err() {
                    return CloseReason::ClientDisconnected;
                }
            }
        }
    }
}

/// `GET /api/chat/{chat_id}/messages-stream`
pub async fn stream_chat_messages(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user_id = context.require_user()?;
    state
        .chat_service(&streams)
        .owned_chat(user_id, chat_id)
        .await?;

    info!(%chat_id, %user_id, "opening chat stream");

    let (sink, outbound) = mpsc::channel(OUTBOUND_BUFFER);
    let span = info_span!("chat_stream", %chat_id, request_id = %context.request_id);
    tokio::spawn(
        drive_chat_stream(streams, Arc::clone(&state.messages), chat_id, sink).instrument(span),
    );

    let body = ReceiverStream::new(outbound).map(|event| Event::default().json_data(event));

    Ok((
        [
            (CONNECTION, HeaderValue::from_static("keep-alive")),
            (X_ACCEL_BUFFERING, HeaderValue::from_static("no")),
        ],
        Sse::new(body),
    ))
}
