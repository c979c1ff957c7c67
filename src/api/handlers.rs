use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde_json::json;

use crate::errors::AppError;
use crate::identity::AuthenticatedUser;
use crate::models::event::NotificationEvent;
use crate::models::message::{Message, MessageDraft};
use crate::stream::session::StreamSession;
use crate::{wire, AppState};

// ── Notification Stream ──────────────────────────────────────

/// GET /api/v1/notifications/stream — SSE feed of new-message events
/// visible to the caller. One `data: <json>` frame per event.
pub async fn stream_notifications(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let session = StreamSession::open(
        &state.bus,
        state.directory.clone(),
        &user_id,
        state.config.stream_buffer,
    )?;

    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.keepalive_secs))
        .text("keep-alive");

    Ok((
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(session_events(session, wire::encode_data)).keep_alive(keepalive),
    ))
}

/// Turn a session into an SSE event stream. The session lives inside the
/// stream state, so dropping the stream closes it; an encoding failure ends
/// the stream the same way.
fn session_events<F>(
    session: StreamSession,
    encode: F,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    F: Fn(&NotificationEvent) -> serde_json::Result<String> + Copy,
{
    stream::unfold(session, move |mut session| async move {
        let event = session.next_event().await?;
        match encode(&*event) {
            Ok(data) => Some((Ok(Event::default().data(data)), session)),
            Err(e) => {
                tracing::error!(
                    session = %session.id(),
                    error = %e,
                    "failed to serialize notification, closing stream"
                );
                None
            }
        }
    })
}

// ── Messages ─────────────────────────────────────────────────

/// POST /api/v1/messages — record authorship and fan the message out.
pub async fn publish_message(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(draft): Json<MessageDraft>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = Message::from_draft(&user_id, draft)?;
    let listeners = state
        .bus
        .publish(NotificationEvent::new_message(message.clone()));

    tracing::info!(
        message_id = %message.id,
        author_id = %message.author_id,
        broadcast = message.is_broadcast(),
        listeners,
        "message published"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

// ── Probes ───────────────────────────────────────────────────

/// GET /readyz — bus occupancy.
pub async fn readiness(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "listeners": state.bus.listener_count(),
        "capacity": state.bus.capacity(),
    }))
}
