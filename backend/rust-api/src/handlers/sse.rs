use axum::{
    extract::{Extension, Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::ApiError;
use crate::{
    metrics::SSE_CONNECTIONS_ACTIVE,
    middlewares::auth::JwtClaims,
    models::{
        timer::{ProgressEvent, ProgressTick, SessionClosed},
        SessionView,
    },
    services::{session_service::SessionService, AppState},
};

/// SSE feed of a session's clock and score.
/// GET /api/v1/sessions/{id}/stream
pub async fn session_stream(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Ownership and existence are checked before the stream opens
    state.sessions.get_session(&session_id, &claims.sub).await?;

    let interval_ms = state.config.sync.tick_interval_ms.max(1);
    tracing::info!(
        "Client connected to SSE stream: session={}, tick_interval={}ms",
        session_id,
        interval_ms
    );

    let stream = create_progress_stream(
        state.sessions.clone(),
        session_id,
        claims.sub,
        Duration::from_millis(interval_ms),
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Decrements the connection gauge when the stream is dropped.
struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        ConnectionGuard
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
    }
}

struct StreamState {
    sessions: Arc<SessionService>,
    session_id: String,
    user_id: String,
    interval: Duration,
    first: bool,
    closed: bool,
    _guard: ConnectionGuard,
}

fn progress_event(view: &SessionView) -> ProgressEvent {
    if view.status.is_terminal() {
        ProgressEvent::SessionClosed(SessionClosed {
            session_id: view.id.clone(),
            status: view.status,
            elapsed_seconds: view.elapsed_seconds,
            score: view.score,
            timestamp: Utc::now(),
        })
    } else {
        ProgressEvent::ProgressTick(ProgressTick {
            session_id: view.id.clone(),
            elapsed_seconds: view.elapsed_seconds,
            score: view.score,
            current_clue_index: view.current_clue_index,
            clue_count: view.clue_count,
            timestamp: Utc::now(),
        })
    }
}

/// One `progress-tick` per interval until the session reaches a terminal
/// state, then a single `session-closed` and the stream ends.
fn create_progress_stream(
    sessions: Arc<SessionService>,
    session_id: String,
    user_id: String,
    interval: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = StreamState {
        sessions,
        session_id,
        user_id,
        interval,
        first: true,
        closed: false,
        _guard: ConnectionGuard::open(),
    };

    stream::unfold(initial, |mut state| async move {
        if state.closed {
            return None;
        }

        if !state.first {
            sleep(state.interval).await;
        }
        state.first = false;

        let view = match state
            .sessions
            .get_session(&state.session_id, &state.user_id)
            .await
        {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!("SSE stream for session {} ended: {}", state.session_id, e);
                return None;
            }
        };

        let event = progress_event(&view);
        if matches!(event, ProgressEvent::SessionClosed(_)) {
            tracing::info!(
                "Session {} closed ({}), ending SSE stream",
                state.session_id,
                view.status
            );
            state.closed = true;
        }

        let sse_event = Event::default()
            .event(event.event_name())
            .data(event.to_sse_data());

        Some((Ok(sse_event), state))
    })
}
