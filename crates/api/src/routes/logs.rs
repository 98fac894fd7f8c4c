//! Notice publishing and the server-sent event stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use super::purchase::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct LogRequest {
    pub message: Option<String>,
}

/// POST /logs: publishes a client-supplied notice to every stream subscriber.
#[tracing::instrument(skip(state, req))]
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogRequest>,
) -> Result<StatusCode, ApiError> {
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("message is required".to_string()))?;

    state.notices.publish(message);
    Ok(StatusCode::ACCEPTED)
}

/// Counts one open stream in the `notice_subscribers` gauge for as long as it lives.
struct SubscriberGauge;

impl SubscriberGauge {
    fn connect() -> Self {
        metrics::gauge!("notice_subscribers").increment(1.0);
        tracing::debug!("notice stream subscriber connected");
        Self
    }
}

impl Drop for SubscriberGauge {
    fn drop(&mut self) {
        metrics::gauge!("notice_subscribers").decrement(1.0);
        tracing::debug!("notice stream subscriber disconnected");
    }
}

/// GET /logs/stream: every notice published after connecting, as SSE.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.notices.subscribe();
    let gauge = SubscriberGauge::connect();

    let connected = stream::once(async { Ok(Event::default().data("Connected to notice stream")) });

    let notices = stream::unfold((receiver, gauge), |(mut receiver, gauge)| async move {
        loop {
            match receiver.recv().await {
                Ok(notice) => match Event::default().json_data(&notice) {
                    Ok(event) => return Some((Ok(event), (receiver, gauge))),
                    Err(e) => tracing::warn!(error = %e, "dropping unserializable notice"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notice stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(connected.chain(notices)).keep_alive(KeepAlive::default())
}
