//! Server-Sent Events stream per room
//!
//! Every relayed event is sent with its `type` tag as the SSE event name and
//! the wire envelope as data. A subscriber that falls behind loses the
//! overflow; the stream carries on from the newest events.

use crate::api::AppContext;
use crate::state::RelayState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// GET /rooms/:room_id/events
pub async fn event_stream(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE subscriber for room {}", room_id);
    let mut events = BroadcastStream::new(ctx.state.subscribe(&room_id).await);
    let release = ReleaseOnDrop {
        state: ctx.state.clone(),
        room_id: room_id.clone(),
    };

    let stream = async_stream::stream! {
        let _release = release;
        yield Ok(Event::default().event("connected").data(room_id.clone()));

        while let Some(result) = events.next().await {
            match result {
                Ok(event) => match event.to_json() {
                    Ok(json) => {
                        let name = event.event_type().as_str();
                        debug!("SSE {} to room {} subscriber", name, room_id);
                        yield Ok(Event::default().event(name).data(json));
                    }
                    Err(e) => warn!("Failed to encode event: {}", e),
                },
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("SSE subscriber in room {} lagged, {} events lost", room_id, skipped);
                }
            }
        }
        debug!("SSE stream for room {} closed", room_id);
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(ctx.keep_alive)
            .text("keep-alive"),
    )
}

/// Offers the room for release once the subscriber's stream is dropped
struct ReleaseOnDrop {
    state: Arc<RelayState>,
    room_id: String,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        let room_id = std::mem::take(&mut self.room_id);
        // Runs after the stream, and its receiver, are gone
        handle.spawn(async move {
            state.release(&room_id).await;
        });
    }
}
