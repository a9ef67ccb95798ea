//! HTTP request handlers

use crate::api::AppContext;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use encore_common::events::{Player, SyncEvent};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    status: String,
    delivered: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersResponse {
    room_id: String,
    players: Vec<Player>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(StatusResponse { status: message }),
    )
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "encore-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rooms: ctx.state.room_count().await,
    })
}

/// POST /rooms/:room_id/events
///
/// The body is a wire-format sync event whose `roomId` must match the path.
/// Accepted events are fanned out to the room's current subscribers only.
pub async fn post_event(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let event = SyncEvent::from_json(&body).map_err(|e| {
        warn!("Rejected event for room {}: {}", room_id, e);
        bad_request(e.to_string())
    })?;

    if event.room_id != room_id {
        return Err(bad_request(format!(
            "event room {} does not match {}",
            event.room_id, room_id
        )));
    }

    debug!(
        "Relaying {} from {} in room {}",
        event.event_type().as_str(),
        event.sender_id,
        room_id
    );
    let delivered = ctx.state.publish(event).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            status: "accepted".to_string(),
            delivered,
        }),
    ))
}

/// GET /rooms/:room_id/players
pub async fn get_players(
    State(ctx): State<AppContext>,
    Path(room_id): Path<String>,
) -> Json<PlayersResponse> {
    let players = ctx.state.players(&room_id).await;
    Json(PlayersResponse { room_id, players })
}
