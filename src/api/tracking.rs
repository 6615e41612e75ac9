//! `track-interaction`.

use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

use super::extract::Json;
use super::{optional, required, success, ApiResult};
use crate::cache::Mutation;
use crate::db::timestamp;
use crate::errors::AppError;
use crate::models::{EventType, Interaction, TrackInteractionRequest};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Tracked {
    pub id: String,
}

/// POST /functions/track-interaction - Record one customer event.
pub async fn track_interaction(
    State(state): State<AppState>,
    Json(request): Json<TrackInteractionRequest>,
) -> ApiResult<Tracked> {
    let session_id = required(request.session_id, "sessionId")?;
    let raw_event = required(request.event_type, "eventType")?;
    let event_type = EventType::parse(&raw_event)
        .ok_or_else(|| AppError::Validation(format!("Unknown eventType: {}", raw_event)))?;

    if let Some(metadata) = &request.metadata {
        if !metadata.is_object() && !metadata.is_null() {
            return Err(AppError::Validation(
                "metadata must be an object".to_string(),
            ));
        }
    }

    let interaction = Interaction {
        id: uuid::Uuid::new_v4().to_string(),
        session_id,
        user_id: optional(request.user_id),
        event_type,
        entity_type: optional(request.entity_type),
        entity_id: optional(request.entity_id),
        metadata: request.metadata.filter(|m| !m.is_null()),
        created_at: timestamp(Utc::now()),
    };

    state
        .cache
        .mutate(
            Mutation::TrackInteraction,
            state.repo.create_interaction(&interaction),
        )
        .await?;

    tracing::debug!(event = event_type.as_str(), "Interaction tracked");

    success(Tracked { id: interaction.id })
}
