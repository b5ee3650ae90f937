use crate::{error::AppError, middleware::guards::User, state::AppState};
use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactRequest {
    pub emoji: String,
    #[serde(default)]
    pub client_temp_id: Option<String>,
}

/// POST /messages/react/{id}
/// Adds the caller's reaction. Repeating the same emoji leaves the set unchanged.
#[post("/react/{id}")]
pub async fn react_to_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
    body: web::Json<ReactRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let message = state
        .messages
        .react(
            message_id.into_inner(),
            &body.emoji,
            user.id,
            body.client_temp_id,
        )
        .await?;
    Ok(HttpResponse::Ok().json(message))
}
