use crate::{error::AppError, middleware::guards::User, state::AppState};
use actix_web::{get, web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIdResponse {
    pub conversation_id: Uuid,
}

/// GET /messages/conversations/{user_id}
/// Conversation id between the caller and `user_id`, created on first use
#[get("/conversations/{user_id}")]
pub async fn get_or_create_conversation(
    state: web::Data<AppState>,
    user: User,
    other: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .messages
        .conversations()
        .get_or_create(user.id, other.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(ConversationIdResponse {
        conversation_id: conversation.id,
    }))
}
