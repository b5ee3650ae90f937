use crate::{
    error::AppError,
    middleware::guards::User,
    models::ReadScope,
    services::SendMessageRequest,
    state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub receiver_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub message: Option<String>,
    /// Reference to an already stored file
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub client_temp_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingBody {
    pub to_user_id: Uuid,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingResponse {
    pub message: &'static str,
    pub from: Uuid,
    pub to: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub message: &'static str,
    pub modified_count: usize,
}

/// POST /messages
#[post("")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageBody>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let message = state
        .messages
        .send(SendMessageRequest {
            sender: user.id,
            receiver: body.receiver_id,
            conversation_id: body.conversation_id,
            body: body.message,
            attachment_url: body.file_url,
            attachment_name: body.file_name,
            reply_to: body.reply_to,
            client_temp_id: body.client_temp_id,
        })
        .await?;

    Ok(HttpResponse::Created().json(message))
}

/// GET /messages/inbox
#[get("/inbox")]
pub async fn get_inbox(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let entries = state.messages.inbox(user.id).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// GET /messages/conversation/{conversation_id}
#[get("/conversation/{conversation_id}")]
pub async fn get_conversation_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .list_by_conversation(conversation_id.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// GET /messages/{user_id}: full history with one counterpart
#[get("/{user_id}")]
pub async fn get_messages_with_user(
    state: web::Data<AppState>,
    user: User,
    other: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .list_between(user.id, other.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// PUT /messages/read/{user_id}: everything that user sent the caller
#[put("/read/{user_id}")]
pub async fn mark_read_from_user(
    state: web::Data<AppState>,
    user: User,
    from: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let modified_count = state
        .messages
        .mark_read(user.id, ReadScope::From(from.into_inner()))
        .await?;

    Ok(HttpResponse::Ok().json(MarkReadResponse {
        message: "Messages marked as read",
        modified_count,
    }))
}

/// PUT /messages/read-single/{message_id}
#[put("/read-single/{message_id}")]
pub async fn mark_single_read(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .mark_message_read(message_id.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

/// PUT /messages/edit/{id}
#[put("/edit/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    id: web::Path<Uuid>,
    body: web::Json<EditMessageBody>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .edit(id.into_inner(), body.into_inner().message, user.id)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

/// DELETE /messages/{id}
#[delete("/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message = state.messages.soft_delete(id.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(message))
}

/// POST /messages/typing: REST fallback for the live typing indicator
#[post("/typing")]
pub async fn typing(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<TypingBody>,
) -> Result<HttpResponse, AppError> {
    if body.is_typing {
        state.messages.typing(user.id, body.to_user_id);
    }

    Ok(HttpResponse::Ok().json(TypingResponse {
        message: "Typing status received",
        from: user.id,
        to: body.to_user_id,
        is_typing: body.is_typing,
    }))
}
