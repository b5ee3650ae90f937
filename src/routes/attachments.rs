use crate::{
    error::AppError,
    middleware::guards::User,
    services::SendMessageRequest,
    state::AppState,
};
use actix_multipart::{Field, Multipart};
use actix_web::{get, post, web, HttpResponse};
use futures_util::stream::StreamExt;
use std::str::FromStr;
use uuid::Uuid;

const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::validation(format!("malformed upload: {e}")))?;
        if buf.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

async fn read_text(field: &mut Field) -> Result<String, AppError> {
    let bytes = read_field(field, MAX_TEXT_FIELD_BYTES).await?;
    String::from_utf8(bytes).map_err(|_| AppError::validation("form field is not valid UTF-8"))
}

fn parse_id(name: &str, raw: &str) -> Result<Option<Uuid>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" || raw == "undefined" {
        return Ok(None);
    }
    Uuid::from_str(raw)
        .map(Some)
        .map_err(|_| AppError::validation(format!("{name} is not a valid id")))
}

/// POST /messages/upload
/// Multipart form: `file`, `receiverId`, optional `conversationId`, `message`,
/// `replyTo`, `clientTempId`. Stores the file, then sends a message carrying
/// its reference.
#[post("/upload")]
pub async fn upload_message(
    state: web::Data<AppState>,
    user: User,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut req = SendMessageRequest {
        sender: user.id,
        ..Default::default()
    };
    let mut receiver: Option<Uuid> = None;

    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| AppError::validation(format!("malformed upload: {e}")))?;
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let original = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("file")
                    .to_string();
                let bytes = read_field(&mut field, state.uploads.max_bytes()).await?;
                file = Some((original, bytes));
            }
            "receiverId" => receiver = parse_id("receiverId", &read_text(&mut field).await?)?,
            "conversationId" => {
                req.conversation_id = parse_id("conversationId", &read_text(&mut field).await?)?
            }
            "replyTo" => req.reply_to = parse_id("replyTo", &read_text(&mut field).await?)?,
            "message" => req.body = Some(read_text(&mut field).await?),
            "clientTempId" => {
                req.client_temp_id = Some(read_text(&mut field).await?).filter(|s| !s.is_empty())
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown upload field");
                read_field(&mut field, MAX_TEXT_FIELD_BYTES).await?;
            }
        }
    }

    req.receiver = receiver.ok_or_else(|| AppError::validation("receiverId is required"))?;
    let (original, bytes) = file.ok_or_else(|| AppError::validation("file is required"))?;

    let stored = state.uploads.save(&original, &bytes).await?;
    req.attachment_url = Some(stored.url.clone());
    req.attachment_name = Some(stored.original_name.clone());

    match state.messages.send(req).await {
        Ok(message) => Ok(HttpResponse::Ok().json(message)),
        Err(e) => {
            state.uploads.discard(&stored).await;
            Err(e)
        }
    }
}

/// GET /uploads/{name}
/// Serves a stored attachment. Public, like the references handed out.
#[get("/uploads/{name}")]
pub async fn serve_upload(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let bytes = state.uploads.read(&path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(bytes))
}
