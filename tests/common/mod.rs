//! Shared setup for the HTTP integration tests: an in-memory backend and
//! locally minted access tokens.

#![allow(dead_code)]

use actix_middleware::Claims;
use bridge_chat_service::config::{Config, UploadConfig, WsConfig};
use bridge_chat_service::state::AppState;
use bridge_chat_service::store::Stores;
use bridge_chat_service::websocket::events::ServerEvent;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret";

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        jwt_secret: SECRET.into(),
        client_url: "http://localhost:3000".into(),
        uploads: UploadConfig {
            dir: std::env::temp_dir().join(format!("chat-it-{}", Uuid::new_v4())),
            public_base_url: "http://localhost:5000".into(),
            max_bytes: 1024 * 1024,
        },
        ws: WsConfig::default(),
    }
}

pub fn test_state() -> AppState {
    AppState::new(Arc::new(test_config()), Stores::memory())
}

pub fn token_for(user: Uuid) -> String {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize;
    encode(
        &Header::default(),
        &Claims {
            id: user.to_string(),
            exp,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn bearer(user: Uuid) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(user)))
}

/// Every event queued so far on a registered test connection
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        events.push(serde_json::from_str(&raw).expect("server event"));
    }
    events
}

pub const BOUNDARY: &str = "----chat-test-boundary";

/// `multipart/form-data` body with text fields and one `file` part
pub fn multipart_body(fields: &[(&str, String)], file_name: &str, file: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Files currently in the upload directory
pub fn stored_files(state: &AppState) -> Vec<String> {
    match std::fs::read_dir(&state.config.uploads.dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[macro_export]
macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_middleware::RequestId)
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(|cfg| bridge_chat_service::routes::configure(cfg, common::SECRET)),
        )
        .await
    };
}
