use actix_web::{web, App, HttpServer};
use bridge_chat_service::{config, db, error, logging, routes, state::AppState, store::Stores};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let stores = match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = db::init_pool(url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            Stores::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Stores::memory()
        }
    };

    let state = AppState::new(cfg.clone(), stores);

    let bind_addr = cfg.bind_addr();
    tracing::info!(%bind_addr, "starting bridge-chat-service");

    let rest_state = state.clone();
    let server_cfg = cfg.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allowed_origin(&server_cfg.client_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);
        let secret = server_cfg.jwt_secret.clone();

        App::new()
            .wrap(cors)
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::RequestId)
            .app_data(web::Data::new(rest_state.clone()))
            .configure(|c| routes::configure(c, &secret))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))?;

    state.presence.clear();
    tracing::info!("bridge-chat-service stopped");
    Ok(())
}
