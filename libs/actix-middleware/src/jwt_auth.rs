use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    Error, HttpMessage, HttpResponse,
};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Cookie the web client stores its access token in
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// User ID extracted from JWT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Claims issued by the account service. Older tokens carry the user id in `sub`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "sub")]
    pub id: String,
    pub exp: usize,
}

/// JWT Authentication Middleware
///
/// Looks for a token in the `Authorization: Bearer` header, then the
/// `accessToken` cookie, then the `token` query parameter (browser WebSocket
/// handshakes cannot set headers).
#[derive(Clone)]
pub struct JwtAuth {
    key: Arc<DecodingKey>,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

/// Validates a HS256 token and returns the caller's id
pub fn verify_token(key: &DecodingKey, token: &str) -> Result<Uuid, String> {
    let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))
        .map_err(|e| e.to_string())?;
    Uuid::parse_str(&data.claims.id).map_err(|_| "malformed user id".to_string())
}

fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(token) = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        return Some(token.to_string());
    }

    if let Some(cookie) = req.cookie(ACCESS_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }

    req.query_string()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "token")
        .map(|(_, v)| v.to_string())
}

fn unauthorized(message: &str, code: &str) -> Error {
    let body = ErrorResponse::new(
        "Unauthorized",
        message,
        401,
        kinds::AUTHENTICATION_ERROR,
        code,
    );
    InternalError::from_response(message.to_string(), HttpResponse::Unauthorized().json(body))
        .into()
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            key: self.key.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    key: Arc<DecodingKey>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let key = self.key.clone();

        Box::pin(async move {
            let token = extract_token(&req)
                .ok_or_else(|| unauthorized("Missing access token", error_codes::TOKEN_MISSING))?;

            let user_id = verify_token(&key, &token).map_err(|e| {
                tracing::warn!("JWT validation failed: {}", e);
                unauthorized("Invalid access token", error_codes::TOKEN_INVALID)
            })?;

            req.extensions_mut().insert(UserId(user_id));

            service.call(req).await
        })
    }
}

/// FromRequest implementation for UserId
impl actix_web::FromRequest for UserId {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<UserId>() {
            Some(user_id) => ready(Ok(*user_id)),
            None => ready(Err(unauthorized(
                "User not authenticated",
                error_codes::TOKEN_MISSING,
            ))),
        }
    }
}
