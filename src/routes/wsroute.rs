use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::ReadScope;
use crate::services::SendMessageRequest;
use crate::state::AppState;
use crate::websocket::events::ServerEvent;
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::ConnectionHandle;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

/// One live connection of an authenticated user
struct WsSession {
    user_id: Uuid,
    handle: ConnectionHandle,
    outbound: Option<UnboundedReceiver<String>>,
    hb: Instant,
    state: AppState,
}

// Answers on the session's own connection; a closed socket only gets logged
fn reply(handle: &ConnectionHandle, event: &ServerEvent) {
    if let Err(e) = handle.send_event(event) {
        tracing::debug!(
            connection_id = %handle.id,
            event = event.event_type(),
            error = %e,
            "reply dropped"
        );
    }
}

// Runs one client event against the services. Failures go back to this
// connection only.
async fn handle_ws_event(
    user_id: Uuid,
    evt: WsInboundEvent,
    state: AppState,
    handle: ConnectionHandle,
) {
    let result: Result<(), AppError> = match evt {
        WsInboundEvent::Join { .. } => Ok(()),

        WsInboundEvent::Typing { receiver_id } => {
            state.messages.typing(user_id, receiver_id);
            Ok(())
        }

        WsInboundEvent::SendMessage {
            receiver_id,
            conversation_id,
            message,
            file_url,
            file_name,
            reply_to,
            client_temp_id,
        } => {
            let req = SendMessageRequest {
                sender: user_id,
                receiver: receiver_id,
                conversation_id,
                body: message,
                attachment_url: file_url,
                attachment_name: file_name,
                reply_to,
                client_temp_id: client_temp_id.clone(),
            };
            match state.messages.send(req).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "live send rejected");
                    reply(
                        &handle,
                        &ServerEvent::MessageError {
                            client_temp_id,
                            error: e.to_string(),
                        },
                    );
                    return;
                }
            }
        }

        WsInboundEvent::EditMessage { id, message } => state
            .messages
            .edit(id, message, user_id)
            .await
            .map(|updated| reply(&handle, &ServerEvent::MessageEdited(updated))),

        WsInboundEvent::DeleteMessage { id } => state
            .messages
            .soft_delete(id, user_id)
            .await
            .map(|deleted| reply(&handle, &ServerEvent::MessageDeleted(deleted))),

        WsInboundEvent::ReactMessage {
            msg_id,
            emoji,
            client_temp_id,
        } => state
            .messages
            .react(msg_id, &emoji, user_id, client_temp_id)
            .await
            .map(|_| ()),

        WsInboundEvent::MessageRead { conversation_id } => state
            .messages
            .mark_read(user_id, ReadScope::Conversation(conversation_id))
            .await
            .map(|_| ()),
    };

    if let Err(e) = result {
        tracing::debug!(user_id = %user_id, error = %e, "live event failed");
        reply(
            &handle,
            &ServerEvent::Error {
                message: e.to_string(),
            },
        );
    }
}

impl WsSession {
    fn new(user_id: Uuid, state: AppState) -> Self {
        let (handle, outbound) = ConnectionHandle::channel();
        Self {
            user_id,
            handle,
            outbound: Some(outbound),
            hb: Instant::now(),
            state,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.state.config.ws.heartbeat_interval;
        let timeout = self.state.config.ws.client_timeout;

        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    user_id = %act.user_id,
                    connection_id = %act.handle.id,
                    "websocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn reply(&self, event: ServerEvent) {
        reply(&self.handle, &event);
    }

    fn on_text(&mut self, text: &str) {
        let evt = match serde_json::from_str::<WsInboundEvent>(text) {
            Ok(evt) => evt,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to parse ws frame");
                self.reply(ServerEvent::Error {
                    message: "malformed event".to_string(),
                });
                return;
            }
        };

        if let WsInboundEvent::Join { user_id } = evt {
            if user_id == self.user_id {
                self.state.presence.join(self.user_id, self.handle.clone());
            } else {
                tracing::warn!(
                    user_id = %self.user_id,
                    claimed = %user_id,
                    "join refused for another identity"
                );
                self.reply(ServerEvent::Error {
                    message: "cannot join as another user".to_string(),
                });
            }
            return;
        }

        let state = self.state.clone();
        let handle = self.handle.clone();
        let user_id = self.user_id;
        actix::spawn(async move {
            handle_ws_event(user_id, evt, state, handle).await;
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.handle.id,
            "websocket session started"
        );

        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        self.state.presence.join(self.user_id, self.handle.clone());
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.handle.id,
            "websocket session stopped"
        );
        self.state.presence.leave(self.handle.id);
    }
}

// Events queued for this connection by the delivery engine
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, payload: String, ctx: &mut Self::Context) {
        ctx.text(payload);
    }

    // The session keeps its own sender, so the queue only ends with the actor.
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.on_text(&text);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = %self.user_id, ?reason, "websocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "websocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws
/// Upgrades to the live channel. The token travels as a Bearer header, the
/// `accessToken` cookie or the `token` query parameter.
#[get("")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, Error> {
    ws::start(
        WsSession::new(user.id, state.get_ref().clone()),
        &req,
        stream,
    )
}
