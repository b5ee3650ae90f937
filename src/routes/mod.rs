pub mod attachments;
pub mod conversations;
pub mod messages;
pub mod reactions;
pub mod wsroute;

use actix_middleware::JwtAuth;
use actix_web::{web, HttpResponse};

/// Registers every route. `/messages` and `/ws` require a valid access token;
/// `/health` and stored attachments under `/uploads` do not.
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    let auth = JwtAuth::new(jwt_secret);

    cfg.route("/health", web::get().to(|| async { HttpResponse::Ok().body("OK") }))
        .service(attachments::serve_upload)
        .service(
            web::scope("/messages")
                .wrap(auth.clone())
                // literal paths before `/{user_id}`
                .service(messages::get_inbox)
                .service(messages::get_conversation_messages)
                .service(conversations::get_or_create_conversation)
                .service(messages::send_message)
                .service(attachments::upload_message)
                .service(messages::mark_read_from_user)
                .service(messages::mark_single_read)
                .service(messages::edit_message)
                .service(reactions::react_to_message)
                .service(messages::typing)
                .service(messages::delete_message)
                .service(messages::get_messages_with_user),
        )
        .service(web::scope("/ws").wrap(auth).service(wsroute::ws_handler));
}
