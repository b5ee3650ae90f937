//! Messaging flow integration tests
//!
//! Purpose: drive the REST surface end to end against the in-memory backend,
//! with live connections registered directly in the presence registry.
//!
//! Run: cargo test --test messaging_flow_test

mod common;

use actix_web::{http::StatusCode, test};
use bridge_chat_service::client::{ConversationView, Reconciled};
use bridge_chat_service::models::{DeliveryStatus, InboxEntry, Message, TOMBSTONE_TEXT};
use bridge_chat_service::websocket::events::ServerEvent;
use bridge_chat_service::websocket::ConnectionHandle;
use common::{bearer, drain, multipart_body, stored_files, test_state, BOUNDARY};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

#[actix_web::test]
async fn test_health_is_public() {
    let state = test_state();
    let app = init_app!(state);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert_eq!(body.as_ref(), b"OK");
}

#[actix_web::test]
async fn test_messages_require_token() {
    let state = test_state();
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/messages/inbox").to_request();
    let resp = test::try_call_service(&app, req).await;
    let status = match resp {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_offline_receiver_finds_message_in_inbox() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let mut view = ConversationView::new(a, b);
    let outgoing = view.begin_send(Some("hello".into()), None, None);
    assert_eq!(view.messages()[0].status, DeliveryStatus::Sending);

    let req = test::TestRequest::post()
        .uri("/messages")
        .insert_header(bearer(a))
        .set_json(json!({
            "receiverId": b,
            "message": "hello",
            "clientTempId": outgoing.client_temp_id,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: Message = test::read_body_json(resp).await;

    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(sent.client_temp_id.as_deref(), Some(outgoing.client_temp_id.as_str()));
    assert_eq!(view.confirm(sent.clone()), Reconciled::Replaced { index: 0 });
    assert_eq!(view.messages()[0].id, sent.id);
    assert_eq!(view.messages()[0].status, DeliveryStatus::Sent);

    let req = test::TestRequest::get()
        .uri("/messages/inbox")
        .insert_header(bearer(b))
        .to_request();
    let inbox: Vec<InboxEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].counterpart_id, a);
    assert_eq!(inbox[0].last_message, "hello");
    assert_eq!(inbox[0].last_message_id, sent.id);
    assert!(!inbox[0].is_read);
}

#[actix_web::test]
async fn test_online_delivery_then_read_receipt() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let (a_conn, mut a_rx) = ConnectionHandle::channel();
    let (b_conn, mut b_rx) = ConnectionHandle::channel();
    state.presence.join(a, a_conn);
    state.presence.join(b, b_conn);

    let mut a_view = ConversationView::new(a, b);
    let mut b_view = ConversationView::new(b, a);
    let outgoing = a_view.begin_send(Some("are you there?".into()), None, None);

    let req = test::TestRequest::post()
        .uri("/messages")
        .insert_header(bearer(a))
        .set_json(json!({
            "receiverId": b,
            "message": "are you there?",
            "clientTempId": outgoing.client_temp_id,
        }))
        .to_request();
    let sent: Message = test::call_and_read_body_json(&app, req).await;
    assert_eq!(sent.status, DeliveryStatus::Delivered);
    a_view.confirm(sent.clone());

    let b_events = drain(&mut b_rx);
    assert_eq!(b_events.len(), 1);
    match &b_events[0] {
        ServerEvent::ReceiveMessage(m) => {
            assert_eq!(m.id, sent.id);
            assert_eq!(m.status, DeliveryStatus::Delivered);
        }
        other => panic!("unexpected event {other:?}"),
    }
    let now = Instant::now();
    for event in b_events {
        assert!(b_view.apply_event(event, now));
    }

    // the sender's own echo is a duplicate of the REST confirmation
    for event in drain(&mut a_rx) {
        assert!(!a_view.apply_event(event, now));
    }
    assert_eq!(a_view.messages().len(), 1);

    let req = test::TestRequest::put()
        .uri(&format!("/messages/read/{a}"))
        .insert_header(bearer(b))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["modifiedCount"], 1);

    let a_events = drain(&mut a_rx);
    assert_eq!(a_events.len(), 1);
    for event in a_events {
        assert!(a_view.apply_event(event, now));
    }
    assert_eq!(a_view.messages()[0].status, DeliveryStatus::Seen);

    // repeating the receipt changes nothing and notifies nobody
    let req = test::TestRequest::put()
        .uri(&format!("/messages/read/{a}"))
        .insert_header(bearer(b))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["modifiedCount"], 0);
    assert!(drain(&mut a_rx).is_empty());
}

#[actix_web::test]
async fn test_double_reaction_is_kept_once() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/messages")
        .insert_header(bearer(b))
        .set_json(json!({ "receiverId": a, "message": "deal?" }))
        .to_request();
    let sent: Message = test::call_and_read_body_json(&app, req).await;

    let mut last = None;
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/messages/react/{}", sent.id))
            .insert_header(bearer(a))
            .set_json(json!({ "emoji": "👍" }))
            .to_request();
        let reacted: Message = test::call_and_read_body_json(&app, req).await;
        last = Some(reacted);
    }

    let reactions = last.map(|m| m.reactions).unwrap_or_default();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].user_id, a);
    assert_eq!(reactions[0].emoji, "👍");
}

#[actix_web::test]
async fn test_edit_and_delete_round_trip() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/messages")
        .insert_header(bearer(a))
        .set_json(json!({ "receiverId": b, "message": "first draft" }))
        .to_request();
    let sent: Message = test::call_and_read_body_json(&app, req).await;

    // only the sender may edit
    let req = test::TestRequest::put()
        .uri(&format!("/messages/edit/{}", sent.id))
        .insert_header(bearer(b))
        .set_json(json!({ "message": "hijacked" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::put()
        .uri(&format!("/messages/edit/{}", sent.id))
        .insert_header(bearer(a))
        .set_json(json!({ "message": "final wording" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let history_uri = format!("/messages/conversation/{}", sent.conversation_id);
    let req = test::TestRequest::get()
        .uri(&history_uri)
        .insert_header(bearer(b))
        .to_request();
    let history: Vec<Message> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history[0].body.as_deref(), Some("final wording"));
    assert!(history[0].is_edited);

    for _ in 0..2 {
        let req = test::TestRequest::delete()
            .uri(&format!("/messages/{}", sent.id))
            .insert_header(bearer(a))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = test::TestRequest::get()
        .uri(&history_uri)
        .insert_header(bearer(a))
        .to_request();
    let history: Vec<Message> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].is_deleted);
    assert!(history[0].body.is_none());
    assert!(history[0].attachment_url.is_none());
    assert_eq!(history[0].sender_id, a);
    assert_eq!(history[0].receiver_id, b);

    let req = test::TestRequest::get()
        .uri("/messages/inbox")
        .insert_header(bearer(b))
        .to_request();
    let inbox: Vec<InboxEntry> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(inbox[0].last_message, TOMBSTONE_TEXT);
}

#[actix_web::test]
async fn test_blank_message_rejected() {
    let state = test_state();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/messages")
        .insert_header(bearer(Uuid::new_v4()))
        .insert_header(("x-request-id", "blank-1"))
        .set_json(json!({ "receiverId": Uuid::new_v4(), "message": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["trace_id"], "blank-1");
}

#[actix_web::test]
async fn test_missing_token_body_carries_request_id() {
    let state = test_state();
    let app = init_app!(state);

    let req = test::TestRequest::get()
        .uri("/messages/inbox")
        .insert_header(("x-request-id", "anon-1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "TOKEN_MISSING");
    assert_eq!(body["trace_id"], "anon-1");
}

#[actix_web::test]
async fn test_conversation_lookup_is_stable() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let mut ids = Vec::new();
    for (caller, other) in [(a, b), (b, a), (a, b)] {
        let req = test::TestRequest::get()
            .uri(&format!("/messages/conversations/{other}"))
            .insert_header(bearer(caller))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        ids.push(body["conversationId"].clone());
    }
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[actix_web::test]
async fn test_upload_sends_attachment_message() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let body = multipart_body(
        &[
            ("receiverId", b.to_string()),
            ("clientTempId", "up-1".to_string()),
        ],
        "cv.pdf",
        b"%PDF-1.4",
    );
    let req = test::TestRequest::post()
        .uri("/messages/upload")
        .insert_header(bearer(a))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
        .to_request();
    let sent: Message = test::call_and_read_body_json(&app, req).await;

    assert_eq!(sent.attachment_name.as_deref(), Some("cv.pdf"));
    assert_eq!(sent.client_temp_id.as_deref(), Some("up-1"));
    let url = sent.attachment_url.unwrap_or_default();
    let stored = url.rsplit('/').next().unwrap_or_default().to_string();
    assert_eq!(stored_files(&state), vec![stored.clone()]);

    let req = test::TestRequest::get()
        .uri(&format!("/uploads/{stored}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await.as_ref(), b"%PDF-1.4");
}

#[actix_web::test]
async fn test_rejected_upload_leaves_no_file() {
    let state = test_state();
    let app = init_app!(state);
    let a = Uuid::new_v4();

    let body = multipart_body(&[("receiverId", a.to_string())], "cv.pdf", b"%PDF-1.4");
    let req = test::TestRequest::post()
        .uri("/messages/upload")
        .insert_header(bearer(a))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(stored_files(&state).is_empty());
}
