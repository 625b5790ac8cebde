//! WebSocket session handler tests.

use super::*;
use crate::domain::ports::MockHubService;
use crate::domain::{ApiResponse, Error, Identifier};
use crate::inbound::ws;
use crate::inbound::ws::state::WsState;
use actix_web::{App, HttpServer, dev::ServerHandle, http::header};
use awc::{BoxedSocket, ws::Codec, ws::Frame, ws::Message as ClientMessage};
use futures_util::{SinkExt, StreamExt};
use rstest::rstest;
use serde_json::{Value, json};
use url::Url;

type Socket = actix_codec::Framed<BoxedSocket, Codec>;

async fn connect(hub: MockHubService) -> (Socket, ServerHandle) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let origin = Url::parse("http://localhost:3000").expect("static origin");
    let ws_state = WsState::new(Arc::new(hub), &[origin]);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(actix_web::web::Data::new(ws_state.clone()))
            .service(ws::ws_entry)
    })
    .listen(listener)
    .expect("bind test server")
    .disable_signals()
    .run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    let (_resp, mut socket) = awc::Client::default()
        .ws(format!("http://{addr}/ws"))
        .set_header(header::ORIGIN, "http://localhost:3000")
        .set_header(header::USER_AGENT, "hub-test/1.0")
        .connect()
        .await
        .expect("websocket connect");

    let greeting = next_json(&mut socket).await;
    assert_eq!(greeting, json!({"method": "connected"}));
    (socket, handle)
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = socket.next().await.expect("response frame").expect("frame");
        match frame {
            Frame::Text(bytes) => return serde_json::from_slice(&bytes).expect("json"),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn send(socket: &mut Socket, value: Value) {
    socket
        .send(ClientMessage::Text(value.to_string().into()))
        .await
        .expect("send text");
}

fn signed_in(user_id: Identifier) -> HubReply {
    HubReply {
        response: ApiResponse::success(),
        token: Some("bearer".to_owned()),
        claims: Some(TokenClaims::for_user(user_id)),
    }
}

#[rstest]
#[actix_rt::test]
async fn signin_binds_the_connection_identity() {
    let user_id = Identifier::generate();
    let mut hub = MockHubService::new();
    hub.expect_signin()
        .withf(|credentials, user_agent| {
            credentials.username == "jane@example.com" && user_agent == "hub-test/1.0"
        })
        .return_once(move |_, _| signed_in(user_id));
    hub.expect_check()
        .withf(move |claims| *claims == Some(TokenClaims::for_user(user_id)))
        .return_once(|_| HubReply::response(ApiResponse::success()));
    let (mut socket, _server) = connect(hub).await;

    send(
        &mut socket,
        json!({
            "method": "signin",
            "messageId": 1,
            "payload": {"username": "jane@example.com", "password": "Abcdefg1!"}
        }),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["method"], "signin");
    assert_eq!(reply["messageId"], 1);
    assert_eq!(reply["token"], "bearer");
    assert_eq!(reply["response"]["codeText"], "Ok");

    send(&mut socket, json!({"method": "check", "messageId": 2})).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["messageId"], 2);
    assert!(reply.get("token").is_none());
}

#[rstest]
#[actix_rt::test]
async fn empty_request_signs_the_connection_off() {
    let user_id = Identifier::generate();
    let mut hub = MockHubService::new();
    hub.expect_authenticate()
        .return_once(move |_| signed_in(user_id));
    hub.expect_request().never();
    hub.expect_check().withf(Option::is_none).return_once(|_| {
        HubReply::response(ApiResponse::from_error(&Error::invalid_credentials()))
    });
    let (mut socket, _server) = connect(hub).await;

    send(&mut socket, json!({"method": "authenticate", "token": "t"})).await;
    next_json(&mut socket).await;

    send(&mut socket, json!({"method": "request", "payload": {}})).await;
    assert_eq!(next_json(&mut socket).await, json!({"method": "signoff"}));

    send(&mut socket, json!({"method": "check"})).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["response"]["codeText"], "InvalidCredentials");
}

#[rstest]
#[actix_rt::test]
async fn generic_requests_carry_the_bound_claims() {
    let user_id = Identifier::generate();
    let mut hub = MockHubService::new();
    hub.expect_authenticate()
        .return_once(move |_| signed_in(user_id));
    hub.expect_request()
        .withf(move |claims, request| {
            claims.map(|claims| claims.user_id) == Some(user_id)
                && request.action == crate::domain::ActionType::UserSiteInfo
        })
        .return_once(|_, _| ApiResponse::success());
    let (mut socket, _server) = connect(hub).await;

    send(&mut socket, json!({"method": "authenticate", "token": "t"})).await;
    next_json(&mut socket).await;
    send(
        &mut socket,
        json!({
            "method": "request",
            "messageId": "abc",
            "payload": {"action": "UserSiteInfo", "request": {"settings": {}}}
        }),
    )
    .await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["method"], "request");
    assert_eq!(reply["messageId"], "abc");
}

#[rstest]
#[case("not-json")]
#[case(r#"{"method":"shutdown"}"#)]
#[actix_rt::test]
async fn closes_on_unusable_frames(#[case] payload: &str) {
    let (mut socket, _server) = connect(MockHubService::new()).await;
    socket
        .send(ClientMessage::Text(payload.to_owned().into()))
        .await
        .expect("send text");

    let frame = loop {
        match socket.next().await.expect("response frame").expect("frame") {
            Frame::Ping(_) | Frame::Pong(_) => continue,
            frame => break frame,
        }
    };
    match frame {
        Frame::Close(reason) => {
            assert_eq!(reason.expect("reason").code, CloseCode::Policy);
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[rstest]
#[actix_rt::test]
async fn closes_after_timeout_without_client_messages() {
    let (mut socket, _server) = connect(MockHubService::new()).await;
    tokio::time::sleep(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL * 3).await;

    let observed_close = tokio::time::timeout(Duration::from_secs(2), async {
        let mut observed = None;
        while let Some(frame) = socket.next().await {
            let frame = frame.expect("frame");
            match frame {
                Frame::Ping(_) | Frame::Pong(_) => continue,
                Frame::Close(reason) => {
                    observed = reason;
                    break;
                }
                other => panic!("unexpected frame before close: {other:?}"),
            }
        }
        observed
    })
    .await
    .expect("close frame missing within timeout")
    .expect("close frame missing after timeout");

    assert_eq!(observed_close.code, CloseCode::Normal);
    assert_eq!(
        observed_close.description.as_deref(),
        Some("heartbeat timeout")
    );
}
