//! Per-connection WebSocket handler.
//!
//! Keeps framing and heartbeats at the edge while deferring every hub
//! method to the injected [`HubService`]. The session owns the bearer
//! claims bound to the connection: `signup`, `signin`, `authenticate`,
//! `obo`, and `revert-obo` replace them, and an empty `request` clears
//! them. The public contract pings every 5s and considers a connection
//! idle after 10s without client traffic. Tests shorten both intervals.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::time;
use tracing::{debug, warn};

use crate::domain::TraceId;
use crate::domain::ports::{HubReply, HubService, TokenClaims};
use crate::inbound::ws::messages::{FrameError, HubCall, HubFrame, HubReplyFrame};

/// Time between heartbeats to the client (5s in production, shorter in tests).
#[cfg(not(test))]
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(test)]
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Max idle time before disconnecting the client (10s in production, shorter in tests).
#[cfg(not(test))]
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(test)]
const CLIENT_TIMEOUT: Duration = Duration::from_millis(100);

pub(super) async fn handle_ws_session(
    hub: Arc<dyn HubService>,
    user_agent: String,
    session: Session,
    stream: MessageStream,
) {
    WsSession::new(hub, user_agent).run(session, stream).await;
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    InvalidPayload,
    Network(Closed),
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

struct WsSession {
    hub: Arc<dyn HubService>,
    user_agent: String,
    claims: Option<TokenClaims>,
}

impl WsSession {
    fn new(hub: Arc<dyn HubService>, user_agent: String) -> Self {
        Self {
            hub,
            user_agent,
            claims: None,
        }
    }

    async fn run(mut self, mut session: Session, mut stream: MessageStream) {
        if let Err(error) = self
            .send_json(&mut session, &HubReplyFrame::notice("connected"))
            .await
        {
            warn!(error = %error, "WebSocket closed before the greeting was sent");
            return;
        }

        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);

        loop {
            let result = tokio::select! {
                _ = heartbeat.tick() => {
                    Self::handle_heartbeat_tick(&mut session, &last_heartbeat).await
                }
                message = stream.recv() => {
                    self.handle_stream_message(&mut session, &mut last_heartbeat, message)
                        .await
                }
            };

            if let Err(error) = result {
                Self::log_shutdown_reason(&error);
                let close_action = Self::close_action_for(&error);
                Self::close_session_if_needed(session, close_action).await;
                return;
            }
        }
    }

    async fn handle_heartbeat_tick(
        session: &mut Session,
        last_heartbeat: &Instant,
    ) -> Result<(), SessionError> {
        if Instant::now().duration_since(*last_heartbeat) > CLIENT_TIMEOUT {
            return Err(SessionError::HeartbeatTimeout);
        }

        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        &mut self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };

        match message {
            Ok(message) => self.handle_message(session, last_heartbeat, message).await,
            Err(error) => Err(SessionError::Protocol(error)),
        }
    }

    async fn handle_message(
        &mut self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Message,
    ) -> Result<(), SessionError> {
        match message {
            Message::Ping(payload) => {
                *last_heartbeat = Instant::now();
                session
                    .pong(&payload)
                    .await
                    .map_err(SessionError::Network)?;
                Ok(())
            }
            Message::Text(text) => {
                *last_heartbeat = Instant::now();
                TraceId::scope(
                    TraceId::generate(),
                    self.handle_text_message(session, text.as_ref()),
                )
                .await
            }
            Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => {
                *last_heartbeat = Instant::now();
                Ok(())
            }
            Message::Close(reason) => Err(SessionError::ClientClosed(reason)),
        }
    }

    async fn handle_text_message(
        &mut self,
        session: &mut Session,
        text: &str,
    ) -> Result<(), SessionError> {
        let frame = match serde_json::from_str::<HubFrame>(text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(error = %error, "Rejected malformed WebSocket payload");
                return Err(SessionError::InvalidPayload);
            }
        };
        let method = frame.method.clone();
        let message_id = frame.message_id.clone();
        let call = frame.into_call().map_err(|error: FrameError| {
            warn!(error = %error, "Rejected WebSocket frame");
            SessionError::InvalidPayload
        })?;

        let reply = match self.dispatch(call).await {
            Some(reply) => {
                HubReplyFrame::reply(method, message_id, reply.response, reply.token)
            }
            None => HubReplyFrame::notice("signoff"),
        };
        self.send_json(session, &reply)
            .await
            .map_err(SessionError::Network)
    }

    /// Run `call` against the hub; `None` means the connection signed off.
    async fn dispatch(&mut self, call: HubCall) -> Option<HubReply> {
        let reply = match call {
            HubCall::Config => HubReply::response(self.hub.config().await),
            HubCall::Signup(request) => self.hub.signup(request).await,
            HubCall::Signin(credentials) => {
                self.hub
                    .signin(credentials, self.user_agent.clone())
                    .await
            }
            HubCall::VerifyEmail { code } => {
                HubReply::response(self.hub.verify_email(code).await)
            }
            HubCall::Authenticate { token } => self.hub.authenticate(token).await,
            HubCall::Check => self.hub.check(self.claims).await,
            HubCall::OnBehalfOf { email } => self.hub.on_behalf_of(self.claims, email).await,
            HubCall::RevertOnBehalfOf => self.hub.revert_on_behalf_of(self.claims).await,
            HubCall::Request(Some(request)) => {
                HubReply::response(self.hub.request(self.claims, request).await)
            }
            HubCall::Request(None) => {
                debug!("connection signed off");
                self.claims = None;
                return None;
            }
        };
        if let Some(claims) = reply.claims {
            self.claims = Some(claims);
        }
        Some(reply)
    }

    async fn send_json<T: serde::Serialize>(
        &self,
        session: &mut Session,
        payload: &T,
    ) -> Result<(), Closed> {
        match serde_json::to_string(payload) {
            Ok(body) => session.text(body).await,
            Err(error) => {
                warn!(error = %error, "Failed to serialize WebSocket payload");
                Ok(())
            }
        }
    }

    fn log_shutdown_reason(error: &SessionError) {
        match error {
            SessionError::HeartbeatTimeout => {
                warn!("WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                warn!(error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::InvalidPayload
            | SessionError::ClientClosed(_)
            | SessionError::StreamClosed => {}
        }
    }

    fn close_action_for(error: &SessionError) -> CloseAction {
        match error {
            SessionError::HeartbeatTimeout => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Normal,
                description: Some("heartbeat timeout".to_owned()),
            })),
            SessionError::Protocol(_) => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Protocol,
                description: Some("protocol error".to_owned()),
            })),
            SessionError::InvalidPayload => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Policy,
                description: Some("invalid payload".to_owned()),
            })),
            SessionError::ClientClosed(reason) => CloseAction::Close(reason.clone()),
            SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
        }
    }

    async fn close_session_if_needed(session: Session, close_action: CloseAction) {
        if let CloseAction::Close(reason) = close_action {
            if let Err(error) = session.close(reason).await {
                warn!(error = %error, "Failed to close WebSocket session");
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
