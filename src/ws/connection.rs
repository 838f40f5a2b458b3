//! One websocket client bridged to one backend process.
//!
//! The connection loop owns the websocket and the backend's stdin; backend
//! stdout is decoded on its own task (see [`crate::backend::bridge`]) and
//! handed over through a channel, so a blocked pipe read never stalls the
//! socket. Messages are relayed verbatim in both directions, each direction
//! strictly in order.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use crate::backend::{BackendProcess, BridgeWriter, CloseReason, spawn_reader};
use crate::config::Config;
use crate::ws::registry::{ConnectionId, ConnectionPhase, SharedRegistry};

/// Serves one accepted TCP connection for its whole lifetime.
///
/// Performs the websocket handshake (rejecting unknown routes and, when an
/// allow-list is configured, unknown origins), spawns the backend, relays
/// messages until either side goes away, then tears everything down. The
/// backend process never outlives the connection.
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<Config>,
    registry: SharedRegistry,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        check_handshake(req, resp, &config.route, &config.allowed_origins)
    })
    .await?;

    let (id, mut shutdown) = registry.write().await.insert(peer);
    let started = Instant::now();
    info!("Connection {} opened from {}", id, peer);

    let (mut backend, io) = match BackendProcess::spawn(&config.backend) {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Connection {}: {}", id, e);
            close_with_error(ws, id, &e.to_string()).await;
            registry.write().await.remove(id);
            return Ok(());
        }
    };
    registry.write().await.set_backend(id, backend.id());

    let (mut from_backend, reader) = spawn_reader(io.stdout);
    let mut writer = BridgeWriter::new(io.stdin);
    registry.write().await.set_phase(id, ConnectionPhase::Active);

    let (mut sink, mut messages) = ws.split();

    // Reason the backend side died, if it did; decides the close code.
    let mut failure: Option<String> = None;
    // Set when the reader task finished before we initiated teardown.
    let mut backend_eof = false;

    loop {
        tokio::select! {
            inbound = messages.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let message: Value = match serde_json::from_str(&text) {
                            Ok(value) => value,
                            Err(e) => {
                                warn!("Connection {}: dropping malformed client message: {}", id, e);
                                continue;
                            }
                        };
                        if let Err(e) = writer.write(&message).await {
                            warn!("Connection {}: {}", id, e);
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Connection {}: dropping binary frame, the protocol is JSON text", id);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection {} closed by client", id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Connection {}: websocket error: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            outbound = from_backend.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(e) = sink.send(Message::Text(message.to_string())).await {
                            warn!("Connection {}: failed to forward to client: {}", id, e);
                            break;
                        }
                    }
                    None => {
                        backend_eof = true;
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("Connection {}: server shutting down", id);
                break;
            }
        }
    }

    registry.write().await.set_phase(id, ConnectionPhase::Closing);

    // Killing the process closes its stdout, which unblocks the reader task.
    backend.terminate();
    drop(writer);

    match reader.await {
        Ok(CloseReason::Decode(e)) => {
            if failure.is_none() {
                failure = Some(e.to_string());
            }
        }
        Ok(CloseReason::StreamEnded) => {
            // Only a failure if the backend went away on its own.
            if backend_eof && failure.is_none() {
                failure = Some("backend process exited".to_string());
            }
        }
        Err(e) => debug!("Connection {}: reader task failed: {}", id, e),
    }

    let frame = match &failure {
        Some(reason) => CloseFrame {
            code: CloseCode::Error,
            reason: reason.clone().into(),
        },
        None => CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        },
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!("Connection {}: close handshake did not complete: {}", id, e);
    }

    registry.write().await.remove(id);
    info!("Connection {} closed after {:?}", id, started.elapsed());
    Ok(())
}

/// Closes a websocket that never got a backend, with an error close code.
async fn close_with_error(
    mut ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    id: ConnectionId,
    reason: &str,
) {
    let frame = CloseFrame {
        code: CloseCode::Error,
        reason: reason.to_string().into(),
    };
    if let Err(e) = ws.close(Some(frame)).await {
        debug!("Connection {}: close handshake did not complete: {}", id, e);
    }
}

/// Validates the upgrade request before the handshake completes.
fn check_handshake(
    req: &Request,
    resp: Response,
    route: &str,
    allowed_origins: &[String],
) -> Result<Response, ErrorResponse> {
    if req.uri().path() != route {
        debug!("Rejecting upgrade for unknown path {}", req.uri().path());
        return Err(error_response(StatusCode::NOT_FOUND));
    }

    let origin = req.headers().get("origin").and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, allowed_origins) {
        warn!("Rejecting websocket upgrade from origin {:?}", origin);
        return Err(error_response(StatusCode::FORBIDDEN));
    }

    Ok(resp)
}

/// An empty allow-list accepts any origin, the permissive default this
/// endpoint ships with. A configured allow-list requires an exact match and
/// rejects requests without an Origin header.
fn origin_allowed(origin: Option<&str>, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    origin.is_some_and(|o| allowed.iter().any(|a| a == o))
}

fn error_response(status: StatusCode) -> ErrorResponse {
    let mut resp = ErrorResponse::new(None);
    *resp.status_mut() = status;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_request(path: &str) -> Request {
        Request::builder().uri(path).body(()).unwrap()
    }

    #[test]
    fn any_origin_is_allowed_when_no_list_is_configured() {
        assert!(origin_allowed(None, &[]));
        assert!(origin_allowed(Some("http://anywhere.example"), &[]));
    }

    #[test]
    fn configured_list_requires_an_exact_match() {
        let allowed = vec!["http://editor.example".to_string()];
        assert!(origin_allowed(Some("http://editor.example"), &allowed));
        assert!(!origin_allowed(Some("http://evil.example"), &allowed));
        assert!(!origin_allowed(None, &allowed));
    }

    #[test]
    fn handshake_rejects_unknown_route() {
        let err = check_handshake(&upgrade_request("/rust"), Response::new(()), "/python", &[])
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn handshake_rejects_missing_origin_when_list_is_configured() {
        let allowed = vec!["http://editor.example".to_string()];
        let err = check_handshake(
            &upgrade_request("/python"),
            Response::new(()),
            "/python",
            &allowed,
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn handshake_accepts_matching_origin() {
        let mut req = upgrade_request("/python");
        req.headers_mut()
            .insert("origin", "http://editor.example".parse().unwrap());
        let allowed = vec!["http://editor.example".to_string()];
        assert!(check_handshake(&req, Response::new(()), "/python", &allowed).is_ok());
    }
}
