//! WebSocket transport
//!
//! This file implements the broker's network surface. Responsibilities:
//! - Accept TCP/WebSocket connections until the cancellation token fires
//! - Serve each connection on its own task, one response per request frame
//! - Translate `Request`s into broker operations under the broker lock
//!
//! The lock is only held inside `handle_request`, never across socket I/O.

use futures_util::{SinkExt, StreamExt};
use std::sync::{Mutex, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::engine::{Broker, SharedBroker};
use crate::broker::message::{AckOutcome, Acknowledgement, FetchOutcome, SubmitOutcome};
use crate::transport::message::{Request, Response};
use crate::utils::error::Result;

/// Bind `addr` and serve until `cancel` fires.
pub async fn start_websocket_server(
    addr: String,
    broker: SharedBroker,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Broker listening on ws://{addr}");
    serve(listener, broker, cancel).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, broker: SharedBroker, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = cancel.cancelled() => break,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        let broker = broker.clone();
        let cancel = cancel.clone();
        let conn_id = format!("conn-{}", uuid::Uuid::new_v4());
        debug!("{conn_id} accepted from {peer}");

        tokio::spawn(async move {
            handle_connection(stream, &conn_id, broker, cancel).await;
            debug!("{conn_id} disconnected");
        });
    }
    info!("Broker stopped accepting connections");
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: &str,
    broker: SharedBroker,
    cancel: CancellationToken,
) {
    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };

    loop {
        let frame = tokio::select! {
            frame = ws_stream.next() => frame,
            _ = cancel.cancelled() => break,
        };
        let text = match frame {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("Read error on {conn_id}: {e}");
                break;
            }
        };

        let response = match serde_json::from_str::<Request>(text.as_str()) {
            Ok(request) => handle_request(&broker, request),
            Err(err) => {
                warn!(
                    "Invalid request from {conn_id}: {err} | {}",
                    text.chars().take(100).collect::<String>()
                );
                Response::Error {
                    message: format!("invalid request: {err}"),
                }
            }
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode response for {conn_id}: {e}");
                break;
            }
        };
        if let Err(e) = ws_stream.send(WsMessage::text(encoded)).await {
            warn!("Failed to send response to {conn_id}: {e}");
            break;
        }
    }
}

/// Apply one request to the broker and build its response.
pub fn handle_request(broker: &Mutex<Broker>, request: Request) -> Response {
    let mut broker = match request {
        Request::Probe => return Response::Alive,
        _ => broker.lock().unwrap_or_else(PoisonError::into_inner),
    };

    match request {
        Request::Submit { message } => match broker.submit(message) {
            Ok(SubmitOutcome::Stored) => Response::Stored,
            Ok(SubmitOutcome::Duplicate) => Response::Duplicate,
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
        Request::Fetch {
            producer_id,
            consumer_id,
        } => match broker.fetch(&producer_id, &consumer_id) {
            FetchOutcome::Delivered(message) => Response::Message { message },
            FetchOutcome::NoContent => Response::NoContent,
        },
        Request::Ack {
            producer_id,
            consumer_id,
            sequence_id,
        } => {
            let ack = Acknowledgement {
                producer_id,
                consumer_id,
                sequence_id,
            };
            match broker.acknowledge(&ack) {
                AckOutcome::Acknowledged => Response::Acknowledged,
                AckOutcome::NotFound => Response::NotFound,
            }
        }
        Request::Probe => Response::Alive,
    }
}
