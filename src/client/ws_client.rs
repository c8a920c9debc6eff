//! WebSocket implementation of `BrokerApi`
//!
//! One connection per client, opened lazily on the first call and dropped on
//! any failure so the next call reconnects. Calls are strictly
//! request/response and bounded by a timeout.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::{AckOutcome, Acknowledgement, FetchOutcome, Message, SubmitOutcome};
use crate::client::api::BrokerApi;
use crate::transport::message::{Request, Response};
use crate::utils::error::CallError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsBrokerClient {
    url: String,
    timeout: Duration,
    stream: Mutex<Option<WsStream>>,
}

impl WsBrokerClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            stream: Mutex::new(None),
        }
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: &Request) -> Result<Response, CallError> {
        let mut slot = self.stream.lock().await;
        let result = match tokio::time::timeout(self.timeout, self.exchange(&mut slot, request)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout),
        };
        if result.is_err() {
            // The connection may be half-used; start clean next time.
            *slot = None;
        }
        result
    }

    async fn exchange(
        &self,
        slot: &mut Option<WsStream>,
        request: &Request,
    ) -> Result<Response, CallError> {
        if slot.is_none() {
            let (ws, _) = connect_async(self.url.as_str()).await?;
            debug!("Connected to broker at {}", self.url);
            *slot = Some(ws);
        }
        let Some(ws_stream) = slot.as_mut() else {
            return Err(CallError::Closed);
        };

        let text = serde_json::to_string(request)?;
        ws_stream.send(WsMessage::text(text)).await?;

        loop {
            match ws_stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(serde_json::from_str(text.as_str())?);
                }
                Some(Ok(WsMessage::Close(_))) | None => return Err(CallError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

fn unexpected(response: Response) -> CallError {
    match response {
        Response::Error { message } => CallError::Rejected(message),
        other => CallError::Unexpected(format!("{other:?}")),
    }
}

#[async_trait]
impl BrokerApi for WsBrokerClient {
    async fn submit(&self, message: Message) -> Result<SubmitOutcome, CallError> {
        match self.call(&Request::Submit { message }).await? {
            Response::Stored => Ok(SubmitOutcome::Stored),
            Response::Duplicate => Ok(SubmitOutcome::Duplicate),
            other => Err(unexpected(other)),
        }
    }

    async fn fetch(&self, producer_id: &str, consumer_id: &str) -> Result<FetchOutcome, CallError> {
        let request = Request::Fetch {
            producer_id: producer_id.to_string(),
            consumer_id: consumer_id.to_string(),
        };
        match self.call(&request).await? {
            Response::Message { message } => Ok(FetchOutcome::Delivered(message)),
            Response::NoContent => Ok(FetchOutcome::NoContent),
            other => Err(unexpected(other)),
        }
    }

    async fn ack(&self, ack: Acknowledgement) -> Result<AckOutcome, CallError> {
        let request = Request::Ack {
            producer_id: ack.producer_id,
            consumer_id: ack.consumer_id,
            sequence_id: ack.sequence_id,
        };
        match self.call(&request).await? {
            Response::Acknowledged => Ok(AckOutcome::Acknowledged),
            Response::NotFound => Ok(AckOutcome::NotFound),
            other => Err(unexpected(other)),
        }
    }

    async fn probe(&self) -> Result<(), CallError> {
        match self.call(&Request::Probe).await? {
            Response::Alive => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}
