//! Chat transport: outbound sends and the inbound lifecycle events
//!
//! The chat client itself runs in a separate bridge process. It posts its events to
//! the webhook (see `server`) and accepts outbound messages on `<bridge_url>/send`.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

/// Suffix the chat client uses for one-to-one chat ids
pub const CHAT_ID_SUFFIX: &str = "@c.us";

/// A text message received from a chat user
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender's phone-derived identifier (no suffix)
    pub sender: String,
    /// Chat to reply into
    pub chat_id: String,
    pub body: String,
}

impl InboundMessage {
    /// Message from a one-to-one chat id such as `6281111@c.us`
    pub fn from_chat(from: &str, body: &str) -> Self {
        Self {
            sender: sender_number(from).to_string(),
            chat_id: from.to_string(),
            body: body.to_string(),
        }
    }
}

/// Lifecycle events emitted by the chat client
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A pairing code is waiting to be scanned
    PairingCode(String),
    /// The client is paired and connected
    Ready,
    Message(InboundMessage),
}

/// Chat id for a registered number
pub fn chat_id_for(number: &str) -> String {
    format!("{}{}", number, CHAT_ID_SUFFIX)
}

/// Number part of a chat id (`6281111@c.us` -> `6281111`)
pub fn sender_number(chat_id: &str) -> &str {
    chat_id.split('@').next().unwrap_or(chat_id)
}

/// Outbound side of the chat client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Error text from a failed send: the JSON `error` field, else the raw body
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<SendResponse>(body) {
        Ok(SendResponse { error: Some(error) }) => error,
        _ => body.trim().to_string(),
    }
}

/// Sends through the bridge's HTTP API
pub struct BridgeTransport {
    client: reqwest::Client,
    send_url: String,
}

impl BridgeTransport {
    pub fn new(bridge_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            send_url: format!("{}/send", bridge_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.send_url)
            .json(&SendRequest { chat_id, text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            return Err(Error::Transport(format!(
                "bridge returned {} for {}: {}",
                status, chat_id, detail
            )));
        }

        Ok(())
    }
}

/// Keeps outbound messages in memory instead of sending them.
///
/// Used for `--dry-run` and as the transport in tests; chat ids added with
/// [`RecordingTransport::fail_for`] return an error instead.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat_id: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(chat_id.to_string());
        }
    }

    /// Every recorded `(chat_id, text)` pair, oldest first
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let fails = self
            .failing
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .contains(chat_id);
        if fails {
            return Err(Error::Transport(format!("send to {} refused", chat_id)));
        }

        info!("[dry-run] to {}: {}", chat_id, text.lines().next().unwrap_or(""));
        self.sent
            .lock()
            .map_err(|_| Error::LockPoisoned)?
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}
