//! Operator HTTP surface: liveness, pairing code and the bridge webhook

use crate::transport::{InboundMessage, TransportEvent};
use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::warn;

const QR_IMAGE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Latest pairing code offered by the chat client, if still pending
#[derive(Clone, Default)]
pub struct PairingState {
    code: Arc<RwLock<Option<String>>>,
}

impl PairingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, code: String) {
        if let Ok(mut slot) = self.code.write() {
            *slot = Some(code);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.code.write() {
            *slot = None;
        }
    }

    pub fn current(&self) -> Option<String> {
        self.code.read().ok().and_then(|c| c.clone())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pairing: PairingState,
    pub events: mpsc::Sender<TransportEvent>,
}

/// Event body posted by the chat bridge
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Qr { code: String },
    Ready,
    Message { from: String, body: String },
}

impl From<BridgeEvent> for TransportEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { code } => TransportEvent::PairingCode(code),
            BridgeEvent::Ready => TransportEvent::Ready,
            BridgeEvent::Message { from, body } => {
                TransportEvent::Message(InboundMessage::from_chat(&from, &body))
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/qr", get(qr))
        .route("/webhook", post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> &'static str {
    "Bot is running"
}

async fn qr(State(state): State<AppState>) -> Html<String> {
    match state.pairing.current() {
        Some(code) => Html(qr_image_tag(&code)),
        None => Html("No QR code available".to_string()),
    }
}

async fn webhook(State(state): State<AppState>, Json(event): Json<BridgeEvent>) -> StatusCode {
    match state.events.send(event.into()).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => {
            warn!("Event pump stopped, rejecting bridge event");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// `<img>` pointing at a QR rendering service for `code`
pub fn qr_image_tag(code: &str) -> String {
    let src = reqwest::Url::parse_with_params(QR_IMAGE_URL, &[("data", code), ("size", "300x300")])
        .map(|url| url.to_string())
        .unwrap_or_default();
    format!("<img src=\"{}\" />", src.replace('&', "&amp;"))
}
