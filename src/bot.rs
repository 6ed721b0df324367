//! Consumes transport lifecycle events and routes them

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::server::PairingState;
use crate::transport::TransportEvent;
use qrcode::render::unicode;
use qrcode::QrCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Render a pairing code as half-block text for a terminal
pub fn render_pairing_code(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| Error::Transport(format!("cannot encode pairing code: {}", e)))?;

    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

pub struct Bot {
    dispatcher: Arc<Dispatcher>,
    pairing: PairingState,
}

impl Bot {
    pub fn new(dispatcher: Arc<Dispatcher>, pairing: PairingState) -> Self {
        Self {
            dispatcher,
            pairing,
        }
    }

    pub async fn on_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::PairingCode(code) => {
                match render_pairing_code(&code) {
                    Ok(qr) => info!("QR code received, scan to pair:\n{}", qr),
                    Err(e) => warn!("QR code received but not rendered: {}", e),
                }
                self.pairing.set(code);
            }
            TransportEvent::Ready => {
                info!("Client is ready!");
                self.pairing.clear();
            }
            TransportEvent::Message(message) => {
                self.dispatcher.handle(&message).await;
            }
        }
    }

    /// Process events one at a time until every sender is dropped
    pub async fn run(self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(event).await;
        }
        info!("Transport event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Formatter;
    use crate::store::{SqliteStore, Store};
    use crate::transport::{InboundMessage, RecordingTransport};

    #[tokio::test]
    async fn test_event_routing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            transport.clone(),
            Formatter::default(),
        ));
        let pairing = PairingState::new();
        let bot = Bot::new(dispatcher, pairing.clone());

        let (tx, rx) = mpsc::channel(8);
        tx.send(TransportEvent::PairingCode("abc".to_string())).await.unwrap();
        tx.send(TransportEvent::Message(InboundMessage::from_chat("1@c.us", "!help")))
            .await
            .unwrap();
        drop(tx);
        bot.run(rx).await;

        assert_eq!(pairing.current().as_deref(), Some("abc"));
        assert_eq!(transport.sent_to("1@c.us").len(), 1);
        assert_eq!(store.response_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ready_clears_pairing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Arc::new(Dispatcher::new(store, transport, Formatter::default()));
        let pairing = PairingState::new();
        let bot = Bot::new(dispatcher, pairing.clone());

        bot.on_event(TransportEvent::PairingCode("abc".to_string())).await;
        bot.on_event(TransportEvent::Ready).await;
        assert!(pairing.current().is_none());
    }

    #[test]
    fn test_render_pairing_code() {
        let qr = render_pairing_code("2@abcDEF123,xyz==,456").unwrap();
        assert!(!qr.trim().is_empty());
        assert!(qr.lines().count() > 10);
        assert!(qr.contains('█') || qr.contains('▀') || qr.contains('▄'));
    }

    #[test]
    fn test_render_oversized_pairing_code_fails() {
        let huge = "x".repeat(8000);
        assert!(matches!(render_pairing_code(&huge), Err(Error::Transport(_))));
    }
}
