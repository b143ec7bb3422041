//! Fire-and-forget notification sink (Telegram bot API).
//!
//! Sends never block the caller and never propagate errors; an unreachable
//! sink degrades to log lines only.

use crate::domain::{Decimal, Side, Symbol};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug)]
struct Sink {
    client: Client,
    token: String,
    chat_id: String,
}

/// Notification sender. Cheap to clone; unconfigured instances drop every
/// message silently.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    sink: Option<Arc<Sink>>,
}

impl Notifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        match (token, chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => Notifier {
                sink: Some(Arc::new(Sink {
                    client: Client::new(),
                    token,
                    chat_id,
                })),
            },
            _ => {
                debug!("notifications disabled (no token/chat configured)");
                Notifier { sink: None }
            }
        }
    }

    pub fn disabled() -> Self {
        Notifier { sink: None }
    }

    /// Queue a message for delivery on a detached task.
    pub fn send(&self, text: String) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        tokio::spawn(async move {
            let url = format!("https://api.telegram.org/bot{}/sendMessage", sink.token);
            let payload = serde_json::json!({
                "chat_id": sink.chat_id,
                "text": text,
            });
            match sink.client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = %response.status(), "notification rejected");
                }
                Err(e) => warn!(error = %e, "notification send failed"),
            }
        });
    }

    pub fn system_started(&self) {
        self.send("breakwatch started".to_string());
    }

    pub fn system_stopped(&self) {
        self.send("breakwatch stopped".to_string());
    }

    pub fn order_submitted(
        &self,
        symbol: &Symbol,
        side: Side,
        quantity: i64,
        price: Decimal,
        reason: &str,
    ) {
        self.send(format!(
            "{} {} x{} @ {} ({})",
            side, symbol, quantity, price, reason
        ));
    }

    pub fn order_failed(&self, symbol: &Symbol, side: Side, reason: &str, error: &str) {
        self.send(format!(
            "ORDER FAILED: {} {} ({}): {}",
            side, symbol, reason, error
        ));
    }

    pub fn stop_loss(&self, symbol: &Symbol, price: Decimal, threshold: Decimal) {
        self.send(format!(
            "STOP LOSS: {} at {} (threshold {})",
            symbol, price, threshold
        ));
    }

    pub fn close_decision(&self, symbol: &Symbol, pyramid: bool, close: Decimal, entry: Decimal) {
        let action = if pyramid { "PYRAMID" } else { "CUT" };
        self.send(format!(
            "CLOSE {}: {} close {} vs entry {}",
            action, symbol, close, entry
        ));
    }
}
