//! Chat-ops notifications.
//!
//! Posts a structured message to a webhook on transaction-created and
//! payment-confirmed events. Delivery is strictly best-effort: failures are
//! logged and never surfaced to the buyer or allowed to fail the primary
//! operation.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::models::Transaction;

/// Format a Unix timestamp as a human-readable date (e.g., "Jan 15, 2024 13:05")
fn format_date(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%b %d, %Y %H:%M").to_string())
        .unwrap_or_else(|| "Unknown date".to_string())
}

#[derive(Debug, Serialize)]
struct WebhookMessage {
    content: String,
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    color: u32,
    fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    /// Disabled notifier for tests and minimal deployments.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub async fn order_created(&self, txn: &Transaction) {
        let embed = Embed {
            title: "New order".to_string(),
            color: 0x7c3aed,
            fields: txn_fields(txn),
        };
        self.post(WebhookMessage {
            content: format!("Order `{}` created", txn.id),
            embeds: vec![embed],
        })
        .await;
    }

    pub async fn payment_confirmed(&self, txn: &Transaction) {
        let embed = Embed {
            title: "Payment confirmed".to_string(),
            color: 0x22c55e,
            fields: txn_fields(txn),
        };
        self.post(WebhookMessage {
            content: format!("Order `{}` is paid and claimable", txn.id),
            embeds: vec![embed],
        })
        .await;
    }

    async fn post(&self, message: WebhookMessage) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        match self.client.post(url).json(&message).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    status = %response.status(),
                    "chat-ops webhook returned non-success"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("chat-ops webhook delivery failed: {}", e);
            }
        }
    }
}

fn txn_fields(txn: &Transaction) -> Vec<EmbedField> {
    vec![
        EmbedField {
            name: "Key".to_string(),
            value: txn.customer_key.clone(),
            inline: true,
        },
        EmbedField {
            name: "Package".to_string(),
            value: txn.package.to_string(),
            inline: true,
        },
        EmbedField {
            name: "Duration".to_string(),
            value: format!("{} days", txn.duration_days),
            inline: true,
        },
        EmbedField {
            name: "Total".to_string(),
            value: format!(
                "{} ({}% off {})",
                txn.total_amount, txn.discount_percent, txn.original_amount
            ),
            inline: true,
        },
        EmbedField {
            name: "Created".to_string(),
            value: format_date(txn.created_at),
            inline: true,
        },
    ]
}
