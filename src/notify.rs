//! Webhook notifications for hits
//!
//! Best effort only: delivery failures are logged and reported as `false`,
//! never propagated into the run.

use crate::Result;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const NOTIFY_TIMEOUT_SECS: u64 = 10;
const FOOTER: &str = "Handle Scout";
const SIGNUP_URL: &str = "https://www.roblox.com/signup";

/// Embed color for a candidate kind tag
pub fn kind_color(kind: &str) -> u32 {
    match kind.to_lowercase().as_str() {
        "4l" => 0xFF6B6B,
        "4c" => 0x4ECDC4,
        "5l" => 0x45B7D1,
        "5c" => 0x96CEB4,
        "5l_meaningful" => 0x9B59B6,
        "mixed" => 0xFECE00,
        "clean_mixed" => 0xDDA0DD,
        _ => 0x7289DA,
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    footer: EmbedFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

impl EmbedField {
    fn inline(name: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline: true,
        }
    }
}

/// Sends Discord-style webhook messages
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    /// An empty URL yields a disabled notifier
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            url: url.into().trim().to_string(),
            client,
        })
    }

    pub fn disabled() -> Result<Self> {
        Self::new("")
    }

    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }

    /// Announce an available candidate
    pub async fn send_availability_alert(&self, candidate: &str, kind: &str) -> bool {
        let embed = Embed {
            title: "Username Available!".to_string(),
            description: format!("```{}```", candidate),
            color: kind_color(kind),
            fields: vec![
                EmbedField::inline("Type", kind.to_uppercase()),
                EmbedField::inline("Length", candidate.chars().count().to_string()),
                EmbedField::inline("Register", format!("[Click Here]({})", SIGNUP_URL)),
            ],
            footer: EmbedFooter {
                text: FOOTER.to_string(),
            },
            timestamp: Utc::now().to_rfc3339(),
        };
        self.deliver(embed).await
    }

    /// Post a test message to confirm the webhook is reachable
    pub async fn send_connectivity_test(&self) -> bool {
        let embed = Embed {
            title: "Webhook Connected!".to_string(),
            description: "Your webhook is working correctly.".to_string(),
            color: 0x00FF00,
            fields: Vec::new(),
            footer: EmbedFooter {
                text: FOOTER.to_string(),
            },
            timestamp: Utc::now().to_rfc3339(),
        };
        self.deliver(embed).await
    }

    async fn deliver(&self, embed: Embed) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let payload = WebhookPayload {
            embeds: vec![embed],
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let delivered = status == 200 || status == 204;
                if !delivered {
                    tracing::warn!(status, "Webhook rejected notification");
                }
                delivered
            }
            Err(e) => {
                tracing::warn!(error = %e, "Webhook delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_colors() {
        assert_eq!(kind_color("4l"), 0xFF6B6B);
        assert_eq!(kind_color("5L_MEANINGFUL"), 0x9B59B6);
        assert_eq!(kind_color("list"), 0x7289DA);
    }

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let notifier = WebhookNotifier::new("   ").unwrap();
        assert!(!notifier.is_enabled());
        assert!(!notifier.send_availability_alert("abcd", "4l").await);
        assert!(!notifier.send_connectivity_test().await);
    }

    #[test]
    fn test_embed_shape() {
        let payload = WebhookPayload {
            embeds: vec![Embed {
                title: "t".to_string(),
                description: "d".to_string(),
                color: 1,
                fields: Vec::new(),
                footer: EmbedFooter {
                    text: FOOTER.to_string(),
                },
                timestamp: "now".to_string(),
            }],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["embeds"][0].get("fields").is_none());
        assert_eq!(json["embeds"][0]["footer"]["text"], FOOTER);
    }
}
