//! Piracy alert delivery.
//!
//! When an activation hits a domain conflict, the engine hands a
//! [`PiracyAlert`] to a [`PiracyNotifier`] and moves on. Delivery is
//! best-effort: the notifier call is spawned off the request path, its
//! timeout is bounded, and its errors are logged but never surfaced to the
//! activating client.
//!
//! The delivery channel is selected from the configured webhook URL:
//! - Discord webhook URLs get an embed payload
//! - Telegram bot API URLs get a Markdown message
//! - anything else gets a generic JSON POST
//! - an empty URL disables delivery entirely

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::config::get_config;
use crate::errors::{LicenseError, LicenseResult};

/// Structured payload describing a detected piracy attempt.
///
/// The license key is expected to be pre-masked (see
/// `license_key::mask_license_key`) — raw keys never leave the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PiracyAlert {
    /// Masked license key, e.g. `NTRS-AB12-****-****-GH78`.
    pub license_key: String,
    pub holder_name: String,
    pub office_name: Option<String>,
    /// Domain the license is legitimately bound to.
    pub bound_domain: String,
    /// Domain that presented the key.
    pub attempted_domain: String,
    pub attempted_ip: String,
    pub user_agent: String,
    /// Running piracy attempt count, including this attempt.
    pub attempt_count: i64,
    /// ISO-8601 timestamp of the attempt.
    pub timestamp: String,
}

/// Delivery backend for piracy alerts.
///
/// Variants correspond to the supported delivery channels; the engine only
/// sees `notify()`.
#[derive(Debug, Clone)]
pub enum PiracyNotifier {
    /// Discord webhook (embed payload).
    Discord { url: String },
    /// Telegram bot API sendMessage endpoint.
    Telegram { url: String },
    /// Generic JSON webhook.
    Webhook { url: String },
    /// No delivery configured.
    Disabled,
}

impl PiracyNotifier {
    /// Build a notifier from the global configuration.
    pub fn from_config() -> LicenseResult<Self> {
        let config = get_config()?;
        Ok(Self::from_url(&config.piracy.webhook_url))
    }

    /// Select the delivery backend from a webhook URL.
    pub fn from_url(url: &str) -> Self {
        let url = url.trim();
        if url.is_empty() {
            return PiracyNotifier::Disabled;
        }
        if url.contains("discord.com") {
            PiracyNotifier::Discord {
                url: url.to_string(),
            }
        } else if url.contains("api.telegram.org") {
            PiracyNotifier::Telegram {
                url: url.to_string(),
            }
        } else {
            PiracyNotifier::Webhook {
                url: url.to_string(),
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, PiracyNotifier::Disabled)
    }

    /// Deliver an alert to the configured channel.
    ///
    /// Returns an error on transport failure or a non-2xx response so the
    /// caller can log it; the activation flow swallows these errors.
    pub async fn notify(&self, alert: &PiracyAlert) -> LicenseResult<()> {
        let (url, body) = match self {
            PiracyNotifier::Disabled => return Ok(()),
            PiracyNotifier::Discord { url } => (url, discord_payload(alert)),
            PiracyNotifier::Telegram { url } => (url, telegram_payload(alert)),
            PiracyNotifier::Webhook { url } => (url, webhook_payload(alert)?),
        };

        let timeout_secs = get_config()
            .map(|c| c.piracy.notify_timeout_secs)
            .unwrap_or(5);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LicenseError::NetworkError(format!("failed to build client: {e}")))?;

        let response = client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LicenseError::NetworkError(format!("alert delivery failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LicenseError::NetworkError(format!(
                "alert endpoint returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Discord webhook payload: one red embed with the alert fields.
fn discord_payload(alert: &PiracyAlert) -> serde_json::Value {
    json!({
        "content": "**PIRACY ATTEMPT DETECTED**",
        "embeds": [{
            "color": 0x00FF_0000,
            "title": "Unauthorized license use",
            "fields": [
                { "name": "License", "value": alert.license_key, "inline": true },
                { "name": "Holder", "value": alert.holder_name, "inline": true },
                { "name": "Office", "value": alert.office_name.as_deref().unwrap_or("-"), "inline": true },
                { "name": "Bound domain", "value": format!("`{}`", alert.bound_domain), "inline": true },
                { "name": "Attempted domain", "value": format!("`{}`", alert.attempted_domain), "inline": true },
                { "name": "Attempted IP", "value": format!("`{}`", alert.attempted_ip), "inline": true },
                { "name": "Attempt #", "value": alert.attempt_count.to_string(), "inline": true },
            ],
            "timestamp": alert.timestamp,
            "footer": { "text": "domainlock license server" },
        }],
    })
}

/// Telegram sendMessage payload.
fn telegram_payload(alert: &PiracyAlert) -> serde_json::Value {
    let text = format!(
        "*PIRACY ATTEMPT DETECTED*\n\n\
         License: `{}`\n\
         Holder: {}\n\
         Office: {}\n\
         Bound domain: `{}`\n\
         Attempted domain: `{}`\n\
         IP: `{}`\n\
         Attempt #{}",
        alert.license_key,
        alert.holder_name,
        alert.office_name.as_deref().unwrap_or("-"),
        alert.bound_domain,
        alert.attempted_domain,
        alert.attempted_ip,
        alert.attempt_count,
    );

    json!({ "text": text, "parse_mode": "Markdown" })
}

/// Generic webhook payload: the alert fields plus an `event` discriminator.
fn webhook_payload(alert: &PiracyAlert) -> LicenseResult<serde_json::Value> {
    let mut body = serde_json::to_value(alert)
        .map_err(|e| LicenseError::NetworkError(format!("failed to encode alert: {e}")))?;
    body["event"] = json!("piracy_attempt");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert() -> PiracyAlert {
        PiracyAlert {
            license_key: "NTRS-AB12-****-****-GH78".to_string(),
            holder_name: "Jane Holder".to_string(),
            office_name: Some("Holder & Partners".to_string()),
            bound_domain: "a.com".to_string(),
            attempted_domain: "b.com".to_string(),
            attempted_ip: "203.0.113.7".to_string(),
            user_agent: "curl/8.0".to_string(),
            attempt_count: 3,
            timestamp: "2025-06-01T12:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn backend_selection_from_url() {
        assert!(matches!(
            PiracyNotifier::from_url("https://discord.com/api/webhooks/1/abc"),
            PiracyNotifier::Discord { .. }
        ));
        assert!(matches!(
            PiracyNotifier::from_url("https://api.telegram.org/bot123/sendMessage"),
            PiracyNotifier::Telegram { .. }
        ));
        assert!(matches!(
            PiracyNotifier::from_url("https://alerts.example.com/hook"),
            PiracyNotifier::Webhook { .. }
        ));
        assert!(PiracyNotifier::from_url("").is_disabled());
        assert!(PiracyNotifier::from_url("   ").is_disabled());
    }

    #[test]
    fn discord_payload_carries_both_domains() {
        let body = discord_payload(&sample_alert());
        let rendered = body.to_string();
        assert!(rendered.contains("NTRS-AB12-****-****-GH78"));
        assert!(rendered.contains("a.com"));
        assert!(rendered.contains("b.com"));
    }

    #[test]
    fn telegram_payload_uses_markdown() {
        let body = telegram_payload(&sample_alert());
        assert_eq!(body["parse_mode"], "Markdown");
        let text = body["text"].as_str().unwrap();
        assert!(text.contains("Attempt #3"));
        assert!(text.contains("`a.com`"));
    }

    #[test]
    fn webhook_payload_has_event_and_camel_case_fields() {
        let body = webhook_payload(&sample_alert()).unwrap();
        assert_eq!(body["event"], "piracy_attempt");
        assert_eq!(body["licenseKey"], "NTRS-AB12-****-****-GH78");
        assert_eq!(body["attemptedDomain"], "b.com");
        assert_eq!(body["attemptCount"], 3);
    }

    #[tokio::test]
    async fn disabled_notifier_is_a_no_op() {
        let notifier = PiracyNotifier::Disabled;
        assert!(notifier.notify(&sample_alert()).await.is_ok());
    }
}
