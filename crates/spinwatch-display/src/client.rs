use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Display transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub ip: String,
    pub api_key: String,
    pub icon: String,
    /// 0 keeps the notification up until dismissed.
    pub cycles: u32,
    pub lifetime_ms: Option<u64>,
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    priority: Priority,
    icon_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lifetime: Option<u64>,
    model: FrameModel<'a>,
}

#[derive(Serialize)]
struct FrameModel<'a> {
    cycles: u32,
    frames: Vec<Frame<'a>>,
}

#[derive(Serialize)]
struct Frame<'a> {
    icon: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct PushResponse {
    success: Option<PushSuccess>,
}

#[derive(Deserialize, Default)]
struct PushSuccess {
    id: Option<serde_json::Value>,
}

/// Client for the LaMetric Time local notification API.
///
/// Both operations are best-effort: the device may be off or unreachable and
/// the caller carries on either way. The last pushed notification id is kept
/// so a later clear can target it.
pub struct LaMetricClient {
    config: DisplayConfig,
    base_url: String,
    http: reqwest::blocking::Client,
    last_notification_id: Option<String>,
}

impl LaMetricClient {
    pub fn new(config: DisplayConfig) -> Result<Self, DisplayError> {
        // The device serves its local API over HTTPS with a self-signed
        // certificate.
        let http = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = format!("https://{}:4343/api/v2/device/notifications", config.ip);
        Ok(Self {
            config,
            base_url,
            http,
            last_notification_id: None,
        })
    }

    pub fn push(&mut self, text: &str, priority: Priority) -> Result<(), DisplayError> {
        let payload = NotificationPayload {
            priority,
            icon_type: "none",
            lifetime: self.config.lifetime_ms,
            model: FrameModel {
                cycles: self.config.cycles,
                frames: vec![Frame {
                    icon: &self.config.icon,
                    text,
                }],
            },
        };

        let response = self
            .http
            .post(&self.base_url)
            .basic_auth("dev", Some(&self.config.api_key))
            .json(&payload)
            .send()?
            .error_for_status()?;

        // The response carries the notification id needed for deletion; a
        // body we cannot parse just means we lose clear-targeting.
        if let Ok(body) = response.json::<PushResponse>() {
            self.last_notification_id = body
                .success
                .and_then(|s| s.id)
                .map(|id| match id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                });
        }

        tracing::info!(%text, "Pushed notification to display");
        Ok(())
    }

    /// Remove the given notification, or the most recently pushed one.
    /// Clearing when nothing was pushed is a no-op.
    pub fn clear(&mut self, notification_id: Option<&str>) -> Result<(), DisplayError> {
        let Some(id) = notification_id
            .map(str::to_string)
            .or_else(|| self.last_notification_id.clone())
        else {
            tracing::debug!("No notification to clear");
            return Ok(());
        };

        let url = format!("{}/{}", self.base_url, id);
        self.http
            .delete(&url)
            .basic_auth("dev", Some(&self.config.api_key))
            .send()?
            .error_for_status()?;

        if self.last_notification_id.as_deref() == Some(id.as_str()) {
            self.last_notification_id = None;
        }

        tracing::info!(%id, "Cleared display notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_serializes_to_device_schema() {
        let payload = NotificationPayload {
            priority: Priority::Info,
            icon_type: "none",
            lifetime: Some(120_000),
            model: FrameModel {
                cycles: 1,
                frames: vec![Frame {
                    icon: "i9218",
                    text: "Blue in Green - Miles Davis",
                }],
            },
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "priority": "info",
                "icon_type": "none",
                "lifetime": 120_000,
                "model": {
                    "cycles": 1,
                    "frames": [{"icon": "i9218", "text": "Blue in Green - Miles Davis"}]
                }
            })
        );
    }

    #[test]
    fn lifetime_omitted_when_unset() {
        let payload = NotificationPayload {
            priority: Priority::Info,
            icon_type: "none",
            lifetime: None,
            model: FrameModel {
                cycles: 0,
                frames: vec![],
            },
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("lifetime").is_none());
    }

    #[test]
    fn push_response_id_accepts_string_or_number() {
        let body: PushResponse = serde_json::from_value(json!({"success": {"id": "42"}})).unwrap();
        assert_eq!(
            body.success.and_then(|s| s.id),
            Some(serde_json::Value::String("42".into()))
        );

        let body: PushResponse = serde_json::from_value(json!({"success": {"id": 42}})).unwrap();
        assert!(body.success.and_then(|s| s.id).is_some());
    }
}
