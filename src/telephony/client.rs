//! # Outbound Calls
//!
//! Places calls through the Twilio REST API. When the callee answers, Twilio
//! fetches the configured webhook, which answers with TwiML pointing the media
//! stream at this server's `/ws/{user_id}` endpoint.

use crate::settings::TelephonyConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Values threaded through the answer webhook back to the media stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub user_id: Option<String>,
}

#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// Dial `destination` and return the provider's call id.
    async fn place_call(&self, destination: &str, callback: CallbackParams) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

pub struct TwilioClient {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl TwilioClient {
    pub fn new(config: TelephonyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Twilio HTTP client")?;
        Ok(Self { http, config })
    }

    fn ensure_configured(&self) -> Result<()> {
        let c = &self.config;
        if [&c.account_sid, &c.auth_token, &c.from_number, &c.webhook_url]
            .iter()
            .any(|value| value.trim().is_empty())
        {
            return Err(anyhow!("Twilio environment variables not set correctly"));
        }
        Ok(())
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Answer webhook for this call, carrying the user id when there is one.
    fn webhook_url(&self, callback: &CallbackParams) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.config.webhook_url)
            .with_context(|| format!("Invalid Twilio webhook URL {}", self.config.webhook_url))?;
        if let Some(user_id) = &callback.user_id {
            url.query_pairs_mut().append_pair("user_id", user_id);
        }
        Ok(url.into())
    }
}

#[async_trait]
impl CallPlacer for TwilioClient {
    async fn place_call(&self, destination: &str, callback: CallbackParams) -> Result<String> {
        self.ensure_configured()?;
        let webhook = self.webhook_url(&callback)?;

        let resp = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", destination),
                ("From", self.config.from_number.as_str()),
                ("Url", webhook.as_str()),
            ])
            .send()
            .await
            .context("Twilio call request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "Twilio call creation failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let call: CallResource = resp
            .json()
            .await
            .context("Cannot parse Twilio call response")?;
        info!(to = %destination, sid = %call.sid, "Call initiated");
        Ok(call.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AppConfig;

    fn configured() -> TelephonyConfig {
        let mut config = AppConfig::default().telephony;
        config.account_sid = "AC123".to_string();
        config.auth_token = "token".to_string();
        config.from_number = "+15550000000".to_string();
        config.webhook_url = "https://bridge.example.com/twiml".to_string();
        config
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let client = TwilioClient::new(AppConfig::default().telephony).unwrap();
        let err = client
            .place_call("+15551234567", CallbackParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not set correctly"));
    }

    #[test]
    fn test_calls_url() {
        let client = TwilioClient::new(configured()).unwrap();
        assert_eq!(
            client.calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
    }

    #[test]
    fn test_webhook_carries_user_id() {
        let client = TwilioClient::new(configured()).unwrap();
        let with_user = client
            .webhook_url(&CallbackParams {
                user_id: Some("u 1".to_string()),
            })
            .unwrap();
        assert_eq!(with_user, "https://bridge.example.com/twiml?user_id=u+1");

        let anonymous = client.webhook_url(&CallbackParams::default()).unwrap();
        assert_eq!(anonymous, "https://bridge.example.com/twiml");
    }
}
