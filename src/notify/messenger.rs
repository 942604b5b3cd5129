use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;

use crate::config::MessengerConfig;

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Outbound text delivery for restock reminders.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Used when no provider credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMessenger;

#[async_trait]
impl Messenger for DisabledMessenger {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn send(&self, _to: &str, _body: &str) -> anyhow::Result<()> {
        bail!("messenger is not configured")
    }
}

enum Channel {
    WhatsApp(String),
    Sms(String),
}

fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

/// Twilio REST sender. WhatsApp wins over plain SMS when both are configured.
pub struct TwilioMessenger {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    channel: Channel,
    base_url: String,
}

impl TwilioMessenger {
    pub fn from_config(config: &MessengerConfig) -> Option<Self> {
        let account_sid = config.account_sid.clone()?;
        let auth_token = config.auth_token.clone()?;
        let channel = match (&config.whatsapp_from, &config.sms_from) {
            (Some(from), _) => Channel::WhatsApp(whatsapp_address(from)),
            (None, Some(from)) => Channel::Sms(from.clone()),
            (None, None) => return None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            client,
            account_sid,
            auth_token,
            channel,
            base_url: TWILIO_API.to_string(),
        })
    }

    /// Point at a different API root, e.g. a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn addresses(&self, to: &str) -> (String, String) {
        match &self.channel {
            Channel::WhatsApp(from) => (from.clone(), whatsapp_address(to)),
            Channel::Sms(from) => (from.clone(), to.to_string()),
        }
    }
}

#[async_trait]
impl Messenger for TwilioMessenger {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let (from, to) = self.addresses(to);
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .context("send twilio request")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("twilio responded {status}: {text}");
        }
        Ok(())
    }
}

/// The configured messenger, or [`DisabledMessenger`].
pub fn from_config(config: &MessengerConfig) -> Box<dyn Messenger> {
    match TwilioMessenger::from_config(config) {
        Some(messenger) => Box::new(messenger),
        None => Box::new(DisabledMessenger),
    }
}
