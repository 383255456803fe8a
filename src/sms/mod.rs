//! OTP delivery.
//!
//! Verification flows hand a rendered message and the OTP to an
//! `SmsProvider`; the provider returns its message id for audit logs. The
//! default provider for local dev is `LogSmsProvider`, which logs and returns a
//! generated id.

pub mod qcloud;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use self::qcloud::{QcloudConfig, QcloudProvider};

/// Delivery channel requested by the verification flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsChannel {
    Sms,
    Whatsapp,
}

impl SmsChannel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for SmsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmsChannel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(Self::Sms),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(format!("unknown sms channel: {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("invalid sms provider configuration: {0}")]
    InvalidConfig(String),
    #[error("channel type {0:?} is not supported by {1}")]
    UnsupportedChannel(SmsChannel, &'static str),
    #[error("sms request failed: {0}")]
    Request(String),
    #[error("sms provider returned status {0}")]
    Status(u16),
    #[error("malformed sms provider response: {0}")]
    MalformedResponse(String),
    #[error("sms provider error {code}: {message}")]
    Provider { code: String, message: String },
}

/// OTP delivery abstraction used by verification flows.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Deliver `message` to `phone` and return the provider message id.
    async fn send_message(
        &self,
        phone: &str,
        message: &str,
        channel: SmsChannel,
        otp: &str,
    ) -> Result<String, SmsError>;
}

/// Local dev provider that logs the delivery instead of sending it. The
/// message carries the OTP and is never logged.
#[derive(Clone, Debug, Default)]
pub struct LogSmsProvider;

#[async_trait]
impl SmsProvider for LogSmsProvider {
    async fn send_message(
        &self,
        phone: &str,
        message: &str,
        channel: SmsChannel,
        _otp: &str,
    ) -> Result<String, SmsError> {
        let message_id = Uuid::new_v4().to_string();
        info!(
            phone = %phone,
            channel = %channel,
            message_len = message.chars().count(),
            message_id = %message_id,
            "sms send stub"
        );
        Ok(message_id)
    }
}
