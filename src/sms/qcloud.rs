//! Tencent Cloud SMS (`SendSms`, API version 2021-01-11).
//!
//! Requests are signed with TC3-HMAC-SHA256 over the JSON body and the
//! `content-type` and `host` headers. The OTP is passed as the single template
//! parameter; the message body itself is defined by the approved template.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use url::Url;

use super::{SmsChannel, SmsError, SmsProvider};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_API_BASE: &str = "https://sms.tencentcloudapi.com";
pub const DEFAULT_REGION: &str = "ap-guangzhou";

const PROVIDER: &str = "qcloud";
const SERVICE: &str = "sms";
const ACTION: &str = "SendSms";
const API_VERSION: &str = "2021-01-11";
const ALGORITHM: &str = "TC3-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const STATUS_OK: &str = "Ok";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct QcloudConfig {
    secret_id: String,
    secret_key: SecretString,
    sms_sdk_app_id: String,
    sign_name: String,
    template_id: String,
    region: String,
}

impl QcloudConfig {
    #[must_use]
    pub fn new(
        secret_id: impl Into<String>,
        secret_key: SecretString,
        sms_sdk_app_id: impl Into<String>,
        sign_name: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key,
            sms_sdk_app_id: sms_sdk_app_id.into(),
            sign_name: sign_name.into(),
            template_id: template_id.into(),
            region: DEFAULT_REGION.to_string(),
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// # Errors
    /// Returns an error naming the first empty setting.
    pub fn validate(&self) -> Result<(), SmsError> {
        let settings = [
            ("secret_id", self.secret_id.as_str()),
            ("secret_key", self.secret_key.expose_secret()),
            ("sms_sdk_app_id", self.sms_sdk_app_id.as_str()),
            ("sign_name", self.sign_name.as_str()),
            ("template_id", self.template_id.as_str()),
            ("region", self.region.as_str()),
        ];
        match settings.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(SmsError::InvalidConfig(format!("missing {name}"))),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for QcloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QcloudConfig")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"***")
            .field("sms_sdk_app_id", &self.sms_sdk_app_id)
            .field("sign_name", &self.sign_name)
            .field("template_id", &self.template_id)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendSmsRequest<'a> {
    phone_number_set: [String; 1],
    sms_sdk_app_id: &'a str,
    sign_name: &'a str,
    template_id: &'a str,
    template_param_set: [&'a str; 1],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendSmsResponse {
    response: SendSmsResponseParams,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendSmsResponseParams {
    #[serde(default)]
    send_status_set: Vec<SendStatus>,
    #[serde(default)]
    request_id: String,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendStatus {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &str) -> Result<Vec<u8>, SmsError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SmsError::InvalidConfig(format!("signing key: {e}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build the TC3-HMAC-SHA256 `Authorization` header for one request.
fn authorization(
    config: &QcloudConfig,
    host: &str,
    body: &str,
    timestamp: DateTime<Utc>,
) -> Result<String, SmsError> {
    let date = timestamp.format("%Y-%m-%d").to_string();
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{JSON_CONTENT_TYPE}\nhost:{host}\n\n{SIGNED_HEADERS}\n{}",
        sha256_hex(body)
    );
    let credential_scope = format!("{date}/{SERVICE}/tc3_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{credential_scope}\n{}",
        timestamp.timestamp(),
        sha256_hex(&canonical_request)
    );

    let secret_date = hmac_sha256(
        format!("TC3{}", config.secret_key.expose_secret()).as_bytes(),
        &date,
    )?;
    let secret_service = hmac_sha256(&secret_date, SERVICE)?;
    let secret_signing = hmac_sha256(&secret_service, "tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        config.secret_id
    ))
}

/// Numbers without a leading `+` are taken as already carrying a country code.
fn e164(phone: &str) -> String {
    let phone = phone.trim();
    if phone.starts_with('+') {
        phone.to_string()
    } else {
        format!("+{phone}")
    }
}

#[derive(Clone)]
pub struct QcloudProvider {
    config: QcloudConfig,
    api_base: Url,
    client: Client,
}

impl QcloudProvider {
    /// # Errors
    /// Returns an error if the configuration is incomplete or the HTTP client
    /// cannot be built.
    pub fn new(config: QcloudConfig) -> Result<Self, SmsError> {
        config.validate()?;
        let api_base =
            Url::parse(DEFAULT_API_BASE).map_err(|e| SmsError::InvalidConfig(e.to_string()))?;
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SmsError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            config,
            api_base,
            client,
        })
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }

    fn host(&self) -> String {
        let host = self.api_base.host_str().unwrap_or_default();
        match self.api_base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    async fn send_sms(&self, phone: &str, otp: &str) -> Result<String, SmsError> {
        let request = SendSmsRequest {
            phone_number_set: [e164(phone)],
            sms_sdk_app_id: &self.config.sms_sdk_app_id,
            sign_name: &self.config.sign_name,
            template_id: &self.config.template_id,
            template_param_set: [otp],
        };
        let body =
            serde_json::to_string(&request).map_err(|e| SmsError::Request(e.to_string()))?;
        let now = Utc::now();
        let authorization = authorization(&self.config, &self.host(), &body, now)?;

        let response = self
            .client
            .post(self.api_base.clone())
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header("X-TC-Action", ACTION)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Timestamp", now.timestamp().to_string())
            .header("X-TC-Region", &self.config.region)
            .body(body)
            .send()
            .await
            .map_err(|e| SmsError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmsError::Status(status.as_u16()));
        }

        let response: SendSmsResponse = response
            .json()
            .await
            .map_err(|e| SmsError::MalformedResponse(e.to_string()))?;
        let params = response.response;

        if let Some(err) = params.error {
            return Err(SmsError::Provider {
                code: err.code,
                message: err.message,
            });
        }

        match params.send_status_set.first() {
            Some(status) if status.code == STATUS_OK => Ok(params.request_id),
            Some(status) => Err(SmsError::Provider {
                code: status.code.clone(),
                message: status.message.clone(),
            }),
            None => Err(SmsError::MalformedResponse(
                "response has no send status".to_string(),
            )),
        }
    }
}

impl fmt::Debug for QcloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QcloudProvider")
            .field("config", &self.config)
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SmsProvider for QcloudProvider {
    async fn send_message(
        &self,
        phone: &str,
        _message: &str,
        channel: SmsChannel,
        otp: &str,
    ) -> Result<String, SmsError> {
        if channel != SmsChannel::Sms {
            return Err(SmsError::UnsupportedChannel(channel, PROVIDER));
        }

        let span = info_span!(
            "sms.send",
            sms.provider = PROVIDER,
            sms.action = ACTION,
            sms.region = %self.config.region
        );
        match self.send_sms(phone, otp).instrument(span).await {
            Ok(request_id) => {
                info!(sms.provider = PROVIDER, request_id = %request_id, "sms sent");
                Ok(request_id)
            }
            Err(err) => {
                error!(sms.provider = PROVIDER, "sms send failed: {err}");
                Err(err)
            }
        }
    }
}
