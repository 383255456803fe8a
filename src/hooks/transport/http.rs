//! Webhook transport (`https://`).
//!
//! Requests follow the Standard Webhooks convention: `webhook-id`,
//! `webhook-timestamp` and, when secrets are configured, a
//! `webhook-signature` header holding one `v1,<base64>` HMAC-SHA256 signature
//! per secret over `<id>.<timestamp>.<body>`. Several secrets allow rotation.

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use reqwest::{header::CONTENT_TYPE, Client};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info_span, Instrument};
use url::Url;
use uuid::Uuid;

use super::{HookTransport, TransportError};
use crate::hooks::config::ConfigError;
use crate::hooks::{HookPoint, HookTimeout};

type HmacSha256 = Hmac<Sha256>;

pub const KIND: &str = "http";

const SECRET_PREFIX: &str = "v1,whsec_";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest hook response body accepted.
pub const MAX_RESPONSE_BYTES: usize = 1 << 20;

/// Decode a `v1,whsec_<base64>` secret into its key bytes.
fn secret_key(secret: &SecretString) -> Result<Vec<u8>, ConfigError> {
    let encoded = secret
        .expose_secret()
        .trim()
        .strip_prefix(SECRET_PREFIX)
        .ok_or_else(|| ConfigError::InvalidSecret(format!("expected {SECRET_PREFIX}<base64>")))?;

    let key = Base64::decode_vec(encoded)
        .map_err(|_| ConfigError::InvalidSecret("secret is not valid base64".to_string()))?;

    if key.is_empty() {
        return Err(ConfigError::InvalidSecret("secret is empty".to_string()));
    }

    Ok(key)
}

/// # Errors
/// Returns an error if any secret is not a `v1,whsec_<base64>` value.
pub fn check_secrets(secrets: &[SecretString]) -> Result<(), ConfigError> {
    for secret in secrets {
        secret_key(secret)?;
    }
    Ok(())
}

/// Build the `webhook-signature` header value.
///
/// # Errors
/// Returns an error if a secret cannot be decoded.
pub fn signature_header(
    secrets: &[SecretString],
    message_id: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<String, ConfigError> {
    let mut signatures = Vec::with_capacity(secrets.len());

    for secret in secrets {
        let key = secret_key(secret)?;
        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|_| ConfigError::InvalidSecret("invalid key length".to_string()))?;
        mac.update(message_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let signature = Base64::encode_string(&mac.finalize().into_bytes());
        signatures.push(format!("v1,{signature}"));
    }

    Ok(signatures.join(" "))
}

#[derive(Clone)]
pub struct WebhookTransport {
    client: Client,
    url: Url,
    secrets: Vec<SecretString>,
}

impl WebhookTransport {
    /// # Errors
    /// Returns an error if a secret is malformed or the HTTP client cannot be built.
    pub fn new(user_agent: &str, url: Url, secrets: Vec<SecretString>) -> Result<Self, ConfigError> {
        check_secrets(&secrets)?;

        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            url,
            secrets,
        })
    }
}

fn request_error(err: &reqwest::Error, hook_timeout: HookTimeout) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(hook_timeout.as_millis())
    } else if err.is_decode() || err.is_body() {
        TransportError::MalformedBody(err.to_string())
    } else {
        TransportError::Connection(err.to_string())
    }
}

fn body_too_large() -> TransportError {
    TransportError::MalformedBody(format!(
        "response body exceeds {MAX_RESPONSE_BYTES} bytes"
    ))
}

/// Read the body in chunks, giving up past [`MAX_RESPONSE_BYTES`].
async fn read_body(
    mut response: reqwest::Response,
    hook_timeout: HookTimeout,
) -> Result<Vec<u8>, TransportError> {
    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
    {
        return Err(body_too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| request_error(&e, hook_timeout))?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(body_too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl HookTransport for WebhookTransport {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn invoke(
        &self,
        point: HookPoint,
        input: &Value,
        hook_timeout: HookTimeout,
    ) -> Result<Value, TransportError> {
        let body = serde_json::to_vec(input).map_err(|e| TransportError::Encode(e.to_string()))?;
        let message_id = Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp();

        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(hook_timeout.duration())
            .header(CONTENT_TYPE, "application/json")
            .header("webhook-id", &message_id)
            .header("webhook-timestamp", timestamp.to_string());

        if !self.secrets.is_empty() {
            let signature = signature_header(&self.secrets, &message_id, timestamp, &body)
                .map_err(|e| TransportError::Encode(e.to_string()))?;
            request = request.header("webhook-signature", signature);
        }

        let span = info_span!(
            "hook.webhook",
            http.method = "POST",
            url = %self.url,
            hook.point = %point,
            webhook.id = %message_id
        );

        let response = request
            .body(body)
            .send()
            .instrument(span.clone())
            .await
            .map_err(|e| {
                error!(hook.point = %point, "webhook request failed: {e}");
                request_error(&e, hook_timeout)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(hook.point = %point, "webhook {} returned {}", self.url, status);
            return Err(TransportError::Status(status.as_u16()));
        }

        let bytes = read_body(response, hook_timeout)
            .instrument(span)
            .await
            .inspect_err(|e| error!(hook.point = %point, "webhook {}: {e}", self.url))?;

        if bytes.is_empty() {
            return Err(TransportError::MalformedBody(
                "empty response body".to_string(),
            ));
        }

        debug!(hook.point = %point, "webhook {} returned {}", self.url, status);

        serde_json::from_slice(&bytes).map_err(|e| TransportError::MalformedBody(e.to_string()))
    }
}

impl fmt::Debug for WebhookTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookTransport")
            .field("url", &self.url.as_str())
            .field("secrets", &"***")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_SECRET: &str = "v1,whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn transport(server: &MockServer, secrets: Vec<SecretString>) -> WebhookTransport {
        let url = Url::parse(&format!("{}/hook", server.uri())).unwrap();
        WebhookTransport::new("permesi-hooks-test", url, secrets).unwrap()
    }

    #[test]
    fn signature_matches_standard_webhooks_vector() {
        let header = signature_header(
            &[SecretString::from(TEST_SECRET.to_string())],
            "msg_p5jXN8AQM9LWM0D4loKWxJek",
            1_614_265_330,
            br#"{"test": 2432232314}"#,
        )
        .unwrap();
        assert_eq!(header, "v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE=");
    }

    #[test]
    fn signature_header_has_one_entry_per_secret() {
        let secrets = vec![
            SecretString::from(TEST_SECRET.to_string()),
            SecretString::from("v1,whsec_c2Vjb25kLXNlY3JldA==".to_string()),
        ];
        let header = signature_header(&secrets, "msg", 1, b"{}").unwrap();
        let parts: Vec<&str> = header.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.starts_with("v1,")));
    }

    #[test]
    fn rejects_malformed_secrets() {
        assert!(check_secrets(&[SecretString::from("whsec_abc".to_string())]).is_err());
        assert!(check_secrets(&[SecretString::from("v1,whsec_***".to_string())]).is_err());
        assert!(check_secrets(&[SecretString::from("v1,whsec_".to_string())]).is_err());
    }

    #[tokio::test]
    async fn posts_signed_envelope_and_parses_response() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header_exists("webhook-id"))
            .and(header_exists("webhook-timestamp"))
            .and(header_exists("webhook-signature"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "decision": "continue",
                "message": ""
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server, vec![SecretString::from(TEST_SECRET.to_string())]);
        let output = transport
            .invoke(
                HookPoint::MfaVerificationAttempt,
                &json!({"valid": true}),
                HookTimeout::default(),
            )
            .await
            .unwrap();
        assert_eq!(output["decision"], "continue");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({"decision": "continue"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = transport(&server, Vec::new())
            .invoke(
                HookPoint::PasswordVerificationAttempt,
                &json!({}),
                HookTimeout::default(),
            )
            .await;
        assert!(matches!(result, Err(TransportError::Status(503))));
    }

    #[tokio::test]
    async fn malformed_and_empty_bodies_are_errors() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let result = transport(&server, Vec::new())
            .invoke(HookPoint::CustomAccessToken, &json!({}), HookTimeout::default())
            .await;
        assert!(matches!(result, Err(TransportError::MalformedBody(_))));

        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = transport(&server, Vec::new())
            .invoke(HookPoint::CustomAccessToken, &json!({}), HookTimeout::default())
            .await;
        assert!(matches!(result, Err(TransportError::MalformedBody(_))));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        let mut body = br#"{"decision": "continue", "message": ""#.to_vec();
        body.resize(MAX_RESPONSE_BYTES + 16, b'x');
        body.extend_from_slice(br#""}"#);
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let result = transport(&server, Vec::new())
            .invoke(HookPoint::MfaVerificationAttempt, &json!({}), HookTimeout::default())
            .await;
        match result {
            Err(TransportError::MalformedBody(detail)) => assert!(detail.contains("exceeds")),
            other => panic!("expected oversized body error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"decision": "continue"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let result = transport(&server, Vec::new())
            .invoke(
                HookPoint::MfaVerificationAttempt,
                &json!({}),
                HookTimeout::from_millis(100),
            )
            .await;
        assert!(matches!(result, Err(TransportError::Timeout(100))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connection_error() {
        let url = Url::parse("http://127.0.0.1:1/hook").unwrap();
        let transport = WebhookTransport::new("permesi-hooks-test", url, Vec::new()).unwrap();
        let result = transport
            .invoke(HookPoint::MfaVerificationAttempt, &json!({}), HookTimeout::default())
            .await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }
}
