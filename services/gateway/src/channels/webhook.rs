//! Generic webhook adapter.
//!
//! POSTs `{content, subject, timestamp, metadata}` as JSON to the configured
//! URL. User-supplied headers from the config are merged after sanitization.
//! Private and loopback targets are rejected unless the process explicitly
//! allows them (tests, local development).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::IpAddr;
use std::str::FromStr;

use crate::clock::Clock;
use crate::sanitize;

use super::{
    ChannelAdapter, ChannelError, EndpointConfig, OutboundMessage, generate_message_id,
    map_transport_error,
};

pub struct WebhookAdapter {
    allow_private: bool,
}

impl WebhookAdapter {
    pub fn new(allow_private: bool) -> Self {
        WebhookAdapter {
            allow_private,
        }
    }

    fn validate_url(&self, raw: &str) -> Result<(), ChannelError> {
        let url = reqwest::Url::parse(raw)
            .map_err(|e| ChannelError::Config(format!("invalid webhook_url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ChannelError::Config(format!(
                    "webhook_url scheme '{other}' is not allowed"
                )));
            }
        }
        if self.allow_private {
            return Ok(());
        }
        match url.host_str() {
            Some(host) => {
                if host.eq_ignore_ascii_case("localhost") {
                    return Err(ChannelError::Config(
                        "webhook_url must not target localhost".to_owned(),
                    ));
                }
                if let Ok(ip) = IpAddr::from_str(host.trim_matches(['[', ']'])) {
                    if is_private_ip(ip) {
                        return Err(ChannelError::Config(format!(
                            "webhook_url must not target private address {ip}"
                        )));
                    }
                }
                Ok(())
            }
            None => Err(ChannelError::Config("webhook_url has no host".to_owned())),
        }
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Build the merged header map, dropping names/values that are invalid after
/// control-character stripping.
fn build_headers(user_headers: &std::collections::HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in user_headers {
        let clean_value = sanitize::clean_header_value(value);
        let Ok(name) = HeaderName::from_str(name.trim()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(&clean_value) else {
            continue;
        };
        headers.insert(name, value);
    }
    headers
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    async fn send(
        &self,
        http: &reqwest::Client,
        clock: &dyn Clock,
        config: &EndpointConfig,
        msg: &OutboundMessage<'_>,
    ) -> Result<String, ChannelError> {
        let EndpointConfig::Webhook(cfg) = config else {
            return Err(ChannelError::Config("not a webhook config".to_owned()));
        };
        self.validate_url(&cfg.webhook_url)?;

        let content = sanitize::truncate_chars(msg.content, sanitize::MAX_WEBHOOK_CONTENT);
        let payload = serde_json::json!({
            "content": content,
            "subject": msg.subject,
            "timestamp": clock.now().to_rfc3339(),
            "metadata": {
                "channel": "webhook",
                "version": "1.0",
            },
        });

        let response = http
            .post(&cfg.webhook_url)
            .headers(build_headers(&cfg.headers))
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(generate_message_id("wh"));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_rejects_bad_schemes_and_private_targets() {
        let adapter = WebhookAdapter::new(false);
        assert!(adapter.validate_url("ftp://h.example/x").is_err());
        assert!(adapter.validate_url("not a url").is_err());
        assert!(adapter.validate_url("http://localhost/x").is_err());
        assert!(adapter.validate_url("http://127.0.0.1/x").is_err());
        assert!(adapter.validate_url("http://10.1.2.3/x").is_err());
        assert!(adapter.validate_url("http://192.168.0.9/x").is_err());
        assert!(adapter.validate_url("http://[::1]/x").is_err());
        assert!(adapter.validate_url("https://hooks.example.com/ep").is_ok());
    }

    #[test]
    fn url_validation_allows_private_targets_when_configured() {
        let adapter = WebhookAdapter::new(true);
        assert!(adapter.validate_url("http://127.0.0.1:8080/hook").is_ok());
        assert!(adapter.validate_url("ftp://h.example/x").is_err(), "scheme check still applies");
    }

    #[test]
    fn user_headers_are_sanitized_and_invalid_ones_dropped() {
        let mut user = std::collections::HashMap::new();
        user.insert("X-Custom".to_owned(), "value\r\nEvil: yes".to_owned());
        user.insert("Bad Name!".to_owned(), "x".to_owned());

        let headers = build_headers(&user);
        assert_eq!(headers.get("x-custom").unwrap(), "valueEvil: yes");
        assert_eq!(headers.len(), 1, "invalid header name is dropped");
    }
}
