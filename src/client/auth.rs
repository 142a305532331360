//! HMAC request signing as expected by openQA's API authentication.
//!
//! Each authenticated request carries the API key, a timestamp and an
//! HMAC-SHA1 over the request's path and query plus that timestamp.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::blocking::Request;
use reqwest::header::{HeaderName, HeaderValue};
use sha1::Sha1;
use url::{Position, Url};

use crate::error::{OpenQAError, Result};

type HmacSha1 = Hmac<Sha1>;

pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
pub const API_MICROTIME_HEADER: HeaderName = HeaderName::from_static("x-api-microtime");
pub const API_HASH_HEADER: HeaderName = HeaderName::from_static("x-api-hash");

/// Adds `X-API-Microtime` and `X-API-Hash` to outgoing requests.
#[derive(Debug, Clone, Default)]
pub struct RequestSigner {
    secret: Option<String>,
}

impl RequestSigner {
    /// An empty secret means anonymous mode, same as no secret.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.secret.is_none()
    }

    /// Sign a copy of `request` with the current time.
    pub fn sign(&self, request: &Request) -> Result<Request> {
        self.sign_at(request, Utc::now())
    }

    /// Sign a copy of `request` as of `now`. The original is left untouched
    /// so a retry can be signed again with a fresh timestamp. Without a
    /// secret the copy is returned as is.
    pub fn sign_at(&self, request: &Request, now: DateTime<Utc>) -> Result<Request> {
        let mut signed = request.try_clone().ok_or_else(|| {
            OpenQAError::Usage("request body is a stream and cannot be re-sent".to_string())
        })?;

        let Some(secret) = &self.secret else {
            return Ok(signed);
        };

        let timestamp = microtime(now);
        let hash = api_hash(secret, &canonical_path(signed.url()), &timestamp)?;

        let headers = signed.headers_mut();
        headers.insert(API_MICROTIME_HEADER, header_value(timestamp)?);
        headers.insert(API_HASH_HEADER, header_value(hash)?);

        Ok(signed)
    }
}

/// Unix time with fractional seconds, always with a decimal point.
pub fn microtime(now: DateTime<Utc>) -> String {
    #[allow(clippy::cast_precision_loss)]
    let seconds = now.timestamp_micros() as f64 / 1_000_000.0;
    let text = seconds.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Path and query as transmitted, normalized the way the server hashes them.
pub fn canonical_path(url: &Url) -> String {
    url[Position::BeforePath..Position::AfterQuery]
        .replace("%20", "+")
        .replace("%7E", "~")
}

/// Lowercase hex HMAC-SHA1 of `path` followed by `timestamp`.
pub fn api_hash(secret: &str, path: &str, timestamp: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| OpenQAError::Config(format!("Unusable API secret: {e}")))?;
    mac.update(path.as_bytes());
    mac.update(timestamp.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn header_value(text: String) -> Result<HeaderValue> {
    HeaderValue::try_from(text)
        .map_err(|e| OpenQAError::Config(format!("Invalid authentication header: {e}")))
}
