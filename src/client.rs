mod auth;
mod request;
mod retry;

use std::sync::Arc;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use url::Url;

use crate::config::{ClientConf, ClientOptions, ServerConfig};
use crate::error::{OpenQAError, Result};

pub use auth::{
    api_hash, canonical_path, microtime, RequestSigner, API_HASH_HEADER, API_KEY_HEADER,
    API_MICROTIME_HEADER,
};
pub use request::{resolve_path, ApiCall, Params, Setting, API_ROOT, SETTINGS_KEY};
pub use retry::{next_wait, Reply, RetryPolicy, Sleep, ThreadSleep, MAX_WAIT};

#[cfg(test)]
pub(crate) use retry::RecordingSleep;

/// A client for one openQA server.
///
/// Holds the HTTP client (reused across calls), the request signer and the
/// client-wide retry defaults. All calls block the current thread.
pub struct OpenQAClient {
    http: Client,
    base_url: String,
    signer: RequestSigner,
    options: ClientOptions,
    sleeper: Arc<dyn Sleep>,
}

impl OpenQAClient {
    pub fn new(server: ServerConfig, options: ClientOptions) -> Result<Self> {
        let base_url = server.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| OpenQAError::Config(format!("Invalid base URL {base_url}: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("json"));
        if let Some(key) = server.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(key)
                .map_err(|e| OpenQAError::Config(format!("Invalid API key: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = Client::builder()
            .user_agent(concat!("openqa-client/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| OpenQAError::Config(format!("Failed to create HTTP client: {e}")))?;

        let signer = RequestSigner::new(server.api_secret);
        if signer.is_anonymous() {
            debug!("No API secret for {base_url}: requests will not be signed");
        }

        Ok(Self {
            http,
            base_url,
            signer,
            options,
            sleeper: Arc::new(ThreadSleep),
        })
    }

    /// Resolve the server from the openQA client config files and connect
    /// with default options.
    pub fn from_config(server: Option<&str>, scheme: Option<&str>) -> Result<Self> {
        let conf = ClientConf::load()?;
        let server = ServerConfig::resolve(&conf, server, scheme)?;
        Self::new(server, ClientOptions::default())
    }

    /// Replace how the client waits between retries and polls.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Sleep + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Wait the way retries do, so pollers share the client's sleeper.
    pub(crate) fn pause(&self, duration: std::time::Duration) {
        self.sleeper.sleep(duration);
    }
}
