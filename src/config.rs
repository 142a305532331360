use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use ini::Ini;
use log::debug;
use url::{Position, Url};

use crate::error::{OpenQAError, Result};

/// Default number of retries per request.
pub const DEFAULT_RETRIES: u32 = 5;

/// Default wait before the first retry.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Value sent for the `latest` query flag.
///
/// openQA 4.3 and later accept `1`; some older deployments only understood
/// `true`. Override it through [`ClientOptions::latest_flag`] when talking
/// to such a server.
pub const DEFAULT_LATEST_FLAG: &str = "1";

const LOCAL_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "::1", "[::1]"];

/// Sections of one or more openQA `client.conf` files.
///
/// Files are merged in load order, so a key in the user's file overrides the
/// same key in the system-wide one. Section order follows first appearance.
#[derive(Debug, Clone, Default)]
pub struct ClientConf {
    sections: IndexMap<String, IndexMap<String, String>>,
}

impl ClientConf {
    /// The locations openQA clients read, system file first.
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/openqa/client.conf")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("openqa").join("client.conf"));
        }
        paths
    }

    /// Load configuration from the default locations.
    pub fn load() -> Result<Self> {
        Self::load_from_paths(&Self::default_paths())
    }

    /// Load and merge configuration files. Missing files are skipped.
    pub fn load_from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut conf = Self::default();

        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }

            let ini = Ini::load_from_file(path).map_err(|e| {
                OpenQAError::Config(format!(
                    "Failed to read config file {}: {e}",
                    path.display()
                ))
            })?;
            conf.merge(&ini);
            debug!("Loaded client config from: {}", path.display());
        }

        Ok(conf)
    }

    /// Parse configuration from an in-memory INI document.
    pub fn parse(content: &str) -> Result<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| OpenQAError::Config(format!("Failed to parse client config: {e}")))?;
        let mut conf = Self::default();
        conf.merge(&ini);
        Ok(conf)
    }

    fn merge(&mut self, ini: &Ini) {
        for (section, properties) in ini.iter() {
            // keys outside any section are not tied to a server
            let Some(section) = section else {
                continue;
            };
            let entry = self.sections.entry(section.to_string()).or_default();
            // option names are case-insensitive, as in Python's configparser
            for (key, value) in properties.iter() {
                entry.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }
    }

    /// Name of the first configured server, if any.
    pub fn first_server(&self) -> Option<&str> {
        self.sections.keys().next().map(String::as_str)
    }

    /// `key` and `secret` from a section, only when both are present.
    fn credentials(&self, section: &str) -> Option<(String, String)> {
        let properties = self.sections.get(section)?;
        let key = properties.get("key")?;
        let secret = properties.get("secret")?;
        Some((key.clone(), secret.clone()))
    }
}

/// Where to send requests and how to authenticate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Scheme and host, without a trailing slash (e.g. `https://openqa.example.org`)
    pub base_url: String,
    /// Sent as `X-API-Key` on every request when set
    pub api_key: Option<String>,
    /// Shared secret used to sign requests; without it requests are anonymous
    pub api_secret: Option<String>,
}

impl ServerConfig {
    /// A server with no credentials: only read-only requests will be accepted.
    pub fn anonymous(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_secret: None,
        }
    }

    /// A server with an API key and secret.
    pub fn authenticated(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: Some(api_key.into()),
            api_secret: Some(api_secret.into()),
        }
    }

    /// Resolve server, scheme and credentials against the client config.
    ///
    /// With no server, the first configured section is used, falling back to
    /// `localhost`. A server given as a URL supplies the scheme unless one is
    /// passed explicitly. Without any scheme, local hosts use `http` and
    /// everything else `https`. Credentials are looked up under the server
    /// name first, then under the base URL.
    pub fn resolve(conf: &ClientConf, server: Option<&str>, scheme: Option<&str>) -> Result<Self> {
        let mut server = match server.filter(|s| !s.is_empty()) {
            Some(server) => server.to_string(),
            None => conf.first_server().unwrap_or("localhost").to_string(),
        };
        let mut scheme = scheme.filter(|s| !s.is_empty()).map(str::to_string);

        if server.starts_with("http") {
            let url = Url::parse(&server)
                .map_err(|e| OpenQAError::Config(format!("Invalid server URL {server}: {e}")))?;
            if scheme.is_none() {
                scheme = Some(url.scheme().to_string());
            }
            server = url[Position::BeforeHost..Position::AfterPort].to_string();
        }

        let scheme = scheme.unwrap_or_else(|| {
            if LOCAL_HOSTS.contains(&server.as_str()) {
                "http".to_string()
            } else {
                "https".to_string()
            }
        });

        let base_url = format!("{scheme}://{server}");

        let credentials = conf
            .credentials(&server)
            .or_else(|| conf.credentials(&base_url));

        match credentials {
            Some((key, secret)) => Ok(Self::authenticated(base_url, key, secret)),
            None => {
                debug!("No API key for {server}: only GET requests will be allowed");
                Ok(Self::anonymous(base_url))
            }
        }
    }

    /// Replace configured credentials with explicitly supplied ones.
    #[must_use]
    pub fn with_credentials(mut self, api_key: Option<String>, api_secret: Option<String>) -> Self {
        if api_key.is_some() {
            self.api_key = api_key;
        }
        if api_secret.is_some() {
            self.api_secret = api_secret;
        }
        self
    }
}

/// Client-wide defaults. Every call may override `retries` and `wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// How many times a failed request is retried
    pub retries: u32,
    /// Wait before the first retry; doubled for each further retry, capped at 60 seconds
    pub wait: Duration,
    /// Value sent for the `latest` query flag
    pub latest_flag: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            wait: DEFAULT_WAIT,
            latest_flag: DEFAULT_LATEST_FLAG.to_string(),
        }
    }
}
