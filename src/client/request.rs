use std::time::Duration;

use indexmap::IndexMap;
use reqwest::blocking::Request;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::retry::{Reply, RetryPolicy};
use super::OpenQAClient;
use crate::error::{OpenQAError, Result};

/// Prefix for API paths given without a leading `/`.
pub const API_ROOT: &str = "/api/v1";

/// Parameter that openQA returns as a list of `{key, value}` pairs but
/// expects back as flat `settings[KEY]` entries.
pub const SETTINGS_KEY: &str = "settings";

/// One entry of a `settings` list, as returned for job groups, products,
/// machines and test suites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Query or form parameters for an API call. Keeps insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: IndexMap<String, String>,
    settings: Option<Vec<Setting>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Attach a `settings` list; it is flattened when the request is built.
    #[must_use]
    pub fn with_settings(mut self, settings: Vec<Setting>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn settings(&self) -> Option<&[Setting]> {
        self.settings.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.settings.as_ref().map_or(true, Vec::is_empty)
    }

    /// Build parameters from a JSON object such as a record the server
    /// returned. A `settings` array of `{key, value}` objects becomes the
    /// settings list, nulls are skipped and other scalars are stringified.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| OpenQAError::Usage("parameters must be a JSON object".to_string()))?;

        let mut params = Self::new();
        for (key, value) in object {
            match value {
                Value::Array(entries) if key == SETTINGS_KEY => {
                    let settings = entries
                        .iter()
                        .map(setting_from_json)
                        .collect::<Result<Vec<_>>>()?;
                    params.settings = Some(settings);
                }
                Value::Null => {}
                other => {
                    let text = scalar_to_string(other).ok_or_else(|| {
                        OpenQAError::Usage(format!("parameter `{key}` is not a scalar value"))
                    })?;
                    params.insert(key.clone(), text);
                }
            }
        }

        Ok(params)
    }

    /// Plain key/value pairs with the settings list expanded into
    /// `settings[KEY] = VALUE` entries after the other parameters.
    pub fn flatten(self) -> IndexMap<String, String> {
        let mut flat = self.values;
        for setting in self.settings.unwrap_or_default() {
            flat.insert(format!("{SETTINGS_KEY}[{}]", setting.key), setting.value);
        }
        flat
    }
}

fn setting_from_json(entry: &Value) -> Result<Setting> {
    let field = |name: &str| {
        entry
            .get(name)
            .and_then(scalar_to_string)
            .ok_or_else(|| OpenQAError::Usage(format!("setting entry without `{name}`: {entry}")))
    };
    Ok(Setting {
        key: field("key")?,
        value: field("value")?,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Relative paths are taken to be under [`API_ROOT`]; absolute paths are
/// used as given.
pub fn resolve_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{API_ROOT}/{path}")
    }
}

/// A call to the openQA API.
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: Method,
    path: String,
    params: Params,
    data: Option<Params>,
    retries: Option<u32>,
    wait: Option<Duration>,
    parse: bool,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Params::new(),
            data: None,
            retries: None,
            wait: None,
            parse: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Query string parameters.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Form-encoded body; use this instead of query parameters for large
    /// settings lists.
    #[must_use]
    pub fn data(mut self, data: Params) -> Self {
        self.data = Some(data);
        self
    }

    /// Override the client's default number of retries for this call.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Override the client's default initial wait for this call.
    #[must_use]
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Return the raw response instead of parsing the body.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.parse = false;
        self
    }
}

impl OpenQAClient {
    /// Perform an API call, retrying per the call's or the client's policy.
    pub fn invoke(&self, call: ApiCall) -> Result<Reply> {
        let request = self.prepare(&call)?;
        let policy = RetryPolicy {
            retries: call.retries.unwrap_or(self.options.retries),
            wait: call.wait.unwrap_or(self.options.wait),
        };
        self.send(request, policy, call.parse)
    }

    /// Perform an API call and deserialize the body into `T`.
    pub fn invoke_json<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T> {
        self.invoke(call)?.json()
    }

    pub(crate) fn prepare(&self, call: &ApiCall) -> Result<Request> {
        let target = format!("{}{}", self.base_url, resolve_path(&call.path));
        let url = Url::parse(&target)
            .map_err(|e| OpenQAError::Usage(format!("Invalid API URL {target}: {e}")))?;

        let mut builder = self.http.request(call.method.clone(), url);

        let query = call.params.clone().flatten();
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(data) = &call.data {
            builder = builder.form(&data.clone().flatten());
        }

        builder
            .build()
            .map_err(|e| OpenQAError::Usage(format!("Failed to build request: {e}")))
    }
}
