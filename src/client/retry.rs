use std::time::Duration;

use log::debug;
use reqwest::blocking::{Request, Response};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::OpenQAClient;
use crate::error::{OpenQAError, Result};

/// Longest wait between two attempts.
pub const MAX_WAIT: Duration = Duration::from_secs(60);

const YAML_MEDIA_TYPES: [&str; 4] = [
    "text/yaml",
    "text/x-yaml",
    "application/yaml",
    "application/x-yaml",
];

/// Blocking wait used between retries and between job polls.
pub trait Sleep: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// How often to retry a failed request and how long to wait before the first retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub wait: Duration,
}

/// The wait before the retry after one that waited `wait`.
pub fn next_wait(wait: Duration) -> Duration {
    wait.saturating_mul(2).min(MAX_WAIT)
}

/// Outcome of a successful request.
#[derive(Debug)]
pub enum Reply {
    /// JSON or YAML body
    Parsed(Value),
    /// Response left for the caller: no content, or parsing was not requested
    Raw(Response),
}

impl Reply {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Deserialize the parsed body into `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Parsed(value) => Ok(serde_json::from_value(value)?),
            Self::Raw(response) => Err(OpenQAError::EmptyResponse {
                url: response.url().to_string(),
            }),
        }
    }
}

impl OpenQAClient {
    /// Sign and send `request`, retrying connection failures and error
    /// statuses.
    ///
    /// The first retry waits exactly `policy.wait`; each further wait is
    /// doubled up to [`MAX_WAIT`]. Once retries are exhausted the last error
    /// is returned. Malformed bodies are never retried.
    pub fn send(&self, request: Request, policy: RetryPolicy, parse: bool) -> Result<Reply> {
        let mut retries = policy.retries;
        let mut wait = policy.wait;

        loop {
            match self.attempt(&request, parse) {
                Err(err) if err.is_retryable() && retries > 0 => {
                    debug!(
                        "Request failed! Retrying in {:.1}s ({retries} retries left)...",
                        wait.as_secs_f64()
                    );
                    debug!("Error: {err}");
                    self.sleeper.sleep(wait);
                    retries -= 1;
                    wait = next_wait(wait);
                }
                outcome => return outcome,
            }
        }
    }

    fn attempt(&self, request: &Request, parse: bool) -> Result<Reply> {
        let signed = self.signer.sign(request)?;
        let response = self.http.execute(signed).map_err(OpenQAError::Connection)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenQAError::Request {
                method: request.method().clone(),
                url: response.url().to_string(),
                status,
            });
        }

        if !parse || status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Ok(Reply::Raw(response));
        }

        // the server may answer in YAML even though we asked for JSON
        let yaml = is_yaml(response.headers());
        let body = response.text().map_err(OpenQAError::Connection)?;
        let value = if yaml {
            serde_yaml::from_str(&body)?
        } else {
            serde_json::from_str(&body)?
        };

        Ok(Reply::Parsed(value))
    }
}

fn is_yaml(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .is_some_and(|essence| YAML_MEDIA_TYPES.contains(&essence.as_str()))
}

/// Records requested sleeps instead of sleeping.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingSleep(std::sync::Arc<std::sync::Mutex<Vec<Duration>>>);

#[cfg(test)]
impl RecordingSleep {
    pub(crate) fn seconds(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(Duration::as_secs).collect()
    }
}

#[cfg(test)]
impl Sleep for RecordingSleep {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientOptions, ServerConfig};
    use mockito::Matcher;
    use reqwest::Method;

    fn client_for(base_url: &str, sleeper: &RecordingSleep) -> OpenQAClient {
        OpenQAClient::new(
            ServerConfig::authenticated(base_url, "aaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbb"),
            ClientOptions::default(),
        )
        .unwrap()
        .with_sleeper(sleeper.clone())
    }

    fn jobs_request(client: &OpenQAClient) -> Request {
        client
            .http
            .request(Method::GET, format!("{}/api/v1/jobs", client.base_url))
            .query(&[("id", "1")])
            .build()
            .unwrap()
    }

    fn default_policy(client: &OpenQAClient) -> RetryPolicy {
        RetryPolicy {
            retries: client.options.retries,
            wait: client.options.wait,
        }
    }

    #[test]
    fn test_next_wait_doubles_up_to_cap() {
        assert_eq!(next_wait(Duration::from_secs(5)), Duration::from_secs(10));
        assert_eq!(next_wait(Duration::from_secs(40)), Duration::from_secs(60));
        assert_eq!(next_wait(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[test]
    fn test_send_signs_and_parses_json() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::UrlEncoded("id".into(), "1".into()))
            .match_header("accept", "json")
            .match_header("x-api-key", "aaaaaaaaaaaaaaaa")
            .match_header("x-api-hash", Matcher::Regex("^[0-9a-f]{40}$".into()))
            .match_header("x-api-microtime", Matcher::Regex(r"^\d+\.\d+$".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"jobs": []}"#)
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let reply = client
            .send(jobs_request(&client), default_policy(&client), true)
            .unwrap();

        mock.assert();
        assert_eq!(reply.into_value(), Some(serde_json::json!({"jobs": []})));
        assert!(sleeper.seconds().is_empty());
    }

    #[test]
    fn test_send_parses_yaml_content_type() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Any)
            .with_header("content-type", "text/yaml; charset=utf-8")
            .with_body("jobs:\n  - id: 1\n    name: foo\n")
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let reply = client
            .send(jobs_request(&client), default_policy(&client), true)
            .unwrap();

        assert_eq!(
            reply.into_value(),
            Some(serde_json::json!({"jobs": [{"id": 1, "name": "foo"}]}))
        );
    }

    #[test]
    fn test_send_retries_error_status_with_backoff() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect(6)
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let err = client
            .send(jobs_request(&client), default_policy(&client), true)
            .unwrap_err();

        mock.assert();
        match err {
            OpenQAError::Request {
                method,
                url,
                status,
            } => {
                assert_eq!(method, Method::GET);
                assert_eq!(url, format!("{}/api/v1/jobs?id=1", server.url()));
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sleeper.seconds(), vec![10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_send_wraps_connection_failure() {
        let sleeper = RecordingSleep::default();
        // nothing listens on port 1
        let client = client_for("http://127.0.0.1:1", &sleeper);
        let policy = RetryPolicy {
            retries: 2,
            wait: Duration::from_secs(5),
        };

        let err = client
            .send(jobs_request(&client), policy, true)
            .unwrap_err();

        assert!(matches!(err, OpenQAError::Connection(_)));
        assert_eq!(sleeper.seconds(), vec![5, 10]);
    }

    #[test]
    fn test_zero_retries_fails_after_one_attempt() {
        let mut server = mockito::Server::new();
        let failing = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(1)
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let request = jobs_request(&client);

        let err = client
            .send(
                request.try_clone().unwrap(),
                RetryPolicy {
                    retries: 0,
                    wait: Duration::from_secs(3),
                },
                true,
            )
            .unwrap_err();
        failing.assert();
        assert!(err.is_retryable());
        assert!(sleeper.seconds().is_empty());
    }

    #[test]
    fn test_malformed_body_is_not_retried() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body("{not json")
            .expect(1)
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let err = client
            .send(jobs_request(&client), default_policy(&client), true)
            .unwrap_err();

        mock.assert();
        assert!(matches!(err, OpenQAError::Json(_)));
        assert!(sleeper.seconds().is_empty());
    }

    #[test]
    fn test_no_content_is_returned_raw() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Any)
            .with_status(204)
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let reply = client
            .send(jobs_request(&client), default_policy(&client), true)
            .unwrap();

        match reply {
            Reply::Raw(response) => assert_eq!(response.status(), StatusCode::NO_CONTENT),
            Reply::Parsed(value) => panic!("expected raw response, got {value}"),
        }
    }

    #[test]
    fn test_unparsed_mode_returns_response() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/api/v1/jobs")
            .match_query(Matcher::Any)
            .with_header("x-total", "3")
            .with_body(r#"{"jobs": []}"#)
            .create();

        let sleeper = RecordingSleep::default();
        let client = client_for(&server.url(), &sleeper);
        let reply = client
            .send(jobs_request(&client), default_policy(&client), false)
            .unwrap();

        let Reply::Raw(response) = reply else {
            panic!("expected raw response");
        };
        assert_eq!(response.headers()["x-total"].to_str().unwrap(), "3");
        assert!(matches!(
            Reply::Raw(response).json::<Value>(),
            Err(OpenQAError::EmptyResponse { .. })
        ));
    }
}
