//! Client for the openQA web UI REST API.
//!
//! Requests are signed with the user's API secret when one is configured,
//! failed calls are retried with exponential backoff, and job queries can
//! hide superseded runs by following clone chains.

pub mod client;
pub mod config;
pub mod error;
pub mod jobs;

pub use client::{ApiCall, OpenQAClient, Params, Reply, Setting};
pub use config::{ClientConf, ClientOptions, ServerConfig};
pub use error::{OpenQAError, Result};
pub use jobs::{Job, JobResult, JobSelector, JobState, JobWatcher};
