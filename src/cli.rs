use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use reqwest::Method;
use std::path::PathBuf;
use std::time::Duration;

use openqa_client::config::{DEFAULT_RETRIES, DEFAULT_WAIT};
use openqa_client::jobs::latest_per_scenario;
use openqa_client::{
    ApiCall, ClientConf, ClientOptions, OpenQAClient, Params, Reply, ServerConfig, Setting,
};

use crate::output::{print_jobs, render_finished, write_json, WaitProgress};

#[derive(Parser)]
#[command(name = "openqa-client")]
#[command(author, version, about = "openQA API client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server hostname or base URL; defaults to the first server in client.conf
    #[arg(long, global = true)]
    server: Option<String>,

    /// URL scheme, when the server is given as a bare hostname
    #[arg(long, global = true)]
    scheme: Option<String>,

    #[arg(long, global = true, env = "OPENQA_API_KEY")]
    apikey: Option<String>,

    #[arg(long, global = true, env = "OPENQA_API_SECRET", hide_env_values = true)]
    apisecret: Option<String>,

    /// Retries for each failed request
    #[arg(long, global = true, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// Seconds to wait before the first retry
    #[arg(long, global = true, default_value_t = DEFAULT_WAIT.as_secs())]
    wait: u64,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Call any API route and print the reply
    Request {
        /// HTTP method, e.g. GET or POST
        method: String,

        /// Path relative to /api/v1, or an absolute path
        path: String,

        /// Query parameter
        #[arg(short = 'P', long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Form body parameter
        #[arg(short = 'd', long = "data", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        data: Vec<(String, String)>,

        /// Job setting, sent as settings[KEY]=VALUE
        #[arg(short = 's', long = "setting", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        settings: Vec<(String, String)>,
    },
    /// Show jobs by ID or build
    Jobs {
        #[arg(long = "id", value_name = "ID")]
        ids: Vec<u64>,

        #[arg(short, long)]
        build: Option<String>,

        /// Include superseded runs and clones' originals
        #[arg(short, long, default_value_t = false)]
        all: bool,

        /// Keep only the newest job of each scenario
        #[arg(short, long, default_value_t = false)]
        latest: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Wait for jobs, or all jobs of a build, to finish
    Wait {
        #[arg(
            long = "id",
            value_name = "ID",
            required_unless_present = "build",
            conflicts_with = "build"
        )]
        ids: Vec<u64>,

        /// Wait for jobs of this BUILD to appear and finish
        #[arg(short, long)]
        build: Option<String>,

        /// With --build, keep older runs of the same scenario
        #[arg(short, long, default_value_t = false, requires = "build")]
        all: bool,

        /// Minutes to wait before giving up; 0 checks once [default: 180, 480 with --build]
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Seconds between checks
        #[arg(short, long, default_value_t = 60)]
        delay: u64,
    },
}

const WAIT_JOBS_MINUTES: u64 = 180;
const WAIT_BUILD_MINUTES: u64 = 480;

fn minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

fn to_params(pairs: &[(String, String)]) -> Params {
    pairs
        .iter()
        .fold(Params::new(), |params, (key, value)| params.with(key, value))
}

/// Settings go wherever the rest of the payload goes: the body when there
/// is one or the method usually carries one, the query otherwise.
fn build_call(
    method: Method,
    path: &str,
    params: &[(String, String)],
    data: &[(String, String)],
    settings: &[(String, String)],
) -> ApiCall {
    let mut query = to_params(params);
    let mut body = (!data.is_empty()).then(|| to_params(data));

    if !settings.is_empty() {
        let settings = settings
            .iter()
            .map(|(key, value)| Setting::new(key, value))
            .collect();
        match body.take() {
            Some(body_params) => body = Some(body_params.with_settings(settings)),
            None if method != Method::GET => body = Some(Params::new().with_settings(settings)),
            None => query = query.with_settings(settings),
        }
    }

    let call = ApiCall::new(method, path).params(query);
    match body {
        Some(body) => call.data(body),
        None => call,
    }
}

impl Cli {
    fn connect(&self) -> Result<OpenQAClient> {
        let conf = ClientConf::load()?;
        let server = ServerConfig::resolve(&conf, self.server.as_deref(), self.scheme.as_deref())?
            .with_credentials(self.apikey.clone(), self.apisecret.clone());
        info!("Using openQA server: {}", server.base_url);

        let options = ClientOptions {
            retries: self.retries,
            wait: Duration::from_secs(self.wait),
            ..ClientOptions::default()
        };
        Ok(OpenQAClient::new(server, options)?)
    }

    fn execute_request(
        &self,
        method: &str,
        path: &str,
        params: &[(String, String)],
        data: &[(String, String)],
        settings: &[(String, String)],
    ) -> Result<()> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid HTTP method: {method}"))?;
        info!("{method} {path}");

        let client = self.connect()?;
        match client.invoke(build_call(method, path, params, data, settings))? {
            Reply::Parsed(value) => write_json(&value, self.pretty, self.output.as_deref())?,
            Reply::Raw(response) => info!("Server replied {} with no content", response.status()),
        }
        Ok(())
    }

    fn execute_jobs(
        &self,
        ids: &[u64],
        build: Option<&str>,
        all: bool,
        latest: bool,
        json: bool,
    ) -> Result<()> {
        let client = self.connect()?;
        let ids = (!ids.is_empty()).then_some(ids);
        let mut jobs = client.get_jobs(ids, build, !all)?;
        if latest {
            jobs = latest_per_scenario(jobs);
        }
        info!("Found {} jobs", jobs.len());

        if json || self.output.is_some() {
            write_json(&jobs, self.pretty, self.output.as_deref())?;
        } else {
            print_jobs(&jobs);
        }
        Ok(())
    }

    fn execute_wait(&self, ids: &[u64], timeout: Duration, delay: Duration) -> Result<()> {
        let client = self.connect()?;
        let mut watcher = client.iterate_jobs(ids, timeout, delay);

        let mut progress = WaitProgress::for_jobs(watcher.unfinished().len());
        let mut finished = Vec::new();
        for batch in watcher.by_ref() {
            let batch = match batch {
                Ok(batch) => batch,
                Err(err) => {
                    progress.abandon();
                    return Err(err.into());
                }
            };
            progress.advance(batch.len());
            progress.suspend(|| {
                for job in &batch {
                    println!("{}", render_finished(job));
                }
            });
            finished.extend(batch);
        }
        progress.finish();

        if self.output.is_some() {
            write_json(&finished, self.pretty, self.output.as_deref())?;
        }
        Ok(())
    }

    fn execute_wait_build(
        &self,
        build: &str,
        all: bool,
        timeout: Duration,
        delay: Duration,
    ) -> Result<()> {
        let client = self.connect()?;
        let progress = WaitProgress::for_build(build);
        let jobs = match client.wait_build_jobs(build, timeout, delay, !all) {
            Ok(jobs) => jobs,
            Err(err) => {
                progress.abandon();
                return Err(err.into());
            }
        };
        progress.finish();
        info!("Build {build} finished with {} jobs", jobs.len());

        if self.output.is_some() {
            write_json(&jobs, self.pretty, self.output.as_deref())?;
        } else {
            print_jobs(&jobs);
        }
        Ok(())
    }

    pub fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Request {
                method,
                path,
                params,
                data,
                settings,
            } => self.execute_request(method, path, params, data, settings),
            Commands::Jobs {
                ids,
                build,
                all,
                latest,
                json,
            } => self.execute_jobs(ids, build.as_deref(), *all, *latest, *json),
            Commands::Wait {
                build: Some(build),
                all,
                timeout,
                delay,
                ..
            } => self.execute_wait_build(
                build,
                *all,
                minutes(timeout.unwrap_or(WAIT_BUILD_MINUTES)),
                Duration::from_secs(*delay),
            ),
            Commands::Wait {
                ids,
                build: None,
                timeout,
                delay,
                ..
            } => self.execute_wait(
                ids,
                minutes(timeout.unwrap_or(WAIT_JOBS_MINUTES)),
                Duration::from_secs(*delay),
            ),
        }
    }
}
