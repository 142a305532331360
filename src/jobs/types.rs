use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of an openQA job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Assigned,
    Setup,
    Running,
    Uploading,
    Done,
    Cancelled,
}

/// The 'meta' states openQA groups job states into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateGroup {
    PreExecution,
    Execution,
    Final,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        Self::Scheduled,
        Self::Assigned,
        Self::Setup,
        Self::Running,
        Self::Uploading,
        Self::Done,
        Self::Cancelled,
    ];

    pub fn group(self) -> StateGroup {
        match self {
            Self::Scheduled => StateGroup::PreExecution,
            Self::Assigned | Self::Setup | Self::Running | Self::Uploading => StateGroup::Execution,
            Self::Done | Self::Cancelled => StateGroup::Final,
        }
    }

    /// No further transitions happen from a final state.
    pub fn is_final(self) -> bool {
        self.group() == StateGroup::Final
    }

    pub fn is_pending(self) -> bool {
        !self.is_final()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Assigned => "assigned",
            Self::Setup => "setup",
            Self::Running => "running",
            Self::Uploading => "uploading",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an openQA job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    None,
    Passed,
    Softfailed,
    Failed,
    Incomplete,
    Skipped,
    Obsoleted,
    ParallelFailed,
    ParallelRestarted,
    UserCancelled,
    UserRestarted,
    TimeoutExceeded,
}

/// The 'meta' results openQA groups job results into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultGroup {
    Complete,
    NotComplete,
    Aborted,
}

impl JobResult {
    pub const ALL: [JobResult; 12] = [
        Self::None,
        Self::Passed,
        Self::Softfailed,
        Self::Failed,
        Self::Incomplete,
        Self::Skipped,
        Self::Obsoleted,
        Self::ParallelFailed,
        Self::ParallelRestarted,
        Self::UserCancelled,
        Self::UserRestarted,
        Self::TimeoutExceeded,
    ];

    /// `None` for jobs that have no result yet.
    pub fn group(self) -> Option<ResultGroup> {
        match self {
            Self::None => None,
            Self::Passed | Self::Softfailed | Self::Failed => Some(ResultGroup::Complete),
            Self::Incomplete | Self::TimeoutExceeded => Some(ResultGroup::NotComplete),
            Self::Skipped
            | Self::Obsoleted
            | Self::ParallelFailed
            | Self::ParallelRestarted
            | Self::UserCancelled
            | Self::UserRestarted => Some(ResultGroup::Aborted),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Passed | Self::Softfailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Passed => "passed",
            Self::Softfailed => "softfailed",
            Self::Failed => "failed",
            Self::Incomplete => "incomplete",
            Self::Skipped => "skipped",
            Self::Obsoleted => "obsoleted",
            Self::ParallelFailed => "parallel_failed",
            Self::ParallelRestarted => "parallel_restarted",
            Self::UserCancelled => "user_cancelled",
            Self::UserRestarted => "user_restarted",
            Self::TimeoutExceeded => "timeout_exceeded",
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings that together identify "the same" test across runs.
pub const SCENARIO_KEYS: [&str; 7] = [
    "DISTRI", "VERSION", "BUILD", "TEST", "FLAVOR", "ARCH", "MACHINE",
];

/// A job record as reported by the web UI API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier assigned by the server
    pub id: u64,
    /// The job this one was cloned as, if it was restarted
    #[serde(default)]
    pub clone_id: Option<u64>,
    pub state: JobState,
    pub result: JobResult,
    /// Job settings as shown in the web UI
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Every other field the server sent, kept as is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    pub fn is_final(&self) -> bool {
        self.state.is_final()
    }

    /// Test name from the settings, falling back to the record's `name`.
    pub fn test_name(&self) -> Option<&str> {
        self.settings
            .get("TEST")
            .map(String::as_str)
            .or_else(|| self.extra.get("name").and_then(Value::as_str))
    }

    /// `None` when any of the scenario settings is missing.
    pub fn scenario_key(&self) -> Option<ScenarioKey> {
        let [distri, version, build, test, flavor, arch, machine] =
            SCENARIO_KEYS.map(|key| self.settings.get(key).cloned());

        Some(ScenarioKey {
            distri: distri?,
            version: version?,
            build: build?,
            test: test?,
            flavor: flavor?,
            arch: arch?,
            machine: machine?,
        })
    }
}

/// (DISTRI, VERSION, BUILD, TEST, FLAVOR, ARCH, MACHINE) of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioKey {
    pub distri: String,
    pub version: String,
    pub build: String,
    pub test: String,
    pub flavor: String,
    pub arch: String,
    pub machine: String,
}

/// Envelope of `GET jobs` responses.
#[derive(Debug, Deserialize)]
pub(crate) struct JobList {
    pub jobs: Vec<Job>,
}
